use async_trait::async_trait;
use futures::stream::BoxStream;
use secrecy::SecretString;
use thiserror::Error;

use crate::objects::{DecodedObject, HistoryPage};
use crate::refs::RemoteRef;

/// Identifies a repository on the remote side.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoRemote {
    pub owner: String,
    pub name: String,
}

impl std::fmt::Display for RepoRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    /// Network-level failure; safe to retry on the next trigger.
    #[error("transient transport failure: {0}")]
    Transient(String),
    /// The remote does not know the requested object or ref.
    #[error("remote object not found: {0}")]
    Missing(String),
    /// The remote answered with something we cannot decode.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Capabilities advertised during session negotiation.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    pub shallow: bool,
    pub filter: bool,
}

/// Delta-negotiation request for a bulk object fetch.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub want: Vec<String>,
    pub have: Vec<String>,
    pub depth: Option<u32>,
}

/// Bulk object transport (smart-protocol shaped). Implementations own the
/// wire format; this core only sees decoded objects.
#[async_trait]
pub trait ObjectTransport: Send + Sync {
    /// Negotiate a session against one repository. The token comes from the
    /// [`CredentialProvider`] and is opaque here.
    async fn open(
        &self,
        remote: &RepoRemote,
        token: SecretString,
    ) -> Result<Box<dyn TransportSession>, TransportError>;
}

#[async_trait]
pub trait TransportSession: Send + Sync {
    fn capabilities(&self) -> &Capabilities;

    /// Refs currently advertised under the given prefixes.
    async fn list_refs(&self, prefixes: &[&str]) -> Result<Vec<RemoteRef>, TransportError>;

    /// Stream decoded objects for the requested shas.
    async fn fetch_objects(
        &self,
        request: FetchRequest,
    ) -> Result<BoxStream<'static, Result<DecodedObject, TransportError>>, TransportError>;
}

/// Paginated ancestor-history API, separate from the bulk transport.
#[async_trait]
pub trait HistoryApi: Send + Sync {
    async fn history(
        &self,
        remote: &RepoRemote,
        token: &SecretString,
        root_sha: &str,
        page_size: u32,
        after: Option<&str>,
    ) -> Result<HistoryPage, TransportError>;
}

/// Per-repository bearer-credential issuance. Opaque to this core.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn bearer_token(&self, remote: &RepoRemote) -> Result<SecretString, TransportError>;
}
