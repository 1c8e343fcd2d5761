pub mod message;
pub mod objects;
pub mod refs;
pub mod transport;

pub use objects::{CommitObject, DecodedObject, HistoryPage};
pub use refs::{ParsedRef, PullRefKind, RemoteRef, parse_ref_name};
pub use transport::{
    Capabilities, CredentialProvider, FetchRequest, HistoryApi, ObjectTransport, RepoRemote,
    TransportError, TransportSession,
};
