use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use futures::{StreamExt, stream::BoxStream};
use scm::{
    Capabilities, CommitObject, CredentialProvider, DecodedObject, FetchRequest, HistoryApi,
    HistoryPage, ObjectTransport, RemoteRef, RepoRemote, TransportError, TransportSession,
};
use secrecy::SecretString;

#[derive(Default)]
struct RemoteState {
    commits: HashMap<String, CommitObject>,
    refs: BTreeMap<String, String>,
    missing_objects: HashSet<String>,
    fail_history_after: Option<usize>,
    list_refs_calls: usize,
    fetch_calls: usize,
    history_calls: usize,
    tokens_issued: usize,
}

/// In-memory stand-in for both remote protocols: the bulk object transport
/// and the paginated ancestor-history API, plus a credential provider.
/// Counters expose how often the wire was touched, which the dedupe and
/// resumption tests assert on.
#[derive(Clone, Default)]
pub struct FakeRemote {
    state: Arc<Mutex<RemoteState>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commit(&self, sha: &str, parents: &[&str], message: &str) {
        let mut state = self.state.lock().unwrap();
        state.commits.insert(
            sha.to_string(),
            CommitObject {
                sha: sha.to_string(),
                parent_shas: parents.iter().map(|parent| parent.to_string()).collect(),
                message: message.to_string(),
            },
        );
    }

    pub fn set_ref(&self, name: &str, sha: &str) {
        let mut state = self.state.lock().unwrap();
        state.refs.insert(name.to_string(), sha.to_string());
    }

    pub fn remove_ref(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        state.refs.remove(name);
    }

    pub fn branch(&self, name: &str, sha: &str) {
        self.set_ref(&format!("refs/heads/{name}"), sha);
    }

    pub fn tag(&self, name: &str, sha: &str) {
        self.set_ref(&format!("refs/tags/{name}"), sha);
    }

    pub fn pull_head(&self, number: i64, sha: &str) {
        self.set_ref(&format!("refs/pull/{number}/head"), sha);
    }

    /// Make the transport silently omit this sha from fetches, as a broken
    /// remote would.
    pub fn drop_object(&self, sha: &str) {
        let mut state = self.state.lock().unwrap();
        state.missing_objects.insert(sha.to_string());
    }

    /// Undo [`FakeRemote::drop_object`].
    pub fn restore_object(&self, sha: &str) {
        let mut state = self.state.lock().unwrap();
        state.missing_objects.remove(sha);
    }

    /// Fail history calls once more than `limit` have been served.
    pub fn fail_history_after(&self, limit: usize) {
        self.state.lock().unwrap().fail_history_after = Some(limit);
    }

    pub fn clear_history_failure(&self) {
        self.state.lock().unwrap().fail_history_after = None;
    }

    pub fn list_refs_calls(&self) -> usize {
        self.state.lock().unwrap().list_refs_calls
    }

    pub fn fetch_calls(&self) -> usize {
        self.state.lock().unwrap().fetch_calls
    }

    pub fn history_calls(&self) -> usize {
        self.state.lock().unwrap().history_calls
    }

    pub fn tokens_issued(&self) -> usize {
        self.state.lock().unwrap().tokens_issued
    }

    /// Ancestors of `root` in breadth-first order, root first, the shape a
    /// reverse-chronological history API serves.
    fn ancestors_of(state: &RemoteState, root: &str) -> Vec<CommitObject> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([root.to_string()]);
        while let Some(sha) = queue.pop_front() {
            if !seen.insert(sha.clone()) {
                continue;
            }
            if let Some(commit) = state.commits.get(&sha) {
                order.push(commit.clone());
                for parent in &commit.parent_shas {
                    queue.push_back(parent.clone());
                }
            }
        }
        order
    }
}

struct FakeSession {
    state: Arc<Mutex<RemoteState>>,
    capabilities: Capabilities,
}

#[async_trait]
impl ObjectTransport for FakeRemote {
    async fn open(
        &self,
        _remote: &RepoRemote,
        _token: SecretString,
    ) -> Result<Box<dyn TransportSession>, TransportError> {
        Ok(Box::new(FakeSession {
            state: Arc::clone(&self.state),
            capabilities: Capabilities {
                shallow: true,
                filter: false,
            },
        }))
    }
}

#[async_trait]
impl TransportSession for FakeSession {
    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    async fn list_refs(&self, prefixes: &[&str]) -> Result<Vec<RemoteRef>, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.list_refs_calls += 1;
        Ok(state
            .refs
            .iter()
            .filter(|(name, _)| prefixes.iter().any(|prefix| name.starts_with(prefix)))
            .map(|(name, sha)| RemoteRef {
                name: name.clone(),
                sha: sha.clone(),
            })
            .collect())
    }

    async fn fetch_objects(
        &self,
        request: FetchRequest,
    ) -> Result<BoxStream<'static, Result<DecodedObject, TransportError>>, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.fetch_calls += 1;

        let mut objects = Vec::new();
        for sha in &request.want {
            if state.missing_objects.contains(sha) {
                continue;
            }
            match state.commits.get(sha) {
                Some(commit) => objects.push(Ok(DecodedObject::Commit(commit.clone()))),
                None => return Err(TransportError::Missing(sha.clone())),
            }
        }
        Ok(futures::stream::iter(objects).boxed())
    }
}

#[async_trait]
impl HistoryApi for FakeRemote {
    async fn history(
        &self,
        _remote: &RepoRemote,
        _token: &SecretString,
        root_sha: &str,
        page_size: u32,
        after: Option<&str>,
    ) -> Result<HistoryPage, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.history_calls += 1;
        if let Some(limit) = state.fail_history_after {
            if state.history_calls > limit {
                return Err(TransportError::Transient(
                    "injected history failure".to_string(),
                ));
            }
        }
        if !state.commits.contains_key(root_sha) {
            return Err(TransportError::Missing(root_sha.to_string()));
        }

        let all = Self::ancestors_of(&state, root_sha);
        let offset: usize = match after {
            Some(cursor) => cursor
                .parse()
                .map_err(|_| TransportError::Protocol(format!("bad cursor {cursor}")))?,
            None => 0,
        };
        let end = (offset + page_size as usize).min(all.len());
        let nodes = all[offset.min(all.len())..end].to_vec();
        let next_cursor = if end < all.len() {
            Some(end.to_string())
        } else {
            None
        };
        Ok(HistoryPage { nodes, next_cursor })
    }
}

#[async_trait]
impl CredentialProvider for FakeRemote {
    async fn bearer_token(&self, remote: &RepoRemote) -> Result<SecretString, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.tokens_issued += 1;
        Ok(SecretString::from(format!("token-{remote}")))
    }
}
