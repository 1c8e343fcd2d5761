use serde::{Deserialize, Serialize};

/// A commit as decoded off the wire, before it is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitObject {
    pub sha: String,
    pub parent_shas: Vec<String>,
    pub message: String,
}

/// One element of a bulk-fetch stream. Trees, blobs and annotated tags are
/// surfaced so callers can account for them, but only commits carry data.
#[derive(Debug, Clone)]
pub enum DecodedObject {
    Commit(CommitObject),
    Other { sha: String },
}

impl DecodedObject {
    pub fn sha(&self) -> &str {
        match self {
            DecodedObject::Commit(commit) => &commit.sha,
            DecodedObject::Other { sha } => sha,
        }
    }
}

/// One page of the paginated ancestor-history API.
#[derive(Debug, Clone, Default)]
pub struct HistoryPage {
    pub nodes: Vec<CommitObject>,
    /// Opaque resumption token; `None` on the final page.
    pub next_cursor: Option<String>,
}
