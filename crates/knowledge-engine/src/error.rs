use crate::schema::NodeKind;
use serde::Serialize;

/// Rejection of a store mutation. The store is unchanged whenever one is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("node with id '{0}' already exists")]
    DuplicateId(String),

    #[error("node with id '{0}' not found")]
    NotFound(String),

    #[error("node '{id}' is referenced by node '{referrer}' (field '{field}')")]
    ReferentialIntegrity {
        id: String,
        referrer: String,
        field: &'static str,
    },

    #[error("invalid node id {0:?}: ids must not be blank")]
    InvalidId(String),

    #[error("node '{id}' is a {existing}, cannot replace it with a {requested}")]
    KindMismatch {
        id: String,
        existing: NodeKind,
        requested: NodeKind,
    },
}

/// A single input record that could not be turned into a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("skipping {kind} record #{index} (id: {}): {reason}", .id.as_deref().unwrap_or("<none>"))]
pub struct MalformedRecord {
    pub kind: NodeKind,
    pub index: usize,
    pub id: Option<String>,
    pub reason: String,
}

/// Fatal loader failure. Field-level problems never surface here.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("failed to load {kind} collection: {source}")]
    Store {
        kind: NodeKind,
        #[source]
        source: StoreError,
    },
}
