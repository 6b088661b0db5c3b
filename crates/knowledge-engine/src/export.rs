//! Store -> per-kind record collections.
//!
//! Optional and empty fields are left out, enums are written as their
//! underlying value and answer steps as plain mappings. Nodes are grouped by
//! kind and ordered by ID within a kind.

use crate::loader::Record;
use crate::model::Node;
use crate::schema::NodeKind;
use crate::store::KnowledgeStore;
use std::collections::BTreeMap;

pub fn record(node: &Node) -> serde_json::Result<Record> {
    serde_json::to_value(node)
}

/// Records of one kind, ordered by ID.
pub fn collection(store: &KnowledgeStore, kind: NodeKind) -> serde_json::Result<Vec<Record>> {
    let mut nodes: Vec<&Node> = store.all_of_type(kind).collect();
    nodes.sort_by(|a, b| a.id().cmp(b.id()));
    nodes.into_iter().map(record).collect()
}

/// Every non-empty kind mapped to its records.
pub fn collections(store: &KnowledgeStore) -> serde_json::Result<BTreeMap<NodeKind, Vec<Record>>> {
    let mut out = BTreeMap::new();
    for kind in NodeKind::ALL {
        let records = collection(store, kind)?;
        if !records.is_empty() {
            out.insert(kind, records);
        }
    }
    Ok(out)
}
