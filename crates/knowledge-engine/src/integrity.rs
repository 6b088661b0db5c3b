//! Referential integrity over declared reference fields.
//!
//! Two modes are provided on purpose: [`find_referrer`] stops at the first
//! referrer and gates deletes, while [`audit`] reports every broken reference
//! for diagnostics.

use crate::model::Node;
use crate::schema::NodeKind;
use crate::store::KnowledgeStore;
use serde::Serialize;
use std::fmt;

/// The node and field holding a reference to some target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Referrer {
    pub node_id: String,
    pub field: &'static str,
}

/// Finds the first node, ascending by ID, that references `target`.
///
/// The target itself is skipped, so a self-reference never blocks its own delete.
pub fn find_referrer(store: &KnowledgeStore, target: &str) -> Option<Referrer> {
    store
        .sorted_nodes()
        .into_iter()
        .filter(|node| node.id() != target)
        .find_map(|node| {
            node.references()
                .into_iter()
                .find(|r| r.targets.contains(target))
                .map(|r| Referrer {
                    node_id: node.id().to_string(),
                    field: r.field,
                })
        })
}

/// Every node referencing `target`, ascending by ID.
pub fn referrers(store: &KnowledgeStore, target: &str) -> Vec<Referrer> {
    let mut found = Vec::new();
    for node in store.sorted_nodes() {
        for r in node.references() {
            if r.targets.contains(target) {
                found.push(Referrer {
                    node_id: node.id().to_string(),
                    field: r.field,
                });
            }
        }
    }
    found
}

/// Rewrites `old` to `new` in every reference field of `node`.
pub fn rewrite_references(node: &mut Node, old: &str, new: &str) -> usize {
    node.references_mut()
        .iter_mut()
        .map(|r| r.slot.replace(old, new))
        .sum()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrokenReference {
    pub node_id: String,
    pub kind: NodeKind,
    pub field: &'static str,
    pub missing_id: String,
}

impl fmt::Display for BrokenReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Broken reference in {} -> {}: ID '{}' not found.",
            self.node_id, self.field, self.missing_id
        )
    }
}

/// Reports every reference pointing at an absent node.
///
/// Ordered by node ID, then field declaration order, then list position.
pub fn audit(store: &KnowledgeStore) -> Vec<BrokenReference> {
    let mut broken = Vec::new();
    for node in store.sorted_nodes() {
        for r in node.references() {
            for target in r.targets.ids() {
                if !store.contains(target) {
                    broken.push(BrokenReference {
                        node_id: node.id().to_string(),
                        kind: node.kind(),
                        field: r.field,
                        missing_id: target.to_string(),
                    });
                }
            }
        }
    }
    broken
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Definition, Example, Lecture};

    fn store() -> KnowledgeStore {
        let mut store = KnowledgeStore::new();
        store
            .add(Definition {
                id: "def-root".to_string(),
                term: "Root".to_string(),
                content: "...".to_string(),
            })
            .unwrap();
        for id in ["ex-b", "ex-a"] {
            store
                .add(Example {
                    id: id.to_string(),
                    name: id.to_string(),
                    content: "...".to_string(),
                    example_type: None,
                    related_definition_ids: vec!["def-root".to_string()],
                })
                .unwrap();
        }
        store
            .add(Lecture {
                id: "lec-1".to_string(),
                title: "Intro".to_string(),
                order: 0,
                course_id: Some("course-gone".to_string()),
                definition_ids: vec!["def-root".to_string(), "def-gone".to_string()],
                tool_ids: Vec::new(),
                example_ids: vec!["ex-a".to_string()],
            })
            .unwrap();
        store
    }

    #[test]
    fn test_find_referrer_is_deterministic() {
        let store = store();
        let referrer = find_referrer(&store, "def-root").unwrap();
        assert_eq!(referrer.node_id, "ex-a");
        assert_eq!(referrer.field, "related_definition_ids");

        assert!(find_referrer(&store, "lec-1").is_none());
    }

    #[test]
    fn test_referrers_lists_all() {
        let store = store();
        let ids: Vec<_> = referrers(&store, "def-root")
            .into_iter()
            .map(|r| r.node_id)
            .collect();
        assert_eq!(ids, ["ex-a", "ex-b", "lec-1"]);
    }

    #[test]
    fn test_audit_reports_every_broken_reference() {
        let store = store();
        let broken = audit(&store);
        assert_eq!(broken.len(), 2);
        assert_eq!(broken[0].field, "course_id");
        assert_eq!(broken[0].missing_id, "course-gone");
        assert_eq!(broken[1].field, "definition_ids");
        assert_eq!(
            broken[1].to_string(),
            "Broken reference in lec-1 -> definition_ids: ID 'def-gone' not found."
        );
    }
}
