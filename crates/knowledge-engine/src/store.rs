use crate::error::StoreError;
use crate::integrity;
use crate::model::{Node, Question};
use crate::schema::NodeKind;
use std::collections::HashMap;
use tracing::debug;

/// The authoritative in-memory knowledge graph.
///
/// `nodes` is the primary ID -> node mapping spanning every kind; `by_kind`
/// keeps per-kind ID lists in insertion order for type-scoped iteration.
/// All mutations go through the methods below, which either apply fully or
/// return an error with the store untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnowledgeStore {
    nodes: HashMap<String, Node>,
    by_kind: HashMap<NodeKind, Vec<String>>,
}

impl KnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Like [`get`](Self::get) but reports a missing ID as [`StoreError::NotFound`].
    pub fn require(&self, id: &str) -> Result<&Node, StoreError> {
        self.get(id).ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Nodes of one kind in insertion order.
    pub fn all_of_type(&self, kind: NodeKind) -> impl Iterator<Item = &Node> + '_ {
        self.by_kind
            .get(&kind)
            .into_iter()
            .flatten()
            .filter_map(|id| self.nodes.get(id))
    }

    pub fn count_of_type(&self, kind: NodeKind) -> usize {
        self.by_kind.get(&kind).map(|ids| ids.len()).unwrap_or(0)
    }

    pub fn questions(&self) -> impl Iterator<Item = &Question> + '_ {
        self.all_of_type(NodeKind::Question).filter_map(Node::as_question)
    }

    /// Every node, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Node> + '_ {
        self.nodes.values()
    }

    /// Every node, ascending by ID.
    pub fn sorted_nodes(&self) -> Vec<&Node> {
        let mut nodes: Vec<&Node> = self.nodes.values().collect();
        nodes.sort_by(|a, b| a.id().cmp(b.id()));
        nodes
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn add(&mut self, node: impl Into<Node>) -> Result<(), StoreError> {
        let node = node.into();
        let id = node.id().to_string();
        if id.trim().is_empty() {
            return Err(StoreError::InvalidId(id));
        }
        if self.nodes.contains_key(&id) {
            return Err(StoreError::DuplicateId(id));
        }

        self.by_kind.entry(node.kind()).or_default().push(id.clone());
        self.nodes.insert(id, node);
        Ok(())
    }

    /// Removes a node nobody else references and returns it.
    pub fn delete(&mut self, id: &str) -> Result<Node, StoreError> {
        if !self.nodes.contains_key(id) {
            return Err(StoreError::NotFound(id.to_string()));
        }
        if let Some(referrer) = integrity::find_referrer(self, id) {
            return Err(StoreError::ReferentialIntegrity {
                id: id.to_string(),
                referrer: referrer.node_id,
                field: referrer.field,
            });
        }

        let node = self
            .nodes
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if let Some(ids) = self.by_kind.get_mut(&node.kind()) {
            ids.retain(|existing| existing != id);
        }
        debug!(id, kind = %node.kind(), "deleted node");
        Ok(node)
    }

    /// Moves a node to a new ID and rewrites every reference to the old one.
    ///
    /// Returns how many reference slots were rewritten.
    pub fn rename_id(&mut self, old_id: &str, new_id: &str) -> Result<usize, StoreError> {
        if !self.nodes.contains_key(old_id) {
            return Err(StoreError::NotFound(old_id.to_string()));
        }
        if new_id.trim().is_empty() {
            return Err(StoreError::InvalidId(new_id.to_string()));
        }
        if self.nodes.contains_key(new_id) {
            return Err(StoreError::DuplicateId(new_id.to_string()));
        }

        // Nothing below can fail once the checks above have passed.
        let Some(mut node) = self.nodes.remove(old_id) else {
            return Err(StoreError::NotFound(old_id.to_string()));
        };
        let kind = node.kind();
        node.set_id(new_id.to_string());
        self.nodes.insert(new_id.to_string(), node);

        if let Some(slot) = self
            .by_kind
            .get_mut(&kind)
            .and_then(|ids| ids.iter_mut().find(|id| id.as_str() == old_id))
        {
            *slot = new_id.to_string();
        }

        let rewritten: usize = self
            .nodes
            .values_mut()
            .map(|node| integrity::rewrite_references(node, old_id, new_id))
            .sum();

        debug!(old_id, new_id, rewritten, "renamed node");
        Ok(rewritten)
    }

    /// Swaps in a new version of an existing node. The kind must not change.
    pub fn replace(&mut self, node: impl Into<Node>) -> Result<Node, StoreError> {
        let node = node.into();
        let Some(existing) = self.nodes.get_mut(node.id()) else {
            return Err(StoreError::NotFound(node.id().to_string()));
        };
        if existing.kind() != node.kind() {
            return Err(StoreError::KindMismatch {
                id: node.id().to_string(),
                existing: existing.kind(),
                requested: node.kind(),
            });
        }
        Ok(std::mem::replace(existing, node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Definition, Example, Lecture, Tool};

    fn definition(id: &str) -> Definition {
        Definition {
            id: id.to_string(),
            term: "Root".to_string(),
            content: "...".to_string(),
        }
    }

    fn example(id: &str, related: &[&str]) -> Example {
        Example {
            id: id.to_string(),
            name: "Child".to_string(),
            content: "...".to_string(),
            example_type: None,
            related_definition_ids: related.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn tool(id: &str) -> Tool {
        Tool {
            id: id.to_string(),
            short_name: "Squeeze".to_string(),
            description: None,
            usage: None,
        }
    }

    #[test]
    fn test_add_rejects_duplicates_across_kinds() {
        let mut store = KnowledgeStore::new();
        store.add(definition("shared")).unwrap();

        let err = store.add(tool("shared")).unwrap_err();
        assert_eq!(err, StoreError::DuplicateId("shared".to_string()));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("shared").unwrap().kind(), NodeKind::Definition);
        assert_eq!(store.count_of_type(NodeKind::Tool), 0);
    }

    #[test]
    fn test_add_rejects_blank_id() {
        let mut store = KnowledgeStore::new();
        assert!(matches!(store.add(definition("  ")), Err(StoreError::InvalidId(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_all_of_type_keeps_insertion_order() {
        let mut store = KnowledgeStore::new();
        for id in ["def-c", "def-a", "def-b"] {
            store.add(definition(id)).unwrap();
        }
        store.add(tool("tool-a")).unwrap();

        let ids: Vec<_> = store.all_of_type(NodeKind::Definition).map(Node::id).collect();
        assert_eq!(ids, ["def-c", "def-a", "def-b"]);
        assert_eq!(store.ids(), ["def-a", "def-b", "def-c", "tool-a"]);
    }

    #[test]
    fn test_delete_missing_is_not_found() {
        let mut store = KnowledgeStore::new();
        assert_eq!(
            store.delete("ghost").unwrap_err(),
            StoreError::NotFound("ghost".to_string())
        );
    }

    #[test]
    fn test_delete_blocked_then_allowed() {
        let mut store = KnowledgeStore::new();
        store.add(definition("def-root")).unwrap();
        store.add(example("ex-child", &["def-root"])).unwrap();
        let before = store.clone();

        let err = store.delete("def-root").unwrap_err();
        assert_eq!(
            err,
            StoreError::ReferentialIntegrity {
                id: "def-root".to_string(),
                referrer: "ex-child".to_string(),
                field: "related_definition_ids",
            }
        );
        assert!(err.to_string().contains("referenced by node 'ex-child'"));
        assert_eq!(store.len(), before.len());
        assert_eq!(store.get("def-root"), before.get("def-root"));

        store.delete("ex-child").unwrap();
        store.delete("def-root").unwrap();
        assert!(store.get("ex-child").is_none());
        assert!(store.get("def-root").is_none());
        assert_eq!(store.count_of_type(NodeKind::Definition), 0);
    }

    #[test]
    fn test_self_reference_does_not_block_delete() {
        let mut store = KnowledgeStore::new();
        store.add(example("ex-loop", &["ex-loop"])).unwrap();
        store.delete("ex-loop").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_rename_cascades() {
        let mut store = KnowledgeStore::new();
        store.add(definition("def-root")).unwrap();
        store.add(example("ex-child", &["def-root", "def-other", "def-root"])).unwrap();

        let rewritten = store.rename_id("def-root", "def-new").unwrap();
        assert_eq!(rewritten, 2);
        assert!(store.get("def-root").is_none());
        assert_eq!(store.get("def-new").unwrap().id(), "def-new");

        let Some(Node::Example(ex)) = store.get("ex-child") else {
            panic!("example missing");
        };
        assert_eq!(ex.related_definition_ids, ["def-new", "def-other", "def-new"]);

        let ids: Vec<_> = store.all_of_type(NodeKind::Definition).map(Node::id).collect();
        assert_eq!(ids, ["def-new"]);
    }

    #[test]
    fn test_rename_rewrites_self_reference() {
        let mut store = KnowledgeStore::new();
        store.add(example("ex-loop", &["ex-loop"])).unwrap();
        store.rename_id("ex-loop", "ex-ring").unwrap();

        let Some(Node::Example(ex)) = store.get("ex-ring") else {
            panic!("example missing");
        };
        assert_eq!(ex.related_definition_ids, ["ex-ring"]);
    }

    #[test]
    fn test_rename_conflict_leaves_both_nodes() {
        let mut store = KnowledgeStore::new();
        store.add(definition("def-a")).unwrap();
        store.add(definition("def-b")).unwrap();
        store.add(example("ex", &["def-a"])).unwrap();
        let before = store.clone();

        let err = store.rename_id("def-a", "def-b").unwrap_err();
        assert_eq!(err, StoreError::DuplicateId("def-b".to_string()));
        for id in ["def-a", "def-b", "ex"] {
            assert_eq!(store.get(id), before.get(id));
        }
    }

    #[test]
    fn test_rename_missing_source() {
        let mut store = KnowledgeStore::new();
        assert_eq!(
            store.rename_id("nope", "new").unwrap_err(),
            StoreError::NotFound("nope".to_string())
        );
    }

    #[test]
    fn test_rename_updates_single_reference() {
        let mut store = KnowledgeStore::new();
        store
            .add(crate::model::Course {
                id: "course-1".to_string(),
                name: "Analysis I".to_string(),
                definition_sequence: Vec::new(),
                tool_sequence: Vec::new(),
                example_sequence: Vec::new(),
            })
            .unwrap();
        store
            .add(Lecture {
                id: "lec-1".to_string(),
                title: "Sequences".to_string(),
                order: 1,
                course_id: Some("course-1".to_string()),
                definition_ids: Vec::new(),
                tool_ids: Vec::new(),
                example_ids: Vec::new(),
            })
            .unwrap();

        store.rename_id("course-1", "analysis-1").unwrap();
        let Some(Node::Lecture(lecture)) = store.get("lec-1") else {
            panic!("lecture missing");
        };
        assert_eq!(lecture.course_id.as_deref(), Some("analysis-1"));
    }

    #[test]
    fn test_replace_keeps_kind() {
        let mut store = KnowledgeStore::new();
        store.add(definition("def-a")).unwrap();

        let mut updated = definition("def-a");
        updated.term = "Limit".to_string();
        let old = store.replace(updated).unwrap();
        assert_eq!(old.label(), "Root");
        assert_eq!(store.get("def-a").unwrap().label(), "Limit");

        let err = store.replace(tool("def-a")).unwrap_err();
        assert!(matches!(err, StoreError::KindMismatch { .. }));
        assert!(matches!(store.replace(tool("tool-x")), Err(StoreError::NotFound(_))));
    }

    mod sequences {
        use super::*;
        use proptest::prelude::*;
        use proptest::test_runner::TestCaseError;
        use std::collections::HashSet;

        #[derive(Debug, Clone)]
        enum Op {
            AddDefinition(String),
            AddExample(String, String),
            AddTool(String),
            Delete(String),
            Rename(String, String),
        }

        fn arb_id() -> impl Strategy<Value = String> {
            prop::sample::select(vec!["a", "b", "c", "d", " "]).prop_map(str::to_string)
        }

        fn arb_op() -> impl Strategy<Value = Op> {
            prop_oneof![
                arb_id().prop_map(Op::AddDefinition),
                (arb_id(), arb_id()).prop_map(|(id, target)| Op::AddExample(id, target)),
                arb_id().prop_map(Op::AddTool),
                arb_id().prop_map(Op::Delete),
                (arb_id(), arb_id()).prop_map(|(old, new)| Op::Rename(old, new)),
            ]
        }

        fn apply(store: &mut KnowledgeStore, op: &Op) -> Result<(), StoreError> {
            match op {
                Op::AddDefinition(id) => store.add(definition(id)),
                Op::AddExample(id, target) => store.add(example(id, &[target.as_str()])),
                Op::AddTool(id) => store.add(tool(id)),
                Op::Delete(id) => store.delete(id).map(|_| ()),
                Op::Rename(old, new) => store.rename_id(old, new).map(|_| ()),
            }
        }

        fn check_consistent(store: &KnowledgeStore) -> Result<(), TestCaseError> {
            let listed: Vec<&String> = store.by_kind.values().flatten().collect();
            prop_assert_eq!(listed.len(), store.nodes.len());
            let unique: HashSet<&String> = listed.iter().copied().collect();
            prop_assert_eq!(unique.len(), listed.len(), "id listed under more than one kind");
            for (key, node) in &store.nodes {
                prop_assert_eq!(key.as_str(), node.id());
                prop_assert!(store
                    .by_kind
                    .get(&node.kind())
                    .is_some_and(|ids| ids.contains(key)));
            }
            Ok(())
        }

        proptest! {
            #[test]
            fn ids_stay_unique_for_any_sequence(ops in prop::collection::vec(arb_op(), 1..40)) {
                let mut store = KnowledgeStore::new();
                for op in &ops {
                    let before = store.clone();
                    if apply(&mut store, op).is_err() {
                        prop_assert_eq!(&store, &before, "rejected {:?} changed the store", op);
                    }
                    check_consistent(&store)?;
                }
            }
        }
    }
}
