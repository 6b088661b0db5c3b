use examgraph_core::integrity;
use examgraph_core::{DataDir, NodeKind, StoreError};
use std::fs;

const QUESTIONS: &str = r#"
- id: qn-limit-proof
  year: 2023
  lecturer: Prof. Cauchy
  topic: Analysis
  given: Let $a_n = 1/n$.
  goal: Prove that $a_n -> 0$.
  tools: tool-eps, tool-squeeze
  common_mistakes: [mis-order]
  answer_steps:
    - type: Proof
      title: Choose N
      content: Take $N > 1/epsilon$.
    - title: missing type and content
- id: qn-broken
  year: 2023
  lecturer: Prof. Cauchy
"#;

const DEFINITIONS: &str = r#"
- id: def-limit
  name: Limit
  content: A sequence converges if ...
- id: def-empty-term
  content: To be written.
"#;

const TOOLS: &str = r#"
- id: tool-eps
  short_name: Epsilon-N
  usage: Pick N from epsilon.
- id: tool-squeeze
  name: Squeeze
  statement: If a <= b <= c ...
"#;

const MISTAKES: &str = r#"
- id: mis-order
  description: Choosing N before epsilon
  remedy: Fix epsilon first.
  severity: critical
"#;

const LECTURES: &str = r#"
- id: lec-1
  name: Sequences
  order: 1
  definition_ids: [def-limit]
  tool_ids: [tool-eps]
"#;

fn seed(dir: &std::path::Path) -> DataDir {
    let data = DataDir::new(dir);
    fs::write(data.path_for(NodeKind::Question), QUESTIONS).unwrap();
    fs::write(data.path_for(NodeKind::Definition), DEFINITIONS).unwrap();
    fs::write(data.path_for(NodeKind::Tool), TOOLS).unwrap();
    fs::write(data.path_for(NodeKind::Mistake), MISTAKES).unwrap();
    fs::write(data.path_for(NodeKind::Lecture), LECTURES).unwrap();
    data
}

#[test]
fn test_load_normalizes_legacy_records() {
    let dir = tempfile::tempdir().unwrap();
    let data = seed(dir.path());

    let (store, report) = data.load().unwrap();
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].id.as_deref(), Some("qn-broken"));
    assert_eq!(store.len(), 7);

    let question = store.get("qn-limit-proof").unwrap().as_question().unwrap();
    assert_eq!(question.to_prove, "Prove that $a_n -> 0$.");
    assert_eq!(question.tool_ids, ["tool-eps", "tool-squeeze"]);
    assert_eq!(question.mistake_ids, ["mis-order"]);
    assert_eq!(question.answer_steps.len(), 1);

    assert!(integrity::audit(&store).is_empty());
}

#[test]
fn test_save_then_load_is_stable() {
    let dir = tempfile::tempdir().unwrap();
    let data = seed(dir.path());
    let (store, _) = data.load().unwrap();

    let out = tempfile::tempdir().unwrap();
    let copy = DataDir::new(out.path());
    copy.save(&store).unwrap();
    let (reloaded, report) = copy.load().unwrap();
    assert!(report.is_clean());
    assert_eq!(reloaded.ids(), store.ids());
    for id in store.ids() {
        assert_eq!(reloaded.get(id), store.get(id), "{id} changed across save/load");
    }

    let saved = fs::read_to_string(copy.path_for(NodeKind::Tool)).unwrap();
    assert!(saved.contains("short_name: Squeeze"));
    assert!(!saved.contains("statement"));
    assert!(!copy.path_for(NodeKind::Course).exists());
}

#[test]
fn test_delete_is_blocked_until_referrers_are_gone() {
    let dir = tempfile::tempdir().unwrap();
    let data = seed(dir.path());
    let (mut store, _) = data.load().unwrap();

    let err = store.delete("tool-eps").unwrap_err();
    assert_eq!(
        err,
        StoreError::ReferentialIntegrity {
            id: "tool-eps".to_string(),
            referrer: "lec-1".to_string(),
            field: "tool_ids",
        }
    );

    store.delete("lec-1").unwrap();
    let err = store.delete("tool-eps").unwrap_err();
    assert!(matches!(err, StoreError::ReferentialIntegrity { ref referrer, .. } if referrer == "qn-limit-proof"));

    store.delete("qn-limit-proof").unwrap();
    store.delete("tool-eps").unwrap();
    data.save(&store).unwrap();

    let (reloaded, _) = data.load().unwrap();
    assert!(!reloaded.contains("tool-eps"));
    assert!(!data.path_for(NodeKind::Lecture).exists());
}

#[test]
fn test_rename_rewrites_persisted_references() {
    let dir = tempfile::tempdir().unwrap();
    let data = seed(dir.path());
    let (mut store, _) = data.load().unwrap();

    let rewritten = store.rename_id("def-limit", "def-sequence-limit").unwrap();
    assert_eq!(rewritten, 1);
    data.save(&store).unwrap();

    let lectures = fs::read_to_string(data.path_for(NodeKind::Lecture)).unwrap();
    assert!(lectures.contains("def-sequence-limit"));
    let (reloaded, _) = data.load().unwrap();
    assert!(integrity::audit(&reloaded).is_empty());
    assert!(reloaded.contains("def-sequence-limit"));
    assert!(!reloaded.contains("def-limit"));
}

#[test]
fn test_schema_audit_flags_unknown_fields() {
    let dir = tempfile::tempdir().unwrap();
    let data = seed(dir.path());
    fs::write(
        data.path_for(NodeKind::Example),
        "- id: ex-1\n  name: Harmonic\n  content: Diverges.\n  difficulty: hard\n",
    )
    .unwrap();

    let audits = data.audit().unwrap();
    let example = audits.iter().find(|a| a.kind == NodeKind::Example).unwrap();
    assert_eq!(example.unknown_fields, ["difficulty"]);
    assert!(example.error.is_none());

    let broken = audits
        .iter()
        .find(|a| a.id.as_deref() == Some("qn-broken"))
        .unwrap();
    assert!(broken.error.is_some());
}
