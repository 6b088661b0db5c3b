//! Record -> node conversion.
//!
//! A record is a string-keyed mapping as read from a per-kind collection.
//! Alternate field names from older revisions of the data are accepted here
//! and folded into the canonical shape; they never reach the model.
//!
//! Malformed records are skipped with a diagnostic. Duplicate IDs are fatal.

use crate::error::{LoadError, MalformedRecord};
use crate::model::{
    AnswerStep, Course, Definition, Example, ExampleType, Homework, Lecture, Mistake, Node,
    Question, Severity, Tool, Tutorial,
};
use crate::schema::NodeKind;
use crate::store::KnowledgeStore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub type Record = Value;

pub const UNTITLED_DEFINITION: &str = "Untitled Definition";
pub const UNTITLED_TOOL: &str = "Untitled Tool";

/// Outcome of a bulk load: what went in, and what was skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub loaded: BTreeMap<NodeKind, usize>,
    pub skipped: Vec<MalformedRecord>,
}

impl LoadReport {
    pub fn total_loaded(&self) -> usize {
        self.loaded.values().sum()
    }

    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }

    pub fn summary(&self) -> String {
        let per_kind = self
            .loaded
            .iter()
            .map(|(kind, count)| format!("{count} {}", kind.collection()))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "loaded {} nodes ({}), skipped {} malformed records",
            self.total_loaded(),
            if per_kind.is_empty() { "none".to_string() } else { per_kind },
            self.skipped.len()
        )
    }
}

/// Converts a single record into a node of `kind`.
///
/// `index` is the record's position in its collection and only feeds diagnostics.
pub fn node_from_record(
    kind: NodeKind,
    index: usize,
    record: &Record,
) -> Result<Node, MalformedRecord> {
    let malformed = |id: Option<String>, reason: &str| MalformedRecord {
        kind,
        index,
        id,
        reason: reason.to_string(),
    };

    let Some(fields) = record.as_object() else {
        return Err(malformed(None, "record is not a mapping"));
    };
    let id = match fields.get("id") {
        Some(Value::String(id)) if !id.trim().is_empty() => id.clone(),
        Some(Value::String(_)) => return Err(malformed(None, "id is blank")),
        Some(_) => return Err(malformed(None, "id is not a string")),
        None => return Err(malformed(None, "missing field `id`")),
    };

    let built = match kind {
        NodeKind::Question => decode::<QuestionRecord>(record).and_then(QuestionRecord::build),
        NodeKind::Definition => decode::<DefinitionRecord>(record).map(DefinitionRecord::build),
        NodeKind::Tool => decode::<ToolRecord>(record).map(ToolRecord::build),
        NodeKind::Mistake => decode::<MistakeRecord>(record).and_then(MistakeRecord::build),
        NodeKind::Example => decode::<ExampleRecord>(record).and_then(ExampleRecord::build),
        NodeKind::Lecture => decode::<LectureRecord>(record).and_then(LectureRecord::build),
        NodeKind::Tutorial => decode::<TutorialRecord>(record).map(TutorialRecord::build),
        NodeKind::Course => decode::<CourseRecord>(record).map(CourseRecord::build),
        NodeKind::Homework => decode::<HomeworkRecord>(record).map(HomeworkRecord::build),
    };
    built.map_err(|reason| malformed(Some(id), &reason))
}

/// Converts a whole collection, skipping (and logging) malformed records.
pub fn load_collection(kind: NodeKind, records: &[Record]) -> (Vec<Node>, Vec<MalformedRecord>) {
    let mut nodes = Vec::with_capacity(records.len());
    let mut skipped = Vec::new();
    for (index, record) in records.iter().enumerate() {
        match node_from_record(kind, index, record) {
            Ok(node) => nodes.push(node),
            Err(e) => {
                warn!("{e}");
                skipped.push(e);
            }
        }
    }
    (nodes, skipped)
}

/// Converts a collection and inserts each node into `store`.
pub fn load_into(
    store: &mut KnowledgeStore,
    kind: NodeKind,
    records: &[Record],
    report: &mut LoadReport,
) -> Result<(), LoadError> {
    let (nodes, skipped) = load_collection(kind, records);
    let count = nodes.len();
    for node in nodes {
        store
            .add(node)
            .map_err(|source| LoadError::Store { kind, source })?;
    }
    debug!(kind = %kind, loaded = count, skipped = skipped.len(), "loaded collection");
    *report.loaded.entry(kind).or_default() += count;
    report.skipped.extend(skipped);
    Ok(())
}

/// Loads every collection into `store`, in the order given.
pub fn load_all<I>(store: &mut KnowledgeStore, collections: I) -> Result<LoadReport, LoadError>
where
    I: IntoIterator<Item = (NodeKind, Vec<Record>)>,
{
    let mut report = LoadReport::default();
    for (kind, records) in collections {
        load_into(store, kind, &records, &mut report)?;
    }
    Ok(report)
}

/// Schema conformance of one input record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordAudit {
    pub kind: NodeKind,
    pub index: usize,
    pub id: Option<String>,
    /// Keys that are neither canonical fields nor accepted aliases.
    pub unknown_fields: Vec<String>,
    /// Why the record would be skipped on load, if it would be.
    pub error: Option<String>,
}

/// Returns the records of a collection that deviate from the schema.
pub fn audit_records(kind: NodeKind, records: &[Record]) -> Vec<RecordAudit> {
    records
        .iter()
        .enumerate()
        .filter_map(|(index, record)| {
            let mut unknown_fields: Vec<String> = record
                .as_object()
                .map(|fields| {
                    fields
                        .keys()
                        .filter(|key| !kind.accepts_key(key))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            unknown_fields.sort();
            let error = node_from_record(kind, index, record).err().map(|e| e.reason);
            if unknown_fields.is_empty() && error.is_none() {
                return None;
            }
            Some(RecordAudit {
                kind,
                index,
                id: record.get("id").and_then(Value::as_str).map(str::to_string),
                unknown_fields,
                error,
            })
        })
        .collect()
}

fn decode<T: DeserializeOwned>(record: &Record) -> Result<T, String> {
    T::deserialize(record).map_err(|e| e.to_string())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// A blank canonical value falls through to the alias; blank is kept only if both are.
fn canonical_or_alias(canonical: Option<String>, alias: Option<String>) -> Option<String> {
    match (canonical, alias) {
        (Some(c), _) if !c.trim().is_empty() => Some(c),
        (_, Some(a)) if !a.trim().is_empty() => Some(a),
        (c, a) => c.or(a),
    }
}

/// Accepts a list of IDs or a single comma-separated string; blank entries are dropped.
fn id_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(joined)) => Ok(Some(
            joined
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )),
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(id) if id.trim().is_empty() => None,
                Value::String(id) => Some(Ok(id)),
                other => Some(Err(D::Error::custom(format!(
                    "expected an id string, found {other}"
                )))),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Some(other) => Err(D::Error::custom(format!(
            "expected a list of ids, found {other}"
        ))),
    }
}

fn answer_steps(owner: &str, raw: Option<Vec<Value>>) -> Vec<AnswerStep> {
    raw.unwrap_or_default()
        .into_iter()
        .enumerate()
        .filter_map(|(position, step)| match AnswerStep::deserialize(&step) {
            Ok(step) => Some(step),
            Err(e) => {
                warn!(node = owner, step = position, error = %e, "skipping malformed answer step");
                None
            }
        })
        .collect()
}

#[derive(Deserialize)]
struct QuestionRecord {
    id: String,
    year: i32,
    lecturer: String,
    topic: String,
    given: String,
    to_prove: Option<String>,
    goal: Option<String>,
    hint: Option<String>,
    image: Option<String>,
    answer_steps: Option<Vec<Value>>,
    #[serde(default, deserialize_with = "id_list")]
    tool_ids: Option<Vec<String>>,
    #[serde(default, deserialize_with = "id_list")]
    tools: Option<Vec<String>>,
    #[serde(default, deserialize_with = "id_list")]
    mistake_ids: Option<Vec<String>>,
    #[serde(default, deserialize_with = "id_list")]
    common_mistakes: Option<Vec<String>>,
}

impl QuestionRecord {
    fn build(self) -> Result<Node, String> {
        let to_prove =
            canonical_or_alias(self.to_prove, self.goal).ok_or("missing field `to_prove`")?;
        let answer_steps = answer_steps(&self.id, self.answer_steps);
        Ok(Question {
            id: self.id,
            year: self.year,
            lecturer: self.lecturer,
            topic: self.topic,
            given: self.given,
            to_prove,
            hint: non_blank(self.hint),
            image: non_blank(self.image),
            answer_steps,
            tool_ids: self.tool_ids.or(self.tools).unwrap_or_default(),
            mistake_ids: self.mistake_ids.or(self.common_mistakes).unwrap_or_default(),
        }
        .into())
    }
}

#[derive(Deserialize)]
struct DefinitionRecord {
    id: String,
    content: String,
    term: Option<String>,
    name: Option<String>,
}

impl DefinitionRecord {
    fn build(self) -> Node {
        let term = non_blank(self.term)
            .or(non_blank(self.name))
            .unwrap_or_else(|| UNTITLED_DEFINITION.to_string());
        Definition {
            id: self.id,
            term,
            content: self.content,
        }
        .into()
    }
}

#[derive(Deserialize)]
struct ToolRecord {
    id: String,
    short_name: Option<String>,
    name: Option<String>,
    description: Option<String>,
    statement: Option<String>,
    usage: Option<String>,
}

impl ToolRecord {
    fn build(self) -> Node {
        let short_name = non_blank(self.short_name)
            .or(non_blank(self.name))
            .unwrap_or_else(|| UNTITLED_TOOL.to_string());
        Tool {
            id: self.id,
            short_name,
            description: non_blank(self.description).or(non_blank(self.statement)),
            usage: non_blank(self.usage),
        }
        .into()
    }
}

#[derive(Deserialize)]
struct MistakeRecord {
    id: String,
    description: String,
    correction: Option<String>,
    remedy: Option<String>,
    severity: Option<Severity>,
}

impl MistakeRecord {
    fn build(self) -> Result<Node, String> {
        let correction = non_blank(self.correction)
            .or(non_blank(self.remedy))
            .ok_or("missing field `correction`")?;
        Ok(Mistake {
            id: self.id,
            description: self.description,
            correction,
            severity: self.severity,
        }
        .into())
    }
}

#[derive(Deserialize)]
struct ExampleRecord {
    id: String,
    name: Option<String>,
    title: Option<String>,
    content: String,
    #[serde(rename = "type")]
    example_type: Option<ExampleType>,
    #[serde(default, deserialize_with = "id_list")]
    related_definition_ids: Option<Vec<String>>,
}

impl ExampleRecord {
    fn build(self) -> Result<Node, String> {
        let name = canonical_or_alias(self.name, self.title).ok_or("missing field `name`")?;
        Ok(Example {
            id: self.id,
            name,
            content: self.content,
            example_type: self.example_type,
            related_definition_ids: self.related_definition_ids.unwrap_or_default(),
        }
        .into())
    }
}

#[derive(Deserialize)]
struct LectureRecord {
    id: String,
    title: Option<String>,
    name: Option<String>,
    order: Option<i64>,
    course_id: Option<String>,
    #[serde(default, deserialize_with = "id_list")]
    definition_ids: Option<Vec<String>>,
    #[serde(default, deserialize_with = "id_list")]
    tool_ids: Option<Vec<String>>,
    #[serde(default, deserialize_with = "id_list")]
    example_ids: Option<Vec<String>>,
}

impl LectureRecord {
    fn build(self) -> Result<Node, String> {
        let title = canonical_or_alias(self.title, self.name).ok_or("missing field `title`")?;
        Ok(Lecture {
            id: self.id,
            title,
            order: self.order.unwrap_or_default(),
            course_id: non_blank(self.course_id),
            definition_ids: self.definition_ids.unwrap_or_default(),
            tool_ids: self.tool_ids.unwrap_or_default(),
            example_ids: self.example_ids.unwrap_or_default(),
        }
        .into())
    }
}

#[derive(Deserialize)]
struct TutorialRecord {
    id: String,
    title: Option<String>,
    week: Option<i32>,
    content: Option<String>,
    order: Option<i64>,
    lecture_id: Option<String>,
    #[serde(default, deserialize_with = "id_list")]
    example_ids: Option<Vec<String>>,
    #[serde(default, deserialize_with = "id_list")]
    question_ids: Option<Vec<String>>,
}

impl TutorialRecord {
    fn build(self) -> Node {
        Tutorial {
            id: self.id,
            title: non_blank(self.title),
            week: self.week,
            content: non_blank(self.content),
            order: self.order.unwrap_or_default(),
            lecture_id: non_blank(self.lecture_id),
            example_ids: self.example_ids.unwrap_or_default(),
            question_ids: self.question_ids.unwrap_or_default(),
        }
        .into()
    }
}

#[derive(Deserialize)]
struct CourseRecord {
    id: String,
    name: String,
    #[serde(default, deserialize_with = "id_list")]
    definition_sequence: Option<Vec<String>>,
    #[serde(default, deserialize_with = "id_list")]
    tool_sequence: Option<Vec<String>>,
    #[serde(default, deserialize_with = "id_list")]
    example_sequence: Option<Vec<String>>,
}

impl CourseRecord {
    fn build(self) -> Node {
        Course {
            id: self.id,
            name: self.name,
            definition_sequence: self.definition_sequence.unwrap_or_default(),
            tool_sequence: self.tool_sequence.unwrap_or_default(),
            example_sequence: self.example_sequence.unwrap_or_default(),
        }
        .into()
    }
}

#[derive(Deserialize)]
struct HomeworkRecord {
    id: String,
    title: String,
    week: i32,
    content: Option<String>,
    answer_steps: Option<Vec<Value>>,
    #[serde(default, deserialize_with = "id_list")]
    tool_ids: Option<Vec<String>>,
    #[serde(default, deserialize_with = "id_list")]
    mistake_ids: Option<Vec<String>>,
}

impl HomeworkRecord {
    fn build(self) -> Node {
        let answer_steps = answer_steps(&self.id, self.answer_steps);
        Homework {
            id: self.id,
            title: self.title,
            week: self.week,
            content: non_blank(self.content),
            answer_steps,
            tool_ids: self.tool_ids.unwrap_or_default(),
            mistake_ids: self.mistake_ids.unwrap_or_default(),
        }
        .into()
    }
}
