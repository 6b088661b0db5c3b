//! Node types of the knowledge graph.
//!
//! Relationships are plain ID values held in reference fields. Every node type
//! exposes those fields through [`KnowledgeNode::references`] so the integrity
//! engine can walk them without knowing the concrete type.

use crate::schema::NodeKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Minor,
    Moderate,
    Critical,
}

/// Category tag of an [`Example`]. Serialized as its underlying value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExampleType {
    #[serde(rename = "calculation")]
    Calculation,
    #[serde(rename = "proof")]
    Proof,
    #[serde(rename = "conceptual")]
    Conceptual,
    #[serde(rename = "code")]
    Code,
    #[serde(rename = "Standard")]
    Standard,
    #[serde(rename = "Counter-Example")]
    CounterExample,
    #[serde(rename = "Non-Example")]
    NonExample,
}

/// One step of a worked answer. Owned by its question or homework.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerStep {
    #[serde(rename = "type")]
    pub step_type: String,
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Question {
    pub id: String,
    pub year: i32,
    pub lecturer: String,
    pub topic: String,
    pub given: String,
    pub to_prove: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub answer_steps: Vec<AnswerStep>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_ids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mistake_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Definition {
    pub id: String,
    pub term: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tool {
    pub id: String,
    pub short_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mistake {
    pub id: String,
    pub description: String,
    pub correction: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Example {
    pub id: String,
    pub name: String,
    pub content: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub example_type: Option<ExampleType>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub related_definition_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lecture {
    pub id: String,
    pub title: String,
    pub order: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub definition_ids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_ids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub example_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tutorial {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub week: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub order: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lecture_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub example_ids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub question_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Course {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub definition_sequence: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_sequence: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub example_sequence: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Homework {
    pub id: String,
    pub title: String,
    pub week: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub answer_steps: Vec<AnswerStep>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_ids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mistake_ids: Vec<String>,
}

/// Read-only view of one reference field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference<'a> {
    pub field: &'static str,
    pub targets: RefTargets<'a>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefTargets<'a> {
    Single(Option<&'a str>),
    Multi(&'a [String]),
}

impl<'a> RefTargets<'a> {
    pub fn contains(&self, id: &str) -> bool {
        match self {
            RefTargets::Single(target) => *target == Some(id),
            RefTargets::Multi(targets) => targets.iter().any(|t| t == id),
        }
    }

    /// Target IDs in field order, duplicates included.
    pub fn ids(&self) -> Vec<&'a str> {
        match *self {
            RefTargets::Single(target) => target.into_iter().collect(),
            RefTargets::Multi(targets) => targets.iter().map(String::as_str).collect(),
        }
    }
}

/// Mutable view of one reference field, used by the cascading rename.
#[derive(Debug)]
pub struct ReferenceMut<'a> {
    pub field: &'static str,
    pub slot: RefSlot<'a>,
}

#[derive(Debug)]
pub enum RefSlot<'a> {
    Single(&'a mut Option<String>),
    Multi(&'a mut Vec<String>),
}

impl RefSlot<'_> {
    /// Replaces every occurrence of `old` with `new`, keeping order and length.
    pub fn replace(&mut self, old: &str, new: &str) -> usize {
        match self {
            RefSlot::Single(slot) => {
                if slot.as_deref() == Some(old) {
                    **slot = Some(new.to_string());
                    1
                } else {
                    0
                }
            }
            RefSlot::Multi(targets) => {
                let mut replaced = 0;
                for target in targets.iter_mut().filter(|t| t.as_str() == old) {
                    *target = new.to_string();
                    replaced += 1;
                }
                replaced
            }
        }
    }
}

/// Capability shared by every concrete node type.
pub trait KnowledgeNode {
    const KIND: NodeKind;

    fn id(&self) -> &str;

    fn set_id(&mut self, id: String);

    /// Declared reference fields, in schema order.
    fn references(&self) -> Vec<Reference<'_>> {
        Vec::new()
    }

    fn references_mut(&mut self) -> Vec<ReferenceMut<'_>> {
        Vec::new()
    }
}

fn single<'a>(field: &'static str, target: &'a Option<String>) -> Reference<'a> {
    Reference { field, targets: RefTargets::Single(target.as_deref()) }
}

fn multi<'a>(field: &'static str, targets: &'a [String]) -> Reference<'a> {
    Reference { field, targets: RefTargets::Multi(targets) }
}

fn single_mut<'a>(field: &'static str, slot: &'a mut Option<String>) -> ReferenceMut<'a> {
    ReferenceMut { field, slot: RefSlot::Single(slot) }
}

fn multi_mut<'a>(field: &'static str, slot: &'a mut Vec<String>) -> ReferenceMut<'a> {
    ReferenceMut { field, slot: RefSlot::Multi(slot) }
}

macro_rules! identified {
    ($kind:expr) => {
        const KIND: NodeKind = $kind;

        fn id(&self) -> &str {
            &self.id
        }

        fn set_id(&mut self, id: String) {
            self.id = id;
        }
    };
}

impl KnowledgeNode for Question {
    identified!(NodeKind::Question);

    fn references(&self) -> Vec<Reference<'_>> {
        vec![multi("tool_ids", &self.tool_ids), multi("mistake_ids", &self.mistake_ids)]
    }

    fn references_mut(&mut self) -> Vec<ReferenceMut<'_>> {
        vec![
            multi_mut("tool_ids", &mut self.tool_ids),
            multi_mut("mistake_ids", &mut self.mistake_ids),
        ]
    }
}

impl KnowledgeNode for Definition {
    identified!(NodeKind::Definition);
}

impl KnowledgeNode for Tool {
    identified!(NodeKind::Tool);
}

impl KnowledgeNode for Mistake {
    identified!(NodeKind::Mistake);
}

impl KnowledgeNode for Example {
    identified!(NodeKind::Example);

    fn references(&self) -> Vec<Reference<'_>> {
        vec![multi("related_definition_ids", &self.related_definition_ids)]
    }

    fn references_mut(&mut self) -> Vec<ReferenceMut<'_>> {
        vec![multi_mut("related_definition_ids", &mut self.related_definition_ids)]
    }
}

impl KnowledgeNode for Lecture {
    identified!(NodeKind::Lecture);

    fn references(&self) -> Vec<Reference<'_>> {
        vec![
            single("course_id", &self.course_id),
            multi("definition_ids", &self.definition_ids),
            multi("tool_ids", &self.tool_ids),
            multi("example_ids", &self.example_ids),
        ]
    }

    fn references_mut(&mut self) -> Vec<ReferenceMut<'_>> {
        vec![
            single_mut("course_id", &mut self.course_id),
            multi_mut("definition_ids", &mut self.definition_ids),
            multi_mut("tool_ids", &mut self.tool_ids),
            multi_mut("example_ids", &mut self.example_ids),
        ]
    }
}

impl KnowledgeNode for Tutorial {
    identified!(NodeKind::Tutorial);

    fn references(&self) -> Vec<Reference<'_>> {
        vec![
            single("lecture_id", &self.lecture_id),
            multi("example_ids", &self.example_ids),
            multi("question_ids", &self.question_ids),
        ]
    }

    fn references_mut(&mut self) -> Vec<ReferenceMut<'_>> {
        vec![
            single_mut("lecture_id", &mut self.lecture_id),
            multi_mut("example_ids", &mut self.example_ids),
            multi_mut("question_ids", &mut self.question_ids),
        ]
    }
}

impl KnowledgeNode for Course {
    identified!(NodeKind::Course);

    fn references(&self) -> Vec<Reference<'_>> {
        vec![
            multi("definition_sequence", &self.definition_sequence),
            multi("tool_sequence", &self.tool_sequence),
            multi("example_sequence", &self.example_sequence),
        ]
    }

    fn references_mut(&mut self) -> Vec<ReferenceMut<'_>> {
        vec![
            multi_mut("definition_sequence", &mut self.definition_sequence),
            multi_mut("tool_sequence", &mut self.tool_sequence),
            multi_mut("example_sequence", &mut self.example_sequence),
        ]
    }
}

impl KnowledgeNode for Homework {
    identified!(NodeKind::Homework);

    fn references(&self) -> Vec<Reference<'_>> {
        vec![multi("tool_ids", &self.tool_ids), multi("mistake_ids", &self.mistake_ids)]
    }

    fn references_mut(&mut self) -> Vec<ReferenceMut<'_>> {
        vec![
            multi_mut("tool_ids", &mut self.tool_ids),
            multi_mut("mistake_ids", &mut self.mistake_ids),
        ]
    }
}

/// A node of any kind, as held by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Node {
    Question(Question),
    Definition(Definition),
    Tool(Tool),
    Mistake(Mistake),
    Example(Example),
    Lecture(Lecture),
    Tutorial(Tutorial),
    Course(Course),
    Homework(Homework),
}

macro_rules! dispatch {
    ($node:expr, $inner:ident => $body:expr) => {
        match $node {
            Node::Question($inner) => $body,
            Node::Definition($inner) => $body,
            Node::Tool($inner) => $body,
            Node::Mistake($inner) => $body,
            Node::Example($inner) => $body,
            Node::Lecture($inner) => $body,
            Node::Tutorial($inner) => $body,
            Node::Course($inner) => $body,
            Node::Homework($inner) => $body,
        }
    };
}

fn kind_of<T: KnowledgeNode>(_: &T) -> NodeKind {
    T::KIND
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        dispatch!(self, n => kind_of(n))
    }

    pub fn id(&self) -> &str {
        dispatch!(self, n => n.id())
    }

    pub(crate) fn set_id(&mut self, id: String) {
        dispatch!(self, n => n.set_id(id))
    }

    pub fn references(&self) -> Vec<Reference<'_>> {
        dispatch!(self, n => n.references())
    }

    pub(crate) fn references_mut(&mut self) -> Vec<ReferenceMut<'_>> {
        dispatch!(self, n => n.references_mut())
    }

    /// Short human-readable label used in listings.
    pub fn label(&self) -> &str {
        match self {
            Node::Question(q) => &q.topic,
            Node::Definition(d) => &d.term,
            Node::Tool(t) => &t.short_name,
            Node::Mistake(m) => &m.description,
            Node::Example(e) => &e.name,
            Node::Lecture(l) => &l.title,
            Node::Tutorial(t) => t.title.as_deref().unwrap_or(""),
            Node::Course(c) => &c.name,
            Node::Homework(h) => &h.title,
        }
    }

    pub fn as_question(&self) -> Option<&Question> {
        match self {
            Node::Question(q) => Some(q),
            _ => None,
        }
    }
}

macro_rules! into_node {
    ($($ty:ident),*) => {
        $(
            impl From<$ty> for Node {
                fn from(node: $ty) -> Self {
                    Node::$ty(node)
                }
            }
        )*
    };
}

into_node!(Question, Definition, Tool, Mistake, Example, Lecture, Tutorial, Course, Homework);
