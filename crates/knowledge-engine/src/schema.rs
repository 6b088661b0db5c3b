//! Static schema for every node kind.
//!
//! Each kind declares its persisted fields and the role each one plays. The
//! integrity engine only ever looks at fields declared here as references;
//! nothing is inferred from field names at runtime.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of node kinds. All kinds share a single ID namespace.
///
/// Declaration order is the display order used for listing and persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Question,
    Definition,
    Tool,
    Mistake,
    Example,
    Lecture,
    Tutorial,
    Course,
    Homework,
}

/// Role of a declared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    Plain,
    /// Holds at most one node ID.
    SingleRef,
    /// Holds an ordered list of node IDs.
    MultiRef,
}

impl FieldRole {
    pub fn is_reference(self) -> bool {
        !matches!(self, FieldRole::Plain)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub role: FieldRole,
    pub required: bool,
}

const fn required(name: &'static str) -> FieldSpec {
    FieldSpec { name, role: FieldRole::Plain, required: true }
}

const fn optional(name: &'static str) -> FieldSpec {
    FieldSpec { name, role: FieldRole::Plain, required: false }
}

const fn single_ref(name: &'static str) -> FieldSpec {
    FieldSpec { name, role: FieldRole::SingleRef, required: false }
}

const fn multi_ref(name: &'static str) -> FieldSpec {
    FieldSpec { name, role: FieldRole::MultiRef, required: false }
}

static QUESTION_FIELDS: &[FieldSpec] = &[
    required("id"),
    required("year"),
    required("lecturer"),
    required("topic"),
    required("given"),
    required("to_prove"),
    optional("hint"),
    optional("image"),
    optional("answer_steps"),
    multi_ref("tool_ids"),
    multi_ref("mistake_ids"),
];

static DEFINITION_FIELDS: &[FieldSpec] = &[required("id"), optional("term"), required("content")];

static TOOL_FIELDS: &[FieldSpec] = &[
    required("id"),
    optional("short_name"),
    optional("description"),
    optional("usage"),
];

static MISTAKE_FIELDS: &[FieldSpec] = &[
    required("id"),
    required("description"),
    required("correction"),
    optional("severity"),
];

static EXAMPLE_FIELDS: &[FieldSpec] = &[
    required("id"),
    required("name"),
    required("content"),
    optional("type"),
    multi_ref("related_definition_ids"),
];

static LECTURE_FIELDS: &[FieldSpec] = &[
    required("id"),
    required("title"),
    optional("order"),
    single_ref("course_id"),
    multi_ref("definition_ids"),
    multi_ref("tool_ids"),
    multi_ref("example_ids"),
];

static TUTORIAL_FIELDS: &[FieldSpec] = &[
    required("id"),
    optional("title"),
    optional("week"),
    optional("content"),
    optional("order"),
    single_ref("lecture_id"),
    multi_ref("example_ids"),
    multi_ref("question_ids"),
];

static COURSE_FIELDS: &[FieldSpec] = &[
    required("id"),
    required("name"),
    multi_ref("definition_sequence"),
    multi_ref("tool_sequence"),
    multi_ref("example_sequence"),
];

static HOMEWORK_FIELDS: &[FieldSpec] = &[
    required("id"),
    required("title"),
    required("week"),
    optional("content"),
    optional("answer_steps"),
    multi_ref("tool_ids"),
    multi_ref("mistake_ids"),
];

// (alias, canonical) pairs accepted on input only.
static QUESTION_ALIASES: &[(&str, &str)] = &[
    ("goal", "to_prove"),
    ("tools", "tool_ids"),
    ("common_mistakes", "mistake_ids"),
];
static DEFINITION_ALIASES: &[(&str, &str)] = &[("name", "term")];
static TOOL_ALIASES: &[(&str, &str)] = &[("name", "short_name"), ("statement", "description")];
static MISTAKE_ALIASES: &[(&str, &str)] = &[("remedy", "correction")];
static EXAMPLE_ALIASES: &[(&str, &str)] = &[("title", "name")];
static LECTURE_ALIASES: &[(&str, &str)] = &[("name", "title")];

impl NodeKind {
    pub const ALL: [NodeKind; 9] = [
        NodeKind::Question,
        NodeKind::Definition,
        NodeKind::Tool,
        NodeKind::Mistake,
        NodeKind::Example,
        NodeKind::Lecture,
        NodeKind::Tutorial,
        NodeKind::Course,
        NodeKind::Homework,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Question => "question",
            NodeKind::Definition => "definition",
            NodeKind::Tool => "tool",
            NodeKind::Mistake => "mistake",
            NodeKind::Example => "example",
            NodeKind::Lecture => "lecture",
            NodeKind::Tutorial => "tutorial",
            NodeKind::Course => "course",
            NodeKind::Homework => "homework",
        }
    }

    /// Name of the persisted collection holding nodes of this kind.
    pub fn collection(self) -> &'static str {
        match self {
            NodeKind::Question => "questions",
            NodeKind::Definition => "definitions",
            NodeKind::Tool => "tools",
            NodeKind::Mistake => "mistakes",
            NodeKind::Example => "examples",
            NodeKind::Lecture => "lectures",
            NodeKind::Tutorial => "tutorials",
            NodeKind::Course => "courses",
            NodeKind::Homework => "homework",
        }
    }

    pub fn file_name(self) -> String {
        format!("{}.yaml", self.collection())
    }

    pub fn fields(self) -> &'static [FieldSpec] {
        match self {
            NodeKind::Question => QUESTION_FIELDS,
            NodeKind::Definition => DEFINITION_FIELDS,
            NodeKind::Tool => TOOL_FIELDS,
            NodeKind::Mistake => MISTAKE_FIELDS,
            NodeKind::Example => EXAMPLE_FIELDS,
            NodeKind::Lecture => LECTURE_FIELDS,
            NodeKind::Tutorial => TUTORIAL_FIELDS,
            NodeKind::Course => COURSE_FIELDS,
            NodeKind::Homework => HOMEWORK_FIELDS,
        }
    }

    pub fn reference_fields(self) -> impl Iterator<Item = &'static FieldSpec> {
        self.fields().iter().filter(|f| f.role.is_reference())
    }

    pub fn field(self, name: &str) -> Option<&'static FieldSpec> {
        self.fields().iter().find(|f| f.name == name)
    }

    /// Input-only alternate names, as `(alias, canonical)` pairs.
    pub fn aliases(self) -> &'static [(&'static str, &'static str)] {
        match self {
            NodeKind::Question => QUESTION_ALIASES,
            NodeKind::Definition => DEFINITION_ALIASES,
            NodeKind::Tool => TOOL_ALIASES,
            NodeKind::Mistake => MISTAKE_ALIASES,
            NodeKind::Example => EXAMPLE_ALIASES,
            NodeKind::Lecture => LECTURE_ALIASES,
            NodeKind::Tutorial | NodeKind::Course | NodeKind::Homework => &[],
        }
    }

    /// Whether `key` is a canonical field or an accepted alias for this kind.
    pub fn accepts_key(self, key: &str) -> bool {
        self.field(key).is_some() || self.aliases().iter().any(|(alias, _)| *alias == key)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown node kind '{0}' (expected one of: question, definition, tool, mistake, example, lecture, tutorial, course, homework)")]
pub struct UnknownKind(pub String);

impl FromStr for NodeKind {
    type Err = UnknownKind;

    /// Accepts the singular kind name or the collection name, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        NodeKind::ALL
            .into_iter()
            .find(|k| k.as_str() == wanted || k.collection() == wanted)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}
