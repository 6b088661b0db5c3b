//! Question selection for generated exams.

use crate::model::Question;
use crate::store::KnowledgeStore;
use rand::seq::IndexedRandom;
use rand::Rng;

pub const DEFAULT_QUESTION_COUNT: usize = 3;
pub const DEFAULT_TITLE: &str = "General Mathematics";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Exactly these questions, in this order.
    Ids(Vec<String>),
    /// Up to `count` random questions whose topic contains `topic`.
    Sample { topic: Option<String>, count: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamRequest {
    pub selection: Selection,
}

impl ExamRequest {
    pub fn ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            selection: Selection::Ids(ids.into_iter().map(Into::into).collect()),
        }
    }

    pub fn sample(topic: Option<String>, count: usize) -> Self {
        Self {
            selection: Selection::Sample { topic, count },
        }
    }

    /// Title used on the exam sheet.
    pub fn title(&self) -> String {
        match &self.selection {
            Selection::Sample { topic: Some(topic), .. } => format!("Exam: {topic}"),
            _ => format!("Exam: {DEFAULT_TITLE}"),
        }
    }

    /// Picks the questions for this request.
    ///
    /// Explicit IDs that do not name a question are dropped silently. An
    /// empty result means nothing matched.
    pub fn select<'a, R: Rng + ?Sized>(
        &self,
        store: &'a KnowledgeStore,
        rng: &mut R,
    ) -> Vec<&'a Question> {
        match &self.selection {
            Selection::Ids(ids) => ids
                .iter()
                .filter_map(|id| store.get(id).and_then(|n| n.as_question()))
                .collect(),
            Selection::Sample { topic, count } => {
                let needle = topic.as_deref().map(str::to_lowercase);
                let mut candidates: Vec<&Question> = store
                    .questions()
                    .filter(|q| match &needle {
                        Some(needle) => q.topic.to_lowercase().contains(needle.as_str()),
                        None => true,
                    })
                    .collect();
                candidates.sort_by(|a, b| a.id.cmp(&b.id));
                candidates.choose_multiple(rng, *count).copied().collect()
            }
        }
    }
}
