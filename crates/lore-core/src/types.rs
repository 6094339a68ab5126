//! Domain types shared by the loader, the index manager and the router.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub type DocumentId = String;

/// A named knowledge area with its own corpus and collection.
///
/// - `name`: unique domain name, also used as the collection name and the
///   persisted-index subdirectory
/// - `corpus`: path to the structured corpus file (`.json` array or `.jsonl`)
/// - `top_k`: default number of neighbours returned per query
/// - `schema`: how a source record is rendered into document text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub name: String,
    pub corpus: PathBuf,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    pub schema: RecordSchema,
}

fn default_top_k() -> usize { 3 }

impl Domain {
    pub fn new(name: impl Into<String>, corpus: impl Into<PathBuf>, schema: RecordSchema) -> Self {
        Self { name: name.into(), corpus: corpus.into(), top_k: default_top_k(), schema }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }
}

/// Rendering rules for the records of one corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordSchema {
    /// Two named fields rendered as `"{question_label}: {q}\n{answer_label}: {a}"`.
    QuestionAnswer {
        #[serde(default = "default_question_field")]
        question_field: String,
        #[serde(default = "default_answer_field")]
        answer_field: String,
        #[serde(default = "default_question_label")]
        question_label: String,
        #[serde(default = "default_answer_label")]
        answer_label: String,
    },
    /// Free-form attribute set; every non-empty scalar becomes a `"{key}: {value}"` line.
    /// A non-empty `fields` list restricts and orders the rendered keys.
    Attributes {
        #[serde(default)]
        fields: Vec<String>,
    },
}

fn default_question_field() -> String { "instruction".to_string() }
fn default_answer_field() -> String { "output".to_string() }
fn default_question_label() -> String { "Question".to_string() }
fn default_answer_label() -> String { "Answer".to_string() }

impl RecordSchema {
    /// Instruction/output records rendered under the given labels.
    pub fn question_answer(question_label: impl Into<String>, answer_label: impl Into<String>) -> Self {
        Self::QuestionAnswer {
            question_field: default_question_field(),
            answer_field: default_answer_field(),
            question_label: question_label.into(),
            answer_label: answer_label.into(),
        }
    }

    pub fn attributes() -> Self {
        Self::Attributes { fields: Vec::new() }
    }
}

/// A normalized, indexable unit derived from one source record.
///
/// `id` is `"{domain}_{position}"` where position is the record's zero-based
/// index in the corpus, so ids survive rebuilds as long as the source order does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub text: String,
}

impl Document {
    pub fn new(id: impl Into<DocumentId>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into() }
    }
}

/// The (id, vector, text) triple upserted into a collection.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: DocumentId,
    pub text: String,
    pub vector: Vec<f32>,
}

/// A document returned by similarity search. Higher `score` is better.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: f32,
}
