//! Corpus loading: structured records in, normalized documents out.
//!
//! A corpus is either a JSON array of records (`.json`) or one record per line
//! (`.jsonl`). Each record is rendered according to the domain's
//! [`RecordSchema`]; records with nothing to render are skipped and logged,
//! but still consume their position so document ids follow source order.
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::{Document, Domain, RecordSchema};

/// Result of reading one domain's corpus.
#[derive(Debug, Clone)]
pub struct LoadedCorpus {
    pub documents: Vec<Document>,
    /// BLAKE3 hex digest of the corpus bytes.
    pub digest: String,
    /// Number of records that produced no document.
    pub skipped: usize,
}

#[derive(Debug, Default, Clone)]
pub struct DocumentLoader;

impl DocumentLoader {
    pub fn new() -> Self { Self }

    pub fn load(&self, domain: &Domain) -> Result<Vec<Document>> {
        Ok(self.load_corpus(domain)?.documents)
    }

    pub fn load_corpus(&self, domain: &Domain) -> Result<LoadedCorpus> {
        let path = domain.corpus.as_path();
        let bytes = fs::read(path).map_err(|e| Error::corpus_read(&domain.name, path, e))?;
        let digest = blake3::hash(&bytes).to_hex().to_string();
        let raw = String::from_utf8(bytes).map_err(|e| Error::corpus_read(&domain.name, path, e))?;
        let records = parse_records(&raw, path).map_err(|reason| Error::corpus_read(&domain.name, path, reason))?;

        let mut documents = Vec::with_capacity(records.len());
        let mut skipped = 0usize;
        for (index, record) in records.iter().enumerate() {
            match render_record(&domain.schema, record) {
                Some(text) => documents.push(Document::new(format!("{}_{}", domain.name, index), text)),
                None => {
                    skipped += 1;
                    debug!(domain = %domain.name, index, "skipping record with no renderable fields");
                }
            }
        }
        info!(
            domain = %domain.name,
            records = records.len(),
            documents = documents.len(),
            skipped,
            "loaded corpus from {}",
            path.display()
        );
        Ok(LoadedCorpus { documents, digest, skipped })
    }
}

/// BLAKE3 hex digest of a corpus file, used to detect corpus changes.
pub fn corpus_digest(path: &Path) -> std::io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

fn parse_records(raw: &str, path: &Path) -> std::result::Result<Vec<Value>, String> {
    let is_lines = path.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case("jsonl"));
    if is_lines {
        let mut records = Vec::new();
        for (line_no, line) in raw.lines().enumerate() {
            if line.trim().is_empty() { continue; }
            let value = serde_json::from_str(line).map_err(|e| format!("line {}: {}", line_no + 1, e))?;
            records.push(value);
        }
        return Ok(records);
    }
    match serde_json::from_str::<Value>(raw).map_err(|e| e.to_string())? {
        Value::Array(records) => Ok(records),
        other => Err(format!("expected a JSON array of records, found {}", kind_of(&other))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Render one record into document text, or `None` when nothing is renderable.
pub fn render_record(schema: &RecordSchema, record: &Value) -> Option<String> {
    let fields = record.as_object()?;
    match schema {
        RecordSchema::QuestionAnswer { question_field, answer_field, question_label, answer_label } => {
            let question = fields.get(question_field).and_then(scalar_text)?;
            let answer = fields.get(answer_field).and_then(scalar_text)?;
            Some(format!("{question_label}: {question}\n{answer_label}: {answer}"))
        }
        RecordSchema::Attributes { fields: selected } => {
            let lines = attribute_lines(fields, selected);
            if lines.is_empty() { None } else { Some(lines.join("\n")) }
        }
    }
}

fn attribute_lines(fields: &Map<String, Value>, selected: &[String]) -> Vec<String> {
    let render = |key: &str, value: &Value| scalar_text(value).map(|v| format!("{key}: {v}"));
    if selected.is_empty() {
        fields.iter().filter_map(|(k, v)| render(k, v)).collect()
    } else {
        selected.iter().filter_map(|k| fields.get(k).and_then(|v| render(k, v))).collect()
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn question_answer_uses_configured_labels() {
        let schema = RecordSchema::question_answer("Q", "A");
        let text = render_record(&schema, &json!({"instruction": "2+2?", "output": 4})).unwrap();
        assert_eq!(text, "Q: 2+2?\nA: 4");
    }

    #[test]
    fn question_answer_missing_answer_is_unrenderable() {
        let schema = RecordSchema::question_answer("Q", "A");
        assert!(render_record(&schema, &json!({"instruction": "2+2?"})).is_none());
        assert!(render_record(&schema, &json!({"instruction": "2+2?", "output": "  "})).is_none());
    }

    #[test]
    fn attributes_keep_record_order_and_drop_empty_values() {
        let record = json!({"name": "Creeper", "hostile": true, "notes": "", "drops": null, "health": 20, "tags": ["a"]});
        let text = render_record(&RecordSchema::attributes(), &record).unwrap();
        assert_eq!(text, "name: Creeper\nhostile: true\nhealth: 20");
    }

    #[test]
    fn attributes_with_field_list_follow_that_order() {
        let schema = RecordSchema::Attributes { fields: vec!["effect".into(), "name".into(), "missing".into()] };
        let text = render_record(&schema, &json!({"name": "Lumos", "effect": "light"})).unwrap();
        assert_eq!(text, "effect: light\nname: Lumos");
    }

    #[test]
    fn non_object_records_are_unrenderable() {
        assert!(render_record(&RecordSchema::attributes(), &json!("plain string")).is_none());
        assert!(render_record(&RecordSchema::attributes(), &json!({"only": {"nested": 1}})).is_none());
    }
}
