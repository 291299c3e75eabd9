//! Loading raw input records.
//!
//! A record needs only its source text. Any other field is kept as a
//! pre-supplied analysis; structured values are flattened into indented
//! text so the prompts can quote them.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde_json::{Map, Value};

use crate::error::LotsawaError;
use crate::state_machine::WorkItem;

const SOURCE_KEYS: &[&str] = &["source", "root_display_text", "root"];
const LANGUAGE_KEYS: &[&str] = &["target_language", "language"];
const AGGREGATE_KEYS: &[&str] = &["aggregate_input", "combined_commentary"];
/// Older analysis field names and the keys they are stored under.
const ANALYSIS_ALIASES: &[(&str, &str)] = &[
    ("commentary1", "commentary_1"),
    ("commentary2", "commentary_2"),
    ("commentary3", "commentary_3"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRecord {
    /// Position in the input file, zero-based.
    pub index: usize,
    pub source: String,
    pub target_language: Option<String>,
    pub analyses: BTreeMap<String, String>,
    pub aggregate_input: Option<String>,
}

impl InputRecord {
    pub fn from_value(index: usize, value: Value) -> Result<Self, LotsawaError> {
        let Value::Object(mut map) = value else {
            return Err(LotsawaError::Input {
                record: index,
                reason: "expected a JSON object".into(),
            });
        };

        let source = take_first(&mut map, SOURCE_KEYS).unwrap_or_default();
        let target_language = take_first(&mut map, LANGUAGE_KEYS).filter(|s| !s.trim().is_empty());
        let aggregate_input = take_first(&mut map, AGGREGATE_KEYS).filter(|s| !s.trim().is_empty());
        for (alias, key) in ANALYSIS_ALIASES {
            if let Some(value) = map.remove(*alias) {
                map.entry(*key).or_insert(value);
            }
        }

        let analyses = map
            .into_iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k, render(&v)))
            .filter(|(_, text)| !text.trim().is_empty())
            .collect();

        Ok(Self {
            index,
            source,
            target_language,
            analyses,
            aggregate_input,
        })
    }

    pub fn validate(&self) -> Result<(), LotsawaError> {
        if self.source.trim().is_empty() {
            return Err(LotsawaError::Input {
                record: self.index,
                reason: "source text is empty".into(),
            });
        }
        Ok(())
    }

    pub fn into_work_item(self, default_language: &str) -> WorkItem {
        let language = self
            .target_language
            .unwrap_or_else(|| default_language.to_string());
        let mut item = WorkItem::new(self.index, self.source, language);
        for (key, value) in self.analyses {
            item = item.with_analysis(key, value);
        }
        if let Some(aggregate) = self.aggregate_input {
            item = item.with_aggregate_input(aggregate);
        }
        item
    }
}

/// Read `.jsonl` (one record per non-blank line) or a JSON file holding an
/// array of records or a single record.
pub fn load_records(path: &Path) -> Result<Vec<InputRecord>, LotsawaError> {
    if !path.exists() {
        return Err(LotsawaError::NoInput(path.to_path_buf()));
    }
    let content = fs::read_to_string(path)?;

    let values: Vec<Value> = if path.extension().is_some_and(|ext| ext == "jsonl") {
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()?
    } else {
        match serde_json::from_str::<Value>(&content)? {
            Value::Array(values) => values,
            single => vec![single],
        }
    };

    values
        .into_iter()
        .enumerate()
        .map(|(index, value)| InputRecord::from_value(index, value))
        .collect()
}

/// Every validation problem in `records`.
pub fn validate_all(records: &[InputRecord]) -> Vec<LotsawaError> {
    records.iter().filter_map(|r| r.validate().err()).collect()
}

fn take_first(map: &mut Map<String, Value>, keys: &[&str]) -> Option<String> {
    let mut found = None;
    for key in keys {
        if let Some(value) = map.remove(*key) {
            if found.is_none() && !value.is_null() {
                found = Some(render(&value));
            }
        }
    }
    found
}

/// Flatten a JSON value into indented `key: value` text.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(_) | Value::Array(_) => {
            let mut out = String::new();
            render_into(value, 0, &mut out);
            out.trim_end().to_string()
        }
        other => scalar(other),
    }
}

fn render_into(value: &Value, indent: usize, out: &mut String) {
    let pad = " ".repeat(indent);
    match value {
        Value::Object(map) => {
            for (key, value) in map {
                if is_nested(value) {
                    out.push_str(&format!("{pad}{key}:\n"));
                    render_into(value, indent + 2, out);
                } else {
                    out.push_str(&format!("{pad}{key}: {}\n", scalar(value)));
                }
            }
        }
        Value::Array(values) => {
            for value in values {
                if is_nested(value) {
                    out.push_str(&format!("{pad}-\n"));
                    render_into(value, indent + 2, out);
                } else {
                    out.push_str(&format!("{pad}- {}\n", scalar(value)));
                }
            }
        }
        other => out.push_str(&format!("{pad}{}\n", scalar(other))),
    }
}

fn is_nested(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn aliases_resolve_source_and_language() {
        let record = InputRecord::from_value(
            0,
            json!({"root_display_text": "བྱང་ཆུབ", "language": "French", "commentary": "notes"}),
        )
        .unwrap();
        assert_eq!(record.source, "བྱང་ཆུབ");
        assert_eq!(record.target_language.as_deref(), Some("French"));
        assert_eq!(record.analyses["commentary"], "notes");
        assert!(!record.analyses.contains_key("language"));
    }

    #[test]
    fn numbered_commentaries_are_normalised() {
        let record = InputRecord::from_value(
            0,
            json!({"source": "x", "commentary1": "first", "commentary2": "second", "commentary_2": "kept"}),
        )
        .unwrap();
        assert_eq!(record.analyses["commentary_1"], "first");
        assert_eq!(record.analyses["commentary_2"], "kept");
        assert!(!record.analyses.contains_key("commentary1"));
        assert!(!record.analyses.contains_key("commentary2"));
    }

    #[test]
    fn canonical_key_wins_over_alias() {
        let record = InputRecord::from_value(0, json!({"source": "a", "root": "b"})).unwrap();
        assert_eq!(record.source, "a");
        assert!(record.analyses.is_empty());
    }

    #[test]
    fn structured_analysis_is_rendered_as_indented_text() {
        let record = InputRecord::from_value(
            0,
            json!({
                "source": "x",
                "ucca": {"scene": {"process": "go", "participants": ["monk", "path"]}}
            }),
        )
        .unwrap();
        assert_eq!(
            record.analyses["ucca"],
            "scene:\n  process: go\n  participants:\n    - monk\n    - path"
        );
    }

    #[test]
    fn combined_commentary_becomes_aggregate() {
        let record =
            InputRecord::from_value(0, json!({"source": "x", "combined_commentary": "merged"})).unwrap();
        let item = record.into_work_item("English");
        assert_eq!(item.aggregate_input(), Some("merged"));
        assert_eq!(item.target_language(), "English");
    }

    #[test]
    fn empty_source_fails_validation() {
        let records = vec![
            InputRecord::from_value(0, json!({"source": "ok"})).unwrap(),
            InputRecord::from_value(1, json!({"source": "  "})).unwrap(),
            InputRecord::from_value(2, json!({"commentary": "no source"})).unwrap(),
        ];
        let issues = validate_all(&records);
        assert_eq!(issues.len(), 2);
        assert!(issues[0].to_string().contains("record 1"));
    }

    #[test]
    fn non_object_record_is_rejected() {
        assert!(InputRecord::from_value(4, json!("just text")).is_err());
    }

    #[test]
    fn loads_jsonl_skipping_blank_lines() {
        let mut file = tempfile::Builder::new().suffix(".jsonl").tempfile().unwrap();
        writeln!(file, r#"{{"source": "one"}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"root": "two", "language": "German"}}"#).unwrap();

        let records = load_records(file.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].index, 1);
        assert_eq!(records[1].source, "two");
    }

    #[test]
    fn loads_json_array_and_single_object() {
        let dir = tempfile::tempdir().unwrap();
        let array = dir.path().join("batch.json");
        fs::write(&array, r#"[{"source": "a"}, {"source": "b"}]"#).unwrap();
        assert_eq!(load_records(&array).unwrap().len(), 2);

        let single = dir.path().join("one.json");
        fs::write(&single, r#"{"source": "a"}"#).unwrap();
        assert_eq!(load_records(&single).unwrap().len(), 1);
    }

    #[test]
    fn missing_file_is_no_input() {
        let err = load_records(Path::new("/nonexistent/input.json")).unwrap_err();
        assert!(matches!(err, LotsawaError::NoInput(_)));
    }
}
