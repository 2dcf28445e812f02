//! Defensive parsing of reasoning-service output.
//!
//! Two phases: decode the (cleaned) text into a generic JSON value, then
//! validate shape and required fields before decoding into typed records.
//! A call either returns fully validated records or a [`ParseError`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{ArtifactFinding, EvidenceItem, ParseError};

/// Expected top-level JSON shape of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Object,
    Array,
}

impl Shape {
    fn name(&self) -> &'static str {
        match self {
            Shape::Object => "object",
            Shape::Array => "array",
        }
    }
}

/// A record type the reasoning service is asked to produce.
pub trait ResponseSchema: DeserializeOwned {
    const SHAPE: Shape;
    const REQUIRED_FIELDS: &'static [&'static str];
}

/// Step analysis as emitted by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResponse {
    pub failure_category: String,
    pub root_cause: String,
    pub evidence: Vec<EvidenceItem>,
}

impl ResponseSchema for StepResponse {
    const SHAPE: Shape = Shape::Object;
    const REQUIRED_FIELDS: &'static [&'static str] = &["failure_category", "root_cause", "evidence"];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResponse {
    pub root_cause_summary: String,
}

impl ResponseSchema for TestResponse {
    const SHAPE: Shape = Shape::Object;
    const REQUIRED_FIELDS: &'static [&'static str] = &["root_cause_summary"];
}

impl ResponseSchema for ArtifactFinding {
    const SHAPE: Shape = Shape::Array;
    const REQUIRED_FIELDS: &'static [&'static str] = &["artifact_path", "key_findings"];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisResponse {
    pub summary: String,
    pub detailed_analysis: String,
    pub category: String,
    #[serde(default)]
    pub contributing_artifact_paths: Vec<String>,
}

impl ResponseSchema for SynthesisResponse {
    const SHAPE: Shape = Shape::Object;
    const REQUIRED_FIELDS: &'static [&'static str] = &["summary", "detailed_analysis", "category"];
}

/// Remove one code fence wrapping the whole response, if present.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    if trimmed.len() < 6 || !trimmed.starts_with("```") || !trimmed.ends_with("```") {
        return trimmed;
    }

    let inner = &trimmed[3..trimmed.len() - 3];
    let body = match inner.find('\n') {
        Some(newline)
            if inner[..newline]
                .trim()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') =>
        {
            &inner[newline + 1..]
        }
        _ => inner,
    };
    body.trim()
}

/// Re-escape raw control characters that appear inside string literals.
///
/// Newline, tab and carriage return become `\n`, `\t`, `\r`; other control
/// characters inside strings are dropped. Text outside strings is untouched.
pub fn sanitize_control_chars(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if !in_string {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
            continue;
        }

        if escaped {
            escaped = false;
            out.push(c);
            continue;
        }

        match c {
            '\\' => {
                escaped = true;
                out.push(c);
            }
            '"' => {
                in_string = false;
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c.is_control() && (c as u32) < 0x20 => {}
            c => out.push(c),
        }
    }

    out
}

fn decode(raw: &str) -> Result<Value, ParseError> {
    if raw.trim().is_empty() {
        return Err(ParseError::Empty);
    }
    let body = strip_code_fence(raw);
    if body.is_empty() {
        return Err(ParseError::Empty);
    }
    let sanitized = sanitize_control_chars(body);
    serde_json::from_str(&sanitized).map_err(|e| ParseError::Syntax(e.to_string()))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn validate_element<T: ResponseSchema>(index: usize, element: Value) -> Result<T, ParseError> {
    let Value::Object(map) = &element else {
        return Err(ParseError::Validation(format!(
            "element {index} is a {}, expected an object",
            json_type(&element)
        )));
    };

    if let Some(missing) = T::REQUIRED_FIELDS
        .iter()
        .find(|field| !map.contains_key(**field))
    {
        return Err(ParseError::Schema {
            element_index: index,
            field_name: missing.to_string(),
        });
    }

    serde_json::from_value(element)
        .map_err(|e| ParseError::Validation(format!("element {index}: {e}")))
}

/// Parse a response into records of type `T`.
///
/// Object-shaped schemas yield exactly one record.
pub fn parse_records<T: ResponseSchema>(raw: &str) -> Result<Vec<T>, ParseError> {
    let value = decode(raw)?;

    let elements = match (T::SHAPE, value) {
        (Shape::Array, Value::Array(items)) => items,
        (Shape::Object, value @ Value::Object(_)) => vec![value],
        (shape, other) => {
            return Err(ParseError::Validation(format!(
                "expected a top-level {}, found {}",
                shape.name(),
                json_type(&other)
            )))
        }
    };

    elements
        .into_iter()
        .enumerate()
        .map(|(index, element)| validate_element(index, element))
        .collect()
}

/// Parse an object-shaped response into a single record.
pub fn parse_record<T: ResponseSchema>(raw: &str) -> Result<T, ParseError> {
    parse_records::<T>(raw)?
        .into_iter()
        .next()
        .ok_or_else(|| ParseError::Validation("response contained no record".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_is_parse_error() {
        assert_eq!(parse_record::<TestResponse>(""), Err(ParseError::Empty));
        assert_eq!(parse_record::<TestResponse>("  \n\t"), Err(ParseError::Empty));
        assert_eq!(parse_record::<TestResponse>("```\n```"), Err(ParseError::Empty));
    }

    #[test]
    fn test_strip_fence_with_language_tag() {
        let raw = "```json\n{\"root_cause_summary\": \"disk full\"}\n```";
        assert_eq!(strip_code_fence(raw), "{\"root_cause_summary\": \"disk full\"}");
        let parsed: TestResponse = parse_record(raw).unwrap();
        assert_eq!(parsed.root_cause_summary, "disk full");
    }

    #[test]
    fn test_strip_fence_without_tag() {
        assert_eq!(strip_code_fence("```\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fence("```[1]```"), "[1]");
        assert_eq!(strip_code_fence("[1]"), "[1]");
    }

    #[test]
    fn test_unfenced_response_with_inner_backticks_untouched() {
        let raw = r#"{"root_cause_summary": "see ```code```"}"#;
        let parsed: TestResponse = parse_record(raw).unwrap();
        assert_eq!(parsed.root_cause_summary, "see ```code```");
    }

    #[test]
    fn test_sanitize_escapes_raw_newline_in_string() {
        let raw = "{\"message\": \"a\nb\"}";
        let sanitized = sanitize_control_chars(raw);
        assert_eq!(sanitized, "{\"message\": \"a\\nb\"}");
        let value: Value = serde_json::from_str(&sanitized).unwrap();
        assert_eq!(value["message"], "a\nb");
    }

    #[test]
    fn test_sanitize_keeps_structure_whitespace_and_escapes() {
        let raw = "{\n\t\"a\": \"tab\there \\\"q\\\"\",\r\n \"b\": \"x\u{0007}y\"\n}";
        let value: Value = serde_json::from_str(&sanitize_control_chars(raw)).unwrap();
        assert_eq!(value["a"], "tab\there \"q\"");
        assert_eq!(value["b"], "xy");
    }

    #[test]
    fn test_syntax_error() {
        let err = parse_record::<TestResponse>("{not json").unwrap_err();
        assert!(matches!(err, ParseError::Syntax(_)));
    }

    #[test]
    fn test_shape_mismatch_is_validation_error() {
        let err = parse_records::<ArtifactFinding>(r#"{"artifact_path": "a", "key_findings": "b"}"#)
            .unwrap_err();
        assert!(matches!(err, ParseError::Validation(msg) if msg.contains("expected a top-level array")));

        let err = parse_record::<TestResponse>(r#"["x"]"#).unwrap_err();
        assert!(matches!(err, ParseError::Validation(_)));
    }

    #[test]
    fn test_missing_field_reports_index_and_name() {
        let raw = r#"[
            {"artifact_path": "a.log", "key_findings": "ok"},
            {"artifact_path": "b.log"}
        ]"#;
        let err = parse_records::<ArtifactFinding>(raw).unwrap_err();
        assert_eq!(
            err,
            ParseError::Schema {
                element_index: 1,
                field_name: "key_findings".to_string()
            }
        );
    }

    #[test]
    fn test_wrong_field_type_is_validation_error() {
        let err = parse_record::<StepResponse>(
            r#"{"failure_category": "build", "root_cause": "x", "evidence": "not a list"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::Validation(_)));
    }

    #[test]
    fn test_step_response_with_evidence() {
        let raw = r#"{
            "failure_category": "build",
            "root_cause": "missing dependency",
            "evidence": [{"source": "build-log.txt", "content": "error: cannot find crate"}]
        }"#;
        let parsed: StepResponse = parse_record(raw).unwrap();
        assert_eq!(parsed.evidence.len(), 1);
        assert_eq!(parsed.evidence[0].source, "build-log.txt");
    }

    #[test]
    fn test_synthesis_paths_are_optional() {
        let raw = r#"{"summary": "s", "detailed_analysis": "d", "category": "test"}"#;
        let parsed: SynthesisResponse = parse_record(raw).unwrap();
        assert!(parsed.contributing_artifact_paths.is_empty());
    }

    #[test]
    fn test_reparse_is_idempotent() {
        let raw = r#"[{"artifact_path": "a", "key_findings": "line1
line2"}, {"artifact_path": "b", "key_findings": "none"}]"#;
        let first = parse_records::<ArtifactFinding>(raw).unwrap();
        let reencoded = serde_json::to_string(&first).unwrap();
        let second = parse_records::<ArtifactFinding>(&reencoded).unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].key_findings, "line1\nline2");
    }
}
