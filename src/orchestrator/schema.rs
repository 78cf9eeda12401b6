use serde_json::{Map, Value};

use super::envelope::ResponseType;
use super::mode::Mode;

pub const MAX_QUESTIONS: usize = 3;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Validation {
    pub errors: Vec<String>,
}

impl Validation {
    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }

    fn push(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }
}

/// The top-level version and the meta version must both equal the mode's version.
pub fn version_errors(mode: Mode, envelope: &Value) -> Vec<String> {
    let expected = mode.schema_version();
    let mut errors = Vec::new();
    let top = envelope.get("schemaVersion").and_then(Value::as_str);
    if top != Some(expected) {
        errors.push(format!(
            "schemaVersion must be \"{}\" (got {})",
            expected,
            describe(envelope.get("schemaVersion"))
        ));
    }
    let meta = envelope.pointer("/meta/schema_version").and_then(Value::as_str);
    if meta != Some(expected) {
        errors.push(format!(
            "meta.schema_version must be \"{}\" (got {})",
            expected,
            describe(envelope.pointer("/meta/schema_version"))
        ));
    }
    errors
}

/// Structural checks on the raw model JSON, run before typed decoding. Every
/// violation is its own message naming the offending field.
pub fn validate(mode: Mode, envelope: &Value) -> Validation {
    let mut v = Validation::default();
    let Some(root) = envelope.as_object() else {
        v.push("envelope must be a JSON object");
        return v;
    };

    v.errors.extend(version_errors(mode, envelope));

    match root.get("meta") {
        Some(Value::Object(meta)) => {
            if let Some(sources) = meta.get("sources_used") {
                check_sources_used(&mut v, sources);
            }
        }
        _ => v.push("meta must be an object"),
    }

    match root.get("mode").and_then(Value::as_str) {
        Some(m) if m == mode.as_str() => {}
        other => v.push(format!(
            "mode must be \"{}\" (got {})",
            mode,
            other.map(|s| format!("\"{}\"", s)).unwrap_or_else(|| "nothing".to_string())
        )),
    }

    let response_type = root
        .get("responseType")
        .and_then(Value::as_str)
        .and_then(|s| ResponseType::ALL.into_iter().find(|t| t.as_str() == s));
    if response_type.is_none() {
        v.push("responseType must be one of answer, clarifying_questions, error");
    }

    let Some(data) = root.get("data").and_then(Value::as_object) else {
        v.push("data must be an object");
        return v;
    };

    match response_type {
        Some(ResponseType::ClarifyingQuestions) => check_questions(&mut v, data),
        Some(ResponseType::Error) => optional_string(&mut v, data, "message"),
        Some(ResponseType::Answer) => match mode {
            Mode::GeneralResearch => check_research(&mut v, data),
            Mode::SuitabilityScoring => check_scoring(&mut v, data),
            Mode::SpecWriter => check_spec(&mut v, data),
            Mode::PolicyCompliance => check_compliance(&mut v, data),
        },
        None => {}
    }
    v
}

fn check_sources_used(v: &mut Validation, sources: &Value) {
    let Some(entries) = sources.as_array() else {
        v.push("meta.sources_used must be an array");
        return;
    };
    for (i, entry) in entries.iter().enumerate() {
        if entry.get("source_id").and_then(Value::as_str).is_none() {
            v.push(format!("meta.sources_used[{}].source_id must be a string", i));
        }
    }
}

fn check_questions(v: &mut Validation, data: &Map<String, Value>) {
    let Some(questions) = data.get("questions").and_then(Value::as_array) else {
        v.push("data.questions must be an array");
        return;
    };
    if questions.is_empty() || questions.len() > MAX_QUESTIONS {
        v.push(format!(
            "data.questions must contain 1-{} questions (got {})",
            MAX_QUESTIONS,
            questions.len()
        ));
    }
    for (i, q) in questions.iter().enumerate() {
        if !q.as_str().is_some_and(|s| !s.trim().is_empty()) {
            v.push(format!("data.questions[{}] must be a non-empty string", i));
        }
    }
}

fn check_research(v: &mut Validation, data: &Map<String, Value>) {
    require_string(v, data, "summary", "data.summary");
    require_string(v, data, "output_label", "data.output_label");

    match data.get("reasoning_summary").and_then(Value::as_object) {
        Some(reasoning) => {
            string_array(v, reasoning, "approach", "data.reasoning_summary.approach", Some((1, 3)));
            string_array(v, reasoning, "assumptions", "data.reasoning_summary.assumptions", None);
            string_array(v, reasoning, "risks", "data.reasoning_summary.risks", None);
        }
        None => v.push("data.reasoning_summary must be an object"),
    }

    string_array(v, data, "follow_ups", "data.follow_ups", Some((3, 3)));
}

fn check_scoring(v: &mut Validation, data: &Map<String, Value>) {
    let Some(results) = data.get("results").and_then(Value::as_array) else {
        v.push("data.results must be an array");
        return;
    };
    if results.is_empty() {
        v.push("data.results must not be empty");
    }
    for (i, result) in results.iter().enumerate() {
        let path = format!("data.results[{}]", i);
        let Some(result) = result.as_object() else {
            v.push(format!("{} must be an object", path));
            continue;
        };
        require_string(v, result, "name", &format!("{}.name", path));
        if !result.get("score").is_some_and(Value::is_number) {
            v.push(format!("{}.score must be a number", path));
        }
        optional_string(v, result, "rationale");
        optional_string_array(v, result, "citations", &format!("{}.citations", path));
    }
    optional_string(v, data, "notes");
}

fn check_spec(v: &mut Validation, data: &Map<String, Value>) {
    require_string(v, data, "specTitle", "data.specTitle");
    match data.get("specFields").and_then(Value::as_array) {
        Some(fields) => {
            if fields.is_empty() {
                v.push("data.specFields must not be empty");
            }
            for (i, field) in fields.iter().enumerate() {
                let path = format!("data.specFields[{}]", i);
                match field.as_object() {
                    Some(field) => {
                        require_string(v, field, "label", &format!("{}.label", path));
                        require_string(v, field, "value", &format!("{}.value", path));
                    }
                    None => v.push(format!("{} must be an object", path)),
                }
            }
        }
        None => v.push("data.specFields must be an array"),
    }
    optional_string_array(v, data, "citations", "data.citations");
}

fn check_compliance(v: &mut Validation, data: &Map<String, Value>) {
    require_string(v, data, "status", "data.status");
    optional_string(v, data, "message");
    let Some(issues) = data.get("issues") else {
        return;
    };
    let Some(issues) = issues.as_array() else {
        v.push("data.issues must be an array");
        return;
    };
    for (i, issue) in issues.iter().enumerate() {
        let path = format!("data.issues[{}]", i);
        match issue.as_object() {
            Some(issue) => {
                require_string(v, issue, "issue", &format!("{}.issue", path));
                optional_string(v, issue, "severity");
                optional_string_array(v, issue, "citations", &format!("{}.citations", path));
            }
            None => v.push(format!("{} must be an object", path)),
        }
    }
}

fn require_string(v: &mut Validation, obj: &Map<String, Value>, key: &str, path: &str) {
    if !obj.get(key).is_some_and(Value::is_string) {
        v.push(format!("{} must be a string", path));
    }
}

fn optional_string(v: &mut Validation, obj: &Map<String, Value>, key: &str) {
    match obj.get(key) {
        None | Some(Value::String(_)) => {}
        Some(_) => v.push(format!("{} must be a string when present", key)),
    }
}

fn string_array(
    v: &mut Validation,
    obj: &Map<String, Value>,
    key: &str,
    path: &str,
    bounds: Option<(usize, usize)>,
) {
    let Some(items) = obj.get(key).and_then(Value::as_array) else {
        v.push(format!("{} must be an array of strings", path));
        return;
    };
    if items.iter().any(|item| !item.is_string()) {
        v.push(format!("{} must contain only strings", path));
    }
    if let Some((min, max)) = bounds {
        if items.len() < min || items.len() > max {
            if min == max {
                v.push(format!("{} must contain exactly {} items (got {})", path, min, items.len()));
            } else {
                v.push(format!(
                    "{} must contain {}-{} items (got {})",
                    path,
                    min,
                    max,
                    items.len()
                ));
            }
        }
    }
}

fn optional_string_array(v: &mut Validation, obj: &Map<String, Value>, key: &str, path: &str) {
    if obj.get(key).is_some() {
        string_array(v, obj, key, path, None);
    }
}

fn describe(value: Option<&Value>) -> String {
    match value {
        None => "nothing".to_string(),
        Some(value) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(mode: Mode, response_type: &str, data: Value) -> Value {
        json!({
            "schemaVersion": mode.schema_version(),
            "meta": {"schema_version": mode.schema_version()},
            "mode": mode.as_str(),
            "responseType": response_type,
            "data": data
        })
    }

    fn research_data() -> Value {
        json!({
            "summary": "Tilia cordata suits narrow streets.",
            "output_label": "Street tree shortlist",
            "reasoning_summary": {
                "approach": ["Filtered by crown width"],
                "assumptions": ["Paved surroundings"],
                "risks": []
            },
            "follow_ups": ["Check soil volume", "Check cables", "Check budget"]
        })
    }

    #[test]
    fn test_valid_answers_per_mode() {
        let cases = [
            (Mode::GeneralResearch, research_data()),
            (
                Mode::SuitabilityScoring,
                json!({"results": [{"name": "Acer campestre", "score": 7, "citations": ["a"]}]}),
            ),
            (
                Mode::SpecWriter,
                json!({
                    "specTitle": "Planting spec",
                    "specFields": [{"label": "Size", "value": "16-18 cm"}],
                    "citations": ["a"]
                }),
            ),
            (Mode::PolicyCompliance, json!({"status": "Compliant", "issues": []})),
        ];
        for (mode, data) in cases {
            let result = validate(mode, &envelope(mode, "answer", data));
            assert!(result.ok(), "{}: {:?}", mode, result.errors);
        }
    }

    #[test]
    fn test_missing_required_field_is_named() {
        let mut data = research_data();
        data.as_object_mut().unwrap().remove("summary");
        let result = validate(Mode::GeneralResearch, &envelope(Mode::GeneralResearch, "answer", data));
        assert!(!result.ok());
        assert!(result.errors.iter().any(|e| e.contains("data.summary")));

        let result = validate(
            Mode::SpecWriter,
            &envelope(Mode::SpecWriter, "answer", json!({"specTitle": "x", "specFields": []})),
        );
        assert!(result.errors.iter().any(|e| e.contains("data.specFields")));

        let result = validate(
            Mode::PolicyCompliance,
            &envelope(Mode::PolicyCompliance, "answer", json!({})),
        );
        assert!(result.errors.iter().any(|e| e.contains("data.status")));
    }

    #[test]
    fn test_follow_ups_must_be_exactly_three() {
        let mut data = research_data();
        data["follow_ups"] = json!(["one", "two"]);
        let result = validate(Mode::GeneralResearch, &envelope(Mode::GeneralResearch, "answer", data));
        assert!(result.errors.iter().any(|e| e.contains("data.follow_ups")));

        let mut data = research_data();
        data["reasoning_summary"]["approach"] = json!([]);
        let result = validate(Mode::GeneralResearch, &envelope(Mode::GeneralResearch, "answer", data));
        assert!(result
            .errors
            .iter()
            .any(|e| e.contains("data.reasoning_summary.approach")));
    }

    #[test]
    fn test_scoring_results_must_not_be_empty() {
        let result = validate(
            Mode::SuitabilityScoring,
            &envelope(Mode::SuitabilityScoring, "answer", json!({"results": []})),
        );
        assert_eq!(result.errors, vec!["data.results must not be empty".to_string()]);
    }

    #[test]
    fn test_clarifying_questions_bounds() {
        for mode in Mode::ALL {
            let ok = validate(mode, &envelope(mode, "clarifying_questions", json!({"questions": ["Where?"]})));
            assert!(ok.ok());
            let too_many = validate(
                mode,
                &envelope(mode, "clarifying_questions", json!({"questions": ["a", "b", "c", "d"]})),
            );
            assert!(!too_many.ok());
            let blank = validate(mode, &envelope(mode, "clarifying_questions", json!({"questions": [" "]})));
            assert!(blank.errors.iter().any(|e| e.contains("data.questions[0]")));
        }
    }

    #[test]
    fn test_envelope_level_checks() {
        let mut value = envelope(Mode::SpecWriter, "answer", json!({}));
        value["schemaVersion"] = json!("v9");
        value["mode"] = json!("general_research");
        value["responseType"] = json!("essay");
        let result = validate(Mode::SpecWriter, &value);
        assert!(result.errors.iter().any(|e| e.starts_with("schemaVersion")));
        assert!(result.errors.iter().any(|e| e.starts_with("mode")));
        assert!(result.errors.iter().any(|e| e.starts_with("responseType")));

        let result = validate(Mode::SpecWriter, &json!([1, 2]));
        assert_eq!(result.errors, vec!["envelope must be a JSON object".to_string()]);

        let mut value = envelope(Mode::SpecWriter, "answer", json!({}));
        value["data"] = json!("text");
        assert!(validate(Mode::SpecWriter, &value)
            .errors
            .contains(&"data must be an object".to_string()));
    }

    #[test]
    fn test_version_errors() {
        let value = envelope(Mode::GeneralResearch, "answer", research_data());
        assert!(version_errors(Mode::GeneralResearch, &value).is_empty());
        assert_eq!(version_errors(Mode::SpecWriter, &value).len(), 2);
    }
}
