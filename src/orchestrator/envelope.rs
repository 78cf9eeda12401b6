use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::mode::Mode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    Answer,
    ClarifyingQuestions,
    Error,
}

impl ResponseType {
    pub const ALL: [ResponseType; 3] = [
        ResponseType::Answer,
        ResponseType::ClarifyingQuestions,
        ResponseType::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Answer => "answer",
            Self::ClarifyingQuestions => "clarifying_questions",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceUsed {
    pub source_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    pub schema_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources_used: Option<Vec<SourceUsed>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningSummary {
    pub approach: Vec<String>,
    pub assumptions: Vec<String>,
    pub risks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchAnswer {
    pub summary: String,
    pub output_label: String,
    pub reasoning_summary: ReasoningSummary,
    pub follow_ups: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredResult {
    pub name: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    #[serde(default)]
    pub citations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringAnswer {
    pub results: Vec<ScoredResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecField {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecAnswer {
    pub spec_title: String,
    pub spec_fields: Vec<SpecField>,
    #[serde(default)]
    pub citations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceIssue {
    pub issue: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default)]
    pub citations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceAnswer {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub issues: Vec<ComplianceIssue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarifyingQuestions {
    pub questions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseData {
    Research(ResearchAnswer),
    Scoring(ScoringAnswer),
    Spec(SpecAnswer),
    Compliance(ComplianceAnswer),
    ClarifyingQuestions(ClarifyingQuestions),
    Error(ErrorData),
}

impl ResponseData {
    /// Decode `data` for a given discriminant pair.
    pub fn from_value(
        mode: Mode,
        response_type: ResponseType,
        data: Value,
    ) -> Result<Self, serde_json::Error> {
        Ok(match (response_type, mode) {
            (ResponseType::ClarifyingQuestions, _) => {
                Self::ClarifyingQuestions(serde_json::from_value(data)?)
            }
            (ResponseType::Error, _) => Self::Error(serde_json::from_value(data)?),
            (ResponseType::Answer, Mode::GeneralResearch) => {
                Self::Research(serde_json::from_value(data)?)
            }
            (ResponseType::Answer, Mode::SuitabilityScoring) => {
                Self::Scoring(serde_json::from_value(data)?)
            }
            (ResponseType::Answer, Mode::SpecWriter) => Self::Spec(serde_json::from_value(data)?),
            (ResponseType::Answer, Mode::PolicyCompliance) => {
                Self::Compliance(serde_json::from_value(data)?)
            }
        })
    }
}

/// Wire form with the discriminants outside `data`; decoding dispatches on
/// `(mode, responseType)`.
#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "schemaVersion")]
    schema_version: String,
    meta: Meta,
    mode: Mode,
    #[serde(rename = "responseType")]
    response_type: ResponseType,
    data: Value,
}

impl TryFrom<RawEnvelope> for ResponseEnvelope {
    type Error = serde_json::Error;

    fn try_from(raw: RawEnvelope) -> Result<Self, Self::Error> {
        Ok(Self {
            data: ResponseData::from_value(raw.mode, raw.response_type, raw.data)?,
            schema_version: raw.schema_version,
            meta: raw.meta,
            mode: raw.mode,
            response_type: raw.response_type,
        })
    }
}

/// The strictly-typed result of a generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawEnvelope")]
pub struct ResponseEnvelope {
    pub schema_version: String,
    pub meta: Meta,
    pub mode: Mode,
    pub response_type: ResponseType,
    pub data: ResponseData,
}

impl ResponseEnvelope {
    pub fn new(
        mode: Mode,
        response_type: ResponseType,
        data: ResponseData,
        sources_used: Option<Vec<SourceUsed>>,
    ) -> Self {
        Self {
            schema_version: mode.schema_version().to_string(),
            meta: Meta {
                schema_version: mode.schema_version().to_string(),
                sources_used,
            },
            mode,
            response_type,
            data,
        }
    }

    pub fn clarifying(mode: Mode, questions: Vec<String>) -> Self {
        Self::new(
            mode,
            ResponseType::ClarifyingQuestions,
            ResponseData::ClarifyingQuestions(ClarifyingQuestions { questions }),
            None,
        )
    }

    pub fn error(mode: Mode, message: impl Into<String>) -> Self {
        Self::new(
            mode,
            ResponseType::Error,
            ResponseData::Error(ErrorData {
                message: Some(message.into()),
            }),
            None,
        )
    }

    /// Every source id the envelope points at, in first-reference order, de-duplicated.
    pub fn referenced_source_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        if let Some(sources) = &self.meta.sources_used {
            ids.extend(sources.iter().map(|s| s.source_id.as_str()));
        }
        match &self.data {
            ResponseData::Scoring(scoring) => {
                for result in &scoring.results {
                    ids.extend(result.citations.iter().map(String::as_str));
                }
            }
            ResponseData::Spec(spec) => ids.extend(spec.citations.iter().map(String::as_str)),
            ResponseData::Compliance(compliance) => {
                for issue in &compliance.issues {
                    ids.extend(issue.citations.iter().map(String::as_str));
                }
            }
            _ => {}
        }
        let mut seen = std::collections::HashSet::new();
        ids.retain(|id| seen.insert(*id));
        ids
    }

    pub fn follow_ups(&self) -> &[String] {
        match &self.data {
            ResponseData::Research(research) => &research.follow_ups,
            _ => &[],
        }
    }

    /// Plain-text rendering for the chat message body.
    pub fn display_text(&self) -> String {
        match &self.data {
            ResponseData::Research(research) => research.summary.clone(),
            ResponseData::Scoring(scoring) => scoring
                .results
                .iter()
                .map(|r| format!("{} ({})", r.name, r.score))
                .collect::<Vec<_>>()
                .join(", "),
            ResponseData::Spec(spec) => spec.spec_title.clone(),
            ResponseData::Compliance(compliance) => match &compliance.message {
                Some(message) => format!("{}: {}", compliance.status, message),
                None => compliance.status.clone(),
            },
            ResponseData::ClarifyingQuestions(clarifying) => clarifying.questions.join("\n"),
            ResponseData::Error(error) => error
                .message
                .clone()
                .unwrap_or_else(|| "The assistant could not produce an answer.".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_dispatches_on_mode_and_type() {
        let value = json!({
            "schemaVersion": "v0.1",
            "meta": {"schema_version": "v0.1", "sources_used": [{"source_id": "a"}]},
            "mode": "suitability_scoring",
            "responseType": "answer",
            "data": {"results": [{"name": "Tilia cordata", "score": 8.5, "citations": ["a", "b"]}]}
        });
        let envelope: ResponseEnvelope = serde_json::from_value(value.clone()).unwrap();
        assert!(matches!(envelope.data, ResponseData::Scoring(_)));
        assert_eq!(envelope.referenced_source_ids(), vec!["a", "b"]);
        assert_eq!(serde_json::to_value(&envelope).unwrap(), value);
    }

    #[test]
    fn test_clarifying_shape_for_any_mode() {
        let envelope = ResponseEnvelope::clarifying(
            Mode::SpecWriter,
            vec!["Which plant?".to_string()],
        );
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["responseType"], "clarifying_questions");
        assert_eq!(value["schemaVersion"], "v0.1");
        assert_eq!(value["meta"]["schema_version"], "v0.1");
        assert!(value["meta"].get("sources_used").is_none());
        assert_eq!(value["data"]["questions"][0], "Which plant?");
        let back: ResponseEnvelope = serde_json::from_value(value).unwrap();
        assert_eq!(back, envelope);
    }

    #[test]
    fn test_wrong_data_shape_is_rejected() {
        let value = json!({
            "schemaVersion": "v0.1",
            "meta": {"schema_version": "v0.1"},
            "mode": "spec_writer",
            "responseType": "answer",
            "data": {"summary": "not a spec"}
        });
        assert!(serde_json::from_value::<ResponseEnvelope>(value).is_err());
    }

    #[test]
    fn test_display_text() {
        let envelope = ResponseEnvelope::error(Mode::GeneralResearch, "No evidence.");
        assert_eq!(envelope.display_text(), "No evidence.");
        assert!(envelope.follow_ups().is_empty());
    }
}
