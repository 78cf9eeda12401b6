use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::citations::{find_citation_errors, valid_source_ids};
use super::envelope::ResponseEnvelope;
use super::extract::{extract, Extraction};
use super::keywords::Language;
use super::mode::Mode;
use super::prompts::{self, Diagnostic};
use super::schema::{validate, version_errors};
use super::work_order::WorkOrder;
use crate::evidence::EvidencePack;
use crate::llm::{preview, Generate, GenerationRequest};

/// Model calls per request: the original plus one repair.
pub const MAX_MODEL_CALLS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    #[error("json-extraction-failed")]
    JsonExtractionFailed,
    #[error("json-parse-error")]
    JsonParseError,
    #[error("schema-version-mismatch")]
    SchemaVersionMismatch,
    #[error("schema-validation-failed")]
    SchemaValidationFailed,
    #[error("citation-validation-failed")]
    CitationValidationFailed,
    #[error("generation-failed")]
    GenerationFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<ResponseEnvelope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    pub repair_attempted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version_received: Option<String>,
}

enum Check {
    Passed(ResponseEnvelope),
    Repairable {
        reason: FailureReason,
        diagnostic: Diagnostic,
    },
    Terminal {
        reason: FailureReason,
        errors: Vec<String>,
    },
}

struct Reply {
    raw: String,
    schema_version: Option<String>,
    check: Check,
}

fn check_reply(order: &WorkOrder, pack: &EvidencePack, raw: String) -> Reply {
    let value: Value = match extract(&raw) {
        Extraction::Found { json_text, strategy } => {
            debug!(?strategy, "json extracted");
            match serde_json::from_str(&json_text) {
                Ok(value) => value,
                Err(e) => {
                    return Reply {
                        raw,
                        schema_version: None,
                        check: Check::Terminal {
                            reason: FailureReason::JsonParseError,
                            errors: vec![e.to_string()],
                        },
                    }
                }
            }
        }
        Extraction::Malformed { error, .. } => {
            return Reply {
                raw,
                schema_version: None,
                check: Check::Terminal {
                    reason: FailureReason::JsonParseError,
                    errors: vec![error],
                },
            }
        }
        Extraction::NotFound { reason } => {
            return Reply {
                raw,
                schema_version: None,
                check: Check::Terminal {
                    reason: FailureReason::JsonExtractionFailed,
                    errors: vec![reason],
                },
            }
        }
    };

    let schema_version = value
        .get("schemaVersion")
        .and_then(Value::as_str)
        .map(str::to_string);
    let check = check_value(order, pack, value);
    Reply {
        raw,
        schema_version,
        check,
    }
}

fn check_value(order: &WorkOrder, pack: &EvidencePack, value: Value) -> Check {
    let errors = version_errors(order.mode, &value);
    if !errors.is_empty() {
        return Check::Repairable {
            reason: FailureReason::SchemaVersionMismatch,
            diagnostic: Diagnostic::VersionMismatch {
                expected: order.schema_version.clone(),
                errors,
            },
        };
    }

    let validation = validate(order.mode, &value);
    if !validation.ok() {
        return Check::Repairable {
            reason: FailureReason::SchemaValidationFailed,
            diagnostic: Diagnostic::Validation {
                errors: validation.errors,
            },
        };
    }

    let envelope: ResponseEnvelope = match serde_json::from_value(value) {
        Ok(envelope) => envelope,
        Err(e) => {
            return Check::Repairable {
                reason: FailureReason::SchemaValidationFailed,
                diagnostic: Diagnostic::Validation {
                    errors: vec![e.to_string()],
                },
            }
        }
    };

    let errors = find_citation_errors(&envelope, pack, order);
    if !errors.is_empty() {
        return Check::Repairable {
            reason: FailureReason::CitationValidationFailed,
            diagnostic: Diagnostic::Citations {
                errors,
                valid_ids: valid_source_ids(pack, order),
            },
        };
    }

    Check::Passed(envelope)
}

fn insufficient_evidence_message(language: Language) -> &'static str {
    match language {
        Language::English => {
            "I could not ground an answer in the available evidence. Select or upload documents that cover this question and ask again."
        }
        Language::Dutch => {
            "Ik kon geen antwoord onderbouwen met het beschikbare bewijs. Selecteer of upload documenten over deze vraag en probeer het opnieuw."
        }
    }
}

/// Generate, check, and repair at most once.
///
/// Each reply passes through extraction, the version check, structural
/// validation and the citation check in that order. The first failing stage
/// either ends the run or, while model calls remain, sends one repair request
/// carrying that stage's diagnostic. Failures are returned as [`RunResult`]
/// values, never as errors.
pub async fn run(order: &WorkOrder, pack: &EvidencePack, generator: &dyn Generate) -> RunResult {
    let mut request = GenerationRequest {
        system_instruction: prompts::system_instruction(order.mode),
        user_payload: prompts::initial_request(order, pack),
    };
    let mut calls = 0;

    loop {
        calls += 1;
        let repair_attempted = calls > 1;
        let raw = match generator.generate(&request).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(mode = %order.mode, "generation failed: {:#}", e);
                return RunResult {
                    ok: false,
                    payload: None,
                    raw_text: None,
                    errors: vec![format!("{:#}", e)],
                    repair_attempted,
                    failure_reason: Some(FailureReason::GenerationFailed),
                    schema_version_received: None,
                };
            }
        };
        debug!(preview = %preview(&raw, 300), "model reply");

        let reply = check_reply(order, pack, raw);
        match reply.check {
            Check::Passed(envelope) => {
                info!(
                    mode = %order.mode,
                    response_type = envelope.response_type.as_str(),
                    repair_attempted,
                    "reply accepted"
                );
                return RunResult {
                    ok: true,
                    payload: Some(envelope),
                    raw_text: Some(reply.raw),
                    errors: vec![],
                    repair_attempted,
                    failure_reason: None,
                    schema_version_received: reply.schema_version,
                };
            }
            Check::Terminal { reason, errors } => {
                warn!(mode = %order.mode, %reason, "reply rejected");
                return RunResult {
                    ok: false,
                    payload: None,
                    raw_text: Some(reply.raw),
                    errors,
                    repair_attempted,
                    failure_reason: Some(reason),
                    schema_version_received: reply.schema_version,
                };
            }
            Check::Repairable { reason, diagnostic } if calls < MAX_MODEL_CALLS => {
                warn!(
                    mode = %order.mode,
                    stage = diagnostic.stage(),
                    errors = diagnostic.errors().len(),
                    "requesting repair"
                );
                request.user_payload =
                    prompts::repair_request(order, pack, &reply.raw, &diagnostic);
                debug!(%reason, "repair request sent");
            }
            Check::Repairable { reason, diagnostic } => {
                let errors = diagnostic.errors().to_vec();
                if reason == FailureReason::CitationValidationFailed
                    && order.mode == Mode::GeneralResearch
                {
                    warn!(
                        mode = %order.mode,
                        errors = errors.len(),
                        "citations still invalid after repair, answering with insufficient evidence"
                    );
                    return RunResult {
                        ok: true,
                        payload: Some(ResponseEnvelope::error(
                            order.mode,
                            insufficient_evidence_message(order.user_language),
                        )),
                        raw_text: Some(reply.raw),
                        errors,
                        repair_attempted,
                        failure_reason: None,
                        schema_version_received: reply.schema_version,
                    };
                }
                warn!(mode = %order.mode, %reason, "repair failed");
                return RunResult {
                    ok: false,
                    payload: None,
                    raw_text: Some(reply.raw),
                    errors,
                    repair_attempted,
                    failure_reason: Some(reason),
                    schema_version_received: reply.schema_version,
                };
            }
        }
    }
}
