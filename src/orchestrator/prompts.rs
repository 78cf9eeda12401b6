use serde_json::{json, Value};

use super::mode::Mode;
use super::work_order::{ResponseMode, WorkOrder};
use crate::evidence::EvidencePack;

pub const BASE_INSTRUCTION: &str = r#"You are FloraGPT, a planting-design assistant for landscape architects and municipal green teams.

You answer ONLY from the evidence pack in the request. Evidence is grouped into projectHits, policyHits and globalHits; every hit has a sourceId. Cite evidence by sourceId exactly as given. Never invent a sourceId, a species fact or a policy rule that the evidence does not support. If the evidence is thin, say so in the answer rather than guessing.

Reply with ONE JSON object and nothing else: no prose before or after it, no markdown fences.

Every reply has this envelope:
{
  "schemaVersion": "<schema version from the work order>",
  "meta": { "schema_version": "<same version>", "sources_used": [{ "source_id": "<sourceId>", "title": "<optional>" }] },
  "mode": "<mode from the work order>",
  "responseType": "answer" | "clarifying_questions" | "error",
  "data": { ... }
}

Use "clarifying_questions" with data {"questions": [1 to 3 short questions]} only when the request cannot be answered without more facts.
Write all natural-language text in the user's language (userLanguage: "en" English, "nl" Dutch)."#;

const RESEARCH_SCHEMA: &str = r#"Mode general_research. For "answer", data is:
{
  "summary": "<the answer, grounded in the evidence>",
  "output_label": "<short title for the answer>",
  "reasoning_summary": { "approach": ["1 to 3 steps"], "assumptions": ["..."], "risks": ["..."] },
  "follow_ups": ["exactly", "three", "follow-up prompts"]
}
meta.sources_used must list every sourceId the summary relies on."#;

const SCORING_SCHEMA: &str = r#"Mode suitability_scoring. For "answer", data is:
{
  "results": [{ "name": "<species or cultivar>", "score": <number 0-10>, "rationale": "<optional>", "citations": ["<sourceId>", "..."] }],
  "notes": "<optional>"
}
results must not be empty and every result must cite at least one sourceId."#;

const SPEC_SCHEMA: &str = r#"Mode spec_writer. For "answer", data is:
{
  "specTitle": "<title>",
  "specFields": [{ "label": "<field>", "value": "<value>" }],
  "citations": ["<sourceId>", "..."]
}
specFields must not be empty and citations must list the sourceIds the specification is based on."#;

const COMPLIANCE_SCHEMA: &str = r#"Mode policy_compliance. For "answer", data is:
{
  "status": "Compliant" | "Non-compliant" | "Unknown",
  "message": "<optional explanation>",
  "issues": [{ "issue": "<what conflicts with policy>", "severity": "<optional>", "citations": ["<policy sourceId>"] }]
}
Every issue must cite the policy evidence it is based on."#;

pub fn system_instruction(mode: Mode) -> String {
    let schema = match mode {
        Mode::GeneralResearch => RESEARCH_SCHEMA,
        Mode::SuitabilityScoring => SCORING_SCHEMA,
        Mode::SpecWriter => SPEC_SCHEMA,
        Mode::PolicyCompliance => COMPLIANCE_SCHEMA,
    };
    format!("{}\n\n{}", BASE_INSTRUCTION, schema)
}

/// What went wrong with the previous reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    VersionMismatch { expected: String, errors: Vec<String> },
    Validation { errors: Vec<String> },
    Citations { errors: Vec<String>, valid_ids: Vec<String> },
}

impl Diagnostic {
    pub fn stage(&self) -> &'static str {
        match self {
            Self::VersionMismatch { .. } => "version",
            Self::Validation { .. } => "validation",
            Self::Citations { .. } => "citations",
        }
    }

    pub fn errors(&self) -> &[String] {
        match self {
            Self::VersionMismatch { errors, .. }
            | Self::Validation { errors }
            | Self::Citations { errors, .. } => errors,
        }
    }

    fn instruction(&self) -> String {
        match self {
            Self::VersionMismatch { expected, .. } => format!(
                "Your reply used the wrong schema version. Set both schemaVersion and meta.schema_version to \"{}\".",
                expected
            ),
            Self::Validation { .. } => {
                "Your reply did not match the required structure. Fix every listed error.".to_string()
            }
            Self::Citations { valid_ids, .. } => format!(
                "Your reply cited sources that are not in the evidence pack, or omitted required citations. Valid source_id values are: {}.",
                if valid_ids.is_empty() {
                    "(none)".to_string()
                } else {
                    valid_ids.join(", ")
                }
            ),
        }
    }
}

fn evidence_payload(pack: &EvidencePack) -> Value {
    json!({
        "projectHits": pack.project_hits,
        "policyHits": pack.policy_hits,
        "globalHits": pack.global_hits,
    })
}

pub fn initial_request(order: &WorkOrder, pack: &EvidencePack) -> Value {
    let mut payload = json!({
        "workOrder": order,
        "evidencePack": evidence_payload(pack),
    });
    if order.response_mode == ResponseMode::Text {
        payload["note"] = json!("Keep data text fields short; the answer is shown as plain text.");
    }
    payload
}

pub fn repair_request(
    order: &WorkOrder,
    pack: &EvidencePack,
    previous_reply: &str,
    diagnostic: &Diagnostic,
) -> Value {
    json!({
        "workOrder": order,
        "evidencePack": evidence_payload(pack),
        "repair": {
            "instruction": diagnostic.instruction(),
            "errors": diagnostic.errors(),
            "previousReply": previous_reply,
        },
    })
}
