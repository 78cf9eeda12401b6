pub mod citations;
pub mod envelope;
pub mod extract;
pub mod gate;
pub mod keywords;
pub mod mode;
pub mod prompts;
pub mod repair;
pub mod schema;
pub mod work_order;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use crate::chat::{ChatMessage, ContextSnapshot, Grounding, Sender, SuggestedAction};
use crate::docs::types::{ContextItem, SelectedDoc};
use crate::evidence::{EvidenceAssembler, EvidencePack, EvidenceRequest};
use crate::llm::{preview, Generate};
use crate::state::OrchestratorConfig;
use citations::{derive_citations, Citation};
use envelope::ResponseEnvelope;
use repair::RunResult;
use work_order::{ResponseMode, WorkOrder, WorkOrderInput};

/// One user turn as it arrives from the caller.
#[derive(Debug, Clone, Default)]
pub struct AskRequest {
    pub ui_action: Option<String>,
    pub query: String,
    pub context_items: Vec<ContextItem>,
    pub selected_docs: Vec<SelectedDoc>,
    pub view_context: Option<String>,
    pub response_mode: ResponseMode,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// The sufficiency gate answered without retrieval or generation.
    Gated { envelope: ResponseEnvelope },
    Generated { result: RunResult },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub work_order: WorkOrder,
    #[serde(flatten)]
    pub outcome: Outcome,
    pub citations: Vec<Citation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grounding: Option<Grounding>,
}

impl Answer {
    pub fn envelope(&self) -> Option<&ResponseEnvelope> {
        match &self.outcome {
            Outcome::Gated { envelope } => Some(envelope),
            Outcome::Generated { result } => result.payload.as_ref(),
        }
    }

    pub fn ok(&self) -> bool {
        match &self.outcome {
            Outcome::Gated { .. } => true,
            Outcome::Generated { result } => result.ok,
        }
    }

    /// The assistant chat message for this turn.
    pub fn to_message(&self) -> ChatMessage {
        let order = &self.work_order;
        let mut message = ChatMessage::text(Sender::Assistant, self.display_text());
        message.flora_gpt = self.envelope().cloned();
        message.citations = (!self.citations.is_empty()).then(|| self.citations.clone());
        message.context_snapshot = Some(ContextSnapshot {
            project_id: order.project_id.clone(),
            mode: order.mode,
            schema_version: order.schema_version.clone(),
            selected_docs: order.selected_docs.clone(),
        });
        message.grounding = self.grounding.clone();
        message.suggested_actions = self
            .envelope()
            .map(suggested_actions)
            .filter(|actions| !actions.is_empty());
        message
    }

    fn display_text(&self) -> String {
        match (&self.outcome, self.envelope()) {
            (_, Some(envelope)) => envelope.display_text(),
            (Outcome::Generated { result }, None) => match result.failure_reason {
                Some(reason) => format!("No structured answer could be produced ({}).", reason),
                None => "No structured answer could be produced.".to_string(),
            },
            (Outcome::Gated { .. }, None) => String::new(),
        }
    }
}

fn suggested_actions(envelope: &ResponseEnvelope) -> Vec<SuggestedAction> {
    envelope
        .follow_ups()
        .iter()
        .map(|follow_up| SuggestedAction {
            label: preview(follow_up, 60),
            prompt: follow_up.clone(),
        })
        .collect()
}

/// Resolve, gate, assemble evidence, generate and check one turn.
pub struct Orchestrator {
    generator: Arc<dyn Generate>,
    assembler: EvidenceAssembler,
}

impl Orchestrator {
    pub fn new(generator: Arc<dyn Generate>, config: &OrchestratorConfig) -> Self {
        Self::with_assembler(
            generator,
            EvidenceAssembler::new(config.top_k, config.snippet_chars)
                .with_scope_timeout(Duration::from_secs(config.scope_timeout_secs)),
        )
    }

    pub fn with_assembler(generator: Arc<dyn Generate>, assembler: EvidenceAssembler) -> Self {
        Self {
            generator,
            assembler,
        }
    }

    pub async fn answer(&self, request: AskRequest) -> Answer {
        let mode = mode::resolve(
            request.ui_action.as_deref(),
            &request.query,
            &request.selected_docs,
        );
        let order = work_order::build(
            mode,
            WorkOrderInput {
                user_query: &request.query,
                context_items: &request.context_items,
                selected_docs: &request.selected_docs,
                view_context: request.view_context.as_deref(),
                response_mode: request.response_mode,
            },
        );
        info!(
            mode = %order.mode,
            project_id = %order.project_id,
            language = order.user_language.code(),
            selected = order.selected_docs.len(),
            "work order built"
        );

        if let Some(envelope) = gate::check(&order) {
            return Answer {
                work_order: order,
                outcome: Outcome::Gated { envelope },
                citations: vec![],
                grounding: None,
            };
        }

        let pack = self
            .assembler
            .build(EvidenceRequest {
                mode: order.mode,
                project_id: order.project_id.clone(),
                query: order.user_query.clone(),
                context_items: request.context_items,
                selected_docs: order.selected_docs.clone(),
                evidence_policy: Some(order.evidence_policy),
            })
            .await;

        let result = repair::run(&order, &pack, self.generator.as_ref()).await;
        let citations = result
            .payload
            .as_ref()
            .map(|envelope| derive_citations(envelope, &pack))
            .unwrap_or_default();
        let grounding = grounding(&pack, &result);

        Answer {
            work_order: order,
            outcome: Outcome::Generated { result },
            citations,
            grounding: Some(grounding),
        }
    }
}

fn grounding(pack: &EvidencePack, result: &RunResult) -> Grounding {
    Grounding {
        global_hits: pack.global_hits.len(),
        project_hits: pack.project_hits.len(),
        policy_hits: pack.policy_hits.len(),
        sources_used: result
            .payload
            .as_ref()
            .map(|envelope| {
                envelope
                    .referenced_source_ids()
                    .into_iter()
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        repair_attempted: result.repair_attempted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docs::types::{Scope, SourceType};
    use crate::llm::scripted::ScriptedGenerator;
    use crate::orchestrator::envelope::{ResponseData, ResponseType};
    use crate::orchestrator::mode::Mode;
    use serde_json::json;

    fn item(id: &str, source: &str, project: Option<&str>, content: &str) -> ContextItem {
        ContextItem {
            id: id.to_string(),
            item_id: None,
            name: format!("{} doc", id),
            source: source.to_string(),
            project_id: project.map(str::to_string),
            content: Some(content.to_string()),
        }
    }

    fn research_reply(source: &str) -> String {
        json!({
            "schemaVersion": "v0.2",
            "meta": {"schema_version": "v0.2", "sources_used": [{"source_id": source}]},
            "mode": "general_research",
            "responseType": "answer",
            "data": {
                "summary": "Tilia cordata suits narrow clay streets.",
                "output_label": "Street trees",
                "reasoning_summary": {"approach": ["Read the survey"], "assumptions": [], "risks": ["Aphids"]},
                "follow_ups": ["Score these species", "Write a planting spec", "Check the policy"]
            }
        })
        .to_string()
    }

    fn orchestrator(generator: Arc<ScriptedGenerator>) -> Orchestrator {
        Orchestrator::new(generator, &OrchestratorConfig::default())
    }

    #[tokio::test]
    async fn test_gate_short_circuits_without_model_call() {
        let generator = Arc::new(ScriptedGenerator::replying(&[]));
        let answer = orchestrator(generator.clone())
            .answer(AskRequest {
                query: "trees".to_string(),
                ..Default::default()
            })
            .await;

        assert_eq!(generator.calls(), 0);
        let envelope = answer.envelope().unwrap();
        assert_eq!(envelope.response_type, ResponseType::ClarifyingQuestions);
        assert!(answer.grounding.is_none());

        let message = answer.to_message();
        assert_eq!(message.sender, Sender::Assistant);
        assert_eq!(message.text.lines().count(), 3);
    }

    #[tokio::test]
    async fn test_research_turn_end_to_end() {
        let generator = Arc::new(ScriptedGenerator::replying(&[research_reply("s1")]));
        let answer = orchestrator(generator.clone())
            .answer(AskRequest {
                query: "Which trees give shade on a narrow street with clay soil?".to_string(),
                context_items: vec![
                    item("s1", "upload", Some("p1"), "Narrow street with clay soil."),
                    item("x9", "upload", Some("p2"), "Confidential p2 survey"),
                    item("kb1", "global_kb", None, "Tilia cordata tolerates clay."),
                ],
                ..Default::default()
            })
            .await;

        assert!(answer.ok());
        assert_eq!(generator.calls(), 1);
        let request = &generator.requests.lock().unwrap()[0];
        let payload = request.user_payload.to_string();
        assert!(!payload.contains("Confidential p2 survey"));
        assert_eq!(request.user_payload["workOrder"]["projectId"], "p1");

        let grounding = answer.grounding.clone().unwrap();
        assert_eq!(grounding.project_hits, 1);
        assert_eq!(grounding.global_hits, 1);
        assert_eq!(grounding.sources_used, vec!["s1"]);
        assert!(!grounding.repair_attempted);

        assert_eq!(answer.citations.len(), 1);
        assert_eq!(answer.citations[0].source_id, "s1");

        let message = answer.to_message();
        assert_eq!(message.text, "Tilia cordata suits narrow clay streets.");
        let snapshot = message.context_snapshot.clone().unwrap();
        assert_eq!(snapshot.project_id, "p1");
        assert_eq!(snapshot.schema_version, "v0.2");
        let actions = message.suggested_actions.clone().unwrap();
        assert_eq!(actions.len(), 3);
        assert_eq!(actions[1].prompt, "Write a planting spec");

        let row = message.encode("t1").unwrap();
        assert_eq!(ChatMessage::decode(&row).unwrap(), message);
    }

    #[tokio::test]
    async fn test_ui_action_selects_mode() {
        let generator = Arc::new(ScriptedGenerator::replying(&[]));
        let answer = orchestrator(generator)
            .answer(AskRequest {
                ui_action: Some("policy_compliance".to_string()),
                query: "Check this plan".to_string(),
                ..Default::default()
            })
            .await;
        assert_eq!(answer.work_order.mode, Mode::PolicyCompliance);
        // No policy manual attached: the gate answers Unknown.
        match &answer.envelope().unwrap().data {
            ResponseData::Compliance(c) => assert_eq!(c.status, "Unknown"),
            other => panic!("expected compliance answer, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_policy_evidence_reaches_compliance_turn() {
        let reply = json!({
            "schemaVersion": "v0.1",
            "meta": {"schema_version": "v0.1"},
            "mode": "policy_compliance",
            "responseType": "answer",
            "data": {
                "status": "Non-compliant",
                "issues": [{"issue": "Tree within 2m of facade", "citations": ["pm1"]}]
            }
        })
        .to_string();
        let generator = Arc::new(ScriptedGenerator::replying(&[reply]));
        let answer = orchestrator(generator.clone())
            .answer(AskRequest {
                query: "Is this planting allowed by the policy?".to_string(),
                context_items: vec![
                    item("pm1", "policy_manual", Some("p1"), "Trees keep 2m from facades."),
                    item("pm2", "policy_manual", Some("p1"), "Unselected manual"),
                ],
                selected_docs: vec![SelectedDoc {
                    source_id: "pm1".to_string(),
                    source_type: SourceType::PolicyManual,
                    scope: Scope::Project("p1".to_string()),
                    title: Some("Tree policy".to_string()),
                }],
                ..Default::default()
            })
            .await;

        assert_eq!(answer.work_order.mode, Mode::PolicyCompliance);
        assert!(answer.ok());
        let grounding = answer.grounding.clone().unwrap();
        assert_eq!(grounding.policy_hits, 1);
        assert_eq!(answer.citations[0].kind, SourceType::PolicyManual);
        let payload = generator.requests.lock().unwrap()[0].user_payload.to_string();
        assert!(!payload.contains("Unselected manual"));
    }

    #[tokio::test]
    async fn test_failed_generation_still_yields_message() {
        let generator = Arc::new(ScriptedGenerator::replying(&["no json here".to_string()]));
        let answer = orchestrator(generator)
            .answer(AskRequest {
                query: "Which trees give shade on a narrow street with clay soil?".to_string(),
                ..Default::default()
            })
            .await;
        assert!(!answer.ok());
        assert!(answer.envelope().is_none());
        let message = answer.to_message();
        assert!(message.flora_gpt.is_none());
        assert!(message.text.contains("json-extraction-failed"));

        let value = serde_json::to_value(&answer).unwrap();
        assert_eq!(value["outcome"], "generated");
        assert_eq!(value["result"]["failureReason"], "json-extraction-failed");
    }
}
