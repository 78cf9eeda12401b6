use serde::{Deserialize, Serialize};

use super::keywords::{detect_language, Language};
use super::mode::Mode;
use crate::docs::types::{ContextItem, Scope, SelectedDoc, SourceType};

/// How the caller wants the answer rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    #[default]
    Structured,
    Text,
}

/// Which retrieval scopes feed the evidence pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidencePolicy {
    pub include_project_envelope: bool,
    pub include_global_kb: bool,
    pub include_policy_docs: bool,
}

impl EvidencePolicy {
    /// Project and global evidence are always on. Policy documents are only
    /// included when the user attached one.
    pub fn for_selection(selected_docs: &[SelectedDoc]) -> Self {
        Self {
            include_project_envelope: true,
            include_global_kb: true,
            include_policy_docs: selected_docs
                .iter()
                .any(|d| d.source_type == SourceType::PolicyManual),
        }
    }
}

/// Canonical, versioned description of one generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkOrder {
    pub mode: Mode,
    pub schema_version: String,
    pub project_id: String,
    pub user_query: String,
    pub user_language: Language,
    pub response_mode: ResponseMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_context: Option<String>,
    pub selected_docs: Vec<SelectedDoc>,
    pub evidence_policy: EvidencePolicy,
}

impl WorkOrder {
    pub fn scope(&self) -> Scope {
        Scope::for_project(&self.project_id)
    }

    pub fn has_selected(&self, source_type: SourceType) -> bool {
        self.selected_docs.iter().any(|d| d.source_type == source_type)
    }
}

/// Inputs to [`build`].
#[derive(Debug, Clone, Default)]
pub struct WorkOrderInput<'a> {
    pub user_query: &'a str,
    pub context_items: &'a [ContextItem],
    pub selected_docs: &'a [SelectedDoc],
    pub view_context: Option<&'a str>,
    pub response_mode: ResponseMode,
}

pub fn build(mode: Mode, input: WorkOrderInput<'_>) -> WorkOrder {
    let project_id = input
        .context_items
        .first()
        .and_then(|item| item.project_id.clone())
        .unwrap_or_else(|| Scope::GLOBAL_PROJECT.to_string());

    let selected_docs = input.selected_docs.to_vec();

    WorkOrder {
        mode,
        schema_version: mode.schema_version().to_string(),
        project_id,
        user_query: input.user_query.trim().to_string(),
        user_language: detect_language(input.user_query),
        response_mode: input.response_mode,
        view_context: input.view_context.map(str::to_string),
        evidence_policy: EvidencePolicy::for_selection(&selected_docs),
        selected_docs,
    }
}
