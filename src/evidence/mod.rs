pub mod tools;

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::docs::types::{ContextItem, Scope, SelectedDoc, SourceType};
use crate::orchestrator::mode::Mode;
use crate::orchestrator::work_order::EvidencePolicy;
use tools::{
    compress, rerank, retain_scope, GlobalRetriever, PolicyRetriever, ProjectRetriever,
    RetrievalQuery, RetrievalTool,
};

/// One retrieved, titled, scoped snippet with a stable source id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceHit {
    pub source_id: String,
    pub source_type: SourceType,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_hint: Option<String>,
    pub snippet: String,
    pub scope: Scope,
}

/// The bounded, scope-filtered evidence for a single request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidencePack {
    pub global_hits: Vec<EvidenceHit>,
    pub project_hits: Vec<EvidenceHit>,
    pub policy_hits: Vec<EvidenceHit>,
}

impl EvidencePack {
    pub fn is_empty(&self) -> bool {
        self.global_hits.is_empty() && self.project_hits.is_empty() && self.policy_hits.is_empty()
    }

    pub fn hits(&self) -> impl Iterator<Item = &EvidenceHit> {
        self.project_hits
            .iter()
            .chain(self.policy_hits.iter())
            .chain(self.global_hits.iter())
    }

    pub fn source_ids(&self) -> HashSet<&str> {
        self.hits().map(|h| h.source_id.as_str()).collect()
    }

    pub fn find(&self, source_id: &str) -> Option<&EvidenceHit> {
        self.hits().find(|h| h.source_id == source_id)
    }
}

/// Default deadline for a single retrieval scope.
pub const DEFAULT_SCOPE_TIMEOUT: Duration = Duration::from_secs(20);

/// Inputs to [`EvidenceAssembler::build`].
#[derive(Debug, Clone)]
pub struct EvidenceRequest {
    pub mode: Mode,
    pub project_id: String,
    pub query: String,
    pub context_items: Vec<ContextItem>,
    pub selected_docs: Vec<SelectedDoc>,
    pub evidence_policy: Option<EvidencePolicy>,
}

pub struct EvidenceAssembler {
    project: Box<dyn RetrievalTool>,
    policy: Box<dyn RetrievalTool>,
    global: Box<dyn RetrievalTool>,
    top_k: usize,
    max_snippet_chars: usize,
    scope_timeout: Duration,
}

impl EvidenceAssembler {
    pub fn new(top_k: usize, max_snippet_chars: usize) -> Self {
        Self::with_tools(
            Box::new(ProjectRetriever),
            Box::new(PolicyRetriever),
            Box::new(GlobalRetriever),
            top_k,
            max_snippet_chars,
        )
    }

    pub fn with_tools(
        project: Box<dyn RetrievalTool>,
        policy: Box<dyn RetrievalTool>,
        global: Box<dyn RetrievalTool>,
        top_k: usize,
        max_snippet_chars: usize,
    ) -> Self {
        Self {
            project,
            policy,
            global,
            top_k,
            max_snippet_chars,
            scope_timeout: DEFAULT_SCOPE_TIMEOUT,
        }
    }

    pub fn with_scope_timeout(mut self, scope_timeout: Duration) -> Self {
        self.scope_timeout = scope_timeout;
        self
    }

    /// Fetch the three scopes concurrently, bound them, and drop anything
    /// outside the requester's scope. A tool that fails or misses the scope
    /// deadline contributes no hits.
    pub async fn build(&self, request: EvidenceRequest) -> EvidencePack {
        let policy = request
            .evidence_policy
            .unwrap_or_else(|| EvidencePolicy::for_selection(&request.selected_docs));
        let include_project = policy.include_project_envelope;
        let include_global = policy.include_global_kb;
        let include_policy = policy.include_policy_docs || request.mode == Mode::PolicyCompliance;

        let query = RetrievalQuery {
            project_id: request.project_id.clone(),
            query: request.query,
            context_items: request.context_items,
            selected_docs: request.selected_docs,
        };

        let (project_hits, policy_hits, global_hits) = futures::join!(
            self.fetch_scope(self.project.as_ref(), &query, include_project),
            self.fetch_scope(self.policy.as_ref(), &query, include_policy),
            self.fetch_scope(self.global.as_ref(), &query, include_global),
        );

        let own_scope = Scope::for_project(&request.project_id);
        let mut pack = EvidencePack {
            global_hits: self.bound(global_hits),
            project_hits: self.bound(project_hits),
            policy_hits: self.bound(policy_hits),
        };

        let dropped = retain_scope(&mut pack.project_hits, &own_scope)
            + retain_scope(&mut pack.policy_hits, &own_scope)
            + retain_scope(&mut pack.global_hits, &Scope::Global);
        if dropped > 0 {
            warn!(dropped, scope = %own_scope, "dropped cross-scope evidence hits");
        }

        info!(
            project_hits = pack.project_hits.len(),
            policy_hits = pack.policy_hits.len(),
            global_hits = pack.global_hits.len(),
            "evidence pack assembled"
        );
        pack
    }

    async fn fetch_scope(
        &self,
        tool: &dyn RetrievalTool,
        query: &RetrievalQuery,
        enabled: bool,
    ) -> Vec<EvidenceHit> {
        if !enabled {
            return vec![];
        }
        match tokio::time::timeout(self.scope_timeout, tool.fetch(query)).await {
            Ok(Ok(hits)) => hits,
            Ok(Err(e)) => {
                warn!(tool = tool.name(), "retrieval failed, scope left empty: {:#}", e);
                vec![]
            }
            Err(_) => {
                warn!(
                    tool = tool.name(),
                    timeout_ms = self.scope_timeout.as_millis() as u64,
                    "retrieval timed out, scope left empty"
                );
                vec![]
            }
        }
    }

    fn bound(&self, hits: Vec<EvidenceHit>) -> Vec<EvidenceHit> {
        rerank(hits, self.top_k)
            .into_iter()
            .map(|hit| compress(hit, self.max_snippet_chars))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;

    struct FixedTool(Vec<EvidenceHit>);

    #[async_trait]
    impl RetrievalTool for FixedTool {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn fetch(&self, _query: &RetrievalQuery) -> Result<Vec<EvidenceHit>> {
            Ok(self.0.clone())
        }
    }

    struct FailingTool;

    #[async_trait]
    impl RetrievalTool for FailingTool {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn fetch(&self, _query: &RetrievalQuery) -> Result<Vec<EvidenceHit>> {
            anyhow::bail!("source unavailable")
        }
    }

    struct StalledTool;

    #[async_trait]
    impl RetrievalTool for StalledTool {
        fn name(&self) -> &'static str {
            "stalled"
        }

        async fn fetch(&self, _query: &RetrievalQuery) -> Result<Vec<EvidenceHit>> {
            futures::future::pending().await
        }
    }

    fn hit(id: &str, scope: Scope) -> EvidenceHit {
        EvidenceHit {
            source_id: id.to_string(),
            source_type: SourceType::Upload,
            title: id.to_string(),
            location_hint: None,
            snippet: "x".repeat(900),
            scope,
        }
    }

    fn request(mode: Mode, project_id: &str) -> EvidenceRequest {
        EvidenceRequest {
            mode,
            project_id: project_id.to_string(),
            query: "street trees".to_string(),
            context_items: vec![],
            selected_docs: vec![],
            evidence_policy: None,
        }
    }

    #[tokio::test]
    async fn test_cross_scope_hits_never_reach_pack() {
        let project_a = Scope::Project("A".to_string());
        let project_b = Scope::Project("B".to_string());
        let assembler = EvidenceAssembler::with_tools(
            Box::new(FixedTool(vec![hit("a1", project_a.clone()), hit("b1", project_b.clone())])),
            Box::new(FixedTool(vec![hit("b2", project_b.clone())])),
            Box::new(FixedTool(vec![hit("g1", Scope::Global), hit("b3", project_b)])),
            8,
            600,
        );

        let pack = assembler
            .build(request(Mode::PolicyCompliance, "A"))
            .await;
        let ids: Vec<_> = pack.hits().map(|h| h.source_id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "g1"]);
        assert!(pack.hits().all(|h| h.scope == project_a || h.scope == Scope::Global));
        assert!(pack.hits().all(|h| h.snippet.chars().count() <= 600));
    }

    #[tokio::test]
    async fn test_failing_scope_degrades_to_empty() {
        let assembler = EvidenceAssembler::with_tools(
            Box::new(FailingTool),
            Box::new(FailingTool),
            Box::new(FixedTool(vec![hit("g1", Scope::Global)])),
            8,
            600,
        );
        let pack = assembler.build(request(Mode::GeneralResearch, "A")).await;
        assert!(pack.project_hits.is_empty());
        assert_eq!(pack.global_hits.len(), 1);
    }

    #[tokio::test]
    async fn test_stalled_scope_degrades_to_empty() {
        let assembler = EvidenceAssembler::with_tools(
            Box::new(FixedTool(vec![hit("a1", Scope::Project("A".to_string()))])),
            Box::new(StalledTool),
            Box::new(FixedTool(vec![hit("g1", Scope::Global)])),
            8,
            600,
        )
        .with_scope_timeout(Duration::from_millis(50));

        let pack = tokio::time::timeout(
            Duration::from_secs(3),
            assembler.build(request(Mode::PolicyCompliance, "A")),
        )
        .await
        .expect("a stalled scope must not block the pack");
        assert!(pack.policy_hits.is_empty());
        assert_eq!(pack.project_hits[0].source_id, "a1");
        assert_eq!(pack.global_hits[0].source_id, "g1");
    }

    #[tokio::test]
    async fn test_policy_scope_gated_unless_compliance_mode() {
        let assembler = EvidenceAssembler::with_tools(
            Box::new(FixedTool(vec![])),
            Box::new(FixedTool(vec![hit("p1", Scope::Project("A".to_string()))])),
            Box::new(FixedTool(vec![])),
            8,
            600,
        );
        let pack = assembler.build(request(Mode::SuitabilityScoring, "A")).await;
        assert!(pack.policy_hits.is_empty());

        let pack = assembler.build(request(Mode::PolicyCompliance, "A")).await;
        assert_eq!(pack.policy_hits.len(), 1);
    }

    #[tokio::test]
    async fn test_top_k_per_scope() {
        let hits: Vec<_> = (0..12).map(|i| hit(&format!("h{}", i), Scope::Global)).collect();
        let assembler = EvidenceAssembler::with_tools(
            Box::new(FixedTool(vec![])),
            Box::new(FixedTool(vec![])),
            Box::new(FixedTool(hits)),
            8,
            600,
        );
        let pack = assembler.build(request(Mode::GeneralResearch, "global")).await;
        assert_eq!(pack.global_hits.len(), 8);
        assert_eq!(pack.global_hits[7].source_id, "h7");
    }

    #[tokio::test]
    async fn test_default_tools_from_context_items() {
        let assembler = EvidenceAssembler::new(8, 600);
        let mut req = request(Mode::GeneralResearch, "A");
        req.context_items = vec![
            ContextItem {
                id: "u1".to_string(),
                item_id: None,
                name: "Site survey".to_string(),
                source: "upload".to_string(),
                project_id: Some("A".to_string()),
                content: Some("Street trees along the canal".to_string()),
            },
            ContextItem {
                id: "u2".to_string(),
                item_id: None,
                name: "Other project".to_string(),
                source: "upload".to_string(),
                project_id: Some("B".to_string()),
                content: Some("Unrelated".to_string()),
            },
        ];
        let pack = assembler.build(req).await;
        assert_eq!(pack.project_hits.len(), 1);
        assert_eq!(pack.project_hits[0].source_id, "u1");
        assert!(pack.find("u2").is_none());
    }
}
