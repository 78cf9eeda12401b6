use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::envelope::{ResponseData, ResponseEnvelope, ResponseType};
use super::work_order::WorkOrder;
use crate::docs::types::SourceType;
use crate::evidence::EvidencePack;

/// A resolved reference shown next to an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub source: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: SourceType,
    pub source_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_hint: Option<String>,
}

/// Every citation problem in an answer envelope. Empty when the envelope is
/// not an answer, or when there was no evidence and nothing was selected.
pub fn find_citation_errors(
    envelope: &ResponseEnvelope,
    pack: &EvidencePack,
    order: &WorkOrder,
) -> Vec<String> {
    if envelope.response_type != ResponseType::Answer {
        return vec![];
    }
    if pack.is_empty() && order.selected_docs.is_empty() {
        return vec![];
    }

    let mut valid = pack.source_ids();
    valid.extend(order.selected_docs.iter().map(|d| d.source_id.as_str()));

    let mut errors = Vec::new();
    match &envelope.data {
        ResponseData::Research(_) => match &envelope.meta.sources_used {
            Some(sources) if !sources.is_empty() => {
                check_ids(&mut errors, &valid, sources.iter().map(|s| s.source_id.as_str()));
            }
            _ => errors.push("meta.sources_used must not be empty".to_string()),
        },
        ResponseData::Scoring(scoring) => {
            for (i, result) in scoring.results.iter().enumerate() {
                if result.citations.is_empty() {
                    errors.push(format!("data.results[{}].citations must not be empty", i));
                }
                check_ids(&mut errors, &valid, result.citations.iter().map(String::as_str));
            }
        }
        ResponseData::Spec(spec) => {
            if spec.citations.is_empty() {
                errors.push("data.citations must not be empty".to_string());
            }
            check_ids(&mut errors, &valid, spec.citations.iter().map(String::as_str));
        }
        ResponseData::Compliance(compliance) => {
            let require = !pack.policy_hits.is_empty();
            for (i, issue) in compliance.issues.iter().enumerate() {
                if require && issue.citations.is_empty() {
                    errors.push(format!("data.issues[{}].citations must not be empty", i));
                }
                check_ids(&mut errors, &valid, issue.citations.iter().map(String::as_str));
            }
        }
        ResponseData::ClarifyingQuestions(_) | ResponseData::Error(_) => {}
    }
    errors
}

fn check_ids<'a>(
    errors: &mut Vec<String>,
    valid: &HashSet<&str>,
    ids: impl Iterator<Item = &'a str>,
) {
    for id in ids {
        if !valid.contains(id) {
            errors.push(format!("unknown source_id: {}", id));
        }
    }
}

/// Citations for every source the envelope references, in first-reference
/// order. Ids without a matching hit are skipped.
pub fn derive_citations(envelope: &ResponseEnvelope, pack: &EvidencePack) -> Vec<Citation> {
    envelope
        .referenced_source_ids()
        .into_iter()
        .filter_map(|id| pack.find(id))
        .map(|hit| Citation {
            source: hit.title.clone(),
            text: hit.snippet.clone(),
            kind: hit.source_type,
            source_id: hit.source_id.clone(),
            location_hint: hit.location_hint.clone(),
        })
        .collect()
}

/// Ids a repair prompt may cite.
pub fn valid_source_ids(pack: &EvidencePack, order: &WorkOrder) -> Vec<String> {
    let mut ids: Vec<String> = pack.hits().map(|h| h.source_id.clone()).collect();
    ids.extend(order.selected_docs.iter().map(|d| d.source_id.clone()));
    let mut seen = HashSet::new();
    ids.retain(|id| seen.insert(id.clone()));
    ids
}
