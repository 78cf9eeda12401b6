use anyhow::Result;
use async_trait::async_trait;
use regex::RegexBuilder;

use super::EvidenceHit;
use crate::docs::types::{ContextItem, Scope, SelectedDoc, SourceType};

const STOP_WORDS: &[&str] = &[
    "what", "which", "where", "when", "does", "have", "with", "that", "this", "from", "about",
    "some", "there", "their", "they", "your", "been", "were", "how", "could", "would", "should",
    "shall", "will", "into", "also", "just", "like", "make", "using", "used", "need", "want",
    "find", "know", "tell", "many", "much", "very", "really", "please", "help", "more", "most",
    "only", "the", "for", "and", "are", "can", "welke", "voor", "zijn", "deze", "het", "een",
    "met", "van", "wat", "hoe", "mag", "niet",
];

/// Characters of context kept on each side of the first keyword match.
const EXCERPT_WINDOW: usize = 400;

/// Everything a retrieval tool may read for one request.
#[derive(Debug, Clone)]
pub struct RetrievalQuery {
    pub project_id: String,
    pub query: String,
    pub context_items: Vec<ContextItem>,
    pub selected_docs: Vec<SelectedDoc>,
}

/// A per-scope evidence fetcher.
#[async_trait]
pub trait RetrievalTool: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(&self, query: &RetrievalQuery) -> Result<Vec<EvidenceHit>>;
}

/// Project envelope: uploads, worksheets, reports and project records.
/// Policy manuals and knowledge-base entries never travel through this scope.
pub struct ProjectRetriever;

#[async_trait]
impl RetrievalTool for ProjectRetriever {
    fn name(&self) -> &'static str {
        "project"
    }

    async fn fetch(&self, query: &RetrievalQuery) -> Result<Vec<EvidenceHit>> {
        let keywords = extract_keywords(&query.query);
        Ok(query
            .context_items
            .iter()
            .filter(|item| {
                !matches!(
                    item.source_type(),
                    SourceType::PolicyManual | SourceType::GlobalKb
                )
            })
            .map(|item| hydrate(item, &keywords))
            .collect())
    }
}

/// Policy manuals the user explicitly attached.
pub struct PolicyRetriever;

#[async_trait]
impl RetrievalTool for PolicyRetriever {
    fn name(&self) -> &'static str {
        "policy"
    }

    async fn fetch(&self, query: &RetrievalQuery) -> Result<Vec<EvidenceHit>> {
        let keywords = extract_keywords(&query.query);
        let selected: Vec<&SelectedDoc> = query
            .selected_docs
            .iter()
            .filter(|d| d.source_type == SourceType::PolicyManual)
            .collect();
        Ok(query
            .context_items
            .iter()
            .filter(|item| item.source_type() == SourceType::PolicyManual)
            .filter(|item| selected.iter().any(|d| item.is_selected_by(&d.source_id)))
            .map(|item| hydrate(item, &keywords))
            .collect())
    }
}

/// Shared knowledge-base entries.
pub struct GlobalRetriever;

#[async_trait]
impl RetrievalTool for GlobalRetriever {
    fn name(&self) -> &'static str {
        "global"
    }

    async fn fetch(&self, query: &RetrievalQuery) -> Result<Vec<EvidenceHit>> {
        let keywords = extract_keywords(&query.query);
        Ok(query
            .context_items
            .iter()
            .filter(|item| item.source_type() == SourceType::GlobalKb)
            .map(|item| hydrate(item, &keywords))
            .collect())
    }
}

/// Keep the first `k` hits. Order is preserved; this is where a relevance
/// scorer would slot in.
pub fn rerank(mut hits: Vec<EvidenceHit>, k: usize) -> Vec<EvidenceHit> {
    hits.truncate(k);
    hits
}

/// Bound a snippet to `max_chars` characters, ending truncated text with `…`.
pub fn compress(mut hit: EvidenceHit, max_chars: usize) -> EvidenceHit {
    if hit.snippet.chars().count() > max_chars {
        let keep = max_chars.saturating_sub(1);
        let mut snippet: String = hit.snippet.chars().take(keep).collect();
        if max_chars > 0 {
            snippet.push('…');
        }
        hit.snippet = snippet;
    }
    hit
}

/// Search terms from a question: punctuation stripped, stop words dropped,
/// hyphenated terms kept whole and split.
pub fn extract_keywords(question: &str) -> Vec<String> {
    let mut keywords = Vec::new();

    for word in question.split_whitespace() {
        let clean: String = word
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
            .collect::<String>()
            .to_lowercase();
        if clean.is_empty() {
            continue;
        }

        if clean.contains('-') || clean.contains('_') {
            keywords.push(clean.clone());
            for part in clean.split(|c: char| c == '-' || c == '_') {
                if part.chars().count() > 2 && !STOP_WORDS.contains(&part) {
                    keywords.push(part.to_string());
                }
            }
        } else if clean.chars().count() > 2 && !STOP_WORDS.contains(&clean.as_str()) {
            keywords.push(clean);
        }
    }

    let mut seen = std::collections::HashSet::new();
    keywords.retain(|k| seen.insert(k.clone()));
    keywords.truncate(6);
    keywords
}

/// Turn a context item into a hit whose snippet is centred on the first
/// keyword occurrence in its content.
fn hydrate(item: &ContextItem, keywords: &[String]) -> EvidenceHit {
    let (snippet, location_hint) = match item.content.as_deref().filter(|c| !c.trim().is_empty()) {
        Some(content) => {
            let (start, end, excerpt) = excerpt(content, keywords);
            (excerpt, Some(format!("chars {}-{}", start, end)))
        }
        None => (item.name.clone(), None),
    };

    EvidenceHit {
        source_id: item.id.clone(),
        source_type: item.source_type(),
        title: item.name.clone(),
        location_hint,
        snippet,
        scope: item.scope(),
    }
}

fn excerpt(content: &str, keywords: &[String]) -> (usize, usize, String) {
    let chars: Vec<char> = content.chars().collect();
    let first_match = first_keyword_char(content, keywords);

    let start = first_match
        .map(|pos| pos.saturating_sub(EXCERPT_WINDOW))
        .unwrap_or(0);
    let end = (first_match.unwrap_or(0) + EXCERPT_WINDOW).max(start + EXCERPT_WINDOW * 2);
    let end = end.min(chars.len());
    (start, end, chars[start..end].iter().collect())
}

/// Char offset of the earliest keyword, matched case-insensitively on the
/// original text.
fn first_keyword_char(content: &str, keywords: &[String]) -> Option<usize> {
    if keywords.is_empty() {
        return None;
    }
    let alternation = keywords
        .iter()
        .map(|k| regex::escape(k))
        .collect::<Vec<_>>()
        .join("|");
    let pattern = RegexBuilder::new(&alternation)
        .case_insensitive(true)
        .build()
        .ok()?;
    pattern
        .find(content)
        .map(|m| content[..m.start()].chars().count())
}

/// Hits carrying a scope other than `expected` are removed; returns the number dropped.
pub fn retain_scope(hits: &mut Vec<EvidenceHit>, expected: &Scope) -> usize {
    let before = hits.len();
    hits.retain(|hit| &hit.scope == expected);
    before - hits.len()
}
