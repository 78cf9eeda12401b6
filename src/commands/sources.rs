use std::collections::BTreeMap;

use anyhow::Result;

use crate::docs::types::ContextItem;
use crate::state::AppState;

/// List ingested documents of a project (or the global knowledge base),
/// one line per document.
pub async fn sources(state: &AppState, project: Option<&str>) -> Result<()> {
    let items = state.store.list_items(project).await?;

    if items.is_empty() {
        println!("No documents ingested yet. Use `weflora ingest` to add some.");
        return Ok(());
    }

    // Group chunks by parent document
    let mut by_doc: BTreeMap<&str, Vec<&ContextItem>> = BTreeMap::new();
    for item in &items {
        let doc_id = item.item_id.as_deref().unwrap_or(item.id.as_str());
        by_doc.entry(doc_id).or_default().push(item);
    }

    println!("Documents in {}:", project.unwrap_or("global"));
    for (doc_id, chunks) in &by_doc {
        let first = chunks[0];
        let name = first
            .name
            .split(" (part ")
            .next()
            .unwrap_or(first.name.as_str());
        let chars: usize = chunks
            .iter()
            .map(|c| c.content.as_deref().map(str::len).unwrap_or(0))
            .sum();
        println!(
            "  - {} [{}] {} chunk(s), {} bytes\n    {}",
            name,
            first.source_type(),
            chunks.len(),
            chars,
            doc_id
        );
    }
    Ok(())
}
