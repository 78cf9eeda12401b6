use std::path::Path;

use anyhow::Result;
use tracing::info;

use crate::docs::ingest::{self as doc_ingest, Ingested};
use crate::docs::types::SourceType;
use crate::state::AppState;

/// Ingest a local file as one context item per chunk.
pub async fn ingest_file(
    state: &AppState,
    path: &Path,
    project: Option<&str>,
    source: &str,
) -> Result<()> {
    let source_type: SourceType = source.parse()?;
    info!(path = %path.display(), project, source = %source_type, "Ingestion started");

    let ingested = doc_ingest::ingest_file(&state.store, path, project, source_type).await?;
    report(&ingested, &source_type.to_string());
    Ok(())
}

pub async fn ingest_url(state: &AppState, url: &str, project: Option<&str>) -> Result<()> {
    info!(url, project, "URL ingestion started");
    let ingested = doc_ingest::ingest_url(&state.store, url, project).await?;
    report(&ingested, url);
    Ok(())
}

pub async fn ingest_species(state: &AppState, input: &Path) -> Result<()> {
    info!(input = %input.display(), "Species ingestion started");
    let ingested = doc_ingest::ingest_species(&state.store, input).await?;
    for species in &ingested {
        report(species, "species profile");
    }
    println!("{} species profile(s) ingested", ingested.len());
    Ok(())
}

pub async fn ingest_web(state: &AppState, input: &Path, project: Option<&str>) -> Result<()> {
    info!(input = %input.display(), project, "Web ingestion started");
    let ingested = doc_ingest::ingest_web(&state.store, input, project).await?;
    for document in &ingested {
        report(document, "web");
    }
    println!("{} web document(s) ingested", ingested.len());
    Ok(())
}

fn report(ingested: &Ingested, origin: &str) {
    if ingested.already_present {
        println!(
            "Already ingested: {} ({})\nDoc ID: {}",
            ingested.name, origin, ingested.doc_id
        );
    } else {
        println!(
            "Ingested {} as {} ({} chunks)\nDoc ID: {}",
            ingested.name, origin, ingested.chunks, ingested.doc_id
        );
    }
}
