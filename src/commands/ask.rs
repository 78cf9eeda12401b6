use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use crate::chat::{ChatMessage, Sender};
use crate::docs::types::{ContextItem, Scope, SelectedDoc};
use crate::docs::DocumentStore;
use crate::orchestrator::AskRequest;
use crate::state::AppState;

pub struct AskArgs {
    pub question: String,
    pub project: Option<String>,
    pub selected: Vec<String>,
    pub action: Option<String>,
    pub view: Option<String>,
    pub thread: String,
}

/// Answer a question and print the result as JSON on stdout.
pub async fn ask(state: &AppState, args: AskArgs) -> Result<()> {
    let context_items = load_context(&state.store, args.project.as_deref()).await?;
    let selected_docs = resolve_selection(&context_items, &args.selected)?;

    info!(
        question = %args.question,
        project = args.project.as_deref().unwrap_or("global"),
        items = context_items.len(),
        selected = selected_docs.len(),
        thread = %args.thread,
        "Question received"
    );

    let user_message = ChatMessage::text(Sender::User, args.question.clone());
    state.store.store_message(&user_message.encode(&args.thread)?).await?;

    let request = AskRequest {
        ui_action: args.action,
        query: args.question,
        context_items,
        selected_docs,
        view_context: args.view,
        ..Default::default()
    };

    let timeout = Duration::from_secs(state.config.request_timeout_secs);
    let answer = tokio::time::timeout(timeout, state.orchestrator.answer(request))
        .await
        .with_context(|| format!("Request timed out after {}s", timeout.as_secs()))?;

    let message = answer.to_message();
    state.store.store_message(&message.encode(&args.thread)?).await?;

    if answer.ok() {
        info!(
            mode = %answer.work_order.mode,
            citations = answer.citations.len(),
            "Answer ready"
        );
    } else {
        warn!(mode = %answer.work_order.mode, "No structured answer produced");
    }

    let output = match answer.envelope() {
        Some(envelope) => serde_json::to_string_pretty(envelope)?,
        None => serde_json::to_string_pretty(&answer)?,
    };
    println!("{}", output);
    Ok(())
}

/// Project items first, so the work order picks up the project id, then the
/// global knowledge base. The reserved `global` project is the knowledge base
/// itself and is loaded once.
async fn load_context(store: &DocumentStore, project: Option<&str>) -> Result<Vec<ContextItem>> {
    let mut items = Vec::new();
    if let Some(project) = project.filter(|p| *p != Scope::GLOBAL_PROJECT) {
        items = store.list_items(Some(project)).await?;
        if items.is_empty() {
            warn!(project, "Project has no ingested documents");
        }
    }
    items.extend(store.list_items(None).await?);
    Ok(items)
}

/// Turn `--select` ids into selected documents. An id may name a whole
/// document or a single chunk.
fn resolve_selection(items: &[ContextItem], selected: &[String]) -> Result<Vec<SelectedDoc>> {
    selected
        .iter()
        .map(|source_id| {
            let Some(item) = items.iter().find(|item| item.is_selected_by(source_id)) else {
                bail!("Unknown document: {}", source_id);
            };
            Ok(SelectedDoc {
                source_id: source_id.clone(),
                source_type: item.source_type(),
                scope: item.scope(),
                title: Some(item.name.clone()),
            })
        })
        .collect()
}
