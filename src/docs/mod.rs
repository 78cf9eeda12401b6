pub mod ingest;
pub mod types;

use std::path::Path;

use anyhow::{Context, Result};
use cnidarium::{StateDelta, StateWrite, Storage};
use futures::StreamExt;
use tracing::{debug, warn};

use crate::chat::MessageRow;
use types::{ContextItem, Scope};

// Key prefixes (no trailing slashes, cnidarium convention)
const ITEM_PREFIX: &str = "ctx/item";
const MESSAGE_PREFIX: &str = "chat/message";

fn project_key(project_id: Option<&str>) -> &str {
    project_id.unwrap_or(Scope::GLOBAL_PROJECT)
}
fn item_key(project_id: Option<&str>, id: &str) -> String {
    format!("{}/{}/{}", ITEM_PREFIX, project_key(project_id), id)
}
fn message_key(thread_id: &str, created_at_nanos: i64, sender: &str) -> String {
    format!(
        "{}/{}/{:020}:{}",
        MESSAGE_PREFIX, thread_id, created_at_nanos, sender
    )
}

/// Context items and chat history, backed by cnidarium.
pub struct DocumentStore {
    storage: Storage,
}

impl DocumentStore {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let prefixes = vec![ITEM_PREFIX.to_string(), MESSAGE_PREFIX.to_string()];
        let storage = Storage::load(data_dir.to_path_buf(), prefixes)
            .await
            .context("Failed to init cnidarium storage")?;
        Ok(Self { storage })
    }

    /// Store a batch of context items in one commit.
    pub async fn put_items(&self, items: &[ContextItem]) -> Result<()> {
        let snapshot = self.storage.latest_snapshot();
        let mut delta = StateDelta::new(snapshot);
        for item in items {
            delta.put_raw(
                item_key(item.project_id.as_deref(), &item.id),
                serde_json::to_vec(item).context("serialize ContextItem")?,
            );
        }
        self.storage.commit(delta).await?;
        debug!(count = items.len(), "context items stored");
        Ok(())
    }

    pub async fn get_item(&self, project_id: Option<&str>, id: &str) -> Result<Option<ContextItem>> {
        let snapshot = self.storage.latest_snapshot();
        use cnidarium::StateRead;
        match snapshot.get_raw(&item_key(project_id, id)).await? {
            Some(bytes) => Ok(Some(
                serde_json::from_slice(&bytes).context("decode ContextItem")?,
            )),
            None => Ok(None),
        }
    }

    /// List the context items of one project (`None` lists global items), ordered by id.
    pub async fn list_items(&self, project_id: Option<&str>) -> Result<Vec<ContextItem>> {
        let snapshot = self.storage.latest_snapshot();
        use cnidarium::StateRead;
        let prefix = format!("{}/{}/", ITEM_PREFIX, project_key(project_id));
        let mut stream = snapshot.prefix_raw(&prefix);
        let mut results = Vec::new();

        while let Some(entry) = stream.next().await {
            match entry {
                Ok((_key, value)) => match serde_json::from_slice::<ContextItem>(&value) {
                    Ok(item) => results.push(item),
                    Err(e) => warn!("Skipping undecodable context item: {}", e),
                },
                Err(e) => {
                    warn!("Error reading context item stream: {}", e);
                }
            }
        }

        results.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(results)
    }

    /// Persist an encoded chat message row.
    pub async fn store_message(&self, row: &MessageRow) -> Result<()> {
        let created = chrono::DateTime::parse_from_rfc3339(&row.created_at)
            .with_context(|| format!("invalid created_at on message row: {}", row.created_at))?;
        let nanos = created.timestamp_nanos_opt().unwrap_or_default();

        let snapshot = self.storage.latest_snapshot();
        let mut delta = StateDelta::new(snapshot);
        delta.put_raw(
            message_key(&row.thread_id, nanos, &row.sender),
            serde_json::to_vec(row).context("serialize MessageRow")?,
        );
        self.storage.commit(delta).await?;
        debug!(thread_id = %row.thread_id, sender = %row.sender, "message row stored");
        Ok(())
    }

    /// The last `limit` rows of a thread, oldest first.
    pub async fn thread_messages(&self, thread_id: &str, limit: usize) -> Result<Vec<MessageRow>> {
        let snapshot = self.storage.latest_snapshot();
        use cnidarium::StateRead;
        let prefix = format!("{}/{}/", MESSAGE_PREFIX, thread_id);
        let mut stream = snapshot.prefix_raw(&prefix);
        let mut results = Vec::new();

        while let Some(entry) = stream.next().await {
            match entry {
                Ok((key, value)) => {
                    if let Ok(row) = serde_json::from_slice::<MessageRow>(&value) {
                        results.push((key, row));
                    }
                }
                Err(e) => {
                    warn!("Error reading message stream: {}", e);
                }
            }
        }

        // Keys embed zero-padded timestamps, so key order is chronological.
        results.sort_by(|a, b| a.0.cmp(&b.0));
        let skip = results.len().saturating_sub(limit);
        Ok(results.into_iter().skip(skip).map(|(_, row)| row).collect())
    }
}
