use anyhow::Result;

use crate::chat::ChatMessage;
use crate::state::AppState;

/// Print a thread's last `limit` messages as JSON lines, oldest first.
pub async fn history(state: &AppState, thread: &str, limit: usize) -> Result<()> {
    let rows = state.store.thread_messages(thread, limit).await?;
    if rows.is_empty() {
        eprintln!("No messages in thread {}", thread);
        return Ok(());
    }
    for row in &rows {
        let message = ChatMessage::decode(row)?;
        println!("{}", serde_json::to_string(&message)?);
    }
    Ok(())
}
