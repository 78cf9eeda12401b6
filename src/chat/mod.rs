use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::docs::types::SelectedDoc;
use crate::orchestrator::citations::Citation;
use crate::orchestrator::envelope::ResponseEnvelope;
use crate::orchestrator::mode::Mode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

#[derive(Debug, Error)]
#[error("unknown sender: {0}")]
pub struct UnknownSender(pub String);

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sender {
    type Err = UnknownSender;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(UnknownSender(other.to_string())),
        }
    }
}

/// What the assistant saw when it answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSnapshot {
    pub project_id: String,
    pub mode: Mode,
    pub schema_version: String,
    pub selected_docs: Vec<SelectedDoc>,
}

/// Evidence counts behind an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grounding {
    pub global_hits: usize,
    pub project_hits: usize,
    pub policy_hits: usize,
    pub sources_used: Vec<String>,
    pub repair_attempted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedAction {
    pub label: String,
    pub prompt: String,
}

/// A chat turn. [`ChatMessage::encode`] and [`ChatMessage::decode`] are exact
/// inverses; absent fields and JSON `null` both decode to `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub sender: Sender,
    pub text: String,
    #[serde(rename = "floraGPT", default, skip_serializing_if = "Option::is_none")]
    pub flora_gpt: Option<ResponseEnvelope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citations: Option<Vec<Citation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_snapshot: Option<ContextSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grounding: Option<Grounding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_actions: Option<Vec<SuggestedAction>>,
    pub created_at: DateTime<Utc>,
}

/// Flat persisted form of a [`ChatMessage`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRow {
    pub thread_id: String,
    pub sender: String,
    pub text: String,
    pub floragpt_payload: Option<Value>,
    pub citations: Option<Value>,
    pub context_snapshot: Option<Value>,
    pub grounding: Option<Value>,
    pub suggested_actions: Option<Value>,
    pub created_at: String,
}

impl ChatMessage {
    pub fn text(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            sender,
            text: text.into(),
            flora_gpt: None,
            citations: None,
            context_snapshot: None,
            grounding: None,
            suggested_actions: None,
            created_at: Utc::now(),
        }
    }

    pub fn encode(&self, thread_id: &str) -> Result<MessageRow> {
        Ok(MessageRow {
            thread_id: thread_id.to_string(),
            sender: self.sender.as_str().to_string(),
            text: self.text.clone(),
            floragpt_payload: encode_field(&self.flora_gpt).context("encode floraGPT")?,
            citations: encode_field(&self.citations).context("encode citations")?,
            context_snapshot: encode_field(&self.context_snapshot)
                .context("encode contextSnapshot")?,
            grounding: encode_field(&self.grounding).context("encode grounding")?,
            suggested_actions: encode_field(&self.suggested_actions)
                .context("encode suggestedActions")?,
            // Shortest exact sub-second precision, so parsing gives back the same instant.
            created_at: self.created_at.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        })
    }

    pub fn decode(row: &MessageRow) -> Result<Self> {
        Ok(Self {
            sender: row.sender.parse()?,
            text: row.text.clone(),
            flora_gpt: decode_field(row.floragpt_payload.as_ref())
                .context("decode floragpt_payload")?,
            citations: decode_field(row.citations.as_ref()).context("decode citations")?,
            context_snapshot: decode_field(row.context_snapshot.as_ref())
                .context("decode context_snapshot")?,
            grounding: decode_field(row.grounding.as_ref()).context("decode grounding")?,
            suggested_actions: decode_field(row.suggested_actions.as_ref())
                .context("decode suggested_actions")?,
            created_at: DateTime::parse_from_rfc3339(&row.created_at)
                .with_context(|| format!("invalid created_at: {}", row.created_at))?
                .with_timezone(&Utc),
        })
    }
}

fn encode_field<T: Serialize>(field: &Option<T>) -> Result<Option<Value>> {
    field
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(Into::into)
}

fn decode_field<T: DeserializeOwned>(value: Option<&Value>) -> Result<Option<T>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
    }
}
