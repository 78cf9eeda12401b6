use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::keywords::{COMPLIANCE, SCORING, SPECIFICATION};
use crate::docs::types::{SelectedDoc, SourceType};

/// Closed set of response modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    GeneralResearch,
    SuitabilityScoring,
    SpecWriter,
    PolicyCompliance,
}

#[derive(Debug, Error)]
#[error("unknown mode: {0}")]
pub struct UnknownMode(pub String);

impl Mode {
    pub const ALL: [Mode; 4] = [
        Mode::GeneralResearch,
        Mode::SuitabilityScoring,
        Mode::SpecWriter,
        Mode::PolicyCompliance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GeneralResearch => "general_research",
            Self::SuitabilityScoring => "suitability_scoring",
            Self::SpecWriter => "spec_writer",
            Self::PolicyCompliance => "policy_compliance",
        }
    }

    /// Contract version advertised by every envelope of this mode.
    /// Modes are versioned independently.
    pub fn schema_version(&self) -> &'static str {
        match self {
            Self::GeneralResearch => "v0.2",
            Self::SuitabilityScoring | Self::SpecWriter | Self::PolicyCompliance => "v0.1",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| UnknownMode(s.to_string()))
    }
}

/// Classify a request. First matching rule wins:
/// explicit UI action, policy document + compliance terms, specification
/// terms, scoring terms, then general research.
pub fn resolve(ui_action: Option<&str>, user_query: &str, selected_docs: &[SelectedDoc]) -> Mode {
    if let Some(mode) = ui_action.and_then(|a| a.trim().parse::<Mode>().ok()) {
        debug!(mode = %mode, rule = "ui_action", "mode resolved");
        return mode;
    }

    let has_policy_doc = selected_docs
        .iter()
        .any(|d| d.source_type == SourceType::PolicyManual);

    let (mode, rule) = if has_policy_doc && COMPLIANCE.matches(user_query) {
        (Mode::PolicyCompliance, COMPLIANCE.name)
    } else if SPECIFICATION.matches(user_query) {
        (Mode::SpecWriter, SPECIFICATION.name)
    } else if SCORING.matches(user_query) {
        (Mode::SuitabilityScoring, SCORING.name)
    } else {
        (Mode::GeneralResearch, "default")
    };

    debug!(mode = %mode, rule, "mode resolved");
    mode
}
