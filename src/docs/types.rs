use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Content-addressed document ID (blake3 hex hash).
pub type DocId = String;

/// Closed set of evidence origins. Deserialization goes through
/// [`SourceType::normalize`], so free-form labels from callers collapse onto it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SourceType {
    Upload,
    Worksheet,
    Report,
    Project,
    PolicyManual,
    GlobalKb,
}

#[derive(Debug, Error)]
#[error("unknown source type: {0}")]
pub struct UnknownSourceType(pub String);

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Worksheet => "worksheet",
            Self::Report => "report",
            Self::Project => "project",
            Self::PolicyManual => "policy_manual",
            Self::GlobalKb => "global_kb",
        }
    }

    /// Map a free-form source label onto the closed enum.
    ///
    /// First match wins: policy, global knowledge base, worksheet, report,
    /// project. Anything else is treated as an upload.
    pub fn normalize(raw: &str) -> Self {
        let lower = raw.to_lowercase();
        if lower.contains("policy") {
            Self::PolicyManual
        } else if lower.contains("global") || lower.contains("knowledge") || lower.contains("kb") {
            Self::GlobalKb
        } else if lower.contains("worksheet") {
            Self::Worksheet
        } else if lower.contains("report") {
            Self::Report
        } else if lower.contains("project") {
            Self::Project
        } else {
            Self::Upload
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for SourceType {
    fn from(raw: String) -> Self {
        Self::normalize(&raw)
    }
}

impl From<SourceType> for String {
    fn from(source_type: SourceType) -> Self {
        source_type.as_str().to_string()
    }
}

impl FromStr for SourceType {
    type Err = UnknownSourceType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upload" => Ok(Self::Upload),
            "worksheet" => Ok(Self::Worksheet),
            "report" => Ok(Self::Report),
            "project" => Ok(Self::Project),
            "policy_manual" => Ok(Self::PolicyManual),
            "global_kb" => Ok(Self::GlobalKb),
            other => Err(UnknownSourceType(other.to_string())),
        }
    }
}

/// Visibility boundary of a piece of evidence: `global` or `project:<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Scope {
    Global,
    Project(String),
}

#[derive(Debug, Error)]
#[error("invalid scope: {0:?}")]
pub struct InvalidScope(pub String);

impl Scope {
    pub const GLOBAL_PROJECT: &'static str = "global";

    /// Scope for a project id. The `"global"` pseudo-project maps to [`Scope::Global`].
    pub fn for_project(project_id: &str) -> Self {
        if project_id == Self::GLOBAL_PROJECT {
            Self::Global
        } else {
            Self::Project(project_id.to_string())
        }
    }

    pub fn from_project_id(project_id: Option<&str>) -> Self {
        project_id.map(Self::for_project).unwrap_or(Self::Global)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Project(id) => write!(f, "project:{}", id),
        }
    }
}

impl FromStr for Scope {
    type Err = InvalidScope;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "global" {
            return Ok(Self::Global);
        }
        match s.strip_prefix("project:") {
            Some(id) if !id.is_empty() => Ok(Self::Project(id.to_string())),
            _ => Err(InvalidScope(s.to_string())),
        }
    }
}

impl TryFrom<String> for Scope {
    type Error = InvalidScope;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Scope> for String {
    fn from(scope: Scope) -> Self {
        scope.to_string()
    }
}

/// A hydrated item from the CRUD layer. Only `content` is read for retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextItem {
    pub id: String,
    /// Parent document, when this item is one chunk of a larger file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<DocId>,
    pub name: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ContextItem {
    pub fn source_type(&self) -> SourceType {
        SourceType::normalize(&self.source)
    }

    pub fn scope(&self) -> Scope {
        Scope::from_project_id(self.project_id.as_deref())
    }

    /// True when a selected document id refers to this item or to its parent document.
    pub fn is_selected_by(&self, source_id: &str) -> bool {
        self.id == source_id || self.item_id.as_deref() == Some(source_id)
    }
}

/// A document the user explicitly attached to a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedDoc {
    pub source_id: String,
    pub source_type: SourceType,
    pub scope: Scope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_priority() {
        assert_eq!(SourceType::normalize("Policy Manual (global)"), SourceType::PolicyManual);
        assert_eq!(SourceType::normalize("global_kb"), SourceType::GlobalKb);
        assert_eq!(SourceType::normalize("Knowledge base"), SourceType::GlobalKb);
        assert_eq!(SourceType::normalize("worksheet report"), SourceType::Worksheet);
        assert_eq!(SourceType::normalize("Report"), SourceType::Report);
        assert_eq!(SourceType::normalize("project envelope"), SourceType::Project);
        assert_eq!(SourceType::normalize("file.pdf"), SourceType::Upload);
    }

    #[test]
    fn test_source_type_wire_names() {
        for source_type in [
            SourceType::Upload,
            SourceType::Worksheet,
            SourceType::Report,
            SourceType::Project,
            SourceType::PolicyManual,
            SourceType::GlobalKb,
        ] {
            let json = serde_json::to_string(&source_type).unwrap();
            assert_eq!(json, format!("\"{}\"", source_type));
            assert_eq!(serde_json::from_str::<SourceType>(&json).unwrap(), source_type);
            assert_eq!(source_type.as_str().parse::<SourceType>().unwrap(), source_type);
        }
        let lenient: SourceType = serde_json::from_str("\"Policy Manual 2024\"").unwrap();
        assert_eq!(lenient, SourceType::PolicyManual);
        assert!("Policy Manual".parse::<SourceType>().is_err());
    }

    #[test]
    fn test_scope_parse_and_display() {
        assert_eq!("global".parse::<Scope>().unwrap(), Scope::Global);
        assert_eq!(
            "project:abc".parse::<Scope>().unwrap(),
            Scope::Project("abc".to_string())
        );
        assert!("project:".parse::<Scope>().is_err());
        assert!("team:abc".parse::<Scope>().is_err());
        assert_eq!(Scope::Project("x".to_string()).to_string(), "project:x");
        assert_eq!(Scope::for_project("global"), Scope::Global);
    }

    #[test]
    fn test_scope_serializes_as_string() {
        let json = serde_json::to_string(&Scope::Project("p1".to_string())).unwrap();
        assert_eq!(json, "\"project:p1\"");
        let back: Scope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Scope::Project("p1".to_string()));
        assert!(serde_json::from_str::<Scope>("\"nowhere\"").is_err());
    }

    #[test]
    fn test_item_selection_matches_parent() {
        let item = ContextItem {
            id: "doc1:0".to_string(),
            item_id: Some("doc1".to_string()),
            name: "Manual".to_string(),
            source: "policy_manual".to_string(),
            project_id: Some("p".to_string()),
            content: None,
        };
        assert!(item.is_selected_by("doc1"));
        assert!(item.is_selected_by("doc1:0"));
        assert!(!item.is_selected_by("doc2"));
        assert_eq!(item.scope(), Scope::Project("p".to_string()));
    }
}
