//! Non-fatal diagnostics raised while the model is being built.
//!
//! Issues never change the control flow of the pipeline. Callers decide what
//! to do with them once the run is over (e.g. refuse to provision when a
//! CRITICAL issue exists).

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// IssueLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IssueLevel {
    Warning,
    Error,
    Critical,
}

impl IssueLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueLevel::Warning => "WARNING",
            IssueLevel::Error => "ERROR",
            IssueLevel::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for IssueLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// SubjectKind
// ---------------------------------------------------------------------------

/// What kind of entity an issue is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SubjectKind {
    Db,
    User,
    Glue,
    App,
}

impl SubjectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SubjectKind::Db => "DB",
            SubjectKind::User => "USER",
            SubjectKind::Glue => "GLUE",
            SubjectKind::App => "APP",
        }
    }
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Issue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub level: IssueLevel,
    #[serde(rename = "type")]
    pub kind: SubjectKind,
    pub id: String,
    pub message: String,
}

impl Issue {
    pub fn new(
        level: IssueLevel,
        kind: SubjectKind,
        id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            level,
            kind,
            id: id.into(),
            message: message.into(),
        }
    }

    pub fn warning(kind: SubjectKind, id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(IssueLevel::Warning, kind, id, message)
    }

    pub fn error(kind: SubjectKind, id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(IssueLevel::Error, kind, id, message)
    }

    pub fn critical(kind: SubjectKind, id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(IssueLevel::Critical, kind, id, message)
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={} :: {}", self.kind, self.id, self.message)
    }
}

/// True when at least one issue is CRITICAL.
pub fn has_critical(issues: &[Issue]) -> bool {
    issues.iter().any(|i| i.level == IssueLevel::Critical)
}

/// Log every issue at the tracing level matching its severity.
pub fn log_issues(issues: &[Issue]) {
    if issues.is_empty() {
        return;
    }
    tracing::info!("Issues:");
    for issue in issues {
        match issue.level {
            IssueLevel::Warning => tracing::warn!("  {issue}"),
            IssueLevel::Error => tracing::error!("  {issue}"),
            IssueLevel::Critical => tracing::error!("  CRITICAL {issue}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
