//! Bug Reports
//!
//! Users file bug reports from the editor. A report optionally points at the
//! canvas it concerns and carries whatever client context the editor sent
//! along (browser, viewport, last action).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

const MAX_TITLE_CHARS: usize = 200;
const MAX_DESCRIPTION_CHARS: usize = 10_000;

/// How badly the bug affects the reporter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Cosmetic
    Low,
    /// Default
    #[default]
    Medium,
    /// Feature unusable
    High,
    /// Data loss or crash
    Critical,
}

impl Severity {
    /// Stored name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Parse a stored name
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// Triage state of a report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    /// Not yet handled
    #[default]
    Open,
    /// Fixed or dismissed
    Resolved,
}

impl ReportStatus {
    /// Stored name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Resolved => "resolved",
        }
    }

    /// Parse a stored name
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "open" => Some(Self::Open),
            "resolved" => Some(Self::Resolved),
            _ => None,
        }
    }
}

/// A filed bug report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BugReport {
    /// Server-generated ID
    pub id: Uuid,
    /// Identity that filed the report
    pub reporter: String,
    /// Short summary
    pub title: String,
    /// Steps, expectations, observations
    pub description: String,
    /// Severity
    pub severity: Severity,
    /// Canvas the report concerns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canvas_id: Option<String>,
    /// Client context sent with the report
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub context: serde_json::Value,
    /// Triage state
    pub status: ReportStatus,
    /// When the report was filed
    pub created_at: DateTime<Utc>,
}

/// Request to file a bug report
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBugReport {
    /// Short summary
    pub title: String,
    /// Details
    #[serde(default)]
    pub description: String,
    /// Severity
    #[serde(default)]
    pub severity: Severity,
    /// Canvas the report concerns
    #[serde(default)]
    pub canvas_id: Option<String>,
    /// Client context
    #[serde(default)]
    pub context: serde_json::Value,
}

impl NewBugReport {
    /// Validate and turn into a report filed by `reporter`
    pub fn into_report(self, reporter: &str) -> Result<BugReport> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(Error::validation("bug report title must not be empty"));
        }
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(Error::validation(format!(
                "bug report title must be at most {} characters",
                MAX_TITLE_CHARS
            )));
        }
        if self.description.chars().count() > MAX_DESCRIPTION_CHARS {
            return Err(Error::validation(format!(
                "bug report description must be at most {} characters",
                MAX_DESCRIPTION_CHARS
            )));
        }

        Ok(BugReport {
            id: Uuid::new_v4(),
            reporter: reporter.to_string(),
            title: title.to_string(),
            description: self.description,
            severity: self.severity,
            canvas_id: self.canvas_id.filter(|id| !id.trim().is_empty()),
            context: self.context,
            status: ReportStatus::Open,
            created_at: Utc::now(),
        })
    }
}

/// Storage for bug reports
#[async_trait]
pub trait BugReportStore: Send + Sync {
    /// Persist a new report
    async fn create_bug_report(&self, report: BugReport) -> Result<BugReport>;

    /// Reports filed by `reporter`, newest first
    async fn list_bug_reports(&self, reporter: &str) -> Result<Vec<BugReport>>;
}
