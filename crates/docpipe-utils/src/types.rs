//! Core identifiers shared across docpipe crates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// `StepId` names the five pipeline steps in their fixed definition order.
///
/// The order of the variants is load-bearing: checkpoints must be appended in
/// strictly increasing definition order, and resume re-enters at the first
/// step lacking a checkpoint.
///
/// # Example
///
/// ```rust
/// use docpipe_utils::types::StepId;
///
/// assert_eq!(StepId::DocExtraction.as_str(), "doc-extraction");
/// assert_eq!(StepId::ALL.len(), StepId::COUNT);
/// assert!(StepId::DocExtraction.index() < StepId::DocGeneration.index());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepId {
    /// Extracts structured content from the source document.
    DocExtraction,
    /// Extracts structured content from the optional design source.
    DesignExtraction,
    /// Cross-validates document content against design content.
    CrossValidation,
    /// Generates clarifying questions from validation findings.
    QuestionGeneration,
    /// Generates the final transformed document.
    DocGeneration,
}

impl StepId {
    /// All steps in definition order.
    pub const ALL: [Self; 5] = [
        Self::DocExtraction,
        Self::DesignExtraction,
        Self::CrossValidation,
        Self::QuestionGeneration,
        Self::DocGeneration,
    ];

    /// Number of defined steps; also the checkpoint ledger capacity.
    pub const COUNT: usize = Self::ALL.len();

    /// Canonical lowercase name used in session records, paths, and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DocExtraction => "doc-extraction",
            Self::DesignExtraction => "design-extraction",
            Self::CrossValidation => "cross-validation",
            Self::QuestionGeneration => "question-generation",
            Self::DocGeneration => "doc-generation",
        }
    }

    /// Zero-based position in the definition order.
    #[must_use]
    pub const fn index(&self) -> usize {
        match self {
            Self::DocExtraction => 0,
            Self::DesignExtraction => 1,
            Self::CrossValidation => 2,
            Self::QuestionGeneration => 3,
            Self::DocGeneration => 4,
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| format!("unknown step: {s}"))
    }
}

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    /// A run is (or was last known to be) actively advancing this session.
    InProgress,
    /// The deadline expired; fewer than five checkpoints exist and a resume
    /// with the same session id is valid.
    Paused,
    /// All five steps have checkpoints.
    Completed,
    /// Marked failed by the caller; terminal for the normal resume path.
    Failed,
}

impl SessionStatus {
    /// Canonical lowercase name used in session records and summaries.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in-progress",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
