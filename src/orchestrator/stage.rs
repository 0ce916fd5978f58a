//! Pipeline stages and the record kept for each.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Orchestrator state. Stages run in declaration order; the optional ones
/// may be skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStage {
    Idle,
    Loading,
    AnalyzingBlocks,
    AnalyzingComponents,
    ValidatingIntegration,
    ComparingPatterns,
    GeneratingTests,
    GeneratingReport,
    Done,
}

impl AnalysisStage {
    /// Stages that do work, in execution order.
    pub const PIPELINE: [AnalysisStage; 7] = [
        AnalysisStage::Loading,
        AnalysisStage::AnalyzingBlocks,
        AnalysisStage::AnalyzingComponents,
        AnalysisStage::ValidatingIntegration,
        AnalysisStage::ComparingPatterns,
        AnalysisStage::GeneratingTests,
        AnalysisStage::GeneratingReport,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisStage::Idle => "idle",
            AnalysisStage::Loading => "loading",
            AnalysisStage::AnalyzingBlocks => "analyzing_blocks",
            AnalysisStage::AnalyzingComponents => "analyzing_components",
            AnalysisStage::ValidatingIntegration => "validating_integration",
            AnalysisStage::ComparingPatterns => "comparing_patterns",
            AnalysisStage::GeneratingTests => "generating_tests",
            AnalysisStage::GeneratingReport => "generating_report",
            AnalysisStage::Done => "done",
        }
    }

    /// Human-readable label for progress output.
    pub fn label(self) -> &'static str {
        match self {
            AnalysisStage::Idle => "Idle",
            AnalysisStage::Loading => "Loading artifacts",
            AnalysisStage::AnalyzingBlocks => "Analyzing blocks",
            AnalysisStage::AnalyzingComponents => "Analyzing components",
            AnalysisStage::ValidatingIntegration => "Validating integration",
            AnalysisStage::ComparingPatterns => "Comparing patterns",
            AnalysisStage::GeneratingTests => "Generating tests",
            AnalysisStage::GeneratingReport => "Generating report",
            AnalysisStage::Done => "Done",
        }
    }
}

impl fmt::Display for AnalysisStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageStatus {
    Executed,
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: AnalysisStage,
    #[serde(flatten)]
    pub status: StageStatus,
    pub duration_ms: u64,
}

impl StageRecord {
    pub fn executed(stage: AnalysisStage, duration_ms: u64) -> Self {
        Self {
            stage,
            status: StageStatus::Executed,
            duration_ms,
        }
    }

    pub fn skipped(stage: AnalysisStage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            status: StageStatus::Skipped {
                reason: reason.into(),
            },
            duration_ms: 0,
        }
    }

    pub fn was_executed(&self) -> bool {
        self.status == StageStatus::Executed
    }

    pub fn skip_reason(&self) -> Option<&str> {
        match &self.status {
            StageStatus::Skipped { reason } => Some(reason),
            StageStatus::Executed => None,
        }
    }
}
