//! Pipeline stages and their per-document status.

use serde::{Deserialize, Serialize};

/// Status of one pipeline stage for one document.
///
/// Transitions are monotonic: `pending -> processing -> completed | failed`.
/// Only an explicit reprocess request moves a stage back to `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether moving from `self` to `next` is a legal forward transition.
    ///
    /// A failed stage may be picked up again by a later run (`failed -> processing`),
    /// and the all-in-one short-circuit completes stages that never started
    /// (`pending -> completed`).
    pub fn can_transition_to(&self, next: StageStatus) -> bool {
        use StageStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Completed)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Failed, Processing)
        )
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the four pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extraction,
    Classification,
    Metadata,
    Chunking,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Extraction,
        Stage::Classification,
        Stage::Metadata,
        Stage::Chunking,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extraction => "extraction",
            Self::Classification => "classification",
            Self::Metadata => "metadata",
            Self::Chunking => "chunking",
        }
    }

    /// 1-based position of the stage; also the processing level that first includes it.
    pub fn ordinal(&self) -> u8 {
        match self {
            Self::Extraction => 1,
            Self::Classification => 2,
            Self::Metadata => 3,
            Self::Chunking => 4,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The four independent stage statuses of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StageStatuses {
    pub extraction: StageStatus,
    pub classification: StageStatus,
    pub metadata: StageStatus,
    pub chunking: StageStatus,
}

impl StageStatuses {
    pub fn get(&self, stage: Stage) -> StageStatus {
        match stage {
            Stage::Extraction => self.extraction,
            Stage::Classification => self.classification,
            Stage::Metadata => self.metadata,
            Stage::Chunking => self.chunking,
        }
    }

    pub fn set(&mut self, stage: Stage, status: StageStatus) {
        match stage {
            Stage::Extraction => self.extraction = status,
            Stage::Classification => self.classification = status,
            Stage::Metadata => self.metadata = status,
            Stage::Chunking => self.chunking = status,
        }
    }

    pub fn all_completed(&self) -> bool {
        Stage::ALL
            .iter()
            .all(|s| self.get(*s) == StageStatus::Completed)
    }
}

/// How many stages a pipeline run should execute (1 = extraction only, 4 = all).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProcessingLevel(u8);

impl ProcessingLevel {
    pub const FULL: ProcessingLevel = ProcessingLevel(4);

    pub fn new(level: u8) -> Option<Self> {
        (1..=4).contains(&level).then_some(Self(level))
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    /// Whether a run at this level executes `stage`.
    pub fn includes(&self, stage: Stage) -> bool {
        stage.ordinal() <= self.0
    }
}

impl Default for ProcessingLevel {
    fn default() -> Self {
        Self::FULL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_strings() {
        for status in [
            StageStatus::Pending,
            StageStatus::Processing,
            StageStatus::Completed,
            StageStatus::Failed,
        ] {
            assert_eq!(StageStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(StageStatus::from_str("done"), None);
    }

    #[test]
    fn test_transitions_are_monotonic() {
        use StageStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Processing.can_transition_to(Pending));
        assert!(!Processing.can_transition_to(Processing));
        assert!(!Failed.can_transition_to(Completed));
    }

    #[test]
    fn test_level_includes_stages_in_order() {
        let level = ProcessingLevel::new(2).unwrap();
        assert!(level.includes(Stage::Extraction));
        assert!(level.includes(Stage::Classification));
        assert!(!level.includes(Stage::Metadata));
        assert!(!level.includes(Stage::Chunking));
        assert!(ProcessingLevel::new(0).is_none());
        assert!(ProcessingLevel::new(5).is_none());
    }

    #[test]
    fn test_all_completed() {
        let mut statuses = StageStatuses::default();
        assert!(!statuses.all_completed());
        for stage in Stage::ALL {
            statuses.set(stage, StageStatus::Completed);
        }
        assert!(statuses.all_completed());
    }
}
