//! Progress checkpoints for the pipeline stages.
//!
//! Each stage owns a `[start, end]` span of the 0-100 progress scale.
//! Spans are ordered and contiguous-or-increasing so that writing stage
//! bounds in pipeline order can never move progress backwards.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProgressPlanError {
    #[error("stage '{stage}' ends before it starts ({start} > {end})")]
    Inverted { stage: &'static str, start: u8, end: u8 },

    #[error("stage '{stage}' exceeds 100 (ends at {end})")]
    OutOfRange { stage: &'static str, end: u8 },

    #[error("stage '{stage}' starts at {start}, before the previous stage ends at {previous_end}")]
    Overlap {
        stage: &'static str,
        start: u8,
        previous_end: u8,
    },
}

/// Inclusive progress bounds for one stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSpan {
    pub start: u8,
    pub end: u8,
}

impl StageSpan {
    pub const fn new(start: u8, end: u8) -> Self {
        Self { start, end }
    }

    /// Progress after finishing step `done` of `total` (1-based `done`).
    ///
    /// `total == done` always lands exactly on `end`.
    pub fn interpolate(&self, done: usize, total: usize) -> u8 {
        if total == 0 {
            return self.end;
        }
        let done = done.min(total) as u64;
        let width = u64::from(self.end.saturating_sub(self.start));
        let offset = width * done / total as u64;
        self.start + offset as u8
    }
}

/// Stage-boundary configuration, in pipeline order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressPlan {
    pub transcription: StageSpan,
    pub reformatting: StageSpan,
    pub metadata: StageSpan,
    pub persistence: StageSpan,
}

impl Default for ProgressPlan {
    fn default() -> Self {
        Self {
            transcription: StageSpan::new(10, 30),
            reformatting: StageSpan::new(30, 80),
            metadata: StageSpan::new(80, 90),
            persistence: StageSpan::new(90, 100),
        }
    }
}

impl ProgressPlan {
    /// Spans in the order the worker visits them
    pub fn ordered(&self) -> [(&'static str, StageSpan); 4] {
        [
            ("transcription", self.transcription),
            ("reformatting", self.reformatting),
            ("metadata", self.metadata),
            ("persistence", self.persistence),
        ]
    }

    /// Check ordering so stage bounds written in sequence are monotonic
    pub fn validate(&self) -> Result<(), ProgressPlanError> {
        let mut previous_end = 0u8;
        for (stage, span) in self.ordered() {
            if span.start > span.end {
                return Err(ProgressPlanError::Inverted {
                    stage,
                    start: span.start,
                    end: span.end,
                });
            }
            if span.end > 100 {
                return Err(ProgressPlanError::OutOfRange { stage, end: span.end });
            }
            if span.start < previous_end {
                return Err(ProgressPlanError::Overlap {
                    stage,
                    start: span.start,
                    previous_end,
                });
            }
            previous_end = span.end;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_plan_is_valid() {
        assert_eq!(ProgressPlan::default().validate(), Ok(()));
    }

    #[test]
    fn test_single_step_jumps_to_end() {
        let span = StageSpan::new(30, 80);
        assert_eq!(span.interpolate(1, 1), 80);
    }

    #[test]
    fn test_five_steps_are_strictly_increasing() {
        let span = StageSpan::new(30, 80);
        let values: Vec<u8> = (1..=5).map(|i| span.interpolate(i, 5)).collect();
        assert_eq!(values, vec![40, 50, 60, 70, 80]);
    }

    #[test]
    fn test_uneven_division_never_decreases() {
        let span = StageSpan::new(30, 80);
        let values: Vec<u8> = (1..=7).map(|i| span.interpolate(i, 7)).collect();
        assert!(values.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(*values.last().unwrap(), 80);
    }

    #[test]
    fn test_more_steps_than_points_stays_monotonic() {
        let span = StageSpan::new(30, 35);
        let values: Vec<u8> = (1..=20).map(|i| span.interpolate(i, 20)).collect();
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(values[19], 35);
    }

    #[test]
    fn test_overlapping_plan_is_rejected() {
        let plan = ProgressPlan {
            reformatting: StageSpan::new(20, 80),
            ..Default::default()
        };
        assert_eq!(
            plan.validate(),
            Err(ProgressPlanError::Overlap {
                stage: "reformatting",
                start: 20,
                previous_end: 30,
            })
        );
    }

    #[test]
    fn test_inverted_and_out_of_range_spans() {
        let inverted = ProgressPlan {
            metadata: StageSpan::new(90, 85),
            ..Default::default()
        };
        assert!(matches!(
            inverted.validate(),
            Err(ProgressPlanError::Inverted { stage: "metadata", .. })
        ));

        let too_high = ProgressPlan {
            persistence: StageSpan::new(90, 120),
            ..Default::default()
        };
        assert!(matches!(
            too_high.validate(),
            Err(ProgressPlanError::OutOfRange { end: 120, .. })
        ));
    }
}
