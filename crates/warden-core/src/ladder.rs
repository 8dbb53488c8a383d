//! Failure ladder configuration.
//!
//! All ranks are required and validated at construction; there is no partial
//! ladder with defaults filled in at read time.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ordered table of lockout durations indexed by failure rank, in seconds.
///
/// Ranks 1..=5 apply directly to failure counts 1..=5. From the 6th failure
/// on, the previous window is doubled until it would exceed
/// `max_threshold_secs`, at which point the bucket escalates to a permanent
/// lockout of `permanent_secs`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ladder {
    pub initial_secs: i64,
    pub second_secs: i64,
    pub third_secs: i64,
    pub fourth_secs: i64,
    pub fifth_secs: i64,
    /// Pre-escalation horizon: once the prior window reaches past
    /// `now + max_threshold_secs`, the next failure goes permanent.
    pub max_threshold_secs: i64,
    /// Window applied when a bucket escalates to permanent.
    pub permanent_secs: i64,
}

impl Default for Ladder {
    fn default() -> Self {
        Self {
            initial_secs: 0,
            second_secs: 30,
            third_secs: 60,
            fourth_secs: 300,
            fifth_secs: 600,
            max_threshold_secs: 4_800,
            permanent_secs: 86_400,
        }
    }
}

/// Ladder construction failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LadderError {
    #[error("negative duration for ladder rank {0}")]
    Negative(&'static str),
    #[error("non-monotonic ladder: {0}")]
    NonMonotonic(&'static str),
}

impl Ladder {
    /// Rejects negative and non-monotonic duration sequences.
    pub fn validate(&self) -> Result<(), LadderError> {
        let ranks = [
            ("initial", self.initial_secs),
            ("second", self.second_secs),
            ("third", self.third_secs),
            ("fourth", self.fourth_secs),
            ("fifth", self.fifth_secs),
            ("max_threshold", self.max_threshold_secs),
            ("permanent", self.permanent_secs),
        ];
        for (name, secs) in ranks {
            if secs < 0 {
                return Err(LadderError::Negative(name));
            }
        }
        if self.second_secs < self.initial_secs {
            return Err(LadderError::NonMonotonic("second < initial"));
        }
        if self.third_secs < self.second_secs {
            return Err(LadderError::NonMonotonic("third < second"));
        }
        if self.fourth_secs < self.third_secs {
            return Err(LadderError::NonMonotonic("fourth < third"));
        }
        if self.fifth_secs < self.fourth_secs {
            return Err(LadderError::NonMonotonic("fifth < fourth"));
        }
        if self.max_threshold_secs < self.fifth_secs {
            return Err(LadderError::NonMonotonic("max_threshold < fifth"));
        }
        if self.permanent_secs < self.max_threshold_secs {
            return Err(LadderError::NonMonotonic("permanent < max_threshold"));
        }
        Ok(())
    }

    /// Ladder entry for failure counts 1..=5; `None` past the table.
    pub fn rank_secs(&self, failure_count: u32) -> Option<i64> {
        match failure_count {
            1 => Some(self.initial_secs),
            2 => Some(self.second_secs),
            3 => Some(self.third_secs),
            4 => Some(self.fourth_secs),
            5 => Some(self.fifth_secs),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ladder_is_valid() {
        assert_eq!(Ladder::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_negative_durations() {
        let ladder = Ladder {
            third_secs: -1,
            ..Ladder::default()
        };
        assert_eq!(ladder.validate(), Err(LadderError::Negative("third")));
    }

    #[test]
    fn rejects_non_monotonic_ranks() {
        let ladder = Ladder {
            fourth_secs: 10,
            ..Ladder::default()
        };
        assert_eq!(
            ladder.validate(),
            Err(LadderError::NonMonotonic("fourth < third"))
        );

        let ladder = Ladder {
            max_threshold_secs: 100,
            ..Ladder::default()
        };
        assert_eq!(
            ladder.validate(),
            Err(LadderError::NonMonotonic("max_threshold < fifth"))
        );
    }

    #[test]
    fn rank_lookup() {
        let ladder = Ladder::default();
        assert_eq!(ladder.rank_secs(1), Some(0));
        assert_eq!(ladder.rank_secs(2), Some(30));
        assert_eq!(ladder.rank_secs(5), Some(600));
        assert_eq!(ladder.rank_secs(6), None);
    }
}
