//! Policy evaluator: pure next-state function for the failure ladder.
//!
//! `evaluate` never touches storage or the wall clock; it maps
//! (current record, now, ladder) to the next bucket state plus the
//! notification signals the intake path must raise. Persisting the result
//! and dispatching notifications belong to [crate::engine].

use chrono::{DateTime, Duration, Utc};

use crate::ladder::Ladder;
use crate::models::LockoutRecord;

/// How the evaluator arrived at the next state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// First failure for a fresh bucket.
    FirstFailure,
    /// Counted and (possibly) re-locked via the ladder or doubling step.
    Escalated,
    /// This failure crossed the pre-escalation horizon: bucket went permanent.
    EscalatedPermanent,
    /// Bucket is already permanent; state is unchanged and must not be written.
    PermanentNoOp,
}

/// Next bucket state as computed by [evaluate].
#[derive(Clone, Debug)]
pub struct Evaluation {
    pub failure_count: u32,
    pub lockout_until: Option<DateTime<Utc>>,
    pub permanent: bool,
    pub last_duration_secs: i64,
    pub outcome: Outcome,
}

impl Evaluation {
    /// Permanent-lockout notification must be raised for this state.
    pub fn notify_permanent(&self) -> bool {
        self.outcome == Outcome::EscalatedPermanent
    }

    /// Significant-lockout notification must be raised for this state.
    ///
    /// Fires from the 3rd counted failure on, whether or not this step
    /// caused an actual block; never for a permanent no-op.
    pub fn notify_significant(&self) -> bool {
        self.outcome != Outcome::PermanentNoOp && self.failure_count >= 3
    }

    /// Whether the computed window blocks admission at `now`.
    pub fn blocks_at(&self, now: DateTime<Utc>) -> bool {
        self.permanent || self.lockout_until.is_some_and(|until| until > now)
    }
}

fn window(now: DateTime<Utc>, secs: i64) -> Option<DateTime<Utc>> {
    (secs > 0).then(|| now + Duration::seconds(secs))
}

/// Computes the next lockout state for one recorded failure.
pub fn evaluate(current: Option<&LockoutRecord>, now: DateTime<Utc>, ladder: &Ladder) -> Evaluation {
    let Some(record) = current else {
        return Evaluation {
            failure_count: 1,
            lockout_until: window(now, ladder.initial_secs),
            permanent: false,
            last_duration_secs: ladder.initial_secs,
            outcome: Outcome::FirstFailure,
        };
    };

    if record.permanent {
        // Terminal until admin action: no escalation, no timer reset.
        return Evaluation {
            failure_count: record.failure_count,
            lockout_until: record.lockout_until,
            permanent: true,
            last_duration_secs: record.last_duration_secs,
            outcome: Outcome::PermanentNoOp,
        };
    }

    let failure_count = record.failure_count.saturating_add(1);

    if let Some(secs) = ladder.rank_secs(failure_count) {
        return Evaluation {
            failure_count,
            lockout_until: window(now, secs),
            permanent: false,
            last_duration_secs: secs,
            outcome: Outcome::Escalated,
        };
    }

    // 6th failure on: permanent once the prior window already reached past
    // the max-threshold horizon, otherwise double the previous duration.
    let horizon = now + Duration::seconds(ladder.max_threshold_secs);
    let prior_window_past_horizon = record.lockout_until.is_some_and(|until| until > horizon);
    if prior_window_past_horizon {
        return Evaluation {
            failure_count,
            lockout_until: window(now, ladder.permanent_secs),
            permanent: true,
            last_duration_secs: ladder.permanent_secs,
            outcome: Outcome::EscalatedPermanent,
        };
    }

    let mut previous = record.last_duration_secs;
    if previous <= 0 {
        // Never actually locked (or cleared by an unlock): restart doubling
        // from the rank-5 baseline.
        previous = ladder.fifth_secs;
    }
    let doubled = previous.saturating_mul(2);
    Evaluation {
        failure_count,
        lockout_until: window(now, doubled),
        permanent: false,
        last_duration_secs: doubled,
        outcome: Outcome::Escalated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{EventType, Identity};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn record(
        failure_count: u32,
        lockout_until: Option<DateTime<Utc>>,
        permanent: bool,
        last_duration_secs: i64,
    ) -> LockoutRecord {
        LockoutRecord {
            identity: Identity::parse("203.0.113.9").unwrap(),
            event_type: EventType::parse("login_failure").unwrap(),
            failure_count,
            lockout_until,
            permanent,
            last_duration_secs,
            created_at: t0(),
            modified_at: t0(),
            version: failure_count as u64,
        }
    }

    #[test]
    fn first_failure_counts_but_does_not_block() {
        let eval = evaluate(None, t0(), &Ladder::default());
        assert_eq!(eval.failure_count, 1);
        assert_eq!(eval.lockout_until, None);
        assert!(!eval.permanent);
        assert_eq!(eval.outcome, Outcome::FirstFailure);
        assert!(!eval.blocks_at(t0()));
        assert!(!eval.notify_significant());
    }

    #[test]
    fn ranks_two_to_five_take_the_ladder_entry() {
        let ladder = Ladder::default();
        let now = t0();
        let expected = [(1, 30), (2, 60), (3, 300), (4, 600)];
        for (count, secs) in expected {
            let rec = record(count, None, false, 0);
            let eval = evaluate(Some(&rec), now, &ladder);
            assert_eq!(eval.failure_count, count + 1);
            assert_eq!(eval.lockout_until, Some(now + Duration::seconds(secs)));
            assert_eq!(eval.last_duration_secs, secs);
            assert!(!eval.permanent);
        }
    }

    #[test]
    fn third_failure_signals_even_with_short_window() {
        let rec = record(2, Some(t0() + Duration::seconds(30)), false, 30);
        let eval = evaluate(Some(&rec), t0(), &Ladder::default());
        assert_eq!(eval.failure_count, 3);
        assert!(eval.notify_significant());
        assert!(!eval.notify_permanent());
    }

    #[test]
    fn sixth_failure_doubles_previous_duration() {
        let now = t0();
        let rec = record(5, Some(now + Duration::seconds(600)), false, 600);
        let eval = evaluate(Some(&rec), now, &Ladder::default());
        assert_eq!(eval.failure_count, 6);
        assert_eq!(eval.last_duration_secs, 1_200);
        assert_eq!(eval.lockout_until, Some(now + Duration::seconds(1_200)));
        assert_eq!(eval.outcome, Outcome::Escalated);
    }

    #[test]
    fn doubling_falls_back_to_rank_five_when_duration_unknown() {
        let now = t0();
        let rec = record(7, None, false, 0);
        let eval = evaluate(Some(&rec), now, &Ladder::default());
        assert_eq!(eval.failure_count, 8);
        assert_eq!(eval.last_duration_secs, 1_200);
        assert_eq!(eval.lockout_until, Some(now + Duration::seconds(1_200)));
    }

    #[test]
    fn escalates_to_permanent_past_the_horizon() {
        let now = t0();
        // Prior window reaches past now + 4800s.
        let rec = record(8, Some(now + Duration::seconds(9_600)), false, 9_600);
        let eval = evaluate(Some(&rec), now, &Ladder::default());
        assert_eq!(eval.failure_count, 9);
        assert!(eval.permanent);
        assert_eq!(eval.lockout_until, Some(now + Duration::seconds(86_400)));
        assert_eq!(eval.outcome, Outcome::EscalatedPermanent);
        assert!(eval.notify_permanent());
        assert!(eval.notify_significant());
    }

    #[test]
    fn window_exactly_at_horizon_keeps_doubling() {
        let now = t0();
        let rec = record(7, Some(now + Duration::seconds(4_800)), false, 4_800);
        let eval = evaluate(Some(&rec), now, &Ladder::default());
        assert!(!eval.permanent);
        assert_eq!(eval.last_duration_secs, 9_600);
    }

    #[test]
    fn permanent_bucket_is_a_no_op() {
        let now = t0();
        let until = now + Duration::seconds(86_400);
        let rec = record(9, Some(until), true, 86_400);
        let eval = evaluate(Some(&rec), now + Duration::seconds(10), &Ladder::default());
        assert_eq!(eval.outcome, Outcome::PermanentNoOp);
        assert_eq!(eval.failure_count, 9);
        assert_eq!(eval.lockout_until, Some(until));
        assert!(eval.permanent);
        assert!(!eval.notify_permanent());
        assert!(!eval.notify_significant());
    }
}
