//! Redispatch cooldowns and the retry cap before CEO escalation
//! (spec §4.J), modeled as a budget-tracking policy in the same shape as
//! the teacher's `escalation::state::TierBudget`.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

/// Reasons a bead can be parked and later redispatched automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedispatchReason {
    ParseError,
    ProgressStagnant,
    RateLimit,
    AuthFailure,
}

impl RedispatchReason {
    /// Cooldown before the bead becomes eligible for automatic redispatch.
    pub fn cooldown(&self) -> ChronoDuration {
        match self {
            Self::ProgressStagnant => ChronoDuration::minutes(15),
            Self::AuthFailure => ChronoDuration::hours(2),
            Self::RateLimit => ChronoDuration::minutes(30),
            // Parse failures auto-file a bead rather than cooling down the
            // same one; treated as stagnation's cooldown if ever reused.
            Self::ParseError => ChronoDuration::minutes(15),
        }
    }

    pub fn from_block_reason(reason: &str) -> Option<Self> {
        let lower = reason.to_lowercase();
        if lower.contains("rate limit") {
            Some(Self::RateLimit)
        } else if lower.contains("auth") {
            Some(Self::AuthFailure)
        } else if lower.contains("parse_error") || lower.contains("parse error") {
            Some(Self::ParseError)
        } else if lower.contains("progress_stagnant") || lower.contains("stagnant") {
            Some(Self::ProgressStagnant)
        } else {
            None
        }
    }
}

pub const MAX_REDISPATCH_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedispatchState {
    pub attempts: u32,
    pub last_blocked_at: DateTime<Utc>,
    pub reason: RedispatchReason,
}

pub enum RedispatchDecision {
    /// Not enough time has passed; retry after this instant.
    StillCoolingDown { eligible_at: DateTime<Utc> },
    /// Cooldown elapsed and attempts remain: redispatch now.
    Redispatch,
    /// Attempts exhausted: escalate to the CEO role instead.
    EscalateToCeo,
}

pub fn decide(state: &RedispatchState, now: DateTime<Utc>) -> RedispatchDecision {
    if state.attempts >= MAX_REDISPATCH_ATTEMPTS {
        return RedispatchDecision::EscalateToCeo;
    }
    let eligible_at = state.last_blocked_at + state.reason.cooldown();
    if now < eligible_at {
        RedispatchDecision::StillCoolingDown { eligible_at }
    } else {
        RedispatchDecision::Redispatch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(reason: RedispatchReason, attempts: u32, blocked_at: DateTime<Utc>) -> RedispatchState {
        RedispatchState { attempts, last_blocked_at: blocked_at, reason }
    }

    #[test]
    fn still_within_cooldown_waits() {
        let now = Utc::now();
        let s = state(RedispatchReason::ProgressStagnant, 0, now);
        match decide(&s, now + ChronoDuration::minutes(5)) {
            RedispatchDecision::StillCoolingDown { .. } => {}
            _ => panic!("expected still cooling down"),
        }
    }

    #[test]
    fn past_cooldown_redispatches() {
        let now = Utc::now();
        let s = state(RedispatchReason::ProgressStagnant, 0, now);
        assert!(matches!(decide(&s, now + ChronoDuration::minutes(16)), RedispatchDecision::Redispatch));
    }

    #[test]
    fn auth_failure_uses_two_hour_cooldown() {
        let now = Utc::now();
        let s = state(RedispatchReason::AuthFailure, 0, now);
        assert!(matches!(
            decide(&s, now + ChronoDuration::minutes(90)),
            RedispatchDecision::StillCoolingDown { .. }
        ));
        assert!(matches!(decide(&s, now + ChronoDuration::hours(3)), RedispatchDecision::Redispatch));
    }

    #[test]
    fn rate_limit_uses_thirty_minute_cooldown() {
        let now = Utc::now();
        let s = state(RedispatchReason::RateLimit, 0, now);
        assert!(matches!(decide(&s, now + ChronoDuration::minutes(31)), RedispatchDecision::Redispatch));
    }

    #[test]
    fn third_attempt_escalates_regardless_of_cooldown() {
        let now = Utc::now();
        let s = state(RedispatchReason::ProgressStagnant, MAX_REDISPATCH_ATTEMPTS, now - ChronoDuration::days(1));
        assert!(matches!(decide(&s, now), RedispatchDecision::EscalateToCeo));
    }

    #[test]
    fn parses_block_reason_substrings() {
        assert_eq!(RedispatchReason::from_block_reason("rate limit exceeded"), Some(RedispatchReason::RateLimit));
        assert_eq!(RedispatchReason::from_block_reason("auth token expired"), Some(RedispatchReason::AuthFailure));
        assert_eq!(RedispatchReason::from_block_reason("unrelated"), None);
    }
}
