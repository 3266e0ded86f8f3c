use crate::ports::TimeProvider;
use crate::store::NudgeStore;

use std::sync::Arc;
use time::{OffsetDateTime, UtcOffset};

/// Escalating "thinking of you" pool: the Nth send of the day picks the Nth
/// entry, clamped to the last one.
const NUDGE_MESSAGES: &[(&str, &str)] = &[
    ("Thinking of you", "{sender} is thinking of you."),
    ("Still thinking of you", "{sender} sent another little ping your way."),
    ("Hey, it's {sender} again", "{sender} really wants you to know they're thinking of you."),
    ("{sender} is insisting", "Third ping and counting. Maybe say hi back?"),
    ("{sender} won't stop", "At this point you should probably just answer."),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NudgeDenied {
    DailyLimitReached,
    Cooldown { remaining: time::Duration },
}

impl std::fmt::Display for NudgeDenied {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NudgeDenied::DailyLimitReached => f.write_str("daily limit reached"),
            NudgeDenied::Cooldown { remaining } => {
                write!(f, "cooldown active for another {remaining}")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NudgeDecision {
    Allowed { nth_today: u32 },
    Denied(NudgeDenied),
}

/// Bounds how often one user can nudge the other: at most `daily_limit` sends
/// per local calendar day, and never two sends within `cooldown`. Both are
/// computed from the persisted send log, so the counts survive restarts and
/// concurrent devices (a small race may admit one extra send; enforcement is
/// best-effort).
pub struct NudgeLimiter<T> {
    time: T,
    log: Arc<NudgeStore>,
    daily_limit: u32,
    cooldown: time::Duration,
    utc_offset: UtcOffset,
}

impl<T: TimeProvider> NudgeLimiter<T> {
    pub fn new(
        time: T,
        log: Arc<NudgeStore>,
        daily_limit: u32,
        cooldown: time::Duration,
        utc_offset: UtcOffset,
    ) -> Self {
        Self {
            time,
            log,
            daily_limit,
            cooldown,
            utc_offset,
        }
    }

    pub fn check(&self, sender_id: &str) -> NudgeDecision {
        let now = self.time.now();
        if self.sends_today(sender_id, now) >= self.daily_limit {
            return NudgeDecision::Denied(NudgeDenied::DailyLimitReached);
        }
        if let Some(remaining) = self.cooldown_remaining_at(sender_id, now) {
            return NudgeDecision::Denied(NudgeDenied::Cooldown { remaining });
        }
        NudgeDecision::Allowed {
            nth_today: self.sends_today(sender_id, now) + 1,
        }
    }

    pub fn can_send(&self, sender_id: &str) -> bool {
        matches!(self.check(sender_id), NudgeDecision::Allowed { .. })
    }

    pub fn remaining_today(&self, sender_id: &str) -> u32 {
        let now = self.time.now();
        self.daily_limit
            .saturating_sub(self.sends_today(sender_id, now))
    }

    pub fn cooldown_remaining(&self, sender_id: &str) -> Option<time::Duration> {
        self.cooldown_remaining_at(sender_id, self.time.now())
    }

    pub fn record_send(&self, sender_id: &str) {
        self.log.record(sender_id, self.time.now());
    }

    fn sends_today(&self, sender_id: &str, now: OffsetDateTime) -> u32 {
        self.log
            .sends_since(sender_id, local_midnight(now, self.utc_offset))
    }

    fn cooldown_remaining_at(
        &self,
        sender_id: &str,
        now: OffsetDateTime,
    ) -> Option<time::Duration> {
        let last = self.log.last_send(sender_id)?;
        let elapsed = now - last;
        if elapsed < self.cooldown {
            Some(self.cooldown - elapsed)
        } else {
            None
        }
    }
}

/// Message intensity is a pure function of how many nudges the sender already
/// sent today.
pub fn message_for(nth_today: u32, sender_name: &str) -> (String, String) {
    let index = (nth_today.max(1) as usize - 1).min(NUDGE_MESSAGES.len() - 1);
    let (title, body) = NUDGE_MESSAGES[index];
    (
        title.replace("{sender}", sender_name),
        body.replace("{sender}", sender_name),
    )
}

fn local_midnight(now: OffsetDateTime, offset: UtcOffset) -> OffsetDateTime {
    now.to_offset(offset).replace_time(time::Time::MIDNIGHT)
}
