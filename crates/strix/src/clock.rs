//! 🕰️ Clocks: the single source of "what time is it", injected instead of summoned.
//!
//! Two things in strix care about the wall clock: the daily index suffix
//! (`logs-2026.10.19`) and the `@timestamp` stamped on monitoring records.
//! Both ask a [`Clock`] so tests can freeze time at 23:30 UTC and watch the
//! calendar flip over in Tokyo without waiting for Tokyo. 🦆

use chrono::{DateTime, Utc};

/// 🕰️ Anything that can answer "now?" in UTC.
pub trait Clock: std::fmt::Debug + Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// ⏱️ The real one. Reads the system clock, trusts NTP, hopes for the best.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 🧊 A clock frozen at one instant. Time stands still, assertions stay green.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
