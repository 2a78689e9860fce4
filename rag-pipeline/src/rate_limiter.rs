//! Per-session sliding-window rate limiter.
//!
//! One instance is owned by the application and shared via `Arc`. All state
//! sits behind a single mutex; no lock is held across an `.await`, so the
//! background sweep and request tasks never block each other for long.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::cfg::RateLimitConfig;
use crate::error::PipelineError;
use crate::models::RateLimitInfo;

type Windows = HashMap<String, VecDeque<DateTime<Utc>>>;

pub struct RateLimiter {
    cfg: RateLimitConfig,
    windows: Mutex<Windows>,
}

impl RateLimiter {
    pub fn new(cfg: RateLimitConfig) -> Self {
        Self {
            cfg,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.cfg
    }

    /// Reports whether `session_id` is currently limited. Does not record.
    pub fn check(&self, session_id: &str) -> RateLimitInfo {
        self.check_at(session_id, Utc::now())
    }

    pub fn check_at(&self, session_id: &str, now: DateTime<Utc>) -> RateLimitInfo {
        let mut windows = self.lock();
        match windows.get_mut(session_id) {
            Some(window) => self.evaluate(window, now),
            None => not_limited(),
        }
    }

    /// Appends a timestamp to the session's window.
    pub fn record(&self, session_id: &str) {
        self.record_at(session_id, Utc::now());
    }

    pub fn record_at(&self, session_id: &str, now: DateTime<Utc>) {
        self.lock()
            .entry(session_id.to_string())
            .or_default()
            .push_back(now);
    }

    /// Admission: check and record under one critical section.
    ///
    /// # Errors
    /// [`PipelineError::RateLimited`] with the wait hint when the window is full.
    pub fn check_and_record(&self, session_id: &str) -> Result<RateLimitInfo, PipelineError> {
        self.check_and_record_at(session_id, Utc::now())
    }

    pub fn check_and_record_at(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<RateLimitInfo, PipelineError> {
        let mut windows = self.lock();
        let window = windows.entry(session_id.to_string()).or_default();
        let info = self.evaluate(window, now);
        if info.is_limited {
            debug!(session_id, wait_seconds = info.wait_seconds, "admission denied");
            return Err(PipelineError::RateLimited {
                wait_seconds: info.wait_seconds,
                reset_at: info.reset_at.unwrap_or(now),
            });
        }
        window.push_back(now);
        Ok(info)
    }

    /// Drops sessions whose newest timestamp is older than the retention horizon.
    /// Returns how many sessions were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let horizon = now - secs(self.cfg.retention_seconds);
        let mut windows = self.lock();
        let before = windows.len();
        windows.retain(|_, w| w.back().is_some_and(|last| *last >= horizon));
        before - windows.len()
    }

    pub fn session_count(&self) -> usize {
        self.lock().len()
    }

    /// Runs [`sweep`](Self::sweep) every `sweep_interval_seconds` until aborted.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let period = StdDuration::from_secs(this.cfg.sweep_interval_seconds.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let removed = this.sweep();
                info!(
                    removed,
                    sessions = this.session_count(),
                    "rate limiter sweep"
                );
            }
        })
    }

    /// Prunes expired timestamps and evaluates the remaining window.
    fn evaluate(&self, window: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>) -> RateLimitInfo {
        let span = secs(self.cfg.window_seconds);
        while window.front().is_some_and(|t| *t <= now - span) {
            window.pop_front();
        }
        if window.len() < self.cfg.max_queries {
            return not_limited();
        }
        let reset_at = window.front().map(|oldest| *oldest + span).unwrap_or(now);
        RateLimitInfo {
            is_limited: true,
            wait_seconds: wait_seconds(reset_at, now),
            reset_at: Some(reset_at),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Windows> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn not_limited() -> RateLimitInfo {
    RateLimitInfo {
        is_limited: false,
        wait_seconds: 0,
        reset_at: None,
    }
}

fn secs(n: u64) -> Duration {
    Duration::seconds(i64::try_from(n).unwrap_or(i64::MAX / 1000))
}

/// `ceil(reset_at - now)` in whole seconds, at least 1.
fn wait_seconds(reset_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let ms = (reset_at - now).num_milliseconds().max(0) as u64;
    ms.div_ceil(1000).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::new(RateLimitConfig::default())
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T12:00:00Z")
            .expect("ts")
            .with_timezone(&Utc)
    }

    #[test]
    fn max_queries_admitted_then_limited() {
        let rl = limiter();
        let now = t0();
        for i in 0..10 {
            let at = now + Duration::seconds(i);
            assert!(!rl.check_at("s", at).is_limited);
            rl.record_at("s", at);
        }
        let info = rl.check_at("s", now + Duration::seconds(10));
        assert!(info.is_limited);
        assert_eq!(info.reset_at, Some(now + Duration::seconds(60)));
        assert_eq!(info.wait_seconds, 50);
    }

    #[test]
    fn eleventh_query_in_a_minute_is_rejected_with_hint() {
        let rl = limiter();
        let now = t0();
        for _ in 0..10 {
            rl.check_and_record_at("s", now).expect("admitted");
        }
        match rl.check_and_record_at("s", now + Duration::milliseconds(59_500)) {
            Err(PipelineError::RateLimited { wait_seconds, .. }) => assert_eq!(wait_seconds, 1),
            other => panic!("expected rate limit, got {other:?}"),
        }
        // rejected attempts are not recorded
        assert!(rl.check_and_record_at("s", now + Duration::seconds(60)).is_ok());
    }

    #[test]
    fn old_timestamps_leave_the_window() {
        let rl = limiter();
        let now = t0();
        for _ in 0..10 {
            rl.record_at("s", now);
        }
        assert!(rl.check_at("s", now + Duration::seconds(59)).is_limited);
        assert!(!rl.check_at("s", now + Duration::seconds(61)).is_limited);
    }

    #[test]
    fn sessions_are_independent() {
        let rl = limiter();
        let now = t0();
        for _ in 0..10 {
            rl.record_at("a", now);
        }
        assert!(rl.check_at("a", now).is_limited);
        assert!(!rl.check_at("b", now).is_limited);
    }

    #[test]
    fn wait_is_rounded_up() {
        let now = t0();
        assert_eq!(wait_seconds(now + Duration::milliseconds(1200), now), 2);
        assert_eq!(wait_seconds(now + Duration::seconds(3), now), 3);
        assert_eq!(wait_seconds(now, now), 1);
    }

    #[test]
    fn sweep_drops_idle_sessions_only() {
        let rl = limiter();
        let now = t0();
        rl.record_at("idle", now - Duration::seconds(3601));
        rl.record_at("active", now - Duration::seconds(10));
        assert_eq!(rl.sweep_at(now), 1);
        assert_eq!(rl.session_count(), 1);
        assert!(!rl.check_at("idle", now).is_limited);
    }

    #[test]
    fn concurrent_admission_never_exceeds_limit() {
        let rl = Arc::new(limiter());
        let handles: Vec<_> = (0..32)
            .map(|_| {
                let rl = Arc::clone(&rl);
                std::thread::spawn(move || rl.check_and_record("s").is_ok())
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().expect("thread"))
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_runs_on_interval() {
        let rl = Arc::new(RateLimiter::new(RateLimitConfig {
            retention_seconds: 0,
            sweep_interval_seconds: 5,
            ..RateLimitConfig::default()
        }));
        rl.record_at("old", Utc::now() - Duration::seconds(10));
        let handle = rl.spawn_sweeper();
        tokio::time::sleep(StdDuration::from_secs(6)).await;
        assert_eq!(rl.session_count(), 0);
        handle.abort();
    }
}
