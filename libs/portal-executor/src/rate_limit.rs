//! Per-user and per-command admission control.
//!
//! Two strategies are compiled in and selected by configuration at startup
//! (a tagged choice, not a runtime-mutable binding): the preferred token
//! bucket and a simpler fixed window. Both share the auto-block layer: a
//! user who keeps hammering a closed gate is blocked outright for a while.
//!
//! Refill is computed on demand; there is no timer, no queue and no
//! fairness between users. Structural map mutation goes through `DashMap`,
//! consumption of an individual bucket through its own mutex, and no lock
//! is ever held across an await point.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::whitelist::{CommandIntent, CommandRateSpec};

/// Strategy selector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimiterKind {
    #[default]
    TokenBucket,
    FixedWindow,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub kind: LimiterKind,
    /// Global per-user bucket capacity (token bucket) .
    pub user_capacity: u32,
    pub user_refill_per_minute: u32,
    /// Fixed-window length and per-window request limit.
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    pub window_limit: u32,
    /// Rejections beyond this count within `autoblock_window` trigger a
    /// block.
    pub autoblock_threshold: u32,
    #[serde(with = "humantime_serde")]
    pub autoblock_window: Duration,
    #[serde(with = "humantime_serde")]
    pub block_duration: Duration,
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            kind: LimiterKind::TokenBucket,
            user_capacity: 60,
            user_refill_per_minute: 60,
            window: Duration::from_secs(60),
            window_limit: 60,
            autoblock_threshold: 10,
            autoblock_window: Duration::from_secs(60),
            block_duration: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Structured rejection detail, surfaced verbatim in API error envelopes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateLimitExceeded {
    pub limit: u32,
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    pub reset_at: DateTime<Utc>,
    #[serde(with = "humantime_serde")]
    pub retry_after: Duration,
    /// True when the rejection comes from an active auto-block rather than
    /// bucket state.
    pub blocked: bool,
}

impl std::fmt::Display for RateLimitExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.blocked {
            write!(f, "user is blocked until {}", self.reset_at)
        } else {
            write!(
                f,
                "limit of {} per {:?} reached, retry after {:?}",
                self.limit, self.window, self.retry_after
            )
        }
    }
}

/// Point-in-time admission state for one user.
#[derive(Clone, Debug, Serialize)]
pub struct RateLimitStatus {
    pub used: u32,
    pub limit: u32,
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    pub reset_at: DateTime<Utc>,
    pub per_command: BTreeMap<&'static str, CommandLimitStatus>,
    pub is_blocked: bool,
    pub blocked_until: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct CommandLimitStatus {
    pub remaining: u32,
    pub limit: u32,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(capacity: u32, refill_per_minute: u32) -> Self {
        Self {
            tokens: f64::from(capacity),
            capacity: f64::from(capacity),
            refill_per_sec: f64::from(refill_per_minute) / 60.0,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.refill_per_sec)
            .min(self.capacity);
        self.last_refill = now;
    }

    /// Try to consume one token; on failure, the wait until one is
    /// available.
    fn try_consume(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let missing = 1.0 - self.tokens;
            Err(Duration::from_secs_f64(missing / self.refill_per_sec))
        }
    }

    fn remaining(&mut self, now: Instant) -> u32 {
        self.refill(now);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        {
            self.tokens.floor().max(0.0) as u32
        }
    }

    /// Time until the bucket is fully refilled.
    fn time_to_full(&self) -> Duration {
        let missing = self.capacity - self.tokens;
        if missing <= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(missing / self.refill_per_sec)
        }
    }
}

#[derive(Debug)]
struct WindowState {
    count: u32,
    window_start: Instant,
}

#[derive(Clone, Copy, Debug)]
struct Blocked {
    until: Instant,
    until_utc: DateTime<Utc>,
}

/// The limiter. Cheap to share behind an `Arc`; all methods take `&self`.
pub struct RateLimiter {
    cfg: RateLimitConfig,
    user_buckets: DashMap<Uuid, Mutex<Bucket>>,
    command_buckets: DashMap<(Uuid, CommandIntent), Mutex<Bucket>>,
    windows: DashMap<Uuid, Mutex<WindowState>>,
    rejections: DashMap<Uuid, Mutex<VecDeque<Instant>>>,
    blocked: DashMap<Uuid, Blocked>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(cfg: RateLimitConfig) -> Self {
        Self {
            cfg,
            user_buckets: DashMap::new(),
            command_buckets: DashMap::new(),
            windows: DashMap::new(),
            rejections: DashMap::new(),
            blocked: DashMap::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RateLimitConfig {
        &self.cfg
    }

    /// Admit or reject one request for `(user, intent)`.
    ///
    /// # Errors
    /// Returns [`RateLimitExceeded`] with the limit, window, reset time and
    /// remaining cool-down when the request is rejected.
    pub fn check(
        &self,
        user: Uuid,
        intent: CommandIntent,
        spec: CommandRateSpec,
    ) -> Result<(), RateLimitExceeded> {
        let now = Instant::now();

        if let Some(until) = self.active_block(user, now) {
            return Err(self.blocked_error(until, now));
        }

        match self.cfg.kind {
            LimiterKind::TokenBucket => self.check_token_bucket(user, intent, spec, now),
            LimiterKind::FixedWindow => self.check_fixed_window(user, now),
        }
    }

    fn check_token_bucket(
        &self,
        user: Uuid,
        intent: CommandIntent,
        spec: CommandRateSpec,
        now: Instant,
    ) -> Result<(), RateLimitExceeded> {
        let user_result = {
            let bucket = self
                .user_buckets
                .entry(user)
                .or_insert_with(|| {
                    Mutex::new(Bucket::new(
                        self.cfg.user_capacity,
                        self.cfg.user_refill_per_minute,
                    ))
                });
            let mut guard = bucket.lock();
            guard.try_consume(now)
        };

        if let Err(wait) = user_result {
            self.record_rejection(user, now);
            return Err(self.bucket_error(self.cfg.user_capacity, wait));
        }

        let command_result = {
            let bucket = self
                .command_buckets
                .entry((user, intent))
                .or_insert_with(|| Mutex::new(Bucket::new(spec.capacity, spec.refill_per_minute)));
            let mut guard = bucket.lock();
            guard.try_consume(now)
        };

        if let Err(wait) = command_result {
            self.record_rejection(user, now);
            return Err(self.bucket_error(spec.capacity, wait));
        }

        Ok(())
    }

    fn check_fixed_window(&self, user: Uuid, now: Instant) -> Result<(), RateLimitExceeded> {
        let window = self.cfg.window;
        let limit = self.cfg.window_limit;

        let state = self.windows.entry(user).or_insert_with(|| {
            Mutex::new(WindowState {
                count: 0,
                window_start: now,
            })
        });
        let mut guard = state.lock();

        if now.saturating_duration_since(guard.window_start) > window {
            guard.count = 0;
            guard.window_start = now;
        }

        if guard.count < limit {
            guard.count += 1;
            Ok(())
        } else {
            let reset_in = (guard.window_start + window).saturating_duration_since(now);
            drop(guard);
            drop(state);
            self.record_rejection(user, now);
            Err(RateLimitExceeded {
                limit,
                window,
                reset_at: Utc::now() + chrono::Duration::from_std(reset_in).unwrap_or_default(),
                retry_after: reset_in,
                blocked: false,
            })
        }
    }

    /// Remaining admissions and reset time for `(user, intent)`.
    #[must_use]
    pub fn remaining(
        &self,
        user: Uuid,
        intent: CommandIntent,
        spec: CommandRateSpec,
    ) -> (u32, DateTime<Utc>) {
        let now = Instant::now();
        match self.cfg.kind {
            LimiterKind::TokenBucket => {
                match self.command_buckets.get(&(user, intent)) {
                    Some(bucket) => {
                        let mut guard = bucket.lock();
                        let remaining = guard.remaining(now);
                        let reset = utc_after(guard.time_to_full());
                        (remaining, reset)
                    }
                    None => (spec.capacity, Utc::now()),
                }
            }
            LimiterKind::FixedWindow => match self.windows.get(&user) {
                Some(state) => {
                    let guard = state.lock();
                    let elapsed = now.saturating_duration_since(guard.window_start);
                    if elapsed > self.cfg.window {
                        (self.cfg.window_limit, Utc::now())
                    } else {
                        let left = self.cfg.window_limit.saturating_sub(guard.count);
                        (left, utc_after(self.cfg.window - elapsed))
                    }
                }
                None => (self.cfg.window_limit, Utc::now()),
            },
        }
    }

    /// Admin/status view for one user.
    #[must_use]
    pub fn status(&self, user: Uuid) -> RateLimitStatus {
        let now = Instant::now();

        let blocked_until = self.active_block(user, now);
        let (used, limit, window, reset_at) = match self.cfg.kind {
            LimiterKind::TokenBucket => {
                let capacity = self.cfg.user_capacity;
                match self.user_buckets.get(&user) {
                    Some(bucket) => {
                        let mut guard = bucket.lock();
                        let remaining = guard.remaining(now);
                        let reset = utc_after(guard.time_to_full());
                        (
                            capacity.saturating_sub(remaining),
                            capacity,
                            self.token_window(),
                            reset,
                        )
                    }
                    None => (0, capacity, self.token_window(), Utc::now()),
                }
            }
            LimiterKind::FixedWindow => match self.windows.get(&user) {
                Some(state) => {
                    let guard = state.lock();
                    let elapsed = now.saturating_duration_since(guard.window_start);
                    if elapsed > self.cfg.window {
                        (0, self.cfg.window_limit, self.cfg.window, Utc::now())
                    } else {
                        (
                            guard.count,
                            self.cfg.window_limit,
                            self.cfg.window,
                            utc_after(self.cfg.window - elapsed),
                        )
                    }
                }
                None => (0, self.cfg.window_limit, self.cfg.window, Utc::now()),
            },
        };

        let mut per_command = BTreeMap::new();
        for entry in &self.command_buckets {
            let (bucket_user, intent) = *entry.key();
            if bucket_user == user {
                let mut guard = entry.value().lock();
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let capacity = guard.capacity as u32;
                per_command.insert(
                    intent.as_str(),
                    CommandLimitStatus {
                        remaining: guard.remaining(now),
                        limit: capacity,
                    },
                );
            }
        }

        RateLimitStatus {
            used,
            limit,
            window,
            reset_at,
            per_command,
            is_blocked: blocked_until.is_some(),
            blocked_until: blocked_until.map(|b| b.until_utc),
        }
    }

    /// Admin force-clear: drops all state for the user, including an active
    /// block.
    pub fn reset(&self, user: Uuid) {
        self.user_buckets.remove(&user);
        self.windows.remove(&user);
        self.rejections.remove(&user);
        self.blocked.remove(&user);
        self.command_buckets.retain(|(u, _), _| *u != user);
    }

    /// Spawn the cooperative sweeper that drops expired blocks.
    pub fn spawn_block_sweeper(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let limiter = self;
        let interval = limiter.cfg.sweep_interval;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        tracing::debug!("rate-limit block sweeper stopped");
                        break;
                    }
                    () = tokio::time::sleep(interval) => {
                        let now = Instant::now();
                        let before = limiter.blocked.len();
                        limiter.blocked.retain(|_, b| b.until > now);
                        let removed = before - limiter.blocked.len();
                        if removed > 0 {
                            tracing::debug!(removed, "expired rate-limit blocks swept");
                        }
                    }
                }
            }
        })
    }

    fn active_block(&self, user: Uuid, now: Instant) -> Option<Blocked> {
        if let Some(entry) = self.blocked.get(&user) {
            if entry.until > now {
                return Some(*entry);
            }
        }
        // Lazily drop a stale block so status flips without the sweeper.
        self.blocked.remove_if(&user, |_, b| b.until <= now);
        None
    }

    fn record_rejection(&self, user: Uuid, now: Instant) {
        let track = self
            .rejections
            .entry(user)
            .or_insert_with(|| Mutex::new(VecDeque::new()));
        let mut guard = track.lock();
        guard.push_back(now);
        while let Some(front) = guard.front() {
            if now.saturating_duration_since(*front) > self.cfg.autoblock_window {
                guard.pop_front();
            } else {
                break;
            }
        }
        if guard.len() as u32 > self.cfg.autoblock_threshold {
            guard.clear();
            drop(guard);
            drop(track);
            let until = now + self.cfg.block_duration;
            let until_utc = utc_after(self.cfg.block_duration);
            tracing::warn!(user = %user, until = %until_utc, "user auto-blocked by rate limiter");
            self.blocked.insert(user, Blocked { until, until_utc });
        }
    }

    fn blocked_error(&self, block: Blocked, now: Instant) -> RateLimitExceeded {
        RateLimitExceeded {
            limit: match self.cfg.kind {
                LimiterKind::TokenBucket => self.cfg.user_capacity,
                LimiterKind::FixedWindow => self.cfg.window_limit,
            },
            window: self.cfg.block_duration,
            reset_at: block.until_utc,
            retry_after: block.until.saturating_duration_since(now),
            blocked: true,
        }
    }

    fn bucket_error(&self, limit: u32, wait: Duration) -> RateLimitExceeded {
        RateLimitExceeded {
            limit,
            window: self.token_window(),
            reset_at: utc_after(wait),
            retry_after: wait,
            blocked: false,
        }
    }

    /// Nominal window of the token-bucket strategy: the time a full refill
    /// takes.
    fn token_window(&self) -> Duration {
        if self.cfg.user_refill_per_minute == 0 {
            Duration::from_secs(60)
        } else {
            Duration::from_secs_f64(
                f64::from(self.cfg.user_capacity) * 60.0
                    / f64::from(self.cfg.user_refill_per_minute),
            )
        }
    }
}

fn utc_after(wait: Duration) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::from_std(wait).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(capacity: u32, refill: u32) -> CommandRateSpec {
        CommandRateSpec {
            capacity,
            refill_per_minute: refill,
        }
    }

    fn limiter(cfg: RateLimitConfig) -> RateLimiter {
        RateLimiter::new(cfg)
    }

    #[test]
    fn burst_of_capacity_is_admitted_then_rejected() {
        let lim = limiter(RateLimitConfig {
            user_capacity: 100,
            ..RateLimitConfig::default()
        });
        let user = Uuid::new_v4();
        let s = spec(10, 10);

        for i in 0..10 {
            assert!(
                lim.check(user, CommandIntent::ServerEnable, s).is_ok(),
                "request {i} should be admitted"
            );
        }
        let err = lim
            .check(user, CommandIntent::ServerEnable, s)
            .expect_err("11th request must be rejected");
        assert_eq!(err.limit, 10);
        assert!(!err.blocked);
        // Refill is 10/minute, so the next token is ~6 seconds away.
        assert!(err.retry_after > Duration::from_secs(5));
        assert!(err.retry_after <= Duration::from_secs(6));
    }

    #[test]
    fn distinct_commands_have_distinct_buckets() {
        let lim = limiter(RateLimitConfig {
            user_capacity: 100,
            ..RateLimitConfig::default()
        });
        let user = Uuid::new_v4();
        let s = spec(1, 1);

        assert!(lim.check(user, CommandIntent::ServerEnable, s).is_ok());
        assert!(lim.check(user, CommandIntent::ServerEnable, s).is_err());
        // A different intent still has its own full bucket.
        assert!(lim.check(user, CommandIntent::ServerDisable, s).is_ok());
    }

    #[test]
    fn distinct_users_do_not_share_buckets() {
        let lim = limiter(RateLimitConfig {
            user_capacity: 1,
            ..RateLimitConfig::default()
        });
        let s = spec(10, 10);
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        assert!(lim.check(alice, CommandIntent::ServerList, s).is_ok());
        assert!(lim.check(alice, CommandIntent::ServerList, s).is_err());
        assert!(lim.check(bob, CommandIntent::ServerList, s).is_ok());
    }

    #[test]
    fn repeated_rejections_trigger_auto_block() {
        let lim = limiter(RateLimitConfig {
            user_capacity: 1,
            autoblock_threshold: 3,
            ..RateLimitConfig::default()
        });
        let user = Uuid::new_v4();
        let s = spec(100, 100);

        assert!(lim.check(user, CommandIntent::ServerList, s).is_ok());
        // Rejections 1..=3 stay unblocked, the 4th crosses the threshold.
        for _ in 0..4 {
            let err = lim.check(user, CommandIntent::ServerList, s).unwrap_err();
            assert!(!err.blocked);
        }
        let err = lim.check(user, CommandIntent::ServerList, s).unwrap_err();
        assert!(err.blocked);
        assert!(lim.status(user).is_blocked);
    }

    #[test]
    fn reset_clears_buckets_and_block() {
        let lim = limiter(RateLimitConfig {
            user_capacity: 1,
            autoblock_threshold: 1,
            ..RateLimitConfig::default()
        });
        let user = Uuid::new_v4();
        let s = spec(100, 100);

        let _ = lim.check(user, CommandIntent::ServerList, s);
        let _ = lim.check(user, CommandIntent::ServerList, s);
        let _ = lim.check(user, CommandIntent::ServerList, s);
        assert!(lim.check(user, CommandIntent::ServerList, s).is_err());

        lim.reset(user);
        assert!(!lim.status(user).is_blocked);
        assert!(lim.check(user, CommandIntent::ServerList, s).is_ok());
    }

    #[test]
    fn fixed_window_resets_after_window_elapses() {
        let lim = limiter(RateLimitConfig {
            kind: LimiterKind::FixedWindow,
            window: Duration::from_millis(20),
            window_limit: 2,
            ..RateLimitConfig::default()
        });
        let user = Uuid::new_v4();
        let s = spec(10, 10);

        assert!(lim.check(user, CommandIntent::ServerList, s).is_ok());
        assert!(lim.check(user, CommandIntent::ServerList, s).is_ok());
        assert!(lim.check(user, CommandIntent::ServerList, s).is_err());

        std::thread::sleep(Duration::from_millis(30));
        assert!(lim.check(user, CommandIntent::ServerList, s).is_ok());
    }

    #[test]
    fn status_reports_usage_and_per_command_limits() {
        let lim = limiter(RateLimitConfig::default());
        let user = Uuid::new_v4();
        let s = spec(10, 10);

        for _ in 0..3 {
            lim.check(user, CommandIntent::ServerEnable, s).unwrap();
        }
        let status = lim.status(user);
        assert_eq!(status.used, 3);
        assert_eq!(status.limit, 60);
        let cmd = status.per_command.get("server.enable").unwrap();
        assert_eq!(cmd.limit, 10);
        assert_eq!(cmd.remaining, 7);
    }

    #[test]
    fn remaining_for_untouched_command_is_full_capacity() {
        let lim = limiter(RateLimitConfig::default());
        let (remaining, _) = lim.remaining(Uuid::new_v4(), CommandIntent::ServerList, spec(30, 60));
        assert_eq!(remaining, 30);
    }

    #[tokio::test]
    async fn block_sweeper_clears_expired_blocks() {
        let lim = Arc::new(limiter(RateLimitConfig {
            user_capacity: 1,
            autoblock_threshold: 0,
            block_duration: Duration::from_millis(10),
            sweep_interval: Duration::from_millis(5),
            ..RateLimitConfig::default()
        }));
        let user = Uuid::new_v4();
        let s = spec(100, 100);

        let _ = lim.check(user, CommandIntent::ServerList, s);
        let _ = lim.check(user, CommandIntent::ServerList, s);
        assert!(!lim.blocked.is_empty());

        let cancel = CancellationToken::new();
        let handle = lim.clone().spawn_block_sweeper(cancel.clone());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(lim.blocked.is_empty());

        cancel.cancel();
        handle.await.unwrap();
    }
}
