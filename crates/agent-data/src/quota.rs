//! Per-provider quota windows and health flags
//!
//! Window accounting is a fixed window that restarts once it has elapsed. Calls
//! are counted when they start, so a cancelled call still consumes budget.

use crate::clock::{SharedClock, add_duration, has_elapsed};
use crate::error::{ProviderError, ProviderErrorKind};
use crate::models::{ProviderId, SkipReason};
use crate::provider::ProviderDescriptor;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
const DEFAULT_COOLDOWN: Duration = Duration::from_secs(300);

/// Call budget a provider publishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaPolicy {
    Unbounded,
    Windowed { limit: u32, window: Duration },
}

impl QuotaPolicy {
    pub fn per_minute(limit: u32) -> Self {
        Self::Windowed {
            limit,
            window: Duration::from_secs(60),
        }
    }

    pub fn per_day(limit: u32) -> Self {
        Self::Windowed {
            limit,
            window: Duration::from_secs(86_400),
        }
    }
}

/// When a provider is taken out of rotation and when it comes back
#[derive(Debug, Clone, Copy)]
pub struct HealthPolicy {
    /// Consecutive network failures before the provider is marked unhealthy
    pub failure_threshold: u32,
    /// How long a provider stays unhealthy after repeated network failures
    pub cooldown: Duration,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnhealthyReason {
    /// Cleared by a config reload or a later success
    InvalidCredential,
    /// Cleared after the cooldown or a later success
    RepeatedNetworkFailure,
}

/// Mutable accounting for one provider
#[derive(Debug, Clone)]
pub struct QuotaState {
    pub policy: QuotaPolicy,
    pub window_start: DateTime<Utc>,
    pub calls_in_window: u32,
    pub healthy: bool,
    pub last_error: Option<ProviderError>,
    consecutive_failures: u32,
    unhealthy: Option<(UnhealthyReason, DateTime<Utc>)>,
}

impl QuotaState {
    fn new(policy: QuotaPolicy, now: DateTime<Utc>) -> Self {
        Self {
            policy,
            window_start: now,
            calls_in_window: 0,
            healthy: true,
            last_error: None,
            consecutive_failures: 0,
            unhealthy: None,
        }
    }

    /// `None` means unbounded
    pub fn window_limit(&self) -> Option<u32> {
        match self.policy {
            QuotaPolicy::Unbounded => None,
            QuotaPolicy::Windowed { limit, .. } => Some(limit),
        }
    }

    pub fn remaining(&self) -> Option<u32> {
        self.window_limit()
            .map(|limit| limit.saturating_sub(self.calls_in_window))
    }

    pub fn window_reset_at(&self) -> Option<DateTime<Utc>> {
        match self.policy {
            QuotaPolicy::Unbounded => None,
            QuotaPolicy::Windowed { window, .. } => Some(add_duration(self.window_start, window)),
        }
    }

    fn refresh(&mut self, now: DateTime<Utc>, health: &HealthPolicy) {
        if let QuotaPolicy::Windowed { window, .. } = self.policy {
            if has_elapsed(self.window_start, now, window) {
                self.window_start = now;
                self.calls_in_window = 0;
            }
        }
        if let Some((UnhealthyReason::RepeatedNetworkFailure, since)) = self.unhealthy {
            if has_elapsed(since, now, health.cooldown) {
                self.mark_healthy();
            }
        }
    }

    fn check(&self) -> Result<(), SkipReason> {
        if !self.healthy {
            return Err(SkipReason::Unhealthy);
        }
        match self.remaining() {
            Some(0) => Err(SkipReason::QuotaExhausted),
            _ => Ok(()),
        }
    }

    fn mark_healthy(&mut self) {
        self.healthy = true;
        self.unhealthy = None;
        self.consecutive_failures = 0;
    }

    fn mark_unhealthy(&mut self, reason: UnhealthyReason, now: DateTime<Utc>) {
        self.healthy = false;
        self.unhealthy = Some((reason, now));
    }
}

/// Serializable view of one provider's state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaStatus {
    pub healthy: bool,
    /// `None` means unbounded
    pub quota_remaining: Option<u32>,
    pub window_reset_at: Option<DateTime<Utc>>,
    pub calls_in_window: u32,
    pub unhealthy_reason: Option<UnhealthyReason>,
    pub last_error: Option<ProviderError>,
}

/// Thread-safe tracker consulted before every provider attempt
pub struct QuotaTracker {
    states: Mutex<HashMap<ProviderId, QuotaState>>,
    health: HealthPolicy,
    clock: SharedClock,
}

impl QuotaTracker {
    pub fn new(descriptors: &[ProviderDescriptor], clock: SharedClock) -> Self {
        Self::with_health_policy(descriptors, clock, HealthPolicy::default())
    }

    pub fn with_health_policy(
        descriptors: &[ProviderDescriptor],
        clock: SharedClock,
        health: HealthPolicy,
    ) -> Self {
        let now = clock.now();
        let states = descriptors
            .iter()
            .map(|d| (d.id, QuotaState::new(d.quota, now)))
            .collect();
        Self {
            states: Mutex::new(states),
            health,
            clock,
        }
    }

    /// Lock the state map, recovering from poison if necessary
    fn lock_states(&self) -> MutexGuard<'_, HashMap<ProviderId, QuotaState>> {
        self.states.lock().unwrap_or_else(|poisoned| {
            warn!("Quota tracker mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Whether a call to `provider` would currently be allowed
    ///
    /// Untracked providers are treated as healthy and unbounded.
    pub fn can_attempt(&self, provider: ProviderId) -> bool {
        let now = self.clock.now();
        let mut states = self.lock_states();
        states.get_mut(&provider).is_none_or(|state| {
            state.refresh(now, &self.health);
            state.check().is_ok()
        })
    }

    /// Check and reserve one call in the current window
    pub fn try_acquire(&self, provider: ProviderId) -> Result<(), SkipReason> {
        let now = self.clock.now();
        let mut states = self.lock_states();
        let Some(state) = states.get_mut(&provider) else {
            return Ok(());
        };
        state.refresh(now, &self.health);
        state.check()?;
        state.calls_in_window += 1;
        Ok(())
    }

    /// Update health after an attempt finished
    pub fn record_outcome(&self, provider: ProviderId, outcome: Result<(), &ProviderError>) {
        let now = self.clock.now();
        let mut states = self.lock_states();
        let Some(state) = states.get_mut(&provider) else {
            return;
        };

        let err = match outcome {
            Ok(()) => {
                if !state.healthy {
                    info!("Provider {} recovered", provider);
                }
                state.mark_healthy();
                return;
            },
            Err(err) => err,
        };
        state.last_error = Some(err.clone());

        match err.kind() {
            ProviderErrorKind::InvalidCredential => {
                warn!("Provider {} rejected its credential, disabling until reload", provider);
                state.mark_unhealthy(UnhealthyReason::InvalidCredential, now);
            },
            ProviderErrorKind::NetworkFailure => {
                state.consecutive_failures += 1;
                if state.healthy && state.consecutive_failures >= self.health.failure_threshold {
                    warn!(
                        "Provider {} failed {} times in a row, cooling down for {:?}",
                        provider, state.consecutive_failures, self.health.cooldown
                    );
                    state.mark_unhealthy(UnhealthyReason::RepeatedNetworkFailure, now);
                }
            },
            ProviderErrorKind::RateLimitExceeded => {
                if let Some(limit) = state.window_limit() {
                    debug!("Provider {} reported rate limiting, exhausting window", provider);
                    state.calls_in_window = state.calls_in_window.max(limit);
                }
            },
            ProviderErrorKind::NotFound => state.consecutive_failures = 0,
            ProviderErrorKind::Unsupported => {},
        }
    }

    /// Re-enable a provider that was disabled for a rejected credential
    pub fn clear_credential_failure(&self, provider: ProviderId) {
        let mut states = self.lock_states();
        if let Some(state) = states.get_mut(&provider) {
            if matches!(state.unhealthy, Some((UnhealthyReason::InvalidCredential, _))) {
                info!("Re-enabling provider {} after config reload", provider);
                state.mark_healthy();
            }
        }
    }

    pub fn status(&self, provider: ProviderId) -> Option<QuotaStatus> {
        let now = self.clock.now();
        let mut states = self.lock_states();
        let state = states.get_mut(&provider)?;
        state.refresh(now, &self.health);
        Some(QuotaStatus {
            healthy: state.healthy,
            quota_remaining: state.remaining(),
            window_reset_at: state.window_reset_at(),
            calls_in_window: state.calls_in_window,
            unhealthy_reason: state.unhealthy.map(|(reason, _)| reason),
            last_error: state.last_error.clone(),
        })
    }

    pub fn snapshot(&self) -> BTreeMap<ProviderId, QuotaStatus> {
        let ids: Vec<ProviderId> = self.lock_states().keys().copied().collect();
        ids.into_iter()
            .filter_map(|id| self.status(id).map(|status| (id, status)))
            .collect()
    }
}

impl std::fmt::Debug for QuotaTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaTracker")
            .field("health", &self.health)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::CostTier;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn descriptor(id: ProviderId, quota: QuotaPolicy) -> ProviderDescriptor {
        ProviderDescriptor {
            id,
            supports_news: true,
            supports_profile: true,
            cost_tier: CostTier::Free,
            quality_tier: 1,
            quota,
            news_ttl: Duration::from_secs(60),
            profile_ttl: Duration::from_secs(60),
        }
    }

    fn tracker(quota: QuotaPolicy) -> (QuotaTracker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ));
        let tracker = QuotaTracker::new(&[descriptor(ProviderId::AlphaVantage, quota)], clock.clone());
        (tracker, clock)
    }

    #[test]
    fn test_window_exhaustion_and_reset() {
        let (tracker, clock) = tracker(QuotaPolicy::per_minute(2));
        let id = ProviderId::AlphaVantage;

        assert!(tracker.try_acquire(id).is_ok());
        assert!(tracker.try_acquire(id).is_ok());
        assert!(!tracker.can_attempt(id));
        assert_eq!(tracker.try_acquire(id), Err(SkipReason::QuotaExhausted));
        assert_eq!(tracker.status(id).unwrap().quota_remaining, Some(0));

        clock.advance(Duration::from_secs(59));
        assert!(!tracker.can_attempt(id));

        clock.advance(Duration::from_secs(1));
        assert!(tracker.can_attempt(id));
        assert_eq!(tracker.status(id).unwrap().quota_remaining, Some(2));
    }

    #[test]
    fn test_counts_regardless_of_outcome() {
        let (tracker, _clock) = tracker(QuotaPolicy::per_day(10));
        let id = ProviderId::AlphaVantage;

        tracker.try_acquire(id).unwrap();
        tracker.record_outcome(id, Ok(()));
        tracker.try_acquire(id).unwrap();
        tracker.record_outcome(id, Err(&ProviderError::NotFound("nope".into())));

        let status = tracker.status(id).unwrap();
        assert_eq!(status.calls_in_window, 2);
        assert_eq!(status.quota_remaining, Some(8));
        assert!(status.healthy);
    }

    #[test]
    fn test_unbounded_never_exhausts() {
        let (tracker, _clock) = tracker(QuotaPolicy::Unbounded);
        for _ in 0..1_000 {
            assert!(tracker.try_acquire(ProviderId::AlphaVantage).is_ok());
        }
        let status = tracker.status(ProviderId::AlphaVantage).unwrap();
        assert_eq!(status.quota_remaining, None);
        assert_eq!(status.window_reset_at, None);
    }

    #[test]
    fn test_untracked_provider_is_allowed() {
        let (tracker, _clock) = tracker(QuotaPolicy::Unbounded);
        assert!(tracker.can_attempt(ProviderId::GoogleNews));
        assert!(tracker.try_acquire(ProviderId::GoogleNews).is_ok());
        assert!(tracker.status(ProviderId::GoogleNews).is_none());
    }

    #[test]
    fn test_invalid_credential_until_cleared() {
        let (tracker, clock) = tracker(QuotaPolicy::Unbounded);
        let id = ProviderId::AlphaVantage;

        tracker.record_outcome(id, Err(&ProviderError::InvalidCredential("bad key".into())));
        assert!(!tracker.can_attempt(id));
        assert_eq!(tracker.try_acquire(id), Err(SkipReason::Unhealthy));

        clock.advance(Duration::from_secs(86_400));
        assert!(!tracker.can_attempt(id), "credential failures do not cool down");

        tracker.clear_credential_failure(id);
        assert!(tracker.can_attempt(id));
    }

    #[test]
    fn test_repeated_network_failures_cool_down() {
        let (tracker, clock) = tracker(QuotaPolicy::Unbounded);
        let id = ProviderId::AlphaVantage;
        let failure = ProviderError::NetworkFailure("timeout".into());

        tracker.record_outcome(id, Err(&failure));
        tracker.record_outcome(id, Err(&failure));
        assert!(tracker.can_attempt(id));

        tracker.record_outcome(id, Err(&failure));
        assert!(!tracker.can_attempt(id));
        let status = tracker.status(id).unwrap();
        assert_eq!(status.unhealthy_reason, Some(UnhealthyReason::RepeatedNetworkFailure));
        assert_eq!(status.last_error, Some(failure));

        clock.advance(DEFAULT_COOLDOWN);
        assert!(tracker.can_attempt(id));
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let (tracker, _clock) = tracker(QuotaPolicy::Unbounded);
        let id = ProviderId::AlphaVantage;
        let failure = ProviderError::NetworkFailure("reset".into());

        tracker.record_outcome(id, Err(&failure));
        tracker.record_outcome(id, Err(&failure));
        tracker.record_outcome(id, Ok(()));
        tracker.record_outcome(id, Err(&failure));
        tracker.record_outcome(id, Err(&failure));
        assert!(tracker.can_attempt(id));
    }

    #[test]
    fn test_rate_limit_exhausts_bounded_window() {
        let (tracker, _clock) = tracker(QuotaPolicy::per_day(500));
        let id = ProviderId::AlphaVantage;

        tracker.try_acquire(id).unwrap();
        tracker.record_outcome(id, Err(&ProviderError::RateLimitExceeded("Note".into())));
        assert!(!tracker.can_attempt(id));
        assert!(tracker.status(id).unwrap().healthy);
    }
}
