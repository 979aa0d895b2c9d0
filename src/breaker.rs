// Copyright 2025 Tenant Platform Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Per-instance circuit breaker.
//!
//! State is transient and keyed by instance id. A dropped or expired entry
//! reads as closed, which is observably equivalent to a freshly recovered
//! breaker. Entries live roughly twice the recovery timeout past their
//! last touch.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use strum::Display;

#[derive(Default, Deserialize, Serialize, Clone, Copy, Debug, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    #[strum(to_string = "closed")]
    #[default]
    Closed,

    #[strum(to_string = "open")]
    Open,

    #[strum(to_string = "half_open")]
    HalfOpen,
}

#[derive(Clone, Debug)]
struct BreakerEntry {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    recovery_deadline: Option<Instant>,
    /// Set while the single half-open trial probe is outstanding.
    probe_in_flight: bool,
    touched: Instant,
}

impl BreakerEntry {
    fn new(now: Instant) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure: None,
            recovery_deadline: None,
            probe_in_flight: false,
            touched: now,
        }
    }

    /// Applies the open -> half-open transition once the recovery
    /// deadline has passed. Every mutator goes through this first, so an
    /// outcome recorded after the deadline lands on the half-open state.
    fn tick(&mut self, now: Instant) {
        if self.state == CircuitState::Open
            && self.recovery_deadline.is_some_and(|deadline| now >= deadline)
        {
            self.state = CircuitState::HalfOpen;
            self.probe_in_flight = false;
        }
    }
}

/// Keyed circuit-breaker store with per-key entry locking.
///
/// `allow` is a read (the open -> half-open transition is applied lazily);
/// `record_success` and `record_failure` are the only mutators. All three
/// are safe under concurrent invocation for the same key.
pub struct CircuitBreaker {
    entries: DashMap<String, BreakerEntry>,
    failure_threshold: u32,
    recovery_timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            failure_threshold,
            recovery_timeout,
        }
    }

    /// Whether a call to this instance may proceed right now.
    ///
    /// In half-open exactly one trial probe is granted; further calls are
    /// rejected until `record_success` or `record_failure` lands.
    pub fn allow(&self, key: &str) -> bool {
        self.allow_at(key, Instant::now())
    }

    pub(crate) fn allow_at(&self, key: &str, now: Instant) -> bool {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| BreakerEntry::new(now));
        entry.touched = now;
        entry.tick(now);

        match entry.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                if entry.probe_in_flight {
                    false
                } else {
                    entry.probe_in_flight = true;
                    true
                }
            }
        }
    }

    /// Records a successful call; in half-open (including an open breaker
    /// whose recovery deadline has passed) this closes the breaker.
    /// Returns the resulting state.
    pub fn record_success(&self, key: &str) -> CircuitState {
        self.record_success_at(key, Instant::now())
    }

    pub(crate) fn record_success_at(&self, key: &str, now: Instant) -> CircuitState {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| BreakerEntry::new(now));
        entry.touched = now;
        entry.tick(now);

        match entry.state {
            CircuitState::HalfOpen => {
                entry.state = CircuitState::Closed;
                entry.failure_count = 0;
                entry.recovery_deadline = None;
                entry.probe_in_flight = false;
            }
            CircuitState::Closed => {
                entry.failure_count = 0;
            }
            // A success while open can only come from a call admitted
            // before the trip; the recovery deadline stands.
            CircuitState::Open => {}
        }
        entry.state
    }

    /// Records a failed call. Reaching the threshold while closed trips
    /// the breaker; any failure while half-open re-opens it. Returns the
    /// resulting state.
    pub fn record_failure(&self, key: &str) -> CircuitState {
        self.record_failure_at(key, Instant::now())
    }

    pub(crate) fn record_failure_at(&self, key: &str, now: Instant) -> CircuitState {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| BreakerEntry::new(now));
        entry.touched = now;
        entry.last_failure = Some(now);
        entry.tick(now);

        match entry.state {
            CircuitState::Closed => {
                entry.failure_count += 1;
                if entry.failure_count >= self.failure_threshold {
                    entry.state = CircuitState::Open;
                    entry.recovery_deadline = Some(now + self.recovery_timeout);
                }
            }
            CircuitState::HalfOpen => {
                entry.state = CircuitState::Open;
                entry.recovery_deadline = Some(now + self.recovery_timeout);
                entry.probe_in_flight = false;
            }
            CircuitState::Open => {}
        }
        entry.state
    }

    /// Current state with the lazy time transition applied. Missing
    /// entries read as closed without being materialized.
    pub fn state(&self, key: &str) -> CircuitState {
        self.state_at(key, Instant::now())
    }

    pub(crate) fn state_at(&self, key: &str, now: Instant) -> CircuitState {
        match self.entries.get(key) {
            None => CircuitState::Closed,
            Some(entry) => match (entry.state, entry.recovery_deadline) {
                (CircuitState::Open, Some(deadline)) if now >= deadline => CircuitState::HalfOpen,
                (state, _) => state,
            },
        }
    }

    /// Time until the recovery deadline, for retry-after hints. Zero once
    /// the deadline has passed; `None` when the breaker is not open.
    pub fn retry_after(&self, key: &str) -> Option<Duration> {
        let entry = self.entries.get(key)?;
        if entry.state != CircuitState::Open {
            return None;
        }
        let deadline = entry.recovery_deadline?;
        Some(deadline.saturating_duration_since(Instant::now()))
    }

    /// Drops closed entries untouched for ~2x the recovery timeout.
    /// Open and half-open entries are kept until they resolve.
    pub fn sweep(&self) {
        self.sweep_at(Instant::now())
    }

    pub(crate) fn sweep_at(&self, now: Instant) {
        let ttl = self.recovery_timeout * 2;
        self.entries.retain(|_, entry| {
            entry.state != CircuitState::Closed || now.duration_since(entry.touched) < ttl
        });
    }

    /// Drops all state for an instance, e.g. when the platform reports it
    /// gone.
    pub fn forget(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn tracked(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, recovery_secs: u64) -> CircuitBreaker {
        CircuitBreaker::new(threshold, Duration::from_secs(recovery_secs))
    }

    #[test]
    fn test_trips_open_at_threshold() {
        let cb = breaker(3, 60);
        let t0 = Instant::now();

        assert_eq!(cb.record_failure_at("i1", t0), CircuitState::Closed);
        assert_eq!(cb.record_failure_at("i1", t0), CircuitState::Closed);
        assert_eq!(cb.record_failure_at("i1", t0), CircuitState::Open);
        assert!(!cb.allow_at("i1", t0));
    }

    #[test]
    fn test_open_until_recovery_deadline() {
        let cb = breaker(3, 60);
        let t0 = Instant::now();
        for _ in 0..3 {
            cb.record_failure_at("i1", t0);
        }

        assert!(!cb.allow_at("i1", t0 + Duration::from_secs(30)));
        // Past the deadline the next read transitions to half-open and
        // grants exactly one probe.
        assert!(cb.allow_at("i1", t0 + Duration::from_secs(61)));
        assert_eq!(
            cb.state_at("i1", t0 + Duration::from_secs(61)),
            CircuitState::HalfOpen
        );
        assert!(!cb.allow_at("i1", t0 + Duration::from_secs(61)));
        assert!(!cb.allow_at("i1", t0 + Duration::from_secs(62)));
    }

    #[test]
    fn test_half_open_success_closes() {
        let cb = breaker(3, 60);
        let t0 = Instant::now();
        for _ in 0..3 {
            cb.record_failure_at("i1", t0);
        }
        let t1 = t0 + Duration::from_secs(61);
        assert!(cb.allow_at("i1", t1));

        assert_eq!(cb.record_success_at("i1", t1), CircuitState::Closed);
        assert!(cb.allow_at("i1", t1));
        assert!(cb.allow_at("i1", t1));
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let cb = breaker(3, 60);
        let t0 = Instant::now();
        for _ in 0..3 {
            cb.record_failure_at("i1", t0);
        }
        let t1 = t0 + Duration::from_secs(61);
        assert!(cb.allow_at("i1", t1));

        assert_eq!(cb.record_failure_at("i1", t1), CircuitState::Open);
        assert!(!cb.allow_at("i1", t1 + Duration::from_secs(30)));
        // New deadline counts from the half-open failure.
        assert!(cb.allow_at("i1", t1 + Duration::from_secs(61)));
    }

    #[test]
    fn test_success_after_deadline_closes_without_allow() {
        let cb = breaker(3, 60);
        let t0 = Instant::now();
        for _ in 0..3 {
            cb.record_failure_at("i1", t0);
        }

        // The health loop records outcomes directly; a success after the
        // recovery deadline must close the breaker even though nothing
        // called allow() in between.
        let t1 = t0 + Duration::from_secs(61);
        assert_eq!(cb.state_at("i1", t1), CircuitState::HalfOpen);
        assert_eq!(cb.record_success_at("i1", t1), CircuitState::Closed);
        assert_eq!(cb.state_at("i1", t1), CircuitState::Closed);
        assert!(cb.allow_at("i1", t1));
        assert!(cb.allow_at("i1", t1));
    }

    #[test]
    fn test_failure_after_deadline_reopens_with_fresh_deadline() {
        let cb = breaker(3, 60);
        let t0 = Instant::now();
        for _ in 0..3 {
            cb.record_failure_at("i1", t0);
        }

        let t1 = t0 + Duration::from_secs(61);
        assert_eq!(cb.record_failure_at("i1", t1), CircuitState::Open);
        // The new deadline counts from the post-deadline failure.
        assert_eq!(
            cb.state_at("i1", t1 + Duration::from_secs(30)),
            CircuitState::Open
        );
        assert_eq!(
            cb.state_at("i1", t1 + Duration::from_secs(61)),
            CircuitState::HalfOpen
        );
    }

    #[test]
    fn test_missing_entry_reads_closed() {
        let cb = breaker(3, 60);
        assert_eq!(cb.state("nope"), CircuitState::Closed);
        assert!(cb.allow("nope"));
    }

    #[test]
    fn test_sweep_drops_stale_closed_entries_only() {
        let cb = breaker(3, 60);
        let t0 = Instant::now();
        cb.record_failure_at("closed-stale", t0);
        for _ in 0..3 {
            cb.record_failure_at("open", t0);
        }
        assert_eq!(cb.tracked(), 2);

        cb.sweep_at(t0 + Duration::from_secs(121));
        assert_eq!(cb.tracked(), 1);
        // The swept entry reads as closed again: observably a fresh
        // recovery, never an open breaker.
        assert_eq!(cb.state_at("closed-stale", t0), CircuitState::Closed);
        assert_ne!(cb.state_at("open", t0), CircuitState::Closed);
    }

    #[test]
    fn test_success_resets_closed_counter() {
        let cb = breaker(3, 60);
        let t0 = Instant::now();
        cb.record_failure_at("i1", t0);
        cb.record_failure_at("i1", t0);
        cb.record_success_at("i1", t0);
        cb.record_failure_at("i1", t0);
        cb.record_failure_at("i1", t0);
        assert_eq!(cb.state_at("i1", t0), CircuitState::Closed);
    }
}
