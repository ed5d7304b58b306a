//! Per-identity admission control.
//!
//! Every caller identity owns a window of tracked requests. Each tracked
//! record and each block carries its own timer, so state expires on its own
//! without a periodic sweep. All mutation of one identity's window happens
//! under that identity's `DashMap` shard lock.

mod policy;
mod window;

pub use policy::AdmissionPolicy;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Local, TimeDelta};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::identity::{Identity, IdentityKind};
use crate::metrics::{ADMISSION_DECISIONS, LIVE_WINDOWS};
use window::{Block, Timer, Window};

/// Why a request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// A block was already active.
    Blocked,
    /// Request arrived too soon after the previous one.
    Spacing,
    /// Too many tracked requests.
    Capacity,
    /// Mean inter-arrival time too low.
    Burst,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::Blocked => "blocked",
            DenyReason::Spacing => "spacing",
            DenyReason::Capacity => "capacity",
            DenyReason::Burst => "burst",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Denial {
    pub reason: DenyReason,
    /// Offset from the decision to the advertised retry time.
    pub retry_after: Duration,
    /// Wall-clock retry time shown to the caller.
    pub retry_at: DateTime<Local>,
    /// Length of the block opened by this decision, for 30s-class penalties.
    pub penalty: Option<Duration>,
}

impl Denial {
    fn new(reason: DenyReason, retry_after: Duration, penalty: Option<Duration>) -> Self {
        let offset = TimeDelta::from_std(retry_after).unwrap_or(TimeDelta::zero());
        Self {
            reason,
            retry_after,
            retry_at: Local::now() + offset,
            penalty,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Decision {
    Allow,
    Deny(Denial),
}

impl Decision {
    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Read-only view of a window, for health output and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSnapshot {
    pub kind: IdentityKind,
    pub tracked: usize,
    pub last_request: Instant,
    pub blocked_until: Option<Instant>,
    pub record_times: Vec<Instant>,
}

struct Registry {
    windows: DashMap<String, Window>,
    policy: AdmissionPolicy,
    next_id: AtomicU64,
}

/// Decides allow/deny per identity. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct AdmissionController {
    registry: Arc<Registry>,
}

impl Default for AdmissionController {
    fn default() -> Self {
        Self::new(AdmissionPolicy::default())
    }
}

impl AdmissionController {
    pub fn new(policy: AdmissionPolicy) -> Self {
        Self {
            registry: Arc::new(Registry {
                windows: DashMap::new(),
                policy,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn policy(&self) -> &AdmissionPolicy {
        &self.registry.policy
    }

    /// Number of identities currently tracked.
    pub fn window_count(&self) -> usize {
        self.registry.windows.len()
    }

    pub fn snapshot(&self, key: &str) -> Option<WindowSnapshot> {
        let now = Instant::now();
        self.registry.windows.get(key).map(|w| WindowSnapshot {
            kind: w.kind,
            tracked: w.records.len(),
            last_request: w.last_request,
            blocked_until: w.blocked_until(now),
            record_times: w.records.values().map(|r| r.inserted_at).collect(),
        })
    }

    /// Decides whether `identity` may proceed, updating its window.
    ///
    /// Must be called from within a tokio runtime: records and blocks
    /// schedule their own expiry tasks.
    pub fn admit(&self, identity: &Identity, timeout_hint: Option<Duration>, use_address_policy: bool) -> Decision {
        let decision = self.evaluate(identity, timeout_hint, use_address_policy);
        let label = match &decision {
            Decision::Allow => "allow",
            Decision::Deny(denial) => denial.reason.as_str(),
        };
        ADMISSION_DECISIONS.with_label_values(&[label]).inc();
        decision
    }

    fn evaluate(&self, identity: &Identity, timeout_hint: Option<Duration>, use_address_policy: bool) -> Decision {
        let policy = &self.registry.policy;
        let now = Instant::now();
        let key = identity.key();

        let mut window = match self.registry.windows.entry(key.to_owned()) {
            Entry::Vacant(vacant) => {
                let mut window = Window::new(identity.kind(), now);
                let id = self.registry.next_id();
                window.push_record(id, now, self.schedule_expiry(key, id, now + policy.first_record_ttl));
                vacant.insert(window);
                LIVE_WINDOWS.inc();
                debug!(identity = %identity.fingerprint(), "window opened");
                return Decision::Allow;
            }
            Entry::Occupied(occupied) => occupied.into_ref(),
        };

        if let Some(end) = window.blocked_until(now) {
            return Decision::Deny(Denial::new(DenyReason::Blocked, end - now, None));
        }

        let threshold = policy.spacing_threshold(timeout_hint, use_address_policy);
        if now.saturating_duration_since(window.last_request) < threshold {
            let id = self.registry.next_id();
            window.push_record(id, now, self.schedule_expiry(key, id, now + policy.spacing_record_ttl));
            window.open_block(self.new_block(key, now, policy.spacing_block));
            info!(identity = %identity.fingerprint(), ?threshold, "spacing violation, blocking");
            return Decision::Deny(Denial::new(DenyReason::Spacing, policy.spacing_advertised, None));
        }

        if window.records.len() >= policy.capacity {
            let id = self.registry.next_id();
            window.push_record(id, now, self.schedule_expiry(key, id, now + policy.record_ttl));
            window.open_block(self.new_block(key, now, policy.penalty_block));
            info!(identity = %identity.fingerprint(), tracked = window.records.len(), "capacity exceeded, blocking");
            return Decision::Deny(Denial::new(
                DenyReason::Capacity,
                policy.penalty_block,
                Some(policy.penalty_block),
            ));
        }

        let id = self.registry.next_id();
        window.push_record(id, now, self.schedule_expiry(key, id, now + policy.record_ttl));

        let bursting = window
            .mean_gap()
            .is_some_and(|mean| mean < policy.burst_mean_gap);
        if policy.burst_rule_applies(timeout_hint, use_address_policy)
            && window.records.len() >= policy.burst_min_records
            && bursting
        {
            window.open_block(self.new_block(key, now, policy.penalty_block));
            info!(identity = %identity.fingerprint(), tracked = window.records.len(), "burst detected, blocking");
            return Decision::Deny(Denial::new(
                DenyReason::Burst,
                policy.penalty_block,
                Some(policy.penalty_block),
            ));
        }

        Decision::Allow
    }

    fn new_block(&self, key: &str, now: Instant, length: Duration) -> Block {
        let id = self.registry.next_id();
        let end = now + length;
        let registry = Arc::downgrade(&self.registry);
        let key = key.to_owned();
        let timer = Timer::new(tokio::spawn(async move {
            tokio::time::sleep_until(end).await;
            if let Some(registry) = registry.upgrade() {
                registry.clear_block(&key, id);
            }
        }));
        Block {
            id,
            start: now,
            end,
            timer,
        }
    }

    fn schedule_expiry(&self, key: &str, id: u64, deadline: Instant) -> Timer {
        let registry: Weak<Registry> = Arc::downgrade(&self.registry);
        let key = key.to_owned();
        Timer::new(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(registry) = registry.upgrade() {
                registry.expire_record(&key, id);
            }
        }))
    }
}

// Windows still live when the last controller clone goes away leave the gauge.
impl Drop for Registry {
    fn drop(&mut self) {
        LIVE_WINDOWS.sub(self.windows.len() as f64);
    }
}

impl Registry {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Chain repair: hand `last_request` to the successor, or close the window.
    /// A window under an active block outlives its records until the block clears.
    fn expire_record(&self, key: &str, id: u64) {
        let Entry::Occupied(mut occupied) = self.windows.entry(key.to_owned()) else {
            return;
        };
        let window = occupied.get_mut();
        let Some(record) = window.records.get(&id) else {
            return;
        };

        let successor_time = record
            .successor
            .and_then(|next| window.records.get(&next))
            .map(|next| next.inserted_at);

        match successor_time {
            Some(at) => {
                window.last_request = at;
                window.records.remove(&id);
            }
            None if window.blocked_until(Instant::now()).is_some() => {
                window.records.remove(&id);
                debug!(record = id, "record expired under active block");
            }
            None => {
                occupied.remove();
                LIVE_WINDOWS.dec();
                debug!(record = id, "window closed");
            }
        }
    }

    fn clear_block(&self, key: &str, block_id: u64) {
        let Entry::Occupied(mut occupied) = self.windows.entry(key.to_owned()) else {
            return;
        };
        let window = occupied.get_mut();
        if !window.block.as_ref().is_some_and(|b| b.id == block_id) {
            return;
        }
        if let Some(block) = window.block.take() {
            debug!(held = ?(block.end - block.start), "block cleared");
        }
        if window.records.is_empty() {
            occupied.remove();
            LIVE_WINDOWS.dec();
            debug!("window closed");
        }
    }
}
