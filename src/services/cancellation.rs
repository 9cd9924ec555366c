//! Cancellation registry for running route plans
//!
//! Maps plan ids to cancellation tokens, with RAII-based automatic cleanup
//! via `PlanGuard`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use once_cell::sync::Lazy;

/// Global cancellation registry singleton
pub static CANCELLATION: Lazy<CancellationRegistry> = Lazy::new(CancellationRegistry::default);

/// How long an early cancellation waits for its plan to start
const EARLY_CANCEL_TTL: Duration = Duration::from_secs(60);

/// Upper bound on early cancellations kept at once; the oldest goes first
const EARLY_CANCEL_CAPACITY: usize = 1024;

/// RAII guard that removes the plan from the registry when dropped.
/// Must be kept alive while the plan is being optimized.
pub struct PlanGuard {
    plan_id: Uuid,
    registry: CancellationRegistry,
}

impl Drop for PlanGuard {
    fn drop(&mut self) {
        self.registry.remove(&self.plan_id);
    }
}

#[derive(Default)]
struct Plans {
    running: HashMap<Uuid, CancellationToken>,
    /// Cancellations for plans that have not registered yet, with arrival order
    early: HashMap<Uuid, (Instant, u64)>,
    early_seq: u64,
}

impl Plans {
    fn expire_early(&mut self, now: Instant, ttl: Duration) {
        self.early.retain(|_, (at, _)| now.saturating_duration_since(*at) < ttl);
    }
}

/// Thread-safe registry of running plans and their cancellation tokens.
#[derive(Clone)]
pub struct CancellationRegistry {
    plans: Arc<Mutex<Plans>>,
    early_ttl: Duration,
    early_capacity: usize,
}

impl Default for CancellationRegistry {
    fn default() -> Self {
        Self::with_limits(EARLY_CANCEL_TTL, EARLY_CANCEL_CAPACITY)
    }
}

impl CancellationRegistry {
    /// Registry that keeps early cancellations for `early_ttl`, at most
    /// `early_capacity` of them
    pub fn with_limits(early_ttl: Duration, early_capacity: usize) -> Self {
        Self {
            plans: Arc::new(Mutex::new(Plans::default())),
            early_ttl,
            early_capacity: early_capacity.max(1),
        }
    }

    /// Register a plan. Returns a `PlanGuard` that must be held in scope
    /// during optimization, and the token the plan should watch.
    ///
    /// A plan cancelled shortly before it started gets an already-cancelled token.
    pub fn register(&self, plan_id: Uuid) -> (PlanGuard, CancellationToken) {
        let mut plans = self.plans.lock();
        plans.expire_early(Instant::now(), self.early_ttl);
        let cancelled_early = plans.early.remove(&plan_id).is_some();

        let token = plans.running.entry(plan_id).or_insert_with(CancellationToken::new).clone();
        if cancelled_early {
            token.cancel();
        }
        drop(plans);

        let guard = PlanGuard {
            plan_id,
            registry: self.clone(),
        };
        (guard, token)
    }

    /// Cancel a running plan.
    ///
    /// Returns `true` if the plan was found and signalled, `false` if it is
    /// not running (already finished or not yet started).
    pub fn cancel(&self, plan_id: &Uuid) -> bool {
        match self.plans.lock().running.get(plan_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel the plan if it is running, otherwise remember the request so
    /// the plan is cancelled if it registers within the TTL.
    ///
    /// Returns whether a running plan was signalled. Both checks happen
    /// under one lock, so a plan registering concurrently is never missed.
    pub fn pre_cancel(&self, plan_id: Uuid) -> bool {
        let mut plans = self.plans.lock();
        if let Some(token) = plans.running.get(&plan_id) {
            token.cancel();
            return true;
        }

        let now = Instant::now();
        plans.expire_early(now, self.early_ttl);
        if plans.early.len() >= self.early_capacity && !plans.early.contains_key(&plan_id) {
            let oldest = plans.early.iter().min_by_key(|(_, (_, seq))| *seq).map(|(id, _)| *id);
            if let Some(oldest) = oldest {
                plans.early.remove(&oldest);
            }
        }
        plans.early_seq += 1;
        let seq = plans.early_seq;
        plans.early.insert(plan_id, (now, seq));
        false
    }

    /// Check if a plan has been cancelled
    pub fn is_cancelled(&self, plan_id: &Uuid) -> bool {
        let plans = self.plans.lock();
        match plans.running.get(plan_id) {
            Some(token) => token.is_cancelled(),
            None => plans
                .early
                .get(plan_id)
                .is_some_and(|(at, _)| at.elapsed() < self.early_ttl),
        }
    }

    /// Remove a finished plan from the registry.
    /// Called automatically by `PlanGuard::drop`.
    pub fn remove(&self, plan_id: &Uuid) {
        self.plans.lock().running.remove(plan_id);
    }

    /// Check if a plan is currently running (for testing)
    #[cfg(test)]
    fn contains(&self, plan_id: &Uuid) -> bool {
        self.plans.lock().running.contains_key(plan_id)
    }

    /// Number of remembered early cancellations (for testing)
    #[cfg(test)]
    pub(crate) fn early_len(&self) -> usize {
        self.plans.lock().early.len()
    }
}
