//! Plan-level entry points: optimize by plan id, cancel by plan id

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::error::OptimizeError;
use crate::services::cancellation::{CancellationRegistry, CANCELLATION};
use crate::services::orchestrator::OptimizationOrchestrator;
use crate::types::{OptimizationResult, OptimizeRouteRequest};

/// Runs optimizations that can be cancelled by id from another task
#[derive(Clone)]
pub struct RoutePlanner {
    orchestrator: Arc<OptimizationOrchestrator>,
    registry: CancellationRegistry,
}

impl RoutePlanner {
    /// Planner backed by the process-wide cancellation registry
    pub fn new(orchestrator: Arc<OptimizationOrchestrator>) -> Self {
        Self::with_registry(orchestrator, CANCELLATION.clone())
    }

    pub fn with_registry(orchestrator: Arc<OptimizationOrchestrator>, registry: CancellationRegistry) -> Self {
        Self { orchestrator, registry }
    }

    pub async fn optimize_route(
        &self,
        plan_id: Uuid,
        request: &OptimizeRouteRequest,
    ) -> Result<OptimizationResult, OptimizeError> {
        let (_guard, token) = self.registry.register(plan_id);
        debug!("Plan {} registered", plan_id);
        self.orchestrator.optimize(request, &token).await
    }

    /// Signal a plan to stop. Returns whether it was running.
    ///
    /// A plan that has not started yet is cancelled if it registers soon after.
    pub fn cancel(&self, plan_id: Uuid) -> bool {
        let running = self.registry.pre_cancel(plan_id);
        if running {
            info!("Cancellation requested for plan {}", plan_id);
        } else {
            debug!("Plan {} not running, recording early cancellation", plan_id);
        }
        running
    }
}
