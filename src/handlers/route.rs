//! Route optimization message handlers

use std::sync::Arc;
use anyhow::Result;
use async_nats::{Client, Subscriber};
use futures::StreamExt;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::OptimizeError;
use crate::services::planner::RoutePlanner;
use crate::types::{
    CancelRouteRequest, CancelRouteResponse, ErrorResponse, OptimizationResult, OptimizeRouteRequest,
    Request, SuccessResponse,
};

/// Serialize the outcome of an optimize call as a reply payload
pub fn optimize_reply(request_id: Uuid, outcome: Result<OptimizationResult, OptimizeError>) -> Vec<u8> {
    let encoded = match outcome {
        Ok(result) => serde_json::to_vec(&SuccessResponse::new(request_id, result)),
        Err(e) => serde_json::to_vec(&ErrorResponse::new(request_id, e.code(), e.to_string())),
    };

    encoded.unwrap_or_else(|e| {
        error!("Failed to serialize optimize reply: {}", e);
        let fallback = ErrorResponse::new(request_id, "INTERNAL_ERROR", "failed to serialize result");
        serde_json::to_vec(&fallback).unwrap_or_default()
    })
}

fn invalid_request(e: serde_json::Error) -> Result<Vec<u8>> {
    let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
    Ok(serde_json::to_vec(&error)?)
}

/// Handle itinerary.route.optimize messages
///
/// The request envelope id doubles as the plan id for cancellation. Each
/// plan runs in its own task so slow plans do not hold up the subscription.
pub async fn handle_optimize(
    client: Client,
    mut subscriber: Subscriber,
    planner: Arc<RoutePlanner>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received route.optimize message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<OptimizeRouteRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse optimize request: {}", e);
                let _ = client.publish(reply, invalid_request(e)?.into()).await;
                continue;
            }
        };

        let client = client.clone();
        let planner = planner.clone();
        tokio::spawn(async move {
            let outcome = planner.optimize_route(request.id, &request.payload).await;
            if let Err(e) = &outcome {
                warn!("Plan {} failed: {}", request.id, e);
            }
            let payload = optimize_reply(request.id, outcome);
            if let Err(e) = client.publish(reply, payload.into()).await {
                error!("Failed to publish optimize reply for plan {}: {}", request.id, e);
            }
        });
    }

    Ok(())
}

/// Handle itinerary.route.cancel messages
pub async fn handle_cancel(
    client: Client,
    mut subscriber: Subscriber,
    planner: Arc<RoutePlanner>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received route.cancel message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<CancelRouteRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse cancel request: {}", e);
                let _ = client.publish(reply, invalid_request(e)?.into()).await;
                continue;
            }
        };

        let plan_id = request.payload.plan_id;
        let response = CancelRouteResponse {
            plan_id,
            cancelled: planner.cancel(plan_id),
        };
        let success = SuccessResponse::new(request.id, response);
        let _ = client.publish(reply, serde_json::to_vec(&success)?.into()).await;
    }

    Ok(())
}
