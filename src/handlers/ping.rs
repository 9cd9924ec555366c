//! Ping handler for health checks

use anyhow::Result;
use async_nats::{Client, Subscriber};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

#[derive(Debug, Serialize, Deserialize)]
struct PingRequest {
    #[serde(default)]
    message: Option<String>,
}

/// Health reply, including which providers the worker runs against
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PongResponse {
    pub message: String,
    pub timestamp: String,
    pub version: String,
    pub geocoder: String,
    pub routing: String,
}

/// Names of the active providers, reported by ping
#[derive(Debug, Clone)]
pub struct ProviderInfo {
    pub geocoder: String,
    pub routing: String,
}

impl ProviderInfo {
    fn pong(&self, message: Option<String>) -> PongResponse {
        PongResponse {
            message: message.map(|m| format!("Pong: {}", m)).unwrap_or_else(|| "Pong".to_string()),
            timestamp: chrono::Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            geocoder: self.geocoder.clone(),
            routing: self.routing.clone(),
        }
    }
}

/// Handle ping messages
pub async fn handle_ping(client: Client, mut subscriber: Subscriber, providers: ProviderInfo) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received ping message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                error!("Ping message without reply subject");
                continue;
            }
        };

        // An empty body is a plain ping
        let request: PingRequest = if msg.payload.is_empty() {
            PingRequest { message: None }
        } else {
            match serde_json::from_slice(&msg.payload) {
                Ok(req) => req,
                Err(e) => {
                    error!("Failed to parse ping request: {}", e);
                    let error_response = serde_json::json!({
                        "error": {
                            "code": "INVALID_REQUEST",
                            "message": format!("Failed to parse request: {}", e)
                        }
                    });
                    let _ = client.publish(reply, error_response.to_string().into()).await;
                    continue;
                }
            }
        };

        let response_bytes = serde_json::to_vec(&providers.pong(request.message))?;
        client.publish(reply, response_bytes.into()).await?;

        debug!("Sent pong response");
    }

    Ok(())
}
