//! RequestRouter (C7): dispatch over the closed envelope `type` set.
//!
//! Handlers run inline on the connection's read-loop task up to the point
//! where they hand off to the registry's `.await`ed store calls — there is
//! no separate worker-pool executor, matching the "synchronous up to the
//! point a handler might block" shape.

use std::sync::Arc;

use serde_json::json;

use crate::envelope::*;
use crate::error::HubError;
use crate::registry::{ConnectionId, NetworkRegistry};

/// Returns `Some(response envelope)` to send back to the caller directly,
/// `None` when the request produces no direct response (pure notifications
/// are sent by the registry itself), or `Err` to be turned into an `Error`
/// envelope by the caller.
pub async fn dispatch(
    registry: &Arc<NetworkRegistry>,
    public_key: &str,
    connection_id: ConnectionId,
    envelope: &Envelope,
) -> Result<Option<Envelope>, HubError> {
    let reply = match envelope.kind.as_str() {
        "CreateNetwork" => {
            let req: CreateNetworkRequest = envelope.decode_payload()?;
            let resp = registry.create_network(public_key, &req, connection_id).await?;
            Some(Envelope::response(&envelope.message_id, "NetworkCreated", resp))
        }
        "JoinNetwork" => {
            let req: JoinNetworkRequest = envelope.decode_payload()?;
            let resp = registry.join_network(public_key, &req, connection_id).await?;
            Some(Envelope::response(&envelope.message_id, "NetworkJoined", resp))
        }
        "ConnectNetwork" => {
            let req: ConnectNetworkRequest = envelope.decode_payload()?;
            let resp = registry
                .connect_network(public_key, &req, connection_id)
                .await?;
            Some(Envelope::response(&envelope.message_id, "NetworkConnected", resp))
        }
        "DisconnectNetwork" => {
            let req: DisconnectNetworkRequest = envelope.decode_payload()?;
            let resp = registry.disconnect_network(public_key, &req).await?;
            Some(Envelope::response(&envelope.message_id, "NetworkDisconnected", resp))
        }
        "LeaveNetwork" => {
            let req: LeaveNetworkRequest = envelope.decode_payload()?;
            let resp = registry.leave_network(public_key, &req).await?;
            Some(Envelope::response(&envelope.message_id, "LeaveNetwork", resp))
        }
        "Kick" => {
            let req: KickRequest = envelope.decode_payload()?;
            let resp = registry.kick(public_key, &req, &envelope.payload).await?;
            Some(Envelope::response(&envelope.message_id, "KickSuccess", resp))
        }
        "Rename" => {
            let req: RenameRequest = envelope.decode_payload()?;
            let resp = registry.rename(public_key, &req, &envelope.payload).await?;
            Some(Envelope::response(&envelope.message_id, "RenameSuccess", resp))
        }
        "GetComputerNetworks" => {
            let _req: GetComputerNetworksRequest = envelope.decode_payload()?;
            let resp = registry.snapshot_for(public_key).await?;
            Some(Envelope::response(&envelope.message_id, "ComputerNetworks", resp))
        }
        "SdpOffer" | "SdpAnswer" | "IceCandidate" => {
            let req: SignalRequest = envelope.decode_payload()?;
            registry.relay_signal(public_key, &req, &envelope.kind).await?;
            None
        }
        "Ping" => Some(Envelope::response(&envelope.message_id, "Pong", json!({}))),
        other => {
            return Err(HubError::Protocol(format!("unknown request type {other}")));
        }
    };
    Ok(reply)
}
