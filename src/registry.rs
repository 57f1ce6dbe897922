//! NetworkRegistry (C6): authoritative in-memory membership + virtual-IP
//! state, backed by the metadata store for durability across reconnects.
//!
//! Each `NetworkState` is protected by its own `tokio::sync::Mutex`; the
//! outer directory is a `tokio::sync::RwLock<HashMap<..>>` since inserts and
//! removals of whole networks are rare next to per-network mutation —
//! mirroring the outer-lock/per-entry-lock split in the teacher's
//! `DeltaTopicMap` (`network.rs`) and the other_examples S2S peer map.

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use regex::Regex;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{info, warn};

use crate::config::HubConfig;
use crate::envelope::*;
use crate::error::HubError;
use crate::ip_allocator::IpAllocator;
use crate::store;

pub type NetworkId = String;
pub type PublicKeyHex = String;
pub type ConnectionId = u64;

#[derive(Debug, Clone)]
pub struct LiveMember {
    pub public_key: PublicKeyHex,
    pub computer_name: String,
    pub assigned_ip: Ipv4Addr,
    pub assigned_octet: u8,
    pub connection_id: Option<ConnectionId>,
}

impl LiveMember {
    fn info(&self) -> MemberInfo {
        MemberInfo {
            public_key: self.public_key.clone(),
            computer_name: self.computer_name.clone(),
            assigned_ip: self.assigned_ip.to_string(),
            online: self.connection_id.is_some(),
        }
    }
}

pub struct NetworkState {
    pub id: NetworkId,
    pub name: String,
    pub pin_hash: String,
    pub owner_key: PublicKeyHex,
    pub created_at: i64,
    pub last_active_at: i64,
    pub members: HashMap<PublicKeyHex, LiveMember>,
    pub allocator: IpAllocator,
}

impl NetworkState {
    /// The network's `/24` subnet, read off the allocator rather than kept
    /// as a second copy of the same string.
    fn subnet(&self) -> &str {
        self.allocator.subnet()
    }

    fn touch(&mut self, now: i64) {
        self.last_active_at = now;
    }

    fn online_members(&self) -> impl Iterator<Item = &LiveMember> {
        self.members.values().filter(|m| m.connection_id.is_some())
    }

    fn snapshot(&self) -> Vec<MemberInfo> {
        self.members.values().map(LiveMember::info).collect()
    }
}

pub struct ConnectionHandle {
    pub public_key: PublicKeyHex,
    pub tx: mpsc::Sender<Envelope>,
}

pub struct NetworkRegistry {
    store: SqlitePool,
    config: HubConfig,
    networks: RwLock<HashMap<NetworkId, Arc<Mutex<NetworkState>>>>,
    by_public_key: RwLock<HashMap<PublicKeyHex, HashSet<NetworkId>>>,
    connections: RwLock<HashMap<ConnectionId, ConnectionHandle>>,
    next_network_index: AtomicU16,
    next_connection_id: AtomicU64,
    pin_regex: Regex,
}

impl NetworkRegistry {
    pub fn new(store: SqlitePool, config: HubConfig) -> Self {
        let pin_regex = Regex::new(&config.pin_pattern).unwrap_or_else(|_| {
            Regex::new(r"^\d{4,8}$").expect("fallback pin pattern is valid")
        });
        NetworkRegistry {
            store,
            config,
            networks: RwLock::new(HashMap::new()),
            by_public_key: RwLock::new(HashMap::new()),
            connections: RwLock::new(HashMap::new()),
            next_network_index: AtomicU16::new(0),
            next_connection_id: AtomicU64::new(1),
            pin_regex,
        }
    }

    /// Cold-cache fill from the metadata store, run once at startup before
    /// the listener binds.
    pub async fn load_from_store(&self) -> Result<(), HubError> {
        let rows = store::list_networks(&self.store).await?;
        let mut max_index: u16 = 0;
        let mut networks = self.networks.write().await;
        let mut by_key = self.by_public_key.write().await;

        for row in rows {
            if let Some(idx) = crate::config::subnet_network_octet(&row.subnet) {
                max_index = max_index.max(idx as u16);
            }
            let members_rows = store::list_memberships_for_network(&self.store, &row.id).await?;
            let mut allocator = IpAllocator::new(&row.subnet, self.config.max_members_per_network);
            let mut members = HashMap::new();
            for m in members_rows {
                let octet: u8 = m
                    .assigned_ip
                    .rsplit('.')
                    .next()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0);
                let _ = allocator.lease(Some(octet));
                by_key
                    .entry(m.public_key.clone())
                    .or_default()
                    .insert(row.id.clone());
                members.insert(
                    m.public_key.clone(),
                    LiveMember {
                        public_key: m.public_key,
                        computer_name: m.computer_name,
                        assigned_ip: crate::config::host_ip(&row.subnet, octet)
                            .unwrap_or(Ipv4Addr::UNSPECIFIED),
                        assigned_octet: octet,
                        connection_id: None,
                    },
                );
            }
            networks.insert(
                row.id.clone(),
                Arc::new(Mutex::new(NetworkState {
                    id: row.id,
                    name: row.name,
                    pin_hash: row.pin_hash,
                    owner_key: row.owner_key,
                    created_at: row.created_at,
                    last_active_at: row.last_active_at,
                    members,
                    allocator,
                })),
            );
        }
        self.next_network_index.store(max_index.wrapping_add(1), Ordering::SeqCst);
        info!(count = networks.len(), "loaded networks from store");
        Ok(())
    }

    pub async fn register_connection(&self, public_key: &str, tx: mpsc::Sender<Envelope>) -> ConnectionId {
        let id = self.next_connection_id.fetch_add(1, Ordering::SeqCst);
        let handle = ConnectionHandle {
            public_key: public_key.to_string(),
            tx,
        };
        self.connections.write().await.insert(id, handle);
        id
    }

    pub async fn deregister_connection(&self, connection_id: ConnectionId) {
        self.connections.write().await.remove(&connection_id);
    }

    async fn send_to(&self, connection_id: ConnectionId, envelope: Envelope) {
        let connections = self.connections.read().await;
        if let Some(handle) = connections.get(&connection_id) {
            if handle.tx.try_send(envelope).is_err() {
                warn!(connection_id, "outbound queue full, dropping notification");
            }
        }
    }

    async fn broadcast(&self, state: &NetworkState, envelope: Envelope, except: Option<ConnectionId>) {
        for member in state.online_members() {
            if Some(member.connection_id.unwrap()) == except {
                continue;
            }
            if let Some(cid) = member.connection_id {
                self.send_to(cid, envelope.clone()).await;
            }
        }
    }

    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }

    /// Policy validation of a *new* PIN against `pinPattern` (used by
    /// `createNetwork`) — distinct from `BadPin`, which is reserved for an
    /// admission-secret mismatch against an existing network's PIN.
    fn validate_pin(&self, pin: &str) -> Result<(), HubError> {
        if self.pin_regex.is_match(pin) {
            Ok(())
        } else {
            Err(HubError::Policy("pin does not match required pattern".into()))
        }
    }

    fn hash_pin(pin: &str) -> String {
        hex::encode(Sha256::digest(pin.as_bytes()))
    }

    pub async fn create_network(
        &self,
        owner_key: &str,
        req: &CreateNetworkRequest,
        connection_id: ConnectionId,
    ) -> Result<NetworkCreatedResponse, HubError> {
        self.validate_pin(&req.pin)?;
        if req.network_name.trim().is_empty() {
            return Err(HubError::Protocol("network name must not be empty".into()));
        }

        {
            let networks = self.networks.read().await;
            if networks.len() >= self.config.max_networks {
                return Err(HubError::Capacity("server has reached max networks".into()));
            }
        }

        let index = self.next_network_index.fetch_add(1, Ordering::SeqCst);
        let subnet = self.config.subnet_for(index);
        let network_id = new_message_id();
        let now = Self::now();

        let mut allocator = IpAllocator::new(&subnet, self.config.max_members_per_network);
        let octet = allocator.lease(None)?;
        let assigned_ip = crate::config::host_ip(&subnet, octet).unwrap();

        let mut members = HashMap::new();
        members.insert(
            owner_key.to_string(),
            LiveMember {
                public_key: owner_key.to_string(),
                computer_name: req.computer_name.clone(),
                assigned_ip,
                assigned_octet: octet,
                connection_id: Some(connection_id),
            },
        );

        let pin_hash = Self::hash_pin(&req.pin);

        store::insert_network(
            &self.store,
            &store::NetworkRow {
                id: network_id.clone(),
                name: req.network_name.clone(),
                pin_hash: pin_hash.clone(),
                owner_key: owner_key.to_string(),
                subnet: subnet.clone(),
                created_at: now,
                last_active_at: now,
            },
        )
        .await?;
        store::upsert_membership(
            &self.store,
            &store::MembershipRow {
                network_id: network_id.clone(),
                public_key: owner_key.to_string(),
                assigned_ip: assigned_ip.to_string(),
                computer_name: req.computer_name.clone(),
                joined_at: now,
                last_connected_at: now,
            },
        )
        .await?;

        let in_use = allocator.in_use();
        let state = NetworkState {
            id: network_id.clone(),
            name: req.network_name.clone(),
            pin_hash,
            owner_key: owner_key.to_string(),
            created_at: now,
            last_active_at: now,
            members,
            allocator,
        };

        self.networks
            .write()
            .await
            .insert(network_id.clone(), Arc::new(Mutex::new(state)));
        self.by_public_key
            .write()
            .await
            .entry(owner_key.to_string())
            .or_default()
            .insert(network_id.clone());

        info!(network_id = %network_id, owner = %owner_key, in_use, "network created");

        self.send_to(
            connection_id,
            Envelope::notification(
                "ClientIPInfo",
                ClientIpInfoNotification {
                    network_id: network_id.clone(),
                    assigned_ip: assigned_ip.to_string(),
                },
            ),
        )
        .await;

        Ok(NetworkCreatedResponse {
            network_id,
            name: req.network_name.clone(),
            assigned_ip: assigned_ip.to_string(),
            subnet,
        })
    }

    async fn get_network(&self, network_id: &str) -> Result<Arc<Mutex<NetworkState>>, HubError> {
        self.networks
            .read()
            .await
            .get(network_id)
            .cloned()
            .ok_or_else(|| HubError::NotFound(format!("network {network_id} not found")))
    }

    pub async fn join_network(
        &self,
        public_key: &str,
        req: &JoinNetworkRequest,
        connection_id: ConnectionId,
    ) -> Result<NetworkJoinedResponse, HubError> {
        let network = self.get_network(&req.network_id).await?;
        let mut state = network.lock().await;

        if state.pin_hash != Self::hash_pin(&req.pin) {
            return Err(HubError::BadPin);
        }

        let preferred_octet = state
            .members
            .get(public_key)
            .map(|m| m.assigned_octet);

        if preferred_octet.is_none() && state.members.len() >= self.config.max_members_per_network {
            return Err(HubError::Capacity("network is full".into()));
        }

        // Stable re-lease (§4.3 policy 1): an existing member's octet is
        // already held in `allocator.leased`, and `IpAllocator::lease` only
        // ever hands back an already-leased octet by hitting the "free
        // address" path — which it never is here — so a returning member
        // must short-circuit straight to its recorded octet instead of
        // calling `lease` again.
        let octet = match preferred_octet {
            Some(o) => {
                if !state.allocator.peek(o) {
                    state.allocator.lease(Some(o))?;
                }
                o
            }
            None => state.allocator.lease(None)?,
        };
        let assigned_ip = crate::config::host_ip(state.subnet(), octet).unwrap();
        let now = Self::now();

        let member = LiveMember {
            public_key: public_key.to_string(),
            computer_name: req.computer_name.clone(),
            assigned_ip,
            assigned_octet: octet,
            connection_id: Some(connection_id),
        };

        store::upsert_membership(
            &self.store,
            &store::MembershipRow {
                network_id: req.network_id.clone(),
                public_key: public_key.to_string(),
                assigned_ip: assigned_ip.to_string(),
                computer_name: req.computer_name.clone(),
                joined_at: now,
                last_connected_at: now,
            },
        )
        .await?;

        state.members.insert(public_key.to_string(), member.clone());
        state.touch(now);
        let snapshot = state.snapshot();
        let name = state.name.clone();
        let subnet = state.subnet().to_string();
        let in_use = state.allocator.in_use();

        self.broadcast(
            &state,
            Envelope::notification(
                "ComputerJoined",
                ComputerJoinedNotification {
                    network_id: req.network_id.clone(),
                    member: member.info(),
                },
            ),
            Some(connection_id),
        )
        .await;

        drop(state);
        store::touch_network(&self.store, &req.network_id, now).await?;
        self.by_public_key
            .write()
            .await
            .entry(public_key.to_string())
            .or_default()
            .insert(req.network_id.clone());

        info!(network_id = %req.network_id, in_use, "member joined");

        self.send_to(
            connection_id,
            Envelope::notification(
                "ClientIPInfo",
                ClientIpInfoNotification {
                    network_id: req.network_id.clone(),
                    assigned_ip: assigned_ip.to_string(),
                },
            ),
        )
        .await;

        Ok(NetworkJoinedResponse {
            network_id: req.network_id.clone(),
            name,
            assigned_ip: assigned_ip.to_string(),
            subnet,
            members: snapshot,
        })
    }

    pub async fn connect_network(
        &self,
        public_key: &str,
        req: &ConnectNetworkRequest,
        connection_id: ConnectionId,
    ) -> Result<NetworkConnectedResponse, HubError> {
        let network = self.get_network(&req.network_id).await?;
        let mut state = network.lock().await;

        let member = state
            .members
            .get_mut(public_key)
            .ok_or_else(|| HubError::NotMember(public_key.to_string()))?;
        member.connection_id = Some(connection_id);
        if !req.computer_name.trim().is_empty() {
            member.computer_name = req.computer_name.clone();
        }
        let assigned_ip = member.assigned_ip;
        let computer_name = member.computer_name.clone();
        let now = Self::now();
        state.touch(now);
        let snapshot = state.snapshot();

        // Refresh `lastConnectedAt` on every connect regardless of whether
        // `computerName` changed.
        store::upsert_membership(
            &self.store,
            &store::MembershipRow {
                network_id: req.network_id.clone(),
                public_key: public_key.to_string(),
                assigned_ip: assigned_ip.to_string(),
                computer_name,
                joined_at: now,
                last_connected_at: now,
            },
        )
        .await?;

        self.broadcast(
            &state,
            Envelope::notification(
                "ComputerConnected",
                ComputerConnectedNotification {
                    network_id: req.network_id.clone(),
                    public_key: public_key.to_string(),
                },
            ),
            Some(connection_id),
        )
        .await;

        self.send_to(
            connection_id,
            Envelope::notification(
                "ClientIPInfo",
                ClientIpInfoNotification {
                    network_id: req.network_id.clone(),
                    assigned_ip: assigned_ip.to_string(),
                },
            ),
        )
        .await;

        Ok(NetworkConnectedResponse {
            network_id: req.network_id.clone(),
            assigned_ip: assigned_ip.to_string(),
            members: snapshot,
        })
    }

    pub async fn disconnect_network(
        &self,
        public_key: &str,
        req: &DisconnectNetworkRequest,
    ) -> Result<NetworkDisconnectedResponse, HubError> {
        let network = self.get_network(&req.network_id).await?;
        let mut state = network.lock().await;
        let member = state
            .members
            .get_mut(public_key)
            .ok_or_else(|| HubError::NotMember(public_key.to_string()))?;
        let closing_connection = member.connection_id.take();
        state.touch(Self::now());

        self.broadcast(
            &state,
            Envelope::notification(
                "ComputerDisconnected",
                ComputerDisconnectedNotification {
                    network_id: req.network_id.clone(),
                    public_key: public_key.to_string(),
                },
            ),
            closing_connection,
        )
        .await;

        Ok(NetworkDisconnectedResponse {
            network_id: req.network_id.clone(),
        })
    }

    pub async fn leave_network(
        &self,
        public_key: &str,
        req: &LeaveNetworkRequest,
    ) -> Result<LeaveNetworkResponse, HubError> {
        let network = self.get_network(&req.network_id).await?;
        let is_owner = {
            let mut state = network.lock().await;
            let member = state
                .members
                .remove(public_key)
                .ok_or_else(|| HubError::NotMember(public_key.to_string()))?;
            state.allocator.release(member.assigned_octet);
            state.touch(Self::now());
            let is_owner = state.owner_key == public_key;

            self.broadcast(
                &state,
                Envelope::notification(
                    "ComputerLeft",
                    ComputerLeftNotification {
                        network_id: req.network_id.clone(),
                        public_key: public_key.to_string(),
                    },
                ),
                None,
            )
            .await;

            if is_owner {
                // Owner departs: the network is torn down for every
                // remaining member before their memberships are dropped.
                self.broadcast(
                    &state,
                    Envelope::notification(
                        "NetworkDeleted",
                        NetworkDeletedNotification {
                            network_id: req.network_id.clone(),
                        },
                    ),
                    None,
                )
                .await;
            }
            is_owner
        };

        if is_owner {
            let remaining_keys: Vec<PublicKeyHex> = {
                let state = network.lock().await;
                state.members.keys().cloned().collect()
            };
            self.networks.write().await.remove(&req.network_id);
            store::delete_network(&self.store, &req.network_id).await?;
            let mut by_key = self.by_public_key.write().await;
            for key in remaining_keys.into_iter().chain(std::iter::once(public_key.to_string())) {
                if let Some(set) = by_key.get_mut(&key) {
                    set.remove(&req.network_id);
                }
            }
        } else {
            store::delete_membership(&self.store, &req.network_id, public_key).await?;
            if let Some(set) = self.by_public_key.write().await.get_mut(public_key) {
                set.remove(&req.network_id);
            }
        }

        Ok(LeaveNetworkResponse {
            network_id: req.network_id.clone(),
        })
    }

    pub async fn kick(
        &self,
        requester_key: &str,
        req: &KickRequest,
        raw_payload: &serde_json::Value,
    ) -> Result<KickSuccessResponse, HubError> {
        let network = self.get_network(&req.network_id).await?;
        let (target_connection, removed) = {
            let mut state = network.lock().await;
            if state.owner_key != requester_key {
                return Err(HubError::Auth("only the owner can kick members".into()));
            }
            self.verify_owner_signature(&state.owner_key, raw_payload)?;
            if requester_key == req.target_public_key {
                return Err(HubError::Policy("owner cannot kick themselves".into()));
            }
            let member = state
                .members
                .remove(&req.target_public_key)
                .ok_or_else(|| HubError::NotMember(req.target_public_key.clone()))?;
            state.allocator.release(member.assigned_octet);
            state.touch(Self::now());

            let target_connection = member.connection_id;

            self.broadcast(
                &state,
                Envelope::notification(
                    "ComputerLeft",
                    ComputerLeftNotification {
                        network_id: req.network_id.clone(),
                        public_key: req.target_public_key.clone(),
                    },
                ),
                target_connection,
            )
            .await;
            (target_connection, true)
        };
        let _ = removed;

        if let Some(cid) = target_connection {
            self.send_to(
                cid,
                Envelope::notification(
                    "Kicked",
                    KickedNotification {
                        network_id: req.network_id.clone(),
                    },
                ),
            )
            .await;
        }

        store::delete_membership(&self.store, &req.network_id, &req.target_public_key).await?;
        if let Some(set) = self.by_public_key.write().await.get_mut(&req.target_public_key) {
            set.remove(&req.network_id);
        }

        Ok(KickSuccessResponse {
            network_id: req.network_id.clone(),
            target_public_key: req.target_public_key.clone(),
        })
    }

    pub async fn rename(
        &self,
        requester_key: &str,
        req: &RenameRequest,
        raw_payload: &serde_json::Value,
    ) -> Result<RenameSuccessResponse, HubError> {
        let network = self.get_network(&req.network_id).await?;
        let mut state = network.lock().await;
        if state.owner_key != requester_key {
            return Err(HubError::Auth("only the owner can rename the network".into()));
        }
        self.verify_owner_signature(&state.owner_key, raw_payload)?;
        if req.new_name.trim().is_empty() {
            return Err(HubError::Protocol("network name must not be empty".into()));
        }
        state.name = req.new_name.clone();
        state.touch(Self::now());

        store::rename_network(&self.store, &req.network_id, &req.new_name).await?;

        self.broadcast(
            &state,
            Envelope::notification(
                "NetworkRenamed",
                NetworkRenamedNotification {
                    network_id: req.network_id.clone(),
                    new_name: req.new_name.clone(),
                },
            ),
            None,
        )
        .await;

        Ok(RenameSuccessResponse {
            network_id: req.network_id.clone(),
            new_name: req.new_name.clone(),
        })
    }

    /// Verify the signed-request payload (minus `signature`) against the
    /// network's `ownerKey`, not merely the connection's self-declared
    /// identity — per spec this is what makes `Kick`/`Rename` owner-only.
    fn verify_owner_signature(&self, owner_key_hex: &str, raw_payload: &serde_json::Value) -> Result<(), HubError> {
        let owner_verifying_key =
            crate::auth::decode_public_key(owner_key_hex).map_err(HubError::from)?;
        crate::auth::verify_signed_payload(&owner_verifying_key, raw_payload).map_err(HubError::from)
    }

    pub async fn relay_signal(&self, from_key: &str, req: &SignalRequest, kind: &str) -> Result<(), HubError> {
        let network = self.get_network(&req.network_id).await?;
        let state = network.lock().await;
        if !state.members.contains_key(from_key) {
            return Err(HubError::NotMember(from_key.to_string()));
        }
        let target = state
            .members
            .get(&req.target_public_key)
            .ok_or_else(|| HubError::NotMember(req.target_public_key.clone()))?;
        let connection_id = target
            .connection_id
            .ok_or_else(|| HubError::Offline(req.target_public_key.clone()))?;

        self.send_to(
            connection_id,
            Envelope::notification(
                kind,
                serde_json::json!({
                    "networkId": req.network_id,
                    "fromPublicKey": from_key,
                    "body": req.body,
                }),
            ),
        )
        .await;
        Ok(())
    }

    /// `public_key` is the caller's authenticated identity (from the
    /// connection handshake), never the request payload's self-declared
    /// `publicKey` — a client cannot use this to enumerate another key's
    /// networks.
    pub async fn snapshot_for(&self, public_key: &str) -> Result<ComputerNetworksResponse, HubError> {
        let ids = self
            .by_public_key
            .read()
            .await
            .get(public_key)
            .cloned()
            .unwrap_or_default();

        let networks_guard = self.networks.read().await;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(net) = networks_guard.get(&id) {
                let state = net.lock().await;
                let member = state.members.get(public_key);
                out.push(NetworkSummary {
                    network_id: state.id.clone(),
                    name: state.name.clone(),
                    assigned_ip: member.map(|m| m.assigned_ip.to_string()).unwrap_or_default(),
                    is_owner: state.owner_key == public_key,
                });
            }
        }
        Ok(ComputerNetworksResponse { networks: out })
    }

    /// Called when a connection's socket closes without an explicit
    /// `DisconnectNetwork`/`LeaveNetwork`. Memberships survive; only the
    /// online projection is cleared.
    pub async fn handle_connection_closed(&self, connection_id: ConnectionId, public_key: &str) {
        let networks: Vec<Arc<Mutex<NetworkState>>> = {
            let guard = self.networks.read().await;
            guard.values().cloned().collect()
        };
        for net in networks {
            let mut state = net.lock().await;
            if let Some(member) = state.members.get_mut(public_key) {
                if member.connection_id == Some(connection_id) {
                    member.connection_id = None;
                    let network_id = state.id.clone();
                    self.broadcast(
                        &state,
                        Envelope::notification(
                            "ComputerDisconnected",
                            ComputerDisconnectedNotification {
                                network_id,
                                public_key: public_key.to_string(),
                            },
                        ),
                        Some(connection_id),
                    )
                    .await;
                }
            }
        }
        self.deregister_connection(connection_id).await;
    }

    /// Broadcast `ServerShutdown` to every live connection, used by the
    /// Supervisor's drain sequence.
    pub async fn broadcast_shutdown(&self, shutdown_in_seconds: u64) {
        let connections = self.connections.read().await;
        for handle in connections.values() {
            let _ = handle
                .tx
                .try_send(Envelope::notification(
                    "ServerShutdown",
                    ServerShutdownNotification {
                        shutdown_in_seconds,
                    },
                ));
        }
    }

    /// Reap networks whose `last_active_at` predates `cutoff` and that have
    /// no online members, run periodically by the Supervisor.
    pub async fn reap_expired(&self, cutoff: i64) -> Result<Vec<NetworkId>, HubError> {
        let candidates = store::list_expired_networks(&self.store, cutoff).await?;
        let mut removed = Vec::new();
        for row in candidates {
            let has_online = {
                let guard = self.networks.read().await;
                match guard.get(&row.id) {
                    Some(net) => net.lock().await.online_members().next().is_some(),
                    None => false,
                }
            };
            if has_online {
                continue;
            }
            self.networks.write().await.remove(&row.id);
            store::delete_network(&self.store, &row.id).await?;
            removed.push(row.id);
        }
        Ok(removed)
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }
}
