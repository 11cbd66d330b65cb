//! The message router: consumes inbound control messages, consults the
//! registry, and dispatches outbound messages to the correct target(s).
//!
//! The router is the single logical owner of registry and relay-ring
//! state. Both live behind one mutex that is held only for the duration
//! of a mutation, never across an await point or a transport write; all
//! deliveries are non-blocking pushes onto per-connection channels, and
//! the actual socket writes happen in each connection's own writer task.

use std::sync::Mutex;

use aircast_protocol::{ClientMessage, ServerMessage, BROADCASTER};
use bytes::Bytes;
use dashmap::DashMap;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::connection::{
    CloseReason, ConnectionHandle, ConnectionId, ListenerId, Liveness, Outbound, Role,
};
use crate::policy::{AccessPolicy, AllowAll};
use crate::registry::Registry;
use crate::relay::RelayBuffer;

/// Router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Capacity of the recent-frame ring used to seed late joiners.
    pub relay_buffer_frames: usize,
    /// Capacity of each listener's outbound media queue.
    pub listener_queue_frames: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            relay_buffer_frames: 8,
            listener_queue_frames: 32,
        }
    }
}

/// Why a control message produced no delivery. Logged, never fatal.
#[derive(Debug, Error)]
enum DropReason {
    #[error("sender is not the broadcaster")]
    NotBroadcaster,
    #[error("sender is not a registered listener")]
    NotListener,
    #[error("no broadcaster is online")]
    NoBroadcaster,
    #[error("target identity {0} is not registered")]
    UnknownTarget(ListenerId),
    #[error("broadcaster candidate carries no target identity")]
    MissingTarget,
}

/// A role the sender held before a registration or disconnect vacated it.
enum Vacated {
    Broadcaster,
    Listener(ListenerId),
}

/// Result of relaying one binary frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayOutcome {
    /// Listener queues the frame was appended to.
    pub recipients: usize,
    /// Older frames dropped from slow listeners' queues to make room.
    pub dropped: usize,
}

/// Router statistics.
#[derive(Debug, Clone)]
pub struct RouterStats {
    /// Tracked connections of any role.
    pub connection_count: usize,
    /// Registered listeners.
    pub listener_count: usize,
    /// Whether the broadcaster slot is occupied.
    pub broadcaster_online: bool,
}

/// Registry and relay ring, mutated only behind the router's mutex.
struct Session {
    registry: Registry,
    relay: RelayBuffer,
}

/// The central message router.
pub struct Router {
    /// Every accepted socket, any role. Probed by the liveness sweep and
    /// addressed by the status broadcast.
    connections: DashMap<ConnectionId, ConnectionHandle>,
    /// Role state and recent-frame ring; the single serialization point.
    session: Mutex<Session>,
    /// Gate on the broadcaster role claim.
    policy: Box<dyn AccessPolicy>,
    config: RouterConfig,
}

impl Router {
    /// Create a router with the given configuration and access policy.
    #[must_use]
    pub fn new(config: RouterConfig, policy: Box<dyn AccessPolicy>) -> Self {
        info!(
            relay_buffer_frames = config.relay_buffer_frames,
            listener_queue_frames = config.listener_queue_frames,
            "Creating router"
        );
        Self {
            connections: DashMap::new(),
            session: Mutex::new(Session {
                registry: Registry::new(),
                relay: RelayBuffer::with_capacity(config.relay_buffer_frames),
            }),
            policy,
            config,
        }
    }

    /// Track a freshly accepted connection.
    ///
    /// `control` is the sending half of the connection's writer channel;
    /// the returned handle is what every later router call takes.
    pub fn accept(
        &self,
        origin: impl Into<String>,
        control: mpsc::UnboundedSender<Outbound>,
    ) -> ConnectionHandle {
        let handle = ConnectionHandle::new(origin, control, self.config.listener_queue_frames);
        debug!(connection = %handle.id(), origin = %handle.origin(), "Connection accepted");
        self.connections.insert(handle.id(), handle.clone());
        handle
    }

    /// Router statistics.
    #[must_use]
    pub fn stats(&self) -> RouterStats {
        let session = self.session.lock().unwrap();
        RouterStats {
            connection_count: self.connections.len(),
            listener_count: session.registry.listener_count(),
            broadcaster_online: session.registry.is_broadcasting(),
        }
    }

    /// Dispatch one inbound control message.
    ///
    /// Malformed messages never reach this point (decoding happens at the
    /// transport layer), so every arm either mutates registry state and
    /// notifies, or drops with a log line; there are no partial updates.
    pub fn handle_message(&self, handle: &ConnectionHandle, message: ClientMessage) {
        match message {
            ClientMessage::RegisterBroadcaster { token } => {
                self.register_broadcaster(handle, token.as_deref());
            }
            ClientMessage::RegisterListener => self.register_listener(handle),
            ClientMessage::Offer { target, sdp } => {
                if let Err(reason) = self.route_offer(handle, target, sdp) {
                    warn!(connection = %handle.id(), %reason, "Dropping offer");
                }
            }
            ClientMessage::Answer { sdp } => {
                if let Err(reason) = self.route_answer(handle, sdp) {
                    warn!(connection = %handle.id(), %reason, "Dropping answer");
                }
            }
            ClientMessage::Candidate { target, candidate } => {
                if let Err(reason) = self.route_candidate(handle, target, candidate) {
                    warn!(connection = %handle.id(), %reason, "Dropping candidate");
                }
            }
        }
    }

    /// Relay one binary media frame from the broadcaster to every
    /// listener's queue, recording it in the late-joiner ring first.
    ///
    /// Frames arrive on the broadcaster connection's single reader task,
    /// so relays for one source are naturally serialized. Binary data
    /// from any other role is discarded.
    pub fn handle_binary(&self, handle: &ConnectionHandle, frame: Bytes) -> RelayOutcome {
        if handle.role() != Role::Broadcaster {
            debug!(connection = %handle.id(), "Discarding binary frame from non-broadcaster");
            return RelayOutcome::default();
        }

        let recipients: Vec<ConnectionHandle> = {
            let mut session = self.session.lock().unwrap();
            session.relay.push(frame.clone());
            session
                .registry
                .listeners()
                .map(|(_, h)| h.clone())
                .collect()
        };

        let mut dropped = 0;
        for listener in &recipients {
            dropped += listener.enqueue_frame(frame.clone());
        }

        RelayOutcome {
            recipients: recipients.len(),
            dropped,
        }
    }

    /// Record a pong response from a probed connection.
    pub fn handle_pong(&self, handle: &ConnectionHandle) {
        handle.pong();
    }

    /// Synchronous cleanup on transport close.
    ///
    /// Untracks the connection, vacates its role, and sends the symmetric
    /// notifications: `peer-left` to the broadcaster for a departed
    /// listener, a status broadcast for any registry change. The liveness
    /// eviction path converges on this same logic.
    pub fn disconnect(&self, handle: &ConnectionHandle) {
        self.connections.remove(&handle.id());

        let (vacated, broadcaster) = {
            let mut session = self.session.lock().unwrap();
            let vacated = Self::vacate_role(&mut session, handle);
            (vacated, session.registry.broadcaster().cloned())
        };

        if let Some(Vacated::Listener(id)) = &vacated {
            if let Some(b) = &broadcaster {
                b.send_message(ServerMessage::peer_left(id.as_str()));
            }
        }
        if vacated.is_some() {
            self.broadcast_status();
        }

        debug!(connection = %handle.id(), "Disconnected");
    }

    /// One liveness pass over all tracked connections.
    ///
    /// A connection still awaiting the previous probe's pong is evicted:
    /// removed from the registry via the same path as an explicit close,
    /// and told to shut its transport. Everything else is probed. A peer
    /// that goes silent is therefore gone within two sweep intervals.
    ///
    /// Returns the evicted connections.
    pub fn sweep(&self) -> Vec<ConnectionHandle> {
        let mut evicted = Vec::new();
        for entry in self.connections.iter() {
            let handle = entry.value();
            match handle.probe() {
                Liveness::AwaitingPong => evicted.push(handle.clone()),
                Liveness::Alive => handle.send(Outbound::Ping),
            }
        }

        for handle in &evicted {
            warn!(connection = %handle.id(), origin = %handle.origin(), "Evicting unresponsive connection");
            handle.send(Outbound::Close(CloseReason::Evicted));
            self.disconnect(handle);
        }

        evicted
    }

    /// Send the session summary to every tracked connection.
    ///
    /// Invoked on every registry change and by the periodic status timer.
    pub fn broadcast_status(&self) {
        let message = {
            let session = self.session.lock().unwrap();
            ServerMessage::status(
                session.registry.is_broadcasting(),
                session.registry.listener_count(),
            )
        };
        for entry in self.connections.iter() {
            entry.value().send_message(message.clone());
        }
    }

    fn register_broadcaster(&self, handle: &ConnectionHandle, token: Option<&str>) {
        if !self.policy.authorize(handle.origin(), token) {
            warn!(
                connection = %handle.id(),
                origin = %handle.origin(),
                "Rejecting unauthorized broadcaster claim"
            );
            handle.send(Outbound::Close(CloseReason::PolicyViolation));
            return;
        }

        {
            let mut session = self.session.lock().unwrap();
            Self::vacate_role(&mut session, handle);
            if let Some(displaced) = session.registry.set_broadcaster(handle.clone()) {
                // Orphaned, not closed: reaped by its own disconnect or
                // heartbeat timeout.
                displaced.set_role(Role::Unassigned);
            }
            // Frames from a previous source must not seed new listeners.
            session.relay.clear();
            handle.set_role(Role::Broadcaster);
        }

        handle.send_message(ServerMessage::broadcaster_role());
        self.broadcast_status();
    }

    fn register_listener(&self, handle: &ConnectionHandle) {
        let (identity, seeded, broadcaster) = {
            let mut session = self.session.lock().unwrap();
            Self::vacate_role(&mut session, handle);
            let identity = session.registry.insert_listener(handle.clone());
            handle.set_role(Role::Listener(identity.clone()));

            // Seed the recent-frame ring under the session lock so a
            // concurrently relayed live frame cannot land in the queue
            // ahead of the history.
            let mut seeded = 0;
            for frame in session.relay.iter() {
                handle.enqueue_frame(frame.clone());
                seeded += 1;
            }

            (identity, seeded, session.registry.broadcaster().cloned())
        };

        handle.send_message(ServerMessage::listener_role(identity.as_str()));
        if let Some(b) = &broadcaster {
            b.send_message(ServerMessage::peer_joined(identity.as_str()));
        }
        debug!(connection = %handle.id(), %identity, seeded, "Listener joined");
        self.broadcast_status();
    }

    fn route_offer(&self, handle: &ConnectionHandle, target: String, sdp: Value) -> Result<(), DropReason> {
        if handle.role() != Role::Broadcaster {
            return Err(DropReason::NotBroadcaster);
        }
        let target = ListenerId::from(target);
        let recipient = {
            let session = self.session.lock().unwrap();
            session.registry.lookup_listener(&target).cloned()
        };
        // Never buffered for later delivery: an unresolved target is a drop.
        let listener = recipient.ok_or(DropReason::UnknownTarget(target))?;
        listener.send_message(ServerMessage::offer(sdp));
        Ok(())
    }

    fn route_answer(&self, handle: &ConnectionHandle, sdp: Value) -> Result<(), DropReason> {
        let Role::Listener(identity) = handle.role() else {
            return Err(DropReason::NotListener);
        };
        let broadcaster = {
            let session = self.session.lock().unwrap();
            session.registry.broadcaster().cloned()
        };
        let broadcaster = broadcaster.ok_or(DropReason::NoBroadcaster)?;
        broadcaster.send_message(ServerMessage::answer(sdp, identity.as_str()));
        Ok(())
    }

    fn route_candidate(
        &self,
        handle: &ConnectionHandle,
        target: Option<String>,
        candidate: Value,
    ) -> Result<(), DropReason> {
        match handle.role() {
            Role::Listener(identity) => {
                let broadcaster = {
                    let session = self.session.lock().unwrap();
                    session.registry.broadcaster().cloned()
                };
                let broadcaster = broadcaster.ok_or(DropReason::NoBroadcaster)?;
                broadcaster.send_message(ServerMessage::candidate(candidate, identity.as_str()));
                Ok(())
            }
            Role::Broadcaster => {
                // Candidates are per-peer-connection: delivered to the one
                // named listener, never fanned out (fanning out would leak
                // one listener's network path to another).
                let target = target.ok_or(DropReason::MissingTarget)?;
                let target = ListenerId::from(target);
                let recipient = {
                    let session = self.session.lock().unwrap();
                    session.registry.lookup_listener(&target).cloned()
                };
                let listener = recipient.ok_or(DropReason::UnknownTarget(target))?;
                listener.send_message(ServerMessage::candidate(candidate, BROADCASTER));
                Ok(())
            }
            Role::Unassigned => Err(DropReason::NotListener),
        }
    }

    /// Remove the handle's current role from the registry, if any.
    ///
    /// Keeps the invariant that a connection appears in at most one of
    /// {broadcaster slot, listener map}: every registration and every
    /// disconnect passes through here first.
    fn vacate_role(session: &mut Session, handle: &ConnectionHandle) -> Option<Vacated> {
        match handle.role() {
            Role::Unassigned => None,
            Role::Broadcaster => {
                // Only vacate the slot if this connection still holds it;
                // a supplanted broadcaster was already displaced.
                let holds_slot = session
                    .registry
                    .broadcaster()
                    .is_some_and(|b| b.id() == handle.id());
                if holds_slot {
                    session.registry.clear_broadcaster();
                    session.relay.clear();
                }
                handle.set_role(Role::Unassigned);
                holds_slot.then_some(Vacated::Broadcaster)
            }
            Role::Listener(identity) => {
                session.registry.remove_listener(&identity);
                handle.set_role(Role::Unassigned);
                Some(Vacated::Listener(identity))
            }
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new(RouterConfig::default(), Box::new(AllowAll))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::TokenPolicy;
    use serde_json::json;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn connect(router: &Router) -> (ConnectionHandle, UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (router.accept("127.0.0.1:50000", tx), rx)
    }

    /// Drain the control lane, keeping only serialized messages.
    fn messages(rx: &mut UnboundedReceiver<Outbound>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let Outbound::Message(m) = event {
                out.push(m);
            }
        }
        out
    }

    fn closes(rx: &mut UnboundedReceiver<Outbound>) -> Vec<CloseReason> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let Outbound::Close(reason) = event {
                out.push(reason);
            }
        }
        out
    }

    fn register_broadcaster(router: &Router, handle: &ConnectionHandle) {
        router.handle_message(handle, ClientMessage::RegisterBroadcaster { token: None });
    }

    fn register_listener(
        router: &Router,
        handle: &ConnectionHandle,
        rx: &mut UnboundedReceiver<Outbound>,
    ) -> ListenerId {
        router.handle_message(handle, ClientMessage::RegisterListener);
        messages(rx)
            .into_iter()
            .find_map(|m| match m {
                ServerMessage::Role { id: Some(id), .. } => Some(ListenerId::from(id)),
                _ => None,
            })
            .expect("listener registration must be acked with an identity")
    }

    fn queued(handle: &ConnectionHandle) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(frame) = handle.frames().try_pop() {
            out.push(frame[0]);
        }
        out
    }

    fn frame(n: u8) -> Bytes {
        Bytes::from(vec![n])
    }

    #[test]
    fn test_broadcaster_supplants_never_duplicates() {
        let router = Router::default();
        let (first, mut rx_first) = connect(&router);
        let (second, _rx_second) = connect(&router);

        register_broadcaster(&router, &first);
        register_broadcaster(&router, &second);

        let stats = router.stats();
        assert!(stats.broadcaster_online);
        assert_eq!(first.role(), Role::Unassigned);
        assert_eq!(second.role(), Role::Broadcaster);

        // The displaced broadcaster was not closed.
        assert!(closes(&mut rx_first).is_empty());
    }

    #[test]
    fn test_listener_identities_pairwise_distinct() {
        let router = Router::default();
        let mut ids = Vec::new();
        let mut channels = Vec::new();
        for _ in 0..16 {
            let (handle, mut rx) = connect(&router);
            ids.push(register_listener(&router, &handle, &mut rx));
            channels.push((handle, rx));
        }

        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(router.stats().listener_count, 16);
    }

    #[test]
    fn test_offer_to_unknown_target_produces_nothing() {
        let router = Router::default();
        let (broadcaster, _rx_b) = connect(&router);
        let (listener, mut rx_l) = connect(&router);

        register_broadcaster(&router, &broadcaster);
        register_listener(&router, &listener, &mut rx_l);
        messages(&mut rx_l);

        router.handle_message(
            &broadcaster,
            ClientMessage::Offer {
                target: "peer_vanished".to_string(),
                sdp: json!({"sdp": "v=0"}),
            },
        );

        assert!(messages(&mut rx_l).is_empty());
    }

    #[test]
    fn test_offer_from_non_broadcaster_is_dropped() {
        let router = Router::default();
        let (listener_a, mut rx_a) = connect(&router);
        let (listener_b, mut rx_b) = connect(&router);

        let id_b = register_listener(&router, &listener_b, &mut rx_b);
        register_listener(&router, &listener_a, &mut rx_a);
        messages(&mut rx_b);

        router.handle_message(
            &listener_a,
            ClientMessage::Offer {
                target: id_b.as_str().to_string(),
                sdp: json!({}),
            },
        );

        assert!(messages(&mut rx_b).is_empty());
    }

    #[test]
    fn test_targeted_offers_reach_only_their_listener() {
        let router = Router::default();
        let (broadcaster, mut rx_bc) = connect(&router);
        let (listener_a, mut rx_a) = connect(&router);
        let (listener_b, mut rx_b) = connect(&router);

        register_broadcaster(&router, &broadcaster);
        let id_a = register_listener(&router, &listener_a, &mut rx_a);

        // The broadcaster was told about the join.
        let joined: Vec<_> = messages(&mut rx_bc)
            .into_iter()
            .filter(|m| matches!(m, ServerMessage::PeerJoined { .. }))
            .collect();
        assert_eq!(joined, vec![ServerMessage::peer_joined(id_a.as_str())]);

        router.handle_message(
            &broadcaster,
            ClientMessage::Offer {
                target: id_a.as_str().to_string(),
                sdp: json!({"sdp": "v=0 A"}),
            },
        );

        let offers_a: Vec<_> = messages(&mut rx_a)
            .into_iter()
            .filter(|m| matches!(m, ServerMessage::Offer { .. }))
            .collect();
        assert_eq!(
            offers_a,
            vec![ServerMessage::offer(json!({"sdp": "v=0 A"}))]
        );

        let id_b = register_listener(&router, &listener_b, &mut rx_b);
        router.handle_message(
            &broadcaster,
            ClientMessage::Offer {
                target: id_b.as_str().to_string(),
                sdp: json!({"sdp": "v=0 B"}),
            },
        );

        let offers_b: Vec<_> = messages(&mut rx_b)
            .into_iter()
            .filter(|m| matches!(m, ServerMessage::Offer { .. }))
            .collect();
        assert_eq!(
            offers_b,
            vec![ServerMessage::offer(json!({"sdp": "v=0 B"}))]
        );

        // A received status chatter at most, never another offer.
        assert!(messages(&mut rx_a)
            .iter()
            .all(|m| matches!(m, ServerMessage::Status { .. })));
    }

    #[test]
    fn test_answer_carries_sender_identity() {
        let router = Router::default();
        let (broadcaster, mut rx_bc) = connect(&router);
        let (listener, mut rx_l) = connect(&router);

        register_broadcaster(&router, &broadcaster);
        let id = register_listener(&router, &listener, &mut rx_l);
        messages(&mut rx_bc);

        router.handle_message(
            &listener,
            ClientMessage::Answer {
                sdp: json!({"sdp": "v=0 answer"}),
            },
        );

        let answers: Vec<_> = messages(&mut rx_bc)
            .into_iter()
            .filter(|m| matches!(m, ServerMessage::Answer { .. }))
            .collect();
        assert_eq!(
            answers,
            vec![ServerMessage::answer(json!({"sdp": "v=0 answer"}), id.as_str())]
        );
    }

    #[test]
    fn test_answer_without_broadcaster_is_dropped() {
        let router = Router::default();
        let (listener, mut rx_l) = connect(&router);
        register_listener(&router, &listener, &mut rx_l);

        router.handle_message(&listener, ClientMessage::Answer { sdp: json!({}) });
        // Nothing to assert beyond "no panic, no delivery": there is no
        // broadcaster channel to have received anything.
        assert_eq!(router.stats().listener_count, 1);
    }

    #[test]
    fn test_listener_candidate_goes_to_broadcaster() {
        let router = Router::default();
        let (broadcaster, mut rx_bc) = connect(&router);
        let (listener, mut rx_l) = connect(&router);

        register_broadcaster(&router, &broadcaster);
        let id = register_listener(&router, &listener, &mut rx_l);
        messages(&mut rx_bc);

        router.handle_message(
            &listener,
            ClientMessage::Candidate {
                target: None,
                candidate: json!({"candidate": "candidate:1"}),
            },
        );

        let candidates: Vec<_> = messages(&mut rx_bc)
            .into_iter()
            .filter(|m| matches!(m, ServerMessage::Candidate { .. }))
            .collect();
        assert_eq!(
            candidates,
            vec![ServerMessage::candidate(
                json!({"candidate": "candidate:1"}),
                id.as_str()
            )]
        );
    }

    #[test]
    fn test_broadcaster_candidate_single_target_only() {
        let router = Router::default();
        let (broadcaster, mut rx_bc) = connect(&router);
        let (listener_a, mut rx_a) = connect(&router);
        let (listener_b, mut rx_b) = connect(&router);

        register_broadcaster(&router, &broadcaster);
        let id_a = register_listener(&router, &listener_a, &mut rx_a);
        register_listener(&router, &listener_b, &mut rx_b);
        messages(&mut rx_bc);
        messages(&mut rx_a);
        messages(&mut rx_b);

        router.handle_message(
            &broadcaster,
            ClientMessage::Candidate {
                target: Some(id_a.as_str().to_string()),
                candidate: json!({"candidate": "candidate:9"}),
            },
        );

        let to_a: Vec<_> = messages(&mut rx_a)
            .into_iter()
            .filter(|m| matches!(m, ServerMessage::Candidate { .. }))
            .collect();
        assert_eq!(
            to_a,
            vec![ServerMessage::candidate(
                json!({"candidate": "candidate:9"}),
                BROADCASTER
            )]
        );

        // Never fanned out to the other listener.
        assert!(messages(&mut rx_b)
            .iter()
            .all(|m| !matches!(m, ServerMessage::Candidate { .. })));
    }

    #[test]
    fn test_broadcaster_candidate_without_target_is_dropped() {
        let router = Router::default();
        let (broadcaster, _rx_bc) = connect(&router);
        let (listener, mut rx_l) = connect(&router);

        register_broadcaster(&router, &broadcaster);
        register_listener(&router, &listener, &mut rx_l);
        messages(&mut rx_l);

        router.handle_message(
            &broadcaster,
            ClientMessage::Candidate {
                target: None,
                candidate: json!({}),
            },
        );

        assert!(messages(&mut rx_l)
            .iter()
            .all(|m| !matches!(m, ServerMessage::Candidate { .. })));
    }

    #[test]
    fn test_unauthorized_claim_closes_without_mutation() {
        let router = Router::new(RouterConfig::default(), Box::new(TokenPolicy::new("s3cret")));
        let (pretender, mut rx) = connect(&router);

        router.handle_message(
            &pretender,
            ClientMessage::RegisterBroadcaster {
                token: Some("wrong".to_string()),
            },
        );

        assert_eq!(closes(&mut rx), vec![CloseReason::PolicyViolation]);
        assert!(messages(&mut rx).is_empty());
        assert!(!router.stats().broadcaster_online);
        assert_eq!(pretender.role(), Role::Unassigned);
    }

    #[test]
    fn test_authorized_token_claim() {
        let router = Router::new(RouterConfig::default(), Box::new(TokenPolicy::new("s3cret")));
        let (broadcaster, mut rx) = connect(&router);

        router.handle_message(
            &broadcaster,
            ClientMessage::RegisterBroadcaster {
                token: Some("s3cret".to_string()),
            },
        );

        assert!(router.stats().broadcaster_online);
        assert!(messages(&mut rx)
            .iter()
            .any(|m| matches!(m, ServerMessage::Role { .. })));
    }

    #[test]
    fn test_queue_bound_drops_oldest() {
        let config = RouterConfig {
            relay_buffer_frames: 8,
            listener_queue_frames: 4,
        };
        let router = Router::new(config, Box::new(AllowAll));
        let (broadcaster, _rx_bc) = connect(&router);
        let (listener, mut rx_l) = connect(&router);

        register_broadcaster(&router, &broadcaster);
        register_listener(&router, &listener, &mut rx_l);

        let mut dropped = 0;
        for n in 0..6 {
            dropped += router.handle_binary(&broadcaster, frame(n)).dropped;
        }

        assert_eq!(dropped, 2);
        // The oldest frames were the ones dropped; order preserved.
        assert_eq!(queued(&listener), vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_late_joiner_seeded_with_ring_in_order() {
        let config = RouterConfig {
            relay_buffer_frames: 4,
            listener_queue_frames: 32,
        };
        let router = Router::new(config, Box::new(AllowAll));
        let (broadcaster, _rx_bc) = connect(&router);

        register_broadcaster(&router, &broadcaster);
        for n in 0..6 {
            router.handle_binary(&broadcaster, frame(n));
        }

        let (listener, mut rx_l) = connect(&router);
        register_listener(&router, &listener, &mut rx_l);

        // Exactly the last ring-capacity frames, then live frames after.
        router.handle_binary(&broadcaster, frame(6));
        assert_eq!(queued(&listener), vec![2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_binary_from_listener_is_discarded() {
        let router = Router::default();
        let (listener_a, mut rx_a) = connect(&router);
        let (listener_b, mut rx_b) = connect(&router);

        register_listener(&router, &listener_a, &mut rx_a);
        register_listener(&router, &listener_b, &mut rx_b);

        let outcome = router.handle_binary(&listener_a, frame(1));
        assert_eq!(outcome, RelayOutcome::default());
        assert!(queued(&listener_b).is_empty());
    }

    #[test]
    fn test_ring_cleared_on_broadcaster_change() {
        let router = Router::default();
        let (first, _rx_first) = connect(&router);
        let (second, _rx_second) = connect(&router);

        register_broadcaster(&router, &first);
        for n in 0..3 {
            router.handle_binary(&first, frame(n));
        }

        register_broadcaster(&router, &second);

        let (listener, mut rx_l) = connect(&router);
        register_listener(&router, &listener, &mut rx_l);

        // No stale frames from the supplanted source.
        assert!(queued(&listener).is_empty());
    }

    #[test]
    fn test_broadcaster_disconnect_notifies_all_listeners() {
        let router = Router::default();
        let (broadcaster, _rx_bc) = connect(&router);
        let (listener_a, mut rx_a) = connect(&router);
        let (listener_b, mut rx_b) = connect(&router);

        register_broadcaster(&router, &broadcaster);
        register_listener(&router, &listener_a, &mut rx_a);
        register_listener(&router, &listener_b, &mut rx_b);
        messages(&mut rx_a);
        messages(&mut rx_b);

        router.disconnect(&broadcaster);

        for rx in [&mut rx_a, &mut rx_b] {
            let statuses: Vec<_> = messages(rx)
                .into_iter()
                .filter(|m| matches!(m, ServerMessage::Status { .. }))
                .collect();
            assert_eq!(statuses, vec![ServerMessage::status(false, 2)]);
        }
        assert!(!router.stats().broadcaster_online);
    }

    #[test]
    fn test_listener_disconnect_notifies_broadcaster() {
        let router = Router::default();
        let (broadcaster, mut rx_bc) = connect(&router);
        let (listener, mut rx_l) = connect(&router);

        register_broadcaster(&router, &broadcaster);
        let id = register_listener(&router, &listener, &mut rx_l);
        messages(&mut rx_bc);

        router.disconnect(&listener);

        let received = messages(&mut rx_bc);
        assert!(received.contains(&ServerMessage::peer_left(id.as_str())));
        assert!(received.contains(&ServerMessage::status(true, 0)));
    }

    #[test]
    fn test_silent_connection_evicted_within_two_sweeps() {
        let router = Router::default();
        let (broadcaster, mut rx_bc) = connect(&router);
        let (listener, mut rx_l) = connect(&router);

        register_broadcaster(&router, &broadcaster);
        let id = register_listener(&router, &listener, &mut rx_l);
        messages(&mut rx_bc);
        messages(&mut rx_l);

        // First sweep probes everyone.
        assert!(router.sweep().is_empty());

        // The broadcaster answers; the listener stays silent.
        router.handle_pong(&broadcaster);

        let evicted = router.sweep();
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].id(), listener.id());
        assert_eq!(closes(&mut rx_l), vec![CloseReason::Evicted]);

        // The counterpart learned about the departure.
        let received = messages(&mut rx_bc);
        assert!(received.contains(&ServerMessage::peer_left(id.as_str())));
        assert_eq!(router.stats().listener_count, 0);
    }

    #[test]
    fn test_responsive_connections_survive_sweeps() {
        let router = Router::default();
        let (listener, mut rx_l) = connect(&router);
        register_listener(&router, &listener, &mut rx_l);

        for _ in 0..4 {
            assert!(router.sweep().is_empty());
            router.handle_pong(&listener);
        }
        assert_eq!(router.stats().listener_count, 1);
    }

    #[test]
    fn test_reregistration_swaps_role() {
        let router = Router::default();
        let (connection, mut rx) = connect(&router);

        register_listener(&router, &connection, &mut rx);
        assert_eq!(router.stats().listener_count, 1);

        // The same connection claims the broadcaster role: replace, not
        // error.
        register_broadcaster(&router, &connection);
        let stats = router.stats();
        assert_eq!(stats.listener_count, 0);
        assert!(stats.broadcaster_online);
        assert_eq!(connection.role(), Role::Broadcaster);
    }

    #[test]
    fn test_status_broadcast_reaches_unassigned_connections() {
        let router = Router::default();
        let (_watcher, mut rx_w) = connect(&router);
        let (listener, mut rx_l) = connect(&router);

        register_listener(&router, &listener, &mut rx_l);

        let statuses: Vec<_> = messages(&mut rx_w)
            .into_iter()
            .filter(|m| matches!(m, ServerMessage::Status { .. }))
            .collect();
        assert_eq!(statuses, vec![ServerMessage::status(false, 1)]);
    }
}
