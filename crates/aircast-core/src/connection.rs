//! Connection identity, role state, and the channel-backed handle the
//! router uses to reach a connection's writer task.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use aircast_protocol::ServerMessage;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::relay::FrameQueue;

/// Process-unique connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

static CONNECTION_COUNTER: AtomicU64 = AtomicU64::new(0);

impl ConnectionId {
    /// Allocate the next connection id.
    #[must_use]
    pub fn next() -> Self {
        Self(CONNECTION_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn_{}", self.0)
    }
}

/// Server-generated identity naming a listener for targeted routing.
///
/// Unique for the process lifetime: timestamp plus an atomic counter, so
/// two identities generated within the same nanosecond still differ.
/// Identities are not a security boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenerId(String);

static IDENTITY_COUNTER: AtomicU64 = AtomicU64::new(0);

impl ListenerId {
    /// Generate a fresh, collision-free identity.
    #[must_use]
    pub fn generate() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        let counter = IDENTITY_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("peer_{:x}_{}", timestamp, counter))
    }

    /// Get the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ListenerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ListenerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Role assigned to a connection. Transitions only via registration
/// messages; the router vacates the previous role before assigning a new
/// one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// Accepted but not yet registered.
    Unassigned,
    /// The single privileged media source.
    Broadcaster,
    /// A media consumer, named by its generated identity.
    Listener(ListenerId),
}

/// Heartbeat state. A connection still awaiting a pong when the next probe
/// fires is declared dead and evicted, so there is no stored `Dead` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Responded to the most recent probe (or was never probed).
    Alive,
    /// Probed, pong not yet received.
    AwaitingPong,
}

/// Why the router is closing a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Broadcaster role claim failed authorization.
    PolicyViolation,
    /// Heartbeat timeout.
    Evicted,
}

impl CloseReason {
    /// WebSocket close code for this reason.
    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            CloseReason::PolicyViolation => 1008,
            CloseReason::Evicted => 1001,
        }
    }

    /// Human-readable close reason.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::PolicyViolation => "policy violation",
            CloseReason::Evicted => "heartbeat timeout",
        }
    }
}

/// An event for a connection's writer task.
///
/// Control messages and probes travel this lane; binary media frames have
/// their own bounded queue (see [`FrameQueue`]) so a backlog of media can
/// never delay or displace control traffic.
#[derive(Debug)]
pub enum Outbound {
    /// A control message to serialize and send as a text frame.
    Message(ServerMessage),
    /// A heartbeat probe (WebSocket ping).
    Ping,
    /// Close the transport and exit the writer.
    Close(CloseReason),
}

struct HandleInner {
    id: ConnectionId,
    origin: String,
    role: Mutex<Role>,
    liveness: Mutex<Liveness>,
    control: mpsc::UnboundedSender<Outbound>,
    frames: FrameQueue,
}

/// Cheaply cloneable reference to one accepted connection.
///
/// The router holds these in its maps; the connection's own task holds the
/// receiving ends. All sends are non-blocking: a closed control channel
/// means the writer already exited, and the event is silently dropped;
/// cleanup converges via the disconnect path.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<HandleInner>,
}

impl ConnectionHandle {
    /// Create a handle for a freshly accepted connection.
    #[must_use]
    pub fn new(
        origin: impl Into<String>,
        control: mpsc::UnboundedSender<Outbound>,
        queue_capacity: usize,
    ) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id: ConnectionId::next(),
                origin: origin.into(),
                role: Mutex::new(Role::Unassigned),
                liveness: Mutex::new(Liveness::Alive),
                control,
                frames: FrameQueue::with_capacity(queue_capacity),
            }),
        }
    }

    /// Get the connection id.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// Get the origin address the connection arrived from.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.inner.origin
    }

    /// Get the current role.
    #[must_use]
    pub fn role(&self) -> Role {
        self.inner.role.lock().unwrap().clone()
    }

    /// Assign a role.
    pub fn set_role(&self, role: Role) {
        *self.inner.role.lock().unwrap() = role;
    }

    /// Record a heartbeat probe and return the state it found.
    ///
    /// A connection found still [`Liveness::AwaitingPong`] never answered
    /// the previous probe and is due for eviction.
    pub fn probe(&self) -> Liveness {
        let mut liveness = self.inner.liveness.lock().unwrap();
        std::mem::replace(&mut *liveness, Liveness::AwaitingPong)
    }

    /// Record a pong response.
    pub fn pong(&self) {
        *self.inner.liveness.lock().unwrap() = Liveness::Alive;
    }

    /// Get the current liveness state.
    #[must_use]
    pub fn liveness(&self) -> Liveness {
        *self.inner.liveness.lock().unwrap()
    }

    /// Push an event onto the control lane.
    pub fn send(&self, event: Outbound) {
        let _ = self.inner.control.send(event);
    }

    /// Push a control message onto the control lane.
    pub fn send_message(&self, message: ServerMessage) {
        self.send(Outbound::Message(message));
    }

    /// Append a binary frame to the outbound media queue.
    ///
    /// Returns the number of older frames dropped to make room.
    pub fn enqueue_frame(&self, frame: Bytes) -> usize {
        self.inner.frames.push(frame)
    }

    /// The outbound media queue, shared with the connection's writer task.
    #[must_use]
    pub fn frames(&self) -> &FrameQueue {
        &self.inner.frames
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.inner.id)
            .field("origin", &self.inner.origin)
            .field("role", &self.role())
            .finish()
    }
}
