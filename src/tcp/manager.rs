//! The connection manager: demultiplex table, listeners, admission control
//! and the outbound gather step.
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

use log::{debug, info, trace, warn};

use crate::event::ReadySet;
use crate::storage::Ring;
use crate::time::Instant;
use crate::wire::TcpRepr;

use super::input::{send_rst_reject, tcp_in};
use super::isn::IsnGenerator;
use super::tcb::{ActiveRing, Tcb, TcbHandle};
use super::{ConnectionKey, Endpoint, State, TcpSegment, PROTO_TCP};

/// Connection limits, read from the environment once.
///
/// Invalid or absent values silently fall back to the defaults.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Maximum concurrent connections across all ports. This counts every
    /// state from `LISTEN`-born blocks through the closing states.
    pub max_connections: u32,
}

impl Limits {
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 1000;
    pub const DEFAULT_MAX_BACKLOG: u32 = 128;

    /// Read the global limit from `MAX_CONNECTIONS`.
    pub fn from_env() -> Self {
        Limits {
            max_connections: env_u32("MAX_CONNECTIONS")
                .unwrap_or(Self::DEFAULT_MAX_CONNECTIONS),
        }
    }

    /// The connection limit for one local port, from
    /// `MAX_CONNECTIONS_PORT_<port>`, defaulting to the global limit.
    ///
    /// Read once per port when the port first sees a connection attempt and
    /// cached in that port's statistics thereafter.
    pub fn port_limit(&self, port: u16) -> u32 {
        env_u32(&format!("MAX_CONNECTIONS_PORT_{}", port))
            .unwrap_or(self.max_connections)
    }

    /// The accept backlog for one local port, from
    /// `MAX_BACKLOG_PORT_<port>`. Read once when the listener is created.
    pub fn backlog_limit(port: u16) -> u32 {
        env_u32(&format!("MAX_BACKLOG_PORT_{}", port))
            .unwrap_or(Self::DEFAULT_MAX_BACKLOG)
    }
}

impl Default for Limits {
    fn default() -> Self {
        Limits { max_connections: Self::DEFAULT_MAX_CONNECTIONS }
    }
}

fn env_u32(name: &str) -> Option<u32> {
    std::env::var(name).ok()?.parse().ok().filter(|value| *value > 0)
}

/// Per-port connection statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortStats {
    /// Connections currently open on this port.
    pub current: u32,
    /// The configured limit for this port.
    pub max: u32,
    /// Peak concurrent connections.
    pub peak: u32,
    /// Connections ever created.
    pub total_created: u32,
    /// Connections rejected over a limit.
    pub total_rejected: u32,
}

/// Accept backlog statistics of one listener.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BacklogStats {
    /// Established connections waiting in the accept queue.
    pub current: u32,
    /// The configured backlog.
    pub max: u32,
    /// Peak queue occupancy.
    pub peak: u32,
    /// Connections ever queued.
    pub total_queued: u32,
    /// Handshakes reset because the queue was full.
    pub total_rejected: u32,
}

/// A passive-open endpoint holding established connections until the
/// application accepts them.
pub struct Listener {
    /// The logical fd `socket()` handed out for this listener.
    pub fd: i32,
    pub local: Endpoint,
    /// Fully established connections awaiting `accept`. The ring capacity
    /// is the backlog, so overflow is visible as a failed push.
    pub acceptors: Ring<TcbHandle>,
    pub backlog_stats: BacklogStats,
}

impl Listener {
    pub fn new(fd: i32, local: Endpoint, backlog: u32) -> Self {
        Listener {
            fd,
            local,
            acceptors: Ring::new(backlog as usize),
            backlog_stats: BacklogStats { max: backlog, ..BacklogStats::default() },
        }
    }
}

/// Owns every connection: the demultiplex table, the listener table,
/// admission control and the work ring feeding outbound transmission.
pub struct TcbManager {
    active_tcbs: ActiveRing,
    tcbs: HashMap<ConnectionKey, TcbHandle>,
    active_ports: HashSet<Endpoint>,
    listeners: HashMap<Endpoint, Rc<RefCell<Listener>>>,
    limits: Limits,
    total_connections_created: u32,
    peak_connections: u32,
    port_stats: BTreeMap<u16, PortStats>,
    isn: IsnGenerator,
}

const ACTIVE_RING_CAPACITY: usize = 4096;

impl TcbManager {
    /// Create a manager with limits from the environment and a random
    /// initial sequence number key.
    pub fn new() -> Self {
        Self::with_limits(Limits::from_env(), IsnGenerator::from_entropy())
    }

    /// Create a manager with explicit limits and sequence number key.
    pub fn with_limits(limits: Limits, isn: IsnGenerator) -> Self {
        TcbManager {
            active_tcbs: Rc::new(RefCell::new(Ring::new(ACTIVE_RING_CAPACITY))),
            tcbs: HashMap::new(),
            active_ports: HashSet::new(),
            listeners: HashMap::new(),
            limits,
            total_connections_created: 0,
            peak_connections: 0,
            port_stats: BTreeMap::new(),
            isn,
        }
    }

    /// The protocol number this manager demultiplexes.
    pub fn id(&self) -> u8 {
        PROTO_TCP
    }

    /// Connections currently in the table.
    pub fn current_connections(&self) -> u32 {
        self.tcbs.len() as u32
    }

    /// The configured global limit.
    pub fn max_connections(&self) -> u32 {
        self.limits.max_connections
    }

    /// Peak concurrent connections observed.
    pub fn peak_connections(&self) -> u32 {
        self.peak_connections
    }

    /// Connections ever admitted.
    pub fn total_connections_created(&self) -> u32 {
        self.total_connections_created
    }

    /// Whether no further connection may be admitted globally.
    pub fn is_at_capacity(&self) -> bool {
        self.tcbs.len() as u32 >= self.limits.max_connections
    }

    /// Statistics of one port; zeroed if the port never saw a connection.
    pub fn port_stats(&self, port: u16) -> PortStats {
        self.port_stats.get(&port).copied().unwrap_or_default()
    }

    /// Statistics of every port that saw traffic.
    pub fn all_port_stats(&self) -> &BTreeMap<u16, PortStats> {
        &self.port_stats
    }

    /// Look up a connection by its key.
    pub fn get(&self, key: &ConnectionKey) -> Option<&TcbHandle> {
        self.tcbs.get(key)
    }

    /// Register a listener. Overwrites any previous listener on the same
    /// endpoint.
    pub fn listen_port(&mut self, endpoint: Endpoint, listener: Rc<RefCell<Listener>>) {
        debug!("[TCP] listening on {}", endpoint);
        self.listeners.insert(endpoint, listener);
        self.active_ports.insert(endpoint);
    }

    /// Process one inbound segment.
    ///
    /// Segments for known connections go through the state machine; a SYN
    /// for a listened port attempts admission; anything else is dropped.
    /// Returns the immediate reset answering a rejected connection attempt,
    /// to be transmitted without a control block.
    pub fn receive(&mut self, segment: TcpSegment, ready: &mut ReadySet) -> Option<TcpSegment> {
        let key = ConnectionKey { remote: segment.remote, local: segment.local };

        if let Some(handle) = self.tcbs.get(&key).cloned() {
            tcp_in(&handle, &segment, ready);
            self.mark_readable(&handle, ready);
            return None;
        }

        if self.active_ports.contains(&segment.local) {
            let listener = self.listeners.get(&segment.local).cloned()
                .expect("every active port has a listener");

            if !self.register_tcb(key, &listener) {
                let repr = TcpRepr::parse(segment.buffer.as_slice()).ok()?;
                let payload_len = segment.buffer.remaining() - repr.header_len as usize;
                warn!("[TCP] rejecting {} over connection limit", key);
                return Some(send_rst_reject(&repr, payload_len, segment.remote, segment.local));
            }

            let handle = self.tcbs.get(&key).cloned()
                .expect("connection registered above");
            {
                let mut tcb = handle.borrow_mut();
                tcb.state = State::Listen;
                tcb.next_state = State::Listen;
            }
            tcp_in(&handle, &segment, ready);

            {
                let listener = listener.borrow();
                if !listener.acceptors.is_empty() {
                    ready.mark_acceptable(listener.fd);
                }
            }
            self.mark_readable(&handle, ready);
            return None;
        }

        debug!("[TCP] no listener for {}, dropping", key);
        None
    }

    fn mark_readable(&self, handle: &TcbHandle, ready: &mut ReadySet) {
        let tcb = handle.borrow();
        if !tcb.receive_queue.is_empty() {
            if let Some(fd) = tcb.socket_fd {
                ready.mark_readable(fd);
            }
        }
    }

    /// Admit and create a new control block, or refuse it over a limit.
    ///
    /// On refusal the per-port rejection counter is bumped and the caller
    /// answers with a reset.
    fn register_tcb(&mut self, key: ConnectionKey, listener: &Rc<RefCell<Listener>>) -> bool {
        let port = key.local.port;
        let port_limit = self.limits.port_limit(port);
        let global_limit = self.limits.max_connections;
        let current_total = self.tcbs.len() as u32;

        let stats = self.port_stats.entry(port).or_insert_with(|| {
            info!("[TCP] port {} connection limit {}", port, port_limit);
            PortStats { max: port_limit, ..PortStats::default() }
        });

        if current_total >= global_limit {
            warn!("[TCP] global limit reached ({}/{}), refusing {}",
                  current_total, global_limit, key.remote);
            stats.total_rejected += 1;
            return false;
        }
        if stats.current >= stats.max {
            warn!("[TCP] port {} limit reached ({}/{}), refusing {}",
                  port, stats.current, stats.max, key.remote);
            stats.total_rejected += 1;
            return false;
        }

        stats.current += 1;
        stats.total_created += 1;
        if stats.current > stats.peak {
            stats.peak = stats.current;
        }

        let iss = self.isn.get_isn(&key, Instant::now());
        let handle = Tcb::new(&self.active_tcbs, Some(listener), key.remote, key.local, iss);
        self.tcbs.insert(key, handle);

        self.total_connections_created += 1;
        if self.tcbs.len() as u32 > self.peak_connections {
            self.peak_connections = self.tcbs.len() as u32;
        }

        trace!("[TCP] registered {} ({}/{} global)",
               key, self.tcbs.len(), global_limit);
        true
    }

    /// Pull the next outbound segment from the active connections, in FIFO
    /// order over the work ring. Produced segments are recorded for
    /// retransmission before they are handed out.
    pub fn gather_packet(&mut self) -> Option<TcpSegment> {
        loop {
            let handle = self.active_tcbs.borrow_mut().pop_front()?;
            let mut tcb = handle.borrow_mut();
            if let Some(segment) = tcb.gather_packet() {
                tcb.track_sent_segment(&segment, Instant::now());
                return Some(segment);
            }
        }
    }

    /// Sweep the table for `CLOSED` connections, dropping them and their
    /// port counts. Returns the number removed.
    ///
    /// Called opportunistically after outbound draining; a block may
    /// therefore outlive its close by one gather pass.
    pub fn cleanup_closed_connections(&mut self) -> u32 {
        let mut removed = 0;
        let port_stats = &mut self.port_stats;
        self.tcbs.retain(|key, handle| {
            if handle.borrow().state != State::Closed {
                return true;
            }
            debug!("[TCP] cleanup {}", key);
            if let Some(stats) = port_stats.get_mut(&key.local.port) {
                if stats.current > 0 {
                    stats.current -= 1;
                }
            }
            removed += 1;
            false
        });
        if removed > 0 {
            trace!("[TCP] cleanup removed {} connections, {} remain",
                   removed, self.tcbs.len());
        }
        removed
    }
}

impl Default for TcbManager {
    fn default() -> Self {
        Self::new()
    }
}
