/*! The TCP connection subsystem.

Relevant material for reading:
Main TCP rfc (skip if confident): <https://tools.ietf.org/html/rfc793>
Errata and comments: <https://tools.ietf.org/html/rfc1122#section-4.2>
TCP congestion control: <https://tools.ietf.org/html/rfc5681>
Initial sequence numbers: <https://tools.ietf.org/html/rfc6528>

Only the passive-open half of the protocol is implemented: connections are
created by remote SYNs arriving on listened ports, never opened actively.
Each connection lives in a [`Tcb`] owned primarily by the [`TcbManager`]'s
demultiplex table; the manager's work ring and listener accept rings hold
transient extra handles.

Deliberate simplifications, kept in sync with the tests:

* Out-of-order segments are dropped and the expected sequence number is
  re-acknowledged; there is no reassembly buffer.
* `TIME_WAIT` is not timed. The control block collapses to `CLOSED` right
  after the terminating ACK, and the next cleanup sweep removes it.
* Loss is detected through duplicate ACKs only. Retransmit queue entries
  carry timestamps, but no retransmission timer fires on them.
* No TCP options are emitted and received options are skipped; the maximum
  segment size stays at its Ethernet-derived default.

[`Tcb`]: struct.Tcb.html
[`TcbManager`]: struct.TcbManager.html
*/
use core::fmt;

use crate::storage::PacketBuf;
use crate::wire::Ipv4Address;

mod input;
mod isn;
mod manager;
mod tcb;


pub use self::input::{send_rst_reject, tcp_in};
pub use self::isn::IsnGenerator;
pub use self::manager::{
    BacklogStats,
    Limits,
    Listener,
    PortStats,
    TcbManager};
pub use self::tcb::{
    RetransmitEntry,
    ReceiveState,
    SendState,
    Tcb,
    TcbHandle};

/// The protocol number carried in IPv4 headers for TCP.
pub const PROTO_TCP: u8 = 0x06;

/// One side of a connection: an IPv4 address and a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint {
    pub addr: Ipv4Address,
    pub port: u16,
}

impl Endpoint {
    pub fn new(addr: Ipv4Address, port: u16) -> Self {
        Endpoint { addr, port }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.addr, self.port)
    }
}

/// The primary key of the connection table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub remote: Endpoint,
    pub local: Endpoint,
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} -> {}", self.remote, self.local)
    }
}

/// A TCP segment in flight between the IPv4 layer and the connection
/// manager, in either direction.
///
/// The buffer cursor sits at the start of the TCP header.
#[derive(Debug)]
pub struct TcpSegment {
    pub remote: Endpoint,
    pub local: Endpoint,
    pub buffer: PacketBuf,
}

/// State enum of the connection state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum State {
    /// Marker state for a connection that no longer exists.
    Closed,

    /// A passive open, waiting for a SYN.
    Listen,

    /// An outgoing connection request. Unreachable without active open;
    /// carried for state machine completeness.
    SynSent,

    /// Connection request we answered with SYN+ACK, waiting on the ACK.
    SynReceived,

    /// An open connection.
    Established,

    /// We closed our side first, FIN sent and unacknowledged.
    FinWait1,

    /// Our FIN was acknowledged, waiting for the remote's.
    FinWait2,

    /// Both sides sent FIN simultaneously, waiting on the last ACK.
    Closing,

    /// Both FINs exchanged. Not timed here; collapses to `Closed`.
    TimeWait,

    /// The remote closed its side first.
    CloseWait,

    /// We answered the remote's FIN with our own, waiting on the last ACK.
    LastAck,
}

impl State {
    /// Whether the connection may still carry application payload out.
    pub fn can_send_data(self) -> bool {
        match self {
            State::Established | State::CloseWait => true,
            _ => false,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            State::Closed => "CLOSED",
            State::Listen => "LISTEN",
            State::SynSent => "SYN_SENT",
            State::SynReceived => "SYN_RECEIVED",
            State::Established => "ESTABLISHED",
            State::FinWait1 => "FIN_WAIT_1",
            State::FinWait2 => "FIN_WAIT_2",
            State::Closing => "CLOSING",
            State::TimeWait => "TIME_WAIT",
            State::CloseWait => "CLOSE_WAIT",
            State::LastAck => "LAST_ACK",
        };
        f.write_str(name)
    }
}

impl Default for State {
    fn default() -> Self {
        State::Closed
    }
}
