use core::fmt;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use log::{trace, warn};

use crate::storage::{PacketBuf, Ring};
use crate::time::{Duration, Instant};
use crate::wire::{tcp_fill_checksum, TcpFlags, TcpRepr, TcpSeqNumber, TCP_HEADER_LEN};

use super::manager::Listener;
use super::{Endpoint, State, TcpSegment};

/// The shared handle to a connection.
///
/// The manager's connection table holds the primary handle; the active work
/// ring and a listener's accept ring hold transient clones, and the socket
/// layer holds one per accepted connection. All access is single-threaded.
pub type TcbHandle = Rc<RefCell<Tcb>>;

pub(crate) type ActiveRing = Rc<RefCell<Ring<TcbHandle>>>;

/// Default sender maximum segment size: Ethernet MTU minus IP and TCP
/// headers. No MSS option is negotiated.
pub const DEFAULT_MSS: u32 = 1460;

/// The advertised receive window. Never scaled, never moved.
pub const RECEIVE_WINDOW: u16 = 0xfaf0;

/// Initial slow start threshold (RFC 5681 allows an arbitrarily large
/// value; 64KB gives a reasonable slow start phase).
const INITIAL_SSTHRESH: u32 = 65536;

const SEND_QUEUE_BUFFERS: usize = 256;
const RECEIVE_QUEUE_BUFFERS: usize = 256;
const CTL_QUEUE_PACKETS: usize = 64;

/// The sending state.
///
/// In RFC793 this is referred to as `SND`.
#[derive(Debug, Clone)]
pub struct SendState {
    /// The oldest not yet acknowledged sequence number (`SND.UNA`).
    pub unacknowledged: TcpSeqNumber,

    /// The next sequence number to use for transmission (`SND.NXT`).
    pub next: TcpSeqNumber,

    /// The send window indicated by the receiver (`SND.WND`).
    pub window: u32,

    /// The size of the largest segment we transmit.
    pub mss: u32,

    /// The congestion window (RFC 5681). Zero until the connection is
    /// established; [`Tcb::can_send`] treats zero as "handshake, always
    /// allowed".
    ///
    /// [`Tcb::can_send`]: struct.Tcb.html#method.can_send
    pub cwnd: u32,

    /// Decider between slow start and congestion avoidance.
    pub ssthresh: u32,

    /// Consecutive duplicate ACKs seen. Three trigger a fast retransmit;
    /// while at three or above the connection is in fast recovery.
    pub dupacks: u16,

    /// Total segments retransmitted over the connection lifetime.
    pub retransmits: u16,

    /// Exponential backoff step for a future retransmission timer.
    pub backoff: u16,

    /// Smoothed round-trip time estimate.
    pub srtt: Duration,

    /// Round-trip time variance estimate.
    pub rttvar: Duration,

    /// Retransmission timeout derived from `srtt`/`rttvar`. No timer fires
    /// on it yet; loss is detected through duplicate ACKs.
    pub rto: Duration,

    /// Octets sent but not yet acknowledged. Always equal to the sum of
    /// `data_len` over the retransmit queue.
    pub bytes_in_flight: u32,

    /// The highest acknowledgement number seen, for duplicate detection.
    pub last_ack_no: TcpSeqNumber,

    /// The initial send sequence number (`ISS`).
    pub initial_seq: TcpSeqNumber,
}

/// The receiving state.
///
/// In RFC793 this is referred to as `RCV`.
#[derive(Debug, Clone)]
pub struct ReceiveState {
    /// The next expected sequence number (`RCV.NXT`).
    pub next: TcpSeqNumber,

    /// The window we advertise.
    pub window: u32,

    /// The maximum segment size the peer announced. Unused while options
    /// are not parsed.
    pub mss: u32,
}

/// One sent-but-unacknowledged segment, kept for retransmission.
#[derive(Debug, Clone)]
pub struct RetransmitEntry {
    pub seq_no: TcpSeqNumber,
    pub data_len: u32,
    pub data: Vec<u8>,
    pub sent_time: Instant,
    pub retransmit_count: u16,
}

/// A TCP control block: everything one connection owns.
pub struct Tcb {
    /// Handle to ourselves, for re-queueing onto the work ring. The same
    /// trick as C++'s `enable_shared_from_this`.
    me: Weak<RefCell<Tcb>>,

    /// The committed state of the state machine.
    pub state: State,

    /// The state the next emitted packet commits to.
    ///
    /// Segment handling writes transitions here; [`make_packet`] performs
    /// `state = next_state` when the packet leaves. This keeps a transition
    /// atomic per segment: an observer never sees a state whose announcing
    /// packet was not built yet.
    ///
    /// [`make_packet`]: #method.make_packet
    pub next_state: State,

    pub local: Endpoint,
    pub remote: Endpoint,

    pub send: SendState,
    pub receive: ReceiveState,

    /// Application bytes awaiting segmentation and transmission.
    pub send_queue: Ring<Vec<u8>>,

    /// In-order bytes ready for the application to read.
    pub receive_queue: Ring<Vec<u8>>,

    /// Pre-built segments (retransmits, resets) that bypass
    /// [`make_packet`] and take priority over it.
    ///
    /// [`make_packet`]: #method.make_packet
    pub ctl_packets: Ring<TcpSegment>,

    /// Sent segments not yet fully acknowledged, ordered by sequence
    /// number. ACK processing only ever touches the front.
    pub retransmit_queue: VecDeque<RetransmitEntry>,

    active_tcbs: Weak<RefCell<Ring<TcbHandle>>>,

    /// The accept machinery of the listener this connection was born from.
    pub(crate) listener: Weak<RefCell<Listener>>,

    /// The logical socket fd handed out by `accept`, once there is one.
    pub socket_fd: Option<i32>,

    /// An acknowledgement is owed to the peer.
    pub(crate) ack_pending: bool,
}

impl Tcb {
    /// Create a control block for a connection arriving at a listened port.
    ///
    /// The block starts out `Closed`; the manager moves it to `Listen`
    /// before feeding it the first segment.
    pub fn new(
        active_tcbs: &ActiveRing,
        listener: Option<&Rc<RefCell<Listener>>>,
        remote: Endpoint,
        local: Endpoint,
        initial_seq: TcpSeqNumber,
    ) -> TcbHandle {
        let tcb = Tcb {
            me: Weak::new(),
            state: State::Closed,
            next_state: State::Closed,
            local,
            remote,
            send: SendState {
                unacknowledged: initial_seq,
                next: initial_seq,
                window: 0,
                mss: DEFAULT_MSS,
                cwnd: 0,
                ssthresh: 0,
                dupacks: 0,
                retransmits: 0,
                backoff: 0,
                srtt: Duration::from_millis(0),
                rttvar: Duration::from_millis(0),
                rto: Duration::from_millis(3000),
                bytes_in_flight: 0,
                last_ack_no: initial_seq,
                initial_seq,
            },
            receive: ReceiveState {
                next: TcpSeqNumber::default(),
                window: RECEIVE_WINDOW as u32,
                mss: 0,
            },
            send_queue: Ring::new(SEND_QUEUE_BUFFERS),
            receive_queue: Ring::new(RECEIVE_QUEUE_BUFFERS),
            ctl_packets: Ring::new(CTL_QUEUE_PACKETS),
            retransmit_queue: VecDeque::new(),
            active_tcbs: Rc::downgrade(active_tcbs),
            listener: listener.map(Rc::downgrade).unwrap_or_default(),
            socket_fd: None,
            ack_pending: false,
        };

        let handle = Rc::new(RefCell::new(tcb));
        handle.borrow_mut().me = Rc::downgrade(&handle);
        handle
    }

    /// Put ourselves onto the manager's work ring.
    ///
    /// Duplicate entries are tolerated; the gather step skips blocks with
    /// nothing to emit.
    pub(crate) fn activate(&self) {
        let me = match self.me.upgrade() {
            Some(me) => me,
            None => return,
        };
        let ring = match self.active_tcbs.upgrade() {
            Some(ring) => ring,
            None => return,
        };
        if ring.borrow_mut().push_back(me).is_err() {
            warn!("[TCP] active ring full, wakeup for {} dropped", self.remote);
        }
    }

    /// Append application bytes to the send queue and mark the connection
    /// active. Returns the number of bytes accepted.
    pub fn enqueue_send(&mut self, data: Vec<u8>) -> usize {
        let len = data.len();
        match self.send_queue.push_back(data) {
            Ok(()) => {
                self.activate();
                len
            }
            Err(_) => 0,
        }
    }

    /// Drain up to `buf.len()` received in-order bytes.
    pub fn dequeue_received(&mut self, buf: &mut [u8]) -> usize {
        let mut copied = 0;
        while copied < buf.len() {
            let mut chunk = match self.receive_queue.pop_front() {
                Some(chunk) => chunk,
                None => break,
            };
            let take = chunk.len().min(buf.len() - copied);
            buf[copied..copied + take].copy_from_slice(&chunk[..take]);
            copied += take;
            if take < chunk.len() {
                chunk.drain(..take);
                self.receive_queue.push_front(chunk);
            }
        }
        copied
    }

    /// Initialize congestion control parameters (RFC 5681). Called when the
    /// connection enters `Established`.
    pub fn init_congestion_control(&mut self) {
        self.send.cwnd = self.send.mss;
        self.send.ssthresh = INITIAL_SSTHRESH;
        self.send.bytes_in_flight = 0;
    }

    /// Enter fast recovery on the third duplicate ACK:
    /// `ssthresh = max(cwnd/2, 2*MSS)`, `cwnd = ssthresh + 3*MSS`.
    pub fn enter_fast_recovery(&mut self) {
        self.send.ssthresh = (self.send.cwnd / 2).max(2 * self.send.mss);
        self.send.cwnd = self.send.ssthresh + 3 * self.send.mss;
        trace!("[TCP] {} fast recovery, cwnd={} ssthresh={}",
               self.remote, self.send.cwnd, self.send.ssthresh);
    }

    /// Inflate the window for each additional duplicate ACK during fast
    /// recovery.
    pub fn inflate_window(&mut self) {
        self.send.cwnd += self.send.mss;
    }

    /// Deflate the window when a new ACK ends fast recovery.
    pub fn deflate_window(&mut self) {
        self.send.cwnd = self.send.ssthresh;
        trace!("[TCP] {} fast recovery exit, cwnd={}", self.remote, self.send.cwnd);
    }

    /// Collapse the window after a loss signalled outside fast recovery.
    /// Reserved for a retransmission timer; nothing calls it yet.
    pub fn on_congestion_event(&mut self) {
        self.send.ssthresh = (self.send.cwnd / 2).max(2 * self.send.mss);
        self.send.cwnd = self.send.mss;
        self.send.dupacks = 0;
    }

    /// Whether congestion control admits another segment.
    ///
    /// Before the connection is established `cwnd` is zero and handshake
    /// segments always pass.
    pub fn can_send(&self) -> bool {
        if self.send.cwnd == 0 {
            return true;
        }
        self.send.bytes_in_flight < self.send.cwnd
    }

    /// Whether a call to [`make_packet`] would produce anything useful.
    ///
    /// [`make_packet`]: #method.make_packet
    pub fn has_pending_output(&self) -> bool {
        if self.state == State::Closed && self.next_state == State::Closed {
            return false;
        }
        self.next_state != self.state
            || self.ack_pending
            || (self.state.can_send_data()
                && !self.send_queue.is_empty()
                && self.payload_budget() > 0)
    }

    /// The number of payload octets the next segment may carry.
    fn payload_budget(&self) -> usize {
        let mss = self.send.mss as usize;
        let cwnd_budget = if self.send.cwnd == 0 {
            mss
        } else {
            self.send.cwnd.saturating_sub(self.send.bytes_in_flight) as usize
        };
        let window_budget =
            (self.send.window as usize).saturating_sub(self.send.bytes_in_flight as usize);
        mss.min(cwnd_budget).min(window_budget)
    }

    /// Pull at most `budget` bytes off the send queue, splitting the last
    /// buffer if needed.
    fn take_send_bytes(&mut self, budget: usize) -> Vec<u8> {
        let mut payload = Vec::new();
        while payload.len() < budget {
            let mut chunk = match self.send_queue.pop_front() {
                Some(chunk) => chunk,
                None => break,
            };
            let take = chunk.len().min(budget - payload.len());
            payload.extend_from_slice(&chunk[..take]);
            if take < chunk.len() {
                chunk.drain(..take);
                self.send_queue.push_front(chunk);
            }
        }
        payload
    }

    /// Build the next outbound segment from the current state and commit
    /// `state = next_state`.
    ///
    /// The ACK bit is always set. The SYN bit is carried while the block
    /// moves to (or sits in) `SynReceived`, reusing the initial sequence
    /// number so a retransmitted SYN+ACK is identical to the first. The FIN
    /// bit is carried exactly on the transition packet into `FinWait1` or
    /// `LastAck`.
    pub fn make_packet(&mut self) -> Option<TcpSegment> {
        let mut flags = TcpFlags::default();
        flags.set_ack(true);

        let syn = self.next_state == State::SynReceived;
        let fin_transition = (self.next_state == State::FinWait1
                || self.next_state == State::LastAck)
            && self.state != self.next_state;

        let mut payload = Vec::new();
        if self.state.can_send_data() && !self.send_queue.is_empty() {
            let budget = self.payload_budget();
            payload = self.take_send_bytes(budget);
        }

        // The FIN waits until the send queue has drained; committing the
        // close transition earlier would cut off queued data.
        let fin = fin_transition && self.send_queue.is_empty();
        let defer_transition = fin_transition && !fin;

        let seq = if syn {
            flags.set_syn(true);
            self.send.initial_seq
        } else {
            self.send.next
        };
        if fin {
            flags.set_fin(true);
        }

        let segment = self.build_segment(flags, seq, &payload);

        if syn {
            self.send.next = self.send.initial_seq + 1;
        } else {
            self.send.next = seq + payload.len();
            if fin {
                self.send.next += 1;
            }
        }

        if !defer_transition && self.state != self.next_state {
            trace!("[TCP] {} {} -> {}", self.remote, self.state, self.next_state);
            self.state = self.next_state;
        }
        // TIME_WAIT is untimed: the terminating ACK just built ends the
        // connection and the next cleanup sweep may collect it.
        if self.state == State::TimeWait {
            self.state = State::Closed;
            self.next_state = State::Closed;
        }
        self.ack_pending = false;

        if self.state.can_send_data() && !self.send_queue.is_empty() {
            self.activate();
        }

        Some(segment)
    }

    /// Produce the next segment to put on the wire, if any.
    ///
    /// Control packets (retransmits, resets) take priority; otherwise a
    /// fresh packet is built when congestion control admits one and there is
    /// something to say.
    pub fn gather_packet(&mut self) -> Option<TcpSegment> {
        if let Some(ctl) = self.ctl_packets.pop_front() {
            return Some(ctl);
        }
        if !self.can_send() {
            return None;
        }
        if !self.has_pending_output() {
            return None;
        }
        self.make_packet()
    }

    /// Record an outbound segment for retransmission.
    ///
    /// Only payload-bearing segments are tracked. A segment whose sequence
    /// number is already in the queue is a retransmission and must not be
    /// tracked twice, or `bytes_in_flight` would double count it.
    pub fn track_sent_segment(&mut self, segment: &TcpSegment, now: Instant) {
        let data = segment.buffer.as_slice();
        let repr = match TcpRepr::parse(data) {
            Ok(repr) => repr,
            Err(_) => return,
        };
        let header_len = repr.header_len as usize;
        if data.len() <= header_len {
            return;
        }
        if self.retransmit_queue.iter().any(|entry| entry.seq_no == repr.seq_number) {
            return;
        }

        let payload = &data[header_len..];
        let entry = RetransmitEntry {
            seq_no: repr.seq_number,
            data_len: payload.len() as u32,
            data: payload.to_vec(),
            sent_time: now,
            retransmit_count: 0,
        };
        self.send.bytes_in_flight += entry.data_len;
        trace!("[TCP] {} tracked seq={} len={} in_flight={}",
               self.remote, entry.seq_no, entry.data_len, self.send.bytes_in_flight);
        self.retransmit_queue.push_back(entry);
    }

    /// Drop every retransmit entry fully covered by `ack_no` and release its
    /// share of `bytes_in_flight`.
    pub fn remove_acked_segments(&mut self, ack_no: TcpSeqNumber) {
        while let Some(front) = self.retransmit_queue.front() {
            let segment_end = front.seq_no + front.data_len as usize;
            if segment_end <= ack_no {
                self.send.bytes_in_flight -= front.data_len;
                self.retransmit_queue.pop_front();
            } else {
                break;
            }
        }
    }

    /// Rebuild and queue the tracked segment starting at `seq_no`.
    ///
    /// Returns whether such a segment was found. The rebuilt segment goes
    /// onto the control queue, ahead of any fresh data.
    pub fn retransmit_segment(&mut self, seq_no: TcpSeqNumber, now: Instant) -> bool {
        let index = match self.retransmit_queue.iter().position(|e| e.seq_no == seq_no) {
            Some(index) => index,
            None => return false,
        };

        let data = self.retransmit_queue[index].data.clone();
        let mut flags = TcpFlags::default();
        flags.set_ack(true);
        let segment = self.build_segment(flags, seq_no, &data);

        if self.ctl_packets.push_back(segment).is_err() {
            warn!("[TCP] {} control queue full, retransmit of seq={} dropped",
                  self.remote, seq_no);
            return false;
        }

        let entry = &mut self.retransmit_queue[index];
        entry.retransmit_count += 1;
        entry.sent_time = now;
        self.send.retransmits += 1;
        trace!("[TCP] {} retransmit seq={} len={} count={}",
               self.remote, seq_no, entry.data_len, entry.retransmit_count);
        self.activate();
        true
    }

    /// Assemble a checksummed segment from header values and payload.
    pub(crate) fn build_segment(
        &self,
        flags: TcpFlags,
        seq: TcpSeqNumber,
        payload: &[u8],
    ) -> TcpSegment {
        let mut buffer = PacketBuf::new(TCP_HEADER_LEN + payload.len());
        let repr = TcpRepr {
            src_port: self.local.port,
            dst_port: self.remote.port,
            seq_number: seq,
            ack_number: self.receive.next,
            flags,
            header_len: TCP_HEADER_LEN as u8,
            window_len: RECEIVE_WINDOW,
        };
        {
            let data = buffer.as_mut_slice();
            repr.emit(data);
            data[TCP_HEADER_LEN..].copy_from_slice(payload);
            tcp_fill_checksum(data, self.local.addr, self.remote.addr);
        }
        TcpSegment {
            remote: self.remote,
            local: self.local,
            buffer,
        }
    }
}

impl fmt::Display for Tcb {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} -> {} {}", self.remote, self.local, self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Ring;
    use crate::wire::Ipv4Address;

    fn test_tcb() -> TcbHandle {
        let ring: ActiveRing = Rc::new(RefCell::new(Ring::new(16)));
        let remote = Endpoint::new(Ipv4Address::new(192, 168, 1, 99), 40000);
        let local = Endpoint::new(Ipv4Address::new(192, 168, 1, 1), 30000);
        Tcb::new(&ring, None, remote, local, TcpSeqNumber(5000))
    }

    fn data_segment(tcb: &Tcb, seq: u32, payload: &[u8]) -> TcpSegment {
        let mut flags = TcpFlags::default();
        flags.set_ack(true);
        tcb.build_segment(flags, TcpSeqNumber(seq as i32), payload)
    }

    #[test]
    fn bytes_in_flight_matches_retransmit_queue() {
        let handle = test_tcb();
        let mut tcb = handle.borrow_mut();
        let now = Instant::from_millis(0);

        let first = data_segment(&tcb, 5001, &[1; 100]);
        let second = data_segment(&tcb, 5101, &[2; 50]);
        tcb.track_sent_segment(&first, now);
        tcb.track_sent_segment(&second, now);

        let queued: u32 = tcb.retransmit_queue.iter().map(|e| e.data_len).sum();
        assert_eq!(tcb.send.bytes_in_flight, queued);
        assert_eq!(tcb.send.bytes_in_flight, 150);
    }

    #[test]
    fn tracking_is_idempotent_for_retransmissions() {
        let handle = test_tcb();
        let mut tcb = handle.borrow_mut();
        let now = Instant::from_millis(0);

        let segment = data_segment(&tcb, 5001, &[1; 100]);
        tcb.track_sent_segment(&segment, now);
        tcb.track_sent_segment(&segment, now);

        assert_eq!(tcb.retransmit_queue.len(), 1);
        assert_eq!(tcb.send.bytes_in_flight, 100);
    }

    #[test]
    fn track_and_ack_restores_bytes_in_flight() {
        let handle = test_tcb();
        let mut tcb = handle.borrow_mut();
        let now = Instant::from_millis(0);

        let segment = data_segment(&tcb, 5001, &[1; 100]);
        tcb.track_sent_segment(&segment, now);
        assert_eq!(tcb.send.bytes_in_flight, 100);

        tcb.remove_acked_segments(TcpSeqNumber(5101));
        assert_eq!(tcb.send.bytes_in_flight, 0);
        assert!(tcb.retransmit_queue.is_empty());
    }

    #[test]
    fn partial_ack_keeps_unacked_tail() {
        let handle = test_tcb();
        let mut tcb = handle.borrow_mut();
        let now = Instant::from_millis(0);

        let seg1 = data_segment(&tcb, 5001, &[1; 100]);
        tcb.track_sent_segment(&seg1, now);
        let seg2 = data_segment(&tcb, 5101, &[2; 100]);
        tcb.track_sent_segment(&seg2, now);

        tcb.remove_acked_segments(TcpSeqNumber(5101));
        assert_eq!(tcb.retransmit_queue.len(), 1);
        assert_eq!(tcb.send.bytes_in_flight, 100);
        // No remaining entry is covered by the acknowledgement.
        assert!(tcb.retransmit_queue.iter()
            .all(|e| !(e.seq_no + e.data_len as usize <= TcpSeqNumber(5101))));
    }

    #[test]
    fn removal_wraps_around_sequence_space() {
        let handle = test_tcb();
        let mut tcb = handle.borrow_mut();
        let now = Instant::from_millis(0);

        // A segment of 100 octets straddling the unsigned wrap.
        let seq = TcpSeqNumber(u32::max_value().wrapping_sub(49) as i32);
        let mut flags = TcpFlags::default();
        flags.set_ack(true);
        let segment = tcb.build_segment(flags, seq, &[3; 100]);
        tcb.track_sent_segment(&segment, now);

        // An acknowledgement past the wrap covers it.
        tcb.remove_acked_segments(seq + 100);
        assert!(tcb.retransmit_queue.is_empty());
        assert_eq!(tcb.send.bytes_in_flight, 0);
    }

    #[test]
    fn cwnd_limits_outstanding_data() {
        let handle = test_tcb();
        let mut tcb = handle.borrow_mut();
        tcb.state = State::Established;
        tcb.next_state = State::Established;
        tcb.init_congestion_control();
        tcb.send.window = 65535;

        assert!(tcb.can_send());
        tcb.enqueue_send(vec![0; 2 * DEFAULT_MSS as usize]);

        // One MSS fits the initial congestion window.
        let first = tcb.make_packet().unwrap();
        tcb.track_sent_segment(&first, Instant::from_millis(0));
        assert_eq!(tcb.send.bytes_in_flight, DEFAULT_MSS);
        assert!(!tcb.can_send());
        assert_eq!(tcb.gather_packet().map(|_| ()), None);
    }

    #[test]
    fn fast_recovery_window_arithmetic() {
        let handle = test_tcb();
        let mut tcb = handle.borrow_mut();
        tcb.send.mss = 1000;
        tcb.send.cwnd = 8000;

        tcb.enter_fast_recovery();
        assert_eq!(tcb.send.ssthresh, 4000);
        assert_eq!(tcb.send.cwnd, 7000);

        tcb.inflate_window();
        assert_eq!(tcb.send.cwnd, 8000);

        tcb.deflate_window();
        assert_eq!(tcb.send.cwnd, 4000);
    }

    #[test]
    fn fast_recovery_floor_is_two_mss() {
        let handle = test_tcb();
        let mut tcb = handle.borrow_mut();
        tcb.send.mss = 1000;
        tcb.send.cwnd = 1000;

        tcb.enter_fast_recovery();
        assert_eq!(tcb.send.ssthresh, 2000);
        assert_eq!(tcb.send.cwnd, 5000);
    }

    #[test]
    fn retransmit_goes_to_ctl_queue() {
        let handle = test_tcb();
        let mut tcb = handle.borrow_mut();
        let now = Instant::from_millis(0);

        let seg = data_segment(&tcb, 5001, b"abcdef");
        tcb.track_sent_segment(&seg, now);
        assert!(tcb.retransmit_segment(TcpSeqNumber(5001), now));
        assert!(!tcb.retransmit_segment(TcpSeqNumber(9999), now));

        let ctl = tcb.gather_packet().expect("control packet pending");
        let repr = TcpRepr::parse(ctl.buffer.as_slice()).unwrap();
        assert_eq!(repr.seq_number, TcpSeqNumber(5001));
        assert_eq!(&ctl.buffer.as_slice()[TCP_HEADER_LEN..], b"abcdef");
        assert_eq!(tcb.retransmit_queue[0].retransmit_count, 1);
        // Still tracked exactly once.
        assert_eq!(tcb.send.bytes_in_flight, 6);
    }

    #[test]
    fn dequeue_received_splits_chunks() {
        let handle = test_tcb();
        let mut tcb = handle.borrow_mut();
        tcb.receive_queue.push_back(b"hello world".to_vec()).unwrap();

        let mut buf = [0u8; 5];
        assert_eq!(tcb.dequeue_received(&mut buf), 5);
        assert_eq!(&buf, b"hello");

        let mut rest = [0u8; 16];
        let n = tcb.dequeue_received(&mut rest);
        assert_eq!(&rest[..n], b" world");
    }
}
