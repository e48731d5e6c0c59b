//! Inbound segment processing: the connection state machine.
//!
//! [`tcp_in`] drives a control block through the RFC 793 passive-open state
//! diagram, augmented with the RFC 5681 congestion hooks. It never writes to
//! the wire itself: transitions are written to `next_state`, owed
//! acknowledgements are flagged, and the block is pushed onto the work ring;
//! the gather step turns all of that into packets.
//!
//! [`tcp_in`]: fn.tcp_in.html
use log::{debug, trace, warn};

use crate::event::ReadySet;
use crate::storage::PacketBuf;
use crate::time::Instant;
use crate::wire::{
    tcp_fill_checksum, TcpFlags, TcpRepr, TcpSeqNumber, TCP_HEADER_LEN};

use super::tcb::{Tcb, TcbHandle};
use super::{Endpoint, State, TcpSegment};

/// Process one inbound segment for an existing connection.
pub fn tcp_in(handle: &TcbHandle, segment: &TcpSegment, ready: &mut ReadySet) {
    let data = segment.buffer.as_slice();
    let repr = match TcpRepr::parse(data) {
        Ok(repr) => repr,
        Err(err) => {
            debug!("[TCP] {} -> {} unparseable segment: {}",
                   segment.remote, segment.local, err);
            return;
        }
    };
    let payload = &data[repr.header_len as usize..];

    let mut tcb = handle.borrow_mut();
    trace!("[TCP] {} in {}: {} len={}", tcb.remote, tcb.state, repr, payload.len());

    // A reset ends the connection outright in every synchronized state; no
    // answer is ever sent to a segment carrying RST.
    if repr.flags.rst() {
        match tcb.state {
            State::Listen | State::Closed => {}
            _ => {
                debug!("[TCP] {} reset by peer in {}", tcb.remote, tcb.state);
                tcb.state = State::Closed;
                tcb.next_state = State::Closed;
            }
        }
        return;
    }

    match tcb.state {
        State::Listen => on_listen(&mut tcb, &repr),
        State::SynReceived => {
            on_syn_received(&mut tcb, &repr);
            if tcb.state == State::Established {
                listen_finish(&mut tcb, handle, ready);
                // The handshake ACK may already carry data.
                if !payload.is_empty() || repr.flags.fin() {
                    on_established(&mut tcb, &repr, payload);
                }
            }
        }
        State::Established => on_established(&mut tcb, &repr, payload),
        State::FinWait1 => on_fin_wait_1(&mut tcb, &repr, payload),
        State::FinWait2 => on_fin_wait_2(&mut tcb, &repr, payload),
        State::Closing => on_closing(&mut tcb, &repr),
        State::CloseWait => on_close_wait(&mut tcb, &repr, payload),
        State::LastAck => on_last_ack(&mut tcb, &repr),
        State::SynSent | State::TimeWait | State::Closed => {
            debug!("[TCP] {} segment in {} dropped", tcb.remote, tcb.state);
        }
    }
}

fn on_listen(tcb: &mut Tcb, repr: &TcpRepr) {
    if !repr.flags.syn() || repr.flags.ack() {
        debug!("[TCP] {} non-SYN segment in LISTEN dropped", tcb.remote);
        return;
    }

    tcb.receive.next = repr.seq_number + 1;
    tcb.send.window = repr.window_len as u32;
    // The initial send sequence number was chosen at registration; the
    // SYN+ACK announcing it is built by the gather step.
    tcb.next_state = State::SynReceived;
    tcb.activate();
}

fn on_syn_received(tcb: &mut Tcb, repr: &TcpRepr) {
    if repr.flags.syn() {
        // The peer retransmitted its SYN; our SYN+ACK was lost.
        tcb.ack_pending = true;
        tcb.activate();
        return;
    }
    if !repr.flags.ack() {
        return;
    }
    if repr.ack_number != tcb.send.next {
        debug!("[TCP] {} handshake ACK for {} (expected {})",
               tcb.remote, repr.ack_number, tcb.send.next);
        return;
    }

    tcb.send.unacknowledged = repr.ack_number;
    tcb.send.last_ack_no = repr.ack_number;
    tcb.send.window = repr.window_len as u32;
    // The transition is committed immediately: no packet announces it, the
    // handshake is complete as received.
    tcb.state = State::Established;
    tcb.next_state = State::Established;
    tcb.init_congestion_control();
}

/// Hand a freshly established connection to its listener's accept queue, or
/// reset it when the backlog is full.
fn listen_finish(tcb: &mut Tcb, handle: &TcbHandle, ready: &mut ReadySet) {
    let listener = match tcb.listener.upgrade() {
        Some(listener) => listener,
        None => return,
    };
    let mut listener = listener.borrow_mut();

    if listener.acceptors.is_full() {
        listener.backlog_stats.total_rejected += 1;
        warn!("[TCP] {} backlog full on {} ({}/{}), resetting",
              tcb.remote, listener.local,
              listener.acceptors.len(), listener.backlog_stats.max);

        let mut flags = TcpFlags::default();
        flags.set_rst(true);
        flags.set_ack(true);
        let seq = tcb.send.next;
        let rst = tcb.build_segment(flags, seq, &[]);
        if tcb.ctl_packets.push_back(rst).is_err() {
            warn!("[TCP] {} control queue full, reset dropped", tcb.remote);
        }
        tcb.state = State::Closed;
        tcb.next_state = State::Closed;
        tcb.activate();
        return;
    }

    listener.acceptors.push_back(handle.clone())
        .unwrap_or_else(|_| unreachable!("acceptors checked for room above"));
    listener.backlog_stats.current += 1;
    listener.backlog_stats.total_queued += 1;
    if listener.backlog_stats.current > listener.backlog_stats.peak {
        listener.backlog_stats.peak = listener.backlog_stats.current;
    }
    ready.mark_acceptable(listener.fd);
    trace!("[TCP] {} established, queued on {} ({}/{})",
           tcb.remote, listener.local,
           listener.acceptors.len(), listener.backlog_stats.max);
}

fn on_established(tcb: &mut Tcb, repr: &TcpRepr, payload: &[u8]) {
    if !accept_in_order(tcb, repr) {
        return;
    }
    deliver_payload(tcb, payload);
    if repr.flags.ack() {
        process_ack(tcb, repr, payload.len());
    }
    if repr.flags.fin() {
        tcb.receive.next += 1;
        tcb.ack_pending = true;
        tcb.next_state = State::CloseWait;
        tcb.activate();
    }
}

fn on_fin_wait_1(tcb: &mut Tcb, repr: &TcpRepr, payload: &[u8]) {
    if !accept_in_order(tcb, repr) {
        return;
    }
    deliver_payload(tcb, payload);

    let fin_acked = repr.flags.ack() && repr.ack_number == tcb.send.next;
    if repr.flags.ack() {
        process_ack(tcb, repr, payload.len());
    }

    if repr.flags.fin() {
        tcb.receive.next += 1;
        tcb.ack_pending = true;
        // With our FIN acknowledged in the same segment this is the end of
        // the exchange; otherwise both sides closed simultaneously.
        tcb.next_state = if fin_acked { State::TimeWait } else { State::Closing };
        tcb.activate();
    } else if fin_acked {
        // Nothing to announce, the transition is silent.
        tcb.state = State::FinWait2;
        tcb.next_state = State::FinWait2;
    }
}

fn on_fin_wait_2(tcb: &mut Tcb, repr: &TcpRepr, payload: &[u8]) {
    if !accept_in_order(tcb, repr) {
        return;
    }
    deliver_payload(tcb, payload);

    if repr.flags.fin() {
        tcb.receive.next += 1;
        tcb.ack_pending = true;
        tcb.next_state = State::TimeWait;
        tcb.activate();
    }
}

fn on_closing(tcb: &mut Tcb, repr: &TcpRepr) {
    if repr.flags.ack() && repr.ack_number == tcb.send.next {
        // TIME_WAIT is untimed and nothing is owed to the peer, collapse
        // right away.
        tcb.state = State::Closed;
        tcb.next_state = State::Closed;
    }
}

fn on_close_wait(tcb: &mut Tcb, repr: &TcpRepr, payload: &[u8]) {
    // The peer's FIN consumed its sequence number; anything in order from
    // here is acknowledgements of our remaining data. A retransmitted FIN
    // fails the sequence check and provokes the re-ACK it is after.
    if !accept_in_order(tcb, repr) {
        return;
    }
    if repr.flags.ack() {
        process_ack(tcb, repr, payload.len());
    }
}

fn on_last_ack(tcb: &mut Tcb, repr: &TcpRepr) {
    if repr.flags.ack() && repr.ack_number == tcb.send.next {
        tcb.state = State::Closed;
        tcb.next_state = State::Closed;
    }
}

/// Enforce exact in-order delivery.
///
/// There is no out-of-order buffer: a segment not starting at `RCV.NXT` is
/// dropped wholesale and the expected sequence number re-acknowledged, which
/// also answers retransmissions of data already received.
fn accept_in_order(tcb: &mut Tcb, repr: &TcpRepr) -> bool {
    if repr.seq_number == tcb.receive.next {
        return true;
    }
    debug!("[TCP] {} out-of-order seq={} (expected {}), re-acking",
           tcb.remote, repr.seq_number, tcb.receive.next);
    tcb.ack_pending = true;
    tcb.activate();
    false
}

/// Append in-order payload to the receive queue and schedule the ACK.
fn deliver_payload(tcb: &mut Tcb, payload: &[u8]) {
    if payload.is_empty() {
        return;
    }
    match tcb.receive_queue.push_back(payload.to_vec()) {
        Ok(()) => {
            tcb.receive.next += payload.len();
            trace!("[TCP] {} received {} octets", tcb.remote, payload.len());
        }
        Err(_) => {
            // Queue full: do not advance RCV.NXT, the re-ACK below makes
            // the peer retransmit once the application drained some data.
            warn!("[TCP] {} receive queue full, {} octets dropped",
                  tcb.remote, payload.len());
        }
    }
    tcb.ack_pending = true;
    tcb.activate();
}

/// Acknowledgement processing: duplicate ACK counting, fast
/// retransmit/recovery and window growth per RFC 5681.
fn process_ack(tcb: &mut Tcb, repr: &TcpRepr, payload_len: usize) {
    let ack = repr.ack_number;
    let window = repr.window_len as u32;

    let is_duplicate = ack == tcb.send.last_ack_no
        && payload_len == 0
        && window == tcb.send.window
        && !repr.flags.syn()
        && !repr.flags.fin();

    if is_duplicate {
        tcb.send.dupacks += 1;
        trace!("[TCP] {} duplicate ack #{} for {}", tcb.remote, tcb.send.dupacks, ack);
        if tcb.send.dupacks == 3 {
            tcb.enter_fast_recovery();
            let unacked = tcb.send.unacknowledged;
            tcb.retransmit_segment(unacked, Instant::now());
        } else if tcb.send.dupacks > 3 {
            tcb.inflate_window();
        }
        return;
    }

    if ack > tcb.send.last_ack_no {
        if ack > tcb.send.next {
            debug!("[TCP] {} ack {} beyond SND.NXT {}", tcb.remote, ack, tcb.send.next);
            return;
        }

        tcb.send.unacknowledged = ack;
        tcb.remove_acked_segments(ack);

        let was_in_recovery = tcb.send.dupacks >= 3;
        tcb.send.dupacks = 0;
        if tcb.send.cwnd > 0 {
            if was_in_recovery {
                tcb.deflate_window();
            } else if tcb.send.cwnd < tcb.send.ssthresh {
                // Slow start.
                tcb.send.cwnd += tcb.send.mss;
            } else {
                // Congestion avoidance.
                let increment = (tcb.send.mss * tcb.send.mss / tcb.send.cwnd).max(1);
                tcb.send.cwnd += increment;
            }
        }

        tcb.send.last_ack_no = ack;
        tcb.send.window = window;

        if !tcb.send_queue.is_empty() {
            tcb.activate();
        }
    } else if ack == tcb.send.last_ack_no {
        // Same acknowledgement with new data or a window change: not a
        // duplicate in the RFC 5681 sense, just absorb the update.
        tcb.send.window = window;
    }
}

/// Build the reset answering a segment that could not be admitted: no
/// matching connection, no listener, or a limit was reached.
///
/// Follows the RFC 793 reset generation rules for a closed connection and
/// never allocates a control block.
pub fn send_rst_reject(
    in_repr: &TcpRepr,
    payload_len: usize,
    remote: Endpoint,
    local: Endpoint,
) -> TcpSegment {
    let mut flags = TcpFlags::default();
    flags.set_rst(true);
    flags.set_ack(true);

    let seq_number = if in_repr.flags.ack() {
        in_repr.ack_number
    } else {
        TcpSeqNumber(0)
    };
    let ack_number = in_repr.seq_number + in_repr.sequence_len(payload_len);

    let repr = TcpRepr {
        src_port: local.port,
        dst_port: remote.port,
        seq_number,
        ack_number,
        flags,
        header_len: TCP_HEADER_LEN as u8,
        window_len: 0,
    };

    let mut buffer = PacketBuf::new(TCP_HEADER_LEN);
    repr.emit(buffer.as_mut_slice());
    tcp_fill_checksum(buffer.as_mut_slice(), local.addr, remote.addr);

    TcpSegment { remote, local, buffer }
}
