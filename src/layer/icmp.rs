//! The ICMP layer: echo replies, nothing else.
use log::{debug, trace};

use crate::storage::PacketBuf;
use crate::wire::{Icmpv4Repr, ICMPV4_HEADER_LEN};

/// The ICMP endpoint. Stateless; it only mirrors echo requests.
pub struct Endpoint;

impl Endpoint {
    pub fn new() -> Self {
        Endpoint
    }

    /// Answer an inbound ICMP message.
    ///
    /// An echo request produces an echo reply carrying the same identifier,
    /// sequence number and payload. Everything else is dropped.
    pub fn process(&self, message: &[u8]) -> Option<PacketBuf> {
        let repr = match Icmpv4Repr::parse(message) {
            Ok(repr) => repr,
            Err(err) => {
                debug!("[ICMP] unparseable message: {}", err);
                return None;
            }
        };

        match repr {
            Icmpv4Repr::EchoRequest { ident, seq_no } => {
                trace!("[ICMP] echo request ident={} seq={}", ident, seq_no);
                let mut reply = PacketBuf::new(message.len());
                {
                    let data = reply.as_mut_slice();
                    data[ICMPV4_HEADER_LEN..].copy_from_slice(&message[ICMPV4_HEADER_LEN..]);
                    Icmpv4Repr::EchoReply { ident, seq_no }.emit(data);
                }
                Some(reply)
            }
            Icmpv4Repr::EchoReply { .. } => None,
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_request_is_mirrored() {
        let mut request = vec![0u8; ICMPV4_HEADER_LEN + 4];
        request[ICMPV4_HEADER_LEN..].copy_from_slice(b"ping");
        Icmpv4Repr::EchoRequest { ident: 7, seq_no: 3 }.emit(&mut request);

        let icmp = Endpoint::new();
        let reply = icmp.process(&request).expect("echo reply");

        let repr = Icmpv4Repr::parse(reply.as_slice()).unwrap();
        assert_eq!(repr, Icmpv4Repr::EchoReply { ident: 7, seq_no: 3 });
        assert_eq!(&reply.as_slice()[ICMPV4_HEADER_LEN..], b"ping");
    }

    #[test]
    fn echo_reply_is_dropped() {
        let mut reply = vec![0u8; ICMPV4_HEADER_LEN];
        Icmpv4Repr::EchoReply { ident: 7, seq_no: 3 }.emit(&mut reply);

        let icmp = Endpoint::new();
        assert!(icmp.process(&reply).is_none());
    }
}
