//! The ARP layer: answers who-has requests for our address and keeps the
//! neighbor cache consulted for outbound frames.
use std::collections::HashMap;

use log::{debug, trace};

use crate::storage::PacketBuf;
use crate::wire::{
    ArpOperation, ArpRepr, EthernetAddress, Ipv4Address, ARP_PACKET_LEN};

/// The ARP endpoint.
pub struct Endpoint {
    mac: EthernetAddress,
    addr: Ipv4Address,
    neighbors: HashMap<Ipv4Address, EthernetAddress>,
}

impl Endpoint {
    pub fn new(mac: EthernetAddress, addr: Ipv4Address) -> Self {
        Endpoint {
            mac,
            addr,
            neighbors: HashMap::new(),
        }
    }

    /// The hardware address a neighbor answered with, if any.
    pub fn lookup(&self, addr: Ipv4Address) -> Option<EthernetAddress> {
        self.neighbors.get(&addr).copied()
    }

    /// Record a neighbor mapping observed outside ARP itself.
    pub fn learn(&mut self, addr: Ipv4Address, mac: EthernetAddress) {
        if addr.is_unicast() && mac.is_unicast() {
            self.neighbors.insert(addr, mac);
        }
    }

    /// Process an inbound ARP packet.
    ///
    /// The sender mapping is learned from every valid packet. A request for
    /// our protocol address produces a reply, returned with the hardware
    /// address to frame it for.
    pub fn process(&mut self, packet: &[u8]) -> Option<(EthernetAddress, PacketBuf)> {
        let repr = match ArpRepr::parse(packet) {
            Ok(repr) => repr,
            Err(err) => {
                debug!("[ARP] unparseable packet: {}", err);
                return None;
            }
        };
        trace!("[ARP] {}", repr);

        self.learn(repr.source_protocol_addr, repr.source_hardware_addr);

        match repr.operation {
            ArpOperation::Request if repr.target_protocol_addr == self.addr => {
                let reply = ArpRepr {
                    operation: ArpOperation::Reply,
                    source_hardware_addr: self.mac,
                    source_protocol_addr: self.addr,
                    target_hardware_addr: repr.source_hardware_addr,
                    target_protocol_addr: repr.source_protocol_addr,
                };

                let mut buffer = PacketBuf::new(ARP_PACKET_LEN);
                reply.emit(buffer.as_mut_slice());
                Some((repr.source_hardware_addr, buffer))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUR_MAC: EthernetAddress = EthernetAddress([0x02, 0, 0, 0xaa, 0xbb, 0xcc]);
    const OUR_ADDR: Ipv4Address = Ipv4Address::new(192, 168, 1, 1);
    const PEER_MAC: EthernetAddress = EthernetAddress([0x02, 0, 0, 1, 2, 3]);
    const PEER_ADDR: Ipv4Address = Ipv4Address::new(192, 168, 1, 99);

    fn request(target: Ipv4Address) -> Vec<u8> {
        let repr = ArpRepr {
            operation: ArpOperation::Request,
            source_hardware_addr: PEER_MAC,
            source_protocol_addr: PEER_ADDR,
            target_hardware_addr: EthernetAddress::default(),
            target_protocol_addr: target,
        };
        let mut bytes = vec![0u8; ARP_PACKET_LEN];
        repr.emit(&mut bytes);
        bytes
    }

    #[test]
    fn answers_requests_for_our_address() {
        let mut arp = Endpoint::new(OUR_MAC, OUR_ADDR);
        let (dst, reply) = arp.process(&request(OUR_ADDR)).expect("a reply");

        assert_eq!(dst, PEER_MAC);
        let repr = ArpRepr::parse(reply.as_slice()).unwrap();
        assert_eq!(repr.operation, ArpOperation::Reply);
        assert_eq!(repr.source_hardware_addr, OUR_MAC);
        assert_eq!(repr.source_protocol_addr, OUR_ADDR);
        assert_eq!(repr.target_protocol_addr, PEER_ADDR);
    }

    #[test]
    fn ignores_requests_for_other_addresses() {
        let mut arp = Endpoint::new(OUR_MAC, OUR_ADDR);
        assert!(arp.process(&request(Ipv4Address::new(192, 168, 1, 2))).is_none());
        // The sender is still learned.
        assert_eq!(arp.lookup(PEER_ADDR), Some(PEER_MAC));
    }
}
