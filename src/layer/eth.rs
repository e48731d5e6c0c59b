//! The Ethernet II layer.
use crate::storage::PacketBuf;
use crate::wire::{EthernetAddress, EthernetProtocol, EthernetRepr, ETHERNET_HEADER_LEN};

/// The Ethernet endpoint: owns the device's hardware address.
pub struct Endpoint {
    mac: EthernetAddress,
}

impl Endpoint {
    pub fn new(mac: EthernetAddress) -> Self {
        Endpoint { mac }
    }

    /// Our hardware address.
    pub fn mac(&self) -> EthernetAddress {
        self.mac
    }

    /// Whether an inbound frame is addressed to us.
    pub fn accepts(&self, repr: &EthernetRepr) -> bool {
        repr.dst_addr == self.mac || repr.dst_addr.is_broadcast()
    }

    /// Wrap a payload into a frame for `dst_addr`.
    pub fn encapsulate(
        &self,
        dst_addr: EthernetAddress,
        ethertype: EthernetProtocol,
        payload: &PacketBuf,
    ) -> PacketBuf {
        let repr = EthernetRepr {
            src_addr: self.mac,
            dst_addr,
            ethertype,
        };

        let mut frame = PacketBuf::new(ETHERNET_HEADER_LEN + payload.remaining());
        {
            let data = frame.as_mut_slice();
            repr.emit(data);
            payload.export(&mut data[ETHERNET_HEADER_LEN..]);
        }
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::EthernetRepr;

    const MAC: EthernetAddress = EthernetAddress([0x02, 0, 0, 0xaa, 0xbb, 0xcc]);

    #[test]
    fn accepts_own_and_broadcast() {
        let eth = Endpoint::new(MAC);
        let mut repr = EthernetRepr {
            src_addr: EthernetAddress([0x02, 0, 0, 1, 2, 3]),
            dst_addr: MAC,
            ethertype: EthernetProtocol::Ipv4,
        };
        assert!(eth.accepts(&repr));

        repr.dst_addr = EthernetAddress::BROADCAST;
        assert!(eth.accepts(&repr));

        repr.dst_addr = EthernetAddress([0x02, 0, 0, 9, 9, 9]);
        assert!(!eth.accepts(&repr));
    }

    #[test]
    fn encapsulate_prepends_header() {
        let eth = Endpoint::new(MAC);
        let payload = PacketBuf::from_vec(vec![0xde, 0xad, 0xbe, 0xef]);
        let frame = eth.encapsulate(
            EthernetAddress::BROADCAST, EthernetProtocol::Arp, &payload);

        let repr = EthernetRepr::parse(frame.as_slice()).unwrap();
        assert_eq!(repr.src_addr, MAC);
        assert_eq!(repr.ethertype, EthernetProtocol::Arp);
        assert_eq!(&frame.as_slice()[ETHERNET_HEADER_LEN..], &[0xde, 0xad, 0xbe, 0xef]);
    }
}
