//! The IPv4 layer.
use crate::storage::PacketBuf;
use crate::wire::{IpProtocol, Ipv4Address, Ipv4Repr, IPV4_HEADER_LEN};

/// The hop limit on every emitted datagram.
pub const DEFAULT_TTL: u8 = 64;

/// The IPv4 endpoint: owns the host address.
pub struct Endpoint {
    addr: Ipv4Address,
}

impl Endpoint {
    pub fn new(addr: Ipv4Address) -> Self {
        Endpoint { addr }
    }

    /// Our protocol address.
    pub fn addr(&self) -> Ipv4Address {
        self.addr
    }

    /// Whether an inbound datagram is addressed to us.
    pub fn accepts(&self, repr: &Ipv4Repr) -> bool {
        repr.dst_addr == self.addr || repr.dst_addr.is_broadcast()
    }

    /// Wrap a payload into a datagram for `dst_addr`.
    pub fn encapsulate(
        &self,
        protocol: IpProtocol,
        dst_addr: Ipv4Address,
        payload: &PacketBuf,
    ) -> PacketBuf {
        let repr = Ipv4Repr {
            src_addr: self.addr,
            dst_addr,
            protocol,
            payload_len: payload.remaining(),
            hop_limit: DEFAULT_TTL,
        };

        let mut datagram = PacketBuf::new(IPV4_HEADER_LEN + payload.remaining());
        {
            let data = datagram.as_mut_slice();
            repr.emit(data);
            payload.export(&mut data[IPV4_HEADER_LEN..]);
        }
        datagram
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUR_ADDR: Ipv4Address = Ipv4Address::new(192, 168, 1, 1);

    #[test]
    fn encapsulate_round_trips() {
        let ip = Endpoint::new(OUR_ADDR);
        let payload = PacketBuf::from_vec(vec![1, 2, 3, 4, 5]);
        let datagram = ip.encapsulate(
            IpProtocol::Tcp, Ipv4Address::new(192, 168, 1, 99), &payload);

        let repr = Ipv4Repr::parse(datagram.as_slice()).unwrap();
        assert_eq!(repr.src_addr, OUR_ADDR);
        assert_eq!(repr.dst_addr, Ipv4Address::new(192, 168, 1, 99));
        assert_eq!(repr.protocol, IpProtocol::Tcp);
        assert_eq!(repr.payload_len, 5);
        assert_eq!(repr.hop_limit, DEFAULT_TTL);
        assert_eq!(&datagram.as_slice()[IPV4_HEADER_LEN..], &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn accepts_only_our_address() {
        let ip = Endpoint::new(OUR_ADDR);
        let mut repr = Ipv4Repr {
            src_addr: Ipv4Address::new(192, 168, 1, 99),
            dst_addr: OUR_ADDR,
            protocol: IpProtocol::Tcp,
            payload_len: 0,
            hop_limit: 64,
        };
        assert!(ip.accepts(&repr));

        repr.dst_addr = Ipv4Address::new(192, 168, 1, 50);
        assert!(!ip.accepts(&repr));

        repr.dst_addr = Ipv4Address::BROADCAST;
        assert!(ip.accepts(&repr));
    }
}
