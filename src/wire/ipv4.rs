use core::{fmt, str::FromStr};
use byteorder::{ByteOrder, NetworkEndian};

use super::{Error, Result};

enum_with_unknown! {
    /// IP datagram encapsulated protocol.
    pub enum Protocol(u8) {
        Icmp = 0x01,
        Tcp  = 0x06,
        Udp  = 0x11,
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Protocol::Icmp => write!(f, "ICMP"),
            Protocol::Tcp  => write!(f, "TCP"),
            Protocol::Udp  => write!(f, "UDP"),
            Protocol::Unknown(id) => write!(f, "0x{:02x}", id),
        }
    }
}

/// A four-octet IPv4 address.
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default)]
pub struct Address(pub [u8; 4]);

impl Address {
    /// An unspecified address.
    pub const UNSPECIFIED: Address = Address([0x00; 4]);

    /// The broadcast address.
    pub const BROADCAST: Address = Address([0xff; 4]);

    /// Construct an IPv4 address from parts.
    pub const fn new(a0: u8, a1: u8, a2: u8, a3: u8) -> Address {
        Address([a0, a1, a2, a3])
    }

    /// Construct an IPv4 address from a sequence of octets, in big-endian.
    ///
    /// # Panics
    /// The function panics if `data` is not four octets long.
    pub fn from_bytes(data: &[u8]) -> Address {
        let mut bytes = [0; 4];
        bytes.copy_from_slice(data);
        Address(bytes)
    }

    /// Return an IPv4 address as a sequence of octets, in big-endian.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Encode the address into a `u32` in network endian byte order.
    pub fn to_network_integer(self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    /// Query whether the address is an unicast address.
    pub fn is_unicast(&self) -> bool {
        !(self.is_broadcast() || self.is_multicast() || self.is_unspecified())
    }

    /// Query whether the address is the broadcast address.
    pub fn is_broadcast(&self) -> bool {
        self.0 == [255; 4]
    }

    /// Query whether the address is a multicast address.
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0xf0 == 224
    }

    /// Query whether the address falls into the "unspecified" range.
    pub fn is_unspecified(&self) -> bool {
        self.0[0] == 0
    }
}

impl From<std::net::Ipv4Addr> for Address {
    fn from(x: std::net::Ipv4Addr) -> Address {
        Address(x.octets())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let bytes = self.0;
        write!(f, "{}.{}.{}.{}", bytes[0], bytes[1], bytes[2], bytes[3])
    }
}

impl FromStr for Address {
    type Err = std::net::AddrParseError;

    fn from_str(src: &str) -> core::result::Result<Self, Self::Err> {
        src.parse::<std::net::Ipv4Addr>().map(Into::into)
    }
}

mod field {
    use crate::wire::field::*;

    pub const VER_IHL:  usize = 0;
    pub const DSCP_ECN: usize = 1;
    pub const LENGTH:   Field = 2..4;
    pub const IDENT:    Field = 4..6;
    pub const FLG_OFF:  Field = 6..8;
    pub const TTL:      usize = 8;
    pub const PROTOCOL: usize = 9;
    pub const CHECKSUM: Field = 10..12;
    pub const SRC_ADDR: Field = 12..16;
    pub const DST_ADDR: Field = 16..20;
    pub const PAYLOAD:  Rest  = 20..;
}

/// The length of an IPv4 header without options, in octets.
///
/// This stack neither emits nor accepts IPv4 options, so this is also the
/// only header length it deals in.
pub const HEADER_LEN: usize = field::PAYLOAD.start;

/// A high-level representation of an IPv4 header.
///
/// The fields not present here are fixed by this stack: version 4, no
/// options, no fragmentation, DSCP/ECN zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Repr {
    pub src_addr: Address,
    pub dst_addr: Address,
    pub protocol: Protocol,
    pub payload_len: usize,
    pub hop_limit: u8,
}

impl Repr {
    /// Parse an IPv4 header from the front of `data` and check its validity.
    ///
    /// Rejects datagrams with options ([`Error::Unsupported`]: emitting them
    /// is out of scope and accepting them would shift the payload), fragments
    /// (no reassembly) and bad header checksums.
    ///
    /// [`Error::Unsupported`]: enum.Error.html
    pub fn parse(data: &[u8]) -> Result<Repr> {
        if data.len() < HEADER_LEN {
            return Err(Error::Truncated);
        }
        if data[field::VER_IHL] >> 4 != 4 {
            return Err(Error::Unrecognized);
        }
        let header_len = ((data[field::VER_IHL] & 0x0f) as usize) * 4;
        if header_len < HEADER_LEN {
            return Err(Error::Malformed);
        }
        if header_len != HEADER_LEN {
            // Options present.
            return Err(Error::Unsupported);
        }
        let total_len = NetworkEndian::read_u16(&data[field::LENGTH]) as usize;
        if total_len < header_len || data.len() < total_len {
            return Err(Error::Truncated);
        }
        // More-fragments flag or a nonzero fragment offset.
        if NetworkEndian::read_u16(&data[field::FLG_OFF]) & 0x3fff != 0 {
            return Err(Error::Unsupported);
        }
        if checksum::data(&data[..header_len]) != !0 {
            return Err(Error::WrongChecksum);
        }

        Ok(Repr {
            src_addr: Address::from_bytes(&data[field::SRC_ADDR]),
            dst_addr: Address::from_bytes(&data[field::DST_ADDR]),
            protocol: Protocol::from(data[field::PROTOCOL]),
            payload_len: total_len - header_len,
            hop_limit: data[field::TTL],
        })
    }

    /// Emit this header into the front of `data`, filling the checksum.
    ///
    /// # Panics
    /// Panics if `data` is shorter than [`HEADER_LEN`].
    ///
    /// [`HEADER_LEN`]: constant.HEADER_LEN.html
    pub fn emit(&self, data: &mut [u8]) {
        data[field::VER_IHL] = 0x40 | (HEADER_LEN as u8 / 4);
        data[field::DSCP_ECN] = 0;
        NetworkEndian::write_u16(&mut data[field::LENGTH],
                                 (HEADER_LEN + self.payload_len) as u16);
        NetworkEndian::write_u16(&mut data[field::IDENT], 0);
        NetworkEndian::write_u16(&mut data[field::FLG_OFF], 0);
        data[field::TTL] = self.hop_limit;
        data[field::PROTOCOL] = self.protocol.into();
        NetworkEndian::write_u16(&mut data[field::CHECKSUM], 0);
        data[field::SRC_ADDR].copy_from_slice(self.src_addr.as_bytes());
        data[field::DST_ADDR].copy_from_slice(self.dst_addr.as_bytes());

        let value = !checksum::data(&data[..HEADER_LEN]);
        NetworkEndian::write_u16(&mut data[field::CHECKSUM], value);
    }
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "IPv4 src={} dst={} proto={} len={}",
               self.src_addr, self.dst_addr, self.protocol, self.payload_len)
    }
}

pub(crate) mod checksum {
    use byteorder::{ByteOrder, NetworkEndian};

    use super::{Address, Protocol};

    fn propagate_carries(word: u32) -> u16 {
        let sum = (word >> 16) + (word & 0xffff);
        ((sum >> 16) as u16) + (sum as u16)
    }

    /// Compute an RFC 1071 compliant checksum (without the final complement).
    pub(crate) fn data(mut data: &[u8]) -> u16 {
        let mut accum = 0;

        while data.len() >= 2 {
            accum += NetworkEndian::read_u16(data) as u32;
            data = &data[2..];
        }

        // The last remaining odd byte, if any.
        if let Some(&value) = data.first() {
            accum += (value as u32) << 8;
        }

        propagate_carries(accum)
    }

    /// Combine several RFC 1071 compliant checksums.
    pub(crate) fn combine(checksums: &[u16]) -> u16 {
        let mut accum: u32 = 0;
        for &word in checksums {
            accum += word as u32;
        }
        propagate_carries(accum)
    }

    /// Compute the IPv4 pseudo header checksum of a transport segment.
    pub(crate) fn pseudo_header(src_addr: &Address, dst_addr: &Address,
                                protocol: Protocol, length: u32) -> u16 {
        let mut proto_len = [0u8; 4];
        proto_len[1] = protocol.into();
        NetworkEndian::write_u16(&mut proto_len[2..4], length as u16);

        combine(&[
            data(src_addr.as_bytes()),
            data(dst_addr.as_bytes()),
            data(&proto_len[..]),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static HEADER_BYTES: [u8; 20] =
        [0x45, 0x00, 0x00, 0x1e,
         0x00, 0x00, 0x00, 0x00,
         0x40, 0x06, 0xf7, 0x25,
         0xc0, 0xa8, 0x01, 0x63,
         0xc0, 0xa8, 0x01, 0x01];

    fn repr() -> Repr {
        Repr {
            src_addr: Address::new(192, 168, 1, 99),
            dst_addr: Address::new(192, 168, 1, 1),
            protocol: Protocol::Tcp,
            payload_len: 10,
            hop_limit: 64,
        }
    }

    #[test]
    fn emit() {
        let mut bytes = [0u8; 20];
        repr().emit(&mut bytes);
        assert_eq!(bytes, HEADER_BYTES);
    }

    #[test]
    fn parse_round_trip() {
        let mut bytes = vec![0u8; 30];
        repr().emit(&mut bytes);
        assert_eq!(Repr::parse(&bytes).unwrap(), repr());
    }

    #[test]
    fn parse_rejects_bad_checksum() {
        let mut bytes = vec![0u8; 30];
        repr().emit(&mut bytes);
        bytes[10] ^= 0xff;
        assert_eq!(Repr::parse(&bytes), Err(Error::WrongChecksum));
    }

    #[test]
    fn parse_rejects_fragments() {
        let mut bytes = vec![0u8; 30];
        repr().emit(&mut bytes);
        // Set the more-fragments flag and refill the checksum.
        bytes[6] = 0x20;
        NetworkEndian::write_u16(&mut bytes[10..12], 0);
        let value = !checksum::data(&bytes[..20]);
        NetworkEndian::write_u16(&mut bytes[10..12], value);
        assert_eq!(Repr::parse(&bytes), Err(Error::Unsupported));
    }

    #[test]
    fn parse_rejects_truncated() {
        let mut bytes = vec![0u8; 30];
        repr().emit(&mut bytes);
        assert_eq!(Repr::parse(&bytes[..12]), Err(Error::Truncated));
        // Total length larger than the received data.
        assert_eq!(Repr::parse(&bytes[..24]), Err(Error::Truncated));
    }
}
