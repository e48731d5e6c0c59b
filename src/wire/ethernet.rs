use core::{fmt, str::FromStr};
use byteorder::{ByteOrder, NetworkEndian};

use super::{Error, Result};

enum_with_unknown! {
    /// Ethernet protocol type.
    pub enum EtherType(u16) {
        Ipv4 = 0x0800,
        Arp  = 0x0806,
    }
}

impl fmt::Display for EtherType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EtherType::Ipv4 => write!(f, "IPv4"),
            EtherType::Arp  => write!(f, "ARP"),
            EtherType::Unknown(id) => write!(f, "0x{:04x}", id),
        }
    }
}

/// A six-octet Ethernet II address.
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default)]
pub struct Address(pub [u8; 6]);

impl Address {
    /// The broadcast address.
    pub const BROADCAST: Address = Address([0xff; 6]);

    /// Construct an Ethernet address from a sequence of octets, in big-endian.
    ///
    /// # Panics
    /// The function panics if `data` is not six octets long.
    pub fn from_bytes(data: &[u8]) -> Address {
        let mut bytes = [0; 6];
        bytes.copy_from_slice(data);
        Address(bytes)
    }

    /// Return an Ethernet address as a sequence of octets, in big-endian.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Query whether the address is an unicast address.
    pub fn is_unicast(&self) -> bool {
        !(self.is_broadcast() || self.is_multicast())
    }

    /// Query whether this address is the broadcast address.
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Query whether the "multicast" bit in the OUI is set.
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let bytes = self.0;
        write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
               bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5])
    }
}

/// The error returned when an Ethernet address could not be parsed from text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParseAddressError;

impl fmt::Display for ParseAddressError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("invalid ethernet address syntax")
    }
}

impl FromStr for Address {
    type Err = ParseAddressError;

    fn from_str(src: &str) -> core::result::Result<Self, ParseAddressError> {
        let mut parsed = [0; 6];
        let mut components = src.split(':');
        for c in parsed.iter_mut() {
            let part = components.next().ok_or(ParseAddressError)?;
            *c = u8::from_str_radix(part, 16).map_err(|_| ParseAddressError)?;
        }

        if components.next().is_some() {
            return Err(ParseAddressError);
        }

        Ok(Address(parsed))
    }
}

mod field {
    use crate::wire::field::*;

    pub const DESTINATION: Field = 0..6;
    pub const SOURCE:      Field = 6..12;
    pub const ETHERTYPE:   Field = 12..14;
    pub const PAYLOAD:     Rest  = 14..;
}

/// The length of an Ethernet II header, in octets.
pub const HEADER_LEN: usize = field::PAYLOAD.start;

/// A high-level representation of an Ethernet II header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Repr {
    pub src_addr: Address,
    pub dst_addr: Address,
    pub ethertype: EtherType,
}

impl Repr {
    /// Parse an Ethernet II frame header from the front of `data`.
    pub fn parse(data: &[u8]) -> Result<Repr> {
        if data.len() < HEADER_LEN {
            return Err(Error::Truncated);
        }

        Ok(Repr {
            dst_addr: Address::from_bytes(&data[field::DESTINATION]),
            src_addr: Address::from_bytes(&data[field::SOURCE]),
            ethertype: EtherType::from(NetworkEndian::read_u16(&data[field::ETHERTYPE])),
        })
    }

    /// Emit this header into the front of `data`.
    ///
    /// # Panics
    /// Panics if `data` is shorter than [`HEADER_LEN`].
    ///
    /// [`HEADER_LEN`]: constant.HEADER_LEN.html
    pub fn emit(&self, data: &mut [u8]) {
        data[field::DESTINATION].copy_from_slice(self.dst_addr.as_bytes());
        data[field::SOURCE].copy_from_slice(self.src_addr.as_bytes());
        NetworkEndian::write_u16(&mut data[field::ETHERTYPE], self.ethertype.into());
    }
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "EthernetII src={} dst={} type={}",
               self.src_addr, self.dst_addr, self.ethertype)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static FRAME_BYTES: [u8; 14] =
        [0x01, 0x02, 0x03, 0x04, 0x05, 0x06,
         0x11, 0x12, 0x13, 0x14, 0x15, 0x16,
         0x08, 0x00];

    #[test]
    fn parse() {
        let repr = Repr::parse(&FRAME_BYTES[..]).unwrap();
        assert_eq!(repr.dst_addr, Address([0x01, 0x02, 0x03, 0x04, 0x05, 0x06]));
        assert_eq!(repr.src_addr, Address([0x11, 0x12, 0x13, 0x14, 0x15, 0x16]));
        assert_eq!(repr.ethertype, EtherType::Ipv4);
    }

    #[test]
    fn emit_round_trip() {
        let repr = Repr::parse(&FRAME_BYTES[..]).unwrap();
        let mut bytes = [0u8; 14];
        repr.emit(&mut bytes);
        assert_eq!(bytes, FRAME_BYTES);
    }

    #[test]
    fn truncated() {
        assert_eq!(Repr::parse(&FRAME_BYTES[..13]), Err(Error::Truncated));
    }

    #[test]
    fn address_from_str() {
        assert_eq!("02:00:00:aa:bb:cc".parse(),
                   Ok(Address([0x02, 0x00, 0x00, 0xaa, 0xbb, 0xcc])));
        assert!("02:00:00:aa:bb".parse::<Address>().is_err());
        assert!("02:00:00:aa:bb:cc:dd".parse::<Address>().is_err());
        assert!("02:00:00:aa:bb:zz".parse::<Address>().is_err());
    }
}
