use core::fmt;
use byteorder::{ByteOrder, NetworkEndian};

use super::ethernet::Address as EthernetAddress;
use super::ipv4::Address as Ipv4Address;
use super::{Error, Result};

enum_with_unknown! {
    /// ARP hardware type.
    pub enum Hardware(u16) {
        Ethernet = 1,
    }
}

enum_with_unknown! {
    /// ARP operation type.
    pub enum Operation(u16) {
        Request = 1,
        Reply = 2,
    }
}

mod field {
    use crate::wire::field::*;

    pub const HTYPE: Field = 0..2;
    pub const PTYPE: Field = 2..4;
    pub const HLEN:  usize = 4;
    pub const PLEN:  usize = 5;
    pub const OPER:  Field = 6..8;
    // Fixed offsets: this stack only speaks Ethernet/IPv4 ARP.
    pub const SHA: Field = 8..14;
    pub const SPA: Field = 14..18;
    pub const THA: Field = 18..24;
    pub const TPA: Field = 24..28;
}

/// The length of an Ethernet/IPv4 ARP packet, in octets.
pub const PACKET_LEN: usize = field::TPA.end;

const ETHERTYPE_IPV4: u16 = 0x0800;

/// A high-level representation of an Ethernet/IPv4 ARP packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Repr {
    pub operation: Operation,
    pub source_hardware_addr: EthernetAddress,
    pub source_protocol_addr: Ipv4Address,
    pub target_hardware_addr: EthernetAddress,
    pub target_protocol_addr: Ipv4Address,
}

impl Repr {
    /// Parse an ARP packet from the front of `data`.
    ///
    /// Anything but Ethernet/IPv4 ARP is rejected as [`Error::Unrecognized`].
    ///
    /// [`Error::Unrecognized`]: enum.Error.html
    pub fn parse(data: &[u8]) -> Result<Repr> {
        if data.len() < PACKET_LEN {
            return Err(Error::Truncated);
        }
        if Hardware::from(NetworkEndian::read_u16(&data[field::HTYPE])) != Hardware::Ethernet
            || NetworkEndian::read_u16(&data[field::PTYPE]) != ETHERTYPE_IPV4 {
            return Err(Error::Unrecognized);
        }
        if data[field::HLEN] != 6 || data[field::PLEN] != 4 {
            return Err(Error::Malformed);
        }

        Ok(Repr {
            operation: Operation::from(NetworkEndian::read_u16(&data[field::OPER])),
            source_hardware_addr: EthernetAddress::from_bytes(&data[field::SHA]),
            source_protocol_addr: Ipv4Address::from_bytes(&data[field::SPA]),
            target_hardware_addr: EthernetAddress::from_bytes(&data[field::THA]),
            target_protocol_addr: Ipv4Address::from_bytes(&data[field::TPA]),
        })
    }

    /// Emit this packet into the front of `data`.
    ///
    /// # Panics
    /// Panics if `data` is shorter than [`PACKET_LEN`].
    ///
    /// [`PACKET_LEN`]: constant.PACKET_LEN.html
    pub fn emit(&self, data: &mut [u8]) {
        NetworkEndian::write_u16(&mut data[field::HTYPE], Hardware::Ethernet.into());
        NetworkEndian::write_u16(&mut data[field::PTYPE], ETHERTYPE_IPV4);
        data[field::HLEN] = 6;
        data[field::PLEN] = 4;
        NetworkEndian::write_u16(&mut data[field::OPER], self.operation.into());
        data[field::SHA].copy_from_slice(self.source_hardware_addr.as_bytes());
        data[field::SPA].copy_from_slice(self.source_protocol_addr.as_bytes());
        data[field::THA].copy_from_slice(self.target_hardware_addr.as_bytes());
        data[field::TPA].copy_from_slice(self.target_protocol_addr.as_bytes());
    }
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.operation {
            Operation::Request => write!(f, "ARP who-has {} tell {}",
                                         self.target_protocol_addr, self.source_protocol_addr),
            Operation::Reply => write!(f, "ARP {} is-at {}",
                                       self.source_protocol_addr, self.source_hardware_addr),
            Operation::Unknown(op) => write!(f, "ARP op=0x{:04x}", op),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static PACKET_BYTES: [u8; 28] =
        [0x00, 0x01, 0x08, 0x00,
         0x06, 0x04, 0x00, 0x01,
         0x11, 0x12, 0x13, 0x14, 0x15, 0x16,
         0x21, 0x22, 0x23, 0x24,
         0x31, 0x32, 0x33, 0x34, 0x35, 0x36,
         0x41, 0x42, 0x43, 0x44];

    fn repr() -> Repr {
        Repr {
            operation: Operation::Request,
            source_hardware_addr: EthernetAddress([0x11, 0x12, 0x13, 0x14, 0x15, 0x16]),
            source_protocol_addr: Ipv4Address([0x21, 0x22, 0x23, 0x24]),
            target_hardware_addr: EthernetAddress([0x31, 0x32, 0x33, 0x34, 0x35, 0x36]),
            target_protocol_addr: Ipv4Address([0x41, 0x42, 0x43, 0x44]),
        }
    }

    #[test]
    fn parse() {
        assert_eq!(Repr::parse(&PACKET_BYTES[..]).unwrap(), repr());
    }

    #[test]
    fn emit_round_trip() {
        let mut bytes = [0u8; 28];
        repr().emit(&mut bytes);
        assert_eq!(bytes, PACKET_BYTES);
    }

    #[test]
    fn parse_rejects_non_ethernet() {
        let mut bytes = PACKET_BYTES;
        bytes[1] = 0x02;
        assert_eq!(Repr::parse(&bytes), Err(Error::Unrecognized));
    }
}
