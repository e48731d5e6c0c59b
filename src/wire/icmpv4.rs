use core::fmt;
use byteorder::{ByteOrder, NetworkEndian};

use super::ipv4::checksum;
use super::{Error, Result};

enum_with_unknown! {
    /// Internet Control Message Protocol v4 message type.
    pub enum Message(u8) {
        EchoReply   = 0,
        EchoRequest = 8,
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Message::EchoReply   => write!(f, "echo reply"),
            Message::EchoRequest => write!(f, "echo request"),
            Message::Unknown(id) => write!(f, "0x{:02x}", id),
        }
    }
}

mod field {
    use crate::wire::field::*;

    pub const TYPE:       usize = 0;
    pub const CODE:       usize = 1;
    pub const CHECKSUM:   Field = 2..4;
    pub const ECHO_IDENT: Field = 4..6;
    pub const ECHO_SEQNO: Field = 6..8;
    pub const ECHO_DATA:  Rest  = 8..;
}

/// The length of an ICMP echo header, in octets.
pub const HEADER_LEN: usize = field::ECHO_DATA.start;

/// A high-level representation of an ICMPv4 echo header.
///
/// Only the echo messages are representable; everything else this stack
/// neither answers nor originates. The echo data follows the header in the
/// carrying buffer and is not part of the representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repr {
    EchoRequest {
        ident: u16,
        seq_no: u16,
    },
    EchoReply {
        ident: u16,
        seq_no: u16,
    },
}

impl Repr {
    /// Parse an ICMPv4 echo message from `data`.
    ///
    /// `data` must cover the whole message including the echo payload since
    /// the checksum is computed over all of it.
    pub fn parse(data: &[u8]) -> Result<Repr> {
        if data.len() < HEADER_LEN {
            return Err(Error::Truncated);
        }
        if checksum::data(data) != !0 {
            return Err(Error::WrongChecksum);
        }

        let ident = NetworkEndian::read_u16(&data[field::ECHO_IDENT]);
        let seq_no = NetworkEndian::read_u16(&data[field::ECHO_SEQNO]);
        match (Message::from(data[field::TYPE]), data[field::CODE]) {
            (Message::EchoRequest, 0) => Ok(Repr::EchoRequest { ident, seq_no }),
            (Message::EchoReply, 0) => Ok(Repr::EchoReply { ident, seq_no }),
            _ => Err(Error::Unrecognized),
        }
    }

    /// Emit this header into the front of `data` and fill the checksum.
    ///
    /// The echo payload must already be in place behind the header since the
    /// checksum covers it.
    ///
    /// # Panics
    /// Panics if `data` is shorter than [`HEADER_LEN`].
    ///
    /// [`HEADER_LEN`]: constant.HEADER_LEN.html
    pub fn emit(&self, data: &mut [u8]) {
        let (msg_type, ident, seq_no) = match *self {
            Repr::EchoRequest { ident, seq_no } => (Message::EchoRequest, ident, seq_no),
            Repr::EchoReply { ident, seq_no } => (Message::EchoReply, ident, seq_no),
        };

        data[field::TYPE] = msg_type.into();
        data[field::CODE] = 0;
        NetworkEndian::write_u16(&mut data[field::CHECKSUM], 0);
        NetworkEndian::write_u16(&mut data[field::ECHO_IDENT], ident);
        NetworkEndian::write_u16(&mut data[field::ECHO_SEQNO], seq_no);

        let value = !checksum::data(data);
        NetworkEndian::write_u16(&mut data[field::CHECKSUM], value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static ECHO_BYTES: [u8; 12] =
        [0x08, 0x00, 0x8e, 0xfe,
         0x12, 0x34, 0xab, 0xcd,
         0xaa, 0x00, 0x00, 0xff];

    #[test]
    fn parse_echo_request() {
        let repr = Repr::parse(&ECHO_BYTES[..]).unwrap();
        assert_eq!(repr, Repr::EchoRequest { ident: 0x1234, seq_no: 0xabcd });
    }

    #[test]
    fn emit_round_trip() {
        let mut bytes = [0u8; 12];
        bytes[field::ECHO_DATA].copy_from_slice(&ECHO_BYTES[field::ECHO_DATA]);
        Repr::EchoRequest { ident: 0x1234, seq_no: 0xabcd }.emit(&mut bytes);
        assert_eq!(bytes, ECHO_BYTES);
    }

    #[test]
    fn parse_rejects_bad_checksum() {
        let mut bytes = ECHO_BYTES;
        bytes[11] ^= 0x01;
        assert_eq!(Repr::parse(&bytes), Err(Error::WrongChecksum));
    }
}
