use core::{cmp, fmt, ops};
use byteorder::{ByteOrder, NetworkEndian};

use super::ipv4::{checksum, Address as Ipv4Address, Protocol};
use super::{Error, Result};

/// A TCP sequence number.
///
/// A sequence number is a monotonically advancing integer modulo 2<sup>32</sup>.
/// Sequence numbers do not have a discontiguity when compared pairwise across
/// a signed overflow.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Hash)]
pub struct SeqNumber(pub i32);

impl fmt::Display for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0 as u32)
    }
}

impl ops::Add<usize> for SeqNumber {
    type Output = SeqNumber;

    fn add(self, rhs: usize) -> SeqNumber {
        if rhs > i32::max_value() as usize {
            panic!("attempt to add to sequence number with unsigned overflow")
        }
        SeqNumber(self.0.wrapping_add(rhs as i32))
    }
}

impl ops::AddAssign<usize> for SeqNumber {
    fn add_assign(&mut self, rhs: usize) {
        *self = *self + rhs;
    }
}

impl ops::Sub for SeqNumber {
    type Output = usize;

    fn sub(self, rhs: SeqNumber) -> usize {
        let result = self.0.wrapping_sub(rhs.0);
        if result < 0 {
            panic!("attempt to subtract sequence numbers with underflow")
        }
        result as usize
    }
}

impl cmp::PartialOrd for SeqNumber {
    fn partial_cmp(&self, other: &SeqNumber) -> Option<cmp::Ordering> {
        self.0.wrapping_sub(other.0).partial_cmp(&0)
    }
}

mod field {
    #![allow(non_snake_case)]

    use crate::wire::field::*;

    pub const SRC_PORT: Field = 0..2;
    pub const DST_PORT: Field = 2..4;
    pub const SEQ_NUM:  Field = 4..8;
    pub const ACK_NUM:  Field = 8..12;
    pub const FLAGS:    Field = 12..14;
    pub const WIN_SIZE: Field = 14..16;
    pub const CHECKSUM: Field = 16..18;
    pub const URGENT:   Field = 18..20;

    pub const FLG_FIN: u16 = 0x001;
    pub const FLG_SYN: u16 = 0x002;
    pub const FLG_RST: u16 = 0x004;
    pub const FLG_PSH: u16 = 0x008;
    pub const FLG_ACK: u16 = 0x010;
    pub const FLG_URG: u16 = 0x020;
}

/// The length of a TCP header without options, in octets.
///
/// This stack never emits options; parsed options are skipped, not
/// interpreted.
pub const HEADER_LEN: usize = field::URGENT.end;

/// A set of tcp flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Flags(pub u16);

impl Flags {
    /// Return the FIN flag.
    #[inline]
    pub fn fin(&self) -> bool {
        self.0 & field::FLG_FIN != 0
    }

    /// Return the SYN flag.
    #[inline]
    pub fn syn(&self) -> bool {
        self.0 & field::FLG_SYN != 0
    }

    /// Return the RST flag.
    #[inline]
    pub fn rst(&self) -> bool {
        self.0 & field::FLG_RST != 0
    }

    /// Return the PSH flag.
    #[inline]
    pub fn psh(&self) -> bool {
        self.0 & field::FLG_PSH != 0
    }

    /// Return the ACK flag.
    #[inline]
    pub fn ack(&self) -> bool {
        self.0 & field::FLG_ACK != 0
    }

    /// Return the URG flag.
    #[inline]
    pub fn urg(&self) -> bool {
        self.0 & field::FLG_URG != 0
    }

    /// Set or clear the FIN flag.
    pub fn set_fin(&mut self, value: bool) {
        self.set(field::FLG_FIN, value)
    }

    /// Set or clear the SYN flag.
    pub fn set_syn(&mut self, value: bool) {
        self.set(field::FLG_SYN, value)
    }

    /// Set or clear the RST flag.
    pub fn set_rst(&mut self, value: bool) {
        self.set(field::FLG_RST, value)
    }

    /// Set or clear the PSH flag.
    pub fn set_psh(&mut self, value: bool) {
        self.set(field::FLG_PSH, value)
    }

    /// Set or clear the ACK flag.
    pub fn set_ack(&mut self, value: bool) {
        self.set(field::FLG_ACK, value)
    }

    fn set(&mut self, mask: u16, value: bool) {
        if value {
            self.0 |= mask;
        } else {
            self.0 &= !mask;
        }
    }

    /// The length the flags add to the sequence space.
    ///
    /// SYN and FIN each consume one unit of sequence space.
    pub fn sequence_len(&self) -> usize {
        usize::from(self.syn()) + usize::from(self.fin())
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for &(mask, name) in &[
            (field::FLG_SYN, "SYN"),
            (field::FLG_FIN, "FIN"),
            (field::FLG_RST, "RST"),
            (field::FLG_ACK, "ACK"),
            (field::FLG_PSH, "PSH"),
            (field::FLG_URG, "URG"),
        ] {
            if self.0 & mask != 0 {
                write!(f, "{} ", name)?;
            }
        }
        Ok(())
    }
}

/// A high-level representation of a TCP header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Repr {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq_number: SeqNumber,
    pub ack_number: SeqNumber,
    pub flags: Flags,
    /// Header length in octets, including options.
    ///
    /// `parse` reports the received value so callers can locate the payload;
    /// `emit` ignores it and always writes a bare [`HEADER_LEN`] header.
    ///
    /// [`HEADER_LEN`]: constant.HEADER_LEN.html
    pub header_len: u8,
    pub window_len: u16,
}

impl Repr {
    /// Parse a TCP header from the front of `data`.
    pub fn parse(data: &[u8]) -> Result<Repr> {
        if data.len() < HEADER_LEN {
            return Err(Error::Truncated);
        }
        let raw_flags = NetworkEndian::read_u16(&data[field::FLAGS]);
        let header_len = ((raw_flags >> 12) * 4) as usize;
        if header_len < HEADER_LEN {
            return Err(Error::Malformed);
        }
        if data.len() < header_len {
            return Err(Error::Truncated);
        }

        Ok(Repr {
            src_port: NetworkEndian::read_u16(&data[field::SRC_PORT]),
            dst_port: NetworkEndian::read_u16(&data[field::DST_PORT]),
            seq_number: SeqNumber(NetworkEndian::read_i32(&data[field::SEQ_NUM])),
            ack_number: SeqNumber(NetworkEndian::read_i32(&data[field::ACK_NUM])),
            flags: Flags(raw_flags & 0x1ff),
            header_len: header_len as u8,
            window_len: NetworkEndian::read_u16(&data[field::WIN_SIZE]),
        })
    }

    /// Emit this header into the front of `data`, without a checksum.
    ///
    /// Use [`fill_checksum`] on the complete segment afterwards.
    ///
    /// # Panics
    /// Panics if `data` is shorter than [`HEADER_LEN`].
    ///
    /// [`fill_checksum`]: fn.fill_checksum.html
    /// [`HEADER_LEN`]: constant.HEADER_LEN.html
    pub fn emit(&self, data: &mut [u8]) {
        NetworkEndian::write_u16(&mut data[field::SRC_PORT], self.src_port);
        NetworkEndian::write_u16(&mut data[field::DST_PORT], self.dst_port);
        NetworkEndian::write_i32(&mut data[field::SEQ_NUM], self.seq_number.0);
        NetworkEndian::write_i32(&mut data[field::ACK_NUM], self.ack_number.0);
        let raw = ((HEADER_LEN as u16 / 4) << 12) | (self.flags.0 & 0x1ff);
        NetworkEndian::write_u16(&mut data[field::FLAGS], raw);
        NetworkEndian::write_u16(&mut data[field::WIN_SIZE], self.window_len);
        NetworkEndian::write_u16(&mut data[field::CHECKSUM], 0);
        NetworkEndian::write_u16(&mut data[field::URGENT], 0);
    }

    /// The length this segment occupies in sequence space.
    ///
    /// `payload_len` is the number of octets following the header.
    pub fn sequence_len(&self, payload_len: usize) -> usize {
        payload_len + self.flags.sequence_len()
    }
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TCP {}->{} seq={} ack={} win={} {}",
               self.src_port, self.dst_port, self.seq_number, self.ack_number,
               self.window_len, self.flags)
    }
}

/// Compute and fill in the checksum of a complete TCP segment.
///
/// `data` must cover header and payload; the pseudo header is built from the
/// given addresses.
pub fn fill_checksum(data: &mut [u8], src_addr: Ipv4Address, dst_addr: Ipv4Address) {
    NetworkEndian::write_u16(&mut data[field::CHECKSUM], 0);
    let value = !checksum::combine(&[
        checksum::pseudo_header(&src_addr, &dst_addr, Protocol::Tcp, data.len() as u32),
        checksum::data(data),
    ]);
    NetworkEndian::write_u16(&mut data[field::CHECKSUM], value);
}

/// Validate the checksum of a complete TCP segment.
pub fn verify_checksum(data: &[u8], src_addr: Ipv4Address, dst_addr: Ipv4Address) -> bool {
    checksum::combine(&[
        checksum::pseudo_header(&src_addr, &dst_addr, Protocol::Tcp, data.len() as u32),
        checksum::data(data),
    ]) == !0
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC_ADDR: Ipv4Address = Ipv4Address::new(192, 168, 1, 99);
    const DST_ADDR: Ipv4Address = Ipv4Address::new(192, 168, 1, 1);

    fn repr() -> Repr {
        Repr {
            src_port: 48896,
            dst_port: 30000,
            seq_number: SeqNumber(0x01020304),
            ack_number: SeqNumber(0x0a0b0c0d),
            flags: {
                let mut flags = Flags::default();
                flags.set_ack(true);
                flags.set_psh(true);
                flags
            },
            header_len: HEADER_LEN as u8,
            window_len: 0xfaf0,
        }
    }

    #[test]
    fn emit_parse_round_trip() {
        let mut bytes = vec![0u8; HEADER_LEN + 5];
        bytes[HEADER_LEN..].copy_from_slice(b"hello");
        repr().emit(&mut bytes);
        fill_checksum(&mut bytes, SRC_ADDR, DST_ADDR);

        assert!(verify_checksum(&bytes, SRC_ADDR, DST_ADDR));
        assert_eq!(Repr::parse(&bytes).unwrap(), repr());
    }

    #[test]
    fn corrupted_payload_fails_checksum() {
        let mut bytes = vec![0u8; HEADER_LEN + 5];
        bytes[HEADER_LEN..].copy_from_slice(b"hello");
        repr().emit(&mut bytes);
        fill_checksum(&mut bytes, SRC_ADDR, DST_ADDR);

        bytes[HEADER_LEN] ^= 0x20;
        assert!(!verify_checksum(&bytes, SRC_ADDR, DST_ADDR));
    }

    #[test]
    fn parse_rejects_short_header_len() {
        let mut bytes = vec![0u8; HEADER_LEN];
        repr().emit(&mut bytes);
        // Claim a 4-octet header.
        bytes[12] = 0x10 | (bytes[12] & 0x0f);
        assert_eq!(Repr::parse(&bytes), Err(Error::Malformed));
    }

    #[test]
    fn seq_number_ordering_wraps() {
        let before = SeqNumber(i32::max_value());
        let after = before + 10;
        assert!(before < after);
        assert_eq!(after - before, 10);

        let zero = SeqNumber(0);
        let just_under = SeqNumber(-5);
        assert!(just_under < zero);
        assert_eq!(zero - just_under, 5);
    }

    #[test]
    fn flags_sequence_len() {
        let mut flags = Flags::default();
        assert_eq!(flags.sequence_len(), 0);
        flags.set_syn(true);
        assert_eq!(flags.sequence_len(), 1);
        flags.set_fin(true);
        assert_eq!(flags.sequence_len(), 2);
    }
}
