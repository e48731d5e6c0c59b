/*! Low-level packet access and construction.

The `wire` module deals with packet *representation*. Each header format
provides a `Repr` value type that can be `parse`d from a byte slice and
`emit`ted back into one, bit-exact per the corresponding RFC. Reprs never
store payloads; the byte region following the encoded header is the payload
and stays under the caller's control (see [`storage::PacketBuf`]).

In the `Repr` family, `parse()` never panics on untrusted input (all bounds
are checked and reported as [`Error`]), and `emit()` never panics as long as
the target slice holds at least `header_len()` octets.

[`storage::PacketBuf`]: ../storage/struct.PacketBuf.html
[`Error`]: enum.Error.html
*/
// Copyright (C) 2016 whitequark@whitequark.org
// Copyright (C) 2019 Andreas Molzer <andreas.molzer@tum.de>
//
// in parts from `smoltcp` originally distributed under 0-clause BSD

mod field {
    pub(crate) type Field = ::core::ops::Range<usize>;
    pub(crate) type Rest  = ::core::ops::RangeFrom<usize>;
}

mod arp;
mod error;
mod ethernet;
mod icmpv4;
mod ipv4;
mod tcp;

pub use self::error::{Error, Result};

pub use self::ethernet::{
    Address as EthernetAddress,
    EtherType as EthernetProtocol,
    Repr as EthernetRepr,
    HEADER_LEN as ETHERNET_HEADER_LEN};

pub use self::arp::{
    Hardware as ArpHardware,
    Operation as ArpOperation,
    Repr as ArpRepr,
    PACKET_LEN as ARP_PACKET_LEN};

pub use self::ipv4::{
    Address as Ipv4Address,
    Protocol as IpProtocol,
    Repr as Ipv4Repr,
    HEADER_LEN as IPV4_HEADER_LEN};

pub use self::icmpv4::{
    Message as Icmpv4Message,
    Repr as Icmpv4Repr,
    HEADER_LEN as ICMPV4_HEADER_LEN};

pub use self::tcp::{
    fill_checksum as tcp_fill_checksum,
    verify_checksum as tcp_verify_checksum,
    Flags as TcpFlags,
    Repr as TcpRepr,
    SeqNumber as TcpSeqNumber,
    HEADER_LEN as TCP_HEADER_LEN};
