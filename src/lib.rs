//! A userspace TCP/IP stack on top of a tun/tap device.
//!
//! The stack attaches to a virtual layer-2 device and implements enough of
//! Ethernet, ARP, IPv4, ICMP echo and TCP for a real host kernel on the other
//! side of the link to open byte-stream connections against it. Everything
//! runs on one thread: a single `poll` loop over the tap file descriptor
//! drives inbound demultiplexing, the TCP state machines and outbound
//! transmission, and wakes application callbacks when sockets become readable
//! or acceptable.
//!
//! ## Structure
//!
//! * [`wire`] — bit-exact header parsing and emission for all carried
//!   protocols, operating on plain byte slices.
//! * [`storage`] — the owned packet buffer and the bounded ring queue that
//!   every queue in the stack is built from.
//! * [`nic`] — the tap device itself plus the thin libc wrappers around it.
//! * [`layer`] — the Ethernet/ARP/IPv4/ICMP demultiplex chain.
//! * [`tcp`] — the core: connection control blocks, the segment state
//!   machine, Reno congestion control and the connection manager.
//! * [`socket`] — the `socket`/`listen`/`accept`/`read`/`write` facade.
//! * [`event`] — the poll loop and the readiness bridge to user callbacks.
//! * [`stack`] — explicit wiring of all of the above into one value.
//!
//! Nothing in here is thread-safe by design; the whole stack is owned by the
//! event loop thread and shared handles are `Rc`, not `Arc`.

#[macro_use]
mod macros;

pub mod event;
pub mod layer;
pub mod nic;
pub mod socket;
pub mod stack;
pub mod storage;
pub mod tcp;
pub mod time;
pub mod wire;
