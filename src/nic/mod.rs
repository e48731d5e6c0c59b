//! The tun/tap network device.
//!
//! One logical file descriptor carries raw Ethernet II frames between the
//! stack and the host kernel. The descriptor is opened non-blocking; the
//! event loop multiplexes on it with `poll(2)` (see [`sys::poll_device`]).
//!
//! [`sys::poll_device`]: sys/fn.poll_device.html

pub mod sys;
mod tap;

pub use self::tap::TapInterfaceDesc;
