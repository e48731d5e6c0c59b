//! Owned storage primitives used by every queue in the stack.

mod buffer;
mod ring;

pub use self::buffer::PacketBuf;
pub use self::ring::Ring;
