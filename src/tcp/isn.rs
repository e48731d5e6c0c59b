//! Initial sequence number generation, as recommended by rfc6528.
//!
//! Uses a keyed cryptographic hash function (SipHash-2-4) instead of
//! appending the secret key to the four tuple for hashing. Hash function
//! SipHash-2-4 from:
//!
//! > SipHash: a fast short-input PRF, Jean-Philippe Aumasson and Daniel J. Bernstein
use crate::nic::sys::fill_entropy;
use crate::time::Instant;
use crate::wire::TcpSeqNumber;

use super::ConnectionKey;

/// Generates unguessable initial sequence numbers per connection tuple.
pub struct IsnGenerator {
    keys: (u64, u64),
}

// Yes, that's the initial values.
const IV: [&[u8; 8]; 4] = [
    b"somepseu",
    b"dorandom",
    b"lygenera",
    b"tedbytes"];

struct State {
    v0: u64,
    v1: u64,
    v2: u64,
    v3: u64,
}

impl IsnGenerator {
    /// Create a generator keyed from operating system entropy.
    pub fn from_entropy() -> Self {
        let mut bytes = [0u8; 16];
        fill_entropy(&mut bytes);
        let mut k0 = [0u8; 8];
        let mut k1 = [0u8; 8];
        k0.copy_from_slice(&bytes[..8]);
        k1.copy_from_slice(&bytes[8..]);
        Self::with_keys(u64::from_ne_bytes(k0), u64::from_ne_bytes(k1))
    }

    /// Create a generator with a fixed key, for reproducible tests.
    pub fn with_keys(k0: u64, k1: u64) -> Self {
        IsnGenerator { keys: (k0, k1) }
    }

    /// Get the initial sequence number for a connection.
    ///
    /// The value varies every 4ms and with the secret key, so two incarnations
    /// of the same tuple do not collide in sequence space.
    pub fn get_isn(&self, connection: &ConnectionKey, time: Instant) -> TcpSeqNumber {
        let mut state = State::init(self.keys.0, self.keys.1);

        let m = u64::from(connection.local.addr.to_network_integer())
            | u64::from(connection.remote.addr.to_network_integer()) << 32;
        let p = u64::from(connection.local.port)
            | u64::from(connection.remote.port) << 16
            // Message length = 12
            | 12_u64 << 56;
        state.absorb(m);
        state.absorb(p);
        let num = state.finalize();

        // The hash is offset by a clock ticking every 4 milliseconds, modulo
        // the sequence space.
        let ticks = (time.total_millis() / 4) as u32;
        TcpSeqNumber((num as i32).wrapping_add(ticks as i32))
    }
}

impl State {
    const SIP_C: usize = 2;
    const SIP_D: usize = 4;

    fn init(k0: u64, k1: u64) -> Self {
        State {
            v0: u64::from_be_bytes(*IV[0]) ^ k0,
            v1: u64::from_be_bytes(*IV[1]) ^ k1,
            v2: u64::from_be_bytes(*IV[2]) ^ k0,
            v3: u64::from_be_bytes(*IV[3]) ^ k1,
        }
    }

    fn round(&mut self) {
        self.v0 = self.v0.wrapping_add(self.v1);
        self.v1 = self.v1.rotate_left(13);
        self.v1 ^= self.v0;
        self.v0 = self.v0.rotate_left(32);
        self.v2 = self.v2.wrapping_add(self.v3);
        self.v3 = self.v3.rotate_left(16);
        self.v3 ^= self.v2;
        self.v0 = self.v0.wrapping_add(self.v3);
        self.v3 = self.v3.rotate_left(21);
        self.v3 ^= self.v0;
        self.v2 = self.v2.wrapping_add(self.v1);
        self.v1 = self.v1.rotate_left(17);
        self.v1 ^= self.v2;
        self.v2 = self.v2.rotate_left(32);
    }

    /// Process a single portion of the message.
    fn absorb(&mut self, m: u64) {
        self.v3 ^= m;
        (0..Self::SIP_C).for_each(|_| self.round());
        self.v0 ^= m;
    }

    fn finalize(mut self) -> u64 {
        self.v2 ^= 0xff;
        (0..Self::SIP_D).for_each(|_| self.round());
        self.v0 ^ self.v1 ^ self.v2 ^ self.v3
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tcp::Endpoint;
    use crate::wire::Ipv4Address;

    /// See the paper, Appendix A.
    #[test]
    fn manual_test_vectors() {
        let k0 = u64::from_le_bytes(0x0001020304050607_u64.to_be_bytes());
        let k1 = u64::from_le_bytes(0x08090a0b0c0d0e0f_u64.to_be_bytes());

        let mut state = State::init(k0, k1);
        let m0 = u64::from_le_bytes(0x0001020304050607_u64.to_be_bytes());
        state.absorb(m0);
        let m1 = u64::from_le_bytes(0x08090a0b0c0d0e0f_u64.to_be_bytes());
        state.absorb(m1);

        assert_eq!(state.finalize(), 0xa129ca6149be45e5);
    }

    #[test]
    fn tuples_get_distinct_isns() {
        let gen = IsnGenerator::with_keys(0x1234, 0x5678);
        let local = Endpoint::new(Ipv4Address::new(192, 168, 1, 1), 30000);
        let a = ConnectionKey {
            remote: Endpoint::new(Ipv4Address::new(192, 168, 1, 99), 40000),
            local,
        };
        let b = ConnectionKey {
            remote: Endpoint::new(Ipv4Address::new(192, 168, 1, 99), 40001),
            local,
        };

        let now = Instant::from_millis(0);
        assert_ne!(gen.get_isn(&a, now), gen.get_isn(&b, now));
        // Stable for the same tuple and time.
        assert_eq!(gen.get_isn(&a, now), gen.get_isn(&a, now));
    }
}
