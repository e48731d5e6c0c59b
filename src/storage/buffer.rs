/// A fixed-capacity byte region with a movable cursor.
///
/// Inbound frames travel down the demultiplex chain in a `PacketBuf`: each
/// layer parses its header from the region behind the cursor and then
/// [`advance`]s past it, so the next layer starts at its own header. Outbound
/// packets are built by allocating a region of the final size and emitting
/// headers into it.
///
/// The region never grows or shrinks after allocation.
///
/// [`advance`]: #method.advance
#[derive(Debug, Clone)]
pub struct PacketBuf {
    data: Vec<u8>,
    cursor: usize,
}

impl PacketBuf {
    /// Allocate a zero-filled region of `len` octets with the cursor at the
    /// start.
    pub fn new(len: usize) -> Self {
        PacketBuf { data: vec![0; len], cursor: 0 }
    }

    /// Take ownership of an already filled region.
    pub fn from_vec(data: Vec<u8>) -> Self {
        PacketBuf { data, cursor: 0 }
    }

    /// Move the cursor forward by `count` octets, consuming a header.
    ///
    /// # Panics
    /// Panics if `count` exceeds [`remaining`].
    ///
    /// [`remaining`]: #method.remaining
    pub fn advance(&mut self, count: usize) {
        assert!(count <= self.remaining(), "cursor advanced past the end of the buffer");
        self.cursor += count;
    }

    /// The number of octets between the cursor and the end of the region.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }

    /// The region behind the cursor.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.cursor..]
    }

    /// The region behind the cursor, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data[self.cursor..]
    }

    /// Copy the region behind the cursor into `out`.
    ///
    /// Returns the number of octets copied, which is the smaller of
    /// [`remaining`] and `out.len()`.
    ///
    /// [`remaining`]: #method.remaining
    pub fn export(&self, out: &mut [u8]) -> usize {
        let count = self.remaining().min(out.len());
        out[..count].copy_from_slice(&self.as_slice()[..count]);
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_consumes_headers() {
        let mut buf = PacketBuf::from_vec(vec![1, 2, 3, 4, 5]);
        assert_eq!(buf.remaining(), 5);
        buf.advance(2);
        assert_eq!(buf.remaining(), 3);
        assert_eq!(buf.as_slice(), &[3, 4, 5]);
    }

    #[test]
    #[should_panic(expected = "cursor advanced past the end")]
    fn advance_past_end_panics() {
        let mut buf = PacketBuf::new(4);
        buf.advance(5);
    }

    #[test]
    fn export_copies_remaining() {
        let mut buf = PacketBuf::from_vec(vec![1, 2, 3, 4]);
        buf.advance(1);
        let mut out = [0u8; 8];
        assert_eq!(buf.export(&mut out), 3);
        assert_eq!(&out[..3], &[2, 3, 4]);

        let mut short = [0u8; 2];
        assert_eq!(buf.export(&mut short), 2);
        assert_eq!(short, [2, 3]);
    }
}
