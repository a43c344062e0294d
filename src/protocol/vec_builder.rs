//! Allocation guard for length-prefixed data.
//!
//! Lengths come straight off the wire, so a corrupt or hostile frame could ask
//! for gigabytes up front. [`VecBuilder`] only pre-allocates a bounded chunk and
//! grows as data actually arrives.

use std::io::Read;

/// Upper bound for the initial allocation.
const DEFAULT_BLOCK_SIZE: usize = 1024 * 16;

#[derive(Debug)]
pub struct VecBuilder<T> {
    inner: Vec<T>,
    remaining: usize,
}

impl<T> VecBuilder<T> {
    pub fn new(expected_len: usize) -> Self {
        let initial = expected_len.min(DEFAULT_BLOCK_SIZE);
        Self {
            inner: Vec::with_capacity(initial),
            remaining: expected_len,
        }
    }

    pub fn push(&mut self, v: T) {
        self.remaining = self.remaining.saturating_sub(1);
        self.inner.push(v);
    }
}

impl VecBuilder<u8> {
    /// Fill the remaining expected bytes from `reader`, block by block.
    pub fn read_exact<R: Read>(mut self, reader: &mut R) -> Result<Self, std::io::Error> {
        while self.remaining > 0 {
            let to_read = self.remaining.min(DEFAULT_BLOCK_SIZE);
            let start = self.inner.len();
            self.inner.resize(start + to_read, 0);
            reader.read_exact(&mut self.inner[start..])?;
            self.remaining -= to_read;
        }
        Ok(self)
    }
}

impl<T> From<VecBuilder<T>> for Vec<T> {
    fn from(builder: VecBuilder<T>) -> Self {
        builder.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn read_exact_in_blocks() {
        let data = vec![7u8; DEFAULT_BLOCK_SIZE * 2 + 3];
        let buf = VecBuilder::new(data.len())
            .read_exact(&mut Cursor::new(data.clone()))
            .unwrap();
        assert_eq!(Vec::from(buf), data);
    }

    #[test]
    fn huge_length_does_not_preallocate() {
        let builder = VecBuilder::<u8>::new(usize::MAX);
        let err = builder.read_exact(&mut Cursor::new(vec![1u8, 2, 3])).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }
}
