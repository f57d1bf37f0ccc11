//! Block type and fixed-size block reading.

use std::io::{self, Read};

/// One contiguous chunk of the input plus its checksum once computed.
///
/// `index` is the block's position in the input (0-based). The checksum is
/// set exactly once by the worker that computes it.
#[derive(Debug)]
pub struct Block {
    index: u64,
    data: Vec<u8>,
    checksum: Option<u32>,
}

impl Block {
    pub fn new(index: u64, data: Vec<u8>) -> Self {
        Self {
            index,
            data,
            checksum: None,
        }
    }

    /// Position of this block in the input.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Number of bytes in this block.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Computed checksum; `None` until a worker has processed the block.
    pub fn checksum(&self) -> Option<u32> {
        self.checksum
    }

    pub(crate) fn set_checksum(&mut self, value: u32) {
        debug_assert!(self.checksum.is_none(), "block checksum set twice");
        self.checksum = Some(value);
    }
}

/// Reads the next block of up to `block_size` bytes.
///
/// Keeps reading until the block is full or the reader reports end of input,
/// so a short block is only ever produced at the end of the input. Returns
/// `Ok(None)` when no bytes remain.
pub fn read_block<R: Read + ?Sized>(
    reader: &mut R,
    block_size: usize,
    index: u64,
) -> io::Result<Option<Block>> {
    let mut data = vec![0u8; block_size];
    let mut filled = 0;
    while filled < block_size {
        match reader.read(&mut data[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    if filled == 0 {
        return Ok(None);
    }
    data.truncate(filled);
    Ok(Some(Block::new(index, data)))
}

/// Number of blocks (and output lines) for an input of `len` bytes.
/// Returns 0 if `block_size` is 0.
pub fn block_count(len: u64, block_size: usize) -> u64 {
    if block_size == 0 {
        return 0;
    }
    len.div_ceil(block_size as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Reader that hands out at most `step` bytes per call.
    struct Trickle {
        inner: Cursor<Vec<u8>>,
        step: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.step);
            self.inner.read(&mut buf[..n])
        }
    }

    #[test]
    fn read_block_full_then_short_then_none() {
        let mut r = Cursor::new((0u8..10).collect::<Vec<_>>());
        let b0 = read_block(&mut r, 4, 0).unwrap().unwrap();
        assert_eq!(b0.index(), 0);
        assert_eq!(b0.data(), &[0, 1, 2, 3]);
        let b1 = read_block(&mut r, 4, 1).unwrap().unwrap();
        assert_eq!(b1.data(), &[4, 5, 6, 7]);
        let b2 = read_block(&mut r, 4, 2).unwrap().unwrap();
        assert_eq!(b2.size(), 2);
        assert_eq!(b2.data(), &[8, 9]);
        assert!(read_block(&mut r, 4, 3).unwrap().is_none());
    }

    #[test]
    fn read_block_fills_across_short_reads() {
        let mut r = Trickle {
            inner: Cursor::new(vec![7u8; 10]),
            step: 3,
        };
        let b = read_block(&mut r, 8, 0).unwrap().unwrap();
        assert_eq!(b.size(), 8);
        let tail = read_block(&mut r, 8, 1).unwrap().unwrap();
        assert_eq!(tail.size(), 2);
    }

    #[test]
    fn read_block_empty_input() {
        let mut r = Cursor::new(Vec::<u8>::new());
        assert!(read_block(&mut r, 512, 0).unwrap().is_none());
    }

    #[test]
    fn new_block_has_no_checksum() {
        let mut b = Block::new(5, vec![1, 2, 3]);
        assert_eq!(b.checksum(), None);
        b.set_checksum(42);
        assert_eq!(b.checksum(), Some(42));
    }

    #[test]
    fn block_count_rounds_up() {
        assert_eq!(block_count(0, 512), 0);
        assert_eq!(block_count(512, 512), 1);
        assert_eq!(block_count(513, 512), 2);
        assert_eq!(block_count(1000, 0), 0);
    }
}
