//! Shared helpers for pipeline integration tests.

#![allow(dead_code)]

use bsum_core::checksum::crc32;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Deterministic pseudo-random bytes (xorshift), so inputs are not periodic.
pub fn test_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut x = seed | 1;
    (0..len)
        .map(|_| {
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            (x >> 24) as u8
        })
        .collect()
}

/// Write `data` to `name` inside `dir` and return the path.
pub fn write_input(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    path
}

/// Output the pipeline must produce for `data` with blocks of `block_size`.
pub fn expected_output(data: &[u8], block_size: usize) -> String {
    data.chunks(block_size)
        .map(|c| format!("{:08x}\n", crc32(c)))
        .collect()
}

/// `Write` sink whose bytes stay readable after the pipeline drops its handle.
#[derive(Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Reader that serves `data` then fails instead of reporting end of input.
pub struct FailingReader {
    data: io::Cursor<Vec<u8>>,
}

impl FailingReader {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data: io::Cursor::new(data),
        }
    }
}

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.data.read(buf)? {
            0 => Err(io::Error::new(io::ErrorKind::Other, "medium error")),
            n => Ok(n),
        }
    }
}

/// Sink that accepts `budget` bytes, then fails every write.
pub struct FailingWriter {
    inner: SharedBuf,
    budget: usize,
}

impl FailingWriter {
    pub fn new(inner: SharedBuf, budget: usize) -> Self {
        Self { inner, budget }
    }
}

impl Write for FailingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.len() > self.budget {
            return Err(io::Error::new(io::ErrorKind::Other, "no space left"));
        }
        self.budget -= buf.len();
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Sink that sleeps before every write, so queued output lags behind hashing.
pub struct SlowSink {
    inner: SharedBuf,
    delay: Duration,
}

impl SlowSink {
    pub fn new(inner: SharedBuf, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

impl Write for SlowSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        std::thread::sleep(self.delay);
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
