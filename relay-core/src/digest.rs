//! The null-delimited fingerprint builder (spec component C1) and its free-list pool.

use parking_lot::Mutex;
use std::sync::Arc;

/// A reusable scratch buffer that builds a null-delimited fingerprint of N strings.
///
/// Obtained from [`DigesterPool::acquire`], appended to via [`Digester::add`], read via
/// [`Digester::digest`], and returned via [`Digester::free`] (or automatically on drop,
/// whichever a caller prefers — both paths release back to the pool exactly once).
pub struct Digester {
    buffer: Vec<u8>,
    pool: Option<Arc<DigesterPoolInner>>,
}

impl Digester {
    /// A standalone digester not backed by any pool, for call sites that don't need
    /// pooling (tests, one-off fingerprints).
    pub fn new() -> Self {
        Self { buffer: Vec::new(), pool: None }
    }

    /// Appends a separator byte (if the buffer is already non-empty) followed by `s`'s
    /// bytes.
    pub fn add(&mut self, s: &str) -> &mut Self {
        if !self.buffer.is_empty() {
            self.buffer.push(0x00);
        }
        self.buffer.extend_from_slice(s.as_bytes());
        self
    }

    /// The current scratch buffer. Valid until the next mutating call on this digester.
    pub fn digest(&self) -> &[u8] {
        &self.buffer
    }

    /// Clears the buffer and returns this digester to its pool, if any.
    pub fn free(mut self) {
        self.buffer.clear();
        if let Some(pool) = self.pool.take() {
            pool.release(self.buffer.split_off(0));
        }
    }
}

impl Default for Digester {
    fn default() -> Self {
        Self::new()
    }
}

struct DigesterPoolInner {
    free: Mutex<Vec<Vec<u8>>>,
}

impl DigesterPoolInner {
    fn release(&self, buffer: Vec<u8>) {
        self.free.lock().push(buffer);
    }
}

/// A free list of reusable [`Digester`] scratch buffers, amortizing allocation across
/// calls on the same thread or task pool.
#[derive(Clone)]
pub struct DigesterPool {
    inner: Arc<DigesterPoolInner>,
}

impl DigesterPool {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DigesterPoolInner { free: Mutex::new(Vec::new()) }),
        }
    }

    /// Hands out a digester with a reset, zero-length scratch buffer, reusing a pooled
    /// buffer's capacity when one is available.
    pub fn acquire(&self) -> Digester {
        let buffer = self.inner.free.lock().pop().unwrap_or_default();
        Digester {
            buffer,
            pool: Some(self.inner.clone()),
        }
    }
}

impl Default for DigesterPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds the nine-component edge fingerprint described in spec.md §3 using a digester
/// drawn from `pool`, returning the fingerprint bytes as an owned `Vec<u8>` suitable for
/// use as a map key. The digester is freed back to the pool before returning.
pub fn fingerprint(pool: &DigesterPool, components: [&str; 9]) -> Vec<u8> {
    let mut digester = pool.acquire();
    for component in components {
        digester.add(component);
    }
    let key = digester.digest().to_vec();
    digester.free();
    key
}
