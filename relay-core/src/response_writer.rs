//! Pool-allocated wrapper capturing the application-error bit, application-error
//! metadata, and response byte count around a transport-supplied writer (spec
//! component C6).

use crate::error::{ApplicationErrorMeta, Code};
use crate::transport::ResponseWriter;
use parking_lot::Mutex;
use std::sync::Arc;

/// The observable state a [`ResponseWriterWrapper`] accumulates over the life of one
/// call. Exposed separately from the wrapper so tests can inspect it after the
/// underlying writer has been forwarded to and the wrapper freed.
#[derive(Clone, Debug, Default)]
pub struct ResponseWriterState {
    pub is_application_error: bool,
    pub application_error_meta: Option<ApplicationErrorMeta>,
    pub response_size: u64,
}

impl ResponseWriterState {
    fn reset(&mut self) {
        self.is_application_error = false;
        self.application_error_meta = None;
        self.response_size = 0;
    }
}

struct PoolInner {
    free: Mutex<Vec<ResponseWriterState>>,
}

/// A free list of [`ResponseWriterState`] values, handed out already reset to empty.
#[derive(Clone)]
pub struct ResponseWriterPool {
    inner: Arc<PoolInner>,
}

impl ResponseWriterPool {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(PoolInner { free: Mutex::new(Vec::new()) }),
        }
    }

    /// Wraps `writer`, backing it with a freshly-acquired (and guaranteed empty) state
    /// slot from this pool.
    pub fn wrap<W: ResponseWriter>(&self, writer: W) -> ResponseWriterWrapper<W> {
        let state = self.inner.free.lock().pop().unwrap_or_default();
        debug_assert!(!state.is_application_error && state.response_size == 0);
        ResponseWriterWrapper {
            writer,
            state,
            pool: self.inner.clone(),
        }
    }
}

impl Default for ResponseWriterPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Forwards every [`ResponseWriter`] method to the wrapped writer while tracking the
/// application-error bit, application-error metadata, and a running response byte
/// count. Call [`ResponseWriterWrapper::free`] on every exit path to return the state
/// slot to the pool, cleared.
pub struct ResponseWriterWrapper<W> {
    writer: W,
    state: ResponseWriterState,
    pool: Arc<PoolInner>,
}

impl<W> std::fmt::Debug for ResponseWriterWrapper<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseWriterWrapper").field("state", &self.state).finish_non_exhaustive()
    }
}

impl<W: ResponseWriter> ResponseWriterWrapper<W> {
    pub fn is_application_error(&self) -> bool {
        self.state.is_application_error
    }

    pub fn application_error_meta(&self) -> Option<&ApplicationErrorMeta> {
        self.state.application_error_meta.as_ref()
    }

    pub fn response_size(&self) -> u64 {
        self.state.response_size
    }

    /// Records the application-error bit and forwards to the underlying writer.
    pub fn set_application_error(&mut self) {
        self.state.is_application_error = true;
        self.writer.set_application_error();
    }

    /// Records application-error metadata and forwards to the underlying writer's
    /// optional setter, if it implements one.
    pub fn set_application_error_meta(&mut self, name: Option<String>, details: Option<String>, code: Option<Code>) {
        let meta = ApplicationErrorMeta { name, details, code };
        self.writer.set_application_error_meta(&meta);
        self.state.application_error_meta = Some(meta);
    }

    pub fn write(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.state.response_size += bytes.len() as u64;
        self.writer.write(bytes)
    }

    pub fn add_header(&mut self, name: &str, value: &str) {
        self.writer.add_header(name, value);
    }

    /// Clears the captured state and returns the slot to the pool. The underlying
    /// writer (owned by the caller's transport, not this wrapper) is untouched.
    pub fn free(mut self) {
        self.state.reset();
        self.pool.free.lock().push(self.state);
    }

    pub fn into_inner(self) -> W {
        // SAFETY-free: `self` is consumed, so there's nothing left to return to the
        // pool; this path is for callers that want the writer back without freeing
        // (e.g. to keep writing after the middleware's bookkeeping is done).
        self.writer
    }
}
