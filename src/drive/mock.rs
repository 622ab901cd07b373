// In-memory transport for exercising the hardware backend without a robot

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use super::transport::Transport;
use crate::error::{Error, Result};

type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

/// Transport that answers each write through a responder closure.
///
/// Clones share state, so a test can hand one clone to the backend and keep
/// another to inspect what was written.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockInner>>,
}

struct MockInner {
    responder: Responder,
    pending: VecDeque<u8>,
    writes: Vec<Vec<u8>>,
    fail_writes: bool,
}

impl MockTransport {
    /// A link that never answers
    pub fn new() -> Self {
        Self::with_responder(|_| Vec::new())
    }

    /// The responder sees every write and returns the bytes the robot replies with
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: FnMut(&[u8]) -> Vec<u8> + Send + 'static,
    {
        Self {
            inner: Arc::new(Mutex::new(MockInner {
                responder: Box::new(responder),
                pending: VecDeque::new(),
                writes: Vec::new(),
                fail_writes: false,
            })),
        }
    }

    /// Every write call so far, one entry per call
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.lock().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.lock().writes.clear();
    }

    /// Make subsequent writes fail with an I/O error
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    fn lock(&self) -> MutexGuard<'_, MockInner> {
        // A panicking test thread must not hide the log from the others
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        let mut inner = self.lock();
        if inner.fail_writes {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock link down",
            )));
        }
        inner.writes.push(data.to_vec());
        let reply = (inner.responder)(data);
        inner.pending.extend(reply);
        Ok(())
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut inner = self.lock();
        let n = inner.pending.len().min(buffer.len());
        for (slot, byte) in buffer.iter_mut().zip(inner.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn clear_input(&mut self) -> Result<()> {
        self.lock().pending.clear();
        Ok(())
    }
}
