//! Shared test sink: a cloneable byte buffer the coordinator writes into
//! while the test keeps a handle for inspection.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct SharedSink {
    buf: Arc<Mutex<Vec<u8>>>,
    flushes: Arc<AtomicU64>,
}

impl SharedSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take_string(&self) -> String {
        let mut buf = self.buf.lock().unwrap();
        String::from_utf8_lossy(&std::mem::take(&mut *buf)).into_owned()
    }

    pub fn len(&self) -> usize {
        self.buf.lock().unwrap().len()
    }

    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }
}

impl Write for SharedSink {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.buf.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
