#![allow(dead_code, missing_docs, clippy::unwrap_used)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use random_access_file::io::PositionalIo;
use random_access_file::lock::{LockKind, Locker};
use random_access_file::{FileOptions, HandleState, RandomAccessFile};

/// Options confined to `dir`.
pub fn options_in(dir: &Path) -> FileOptions {
    FileOptions::new().with_directory(dir)
}

/// A writable handle on `name` under `dir`.
pub fn handle_in(dir: &Path, name: &str) -> RandomAccessFile {
    RandomAccessFile::new(name, options_in(dir))
}

/// Poll `state()` until it reaches `want`, or panic after timeout.
///
/// Pool suspensions of busy handles are deferred to a spawned task.
pub async fn wait_for_state(file: &RandomAccessFile, want: HandleState) {
    for _ in 0..200 {
        if file.state().await == want {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("handle did not reach {want:?} within 1 second");
}

/// In-memory [`PositionalIo`] that records every read and can misbehave on request.
#[derive(Debug, Default)]
pub struct MockIo {
    data: Mutex<Vec<u8>>,
    /// Offsets of every `read_at` call, in call order.
    pub reads: Mutex<Vec<u64>>,
    /// Upper bound on bytes moved per call. Zero means unbounded.
    max_chunk: AtomicUsize,
    /// Sleep this many milliseconds inside every read.
    read_delay_ms: AtomicUsize,
    /// Every write reports zero bytes written.
    stall_writes: AtomicBool,
    /// Every read fails with `EIO`.
    fail_reads: AtomicBool,
    /// Every read returns `Interrupted` once before succeeding.
    interrupt_next: AtomicBool,
}

impl MockIo {
    pub fn with_data(data: impl Into<Vec<u8>>) -> Arc<Self> {
        Arc::new(Self {
            data: Mutex::new(data.into()),
            ..Self::default()
        })
    }

    pub fn set_max_chunk(&self, n: usize) {
        self.max_chunk.store(n, Ordering::Relaxed);
    }

    pub fn set_read_delay(&self, ms: usize) {
        self.read_delay_ms.store(ms, Ordering::Relaxed);
    }

    pub fn set_stall_writes(&self, stall: bool) {
        self.stall_writes.store(stall, Ordering::Relaxed);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Relaxed);
    }

    pub fn set_interrupt_next(&self, interrupt: bool) {
        self.interrupt_next.store(interrupt, Ordering::Relaxed);
    }

    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().unwrap().clone()
    }

    /// How many `read_at` calls started at `offset`.
    pub fn reads_at(&self, offset: u64) -> usize {
        self.reads
            .lock()
            .unwrap()
            .iter()
            .filter(|o| **o == offset)
            .count()
    }

    pub fn read_calls(&self) -> usize {
        self.reads.lock().unwrap().len()
    }

    fn chunk(&self, len: usize) -> usize {
        match self.max_chunk.load(Ordering::Relaxed) {
            0 => len,
            max => len.min(max),
        }
    }
}

impl PositionalIo for MockIo {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
        self.reads.lock().unwrap().push(offset);
        if self.interrupt_next.swap(false, Ordering::Relaxed) {
            return Err(std::io::ErrorKind::Interrupted.into());
        }
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(std::io::Error::from_raw_os_error(libc::EIO));
        }
        let delay = self.read_delay_ms.load(Ordering::Relaxed);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay as u64));
        }

        let data = self.data.lock().unwrap();
        let start = usize::try_from(offset).unwrap();
        if start >= data.len() {
            return Ok(0);
        }
        let n = self.chunk(buf.len().min(data.len() - start));
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> std::io::Result<usize> {
        if self.stall_writes.load(Ordering::Relaxed) {
            return Ok(0);
        }
        let mut data = self.data.lock().unwrap();
        let start = usize::try_from(offset).unwrap();
        let n = self.chunk(buf.len());
        if data.len() < start + n {
            data.resize(start + n, 0);
        }
        data[start..start + n].copy_from_slice(&buf[..n]);
        Ok(n)
    }
}

/// A [`Locker`] that grants or denies every request and counts them.
#[derive(Debug, Default)]
pub struct ScriptedLocker {
    pub deny: AtomicBool,
    pub attempts: Mutex<Vec<LockKind>>,
}

impl ScriptedLocker {
    pub fn denying() -> Arc<Self> {
        Arc::new(Self {
            deny: AtomicBool::new(true),
            attempts: Mutex::new(Vec::new()),
        })
    }

    pub fn granting() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl Locker for ScriptedLocker {
    fn try_lock(&self, _file: &std::fs::File, kind: LockKind) -> std::io::Result<bool> {
        self.attempts.lock().unwrap().push(kind);
        Ok(!self.deny.load(Ordering::Relaxed))
    }
}
