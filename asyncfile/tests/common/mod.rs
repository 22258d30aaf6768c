#![allow(dead_code)]

use asyncfile::{DiagnosticSink, FileError, NativeFile};

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, Once};
use std::time::{SystemTime, UNIX_EPOCH};

/// Installs a test-friendly `tracing` subscriber once per binary.
///
/// Set `RUST_LOG=asyncfile=trace` to see the pumps at work.
pub fn init_logging() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn unique_temp_path(tag: &str) -> PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let pid = std::process::id();
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);

    std::env::temp_dir().join(format!("asyncfile_{tag}_{pid}_{nanos}_{seq}"))
}

/// Removes the file when dropped.
pub struct TempFile(pub PathBuf);

impl TempFile {
    pub fn new(tag: &str) -> Self {
        Self(unique_temp_path(tag))
    }

    pub fn with_contents(tag: &str, contents: &[u8]) -> Self {
        let file = Self::new(tag);
        std::fs::write(&file.0, contents).expect("seed temp file");
        file
    }

    pub fn path(&self) -> PathBuf {
        self.0.clone()
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

/// A latch that blocks pool threads until released.
#[derive(Default)]
struct Gate {
    held: Mutex<bool>,
    condvar: Condvar,
}

impl Gate {
    fn hold(&self) {
        *self.held.lock().unwrap() = true;
    }

    fn release(&self) {
        *self.held.lock().unwrap() = false;
        self.condvar.notify_all();
    }

    fn wait(&self) {
        let mut held = self.held.lock().unwrap();
        while *held {
            held = self.condvar.wait(held).unwrap();
        }
    }
}

/// In-memory native file with knobs for short transfers, failures and
/// stalls, plus counters for what the handle asked of it.
pub struct MemoryFile {
    contents: Mutex<Vec<u8>>,

    /// Upper bound on bytes moved by a single call.
    max_chunk: AtomicUsize,

    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    fail_sync: AtomicBool,

    write_gate: Gate,
    read_gate: Gate,

    write_calls: AtomicUsize,
    read_calls: AtomicUsize,
    reads_in_flight: AtomicUsize,
    max_reads_in_flight: AtomicUsize,
    sync_calls: AtomicUsize,
    close_calls: AtomicUsize,
}

impl MemoryFile {
    pub fn new(contents: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            contents: Mutex::new(contents.to_vec()),
            max_chunk: AtomicUsize::new(usize::MAX),
            fail_writes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            fail_sync: AtomicBool::new(false),
            write_gate: Gate::default(),
            read_gate: Gate::default(),
            write_calls: AtomicUsize::new(0),
            read_calls: AtomicUsize::new(0),
            reads_in_flight: AtomicUsize::new(0),
            max_reads_in_flight: AtomicUsize::new(0),
            sync_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
        })
    }

    pub fn max_chunk(&self, n: usize) -> &Self {
        self.max_chunk.store(n, Ordering::SeqCst);
        self
    }

    pub fn fail_writes(&self, fail: bool) -> &Self {
        self.fail_writes.store(fail, Ordering::SeqCst);
        self
    }

    pub fn fail_reads(&self, fail: bool) -> &Self {
        self.fail_reads.store(fail, Ordering::SeqCst);
        self
    }

    pub fn fail_sync(&self, fail: bool) -> &Self {
        self.fail_sync.store(fail, Ordering::SeqCst);
        self
    }

    pub fn hold_writes(&self) {
        self.write_gate.hold();
    }

    pub fn release_writes(&self) {
        self.write_gate.release();
    }

    pub fn hold_reads(&self) {
        self.read_gate.hold();
    }

    pub fn release_reads(&self) {
        self.read_gate.release();
    }

    pub fn contents(&self) -> Vec<u8> {
        self.contents.lock().unwrap().clone()
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    pub fn max_reads_in_flight(&self) -> usize {
        self.max_reads_in_flight.load(Ordering::SeqCst)
    }

    pub fn sync_calls(&self) -> usize {
        self.sync_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

impl NativeFile for MemoryFile {
    fn read_at(&self, buffer: &mut [u8], position: u64) -> io::Result<usize> {
        let now = self.reads_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_reads_in_flight.fetch_max(now, Ordering::SeqCst);
        self.read_calls.fetch_add(1, Ordering::SeqCst);

        self.read_gate.wait();

        let result = if self.fail_reads.load(Ordering::SeqCst) {
            Err(io::Error::other("injected read failure"))
        } else {
            let contents = self.contents.lock().unwrap();
            let start = (position as usize).min(contents.len());
            let n = buffer
                .len()
                .min(self.max_chunk.load(Ordering::SeqCst))
                .min(contents.len() - start);

            buffer[..n].copy_from_slice(&contents[start..start + n]);
            Ok(n)
        };

        self.reads_in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn write_at(&self, buffer: &[u8], position: u64) -> io::Result<usize> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        self.write_gate.wait();

        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::StorageFull,
                "injected write failure",
            ));
        }

        let n = buffer.len().min(self.max_chunk.load(Ordering::SeqCst));
        let start = position as usize;
        let mut contents = self.contents.lock().unwrap();

        if contents.len() < start + n {
            contents.resize(start + n, 0);
        }

        contents[start..start + n].copy_from_slice(&buffer[..n]);
        Ok(n)
    }

    fn sync_data(&self) -> io::Result<()> {
        self.sync_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_sync.load(Ordering::SeqCst) {
            return Err(io::Error::other("injected sync failure"));
        }

        Ok(())
    }

    fn close(&self) -> io::Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Diagnostic sink that keeps every reported failure.
#[derive(Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl DiagnosticSink for RecordingSink {
    fn unhandled(&self, error: &FileError) {
        self.messages.lock().unwrap().push(error.to_string());
    }
}
