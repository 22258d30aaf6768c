use crate::buffer::Buffer;
use crate::diagnostics::DiagnosticSink;
use crate::error::{FileError, Operation, Result};
use crate::fs::guard::ContextGuard;
use crate::fs::native::NativeFile;
use crate::fs::pump::{ReadPump, WritePump};
use crate::fs::read_stream::{ReadState, ReadStream};
use crate::fs::write_stream::{WriteState, WriteStream};
use crate::options::OpenOptions;
use crate::runtime::context::Context;

use std::cell::RefCell;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};
use std::sync::Arc;

/// Callback receiving the outcome of a write, flush or close.
pub(crate) type DoneCallback = Box<dyn FnOnce(Result<()>)>;

/// Callback receiving the filled target buffer of a read.
pub(crate) type ReadCallback = Box<dyn FnOnce(Result<Buffer>)>;

/// Deferred close, run once outstanding operations have drained.
type CloseAction = Box<dyn FnOnce()>;

/// A non-blocking file handle pinned to the context that opened it.
///
/// Native calls run on the runtime's blocking pool; their results are
/// delivered to callbacks on the owning context, so callbacks may use the
/// handle freely. Every operation must itself be called on that context
/// and fails with [`FileError::ContextViolation`] otherwise, or with
/// [`FileError::IllegalState`] once the handle is closed.
///
/// Cloning yields another reference to the same handle. Streams do not
/// keep the handle alive: once every `AsyncFile` is dropped and no
/// operation is in flight, the descriptor is released and stream
/// registrations are dropped. Handlers that capture an `AsyncFile`
/// themselves keep it alive until [`close`](Self::close).
#[derive(Clone)]
pub struct AsyncFile {
    inner: Rc<FileInner>,
}

/// Non-owning reference to a handle, held by its streams.
#[derive(Clone)]
pub(crate) struct WeakFile {
    inner: Weak<FileInner>,
}

impl WeakFile {
    /// Fails with `IllegalState` once the handle has been dropped.
    pub(crate) fn upgrade(&self) -> Result<AsyncFile> {
        self.inner
            .upgrade()
            .map(|inner| AsyncFile { inner })
            .ok_or(FileError::IllegalState)
    }
}

struct FileInner {
    /// Owning context, captured at open.
    guard: ContextGuard,

    native: Arc<dyn NativeFile>,

    diagnostics: Arc<dyn DiagnosticSink>,

    path: PathBuf,

    /// Initial chunk size for the read stream.
    read_buffer_size: usize,

    /// Initial highwater mark for the write stream.
    write_queue_max_size: u64,

    state: RefCell<FileState>,
}

#[derive(Default)]
struct FileState {
    /// One-way; set by the first `close`.
    closed: bool,

    /// Bytes submitted for writing and not yet fully acknowledged.
    outstanding_write_bytes: u64,

    /// Reads and flushes still running on the pool.
    ops_in_flight: usize,

    pending_close: Option<CloseAction>,

    read_stream: Option<Rc<RefCell<ReadState>>>,
    write_stream: Option<Rc<RefCell<WriteState>>>,
}

impl AsyncFile {
    pub(crate) fn from_parts(
        guard: ContextGuard,
        path: PathBuf,
        native: Arc<dyn NativeFile>,
        options: &OpenOptions,
    ) -> Self {
        Self {
            inner: Rc::new(FileInner {
                guard,
                native,
                diagnostics: options.diagnostics_sink(),
                path,
                read_buffer_size: options.initial_read_buffer_size(),
                write_queue_max_size: options.initial_write_queue_max_size(),
                state: RefCell::new(FileState::default()),
            }),
        }
    }

    /// Fails unless called on the owning context of an open handle.
    pub(crate) fn downgrade(&self) -> WeakFile {
        WeakFile {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub(crate) fn check(&self) -> Result<()> {
        self.inner.guard.check()?;

        if self.inner.state.borrow().closed {
            return Err(FileError::IllegalState);
        }

        Ok(())
    }

    /// Writes `buffer` at `position`.
    ///
    /// The buffer's length counts towards
    /// [`outstanding_write_bytes`](Self::outstanding_write_bytes) from
    /// this call until every byte has been acknowledged by the OS. Short
    /// native writes are resubmitted for the remainder. `handler` receives
    /// `Ok(())` once the whole buffer is written, or the failure.
    pub fn write<F>(&self, buffer: Buffer, position: u64, handler: F) -> Result<&Self>
    where
        F: FnOnce(Result<()>) + 'static,
    {
        self.check()?;
        self.submit_write(buffer, position, Box::new(handler));

        Ok(self)
    }

    fn submit_write(&self, buffer: Buffer, position: u64, handler: DoneCallback) {
        let length = buffer.len() as u64;
        self.inner.state.borrow_mut().outstanding_write_bytes += length;

        let pump = WritePump::new(self.inner.native.clone(), buffer.into_vec(), position);

        self.run_blocking(
            move || pump.run(),
            move |file, outcome| file.complete_write(length, outcome, handler),
        );
    }

    fn complete_write(&self, length: u64, outcome: io::Result<()>, handler: DoneCallback) {
        {
            let mut state = self.inner.state.borrow_mut();
            state.outstanding_write_bytes = state.outstanding_write_bytes.saturating_sub(length);
        }

        let result = outcome.map_err(|source| FileError::io(Operation::Write, source));

        if let Err(err) = &result {
            tracing::debug!(path = %self.inner.path.display(), %err, "write failed");
        }

        handler(result);
        self.run_deferred_close();
    }

    /// Reads up to `length` bytes at `position` into `target` at `offset`.
    ///
    /// Short native reads are resubmitted until `length` bytes arrived or
    /// end of file is hit. `handler` gets `target` back with the bytes
    /// copied in; when nothing could be read `target` is unchanged, so an
    /// empty target comes back empty at end of file.
    ///
    /// Fails with `InvalidArgument` if `offset + length` does not fit in a
    /// buffer.
    pub fn read<F>(
        &self,
        target: Buffer,
        offset: usize,
        position: u64,
        length: usize,
        handler: F,
    ) -> Result<&Self>
    where
        F: FnOnce(Result<Buffer>) + 'static,
    {
        self.check()?;

        if offset
            .checked_add(length)
            .is_none_or(|end| end > isize::MAX as usize)
        {
            return Err(FileError::invalid_argument(format!(
                "read of {length} bytes at buffer offset {offset} is out of range"
            )));
        }

        self.submit_read(target, offset, position, length, Box::new(handler));

        Ok(self)
    }

    fn submit_read(
        &self,
        target: Buffer,
        offset: usize,
        position: u64,
        length: usize,
        handler: ReadCallback,
    ) {
        self.inner.state.borrow_mut().ops_in_flight += 1;

        let pump = ReadPump::new(self.inner.native.clone(), position, length);

        self.run_blocking(
            move || pump.run(),
            move |file, outcome| file.complete_read(target, offset, outcome, handler),
        );
    }

    fn complete_read(
        &self,
        mut target: Buffer,
        offset: usize,
        outcome: io::Result<Vec<u8>>,
        handler: ReadCallback,
    ) {
        self.inner.state.borrow_mut().ops_in_flight -= 1;

        let result = match outcome {
            Ok(bytes) if bytes.is_empty() => Ok(target),
            Ok(bytes) => {
                let copied = target.set_bytes(offset, &bytes).map(|_| ());
                copied.map(|()| target)
            }
            Err(source) => Err(FileError::io(Operation::Read, source)),
        };

        handler(result);
        self.run_deferred_close();
    }

    /// Forces written data to stable storage, off the context.
    ///
    /// A failure is reported to the handle's diagnostic sink.
    pub fn flush(&self) -> Result<&Self> {
        self.check()?;
        self.submit_flush(None);

        Ok(self)
    }

    /// Like [`flush`](Self::flush), delivering the outcome to `handler`.
    pub fn flush_with<F>(&self, handler: F) -> Result<&Self>
    where
        F: FnOnce(Result<()>) + 'static,
    {
        self.check()?;
        self.submit_flush(Some(Box::new(handler)));

        Ok(self)
    }

    fn submit_flush(&self, handler: Option<DoneCallback>) {
        self.inner.state.borrow_mut().ops_in_flight += 1;

        let native = self.inner.native.clone();

        self.run_blocking(
            move || native.sync_data(),
            move |file, outcome| {
                file.inner.state.borrow_mut().ops_in_flight -= 1;
                file.deliver(Operation::Flush, outcome, handler);
                file.run_deferred_close();
            },
        );
    }

    /// Closes the handle.
    ///
    /// No operation is accepted afterwards. If writes, reads or flushes
    /// are still running, the descriptor is closed once the last of them
    /// completes.
    pub fn close(&self) -> Result<()> {
        self.close_inner(None)
    }

    /// Like [`close`](Self::close); `handler` runs exactly once, after the
    /// descriptor is actually closed.
    pub fn close_with<F>(&self, handler: F) -> Result<()>
    where
        F: FnOnce(Result<()>) + 'static,
    {
        self.close_inner(Some(Box::new(handler)))
    }

    fn close_inner(&self, handler: Option<DoneCallback>) -> Result<()> {
        self.check()?;

        let mut state = self.inner.state.borrow_mut();
        state.closed = true;

        if state.outstanding_write_bytes == 0 && state.ops_in_flight == 0 {
            drop(state);
            self.do_close(handler);
        } else {
            tracing::debug!(
                path = %self.inner.path.display(),
                outstanding_write_bytes = state.outstanding_write_bytes,
                ops_in_flight = state.ops_in_flight,
                "close deferred"
            );

            let file = self.clone();
            state.pending_close = Some(Box::new(move || file.do_close(handler)));
        }

        Ok(())
    }

    fn run_deferred_close(&self) {
        let action = {
            let mut state = self.inner.state.borrow_mut();

            if state.closed && state.outstanding_write_bytes == 0 && state.ops_in_flight == 0 {
                state.pending_close.take()
            } else {
                None
            }
        };

        if let Some(action) = action {
            action();
        }
    }

    fn do_close(&self, handler: Option<DoneCallback>) {
        let native = self.inner.native.clone();

        self.run_blocking(
            move || native.close(),
            move |file, outcome| {
                file.teardown_streams();
                tracing::debug!(path = %file.inner.path.display(), "file closed");
                file.deliver(Operation::Close, outcome, handler);
            },
        );
    }

    /// Drops every stream registration once the descriptor is gone.
    fn teardown_streams(&self) {
        let (read, write) = {
            let mut state = self.inner.state.borrow_mut();
            (state.read_stream.take(), state.write_stream.take())
        };

        if let Some(read) = read {
            read.borrow_mut().teardown();
        }

        if let Some(write) = write {
            write.borrow_mut().teardown();
        }
    }

    fn deliver(&self, op: Operation, outcome: io::Result<()>, handler: Option<DoneCallback>) {
        let result = outcome.map_err(|source| FileError::io(op, source));

        match handler {
            Some(handler) => handler(result),
            None => {
                if let Err(err) = result {
                    self.inner.diagnostics.unhandled(&err);
                }
            }
        }
    }

    /// Runs `work` on the blocking pool, then `deliver` on the owning
    /// context with its outcome.
    fn run_blocking<T, W, D>(&self, work: W, deliver: D)
    where
        T: Send + 'static,
        W: FnOnce() -> T + Send + 'static,
        D: FnOnce(&AsyncFile, T) + 'static,
    {
        let home = self.inner.guard.bind((self.clone(), deliver));
        let context = self.inner.guard.context();
        let target = context.clone();

        context.spawn_blocking(move || {
            let outcome = work();

            target.execute(move || match home.into_inner() {
                Ok((file, deliver)) => deliver(&file, outcome),
                Err(err) => tracing::error!(%err, "completion dispatched to the wrong context"),
            });
        });
    }

    /// Returns the handle's write stream, creating it on first use.
    pub fn write_stream(&self) -> Result<WriteStream> {
        self.check()?;

        let highwater = self.inner.write_queue_max_size;
        let shared = self
            .inner
            .state
            .borrow_mut()
            .write_stream
            .get_or_insert_with(|| Rc::new(RefCell::new(WriteState::new(highwater))))
            .clone();

        Ok(WriteStream::new(self.downgrade(), shared))
    }

    /// Returns the handle's read stream, creating it on first use.
    pub fn read_stream(&self) -> Result<ReadStream> {
        self.check()?;

        let chunk_size = self.inner.read_buffer_size;
        let shared = self
            .inner
            .state
            .borrow_mut()
            .read_stream
            .get_or_insert_with(|| Rc::new(RefCell::new(ReadState::new(chunk_size))))
            .clone();

        Ok(ReadStream::new(self.downgrade(), shared))
    }

    /// Bytes submitted for writing and not yet fully acknowledged.
    pub fn outstanding_write_bytes(&self) -> u64 {
        self.inner.state.borrow().outstanding_write_bytes
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.borrow().closed
    }

    /// Path the handle was opened with; empty for wrapped backends.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// The context this handle is pinned to.
    pub fn context(&self) -> &Context {
        self.inner.guard.context()
    }

    pub(crate) fn diagnostics(&self) -> &Arc<dyn DiagnosticSink> {
        &self.inner.diagnostics
    }
}

impl Drop for FileInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();

        if !state.closed {
            tracing::debug!(path = %self.path.display(), "file handle dropped without close");
        }

        // Stream handlers usually capture their stream, which shares this
        // state; clearing them breaks the cycle.
        if let Some(read) = state.read_stream.take() {
            read.borrow_mut().teardown();
        }

        if let Some(write) = state.write_stream.take() {
            write.borrow_mut().teardown();
        }
    }
}

impl fmt::Debug for AsyncFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();

        f.debug_struct("AsyncFile")
            .field("path", &self.inner.path)
            .field("context", &self.inner.guard.context().id())
            .field("closed", &state.closed)
            .field("outstanding_write_bytes", &state.outstanding_write_bytes)
            .finish()
    }
}
