use crate::buffer::Buffer;
use crate::error::{FileError, Result};
use crate::fs::AsyncFile;
use crate::fs::file::WeakFile;
use crate::fs::stream::{FileStream, Handler, handler, report};

use std::cell::RefCell;
use std::rc::Rc;

/// Mutable state of a write stream, owned by its file handle.
pub(crate) struct WriteState {
    /// File position of the next write; advanced at submission.
    cursor: u64,

    /// Queue is full at or above this many outstanding bytes.
    highwater: u64,

    /// Drain fires at or below this many outstanding bytes.
    lowwater: u64,

    /// Single-shot; cleared when fired.
    drain: Option<Box<dyn FnOnce()>>,

    exception: Option<Handler<FileError>>,
}

impl WriteState {
    pub(crate) fn new(highwater: u64) -> Self {
        Self {
            cursor: 0,
            highwater,
            lowwater: highwater / 2,
            drain: None,
            exception: None,
        }
    }

    pub(crate) fn teardown(&mut self) {
        self.drain = None;
        self.exception = None;
    }
}

/// Sequential, flow-controlled writer over an [`AsyncFile`].
///
/// Each [`write`](Self::write) lands right after the previous one: the
/// stream position advances when a write is submitted, not when it
/// completes, so file order follows submission order even though
/// completions may arrive in any order.
///
/// Backpressure follows the handle's outstanding write bytes: the queue
/// is full at the highwater mark and drained again at half of it.
///
/// ```rust,ignore
/// fn pump(stream: &WriteStream, chunk: Buffer) -> asyncfile::Result<()> {
///     stream.write(chunk)?;
///     if stream.write_queue_full()? {
///         let resume = stream.clone();
///         stream.drain_handler(move || produce_more(&resume))?;
///     }
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct WriteStream {
    file: WeakFile,
    state: Rc<RefCell<WriteState>>,
}

impl WriteStream {
    pub(crate) fn new(file: WeakFile, state: Rc<RefCell<WriteState>>) -> Self {
        Self { file, state }
    }

    /// The live handle, checked for context and closed state.
    fn handle(&self) -> Result<AsyncFile> {
        let file = self.file.upgrade()?;
        file.check()?;

        Ok(file)
    }

    /// Queues `buffer` at the stream position and advances it.
    ///
    /// Failures are delivered to the exception handler.
    pub fn write(&self, buffer: Buffer) -> Result<&Self> {
        let file = self.handle()?;

        let length = buffer.len() as u64;
        let position = self.state.borrow().cursor;
        let stream = self.clone();

        file.write(buffer, position, move |result| {
            // The completion owns a handle clone until this returns.
            let Ok(file) = stream.file.upgrade() else {
                return;
            };

            if let Err(err) = result {
                stream.handle_exception(&file, err);
            }
            stream.check_drained(&file);
        })?;

        self.state.borrow_mut().cursor += length;

        Ok(self)
    }

    /// Returns `true` while outstanding bytes are at or above the
    /// highwater mark.
    pub fn write_queue_full(&self) -> Result<bool> {
        let file = self.handle()?;

        Ok(file.outstanding_write_bytes() >= self.state.borrow().highwater)
    }

    /// Sets the highwater mark to `max_size` and the lowwater mark to half
    /// of it.
    pub fn set_write_queue_max_size(&self, max_size: u64) -> Result<&Self> {
        self.handle()?;

        let mut state = self.state.borrow_mut();
        state.highwater = max_size;
        state.lowwater = max_size / 2;

        Ok(self)
    }

    /// Registers a single-shot callback fired the next time outstanding
    /// bytes are seen at or below the lowwater mark.
    ///
    /// If the queue is already drained the callback fires immediately.
    /// A newer registration replaces an older one that has not fired.
    pub fn drain_handler<F>(&self, handler: F) -> Result<&Self>
    where
        F: FnOnce() + 'static,
    {
        let file = self.handle()?;

        self.state.borrow_mut().drain = Some(Box::new(handler));
        self.check_drained(&file);

        Ok(self)
    }

    /// Position the next write will land at.
    pub fn position(&self) -> u64 {
        self.state.borrow().cursor
    }

    pub fn highwater(&self) -> u64 {
        self.state.borrow().highwater
    }

    pub fn lowwater(&self) -> u64 {
        self.state.borrow().lowwater
    }

    fn check_drained(&self, file: &AsyncFile) {
        let drain = {
            let mut state = self.state.borrow_mut();

            if file.outstanding_write_bytes() <= state.lowwater {
                state.drain.take()
            } else {
                None
            }
        };

        if let Some(drain) = drain {
            drain();
        }
    }

    fn handle_exception(&self, file: &AsyncFile, error: FileError) {
        let handler = self.state.borrow().exception.clone();
        report(file, handler, error);
    }
}

impl FileStream for WriteStream {
    fn file(&self) -> Result<AsyncFile> {
        self.file.upgrade()
    }

    fn exception_handler<F>(&self, f: F) -> Result<&Self>
    where
        F: FnMut(FileError) + 'static,
    {
        self.handle()?;
        self.state.borrow_mut().exception = Some(handler(f));

        Ok(self)
    }
}
