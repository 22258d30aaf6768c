use crate::buffer::Buffer;
use crate::error::{FileError, Result};
use crate::fs::AsyncFile;
use crate::fs::file::WeakFile;
use crate::fs::stream::{FileStream, Handler, handler, invoke, report};

use std::cell::RefCell;
use std::rc::Rc;

/// Mutable state of a read stream, owned by its file handle.
pub(crate) struct ReadState {
    /// File position of the next read; advanced on delivery.
    cursor: u64,

    /// Bytes requested per native read.
    chunk_size: usize,

    paused: bool,

    /// At most one read is in flight.
    read_in_progress: bool,

    /// End of file was delivered; the loop never re-arms afterwards.
    ended: bool,

    data: Option<Handler<Buffer>>,
    exception: Option<Handler<FileError>>,
    end: Option<Handler<()>>,
}

impl ReadState {
    pub(crate) fn new(chunk_size: usize) -> Self {
        Self {
            cursor: 0,
            chunk_size,
            paused: false,
            read_in_progress: false,
            ended: false,
            data: None,
            exception: None,
            end: None,
        }
    }

    pub(crate) fn teardown(&mut self) {
        self.data = None;
        self.exception = None;
        self.end = None;
    }
}

/// Pull-driven sequential reader over an [`AsyncFile`].
///
/// Registering a data handler starts a loop of fixed-size reads from the
/// start of the file. Each chunk is handed to the data handler and the
/// next read is issued only while the stream is not paused, so a slow
/// consumer can hold the producer back with [`pause`](Self::pause) and
/// [`resume`](Self::resume). An empty chunk marks end of file and fires
/// the end handler once.
#[derive(Clone)]
pub struct ReadStream {
    file: WeakFile,
    state: Rc<RefCell<ReadState>>,
}

impl ReadStream {
    pub(crate) fn new(file: WeakFile, state: Rc<RefCell<ReadState>>) -> Self {
        Self { file, state }
    }

    /// The live handle, checked for context and closed state.
    fn handle(&self) -> Result<AsyncFile> {
        let file = self.file.upgrade()?;
        file.check()?;

        Ok(file)
    }

    /// Sets the data handler and starts reading unless paused.
    pub fn data_handler<F>(&self, f: F) -> Result<&Self>
    where
        F: FnMut(Buffer) + 'static,
    {
        let file = self.handle()?;

        let paused = {
            let mut state = self.state.borrow_mut();
            state.data = Some(handler(f));
            state.paused
        };

        if !paused {
            self.do_read(&file);
        }

        Ok(self)
    }

    /// Removes the data handler; the loop stops after the in-flight read.
    pub fn clear_data_handler(&self) -> Result<&Self> {
        self.handle()?;
        self.state.borrow_mut().data = None;

        Ok(self)
    }

    /// Sets the handler fired once when end of file is reached.
    pub fn end_handler<F>(&self, mut f: F) -> Result<&Self>
    where
        F: FnMut() + 'static,
    {
        self.handle()?;
        self.state.borrow_mut().end = Some(handler(move |()| f()));

        Ok(self)
    }

    /// Stops issuing reads. A read already in flight is still delivered.
    pub fn pause(&self) -> Result<&Self> {
        self.handle()?;
        self.state.borrow_mut().paused = true;

        Ok(self)
    }

    /// Resumes reading if paused and a data handler is registered.
    pub fn resume(&self) -> Result<&Self> {
        let file = self.handle()?;

        let rearm = {
            let mut state = self.state.borrow_mut();

            if !state.paused {
                return Ok(self);
            }

            state.paused = false;
            state.data.is_some()
        };

        if rearm {
            self.do_read(&file);
        }

        Ok(self)
    }

    /// Changes the number of bytes requested per read.
    pub fn set_read_buffer_size(&self, size: usize) -> Result<&Self> {
        self.handle()?;

        if size == 0 {
            return Err(FileError::invalid_argument("read buffer size must be > 0"));
        }

        self.state.borrow_mut().chunk_size = size;

        Ok(self)
    }

    /// File position of the next read.
    pub fn position(&self) -> u64 {
        self.state.borrow().cursor
    }

    pub fn is_paused(&self) -> bool {
        self.state.borrow().paused
    }

    /// Returns `true` once end of file has been delivered.
    pub fn is_ended(&self) -> bool {
        self.state.borrow().ended
    }

    fn do_read(&self, file: &AsyncFile) {
        let (position, chunk_size) = {
            let mut state = self.state.borrow_mut();

            if state.read_in_progress || state.ended || file.is_closed() {
                return;
            }

            state.read_in_progress = true;
            (state.cursor, state.chunk_size)
        };

        let stream = self.clone();
        let submitted = file.read(
            Buffer::with_capacity(chunk_size),
            0,
            position,
            chunk_size,
            move |result| stream.on_read(result),
        );

        if let Err(err) = submitted {
            self.state.borrow_mut().read_in_progress = false;
            self.handle_exception(file, err);
        }
    }

    fn on_read(&self, result: Result<Buffer>) {
        self.state.borrow_mut().read_in_progress = false;

        // The completion owns a handle clone until this returns.
        let Ok(file) = self.file.upgrade() else {
            return;
        };

        match result {
            Ok(buffer) if buffer.is_empty() => self.handle_end(&file),
            Ok(buffer) => {
                let data = {
                    let mut state = self.state.borrow_mut();
                    state.cursor += buffer.len() as u64;
                    state.data.clone()
                };

                if let Some(data) = data {
                    invoke(&data, buffer);
                }

                let rearm = {
                    let state = self.state.borrow();
                    !state.paused && state.data.is_some()
                };

                if rearm {
                    self.do_read(&file);
                }
            }
            Err(err) => self.handle_exception(&file, err),
        }
    }

    fn handle_end(&self, file: &AsyncFile) {
        let end = {
            let mut state = self.state.borrow_mut();
            state.ended = true;
            state.end.clone()
        };

        tracing::trace!(path = %file.path().display(), "read stream reached end of file");

        if let Some(end) = end {
            invoke(&end, ());
        }
    }

    fn handle_exception(&self, file: &AsyncFile, error: FileError) {
        let handler = self.state.borrow().exception.clone();
        report(file, handler, error);
    }
}

impl FileStream for ReadStream {
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
