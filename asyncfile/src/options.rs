//! Open configuration.

use crate::diagnostics::{DiagnosticSink, TracingSink};
use crate::error::{FileError, Result};
use crate::fs::AsyncFile;
use crate::fs::guard::ContextGuard;
use crate::fs::native::{NativeFile, PosixFile};
use crate::fs::sys::{DEFAULT_CREATE_MODE, open_flags};

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Chunk size of a read stream unless configured otherwise.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8192;

/// Highwater mark of a write stream unless configured otherwise.
pub const DEFAULT_WRITE_QUEUE_MAX_SIZE: u64 = 128 * 1024;

/// Options and flags used to open an [`AsyncFile`].
///
/// Mirrors `std::fs::OpenOptions`: every flag starts out `false`, and at
/// least one of [`read`](Self::read) and [`write`](Self::write) must be
/// set before opening.
///
/// # Examples
///
/// ```rust,ignore
/// let file = OpenOptions::new()
///     .write(true)
///     .create(true)
///     .perms("rw-r-----")
///     .open("/tmp/out.log")?;
/// ```
#[derive(Clone)]
pub struct OpenOptions {
    read: bool,
    write: bool,
    create: bool,
    sync_on_write: bool,

    /// POSIX permission string applied when the file is created.
    perms: Option<String>,

    read_buffer_size: usize,
    write_queue_max_size: u64,

    /// Receives failures nobody handled.
    diagnostics: Arc<dyn DiagnosticSink>,
}

impl OpenOptions {
    pub fn new() -> Self {
        Self {
            read: false,
            write: false,
            create: false,
            sync_on_write: false,
            perms: None,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            write_queue_max_size: DEFAULT_WRITE_QUEUE_MAX_SIZE,
            diagnostics: Arc::new(TracingSink),
        }
    }

    pub fn read(&mut self, read: bool) -> &mut Self {
        self.read = read;
        self
    }

    pub fn write(&mut self, write: bool) -> &mut Self {
        self.write = write;
        self
    }

    /// Creates the file if it does not exist. Existing files are never
    /// truncated.
    pub fn create(&mut self, create: bool) -> &mut Self {
        self.create = create;
        self
    }

    /// Makes every write durable before it is acknowledged (`O_DSYNC`).
    pub fn sync_on_write(&mut self, sync_on_write: bool) -> &mut Self {
        self.sync_on_write = sync_on_write;
        self
    }

    /// Permissions for a newly created file, as a 9-character POSIX string
    /// such as `"rwxr-x---"`. Validated when the file is opened.
    pub fn perms(&mut self, perms: impl Into<String>) -> &mut Self {
        self.perms = Some(perms.into());
        self
    }

    /// Initial chunk size of the handle's read stream.
    pub fn read_buffer_size(&mut self, size: usize) -> &mut Self {
        self.read_buffer_size = size;
        self
    }

    /// Initial highwater mark of the handle's write stream.
    pub fn write_queue_max_size(&mut self, size: u64) -> &mut Self {
        self.write_queue_max_size = size;
        self
    }

    /// Replaces the default [`TracingSink`].
    pub fn diagnostics(&mut self, sink: Arc<dyn DiagnosticSink>) -> &mut Self {
        self.diagnostics = sink;
        self
    }

    pub(crate) fn diagnostics_sink(&self) -> Arc<dyn DiagnosticSink> {
        self.diagnostics.clone()
    }

    pub(crate) fn initial_read_buffer_size(&self) -> usize {
        self.read_buffer_size
    }

    pub(crate) fn initial_write_queue_max_size(&self) -> u64 {
        self.write_queue_max_size
    }

    fn validate(&self) -> Result<()> {
        if !self.read && !self.write {
            return Err(FileError::invalid_argument(
                "cannot open file for neither reading nor writing",
            ));
        }

        if self.read_buffer_size == 0 {
            return Err(FileError::invalid_argument("read buffer size must be > 0"));
        }

        Ok(())
    }

    /// Opens `path` on the calling context.
    ///
    /// The returned handle is pinned to that context.
    ///
    /// # Errors
    ///
    /// - `ContextViolation` when not called from a context
    /// - `InvalidArgument` for an invalid flag combination or permission string
    /// - `OpenFailure` when the OS refuses the open
    pub fn open<P: AsRef<Path>>(&self, path: P) -> Result<AsyncFile> {
        self.validate()?;
        let guard = ContextGuard::capture()?;

        let path = path.as_ref();
        let mode = match &self.perms {
            Some(perms) => parse_perms(perms)?,
            None => DEFAULT_CREATE_MODE,
        };
        let flags = open_flags(self.read, self.write, self.create, self.sync_on_write);

        let native = PosixFile::open(path, flags, mode).map_err(|source| {
            FileError::OpenFailure {
                path: path.to_path_buf(),
                source,
            }
        })?;

        tracing::debug!(path = %path.display(), read = self.read, write = self.write, "file opened");

        Ok(AsyncFile::from_parts(guard, path.to_path_buf(), Arc::new(native), self))
    }

    /// Wraps an already open native backend in a handle on the calling
    /// context, applying the same validation as [`open`](Self::open).
    pub fn open_native(&self, native: Arc<dyn NativeFile>) -> Result<AsyncFile> {
        self.validate()?;
        let guard = ContextGuard::capture()?;

        Ok(AsyncFile::from_parts(guard, PathBuf::new(), native, self))
    }
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for OpenOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenOptions")
            .field("read", &self.read)
            .field("write", &self.write)
            .field("create", &self.create)
            .field("sync_on_write", &self.sync_on_write)
            .field("perms", &self.perms)
            .field("read_buffer_size", &self.read_buffer_size)
            .field("write_queue_max_size", &self.write_queue_max_size)
            .finish_non_exhaustive()
    }
}

/// Parses a POSIX permission string (`"rw-r--r--"`) into a mode.
pub fn parse_perms(perms: &str) -> Result<libc::mode_t> {
    let bytes = perms.as_bytes();

    if bytes.len() != 9 {
        return Err(FileError::invalid_argument(format!(
            "invalid permission string {perms:?}: expected 9 characters"
        )));
    }

    let mut mode: libc::mode_t = 0;

    for (i, &c) in bytes.iter().enumerate() {
        let expected = [b'r', b'w', b'x'][i % 3];
        mode <<= 1;

        if c == expected {
            mode |= 1;
        } else if c != b'-' {
            return Err(FileError::invalid_argument(format!(
                "invalid permission string {perms:?}: unexpected {:?} at {i}",
                c as char
            )));
        }
    }

    Ok(mode)
}
