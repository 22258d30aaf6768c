use crate::fs::sys::{sys_close, sys_open, sys_pread, sys_pwrite, sys_sync_data};

use std::ffi::CString;
use std::io;
use std::os::fd::RawFd;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::sync::atomic::{AtomicI32, Ordering};

/// Positional file calls the handle runs on the blocking pool.
///
/// Every call may block. Reads and writes may transfer fewer bytes than
/// asked; the caller resubmits the remainder. A read returning `Ok(0)`
/// for a non-empty buffer means end of file.
pub trait NativeFile: Send + Sync + 'static {
    fn read_at(&self, buffer: &mut [u8], position: u64) -> io::Result<usize>;

    fn write_at(&self, buffer: &[u8], position: u64) -> io::Result<usize>;

    /// Forces written data to stable storage.
    fn sync_data(&self) -> io::Result<()>;

    /// Releases the underlying descriptor. Called at most once by a handle.
    fn close(&self) -> io::Result<()>;
}

const CLOSED: RawFd = -1;

/// A POSIX file descriptor driven with `pread`/`pwrite`.
pub(crate) struct PosixFile {
    /// Open descriptor, or [`CLOSED`].
    fd: AtomicI32,
}

impl PosixFile {
    /// Opens `path` with raw `open(2)` flags and creation mode.
    pub(crate) fn open(path: &Path, flags: i32, mode: libc::mode_t) -> io::Result<Self> {
        let c_path = CString::new(path.as_os_str().as_bytes())?;
        let fd = sys_open(c_path.as_ptr(), flags, mode)?;

        Ok(Self {
            fd: AtomicI32::new(fd),
        })
    }

    fn fd(&self) -> io::Result<RawFd> {
        match self.fd.load(Ordering::Acquire) {
            CLOSED => Err(io::Error::from_raw_os_error(libc::EBADF)),
            fd => Ok(fd),
        }
    }
}

impl NativeFile for PosixFile {
    fn read_at(&self, buffer: &mut [u8], position: u64) -> io::Result<usize> {
        sys_pread(self.fd()?, buffer, position)
    }

    fn write_at(&self, buffer: &[u8], position: u64) -> io::Result<usize> {
        sys_pwrite(self.fd()?, buffer, position)
    }

    fn sync_data(&self) -> io::Result<()> {
        sys_sync_data(self.fd()?)
    }

    fn close(&self) -> io::Result<()> {
        match self.fd.swap(CLOSED, Ordering::AcqRel) {
            CLOSED => Ok(()),
            fd => sys_close(fd),
        }
    }
}

impl Drop for PosixFile {
    fn drop(&mut self) {
        let fd = *self.fd.get_mut();

        if fd != CLOSED {
            let _ = sys_close(fd);
        }
    }
}
