use libc::{
    O_CLOEXEC, O_CREAT, O_DSYNC, O_RDONLY, O_RDWR, O_WRONLY, c_char, c_int, c_uint, close, mode_t,
    off_t, open, pread, pwrite,
};
use std::io;
use std::os::fd::RawFd;

/// Default mode for newly created files, before the umask.
pub(crate) const DEFAULT_CREATE_MODE: mode_t = 0o666;

/// Builds `open(2)` flags from the requested access.
///
/// Files are never truncated; the descriptor is always close-on-exec.
pub(crate) fn open_flags(read: bool, write: bool, create: bool, sync_on_write: bool) -> c_int {
    let mut flags = match (read, write) {
        (true, true) => O_RDWR,
        (false, true) => O_WRONLY,
        _ => O_RDONLY,
    };

    if create {
        flags |= O_CREAT;
    }

    if sync_on_write {
        flags |= O_DSYNC;
    }

    flags | O_CLOEXEC
}

/// Opens a file using `open(2)`.
pub(crate) fn sys_open(path: *const c_char, flags: c_int, mode: mode_t) -> io::Result<RawFd> {
    let fd = unsafe { open(path, flags, mode as c_uint) };

    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(fd)
}

fn offset(position: u64) -> io::Result<off_t> {
    off_t::try_from(position)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "file position out of range"))
}

/// Reads into `buffer` at `position` with `pread(2)`.
///
/// Returns `0` at end of file.
pub(crate) fn sys_pread(fd: RawFd, buffer: &mut [u8], position: u64) -> io::Result<usize> {
    let n = unsafe {
        pread(
            fd,
            buffer.as_mut_ptr() as *mut _,
            buffer.len(),
            offset(position)?,
        )
    };

    if n < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(n as usize)
}

/// Writes `buffer` at `position` with `pwrite(2)`.
///
/// May write fewer bytes than requested.
pub(crate) fn sys_pwrite(fd: RawFd, buffer: &[u8], position: u64) -> io::Result<usize> {
    let n = unsafe {
        pwrite(
            fd,
            buffer.as_ptr() as *const _,
            buffer.len(),
            offset(position)?,
        )
    };

    if n < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(n as usize)
}

/// Flushes file data to stable storage.
pub(crate) fn sys_sync_data(fd: RawFd) -> io::Result<()> {
    #[cfg(any(target_os = "macos", target_os = "ios"))]
    let rc = unsafe { libc::fsync(fd) };

    #[cfg(not(any(target_os = "macos", target_os = "ios")))]
    let rc = unsafe { libc::fdatasync(fd) };

    if rc < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Closes a file descriptor.
pub(crate) fn sys_close(fd: RawFd) -> io::Result<()> {
    if unsafe { close(fd) } < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}
