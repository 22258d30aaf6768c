//! # asyncfile
//!
//! **asyncfile** provides non-blocking file I/O for code that runs on a
//! single logical thread per owner.
//!
//! A file handle is pinned to the [`Context`] that opened it. Native
//! reads, writes, flushes and closes run on a background pool, and every
//! result is dispatched back onto the owning context, so handle state
//! (positions, counters, callback registrations) is never touched by two
//! threads and needs no locking. Calling a handle from any other context
//! is rejected with [`FileError::ContextViolation`].
//!
//! On top of the handle, the crate offers:
//!
//! - a **write stream** that appends in submission order and exposes
//!   highwater/lowwater backpressure with a drain callback,
//! - a **read stream** that reads fixed-size chunks, with pause/resume
//!   and an end-of-file callback,
//! - **partial I/O handling**: short native reads and writes are
//!   resubmitted until the requested range is done,
//! - **deferred close**: closing while writes are in flight waits for
//!   them before releasing the descriptor.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use asyncfile::{Buffer, OpenOptions, RuntimeBuilder};
//!
//! let runtime = RuntimeBuilder::new().build();
//!
//! runtime.run_until_complete(|done| {
//!     let file = OpenOptions::new()
//!         .write(true)
//!         .create(true)
//!         .open("/tmp/hello.txt")
//!         .unwrap();
//!
//!     let closer = file.clone();
//!     file.write(Buffer::from("hello"), 0, move |result| {
//!         result.unwrap();
//!         closer.close_with(move |_| done.complete()).unwrap();
//!     })
//!     .unwrap();
//! });
//! ```
//!
//! ## Modules
//!
//! - [`fs`]: File handles, streams and the native backend trait
//! - [`runtime`]: Contexts, the event loop and the blocking pool

mod buffer;
mod diagnostics;
mod error;
mod options;

pub mod fs;
pub mod runtime;

pub use buffer::Buffer;
pub use diagnostics::{DiagnosticSink, TracingSink};
pub use error::{FileError, Operation, Result};
pub use fs::{AsyncFile, FileStream, NativeFile, ReadStream, WriteStream};
pub use options::{
    DEFAULT_READ_BUFFER_SIZE, DEFAULT_WRITE_QUEUE_MAX_SIZE, OpenOptions, parse_perms,
};
pub use runtime::builder::{DEFAULT_BLOCKING_THREADS, RuntimeBuilder};
pub use runtime::context::{Context, ContextId};
pub use runtime::{Done, Runtime};

pub use asyncfile_macros::test;
