//! Non-blocking file handles and their streams.
//!
//! An [`AsyncFile`] is opened on a runtime context through
//! [`OpenOptions`](crate::OpenOptions) and stays pinned to it. Positional
//! reads and writes run on the blocking pool; partial transfers are
//! resubmitted until the requested range is done. On top of the handle
//! sit two views:
//! - [`WriteStream`], a sequential writer with highwater/lowwater
//!   backpressure,
//! - [`ReadStream`], a pull-driven reader with pause and resume.

mod file;
mod pump;
mod read_stream;
mod stream;
mod write_stream;

pub(crate) mod guard;
pub(crate) mod native;
pub(crate) mod sys;

pub use file::AsyncFile;
pub use native::NativeFile;
pub use read_stream::ReadStream;
pub use stream::FileStream;
pub use write_stream::WriteStream;
