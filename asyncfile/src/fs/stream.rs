use crate::error::{FileError, Result};
use crate::fs::AsyncFile;

use std::cell::RefCell;
use std::rc::Rc;

/// A persistent callback shared between a stream and its in-flight work.
///
/// Handlers are cloned out of stream state before being called, so they
/// may freely re-register handlers or drive the stream.
pub(crate) type Handler<T> = Rc<RefCell<dyn FnMut(T)>>;

pub(crate) fn handler<T, F>(f: F) -> Handler<T>
where
    T: 'static,
    F: FnMut(T) + 'static,
{
    Rc::new(RefCell::new(f))
}

pub(crate) fn invoke<T>(handler: &Handler<T>, value: T) {
    let mut callback = handler.borrow_mut();
    (&mut *callback)(value);
}

/// Behaviour shared by the read and write side of a file.
///
/// Both streams are views over the same [`AsyncFile`]: they have no close
/// of their own, and stop accepting calls once the handle is closed or
/// dropped. A stream does not keep its handle alive.
pub trait FileStream {
    /// The handle this stream reads from or writes to.
    ///
    /// Fails with `IllegalState` once every owner has dropped the handle.
    fn file(&self) -> Result<AsyncFile>;

    /// Sets the persistent handler for stream failures.
    ///
    /// Failures without a handler go to the handle's diagnostic sink and
    /// the stream keeps operating.
    fn exception_handler<F>(&self, handler: F) -> Result<&Self>
    where
        F: FnMut(FileError) + 'static;
}

/// Delivers `error` to `handler`, or to the file's diagnostic sink.
pub(crate) fn report(file: &AsyncFile, handler: Option<Handler<FileError>>, error: FileError) {
    match handler {
        Some(handler) => invoke(&handler, error),
        None => file
            .diagnostics()
            .unhandled(&FileError::Unhandled(Box::new(error))),
    }
}
