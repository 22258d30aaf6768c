mod common;

use asyncfile::{
    Buffer, DEFAULT_WRITE_QUEUE_MAX_SIZE, Done, FileError, FileStream, OpenOptions, Operation,
};
use common::{MemoryFile, RecordingSink, TempFile};

use std::cell::{Cell, RefCell};
use std::io;
use std::rc::Rc;

fn writable() -> OpenOptions {
    let mut options = OpenOptions::new();
    options.write(true);
    options
}

#[asyncfile::test]
fn watermarks_default_and_follow_max_size(done: Done) {
    let handle = writable().open_native(MemoryFile::new(b"")).unwrap();
    let stream = handle.write_stream().unwrap();

    assert_eq!(stream.highwater(), DEFAULT_WRITE_QUEUE_MAX_SIZE);
    assert_eq!(stream.lowwater(), DEFAULT_WRITE_QUEUE_MAX_SIZE / 2);

    stream.set_write_queue_max_size(101).unwrap();
    assert_eq!(stream.highwater(), 101);
    assert_eq!(stream.lowwater(), 50);

    done.complete();
}

#[asyncfile::test]
fn configured_max_size_applies_to_new_streams(done: Done) {
    let handle = writable()
        .write_queue_max_size(64)
        .open_native(MemoryFile::new(b""))
        .unwrap();
    let stream = handle.write_stream().unwrap();

    assert_eq!(stream.highwater(), 64);
    assert_eq!(stream.lowwater(), 32);

    done.complete();
}

#[asyncfile::test]
fn queue_fills_at_highwater_and_drains_at_lowwater(done: Done) {
    let native = MemoryFile::new(b"");
    native.hold_writes();

    let handle = writable().open_native(native.clone()).unwrap();
    let stream = handle.write_stream().unwrap();
    stream.set_write_queue_max_size(10).unwrap();

    stream.write(Buffer::from("abcdef")).unwrap();
    assert!(!stream.write_queue_full().unwrap());

    stream.write(Buffer::from("ghij")).unwrap();
    assert!(stream.write_queue_full().unwrap());
    assert_eq!(handle.outstanding_write_bytes(), 10);

    let observer = handle.clone();
    let checker = stream.clone();
    stream
        .drain_handler(move || {
            assert!(observer.outstanding_write_bytes() <= 5);
            assert!(!checker.write_queue_full().unwrap());
            done.complete();
        })
        .unwrap();

    native.release_writes();
}

#[asyncfile::test]
fn drain_handler_is_single_shot(done: Done) {
    let handle = writable().open_native(MemoryFile::new(b"")).unwrap();
    let stream = handle.write_stream().unwrap();
    let fired = Rc::new(Cell::new(0));

    let counter = fired.clone();
    stream.drain_handler(move || counter.set(counter.get() + 1)).unwrap();
    assert_eq!(fired.get(), 1);

    stream.write(Buffer::from("more data")).unwrap();
    stream.write(Buffer::from("and more")).unwrap();

    handle
        .close_with(move |result| {
            result.unwrap();
            assert_eq!(fired.get(), 1);
            done.complete();
        })
        .unwrap();
}

#[test]
fn sequential_writes_land_back_to_back() {
    let runtime = asyncfile::RuntimeBuilder::new().build();
    let file = TempFile::new("back-to-back");
    let path = file.path();

    runtime.run_until_complete(move |done| {
        let handle = writable().create(true).open(&path).unwrap();
        let stream = handle.write_stream().unwrap();

        assert!(!stream.write_queue_full().unwrap());

        stream.write(Buffer::from(vec![b'a'; 100])).unwrap();
        assert_eq!(stream.position(), 100);
        assert!(!stream.write_queue_full().unwrap());

        stream.write(Buffer::from(vec![b'b'; 50])).unwrap();
        assert_eq!(stream.position(), 150);
        assert!(!stream.write_queue_full().unwrap());

        handle
            .close_with(move |result| {
                result.unwrap();
                done.complete();
            })
            .unwrap();
    });

    let contents = std::fs::read(&file.0).unwrap();
    assert_eq!(contents.len(), 150);
    assert!(contents[..100].iter().all(|&b| b == b'a'));
    assert!(contents[100..].iter().all(|&b| b == b'b'));
}

#[asyncfile::test]
fn failures_go_to_the_exception_handler(done: Done) {
    let native = MemoryFile::new(b"");
    native.fail_writes(true);

    let handle = writable().open_native(native).unwrap();
    let stream = handle.write_stream().unwrap();
    let failures = Rc::new(RefCell::new(Vec::new()));

    let seen = failures.clone();
    stream
        .exception_handler(move |err| seen.borrow_mut().push(err))
        .unwrap();

    stream.write(Buffer::from("first")).unwrap();
    stream.write(Buffer::from("second")).unwrap();
    assert_eq!(stream.position(), 11);

    handle
        .close_with(move |result| {
            result.unwrap();

            let failures = failures.borrow();
            assert_eq!(failures.len(), 2);
            for err in failures.iter() {
                assert!(matches!(
                    err,
                    FileError::Io {
                        op: Operation::Write,
                        ..
                    }
                ));
                assert_eq!(err.io_kind(), Some(io::ErrorKind::StorageFull));
            }

            done.complete();
        })
        .unwrap();
}

#[asyncfile::test]
fn unhandled_failures_reach_the_diagnostic_sink(done: Done) {
    let native = MemoryFile::new(b"");
    native.fail_writes(true);
    let sink = RecordingSink::new();

    let handle = writable()
        .diagnostics(sink.clone())
        .open_native(native)
        .unwrap();
    let stream = handle.write_stream().unwrap();

    stream.write(Buffer::from("nobody listens")).unwrap();

    handle
        .close_with(move |result| {
            result.unwrap();

            let messages = sink.messages();
            assert_eq!(messages.len(), 1);
            assert!(messages[0].starts_with("unhandled stream failure"));
            assert!(messages[0].contains("injected write failure"));
            done.complete();
        })
        .unwrap();
}

#[asyncfile::test]
fn drain_fires_after_a_failed_write(done: Done) {
    let native = MemoryFile::new(b"");
    native.hold_writes();
    native.fail_writes(true);

    let handle = writable().open_native(native.clone()).unwrap();
    let stream = handle.write_stream().unwrap();
    stream.set_write_queue_max_size(4).unwrap();
    stream.exception_handler(|_| {}).unwrap();

    stream.write(Buffer::from("overflow")).unwrap();
    assert!(stream.write_queue_full().unwrap());

    stream.drain_handler(move || done.complete()).unwrap();

    native.release_writes();
}

#[asyncfile::test]
fn stream_rejects_calls_after_close(done: Done) {
    let handle = writable().open_native(MemoryFile::new(b"")).unwrap();
    let stream = handle.write_stream().unwrap();

    handle.close().unwrap();

    assert!(matches!(
        stream.write(Buffer::from("late")),
        Err(FileError::IllegalState)
    ));
    assert!(matches!(
        stream.write_queue_full(),
        Err(FileError::IllegalState)
    ));
    assert!(matches!(
        stream.drain_handler(|| {}),
        Err(FileError::IllegalState)
    ));
    assert!(matches!(
        stream.exception_handler(|_| {}),
        Err(FileError::IllegalState)
    ));
    assert_eq!(stream.position(), 0);

    done.complete();
}
