//! Example: Copying a file through a read stream and a write stream
//!
//! Usage: `cargo run --example stream_copy [SOURCE] [DEST]`
//!
//! Without arguments a 1 MiB temporary file is generated and copied.

use asyncfile::{FileStream, OpenOptions, RuntimeBuilder};
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn temp_path(tag: &str) -> PathBuf {
    let unique = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock drift")
        .as_nanos();

    std::env::temp_dir().join(format!(
        "asyncfile-{tag}-{}-{unique}.tmp",
        std::process::id()
    ))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args_os().skip(1);
    let (source, dest, generated) = match (args.next(), args.next()) {
        (Some(source), Some(dest)) => (PathBuf::from(source), PathBuf::from(dest), false),
        _ => {
            let source = temp_path("source");
            let contents: Vec<u8> = (0..1024 * 1024).map(|i| (i % 251) as u8).collect();
            std::fs::write(&source, contents).expect("write source file");
            (source, temp_path("dest"), true)
        }
    };

    let runtime = RuntimeBuilder::new().worker_threads(2).build();
    let (from, to) = (source.clone(), dest.clone());

    runtime.run_until_complete_timeout(Duration::from_secs(60), move |done| {
        let reader = OpenOptions::new()
            .read(true)
            .read_buffer_size(64 * 1024)
            .open(&from)
            .expect("open source");
        let writer = OpenOptions::new()
            .write(true)
            .create(true)
            .write_queue_max_size(256 * 1024)
            .open(&to)
            .expect("open destination");

        let input = reader.read_stream().expect("read stream");
        let output = writer.write_stream().expect("write stream");

        input
            .exception_handler(|err| eprintln!("read failed: {err}"))
            .expect("register read errors");
        output
            .exception_handler(|err| eprintln!("write failed: {err}"))
            .expect("register write errors");

        // Stop reading while the writer is saturated.
        let (source_side, sink_side) = (input.clone(), output.clone());
        input
            .data_handler(move |chunk| {
                sink_side.write(chunk).expect("write chunk");

                if sink_side.write_queue_full().expect("queue state") {
                    source_side.pause().expect("pause");

                    let source_side = source_side.clone();
                    sink_side
                        .drain_handler(move || {
                            source_side.resume().expect("resume");
                        })
                        .expect("register drain");
                }
            })
            .expect("start reading");

        let copied = output.clone();
        input
            .end_handler(move || {
                let total = copied.position();
                let done = done.clone();

                reader.close().expect("close source");
                writer
                    .close_with(move |result| {
                        result.expect("close destination");
                        println!("Copied {total} bytes");
                        done.complete();
                    })
                    .expect("close destination");
            })
            .expect("register end");
    });

    if generated {
        let same = std::fs::read(&source).ok() == std::fs::read(&dest).ok();
        println!("Copy matches source: {same}");

        let _ = std::fs::remove_file(source);
        let _ = std::fs::remove_file(dest);
    }
}
