//! Partial-I/O retry loops run on the blocking pool.
//!
//! A native call may move fewer bytes than asked. The pumps keep
//! resubmitting the remainder at the advanced position, iteratively,
//! until the range is done, end of file is reached or the call fails.

use crate::fs::native::NativeFile;

use std::io;
use std::sync::Arc;

/// Writes a whole buffer at a position.
pub(crate) struct WritePump {
    native: Arc<dyn NativeFile>,
    data: Vec<u8>,
    position: u64,
}

impl WritePump {
    pub(crate) fn new(native: Arc<dyn NativeFile>, data: Vec<u8>, position: u64) -> Self {
        Self {
            native,
            data,
            position,
        }
    }

    /// Runs native writes until every byte has been acknowledged.
    ///
    /// # Errors
    ///
    /// Returns the first native failure, or `WriteZero` if a write makes
    /// no progress.
    pub(crate) fn run(self) -> io::Result<()> {
        let mut consumed = 0;
        let mut position = self.position;

        while consumed < self.data.len() {
            match self.native.write_at(&self.data[consumed..], position) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "failed to write entire buffer",
                    ));
                }
                Ok(n) => {
                    consumed += n;
                    position += n as u64;

                    if consumed < self.data.len() {
                        tracing::trace!(
                            written = n,
                            remaining = self.data.len() - consumed,
                            position,
                            "partial write, resubmitting"
                        );
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }

        Ok(())
    }
}

/// Fills a scratch region of fixed length from a position.
pub(crate) struct ReadPump {
    native: Arc<dyn NativeFile>,
    position: u64,
    length: usize,
}

impl ReadPump {
    pub(crate) fn new(native: Arc<dyn NativeFile>, position: u64, length: usize) -> Self {
        Self {
            native,
            position,
            length,
        }
    }

    /// Runs native reads until `length` bytes were read or end of file.
    ///
    /// Returns the bytes accumulated, possibly fewer than `length`
    /// (none at all when starting at or past end of file).
    pub(crate) fn run(self) -> io::Result<Vec<u8>> {
        let mut scratch = vec![0u8; self.length];
        let mut filled = 0;

        while filled < self.length {
            let position = self.position + filled as u64;

            match self.native.read_at(&mut scratch[filled..], position) {
                Ok(0) => break,
                Ok(n) => {
                    filled += n;

                    if filled < self.length {
                        tracing::trace!(
                            read = n,
                            remaining = self.length - filled,
                            position = position + n as u64,
                            "partial read, resubmitting"
                        );
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }

        scratch.truncate(filled);
        Ok(scratch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    /// In-memory file that moves at most `step` bytes per call and can
    /// inject errors.
    struct Trickle {
        contents: Mutex<Vec<u8>>,
        step: usize,
        calls: Mutex<Vec<(u64, usize)>>,
        failures: Mutex<Vec<io::ErrorKind>>,
    }

    impl Trickle {
        fn new(contents: &[u8], step: usize) -> Arc<Self> {
            Arc::new(Self {
                contents: Mutex::new(contents.to_vec()),
                step,
                calls: Mutex::new(Vec::new()),
                failures: Mutex::new(Vec::new()),
            })
        }

        fn fail_next(&self, kind: io::ErrorKind) {
            self.failures.lock().unwrap().push(kind);
        }

        fn injected(&self) -> Option<io::Error> {
            self.failures.lock().unwrap().pop().map(io::Error::from)
        }
    }

    impl NativeFile for Trickle {
        fn read_at(&self, buffer: &mut [u8], position: u64) -> io::Result<usize> {
            if let Some(err) = self.injected() {
                return Err(err);
            }
            let contents = self.contents.lock().unwrap();
            let start = (position as usize).min(contents.len());
            let n = buffer.len().min(self.step).min(contents.len() - start);
            buffer[..n].copy_from_slice(&contents[start..start + n]);
            self.calls.lock().unwrap().push((position, n));
            Ok(n)
        }

        fn write_at(&self, buffer: &[u8], position: u64) -> io::Result<usize> {
            if let Some(err) = self.injected() {
                return Err(err);
            }
            let n = buffer.len().min(self.step);
            let start = position as usize;
            let mut contents = self.contents.lock().unwrap();
            if contents.len() < start + n {
                contents.resize(start + n, 0);
            }
            contents[start..start + n].copy_from_slice(&buffer[..n]);
            self.calls.lock().unwrap().push((position, n));
            Ok(n)
        }

        fn sync_data(&self) -> io::Result<()> {
            Ok(())
        }

        fn close(&self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn short_writes_resume_at_the_advanced_position() {
        let file = Trickle::new(b"", 4);

        WritePump::new(file.clone(), b"0123456789".to_vec(), 2)
            .run()
            .unwrap();

        assert_eq!(&file.contents.lock().unwrap()[2..], b"0123456789");
        assert_eq!(*file.calls.lock().unwrap(), vec![(2, 4), (6, 4), (10, 2)]);
    }

    #[test]
    fn interrupted_write_is_retried() {
        let file = Trickle::new(b"", 16);
        file.fail_next(io::ErrorKind::Interrupted);

        WritePump::new(file.clone(), b"abc".to_vec(), 0).run().unwrap();

        assert_eq!(&*file.contents.lock().unwrap(), b"abc");
    }

    #[test]
    fn write_failure_is_reported() {
        let file = Trickle::new(b"", 16);
        file.fail_next(io::ErrorKind::PermissionDenied);

        let err = WritePump::new(file, b"abc".to_vec(), 0).run().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn stuck_write_fails_with_write_zero() {
        let file = Trickle::new(b"", 0);

        let err = WritePump::new(file, b"abc".to_vec(), 0).run().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
    }

    #[test]
    fn empty_write_completes_without_a_native_call() {
        let file = Trickle::new(b"", 4);

        WritePump::new(file.clone(), Vec::new(), 0).run().unwrap();
        assert!(file.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn short_reads_are_accumulated() {
        let file = Trickle::new(b"abcdefghij", 3);

        let bytes = ReadPump::new(file.clone(), 1, 8).run().unwrap();

        assert_eq!(bytes, b"bcdefghi");
        assert_eq!(*file.calls.lock().unwrap(), vec![(1, 3), (4, 3), (7, 2)]);
    }

    #[test]
    fn end_of_file_returns_what_was_accumulated() {
        let file = Trickle::new(b"abcde", 2);

        assert_eq!(ReadPump::new(file.clone(), 1, 100).run().unwrap(), b"bcde");
        assert!(ReadPump::new(file, 5, 100).run().unwrap().is_empty());
    }

    #[test]
    fn read_failure_is_reported() {
        let file = Trickle::new(b"abc", 8);
        file.fail_next(io::ErrorKind::Other);

        assert!(ReadPump::new(file, 0, 3).run().is_err());
    }
}
