//! Sink for failures that no handler observed.

use crate::error::FileError;

/// Receives failures that would otherwise be lost.
///
/// A sink is injected per handle through
/// [`OpenOptions::diagnostics`](crate::OpenOptions::diagnostics). Stream
/// failures without an exception handler, and `flush`/`close` failures
/// without a callback, are reported here; the handle keeps operating.
pub trait DiagnosticSink: Send + Sync {
    fn unhandled(&self, error: &FileError);
}

/// Default sink: logs through `tracing` at error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn unhandled(&self, error: &FileError) {
        tracing::error!(%error, "unhandled file failure");
    }
}
