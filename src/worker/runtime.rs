/*!
 * Worker Runtime
 * Seam to the session, storage, and hot-reload collaborators that live
 * outside this crate
 */

use anyhow::Result;

/// Process-local environment of one worker.
///
/// The worker loop drives this through its lifecycle: `connect` once at
/// startup, `session_begin`/`session_end` around each request (skipped
/// when the request carries the keepalive flag, since the session is
/// assumed to persist across the round-trip sequence), `commit` after a
/// successful callable, `reload` for hot-reload notifications, and
/// `disconnect` on shutdown.
pub trait WorkerRuntime: Send {
    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    fn disconnect(&mut self) {}

    fn session_begin(&mut self) -> Result<()> {
        Ok(())
    }

    fn session_end(&mut self) {}

    fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    fn reload(&mut self, module: &str) {
        let _ = module;
    }
}

/// Runtime with no external collaborators, for tests and the demo binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRuntime;

impl WorkerRuntime for NullRuntime {}
