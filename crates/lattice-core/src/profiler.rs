// =============================================================================
// Profiler — Scoped trace capture on the runtime
// =============================================================================

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Result;
use crate::runtime::Runtime;

/// Subdirectory of the save directory that receives trace files.
pub const PROFILE_SUBDIR: &str = "profile";

// ---------------------------------------------------------------------------
// Profiler — start/stop wrapper around the runtime's trace capture
// ---------------------------------------------------------------------------

/// Starts and stops the runtime's trace capture into `<save_dir>/profile`.
///
/// Trace buffering and file formats belong to the runtime; the profiler only
/// guarantees that every start is paired with a stop.
///
/// # Example
/// ```ignore
/// let profiler = adapter.profiler("runs/exp1");
/// let y = profiler.profile(|| model.call(&x))?;
/// // trace files are now under runs/exp1/profile
/// ```
pub struct Profiler<R: Runtime> {
    runtime: Arc<R>,
    save_dir: PathBuf,
}

impl<R: Runtime> Profiler<R> {
    pub fn new(runtime: Arc<R>, save_dir: impl AsRef<Path>) -> Self {
        Self {
            runtime,
            save_dir: save_dir.as_ref().join(PROFILE_SUBDIR),
        }
    }

    /// Directory trace files are written to.
    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }

    pub fn start(&self) -> Result<()> {
        self.runtime.start_trace(&self.save_dir)
    }

    pub fn stop(&self) -> Result<()> {
        self.runtime.stop_trace()
    }

    /// Start capturing and return a guard that stops on drop.
    pub fn scope(&self) -> Result<ProfileScope<'_, R>> {
        self.start()?;
        Ok(ProfileScope {
            profiler: self,
            active: true,
        })
    }

    /// Run `f` with capture active. Capture stops whether `f` succeeds,
    /// fails or panics.
    pub fn profile<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let scope = self.scope()?;
        let out = f()?;
        scope.finish()?;
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// ProfileScope — RAII guard
// ---------------------------------------------------------------------------

/// Stops trace capture when dropped.
///
/// Drop cannot report errors; call [`finish`](Self::finish) to observe a
/// failing stop.
pub struct ProfileScope<'a, R: Runtime> {
    profiler: &'a Profiler<R>,
    active: bool,
}

impl<R: Runtime> ProfileScope<'_, R> {
    /// Stop capture now and surface any error from the runtime.
    pub fn finish(mut self) -> Result<()> {
        self.active = false;
        self.profiler.stop()
    }
}

impl<R: Runtime> Drop for ProfileScope<'_, R> {
    fn drop(&mut self) {
        if self.active {
            let _ = self.profiler.stop();
        }
    }
}
