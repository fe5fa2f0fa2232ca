//! Captured output snapshot.

use serde::{Deserialize, Serialize};

use crate::sanitize::{Pipeline, SanitizeContext};

/// Everything a run context has captured so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    /// All of the stdout the process has written so far.
    pub stdout: String,
    /// All of the stderr the process has written so far. Always empty in PTY mode.
    pub stderr: String,
    /// Exit status, once the process has exited. `None` after a signal kill.
    pub code: Option<i32>,
    /// Whether the process failed to launch or errored out.
    pub error: bool,
}

impl RunResult {
    /// Same result with `pipeline` run over stdout and stderr independently.
    pub fn sanitized(&self, pipeline: &Pipeline, ctx: &SanitizeContext) -> RunResult {
        RunResult {
            stdout: pipeline.apply(&self.stdout, ctx),
            stderr: pipeline.apply(&self.stderr, ctx),
            code: self.code,
            error: self.error,
        }
    }
}
