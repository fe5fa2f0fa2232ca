//! Spawn configuration.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Whether (and through which shell) to run the command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Shell {
    /// `false` runs the program directly, `true` uses the platform shell.
    Enabled(bool),
    /// Run through this shell program.
    Program(PathBuf),
}

impl Default for Shell {
    fn default() -> Self {
        Shell::Enabled(false)
    }
}

impl Shell {
    /// The shell program and the flags placed before the command line, if any.
    pub(crate) fn invocation(&self) -> Option<(PathBuf, Vec<&'static str>)> {
        let program = match self {
            Shell::Enabled(false) => return None,
            Shell::Enabled(true) => PathBuf::from(if cfg!(windows) { "cmd.exe" } else { "/bin/sh" }),
            Shell::Program(path) => path.clone(),
        };
        let is_cmd = program
            .file_stem()
            .is_some_and(|stem| stem.eq_ignore_ascii_case("cmd"));
        let flags = if is_cmd { vec!["/d", "/s", "/c"] } else { vec!["-c"] };
        Some((program, flags))
    }
}

/// Terminal dimensions for PTY-backed processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PtySize {
    pub rows: u16,
    pub cols: u16,
}

impl Default for PtySize {
    fn default() -> Self {
        Self { rows: 24, cols: 80 }
    }
}

impl From<PtySize> for portable_pty::PtySize {
    fn from(size: PtySize) -> Self {
        portable_pty::PtySize {
            rows: size.rows,
            cols: size.cols,
            pixel_width: 0,
            pixel_height: 0,
        }
    }
}

/// Options for [`spawn`](crate::spawn).
///
/// Everything defaults to "inherit from the current process". Options a
/// backend cannot honor (e.g. `uid` under a PTY) are logged and ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnOptions {
    /// Working directory of the child.
    pub cwd: Option<PathBuf>,
    /// Complete environment of the child. Replaces the inherited one when set.
    pub env: Option<HashMap<String, String>>,
    /// Value of `argv[0]` (unix, pipes only).
    pub argv0: Option<String>,
    /// Put the child in its own process group (unix).
    pub detached: bool,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub shell: Shell,
    pub windows_verbatim_arguments: bool,
    pub windows_hide: bool,
    /// Run inside a pseudo-terminal instead of plain pipes.
    pub pty: bool,
    pub pty_size: PtySize,
}

impl SpawnOptions {
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Add one variable to the child's environment.
    ///
    /// The first call switches the child from the inherited environment to
    /// an explicit one, like passing `env` directly.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_shell(mut self, shell: Shell) -> Self {
        self.shell = shell;
        self
    }

    pub fn with_pty(mut self, pty: bool) -> Self {
        self.pty = pty;
        self
    }

    pub fn with_pty_size(mut self, rows: u16, cols: u16) -> Self {
        self.pty_size = PtySize { rows, cols };
        self
    }
}
