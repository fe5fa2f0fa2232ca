//! Spawn child processes from async tests and drive them like a user would.
//!
//! [`spawn`] starts a program (optionally under a pseudo-terminal) and
//! returns a [`RunContext`]. The context accumulates stdout and stderr,
//! resolves futures when the output contains a pattern or the process
//! finishes, accepts input, and sends signals. [`RunContext::clean_result`]
//! runs the captured output through a [`Pipeline`] of sanitizers so it can be
//! compared against snapshots taken on another machine.
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use spawn_harness::{spawn, SpawnOptions};
//!
//! let run = spawn("sh", ["-c", "read name; echo hello $name"], SpawnOptions::default());
//! run.write("world\n")?;
//! run.output_contains("hello world").await?;
//! run.completion().await;
//! assert_eq!(run.result().code, Some(0));
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod keys;
pub mod logging;
pub mod options;
mod process;
pub mod run;
pub mod sanitize;

pub use error::{StreamError, TerminateError, Termination, WatchError};
pub use options::{PtySize, Shell, SpawnOptions};
pub use process::{Signal, StreamName};
pub use run::{spawn, Pattern, Phase, RunContext, RunResult};
pub use sanitize::{Pipeline, SanitizeContext, Sanitizer};
