//! Run contexts: one spawned child process and everything captured from it.
//!
//! - `state`: the state machine fed by process events
//! - `watch`: patterns and pending `output_contains` requests
//! - `result`: the captured-output snapshot

mod result;
mod state;
mod watch;

use std::ffi::{OsStr, OsString};
use std::future::Future;
use std::io::Write;
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use crossterm::event::{KeyCode, KeyModifiers};
use tracing::{debug, warn};

use crate::error::{StreamError, TerminateError, WatchError};
use crate::keys::key_bytes;
use crate::options::{PtySize, SpawnOptions};
use crate::process::{self, ProcessControl, ProcessEvent, Signal, StreamName};
use crate::sanitize::{self, Pipeline, SanitizeContext};

pub use self::result::RunResult;
pub use self::state::Phase;
pub use self::watch::Pattern;
use self::state::RunState;

/// Run a child process and return a [`RunContext`] to interact with it.
///
/// Never fails: a process that cannot be launched yields a context whose
/// result has `error` set and whose completion has already fired (or is
/// about to).
///
/// # Example
/// ```no_run
/// # async fn demo() {
/// use spawn_harness::{spawn, SpawnOptions};
///
/// let run = spawn("sh", ["-c", "echo hi"], SpawnOptions::default());
/// run.completion().await;
/// assert_eq!(run.result().stdout, "hi\n");
/// # }
/// ```
pub fn spawn<I, S>(program: impl AsRef<OsStr>, args: I, options: SpawnOptions) -> RunContext
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let program = program.as_ref().to_os_string();
    let args: Vec<OsString> = args.into_iter().map(|arg| arg.as_ref().to_os_string()).collect();

    let (completion_tx, completion_rx) = tokio::sync::watch::channel(false);
    let screen_size = options.pty.then_some(options.pty_size);
    let state = Arc::new(Mutex::new(RunState::new(completion_tx, screen_size)));

    let (events_tx, events_rx) = mpsc::channel();
    dispatch_events(Arc::clone(&state), events_rx);

    let (input, control) = match process::start(&program, &args, &options, events_tx.clone()) {
        Ok(spawned) => {
            lock(&state).mark_running(spawned.control.pid());
            (Some(spawned.input), Some(spawned.control))
        }
        Err(e) => {
            warn!(?program, err = %e, "failed to launch child process");
            let _ = events_tx.send(ProcessEvent::Error {
                message: e.to_string(),
            });
            (None, None)
        }
    };

    RunContext {
        state,
        completion: completion_rx,
        input: Mutex::new(input),
        control: Mutex::new(control),
        pty: options.pty,
    }
}

/// Apply process events to the run state one at a time, in arrival order.
///
/// Runs inside the span that was current at `spawn`, so chunk and lifecycle
/// events are attributed to the caller.
fn dispatch_events(state: Arc<Mutex<RunState>>, events: Receiver<ProcessEvent>) {
    let span = tracing::Span::current();
    thread::spawn(move || {
        let _entered = span.enter();
        for event in events {
            lock(&state).handle(event);
        }
        // Every sender is gone; nothing can finish the run any more.
        lock(&state).abandon("process event channel closed");
    });
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Live handle to one spawned child process.
pub struct RunContext {
    state: Arc<Mutex<RunState>>,
    completion: tokio::sync::watch::Receiver<bool>,
    input: Mutex<Option<Box<dyn Write + Send>>>,
    control: Mutex<Option<ProcessControl>>,
    pty: bool,
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("phase", &self.phase())
            .field("pty", &self.pty)
            .finish_non_exhaustive()
    }
}

impl RunContext {
    /// Log received chunks and lifecycle events at `debug` level.
    pub fn debug(self) -> Self {
        lock(&self.state).set_verbose(true);
        self
    }

    /// Snapshot of everything captured so far.
    pub fn result(&self) -> RunResult {
        lock(&self.state).result()
    }

    /// [`result`](Self::result) with the process-wide sanitizer pipeline
    /// applied, relative to the current working directory.
    pub fn clean_result(&self) -> RunResult {
        let pipeline = sanitize::snapshot();
        self.clean_result_with(&pipeline, &SanitizeContext::current())
    }

    pub fn clean_result_with(&self, pipeline: &Pipeline, ctx: &SanitizeContext) -> RunResult {
        self.result().sanitized(pipeline, ctx)
    }

    pub fn phase(&self) -> Phase {
        lock(&self.state).phase()
    }

    /// Why the process errored, if it did.
    pub fn failure(&self) -> Option<String> {
        lock(&self.state).failure()
    }

    pub fn pid(&self) -> Option<u32> {
        lock(&self.control).as_ref().and_then(ProcessControl::pid)
    }

    /// Resolves once the process has exited or errored.
    pub fn completion(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.completion.clone();
        async move {
            while !*rx.borrow_and_update() {
                if rx.changed().await.is_err() {
                    return;
                }
            }
        }
    }

    /// Resolves once the combined output (ANSI sequences ignored) contains
    /// the literal or matches the regex.
    ///
    /// The watch is registered immediately, but only output arriving after
    /// this call triggers a check. Fails with [`WatchError::Unmet`] when the
    /// process finishes first.
    pub fn output_contains(
        &self,
        pattern: impl Into<Pattern>,
    ) -> impl Future<Output = Result<(), WatchError>> + Send + 'static {
        let rx = lock(&self.state).register(pattern.into());
        async move { rx.await.unwrap_or(Err(WatchError::Abandoned)) }
    }

    /// Forget output seen so far for the purpose of future watches.
    pub fn clear_match_buffer(&self) {
        lock(&self.state).clear_match_buffer();
    }

    /// Write into the child's stdin.
    pub fn write(&self, data: impl AsRef<[u8]>) -> Result<(), StreamError> {
        let mut input = lock(&self.input);
        let writer = input.as_mut().ok_or(StreamError::Closed(StreamName::Stdin))?;
        writer.write_all(data.as_ref())?;
        writer.flush()?;
        Ok(())
    }

    /// Write the terminal encoding of a key press. Returns `false` for keys
    /// with no encoding.
    pub fn write_key(&self, code: KeyCode, modifiers: KeyModifiers) -> Result<bool, StreamError> {
        match key_bytes(code, modifiers) {
            Some(bytes) => self.write(bytes).map(|()| true),
            None => Ok(false),
        }
    }

    /// Close `"stdin"`, `"stdout"`, or `"stderr"` (any case).
    pub fn close(&self, stream: &str) -> Result<(), StreamError> {
        self.close_stream(stream.parse()?)
    }

    /// Closing stdin sends EOF to the child. Closing stdout or stderr stops
    /// capturing it.
    pub fn close_stream(&self, stream: StreamName) -> Result<(), StreamError> {
        match stream {
            StreamName::Stdin => {
                if lock(&self.input).take().is_some() {
                    debug!("closed child stdin");
                }
            }
            StreamName::Stderr if self.pty => return Err(StreamError::Unavailable(stream)),
            StreamName::Stdout | StreamName::Stderr => lock(&self.state).stop_capturing(stream),
        }
        Ok(())
    }

    /// Send `signal` to the child if it is still running.
    ///
    /// Pending watches settle when the resulting exit is observed, not here.
    pub fn terminate(&self, signal: Signal) -> Result<(), TerminateError> {
        if self.phase() == Phase::Finished {
            return Ok(());
        }
        let mut guard = lock(&self.control);
        let Some(control) = guard.as_mut() else {
            return Ok(());
        };
        debug!(%signal, pid = ?control.pid(), "terminating child process");
        control.signal(signal)
    }

    /// `terminate(Signal::Interrupt)`.
    pub fn interrupt(&self) -> Result<(), TerminateError> {
        self.terminate(Signal::Interrupt)
    }

    /// Resize the pseudo-terminal and its screen model.
    pub fn resize(&self, rows: u16, cols: u16) -> Result<(), StreamError> {
        if !self.pty {
            return Err(StreamError::NotATerminal);
        }
        let size = PtySize { rows, cols };
        if let Some(control) = lock(&self.control).as_ref() {
            control.resize(size)?;
        }
        lock(&self.state).resize_screen(size);
        Ok(())
    }

    /// Rendered terminal screen. `None` unless spawned with `pty`.
    pub fn screen_contents(&self) -> Option<String> {
        lock(&self.state).screen_contents()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use tracing_test::traced_test;

    use super::*;

    #[tokio::test]
    #[traced_test]
    async fn test_debug_raises_chunk_logging_from_then_on() {
        let run = spawn(
            "sh",
            ["-c", "read a; echo before-debug; read b; echo after-debug"],
            SpawnOptions::default(),
        );
        let first = run.output_contains("before-debug");
        run.write("\n").unwrap();
        tokio::time::timeout(Duration::from_secs(10), first).await.unwrap().unwrap();

        let run = run.debug();
        let second = run.output_contains("after-debug");
        run.write("\n").unwrap();
        tokio::time::timeout(Duration::from_secs(10), second).await.unwrap().unwrap();
        tokio::time::timeout(Duration::from_secs(10), run.completion()).await.unwrap();

        logs_assert(|lines: &[&str]| {
            let chunk_at_debug = |needle: &str| {
                lines
                    .iter()
                    .any(|line| line.contains("DEBUG") && line.contains("received output") && line.contains(needle))
            };
            if chunk_at_debug("before-debug") {
                return Err("chunk logged at debug before debug() was called".to_string());
            }
            if !chunk_at_debug("after-debug") {
                return Err("chunk not logged at debug after debug() was called".to_string());
            }
            Ok(())
        });
    }
}
