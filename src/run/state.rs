//! Run state machine.
//!
//! Owns everything a run context knows about its child: captured output,
//! the match buffer, pending watches, and the completion signal. It only
//! changes in response to a [`ProcessEvent`] or an explicit call from the
//! owning context, one at a time under the context's lock.

use tokio::sync::{oneshot, watch};
use tracing::{debug, trace};

use super::result::RunResult;
use super::watch::{Pattern, WatchOutcome, WatchRequest};
use crate::error::Termination;
use crate::options::PtySize;
use crate::process::{ProcessEvent, StreamName};
use crate::sanitize::builtin::strip_ansi;

/// Lines of scrollback kept by the PTY screen model.
const SCREEN_SCROLLBACK: usize = 1000;

/// Lifecycle of a run context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Launch in progress.
    Starting,
    /// Launched; waiting for exit or error.
    Running,
    /// Exited or errored. Terminal.
    Finished,
}

/// Emits at `debug` when the context has debug logging on, `trace` otherwise.
macro_rules! chatty {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            debug!($($arg)+);
        } else {
            trace!($($arg)+);
        }
    };
}

pub(crate) struct RunState {
    phase: Phase,
    result: RunResult,
    /// Combined output since the last clear, used only for watches.
    match_buffer: String,
    /// In registration order.
    pending: Vec<WatchRequest>,
    termination: Option<Termination>,
    failure: Option<String>,
    verbose: bool,
    capture_stdout: bool,
    capture_stderr: bool,
    /// Terminal emulation of PTY output.
    screen: Option<vt100::Parser>,
    completion: watch::Sender<bool>,
}

impl RunState {
    pub(crate) fn new(completion: watch::Sender<bool>, pty_size: Option<PtySize>) -> Self {
        Self {
            phase: Phase::Starting,
            result: RunResult::default(),
            match_buffer: String::new(),
            pending: Vec::new(),
            termination: None,
            failure: None,
            verbose: false,
            capture_stdout: true,
            capture_stderr: true,
            screen: pty_size.map(|size| vt100::Parser::new(size.rows, size.cols, SCREEN_SCROLLBACK)),
            completion,
        }
    }

    pub(crate) fn phase(&self) -> Phase {
        self.phase
    }

    pub(crate) fn result(&self) -> RunResult {
        self.result.clone()
    }

    pub(crate) fn failure(&self) -> Option<String> {
        self.failure.clone()
    }

    pub(crate) fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Starting -> Running. A context that already finished stays finished.
    pub(crate) fn mark_running(&mut self, pid: Option<u32>) {
        if self.phase == Phase::Starting {
            self.phase = Phase::Running;
            chatty!(self.verbose, ?pid, "process running");
        }
    }

    pub(crate) fn handle(&mut self, event: ProcessEvent) {
        match event {
            ProcessEvent::Output { stream, chunk } => self.on_output(stream, &chunk),
            ProcessEvent::Exit { code } => {
                if self.phase == Phase::Finished {
                    return;
                }
                self.result.code = code;
                self.finish(Termination::Exited);
            }
            ProcessEvent::Error { message } => {
                if self.phase == Phase::Finished {
                    return;
                }
                debug!(err = %message, "child process errored");
                self.result.error = true;
                self.failure = Some(message);
                self.finish(Termination::Errored);
            }
        }
    }

    fn on_output(&mut self, stream: StreamName, chunk: &str) {
        let target = match stream {
            StreamName::Stdout if self.capture_stdout => &mut self.result.stdout,
            StreamName::Stderr if self.capture_stderr => &mut self.result.stderr,
            _ => {
                trace!(%stream, bytes = chunk.len(), "dropping output from closed stream");
                return;
            }
        };
        target.push_str(chunk);
        self.match_buffer.push_str(chunk);
        if let Some(screen) = self.screen.as_mut() {
            screen.process(chunk.as_bytes());
        }
        chatty!(self.verbose, %stream, chunk, "received output");

        self.check_pending();
    }

    /// Fulfill every pending watch whose pattern now appears in the stripped match buffer.
    fn check_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let haystack = strip_ansi(&self.match_buffer);
        let (met, unmet): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|request| request.pattern.is_found_in(&haystack));
        self.pending = unmet;

        for request in met {
            chatty!(self.verbose, pattern = %request.pattern, "output contains pattern");
            request.fulfill();
        }
    }

    /// Single entry point into `Finished`. Callers guard against re-entry.
    fn finish(&mut self, reason: Termination) {
        self.phase = Phase::Finished;
        self.termination = Some(reason);
        chatty!(
            self.verbose,
            %reason,
            code = ?self.result.code,
            error = self.result.error,
            stdout_bytes = self.result.stdout.len(),
            stderr_bytes = self.result.stderr.len(),
            "process finished"
        );

        self.completion.send_replace(true);
        for request in std::mem::take(&mut self.pending) {
            chatty!(self.verbose, pattern = %request.pattern, %reason, "watch unmet");
            request.fail(reason);
        }
    }

    /// Register a watch. Only output arriving after this call is considered.
    pub(crate) fn register(&mut self, pattern: Pattern) -> oneshot::Receiver<WatchOutcome> {
        chatty!(self.verbose, %pattern, "waiting for output");
        let (request, rx) = WatchRequest::new(pattern);
        match self.termination {
            Some(reason) => request.fail(reason),
            None => self.pending.push(request),
        }
        rx
    }

    pub(crate) fn clear_match_buffer(&mut self) {
        self.match_buffer.clear();
    }

    pub(crate) fn stop_capturing(&mut self, stream: StreamName) {
        match stream {
            StreamName::Stdout => self.capture_stdout = false,
            StreamName::Stderr => self.capture_stderr = false,
            StreamName::Stdin => {}
        }
    }

    pub(crate) fn screen_contents(&self) -> Option<String> {
        self.screen.as_ref().map(|parser| parser.screen().contents())
    }

    pub(crate) fn resize_screen(&mut self, size: PtySize) {
        if let Some(parser) = self.screen.as_mut() {
            parser.screen_mut().set_size(size.rows, size.cols);
        }
    }

    /// Finish with an error unless a terminal event already arrived.
    pub(crate) fn abandon(&mut self, message: &str) {
        if self.phase != Phase::Finished {
            self.handle(ProcessEvent::Error {
                message: message.to_string(),
            });
        }
    }
}

impl Drop for RunState {
    fn drop(&mut self) {
        // Pending senders drop here; their futures see Abandoned.
        if !self.pending.is_empty() {
            debug!(count = self.pending.len(), "dropping unsettled watches");
        }
    }
}
