//! Child process transport.
//!
//! Spawns the child over plain pipes (`pipe`) or a pseudo-terminal (`pty`)
//! and turns everything observed about it into [`ProcessEvent`]s:
//! - output chunks, decoded incrementally (`decode`)
//! - exactly one terminal event, sent once the child is reaped and its
//!   output readers have drained (or a short grace period has passed)
//!
//! Signal delivery lives in `signal`.

mod decode;
mod pipe;
mod pty;
mod signal;

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io::{self, Read, Write};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::error::{StreamError, TerminateError};
use crate::options::{PtySize, Shell, SpawnOptions};

use self::decode::Utf8Decoder;
pub use self::signal::Signal;

/// One of the child's standard streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamName {
    Stdin,
    Stdout,
    Stderr,
}

impl fmt::Display for StreamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdin => write!(f, "stdin"),
            Self::Stdout => write!(f, "stdout"),
            Self::Stderr => write!(f, "stderr"),
        }
    }
}

impl FromStr for StreamName {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stdin" => Ok(Self::Stdin),
            "stdout" => Ok(Self::Stdout),
            "stderr" => Ok(Self::Stderr),
            _ => Err(StreamError::InvalidName(s.to_string())),
        }
    }
}

/// Something the transport observed about the child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ProcessEvent {
    Output { stream: StreamName, chunk: String },
    /// `code` is `None` when the child was killed by a signal.
    Exit { code: Option<i32> },
    Error { message: String },
}

/// Handles kept by the run context after a successful launch.
pub(crate) struct Spawned {
    pub input: Box<dyn Write + Send>,
    pub control: ProcessControl,
}

/// How long the waiter lets output readers drain once the child is reaped.
///
/// A descendant that inherited the child's stdout keeps the pipe open after
/// the child exits; its later output still arrives, just after the exit.
const DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Set by the waiter as soon as the child has been reaped. Its pid may be
/// reused from then on.
#[derive(Debug, Clone, Default)]
pub(crate) struct Reaped(Arc<AtomicBool>);

impl Reaped {
    fn mark(&self) {
        self.0.store(true, Ordering::Release);
    }

    fn get(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Out-of-band control over a running child: signals and terminal size.
pub(crate) struct ProcessControl {
    pid: Option<u32>,
    reaped: Reaped,
    killer: Option<Box<dyn portable_pty::ChildKiller + Send + Sync>>,
    master: Option<Box<dyn portable_pty::MasterPty + Send>>,
}

impl ProcessControl {
    fn piped(pid: u32, reaped: Reaped) -> Self {
        Self {
            pid: Some(pid),
            reaped,
            killer: None,
            master: None,
        }
    }

    fn pty(
        pid: Option<u32>,
        reaped: Reaped,
        killer: Box<dyn portable_pty::ChildKiller + Send + Sync>,
        master: Box<dyn portable_pty::MasterPty + Send>,
    ) -> Self {
        Self {
            pid,
            reaped,
            killer: Some(killer),
            master: Some(master),
        }
    }

    pub(crate) fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Deliver `signal` unless the child has already been reaped.
    pub(crate) fn signal(&mut self, signal: Signal) -> Result<(), TerminateError> {
        if self.reaped.get() {
            trace!(%signal, "child already reaped; not signalling");
            return Ok(());
        }
        if let Some(pid) = self.pid.filter(|_| cfg!(unix)) {
            return signal::send_signal(pid, signal);
        }

        match self.killer.as_mut() {
            Some(killer) => killer.kill().map_err(|source| TerminateError::Signal {
                signal: signal.name().to_string(),
                source,
            }),
            None => Err(TerminateError::Unsupported),
        }
    }

    pub(crate) fn resize(&self, size: PtySize) -> Result<(), StreamError> {
        let master = self.master.as_ref().ok_or(StreamError::NotATerminal)?;
        master
            .resize(size.into())
            .map_err(|e| StreamError::Pty(e.to_string()))
    }
}

/// Launch `program` according to `options`, reporting everything it does on `events`.
pub(crate) fn start(
    program: &OsStr,
    args: &[OsString],
    options: &SpawnOptions,
    events: Sender<ProcessEvent>,
) -> io::Result<Spawned> {
    let (program, args) = resolve_command(program, args, &options.shell);
    if options.pty {
        pty::spawn_pty(&program, &args, options, events)
    } else {
        pipe::spawn_piped(&program, &args, options, events)
    }
}

/// With a shell, the program and its arguments become one command line.
fn resolve_command(program: &OsStr, args: &[OsString], shell: &Shell) -> (OsString, Vec<OsString>) {
    let Some((shell_program, flags)) = shell.invocation() else {
        return (program.to_os_string(), args.to_vec());
    };

    let mut line = program.to_os_string();
    for arg in args {
        line.push(" ");
        line.push(arg);
    }
    let mut argv: Vec<OsString> = flags.into_iter().map(OsString::from).collect();
    argv.push(line);
    (shell_program.into_os_string(), argv)
}

/// Read `reader` to end of stream, forwarding decoded chunks as events.
///
/// Read errors end the stream; a PTY master reports EIO once the child is gone.
fn pump_output<R: Read>(mut reader: R, stream: StreamName, events: Sender<ProcessEvent>) {
    let mut buf = [0u8; 4096];
    let mut decoder = Utf8Decoder::default();
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                let chunk = decoder.decode(&buf[..n]);
                if chunk.is_empty() {
                    continue;
                }
                if events.send(ProcessEvent::Output { stream, chunk }).is_err() {
                    return;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                trace!(%stream, err = %e, "output stream ended with error");
                break;
            }
        }
    }

    let rest = decoder.finish();
    if !rest.is_empty() {
        let _ = events.send(ProcessEvent::Output { stream, chunk: rest });
    }
}

/// Pump `reader` on its own thread, reporting on `done` once it hits end of stream.
fn spawn_reader<R>(reader: R, stream: StreamName, events: Sender<ProcessEvent>, done: Sender<()>)
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        pump_output(reader, stream, events);
        let _ = done.send(());
    });
}

/// Wait for `readers` end-of-stream reports, giving up after [`DRAIN_GRACE`].
fn drain_readers(done: &Receiver<()>, readers: usize) {
    let deadline = Instant::now() + DRAIN_GRACE;
    for drained in 0..readers {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if done.recv_timeout(remaining).is_err() {
            debug!(drained, readers, "output still open after child exit; reporting exit now");
            return;
        }
    }
}

fn pty_error(err: impl fmt::Display) -> io::Error {
    io::Error::other(err.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;

    #[test]
    fn test_stream_name_parse_is_case_insensitive() {
        assert_eq!("STDIN".parse::<StreamName>().unwrap(), StreamName::Stdin);
        assert_eq!("Stdout".parse::<StreamName>().unwrap(), StreamName::Stdout);
        assert!(matches!(
            "stdio".parse::<StreamName>(),
            Err(StreamError::InvalidName(name)) if name == "stdio"
        ));
    }

    #[test]
    fn test_resolve_command_without_shell() {
        let (program, args) = resolve_command(
            OsStr::new("echo"),
            &[OsString::from("hi")],
            &Shell::Enabled(false),
        );
        assert_eq!(program, OsString::from("echo"));
        assert_eq!(args, vec![OsString::from("hi")]);
    }

    #[test]
    fn test_resolve_command_joins_line_for_shell() {
        let (program, args) = resolve_command(
            OsStr::new("echo"),
            &[OsString::from("$HOME"), OsString::from("x")],
            &Shell::Program("/bin/bash".into()),
        );
        assert_eq!(program, OsString::from("/bin/bash"));
        assert_eq!(args, vec![OsString::from("-c"), OsString::from("echo $HOME x")]);
    }

    #[test]
    fn test_drain_readers_stops_at_grace_period() {
        let (done_tx, done_rx) = mpsc::channel();
        done_tx.send(()).unwrap();

        // second reader never reports; sender stays alive
        let started = Instant::now();
        drain_readers(&done_rx, 2);
        let waited = started.elapsed();
        assert!(waited >= DRAIN_GRACE / 2, "returned early: {waited:?}");
        assert!(waited < Duration::from_secs(5), "waited too long: {waited:?}");
        drop(done_tx);
    }

    #[test]
    fn test_drain_readers_returns_once_all_report() {
        let (done_tx, done_rx) = mpsc::channel();
        done_tx.send(()).unwrap();
        done_tx.send(()).unwrap();

        let started = Instant::now();
        drain_readers(&done_rx, 2);
        assert!(started.elapsed() < DRAIN_GRACE);
    }

    #[test]
    fn test_reaped_child_is_not_signalled() {
        let reaped = Reaped::default();
        // not a valid pid: delivery would fail with Unsupported
        let mut control = ProcessControl::piped(u32::MAX, reaped.clone());
        reaped.mark();
        assert!(control.signal(Signal::Kill).is_ok());
    }

    #[test]
    fn test_pump_output_forwards_chunks_in_order() {
        let (tx, rx) = mpsc::channel();
        pump_output(&b"hello"[..], StreamName::Stderr, tx);
        let events: Vec<ProcessEvent> = rx.iter().collect();
        assert_eq!(
            events,
            vec![ProcessEvent::Output {
                stream: StreamName::Stderr,
                chunk: "hello".to_string()
            }]
        );
    }
}
