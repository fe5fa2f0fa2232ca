//! Process spawning inside a pseudo-terminal.

use std::ffi::{OsStr, OsString};
use std::io;
use std::sync::mpsc::{self, Sender};
use std::thread;

use portable_pty::{CommandBuilder, ExitStatus, native_pty_system};
use tracing::{debug, warn};

use super::{
    ProcessControl, ProcessEvent, Reaped, Spawned, StreamName, drain_readers, pty_error, spawn_reader,
};
use crate::options::SpawnOptions;

/// Spawn `program` attached to a fresh PTY.
///
/// Stdout and stderr share the terminal, so every chunk is reported as
/// stdout. The PTY master is kept in the returned control for resizing.
pub(crate) fn spawn_pty(
    program: &OsStr,
    args: &[OsString],
    options: &SpawnOptions,
    events: Sender<ProcessEvent>,
) -> io::Result<Spawned> {
    let pty_system = native_pty_system();
    let pair = pty_system.openpty(options.pty_size.into()).map_err(pty_error)?;

    let mut cmd = CommandBuilder::new(program);
    cmd.args(args);

    // portable-pty falls back to $HOME when no cwd is given
    if let Some(cwd) = options.cwd.clone().or_else(|| std::env::current_dir().ok()) {
        cmd.cwd(cwd);
    }
    if let Some(env) = &options.env {
        cmd.env_clear();
        for (key, value) in env {
            cmd.env(key, value);
        }
    }
    if cmd.get_env("TERM").is_none() {
        cmd.env("TERM", "xterm");
    }
    warn_unsupported(options);

    debug!(?program, rows = options.pty_size.rows, cols = options.pty_size.cols, "spawning child process in pty");
    let mut child = pair.slave.spawn_command(cmd).map_err(pty_error)?;

    // Drop slave after spawning so the master sees EOF/EIO once the child exits
    drop(pair.slave);

    // Clone reader before take_writer
    let handles = pair
        .master
        .try_clone_reader()
        .and_then(|reader| Ok((reader, pair.master.take_writer()?)));
    let (reader, writer) = match handles {
        Ok(handles) => handles,
        Err(e) => {
            // The child is running but unreachable; don't leave it behind.
            warn!(err = %e, "pty handles unavailable; killing child");
            let _ = child.kill();
            let _ = child.wait();
            return Err(pty_error(e));
        }
    };

    let pid = child.process_id();
    let killer = child.clone_killer();

    let (done_tx, done_rx) = mpsc::channel();
    spawn_reader(reader, StreamName::Stdout, events.clone(), done_tx);

    let reaped = Reaped::default();
    let waiter_reaped = reaped.clone();
    thread::spawn(move || {
        let outcome = child.wait();
        waiter_reaped.mark();
        drain_readers(&done_rx, 1);

        let event = match outcome {
            Ok(status) => ProcessEvent::Exit {
                code: exit_code(&status),
            },
            Err(e) => ProcessEvent::Error {
                message: format!("wait for pty child process: {e}"),
            },
        };
        let _ = events.send(event);
    });

    Ok(Spawned {
        input: writer,
        control: ProcessControl::pty(pid, reaped, killer, pair.master),
    })
}

/// Exit code of a PTY child, `None` when a signal killed it.
///
/// portable-pty only exposes the signal through `Display`.
fn exit_code(status: &ExitStatus) -> Option<i32> {
    if status.to_string().starts_with("Terminated by") {
        return None;
    }
    i32::try_from(status.exit_code()).ok()
}

fn warn_unsupported(options: &SpawnOptions) {
    if options.argv0.is_some() || options.uid.is_some() || options.gid.is_some() {
        warn!("argv0, uid and gid are not supported in pty mode; ignoring");
    }
    if options.detached || options.windows_hide || options.windows_verbatim_arguments {
        debug!("detached and windows-only options are ignored in pty mode");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_of_normal_exit() {
        assert_eq!(exit_code(&ExitStatus::with_exit_code(0)), Some(0));
        assert_eq!(exit_code(&ExitStatus::with_exit_code(3)), Some(3));
    }

    #[test]
    fn test_exit_code_absent_after_signal() {
        assert_eq!(exit_code(&ExitStatus::with_signal("Killed")), None);
        assert_eq!(exit_code(&ExitStatus::with_signal("Interrupt")), None);
    }
}
