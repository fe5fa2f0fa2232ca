//! Plain-pipe spawning.

use std::ffi::{OsStr, OsString};
use std::io;
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Sender};
use std::thread;

use tracing::debug;

use super::{ProcessControl, ProcessEvent, Reaped, Spawned, StreamName, drain_readers, spawn_reader};
use crate::options::SpawnOptions;

/// Spawn `program` with piped stdio.
///
/// One reader thread per output stream plus a waiter thread. The waiter
/// reports the exit once both readers hit end of stream, or after a short
/// grace period when a surviving descendant still holds the pipes.
pub(crate) fn spawn_piped(
    program: &OsStr,
    args: &[OsString],
    options: &SpawnOptions,
    events: Sender<ProcessEvent>,
) -> io::Result<Spawned> {
    let mut cmd = Command::new(program);
    add_args(&mut cmd, args, options);
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    if let Some(cwd) = &options.cwd {
        cmd.current_dir(cwd);
    }
    if let Some(env) = &options.env {
        cmd.env_clear().envs(env);
    }
    apply_platform_options(&mut cmd, options);

    debug!(?program, "spawning child process over pipes");
    let mut child = cmd.spawn()?;
    let pid = child.id();

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| io::Error::other("stdin was not piped"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("stderr was not piped"))?;

    let (done_tx, done_rx) = mpsc::channel();
    spawn_reader(stdout, StreamName::Stdout, events.clone(), done_tx.clone());
    spawn_reader(stderr, StreamName::Stderr, events.clone(), done_tx);

    let reaped = Reaped::default();
    let waiter_reaped = reaped.clone();
    thread::spawn(move || {
        let outcome = child.wait();
        waiter_reaped.mark();
        drain_readers(&done_rx, 2);

        let event = match outcome {
            Ok(status) => ProcessEvent::Exit {
                code: status.code(),
            },
            Err(e) => ProcessEvent::Error {
                message: format!("wait for child process: {e}"),
            },
        };
        let _ = events.send(event);
    });

    Ok(Spawned {
        input: Box::new(stdin),
        control: ProcessControl::piped(pid, reaped),
    })
}

#[cfg(windows)]
fn add_args(cmd: &mut Command, args: &[OsString], options: &SpawnOptions) {
    use std::os::windows::process::CommandExt;

    if options.windows_verbatim_arguments {
        for arg in args {
            cmd.raw_arg(arg);
        }
    } else {
        cmd.args(args);
    }
}

#[cfg(not(windows))]
fn add_args(cmd: &mut Command, args: &[OsString], _options: &SpawnOptions) {
    cmd.args(args);
}

#[cfg(unix)]
fn apply_platform_options(cmd: &mut Command, options: &SpawnOptions) {
    use std::os::unix::process::CommandExt;

    if let Some(argv0) = &options.argv0 {
        cmd.arg0(argv0);
    }
    if let Some(uid) = options.uid {
        cmd.uid(uid);
    }
    if let Some(gid) = options.gid {
        cmd.gid(gid);
    }
    if options.detached {
        cmd.process_group(0);
    }
    if options.windows_hide || options.windows_verbatim_arguments {
        debug!("ignoring windows-only spawn options");
    }
}

#[cfg(windows)]
fn apply_platform_options(cmd: &mut Command, options: &SpawnOptions) {
    use std::os::windows::process::CommandExt;

    const DETACHED_PROCESS: u32 = 0x0000_0008;
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;

    let mut flags = 0;
    if options.detached {
        flags |= DETACHED_PROCESS;
    }
    if options.windows_hide {
        flags |= CREATE_NO_WINDOW;
    }
    if flags != 0 {
        cmd.creation_flags(flags);
    }
    if options.argv0.is_some() || options.uid.is_some() || options.gid.is_some() {
        tracing::warn!("argv0, uid and gid are not supported on windows; ignoring");
    }
}

#[cfg(not(any(unix, windows)))]
fn apply_platform_options(_cmd: &mut Command, options: &SpawnOptions) {
    if options.argv0.is_some() || options.uid.is_some() || options.gid.is_some() || options.detached {
        tracing::warn!("platform-specific spawn options are not supported here; ignoring");
    }
}
