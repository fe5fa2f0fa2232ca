//! Termination signals.

use std::fmt;
use std::str::FromStr;

use crate::error::TerminateError;

/// Signal sent by [`RunContext::terminate`](crate::RunContext::terminate).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Signal {
    #[default]
    Interrupt,
    Terminate,
    Kill,
    Hangup,
    Quit,
}

impl Signal {
    pub fn name(&self) -> &'static str {
        match self {
            Signal::Interrupt => "SIGINT",
            Signal::Terminate => "SIGTERM",
            Signal::Kill => "SIGKILL",
            Signal::Hangup => "SIGHUP",
            Signal::Quit => "SIGQUIT",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Signal {
    type Err = TerminateError;

    /// Accepts `SIGINT`, `INT`, `sigint`, ...
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let bare = upper.strip_prefix("SIG").unwrap_or(upper.as_str());
        match bare {
            "INT" => Ok(Signal::Interrupt),
            "TERM" => Ok(Signal::Terminate),
            "KILL" => Ok(Signal::Kill),
            "HUP" => Ok(Signal::Hangup),
            "QUIT" => Ok(Signal::Quit),
            _ => Err(TerminateError::UnknownSignal(s.to_string())),
        }
    }
}

#[cfg(unix)]
impl From<Signal> for nix::sys::signal::Signal {
    fn from(signal: Signal) -> Self {
        use nix::sys::signal::Signal as Nix;
        match signal {
            Signal::Interrupt => Nix::SIGINT,
            Signal::Terminate => Nix::SIGTERM,
            Signal::Kill => Nix::SIGKILL,
            Signal::Hangup => Nix::SIGHUP,
            Signal::Quit => Nix::SIGQUIT,
        }
    }
}

/// Deliver `signal` to `pid`. A process that is already gone is not an error.
#[cfg(unix)]
pub(crate) fn send_signal(pid: u32, signal: Signal) -> Result<(), TerminateError> {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return Err(TerminateError::Unsupported);
    };
    match kill(Pid::from_raw(raw), nix::sys::signal::Signal::from(signal)) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(TerminateError::Signal {
            signal: signal.name().to_string(),
            source: errno.into(),
        }),
    }
}

#[cfg(not(unix))]
pub(crate) fn send_signal(_pid: u32, _signal: Signal) -> Result<(), TerminateError> {
    Err(TerminateError::Unsupported)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_signal_is_interrupt() {
        assert_eq!(Signal::default(), Signal::Interrupt);
        assert_eq!(Signal::default().to_string(), "SIGINT");
    }

    #[test]
    fn test_parse_signal_names() {
        assert_eq!("SIGTERM".parse::<Signal>().unwrap(), Signal::Terminate);
        assert_eq!("kill".parse::<Signal>().unwrap(), Signal::Kill);
        assert_eq!("SigHup".parse::<Signal>().unwrap(), Signal::Hangup);
        assert!(matches!(
            "SIGWINCH".parse::<Signal>(),
            Err(TerminateError::UnknownSignal(name)) if name == "SIGWINCH"
        ));
    }
}
