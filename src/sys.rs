//! System utilities: home resolution, path normalisation, process groups and
//! signal relay.

use std::path::{Component, Path, PathBuf};
use std::process::{Child, Command, ExitStatus};
#[cfg(unix)]
use std::sync::{Arc, Mutex};
#[cfg(unix)]
use std::time::Duration;

use crate::{Error, Result};

/// Resolve the user's home directory.
///
/// `HOME` wins when it is set and non-empty; otherwise the platform lookup
/// from the `dirs` crate is used.
pub fn home_dir() -> Result<PathBuf> {
    if let Some(home) = std::env::var_os("HOME") {
        if !home.is_empty() {
            return Ok(PathBuf::from(home));
        }
    }
    dirs::home_dir().ok_or_else(|| {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "could not determine home directory",
        ))
    })
}

/// Make `path` absolute against `base` and normalise it lexically.
///
/// `.` components are dropped and `..` pops the previous component. Symlinks
/// are not followed, so the path does not need to exist. Returns `None` when
/// `..` would climb above the filesystem root.
pub fn absolutize(path: &Path, base: &Path) -> Option<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
            Component::RootDir => normalized.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() || !normalized.has_root() {
                    return None;
                }
            }
            Component::Normal(part) => normalized.push(part),
        }
    }

    if normalized.has_root() {
        Some(normalized)
    } else {
        None
    }
}

/// Map a child's exit status to the code this process should exit with.
///
/// A normal exit yields its code. A child killed by signal `s` yields the
/// shell convention `128 + s`.
pub fn exit_code_from_status(status: &ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

/// Signals relayed from this process to a running child.
#[cfg(unix)]
pub const FORWARDED_SIGNALS: [i32; 4] = [
    signal_hook::consts::SIGINT,
    signal_hook::consts::SIGTERM,
    signal_hook::consts::SIGHUP,
    signal_hook::consts::SIGQUIT,
];

/// How often a waiting parent polls the child for exit.
#[cfg(unix)]
const REAP_INTERVAL: Duration = Duration::from_millis(20);

/// Put the spawned child at the head of a new process group.
///
/// The group id equals the child's pid, which is what
/// [`SignalForwarder::forward_to`] and [`Foreground::hand_to`] expect.
pub fn isolate_process_group(command: &mut Command) {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    #[cfg(not(unix))]
    let _ = command;
}

/// Relays termination signals received by this process to a child's
/// process group.
///
/// Install it before spawning so a signal that arrives in between is queued
/// rather than killing this process and orphaning the child; then call
/// [`SignalForwarder::forward_to`] with the child's group id and reap the
/// child through [`SignalForwarder::wait`].
#[cfg(unix)]
pub struct SignalForwarder {
    signals: Option<signal_hook::iterator::Signals>,
    handle: signal_hook::iterator::Handle,
    thread: Option<std::thread::JoinHandle<()>>,
    /// True while the group leader has not been reaped. The relay only sends
    /// while holding this lock, so a reaped (and reusable) id is never hit.
    live: Arc<Mutex<bool>>,
}

#[cfg(unix)]
impl SignalForwarder {
    /// Register handlers for [`FORWARDED_SIGNALS`].
    pub fn install() -> Result<Self> {
        let signals = signal_hook::iterator::Signals::new(FORWARDED_SIGNALS)?;
        let handle = signals.handle();
        Ok(Self {
            signals: Some(signals),
            handle,
            thread: None,
            live: Arc::new(Mutex::new(true)),
        })
    }

    /// Start relaying queued and future signals to process group `pgid`.
    pub fn forward_to(&mut self, pgid: u32) {
        use nix::errno::Errno;
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let Some(mut signals) = self.signals.take() else {
            return;
        };
        let live = Arc::clone(&self.live);
        let group = Pid::from_raw(-(pgid as i32));
        self.thread = Some(std::thread::spawn(move || {
            for raw in signals.forever() {
                let Ok(signal) = Signal::try_from(raw) else {
                    continue;
                };
                let alive = live.lock().unwrap_or_else(|e| e.into_inner());
                if !*alive {
                    break;
                }
                tracing::debug!(?signal, pgid, "forwarding signal to child group");
                match kill(group, signal) {
                    Ok(()) | Err(Errno::ESRCH) => {}
                    Err(e) => tracing::warn!(?signal, pgid, "failed to forward signal: {}", e),
                }
            }
        }));
    }

    /// Wait for `child` to exit.
    ///
    /// The child is reaped under the relay lock, so no signal is sent to its
    /// id once it may have been recycled.
    pub fn wait(&self, child: &mut Child) -> std::io::Result<ExitStatus> {
        loop {
            {
                let mut live = self.live.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(status) = child.try_wait()? {
                    *live = false;
                    return Ok(status);
                }
            }
            std::thread::sleep(REAP_INTERVAL);
        }
    }

    /// Stop relaying and wait for the relay thread to finish.
    pub fn stop(mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Signal forwarding is a no-op where Unix signals do not exist.
#[cfg(not(unix))]
pub struct SignalForwarder;

#[cfg(not(unix))]
impl SignalForwarder {
    pub fn install() -> Result<Self> {
        Ok(Self)
    }

    pub fn forward_to(&mut self, _pgid: u32) {}

    pub fn wait(&self, child: &mut Child) -> std::io::Result<ExitStatus> {
        child.wait()
    }

    pub fn stop(self) {}
}

/// A controlling terminal this process can hand over.
#[cfg(unix)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminal {
    Stdin,
    Stdout,
}

#[cfg(unix)]
impl Terminal {
    /// Prefer stdin, fall back to stdout.
    fn attached() -> Option<Self> {
        use std::io::IsTerminal;

        if std::io::stdin().is_terminal() {
            Some(Terminal::Stdin)
        } else if std::io::stdout().is_terminal() {
            Some(Terminal::Stdout)
        } else {
            None
        }
    }

    fn foreground(self) -> nix::Result<nix::unistd::Pid> {
        match self {
            Terminal::Stdin => nix::unistd::tcgetpgrp(std::io::stdin()),
            Terminal::Stdout => nix::unistd::tcgetpgrp(std::io::stdout()),
        }
    }

    fn set_foreground(self, pgrp: nix::unistd::Pid) -> nix::Result<()> {
        match self {
            Terminal::Stdin => nix::unistd::tcsetpgrp(std::io::stdin(), pgrp),
            Terminal::Stdout => nix::unistd::tcsetpgrp(std::io::stdout(), pgrp),
        }
    }
}

/// Terminal foreground handed to a child's process group.
///
/// Only taken when this process is the terminal's foreground group, so
/// keyboard signals and terminal input reach the child alone. Call
/// [`Foreground::restore`] once the child has exited.
#[cfg(unix)]
#[derive(Debug)]
pub struct Foreground {
    handoff: Option<(Terminal, nix::unistd::Pid)>,
}

#[cfg(unix)]
impl Foreground {
    /// Make process group `pgid` the terminal's foreground group.
    pub fn hand_to(pgid: u32) -> Self {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::{Pid, getpgrp};

        let inactive = Self { handoff: None };
        let Some(terminal) = Terminal::attached() else {
            return inactive;
        };
        let ours = getpgrp();
        match terminal.foreground() {
            Ok(fg) if fg == ours => {}
            _ => {
                tracing::debug!("not the foreground group; keeping terminal");
                return inactive;
            }
        }

        let child = Pid::from_raw(pgid as i32);
        if let Err(e) = terminal.set_foreground(child) {
            tracing::warn!(pgid, "failed to hand terminal to child: {}", e);
            return inactive;
        }
        // The child may have stopped on terminal access before the handoff
        let _ = kill(Pid::from_raw(-(pgid as i32)), Signal::SIGCONT);
        tracing::debug!(pgid, "terminal handed to child group");
        Self {
            handoff: Some((terminal, ours)),
        }
    }

    /// Whether the terminal was handed over.
    pub fn is_active(&self) -> bool {
        self.handoff.is_some()
    }

    /// Take the terminal back for this process's group.
    ///
    /// `SIGTTOU` is blocked meanwhile; a background group reclaiming the
    /// terminal would otherwise be stopped.
    pub fn restore(self) {
        use nix::sys::signal::{SigSet, SigmaskHow, Signal, pthread_sigmask};

        let Some((terminal, ours)) = self.handoff else {
            return;
        };
        let mut block = SigSet::empty();
        block.add(Signal::SIGTTOU);
        let mut previous = SigSet::empty();
        if let Err(e) = pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&block), Some(&mut previous)) {
            tracing::warn!("failed to block SIGTTOU: {}", e);
            return;
        }
        if let Err(e) = terminal.set_foreground(ours) {
            tracing::warn!("failed to reclaim terminal: {}", e);
        }
        let _ = pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(&previous), None);
    }
}

/// Terminal handoff does not exist off Unix.
#[cfg(not(unix))]
#[derive(Debug)]
pub struct Foreground;

#[cfg(not(unix))]
impl Foreground {
    pub fn hand_to(_pgid: u32) -> Self {
        Self
    }

    pub fn is_active(&self) -> bool {
        false
    }

    pub fn restore(self) {}
}
