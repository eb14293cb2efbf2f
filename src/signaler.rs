//! Cross-platform signal delivery ([`Signaler`]).
//!
//! POSIX: a direct `kill(2)`. Windows: Ctrl-C cannot be synthesized for an
//! arbitrary process from another console, so delivery works by detaching
//! from the caller's console, attaching to the target's, disabling the
//! caller's own signal handling, generating the console control event, then
//! restoring state. Because step 3 disables Ctrl-C handling for
//! the *caller*, this back end should run in a short-lived helper process,
//! not the main library's process, when the caller itself cares about
//! receiving Ctrl-C.

use tracing::{debug, warn};

/// Canonical Ctrl-C signal value, shared across both back ends (POSIX
/// `SIGINT` == 2; this also doubles as the logical "Ctrl-C" constant we pass
/// into the Windows back end for mapping to `CTRL_C_EVENT`).
pub const SIGINT: i32 = 2;
/// `SIGTERM` on POSIX; used by graceful-kill sequences.
pub const SIGTERM: i32 = 15;
/// `SIGKILL` on POSIX; used by hard kill.
pub const SIGKILL: i32 = 9;

/// Delivers OS signals to a running process by PID.
pub struct Signaler;

impl Signaler {
    /// Attempt to deliver `signal_code` to `pid`. Returns `true` if the
    /// signal was (as far as we can tell) delivered — "process already
    /// exited" or "platform rejected the signal" both return `false` rather
    /// than erroring.
    pub fn try_signal(pid: u32, signal_code: i32) -> bool {
        #[cfg(unix)]
        {
            posix::signal(pid, signal_code)
        }
        #[cfg(windows)]
        {
            windows::signal(pid, signal_code)
        }
        #[cfg(not(any(unix, windows)))]
        {
            let _ = (pid, signal_code);
            false
        }
    }

    /// Check whether `pid` still refers to a live process, without sending
    /// it any real signal. Used by [`crate::command::AttachedCommand`] to
    /// poll for an externally-owned process's exit, since there is no
    /// portable "wait for an arbitrary (non-child) pid" primitive.
    pub fn process_exists(pid: u32) -> bool {
        #[cfg(unix)]
        {
            posix::exists(pid)
        }
        #[cfg(windows)]
        {
            windows::exists(pid)
        }
        #[cfg(not(any(unix, windows)))]
        {
            let _ = pid;
            false
        }
    }
}

#[cfg(unix)]
mod posix {
    use super::{debug, warn};
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    pub fn signal(pid: u32, signal_code: i32) -> bool {
        let Ok(sig) = Signal::try_from(signal_code) else {
            warn!(signal_code, "unrecognized signal code");
            return false;
        };
        match signal::kill(Pid::from_raw(pid as i32), sig) {
            Ok(()) => {
                debug!(pid, signal = signal_code, "signal delivered");
                true
            }
            Err(nix::Error::ESRCH) => {
                debug!(pid, "signal target already exited");
                false
            }
            Err(e) => {
                warn!(pid, signal = signal_code, error = %e, "signal delivery failed");
                false
            }
        }
    }

    /// Signal 0: delivers nothing, but fails with `ESRCH` iff the pid is
    /// gone (or ill with `EPERM` if it exists but we lack permission, which
    /// we still count as "exists").
    pub fn exists(pid: u32) -> bool {
        !matches!(
            signal::kill(Pid::from_raw(pid as i32), None),
            Err(nix::Error::ESRCH)
        )
    }
}

/// Windows console-group Ctrl-C delivery.
///
/// This back end is a best-effort port of the documented sequence (detach,
/// attach to target console, disable our own Ctrl handling, generate the
/// event) using `windows-sys`. It is only ever exercised on `cfg(windows)`
/// builds; this repository's CI/self-check runs on Linux, so the POSIX path
/// above is what's actually validated here.
#[cfg(windows)]
mod windows {
    use super::{debug, warn, SIGINT};
    use windows_sys::Win32::Foundation::{BOOL, FALSE};
    use windows_sys::Win32::System::Console::{
        AttachConsole, FreeConsole, GenerateConsoleCtrlEvent, SetConsoleCtrlHandler,
        CTRL_BREAK_EVENT, CTRL_C_EVENT,
    };

    pub fn signal(pid: u32, signal_code: i32) -> bool {
        let event = if signal_code == SIGINT {
            CTRL_C_EVENT
        } else {
            CTRL_BREAK_EVENT
        };
        unsafe {
            // Detach from our own console so we can attach to the target's.
            FreeConsole();
            if AttachConsole(pid) == FALSE as BOOL {
                let err = std::io::Error::last_os_error();
                warn!(pid, error = %err, "AttachConsole failed");
                return false;
            }
            // Disable Ctrl handling for ourselves so the event we're about
            // to generate doesn't also kill the caller.
            SetConsoleCtrlHandler(None, 1);
            let ok = GenerateConsoleCtrlEvent(event, 0) != FALSE as BOOL;
            if !ok {
                let err = std::io::Error::last_os_error();
                warn!(pid, error = %err, "GenerateConsoleCtrlEvent failed");
            } else {
                debug!(pid, signal = signal_code, "console ctrl event generated");
            }
            FreeConsole();
            ok
        }
    }

    /// Best-effort liveness check via `OpenProcess`; treated as a leaf
    /// concern of this back end since Windows has no `kill(pid, 0)`
    /// equivalent.
    pub fn exists(pid: u32) -> bool {
        use windows_sys::Win32::System::Threading::{OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION};
        unsafe {
            let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, FALSE, pid);
            if handle == 0 {
                false
            } else {
                windows_sys::Win32::Foundation::CloseHandle(handle);
                true
            }
        }
    }
}
