//! [`CommandResult`] / [`ExitStatus`]: the terminal outcome of a Command's
//! aggregate task once the process has exited and every I/O task has
//! finished.

/// The process's exit status, exposing both the raw OS-reported value and a
/// portable clamp.
///
/// POSIX convention clamps a `-1`/unavailable natural exit to `0xFF`, while
/// other platforms may leave it `-1`. Rather than picking one, both values
/// are exposed so callers can choose the semantics they need. See
/// DESIGN.md for the rationale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    raw: i32,
}

impl ExitStatus {
    pub fn from_raw(raw: i32) -> Self {
        ExitStatus { raw }
    }

    /// The OS-reported exit code, or `-1` if it could not be determined
    /// (e.g. the process was killed by a signal and never reported a code).
    pub fn raw(&self) -> i32 {
        self.raw
    }

    /// The raw value clamped to the POSIX low-8-bit convention: any negative
    /// (unavailable/signal-killed) value becomes `0xFF`, positive values are
    /// masked to `0..=255`.
    pub fn clamped(&self) -> u8 {
        if self.raw < 0 {
            0xFF
        } else {
            (self.raw & 0xFF) as u8
        }
    }

    pub fn success(&self) -> bool {
        self.raw == 0
    }
}

/// Terminal outcome of a composed [`super::Command`]'s aggregate task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandResult {
    pub exit_code: ExitStatus,
    pub success: bool,
}

impl CommandResult {
    pub fn from_exit_status(status: ExitStatus) -> Self {
        CommandResult {
            success: status.success(),
            exit_code: status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_matches_posix_low_byte_convention() {
        assert_eq!(ExitStatus::from_raw(0).clamped(), 0);
        assert_eq!(ExitStatus::from_raw(2).clamped(), 2);
        assert_eq!(ExitStatus::from_raw(-1).clamped(), 0xFF);
        assert_eq!(ExitStatus::from_raw(256 + 7).clamped(), 7);
    }

    #[test]
    fn raw_preserves_negative_unclamped() {
        assert_eq!(ExitStatus::from_raw(-1).raw(), -1);
    }
}
