//! Argument syntax marker.
//!
//! Per the core's explicit Non-goal, argument-quoting rules for a given
//! shell/OS are an external collaborator's responsibility, not this crate's.
//! [`ArgumentSyntax`] exists only so [`crate::options::CommandOptions`] has
//! somewhere to name which convention the caller intends; this crate passes
//! `argv` straight to `tokio::process::Command`, which already does its own
//! OS-correct argument passing without re-quoting through a shell.

/// Which platform's argument-joining convention a caller's `argv` was
/// already prepared for. Informational only — this crate does not
/// re-quote or re-split arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArgumentSyntax {
    #[default]
    Native,
    Posix,
    WindowsCmd,
}
