#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::unused_async)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::cast_possible_wrap)]

//! procweave — deadlock-free, composable process launching, piping, and
//! supervision.
//!
//! - `pipe` — in-memory bounded byte [`pipe::Pipe`]
//! - `drainer` — pumps a child's OS stream into a `Pipe`
//! - `merged_lines` — merges two line streams (stdout/stderr) into one
//! - `scheduler` — dedicated-thread pool for blocking sync I/O
//! - `compat_stream` — broken-pipe-tolerant stdin wrapper
//! - `signaler` — cross-platform signal delivery by pid
//! - `options` — command configuration
//! - `redirect` — stream redirect sinks/sources
//! - `command` — the `Command` trait and its `ProcessCommand`/
//!   `AttachedCommand`/`IoCommand`/`PipedCommand` variants
//! - `error` — crate-wide error types

pub mod command;
pub mod compat_stream;
pub mod drainer;
pub mod error;
pub mod merged_lines;
pub mod options;
pub mod pipe;
pub mod quoting;
pub mod redirect;
pub mod scheduler;
pub mod signaler;

pub use command::{AttachedCommand, Command, CommandResult, ExitStatus, IoCommand, PipedCommand, ProcessCommand};
pub use error::{CommandError, PipeError};
pub use options::{CommandOptions, OptionsBuilder};
pub use pipe::Pipe;
