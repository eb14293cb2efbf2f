//! Command configuration.
//!
//! An immutable
//! [`CommandOptions`] built from an *ordered* list of initializer closures,
//! where later initializers run after (and can override) earlier ones. This
//! intentionally avoids a classic builder-with-many-setters in favor of the
//! same "ordered list of mutating hooks" shape used for
//! `start_info initializers` / `command initializers`.

use std::collections::HashMap;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::quoting::ArgumentSyntax;

/// Immutable, fully-resolved configuration for one [`crate::command::Command`].
#[derive(Clone)]
pub struct CommandOptions {
    pub throw_on_error: bool,
    pub working_directory: Option<String>,
    pub cancellation_token: Option<CancellationToken>,
    pub timeout: Option<Duration>,
    pub dispose_on_exit: bool,
    pub environment_variables: HashMap<String, String>,
    /// Informational only — this crate never re-quotes `argv` through a
    /// shell, so this doesn't change spawn behavior. It exists for external
    /// collaborators (e.g. a caller building `argv` from a single command
    /// string) to record which quoting convention they used.
    pub argument_syntax: ArgumentSyntax,
}

impl Default for CommandOptions {
    fn default() -> Self {
        CommandOptions {
            throw_on_error: false,
            working_directory: None,
            cancellation_token: None,
            timeout: None,
            dispose_on_exit: true,
            environment_variables: HashMap::new(),
            argument_syntax: ArgumentSyntax::default(),
        }
    }
}

/// An ordered initializer hook. Each one receives the options as built by all
/// prior initializers and may mutate them further; order is significant.
pub type Initializer = Box<dyn FnOnce(&mut CommandOptions) + Send>;

/// Builds a [`CommandOptions`] by applying an ordered list of initializers to
/// the default configuration.
#[derive(Default)]
pub struct OptionsBuilder {
    initializers: Vec<Initializer>,
}

impl OptionsBuilder {
    pub fn new() -> Self {
        OptionsBuilder {
            initializers: Vec::new(),
        }
    }

    /// Append an initializer. Runs after every initializer already added.
    pub fn with(mut self, init: impl FnOnce(&mut CommandOptions) + Send + 'static) -> Self {
        self.initializers.push(Box::new(init));
        self
    }

    pub fn throw_on_error(self, value: bool) -> Self {
        self.with(move |o| o.throw_on_error = value)
    }

    pub fn working_directory(self, dir: impl Into<String>) -> Self {
        let dir = dir.into();
        self.with(move |o| o.working_directory = Some(dir))
    }

    pub fn timeout(self, d: Duration) -> Self {
        self.with(move |o| o.timeout = Some(d))
    }

    pub fn cancellation_token(self, token: CancellationToken) -> Self {
        self.with(move |o| o.cancellation_token = Some(token))
    }

    pub fn dispose_on_exit(self, value: bool) -> Self {
        self.with(move |o| o.dispose_on_exit = value)
    }

    pub fn env(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let (key, value) = (key.into(), value.into());
        self.with(move |o| {
            o.environment_variables.insert(key, value);
        })
    }

    pub fn argument_syntax(self, syntax: ArgumentSyntax) -> Self {
        self.with(move |o| o.argument_syntax = syntax)
    }

    /// Run every initializer in order against a fresh default and return the
    /// resulting immutable options.
    pub fn build(self) -> CommandOptions {
        let mut options = CommandOptions::default();
        for init in self.initializers {
            init(&mut options);
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_initializers_override_earlier_ones() {
        let options = OptionsBuilder::new()
            .throw_on_error(false)
            .throw_on_error(true)
            .working_directory("/tmp")
            .with(|o| o.working_directory = Some("/override".into()))
            .build();
        assert!(options.throw_on_error);
        assert_eq!(options.working_directory.as_deref(), Some("/override"));
    }

    #[test]
    fn defaults_match_documented_values() {
        let options = CommandOptions::default();
        assert!(!options.throw_on_error);
        assert!(options.dispose_on_exit);
        assert!(options.timeout.is_none());
        assert!(options.cancellation_token.is_none());
        assert!(options.environment_variables.is_empty());
    }
}
