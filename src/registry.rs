//! Command registry: an ordered, immutable name → action mapping.
//!
//! Commands keep registration order for help listings and completion. A
//! `HashMap` index sits next to the `Vec` for lookups only.

use std::collections::HashMap;

/// Signature of an externally supplied test action.
pub type ActionFn = Box<dyn Fn() -> anyhow::Result<()>>;

/// Commands implemented by the session itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    /// Terminate the process immediately.
    Quit,
    /// Print a memory report.
    ShowMemoryUsage,
    /// Ask the allocator to return unused memory.
    Gc,
    /// List all registered commands.
    Help,
}

impl Builtin {
    /// Registration order of the builtins.
    pub const ALL: [Builtin; 4] = [
        Builtin::Quit,
        Builtin::ShowMemoryUsage,
        Builtin::Gc,
        Builtin::Help,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Quit => "quit",
            Builtin::ShowMemoryUsage => "show_memory_usage",
            Builtin::Gc => "gc",
            Builtin::Help => "help",
        }
    }
}

/// What a command does when dispatched.
pub enum Action {
    Builtin(Builtin),
    External(ActionFn),
}

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Builtin(b) => f.debug_tuple("Builtin").field(b).finish(),
            Action::External(_) => f.write_str("External(..)"),
        }
    }
}

/// A named command. Identity is the name.
#[derive(Debug)]
pub struct Command {
    name: String,
    action: Action,
}

impl Command {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    /// Returns the builtin kind, if this is a builtin command.
    pub fn builtin(&self) -> Option<Builtin> {
        match self.action {
            Action::Builtin(b) => Some(b),
            Action::External(_) => None,
        }
    }
}

/// Error type for registry construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A command with this name is already registered.
    Duplicate(String),
    /// Name is empty or contains whitespace, so no input line could reach it.
    InvalidName(String),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::Duplicate(name) => write!(f, "command '{}' registered twice", name),
            RegistryError::InvalidName(name) => write!(f, "invalid command name {:?}", name),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Result of a completion query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Registered names starting with the queried text, in registration order.
    pub candidates: Vec<String>,
    /// The queried text; replacement is applied from here.
    pub anchor: String,
}

/// Completion source for line editors.
pub trait Completer {
    fn complete(&self, text: &str) -> Completion;
}

/// Builds a [`CommandRegistry`]. Nothing can be added after `build`.
#[derive(Default)]
pub struct RegistryBuilder {
    commands: Vec<Command>,
    index: HashMap<String, usize>,
}

impl RegistryBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder with `quit`, `show_memory_usage`, `gc` and `help`
    /// already registered, in that order.
    pub fn with_builtins() -> Self {
        let mut builder = Self::new();
        for builtin in Builtin::ALL {
            builder.push(builtin.name().to_string(), Action::Builtin(builtin));
        }
        builder
    }

    /// Registers an external test action.
    pub fn register<F>(&mut self, name: impl Into<String>, action: F) -> Result<(), RegistryError>
    where
        F: Fn() -> anyhow::Result<()> + 'static,
    {
        let name = name.into();
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(RegistryError::InvalidName(name));
        }
        if self.index.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        self.push(name, Action::External(Box::new(action)));
        Ok(())
    }

    fn push(&mut self, name: String, action: Action) {
        self.index.insert(name.clone(), self.commands.len());
        self.commands.push(Command { name, action });
    }

    pub fn build(self) -> CommandRegistry {
        CommandRegistry {
            commands: self.commands,
            index: self.index,
        }
    }
}

/// Immutable set of commands available to a session.
#[derive(Debug)]
pub struct CommandRegistry {
    commands: Vec<Command>,
    index: HashMap<String, usize>,
}

impl CommandRegistry {
    pub fn lookup(&self, name: &str) -> Option<&Command> {
        self.index.get(name).and_then(|&i| self.commands.get(i))
    }

    /// Names in registration order.
    pub fn all_names(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().map(|c| c.name.as_str())
    }

    /// Names starting with `prefix` (case-sensitive), in registration order.
    /// An empty prefix matches every name.
    pub fn names_matching_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> {
        self.all_names().filter(move |name| name.starts_with(prefix))
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl Completer for CommandRegistry {
    fn complete(&self, text: &str) -> Completion {
        Completion {
            candidates: self
                .names_matching_prefix(text)
                .map(str::to_string)
                .collect(),
            anchor: text.to_string(),
        }
    }
}
