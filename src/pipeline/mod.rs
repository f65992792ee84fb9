// src/pipeline/mod.rs

//! In-memory pipeline declaration: an ordered list of [`Target`]s plus
//! [`Settings`]. Built from a TOML file by [`crate::config`] or directly by
//! library users.

pub mod settings;
pub mod target;

pub use settings::Settings;
pub use target::{Command, CommandKind, RenderSpec, Target};

/// An ordered collection of target declarations.
///
/// Name uniqueness and acyclicity are checked when the graph is built, not
/// here, so that a `Pipeline` can be inspected even when it is invalid.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    targets: Vec<Target>,
    settings: Settings,
}

impl Pipeline {
    pub fn new(targets: Vec<Target>, settings: Settings) -> Self {
        Self { targets, settings }
    }

    pub fn push(&mut self, target: Target) {
        self.targets.push(target);
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.targets.iter().map(|t| t.name.as_str())
    }
}
