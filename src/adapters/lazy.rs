//! Lazily constructed, exclusively owned collaborator.

use anyhow::{Context, Result};
use tracing::info;

type Init<T> = Box<dyn FnMut() -> Result<T> + Send>;

/// A collaborator built on first use and kept for the owner's lifetime.
///
/// Construction runs at most once successfully; a failed attempt leaves the
/// cell empty so the next `get` tries again.
pub struct Lazy<T> {
    name: &'static str,
    value: Option<T>,
    init: Init<T>,
}

impl<T> Lazy<T> {
    /// Defer construction to the first `get`
    pub fn new(name: &'static str, init: impl FnMut() -> Result<T> + Send + 'static) -> Self {
        Self {
            name,
            value: None,
            init: Box::new(init),
        }
    }

    /// Wrap an already constructed value
    pub fn ready(name: &'static str, value: T) -> Self {
        Self {
            name,
            value: Some(value),
            init: Box::new(move || -> Result<T> { anyhow::bail!("{} was provided pre-built", name) }),
        }
    }

    /// Get the collaborator, constructing it if needed
    pub fn get(&mut self) -> Result<&mut T> {
        let value = match self.value.take() {
            Some(value) => value,
            None => {
                info!(engine = self.name, "Initializing collaborator");
                (self.init)().with_context(|| format!("Failed to initialize {}", self.name))?
            }
        };
        Ok(self.value.insert(value))
    }

    pub fn is_initialized(&self) -> bool {
        self.value.is_some()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> std::fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lazy")
            .field("name", &self.name)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
