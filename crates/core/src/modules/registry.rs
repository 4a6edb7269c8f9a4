//! Module registry
//!
//! Maps declared module names to factories. One registry exists per module
//! kind and is built explicitly by the composition root (see
//! [`crate::sources::register_builtin`] and [`crate::dispersion::register_builtin`]);
//! tests construct and [`ModuleRegistry::reset`] their own.
//!
//! An entry is identified by its declared name together with the concrete
//! factory type. Registering the same factory under the same name again
//! replaces the earlier entry; a different factory under an existing name is
//! kept alongside it, in registration order.

use crate::modules::{DispersionModule, SourceModule};
use std::any::TypeId;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Registry lookup errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("no {kind} module registered under '{name}'")]
    UnknownModule { kind: &'static str, name: String },
}

type Factory<M> = Arc<dyn Fn() -> Box<M> + Send + Sync>;

struct Entry<M: ?Sized> {
    name: String,
    factory_type: TypeId,
    factory: Factory<M>,
}

/// Name-indexed factories for one kind of module
pub struct ModuleRegistry<M: ?Sized> {
    kind: &'static str,
    entries: Vec<Entry<M>>,
}

/// Registry of [`SourceModule`] implementations
pub type SourceRegistry = ModuleRegistry<dyn SourceModule>;
/// Registry of [`DispersionModule`] implementations
pub type DispersionRegistry = ModuleRegistry<dyn DispersionModule>;

impl<M: ?Sized + 'static> ModuleRegistry<M> {
    /// Empty registry; `kind` labels log lines and errors
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: Vec::new(),
        }
    }

    /// Register `factory` under `name`
    ///
    /// Returns `true` when an existing entry with the same name and factory
    /// type was replaced.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> bool
    where
        F: Fn() -> Box<M> + Send + Sync + 'static,
    {
        let name = name.into();
        let factory_type = TypeId::of::<F>();
        let entry = Entry {
            name: name.clone(),
            factory_type,
            factory: Arc::new(factory),
        };

        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|e| e.name == name && e.factory_type == factory_type)
        {
            warn!(
                kind = self.kind,
                module = %name,
                "Module re-registered, replacing previous entry"
            );
            *existing = entry;
            return true;
        }

        debug!(kind = self.kind, module = %name, "Registered module");
        self.entries.push(entry);
        false
    }

    /// Instantiate every module registered under `name`, in registration order
    ///
    /// # Errors
    /// Returns [`RegistryError::UnknownModule`] when nothing is registered
    /// under `name`.
    pub fn get_modules_by_name(&self, name: &str) -> Result<Vec<Box<M>>, RegistryError> {
        let modules: Vec<Box<M>> = self
            .entries
            .iter()
            .filter(|e| e.name == name)
            .map(|e| (e.factory)())
            .collect();
        if modules.is_empty() {
            return Err(RegistryError::UnknownModule {
                kind: self.kind,
                name: name.to_string(),
            });
        }
        Ok(modules)
    }

    /// Instantiate the first module registered under `name`
    ///
    /// Logs a warning when the name is ambiguous.
    ///
    /// # Errors
    /// Returns [`RegistryError::UnknownModule`] when nothing is registered
    /// under `name`.
    pub fn resolve(&self, name: &str) -> Result<Box<M>, RegistryError> {
        let mut modules = self.get_modules_by_name(name)?;
        if modules.len() > 1 {
            warn!(
                kind = self.kind,
                module = %name,
                count = modules.len(),
                "Several modules share this name, using the first registered"
            );
        }
        Ok(modules.swap_remove(0))
    }

    /// Whether anything is registered under `name`
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// Distinct registered names, in first-registration order
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for entry in &self.entries {
            if !names.contains(&entry.name.as_str()) {
                names.push(&entry.name);
            }
        }
        names
    }

    /// Number of entries (not distinct names)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every entry
    pub fn reset(&mut self) {
        debug!(kind = self.kind, removed = self.entries.len(), "Registry reset");
        self.entries.clear();
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new("source")
    }
}

impl Default for DispersionRegistry {
    fn default() -> Self {
        Self::new("dispersion")
    }
}

impl<M: ?Sized + 'static> fmt::Debug for ModuleRegistry<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("kind", &self.kind)
            .field("names", &self.names())
            .field("entries", &self.entries.len())
            .finish()
    }
}
