//! Built-in source modules

pub mod fixed_rate;

pub use fixed_rate::{StaticSource, StaticSourceModule, StaticSourceOptions};

use crate::modules::{SourceModule, SourceRegistry};

/// Register the built-in source modules
pub fn register_builtin(registry: &mut SourceRegistry) {
    registry.register(StaticSourceModule::NAME, || -> Box<dyn SourceModule> {
        Box::new(StaticSourceModule::new())
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_builtin() {
        let mut registry = SourceRegistry::default();
        register_builtin(&mut registry);
        assert_eq!(registry.names(), vec![StaticSourceModule::NAME]);
    }
}
