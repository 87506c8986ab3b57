//! Program hash -> processor table

use chain_types::{ContractInterface, HashValue, Processor};
use std::{collections::HashMap, sync::Arc};

use crate::accounts;

/// Processors a chain can run, keyed by program hash.
///
/// The root and accounts builtins are always present.
#[derive(Clone)]
pub struct ProcessorRegistry {
    processors: HashMap<HashValue, Arc<dyn Processor>>,
}

impl ProcessorRegistry {
    /// Registry holding only the builtins
    pub fn new() -> Self {
        let mut registry = Self {
            processors: HashMap::new(),
        };
        registry.register(root_contract::interface());
        registry.register(accounts::interface());
        registry
    }

    /// Register a native contract under its program hash
    pub fn register(&mut self, interface: ContractInterface) -> HashValue {
        let program_hash = interface.program_hash;
        tracing::debug!("Registered program '{}' ({})", interface.name, program_hash);
        self.processors.insert(program_hash, Arc::new(interface));
        program_hash
    }

    pub fn register_processor(&mut self, program_hash: HashValue, processor: Arc<dyn Processor>) {
        self.processors.insert(program_hash, processor);
    }

    pub fn with(mut self, interface: ContractInterface) -> Self {
        self.register(interface);
        self
    }

    pub fn get(&self, program_hash: &HashValue) -> Option<Arc<dyn Processor>> {
        self.processors.get(program_hash).cloned()
    }

    pub fn contains(&self, program_hash: &HashValue) -> bool {
        self.processors.contains_key(program_hash)
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_types::hash_strings;

    #[test]
    fn test_builtins_present() {
        let registry = ProcessorRegistry::new();
        assert_eq!(registry.len(), 2);
        assert!(registry.contains(&hash_strings(&["root-0.1"])));
        assert!(registry.contains(&hash_strings(&["accounts-0.1"])));
        assert!(registry.get(&hash_strings(&["inccounter-0.1"])).is_none());

        let registry = registry.with(inccounter::interface());
        assert!(registry.contains(&hash_strings(&["inccounter-0.1"])));
    }
}
