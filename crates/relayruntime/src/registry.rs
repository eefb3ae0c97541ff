use relaycore::{Config, ConfigSchema, NodeError, Processor, RegistryError};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Factory trait for creating core processor instances
pub trait ProcessorFactory: Send + Sync {
    /// Create a new processor for a node with the given configuration
    fn create(&self, config: &Config) -> Result<Box<dyn Processor>, NodeError>;

    /// Optional: Get processor metadata (description, category)
    fn metadata(&self) -> ProcessorMetadata {
        ProcessorMetadata::default()
    }
}

/// Metadata about a core processor
#[derive(Debug, Clone, Serialize)]
pub struct ProcessorMetadata {
    pub description: String,
    pub category: String,
}

impl Default for ProcessorMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            category: "general".to_string(),
        }
    }
}

/// Description of one registered processor, for tooling
#[derive(Debug, Clone, Serialize)]
pub struct ProcessorInfo {
    pub name: String,
    #[serde(flatten)]
    pub metadata: ProcessorMetadata,
    pub schema: ConfigSchema,
}

/// Registry of core (in-process) processors.
///
/// Filled once at startup, then shared behind an `Arc` and only read.
pub struct NodeRegistry {
    factories: HashMap<String, Arc<dyn ProcessorFactory>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a processor factory under `name`
    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: Arc<dyn ProcessorFactory>,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(RegistryError::DuplicateRegistration(name));
        }
        tracing::debug!("Registering core processor: {}", name);
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Look up a core processor by name.
    ///
    /// The error names every registered processor and points at plugin
    /// bindings; it is never replaced by a default.
    pub fn resolve_core(&self, name: &str) -> Result<&Arc<dyn ProcessorFactory>, NodeError> {
        self.factories
            .get(name)
            .ok_or_else(|| NodeError::UnresolvedProcessor {
                name: name.to_string(),
                available: self.list_processors().join(", "),
            })
    }

    /// Resolve and instantiate a core processor
    pub fn create_processor(
        &self,
        name: &str,
        config: &Config,
    ) -> Result<Box<dyn Processor>, NodeError> {
        self.resolve_core(name)?.create(config)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Get all registered processor names, sorted
    pub fn list_processors(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Get metadata for a processor
    pub fn get_metadata(&self, name: &str) -> Option<ProcessorMetadata> {
        self.factories.get(name).map(|f| f.metadata())
    }

    /// Describe every registered processor, including its config schema
    pub fn describe(&self) -> Vec<ProcessorInfo> {
        self.list_processors()
            .into_iter()
            .filter_map(|name| {
                let factory = self.factories.get(&name)?;
                let schema = factory
                    .create(&Config::new())
                    .map(|p| p.schema())
                    .unwrap_or_default();
                Some(ProcessorInfo {
                    metadata: factory.metadata(),
                    schema,
                    name,
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
