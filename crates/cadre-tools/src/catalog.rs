use crate::capability::ToolCapability;
use crate::toolset::ToolSet;
use cadre_core::{CadreError, CadreResult};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

type ToolFactory = Arc<dyn Fn() -> Box<dyn ToolCapability> + Send + Sync>;

/// Named tool constructors.
///
/// The catalog never hands out shared instances: each [`instantiate`](Self::instantiate)
/// builds a fresh tool, which is then moved into exactly one worker's [`ToolSet`].
#[derive(Clone, Default)]
pub struct ToolCatalog {
    factories: BTreeMap<String, ToolFactory>,
}

impl ToolCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor under `name`. A later registration replaces an earlier one.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn ToolCapability> + Send + Sync + 'static,
    {
        let name = name.into();
        info!(tool = %name, "Tool added to catalog");
        self.factories.insert(name, Arc::new(factory));
    }

    /// Whether `name` is known.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Build a new instance of the named tool.
    pub fn instantiate(&self, name: &str) -> CadreResult<Box<dyn ToolCapability>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| CadreError::Config(format!("Unknown tool: {name}")))?;
        Ok(factory())
    }

    /// Build a tool set holding fresh instances of `names`, in order.
    pub fn build_set(&self, names: &[String]) -> CadreResult<ToolSet> {
        let mut set = ToolSet::new();
        for name in names {
            set.add(self.instantiate(name)?)?;
        }
        Ok(set)
    }

    /// Known tool names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// Number of registered constructors.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}
