//! Workload registry.
//!
//! Snapshot descriptors store only a workload name; the registry maps names
//! back to implementations so recovered jobs can be rebound to their bodies.

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::workload::Workload;

/// Name-indexed set of known workloads.
#[derive(Default)]
pub struct WorkloadRegistry {
    workloads: HashMap<String, Arc<dyn Workload>>,
}

impl WorkloadRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a workload under its name.
    ///
    /// A later registration under the same name replaces the earlier one.
    pub fn register(&mut self, workload: Arc<dyn Workload>) {
        let name = workload.name().to_string();
        if self.workloads.insert(name.clone(), workload).is_some() {
            tracing::warn!(workload = %name, "workload re-registered, replacing previous body");
        }
    }

    /// Look up a workload by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Workload>> {
        self.workloads.get(name).cloned()
    }

    /// Whether a workload with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.workloads.contains_key(name)
    }

    /// Number of registered workloads.
    pub fn len(&self) -> usize {
        self.workloads.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.workloads.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::workload::StepHandle;

    struct Named(&'static str);

    impl Workload for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn start(&self) -> StepHandle {
            Box::pin(async { Ok(()) })
        }
    }

    #[test]
    fn test_register_and_look_up() {
        let mut registry = WorkloadRegistry::new();
        assert!(registry.is_empty());

        registry.register(Arc::new(Named("make_workspace")));
        registry.register(Arc::new(Named("fetch_page")));

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("make_workspace"));
        assert!(registry.get("fetch_page").is_some());
        assert!(registry.get("unknown").is_none());
    }

    #[test]
    fn test_reregistration_replaces() {
        let mut registry = WorkloadRegistry::new();
        registry.register(Arc::new(Named("job")));
        registry.register(Arc::new(Named("job")));

        assert_eq!(registry.len(), 1);
    }
}
