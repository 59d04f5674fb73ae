use dashmap::DashMap;

use crate::model::{ApplicationResource, Label, Resources};

/// Per-driver sum of resources currently allocated by this node's own
/// applications, rebuilt from `Store::List(ApplicationResource)` at
/// startup and kept live as applications allocate/deallocate (§4.5).
pub struct UsageTracker {
    by_driver: DashMap<String, Resources>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self {
            by_driver: DashMap::new(),
        }
    }

    pub fn usage_for(&self, driver: &str) -> Resources {
        self.by_driver
            .get(driver)
            .map(|r| r.clone())
            .unwrap_or(Resources {
                cpu: 0,
                ram: 0,
                disks: Default::default(),
                network: String::new(),
                multitenancy: false,
                cpu_overbook: 0,
                ram_overbook: 0,
            })
    }

    pub fn record_allocation(&self, driver: &str, req: &Resources) {
        let mut entry = self.by_driver.entry(driver.to_string()).or_insert(Resources {
            cpu: 0,
            ram: 0,
            disks: Default::default(),
            network: String::new(),
            multitenancy: req.multitenancy,
            cpu_overbook: req.cpu_overbook,
            ram_overbook: req.ram_overbook,
        });
        entry.cpu += req.cpu;
        entry.ram += req.ram;
    }

    pub fn record_release(&self, driver: &str, req: &Resources) {
        if let Some(mut entry) = self.by_driver.get_mut(driver) {
            entry.cpu = entry.cpu.saturating_sub(req.cpu);
            entry.ram = entry.ram.saturating_sub(req.ram);
        }
    }

    /// Rebuild from persisted resources after a restart — resources found
    /// on disk are, by definition, currently allocated (§4.5).
    pub fn rebuild(&self, resources: &[ApplicationResource], label_of: impl Fn(&ApplicationResource) -> Option<Label>) {
        self.by_driver.clear();
        for resource in resources {
            let Some(label) = label_of(resource) else { continue };
            for def in &label.definitions {
                if def.resources.cpu > 0 {
                    self.record_allocation(&def.driver, &def.resources);
                    break;
                }
            }
        }
    }
}

impl Default for UsageTracker {
    fn default() -> Self {
        Self::new()
    }
}
