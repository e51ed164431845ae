use crate::cache::CacherBase;
use crate::device::DeviceKey;
use crate::error::{CacheError, ConflictErr};
use crate::types::TypeToken;
use dashmap::DashMap;
use log::{debug, trace};
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Everything the registries need to know about a registered type: how to
/// display it, whether its instances are scoped to a device, which
/// resource and parameter types its cachers carry, and how to build one.
#[derive(Clone)]
pub(crate) struct CacherRegistration {
    pub name: Arc<str>,
    pub device_dependent: bool,
    pub resource_type: TypeId,
    pub params_type: TypeId,
    pub instantiate: Arc<dyn Fn(Option<DeviceKey>) -> Arc<dyn CacherBase> + Send + Sync>,
}

impl CacherRegistration {
    fn matches(&self, other: &CacherRegistration) -> bool {
        self.name == other.name
            && self.device_dependent == other.device_dependent
            && self.resource_type == other.resource_type
            && self.params_type == other.params_type
    }
}

/// Process-wide table from type token to registration. Writes are rare,
/// reads are shared.
#[derive(Default)]
pub(crate) struct TypeRegistry {
    table: RwLock<HashMap<TypeToken, CacherRegistration>>,
}

impl TypeRegistry {
    /// Idempotent for identical descriptors, a conflict for differing
    /// ones. Consumers may register the same type defensively every time
    /// they run.
    pub fn register(
        &self,
        token: TypeToken,
        registration: CacherRegistration,
    ) -> Result<(), CacheError> {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = table.get(&token) {
            if existing.matches(&registration) {
                trace!("[Type Registry] {} is already registered", registration.name);
                return Ok(());
            }
            return ConflictErr {
                type_name: existing.name.to_string(),
            }
            .fail();
        }

        debug!(
            "[Type Registry] Registered {} ({})",
            registration.name,
            if registration.device_dependent {
                "device-dependent"
            } else {
                "global"
            }
        );
        table.insert(token, registration);
        Ok(())
    }

    pub fn get(&self, token: TypeToken) -> Option<CacherRegistration> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&token)
            .cloned()
    }

    pub fn is_registered(&self, token: TypeToken) -> bool {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&token)
    }

    pub fn type_name(&self, token: TypeToken) -> Option<Arc<str>> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&token)
            .map(|registration| registration.name.clone())
    }

    pub fn is_device_dependent(&self, token: TypeToken) -> bool {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&token)
            .is_some_and(|registration| registration.device_dependent)
    }

    pub fn registered_types(&self) -> Vec<Arc<str>> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|registration| registration.name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Live cacher instances for one device. Dropped as a unit when the
/// device is retired.
pub(crate) struct DeviceRegistry {
    device: DeviceKey,
    cachers: DashMap<TypeToken, Arc<dyn CacherBase>>,
}

impl DeviceRegistry {
    pub fn new(device: DeviceKey) -> Self {
        Self {
            device,
            cachers: DashMap::new(),
        }
    }

    /// Returns the singleton cacher for this (device, token) pair,
    /// instantiating it on first request. Concurrent callers observe the
    /// same instance.
    pub fn get_or_instantiate(
        &self,
        token: TypeToken,
        registration: &CacherRegistration,
    ) -> Arc<dyn CacherBase> {
        self.cachers
            .entry(token)
            .or_insert_with(|| {
                debug!(
                    "[Device Registry] Instantiating {} cacher for {}",
                    registration.name, self.device
                );
                (registration.instantiate)(Some(self.device.clone()))
            })
            .clone()
    }

    pub fn cacher_count(&self) -> usize {
        self.cachers.len()
    }

    pub fn entry_total(&self) -> usize {
        self.cachers
            .iter()
            .map(|cacher| cacher.entry_count())
            .sum()
    }

    pub fn cleanup(&self) {
        for cacher in self.cachers.iter() {
            cacher.cleanup();
        }
        self.cachers.clear();
    }
}
