//! The single entry point of the caching core.
//!
//! A [`MainCacher`] routes retrieval to either a per-device registry or a
//! process-wide instance, based on the device-dependence flag recorded at
//! registration. It is an explicitly constructed object: callers own one
//! and pass it through their context, so teardown and multi-instance
//! tests need no global state.

use crate::cache::generic::{Cacher, CacherBase, ResourceFactory};
use crate::cache::registry::{CacherRegistration, DeviceRegistry, TypeRegistry};
use crate::device::DeviceKey;
use crate::error::{
    CacheError, ConfigurationErr, CreationError, DeviceRequiredErr, DeviceRetiredErr, MismatchErr,
};
use crate::types::TypeToken;
use dashmap::DashMap;
use log::debug;
use static_assertions::assert_impl_all;
use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Default)]
struct DeviceTable {
    live: HashMap<DeviceKey, Arc<DeviceRegistry>>,
    retired: HashSet<DeviceKey>,
}

#[derive(Default)]
pub struct MainCacher {
    types: TypeRegistry,
    global: DashMap<TypeToken, Arc<dyn CacherBase>>,
    devices: RwLock<DeviceTable>,
}

/// Counts reported by [`MainCacher::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub registered_types: usize,
    pub global_cachers: usize,
    pub device_registries: usize,
    pub device_cachers: usize,
    pub global_entries: usize,
    pub device_entries: usize,
}

impl MainCacher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a cacher descriptor for `token`.
    ///
    /// The factory is the only contact point with the underlying API: it
    /// receives the creation parameters and, for device-dependent types,
    /// the owning device, and returns a built resource or fails.
    ///
    /// Registering the same token again with an identical descriptor is a
    /// no-op; a descriptor differing in name, dependence flag, or
    /// resource/parameter types fails with [`CacheError::Conflict`].
    pub fn register_cacher<R, P, F>(
        &self,
        token: TypeToken,
        name: impl Into<Arc<str>>,
        device_dependent: bool,
        factory: F,
    ) -> Result<(), CacheError>
    where
        R: Send + Sync + 'static,
        P: Hash + Send + Sync + 'static,
        F: Fn(&P, Option<&DeviceKey>) -> Result<R, CreationError> + Send + Sync + 'static,
    {
        let name: Arc<str> = name.into();
        let factory: ResourceFactory<R, P> = Arc::new(factory);
        let instantiate = {
            let name = name.clone();
            Arc::new(move |device: Option<DeviceKey>| {
                Arc::new(Cacher::from_factory(name.clone(), device, factory.clone()))
                    as Arc<dyn CacherBase>
            })
        };

        self.types.register(
            token,
            CacherRegistration {
                name,
                device_dependent,
                resource_type: TypeId::of::<R>(),
                params_type: TypeId::of::<P>(),
                instantiate,
            },
        )
    }

    pub fn is_registered(&self, token: TypeToken) -> bool {
        self.types.is_registered(token)
    }

    /// Display name recorded at registration, `None` for unknown tokens.
    pub fn type_name(&self, token: TypeToken) -> Option<Arc<str>> {
        self.types.type_name(token)
    }

    /// `false` for unknown tokens.
    pub fn is_device_dependent(&self, token: TypeToken) -> bool {
        self.types.is_device_dependent(token)
    }

    /// The cacher instance serving `token`, scoped to `device` when the
    /// type was registered device-dependent.
    ///
    /// Instances are created lazily on first request; concurrent callers
    /// for the same (device, token) pair observe the same singleton.
    pub fn cacher<R, P>(
        &self,
        token: TypeToken,
        device: Option<&DeviceKey>,
    ) -> Result<Arc<Cacher<R, P>>, CacheError>
    where
        R: Send + Sync + 'static,
        P: Hash + Send + Sync + 'static,
    {
        let Some(registration) = self.types.get(token) else {
            return ConfigurationErr {
                type_name: token.name(),
            }
            .fail();
        };

        if registration.resource_type != TypeId::of::<R>()
            || registration.params_type != TypeId::of::<P>()
        {
            return MismatchErr {
                type_name: registration.name.to_string(),
            }
            .fail();
        }

        let base = if registration.device_dependent {
            let Some(device) = device else {
                return DeviceRequiredErr {
                    type_name: registration.name.to_string(),
                }
                .fail();
            };
            self.device_registry(device)?
                .get_or_instantiate(token, &registration)
        } else {
            self.global
                .entry(token)
                .or_insert_with(|| {
                    debug!("[Main Cacher] Instantiating global {} cacher", registration.name);
                    (registration.instantiate)(None)
                })
                .clone()
        };

        base.as_any().downcast::<Cacher<R, P>>().map_err(|_| {
            MismatchErr {
                type_name: registration.name.to_string(),
            }
            .build()
        })
    }

    fn device_registry(&self, device: &DeviceKey) -> Result<Arc<DeviceRegistry>, CacheError> {
        {
            let table = self.devices.read().unwrap_or_else(PoisonError::into_inner);
            if table.retired.contains(device) {
                return DeviceRetiredErr {
                    device: device.to_string(),
                }
                .fail();
            }
            if let Some(registry) = table.live.get(device) {
                return Ok(registry.clone());
            }
        }

        let mut table = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        if table.retired.contains(device) {
            return DeviceRetiredErr {
                device: device.to_string(),
            }
            .fail();
        }
        Ok(table
            .live
            .entry(device.clone())
            .or_insert_with(|| {
                debug!("[Main Cacher] New device registry for {device}");
                Arc::new(DeviceRegistry::new(device.clone()))
            })
            .clone())
    }

    /// Drops the device's registry and marks the key retired; later
    /// requests for it fail with [`CacheError::DeviceRetired`]. Returns
    /// the number of entries released.
    ///
    /// In-flight creations hold their cacher alive through its `Arc`, so
    /// instances are freed only once the last in-flight call completes.
    /// Other devices are untouched.
    pub fn retire_device(&self, device: &DeviceKey) -> usize {
        let removed = {
            let mut table = self.devices.write().unwrap_or_else(PoisonError::into_inner);
            table.retired.insert(device.clone());
            table.live.remove(device)
        };

        match removed {
            Some(registry) => {
                let released = registry.entry_total();
                registry.cleanup();
                debug!("[Main Cacher] Retired {device}, released {released} entries");
                released
            }
            None => 0,
        }
    }

    /// Drops all process-wide cacher instances. Registrations survive, so
    /// the next request lazily re-instantiates.
    pub fn clear_global_caches(&self) {
        for cacher in self.global.iter() {
            debug!("[Main Cacher] Dropping global {} cacher", cacher.name());
            cacher.cleanup();
        }
        self.global.clear();
    }

    pub fn registered_types(&self) -> Vec<Arc<str>> {
        self.types.registered_types()
    }

    pub fn active_devices(&self) -> Vec<DeviceKey> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .live
            .keys()
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> CacheStats {
        let (device_registries, device_cachers, device_entries) = {
            let table = self.devices.read().unwrap_or_else(PoisonError::into_inner);
            let cachers = table.live.values().map(|r| r.cacher_count()).sum();
            let entries = table.live.values().map(|r| r.entry_total()).sum();
            (table.live.len(), cachers, entries)
        };

        CacheStats {
            registered_types: self.types.len(),
            global_cachers: self.global.len(),
            device_registries,
            device_cachers,
            global_entries: self.global.iter().map(|c| c.entry_count()).sum(),
            device_entries,
        }
    }
}

assert_impl_all!(MainCacher: Send, Sync);
assert_impl_all!(crate::types::Signature: Send, Sync);
assert_impl_all!(crate::types::CachedTypeRegistry: Send, Sync);
assert_impl_all!(DeviceKey: Send, Sync);
