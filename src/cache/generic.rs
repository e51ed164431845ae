use crate::device::DeviceKey;
use crate::error::CreationError;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::{debug, trace, warn};
use std::any::Any;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub type ResourceFactory<R, P> =
    Arc<dyn Fn(&P, Option<&DeviceKey>) -> Result<R, CreationError> + Send + Sync>;

/// Generic get-or-create store from creation parameters to a built
/// resource.
///
/// The key is a deterministic hash of the parameters. For any key the
/// factory runs at most once while an entry is live: concurrent callers
/// for the same missing key serialize on the slot, one of them creates,
/// and all of them receive the same `Arc`. A failed creation leaves the
/// key absent.
pub struct Cacher<R, P> {
    name: Arc<str>,
    device: Option<DeviceKey>,
    entries: DashMap<u64, Arc<R>>,
    factory: ResourceFactory<R, P>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl<R, P> Cacher<R, P>
where
    R: Send + Sync + 'static,
    P: Hash + Send + Sync + 'static,
{
    pub fn new<F>(name: impl Into<Arc<str>>, device: Option<DeviceKey>, factory: F) -> Self
    where
        F: Fn(&P, Option<&DeviceKey>) -> Result<R, CreationError> + Send + Sync + 'static,
    {
        Self::from_factory(name, device, Arc::new(factory))
    }

    pub(crate) fn from_factory(
        name: impl Into<Arc<str>>,
        device: Option<DeviceKey>,
        factory: ResourceFactory<R, P>,
    ) -> Self {
        Self {
            name: name.into(),
            device,
            entries: DashMap::new(),
            factory,
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The device this cacher is scoped to, if any.
    pub fn device(&self) -> Option<&DeviceKey> {
        self.device.as_ref()
    }

    pub fn get_or_create(&self, params: &P) -> Result<Arc<R>, CreationError> {
        let key = entry_key(params);

        if let Some(entry) = self.entries.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(entry.clone());
        }

        let created = self.entries.entry(key).or_try_insert_with(|| {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!("[{} Cacher] Creating entry {key:#018x}", self.name);
            (self.factory)(params, self.device.as_ref()).map(Arc::new)
        });

        match created {
            Ok(entry) => Ok(entry.clone()),
            Err(error) => {
                warn!(
                    "[{} Cacher] Creation failed for key {key:#018x}: {error}",
                    self.name
                );
                Err(error)
            }
        }
    }

    /// Looks up an entry without creating one on a miss.
    pub fn peek(&self, params: &P) -> Option<Arc<R>> {
        self.entries.get(&entry_key(params)).map(|entry| entry.clone())
    }

    /// Stores an already-built resource under the key of `params`.
    /// Returns `false` when the key was already populated.
    pub fn prime(&self, params: &P, resource: R) -> bool {
        match self.entries.entry(entry_key(params)) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(resource));
                true
            }
        }
    }

    pub fn contains(&self, params: &P) -> bool {
        self.entries.contains_key(&entry_key(params))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        let dropped = self.entries.len();
        self.entries.clear();
        debug!("[{} Cacher] Dropped {dropped} entries", self.name);
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    /// Number of factory invocations, including failed ones.
    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }
}

fn entry_key<P: Hash>(params: &P) -> u64 {
    let mut hasher = DefaultHasher::new();
    params.hash(&mut hasher);
    hasher.finish()
}

/// Type-erased view of a [`Cacher`], held by the registries.
pub(crate) trait CacherBase: Send + Sync + 'static {
    fn name(&self) -> &str;
    fn entry_count(&self) -> usize;
    fn cleanup(&self);
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<R, P> CacherBase for Cacher<R, P>
where
    R: Send + Sync + 'static,
    P: Hash + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn entry_count(&self) -> usize {
        self.entries.len()
    }

    fn cleanup(&self) {
        self.clear();
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
