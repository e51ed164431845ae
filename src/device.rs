use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Opaque handle identifying a physical device.
///
/// The cache core never talks to a graphics API. A `DeviceKey` only keys
/// device-scoped cacher registries and is handed back to resource
/// factories so they can reach their own device state. Identity is the
/// numeric id; the name is carried for log lines and error messages.
#[derive(Debug, Clone)]
pub struct DeviceKey {
    id: u64,
    name: Arc<str>,
}

impl DeviceKey {
    pub fn new(id: u64, name: impl Into<Arc<str>>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for DeviceKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for DeviceKey {}

impl Hash for DeviceKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Display for DeviceKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}
