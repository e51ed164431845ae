#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod cache;
pub mod device;
pub mod error;
pub mod types;

pub use cache::{CacheStats, Cacher, MainCacher, ResourceFactory};
pub use device::DeviceKey;
pub use error::{CacheError, CreationError};
pub use types::{CachedTypeRegistry, Signature, TypeToken};
