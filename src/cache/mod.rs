mod generic;
mod main_cacher;
mod registry;

pub use self::generic::{Cacher, ResourceFactory};
pub use self::main_cacher::{CacheStats, MainCacher};

pub(crate) use self::generic::CacherBase;
