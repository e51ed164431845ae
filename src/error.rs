use snafu::Snafu;

/// Errors raised by registration and cacher retrieval.
///
/// Creation failures are deliberately not part of this enum. A failed
/// factory call is per-request and surfaced as [`CreationError`] by
/// [`Cacher::get_or_create`](crate::Cacher::get_or_create) so the key can
/// be retried later.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(Err)), visibility(pub(crate)))]
pub enum CacheError {
    #[snafu(display("no cacher was registered for type {type_name}"))]
    Configuration { type_name: String },

    #[snafu(display("cacher {type_name} stores a different resource or parameter type"))]
    Mismatch { type_name: String },

    #[snafu(display("type {type_name} was re-registered with a conflicting descriptor"))]
    Conflict { type_name: String },

    #[snafu(display("device-dependent type {type_name} was requested without a device"))]
    DeviceRequired { type_name: String },

    #[snafu(display("device {device} was retired"))]
    DeviceRetired { device: String },
}

/// A resource factory failed to produce a resource for the given
/// parameters. The cache key stays unpopulated, so a later request with
/// the same parameters is free to retry.
#[derive(Debug, Snafu)]
#[snafu(display("resource creation failed: {message}"))]
pub struct CreationError {
    message: String,
}

impl CreationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
