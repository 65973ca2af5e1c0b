//! Typed service locator.

use crate::errors::GenflowError;
use dashmap::DashMap;
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A typed handle naming a service.
///
/// Declare one per service as a constant:
///
/// ```
/// use genflow::services::ServiceKey;
///
/// struct Cache;
/// const CACHE: ServiceKey<Cache> = ServiceKey::new("cache");
/// assert_eq!(CACHE.name(), "cache");
/// ```
pub struct ServiceKey<T: ?Sized> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T: ?Sized> ServiceKey<T> {
    /// Creates a key.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    /// Returns the service name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T: ?Sized> Clone for ServiceKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for ServiceKey<T> {}

impl<T: ?Sized> fmt::Debug for ServiceKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ServiceKey").field(&self.name).finish()
    }
}

/// Registry of shared services middlewares can reach.
///
/// The pipeline never inspects the services it carries.
#[derive(Default)]
pub struct ServiceLocator {
    services: DashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl ServiceLocator {
    /// Creates an empty locator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a service under a typed key.
    ///
    /// # Errors
    ///
    /// Returns `ServiceAlreadyRegistered` if the name is taken.
    pub fn register<T>(&self, key: &ServiceKey<T>, service: Arc<T>) -> Result<(), GenflowError>
    where
        T: Send + Sync + 'static,
    {
        self.register_named(key.name(), service)
    }

    /// Registers a service under a plain name.
    ///
    /// # Errors
    ///
    /// Returns `ServiceAlreadyRegistered` if the name is taken.
    pub fn register_named<T>(&self, name: impl Into<String>, service: Arc<T>) -> Result<(), GenflowError>
    where
        T: Send + Sync + 'static,
    {
        use dashmap::mapref::entry::Entry;

        match self.services.entry(name.into()) {
            Entry::Occupied(e) => Err(GenflowError::ServiceAlreadyRegistered(e.key().clone())),
            Entry::Vacant(e) => {
                e.insert(service);
                Ok(())
            }
        }
    }

    /// Returns the service for a typed key.
    #[must_use]
    pub fn get<T>(&self, key: &ServiceKey<T>) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        self.get_named(key.name())
    }

    /// Returns the service registered under `name` if it has type `T`.
    #[must_use]
    pub fn get_named<T>(&self, name: &str) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        let service = self.services.get(name)?.value().clone();
        service.downcast::<T>().ok()
    }

    /// Removes a service. Returns true if one was removed.
    pub fn unregister(&self, name: &str) -> bool {
        self.services.remove(name).is_some()
    }

    /// Returns true if a service is registered under `name`.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    /// Returns all registered service names.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.services.iter().map(|e| e.key().clone()).collect()
    }
}

impl fmt::Debug for ServiceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceLocator")
            .field("services", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Cache {
        ttl: u64,
    }

    const CACHE: ServiceKey<Cache> = ServiceKey::new("cache");

    #[test]
    fn test_typed_register_and_get() {
        let locator = ServiceLocator::new();
        locator.register(&CACHE, Arc::new(Cache { ttl: 60 })).unwrap();

        assert_eq!(locator.get(&CACHE).unwrap().ttl, 60);
        assert!(locator.has("cache"));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let locator = ServiceLocator::new();
        locator.register(&CACHE, Arc::new(Cache { ttl: 1 })).unwrap();

        let err = locator.register(&CACHE, Arc::new(Cache { ttl: 2 })).unwrap_err();
        assert!(matches!(err, GenflowError::ServiceAlreadyRegistered(name) if name == "cache"));
        assert_eq!(locator.get(&CACHE).unwrap().ttl, 1);
    }

    #[test]
    fn test_wrong_type_returns_none() {
        let locator = ServiceLocator::new();
        locator.register_named("cache", Arc::new(42_u32)).unwrap();

        assert!(locator.get(&CACHE).is_none());
        assert_eq!(locator.get_named::<u32>("cache").as_deref(), Some(&42));
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let locator = ServiceLocator::new();
        locator.register(&CACHE, Arc::new(Cache { ttl: 1 })).unwrap();

        assert!(locator.unregister("cache"));
        assert!(!locator.unregister("cache"));
        assert!(locator.get(&CACHE).is_none());
    }
}
