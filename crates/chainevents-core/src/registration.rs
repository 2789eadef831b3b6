//! Registration handles and the guard that releases them.

use std::sync::Arc;

use crate::source::EventSource;
use crate::types::Category;

/// Identifier the event source assigns to a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(pub u64);

impl std::fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "reg-{}", self.0)
    }
}

/// An active subscription to one event category.
///
/// Not `Clone`: [`EventSource::unregister`] takes it by value,
/// so a released registration cannot be used again.
#[derive(Debug, PartialEq, Eq)]
pub struct Registration {
    id: RegistrationId,
    category: Category,
}

impl Registration {
    /// Constructed by event source implementations only.
    pub fn new(id: RegistrationId, category: Category) -> Self {
        Self { id, category }
    }

    pub fn id(&self) -> RegistrationId {
        self.id
    }

    pub fn category(&self) -> Category {
        self.category
    }
}

/// Owns a [`Registration`] and releases it against its source at most once.
///
/// Released explicitly via [`release`](Self::release) or, failing that, on drop.
pub struct RegistrationGuard {
    source: Arc<dyn EventSource>,
    registration: Option<Registration>,
    id: RegistrationId,
    category: Category,
}

impl RegistrationGuard {
    pub fn new(source: Arc<dyn EventSource>, registration: Registration) -> Self {
        Self {
            id: registration.id(),
            category: registration.category(),
            source,
            registration: Some(registration),
        }
    }

    pub fn id(&self) -> RegistrationId {
        self.id
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Returns `true` while the registration has not been released.
    pub fn is_active(&self) -> bool {
        self.registration.is_some()
    }

    /// Release the registration. Returns `false` if it was already released.
    pub fn release(&mut self) -> bool {
        match self.registration.take() {
            Some(registration) => {
                tracing::debug!(id = %self.id, category = %self.category, "releasing registration");
                self.source.unregister(registration);
                true
            }
            None => false,
        }
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        if self.release() {
            tracing::warn!(id = %self.id, category = %self.category, "registration released on drop");
        }
    }
}

impl std::fmt::Debug for RegistrationGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationGuard")
            .field("id", &self.id)
            .field("category", &self.category)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryEventSource;
    use crate::types::EventFilter;

    #[tokio::test]
    async fn release_twice_is_harmless() {
        let source = Arc::new(MemoryEventSource::new());
        let (registration, _stream) = source.register(&EventFilter::Block).await.unwrap();

        let mut guard = RegistrationGuard::new(source.clone(), registration);
        assert!(guard.is_active());
        assert!(guard.release());
        assert!(!guard.release());
        assert!(!guard.is_active());
        assert_eq!(source.unregister_count(), 1);
        assert_eq!(source.active_registrations(), 0);
    }

    #[tokio::test]
    async fn drop_releases_once() {
        let source = Arc::new(MemoryEventSource::new());
        let (registration, _stream) = source.register(&EventFilter::Block).await.unwrap();
        {
            let mut guard = RegistrationGuard::new(source.clone(), registration);
            guard.release();
        }
        let (registration, _stream) = source.register(&EventFilter::Block).await.unwrap();
        drop(RegistrationGuard::new(source.clone(), registration));

        assert_eq!(source.unregister_count(), 2);
        assert_eq!(source.active_registrations(), 0);
    }
}
