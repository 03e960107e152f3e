// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Registry of the device handlers attached to a bridge.
//!
//! The registry holds weak references only: the host framework owns its
//! handlers and the registry never keeps one alive or drops one. Every
//! operation takes the same mutex once, so the emptiness seen by the
//! coordinator is always consistent with the last add or remove.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::device::{DeviceId, StateSink};
use crate::error::RegistryError;

/// Result of adding a handler to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The handler was added.
    Added {
        /// `true` if the registry was empty before this add.
        first: bool,
    },
    /// The same handler was already registered; nothing changed.
    AlreadyRegistered,
}

/// Result of removing a handler from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoveOutcome {
    /// `true` if the handler was registered and has been removed.
    pub removed: bool,
    /// `true` if the registry is empty after this call.
    pub now_empty: bool,
}

impl RemoveOutcome {
    /// Returns `true` if this removal emptied the registry.
    #[must_use]
    pub fn emptied(&self) -> bool {
        self.removed && self.now_empty
    }
}

/// Concurrency-safe map from device identifier to device handler.
#[derive(Default)]
pub struct DeviceRegistry {
    handlers: Mutex<HashMap<DeviceId, Weak<dyn StateSink>>>,
}

impl DeviceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler under its device identifier.
    ///
    /// Adding a handler that is already registered is a no-op. Entries whose
    /// handler the host already dropped count as vacant and are replaced.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateRegistration`] if a different handler
    /// is registered for the same device (identifiers compare case-insensitively).
    pub fn add(&self, handler: &Arc<dyn StateSink>) -> Result<AddOutcome, RegistryError> {
        let device_id = handler.device_id();
        let mut handlers = self.handlers.lock();
        prune_dead(&mut handlers);

        if let Some(existing) = handlers.get(&device_id) {
            if std::ptr::addr_eq(existing.as_ptr(), Arc::as_ptr(handler)) {
                return Ok(AddOutcome::AlreadyRegistered);
            }
            return Err(RegistryError::DuplicateRegistration { device_id });
        }

        let first = handlers.is_empty();
        handlers.insert(device_id, Arc::downgrade(handler));
        Ok(AddOutcome::Added { first })
    }

    /// Unregisters a handler.
    ///
    /// Removing a handler that is not registered is a no-op. A different
    /// handler registered under the same identifier is left in place.
    pub fn remove(&self, handler: &Arc<dyn StateSink>) -> RemoveOutcome {
        let device_id = handler.device_id();
        let mut handlers = self.handlers.lock();
        prune_dead(&mut handlers);

        let is_registered = handlers
            .get(&device_id)
            .is_some_and(|existing| std::ptr::addr_eq(existing.as_ptr(), Arc::as_ptr(handler)));
        if is_registered {
            handlers.remove(&device_id);
        }

        RemoveOutcome {
            removed: is_registered,
            now_empty: handlers.is_empty(),
        }
    }

    /// Returns `true` if no live handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of live registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers
            .lock()
            .values()
            .filter(|handler| handler.strong_count() > 0)
            .count()
    }

    /// Returns `true` if a live handler is registered for the device.
    #[must_use]
    pub fn contains(&self, device_id: &DeviceId) -> bool {
        self.handlers
            .lock()
            .get(device_id)
            .is_some_and(|handler| handler.strong_count() > 0)
    }

    /// Looks up the live handler for a device.
    ///
    /// Returns `None` if no handler is registered or the host already dropped it.
    #[must_use]
    pub fn get(&self, device_id: &DeviceId) -> Option<Arc<dyn StateSink>> {
        self.handlers.lock().get(device_id).and_then(Weak::upgrade)
    }

    /// Returns a point-in-time copy of the live handlers.
    ///
    /// The copy is unaffected by later adds and removes; take a new snapshot
    /// to observe them. Handlers the host has already dropped are skipped.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(DeviceId, Arc<dyn StateSink>)> {
        self.handlers
            .lock()
            .iter()
            .filter_map(|(id, weak)| weak.upgrade().map(|handler| (id.clone(), handler)))
            .collect()
    }
}

/// Drops entries whose handler is gone.
fn prune_dead(handlers: &mut HashMap<DeviceId, Weak<dyn StateSink>>) {
    handlers.retain(|_, handler| handler.strong_count() > 0);
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.lock();
        f.debug_struct("DeviceRegistry")
            .field("devices", &handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::DeviceState;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct TestHandler {
        id: DeviceId,
        applied: AtomicU32,
    }

    impl TestHandler {
        fn new(id: &str) -> Arc<Self> {
            Arc::new(Self {
                id: DeviceId::new(id),
                applied: AtomicU32::new(0),
            })
        }
    }

    impl StateSink for TestHandler {
        fn device_id(&self) -> DeviceId {
            self.id.clone()
        }

        fn apply_state(&self, _state: &DeviceState) {
            self.applied.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn sink(handler: &Arc<TestHandler>) -> Arc<dyn StateSink> {
        handler.clone()
    }

    #[test]
    fn new_registry_is_empty() {
        let registry = DeviceRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn first_add_is_reported() {
        let registry = DeviceRegistry::new();
        let fan = sink(&TestHandler::new("fan"));
        let light = sink(&TestHandler::new("light"));

        assert_eq!(registry.add(&fan), Ok(AddOutcome::Added { first: true }));
        assert_eq!(registry.add(&light), Ok(AddOutcome::Added { first: false }));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn re_adding_same_handler_is_noop() {
        let registry = DeviceRegistry::new();
        let fan = sink(&TestHandler::new("fan"));

        registry.add(&fan).unwrap();
        assert_eq!(registry.add(&fan), Ok(AddOutcome::AlreadyRegistered));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn different_handler_same_id_is_rejected() {
        let registry = DeviceRegistry::new();
        let first = sink(&TestHandler::new("ABC123"));
        let second = sink(&TestHandler::new("abc123"));

        registry.add(&first).unwrap();
        let err = registry.add(&second).unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateRegistration {
                device_id: DeviceId::new("abc123")
            }
        );
        assert_eq!(registry.len(), 1);
        assert!(Arc::ptr_eq(
            &registry.get(&DeviceId::new("abc123")).unwrap(),
            &first
        ));
    }

    #[test]
    fn remove_reports_emptiness() {
        let registry = DeviceRegistry::new();
        let fan = sink(&TestHandler::new("fan"));
        let light = sink(&TestHandler::new("light"));
        registry.add(&fan).unwrap();
        registry.add(&light).unwrap();

        let outcome = registry.remove(&fan);
        assert!(outcome.removed);
        assert!(!outcome.now_empty);

        let outcome = registry.remove(&light);
        assert!(outcome.emptied());
        assert!(registry.is_empty());
    }

    #[test]
    fn remove_absent_handler_is_noop() {
        let registry = DeviceRegistry::new();
        let fan = sink(&TestHandler::new("fan"));

        let outcome = registry.remove(&fan);
        assert!(!outcome.removed);
        assert!(outcome.now_empty);
        assert!(!outcome.emptied());
    }

    #[test]
    fn remove_does_not_evict_other_handler_with_same_id() {
        let registry = DeviceRegistry::new();
        let owner = sink(&TestHandler::new("fan"));
        let impostor = sink(&TestHandler::new("FAN"));
        registry.add(&owner).unwrap();

        let outcome = registry.remove(&impostor);
        assert!(!outcome.removed);
        assert!(registry.contains(&DeviceId::new("fan")));
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let registry = DeviceRegistry::new();
        let handler = TestHandler::new("abc123");
        registry.add(&sink(&handler)).unwrap();

        let found = registry.get(&DeviceId::new("ABC123")).unwrap();
        found.apply_state(&DeviceState::default());
        assert_eq!(handler.applied.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn registry_does_not_keep_handlers_alive() {
        let registry = DeviceRegistry::new();
        {
            let handler = sink(&TestHandler::new("temporary"));
            registry.add(&handler).unwrap();
        }

        assert_eq!(registry.len(), 0);
        assert!(registry.is_empty());
        assert!(!registry.contains(&DeviceId::new("temporary")));
        assert!(registry.get(&DeviceId::new("temporary")).is_none());
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn dropped_handler_slot_can_be_reused() {
        let registry = DeviceRegistry::new();
        {
            let stale = sink(&TestHandler::new("fan"));
            registry.add(&stale).unwrap();
        }

        let fan = sink(&TestHandler::new("FAN"));
        assert_eq!(
            registry.add(&fan).unwrap(),
            AddOutcome::Added { first: true }
        );
        assert!(Arc::ptr_eq(&registry.get(&DeviceId::new("fan")).unwrap(), &fan));
    }

    #[test]
    fn removing_last_live_handler_empties_registry() {
        let registry = DeviceRegistry::new();
        let fan = sink(&TestHandler::new("fan"));
        registry.add(&fan).unwrap();
        {
            let stale = sink(&TestHandler::new("light"));
            assert_eq!(
                registry.add(&stale).unwrap(),
                AddOutcome::Added { first: false }
            );
        }

        let outcome = registry.remove(&fan);
        assert!(outcome.removed);
        assert!(outcome.now_empty);
        assert!(registry.is_empty());
    }

    #[test]
    fn snapshot_is_point_in_time() {
        let registry = DeviceRegistry::new();
        let fan = sink(&TestHandler::new("fan"));
        let light = sink(&TestHandler::new("light"));
        registry.add(&fan).unwrap();

        let snapshot = registry.snapshot();
        registry.add(&light).unwrap();
        registry.remove(&fan);

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].0, DeviceId::new("fan"));
        assert_eq!(registry.snapshot()[0].0, DeviceId::new("light"));
    }

    #[test]
    fn concurrent_adds_report_exactly_one_first() {
        let registry = Arc::new(DeviceRegistry::new());
        let firsts = Arc::new(AtomicU32::new(0));

        let threads: Vec<_> = (0..16)
            .map(|i| {
                let registry = Arc::clone(&registry);
                let firsts = Arc::clone(&firsts);
                std::thread::spawn(move || {
                    let handler = sink(&TestHandler::new(&format!("device{i}")));
                    if registry.add(&handler) == Ok(AddOutcome::Added { first: true }) {
                        firsts.fetch_add(1, Ordering::SeqCst);
                    }
                    handler
                })
            })
            .collect();
        let handlers: Vec<_> = threads.into_iter().map(|t| t.join().unwrap()).collect();

        assert_eq!(firsts.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 16);
        assert_eq!(registry.snapshot().len(), handlers.len());
    }
}
