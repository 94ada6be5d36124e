//! Registry storage for the container
//!
//! Singletons live in a DashMap keyed by bean name. Candidate descriptors
//! are kept in registration order so that lookups by type are
//! deterministic.

use crate::bean::Bean;
use crate::descriptor::TypeDescriptor;
use crate::repository::RepositoryBinding;
use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::any::TypeId;
use std::sync::Arc;

/// Thread-safe storage for singletons, candidates and repository bindings.
pub(crate) struct BeanStorage {
    /// Bean name -> singleton
    singletons: DashMap<String, Arc<Bean>, RandomState>,
    /// Registered descriptors in registration order
    candidates: RwLock<Vec<Arc<TypeDescriptor>>>,
    /// Repository interface -> resolved entity binding
    bindings: DashMap<TypeId, Arc<RepositoryBinding>, RandomState>,
}

impl BeanStorage {
    /// Create new empty storage.
    ///
    /// Uses 8 shards; a typical context holds a few dozen beans.
    #[inline]
    pub fn new() -> Self {
        Self {
            singletons: DashMap::with_capacity_and_hasher_and_shard_amount(
                0,
                RandomState::new(),
                8,
            ),
            candidates: RwLock::new(Vec::new()),
            bindings: DashMap::with_hasher(RandomState::new()),
        }
    }

    // =========================================================================
    // Singletons
    // =========================================================================

    /// Look up a singleton by name
    #[inline]
    pub fn singleton(&self, name: &str) -> Option<Arc<Bean>> {
        self.singletons.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Insert or replace a singleton
    #[inline]
    pub fn insert(&self, name: String, bean: Arc<Bean>) {
        self.singletons.insert(name, bean);
    }

    /// Insert a singleton unless the name is taken. Returns `false` if an
    /// entry already existed.
    pub fn insert_if_absent(&self, name: String, bean: Arc<Bean>) -> bool {
        match self.singletons.entry(name) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(bean);
                true
            }
        }
    }

    /// Remove a singleton, but only if it is still `bean`
    pub fn remove_if_same(&self, name: &str, bean: &Arc<Bean>) -> bool {
        self.singletons
            .remove_if(name, |_, current| Arc::ptr_eq(current, bean))
            .is_some()
    }

    /// Whether a singleton exists under `name`
    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.singletons.contains_key(name)
    }

    /// Every singleton that can be handed out as `type_id`
    pub fn singletons_exposing(&self, type_id: TypeId) -> Vec<Arc<Bean>> {
        self.singletons
            .iter()
            .filter(|entry| entry.value().exposes_id(type_id))
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Snapshot of every singleton
    pub fn all_singletons(&self) -> Vec<Arc<Bean>> {
        self.singletons
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Number of singletons
    #[inline]
    pub fn len(&self) -> usize {
        self.singletons.len()
    }

    // =========================================================================
    // Candidates
    // =========================================================================

    /// Register a candidate. Registering the same type twice is a no-op;
    /// returns `false` in that case.
    pub fn add_candidate(&self, descriptor: Arc<TypeDescriptor>) -> bool {
        let mut candidates = self.candidates.write();
        if candidates
            .iter()
            .any(|existing| existing.type_id() == descriptor.type_id())
        {
            return false;
        }
        candidates.push(descriptor);
        true
    }

    /// First candidate (in registration order) assignable to `type_id`
    pub fn first_candidate_providing(&self, type_id: TypeId) -> Option<Arc<TypeDescriptor>> {
        self.candidates
            .read()
            .iter()
            .find(|descriptor| descriptor.provides(type_id))
            .cloned()
    }

    /// Candidate whose bean name is `name`
    pub fn candidate_named(&self, name: &str) -> Option<Arc<TypeDescriptor>> {
        self.candidates
            .read()
            .iter()
            .find(|descriptor| descriptor.bean_name() == name)
            .cloned()
    }

    /// Snapshot of every candidate in registration order
    pub fn candidates(&self) -> Vec<Arc<TypeDescriptor>> {
        self.candidates.read().clone()
    }

    /// Number of candidates
    #[inline]
    pub fn candidate_count(&self) -> usize {
        self.candidates.read().len()
    }

    // =========================================================================
    // Repository bindings
    // =========================================================================

    /// Cached binding for a repository interface, created on first use
    pub fn binding_or_insert_with(
        &self,
        interface: TypeId,
        create: impl FnOnce() -> RepositoryBinding,
    ) -> Arc<RepositoryBinding> {
        Arc::clone(
            self.bindings
                .entry(interface)
                .or_insert_with(|| Arc::new(create()))
                .value(),
        )
    }
}

impl Default for BeanStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BeanStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeanStorage")
            .field("singletons", &self.len())
            .field("candidates", &self.candidate_count())
            .finish()
    }
}
