//! Per-operation resource binding
//!
//! A [`TxContext`] carries the connection of the current transaction. It is
//! neither `Send` nor `Sync`: a transaction belongs to exactly one thread
//! and one logical operation, and every data-access call receives it
//! explicitly.

use crate::jdbc::ConnectionHandle;
use crate::transaction::TransactionState;
use crate::{IocError, Result};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// A single slot holding at most one bound resource.
#[derive(Debug)]
pub struct ResourceSlot<T> {
    slot: RefCell<Option<T>>,
}

impl<T> ResourceSlot<T> {
    /// Create an empty slot
    #[inline]
    pub const fn new() -> Self {
        Self {
            slot: RefCell::new(None),
        }
    }

    /// Bind `resource`. Fails with [`IocError::ResourceAlreadyBound`] if the
    /// slot is occupied; the existing resource is kept.
    pub fn bind(&self, resource: T) -> Result<()> {
        let mut slot = self.slot.borrow_mut();
        if slot.is_some() {
            return Err(IocError::ResourceAlreadyBound);
        }
        *slot = Some(resource);
        Ok(())
    }

    /// Remove and return the bound resource
    #[inline]
    pub fn take(&self) -> Option<T> {
        self.slot.borrow_mut().take()
    }

    /// Drop the bound resource, if any
    #[inline]
    pub fn clear(&self) {
        self.slot.borrow_mut().take();
    }

    /// Whether a resource is bound
    #[inline]
    pub fn is_bound(&self) -> bool {
        self.slot.borrow().is_some()
    }
}

impl<T: Clone> ResourceSlot<T> {
    /// A clone of the bound resource
    #[inline]
    pub fn get(&self) -> Option<T> {
        self.slot.borrow().clone()
    }
}

impl<T> Default for ResourceSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Transaction context of one logical operation.
///
/// Create one per request (or unit of work) and pass it to every
/// transactional or data-access call made on its behalf.
///
/// ```rust
/// use sprout_ioc::{TransactionState, TxContext};
///
/// let ctx = TxContext::new();
/// assert_eq!(ctx.state(), TransactionState::NoTransaction);
/// assert!(ctx.connection().is_none());
/// ```
#[derive(Default)]
pub struct TxContext {
    connection: ResourceSlot<ConnectionHandle>,
    state: Cell<TransactionState>,
    last_outcome: Cell<Option<TransactionState>>,
}

impl TxContext {
    /// Create a context with no transaction
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current transaction state
    #[inline]
    pub fn state(&self) -> TransactionState {
        self.state.get()
    }

    /// Whether a transaction is active
    #[inline]
    pub fn is_active(&self) -> bool {
        self.state.get() == TransactionState::Active
    }

    /// How the most recent transaction ended (`Committed` or `RolledBack`)
    #[inline]
    pub fn last_outcome(&self) -> Option<TransactionState> {
        self.last_outcome.get()
    }

    /// The transaction-bound connection
    #[inline]
    pub fn connection(&self) -> Option<ConnectionHandle> {
        self.connection.get()
    }

    /// Whether `connection` is the one bound to this context
    pub fn is_bound(&self, connection: &ConnectionHandle) -> bool {
        self.connection
            .get()
            .is_some_and(|bound| Rc::ptr_eq(&bound, connection))
    }

    /// Bind a connection. Fails if one is already bound.
    pub fn bind_connection(&self, connection: ConnectionHandle) -> Result<()> {
        self.connection.bind(connection)
    }

    /// Unbind and return the connection
    pub fn take_connection(&self) -> Option<ConnectionHandle> {
        self.connection.take()
    }

    pub(crate) fn set_state(&self, state: TransactionState) {
        if matches!(state, TransactionState::Committed | TransactionState::RolledBack) {
            self.last_outcome.set(Some(state));
        }
        self.state.set(state);
    }
}

impl std::fmt::Debug for TxContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxContext")
            .field("state", &self.state.get())
            .field("bound", &self.connection.is_bound())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_bind_fails_and_keeps_first() {
        let slot = ResourceSlot::new();
        slot.bind(1).unwrap();
        assert!(matches!(slot.bind(2), Err(IocError::ResourceAlreadyBound)));
        assert_eq!(slot.get(), Some(1));
    }

    #[test]
    fn test_take_and_clear() {
        let slot = ResourceSlot::new();
        slot.bind("conn").unwrap();
        assert_eq!(slot.take(), Some("conn"));
        assert!(!slot.is_bound());

        slot.bind("again").unwrap();
        slot.clear();
        assert!(slot.get().is_none());
    }

    #[test]
    fn test_outcome_is_remembered_after_reset() {
        let ctx = TxContext::new();
        ctx.set_state(TransactionState::Active);
        ctx.set_state(TransactionState::RolledBack);
        ctx.set_state(TransactionState::NoTransaction);

        assert!(!ctx.is_active());
        assert_eq!(ctx.last_outcome(), Some(TransactionState::RolledBack));
    }
}
