//! Field injection slots

use once_cell::sync::OnceCell;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// A field filled in by the container after construction.
///
/// Components declare injected fields as `Autowired<T>` and register them
/// with [`ComponentBuilder::inject`](crate::ComponentBuilder::inject). The
/// slot is written exactly once, after the owning bean has been exposed to
/// the registry, which is what lets two beans reference each other through
/// fields.
///
/// ```rust
/// use sprout_ioc::Autowired;
/// use std::sync::Arc;
///
/// let slot: Autowired<String> = Autowired::new();
/// assert!(slot.get().is_none());
///
/// assert!(slot.inject(Arc::new("ready".to_string())));
/// assert_eq!(slot.as_str(), "ready");
/// ```
pub struct Autowired<T: ?Sized> {
    slot: OnceCell<Arc<T>>,
}

impl<T: ?Sized> Autowired<T> {
    /// Create an empty slot
    #[inline]
    pub const fn new() -> Self {
        Self {
            slot: OnceCell::new(),
        }
    }

    /// The injected bean, if injection has happened
    #[inline]
    pub fn get(&self) -> Option<&Arc<T>> {
        self.slot.get()
    }

    /// A cloned handle to the injected bean
    #[inline]
    pub fn cloned(&self) -> Option<Arc<T>> {
        self.slot.get().cloned()
    }

    /// Whether the container has filled this slot
    #[inline]
    pub fn is_injected(&self) -> bool {
        self.slot.get().is_some()
    }

    /// Fill the slot. Returns `false` if it was already filled; the first
    /// value is kept.
    #[inline]
    pub fn inject(&self, value: Arc<T>) -> bool {
        self.slot.set(value).is_ok()
    }
}

impl<T: ?Sized> Default for Autowired<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> Deref for Autowired<T> {
    type Target = T;

    /// # Panics
    ///
    /// Panics if the container has not injected this field yet. Use
    /// [`Autowired::get`] where an empty slot is expected.
    fn deref(&self) -> &T {
        match self.slot.get() {
            Some(value) => value,
            None => panic!(
                "Autowired<{}> dereferenced before injection",
                std::any::type_name::<T>()
            ),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Autowired<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Autowired")
            .field("type", &std::any::type_name::<T>())
            .field("injected", &self.is_injected())
            .finish()
    }
}
