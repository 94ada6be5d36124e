//! Bean instances held by the container

use crate::descriptor::{AnyArc, TypeDescriptor, View};
use crate::provider::Injectable;
use ahash::AHashMap;
use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

/// A singleton instance plus every type it can be handed out as.
///
/// The raw instance is kept separately from its views. A transactional
/// bean is handed out only through its decorators; the raw instance (the
/// proxy target) stays reachable through [`target`](Self::target) alone.
pub struct Bean {
    name: String,
    descriptor: Arc<TypeDescriptor>,
    object: AnyArc,
    views: AHashMap<TypeId, View>,
    proxied: bool,
}

impl Bean {
    pub(crate) fn new(name: String, descriptor: Arc<TypeDescriptor>, object: AnyArc) -> Self {
        let views = descriptor
            .views()
            .iter()
            .filter_map(|caster| caster.cast(&object).map(|view| (caster.param.type_id, view)))
            .collect();
        Self {
            name,
            descriptor,
            object,
            views,
            proxied: false,
        }
    }

    /// Copy of this bean with some views replaced by decorators
    pub(crate) fn decorated(&self, replaced: impl IntoIterator<Item = (TypeId, View)>) -> Self {
        let mut views = self.views.clone();
        views.extend(replaced);
        Self {
            name: self.name.clone(),
            descriptor: Arc::clone(&self.descriptor),
            object: Arc::clone(&self.object),
            views,
            proxied: true,
        }
    }

    /// Copy of this bean that is reachable only through `decorators`.
    ///
    /// Every other view, the concrete type included, is dropped so a
    /// lookup can never bypass the decorators.
    pub(crate) fn proxied_by(&self, decorators: impl IntoIterator<Item = (TypeId, View)>) -> Self {
        Self {
            name: self.name.clone(),
            descriptor: Arc::clone(&self.descriptor),
            object: Arc::clone(&self.object),
            views: decorators.into_iter().collect(),
            proxied: true,
        }
    }

    /// Copy of this bean that hands out `replacement` whenever `I` is
    /// requested. The raw instance is kept as the target.
    pub fn replace_view<I: ?Sized + Injectable>(&self, replacement: Arc<I>) -> Self {
        self.decorated([(TypeId::of::<I>(), Arc::new(replacement) as View)])
    }

    /// Registry name
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full type name of the raw instance
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.descriptor.type_name()
    }

    /// The descriptor this bean was created from
    #[inline]
    pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.descriptor
    }

    /// Whether any view has been replaced by a decorator
    #[inline]
    pub fn is_proxy(&self) -> bool {
        self.proxied
    }

    /// Whether the bean can be handed out as `T`
    #[inline]
    pub fn exposes<T: ?Sized + 'static>(&self) -> bool {
        self.views.contains_key(&TypeId::of::<T>())
    }

    pub(crate) fn exposes_id(&self, type_id: TypeId) -> bool {
        self.views.contains_key(&type_id)
    }

    /// The bean as `T`, decorated if the bean is proxied
    pub fn view<T: ?Sized + Injectable>(&self) -> Option<Arc<T>> {
        self.views
            .get(&TypeId::of::<T>())
            .and_then(|view| view.downcast_ref::<Arc<T>>())
            .cloned()
    }

    /// The raw instance, never decorated
    pub fn target<T: Injectable>(&self) -> Option<Arc<T>> {
        self.object.clone().downcast::<T>().ok()
    }

    pub(crate) fn object(&self) -> &AnyArc {
        &self.object
    }
}

impl fmt::Debug for Bean {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bean")
            .field("name", &self.name)
            .field("type_name", &self.type_name())
            .field("views", &self.views.len())
            .field("proxied", &self.proxied)
            .finish()
    }
}
