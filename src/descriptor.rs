//! Type descriptors
//!
//! A [`TypeDescriptor`] is the registration-time record of everything the
//! container needs to know about a managed type: its markers, how to
//! construct it, which fields to inject, which types it can be viewed as,
//! and how to decorate it with a transactional proxy.
//!
//! Descriptors are built with [`ComponentBuilder`] for concrete types and
//! [`InterfaceBuilder`] for trait objects that have no implementation of
//! their own (repository interfaces).

use crate::autowired::Autowired;
use crate::jdbc::Entity;
use crate::markers::{Markers, MethodMarkers};
use crate::naming;
use crate::processor::BeanPostProcessor;
use crate::provider::{Dependencies, Injectable, Param};
use crate::repository::{CrudRepository, RepositoryProxy};
use crate::transaction::TransactionInterceptor;
use crate::{Container, IocError, Result};
use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Type-erased bean instance
pub(crate) type AnyArc = Arc<dyn Any + Send + Sync>;

/// Type-erased `Arc<I>` for some exposed type `I`
pub(crate) type View = Arc<dyn Any + Send + Sync>;

type BuildFn = dyn Fn(&Container) -> Result<AnyArc> + Send + Sync;
type InjectFn = dyn Fn(&Container, &AnyArc) -> Result<()> + Send + Sync;
type CastFn = dyn Fn(&AnyArc) -> Option<View> + Send + Sync;
type ProxyFn = dyn Fn(&AnyArc, &TransactionInterceptor) -> Option<View> + Send + Sync;
type RepositoryFn = dyn Fn(&Container, &TypeDescriptor) -> Result<AnyArc> + Send + Sync;

/// A type the container manages, described through a builder.
///
/// Implemented by `#[derive(Component)]`.
pub trait Component: Injectable + Sized {
    /// Describe this component
    fn descriptor() -> ComponentBuilder<Self>;
}

/// One declared constructor.
pub struct ConstructorDescriptor {
    params: Vec<Param>,
    markers: Markers,
    build: Arc<BuildFn>,
}

impl ConstructorDescriptor {
    /// Parameter types in declaration order
    #[inline]
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Constructor markers (`INJECT` or empty)
    #[inline]
    pub fn markers(&self) -> Markers {
        self.markers
    }

    pub(crate) fn build(&self, container: &Container) -> Result<AnyArc> {
        (self.build)(container)
    }
}

/// One injected field.
pub struct FieldDescriptor {
    name: &'static str,
    param: Param,
    markers: Markers,
    inject: Arc<InjectFn>,
}

impl FieldDescriptor {
    /// Field name as declared
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Declared field type
    #[inline]
    pub fn param(&self) -> Param {
        self.param
    }

    /// Field markers
    #[inline]
    pub fn markers(&self) -> Markers {
        self.markers
    }

    pub(crate) fn inject(&self, container: &Container, object: &AnyArc) -> Result<()> {
        (self.inject)(container, object)
    }
}

pub(crate) struct ViewCaster {
    pub(crate) param: Param,
    cast: Arc<CastFn>,
}

impl ViewCaster {
    pub(crate) fn cast(&self, object: &AnyArc) -> Option<View> {
        (self.cast)(object)
    }
}

pub(crate) struct ProxyFactory {
    pub(crate) param: Param,
    build: Arc<ProxyFn>,
}

impl ProxyFactory {
    pub(crate) fn build(
        &self,
        object: &AnyArc,
        interceptor: &TransactionInterceptor,
    ) -> Option<View> {
        (self.build)(object, interceptor)
    }
}

pub(crate) enum Instantiation {
    /// A concrete type with declared constructors
    Constructors(Vec<ConstructorDescriptor>),
    /// A trait with no implementation; only repositories can be created
    Interface { repository: Option<Arc<RepositoryFn>> },
}

/// Registration-time description of a managed type.
pub struct TypeDescriptor {
    type_id: TypeId,
    type_name: &'static str,
    explicit_name: Option<String>,
    markers: Markers,
    instantiation: Instantiation,
    fields: Vec<FieldDescriptor>,
    views: Vec<ViewCaster>,
    proxies: Vec<ProxyFactory>,
    method_markers: Arc<MethodMarkers>,
}

impl TypeDescriptor {
    fn empty(type_id: TypeId, type_name: &'static str, instantiation: Instantiation) -> Self {
        Self {
            type_id,
            type_name,
            explicit_name: None,
            markers: Markers::empty(),
            instantiation,
            fields: Vec::new(),
            views: Vec::new(),
            proxies: Vec::new(),
            method_markers: Arc::new(MethodMarkers::default()),
        }
    }

    /// Start describing a concrete component type
    #[inline]
    pub fn component<T: Injectable>() -> ComponentBuilder<T> {
        ComponentBuilder::new()
    }

    /// Start describing an interface (a trait object type)
    #[inline]
    pub fn interface<I: ?Sized + Injectable>() -> InterfaceBuilder<I> {
        InterfaceBuilder::new()
    }

    /// Describe a repository interface bound to entity `E`.
    ///
    /// `cast` turns the generated proxy into the interface.
    pub fn repository<I, E, F>(cast: F) -> InterfaceBuilder<I>
    where
        I: ?Sized + Injectable,
        E: Entity,
        F: Fn(Arc<RepositoryProxy<E>>) -> Arc<I> + Send + Sync + 'static,
    {
        InterfaceBuilder::new()
            .mark(Markers::REPOSITORY)
            .entity::<E, F>(cast)
    }

    /// Identity of the described type
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Full type name
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Type name without module path or generics
    #[inline]
    pub fn simple_name(&self) -> &'static str {
        naming::simple_type_name(self.type_name)
    }

    /// The bean name: explicit name, else the decapitalized simple name
    pub fn bean_name(&self) -> String {
        naming::bean_name(self.explicit_name.as_deref(), self.type_name)
    }

    /// Class-level markers (stereotypes already expanded)
    #[inline]
    pub fn markers(&self) -> Markers {
        self.markers
    }

    /// Whether the scanner should hand this type to the container
    #[inline]
    pub fn is_component(&self) -> bool {
        self.markers.is_component()
    }

    /// Whether this describes a trait rather than a concrete type
    #[inline]
    pub fn is_interface(&self) -> bool {
        matches!(self.instantiation, Instantiation::Interface { .. })
    }

    /// Whether this type takes part in the post-processor chain
    #[inline]
    pub fn is_post_processor(&self) -> bool {
        self.markers.contains(Markers::POST_PROCESSOR)
    }

    /// Declared constructors (empty for interfaces)
    pub fn constructors(&self) -> &[ConstructorDescriptor] {
        match &self.instantiation {
            Instantiation::Constructors(ctors) => ctors,
            Instantiation::Interface { .. } => &[],
        }
    }

    /// Injected fields in declaration order
    #[inline]
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Class- and method-level transactional markers
    #[inline]
    pub fn method_markers(&self) -> &Arc<MethodMarkers> {
        &self.method_markers
    }

    /// Every type a bean of this descriptor is assignable to.
    ///
    /// A proxy only decorates one of these; it never adds a type.
    pub fn exposed_types(&self) -> impl Iterator<Item = Param> + '_ {
        self.views.iter().map(|v| v.param)
    }

    /// Whether a bean of this descriptor is assignable to `type_id`
    pub fn provides(&self, type_id: TypeId) -> bool {
        self.views.iter().any(|v| v.param.type_id == type_id)
    }

    /// Choose the constructor to call.
    ///
    /// A single declared constructor is used as-is. Otherwise exactly one
    /// must carry the `INJECT` marker.
    pub fn select_constructor(&self) -> Result<&ConstructorDescriptor> {
        let ctors = self.constructors();
        if let [only] = ctors {
            return Ok(only);
        }

        let marked: Vec<&ConstructorDescriptor> = ctors
            .iter()
            .filter(|c| c.markers.contains(Markers::INJECT))
            .collect();
        match marked.as_slice() {
            [only] => Ok(only),
            _ => Err(IocError::AmbiguousConstructor {
                type_name: self.type_name,
                declared: ctors.len(),
                inject_marked: marked.len(),
            }),
        }
    }

    pub(crate) fn instantiation(&self) -> &Instantiation {
        &self.instantiation
    }

    pub(crate) fn views(&self) -> &[ViewCaster] {
        &self.views
    }

    pub(crate) fn proxies(&self) -> &[ProxyFactory] {
        &self.proxies
    }

    fn set_markers(&mut self, markers: Markers) {
        self.markers |= markers;
        self.markers = self.markers.expand();
        Arc::make_mut(&mut self.method_markers).set_class(self.markers);
    }

    fn declare_method(&mut self, method: &'static str, markers: Markers) {
        Arc::make_mut(&mut self.method_markers).declare(method, markers);
    }

    fn push_view(&mut self, caster: ViewCaster) {
        self.views.retain(|v| v.param.type_id != caster.param.type_id);
        self.views.push(caster);
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("type_name", &self.type_name)
            .field("bean_name", &self.bean_name())
            .field("markers", &self.markers)
            .field("constructors", &self.constructors().len())
            .field("fields", &self.fields.len())
            .field(
                "exposes",
                &self.exposed_types().map(|p| p.type_name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

// =============================================================================
// ComponentBuilder
// =============================================================================

/// Builder for a concrete component `T`.
///
/// ```rust
/// use sprout_ioc::{Container, TypeDescriptor};
/// use std::sync::Arc;
///
/// #[derive(Default)]
/// struct Clock;
///
/// struct Greeter {
///     clock: Arc<Clock>,
/// }
///
/// let container = Container::new();
/// container.register_type(TypeDescriptor::component::<Clock>().default_constructor());
/// container.register_type(
///     TypeDescriptor::component::<Greeter>()
///         .constructor(|clock: Arc<Clock>| Ok(Greeter { clock })),
/// );
///
/// let greeter = container.get::<Greeter>().unwrap();
/// assert!(Arc::ptr_eq(&greeter.clock, &container.get::<Clock>().unwrap()));
/// ```
pub struct ComponentBuilder<T> {
    descriptor: TypeDescriptor,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Injectable> ComponentBuilder<T> {
    /// Describe `T` as a plain component with no constructors yet
    pub fn new() -> Self {
        let mut descriptor = TypeDescriptor::empty(
            TypeId::of::<T>(),
            std::any::type_name::<T>(),
            Instantiation::Constructors(Vec::new()),
        );
        descriptor.set_markers(Markers::COMPONENT);
        descriptor.push_view(ViewCaster {
            param: Param::of::<T>(),
            cast: Arc::new(|object: &AnyArc| {
                object
                    .clone()
                    .downcast::<T>()
                    .ok()
                    .map(|concrete| Arc::new(concrete) as View)
            }),
        });
        Self {
            descriptor,
            _marker: PhantomData,
        }
    }

    /// Use an explicit bean name
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.descriptor.explicit_name = Some(name.into());
        self
    }

    /// Add class-level markers
    pub fn mark(mut self, markers: Markers) -> Self {
        self.descriptor.set_markers(markers);
        self
    }

    /// Mark every method of this type transactional
    pub fn transactional(self) -> Self {
        self.mark(Markers::TRANSACTIONAL)
    }

    /// Declare markers on a single method
    pub fn method(mut self, name: &'static str, markers: Markers) -> Self {
        self.descriptor.declare_method(name, markers);
        self
    }

    fn push_constructor<D, F>(mut self, markers: Markers, ctor: F) -> Self
    where
        D: Dependencies,
        F: Fn(D) -> Result<T> + Send + Sync + 'static,
    {
        let build = move |container: &Container| -> Result<AnyArc> {
            let deps = D::resolve(container)?;
            let instance = ctor(deps)?;
            Ok(Arc::new(instance) as AnyArc)
        };
        if let Instantiation::Constructors(ctors) = &mut self.descriptor.instantiation {
            ctors.push(ConstructorDescriptor {
                params: D::params(),
                markers,
                build: Arc::new(build),
            });
        }
        self
    }

    /// Declare a constructor taking the parameter list `D`
    pub fn constructor<D, F>(self, ctor: F) -> Self
    where
        D: Dependencies,
        F: Fn(D) -> Result<T> + Send + Sync + 'static,
    {
        self.push_constructor(Markers::empty(), ctor)
    }

    /// Declare a constructor carrying the inject marker
    pub fn inject_constructor<D, F>(self, ctor: F) -> Self
    where
        D: Dependencies,
        F: Fn(D) -> Result<T> + Send + Sync + 'static,
    {
        self.push_constructor(Markers::INJECT, ctor)
    }

    /// Declare a no-argument constructor using `Default`
    pub fn default_constructor(self) -> Self
    where
        T: Default,
    {
        self.constructor(|()| Ok(T::default()))
    }

    /// Declare an injected field.
    ///
    /// After construction the container resolves `I` by type and stores it
    /// in the slot returned by `accessor`.
    pub fn inject<I, F>(mut self, field: &'static str, accessor: F) -> Self
    where
        I: ?Sized + Injectable,
        F: Fn(&T) -> &Autowired<I> + Send + Sync + 'static,
    {
        let inject = move |container: &Container, object: &AnyArc| -> Result<()> {
            let target = object.downcast_ref::<T>().ok_or_else(|| {
                IocError::Internal(format!(
                    "field {field} declared on {} but bean is another type",
                    std::any::type_name::<T>()
                ))
            })?;
            let slot = accessor(target);
            if slot.is_injected() {
                return Ok(());
            }
            slot.inject(container.get::<I>()?);
            Ok(())
        };
        self.descriptor.fields.push(FieldDescriptor {
            name: field,
            param: Param::of::<I>(),
            markers: Markers::INJECT,
            inject: Arc::new(inject),
        });
        self
    }

    /// Expose the bean as `I` as well as `T`
    pub fn provides<I, F>(mut self, cast: F) -> Self
    where
        I: ?Sized + Injectable,
        F: Fn(Arc<T>) -> Arc<I> + Send + Sync + 'static,
    {
        self.descriptor.push_view(ViewCaster {
            param: Param::of::<I>(),
            cast: Arc::new(move |object: &AnyArc| {
                object
                    .clone()
                    .downcast::<T>()
                    .ok()
                    .map(|concrete| Arc::new(cast(concrete)) as View)
            }),
        });
        self
    }

    /// Register the decorator used when the bean is transactional.
    ///
    /// The transaction post-processor calls `factory` with the raw bean and
    /// an interceptor, and the result replaces the bean's `I` view. `I`
    /// must also be declared with [`provides`](Self::provides); otherwise
    /// the factory is ignored. Pair with the
    /// [`transactional_proxy!`](crate::transactional_proxy) macro.
    pub fn proxy<I, F>(mut self, factory: F) -> Self
    where
        I: ?Sized + Injectable,
        F: Fn(Arc<T>, TransactionInterceptor) -> Arc<I> + Send + Sync + 'static,
    {
        self.descriptor.proxies.push(ProxyFactory {
            param: Param::of::<I>(),
            build: Arc::new(move |object: &AnyArc, interceptor: &TransactionInterceptor| {
                object
                    .clone()
                    .downcast::<T>()
                    .ok()
                    .map(|concrete| Arc::new(factory(concrete, interceptor.clone())) as View)
            }),
        });
        self
    }

    /// Take part in the post-processor chain
    pub fn post_processor(self) -> Self
    where
        T: BeanPostProcessor,
    {
        self.mark(Markers::POST_PROCESSOR)
            .provides::<dyn BeanPostProcessor, _>(|processor| processor as Arc<dyn BeanPostProcessor>)
    }

    /// Finish the descriptor
    #[inline]
    pub fn build(self) -> TypeDescriptor {
        self.descriptor
    }
}

impl<T: Injectable> Default for ComponentBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Injectable> From<ComponentBuilder<T>> for TypeDescriptor {
    fn from(builder: ComponentBuilder<T>) -> Self {
        builder.build()
    }
}

// =============================================================================
// InterfaceBuilder
// =============================================================================

/// Builder for an interface `I` (a trait object type).
///
/// An interface can only be instantiated when it carries the repository
/// marker and is bound to an entity; the container then backs it with a
/// [`RepositoryProxy`].
pub struct InterfaceBuilder<I: ?Sized> {
    descriptor: TypeDescriptor,
    _marker: PhantomData<fn() -> Arc<I>>,
}

impl<I: ?Sized + Injectable> InterfaceBuilder<I> {
    /// Describe `I` with no entity binding
    pub fn new() -> Self {
        let mut descriptor = TypeDescriptor::empty(
            TypeId::of::<I>(),
            std::any::type_name::<I>(),
            Instantiation::Interface { repository: None },
        );
        // No instance can be cast until an entity is bound.
        descriptor.push_view(ViewCaster {
            param: Param::of::<I>(),
            cast: Arc::new(|_: &AnyArc| None),
        });
        Self {
            descriptor,
            _marker: PhantomData,
        }
    }

    /// Use an explicit bean name
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.descriptor.explicit_name = Some(name.into());
        self
    }

    /// Add class-level markers
    pub fn mark(mut self, markers: Markers) -> Self {
        self.descriptor.set_markers(markers);
        self
    }

    /// Bind the interface to entity `E`, backing it with a repository proxy
    pub fn entity<E, F>(mut self, cast: F) -> Self
    where
        E: Entity,
        F: Fn(Arc<RepositoryProxy<E>>) -> Arc<I> + Send + Sync + 'static,
    {
        let factory = |container: &Container, descriptor: &TypeDescriptor| -> Result<AnyArc> {
            let jdbc = container.get::<crate::jdbc::JdbcTemplate>()?;
            let binding = container.repository_binding::<E>(descriptor);
            Ok(Arc::new(RepositoryProxy::<E>::new(jdbc, binding)) as AnyArc)
        };
        self.descriptor.instantiation = Instantiation::Interface {
            repository: Some(Arc::new(factory)),
        };

        self.descriptor.push_view(ViewCaster {
            param: Param::of::<I>(),
            cast: Arc::new(move |object: &AnyArc| {
                object
                    .clone()
                    .downcast::<RepositoryProxy<E>>()
                    .ok()
                    .map(|proxy| Arc::new(cast(proxy)) as View)
            }),
        });
        self.descriptor.push_view(ViewCaster {
            param: Param::of::<RepositoryProxy<E>>(),
            cast: Arc::new(|object: &AnyArc| {
                object
                    .clone()
                    .downcast::<RepositoryProxy<E>>()
                    .ok()
                    .map(|proxy| Arc::new(proxy) as View)
            }),
        });
        self.descriptor.push_view(ViewCaster {
            param: Param::of::<dyn CrudRepository<E>>(),
            cast: Arc::new(|object: &AnyArc| {
                object
                    .clone()
                    .downcast::<RepositoryProxy<E>>()
                    .ok()
                    .map(|proxy| Arc::new(proxy as Arc<dyn CrudRepository<E>>) as View)
            }),
        });
        self
    }

    /// Finish the descriptor
    #[inline]
    pub fn build(self) -> TypeDescriptor {
        self.descriptor
    }
}

impl<I: ?Sized + Injectable> Default for InterfaceBuilder<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: ?Sized + Injectable> From<InterfaceBuilder<I>> for TypeDescriptor {
    fn from(builder: InterfaceBuilder<I>) -> Self {
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Store: Send + Sync {}

    #[derive(Default)]
    struct MemoryStore;

    impl Store for MemoryStore {}

    #[test]
    fn test_component_exposes_itself_and_provided_interfaces() {
        let descriptor = TypeDescriptor::component::<MemoryStore>()
            .default_constructor()
            .provides::<dyn Store, _>(|s| s as Arc<dyn Store>)
            .build();

        assert!(descriptor.provides(TypeId::of::<MemoryStore>()));
        assert!(descriptor.provides(TypeId::of::<dyn Store>()));
        assert!(!descriptor.provides(TypeId::of::<String>()));
        assert_eq!(descriptor.bean_name(), "memoryStore");
        assert!(descriptor.is_component());
        assert!(!descriptor.is_interface());
    }

    #[test]
    fn test_single_constructor_is_used_without_marker() {
        let descriptor = TypeDescriptor::component::<MemoryStore>()
            .default_constructor()
            .build();
        assert!(descriptor.select_constructor().is_ok());
    }

    #[test]
    fn test_two_unmarked_constructors_are_ambiguous() {
        let descriptor = TypeDescriptor::component::<MemoryStore>()
            .default_constructor()
            .constructor(|_: Arc<String>| Ok(MemoryStore))
            .build();

        let err = descriptor.select_constructor().err().unwrap();
        assert!(matches!(
            err,
            IocError::AmbiguousConstructor {
                declared: 2,
                inject_marked: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_inject_marker_selects_constructor() {
        let descriptor = TypeDescriptor::component::<MemoryStore>()
            .default_constructor()
            .inject_constructor(|_: Arc<String>| Ok(MemoryStore))
            .build();

        let ctor = descriptor.select_constructor().unwrap();
        assert_eq!(ctor.params().len(), 1);
        assert_eq!(ctor.params()[0].type_id, TypeId::of::<String>());
    }

    #[test]
    fn test_two_marked_constructors_are_ambiguous() {
        let descriptor = TypeDescriptor::component::<MemoryStore>()
            .inject_constructor(|()| Ok(MemoryStore))
            .inject_constructor(|_: Arc<String>| Ok(MemoryStore))
            .build();

        assert!(matches!(
            descriptor.select_constructor(),
            Err(IocError::AmbiguousConstructor {
                inject_marked: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_stereotype_and_method_markers() {
        let descriptor = TypeDescriptor::component::<MemoryStore>()
            .mark(Markers::SERVICE)
            .method("save", Markers::TRANSACTIONAL)
            .named("store")
            .build();

        assert!(descriptor.markers().contains(Markers::COMPONENT));
        assert!(descriptor.method_markers().is_transactional("save"));
        assert!(!descriptor.method_markers().is_transactional("load"));
        assert_eq!(descriptor.bean_name(), "store");
    }

    #[test]
    fn test_interface_without_entity_is_not_a_component() {
        let descriptor = TypeDescriptor::interface::<dyn Store>().build();
        assert!(descriptor.is_interface());
        assert!(!descriptor.is_component());
        assert!(descriptor.provides(TypeId::of::<dyn Store>()));
        assert_eq!(descriptor.bean_name(), "store");
    }

    #[test]
    fn test_proxy_alone_does_not_provide_a_type() {
        let descriptor = TypeDescriptor::component::<MemoryStore>()
            .default_constructor()
            .proxy::<dyn Store, _>(|target, _| target as Arc<dyn Store>)
            .build();

        assert!(!descriptor.provides(TypeId::of::<dyn Store>()));
        assert!(descriptor.provides(TypeId::of::<MemoryStore>()));
        assert_eq!(descriptor.proxies().len(), 1);
        assert!(
            descriptor
                .exposed_types()
                .all(|param| param.type_id != TypeId::of::<dyn Store>())
        );
    }
}
