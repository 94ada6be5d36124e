//! The bean container
//!
//! The `Container` turns registered [`TypeDescriptor`]s into singletons on
//! demand: it chooses a constructor, resolves its parameters, exposes the
//! instance early, injects fields, and finally runs the post-processor
//! chain.

use crate::bean::Bean;
use crate::descriptor::{AnyArc, ComponentBuilder, Component, Instantiation, TypeDescriptor};
use crate::jdbc::Entity;
use crate::markers::Markers;
use crate::processor::{apply_chain, BeanPostProcessor};
use crate::repository::RepositoryBinding;
use crate::storage::BeanStorage;
use crate::{Injectable, IocError, Result};
use once_cell::sync::OnceCell;
use parking_lot::ReentrantMutex;
use std::any::TypeId;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, info, trace, warn};

/// Book-keeping for beans currently being created on the locking thread.
#[derive(Default)]
struct CreationState {
    /// Names whose constructor is currently running, outermost first
    stack: Vec<String>,
    /// Processors built so far, while the chain is being assembled
    assembling: Option<Vec<Arc<dyn BeanPostProcessor>>>,
}

/// Holds `name` on the creation stack until dropped, unwinding included.
struct CreationFrame<'a> {
    state: &'a RefCell<CreationState>,
}

impl<'a> CreationFrame<'a> {
    /// Push `name`, or fail if it is already being constructed.
    fn enter(state: &'a RefCell<CreationState>, name: &str) -> Result<Self> {
        let mut current = state.borrow_mut();
        if let Some(start) = current.stack.iter().position(|entry| entry == name) {
            let mut path = current.stack[start..].to_vec();
            path.push(name.to_string());
            return Err(IocError::CircularDependency {
                name: name.to_string(),
                path,
            });
        }
        current.stack.push(name.to_string());
        drop(current);
        Ok(Self { state })
    }
}

impl Drop for CreationFrame<'_> {
    fn drop(&mut self) {
        self.state.borrow_mut().stack.pop();
    }
}

/// Marks the chain as under assembly until dropped.
struct ChainAssembly<'a> {
    state: &'a RefCell<CreationState>,
}

impl<'a> ChainAssembly<'a> {
    fn start(state: &'a RefCell<CreationState>) -> Self {
        state.borrow_mut().assembling = Some(Vec::new());
        Self { state }
    }

    /// Make `processor` apply to beans created from now on
    fn built(&self, processor: Arc<dyn BeanPostProcessor>) {
        if let Some(partial) = self.state.borrow_mut().assembling.as_mut() {
            partial.push(processor);
        }
    }
}

impl Drop for ChainAssembly<'_> {
    fn drop(&mut self) {
        self.state.borrow_mut().assembling = None;
    }
}

/// The processors a bean is run through.
enum ChainView<'a> {
    /// The assembled chain
    Ready(&'a [Arc<dyn BeanPostProcessor>]),
    /// The processors built so far, while assembly is in progress
    Assembling(Vec<Arc<dyn BeanPostProcessor>>),
}

impl ChainView<'_> {
    fn processors(&self) -> &[Arc<dyn BeanPostProcessor>] {
        match self {
            ChainView::Ready(chain) => chain,
            ChainView::Assembling(partial) => partial.as_slice(),
        }
    }
}

/// Singleton bean container.
///
/// Lookups of existing singletons go straight to a concurrent map; creating
/// a bean is serialized by a re-entrant lock so a singleton is never built
/// twice.
///
/// # Examples
///
/// ```rust
/// use sprout_ioc::{Autowired, Container, TypeDescriptor};
/// use std::sync::Arc;
///
/// #[derive(Default)]
/// struct Database;
///
/// #[derive(Default)]
/// struct UserService {
///     db: Autowired<Database>,
/// }
///
/// let container = Container::new();
/// container.register_type(TypeDescriptor::component::<Database>().default_constructor());
/// container.register_type(
///     TypeDescriptor::component::<UserService>()
///         .default_constructor()
///         .inject("db", |s| &s.db),
/// );
///
/// let service = container.get::<UserService>().unwrap();
/// assert!(Arc::ptr_eq(service.db.get().unwrap(), &container.get::<Database>().unwrap()));
/// ```
#[derive(Clone)]
pub struct Container {
    /// Singletons, candidates and repository bindings
    storage: Arc<BeanStorage>,
    /// Serializes bean creation; re-entrant because creation recurses
    creation: Arc<ReentrantMutex<RefCell<CreationState>>>,
    /// Post-processor chain, assembled on first use
    processors: Arc<OnceCell<Vec<Arc<dyn BeanPostProcessor>>>>,
}

impl Container {
    /// Create an empty container.
    #[inline]
    pub fn new() -> Self {
        #[cfg(feature = "logging")]
        debug!(target: "sprout_ioc", "Creating new bean container");

        Self {
            storage: Arc::new(BeanStorage::new()),
            creation: Arc::new(ReentrantMutex::new(RefCell::new(CreationState::default()))),
            processors: Arc::new(OnceCell::new()),
        }
    }

    // =========================================================================
    // Registration Methods
    // =========================================================================

    /// Add a candidate type. Nothing is instantiated.
    ///
    /// Registering the same type twice is a no-op and returns `false`.
    pub fn register_type(&self, descriptor: impl Into<TypeDescriptor>) -> bool {
        let descriptor = Arc::new(descriptor.into());

        #[cfg(feature = "logging")]
        let (type_name, bean) = (descriptor.type_name(), descriptor.bean_name());

        if descriptor.is_post_processor() && self.processors.get().is_some() {
            #[cfg(feature = "logging")]
            warn!(
                target: "sprout_ioc",
                type_name,
                "Post-processor registered after the chain was assembled; it will not run"
            );
        }

        let added = self.storage.add_candidate(descriptor);

        #[cfg(feature = "logging")]
        if added {
            debug!(
                target: "sprout_ioc",
                bean = %bean,
                type_name,
                candidates = self.storage.candidate_count(),
                "Registered candidate type"
            );
        } else {
            trace!(target: "sprout_ioc", type_name, "Candidate type already registered");
        }

        added
    }

    /// Register a type described by its [`Component`] implementation.
    #[inline]
    pub fn register<C: Component>(&self) -> bool {
        self.register_type(C::descriptor())
    }

    /// Seed a pre-built singleton under `name`.
    ///
    /// The bean is exposed only as `T`. If `name` is already taken the
    /// existing entry is left untouched and `false` is returned.
    pub fn register_singleton<T: Injectable>(&self, name: impl Into<String>, instance: Arc<T>) -> bool {
        self.register_instance(TypeDescriptor::component::<T>().named(name), instance)
    }

    /// Seed a pre-built singleton described by `descriptor`, so it can be
    /// exposed under every type the descriptor provides.
    pub fn register_instance<T: Injectable>(
        &self,
        descriptor: ComponentBuilder<T>,
        instance: Arc<T>,
    ) -> bool {
        let descriptor = Arc::new(descriptor.build());
        let name = descriptor.bean_name();
        let bean = Arc::new(Bean::new(name.clone(), descriptor, instance as AnyArc));
        let inserted = self.storage.insert_if_absent(name, bean);

        #[cfg(feature = "logging")]
        debug!(
            target: "sprout_ioc",
            type_name = std::any::type_name::<T>(),
            inserted,
            "Registering singleton instance"
        );

        inserted
    }

    // =========================================================================
    // Resolution Methods
    // =========================================================================

    /// Look up a bean by name, creating it from its candidate if needed.
    pub fn get_bean(&self, name: &str) -> Result<Arc<Bean>> {
        if let Some(bean) = self.storage.singleton(name) {
            return Ok(bean);
        }
        match self.storage.candidate_named(name) {
            Some(descriptor) => self.create_bean(&descriptor),
            None => {
                #[cfg(feature = "logging")]
                debug!(target: "sprout_ioc", bean = name, "Bean not found by name");
                Err(IocError::not_found_by_name(name))
            }
        }
    }

    /// Resolve the unique bean assignable to `T`.
    ///
    /// Existing singletons are checked first; if more than one exposes `T`
    /// the lookup is ambiguous. If none does, the first registered
    /// candidate providing `T` is created.
    ///
    /// ```rust
    /// use sprout_ioc::{Container, IocError};
    /// use std::sync::Arc;
    ///
    /// let container = Container::new();
    /// container.register_singleton("first", Arc::new(1u32));
    /// container.register_singleton("second", Arc::new(2u32));
    ///
    /// assert!(matches!(
    ///     container.get::<u32>(),
    ///     Err(IocError::AmbiguousBeanType { .. })
    /// ));
    /// ```
    pub fn get<T: ?Sized + Injectable>(&self) -> Result<Arc<T>> {
        let type_id = TypeId::of::<T>();
        let type_name = std::any::type_name::<T>();

        let mut existing = self.storage.singletons_exposing(type_id);
        if existing.len() > 1 {
            let mut candidates: Vec<String> =
                existing.iter().map(|bean| bean.name().to_string()).collect();
            candidates.sort();
            return Err(IocError::AmbiguousBeanType {
                type_name,
                candidates,
            });
        }
        if let Some(bean) = existing.pop() {
            #[cfg(feature = "logging")]
            trace!(target: "sprout_ioc", type_name, bean = bean.name(), "Resolved existing singleton");
            return view_of::<T>(&bean);
        }

        let Some(descriptor) = self.storage.first_candidate_providing(type_id) else {
            #[cfg(feature = "logging")]
            debug!(target: "sprout_ioc", type_name, "Bean not found by type");
            return Err(IocError::not_found_by_type::<T>());
        };
        let bean = self.create_bean(&descriptor)?;
        view_of::<T>(&bean)
    }

    /// Like [`get`](Self::get) but returns `None` on any failure.
    #[inline]
    pub fn try_get<T: ?Sized + Injectable>(&self) -> Option<Arc<T>> {
        self.get::<T>().ok()
    }

    /// Look up a bean by name and return it as `T`.
    pub fn get_named<T: ?Sized + Injectable>(&self, name: &str) -> Result<Arc<T>> {
        let bean = self.get_bean(name)?;
        view_of::<T>(&bean)
    }

    /// Every existing singleton assignable to `T`, keyed by bean name.
    pub fn get_beans_of_type<T: ?Sized + Injectable>(&self) -> HashMap<String, Arc<T>> {
        self.storage
            .singletons_exposing(TypeId::of::<T>())
            .into_iter()
            .filter_map(|bean| bean.view::<T>().map(|view| (bean.name().to_string(), view)))
            .collect()
    }

    /// Every existing singleton, keyed by bean name.
    pub fn get_all_beans(&self) -> HashMap<String, Arc<Bean>> {
        self.storage
            .all_singletons()
            .into_iter()
            .map(|bean| (bean.name().to_string(), bean))
            .collect()
    }

    /// Create every registered candidate that has not been created yet.
    pub fn pre_instantiate_singletons(&self) -> Result<()> {
        let candidates = self.storage.candidates();

        #[cfg(feature = "logging")]
        info!(
            target: "sprout_ioc",
            candidates = candidates.len(),
            "Pre-instantiating singletons"
        );

        for descriptor in &candidates {
            self.create_bean(descriptor)?;
        }

        #[cfg(feature = "logging")]
        info!(
            target: "sprout_ioc",
            beans = self.storage.len(),
            "All singletons instantiated"
        );

        Ok(())
    }

    /// Whether `name` is an existing singleton or a registered candidate.
    pub fn contains_bean(&self, name: &str) -> bool {
        self.storage.contains(name) || self.storage.candidate_named(name).is_some()
    }

    /// Number of existing singletons.
    #[inline]
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Whether no singleton exists yet.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.storage.len() == 0
    }

    /// Number of registered candidate types.
    #[inline]
    pub fn candidate_count(&self) -> usize {
        self.storage.candidate_count()
    }

    /// The cached entity binding of a repository interface.
    pub(crate) fn repository_binding<E: Entity>(
        &self,
        descriptor: &TypeDescriptor,
    ) -> Arc<RepositoryBinding> {
        self.storage.binding_or_insert_with(descriptor.type_id(), || {
            RepositoryBinding::new::<E>(descriptor.type_name())
        })
    }

    // =========================================================================
    // Creation
    // =========================================================================

    fn create_bean(&self, descriptor: &Arc<TypeDescriptor>) -> Result<Arc<Bean>> {
        let name = descriptor.bean_name();
        if let Some(existing) = self.storage.singleton(&name) {
            return Ok(existing);
        }

        // The chain is assembled before anything else is created, and doing
        // so may already have created this bean.
        self.post_processor_chain()
            .map_err(|cause| wrap_failure(&name, cause))?;

        let creation = self.creation.lock();
        if let Some(existing) = self.storage.singleton(&name) {
            return Ok(existing);
        }

        let constructed = {
            let _frame = CreationFrame::enter(&creation, &name)?;

            #[cfg(feature = "logging")]
            debug!(
                target: "sprout_ioc",
                bean = %name,
                type_name = descriptor.type_name(),
                "Creating bean"
            );

            self.instantiate(descriptor, &name)
        };
        let object = constructed.map_err(|cause| wrap_failure(&name, cause))?;

        // Early exposure: the raw instance is visible before field injection
        let bean = Arc::new(Bean::new(name.clone(), Arc::clone(descriptor), object));
        self.storage.insert(name.clone(), Arc::clone(&bean));

        match self.initialize(descriptor, Arc::clone(&bean), &name) {
            Ok(finished) => {
                #[cfg(feature = "logging")]
                debug!(
                    target: "sprout_ioc",
                    bean = %name,
                    proxied = finished.is_proxy(),
                    "Bean created"
                );
                Ok(finished)
            }
            Err(cause) => {
                self.storage.remove_if_same(&name, &bean);

                #[cfg(feature = "logging")]
                warn!(
                    target: "sprout_ioc",
                    bean = %name,
                    error = %cause,
                    "Bean creation failed; partial instance removed"
                );

                Err(wrap_failure(&name, cause))
            }
        }
    }

    fn instantiate(&self, descriptor: &TypeDescriptor, name: &str) -> Result<AnyArc> {
        match descriptor.instantiation() {
            Instantiation::Constructors(_) => {
                let constructor = descriptor.select_constructor()?;

                #[cfg(feature = "logging")]
                trace!(
                    target: "sprout_ioc",
                    bean = name,
                    params = constructor.params().len(),
                    "Invoking constructor"
                );

                constructor.build(self)
            }
            Instantiation::Interface { repository } => {
                if !descriptor.markers().contains(Markers::REPOSITORY) {
                    return Err(IocError::creation_failed(
                        name,
                        format!("{} is an interface and cannot be instantiated", descriptor.type_name()),
                    ));
                }
                match repository {
                    Some(factory) => {
                        #[cfg(feature = "logging")]
                        debug!(
                            target: "sprout_ioc",
                            bean = name,
                            interface = descriptor.type_name(),
                            "Creating repository proxy"
                        );
                        factory(self, descriptor)
                    }
                    None => Err(IocError::EntityTypeNotResolvable {
                        type_name: descriptor.type_name(),
                    }),
                }
            }
        }
    }

    /// Field injection and post-processing of an exposed bean.
    fn initialize(
        &self,
        descriptor: &TypeDescriptor,
        bean: Arc<Bean>,
        name: &str,
    ) -> Result<Arc<Bean>> {
        for field in descriptor.fields() {
            if !field.markers().contains(Markers::INJECT) {
                continue;
            }

            #[cfg(feature = "logging")]
            trace!(
                target: "sprout_ioc",
                bean = name,
                field = field.name(),
                type_name = field.param().type_name,
                "Injecting field"
            );

            field
                .inject(self, bean.object())
                .map_err(|cause| IocError::BeanCreationFailed {
                    name: name.to_string(),
                    reason: format!("could not inject field {}", field.name()),
                    source: Some(Box::new(cause)),
                })?;
        }

        if descriptor.is_post_processor() {
            return Ok(bean);
        }

        let chain = self.post_processor_chain()?;
        let processed = apply_chain(chain.processors(), Arc::clone(&bean), name)?;

        #[cfg(feature = "logging")]
        if let ChainView::Assembling(partial) = &chain {
            trace!(
                target: "sprout_ioc",
                bean = name,
                processors = partial.len(),
                "Post-processed with the part of the chain built so far"
            );
            if descriptor.method_markers().any_transactional() && !processed.is_proxy() {
                warn!(
                    target: "sprout_ioc",
                    bean = name,
                    "Transactional bean created before its proxy processor; calls run without a transaction"
                );
            }
        }

        if !Arc::ptr_eq(&processed, &bean) {
            self.storage.insert(name.to_string(), Arc::clone(&processed));

            #[cfg(feature = "logging")]
            debug!(
                target: "sprout_ioc",
                bean = name,
                "Registry entry replaced by post-processor result"
            );
        }
        Ok(processed)
    }

    /// The post-processor chain, assembled on first use.
    ///
    /// While assembly is in progress this is the part built so far, so a
    /// processor's dependencies still see the processors registered before
    /// it.
    fn post_processor_chain(&self) -> Result<ChainView<'_>> {
        if let Some(chain) = self.processors.get() {
            return Ok(ChainView::Ready(chain.as_slice()));
        }

        let creation = self.creation.lock();
        let partial = creation.borrow().assembling.clone();
        if let Some(partial) = partial {
            return Ok(ChainView::Assembling(partial));
        }
        if let Some(chain) = self.processors.get() {
            return Ok(ChainView::Ready(chain.as_slice()));
        }

        let assembled = {
            let assembly = ChainAssembly::start(&creation);
            self.assemble_chain(&assembly)?
        };
        let _ = self.processors.set(assembled);
        self.processors
            .get()
            .map(|chain| ChainView::Ready(chain.as_slice()))
            .ok_or_else(|| IocError::Internal("post-processor chain was not stored".into()))
    }

    fn assemble_chain(&self, assembly: &ChainAssembly<'_>) -> Result<Vec<Arc<dyn BeanPostProcessor>>> {
        let mut chain = Vec::new();
        for descriptor in self.storage.candidates() {
            if !descriptor.is_post_processor() {
                continue;
            }
            let bean = self.create_bean(&descriptor)?;
            let processor = bean.view::<dyn BeanPostProcessor>().ok_or_else(|| {
                IocError::creation_failed(
                    bean.name(),
                    "marked as post-processor but not exposed as BeanPostProcessor",
                )
            })?;
            assembly.built(Arc::clone(&processor));
            chain.push(processor);
        }

        #[cfg(feature = "logging")]
        info!(
            target: "sprout_ioc",
            processors = chain.len(),
            "Post-processor chain assembled"
        );

        Ok(chain)
    }
}

/// The `T` view of `bean`.
fn view_of<T: ?Sized + Injectable>(bean: &Bean) -> Result<Arc<T>> {
    bean.view::<T>().ok_or_else(|| IocError::BeanNotOfRequiredType {
        name: bean.name().to_string(),
        type_name: std::any::type_name::<T>(),
    })
}

/// Report a failure while creating `name` as `BeanCreationFailed`, without
/// wrapping an error that already names this bean.
fn wrap_failure(name: &str, cause: IocError) -> IocError {
    if matches!(&cause, IocError::BeanCreationFailed { name: failed, .. } if failed == name) {
        return cause;
    }
    IocError::creation_failed_by(name, cause)
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("singletons", &self.storage.len())
            .field("candidates", &self.storage.candidate_count())
            .field("post_processors", &self.processors.get().map(Vec::len))
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
