//! Application bootstrap
//!
//! [`ApplicationContext`] wires a [`Container`] from an [`Environment`], a
//! set of [`Module`]s and whatever a [`ComponentScanner`] finds under the
//! scan roots, then instantiates every singleton up front.

use crate::descriptor::TypeDescriptor;
use crate::jdbc::JdbcTemplate;
use crate::transaction::{TransactionManager, TransactionPostProcessor};
use crate::{Container, Result};
use ahash::AHashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, info, warn};

/// Bean name of the registered [`Environment`]
pub const ENVIRONMENT_BEAN: &str = "environment";

/// Property listing scan roots, comma separated
pub const SCAN_ROOTS_PROPERTY: &str = "sprout.scan.roots";

// =============================================================================
// Environment
// =============================================================================

/// String key/value configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    properties: AHashMap<String, String>,
}

impl Environment {
    /// An empty environment
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from key/value pairs
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            properties: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Set `key`, replacing any previous value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    /// Builder-style [`set`](Self::set)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Value of `key`
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Value of `key`, or `default` when unset
    pub fn property_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.property(key).unwrap_or(default)
    }

    /// Scan roots from `sprout.scan.roots`
    pub fn scan_roots(&self) -> Vec<String> {
        self.property(SCAN_ROOTS_PROPERTY)
            .map(|roots| {
                roots
                    .split(',')
                    .map(str::trim)
                    .filter(|root| !root.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of properties
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Whether no property is set
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

// =============================================================================
// Modules and scanning
// =============================================================================

/// A bundle of registrations.
pub trait Module {
    /// Register this module's descriptors
    fn register(container: &Container);
}

/// The data-access infrastructure: [`JdbcTemplate`],
/// [`TransactionManager`] and [`TransactionPostProcessor`]. A
/// `dyn DataSource` bean must be supplied separately.
pub struct DataAccessModule;

impl Module for DataAccessModule {
    fn register(container: &Container) {
        container.register_type(JdbcTemplate::descriptor());
        container.register_type(TransactionManager::descriptor());
        container.register_type(TransactionPostProcessor::descriptor());
    }
}

/// [`DataAccessModule`] plus an SQLite data source configured from
/// `db.url`.
#[cfg(feature = "sqlite")]
pub struct SqliteModule;

#[cfg(feature = "sqlite")]
impl Module for SqliteModule {
    fn register(container: &Container) {
        container.register_type(crate::sqlite::SqliteDataSource::descriptor());
        DataAccessModule::register(container);
    }
}

/// Discovers candidate type descriptors below a root.
pub trait ComponentScanner {
    /// Every descriptor found under `root`
    fn scan(&self, root: &str) -> Result<Vec<TypeDescriptor>>;
}

/// A descriptor submitted with [`component!`](crate::component).
#[cfg(feature = "scan")]
pub struct ComponentRegistration {
    module_path: &'static str,
    descriptor: fn() -> TypeDescriptor,
}

#[cfg(feature = "scan")]
impl ComponentRegistration {
    #[doc(hidden)]
    pub const fn new(module_path: &'static str, descriptor: fn() -> TypeDescriptor) -> Self {
        Self {
            module_path,
            descriptor,
        }
    }

    /// Module the registration was submitted from
    #[inline]
    pub fn module_path(&self) -> &'static str {
        self.module_path
    }

    /// Whether the registration lives under `root` (a module path prefix)
    pub fn is_under(&self, root: &str) -> bool {
        root.is_empty()
            || self.module_path == root
            || self
                .module_path
                .strip_prefix(root)
                .is_some_and(|rest| rest.starts_with("::"))
    }
}

#[cfg(feature = "scan")]
inventory::collect!(ComponentRegistration);

/// Scanner over descriptors registered at link time with
/// [`component!`](crate::component). Roots are module paths such as
/// `my_app::services`.
#[cfg(feature = "scan")]
#[derive(Debug, Clone, Copy, Default)]
pub struct InventoryScanner;

#[cfg(feature = "scan")]
impl ComponentScanner for InventoryScanner {
    fn scan(&self, root: &str) -> Result<Vec<TypeDescriptor>> {
        let found: Vec<TypeDescriptor> = inventory::iter::<ComponentRegistration>
            .into_iter()
            .filter(|registration| registration.is_under(root))
            .map(|registration| (registration.descriptor)())
            .collect();

        #[cfg(feature = "logging")]
        debug!(target: "sprout_ioc", root, found = found.len(), "Scanned component registrations");

        Ok(found)
    }
}

/// Submit a component for [`InventoryScanner`].
///
/// `component!(MyType)` uses `<MyType as Component>::descriptor()`;
/// `component!(MyType => expr)` registers the descriptor `expr` builds.
#[cfg(feature = "scan")]
#[macro_export]
macro_rules! component {
    ($ty:ty) => {
        $crate::component!($ty => <$ty as $crate::Component>::descriptor());
    };
    ($ty:ty => $descriptor:expr) => {
        const _: () = {
            fn __sprout_descriptor() -> $crate::TypeDescriptor {
                ::core::convert::Into::into($descriptor)
            }
            $crate::inventory::submit! {
                $crate::ComponentRegistration::new(
                    ::core::module_path!(),
                    __sprout_descriptor,
                )
            }
        };
    };
}

// =============================================================================
// ApplicationContext
// =============================================================================

/// A fully wired container.
///
/// Dereferences to [`Container`] for lookups.
///
/// ```rust
/// use sprout_ioc::{ApplicationContext, Environment, TypeDescriptor};
///
/// #[derive(Default)]
/// struct Clock;
///
/// let context = ApplicationContext::builder()
///     .environment(Environment::new().with("app.name", "demo"))
///     .register(TypeDescriptor::component::<Clock>().default_constructor())
///     .run()
///     .unwrap();
///
/// assert!(context.contains_bean("clock"));
/// assert_eq!(context.environment().property("app.name"), Some("demo"));
/// ```
pub struct ApplicationContext {
    container: Container,
    environment: Arc<Environment>,
}

impl ApplicationContext {
    /// Start configuring a context
    pub fn builder() -> ApplicationContextBuilder {
        ApplicationContextBuilder::default()
    }

    /// The wired container
    #[inline]
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// The environment the context was started with
    #[inline]
    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }
}

impl Deref for ApplicationContext {
    type Target = Container;

    fn deref(&self) -> &Container {
        &self.container
    }
}

impl fmt::Debug for ApplicationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationContext")
            .field("beans", &self.container.len())
            .field("properties", &self.environment.len())
            .finish()
    }
}

/// Configures and starts an [`ApplicationContext`].
#[derive(Default)]
pub struct ApplicationContextBuilder {
    environment: Environment,
    scanner: Option<Box<dyn ComponentScanner>>,
    roots: Vec<String>,
    descriptors: Vec<TypeDescriptor>,
    modules: Vec<fn(&Container)>,
}

impl ApplicationContextBuilder {
    /// Use `environment` (registered as the `environment` bean)
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Use a custom scanner
    pub fn scanner(mut self, scanner: impl ComponentScanner + 'static) -> Self {
        self.scanner = Some(Box::new(scanner));
        self
    }

    /// Add a scan root. Without any, `sprout.scan.roots` is used.
    pub fn scan_root(mut self, root: impl Into<String>) -> Self {
        self.roots.push(root.into());
        self
    }

    /// Register a descriptor directly
    pub fn register(mut self, descriptor: impl Into<TypeDescriptor>) -> Self {
        self.descriptors.push(descriptor.into());
        self
    }

    /// Register a [`Module`]
    pub fn module<M: Module>(mut self) -> Self {
        self.modules.push(M::register);
        self
    }

    /// Register, scan and instantiate every singleton.
    ///
    /// Any failure aborts startup; no partially wired context is returned.
    pub fn run(self) -> Result<ApplicationContext> {
        let Self {
            environment,
            scanner,
            mut roots,
            descriptors,
            modules,
        } = self;

        let container = Container::new();
        let environment = Arc::new(environment);
        container.register_singleton(ENVIRONMENT_BEAN, Arc::clone(&environment));

        for register in modules {
            register(&container);
        }
        for descriptor in descriptors {
            container.register_type(descriptor);
        }

        if roots.is_empty() {
            roots = environment.scan_roots();
        }
        if !roots.is_empty() {
            let scanner = match scanner {
                Some(scanner) => scanner,
                None => default_scanner(&roots)?,
            };
            for root in &roots {
                register_scanned(&container, root, scanner.scan(root)?);
            }
        }

        container.pre_instantiate_singletons()?;

        #[cfg(feature = "logging")]
        info!(
            target: "sprout_ioc",
            beans = container.len(),
            roots = roots.len(),
            "Application context started"
        );

        Ok(ApplicationContext {
            container,
            environment,
        })
    }
}

/// Hand every component-marked descriptor to the container.
fn register_scanned(container: &Container, root: &str, found: Vec<TypeDescriptor>) {
    for descriptor in found {
        if descriptor.is_component() {
            container.register_type(descriptor);
        } else {
            #[cfg(feature = "logging")]
            warn!(
                target: "sprout_ioc",
                root,
                type_name = descriptor.type_name(),
                "Skipping scanned type without component marker"
            );
        }
    }
}

#[cfg(feature = "scan")]
fn default_scanner(_roots: &[String]) -> Result<Box<dyn ComponentScanner>> {
    Ok(Box::new(InventoryScanner))
}

#[cfg(not(feature = "scan"))]
fn default_scanner(roots: &[String]) -> Result<Box<dyn ComponentScanner>> {
    Err(crate::IocError::ScanFailed {
        root: roots.join(","),
        reason: "no scanner configured and the `scan` feature is disabled".into(),
    })
}

impl fmt::Debug for ApplicationContextBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationContextBuilder")
            .field("roots", &self.roots)
            .field("descriptors", &self.descriptors.len())
            .field("modules", &self.modules.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jdbc::testing::ScriptedDataSource;
    use crate::jdbc::DataSource;
    use crate::{Autowired, IocError};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Clock;

    #[derive(Default)]
    struct Scheduler {
        clock: Autowired<Clock>,
    }

    trait Job: Send + Sync {}

    /// Hands out fixed descriptors and records the roots it was asked for.
    #[derive(Default)]
    struct FixedScanner {
        roots: Arc<Mutex<Vec<String>>>,
    }

    impl ComponentScanner for FixedScanner {
        fn scan(&self, root: &str) -> Result<Vec<TypeDescriptor>> {
            self.roots.lock().push(root.to_string());
            Ok(vec![
                TypeDescriptor::component::<Clock>().default_constructor().build(),
                TypeDescriptor::component::<Scheduler>()
                    .default_constructor()
                    .inject("clock", |s| &s.clock)
                    .build(),
                TypeDescriptor::interface::<dyn Job>().build(),
            ])
        }
    }

    #[test]
    fn test_environment_properties() {
        let mut env = Environment::from_pairs([("server.port", "8080")]);
        env.set("db.url", "sqlite::memory:");

        assert_eq!(env.property("server.port"), Some("8080"));
        assert_eq!(env.property_or("missing", "fallback"), "fallback");
        assert_eq!(env.len(), 2);
    }

    #[test]
    fn test_scan_roots_are_split_and_trimmed() {
        let env = Environment::new().with(SCAN_ROOTS_PROPERTY, "app::web, app::data,,");
        assert_eq!(env.scan_roots(), vec!["app::web", "app::data"]);
    }

    #[test]
    fn test_run_scans_registers_components_and_warms_up() {
        let scanner = FixedScanner::default();
        let roots = Arc::clone(&scanner.roots);

        let context = ApplicationContext::builder()
            .environment(Environment::new().with(SCAN_ROOTS_PROPERTY, "app"))
            .scanner(scanner)
            .run()
            .unwrap();

        assert_eq!(*roots.lock(), vec!["app"]);
        assert!(context.contains_bean("clock"));
        assert!(context.contains_bean("scheduler"));
        assert!(context.contains_bean(ENVIRONMENT_BEAN));
        assert!(!context.contains_bean("job"));
        assert_eq!(context.candidate_count(), 2);

        let scheduler = context.get::<Scheduler>().unwrap();
        assert!(Arc::ptr_eq(
            scheduler.clock.get().unwrap(),
            &context.get::<Clock>().unwrap()
        ));
        assert!(Arc::ptr_eq(
            &context.get::<Environment>().unwrap(),
            context.environment()
        ));
    }

    #[test]
    fn test_explicit_roots_win_over_environment() {
        let scanner = FixedScanner::default();
        let roots = Arc::clone(&scanner.roots);

        ApplicationContext::builder()
            .environment(Environment::new().with(SCAN_ROOTS_PROPERTY, "ignored"))
            .scanner(scanner)
            .scan_root("app::jobs")
            .run()
            .unwrap();

        assert_eq!(*roots.lock(), vec!["app::jobs"]);
    }

    #[test]
    fn test_failing_bean_aborts_startup() {
        struct Broken;

        let result = ApplicationContext::builder()
            .register(
                TypeDescriptor::component::<Broken>()
                    .constructor(|()| Err(IocError::Internal("boom".into()))),
            )
            .run();

        match result {
            Err(err) => assert!(matches!(err.root_cause(), IocError::Internal(m) if m == "boom")),
            Ok(_) => panic!("startup should fail"),
        }
    }

    #[test]
    fn test_data_access_module_registers_infrastructure() {
        let container = Container::new();
        container.register_instance(
            TypeDescriptor::component::<ScriptedDataSource>()
                .provides::<dyn DataSource, _>(|ds| ds as Arc<dyn DataSource>),
            Arc::new(ScriptedDataSource::default()),
        );
        DataAccessModule::register(&container);

        assert_eq!(container.candidate_count(), 3);
        container.pre_instantiate_singletons().unwrap();
        assert!(container.contains_bean("jdbcTemplate"));
        assert!(container.contains_bean("transactionManager"));
        assert!(container.contains_bean("transactionPostProcessor"));
    }
}
