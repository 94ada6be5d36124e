//! Transactions
//!
//! [`TransactionManager`] drives the begin/commit/rollback state machine on
//! top of a [`TxContext`]. [`TransactionInterceptor`] wraps single method
//! calls in a transaction, and [`TransactionPostProcessor`] swaps
//! transactional beans for the decorators generated by
//! [`transactional_proxy!`](crate::transactional_proxy).

use crate::bean::Bean;
use crate::descriptor::{ComponentBuilder, TypeDescriptor};
use crate::jdbc::{ConnectionHandle, DataSource};
use crate::markers::MethodMarkers;
use crate::processor::BeanPostProcessor;
use crate::resource::TxContext;
use crate::{IocError, Result};
use std::rc::Rc;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, error, trace, warn};

/// Lifecycle of one transaction.
///
/// `NoTransaction -> Active -> (Committed | RolledBack) -> NoTransaction`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionState {
    /// Nothing bound
    #[default]
    NoTransaction,
    /// A connection in manual-commit mode is bound
    Active,
    /// Commit succeeded; cleanup follows
    Committed,
    /// Rollback ran; cleanup follows
    RolledBack,
}

// =============================================================================
// TransactionManager
// =============================================================================

/// Begins, commits and rolls back transactions on connections from a
/// [`DataSource`].
pub struct TransactionManager {
    data_source: Arc<dyn DataSource>,
}

impl TransactionManager {
    /// Create a manager over `data_source`
    pub fn new(data_source: Arc<dyn DataSource>) -> Self {
        Self { data_source }
    }

    /// Descriptor that builds the manager from the `DataSource` bean
    pub fn descriptor() -> ComponentBuilder<Self> {
        TypeDescriptor::component::<Self>()
            .constructor(|data_source: Arc<dyn DataSource>| Ok(Self::new(data_source)))
    }

    /// Open a connection, switch it to manual commit and bind it to `ctx`.
    ///
    /// Fails with [`IocError::ResourceAlreadyBound`] if `ctx` already has a
    /// transaction.
    pub fn begin(&self, ctx: &TxContext) -> Result<()> {
        if ctx.connection().is_some() {
            #[cfg(feature = "logging")]
            warn!(target: "sprout_ioc", "Transaction already active on this context");
            return Err(IocError::ResourceAlreadyBound);
        }

        let connection: ConnectionHandle = Rc::from(self.data_source.get_connection()?);
        if let Err(err) = connection.set_auto_commit(false) {
            let cleanup = connection.close().err().map(|e| e.to_string());
            return Err(IocError::TransactionFailed {
                operation: "begin",
                reason: err.to_string(),
                cleanup,
            });
        }
        if let Err(err) = ctx.bind_connection(Rc::clone(&connection)) {
            let _ = connection.close();
            return Err(err);
        }
        ctx.set_state(TransactionState::Active);

        #[cfg(feature = "logging")]
        debug!(target: "sprout_ioc", "Transaction started");

        Ok(())
    }

    /// Commit the bound connection, then clean up.
    pub fn commit(&self, ctx: &TxContext) -> Result<()> {
        let connection = ctx.connection().ok_or(IocError::NoActiveTransaction)?;
        let outcome = connection.commit();
        if outcome.is_ok() {
            ctx.set_state(TransactionState::Committed);

            #[cfg(feature = "logging")]
            debug!(target: "sprout_ioc", "Transaction committed");
        }
        let cleanup = self.cleanup(ctx);
        combine("commit", outcome, cleanup)
    }

    /// Roll back the bound connection, then clean up. Without a bound
    /// connection there is nothing to do and the context is left as is.
    pub fn rollback(&self, ctx: &TxContext) -> Result<()> {
        let Some(connection) = ctx.connection() else {
            #[cfg(feature = "logging")]
            trace!(target: "sprout_ioc", "Rollback requested without a transaction");
            return Ok(());
        };
        let outcome = connection.rollback();
        ctx.set_state(TransactionState::RolledBack);

        #[cfg(feature = "logging")]
        debug!(target: "sprout_ioc", "Transaction rolled back");

        let cleanup = self.cleanup(ctx);
        combine("rollback", outcome, cleanup)
    }

    /// Begin a transaction guarded by an [`ActiveTransaction`], which rolls
    /// back when dropped unfinished.
    pub fn transaction<'a>(&'a self, ctx: &'a TxContext) -> Result<ActiveTransaction<'a>> {
        self.begin(ctx)?;
        Ok(ActiveTransaction {
            manager: self,
            ctx,
            finished: false,
        })
    }

    /// Unbind the connection, restore auto-commit and close it. Every step
    /// runs even if an earlier one fails.
    fn cleanup(&self, ctx: &TxContext) -> Result<()> {
        let connection = ctx.take_connection();
        ctx.set_state(TransactionState::NoTransaction);

        let Some(connection) = connection else {
            return Ok(());
        };
        let restored = connection.set_auto_commit(true);
        let closed = connection.close();

        #[cfg(feature = "logging")]
        trace!(
            target: "sprout_ioc",
            restored = restored.is_ok(),
            closed = closed.is_ok(),
            "Transaction resources released"
        );

        restored.and(closed)
    }
}

/// Merge the result of a transaction step with the result of its cleanup.
fn combine(operation: &'static str, outcome: Result<()>, cleanup: Result<()>) -> Result<()> {
    match (outcome, cleanup) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(err), cleanup) => Err(IocError::TransactionFailed {
            operation,
            reason: err.to_string(),
            cleanup: cleanup.err().map(|e| e.to_string()),
        }),
        (Ok(()), Err(cleanup)) => Err(IocError::TransactionFailed {
            operation: "cleanup",
            reason: cleanup.to_string(),
            cleanup: None,
        }),
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager").finish_non_exhaustive()
    }
}

/// Guard for a transaction begun with [`TransactionManager::transaction`].
///
/// Dropping the guard without calling [`commit`](Self::commit) or
/// [`rollback`](Self::rollback) rolls the transaction back.
#[must_use = "dropping the guard rolls the transaction back"]
pub struct ActiveTransaction<'a> {
    manager: &'a TransactionManager,
    ctx: &'a TxContext,
    finished: bool,
}

impl ActiveTransaction<'_> {
    /// Commit and clean up
    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        self.manager.commit(self.ctx)
    }

    /// Roll back and clean up
    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.manager.rollback(self.ctx)
    }
}

impl Drop for ActiveTransaction<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(_err) = self.manager.rollback(self.ctx) {
            #[cfg(feature = "logging")]
            error!(target: "sprout_ioc", error = %_err, "Rollback of abandoned transaction failed");
        }
    }
}

// =============================================================================
// TransactionInterceptor
// =============================================================================

/// Runs method calls of one bean inside transactions, according to the
/// bean's transactional markers.
#[derive(Clone)]
pub struct TransactionInterceptor {
    manager: Arc<TransactionManager>,
    markers: Arc<MethodMarkers>,
    target: &'static str,
}

impl TransactionInterceptor {
    /// Create an interceptor for a bean of type `target` with `markers`
    pub fn new(
        manager: Arc<TransactionManager>,
        markers: Arc<MethodMarkers>,
        target: &'static str,
    ) -> Self {
        Self {
            manager,
            markers,
            target,
        }
    }

    /// Whether calls to `method` are wrapped in a transaction
    #[inline]
    pub fn is_transactional(&self, method: &str) -> bool {
        self.markers.is_transactional(method)
    }

    /// Invoke `call` as method `method`.
    ///
    /// Non-transactional methods are called straight through. Otherwise a
    /// transaction is begun, and committed if `call` succeeds. If it fails
    /// the transaction is rolled back and the original error is returned;
    /// a failing rollback is logged and never replaces that error.
    pub fn invoke<R, E>(
        &self,
        ctx: &TxContext,
        method: &str,
        call: impl FnOnce() -> std::result::Result<R, E>,
    ) -> std::result::Result<R, E>
    where
        E: From<IocError>,
    {
        if !self.is_transactional(method) {
            return call();
        }

        #[cfg(feature = "logging")]
        trace!(target: "sprout_ioc", bean = self.target, method, "Entering transactional method");

        let transaction = self.manager.transaction(ctx).map_err(E::from)?;
        match call() {
            Ok(value) => {
                transaction.commit().map_err(E::from)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(_rollback) = transaction.rollback() {
                    #[cfg(feature = "logging")]
                    error!(
                        target: "sprout_ioc",
                        bean = self.target,
                        method,
                        error = %_rollback,
                        "Rollback failed after method error"
                    );
                }
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for TransactionInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionInterceptor")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// TransactionPostProcessor
// =============================================================================

/// Replaces transactional beans with decorated ones.
///
/// A bean counts as transactional when its type or any of its methods
/// carries the `TRANSACTIONAL` marker. The decorators come from the
/// factories registered with
/// [`ComponentBuilder::proxy`](crate::ComponentBuilder::proxy), one per
/// provided interface. The decorated bean exposes nothing else: asking
/// for the concrete type fails with [`IocError::BeanNotOfRequiredType`].
pub struct TransactionPostProcessor {
    manager: Arc<TransactionManager>,
}

impl TransactionPostProcessor {
    /// Create the processor
    pub fn new(manager: Arc<TransactionManager>) -> Self {
        Self { manager }
    }

    /// Descriptor that builds the processor from the `TransactionManager`
    /// bean
    pub fn descriptor() -> ComponentBuilder<Self> {
        TypeDescriptor::component::<Self>()
            .constructor(|manager: Arc<TransactionManager>| Ok(Self::new(manager)))
            .post_processor()
    }
}

impl BeanPostProcessor for TransactionPostProcessor {
    fn post_process(&self, bean: Arc<Bean>, name: &str) -> Result<Option<Arc<Bean>>> {
        let descriptor = Arc::clone(bean.descriptor());
        if !descriptor.method_markers().any_transactional() {
            return Ok(Some(bean));
        }
        let factories: Vec<_> = descriptor
            .proxies()
            .iter()
            .filter(|factory| descriptor.provides(factory.param.type_id))
            .collect();
        if factories.is_empty() {
            return Err(IocError::creation_failed(
                name,
                format!(
                    "{} is transactional but registers no proxy for a provided type",
                    descriptor.type_name()
                ),
            ));
        }

        let interceptor = TransactionInterceptor::new(
            Arc::clone(&self.manager),
            Arc::clone(descriptor.method_markers()),
            descriptor.type_name(),
        );

        let mut decorators = Vec::with_capacity(factories.len());
        for factory in factories {
            let decorator = factory.build(bean.object(), &interceptor).ok_or_else(|| {
                IocError::creation_failed(
                    name,
                    format!("proxy for {} does not accept the bean", factory.param.type_name),
                )
            })?;
            decorators.push((factory.param.type_id, decorator));
        }

        #[cfg(feature = "logging")]
        debug!(
            target: "sprout_ioc",
            bean = name,
            proxies = decorators.len(),
            "Wrapped bean in transactional proxy"
        );

        Ok(Some(Arc::new(bean.proxied_by(decorators))))
    }
}

impl std::fmt::Debug for TransactionPostProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionPostProcessor").finish_non_exhaustive()
    }
}

// =============================================================================
// transactional_proxy!
// =============================================================================

/// Generate a decorator that routes every method of a trait through a
/// [`TransactionInterceptor`].
///
/// Each method must take the [`TxContext`] as its first argument after
/// `&self` and return a `Result` whose error type implements
/// `From<IocError>`.
///
/// ```rust
/// use sprout_ioc::{transactional_proxy, IocError, TxContext};
///
/// pub trait Ledger: Send + Sync {
///     fn post(&self, ctx: &TxContext, amount: i64) -> Result<(), IocError>;
///     fn balance(&self, ctx: &TxContext) -> Result<i64, IocError>;
/// }
///
/// pub struct SqlLedger;
///
/// impl Ledger for SqlLedger {
///     fn post(&self, _ctx: &TxContext, _amount: i64) -> Result<(), IocError> {
///         Ok(())
///     }
///     fn balance(&self, _ctx: &TxContext) -> Result<i64, IocError> {
///         Ok(0)
///     }
/// }
///
/// transactional_proxy! {
///     pub struct LedgerProxy for SqlLedger: Ledger {
///         fn post(&self, ctx: &TxContext, amount: i64) -> Result<(), IocError>;
///         fn balance(&self, ctx: &TxContext) -> Result<i64, IocError>;
///     }
/// }
/// ```
#[macro_export]
macro_rules! transactional_proxy {
    (
        $(#[$meta:meta])*
        $vis:vis struct $proxy:ident for $target:ty : $iface:path {
            $(
                fn $method:ident(&self, $ctx:ident : $ctx_ty:ty $(, $arg:ident : $arg_ty:ty)*) -> $ret:ty;
            )*
        }
    ) => {
        $(#[$meta])*
        $vis struct $proxy {
            target: ::std::sync::Arc<$target>,
            interceptor: $crate::TransactionInterceptor,
        }

        impl $proxy {
            /// Decorate `target`
            pub fn new(
                target: ::std::sync::Arc<$target>,
                interceptor: $crate::TransactionInterceptor,
            ) -> Self {
                Self { target, interceptor }
            }

            /// The undecorated bean
            pub fn target(&self) -> &::std::sync::Arc<$target> {
                &self.target
            }
        }

        impl $iface for $proxy {
            $(
                fn $method(&self, $ctx: $ctx_ty $(, $arg: $arg_ty)*) -> $ret {
                    self.interceptor.invoke($ctx, stringify!($method), || {
                        <$target as $iface>::$method(&*self.target, $ctx $(, $arg)*)
                    })
                }
            )*
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jdbc::testing::ScriptedDataSource;
    use crate::markers::Markers;
    use crate::{Autowired, Container};
    use std::sync::atomic::Ordering;

    fn manager() -> (Arc<ScriptedDataSource>, TransactionManager) {
        let data_source = Arc::new(ScriptedDataSource::default());
        let manager = TransactionManager::new(data_source.clone());
        (data_source, manager)
    }

    #[test]
    fn test_begin_commit_cleans_up() {
        let (data_source, manager) = manager();
        let ctx = TxContext::new();

        manager.begin(&ctx).unwrap();
        assert_eq!(ctx.state(), TransactionState::Active);
        assert!(ctx.connection().is_some());

        manager.commit(&ctx).unwrap();
        assert_eq!(ctx.state(), TransactionState::NoTransaction);
        assert_eq!(ctx.last_outcome(), Some(TransactionState::Committed));
        assert!(ctx.connection().is_none());
        assert_eq!(
            data_source.journal.events(),
            vec![
                "#1 open",
                "#1 auto_commit=false",
                "#1 commit",
                "#1 auto_commit=true",
                "#1 close",
            ]
        );
    }

    #[test]
    fn test_nested_begin_is_rejected() {
        let (data_source, manager) = manager();
        let ctx = TxContext::new();

        manager.begin(&ctx).unwrap();
        assert!(matches!(manager.begin(&ctx), Err(IocError::ResourceAlreadyBound)));
        assert_eq!(data_source.opened(), 1);
        assert!(ctx.is_active());
        manager.rollback(&ctx).unwrap();
    }

    #[test]
    fn test_commit_without_transaction() {
        let (_, manager) = manager();
        assert!(matches!(
            manager.commit(&TxContext::new()),
            Err(IocError::NoActiveTransaction)
        ));
    }

    #[test]
    fn test_commit_failure_still_cleans_up_and_reports_both() {
        let (data_source, manager) = manager();
        data_source.journal.fail_commit.store(true, Ordering::SeqCst);
        data_source.journal.fail_close.store(true, Ordering::SeqCst);
        let ctx = TxContext::new();

        manager.begin(&ctx).unwrap();
        match manager.commit(&ctx) {
            Err(IocError::TransactionFailed {
                operation,
                cleanup: Some(_),
                ..
            }) => assert_eq!(operation, "commit"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(ctx.connection().is_none());
        assert!(data_source.journal.events().contains(&"#1 close".to_string()));
    }

    #[test]
    fn test_rollback_failure_still_cleans_up_and_reports_both() {
        let (data_source, manager) = manager();
        let ctx = TxContext::new();

        manager.begin(&ctx).unwrap();
        data_source.journal.fail_rollback.store(true, Ordering::SeqCst);
        data_source.journal.fail_close.store(true, Ordering::SeqCst);

        match manager.rollback(&ctx) {
            Err(IocError::TransactionFailed {
                operation,
                reason,
                cleanup: Some(cleanup),
            }) => {
                assert_eq!(operation, "rollback");
                assert!(reason.contains("ROLLBACK"));
                assert!(cleanup.contains("socket reset"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(ctx.connection().is_none());
        assert_eq!(ctx.state(), TransactionState::NoTransaction);
        assert_eq!(
            data_source.journal.events(),
            vec![
                "#1 open",
                "#1 auto_commit=false",
                "#1 rollback",
                "#1 auto_commit=true",
                "#1 close",
            ]
        );
    }

    #[test]
    fn test_rollback_without_transaction_leaves_context_alone() {
        let (data_source, manager) = manager();
        let ctx = TxContext::new();

        manager.rollback(&ctx).unwrap();
        assert_eq!(ctx.last_outcome(), None);
        assert_eq!(ctx.state(), TransactionState::NoTransaction);
        assert!(data_source.journal.events().is_empty());

        manager.begin(&ctx).unwrap();
        manager.commit(&ctx).unwrap();
        manager.rollback(&ctx).unwrap();
        assert_eq!(ctx.last_outcome(), Some(TransactionState::Committed));
    }

    #[test]
    fn test_dropped_guard_rolls_back() {
        let (data_source, manager) = manager();
        let ctx = TxContext::new();
        {
            let _tx = manager.transaction(&ctx).unwrap();
        }
        assert_eq!(ctx.last_outcome(), Some(TransactionState::RolledBack));
        assert!(data_source.journal.events().contains(&"#1 rollback".to_string()));
        assert!(ctx.connection().is_none());
    }

    // -------------------------------------------------------------------------
    // Interception
    // -------------------------------------------------------------------------

    trait Counter: Send + Sync {
        fn bump(&self, ctx: &TxContext, by: i64) -> Result<i64>;
        fn peek(&self, ctx: &TxContext) -> Result<i64>;
    }

    #[derive(Default)]
    struct SimpleCounter {
        store: Autowired<Store>,
    }

    #[derive(Default)]
    struct Store;

    impl Counter for SimpleCounter {
        fn bump(&self, ctx: &TxContext, by: i64) -> Result<i64> {
            if by < 0 {
                return Err(IocError::Internal("negative".into()));
            }
            Ok(if ctx.is_active() { by } else { -1 })
        }

        fn peek(&self, ctx: &TxContext) -> Result<i64> {
            Ok(if ctx.is_active() { 1 } else { 0 })
        }
    }

    transactional_proxy! {
        struct CounterProxy for SimpleCounter: Counter {
            fn bump(&self, ctx: &TxContext, by: i64) -> Result<i64>;
            fn peek(&self, ctx: &TxContext) -> Result<i64>;
        }
    }

    fn interceptor(markers: MethodMarkers) -> (Arc<ScriptedDataSource>, TransactionInterceptor) {
        let (data_source, manager) = manager();
        let interceptor =
            TransactionInterceptor::new(Arc::new(manager), Arc::new(markers), "SimpleCounter");
        (data_source, interceptor)
    }

    #[test]
    fn test_only_marked_methods_run_in_transaction() {
        let mut markers = MethodMarkers::new(Markers::COMPONENT);
        markers.declare("bump", Markers::TRANSACTIONAL);
        let (data_source, interceptor) = interceptor(markers);
        let proxy = CounterProxy::new(Arc::new(SimpleCounter::default()), interceptor);
        let ctx = TxContext::new();

        assert_eq!(proxy.bump(&ctx, 5).unwrap(), 5);
        assert_eq!(ctx.last_outcome(), Some(TransactionState::Committed));
        assert_eq!(proxy.peek(&ctx).unwrap(), 0);
        assert_eq!(data_source.opened(), 1);
    }

    #[test]
    fn test_error_rolls_back_and_is_returned_unchanged() {
        let (data_source, interceptor) = interceptor(MethodMarkers::new(Markers::TRANSACTIONAL));
        let proxy = CounterProxy::new(Arc::new(SimpleCounter::default()), interceptor);
        let ctx = TxContext::new();

        let err = proxy.bump(&ctx, -1).unwrap_err();
        assert!(matches!(err, IocError::Internal(ref m) if m == "negative"));
        assert_eq!(ctx.last_outcome(), Some(TransactionState::RolledBack));
        assert!(!data_source.journal.events().iter().any(|e| e.ends_with("commit")));
    }

    #[test]
    fn test_post_processor_decorates_transactional_bean() {
        let container = Container::new();
        container.register_instance(
            TypeDescriptor::component::<ScriptedDataSource>()
                .provides::<dyn DataSource, _>(|ds| ds as Arc<dyn DataSource>),
            Arc::new(ScriptedDataSource::default()),
        );
        container.register_type(TransactionManager::descriptor());
        container.register_type(TransactionPostProcessor::descriptor());
        container.register_type(TypeDescriptor::component::<Store>().default_constructor());
        container.register_type(
            TypeDescriptor::component::<SimpleCounter>()
                .default_constructor()
                .inject("store", |c| &c.store)
                .transactional()
                .provides::<dyn Counter, _>(|c| c as Arc<dyn Counter>)
                .proxy::<dyn Counter, _>(|target, interceptor| {
                    Arc::new(CounterProxy::new(target, interceptor)) as Arc<dyn Counter>
                }),
        );

        let counter = container.get::<dyn Counter>().unwrap();
        let ctx = TxContext::new();
        assert_eq!(counter.peek(&ctx).unwrap(), 1);

        let bean = container.get_bean("simpleCounter").unwrap();
        assert!(bean.is_proxy());
        let raw = bean.target::<SimpleCounter>().unwrap();
        assert!(Arc::ptr_eq(raw.store.get().unwrap(), &container.get::<Store>().unwrap()));
    }

    fn counter_container() -> Container {
        let container = Container::new();
        container.register_instance(
            TypeDescriptor::component::<ScriptedDataSource>()
                .provides::<dyn DataSource, _>(|ds| ds as Arc<dyn DataSource>),
            Arc::new(ScriptedDataSource::default()),
        );
        container.register_type(TransactionManager::descriptor());
        container.register_type(TransactionPostProcessor::descriptor());
        container.register_type(
            TypeDescriptor::component::<SimpleCounter>()
                .default_constructor()
                .transactional()
                .provides::<dyn Counter, _>(|c| c as Arc<dyn Counter>)
                .proxy::<dyn Counter, _>(|target, interceptor| {
                    Arc::new(CounterProxy::new(target, interceptor)) as Arc<dyn Counter>
                }),
        );
        container
    }

    struct Audit {
        counter: Arc<dyn Counter>,
    }

    impl BeanPostProcessor for Audit {
        fn post_process(&self, bean: Arc<Bean>, _name: &str) -> Result<Option<Arc<Bean>>> {
            Ok(Some(bean))
        }
    }

    #[test]
    fn test_processor_dependency_is_still_proxied() {
        let container = counter_container();
        container.register_type(
            TypeDescriptor::component::<Audit>()
                .constructor(|counter: Arc<dyn Counter>| Ok(Audit { counter }))
                .post_processor(),
        );

        container.pre_instantiate_singletons().unwrap();

        assert!(container.get_bean("simpleCounter").unwrap().is_proxy());
        let audit = container.get_bean("audit").unwrap().target::<Audit>().unwrap();
        let ctx = TxContext::new();
        assert_eq!(audit.counter.peek(&ctx).unwrap(), 1);
        assert_eq!(ctx.last_outcome(), Some(TransactionState::Committed));
        assert!(Arc::ptr_eq(
            &audit.counter,
            &container.get::<dyn Counter>().unwrap()
        ));
    }

    #[test]
    fn test_concrete_lookup_of_proxied_bean_is_refused() {
        let container = counter_container();

        let err = container.get::<SimpleCounter>().err().unwrap();
        assert!(matches!(
            err,
            IocError::BeanNotOfRequiredType { ref name, .. } if name == "simpleCounter"
        ));
        assert!(container.get_beans_of_type::<SimpleCounter>().is_empty());

        let ctx = TxContext::new();
        assert_eq!(container.get::<dyn Counter>().unwrap().bump(&ctx, 3).unwrap(), 3);
    }

    #[test]
    fn test_concrete_field_of_proxied_bean_is_refused() {
        #[derive(Default)]
        struct Caller {
            counter: Autowired<SimpleCounter>,
        }

        let container = counter_container();
        container.register_type(
            TypeDescriptor::component::<Caller>()
                .default_constructor()
                .inject("counter", |c| &c.counter),
        );

        let err = container.get::<Caller>().err().unwrap();
        assert!(matches!(err, IocError::BeanCreationFailed { ref name, .. } if name == "caller"));
        assert!(matches!(
            err.root_cause(),
            IocError::BeanNotOfRequiredType { .. }
        ));
        assert!(!container.get_all_beans().contains_key("caller"));
    }

    #[test]
    fn test_proxy_without_provided_type_is_not_used() {
        let container = Container::new();
        container.register_instance(
            TypeDescriptor::component::<ScriptedDataSource>()
                .provides::<dyn DataSource, _>(|ds| ds as Arc<dyn DataSource>),
            Arc::new(ScriptedDataSource::default()),
        );
        container.register_type(TransactionManager::descriptor());
        container.register_type(TransactionPostProcessor::descriptor());
        container.register_type(
            TypeDescriptor::component::<SimpleCounter>()
                .default_constructor()
                .transactional()
                .proxy::<dyn Counter, _>(|target, interceptor| {
                    Arc::new(CounterProxy::new(target, interceptor)) as Arc<dyn Counter>
                }),
        );

        assert!(matches!(
            container.get::<dyn Counter>(),
            Err(IocError::BeanNotFoundByType { .. })
        ));
        let err = container.get_bean("simpleCounter").err().unwrap();
        assert!(matches!(err, IocError::BeanCreationFailed { ref name, .. } if name == "simpleCounter"));
    }

    #[test]
    fn test_transactional_bean_without_proxy_fails() {
        let container = Container::new();
        container.register_instance(
            TypeDescriptor::component::<ScriptedDataSource>()
                .provides::<dyn DataSource, _>(|ds| ds as Arc<dyn DataSource>),
            Arc::new(ScriptedDataSource::default()),
        );
        container.register_type(TransactionManager::descriptor());
        container.register_type(TransactionPostProcessor::descriptor());
        container.register_type(
            TypeDescriptor::component::<Store>()
                .default_constructor()
                .transactional(),
        );

        let err = container.get::<Store>().err().unwrap();
        assert!(matches!(err, IocError::BeanCreationFailed { ref name, .. } if name == "store"));
        assert!(!container.get_all_beans().contains_key("store"));
    }
}
