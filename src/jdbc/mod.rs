//! Data access
//!
//! A thin layer over a [`DataSource`]: connections that join the caller's
//! transaction when one is bound to its [`TxContext`], and a
//! [`JdbcTemplate`] that runs statements and maps rows onto [`Entity`]
//! types.

mod entity;
mod value;

pub use entity::{column_of, convert, map_row, table_of, Entity};
pub use value::{FromSqlValue, Row, SqlValue, ValueConversionError};

use crate::descriptor::{ComponentBuilder, TypeDescriptor};
use crate::resource::TxContext;
use crate::Result;
use std::rc::Rc;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, trace, warn};

/// A single database connection.
///
/// Connections are used from one thread at a time and are shared through
/// [`ConnectionHandle`] while bound to a transaction.
pub trait Connection {
    /// Switch between auto-commit and manual-commit mode
    fn set_auto_commit(&self, auto_commit: bool) -> Result<()>;

    /// Whether the connection is in auto-commit mode
    fn is_auto_commit(&self) -> bool;

    /// Commit the current manual transaction
    fn commit(&self) -> Result<()>;

    /// Roll back the current manual transaction
    fn rollback(&self) -> Result<()>;

    /// Run a statement, returning the number of affected rows
    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<usize>;

    /// Run a query, returning every row
    fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>>;

    /// Release the connection; later calls fail
    fn close(&self) -> Result<()>;

    /// Whether [`close`](Self::close) has been called
    fn is_closed(&self) -> bool;
}

/// Shared handle to a connection, as bound in a [`TxContext`].
pub type ConnectionHandle = Rc<dyn Connection>;

/// Source of fresh connections.
pub trait DataSource: Send + Sync {
    /// Open a new connection
    fn get_connection(&self) -> Result<Box<dyn Connection>>;
}

/// The connection to use for a statement: the one bound to `ctx` if a
/// transaction is active, else a fresh one from `data_source`.
pub fn get_connection(ctx: &TxContext, data_source: &dyn DataSource) -> Result<ConnectionHandle> {
    if let Some(bound) = ctx.connection() {
        #[cfg(feature = "logging")]
        trace!(target: "sprout_ioc::sql", "Reusing transaction-bound connection");
        return Ok(bound);
    }
    Ok(Rc::from(data_source.get_connection()?))
}

/// Give a connection back: the transaction-bound one stays open, any other
/// is closed.
pub fn release_connection(ctx: &TxContext, connection: ConnectionHandle) -> Result<()> {
    if ctx.is_bound(&connection) {
        return Ok(());
    }
    connection.close()
}

/// Runs statements against a [`DataSource`], joining the caller's
/// transaction when one is bound.
#[derive(Clone)]
pub struct JdbcTemplate {
    data_source: Arc<dyn DataSource>,
}

impl JdbcTemplate {
    /// Create a template over `data_source`
    pub fn new(data_source: Arc<dyn DataSource>) -> Self {
        Self { data_source }
    }

    /// Descriptor that builds the template from the `DataSource` bean
    pub fn descriptor() -> ComponentBuilder<Self> {
        TypeDescriptor::component::<Self>()
            .constructor(|data_source: Arc<dyn DataSource>| Ok(Self::new(data_source)))
    }

    /// The underlying data source
    #[inline]
    pub fn data_source(&self) -> &Arc<dyn DataSource> {
        &self.data_source
    }

    /// Run `work` with a connection, releasing it afterwards.
    pub fn execute<R>(
        &self,
        ctx: &TxContext,
        work: impl FnOnce(&dyn Connection) -> Result<R>,
    ) -> Result<R> {
        let connection = get_connection(ctx, self.data_source.as_ref())?;
        let result = work(connection.as_ref());
        let released = release_connection(ctx, connection);
        match (result, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) => Err(err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(_close)) => {
                #[cfg(feature = "logging")]
                warn!(
                    target: "sprout_ioc::sql",
                    error = %_close,
                    "Closing connection failed after statement error"
                );
                Err(err)
            }
        }
    }

    /// Run an INSERT/UPDATE/DELETE, returning the affected row count
    pub fn update(&self, ctx: &TxContext, sql: &str, params: &[SqlValue]) -> Result<usize> {
        #[cfg(feature = "logging")]
        debug!(target: "sprout_ioc::sql", sql, params = params.len(), "Executing update");

        self.execute(ctx, |connection| connection.execute(sql, params))
    }

    /// Run a query, returning raw rows
    pub fn query_rows(&self, ctx: &TxContext, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        #[cfg(feature = "logging")]
        debug!(target: "sprout_ioc::sql", sql, params = params.len(), "Executing query");

        self.execute(ctx, |connection| connection.query(sql, params))
    }

    /// Run a query, mapping every row onto `E`
    pub fn query<E: Entity>(&self, ctx: &TxContext, sql: &str, params: &[SqlValue]) -> Result<Vec<E>> {
        self.query_rows(ctx, sql, params)?
            .iter()
            .map(map_row::<E>)
            .collect()
    }
}

impl std::fmt::Debug for JdbcTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JdbcTemplate").finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted in-memory connections for unit tests.

    use super::*;
    use crate::IocError;
    use parking_lot::Mutex;
    use std::cell::Cell;

    /// Shared log of everything scripted connections were asked to do.
    #[derive(Default)]
    pub struct Journal {
        pub events: Mutex<Vec<String>>,
        pub fail_commit: std::sync::atomic::AtomicBool,
        pub fail_rollback: std::sync::atomic::AtomicBool,
        pub fail_close: std::sync::atomic::AtomicBool,
        pub rows: Mutex<Vec<Row>>,
    }

    impl Journal {
        pub fn events(&self) -> Vec<String> {
            self.events.lock().clone()
        }

        fn record(&self, event: impl Into<String>) {
            self.events.lock().push(event.into());
        }
    }

    pub struct ScriptedConnection {
        id: usize,
        journal: Arc<Journal>,
        auto_commit: Cell<bool>,
        closed: Cell<bool>,
    }

    impl Connection for ScriptedConnection {
        fn set_auto_commit(&self, auto_commit: bool) -> Result<()> {
            self.journal.record(format!("#{} auto_commit={auto_commit}", self.id));
            self.auto_commit.set(auto_commit);
            Ok(())
        }

        fn is_auto_commit(&self) -> bool {
            self.auto_commit.get()
        }

        fn commit(&self) -> Result<()> {
            self.journal.record(format!("#{} commit", self.id));
            if self.journal.fail_commit.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(IocError::sql("COMMIT", "disk I/O error"));
            }
            Ok(())
        }

        fn rollback(&self) -> Result<()> {
            self.journal.record(format!("#{} rollback", self.id));
            if self.journal.fail_rollback.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(IocError::sql("ROLLBACK", "database is locked"));
            }
            Ok(())
        }

        fn execute(&self, sql: &str, _params: &[SqlValue]) -> Result<usize> {
            self.journal.record(format!("#{} execute {sql}", self.id));
            Ok(1)
        }

        fn query(&self, sql: &str, _params: &[SqlValue]) -> Result<Vec<Row>> {
            self.journal.record(format!("#{} query {sql}", self.id));
            Ok(self.journal.rows.lock().clone())
        }

        fn close(&self) -> Result<()> {
            self.journal.record(format!("#{} close", self.id));
            self.closed.set(true);
            if self.journal.fail_close.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(IocError::sql("close", "socket reset"));
            }
            Ok(())
        }

        fn is_closed(&self) -> bool {
            self.closed.get()
        }
    }

    /// Hands out numbered [`ScriptedConnection`]s.
    #[derive(Default)]
    pub struct ScriptedDataSource {
        pub journal: Arc<Journal>,
        opened: std::sync::atomic::AtomicUsize,
    }

    impl ScriptedDataSource {
        pub fn opened(&self) -> usize {
            self.opened.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    impl DataSource for ScriptedDataSource {
        fn get_connection(&self) -> Result<Box<dyn Connection>> {
            let id = self.opened.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
            self.journal.record(format!("#{id} open"));
            Ok(Box::new(ScriptedConnection {
                id,
                journal: Arc::clone(&self.journal),
                auto_commit: Cell::new(true),
                closed: Cell::new(false),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedDataSource;
    use super::*;

    #[test]
    fn test_unbound_statement_opens_and_closes() {
        let data_source = Arc::new(ScriptedDataSource::default());
        let jdbc = JdbcTemplate::new(data_source.clone());
        let ctx = TxContext::new();

        assert_eq!(jdbc.update(&ctx, "DELETE FROM t", &[]).unwrap(), 1);
        assert_eq!(
            data_source.journal.events(),
            vec!["#1 open", "#1 execute DELETE FROM t", "#1 close"]
        );
    }

    #[test]
    fn test_bound_connection_is_reused_and_left_open() {
        let data_source = Arc::new(ScriptedDataSource::default());
        let jdbc = JdbcTemplate::new(data_source.clone());
        let ctx = TxContext::new();

        let bound: ConnectionHandle = Rc::from(data_source.get_connection().unwrap());
        ctx.bind_connection(Rc::clone(&bound)).unwrap();

        jdbc.update(&ctx, "UPDATE t SET x = 1", &[]).unwrap();
        jdbc.query_rows(&ctx, "SELECT * FROM t", &[]).unwrap();

        assert_eq!(data_source.opened(), 1);
        assert!(!bound.is_closed());
    }

    #[test]
    fn test_query_maps_rows() {
        #[derive(Debug, Default, PartialEq)]
        struct Tag {
            label: String,
        }

        impl Entity for Tag {
            fn fields() -> &'static [&'static str] {
                &["label"]
            }

            fn field_value(&self, field: &str) -> Option<SqlValue> {
                (field == "label").then(|| self.label.clone().into())
            }

            fn set_field(&mut self, field: &str, value: SqlValue) -> Result<()> {
                if field == "label" {
                    self.label = convert::<Self, _>(field, value)?;
                }
                Ok(())
            }
        }

        let data_source = Arc::new(ScriptedDataSource::default());
        data_source.journal.rows.lock().push(Row::new(
            vec!["label".into()],
            vec![SqlValue::from("urgent")],
        ));
        let jdbc = JdbcTemplate::new(data_source);

        let tags: Vec<Tag> = jdbc.query(&TxContext::new(), "SELECT * FROM tag", &[]).unwrap();
        assert_eq!(tags, vec![Tag { label: "urgent".into() }]);
    }
}
