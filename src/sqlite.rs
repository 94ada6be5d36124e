//! SQLite data source
//!
//! Opens a new `rusqlite` connection per [`DataSource::get_connection`]
//! call; there is no pooling. Manual-commit mode starts a transaction
//! lazily before the first statement, so switching modes on an idle
//! connection costs nothing.

use crate::context::Environment;
use crate::descriptor::{ComponentBuilder, TypeDescriptor};
use crate::jdbc::{Connection, DataSource, Row, SqlValue};
use crate::{IocError, Result};
use rusqlite::types::{ToSql, ToSqlOutput, Type, Value, ValueRef};
use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// Property holding the database location.
pub const DB_URL_PROPERTY: &str = "db.url";

/// A [`DataSource`] backed by an SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteDataSource {
    path: PathBuf,
}

impl SqliteDataSource {
    /// Connect to the database file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read the location from the `db.url` property. `jdbc:sqlite:` and
    /// `sqlite:` prefixes are accepted.
    pub fn from_environment(env: &Environment) -> Result<Self> {
        let url = env.property(DB_URL_PROPERTY).ok_or_else(|| {
            IocError::creation_failed("sqliteDataSource", "property db.url is not set")
        })?;
        let path = url
            .strip_prefix("jdbc:sqlite:")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);

        #[cfg(feature = "logging")]
        debug!(target: "sprout_ioc::sql", path, "SQLite data source configured");

        Ok(Self::new(path))
    }

    /// Descriptor that builds the data source from the `Environment` bean
    /// and exposes it as `dyn DataSource`
    pub fn descriptor() -> ComponentBuilder<Self> {
        TypeDescriptor::component::<Self>()
            .constructor(|env: Arc<Environment>| Self::from_environment(&env))
            .provides::<dyn DataSource, _>(|ds| ds as Arc<dyn DataSource>)
    }

    /// Location of the database file
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DataSource for SqliteDataSource {
    fn get_connection(&self) -> Result<Box<dyn Connection>> {
        let conn = rusqlite::Connection::open(&self.path)
            .map_err(|e| IocError::sql(format!("open {}", self.path.display()), e))?;

        #[cfg(feature = "logging")]
        trace!(target: "sprout_ioc::sql", path = %self.path.display(), "Opened SQLite connection");

        Ok(Box::new(SqliteConnection::new(conn)))
    }
}

/// One SQLite connection with JDBC-style auto-commit switching.
pub struct SqliteConnection {
    conn: RefCell<Option<rusqlite::Connection>>,
    auto_commit: Cell<bool>,
}

impl SqliteConnection {
    /// Wrap an open `rusqlite` connection
    pub fn new(conn: rusqlite::Connection) -> Self {
        Self {
            conn: RefCell::new(Some(conn)),
            auto_commit: Cell::new(true),
        }
    }

    fn with<R>(
        &self,
        sql: &str,
        work: impl FnOnce(&rusqlite::Connection) -> rusqlite::Result<R>,
    ) -> Result<R> {
        let guard = self.conn.borrow();
        let conn = guard
            .as_ref()
            .ok_or_else(|| IocError::sql(sql, "connection is closed"))?;
        work(conn).map_err(|e| IocError::sql(sql, e))
    }

    /// Run `statement` unless the connection is outside a transaction.
    fn end_transaction(&self, statement: &str) -> Result<()> {
        self.with(statement, |conn| {
            if conn.is_autocommit() {
                Ok(())
            } else {
                conn.execute_batch(statement)
            }
        })
    }

    /// In manual-commit mode, open a transaction before the first statement.
    fn begin_if_needed(&self, conn: &rusqlite::Connection) -> rusqlite::Result<()> {
        if !self.auto_commit.get() && conn.is_autocommit() {
            conn.execute_batch("BEGIN")?;
        }
        Ok(())
    }
}

impl Connection for SqliteConnection {
    fn set_auto_commit(&self, auto_commit: bool) -> Result<()> {
        if auto_commit && !self.auto_commit.get() {
            // Switching back commits whatever is pending.
            self.end_transaction("COMMIT")?;
        }
        self.auto_commit.set(auto_commit);
        Ok(())
    }

    fn is_auto_commit(&self) -> bool {
        self.auto_commit.get()
    }

    fn commit(&self) -> Result<()> {
        self.end_transaction("COMMIT")
    }

    fn rollback(&self) -> Result<()> {
        self.end_transaction("ROLLBACK")
    }

    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<usize> {
        self.with(sql, |conn| {
            self.begin_if_needed(conn)?;
            conn.execute(sql, rusqlite::params_from_iter(params.iter()))
        })
    }

    fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        self.with(sql, |conn| {
            self.begin_if_needed(conn)?;
            let mut stmt = conn.prepare(sql)?;
            let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;

            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let values = (0..columns.len())
                    .map(|idx| row.get_ref(idx).and_then(|value| from_value_ref(idx, value)))
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                out.push(Row::new(columns.clone(), values));
            }
            Ok(out)
        })
    }

    fn close(&self) -> Result<()> {
        match self.conn.borrow_mut().take() {
            Some(conn) => conn.close().map_err(|(_, e)| IocError::sql("close", e)),
            None => Ok(()),
        }
    }

    fn is_closed(&self) -> bool {
        self.conn.borrow().is_none()
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Integer(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            SqlValue::Real(v) => ToSqlOutput::Owned(Value::Real(*v)),
            SqlValue::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            SqlValue::Blob(v) => ToSqlOutput::Borrowed(ValueRef::Blob(v)),
        })
    }
}

/// Copy column `idx` out of the driver. Text that is not valid UTF-8 is a
/// conversion error.
fn from_value_ref(idx: usize, value: ValueRef<'_>) -> rusqlite::Result<SqlValue> {
    Ok(match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(v) => SqlValue::Integer(v),
        ValueRef::Real(v) => SqlValue::Real(v),
        ValueRef::Text(v) => {
            let text = std::str::from_utf8(v)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))?;
            SqlValue::Text(text.to_owned())
        }
        ValueRef::Blob(v) => SqlValue::Blob(v.to_vec()),
    })
}
