//! Generic repositories
//!
//! A repository interface marked with `REPOSITORY` and bound to an entity
//! type is backed by a [`RepositoryProxy`]: the container fabricates one
//! instead of calling a constructor, and every CRUD call turns into SQL
//! against the entity's table.

use crate::jdbc::{column_of, table_of, Entity, JdbcTemplate, SqlValue};
use crate::resource::TxContext;
use crate::{IocError, Result};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// Create/read operations every repository offers.
pub trait CrudRepository<E: Entity>: Send + Sync {
    /// Insert `entity` as a new row
    fn save(&self, ctx: &TxContext, entity: &E) -> Result<()>;

    /// Load the row whose `id` column equals `id`
    fn find_by_id(&self, ctx: &TxContext, id: SqlValue) -> Result<E>;

    /// Load every row of the table
    fn find_all(&self, ctx: &TxContext) -> Result<Vec<E>>;
}

/// The entity and table behind one repository interface, with its
/// statements prepared once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryBinding {
    interface: &'static str,
    entity: &'static str,
    table: String,
    insert_sql: String,
    find_by_id_sql: String,
    find_all_sql: String,
}

impl RepositoryBinding {
    /// Bind the interface named `interface` to entity `E`
    pub fn new<E: Entity>(interface: &'static str) -> Self {
        let table = table_of::<E>();
        let columns: Vec<String> = E::fields().iter().map(|f| column_of(f)).collect();
        let placeholders = vec!["?"; columns.len()].join(", ");

        Self {
            interface,
            entity: E::entity_name(),
            insert_sql: format!(
                "INSERT INTO {table} ({}) VALUES ({placeholders})",
                columns.join(", ")
            ),
            find_by_id_sql: format!("SELECT * FROM {table} WHERE id = ?"),
            find_all_sql: format!("SELECT * FROM {table}"),
            table,
        }
    }

    /// Full type name of the repository interface
    #[inline]
    pub fn interface(&self) -> &'static str {
        self.interface
    }

    /// Simple name of the entity type
    #[inline]
    pub fn entity(&self) -> &'static str {
        self.entity
    }

    /// Table the entity is stored in
    #[inline]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The INSERT statement used by `save`
    #[inline]
    pub fn insert_sql(&self) -> &str {
        &self.insert_sql
    }
}

/// An argument passed to [`RepositoryProxy::invoke`].
#[derive(Debug)]
pub enum Argument<'a, E> {
    /// An entity (for `save`)
    Entity(&'a E),
    /// A plain value (for `find_by_id`)
    Value(SqlValue),
}

/// Result of [`RepositoryProxy::invoke`].
#[derive(Debug, PartialEq)]
pub enum Invocation<E> {
    /// The method returns nothing
    Unit,
    /// A single entity
    Entity(E),
    /// A list of entities
    Entities(Vec<E>),
    /// The method is not one the proxy implements; callers return the
    /// default value of their declared return type
    Unrecognized,
}

impl<E> Invocation<E> {
    /// The single entity, if this is one
    pub fn into_entity(self) -> Option<E> {
        match self {
            Invocation::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    /// The entity list; empty for anything else
    pub fn into_entities(self) -> Vec<E> {
        match self {
            Invocation::Entities(entities) => entities,
            Invocation::Entity(entity) => vec![entity],
            _ => Vec::new(),
        }
    }

    /// Whether the method name was not recognised
    #[inline]
    pub fn is_unrecognized(&self) -> bool {
        matches!(self, Invocation::Unrecognized)
    }
}

/// Generated implementation of a repository interface for entity `E`.
///
/// Implement extra interface methods on `RepositoryProxy<YourEntity>`
/// through [`invoke`](Self::invoke); names the proxy does not know yield
/// the default value of the return type.
pub struct RepositoryProxy<E> {
    jdbc: Arc<JdbcTemplate>,
    binding: Arc<RepositoryBinding>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> RepositoryProxy<E> {
    /// Create a proxy that runs statements through `jdbc`
    pub fn new(jdbc: Arc<JdbcTemplate>, binding: Arc<RepositoryBinding>) -> Self {
        Self {
            jdbc,
            binding,
            _entity: PhantomData,
        }
    }

    /// The binding this proxy was created with
    #[inline]
    pub fn binding(&self) -> &Arc<RepositoryBinding> {
        &self.binding
    }

    /// Dispatch a call by method name.
    ///
    /// `save`, `find_by_id` and `find_all` are executed; any other name
    /// returns [`Invocation::Unrecognized`] without touching the database.
    pub fn invoke(
        &self,
        ctx: &TxContext,
        method: &str,
        args: &[Argument<'_, E>],
    ) -> Result<Invocation<E>> {
        #[cfg(feature = "logging")]
        trace!(
            target: "sprout_ioc",
            repository = self.binding.interface,
            method,
            args = args.len(),
            "Repository method invoked"
        );

        match (method, args) {
            ("save", [Argument::Entity(entity)]) => {
                self.insert(ctx, entity)?;
                Ok(Invocation::Unit)
            }
            ("find_by_id", [Argument::Value(id)]) => {
                self.select_one(ctx, id.clone()).map(Invocation::Entity)
            }
            ("find_all", []) => self.select_all(ctx).map(Invocation::Entities),
            ("save" | "find_by_id" | "find_all", _) => Err(IocError::Internal(format!(
                "{}::{method} called with unexpected arguments",
                self.binding.interface
            ))),
            _ => {
                #[cfg(feature = "logging")]
                debug!(
                    target: "sprout_ioc",
                    repository = self.binding.interface,
                    method,
                    "Unrecognized repository method; returning default"
                );
                Ok(Invocation::Unrecognized)
            }
        }
    }

    /// Default value for an interface method the proxy does not implement
    pub fn fallback<R: Default>(&self, _method: &str) -> R {
        #[cfg(feature = "logging")]
        debug!(
            target: "sprout_ioc",
            repository = self.binding.interface,
            method = _method,
            "Unrecognized repository method; returning default"
        );
        R::default()
    }

    fn insert(&self, ctx: &TxContext, entity: &E) -> Result<()> {
        let params: Vec<SqlValue> = E::fields()
            .iter()
            .map(|field| entity.field_value(field).unwrap_or_default())
            .collect();
        self.jdbc.update(ctx, &self.binding.insert_sql, &params)?;
        Ok(())
    }

    fn select_one(&self, ctx: &TxContext, id: SqlValue) -> Result<E> {
        let params = [id];
        self.jdbc
            .query::<E>(ctx, &self.binding.find_by_id_sql, &params)?
            .into_iter()
            .next()
            .ok_or_else(|| IocError::RecordNotFound {
                table: self.binding.table.clone(),
                id: params[0].to_string(),
            })
    }

    fn select_all(&self, ctx: &TxContext) -> Result<Vec<E>> {
        self.jdbc.query::<E>(ctx, &self.binding.find_all_sql, &[])
    }
}

impl<E: Entity> CrudRepository<E> for RepositoryProxy<E> {
    fn save(&self, ctx: &TxContext, entity: &E) -> Result<()> {
        self.insert(ctx, entity)
    }

    fn find_by_id(&self, ctx: &TxContext, id: SqlValue) -> Result<E> {
        self.select_one(ctx, id)
    }

    fn find_all(&self, ctx: &TxContext) -> Result<Vec<E>> {
        self.select_all(ctx)
    }
}

impl<E> fmt::Debug for RepositoryProxy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryProxy")
            .field("interface", &self.binding.interface)
            .field("table", &self.binding.table)
            .finish()
    }
}
