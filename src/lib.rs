//! # sprout-ioc - A Small Inversion-of-Control Runtime
//!
//! A singleton bean container with constructor and field injection, a
//! post-processor pipeline that can swap beans for decorated proxies,
//! declarative transactions, and generic repositories backed by SQL.
//!
//! ## Features
//!
//! - **Registration DSL** - Describe components with typed constructors and
//!   injected fields, or derive the description with `#[derive(Component)]`
//! - **Field cycles** - `Autowired<T>` slots are filled after the bean is
//!   exposed, so mutually dependent beans resolve to shared singletons
//! - **Post-processors** - Ordered hooks that may replace a finished bean
//! - **Transactions** - `transactional_proxy!` decorators begin, commit and
//!   roll back around marked methods
//! - **Repositories** - Interfaces bound to an entity get `save`,
//!   `find_by_id` and `find_all` without an implementation
//! - **Observable** - Optional tracing integration with JSON or pretty output
//!
//! ## Quick Start
//!
//! ```rust
//! use sprout_ioc::{Autowired, Container, TypeDescriptor};
//! use std::sync::Arc;
//!
//! #[derive(Default)]
//! struct Database;
//!
//! #[derive(Default)]
//! struct UserService {
//!     db: Autowired<Database>,
//! }
//!
//! let container = Container::new();
//! container.register_type(TypeDescriptor::component::<Database>().default_constructor());
//! container.register_type(
//!     TypeDescriptor::component::<UserService>()
//!         .default_constructor()
//!         .inject("db", |s| &s.db),
//! );
//!
//! let users = container.get::<UserService>().unwrap();
//! assert!(Arc::ptr_eq(users.db.get().unwrap(), &container.get::<Database>().unwrap()));
//! assert!(container.contains_bean("userService"));
//! ```
//!
//! ## Transactions
//!
//! A transaction belongs to a [`TxContext`], which every transactional and
//! data-access call receives explicitly. See [`transactional_proxy!`] and
//! [`TransactionPostProcessor`].

mod autowired;
mod bean;
mod container;
mod context;
mod descriptor;
mod error;
pub mod jdbc;
#[cfg(feature = "logging")]
pub mod logging;
mod markers;
pub mod naming;
mod processor;
mod provider;
mod repository;
mod resource;
#[cfg(feature = "sqlite")]
pub mod sqlite;
mod storage;
mod transaction;

pub use autowired::Autowired;
pub use bean::Bean;
pub use container::Container;
pub use context::{
    ApplicationContext, ApplicationContextBuilder, ComponentScanner, DataAccessModule,
    Environment, Module, ENVIRONMENT_BEAN, SCAN_ROOTS_PROPERTY,
};
#[cfg(feature = "sqlite")]
pub use context::SqliteModule;
#[cfg(feature = "scan")]
pub use context::{ComponentRegistration, InventoryScanner};
pub use descriptor::{
    Component, ComponentBuilder, ConstructorDescriptor, FieldDescriptor, InterfaceBuilder,
    TypeDescriptor,
};
pub use error::{IocError, Result};
pub use jdbc::{Connection, DataSource, Entity, JdbcTemplate, Row, SqlValue};
pub use markers::{Markers, MethodMarkers};
pub use processor::BeanPostProcessor;
pub use provider::{Dependencies, Dependency, Injectable, Param};
pub use repository::{Argument, CrudRepository, Invocation, RepositoryBinding, RepositoryProxy};
pub use resource::{ResourceSlot, TxContext};
pub use transaction::{
    ActiveTransaction, TransactionInterceptor, TransactionManager, TransactionPostProcessor,
    TransactionState,
};

#[cfg(feature = "derive")]
pub use sprout_ioc_derive::{Component, Entity};

#[cfg(feature = "scan")]
#[doc(hidden)]
pub use inventory;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        ApplicationContext, Autowired, BeanPostProcessor, Component, Container, CrudRepository,
        Entity, Environment, IocError, Markers, Result, SqlValue, TxContext, TypeDescriptor,
    };
    pub use std::sync::Arc;
}
