//! # sqlx-sqlite-orm
//!
//! Object-relational persistence for SQLite, on top of
//! [`sqlx-sqlite-conn-mgr`](sqlx_sqlite_conn_mgr).
//!
//! ## Core Types
//!
//! - **[`EntityKind`]**: A persistent type, declared once with typed [`Property`] handles
//! - **[`Entity`]**: An instance of a kind: one slot per property plus an [`Aspect`] chain
//! - **[`Repository`]**: Inserts, updates, deletes, looks up and queries entities
//! - **[`Settings`]**: Catalog, naming, mapping, factory, cascading and versioning
//! - **[`Query`]** / **[`Where`]** / **[`Order`]**: Prototype-based queries
//! - **[`Versioning`]**: Ordered schema upgrades tracked in `user_version`
//!
//! ## Storage Layout
//!
//! A kind and all of its subtypes share the table named after the root kind. Every
//! table has `_id INTEGER PRIMARY KEY AUTOINCREMENT` and a `_type` discriminator column,
//! plus one column per property. Tables are created and extended on first use.
//! To-one relations store the related id; collections store `{1}{2}{3}` text.
//!
//! ## Usage
//!
//! ```no_run
//! use sqlx_sqlite_orm::{
//!    Cascading, Catalog, Entity, EntityKind, FileLocator, Order, Repository, Settings, Where,
//! };
//!
//! #[tokio::main]
//! async fn main() -> sqlx_sqlite_orm::Result<()> {
//!    let mut address = EntityKind::builder("app.Address");
//!    let city = address.property::<String>("city");
//!    let address = address.build()?;
//!
//!    let mut person = EntityKind::builder("app.Person");
//!    let name = person.property::<String>("name");
//!    let age = person.property::<i32>("age");
//!    let home = person.relation("home", "app.Address");
//!    let person = person.build()?;
//!
//!    let settings = Settings::new(Catalog::new().with(&person).with(&address))
//!       .with_cascading(Cascading::new().cascade(&home));
//!    let repository = Repository::open(FileLocator::new("people.db"), settings).await?;
//!
//!    let paris = Entity::new(&address);
//!    paris.set(&city, "Paris".to_string()).await?;
//!    let ada = Entity::new(&person);
//!    ada.set(&name, "Ada".to_string()).await?;
//!    ada.set(&age, 36).await?;
//!    ada.set(&home, Some(paris)).await?;
//!    repository.insert(&ada).await?;
//!
//!    let (p, a) = (Entity::new(&person), Entity::new(&address));
//!    let parisians = repository
//!       .query(&p)
//!       .filter(Where::has(&p, &home, &a, Where::equal(&a, &city, "Paris".to_string())))
//!       .order(Order::ascending(&age))
//!       .list()
//!       .await?
//!       .into_vec()
//!       .await?;
//!    assert_eq!(parisians.len(), 1);
//!
//!    repository.close().await
//! }
//! ```

pub mod aspect;
mod cascading;
mod catalog;
pub mod decode;
mod entity;
mod error;
mod factory;
mod locator;
pub mod mapping;
mod naming;
mod operations;
mod reference;
mod repository;
mod schema;
mod settings;
mod transaction;
mod value;
mod versioning;

pub use aspect::{Aspect, Lazy, Loader, Next, Relation, Row, TRANSIENT, ToMany, ToManyRelation, VOID};
pub use cascading::Cascading;
pub use catalog::Catalog;
pub use entity::{
   Aspects, Entity, EntityKind, EntityKindBuilder, EnumType, Properties, Property, PropertyMeta,
   PropertyType, Slot, WeakEntity,
};
pub use error::{Error, Result};
pub use factory::{CachingFactory, Factory, NewFactory};
pub use locator::{FileLocator, Locator, MemoryLocator};
pub use mapping::{ColumnType, Mapper, Mapping, Target};
pub use naming::{DefaultNaming, Naming};
pub use operations::{Cursor, CursorState, Index, IndexOutcome, Order, Query, Where};
pub use reference::Reference;
pub use repository::Repository;
pub use settings::{RepositoryConfig, Settings};
pub use sqlx_sqlite_conn_mgr::SqliteDatabaseConfig;
pub use transaction::{Source, Transaction};
pub use value::{Locale, PropertyValue, ScalarValue, SqlValue, Value};
pub use versioning::{AlterTable, FnUpgrade, Statements, Upgrade, Versioning};
