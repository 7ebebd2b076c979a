//! Active-record models and a chainable query builder for Neutron.
//!
//! A model is a plain struct that implements [`Model`]: it names its table
//! and primary key, lists its persisted fields and knows how to rebuild
//! itself from a [`Row`](neutron_db::Row). Everything else (querying,
//! `save`, `delete`) comes from the trait's provided methods.
//!
//! # Usage
//!
//! ```rust,ignore
//! use neutron_db::Database;
//! use neutron_model::Model;
//!
//! let db = Database::in_memory()?;
//! let mut user = User::new("admin@example.com", "admin");
//! user.save(&db)?; // INSERT, assigns user.id
//!
//! let admins = User::query(&db)
//!     .filter("role", "=", "admin")
//!     .order_by("email", "DESC")
//!     .limit(10)
//!     .get()?;
//! ```
//!
//! Each call to [`Model::query`] starts from an empty [`QueryBuilder`];
//! predicates never carry over from one query to the next.

mod model;
mod query;

pub use model::Model;
pub use query::{CompiledQuery, Direction, Operator, Predicate, QueryBuilder};

#[cfg(test)]
mod tests;
