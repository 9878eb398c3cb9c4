//! Armillary - A transactional in-memory model graph for diagram editors.
//!
//! A [`Repository`] holds the elements of one document, keeps an index of
//! the references between them and records every change as an undoable
//! [`Operation`](operation::Operation). Elements can be looked up directly,
//! through their back-references or with a small path language
//! ([`selector`]).
//!
//! # Examples
//!
//! ```
//! use armillary::{Repository, config::RepositoryConfig, operation::Operation};
//! use armillary::identifier::Id;
//! use serde_json::json;
//!
//! let mut repo = Repository::with_standard_schema(RepositoryConfig::default())?;
//! repo.load(&json!({
//!     "_type": "Project", "_id": "p", "name": "Plant",
//!     "ownedElements": [{ "_type": "Class", "_id": "c", "name": "Box" }]
//! }))?;
//!
//! let mut op = Operation::new("rename");
//! op.field_assign(Id::new("c"), "name", json!("Box"), json!("Tank"));
//! repo.do_operation(op)?;
//! assert_eq!(repo.select("Tank")?.len(), 1);
//!
//! repo.undo()?;
//! assert_eq!(repo.select("Box")?.len(), 1);
//! # Ok::<(), armillary::ArmillaryError>(())
//! ```

pub mod codec;
pub mod config;
pub mod events;
pub mod history;
pub mod index;
pub mod operation;
pub mod repair;
pub mod selector;
pub mod store;

mod engine;
mod error;
mod repository;

pub use armillary_core::{custom, element, identifier, meta, schema};

pub use error::ArmillaryError;
pub use repository::Repository;
