//! Error types for Armillary operations.
//!
//! This module provides the main error type [`ArmillaryError`] which wraps
//! the structural failures of the operation engine together with the codec,
//! selector and meta-model errors that can surface through the repository.

use std::io;

use thiserror::Error;

use armillary_core::{identifier::Id, meta::AttrKind, meta::MetaError};

use crate::{codec::CodecError, selector::SelectorError};

/// The main error type for Armillary operations.
///
/// # Diagnostic Variants
///
/// The `Selector` variant keeps the query it was raised for, so that the
/// offending span can be shown in context.
#[derive(Debug, Error)]
pub enum ArmillaryError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("{err}")]
    Selector { err: SelectorError, query: String },

    #[error("Meta-model error: {0}")]
    Meta(#[from] MetaError),

    #[error("unknown element `{0}`")]
    UnknownElement(Id),

    #[error("element `{0}` is already registered")]
    DuplicateId(Id),

    #[error("type `{ty}` has no field `{field}`")]
    UnknownField { ty: Id, field: Id },

    #[error("field `{field}` of `{target}` is `{kind}`, expected {expected}")]
    FieldKind {
        target: Id,
        field: Id,
        kind: AttrKind,
        expected: &'static str,
    },

    #[error("element `{child}` is not in field `{field}` of `{target}`")]
    NotInField { target: Id, field: Id, child: Id },

    #[error("position {position} is out of bounds for field `{field}` of `{target}` (length {len})")]
    OutOfBounds {
        target: Id,
        field: Id,
        position: usize,
        len: usize,
    },

    #[error("no document is loaded")]
    NoDocument,

    #[error("`{op}` was reverted before it was ever applied")]
    NotApplied { op: &'static str },
}

impl ArmillaryError {
    /// Create a new `Selector` error with the query it was raised for.
    pub fn new_selector_error(err: SelectorError, query: impl Into<String>) -> Self {
        Self::Selector {
            err,
            query: query.into(),
        }
    }
}
