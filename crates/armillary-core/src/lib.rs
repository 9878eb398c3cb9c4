//! Armillary Core Types and Definitions
//!
//! This crate provides the foundational types of the Armillary model graph.
//! It includes:
//!
//! - **Identifiers**: String-interned ids and id generation ([`identifier`] module)
//! - **Meta-model**: Type and attribute declarations ([`meta`] module)
//! - **Elements**: Graph nodes and field values ([`element`] module)
//! - **Custom values**: Composite values with their own codecs ([`custom`] module)
//! - **Schema**: The standard diagram vocabulary ([`schema`] module)

pub mod custom;
pub mod element;
pub mod identifier;
pub mod meta;
pub mod schema;
