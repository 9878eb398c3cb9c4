//! Meta-model registry.
//!
//! Every element carries a type name; the [`MetaRegistry`] maps that name to
//! the ordered list of [`MetaAttribute`]s the type declares, inherited ones
//! first. The attribute [`AttrKind`] decides how a field is stored, encoded
//! and indexed: owned children, non-owning references, or plain values.
//!
//! Types are registered one at a time and validated on registration, so a
//! registry that was built without errors is internally consistent: every
//! super type exists and no attribute name is declared twice along an
//! inheritance chain.
//!
//! # Example
//!
//! ```
//! use armillary_core::meta::{AttrKind, MetaRegistry, TypeDef};
//!
//! let mut registry = MetaRegistry::new();
//! registry
//!     .register(TypeDef::new("Element"))
//!     .unwrap();
//! registry
//!     .register(
//!         TypeDef::new("Model")
//!             .extends("Element")
//!             .attr("name", AttrKind::Prim, "String")
//!             .attr("ownedElements", AttrKind::Objs, "Model"),
//!     )
//!     .unwrap();
//!
//! assert!(registry.is_kind_of("Model".into(), "Element".into()));
//! assert_eq!(registry.attributes("Model".into()).unwrap().len(), 2);
//! ```

use std::fmt;

use indexmap::IndexMap;
use thiserror::Error;

use crate::identifier::Id;

/// Storage and ownership semantics of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrKind {
    /// Primitive scalar (string, number, boolean).
    Prim,
    /// Scalar from a closed value set.
    Enum,
    /// Inline JSON value, never indexed.
    Var,
    /// Single non-owning reference.
    Ref,
    /// Ordered list of non-owning references.
    Refs,
    /// Single owned child.
    Obj,
    /// Ordered list of owned children.
    Objs,
    /// Opaque value with its own encode/decode contract.
    Custom,
}

impl AttrKind {
    /// Returns `true` for kinds whose values point at other elements and are
    /// therefore tracked by the reference index.
    pub fn is_link(self) -> bool {
        matches!(self, Self::Ref | Self::Refs | Self::Obj | Self::Objs)
    }

    /// Returns `true` for kinds that own their targets.
    pub fn is_owning(self) -> bool {
        matches!(self, Self::Obj | Self::Objs)
    }

    /// Returns `true` for ordered collection kinds.
    pub fn is_collection(self) -> bool {
        matches!(self, Self::Refs | Self::Objs)
    }
}

impl fmt::Display for AttrKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Prim => "prim",
            Self::Enum => "enum",
            Self::Var => "var",
            Self::Ref => "ref",
            Self::Refs => "refs",
            Self::Obj => "obj",
            Self::Objs => "objs",
            Self::Custom => "custom",
        };
        f.write_str(name)
    }
}

/// A schema-declared field of a type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaAttribute {
    name: Id,
    kind: AttrKind,
    type_name: Id,
}

impl MetaAttribute {
    /// Creates a new attribute declaration.
    pub fn new(name: impl Into<Id>, kind: AttrKind, type_name: impl Into<Id>) -> Self {
        Self {
            name: name.into(),
            kind,
            type_name: type_name.into(),
        }
    }

    /// Returns the field name.
    pub fn name(&self) -> Id {
        self.name
    }

    /// Returns the field kind.
    pub fn kind(&self) -> AttrKind {
        self.kind
    }

    /// Returns the declared value type (target element type for link kinds,
    /// codec name for custom kinds).
    pub fn type_name(&self) -> Id {
        self.type_name
    }
}

/// Declaration of a type, consumed by [`MetaRegistry::register`].
#[derive(Debug, Clone)]
pub struct TypeDef {
    name: Id,
    super_type: Option<Id>,
    attributes: Vec<MetaAttribute>,
}

impl TypeDef {
    /// Starts a type declaration with no super type and no attributes.
    pub fn new(name: impl Into<Id>) -> Self {
        Self {
            name: name.into(),
            super_type: None,
            attributes: Vec::new(),
        }
    }

    /// Sets the super type.
    pub fn extends(mut self, super_type: impl Into<Id>) -> Self {
        self.super_type = Some(super_type.into());
        self
    }

    /// Declares an attribute on this type.
    pub fn attr(mut self, name: &str, kind: AttrKind, type_name: &str) -> Self {
        self.attributes.push(MetaAttribute::new(name, kind, type_name));
        self
    }
}

/// Errors raised while registering types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetaError {
    #[error("type `{0}` is already registered")]
    DuplicateType(Id),

    #[error("type `{ty}` extends unknown type `{super_type}`")]
    UnknownSuperType { ty: Id, super_type: Id },

    #[error("attribute `{attr}` of type `{ty}` is already declared by `{ty}` or one of its ancestors")]
    DuplicateAttribute { ty: Id, attr: Id },
}

/// A registered type with its resolved attribute list.
#[derive(Debug, Clone)]
struct MetaType {
    super_type: Option<Id>,
    /// Ancestors' attributes first, then this type's own.
    attributes: Vec<MetaAttribute>,
}

/// Registry of element types and their attributes.
#[derive(Debug, Clone, Default)]
pub struct MetaRegistry {
    types: IndexMap<Id, MetaType>,
}

impl MetaRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a type.
    ///
    /// The super type, if any, must already be registered; its attributes are
    /// copied in front of the new type's own attributes.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError`] when the type name is taken, the super type is
    /// unknown, or an attribute name is declared twice along the chain.
    pub fn register(&mut self, def: TypeDef) -> Result<(), MetaError> {
        if self.types.contains_key(&def.name) {
            return Err(MetaError::DuplicateType(def.name));
        }

        let mut attributes = match def.super_type {
            Some(super_type) => self
                .types
                .get(&super_type)
                .map(|parent| parent.attributes.clone())
                .ok_or(MetaError::UnknownSuperType {
                    ty: def.name,
                    super_type,
                })?,
            None => Vec::new(),
        };

        for attr in def.attributes {
            if attributes.iter().any(|existing| existing.name == attr.name) {
                return Err(MetaError::DuplicateAttribute {
                    ty: def.name,
                    attr: attr.name,
                });
            }
            attributes.push(attr);
        }

        self.types.insert(
            def.name,
            MetaType {
                super_type: def.super_type,
                attributes,
            },
        );
        Ok(())
    }

    /// Returns `true` if the type is registered.
    pub fn contains(&self, type_name: Id) -> bool {
        self.types.contains_key(&type_name)
    }

    /// Returns all attributes of a type, ancestors first.
    pub fn attributes(&self, type_name: Id) -> Option<&[MetaAttribute]> {
        self.types
            .get(&type_name)
            .map(|meta| meta.attributes.as_slice())
    }

    /// Looks up a single attribute of a type by field name.
    pub fn attribute(&self, type_name: Id, field: Id) -> Option<&MetaAttribute> {
        self.attributes(type_name)?
            .iter()
            .find(|attr| attr.name == field)
    }

    /// Returns the direct super type of a type.
    pub fn super_type(&self, type_name: Id) -> Option<Id> {
        self.types.get(&type_name)?.super_type
    }

    /// Returns `true` if `type_name` is `ancestor` or inherits from it.
    pub fn is_kind_of(&self, type_name: Id, ancestor: Id) -> bool {
        let mut current = Some(type_name);
        while let Some(ty) = current {
            if ty == ancestor {
                return true;
            }
            current = self.super_type(ty);
        }
        false
    }

    /// Returns every registered type name in registration order.
    pub fn type_names(&self) -> impl Iterator<Item = Id> + '_ {
        self.types.keys().copied()
    }
}


#[cfg(test)]
mod proptest_tests {
    use proptest::prelude::*;

    use super::*;

    // ===================
    // Strategies
    // ===================

    /// Strategy for an inheritance chain: one list of attribute kinds per
    /// level, root first.
    fn chain_strategy() -> impl Strategy<Value = Vec<Vec<AttrKind>>> {
        let kind = prop_oneof![
            Just(AttrKind::Prim),
            Just(AttrKind::Enum),
            Just(AttrKind::Var),
            Just(AttrKind::Ref),
            Just(AttrKind::Refs),
            Just(AttrKind::Obj),
            Just(AttrKind::Objs),
            Just(AttrKind::Custom),
        ];
        prop::collection::vec(prop::collection::vec(kind, 0..4), 1..6)
    }

    // ===================
    // Property Test Functions
    // ===================

    /// A type's attributes are its ancestors' attributes, in order, followed
    /// by its own.
    fn check_attributes_are_ancestor_first(
        chain: &[Vec<AttrKind>],
    ) -> Result<(), TestCaseError> {
        let mut registry = MetaRegistry::new();
        let mut expected = Vec::new();

        for (level, kinds) in chain.iter().enumerate() {
            let mut def = TypeDef::new(format!("ChainType{level}").as_str());
            if level > 0 {
                def = def.extends(format!("ChainType{}", level - 1).as_str());
            }
            for (index, kind) in kinds.iter().enumerate() {
                let name = format!("level{level}_attr{index}");
                def = def.attr(&name, *kind, "Element");
                expected.push(Id::new(&name));
            }
            registry.register(def).expect("chain registers cleanly");
        }

        let leaf = Id::new(&format!("ChainType{}", chain.len() - 1));
        let actual: Vec<Id> = registry
            .attributes(leaf)
            .expect("leaf registered")
            .iter()
            .map(MetaAttribute::name)
            .collect();
        prop_assert_eq!(actual, expected);
        prop_assert!(registry.is_kind_of(leaf, Id::new("ChainType0")));
        Ok(())
    }

    // ===================
    // Proptest Wrappers
    // ===================

    proptest! {
        #[test]
        fn attributes_are_ancestor_first(chain in chain_strategy()) {
            check_attributes_are_ancestor_first(&chain)?;
        }
    }
}
