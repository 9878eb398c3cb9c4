//! Operations: named, reversible batches of atomic graph mutations.
//!
//! An [`Operation`] is what the undo and redo stacks hold. Its atomic ops
//! carry enough data to be replayed in either direction; ops that need
//! information only known at apply time (the position a child was removed
//! from, the value a field held before assignment) capture it in place
//! when they run.
//!
//! Operations serialise to JSON so they can be stored or fed to the CLI:
//!
//! ```json
//! { "name": "rename", "ops": [
//!     { "op": "fieldAssign", "target": "c1", "field": "name",
//!       "old": "Box", "new": "Tank" } ] }
//! ```

use serde::{Deserialize, Serialize};

use armillary_core::identifier::Id;

/// A single reversible mutation.
///
/// Subtree payloads (`encoding`) and field values (`old`/`new`) use the
/// document encoding of [`crate::codec`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum AtomicOp {
    /// Registers an encoded subtree.
    Insert { encoding: serde_json::Value },

    /// Unregisters the subtree rooted at the encoding's `_id`.
    Remove { encoding: serde_json::Value },

    /// Overwrites a single field.
    FieldAssign {
        target: Id,
        field: Id,
        #[serde(default)]
        old: serde_json::Value,
        new: serde_json::Value,
        /// Owners the assigned children were taken from, captured on apply.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        displaced: Vec<PreviousOwner>,
    },

    /// Splices `child` into a collection field; `None` appends.
    FieldInsert {
        target: Id,
        field: Id,
        child: Id,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        position: Option<usize>,
        /// Owner of `child` before an `objs` insert, captured on apply.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        previous_parent: Option<Id>,
    },

    /// Splices `child` out of a collection field.
    FieldRemove {
        target: Id,
        field: Id,
        child: Id,
        /// Position the child was removed from, captured on apply.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        position: Option<usize>,
        /// Owner of `child` before an `objs` removal, captured on apply.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        previous_parent: Option<Id>,
    },

    /// Moves `child` to `position` within a collection field.
    FieldReorder {
        target: Id,
        field: Id,
        child: Id,
        position: usize,
        /// Position before the move, captured on apply.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        original: Option<usize>,
    },

    /// Moves `target` from `field` of `old_parent` to the end of `field` of
    /// `new_parent`.
    FieldRelocate {
        target: Id,
        field: Id,
        old_parent: Id,
        new_parent: Id,
        /// Position within the old parent, captured on apply.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        original: Option<usize>,
        /// Owner of `target` before an `objs` move, captured on apply.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        previous_parent: Option<Id>,
    },
}

/// An element that an owning assignment took away from its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviousOwner {
    pub child: Id,
    pub parent: Id,
}

impl AtomicOp {
    /// Short name used in log records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "insert",
            Self::Remove { .. } => "remove",
            Self::FieldAssign { .. } => "fieldAssign",
            Self::FieldInsert { .. } => "fieldInsert",
            Self::FieldRemove { .. } => "fieldRemove",
            Self::FieldReorder { .. } => "fieldReorder",
            Self::FieldRelocate { .. } => "fieldRelocate",
        }
    }
}

/// A named batch of atomic ops executed and undone as a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    name: String,
    /// Bypass operations are applied but neither recorded nor reported as
    /// changes.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    bypass: bool,
    ops: Vec<AtomicOp>,
}

impl Operation {
    /// Creates an empty operation.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bypass: false,
            ops: Vec::new(),
        }
    }

    /// Marks the operation as bypassing history and notifications.
    pub fn bypass(mut self) -> Self {
        self.bypass = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_bypass(&self) -> bool {
        self.bypass
    }

    pub fn ops(&self) -> &[AtomicOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub(crate) fn ops_mut(&mut self) -> &mut [AtomicOp] {
        &mut self.ops
    }

    /// Appends an arbitrary atomic op.
    pub fn push(&mut self, op: AtomicOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn insert(&mut self, encoding: serde_json::Value) -> &mut Self {
        self.push(AtomicOp::Insert { encoding })
    }

    pub fn remove(&mut self, encoding: serde_json::Value) -> &mut Self {
        self.push(AtomicOp::Remove { encoding })
    }

    pub fn field_assign(
        &mut self,
        target: Id,
        field: impl Into<Id>,
        old: serde_json::Value,
        new: serde_json::Value,
    ) -> &mut Self {
        self.push(AtomicOp::FieldAssign {
            target,
            field: field.into(),
            old,
            new,
            displaced: Vec::new(),
        })
    }

    pub fn field_insert(
        &mut self,
        target: Id,
        field: impl Into<Id>,
        child: Id,
        position: Option<usize>,
    ) -> &mut Self {
        self.push(AtomicOp::FieldInsert {
            target,
            field: field.into(),
            child,
            position,
            previous_parent: None,
        })
    }

    pub fn field_remove(&mut self, target: Id, field: impl Into<Id>, child: Id) -> &mut Self {
        self.push(AtomicOp::FieldRemove {
            target,
            field: field.into(),
            child,
            position: None,
            previous_parent: None,
        })
    }

    pub fn field_reorder(
        &mut self,
        target: Id,
        field: impl Into<Id>,
        child: Id,
        position: usize,
    ) -> &mut Self {
        self.push(AtomicOp::FieldReorder {
            target,
            field: field.into(),
            child,
            position,
            original: None,
        })
    }

    pub fn field_relocate(
        &mut self,
        target: Id,
        field: impl Into<Id>,
        old_parent: Id,
        new_parent: Id,
    ) -> &mut Self {
        self.push(AtomicOp::FieldRelocate {
            target,
            field: field.into(),
            old_parent,
            new_parent,
            original: None,
            previous_parent: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder() {
        let mut op = Operation::new("rename");
        op.field_assign(Id::new("c1"), "name", json!("Box"), json!("Tank"))
            .field_remove(Id::new("p"), "ownedElements", Id::new("c2"));

        assert_eq!(op.name(), "rename");
        assert_eq!(op.len(), 2);
        assert!(!op.is_bypass());
        assert_eq!(op.ops()[1].kind(), "fieldRemove");
        assert!(Operation::new("sync").bypass().is_bypass());
    }

    #[test]
    fn test_deserialize_from_json() {
        let op: Operation = serde_json::from_value(json!({
            "name": "move",
            "ops": [
                { "op": "fieldReorder", "target": "p", "field": "ownedElements",
                  "child": "c2", "position": 0 },
                { "op": "fieldRelocate", "target": "c1", "field": "ownedElements",
                  "oldParent": "p", "newParent": "pkg" }
            ]
        }))
        .unwrap();

        assert_eq!(
            op.ops()[0],
            AtomicOp::FieldReorder {
                target: Id::new("p"),
                field: Id::new("ownedElements"),
                child: Id::new("c2"),
                position: 0,
                original: None,
            }
        );
        assert!(matches!(
            op.ops()[1],
            AtomicOp::FieldRelocate { new_parent, .. } if new_parent == Id::new("pkg")
        ));
    }

    #[test]
    fn test_serialize_omits_uncaptured_state() {
        let mut op = Operation::new("detach");
        op.field_remove(Id::new("p"), "ownedElements", Id::new("c1"));

        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(
            json,
            json!({
                "name": "detach",
                "ops": [{ "op": "fieldRemove", "target": "p",
                          "field": "ownedElements", "child": "c1" }]
            })
        );
    }
}
