//! Application and reversal of operations.
//!
//! An operation runs in two passes over its atomic ops. The first pass only
//! changes membership: inserted subtrees are registered and removed subtrees
//! are taken out of the reference index, so that every element the second
//! pass may touch is present. The second pass does the rest: it indexes
//! inserted subtrees, unregisters removed ones and performs the field
//! mutations. Reverting walks the ops back to front and inverts each one.
//!
//! Every primitive change is journaled; if any atomic op fails the journal is
//! replayed backwards and the graph is left exactly as it was.

mod journal;

use indexmap::IndexSet;
use log::{debug, warn};

use armillary_core::{
    element::{Element, Value},
    identifier::{Id, IdGenerator},
    meta::{AttrKind, MetaAttribute, MetaRegistry},
};

use crate::{
    codec::{self, Codec},
    error::ArmillaryError,
    index::{ReferenceIndex, outgoing_links},
    operation::{AtomicOp, Operation, PreviousOwner},
    store::ObjectStore,
};

use journal::Journal;

/// Which way an operation is being run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Apply,
    Revert,
}

/// Elements affected by one successful run.
#[derive(Debug, Default)]
pub(crate) struct ChangeSet {
    pub(crate) created: IndexSet<Id>,
    pub(crate) deleted: Vec<Element>,
    pub(crate) updated: IndexSet<Id>,
}

/// Executes one operation against the store and the index.
pub(crate) struct Engine<'r> {
    meta: &'r MetaRegistry,
    store: &'r mut ObjectStore,
    index: &'r mut ReferenceIndex,
    ids: &'r mut dyn IdGenerator,
    journal: Journal,
    changes: ChangeSet,
}

impl<'r> Engine<'r> {
    pub(crate) fn new(
        meta: &'r MetaRegistry,
        store: &'r mut ObjectStore,
        index: &'r mut ReferenceIndex,
        ids: &'r mut dyn IdGenerator,
    ) -> Self {
        Self {
            meta,
            store,
            index,
            ids,
            journal: Journal::default(),
            changes: ChangeSet::default(),
        }
    }

    /// Runs `op` in `direction`, all or nothing.
    ///
    /// State captured while running (removal positions, overwritten values,
    /// generated ids) is written back into `op`.
    pub(crate) fn execute(
        mut self,
        op: &mut Operation,
        direction: Direction,
    ) -> Result<ChangeSet, ArmillaryError> {
        match self.run(op.ops_mut(), direction) {
            Ok(()) => {
                debug!(
                    op = op.name(),
                    direction:? = direction,
                    primitives = self.journal.len();
                    "Operation executed"
                );
                Ok(self.changes)
            }
            Err(err) => {
                warn!(op = op.name(), direction:? = direction, err:% = err; "Operation failed");
                self.journal.rollback(self.store, self.index);
                Err(err)
            }
        }
    }

    fn run(&mut self, ops: &mut [AtomicOp], direction: Direction) -> Result<(), ArmillaryError> {
        let order: Vec<usize> = match direction {
            Direction::Apply => (0..ops.len()).collect(),
            Direction::Revert => (0..ops.len()).rev().collect(),
        };

        let mut staged = vec![Vec::new(); ops.len()];
        for &i in &order {
            staged[i] = self.stage_membership(&mut ops[i], direction)?;
        }
        for &i in &order {
            self.mutate(&mut ops[i], direction, &staged[i])?;
        }
        Ok(())
    }

    /// First pass. Returns the ids of the subtree the op attaches or
    /// detaches.
    fn stage_membership(
        &mut self,
        op: &mut AtomicOp,
        direction: Direction,
    ) -> Result<Vec<Id>, ArmillaryError> {
        match (op, direction) {
            (AtomicOp::Insert { encoding }, Direction::Apply)
            | (AtomicOp::Remove { encoding }, Direction::Revert) => self.attach(encoding),
            (AtomicOp::Insert { encoding }, Direction::Revert)
            | (AtomicOp::Remove { encoding }, Direction::Apply) => self.detach(encoding),
            _ => Ok(Vec::new()),
        }
    }

    /// Second pass.
    fn mutate(
        &mut self,
        op: &mut AtomicOp,
        direction: Direction,
        staged: &[Id],
    ) -> Result<(), ArmillaryError> {
        match (op, direction) {
            (AtomicOp::Insert { .. }, Direction::Apply)
            | (AtomicOp::Remove { .. }, Direction::Revert) => self.index_attached(staged),
            (AtomicOp::Insert { .. }, Direction::Revert)
            | (AtomicOp::Remove { .. }, Direction::Apply) => self.unregister_detached(staged),
            (
                AtomicOp::FieldAssign {
                    target,
                    field,
                    old,
                    new,
                    displaced,
                },
                Direction::Apply,
            ) => {
                let (overwritten, taken) = self.assign(*target, *field, new)?;
                *old = overwritten;
                *displaced = taken;
            }
            (
                AtomicOp::FieldAssign {
                    target,
                    field,
                    old,
                    new,
                    displaced,
                },
                Direction::Revert,
            ) => {
                let (overwritten, _) = self.assign(*target, *field, old)?;
                *new = overwritten;
                for owner in displaced.iter() {
                    self.set_parent(owner.child, Some(owner.parent));
                }
            }
            (
                AtomicOp::FieldInsert {
                    target,
                    field,
                    child,
                    position,
                    previous_parent,
                },
                Direction::Apply,
            ) => {
                *previous_parent = self.splice_in(*target, *field, *child, *position)?;
            }
            (
                AtomicOp::FieldInsert {
                    target,
                    field,
                    child,
                    position,
                    previous_parent,
                },
                Direction::Revert,
            ) => {
                self.splice_out(*target, *field, *child, *position)?;
                self.restore_parent(*target, *field, *child, *previous_parent)?;
            }
            (
                AtomicOp::FieldRemove {
                    target,
                    field,
                    child,
                    position,
                    previous_parent,
                },
                Direction::Apply,
            ) => {
                let (at, parent) = self.splice_out(*target, *field, *child, None)?;
                *position = Some(at);
                *previous_parent = parent;
            }
            (
                AtomicOp::FieldRemove {
                    target,
                    field,
                    child,
                    position,
                    previous_parent,
                },
                Direction::Revert,
            ) => {
                let position = position.ok_or(ArmillaryError::NotApplied { op: "fieldRemove" })?;
                self.splice_in(*target, *field, *child, Some(position))?;
                self.restore_parent(*target, *field, *child, *previous_parent)?;
            }
            (
                AtomicOp::FieldReorder {
                    target,
                    field,
                    child,
                    position,
                    original,
                },
                Direction::Apply,
            ) => {
                *original = Some(self.move_within(*target, *field, *child, *position)?);
            }
            (
                AtomicOp::FieldReorder {
                    target,
                    field,
                    child,
                    original,
                    ..
                },
                Direction::Revert,
            ) => {
                let original = original.ok_or(ArmillaryError::NotApplied { op: "fieldReorder" })?;
                self.move_within(*target, *field, *child, original)?;
            }
            (
                AtomicOp::FieldRelocate {
                    target,
                    field,
                    old_parent,
                    new_parent,
                    original,
                    previous_parent,
                },
                Direction::Apply,
            ) => {
                let (at, parent) = self.splice_out(*old_parent, *field, *target, None)?;
                self.splice_in(*new_parent, *field, *target, None)?;
                *original = Some(at);
                *previous_parent = parent;
            }
            (
                AtomicOp::FieldRelocate {
                    target,
                    field,
                    old_parent,
                    new_parent,
                    original,
                    previous_parent,
                },
                Direction::Revert,
            ) => {
                let original =
                    original.ok_or(ArmillaryError::NotApplied { op: "fieldRelocate" })?;
                self.splice_out(*new_parent, *field, *target, None)?;
                self.splice_in(*old_parent, *field, *target, Some(original))?;
                self.restore_parent(*old_parent, *field, *target, *previous_parent)?;
            }
        }
        Ok(())
    }

    /// Decodes and registers a subtree.
    fn attach(&mut self, encoding: &mut serde_json::Value) -> Result<Vec<Id>, ArmillaryError> {
        let codec = Codec::new(self.meta);
        let decoded = codec.decode(encoding, &mut *self.ids)?;

        // Write generated ids back so that every replay reuses them.
        if let Some(root) = decoded.elements().get(&decoded.root()) {
            *encoding = codec.encode(root, |id| decoded.elements().get(&id))?;
        }

        let ids: Vec<Id> = decoded.elements().keys().copied().collect();
        for element in decoded.into_elements() {
            self.register(element)?;
        }
        Ok(ids)
    }

    /// Takes a registered subtree out of the index and refreshes `encoding`
    /// from the live elements.
    fn detach(&mut self, encoding: &mut serde_json::Value) -> Result<Vec<Id>, ArmillaryError> {
        let codec = Codec::new(self.meta);
        let live_root = codec::encoded_id(encoding).and_then(|root| self.store.get(root));
        let ids = match live_root {
            Some(root) => {
                *encoding = codec.encode(root, |id| self.store.get(id))?;
                self.store.subtree_ids(self.meta, root.id())
            }
            None => {
                debug!(encoding:% = encoding; "Removing a subtree whose root is not registered");
                let decoded = codec.decode(encoding, &mut *self.ids)?;
                decoded
                    .elements()
                    .keys()
                    .copied()
                    .filter(|id| self.store.contains(*id))
                    .collect()
            }
        };

        for id in &ids {
            for referee in self.links_of(*id) {
                self.remove_ref(*id, referee);
            }
        }
        Ok(ids)
    }

    fn index_attached(&mut self, ids: &[Id]) {
        for id in ids {
            for referee in self.links_of(*id) {
                if !self.store.contains(referee) {
                    debug!(referrer:% = id, referee:% = referee; "Reference to unregistered element");
                }
                self.add_ref(*id, referee);
            }
            self.changes.created.insert(*id);
        }
    }

    fn unregister_detached(&mut self, ids: &[Id]) {
        for id in ids {
            if let Some(element) = self.deregister(*id) {
                self.changes.deleted.push(element);
            }
        }
    }

    /// Assigns a field. Returns the encoding of the value it replaced and
    /// the owners the incoming children were taken from.
    fn assign(
        &mut self,
        target: Id,
        field: Id,
        incoming: &serde_json::Value,
    ) -> Result<(serde_json::Value, Vec<PreviousOwner>), ArmillaryError> {
        let attr = self.attribute(target, field)?;
        let codec = Codec::new(self.meta);
        let (value, previous) = {
            let element = self
                .store
                .get(target)
                .ok_or(ArmillaryError::UnknownElement(target))?;
            let value = codec.decode_value(element.type_name(), &attr, incoming)?;
            (value, element.field_or_null(field).clone())
        };

        if attr.kind().is_link() {
            for referee in previous.link_ids() {
                self.remove_ref(target, *referee);
            }
            for referee in value.link_ids() {
                self.add_ref(target, *referee);
            }
        }
        let mut displaced = Vec::new();
        if attr.kind().is_owning() {
            for child in previous.link_ids() {
                if !value.link_ids().contains(child) && self.parent_of(*child) == Some(target) {
                    self.set_parent(*child, None);
                }
            }
            for child in value.link_ids() {
                if let Some(parent) = self.parent_of(*child).filter(|parent| *parent != target) {
                    displaced.push(PreviousOwner {
                        child: *child,
                        parent,
                    });
                }
                self.set_parent(*child, Some(target));
            }
        }

        let overwritten = codec.encode_value(&previous);
        self.set_field(target, field, value)?;
        Ok((overwritten, displaced))
    }

    /// Inserts `child` into a collection field at `position`, or appends.
    /// For an `objs` field, returns the owner `child` had before.
    fn splice_in(
        &mut self,
        target: Id,
        field: Id,
        child: Id,
        position: Option<usize>,
    ) -> Result<Option<Id>, ArmillaryError> {
        let attr = self.collection_attribute(target, field)?;
        if !self.store.contains(child) {
            return Err(ArmillaryError::UnknownElement(child));
        }

        let mut ids = self.list_of(target, field);
        let len = ids.len();
        let position = position.unwrap_or(len);
        if position > len {
            return Err(ArmillaryError::OutOfBounds {
                target,
                field,
                position,
                len,
            });
        }
        ids.insert(position, child);
        self.set_field(target, field, collection(attr.kind(), ids))?;
        self.add_ref(target, child);
        if !attr.kind().is_owning() {
            return Ok(None);
        }
        let previous = self.parent_of(child);
        self.set_parent(child, Some(target));
        Ok(previous)
    }

    /// Removes `child` from a collection field. `hint` is tried first,
    /// falling back to the first occurrence.
    ///
    /// Returns the position and, for an `objs` field, the owner `child` had
    /// before.
    fn splice_out(
        &mut self,
        target: Id,
        field: Id,
        child: Id,
        hint: Option<usize>,
    ) -> Result<(usize, Option<Id>), ArmillaryError> {
        let attr = self.collection_attribute(target, field)?;
        let mut ids = self.list_of(target, field);
        let position = hint
            .filter(|&at| ids.get(at) == Some(&child))
            .or_else(|| ids.iter().position(|id| *id == child))
            .ok_or(ArmillaryError::NotInField {
                target,
                field,
                child,
            })?;

        ids.remove(position);
        self.set_field(target, field, collection(attr.kind(), ids))?;
        self.remove_ref(target, child);
        if !attr.kind().is_owning() {
            return Ok((position, None));
        }
        let previous = self.parent_of(child);
        if previous == Some(target) {
            self.set_parent(child, None);
        }
        Ok((position, previous))
    }

    /// Puts back the owner captured by a splice on an `objs` field.
    fn restore_parent(
        &mut self,
        target: Id,
        field: Id,
        child: Id,
        parent: Option<Id>,
    ) -> Result<(), ArmillaryError> {
        if self.collection_attribute(target, field)?.kind().is_owning() {
            self.set_parent(child, parent);
        }
        Ok(())
    }

    /// Moves `child` to `to` within a collection field and returns its
    /// previous position.
    fn move_within(
        &mut self,
        target: Id,
        field: Id,
        child: Id,
        to: usize,
    ) -> Result<usize, ArmillaryError> {
        let attr = self.collection_attribute(target, field)?;
        let mut ids = self.list_of(target, field);
        let from = ids
            .iter()
            .position(|id| *id == child)
            .ok_or(ArmillaryError::NotInField {
                target,
                field,
                child,
            })?;

        ids.remove(from);
        if to > ids.len() {
            return Err(ArmillaryError::OutOfBounds {
                target,
                field,
                position: to,
                len: ids.len() + 1,
            });
        }
        ids.insert(to, child);
        self.set_field(target, field, collection(attr.kind(), ids))?;
        Ok(from)
    }

    fn attribute(&self, target: Id, field: Id) -> Result<MetaAttribute, ArmillaryError> {
        let element = self
            .store
            .get(target)
            .ok_or(ArmillaryError::UnknownElement(target))?;
        self.meta
            .attribute(element.type_name(), field)
            .cloned()
            .ok_or(ArmillaryError::UnknownField {
                ty: element.type_name(),
                field,
            })
    }

    fn collection_attribute(&self, target: Id, field: Id) -> Result<MetaAttribute, ArmillaryError> {
        let attr = self.attribute(target, field)?;
        if !attr.kind().is_collection() {
            return Err(ArmillaryError::FieldKind {
                target,
                field,
                kind: attr.kind(),
                expected: "a `refs` or `objs` field",
            });
        }
        Ok(attr)
    }

    fn list_of(&self, target: Id, field: Id) -> Vec<Id> {
        self.store
            .get(target)
            .map(|element| element.field_or_null(field).link_ids().to_vec())
            .unwrap_or_default()
    }

    fn links_of(&self, id: Id) -> Vec<Id> {
        self.store
            .get(id)
            .map(|element| outgoing_links(self.meta, element).collect())
            .unwrap_or_default()
    }

    fn parent_of(&self, id: Id) -> Option<Id> {
        self.store.get(id).and_then(Element::parent)
    }

    // Journaled primitives.

    fn register(&mut self, element: Element) -> Result<(), ArmillaryError> {
        let id = element.id();
        if self.store.contains(id) {
            return Err(ArmillaryError::DuplicateId(id));
        }
        self.store.insert(element);
        self.journal.registered(id);
        Ok(())
    }

    fn deregister(&mut self, id: Id) -> Option<Element> {
        let (position, element) = self.store.remove(id)?;
        self.journal.deregistered(position, element.clone());
        Some(element)
    }

    fn set_field(&mut self, id: Id, field: Id, value: Value) -> Result<(), ArmillaryError> {
        let element = self
            .store
            .get_mut(id)
            .ok_or(ArmillaryError::UnknownElement(id))?;
        let previous = element.set_field(field, value);
        self.journal.field_set(id, field, previous);
        self.changes.updated.insert(id);
        Ok(())
    }

    fn set_parent(&mut self, id: Id, parent: Option<Id>) {
        let Some(element) = self.store.get_mut(id) else {
            return;
        };
        let previous = element.parent();
        if previous == parent {
            return;
        }
        element.set_parent(parent);
        self.journal.parent_set(id, previous);
        self.changes.updated.insert(id);
    }

    fn add_ref(&mut self, referrer: Id, referee: Id) {
        self.index.add_ref(referrer, referee);
        self.journal.ref_added(referrer, referee);
    }

    fn remove_ref(&mut self, referrer: Id, referee: Id) {
        if self.index.remove_ref(referrer, referee) {
            self.journal.ref_removed(referrer, referee);
        }
    }
}

fn collection(kind: AttrKind, ids: Vec<Id>) -> Value {
    if kind == AttrKind::Objs {
        Value::Objs(ids)
    } else {
        Value::Refs(ids)
    }
}
