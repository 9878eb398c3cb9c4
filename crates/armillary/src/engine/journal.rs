//! Undo log of primitive mutations made while an operation is running.

use log::debug;

use armillary_core::{
    element::{Element, Value},
    identifier::Id,
};

use crate::{index::ReferenceIndex, store::ObjectStore};

/// A primitive mutation, recorded with what is needed to reverse it.
#[derive(Debug)]
enum Entry {
    Registered(Id),
    Deregistered { position: usize, element: Element },
    FieldSet { id: Id, field: Id, previous: Option<Value> },
    ParentSet { id: Id, previous: Option<Id> },
    RefAdded { referrer: Id, referee: Id },
    RefRemoved { referrer: Id, referee: Id },
}

/// Records primitive mutations in execution order.
#[derive(Debug, Default)]
pub(crate) struct Journal {
    entries: Vec<Entry>,
}

impl Journal {
    pub(crate) fn registered(&mut self, id: Id) {
        self.entries.push(Entry::Registered(id));
    }

    pub(crate) fn deregistered(&mut self, position: usize, element: Element) {
        self.entries.push(Entry::Deregistered { position, element });
    }

    pub(crate) fn field_set(&mut self, id: Id, field: Id, previous: Option<Value>) {
        self.entries.push(Entry::FieldSet { id, field, previous });
    }

    pub(crate) fn parent_set(&mut self, id: Id, previous: Option<Id>) {
        self.entries.push(Entry::ParentSet { id, previous });
    }

    pub(crate) fn ref_added(&mut self, referrer: Id, referee: Id) {
        self.entries.push(Entry::RefAdded { referrer, referee });
    }

    pub(crate) fn ref_removed(&mut self, referrer: Id, referee: Id) {
        self.entries.push(Entry::RefRemoved { referrer, referee });
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Reverses every recorded mutation, newest first.
    pub(crate) fn rollback(self, store: &mut ObjectStore, index: &mut ReferenceIndex) {
        debug!(entries = self.entries.len(); "Rolling back partial operation");
        for entry in self.entries.into_iter().rev() {
            match entry {
                Entry::Registered(id) => {
                    store.remove(id);
                }
                Entry::Deregistered { position, element } => store.restore(position, element),
                Entry::FieldSet { id, field, previous } => {
                    if let Some(element) = store.get_mut(id) {
                        element.set_field(field, previous.unwrap_or_default());
                    }
                }
                Entry::ParentSet { id, previous } => {
                    if let Some(element) = store.get_mut(id) {
                        element.set_parent(previous);
                    }
                }
                Entry::RefAdded { referrer, referee } => {
                    index.remove_ref(referrer, referee);
                }
                Entry::RefRemoved { referrer, referee } => index.add_ref(referrer, referee),
            }
        }
    }
}
