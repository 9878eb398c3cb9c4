//! Reverse reference index.
//!
//! For every referee the index keeps a multiset of referrers: an element
//! that points at the same target twice (say, from `source` and `target` of
//! a self-relationship) is counted twice, and stays listed until both links
//! are gone.
//!
//! Edges to elements that are not currently registered are kept, so that
//! re-inserting a removed element (undo of a delete) immediately restores its
//! back-references.

use indexmap::IndexMap;
use log::trace;

use armillary_core::{element::Element, identifier::Id, meta::MetaRegistry};

/// Referee → (referrer → link count).
#[derive(Debug, Default)]
pub struct ReferenceIndex {
    refs: IndexMap<Id, IndexMap<Id, usize>>,
}

impl ReferenceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one link from `referrer` to `referee`.
    pub fn add_ref(&mut self, referrer: Id, referee: Id) {
        *self
            .refs
            .entry(referee)
            .or_default()
            .entry(referrer)
            .or_insert(0) += 1;
    }

    /// Forgets one link from `referrer` to `referee`.
    ///
    /// Returns `false` when no such link was recorded.
    pub fn remove_ref(&mut self, referrer: Id, referee: Id) -> bool {
        let Some(referrers) = self.refs.get_mut(&referee) else {
            trace!(referrer:% = referrer, referee:% = referee; "Removing unrecorded reference");
            return false;
        };
        let Some(count) = referrers.get_mut(&referrer) else {
            trace!(referrer:% = referrer, referee:% = referee; "Removing unrecorded reference");
            return false;
        };
        *count -= 1;
        if *count == 0 {
            referrers.shift_remove(&referrer);
            if referrers.is_empty() {
                self.refs.shift_remove(&referee);
            }
        }
        true
    }

    /// Records every outgoing link of `element`.
    pub fn add_refs_of(&mut self, meta: &MetaRegistry, element: &Element) {
        for referee in outgoing_links(meta, element) {
            self.add_ref(element.id(), referee);
        }
    }

    /// Forgets every outgoing link of `element`.
    pub fn remove_refs_of(&mut self, meta: &MetaRegistry, element: &Element) {
        for referee in outgoing_links(meta, element) {
            self.remove_ref(element.id(), referee);
        }
    }

    /// Distinct referrers of `referee`, in first-link order.
    pub fn referrers(&self, referee: Id) -> impl Iterator<Item = Id> + '_ {
        self.refs
            .get(&referee)
            .into_iter()
            .flat_map(|referrers| referrers.keys().copied())
    }

    /// Number of links currently recorded from `referrer` to `referee`.
    pub fn count(&self, referrer: Id, referee: Id) -> usize {
        self.refs
            .get(&referee)
            .and_then(|referrers| referrers.get(&referrer))
            .copied()
            .unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.refs.clear();
    }
}

/// Iterates over every id `element` links to, across all link-kinded
/// fields, in field declaration order.
pub fn outgoing_links<'e>(
    meta: &'e MetaRegistry,
    element: &'e Element,
) -> impl Iterator<Item = Id> + 'e {
    meta.attributes(element.type_name())
        .unwrap_or_default()
        .iter()
        .filter(|attr| attr.kind().is_link())
        .flat_map(move |attr| element.field_or_null(attr.name()).link_ids().iter().copied())
}

#[cfg(test)]
mod tests {
    use super::*;
    use armillary_core::{element::Value, schema::standard_schema};

    #[test]
    fn test_multiset_counting() {
        let mut index = ReferenceIndex::new();
        let (r, t) = (Id::new("rel"), Id::new("box"));

        index.add_ref(r, t);
        index.add_ref(r, t);
        assert_eq!(index.count(r, t), 2);
        assert_eq!(index.referrers(t).collect::<Vec<_>>(), vec![r]);

        assert!(index.remove_ref(r, t));
        assert_eq!(index.referrers(t).count(), 1);
        assert!(index.remove_ref(r, t));
        assert_eq!(index.referrers(t).count(), 0);
        assert!(!index.remove_ref(r, t));
    }

    #[test]
    fn test_refs_of_element() {
        let meta = standard_schema().unwrap();
        let mut index = ReferenceIndex::new();
        let (a, b) = (Id::new("a"), Id::new("b"));
        let dependency = Element::new(Id::new("d"), Id::new("Dependency"))
            .with_field("name", Value::Str("uses".into()))
            .with_field("source", Value::Ref(a))
            .with_field("target", Value::Ref(b));

        index.add_refs_of(&meta, &dependency);
        assert_eq!(index.referrers(a).collect::<Vec<_>>(), vec![dependency.id()]);
        assert_eq!(index.referrers(b).collect::<Vec<_>>(), vec![dependency.id()]);

        index.remove_refs_of(&meta, &dependency);
        assert_eq!(index.referrers(a).count(), 0);
        assert_eq!(index.referrers(b).count(), 0);
    }

    #[test]
    fn test_outgoing_links_skip_scalars() {
        let meta = standard_schema().unwrap();
        let class = Element::new(Id::new("c"), Id::new("Class"))
            .with_field("name", Value::Str("Box".into()))
            .with_field("ownedElements", Value::Objs(vec![Id::new("x"), Id::new("y")]));

        let links: Vec<Id> = outgoing_links(&meta, &class).collect();
        assert_eq!(links, vec![Id::new("x"), Id::new("y")]);
    }
}
