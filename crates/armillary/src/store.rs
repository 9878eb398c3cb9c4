//! Id-keyed storage of every live element.
//!
//! The store is the single owner of all [`Element`]s. Iteration follows
//! registration order, which is also the order selector queries start from.

use indexmap::{IndexMap, IndexSet};

use armillary_core::{element::Element, identifier::Id, meta::MetaRegistry};

/// All live elements, keyed by id.
#[derive(Debug, Default)]
pub struct ObjectStore {
    elements: IndexMap<Id, Element>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks an element up by id.
    pub fn get(&self, id: Id) -> Option<&Element> {
        self.elements.get(&id)
    }

    /// Returns `true` if an element with this id is registered.
    pub fn contains(&self, id: Id) -> bool {
        self.elements.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Iterates over all elements in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Element> {
        self.elements.values()
    }

    /// Returns the first element accepted by `predicate`.
    pub fn find(&self, predicate: impl Fn(&Element) -> bool) -> Option<&Element> {
        self.iter().find(|element| predicate(element))
    }

    /// Returns every element accepted by `predicate`.
    pub fn find_all(&self, predicate: impl Fn(&Element) -> bool) -> Vec<&Element> {
        self.iter().filter(|element| predicate(element)).collect()
    }

    /// Returns every element whose type is, or inherits from, one of
    /// `type_names`. Unknown type names match nothing.
    pub fn instances_of(&self, meta: &MetaRegistry, type_names: &[&str]) -> Vec<&Element> {
        let wanted: Vec<Id> = type_names.iter().map(|name| Id::new(name)).collect();
        self.find_all(|element| {
            wanted
                .iter()
                .any(|ancestor| meta.is_kind_of(element.type_name(), *ancestor))
        })
    }

    /// Returns the owned children of `id` in field declaration order, then
    /// position order. Children that are not registered are skipped.
    pub fn children_of(&self, meta: &MetaRegistry, id: Id) -> Vec<&Element> {
        let Some(element) = self.get(id) else {
            return Vec::new();
        };
        owned_ids(meta, element)
            .filter_map(|child| self.get(child))
            .collect()
    }

    /// Returns `root` followed by every registered descendant, depth first.
    pub fn subtree_ids(&self, meta: &MetaRegistry, root: Id) -> Vec<Id> {
        let mut ids = IndexSet::new();
        let mut pending = vec![root];
        while let Some(id) = pending.pop() {
            let Some(element) = self.get(id) else {
                continue;
            };
            if !ids.insert(id) {
                continue;
            }
            let children: Vec<Id> = owned_ids(meta, element).collect();
            pending.extend(children.into_iter().rev());
        }
        ids.into_iter().collect()
    }

    pub(crate) fn get_mut(&mut self, id: Id) -> Option<&mut Element> {
        self.elements.get_mut(&id)
    }

    /// Registers an element, replacing any element with the same id.
    pub(crate) fn insert(&mut self, element: Element) {
        self.elements.insert(element.id(), element);
    }

    /// Unregisters an element and returns it with its registration position.
    pub(crate) fn remove(&mut self, id: Id) -> Option<(usize, Element)> {
        self.elements
            .shift_remove_full(&id)
            .map(|(position, _, element)| (position, element))
    }

    /// Re-registers an element at the position it was removed from.
    pub(crate) fn restore(&mut self, position: usize, element: Element) {
        let position = position.min(self.elements.len());
        self.elements.shift_insert(position, element.id(), element);
    }

    pub(crate) fn clear(&mut self) {
        self.elements.clear();
    }
}

/// Iterates over the ids held by the owning (`obj`/`objs`) fields of
/// `element`.
pub fn owned_ids<'e>(meta: &'e MetaRegistry, element: &'e Element) -> impl Iterator<Item = Id> + 'e {
    meta.attributes(element.type_name())
        .unwrap_or_default()
        .iter()
        .filter(|attr| attr.kind().is_owning())
        .flat_map(move |attr| element.field_or_null(attr.name()).link_ids().iter().copied())
}

#[cfg(test)]
mod tests {
    use super::*;
    use armillary_core::{element::Value, schema::standard_schema};

    fn sample() -> (MetaRegistry, ObjectStore) {
        let meta = standard_schema().unwrap();
        let mut store = ObjectStore::new();
        store.insert(
            Element::new(Id::new("p"), Id::new("Project"))
                .with_field("name", Value::Str("Plant".into()))
                .with_field("ownedElements", Value::Objs(vec![Id::new("c1"), Id::new("c2")])),
        );
        store.insert(
            Element::new(Id::new("c1"), Id::new("Class"))
                .with_parent(Id::new("p"))
                .with_field("name", Value::Str("Box".into())),
        );
        store.insert(
            Element::new(Id::new("c2"), Id::new("Interface"))
                .with_parent(Id::new("p"))
                .with_field("name", Value::Str("Tank".into())),
        );
        (meta, store)
    }

    #[test]
    fn test_find() {
        let (_, store) = sample();

        let found = store.find(|element| element.name() == Some("Tank"));
        assert_eq!(found.map(Element::id), Some(Id::new("c2")));
        assert!(store.find(|element| element.name() == Some("Pump")).is_none());
        assert_eq!(store.find_all(|element| element.parent().is_some()).len(), 2);
    }

    #[test]
    fn test_instances_of_follows_inheritance() {
        let (meta, store) = sample();

        let models: Vec<Id> = store
            .instances_of(&meta, &["Model"])
            .into_iter()
            .map(Element::id)
            .collect();
        assert_eq!(models, vec![Id::new("p"), Id::new("c1"), Id::new("c2")]);

        let classes = store.instances_of(&meta, &["Class", "NoSuchType"]);
        assert_eq!(classes.len(), 1);
    }

    #[test]
    fn test_children_and_subtree() {
        let (meta, store) = sample();

        let children: Vec<Id> = store
            .children_of(&meta, Id::new("p"))
            .into_iter()
            .map(Element::id)
            .collect();
        assert_eq!(children, vec![Id::new("c1"), Id::new("c2")]);
        assert_eq!(
            store.subtree_ids(&meta, Id::new("p")),
            vec![Id::new("p"), Id::new("c1"), Id::new("c2")]
        );
        assert!(store.subtree_ids(&meta, Id::new("missing")).is_empty());
    }

    #[test]
    fn test_subtree_lists_shared_children_once() {
        let (meta, mut store) = sample();
        let c1 = store.get_mut(Id::new("c1")).unwrap();
        c1.set_field(
            Id::new("ownedElements"),
            Value::Objs(vec![Id::new("c2"), Id::new("c1")]),
        );

        assert_eq!(
            store.subtree_ids(&meta, Id::new("p")),
            vec![Id::new("p"), Id::new("c1"), Id::new("c2")]
        );
    }

    #[test]
    fn test_remove_and_restore_keeps_position() {
        let (_, mut store) = sample();

        let (position, element) = store.remove(Id::new("c1")).unwrap();
        assert_eq!(position, 1);
        assert!(!store.contains(Id::new("c1")));

        store.restore(position, element);
        let order: Vec<Id> = store.iter().map(Element::id).collect();
        assert_eq!(order, vec![Id::new("p"), Id::new("c1"), Id::new("c2")]);
    }
}
