//! The repository: the live graph together with its history.

use std::fmt;

use log::{debug, info, warn};
use serde_json::Value as Json;

use armillary_core::{
    element::Element,
    identifier::{Id, IdGenerator, SequentialIdGenerator},
    meta::{AttrKind, MetaRegistry},
    schema::{self, fields},
};

use crate::{
    codec::{self, Codec, CodecError},
    config::RepositoryConfig,
    engine::{ChangeSet, Direction, Engine},
    error::ArmillaryError,
    events::{Event, EventBus, ListenerResult, NotificationFailure, SubscriptionId},
    history::BoundedStack,
    index::{ReferenceIndex, outgoing_links},
    operation::Operation,
    repair::{RepairReport, RepairRule, Repairer},
    selector::Selector,
    store::ObjectStore,
};

/// Owns the elements of one document, the index of references between them
/// and the undo and redo history of the operations applied to them.
///
/// Every mutation goes through [`Repository::do_operation`] (or one of the
/// bypass helpers built on it), [`Repository::undo`] or
/// [`Repository::redo`].
pub struct Repository {
    config: RepositoryConfig,
    meta: MetaRegistry,
    store: ObjectStore,
    index: ReferenceIndex,
    undo_stack: BoundedStack<Operation>,
    redo_stack: BoundedStack<Operation>,
    events: EventBus,
    repairer: Repairer,
    ids: Box<dyn IdGenerator>,
    document: Option<Id>,
    modified: bool,
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("config", &self.config)
            .field("elements", &self.store.len())
            .field("undo_depth", &self.undo_stack.len())
            .field("redo_depth", &self.redo_stack.len())
            .field("events", &self.events)
            .field("repairer", &self.repairer)
            .field("document", &self.document)
            .field("modified", &self.modified)
            .finish()
    }
}

impl Repository {
    /// Creates an empty repository over `meta`.
    pub fn new(meta: MetaRegistry, config: RepositoryConfig) -> Self {
        let capacity = config.history_capacity();
        let repairer = Repairer::standard(&config);
        Self {
            config,
            meta,
            store: ObjectStore::new(),
            index: ReferenceIndex::new(),
            undo_stack: BoundedStack::new(capacity),
            redo_stack: BoundedStack::new(capacity),
            events: EventBus::new(),
            repairer,
            ids: Box::new(SequentialIdGenerator::default()),
            document: None,
            modified: false,
        }
    }

    /// Creates an empty repository over the standard diagram schema.
    ///
    /// # Errors
    ///
    /// Returns [`ArmillaryError::Meta`] if the schema fails to register.
    pub fn with_standard_schema(config: RepositoryConfig) -> Result<Self, ArmillaryError> {
        Ok(Self::new(schema::standard_schema()?, config))
    }

    /// Replaces the source of ids for elements encoded without one.
    pub fn with_id_generator(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Box::new(ids);
        self
    }

    pub fn meta(&self) -> &MetaRegistry {
        &self.meta
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Applies `op` and records it for undo.
    ///
    /// An operation without atomic ops does nothing. A bypass operation is
    /// applied but never recorded, leaves the redo stack alone and fires
    /// only [`Event::BeforeExecuteOperation`].
    ///
    /// # Errors
    ///
    /// Returns [`ArmillaryError`] if any atomic op fails. The graph, the
    /// index and the history are then exactly as they were before the call.
    pub fn do_operation(&mut self, mut op: Operation) -> Result<(), ArmillaryError> {
        if op.is_empty() {
            return Ok(());
        }

        self.events.emit(&Event::BeforeExecuteOperation(&op));
        debug!(op = op.name(), atomic_ops = op.len(), bypass = op.is_bypass(); "Applying operation");
        let changes = self.engine().execute(&mut op, Direction::Apply)?;
        if op.is_bypass() {
            return Ok(());
        }

        self.redo_stack.clear();
        self.notify(&changes, false);
        self.modified = true;
        self.events.emit(&Event::OperationExecuted(&op));
        self.undo_stack.push(op);
        Ok(())
    }

    /// Reverts the most recent operation.
    ///
    /// Returns the undone operation, now on top of the redo stack, or
    /// `None` if there was nothing to undo.
    ///
    /// # Errors
    ///
    /// Returns [`ArmillaryError`] if the revert fails; the operation stays
    /// on the undo stack.
    pub fn undo(&mut self) -> Result<Option<&Operation>, ArmillaryError> {
        let Some(mut op) = self.undo_stack.pop() else {
            return Ok(None);
        };
        debug!(op = op.name(), atomic_ops = op.len(); "Undoing operation");
        let changes = match self.engine().execute(&mut op, Direction::Revert) {
            Ok(changes) => changes,
            Err(err) => {
                self.undo_stack.push(op);
                return Err(err);
            }
        };

        self.notify(&changes, true);
        self.modified = true;
        self.events.emit(&Event::Undo(&op));
        self.events.emit(&Event::OperationExecuted(&op));
        self.redo_stack.push(op);
        Ok(self.redo_stack.peek())
    }

    /// Reapplies the most recently undone operation.
    ///
    /// Returns the redone operation, now on top of the undo stack, or `None`
    /// if there was nothing to redo.
    ///
    /// # Errors
    ///
    /// Returns [`ArmillaryError`] if the reapply fails; the operation stays
    /// on the redo stack.
    pub fn redo(&mut self) -> Result<Option<&Operation>, ArmillaryError> {
        let Some(mut op) = self.redo_stack.pop() else {
            return Ok(None);
        };
        debug!(op = op.name(), atomic_ops = op.len(); "Redoing operation");
        let changes = match self.engine().execute(&mut op, Direction::Apply) {
            Ok(changes) => changes,
            Err(err) => {
                self.redo_stack.push(op);
                return Err(err);
            }
        };

        self.notify(&changes, true);
        self.modified = true;
        self.events.emit(&Event::Redo(&op));
        self.events.emit(&Event::OperationExecuted(&op));
        self.undo_stack.push(op);
        Ok(self.undo_stack.peek())
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    /// Drops every element, the index, both stacks and the modified flag.
    ///
    /// Listeners and repair rules stay registered.
    pub fn clear(&mut self) {
        self.store.clear();
        self.index.clear();
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.document = None;
        self.modified = false;
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn set_modified(&mut self, modified: bool) {
        self.modified = modified;
    }

    // ===================
    // Queries
    // ===================

    pub fn get(&self, id: Id) -> Option<&Element> {
        self.store.get(id)
    }

    pub fn find(&self, predicate: impl Fn(&Element) -> bool) -> Option<&Element> {
        self.store.find(predicate)
    }

    pub fn find_all(&self, predicate: impl Fn(&Element) -> bool) -> Vec<&Element> {
        self.store.find_all(predicate)
    }

    /// Elements that are instances of any of `type_names` or their subtypes.
    pub fn instances_of(&self, type_names: &[&str]) -> Vec<&Element> {
        self.store.instances_of(&self.meta, type_names)
    }

    /// Returns `true` if `id` is registered.
    pub fn is_element(&self, id: Id) -> bool {
        self.store.contains(id)
    }

    /// Registered elements in insertion order.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.store.iter()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Id of the root of the loaded document, if any.
    pub fn document(&self) -> Option<Id> {
        self.document
    }

    /// Registered elements that hold a link to `id`.
    pub fn get_refs_to(&self, id: Id) -> Vec<&Element> {
        self.refs_to(id, |_| true)
    }

    /// Registered elements that hold a link to `id` and satisfy `predicate`.
    pub fn refs_to(&self, id: Id, predicate: impl Fn(&Element) -> bool) -> Vec<&Element> {
        self.index
            .referrers(id)
            .filter_map(|referrer| self.store.get(referrer))
            .filter(|element| predicate(element))
            .collect()
    }

    /// Number of links from `referrer` to `referee`.
    pub fn count_of(&self, referrer: Id, referee: Id) -> usize {
        self.index.count(referrer, referee)
    }

    /// Relationships attached to `id`: directed ones through `source` or
    /// `target`, undirected ones through the `reference` of either end.
    pub fn relationships_of(&self, id: Id) -> Vec<&Element> {
        let mut relationships: Vec<&Element> = Vec::new();
        for referrer in self.get_refs_to(id) {
            let relationship = if self.is_kind_of(referrer, schema::DIRECTED_RELATIONSHIP) {
                Some(referrer)
            } else if self.is_kind_of(referrer, schema::RELATIONSHIP_END)
                && referrer.field(Id::new(fields::REFERENCE)).and_then(|v| v.as_id()) == Some(id)
            {
                referrer
                    .parent()
                    .and_then(|parent| self.store.get(parent))
                    .filter(|parent| self.is_kind_of(parent, schema::RELATIONSHIP))
            } else {
                None
            };
            if let Some(relationship) = relationship {
                if !relationships.iter().any(|seen| seen.id() == relationship.id()) {
                    relationships.push(relationship);
                }
            }
        }
        relationships
    }

    /// Views whose `model` is `id`.
    pub fn views_of(&self, id: Id) -> Vec<&Element> {
        let model = Id::new(fields::MODEL);
        self.refs_to(id, |element| {
            self.is_kind_of(element, schema::VIEW)
                && element.field(model).and_then(|v| v.as_id()) == Some(id)
        })
    }

    /// Edge views whose `head` or `tail` is the view `id`.
    pub fn edge_views_of(&self, id: Id) -> Vec<&Element> {
        let (head, tail) = (Id::new(fields::HEAD), Id::new(fields::TAIL));
        self.refs_to(id, |element| {
            self.is_kind_of(element, schema::EDGE_VIEW)
                && [head, tail]
                    .into_iter()
                    .any(|end| element.field(end).and_then(|v| v.as_id()) == Some(id))
        })
    }

    /// The field of its parent that owns `id`.
    pub fn parent_field(&self, id: Id) -> Option<Id> {
        let parent = self.store.get(id)?.parent()?;
        let parent = self.store.get(parent)?;
        self.meta
            .attributes(parent.type_name())?
            .iter()
            .filter(|attr| attr.kind().is_owning())
            .map(|attr| attr.name())
            .find(|field| parent.field_or_null(*field).link_ids().contains(&id))
    }

    /// Owned children of `id` in field order.
    pub fn children_of(&self, id: Id) -> Vec<&Element> {
        self.store.children_of(&self.meta, id)
    }

    /// Evaluates a selector against the live graph.
    ///
    /// # Errors
    ///
    /// Returns [`ArmillaryError::Selector`] if `query` is malformed.
    pub fn select(&self, query: &str) -> Result<Vec<&Element>, ArmillaryError> {
        let selector = Selector::parse(query)
            .map_err(|err| ArmillaryError::new_selector_error(err, query))?;
        Ok(selector.evaluate(&self.store, &self.meta))
    }

    fn is_kind_of(&self, element: &Element, type_name: &str) -> bool {
        self.meta
            .is_kind_of(element.type_name(), Id::new(type_name))
    }

    // ===================
    // Bypass helpers
    // ===================

    /// Inserts the subtree `encoding` into `field` of `parent` without
    /// recording history. Returns the id of the inserted root.
    ///
    /// For an `obj` field the current child, if any, is removed.
    ///
    /// # Errors
    ///
    /// Returns [`ArmillaryError`] if `parent` is unknown, `field` is not an
    /// owning field of it, or the insertion fails.
    pub fn bypass_insert(
        &mut self,
        parent: Id,
        field: impl Into<Id>,
        mut encoding: Json,
    ) -> Result<Id, ArmillaryError> {
        let field = field.into();
        let target = self
            .store
            .get(parent)
            .ok_or(ArmillaryError::UnknownElement(parent))?;
        let attr = self
            .meta
            .attribute(target.type_name(), field)
            .ok_or(ArmillaryError::UnknownField {
                ty: target.type_name(),
                field,
            })?;

        let root = match codec::encoded_id(&encoding) {
            Some(root) => root,
            None => self.ids.generate(),
        };
        codec::set_identity(&mut encoding, root, parent)?;

        let mut op = Operation::new("bypass insert");
        match attr.kind() {
            AttrKind::Objs => {
                op.insert(encoding).field_insert(parent, field, root, None);
            }
            AttrKind::Obj => {
                let current = target.field_or_null(field).as_id();
                if let Some(current) = current.filter(|child| self.store.contains(*child)) {
                    op.remove(self.encode(current)?);
                }
                let old = current.map(codec::reference).unwrap_or(Json::Null);
                op.insert(encoding)
                    .field_assign(parent, field, old, codec::reference(root));
            }
            kind => {
                return Err(ArmillaryError::FieldKind {
                    target: parent,
                    field,
                    kind,
                    expected: "an `obj` or `objs` field",
                });
            }
        }

        self.do_operation(op.bypass())?;
        Ok(root)
    }

    /// Assigns `value` to `field` of `id` without recording history.
    ///
    /// # Errors
    ///
    /// Returns [`ArmillaryError`] if the element or field is unknown or
    /// `value` does not fit the field.
    pub fn bypass_field_assign(
        &mut self,
        id: Id,
        field: impl Into<Id>,
        value: Json,
    ) -> Result<(), ArmillaryError> {
        let field = field.into();
        let old = {
            let element = self
                .store
                .get(id)
                .ok_or(ArmillaryError::UnknownElement(id))?;
            Codec::new(&self.meta).encode_value(element.field_or_null(field))
        };

        let mut op = Operation::new("bypass field assign");
        op.field_assign(id, field, old, value);
        self.do_operation(op.bypass())
    }

    // ===================
    // Documents
    // ===================

    /// Replaces the contents of the repository with a decoded document.
    ///
    /// The document is repaired before registration unless repair is
    /// disabled in the configuration. History is cleared and the document
    /// is marked unmodified.
    ///
    /// # Errors
    ///
    /// Returns [`ArmillaryError::Codec`] if the document cannot be decoded;
    /// the repository is then left untouched.
    pub fn load(&mut self, document: &Json) -> Result<RepairReport, ArmillaryError> {
        let mut decoded = Codec::new(&self.meta).decode(document, &mut *self.ids)?;
        let report = if self.config.repair_on_load() {
            self.repairer.run(&self.meta, &mut decoded)
        } else {
            RepairReport::default()
        };

        self.clear();
        let root = decoded.root();
        for element in decoded.into_elements() {
            self.index.add_refs_of(&self.meta, &element);
            self.store.insert(element);
        }
        self.document = Some(root);

        for element in self.store.iter() {
            for referee in outgoing_links(&self.meta, element) {
                if !self.store.contains(referee) {
                    warn!(referrer:% = element.id(), referee:% = referee; "Dangling reference in document");
                }
            }
        }
        info!(
            root:% = root,
            elements = self.store.len(),
            repaired = report.len();
            "Document loaded"
        );
        Ok(report)
    }

    /// Parses and loads a JSON document.
    ///
    /// # Errors
    ///
    /// See [`Repository::load`].
    pub fn load_str(&mut self, text: &str) -> Result<RepairReport, ArmillaryError> {
        let document: Json = serde_json::from_str(text).map_err(CodecError::from)?;
        self.load(&document)
    }

    /// Encodes the subtree rooted at `id`.
    ///
    /// # Errors
    ///
    /// Returns [`ArmillaryError::UnknownElement`] if `id` is not registered.
    pub fn encode(&self, id: Id) -> Result<Json, ArmillaryError> {
        let root = self
            .store
            .get(id)
            .ok_or(ArmillaryError::UnknownElement(id))?;
        Ok(Codec::new(&self.meta).encode(root, |child| self.store.get(child))?)
    }

    /// Serializes the loaded document as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ArmillaryError::NoDocument`] if nothing is loaded, or an
    /// encoding error.
    pub fn save(&self) -> Result<String, ArmillaryError> {
        let root = self.document.ok_or(ArmillaryError::NoDocument)?;
        let json = self.encode(root)?;
        let text = serde_json::to_string_pretty(&json).map_err(CodecError::from)?;
        info!(root:% = root, elements = self.store.len(); "Document saved");
        Ok(text)
    }

    // ===================
    // Events and repair
    // ===================

    /// Registers a listener for repository events.
    pub fn subscribe(
        &mut self,
        listener: impl FnMut(&Event<'_>) -> ListenerResult + 'static,
    ) -> SubscriptionId {
        self.events.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Drains the failures reported by listeners since the last call.
    pub fn take_notification_failures(&mut self) -> Vec<NotificationFailure> {
        self.events.take_failures()
    }

    /// Adds a rule to the load-time repair pass.
    pub fn add_repair_rule(&mut self, rule: impl RepairRule + 'static) {
        self.repairer.add_rule(Box::new(rule));
    }

    fn engine(&mut self) -> Engine<'_> {
        Engine::new(&self.meta, &mut self.store, &mut self.index, &mut *self.ids)
    }

    /// Fires the change events of one run. `always` fires them even when
    /// empty.
    fn notify(&mut self, changes: &ChangeSet, always: bool) {
        let created: Vec<Element> = changes
            .created
            .iter()
            .filter_map(|id| self.store.get(*id))
            .cloned()
            .collect();
        let updated: Vec<Element> = changes
            .updated
            .iter()
            .filter(|id| !changes.created.contains(*id))
            .filter_map(|id| self.store.get(*id))
            .cloned()
            .collect();

        if always || !created.is_empty() {
            self.events.emit(&Event::Created(&created));
        }
        if always || !changes.deleted.is_empty() {
            self.events.emit(&Event::Deleted(&changes.deleted));
        }
        if always || !updated.is_empty() {
            self.events.emit(&Event::Updated(&updated));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn repository() -> Repository {
        let mut repo = Repository::with_standard_schema(RepositoryConfig::default()).unwrap();
        repo.load(&json!({
            "_type": "Project", "_id": "p",
            "ownedElements": [{ "_type": "Class", "_id": "a", "name": "A" }]
        }))
        .unwrap();
        repo
    }

    #[test]
    fn test_undo_and_redo_on_empty_stacks() {
        let mut repo = repository();
        assert!(repo.undo().unwrap().is_none());
        assert!(repo.redo().unwrap().is_none());
        assert!(!repo.is_modified());
    }

    #[test]
    fn test_undo_returns_the_undone_operation() {
        let mut repo = repository();
        let mut op = Operation::new("rename a");
        op.field_assign(Id::new("a"), "name", json!("A"), json!("B"));
        repo.do_operation(op).unwrap();

        let undone = repo.undo().unwrap().map(Operation::name).map(str::to_owned);
        assert_eq!(undone.as_deref(), Some("rename a"));
    }

    #[test]
    fn test_modified_flag() {
        let mut repo = repository();
        let mut op = Operation::new("rename");
        op.field_assign(Id::new("a"), "name", json!("A"), json!("B"));
        repo.do_operation(op).unwrap();
        assert!(repo.is_modified());

        repo.set_modified(false);
        repo.undo().unwrap();
        assert!(repo.is_modified());
    }

    #[test]
    fn test_unsubscribed_listener_is_silent() {
        let mut repo = repository();
        let subscription = repo.subscribe(|_| Err("always fails".into()));
        assert!(repo.unsubscribe(subscription));
        assert!(!repo.unsubscribe(subscription));

        let mut op = Operation::new("rename");
        op.field_assign(Id::new("a"), "name", json!("A"), json!("B"));
        repo.do_operation(op).unwrap();
        assert!(repo.take_notification_failures().is_empty());
    }

    #[test]
    fn test_added_repair_rule_runs_on_load() {
        struct DropClasses;

        impl RepairRule for DropClasses {
            fn name(&self) -> &'static str {
                "drop-classes"
            }

            fn needs_repair(&self, element: &Element, graph: &crate::repair::RepairGraph<'_>) -> bool {
                graph.is_kind_of(element, "Class")
            }
        }

        let mut repo = Repository::with_standard_schema(RepositoryConfig::default()).unwrap();
        repo.add_repair_rule(DropClasses);
        let report = repo
            .load(&json!({
                "_type": "Project", "_id": "p",
                "ownedElements": [{ "_type": "Class", "_id": "a" }]
            }))
            .unwrap();

        assert_eq!(report.count_of("drop-classes"), 1);
        assert!(!repo.is_element(Id::new("a")));
    }
}
