//! Load-time consistency repair.
//!
//! Documents written by older tools, or damaged by hand edits, can hold
//! views of deleted models, relationships whose ends are gone and similar
//! leftovers. After a full document decode and before registration, a
//! [`Repairer`] runs a list of [`RepairRule`]s over the decoded elements
//! and fixes what they flag. Passes repeat until no rule fires, so damage
//! that only appears after a first fix (a relationship removed leaves its
//! views without a model) is cleaned up as well.
//!
//! The root of the document is never repaired.

use std::fmt;

use indexmap::IndexMap;
use log::{info, trace, warn};

use armillary_core::{
    element::{Element, Value},
    identifier::Id,
    meta::MetaRegistry,
    schema::{self, fields},
};

use crate::{codec::Decoded, config::RepositoryConfig, store::owned_ids};

/// Mutable view of a decoded document handed to repair rules.
pub struct RepairGraph<'a> {
    meta: &'a MetaRegistry,
    elements: &'a mut IndexMap<Id, Element>,
}

impl<'a> RepairGraph<'a> {
    pub fn new(meta: &'a MetaRegistry, elements: &'a mut IndexMap<Id, Element>) -> Self {
        Self { meta, elements }
    }

    pub fn meta(&self) -> &MetaRegistry {
        self.meta
    }

    pub fn get(&self, id: Id) -> Option<&Element> {
        self.elements.get(&id)
    }

    /// Returns `true` if `id` names an element of the document.
    pub fn resolves(&self, id: Id) -> bool {
        self.elements.contains_key(&id)
    }

    /// Returns `true` if `element` is an instance of `type_name` or a
    /// subtype.
    pub fn is_kind_of(&self, element: &Element, type_name: &str) -> bool {
        self.meta.is_kind_of(element.type_name(), Id::new(type_name))
    }

    /// Returns `true` if the single-link `field` of `element` is set and
    /// points at an element of the document.
    pub fn link_resolves(&self, element: &Element, field: &str) -> bool {
        element
            .field(Id::new(field))
            .and_then(Value::as_id)
            .is_some_and(|id| self.resolves(id))
    }

    /// Assigns a field in place.
    pub fn set_field(&mut self, id: Id, field: Id, value: Value) {
        if let Some(element) = self.elements.get_mut(&id) {
            element.set_field(field, value);
        }
    }

    /// Removes `id` with all of its owned descendants and unlinks it from
    /// its parent. Returns the number of elements removed.
    pub fn remove_subtree(&mut self, id: Id) -> usize {
        let Some(element) = self.elements.get(&id) else {
            return 0;
        };
        if let Some(parent) = element.parent() {
            self.unlink_child(parent, id);
        }

        let mut removed = 0;
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            if let Some(element) = self.elements.shift_remove(&next) {
                pending.extend(owned_ids(self.meta, &element));
                removed += 1;
            }
        }
        removed
    }

    fn unlink_child(&mut self, parent: Id, child: Id) {
        let Some(element) = self.elements.get_mut(&parent) else {
            return;
        };
        let owning: Vec<Id> = self
            .meta
            .attributes(element.type_name())
            .unwrap_or_default()
            .iter()
            .filter(|attr| attr.kind().is_owning())
            .map(|attr| attr.name())
            .collect();
        for field in owning {
            if element.field(field).and_then(Value::as_id) == Some(child) {
                element.set_field(field, Value::Null);
            } else if let Some(ids) = element.field_mut(field).and_then(Value::ids_mut) {
                ids.retain(|id| *id != child);
            }
        }
    }
}

/// A `(predicate, fixup)` pair applied to every decoded element.
pub trait RepairRule {
    /// Short rule name, used in reports and logs.
    fn name(&self) -> &'static str;

    /// Returns `true` if `element` is damaged in the way this rule fixes.
    fn needs_repair(&self, element: &Element, graph: &RepairGraph<'_>) -> bool;

    /// Fixes the element. The default removes its subtree.
    fn repair(&self, id: Id, graph: &mut RepairGraph<'_>) {
        graph.remove_subtree(id);
    }
}

/// A view whose `model` does not resolve. View types that are rendered
/// without a model, such as notes, are exempt.
#[derive(Debug, Clone)]
pub struct ModelLessViewRule {
    exempt: Vec<String>,
}

impl ModelLessViewRule {
    pub fn new(exempt: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            exempt: exempt.into_iter().map(Into::into).collect(),
        }
    }
}

impl RepairRule for ModelLessViewRule {
    fn name(&self) -> &'static str {
        "model-less-view"
    }

    fn needs_repair(&self, element: &Element, graph: &RepairGraph<'_>) -> bool {
        graph.is_kind_of(element, schema::VIEW)
            && !self
                .exempt
                .iter()
                .any(|exempt| graph.is_kind_of(element, exempt))
            && !graph.link_resolves(element, fields::MODEL)
    }
}

/// A view that is not owned by anything in the document.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParentlessViewRule;

impl RepairRule for ParentlessViewRule {
    fn name(&self) -> &'static str {
        "parentless-view"
    }

    fn needs_repair(&self, element: &Element, graph: &RepairGraph<'_>) -> bool {
        graph.is_kind_of(element, schema::VIEW)
            && !element.parent().is_some_and(|parent| graph.resolves(parent))
    }
}

/// An edge view with a missing `head` or `tail`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedEdgeViewRule;

impl RepairRule for DetachedEdgeViewRule {
    fn name(&self) -> &'static str {
        "detached-edge-view"
    }

    fn needs_repair(&self, element: &Element, graph: &RepairGraph<'_>) -> bool {
        graph.is_kind_of(element, schema::EDGE_VIEW)
            && !(graph.link_resolves(element, fields::HEAD)
                && graph.link_resolves(element, fields::TAIL))
    }
}

/// A directed relationship whose `source` or `target` does not resolve.
#[derive(Debug, Clone, Copy, Default)]
pub struct DanglingDirectedRelationshipRule;

impl RepairRule for DanglingDirectedRelationshipRule {
    fn name(&self) -> &'static str {
        "dangling-directed-relationship"
    }

    fn needs_repair(&self, element: &Element, graph: &RepairGraph<'_>) -> bool {
        graph.is_kind_of(element, schema::DIRECTED_RELATIONSHIP)
            && !(graph.link_resolves(element, fields::SOURCE)
                && graph.link_resolves(element, fields::TARGET))
    }
}

/// An undirected relationship with a missing end, or an end whose
/// `reference` does not resolve.
#[derive(Debug, Clone, Copy, Default)]
pub struct DanglingUndirectedRelationshipRule;

impl RepairRule for DanglingUndirectedRelationshipRule {
    fn name(&self) -> &'static str {
        "dangling-undirected-relationship"
    }

    fn needs_repair(&self, element: &Element, graph: &RepairGraph<'_>) -> bool {
        if !graph.is_kind_of(element, schema::UNDIRECTED_RELATIONSHIP) {
            return false;
        }
        [fields::END1, fields::END2].iter().any(|end| {
            let end = element
                .field(Id::new(end))
                .and_then(Value::as_id)
                .and_then(|id| graph.get(id));
            !end.is_some_and(|end| graph.link_resolves(end, fields::REFERENCE))
        })
    }
}

/// A label view hosted by something other than a view.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrphanLabelRule;

impl RepairRule for OrphanLabelRule {
    fn name(&self) -> &'static str {
        "orphan-label"
    }

    fn needs_repair(&self, element: &Element, graph: &RepairGraph<'_>) -> bool {
        graph.is_kind_of(element, schema::LABEL_VIEW)
            && element
                .parent()
                .and_then(|parent| graph.get(parent))
                .is_some_and(|parent| !graph.is_kind_of(parent, schema::VIEW))
    }
}

/// One applied fix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairFix {
    pub rule: &'static str,
    pub id: Id,
}

/// Every fix applied by one [`Repairer::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    fixes: Vec<RepairFix>,
}

impl RepairReport {
    pub fn fixes(&self) -> &[RepairFix] {
        &self.fixes
    }

    pub fn len(&self) -> usize {
        self.fixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixes.is_empty()
    }

    /// Number of fixes made by the named rule.
    pub fn count_of(&self, rule: &str) -> usize {
        self.fixes.iter().filter(|fix| fix.rule == rule).count()
    }
}

/// Ordered list of repair rules.
#[derive(Default)]
pub struct Repairer {
    rules: Vec<Box<dyn RepairRule>>,
}

impl fmt::Debug for Repairer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.rules.iter().map(|rule| rule.name()))
            .finish()
    }
}

impl Repairer {
    /// Creates a repairer with no rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a repairer with the standard rule set.
    pub fn standard(config: &RepositoryConfig) -> Self {
        Self::new()
            .with_rule(ModelLessViewRule::new(config.model_less_views().iter().cloned()))
            .with_rule(ParentlessViewRule)
            .with_rule(DetachedEdgeViewRule)
            .with_rule(DanglingDirectedRelationshipRule)
            .with_rule(DanglingUndirectedRelationshipRule)
            .with_rule(OrphanLabelRule)
    }

    pub fn with_rule(mut self, rule: impl RepairRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn add_rule(&mut self, rule: Box<dyn RepairRule>) {
        self.rules.push(rule);
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Repairs a decoded document in place.
    pub fn run(&self, meta: &MetaRegistry, decoded: &mut Decoded) -> RepairReport {
        let root = decoded.root();
        let mut graph = RepairGraph::new(meta, decoded.elements_mut());
        let mut report = RepairReport::default();

        // A rule that never converges is bounded by the document size.
        let max_passes = graph.elements.len() + 1;
        for pass in 0..max_passes {
            let mut fired = false;
            let ids: Vec<Id> = graph.elements.keys().copied().collect();
            for id in ids {
                if id == root {
                    continue;
                }
                for rule in &self.rules {
                    let Some(element) = graph.get(id) else {
                        break;
                    };
                    if !rule.needs_repair(element, &graph) {
                        continue;
                    }
                    trace!(rule = rule.name(), id:% = id, pass = pass; "Repairing element");
                    rule.repair(id, &mut graph);
                    report.fixes.push(RepairFix {
                        rule: rule.name(),
                        id,
                    });
                    fired = true;
                }
            }
            if !fired {
                if !report.is_empty() {
                    info!(fixes = report.len(), passes = pass + 1; "Repaired document");
                }
                return report;
            }
        }

        warn!(fixes = report.len(); "Repair stopped before reaching a fixpoint");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Codec;
    use armillary_core::{identifier::SequentialIdGenerator, schema::standard_schema};
    use serde_json::json;

    fn decode(meta: &MetaRegistry, document: serde_json::Value) -> Decoded {
        Codec::new(meta)
            .decode(&document, &mut SequentialIdGenerator::default())
            .unwrap()
    }

    fn document() -> serde_json::Value {
        json!({
            "_type": "Project", "_id": "p",
            "ownedElements": [
                { "_type": "Class", "_id": "a", "name": "A" },
                { "_type": "Class", "_id": "b", "name": "B" },
                { "_type": "Dependency", "_id": "ok",
                  "source": { "$ref": "a" }, "target": { "$ref": "b" } },
                { "_type": "Dependency", "_id": "broken",
                  "source": { "$ref": "a" }, "target": { "$ref": "gone" } },
                { "_type": "ClassDiagram", "_id": "dg", "ownedViews": [
                    { "_type": "ClassView", "_id": "va", "model": { "$ref": "a" },
                      "subViews": [{ "_type": "LabelView", "_id": "la", "text": "A" }] },
                    { "_type": "ClassView", "_id": "vb", "model": { "$ref": "b" } },
                    { "_type": "DependencyView", "_id": "vok", "model": { "$ref": "ok" },
                      "head": { "$ref": "vb" }, "tail": { "$ref": "va" } },
                    { "_type": "DependencyView", "_id": "vbroken",
                      "model": { "$ref": "broken" },
                      "head": { "$ref": "vb" }, "tail": { "$ref": "va" } },
                    { "_type": "NoteView", "_id": "note", "text": "hello" },
                    { "_type": "LabelView", "_id": "stray", "text": "?" }
                ]}
            ]
        })
    }

    #[test]
    fn test_standard_rules_cascade() {
        let meta = standard_schema().unwrap();
        let mut decoded = decode(&meta, document());

        let report = Repairer::standard(&RepositoryConfig::default()).run(&meta, &mut decoded);

        let remaining = decoded.elements();
        assert!(!remaining.contains_key(&Id::new("broken")));
        assert!(!remaining.contains_key(&Id::new("vbroken")));
        assert!(!remaining.contains_key(&Id::new("stray")));
        for kept in ["p", "a", "b", "ok", "dg", "va", "la", "vb", "vok", "note"] {
            assert!(remaining.contains_key(&Id::new(kept)), "{kept} was removed");
        }

        assert_eq!(report.count_of("dangling-directed-relationship"), 1);
        assert_eq!(report.count_of("model-less-view"), 1);
        assert_eq!(report.count_of("orphan-label"), 1);

        let owned_views = remaining[&Id::new("dg")].field_or_null(Id::new("ownedViews"));
        assert_eq!(owned_views.link_ids().len(), 4);
    }

    #[test]
    fn test_repair_is_idempotent() {
        let meta = standard_schema().unwrap();
        let repairer = Repairer::standard(&RepositoryConfig::default());
        let mut decoded = decode(&meta, document());

        repairer.run(&meta, &mut decoded);
        let once: Vec<Id> = decoded.elements().keys().copied().collect();
        let second = repairer.run(&meta, &mut decoded);

        assert!(second.is_empty());
        assert_eq!(decoded.elements().keys().copied().collect::<Vec<_>>(), once);
    }

    #[test]
    fn test_undirected_relationship_ends() {
        let meta = standard_schema().unwrap();
        let mut decoded = decode(
            &meta,
            json!({
                "_type": "Project", "_id": "p",
                "ownedElements": [
                    { "_type": "Class", "_id": "a" },
                    { "_type": "Association", "_id": "good",
                      "end1": { "_type": "RelationshipEnd", "_id": "g1", "reference": { "$ref": "a" } },
                      "end2": { "_type": "RelationshipEnd", "_id": "g2", "reference": { "$ref": "a" } } },
                    { "_type": "Association", "_id": "bad",
                      "end1": { "_type": "RelationshipEnd", "_id": "b1", "reference": { "$ref": "a" } },
                      "end2": { "_type": "RelationshipEnd", "_id": "b2", "reference": { "$ref": "x" } } }
                ]
            }),
        );

        let report = Repairer::standard(&RepositoryConfig::default()).run(&meta, &mut decoded);

        assert_eq!(report.len(), 1);
        assert!(decoded.elements().contains_key(&Id::new("good")));
        assert!(!decoded.elements().contains_key(&Id::new("bad")));
        assert!(!decoded.elements().contains_key(&Id::new("b1")));
    }

    struct RenameUnnamed;

    impl RepairRule for RenameUnnamed {
        fn name(&self) -> &'static str {
            "rename-unnamed"
        }

        fn needs_repair(&self, element: &Element, graph: &RepairGraph<'_>) -> bool {
            graph.is_kind_of(element, "Class") && element.name().is_none()
        }

        fn repair(&self, id: Id, graph: &mut RepairGraph<'_>) {
            graph.set_field(id, Id::new("name"), Value::Str("Unnamed".into()));
        }
    }

    #[test]
    fn test_custom_rule_patches_in_place() {
        let meta = standard_schema().unwrap();
        let mut decoded = decode(
            &meta,
            json!({ "_type": "Project", "_id": "p",
                    "ownedElements": [{ "_type": "Class", "_id": "c" }] }),
        );

        let report = Repairer::new().with_rule(RenameUnnamed).run(&meta, &mut decoded);

        assert_eq!(report.len(), 1);
        assert_eq!(decoded.elements()[&Id::new("c")].name(), Some("Unnamed"));
    }

    #[test]
    fn test_root_is_never_repaired() {
        let meta = standard_schema().unwrap();
        let mut decoded = decode(&meta, json!({ "_type": "ClassView", "_id": "v" }));

        let report = Repairer::standard(&RepositoryConfig::default()).run(&meta, &mut decoded);

        assert!(report.is_empty());
        assert_eq!(decoded.len(), 1);
    }
}
