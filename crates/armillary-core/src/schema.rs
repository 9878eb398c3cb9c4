//! The standard diagram schema.
//!
//! A compact vocabulary that covers what the repository itself needs to know
//! about: owned models, directed and undirected relationships, and the
//! node/edge/label views that render them on diagrams. Domain vocabularies
//! register their own subtypes on top of it.

use crate::meta::{AttrKind, MetaError, MetaRegistry, TypeDef};

/// Base of every element type.
pub const ELEMENT: &str = "Element";
/// Base of every semantic model type.
pub const MODEL: &str = "Model";
/// Base of every relationship type.
pub const RELATIONSHIP: &str = "Relationship";
/// Relationship with `source` and `target` references.
pub const DIRECTED_RELATIONSHIP: &str = "DirectedRelationship";
/// Relationship with two owned ends.
pub const UNDIRECTED_RELATIONSHIP: &str = "UndirectedRelationship";
/// Owned end of an undirected relationship.
pub const RELATIONSHIP_END: &str = "RelationshipEnd";
/// Base of every diagram view type.
pub const VIEW: &str = "View";
/// Boxed view.
pub const NODE_VIEW: &str = "NodeView";
/// Connector view with `head` and `tail`.
pub const EDGE_VIEW: &str = "EdgeView";
/// Text label attached to another view.
pub const LABEL_VIEW: &str = "LabelView";
/// Free-standing note view, rendered without a model.
pub const NOTE_VIEW: &str = "NoteView";
/// Diagram, owning its views.
pub const DIAGRAM: &str = "Diagram";

/// Field names shared by the repository and repair rules.
pub mod fields {
    pub const NAME: &str = "name";
    pub const OWNED_ELEMENTS: &str = "ownedElements";
    pub const SOURCE: &str = "source";
    pub const TARGET: &str = "target";
    pub const END1: &str = "end1";
    pub const END2: &str = "end2";
    pub const REFERENCE: &str = "reference";
    pub const MODEL: &str = "model";
    pub const HEAD: &str = "head";
    pub const TAIL: &str = "tail";
    pub const SUB_VIEWS: &str = "subViews";
    pub const OWNED_VIEWS: &str = "ownedViews";
}

/// Builds a registry containing the standard schema.
///
/// # Errors
///
/// Propagates [`MetaError`]; the standard schema itself registers cleanly,
/// so an error here means the table below was edited inconsistently.
pub fn standard_schema() -> Result<MetaRegistry, MetaError> {
    let mut registry = MetaRegistry::new();
    register_standard_types(&mut registry)?;
    Ok(registry)
}

/// Registers the standard schema into an existing registry.
pub fn register_standard_types(registry: &mut MetaRegistry) -> Result<(), MetaError> {
    use AttrKind::*;

    let types = [
        TypeDef::new(ELEMENT),
        TypeDef::new("Tag")
            .extends(ELEMENT)
            .attr("name", Prim, "String")
            .attr("kind", Enum, "TagKind")
            .attr("value", Prim, "String")
            .attr("reference", Ref, ELEMENT),
        TypeDef::new(MODEL)
            .extends(ELEMENT)
            .attr("name", Prim, "String")
            .attr("documentation", Prim, "String")
            .attr("tags", Objs, "Tag")
            .attr("ownedElements", Objs, MODEL),
        TypeDef::new("Project")
            .extends(MODEL)
            .attr("author", Prim, "String")
            .attr("version", Prim, "String"),
        TypeDef::new("Package").extends(MODEL),
        TypeDef::new("Class")
            .extends(MODEL)
            .attr("isAbstract", Prim, "Boolean")
            .attr("visibility", Enum, "Visibility"),
        TypeDef::new("Interface").extends(MODEL),
        TypeDef::new(RELATIONSHIP).extends(MODEL),
        TypeDef::new(DIRECTED_RELATIONSHIP)
            .extends(RELATIONSHIP)
            .attr("source", Ref, MODEL)
            .attr("target", Ref, MODEL),
        TypeDef::new("Dependency").extends(DIRECTED_RELATIONSHIP),
        TypeDef::new("Generalization").extends(DIRECTED_RELATIONSHIP),
        TypeDef::new(RELATIONSHIP_END)
            .extends(ELEMENT)
            .attr("name", Prim, "String")
            .attr("reference", Ref, MODEL)
            .attr("navigable", Enum, "Navigability")
            .attr("multiplicity", Prim, "String"),
        TypeDef::new(UNDIRECTED_RELATIONSHIP)
            .extends(RELATIONSHIP)
            .attr("end1", Obj, RELATIONSHIP_END)
            .attr("end2", Obj, RELATIONSHIP_END),
        TypeDef::new("Association").extends(UNDIRECTED_RELATIONSHIP),
        TypeDef::new(VIEW)
            .extends(ELEMENT)
            .attr("model", Ref, ELEMENT)
            .attr("subViews", Objs, VIEW)
            .attr("containerView", Ref, VIEW)
            .attr("containedViews", Refs, VIEW)
            .attr("visible", Prim, "Boolean")
            .attr("lineColor", Prim, "String")
            .attr("fillColor", Prim, "String")
            .attr("font", Custom, "Font")
            .attr("style", Var, "Object"),
        TypeDef::new(NODE_VIEW)
            .extends(VIEW)
            .attr("left", Prim, "Number")
            .attr("top", Prim, "Number")
            .attr("width", Prim, "Number")
            .attr("height", Prim, "Number"),
        TypeDef::new(EDGE_VIEW)
            .extends(VIEW)
            .attr("head", Ref, VIEW)
            .attr("tail", Ref, VIEW)
            .attr("points", Custom, "Points")
            .attr("lineStyle", Enum, "LineStyle"),
        TypeDef::new(LABEL_VIEW)
            .extends(NODE_VIEW)
            .attr("text", Prim, "String"),
        TypeDef::new(NOTE_VIEW)
            .extends(NODE_VIEW)
            .attr("text", Prim, "String"),
        TypeDef::new("ClassView").extends(NODE_VIEW),
        TypeDef::new("DependencyView").extends(EDGE_VIEW),
        TypeDef::new("GeneralizationView").extends(EDGE_VIEW),
        TypeDef::new("AssociationView").extends(EDGE_VIEW),
        TypeDef::new(DIAGRAM)
            .extends(MODEL)
            .attr("visible", Prim, "Boolean")
            .attr("defaultDiagram", Prim, "Boolean")
            .attr("ownedViews", Objs, VIEW),
        TypeDef::new("ClassDiagram").extends(DIAGRAM),
    ];

    for def in types {
        registry.register(def)?;
    }
    Ok(())
}
