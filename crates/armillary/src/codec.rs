//! JSON encoding of elements and subtrees.
//!
//! A subtree encodes as a nested JSON object. Every element object carries
//! `_type` and `_id`; the subtree root may also carry `_parent`. Owned
//! children (`obj`/`objs` fields) are nested inline, non-owning references
//! are written as `{"$ref": "<id>"}`:
//!
//! ```json
//! { "_type": "Project", "_id": "p", "name": "Plant",
//!   "ownedElements": [
//!     { "_type": "Class", "_id": "c1", "name": "Box" },
//!     { "_type": "Dependency", "_id": "d1",
//!       "source": { "$ref": "c1" }, "target": { "$ref": "c1" } } ] }
//! ```
//!
//! Decoding is driven by the meta-model: the attribute kind decides how a
//! value is read, so the same document shape works for every registered
//! type. Collection fields (`refs`/`objs`) always decode to a list, empty
//! when absent.

use indexmap::IndexMap;
use log::{debug, trace};
use serde_json::{Map, Value as Json};
use thiserror::Error;

use armillary_core::{
    custom::{CustomCodecError, CustomValue},
    element::{Element, Value},
    identifier::{Id, IdGenerator},
    meta::{AttrKind, MetaAttribute, MetaRegistry},
};

const TYPE_KEY: &str = "_type";
const ID_KEY: &str = "_id";
const PARENT_KEY: &str = "_parent";
const REF_KEY: &str = "$ref";

/// Errors raised while converting between JSON and elements.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a JSON object for an element, found `{0}`")]
    NotAnObject(String),

    #[error("element object has no `_type`")]
    MissingType,

    #[error("unknown element type `{0}`")]
    UnknownType(Id),

    #[error("`{0}` is not a valid element id")]
    InvalidId(String),

    #[error("duplicate element id `{0}` in encoding")]
    DuplicateId(Id),

    #[error("field `{field}` of `{ty}` expects {expected}, found `{found}`")]
    InvalidField {
        ty: Id,
        field: Id,
        expected: &'static str,
        found: String,
    },

    #[error("field `{field}` of `{ty}`: {source}")]
    Custom {
        ty: Id,
        field: Id,
        #[source]
        source: CustomCodecError,
    },

    #[error("owned child `{0}` is not available for encoding")]
    MissingChild(Id),
}

/// Elements decoded from one encoding, in pre-order.
#[derive(Debug, Clone)]
pub struct Decoded {
    root: Id,
    elements: IndexMap<Id, Element>,
}

impl Decoded {
    /// Id of the subtree root.
    pub fn root(&self) -> Id {
        self.root
    }

    pub fn elements(&self) -> &IndexMap<Id, Element> {
        &self.elements
    }

    pub(crate) fn elements_mut(&mut self) -> &mut IndexMap<Id, Element> {
        &mut self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn into_elements(self) -> impl Iterator<Item = Element> {
        self.elements.into_values()
    }
}

/// Meta-model driven JSON codec.
#[derive(Debug, Clone, Copy)]
pub struct Codec<'m> {
    meta: &'m MetaRegistry,
}

impl<'m> Codec<'m> {
    pub fn new(meta: &'m MetaRegistry) -> Self {
        Self { meta }
    }

    /// Decodes a subtree encoding into detached elements.
    ///
    /// Elements without `_id` receive a fresh id from `ids`. The root takes
    /// its parent from `_parent` when present.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] if an object is malformed, names an unknown
    /// type, repeats an id or holds a value its attribute kind rejects.
    pub fn decode(&self, json: &Json, ids: &mut dyn IdGenerator) -> Result<Decoded, CodecError> {
        let parent = match json.get(PARENT_KEY) {
            None | Some(Json::Null) => None,
            Some(reference) => Some(read_reference(reference).ok_or_else(|| {
                CodecError::InvalidId(reference.to_string())
            })?),
        };

        let mut elements = IndexMap::new();
        let root = self.decode_element(json, parent, &mut elements, ids)?;
        trace!(root:% = root, elements = elements.len(); "Decoded subtree");
        Ok(Decoded { root, elements })
    }

    fn decode_element(
        &self,
        json: &Json,
        parent: Option<Id>,
        out: &mut IndexMap<Id, Element>,
        ids: &mut dyn IdGenerator,
    ) -> Result<Id, CodecError> {
        let object = json
            .as_object()
            .ok_or_else(|| CodecError::NotAnObject(json.to_string()))?;
        let type_name = object
            .get(TYPE_KEY)
            .and_then(Json::as_str)
            .map(Id::new)
            .ok_or(CodecError::MissingType)?;
        let attributes = self
            .meta
            .attributes(type_name)
            .ok_or(CodecError::UnknownType(type_name))?;

        let id = match object.get(ID_KEY) {
            Some(Json::String(text)) if !text.is_empty() => Id::new(text),
            None | Some(Json::Null) => {
                let id = ids.generate();
                trace!(id:% = id, type_name:% = type_name; "Assigned generated id");
                id
            }
            Some(other) => return Err(CodecError::InvalidId(other.to_string())),
        };
        if out.contains_key(&id) {
            return Err(CodecError::DuplicateId(id));
        }
        // Reserve the slot so that parents precede their children.
        out.insert(id, Element::new(id, type_name));

        let mut element = Element::new(id, type_name);
        element.set_parent(parent);
        for attr in attributes {
            let key = attr.name().as_string();
            let value = match attr.kind() {
                AttrKind::Obj => match object.get(&key) {
                    None | Some(Json::Null) => Value::Null,
                    Some(child) => Value::Obj(self.decode_element(child, Some(id), out, ids)?),
                },
                AttrKind::Objs => match object.get(&key) {
                    None | Some(Json::Null) => Value::Objs(Vec::new()),
                    Some(Json::Array(items)) => {
                        let mut children = Vec::with_capacity(items.len());
                        for item in items {
                            children.push(self.decode_element(item, Some(id), out, ids)?);
                        }
                        Value::Objs(children)
                    }
                    Some(other) => {
                        return Err(CodecError::InvalidField {
                            ty: type_name,
                            field: attr.name(),
                            expected: "an array of element objects",
                            found: other.to_string(),
                        });
                    }
                },
                AttrKind::Prim
                | AttrKind::Enum
                | AttrKind::Var
                | AttrKind::Custom
                | AttrKind::Ref
                | AttrKind::Refs => {
                    self.decode_value(type_name, attr, object.get(&key).unwrap_or(&Json::Null))?
                }
            };
            element.set_field(attr.name(), value);
        }

        for key in object.keys() {
            let known = Id::lookup(key).and_then(|field| self.meta.attribute(type_name, field));
            if !key.starts_with('_') && known.is_none() {
                debug!(type_name:% = type_name, field = key.as_str(); "Ignoring unknown field");
            }
        }

        out.insert(id, element);
        Ok(id)
    }

    /// Decodes a single field value of an element of type `ty`.
    ///
    /// Link-kinded values are read as references (`{"$ref": id}` or a bare
    /// id string); owned children are not decoded inline here.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] if the JSON shape does not fit the attribute
    /// kind.
    pub fn decode_value(&self, ty: Id, attr: &MetaAttribute, json: &Json) -> Result<Value, CodecError> {
        let invalid = |expected: &'static str| CodecError::InvalidField {
            ty,
            field: attr.name(),
            expected,
            found: json.to_string(),
        };

        let value = match (attr.kind(), json) {
            (AttrKind::Refs, Json::Null) => Value::Refs(Vec::new()),
            (AttrKind::Objs, Json::Null) => Value::Objs(Vec::new()),
            (_, Json::Null) => Value::Null,
            (AttrKind::Ref, reference) => {
                Value::Ref(read_reference(reference).ok_or_else(|| invalid("a reference"))?)
            }
            (AttrKind::Obj, reference) => {
                Value::Obj(read_reference(reference).ok_or_else(|| invalid("a reference"))?)
            }
            (AttrKind::Refs | AttrKind::Objs, Json::Array(items)) => {
                let ids = items
                    .iter()
                    .map(read_reference)
                    .collect::<Option<Vec<Id>>>()
                    .ok_or_else(|| invalid("an array of references"))?;
                if attr.kind() == AttrKind::Refs {
                    Value::Refs(ids)
                } else {
                    Value::Objs(ids)
                }
            }
            (AttrKind::Refs | AttrKind::Objs, _) => return Err(invalid("an array of references")),
            (AttrKind::Prim | AttrKind::Enum, Json::Bool(flag)) => Value::Bool(*flag),
            (AttrKind::Prim | AttrKind::Enum, Json::Number(number)) => number
                .as_i64()
                .map(Value::Int)
                .or_else(|| number.as_f64().map(Value::Float))
                .unwrap_or_else(|| Value::Json(json.clone())),
            (AttrKind::Prim | AttrKind::Enum, Json::String(text)) => Value::Str(text.clone()),
            (AttrKind::Prim | AttrKind::Enum | AttrKind::Var, other) => Value::Json(other.clone()),
            (AttrKind::Custom, other) => CustomValue::decode(attr.type_name(), other)
                .map(Value::Custom)
                .map_err(|source| CodecError::Custom {
                    ty,
                    field: attr.name(),
                    source,
                })?,
        };
        Ok(value)
    }

    /// Encodes the subtree rooted at `root`, including its `_parent`.
    ///
    /// `lookup` resolves owned children by id.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::MissingChild`] if an owned child cannot be
    /// resolved.
    pub fn encode<'e>(
        &self,
        root: &'e Element,
        lookup: impl Fn(Id) -> Option<&'e Element>,
    ) -> Result<Json, CodecError> {
        self.encode_element(root, &lookup, true)
    }

    fn encode_element<'e>(
        &self,
        element: &'e Element,
        lookup: &dyn Fn(Id) -> Option<&'e Element>,
        include_parent: bool,
    ) -> Result<Json, CodecError> {
        let mut object = Map::new();
        object.insert(TYPE_KEY.to_owned(), Json::String(element.type_name().as_string()));
        object.insert(ID_KEY.to_owned(), Json::String(element.id().as_string()));
        if let Some(parent) = element.parent().filter(|_| include_parent) {
            object.insert(PARENT_KEY.to_owned(), reference(parent));
        }

        let attributes = self
            .meta
            .attributes(element.type_name())
            .ok_or(CodecError::UnknownType(element.type_name()))?;
        for attr in attributes {
            let Some(value) = element.field(attr.name()) else {
                continue;
            };
            let json = match attr.kind() {
                AttrKind::Obj | AttrKind::Objs => {
                    let mut children = Vec::with_capacity(value.link_ids().len());
                    for child in value.link_ids() {
                        let child = lookup(*child).ok_or(CodecError::MissingChild(*child))?;
                        children.push(self.encode_element(child, lookup, false)?);
                    }
                    if attr.kind() == AttrKind::Obj {
                        children.pop().unwrap_or(Json::Null)
                    } else {
                        Json::Array(children)
                    }
                }
                AttrKind::Prim
                | AttrKind::Enum
                | AttrKind::Var
                | AttrKind::Custom
                | AttrKind::Ref
                | AttrKind::Refs => self.encode_value(value),
            };
            object.insert(attr.name().as_string(), json);
        }
        Ok(Json::Object(object))
    }

    /// Encodes a single field value. Links are written as references.
    pub fn encode_value(&self, value: &Value) -> Json {
        match value {
            Value::Null => Json::Null,
            Value::Bool(flag) => Json::Bool(*flag),
            Value::Int(number) => Json::from(*number),
            Value::Float(number) => serde_json::Number::from_f64(*number)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::Str(text) => Json::String(text.clone()),
            Value::Json(json) => json.clone(),
            Value::Custom(custom) => custom.encode(),
            Value::Ref(id) | Value::Obj(id) => reference(*id),
            Value::Refs(ids) | Value::Objs(ids) => {
                Json::Array(ids.iter().map(|id| reference(*id)).collect())
            }
        }
    }
}

/// Reads the `_id` of an element encoding.
pub fn encoded_id(json: &Json) -> Option<Id> {
    json.get(ID_KEY).and_then(Json::as_str).map(Id::new)
}

/// Writes `_id` and `_parent` onto the root of an element encoding.
///
/// # Errors
///
/// Returns [`CodecError::NotAnObject`] if `json` is not an object.
pub fn set_identity(json: &mut Json, id: Id, parent: Id) -> Result<(), CodecError> {
    let Json::Object(object) = json else {
        return Err(CodecError::NotAnObject(json.to_string()));
    };
    object.insert(ID_KEY.to_owned(), Json::String(id.as_string()));
    object.insert(PARENT_KEY.to_owned(), reference(parent));
    Ok(())
}

/// Builds a `{"$ref": id}` object.
pub fn reference(id: Id) -> Json {
    let mut object = Map::new();
    object.insert(REF_KEY.to_owned(), Json::String(id.as_string()));
    Json::Object(object)
}

/// Accepts `{"$ref": id}` or a bare id string.
fn read_reference(json: &Json) -> Option<Id> {
    match json {
        Json::String(text) => Some(Id::new(text)),
        Json::Object(object) => object.get(REF_KEY).and_then(Json::as_str).map(Id::new),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use armillary_core::{
        custom::{Font, Point, Points},
        identifier::SequentialIdGenerator,
        schema::standard_schema,
    };
    use serde_json::json;

    fn project() -> Json {
        json!({
            "_type": "Project", "_id": "p", "name": "Plant",
            "ownedElements": [
                { "_type": "Class", "_id": "c1", "name": "Box", "isAbstract": false },
                { "_type": "Dependency", "_id": "d1", "name": "uses",
                  "source": { "$ref": "c1" }, "target": { "$ref": "c1" } }
            ]
        })
    }

    #[test]
    fn test_decode_document() {
        let meta = standard_schema().unwrap();
        let mut ids = SequentialIdGenerator::with_prefix("gen-");
        let decoded = Codec::new(&meta).decode(&project(), &mut ids).unwrap();

        assert_eq!(decoded.root(), Id::new("p"));
        let order: Vec<Id> = decoded.elements().keys().copied().collect();
        assert_eq!(order, vec![Id::new("p"), Id::new("c1"), Id::new("d1")]);

        let class = &decoded.elements()[&Id::new("c1")];
        assert_eq!(class.parent(), Some(Id::new("p")));
        assert_eq!(class.field(Id::new("isAbstract")), Some(&Value::Bool(false)));
        assert_eq!(
            class.field(Id::new("ownedElements")),
            Some(&Value::Objs(Vec::new()))
        );

        let dependency = &decoded.elements()[&Id::new("d1")];
        assert_eq!(dependency.field(Id::new("source")), Some(&Value::Ref(Id::new("c1"))));
    }

    #[test]
    fn test_round_trip_preserves_document() {
        let meta = standard_schema().unwrap();
        let codec = Codec::new(&meta);
        let decoded = codec
            .decode(&project(), &mut SequentialIdGenerator::default())
            .unwrap();
        let root = &decoded.elements()[&decoded.root()];

        let encoded = codec
            .encode(root, |id| decoded.elements().get(&id))
            .unwrap();

        // Collection fields materialise as empty lists.
        let mut expected = project();
        expected["tags"] = json!([]);
        for child in expected["ownedElements"].as_array_mut().unwrap() {
            child["tags"] = json!([]);
            child["ownedElements"] = json!([]);
        }
        assert_eq!(encoded, expected);
    }

    #[test]
    fn test_missing_ids_are_generated() {
        let meta = standard_schema().unwrap();
        let mut ids = SequentialIdGenerator::with_prefix("gen-");
        let decoded = Codec::new(&meta)
            .decode(
                &json!({ "_type": "Package", "name": "pkg",
                         "ownedElements": [{ "_type": "Class", "name": "Box" }] }),
                &mut ids,
            )
            .unwrap();

        assert_eq!(decoded.root(), Id::new("gen-0"));
        assert!(decoded.elements().contains_key(&Id::new("gen-1")));
    }

    #[test]
    fn test_parent_of_subtree_root() {
        let meta = standard_schema().unwrap();
        let decoded = Codec::new(&meta)
            .decode(
                &json!({ "_type": "Class", "_id": "c9", "_parent": { "$ref": "p" } }),
                &mut SequentialIdGenerator::default(),
            )
            .unwrap();

        assert_eq!(decoded.elements()[&Id::new("c9")].parent(), Some(Id::new("p")));
    }

    #[test]
    fn test_decode_errors() {
        let meta = standard_schema().unwrap();
        let codec = Codec::new(&meta);
        let mut ids = SequentialIdGenerator::default();

        assert!(matches!(
            codec.decode(&json!({ "_id": "x" }), &mut ids),
            Err(CodecError::MissingType)
        ));
        assert!(matches!(
            codec.decode(&json!({ "_type": "Widget" }), &mut ids),
            Err(CodecError::UnknownType(_))
        ));
        assert!(matches!(
            codec.decode(
                &json!({ "_type": "Package", "_id": "a",
                         "ownedElements": [{ "_type": "Class", "_id": "a" }] }),
                &mut ids
            ),
            Err(CodecError::DuplicateId(_))
        ));
        assert!(matches!(
            codec.decode(&json!({ "_type": "Dependency", "source": 42 }), &mut ids),
            Err(CodecError::InvalidField { .. })
        ));
        assert!(matches!(
            codec.decode(&json!({ "_type": "EdgeView", "points": "1:2;x" }), &mut ids),
            Err(CodecError::Custom { .. })
        ));
    }

    #[test]
    fn test_custom_values() {
        let meta = standard_schema().unwrap();
        let codec = Codec::new(&meta);
        let decoded = codec
            .decode(
                &json!({ "_type": "EdgeView", "_id": "e",
                         "points": "0:0;10:20", "font": "Arial;13;1" }),
                &mut SequentialIdGenerator::default(),
            )
            .unwrap();
        let edge = &decoded.elements()[&Id::new("e")];

        assert_eq!(
            edge.field(Id::new("points")),
            Some(&Value::Custom(CustomValue::Points(Points::new(vec![
                Point::new(0.0, 0.0),
                Point::new(10.0, 20.0),
            ]))))
        );
        assert_eq!(
            edge.field(Id::new("font")),
            Some(&Value::Custom(CustomValue::Font(Font::new("Arial", 13.0, Font::BOLD))))
        );

        let encoded = codec.encode(edge, |_| None).unwrap();
        assert_eq!(encoded["points"], "0:0;10:20");
        assert_eq!(encoded["font"], "Arial;13;1");
    }

    #[test]
    fn test_encode_value_links() {
        let meta = standard_schema().unwrap();
        let codec = Codec::new(&meta);

        assert_eq!(
            codec.encode_value(&Value::Refs(vec![Id::new("a"), Id::new("b")])),
            json!([{ "$ref": "a" }, { "$ref": "b" }])
        );
        assert_eq!(codec.encode_value(&Value::Float(1.5)), json!(1.5));
        assert_eq!(encoded_id(&json!({ "_id": "x" })), Some(Id::new("x")));
    }
}
