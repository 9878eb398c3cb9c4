//! Graph nodes and their field values.
//!
//! An [`Element`] owns its scalar values directly. Owned children and
//! non-owning references are both stored as ids; the meta-model decides
//! which is which. The `parent` back-reference is a plain id as well, so the
//! graph has no ownership cycles: the store owns every element, and elements
//! only name each other.

use std::fmt;

use indexmap::IndexMap;

use crate::{custom::CustomValue, identifier::Id};

/// Value of a single field.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Inline value of a `var` field.
    Json(serde_json::Value),
    Custom(CustomValue),
    Ref(Id),
    Refs(Vec<Id>),
    Obj(Id),
    Objs(Vec<Id>),
}

impl Value {
    /// Returns the ids of the elements this value points at, in position
    /// order. Scalars yield nothing.
    pub fn link_ids(&self) -> &[Id] {
        match self {
            Self::Ref(id) | Self::Obj(id) => std::slice::from_ref(id),
            Self::Refs(ids) | Self::Objs(ids) => ids,
            Self::Null
            | Self::Bool(_)
            | Self::Int(_)
            | Self::Float(_)
            | Self::Str(_)
            | Self::Json(_)
            | Self::Custom(_) => &[],
        }
    }

    /// Returns the single id of a `Ref`/`Obj` value.
    pub fn as_id(&self) -> Option<Id> {
        match self {
            Self::Ref(id) | Self::Obj(id) => Some(*id),
            _ => None,
        }
    }

    /// Returns the string of a `Str` value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(text) => Some(text),
            _ => None,
        }
    }

    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Mutable access to the id list of a `Refs`/`Objs` value.
    pub fn ids_mut(&mut self) -> Option<&mut Vec<Id>> {
        match self {
            Self::Refs(ids) | Self::Objs(ids) => Some(ids),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    /// Plain textual form, used by selector value filters.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Str(text) => f.write_str(text),
            Self::Json(json) => write!(f, "{json}"),
            Self::Custom(custom) => write!(f, "{custom}"),
            Self::Ref(id) | Self::Obj(id) => write!(f, "{id}"),
            Self::Refs(ids) | Self::Objs(ids) => {
                let joined = ids
                    .iter()
                    .map(Id::as_string)
                    .collect::<Vec<_>>()
                    .join(",");
                f.write_str(&joined)
            }
        }
    }
}

/// A node of the model graph: a model, a relationship or a diagram view.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    id: Id,
    type_name: Id,
    parent: Option<Id>,
    fields: IndexMap<Id, Value>,
}

impl Element {
    /// Creates an element with no parent and no fields.
    pub fn new(id: Id, type_name: Id) -> Self {
        Self {
            id,
            type_name,
            parent: None,
            fields: IndexMap::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, name: impl Into<Id>, value: Value) -> Self {
        self.set_field(name.into(), value);
        self
    }

    /// Builder-style parent setter.
    pub fn with_parent(mut self, parent: Id) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn type_name(&self) -> Id {
        self.type_name
    }

    /// Owning element, if any.
    pub fn parent(&self) -> Option<Id> {
        self.parent
    }

    pub fn set_parent(&mut self, parent: Option<Id>) {
        self.parent = parent;
    }

    /// Returns a field value; unset fields read as `None`.
    pub fn field(&self, name: Id) -> Option<&Value> {
        self.fields.get(&name)
    }

    /// Returns a field value, treating unset fields as [`Value::Null`].
    pub fn field_or_null(&self, name: Id) -> &Value {
        static NULL: Value = Value::Null;
        self.fields.get(&name).unwrap_or(&NULL)
    }

    pub fn field_mut(&mut self, name: Id) -> Option<&mut Value> {
        self.fields.get_mut(&name)
    }

    /// Replaces a field value and returns the previous one.
    ///
    /// Assigning [`Value::Null`] unsets the field, so a null field and a
    /// missing one are indistinguishable.
    pub fn set_field(&mut self, name: Id, value: Value) -> Option<Value> {
        if value.is_null() {
            self.fields.shift_remove(&name)
        } else {
            self.fields.insert(name, value)
        }
    }

    /// The element's `name` field, when it is a string.
    pub fn name(&self) -> Option<&str> {
        self.field(Id::new("name")).and_then(Value::as_str)
    }

    /// Iterates over all set fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (Id, &Value)> {
        self.fields.iter().map(|(name, value)| (*name, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_ids() {
        let a = Id::new("a");
        let b = Id::new("b");

        assert_eq!(Value::Ref(a).link_ids(), &[a]);
        assert_eq!(Value::Objs(vec![a, b, a]).link_ids(), &[a, b, a]);
        assert!(Value::Str("a".into()).link_ids().is_empty());
        assert!(Value::Null.link_ids().is_empty());
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Str("Box".into()).to_string(), "Box");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(Value::Int(7).to_string(), "7");
        assert_eq!(Value::Ref(Id::new("v1")).to_string(), "v1");
        assert_eq!(
            Value::Refs(vec![Id::new("v1"), Id::new("v2")]).to_string(),
            "v1,v2"
        );
    }

    #[test]
    fn test_element_fields() {
        let mut element = Element::new(Id::new("e1"), Id::new("Class"))
            .with_field("name", Value::Str("Box".into()));

        assert_eq!(element.name(), Some("Box"));
        assert!(element.field_or_null(Id::new("missing")).is_null());

        let previous = element.set_field(Id::new("name"), Value::Str("Tank".into()));
        assert_eq!(previous, Some(Value::Str("Box".into())));
        assert_eq!(element.name(), Some("Tank"));

        element.set_field(Id::new("name"), Value::Null);
        assert!(element.field(Id::new("name")).is_none());
        assert_eq!(element.fields().count(), 0);
    }

    #[test]
    fn test_ids_mut() {
        let mut value = Value::Refs(vec![Id::new("a")]);
        value.ids_mut().unwrap().push(Id::new("b"));
        assert_eq!(value.link_ids().len(), 2);
        assert!(Value::Int(1).ids_mut().is_none());
    }
}
