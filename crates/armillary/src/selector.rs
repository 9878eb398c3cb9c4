//! Path queries over the live graph.
//!
//! A selector is a left-to-right pipeline of terms applied to a current
//! set of elements, starting with every registered element:
//!
//! | Term             | Effect                                              |
//! |------------------|-----------------------------------------------------|
//! | `::`             | replace each element by its owned children          |
//! | `@Type`          | keep instances of `Type` or its subtypes            |
//! | `.field`         | replace each element by the elements in `field`     |
//! | `[field=value]`  | keep elements whose `field` reads as `value`        |
//! | `name`           | keep elements whose `name` is exactly `name`        |
//!
//! ```
//! # use armillary::selector::Selector;
//! let selector: Selector = "Plant::@Class".parse().unwrap();
//! assert_eq!(selector.terms().len(), 3);
//! ```

mod lexer;

use std::{collections::HashSet, ops::Range, str::FromStr};

use thiserror::Error;

use armillary_core::{element::Element, identifier::Id, meta::MetaRegistry};

use crate::store::ObjectStore;

use lexer::RawTerm;

/// What is wrong with a selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SelectorErrorKind {
    #[error("`@` must be followed by a type name")]
    MissingType,

    #[error("`.` must be followed by a field name")]
    MissingField,

    #[error("filter is missing its closing `]`")]
    UnclosedFilter,

    #[error("filter must have the form `[field=value]`")]
    MalformedFilter,

    #[error("unexpected input")]
    UnexpectedInput,
}

/// A malformed selector, with the byte range of the offending term.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid selector: {kind}")]
pub struct SelectorError {
    kind: SelectorErrorKind,
    span: Range<usize>,
}

impl SelectorError {
    pub(crate) fn new(kind: SelectorErrorKind, span: Range<usize>) -> Self {
        Self { kind, span }
    }

    pub fn kind(&self) -> SelectorErrorKind {
        self.kind
    }

    /// Byte range of the offending term.
    pub fn span(&self) -> Range<usize> {
        self.span.clone()
    }

    /// A short hint on how to fix the selector.
    pub fn help(&self) -> &'static str {
        match self.kind {
            SelectorErrorKind::MissingType => "name a type, as in `@Class`",
            SelectorErrorKind::MissingField => "name a field, as in `.ownedElements`",
            SelectorErrorKind::UnclosedFilter => "close the filter, as in `[name=Box]`",
            SelectorErrorKind::MalformedFilter => "write the filter as `[field=value]`",
            SelectorErrorKind::UnexpectedInput => "check the selector syntax",
        }
    }
}

/// One step of a selector pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Children,
    InstanceOf(Id),
    Field(Id),
    Filter { field: Id, value: String },
    Name(String),
    /// A type or field name that was never interned. Matches nothing.
    Unknown(String),
}

/// A parsed selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    terms: Vec<Term>,
}

impl Selector {
    /// Parses a selector string.
    ///
    /// # Errors
    ///
    /// Returns [`SelectorError`] for an `@` or `.` with no name, or a
    /// bracket term that is not `[field=value]`.
    pub fn parse(source: &str) -> Result<Self, SelectorError> {
        let mut terms = Vec::new();
        for token in lexer::tokenize(source)? {
            let error = |kind| SelectorError::new(kind, token.span.clone());
            let term = match token.term {
                RawTerm::Children => Term::Children,
                RawTerm::Type(name) => match name.trim() {
                    "" => return Err(error(SelectorErrorKind::MissingType)),
                    name => Id::lookup(name).map_or_else(|| unknown(name), Term::InstanceOf),
                },
                RawTerm::Field(name) => match name.trim() {
                    "" => return Err(error(SelectorErrorKind::MissingField)),
                    name => Id::lookup(name).map_or_else(|| unknown(name), Term::Field),
                },
                RawTerm::Filter { closed: false, .. } => {
                    return Err(error(SelectorErrorKind::UnclosedFilter));
                }
                RawTerm::Filter { body, closed: true } => match body.split_once('=') {
                    Some((field, value)) if !field.trim().is_empty() => {
                        let field = field.trim();
                        match Id::lookup(field) {
                            Some(field) => Term::Filter {
                                field,
                                value: value.trim().to_owned(),
                            },
                            None => unknown(field),
                        }
                    }
                    _ => return Err(error(SelectorErrorKind::MalformedFilter)),
                },
                RawTerm::Name(name) => match name.trim() {
                    "" => continue,
                    name => Term::Name(name.to_owned()),
                },
            };
            terms.push(term);
        }
        Ok(Self { terms })
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// Runs the pipeline. Results are unique and keep first-seen order.
    pub fn evaluate<'s>(&self, store: &'s ObjectStore, meta: &MetaRegistry) -> Vec<&'s Element> {
        let mut current: Vec<&'s Element> = store.iter().collect();
        for term in &self.terms {
            let next: Vec<&'s Element> = match term {
                Term::Children => current
                    .iter()
                    .flat_map(|element| store.children_of(meta, element.id()))
                    .collect(),
                Term::InstanceOf(ty) => current
                    .into_iter()
                    .filter(|element| meta.is_kind_of(element.type_name(), *ty))
                    .collect(),
                Term::Field(field) => current
                    .iter()
                    .flat_map(|element| element.field_or_null(*field).link_ids())
                    .filter_map(|id| store.get(*id))
                    .collect(),
                Term::Filter { field, value } => current
                    .into_iter()
                    .filter(|element| {
                        element
                            .field(*field)
                            .is_some_and(|field_value| field_value.to_string() == *value)
                    })
                    .collect(),
                Term::Name(name) => current
                    .into_iter()
                    .filter(|element| element.name() == Some(name.as_str()))
                    .collect(),
                Term::Unknown(_) => Vec::new(),
            };
            current = unique(next);
        }
        current
    }
}

impl FromStr for Selector {
    type Err = SelectorError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        Self::parse(source)
    }
}

fn unknown(name: &str) -> Term {
    Term::Unknown(name.to_owned())
}

fn unique(elements: Vec<&Element>) -> Vec<&Element> {
    let mut seen = HashSet::new();
    elements
        .into_iter()
        .filter(|element| seen.insert(element.id()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use armillary_core::{element::Value, schema::standard_schema};

    fn store() -> ObjectStore {
        let mut store = ObjectStore::new();
        store.insert(
            Element::new(Id::new("p"), Id::new("Project"))
                .with_field("name", Value::Str("P".into()))
                .with_field("ownedElements", Value::Objs(vec![Id::new("a"), Id::new("b")])),
        );
        store.insert(
            Element::new(Id::new("a"), Id::new("Class"))
                .with_parent(Id::new("p"))
                .with_field("name", Value::Str("x".into()))
                .with_field("isAbstract", Value::Bool(true)),
        );
        store.insert(
            Element::new(Id::new("b"), Id::new("Interface"))
                .with_parent(Id::new("p"))
                .with_field("name", Value::Str("y".into())),
        );
        store
    }

    fn select(source: &str) -> Vec<Id> {
        let meta = standard_schema().unwrap();
        let store = store();
        Selector::parse(source)
            .unwrap()
            .evaluate(&store, &meta)
            .into_iter()
            .map(Element::id)
            .collect()
    }

    #[test]
    fn test_children_then_type() {
        assert_eq!(select("P::@Class"), vec![Id::new("a")]);
        assert_eq!(select("P::"), vec![Id::new("a"), Id::new("b")]);
    }

    #[test]
    fn test_bare_name() {
        assert_eq!(select("x"), vec![Id::new("a")]);
        assert!(select("nobody").is_empty());
    }

    #[test]
    fn test_type_filter_includes_subtypes() {
        assert_eq!(
            select("@Model"),
            vec![Id::new("p"), Id::new("a"), Id::new("b")]
        );
        assert!(select("@NoSuchType").is_empty());
    }

    #[test]
    fn test_field_projection() {
        assert_eq!(select("P.ownedElements"), vec![Id::new("a"), Id::new("b")]);
        assert!(select("P.name").is_empty());
    }

    #[test]
    fn test_value_filter() {
        assert_eq!(select("[isAbstract=true]"), vec![Id::new("a")]);
        assert_eq!(select("@Interface[name=y]"), vec![Id::new("b")]);
    }

    #[test]
    fn test_results_are_unique() {
        let meta = standard_schema().unwrap();
        let mut store = store();
        for id in ["d1", "d2"] {
            store.insert(
                Element::new(Id::new(id), Id::new("Dependency"))
                    .with_field("source", Value::Ref(Id::new("b")))
                    .with_field("target", Value::Ref(Id::new("a"))),
            );
        }

        let targets: Vec<Id> = Selector::parse("@Dependency.target")
            .unwrap()
            .evaluate(&store, &meta)
            .into_iter()
            .map(Element::id)
            .collect();
        assert_eq!(targets, vec![Id::new("a")]);
        assert_eq!(select("").len(), 3);
    }

    #[test]
    fn test_unknown_names_match_nothing() {
        let selector = Selector::parse("@NeverDeclaredType.neverDeclaredField").unwrap();
        assert_eq!(
            selector.terms(),
            [
                Term::Unknown("NeverDeclaredType".to_owned()),
                Term::Unknown("neverDeclaredField".to_owned()),
            ]
        );
        assert!(Id::lookup("NeverDeclaredType").is_none());
        assert!(select("[neverDeclaredFilter=1]").is_empty());
        assert!(Id::lookup("neverDeclaredFilter").is_none());
    }

    #[test]
    fn test_malformed_terms() {
        let err = Selector::parse("P::@").unwrap_err();
        assert_eq!(err.kind(), SelectorErrorKind::MissingType);
        assert_eq!(err.span(), 3..4);

        let err = Selector::parse("P.").unwrap_err();
        assert_eq!(err.kind(), SelectorErrorKind::MissingField);

        let err = Selector::parse("[name]").unwrap_err();
        assert_eq!(err.kind(), SelectorErrorKind::MalformedFilter);
        assert_eq!(err.span(), 0..6);

        let err = Selector::parse("P[name=x").unwrap_err();
        assert_eq!(err.kind(), SelectorErrorKind::UnclosedFilter);
        assert!(!err.help().is_empty());
    }
}
