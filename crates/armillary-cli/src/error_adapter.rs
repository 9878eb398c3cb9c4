//! Error adapter for converting ArmillaryError to miette diagnostics.
//!
//! This module provides the bridge between the library's standard error types
//! and miette's rich diagnostic formatting used in the CLI. Selector errors
//! are rendered against the query they were raised for, with the offending
//! term labelled.

use std::fmt;

use miette::{Diagnostic as MietteDiagnostic, LabeledSpan, SourceSpan};

use armillary::{ArmillaryError, selector::SelectorError};

/// Adapter for a malformed selector.
pub struct SelectorAdapter<'a> {
    /// The wrapped selector error
    err: &'a SelectorError,
    /// The query, for displaying the snippet
    query: &'a str,
}

impl<'a> SelectorAdapter<'a> {
    /// Create a new selector adapter.
    pub fn new(err: &'a SelectorError, query: &'a str) -> Self {
        Self { err, query }
    }
}

impl fmt::Debug for SelectorAdapter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectorAdapter")
            .field("err", &self.err)
            .finish()
    }
}

impl fmt::Display for SelectorAdapter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.err, f)
    }
}

impl std::error::Error for SelectorAdapter<'_> {}

impl MietteDiagnostic for SelectorAdapter<'_> {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new("armillary::selector"))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(self.err.help()))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&self.query as &dyn miette::SourceCode)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let span = SourceSpan::from(self.err.span());
        let message = Some(self.err.kind().to_string());
        Some(Box::new(std::iter::once(
            LabeledSpan::new_primary_with_span(message, span),
        )))
    }
}

/// Adapter for [`ArmillaryError`] variants without source information,
/// such as I/O, codec and operation errors.
pub struct ErrorAdapter<'a>(pub &'a ArmillaryError);

impl fmt::Debug for ErrorAdapter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for ErrorAdapter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for ErrorAdapter<'_> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl MietteDiagnostic for ErrorAdapter<'_> {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let code = match &self.0 {
            ArmillaryError::Io(_) => "armillary::io",
            ArmillaryError::Codec(_) => "armillary::codec",
            ArmillaryError::Selector { .. } => "armillary::selector",
            ArmillaryError::Meta(_) => "armillary::meta",
            ArmillaryError::NoDocument => "armillary::document",
            ArmillaryError::UnknownElement(_)
            | ArmillaryError::DuplicateId(_)
            | ArmillaryError::UnknownField { .. }
            | ArmillaryError::FieldKind { .. }
            | ArmillaryError::NotInField { .. }
            | ArmillaryError::OutOfBounds { .. }
            | ArmillaryError::NotApplied { .. } => "armillary::operation",
        };
        Some(Box::new(code))
    }
}

/// A reportable error that can be rendered by miette.
#[derive(Debug)]
pub enum Reportable<'a> {
    /// A selector error with the query as source.
    Selector(SelectorAdapter<'a>),
    /// A simple error without source location.
    Error(ErrorAdapter<'a>),
}

impl fmt::Display for Reportable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reportable::Selector(s) => fmt::Display::fmt(s, f),
            Reportable::Error(e) => fmt::Display::fmt(e, f),
        }
    }
}

impl std::error::Error for Reportable<'_> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Reportable::Selector(_) => None,
            Reportable::Error(e) => e.source(),
        }
    }
}

impl MietteDiagnostic for Reportable<'_> {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        match self {
            Reportable::Selector(s) => s.code(),
            Reportable::Error(e) => e.code(),
        }
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        match self {
            Reportable::Selector(s) => s.help(),
            Reportable::Error(e) => e.help(),
        }
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        match self {
            Reportable::Selector(s) => s.source_code(),
            Reportable::Error(e) => e.source_code(),
        }
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        match self {
            Reportable::Selector(s) => s.labels(),
            Reportable::Error(e) => e.labels(),
        }
    }
}

/// Convert an [`ArmillaryError`] into a reportable error.
pub fn to_reportable(err: &ArmillaryError) -> Reportable<'_> {
    match err {
        ArmillaryError::Selector { err, query } => {
            Reportable::Selector(SelectorAdapter::new(err, query))
        }
        _ => Reportable::Error(ErrorAdapter(err)),
    }
}
