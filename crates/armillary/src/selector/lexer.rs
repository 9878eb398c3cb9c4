//! Tokenizer for selector strings.
//!
//! A selector is split at `::`, `@`, `.` and `[`, each delimiter starting a
//! new term. A single `:` is ordinary text.

use std::ops::Range;

use winnow::{
    Parser as _,
    combinator::{alt, not, opt, preceded, repeat, terminated},
    error::{ContextError, ErrMode},
    token::take_till,
};

use super::{SelectorError, SelectorErrorKind};

type Input<'s> = &'s str;
type IResult<O> = Result<O, ErrMode<ContextError<&'static str>>>;

/// A term as written, before validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RawTerm<'s> {
    Children,
    Type(&'s str),
    Field(&'s str),
    Filter { body: &'s str, closed: bool },
    Name(&'s str),
}

/// A raw term with its byte span in the selector string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token<'s> {
    pub(crate) term: RawTerm<'s>,
    pub(crate) span: Range<usize>,
}

/// Text up to the next delimiter.
fn segment<'s>(input: &mut Input<'s>) -> IResult<&'s str> {
    repeat::<_, _, (), _, _>(
        0..,
        alt((
            take_till(1.., ['@', '.', '[', ':']).void(),
            terminated(':', not(':')).void(),
        )),
    )
    .take()
    .parse_next(input)
}

fn filter<'s>(input: &mut Input<'s>) -> IResult<RawTerm<'s>> {
    preceded('[', (take_till(0.., ']'), opt(']')))
        .map(|(body, close): (&'s str, Option<char>)| RawTerm::Filter {
            body,
            closed: close.is_some(),
        })
        .parse_next(input)
}

fn term<'s>(input: &mut Input<'s>) -> IResult<RawTerm<'s>> {
    alt((
        "::".value(RawTerm::Children),
        preceded('@', segment).map(RawTerm::Type),
        preceded('.', segment).map(RawTerm::Field),
        filter,
        segment.map(RawTerm::Name),
    ))
    .parse_next(input)
}

/// Splits `source` into raw terms.
///
/// # Errors
///
/// Fails only when no term can be read at some position, which cannot
/// happen for well-formed UTF-8; validation of term contents happens in
/// the caller.
pub(crate) fn tokenize(source: &str) -> Result<Vec<Token<'_>>, SelectorError> {
    let mut input = source;
    let mut tokens = Vec::new();

    while !input.is_empty() {
        let start = source.len() - input.len();
        let term = term(&mut input).map_err(|_| {
            SelectorError::new(SelectorErrorKind::UnexpectedInput, start..source.len())
        })?;
        let end = source.len() - input.len();
        if end == start {
            return Err(SelectorError::new(
                SelectorErrorKind::UnexpectedInput,
                start..source.len(),
            ));
        }
        tokens.push(Token {
            term,
            span: start..end,
        });
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(source: &str) -> Vec<RawTerm<'_>> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|token| token.term)
            .collect()
    }

    #[test]
    fn test_splits_on_delimiters() {
        assert_eq!(
            terms("Plant::@Class.ownedElements[name=Box]"),
            vec![
                RawTerm::Name("Plant"),
                RawTerm::Children,
                RawTerm::Type("Class"),
                RawTerm::Field("ownedElements"),
                RawTerm::Filter {
                    body: "name=Box",
                    closed: true
                },
            ]
        );
    }

    #[test]
    fn test_single_colon_is_text() {
        assert_eq!(terms("a:b::c"), vec![
            RawTerm::Name("a:b"),
            RawTerm::Children,
            RawTerm::Name("c"),
        ]);
    }

    #[test]
    fn test_spans() {
        let tokens = tokenize("P::@Foo").unwrap();
        let spans: Vec<Range<usize>> = tokens.into_iter().map(|token| token.span).collect();
        assert_eq!(spans, vec![0..1, 1..3, 3..7]);
    }

    #[test]
    fn test_empty_and_unclosed_terms() {
        assert_eq!(terms("@"), vec![RawTerm::Type("")]);
        assert_eq!(terms("x."), vec![RawTerm::Name("x"), RawTerm::Field("")]);
        assert_eq!(
            terms("[name=Box"),
            vec![RawTerm::Filter {
                body: "name=Box",
                closed: false
            }]
        );
    }
}
