//! Parse-error diagnostics.
//!
//! Runtime failures are in-language Exception objects and never appear here;
//! this type only covers the reader layer, where a malformed input is
//! reported to the host with a line number and the evaluator is not entered.

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

#[derive(Debug, Clone, Error, Diagnostic)]
#[error("ParseError: {message} (at line {line})")]
#[diagnostic(code(mallow::syntax))]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    #[source_code]
    src: NamedSource<String>,
    #[label("{message}")]
    span: SourceSpan,
}

impl ParseError {
    pub(crate) fn new(
        message: impl Into<String>,
        source: &str,
        offset: usize,
        line: usize,
    ) -> Self {
        let start = offset.min(source.len());
        let end = (start + 1).min(source.len());
        ParseError {
            message: message.into(),
            line,
            src: NamedSource::new("input", source.to_string()),
            span: (start..end).into(),
        }
    }
}

/// Render a parse diagnostic to stderr with full miette formatting.
pub fn report(err: &ParseError) {
    eprintln!("{:?}", miette::Report::new(err.clone()));
}
