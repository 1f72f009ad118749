use thiserror::Error;

/// A single parse diagnostic with the byte offset it was raised at.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (at offset {position})")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, position: usize) -> Self {
        ParseError {
            message: message.into(),
            position,
        }
    }
}

/// Errors accumulated over a parse. The first error is usually the most
/// useful one; later entries are often knock-on effects.
#[derive(Debug, Clone, Default)]
pub struct ParseErrors {
    errors: Vec<ParseError>,
}

impl ParseErrors {
    pub fn record(&mut self, message: impl Into<String>, position: usize) {
        self.errors.push(ParseError::new(message, position));
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn first(&self) -> Option<&ParseError> {
        self.errors.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParseError> {
        self.errors.iter()
    }

    /// Single-line summary used for the query object's error message.
    pub fn summary(&self) -> String {
        match self.errors.first() {
            Some(error) => error.to_string(),
            None => String::new(),
        }
    }
}
