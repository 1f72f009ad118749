//! Error codes raised during compilation and evaluation.
//!
//! Codes follow the W3C XPath/XQuery error taxonomy, extended with a few
//! engine-specific conditions (stack depth, callback termination).

use strum::EnumMessage;
use strum_macros::{Display, EnumMessage};

pub type Result<T> = std::result::Result<T, Error>;

/// An error code plus an optional detail message.
#[derive(Debug, Clone, PartialEq)]
pub struct Error {
    pub code: ErrorCode,
    pub message: Option<String>,
}

impl Error {
    pub fn new(code: ErrorCode) -> Self {
        Error {
            code,
            message: None,
        }
    }

    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Error {
            code,
            message: Some(message.into()),
        }
    }

    /// Single-line, human-readable form used for the query object's error
    /// message field.
    pub fn display_message(&self) -> String {
        match &self.message {
            Some(message) => format!("{}: {message}", self.code),
            None => match self.code.get_documentation() {
                Some(documentation) => format!("{}: {}", self.code, documentation),
                None => self.code.to_string(),
            },
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display_message())
    }
}

impl std::error::Error for Error {}

impl From<ErrorCode> for Error {
    fn from(code: ErrorCode) -> Self {
        Error::new(code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumMessage)]
pub enum ErrorCode {
    /// Evaluation exceeded the recursion depth limit.
    StackOverflow,

    /// A search callback asked for termination. This is a control signal,
    /// not a failure.
    Terminated,

    /// Parse error.
    ///
    /// The expression is not a valid instance of the grammar.
    XPST0003,

    /// Name not defined.
    ///
    /// The expression refers to a variable or name with no binding in the
    /// static context.
    XPST0008,

    /// Unknown function.
    ///
    /// The expanded QName and arity of a function call match no function
    /// signature in the static context.
    XPST0017,

    /// Type error.
    ///
    /// A value's dynamic type does not match the type required by the
    /// operation.
    XPTY0004,

    /// A path operator produced a mix of nodes and atomic values.
    XPTY0018,

    /// An intermediate path step produced a non-node value.
    XPTY0019,

    /// The context item is absent where the expression requires one.
    XPDY0002,

    /// Treat failed: the operand does not match the asserted sequence
    /// type.
    XPDY0050,

    /// Unknown atomic type in cast/castable/instance of.
    XPST0051,

    /// Duplicate variable declaration.
    XQST0049,

    /// Duplicate function declaration.
    XQST0034,

    /// Duplicate module import for the same target namespace.
    XQST0047,

    /// Library module declares an item outside its target namespace.
    XQST0048,

    /// Circular module import.
    XQST0093,

    /// Prefix cannot be resolved to a namespace URI.
    FONS0004,

    /// Invalid value for a cast or constructor.
    FORG0001,

    /// Wrong argument cardinality: zero-or-one.
    FORG0003,

    /// Wrong argument cardinality: one-or-more.
    FORG0004,

    /// Wrong argument cardinality: exactly-one.
    FORG0005,

    /// Invalid argument type for a function.
    FORG0006,

    /// Invalid collation.
    FOCH0002,

    /// Division by zero.
    FOAR0001,

    /// Numeric overflow or underflow.
    FOAR0002,

    /// Array index out of bounds.
    FOAY0001,

    /// Invalid regular expression.
    FORX0002,

    /// Invalid regular expression flags.
    FORX0001,

    /// Pattern matches a zero-length string where that is not allowed.
    FORX0003,

    /// Replacement string contains an invalid reference.
    FORX0004,

    /// Document fetch or parse failure.
    FODC0002,

    /// Unparsed text fetch failure.
    FOUT1170,

    /// Invalid QName lexical form.
    FOCA0002,

    /// Error raised by `fn:error()`.
    FOER0000,

    /// Invalid date/time lexical value.
    FODT0001,

    /// Invalid timezone value.
    FODT0003,
}

impl ErrorCode {
    /// Control signals are not reported as errors to the host.
    pub fn is_control_signal(&self) -> bool {
        matches!(self, ErrorCode::Terminated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code() {
        let error = Error::with_message(ErrorCode::XPST0008, "variable $x is not defined");
        let text = error.to_string();
        assert!(text.starts_with("XPST0008"));
        assert!(text.contains("$x"));
    }

    #[test]
    fn terminate_is_control() {
        assert!(ErrorCode::Terminated.is_control_signal());
        assert!(!ErrorCode::FOAR0001.is_control_signal());
    }
}
