//! The built-in function library.
//!
//! Functions are registered in a process-wide registry built once on
//! first use, keyed by local name with an arity range per entry. A
//! handler receives the evaluator (for context-dependent functions such
//! as `position()` or `current-date()`) and its already-evaluated
//! arguments.

mod boolean;
mod datetime;
mod doc;
mod format;
mod maps;
mod node;
mod numeric;
mod qname;
mod regexfns;
mod sequence;
mod string;
mod uri;

use std::sync::OnceLock;

use ahash::AHashMap;

use crate::error::Result;
use crate::eval::Evaluator;
use crate::value::XPathVal;

pub(crate) type Handler =
    for<'e, 'c> fn(&'e mut Evaluator<'c>, Vec<XPathVal>) -> Result<XPathVal>;

pub(crate) struct BuiltinFunction {
    pub name: &'static str,
    pub min_arity: usize,
    pub max_arity: usize,
    pub handler: Handler,
}

impl BuiltinFunction {
    pub(crate) const fn new(
        name: &'static str,
        min_arity: usize,
        max_arity: usize,
        handler: Handler,
    ) -> Self {
        BuiltinFunction {
            name,
            min_arity,
            max_arity,
            handler,
        }
    }
}

static REGISTRY: OnceLock<AHashMap<&'static str, Vec<BuiltinFunction>>> = OnceLock::new();

fn registry() -> &'static AHashMap<&'static str, Vec<BuiltinFunction>> {
    REGISTRY.get_or_init(|| {
        let mut map: AHashMap<&'static str, Vec<BuiltinFunction>> = AHashMap::new();
        let groups = [
            boolean::functions(),
            numeric::functions(),
            string::functions(),
            sequence::functions(),
            node::functions(),
            datetime::functions(),
            qname::functions(),
            uri::functions(),
            doc::functions(),
            regexfns::functions(),
            maps::functions(),
            format::functions(),
        ];
        for group in groups {
            for function in group {
                map.entry(function.name).or_default().push(function);
            }
        }
        map
    })
}

/// Finds a built-in by local name and arity.
pub(crate) fn lookup(local_name: &str, arity: usize) -> Option<&'static BuiltinFunction> {
    registry()
        .get(local_name)?
        .iter()
        .find(|function| arity >= function.min_arity && arity <= function.max_arity)
}

/// True when the name is a built-in for some arity; used for feature
/// detection and diagnostics.
pub(crate) fn is_builtin_name(local_name: &str) -> bool {
    registry().contains_key(local_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_respects_arity_range() {
        assert!(lookup("concat", 2).is_some());
        assert!(lookup("concat", 9).is_some());
        assert!(lookup("concat", 1).is_none());
        assert!(lookup("true", 0).is_some());
        assert!(lookup("true", 1).is_none());
        assert!(lookup("no-such-function", 0).is_none());
    }

    #[test]
    fn core_functions_are_registered() {
        for name in [
            "boolean", "not", "count", "sum", "floor", "ceiling", "round", "abs", "min",
            "max", "avg", "string", "concat", "substring", "contains", "starts-with",
            "ends-with", "string-length", "normalize-space", "upper-case", "lower-case",
            "translate", "string-join", "distinct-values", "index-of", "insert-before",
            "remove", "reverse", "subsequence", "deep-equal", "position", "last", "name",
            "local-name", "namespace-uri", "root", "doc", "doc-available", "matches",
            "replace", "tokenize", "current-date", "current-time", "current-dateTime",
            "resolve-uri", "QName", "error", "trace", "exists", "empty",
        ] {
            assert!(is_builtin_name(name), "missing builtin {name}");
        }
    }
}
