//! Pluggable regular-expression capability.
//!
//! The library functions (`matches`, `replace`, `tokenize`,
//! `analyze-string`) depend only on the [`RegexEngine`] trait; the default
//! engine adapts the `regex` crate and is constructed lazily on first
//! use. Hosts may inject their own engine.

use std::cell::RefCell;

use ahash::AHashMap;
use regex::RegexBuilder;

use crate::error::{Error, ErrorCode, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyzedPart {
    Match(String),
    NonMatch(String),
}

pub trait RegexEngine {
    fn is_match(&self, pattern: &str, flags: &str, input: &str) -> Result<bool>;
    fn replace_all(
        &self,
        pattern: &str,
        flags: &str,
        input: &str,
        replacement: &str,
    ) -> Result<String>;
    fn split(&self, pattern: &str, flags: &str, input: &str) -> Result<Vec<String>>;
    fn analyze(&self, pattern: &str, flags: &str, input: &str) -> Result<Vec<AnalyzedPart>>;
}

/// Default engine backed by the `regex` crate, with a compiled-pattern
/// cache keyed by `(pattern, flags)`.
#[derive(Default)]
pub struct DefaultRegexEngine {
    cache: RefCell<AHashMap<(String, String), regex::Regex>>,
}

impl DefaultRegexEngine {
    pub fn new() -> Self {
        DefaultRegexEngine::default()
    }

    fn compiled(&self, pattern: &str, flags: &str) -> Result<regex::Regex> {
        let key = (pattern.to_string(), flags.to_string());
        if let Some(existing) = self.cache.borrow().get(&key) {
            return Ok(existing.clone());
        }

        let mut literal = false;
        let mut builder_flags = (false, false, false, false);
        for flag in flags.chars() {
            match flag {
                'i' => builder_flags.0 = true,
                's' => builder_flags.1 = true,
                'm' => builder_flags.2 = true,
                'x' => builder_flags.3 = true,
                'q' => literal = true,
                other => {
                    return Err(Error::with_message(
                        ErrorCode::FORX0001,
                        format!("unknown regular expression flag '{other}'"),
                    ))
                }
            }
        }

        let source = if literal {
            regex::escape(pattern)
        } else {
            pattern.to_string()
        };
        let compiled = RegexBuilder::new(&source)
            .case_insensitive(builder_flags.0)
            .dot_matches_new_line(builder_flags.1)
            .multi_line(builder_flags.2)
            .ignore_whitespace(builder_flags.3)
            .build()
            .map_err(|error| {
                Error::with_message(ErrorCode::FORX0002, error.to_string())
            })?;
        self.cache.borrow_mut().insert(key, compiled.clone());
        Ok(compiled)
    }
}

impl RegexEngine for DefaultRegexEngine {
    fn is_match(&self, pattern: &str, flags: &str, input: &str) -> Result<bool> {
        Ok(self.compiled(pattern, flags)?.is_match(input))
    }

    fn replace_all(
        &self,
        pattern: &str,
        flags: &str,
        input: &str,
        replacement: &str,
    ) -> Result<String> {
        let compiled = self.compiled(pattern, flags)?;
        if compiled.is_match("") && !pattern.is_empty() && !input.is_empty() {
            // a pattern matching the empty string loops forever under
            // global replacement
            return Err(Error::with_message(
                ErrorCode::FORX0003,
                "pattern matches a zero-length string",
            ));
        }
        Ok(compiled.replace_all(input, replacement).into_owned())
    }

    fn split(&self, pattern: &str, flags: &str, input: &str) -> Result<Vec<String>> {
        let compiled = self.compiled(pattern, flags)?;
        Ok(compiled.split(input).map(str::to_string).collect())
    }

    fn analyze(&self, pattern: &str, flags: &str, input: &str) -> Result<Vec<AnalyzedPart>> {
        let compiled = self.compiled(pattern, flags)?;
        let mut parts = Vec::new();
        let mut last_end = 0usize;
        for found in compiled.find_iter(input) {
            if found.start() > last_end {
                parts.push(AnalyzedPart::NonMatch(
                    input[last_end..found.start()].to_string(),
                ));
            }
            parts.push(AnalyzedPart::Match(found.as_str().to_string()));
            last_end = found.end();
        }
        if last_end < input.len() {
            parts.push(AnalyzedPart::NonMatch(input[last_end..].to_string()));
        }
        Ok(parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_matching() {
        let engine = DefaultRegexEngine::new();
        assert!(engine.is_match("^b.*k$", "", "book").unwrap());
        assert!(!engine.is_match("^b.*k$", "", "shelf").unwrap());
    }

    #[test]
    fn case_insensitive_flag() {
        let engine = DefaultRegexEngine::new();
        assert!(engine.is_match("ada", "i", "Ada Lovelace").unwrap());
        assert!(!engine.is_match("ada", "", "Ada Lovelace").unwrap());
    }

    #[test]
    fn unknown_flag_is_rejected() {
        let engine = DefaultRegexEngine::new();
        let error = engine.is_match("a", "z", "a").unwrap_err();
        assert_eq!(error.code, ErrorCode::FORX0001);
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let engine = DefaultRegexEngine::new();
        let error = engine.is_match("(", "", "a").unwrap_err();
        assert_eq!(error.code, ErrorCode::FORX0002);
    }

    #[test]
    fn literal_flag_escapes() {
        let engine = DefaultRegexEngine::new();
        assert!(engine.is_match("a.b", "q", "a.b").unwrap());
        assert!(!engine.is_match("a.b", "q", "axb").unwrap());
    }

    #[test]
    fn replace_with_group_references() {
        let engine = DefaultRegexEngine::new();
        assert_eq!(
            engine
                .replace_all("(\\w+) (\\w+)", "", "hello world", "$2 $1")
                .unwrap(),
            "world hello"
        );
    }

    #[test]
    fn tokenize_splits() {
        let engine = DefaultRegexEngine::new();
        assert_eq!(
            engine.split(",\\s*", "", "a, b,c").unwrap(),
            vec!["a", "b", "c"]
        );
    }

    #[test]
    fn analyze_interleaves_parts() {
        let engine = DefaultRegexEngine::new();
        let parts = engine.analyze("[0-9]+", "", "a12b3").unwrap();
        assert_eq!(
            parts,
            vec![
                AnalyzedPart::NonMatch("a".into()),
                AnalyzedPart::Match("12".into()),
                AnalyzedPart::NonMatch("b".into()),
                AnalyzedPart::Match("3".into()),
            ]
        );
    }
}
