//! Compilation: query text to a reusable [`CompiledXQuery`], plus the
//! host adapter interface the evaluator fetches external resources
//! through.

use std::sync::{Arc, Mutex};

use ahash::AHashMap;
use iri_string::types::{IriAbsoluteStr, IriReferenceStr};

use xylem_xquery_ast::{parse_query, NodeKind, Prolog, XPathNode};

use crate::error::{Error, ErrorCode, Result};
use crate::modules::ModuleCache;
use crate::xml::Document;

/// Features detected in a compiled query, for host policy checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatureFlags(u32);

impl FeatureFlags {
    /// Imports at least one library module.
    pub const USES_MODULES: FeatureFlags = FeatureFlags(1);
    /// Contains direct or computed node constructors.
    pub const USES_CONSTRUCTORS: FeatureFlags = FeatureFlags(1 << 1);
    /// Calls a regular-expression function.
    pub const USES_REGEX: FeatureFlags = FeatureFlags(1 << 2);
    /// Calls `doc`, `collection` or `unparsed-text`.
    pub const USES_EXTERNAL_DOCS: FeatureFlags = FeatureFlags(1 << 3);
    /// Carries any prolog declaration.
    pub const USES_PROLOG: FeatureFlags = FeatureFlags(1 << 4);

    pub fn contains(&self, flag: FeatureFlags) -> bool {
        self.0 & flag.0 == flag.0
    }

    pub fn insert(&mut self, flag: FeatureFlags) {
        self.0 |= flag.0;
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}

/// The host side of the engine: document and text fetching. `doc()`,
/// `unparsed-text()` and module loading all come through here.
pub trait HostEnvironment {
    /// Fetches and parses an XML document. `order_key` fixes the
    /// document's position in cross-document node ordering and must be
    /// passed through to the parsed document.
    fn load_document(&self, uri: &str, order_key: u64) -> Result<Arc<Document>>;

    /// Fetches an unparsed text resource.
    fn load_text(&self, uri: &str, encoding: Option<&str>) -> Result<String>;
}

/// Host environment that refuses all external fetches; the default for
/// hosts that only evaluate self-contained queries.
#[derive(Debug, Default)]
pub struct NullHost;

impl HostEnvironment for NullHost {
    fn load_document(&self, uri: &str, _order_key: u64) -> Result<Arc<Document>> {
        Err(Error::with_message(
            ErrorCode::FODC0002,
            format!("no document loader is configured (requested '{uri}')"),
        ))
    }

    fn load_text(&self, uri: &str, _encoding: Option<&str>) -> Result<String> {
        Err(Error::with_message(
            ErrorCode::FOUT1170,
            format!("no text loader is configured (requested '{uri}')"),
        ))
    }
}

/// A compiled, reusable query: the AST, its prolog, the shared module
/// cache and the cache of documents loaded through `doc()`. Read-only
/// after compilation; per-evaluation state lives in the evaluator.
#[derive(Debug)]
pub struct CompiledXQuery {
    pub expression: Option<XPathNode>,
    pub prolog: Arc<Prolog>,
    pub module_cache: Arc<ModuleCache>,
    pub document_cache: Mutex<AHashMap<String, Arc<Document>>>,
    pub feature_flags: FeatureFlags,
}

impl CompiledXQuery {
    /// Compiles a query. `base_uri` seeds the static base URI when the
    /// prolog does not declare one.
    pub fn compile(statement: &str, base_uri: &str) -> Result<CompiledXQuery> {
        let parsed = parse_query(statement);
        if !parsed.errors.is_empty() {
            return Err(Error::with_message(
                ErrorCode::XPST0003,
                parsed.errors.summary(),
            ));
        }
        let mut prolog = parsed.prolog;
        if !prolog.static_base_uri_declared && !base_uri.is_empty() {
            prolog.static_base_uri = base_uri.to_string();
        }
        let feature_flags = compute_feature_flags(parsed.expression.as_ref(), &prolog);
        Ok(CompiledXQuery {
            expression: parsed.expression,
            prolog: Arc::new(prolog),
            module_cache: Arc::new(ModuleCache::new(base_uri)),
            document_cache: Mutex::new(AHashMap::new()),
            feature_flags,
        })
    }

    /// Cached document lookup for `doc()`.
    pub fn cached_document(&self, uri: &str) -> Option<Arc<Document>> {
        self.document_cache.lock().ok()?.get(uri).cloned()
    }

    pub fn cache_document(&self, uri: &str, document: Arc<Document>) {
        if let Ok(mut cache) = self.document_cache.lock() {
            cache.insert(uri.to_string(), document);
        }
    }
}

const REGEX_FUNCTIONS: &[&str] = &["matches", "replace", "tokenize", "analyze-string"];
const EXTERNAL_DOC_FUNCTIONS: &[&str] = &[
    "doc",
    "doc-available",
    "collection",
    "unparsed-text",
    "unparsed-text-lines",
];

fn compute_feature_flags(expression: Option<&XPathNode>, prolog: &Prolog) -> FeatureFlags {
    let mut flags = FeatureFlags::default();
    if !prolog.module_imports.is_empty() {
        flags.insert(FeatureFlags::USES_MODULES);
    }
    if prolog.function_count() > 0
        || !prolog.variables.is_empty()
        || prolog.is_library_module
        || prolog.static_base_uri_declared
        || prolog.boundary_space_declared
        || prolog.construction_declared
        || prolog.ordering_declared
        || prolog.empty_order_declared
        || prolog.copy_namespaces_declared
        || prolog.default_collation_declared
        || !prolog.options.is_empty()
        || !prolog.decimal_formats.is_empty()
    {
        flags.insert(FeatureFlags::USES_PROLOG);
    }

    let mut scan = |node: &XPathNode| {
        let mut visitor = |visited: &XPathNode| match visited.kind {
            NodeKind::DirectElement
            | NodeKind::ComputedElement
            | NodeKind::ComputedAttribute
            | NodeKind::TextConstructor
            | NodeKind::CommentConstructor
            | NodeKind::PiConstructor
            | NodeKind::DocumentConstructor
            | NodeKind::MapConstructor
            | NodeKind::ArrayConstructor => {
                flags.insert(FeatureFlags::USES_CONSTRUCTORS);
            }
            NodeKind::FunctionCall => {
                let local = visited
                    .value
                    .rsplit(':')
                    .next()
                    .unwrap_or(visited.value.as_str());
                if REGEX_FUNCTIONS.contains(&local) {
                    flags.insert(FeatureFlags::USES_REGEX);
                }
                if EXTERNAL_DOC_FUNCTIONS.contains(&local) {
                    flags.insert(FeatureFlags::USES_EXTERNAL_DOCS);
                }
            }
            _ => {}
        };
        node.visit(&mut visitor);
    };

    if let Some(expression) = expression {
        scan(expression);
    }
    for function in prolog.functions() {
        if let Some(body) = &function.body {
            scan(body);
        }
    }
    for variable in prolog.variables.values() {
        if let Some(initializer) = &variable.initializer {
            scan(initializer);
        }
    }
    flags
}

/// Resolves `reference` against `base`, falling back to naive path
/// joining when the base is not an absolute IRI.
pub fn resolve_uri(base: &str, reference: &str) -> String {
    if base.is_empty() {
        return reference.to_string();
    }
    if let Ok(reference_iri) = <&IriReferenceStr>::try_from(reference) {
        match reference_iri.to_iri() {
            Ok(absolute) => return absolute.to_string(),
            Err(relative) => {
                if let Ok(base_iri) = <&IriAbsoluteStr>::try_from(base) {
                    return relative.resolve_against(base_iri).to_string();
                }
            }
        }
    }
    // filesystem-style fallback
    match base.rfind('/') {
        Some(index) => format!("{}{}", &base[..index + 1], reference),
        None => reference.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_reports_syntax_errors() {
        let error = CompiledXQuery::compile("1 +", "").unwrap_err();
        assert_eq!(error.code, ErrorCode::XPST0003);
    }

    #[test]
    fn feature_flags_for_constructors() {
        let compiled = CompiledXQuery::compile("<a>{1}</a>", "").unwrap();
        assert!(compiled
            .feature_flags
            .contains(FeatureFlags::USES_CONSTRUCTORS));
        assert!(!compiled.feature_flags.contains(FeatureFlags::USES_REGEX));
    }

    #[test]
    fn feature_flags_for_regex_and_docs() {
        let compiled =
            CompiledXQuery::compile("matches('a', 'b') and doc-available('x.xml')", "")
                .unwrap();
        assert!(compiled.feature_flags.contains(FeatureFlags::USES_REGEX));
        assert!(compiled
            .feature_flags
            .contains(FeatureFlags::USES_EXTERNAL_DOCS));
    }

    #[test]
    fn feature_flags_for_prolog_and_modules() {
        let compiled = CompiledXQuery::compile(
            "import module namespace m = \"http://example.org/m\" at \"m.xqm\"; 1",
            "",
        )
        .unwrap();
        assert!(compiled.feature_flags.contains(FeatureFlags::USES_MODULES));
        assert!(compiled.feature_flags.contains(FeatureFlags::USES_PROLOG));
    }

    #[test]
    fn base_uri_seeds_prolog() {
        let compiled = CompiledXQuery::compile("1", "http://example.org/dir/").unwrap();
        assert_eq!(compiled.prolog.static_base_uri, "http://example.org/dir/");
        let declared = CompiledXQuery::compile(
            "declare base-uri \"http://other.org/\"; 1",
            "http://example.org/dir/",
        )
        .unwrap();
        assert_eq!(declared.prolog.static_base_uri, "http://other.org/");
    }

    #[test]
    fn uri_resolution() {
        assert_eq!(
            resolve_uri("http://example.org/a/b.xml", "c.xml"),
            "http://example.org/a/c.xml"
        );
        assert_eq!(
            resolve_uri("http://example.org/a/", "http://other.org/x"),
            "http://other.org/x"
        );
        assert_eq!(resolve_uri("", "c.xml"), "c.xml");
        assert_eq!(resolve_uri("dir/base.xq", "lib.xqm"), "dir/lib.xqm");
    }
}
