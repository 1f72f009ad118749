//! Lazy loading and caching of imported XQuery library modules.

use std::sync::{Arc, Mutex};

use ahash::{AHashMap, AHashSet};

use xylem_xquery_ast::{parse_query, Prolog, XPathNode};

use crate::compile::{resolve_uri, HostEnvironment};
use crate::error::{Error, ErrorCode, Result};

/// A parsed library module: its prolog (functions, variables, nested
/// imports) and, defensively, any body expression. Modules share the
/// importing query's cache rather than holding a back-pointer to it.
#[derive(Debug)]
pub struct CompiledModule {
    pub target_namespace: String,
    pub prolog: Arc<Prolog>,
    pub expression: Option<XPathNode>,
}

/// Cache of imported modules, keyed by target namespace URI. Loading is
/// guarded so each URI is fetched once and circular imports are reported
/// rather than recursed into.
#[derive(Debug, Default)]
pub struct ModuleCache {
    base_path: String,
    modules: Mutex<AHashMap<String, Arc<CompiledModule>>>,
    loading: Mutex<AHashSet<String>>,
}

impl ModuleCache {
    pub fn new(base_path: impl Into<String>) -> Self {
        ModuleCache {
            base_path: base_path.into(),
            modules: Mutex::new(AHashMap::new()),
            loading: Mutex::new(AHashSet::new()),
        }
    }

    pub fn find_module(&self, namespace: &str) -> Option<Arc<CompiledModule>> {
        self.modules.lock().ok()?.get(namespace).cloned()
    }

    pub fn module_count(&self) -> usize {
        self.modules.lock().map(|map| map.len()).unwrap_or(0)
    }

    pub fn loaded_modules(&self) -> Vec<Arc<CompiledModule>> {
        self.modules
            .lock()
            .map(|map| map.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the compiled module for `namespace`, loading and parsing
    /// it on first use. Transitive imports are loaded eagerly so circular
    /// imports surface as `XQST0093`.
    pub fn fetch_or_load(
        &self,
        namespace: &str,
        location_hints: &[String],
        importing_base: &str,
        host: &dyn HostEnvironment,
    ) -> Result<Arc<CompiledModule>> {
        if let Some(existing) = self.find_module(namespace) {
            return Ok(existing);
        }
        {
            let mut loading = self
                .loading
                .lock()
                .map_err(|_| Error::new(ErrorCode::XQST0093))?;
            if !loading.insert(namespace.to_string()) {
                return Err(Error::with_message(
                    ErrorCode::XQST0093,
                    format!("circular import of module '{namespace}'"),
                ));
            }
        }

        let result = self.load_module(namespace, location_hints, importing_base, host);

        if let Ok(mut loading) = self.loading.lock() {
            loading.remove(namespace);
        }
        result
    }

    fn load_module(
        &self,
        namespace: &str,
        location_hints: &[String],
        importing_base: &str,
        host: &dyn HostEnvironment,
    ) -> Result<Arc<CompiledModule>> {
        let base = if importing_base.is_empty() {
            self.base_path.as_str()
        } else {
            importing_base
        };

        // candidate locations: declared hints first, then the namespace
        // URI itself
        let mut candidates: Vec<String> = location_hints
            .iter()
            .map(|hint| resolve_uri(base, hint))
            .collect();
        if candidates.is_empty() {
            candidates.push(resolve_uri(base, namespace));
        }

        let mut last_error = Error::with_message(
            ErrorCode::FODC0002,
            format!("module '{namespace}' could not be located"),
        );
        let mut source = None;
        let mut location = String::new();
        for candidate in candidates {
            match host.load_text(&candidate, None) {
                Ok(text) => {
                    location = candidate;
                    source = Some(text);
                    break;
                }
                Err(error) => last_error = error,
            }
        }
        let Some(source) = source else {
            return Err(last_error);
        };

        let parsed = parse_query(&source);
        if !parsed.errors.is_empty() {
            return Err(Error::with_message(
                ErrorCode::XPST0003,
                format!("in module '{location}': {}", parsed.errors.summary()),
            ));
        }
        if !parsed.prolog.is_library_module {
            return Err(Error::with_message(
                ErrorCode::XQST0048,
                format!("'{location}' is not a library module"),
            ));
        }
        if parsed.prolog.module_namespace_uri.as_deref() != Some(namespace) {
            return Err(Error::with_message(
                ErrorCode::XQST0048,
                format!(
                    "module '{location}' declares namespace '{}', expected '{namespace}'",
                    parsed.prolog.module_namespace_uri.as_deref().unwrap_or("")
                ),
            ));
        }
        let validation = parsed.prolog.validate_library_exports();
        if !validation.valid {
            return Err(Error::with_message(
                ErrorCode::XQST0048,
                validation.error_message,
            ));
        }

        // load transitive imports eagerly; this is where circular imports
        // are caught
        let imports = parsed.prolog.module_imports.clone();
        let module = Arc::new(CompiledModule {
            target_namespace: namespace.to_string(),
            prolog: Arc::new(parsed.prolog),
            expression: parsed.expression,
        });
        for import in &imports {
            self.fetch_or_load(
                &import.target_namespace,
                &import.location_hints,
                &location,
                host,
            )?;
        }

        if let Ok(mut modules) = self.modules.lock() {
            modules.insert(namespace.to_string(), module.clone());
        }
        Ok(module)
    }
}
