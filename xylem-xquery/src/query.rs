//! The `XQuery` object: the engine's public, stateful surface.
//!
//! A query object holds the statement text and base path, compiles on
//! demand (compilation is reused until the statement changes), and runs
//! in three modes: `activate` (no document), `evaluate` (value result)
//! and `search` (callback per matching node).

use std::sync::Arc;

use ahash::AHashMap;

use xylem_interpreter::value::ValueType;
use xylem_interpreter::xml::{Document, NodeEntry};
use xylem_interpreter::{
    CallbackAction, CompiledXQuery, Error, ErrorCode, Evaluator, FeatureFlags, HostEnvironment,
    Result, SearchOutcome, XPathVal,
};

use crate::host::FsHost;

/// Host function registrations. The built-in library takes precedence on
/// name clashes, so these are held for host-side introspection.
pub type RegisteredFunction = Box<dyn Fn(&[XPathVal]) -> Result<XPathVal>>;

#[derive(Default)]
pub struct XQuery {
    statement: String,
    path: String,
    error_msg: String,
    compiled: Option<CompiledXQuery>,
    stale: bool,
    result: XPathVal,
    result_string: Option<String>,
    last_warnings: Vec<String>,
    variables: AHashMap<String, String>,
    registered_functions: AHashMap<String, RegisteredFunction>,
    host: Option<Box<dyn HostEnvironment>>,
    search_cursor: Option<NodeEntry>,
}

impl XQuery {
    pub fn new(statement: impl Into<String>) -> Self {
        XQuery {
            statement: statement.into(),
            stale: true,
            ..XQuery::default()
        }
    }

    /// Compiles the statement eagerly if one is present; otherwise
    /// compilation is deferred to the first execution.
    pub fn init(&mut self) -> Result<()> {
        if self.statement.is_empty() {
            return Ok(());
        }
        self.build()
    }

    // ----- fields -------------------------------------------------------

    pub fn statement(&self) -> &str {
        &self.statement
    }

    /// Setting a new statement invalidates the compiled form and clears
    /// previous results.
    pub fn set_statement(&mut self, statement: impl Into<String>) {
        self.clear();
        self.statement = statement.into();
        self.stale = true;
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Base URI for resolving relative references (`doc()`, module
    /// locations).
    pub fn set_path(&mut self, path: impl Into<String>) {
        self.path = path.into();
        self.stale = true;
    }

    pub fn error_msg(&self) -> &str {
        &self.error_msg
    }

    pub fn result(&self) -> &XPathVal {
        &self.result
    }

    /// Stringified form of the last result, cached until the next run.
    /// Node-set results serialise their nodes; an empty result is the
    /// empty string.
    pub fn result_string(&mut self) -> &str {
        if self.result_string.is_none() {
            self.result_string = Some(self.result.to_output_string());
        }
        self.result_string.as_deref().unwrap_or("")
    }

    pub fn result_type(&self) -> ValueType {
        self.result.value_type()
    }

    /// Non-fatal diagnostics recorded by the last run.
    pub fn warnings(&self) -> &[String] {
        &self.last_warnings
    }

    pub fn feature_flags(&mut self) -> Result<FeatureFlags> {
        if self.compiled.is_none() || self.stale {
            self.build()?;
        }
        Ok(self
            .compiled
            .as_ref()
            .map(|compiled| compiled.feature_flags)
            .unwrap_or_default())
    }

    /// Replaces the host adapter used for document/text fetching.
    pub fn set_host(&mut self, host: Box<dyn HostEnvironment>) {
        self.host = Some(host);
    }

    // ----- key/value variables -----------------------------------------

    /// Stores a string variable visible as `$key` in queries; `None`
    /// removes it.
    pub fn set_key(&mut self, key: &str, value: Option<&str>) {
        match value {
            Some(value) => {
                self.variables.insert(key.to_string(), value.to_string());
            }
            None => {
                self.variables.remove(key);
            }
        }
    }

    pub fn get_key(&self, key: &str) -> Option<&str> {
        self.variables.get(key).map(String::as_str)
    }

    /// Registers a host extension function. Stored for host
    /// introspection; the built-in library takes precedence on clashes.
    pub fn register_function(&mut self, name: &str, callback: RegisteredFunction) {
        self.registered_functions.insert(name.to_string(), callback);
    }

    pub fn registered_function_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registered_functions.keys().cloned().collect();
        names.sort();
        names
    }

    // ----- listings -----------------------------------------------------

    /// Names of user-declared functions: the query prolog plus every
    /// loaded imported module, in lexical form.
    pub fn functions(&self) -> Vec<String> {
        let mut names = Vec::new();
        if let Some(compiled) = &self.compiled {
            for function in compiled.prolog.functions() {
                names.push(compiled.prolog.to_lexical_name(&function.qname));
            }
            for module in compiled.module_cache.loaded_modules() {
                for function in module.prolog.functions() {
                    names.push(module.prolog.to_lexical_name(&function.qname));
                }
            }
        }
        names
    }

    /// Names of visible variables: host-set keys, prolog declarations,
    /// and declarations of loaded imported modules.
    pub fn variables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.variables.keys().cloned().collect();
        if let Some(compiled) = &self.compiled {
            names.extend(compiled.prolog.variables.keys().cloned());
            for module in compiled.module_cache.loaded_modules() {
                names.extend(module.prolog.variables.keys().cloned());
            }
        }
        names
    }

    /// The node the last callback-less `search` stopped at.
    pub fn search_cursor(&self) -> Option<&NodeEntry> {
        self.search_cursor.as_ref()
    }

    // ----- execution ----------------------------------------------------

    /// Runs the query without a document context.
    pub fn activate(&mut self) -> Result<&XPathVal> {
        self.run(None)
    }

    /// Runs the query against a document; the result is retained on the
    /// object.
    pub fn evaluate(&mut self, document: Arc<Document>) -> Result<&XPathVal> {
        self.run(Some(document))
    }

    fn run(&mut self, document: Option<Arc<Document>>) -> Result<&XPathVal> {
        self.prepare()?;
        let compiled = self.compiled.as_ref().expect("prepared above");
        let host = self.host.get_or_insert_with(|| Box::new(FsHost) as Box<dyn HostEnvironment>);

        let mut evaluator = Evaluator::new(compiled, host.as_ref());
        for (key, value) in &self.variables {
            evaluator.set_variable(key, XPathVal::String(value.clone()));
        }

        let outcome = evaluator.evaluate(document);
        self.last_warnings = evaluator.warnings().to_vec();
        self.result_string = None;
        match outcome {
            Ok(value) => {
                self.result = value;
                self.error_msg.clear();
                Ok(&self.result)
            }
            Err(error) => {
                self.result = XPathVal::Empty;
                self.error_msg = error.display_message();
                Err(error)
            }
        }
    }

    /// Runs the query and invokes `callback` for each matching node, in
    /// document order. Without a callback the search stops at the first
    /// match and parks the cursor on it. A `Terminate` return from the
    /// callback stops the iteration immediately.
    pub fn search(
        &mut self,
        document: Arc<Document>,
        callback: Option<&mut dyn FnMut(&NodeEntry) -> CallbackAction>,
    ) -> Result<SearchOutcome> {
        self.prepare()?;
        let compiled = self.compiled.as_ref().expect("prepared above");
        let host = self.host.get_or_insert_with(|| Box::new(FsHost) as Box<dyn HostEnvironment>);

        let mut evaluator = Evaluator::new(compiled, host.as_ref());
        for (key, value) in &self.variables {
            evaluator.set_variable(key, XPathVal::String(value.clone()));
        }

        let outcome = evaluator.search(document, callback);
        self.last_warnings = evaluator.warnings().to_vec();
        self.result_string = None;
        match outcome {
            Ok((outcome, cursor)) => {
                self.search_cursor = cursor;
                self.error_msg.clear();
                Ok(outcome)
            }
            Err(error) => {
                // cursor state is undefined after an error
                self.search_cursor = None;
                self.error_msg = error.display_message();
                Err(error)
            }
        }
    }

    /// Drops the compiled form and results; the statement and path are
    /// kept.
    pub fn clear(&mut self) {
        self.compiled = None;
        self.stale = true;
        self.result = XPathVal::Empty;
        self.result_string = None;
        self.error_msg.clear();
        self.last_warnings.clear();
        self.search_cursor = None;
    }

    /// Synonym for [`XQuery::clear`].
    pub fn reset(&mut self) {
        self.clear();
    }

    fn prepare(&mut self) -> Result<()> {
        if self.stale || self.compiled.is_none() {
            self.build()?;
        }
        Ok(())
    }

    fn build(&mut self) -> Result<()> {
        if self.statement.is_empty() {
            self.error_msg = "no statement to compile".to_string();
            return Err(Error::with_message(
                ErrorCode::XPST0003,
                "no statement to compile",
            ));
        }
        match CompiledXQuery::compile(&self.statement, &self.path) {
            Ok(compiled) => {
                self.compiled = Some(compiled);
                self.stale = false;
                self.error_msg.clear();
                Ok(())
            }
            Err(error) => {
                self.compiled = None;
                self.error_msg = error.display_message();
                Err(error)
            }
        }
    }
}
