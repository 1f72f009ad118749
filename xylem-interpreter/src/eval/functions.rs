//! Function call and variable resolution.
//!
//! Calls resolve in order: user-declared functions (innermost module
//! prolog first), functions of imported modules (loaded lazily), the
//! built-in library, and finally atomic type constructors. Arity always
//! participates in the lookup. User-function recursion is bounded by an
//! evaluator-held depth counter.

use std::sync::Arc;

use xylem_xquery_ast::{Prolog, XPathNode, XQueryFunction};

use crate::context::BindingGuard;
use crate::error::{Error, ErrorCode, Result};
use crate::eval::Evaluator;
use crate::library;
use crate::modules::CompiledModule;
use crate::schema::Xs;
use crate::value::XPathVal;

impl<'a> Evaluator<'a> {
    pub(crate) fn evaluate_function_call(&mut self, node: &XPathNode) -> Result<XPathVal> {
        let mut arguments = Vec::with_capacity(node.children.len());
        for argument in &node.children {
            arguments.push(self.evaluate_node(argument)?);
        }
        self.call_function(&node.value, arguments)
    }

    pub(crate) fn call_function(
        &mut self,
        name: &str,
        arguments: Vec<XPathVal>,
    ) -> Result<XPathVal> {
        let arity = arguments.len();

        // user-declared, in the prolog currently in effect
        let active = self.active_prolog_arc();
        if let Some(function) = active.find_function(name, arity).cloned() {
            let module = self.module_stack.last().cloned();
            return self.call_user_function(&function, module, arguments);
        }

        // functions exported by an imported module
        if let Some(module) = self.locate_imported_function(name, arity)? {
            return self.call_module_function(module, name, arguments);
        }

        // built-in library, keyed by local name and arity range
        let local = name.rsplit(':').next().unwrap_or(name);
        if let Some(builtin) = library::lookup(local, arity) {
            return (builtin.handler)(self, arguments);
        }

        // atomic type constructor, e.g. xs:integer("5")
        if let Some(xs) = Xs::by_name(name) {
            if arity == 1 {
                if arguments[0].is_empty() {
                    return Ok(XPathVal::Empty);
                }
                return xs.cast(&arguments[0]);
            }
        }

        if library::is_builtin_name(local) {
            return Err(Error::with_message(
                ErrorCode::XPST0017,
                format!("wrong number of arguments for {local}(): {arity}"),
            ));
        }
        Err(Error::with_message(
            ErrorCode::XPST0017,
            format!("unknown function {name}#{arity}"),
        ))
    }

    // An imported module whose namespace owns `name`, loading it on first
    // use.
    fn locate_imported_function(
        &mut self,
        name: &str,
        arity: usize,
    ) -> Result<Option<Arc<CompiledModule>>> {
        let prolog = self.active_prolog_arc();
        let Some((prefix, _)) = name.split_once(':') else {
            return Ok(None);
        };
        let Some(uri) = prolog.resolve_prefix(prefix).map(str::to_string) else {
            return Ok(None);
        };
        let Some(import) = prolog
            .module_imports
            .iter()
            .find(|import| import.target_namespace == uri)
        else {
            return Ok(None);
        };
        let module = self.compiled.module_cache.fetch_or_load(
            &import.target_namespace,
            &import.location_hints,
            &prolog.static_base_uri,
            self.host,
        )?;
        // exports are validated to the module namespace, so the local
        // name plus arity identifies the function even when the importer
        // chose a different prefix
        let local = name.rsplit(':').next().unwrap_or(name);
        let found = module.prolog.functions().any(|function| {
            function.arity() == arity && local_name_of(&function.qname) == local
        });
        Ok(if found { Some(module) } else { None })
    }

    fn call_module_function(
        &mut self,
        module: Arc<CompiledModule>,
        name: &str,
        arguments: Vec<XPathVal>,
    ) -> Result<XPathVal> {
        let local = name.rsplit(':').next().unwrap_or(name);
        let function = module
            .prolog
            .functions()
            .find(|function| {
                function.arity() == arguments.len() && local_name_of(&function.qname) == local
            })
            .cloned()
            .ok_or_else(|| {
                Error::with_message(
                    ErrorCode::XPST0017,
                    format!("unknown function {name}#{}", arguments.len()),
                )
            })?;
        self.call_user_function(&function, Some(module), arguments)
    }

    fn call_user_function(
        &mut self,
        function: &XQueryFunction,
        module: Option<Arc<CompiledModule>>,
        arguments: Vec<XPathVal>,
    ) -> Result<XPathVal> {
        if function.is_external {
            self.record_warning(format!(
                "external function '{}' has no host implementation",
                function.qname
            ));
            return Ok(XPathVal::Empty);
        }
        let Some(body) = &function.body else {
            return Ok(XPathVal::Empty);
        };

        if self.recursion_depth >= self.recursion_limit {
            return Err(Error::with_message(
                ErrorCode::StackOverflow,
                format!(
                    "recursion limit of {} exceeded in '{}'",
                    self.recursion_limit, function.qname
                ),
            ));
        }
        self.recursion_depth += 1;

        let guards: Vec<BindingGuard> = function
            .parameter_names
            .iter()
            .zip(arguments)
            .map(|(parameter, value)| self.variables.bind(parameter, value))
            .collect();
        let module_pushed = module.is_some();
        if let Some(module) = module {
            self.module_stack.push(module);
        }

        let result = self.evaluate_node(body);

        if module_pushed {
            self.module_stack.pop();
        }
        for guard in guards.into_iter().rev() {
            self.variables.restore(guard);
        }
        self.recursion_depth -= 1;
        result
    }

    fn active_prolog_arc(&self) -> Arc<Prolog> {
        match self.module_stack.last() {
            Some(module) => module.prolog.clone(),
            None => self.compiled.prolog.clone(),
        }
    }
    // ----- variables ----------------------------------------------------

    pub(crate) fn resolve_variable(&mut self, name: &str) -> Result<XPathVal> {
        // lexical scope and host-provided keys
        if let Some(value) = self.variables.get(name) {
            return Ok(value.clone());
        }
        if let Some(value) = self.prolog_variable_cache.get(name) {
            return Ok(value.clone());
        }

        // prolog-declared variable, evaluated lazily with cycle detection
        let prolog = self.active_prolog_arc();
        if let Some(variable) = prolog.find_variable(name) {
            if variable.is_external {
                // external without a host value is the empty sequence
                return Ok(XPathVal::Empty);
            }
            let Some(initializer) = variable.initializer.clone() else {
                return Ok(XPathVal::Empty);
            };
            if !self.variables_in_evaluation.insert(name.to_string()) {
                self.record_warning(format!(
                    "circular initialisation of variable '${name}'"
                ));
                return Ok(XPathVal::Empty);
            }
            let value = self.evaluate_node(&initializer);
            self.variables_in_evaluation.remove(name);
            let value = value?;
            self.prolog_variable_cache
                .insert(name.to_string(), value.clone());
            return Ok(value);
        }

        // public variable of an imported module
        if let Some(value) = self.resolve_module_variable(name, &prolog)? {
            return Ok(value);
        }

        Err(Error::with_message(
            ErrorCode::XPST0008,
            format!("variable '${name}' is not defined"),
        ))
    }

    fn resolve_module_variable(
        &mut self,
        name: &str,
        prolog: &Arc<Prolog>,
    ) -> Result<Option<XPathVal>> {
        let Some((prefix, local)) = name.split_once(':') else {
            return Ok(None);
        };
        let Some(uri) = prolog.resolve_prefix(prefix).map(str::to_string) else {
            return Ok(None);
        };
        let Some(import) = prolog
            .module_imports
            .iter()
            .find(|import| import.target_namespace == uri)
        else {
            return Ok(None);
        };
        let module = self.compiled.module_cache.fetch_or_load(
            &import.target_namespace,
            &import.location_hints,
            &prolog.static_base_uri,
            self.host,
        )?;

        // the module may declare the variable under its own prefix
        let variable = module.prolog.variables.iter().find_map(|(qname, variable)| {
            let variable_local = qname.split_once(':').map(|(_, l)| l).unwrap_or(qname);
            (variable_local == local).then(|| variable.clone())
        });
        let Some(variable) = variable else {
            return Ok(None);
        };

        let cache_key = format!("Q{{{uri}}}{local}");
        if let Some(value) = self.prolog_variable_cache.get(&cache_key) {
            return Ok(Some(value.clone()));
        }
        if variable.is_external {
            return Ok(Some(XPathVal::Empty));
        }
        let Some(initializer) = variable.initializer else {
            return Ok(Some(XPathVal::Empty));
        };
        if !self.variables_in_evaluation.insert(cache_key.clone()) {
            self.record_warning(format!("circular initialisation of variable '${name}'"));
            return Ok(Some(XPathVal::Empty));
        }
        self.module_stack.push(module);
        let value = self.evaluate_node(&initializer);
        self.module_stack.pop();
        self.variables_in_evaluation.remove(&cache_key);
        let value = value?;
        self.prolog_variable_cache.insert(cache_key, value.clone());
        Ok(Some(value))
    }
}

fn local_name_of(qname: &str) -> &str {
    qname.rsplit(':').next().unwrap_or(qname)
}
