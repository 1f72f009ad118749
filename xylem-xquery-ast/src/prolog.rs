//! The query prolog: everything declared before the query body.

use ahash::AHashMap;

use crate::ast::XPathNode;

pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";
pub const XSD_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";
pub const FN_NAMESPACE: &str = "http://www.w3.org/2005/xpath-functions";
pub const LOCAL_NAMESPACE: &str = "http://www.w3.org/2005/xquery-local-functions";

/// A user-defined function declared in the prolog.
#[derive(Debug, Clone, Default)]
pub struct XQueryFunction {
    pub qname: String,
    pub parameter_names: Vec<String>,
    pub parameter_types: Vec<Option<String>>,
    pub return_type: Option<String>,
    pub body: Option<XPathNode>,
    pub is_external: bool,
}

impl XQueryFunction {
    pub fn arity(&self) -> usize {
        self.parameter_names.len()
    }
}

/// A user-defined variable declared in the prolog.
#[derive(Debug, Clone, Default)]
pub struct XQueryVariable {
    pub qname: String,
    pub initializer: Option<XPathNode>,
    pub is_external: bool,
}

/// A `declare decimal-format` record, defaults per the W3C picture-string
/// properties.
#[derive(Debug, Clone)]
pub struct DecimalFormat {
    pub name: String,
    pub decimal_separator: String,
    pub grouping_separator: String,
    pub infinity: String,
    pub minus_sign: String,
    pub nan: String,
    pub percent: String,
    pub per_mille: String,
    pub zero_digit: String,
    pub digit: String,
    pub pattern_separator: String,
}

impl Default for DecimalFormat {
    fn default() -> Self {
        DecimalFormat {
            name: String::new(),
            decimal_separator: ".".into(),
            grouping_separator: ",".into(),
            infinity: "INF".into(),
            minus_sign: "-".into(),
            nan: "NaN".into(),
            percent: "%".into(),
            per_mille: "\u{2030}".into(),
            zero_digit: "0".into(),
            digit: "#".into(),
            pattern_separator: ";".into(),
        }
    }
}

/// An `import module` declaration.
#[derive(Debug, Clone, Default)]
pub struct ModuleImport {
    pub target_namespace: String,
    pub location_hints: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoundarySpace {
    Preserve,
    #[default]
    Strip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConstructionMode {
    Preserve,
    #[default]
    Strip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderingMode {
    #[default]
    Ordered,
    Unordered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyOrder {
    #[default]
    Greatest,
    Least,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyNamespaces {
    pub preserve: bool,
    pub inherit: bool,
}

impl Default for CopyNamespaces {
    fn default() -> Self {
        CopyNamespaces {
            preserve: true,
            inherit: true,
        }
    }
}

/// Outcome of [`Prolog::validate_library_exports`].
#[derive(Debug, Clone, Default)]
pub struct ExportValidation {
    pub valid: bool,
    pub error_message: String,
    pub problematic_qname: String,
    pub is_function: bool,
}

/// Declarations gathered from a query or library-module prolog.
///
/// Namespace declarations are immutable once any function or variable has
/// been declared; function lookup is keyed by `(expanded QName, arity)`.
#[derive(Debug, Clone, Default)]
pub struct Prolog {
    namespaces: AHashMap<String, String>,
    namespace_prefixes: AHashMap<String, String>,
    pub variables: AHashMap<String, XQueryVariable>,
    functions: AHashMap<(String, usize), XQueryFunction>,
    pub decimal_formats: AHashMap<String, DecimalFormat>,
    pub options: AHashMap<String, String>,
    pub module_imports: Vec<ModuleImport>,

    pub default_element_namespace: Option<String>,
    pub default_function_namespace: Option<String>,
    pub module_namespace_uri: Option<String>,
    pub module_namespace_prefix: Option<String>,

    pub static_base_uri: String,
    pub default_collation: String,

    pub boundary_space: BoundarySpace,
    pub construction_mode: ConstructionMode,
    pub ordering_mode: OrderingMode,
    pub empty_order: EmptyOrder,
    pub copy_namespaces: CopyNamespaces,

    pub is_library_module: bool,
    pub static_base_uri_declared: bool,
    pub default_collation_declared: bool,
    pub boundary_space_declared: bool,
    pub construction_declared: bool,
    pub ordering_declared: bool,
    pub empty_order_declared: bool,
    pub copy_namespaces_declared: bool,
    pub default_decimal_format_declared: bool,
}

impl Prolog {
    pub fn new() -> Self {
        let mut prolog = Prolog::default();
        prolog.bind_namespace("xml", XML_NAMESPACE);
        prolog.bind_namespace("xs", XSD_NAMESPACE);
        prolog.bind_namespace("fn", FN_NAMESPACE);
        prolog.bind_namespace("local", LOCAL_NAMESPACE);
        prolog
    }

    fn bind_namespace(&mut self, prefix: &str, uri: &str) {
        self.namespaces.insert(prefix.into(), uri.into());
        self.namespace_prefixes.insert(uri.into(), prefix.into());
    }

    /// Binds `prefix` to `uri`. Rebinding is rejected once function or
    /// variable declarations exist, since their bodies may already have
    /// resolved the prefix.
    pub fn declare_namespace(&mut self, prefix: &str, uri: &str) -> bool {
        if self.namespaces.contains_key(prefix)
            && (!self.functions.is_empty() || !self.variables.is_empty())
        {
            return false;
        }
        self.bind_namespace(prefix, uri);
        true
    }

    /// Declares a prolog variable; duplicate QNames are rejected.
    pub fn declare_variable(&mut self, qname: &str, variable: XQueryVariable) -> bool {
        if self.variables.contains_key(qname) {
            return false;
        }
        self.variables.insert(qname.into(), variable);
        true
    }

    /// Declares a function keyed by `(expanded QName, arity)`; duplicates
    /// are rejected.
    pub fn declare_function(&mut self, function: XQueryFunction) -> bool {
        let key = (
            self.normalise_function_qname(&function.qname),
            function.arity(),
        );
        if self.functions.contains_key(&key) {
            return false;
        }
        self.functions.insert(key, function);
        true
    }

    /// Records a module import; duplicate target namespaces are rejected
    /// with a message.
    pub fn declare_module_import(
        &mut self,
        import: ModuleImport,
        error_message: &mut String,
    ) -> bool {
        if self
            .module_imports
            .iter()
            .any(|existing| existing.target_namespace == import.target_namespace)
        {
            *error_message = format!(
                "duplicate module import for namespace '{}'",
                import.target_namespace
            );
            return false;
        }
        self.module_imports.push(import);
        true
    }

    pub fn find_function(&self, qname: &str, arity: usize) -> Option<&XQueryFunction> {
        let key = (self.normalise_function_qname(qname), arity);
        self.functions.get(&key)
    }

    pub fn find_variable(&self, qname: &str) -> Option<&XQueryVariable> {
        self.variables.get(qname)
    }

    pub fn functions(&self) -> impl Iterator<Item = &XQueryFunction> {
        self.functions.values()
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    /// Resolves a declared prefix to its namespace URI.
    pub fn resolve_prefix(&self, prefix: &str) -> Option<&str> {
        self.namespaces.get(prefix).map(String::as_str)
    }

    /// Reverse lookup: the declared prefix for a namespace URI.
    pub fn prefix_for_uri(&self, uri: &str) -> Option<&str> {
        self.namespace_prefixes.get(uri).map(String::as_str)
    }

    pub fn declared_prefixes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.namespaces
            .iter()
            .map(|(prefix, uri)| (prefix.as_str(), uri.as_str()))
    }

    /// Canonicalises a function QName to `Q{uri}local` when its namespace
    /// is known; unprefixed names use the default function namespace.
    pub fn normalise_function_qname(&self, qname: &str) -> String {
        if qname.starts_with("Q{") {
            return qname.into();
        }
        if let Some((prefix, local)) = qname.split_once(':') {
            if let Some(uri) = self.resolve_prefix(prefix) {
                return format!("Q{{{uri}}}{local}");
            }
            return qname.into();
        }
        if let Some(uri) = &self.default_function_namespace {
            return format!("Q{{{uri}}}{qname}");
        }
        qname.into()
    }

    /// Reduces a canonical `Q{uri}local` name to lexical `prefix:local`
    /// form where a prefix is declared.
    pub fn to_lexical_name(&self, qname: &str) -> String {
        let Some(rest) = qname.strip_prefix("Q{") else {
            return qname.into();
        };
        let Some((uri, local)) = rest.split_once('}') else {
            return qname.into();
        };
        match self.prefix_for_uri(uri) {
            Some(prefix) if !prefix.is_empty() => format!("{prefix}:{local}"),
            _ => local.into(),
        }
    }

    /// For library modules: every declared function and every prefixed
    /// variable must live in the module's target namespace.
    pub fn validate_library_exports(&self) -> ExportValidation {
        let mut result = ExportValidation {
            valid: true,
            ..ExportValidation::default()
        };
        if !self.is_library_module {
            return result;
        }
        let Some(module_uri) = &self.module_namespace_uri else {
            result.valid = false;
            result.error_message = "library module is missing a module namespace".into();
            return result;
        };

        for function in self.functions.values() {
            if !self.qname_in_namespace(&function.qname, module_uri) {
                result.valid = false;
                result.is_function = true;
                result.problematic_qname = function.qname.clone();
                result.error_message = format!(
                    "function '{}' is not in the module namespace '{module_uri}'",
                    function.qname
                );
                return result;
            }
        }
        for variable in self.variables.values() {
            if !variable.qname.contains(':') {
                continue;
            }
            if !self.qname_in_namespace(&variable.qname, module_uri) {
                result.valid = false;
                result.is_function = false;
                result.problematic_qname = variable.qname.clone();
                result.error_message = format!(
                    "variable '${}' is not in the module namespace '{module_uri}'",
                    variable.qname
                );
                return result;
            }
        }
        result
    }

    fn qname_in_namespace(&self, qname: &str, uri: &str) -> bool {
        if let Some(rest) = qname.strip_prefix("Q{") {
            return rest.split_once('}').map(|(ns, _)| ns == uri).unwrap_or(false);
        }
        let Some((prefix, _)) = qname.split_once(':') else {
            return false;
        };
        self.resolve_prefix(prefix) == Some(uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_arity_matching() {
        let mut prolog = Prolog::new();
        let function = XQueryFunction {
            qname: "local:add".into(),
            parameter_names: vec!["a".into(), "b".into()],
            parameter_types: vec![None, None],
            ..XQueryFunction::default()
        };
        assert!(prolog.declare_function(function));
        assert!(prolog.find_function("local:add", 2).is_some());
        assert!(prolog.find_function("local:add", 1).is_none());
    }

    #[test]
    fn function_overloading_by_arity() {
        let mut prolog = Prolog::new();
        for arity in 0..3 {
            let function = XQueryFunction {
                qname: "local:format".into(),
                parameter_names: (0..arity).map(|index| format!("p{index}")).collect(),
                parameter_types: vec![None; arity],
                ..XQueryFunction::default()
            };
            assert!(prolog.declare_function(function));
        }
        assert!(prolog.find_function("local:format", 0).is_some());
        assert!(prolog.find_function("local:format", 1).is_some());
        assert!(prolog.find_function("local:format", 2).is_some());
        assert!(prolog.find_function("local:format", 3).is_none());
    }

    #[test]
    fn duplicate_function_rejected() {
        let mut prolog = Prolog::new();
        let function = XQueryFunction {
            qname: "local:f".into(),
            ..XQueryFunction::default()
        };
        assert!(prolog.declare_function(function.clone()));
        assert!(!prolog.declare_function(function));
    }

    #[test]
    fn namespace_rebind_rejected_after_declarations() {
        let mut prolog = Prolog::new();
        assert!(prolog.declare_namespace("ex", "http://example.org/a"));
        assert!(prolog.declare_namespace("ex", "http://example.org/b"));
        prolog.declare_variable(
            "x",
            XQueryVariable {
                qname: "x".into(),
                ..XQueryVariable::default()
            },
        );
        assert!(!prolog.declare_namespace("ex", "http://example.org/c"));
    }

    #[test]
    fn qname_normalisation() {
        let prolog = Prolog::new();
        assert_eq!(
            prolog.normalise_function_qname("xs:integer"),
            "Q{http://www.w3.org/2001/XMLSchema}integer"
        );
        assert_eq!(prolog.normalise_function_qname("unknown:f"), "unknown:f");
    }

    #[test]
    fn library_export_validation() {
        let mut prolog = Prolog::new();
        prolog.is_library_module = true;
        prolog.module_namespace_uri = Some("http://example.org/math".into());
        prolog.declare_namespace("math", "http://example.org/math");
        assert!(prolog.declare_function(XQueryFunction {
            qname: "math:cube".into(),
            parameter_names: vec!["x".into()],
            parameter_types: vec![None],
            ..XQueryFunction::default()
        }));
        assert!(prolog.validate_library_exports().valid);

        assert!(prolog.declare_function(XQueryFunction {
            qname: "local:oops".into(),
            ..XQueryFunction::default()
        }));
        let validation = prolog.validate_library_exports();
        assert!(!validation.valid);
        assert!(validation.is_function);
        assert_eq!(validation.problematic_qname, "local:oops");
    }

    #[test]
    fn duplicate_module_import_rejected() {
        let mut prolog = Prolog::new();
        let mut message = String::new();
        assert!(prolog.declare_module_import(
            ModuleImport {
                target_namespace: "http://example.org/m".into(),
                location_hints: vec!["m.xqm".into()],
            },
            &mut message,
        ));
        assert!(!prolog.declare_module_import(
            ModuleImport {
                target_namespace: "http://example.org/m".into(),
                location_hints: Vec::new(),
            },
            &mut message,
        ));
        assert!(message.contains("duplicate module import"));
    }
}
