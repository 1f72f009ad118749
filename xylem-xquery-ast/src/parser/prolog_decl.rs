//! Prolog parsing: `module namespace`, `declare …` and `import …`
//! statements separated by `;`.

use xylem_xquery_lexer::TokenKind;

use crate::prolog::{DecimalFormat, ModuleImport, XQueryFunction, XQueryVariable};
use crate::prolog::{BoundarySpace, ConstructionMode, EmptyOrder, OrderingMode};

use super::Parser;

impl<'a> Parser<'a> {
    pub(crate) fn parse_prolog(&mut self) {
        loop {
            while self.match_kind(TokenKind::Semicolon) {}

            let parsed = if self.check(TokenKind::Module)
                && self.peek_at(1).kind == TokenKind::Namespace
            {
                self.parse_module_decl()
            } else if self.check(TokenKind::Declare) {
                self.parse_declare_statement()
            } else if self.check(TokenKind::Import) {
                self.parse_import_statement()
            } else {
                return;
            };

            if parsed {
                if !self.match_kind(TokenKind::Semicolon) && !self.is_at_end() {
                    self.report("expected ';' after prolog declaration");
                    self.skip_to_semicolon();
                }
            } else {
                // recover at the next declaration separator
                self.skip_to_semicolon();
            }
        }
    }

    fn skip_to_semicolon(&mut self) {
        while !self.is_at_end() && !self.check(TokenKind::Semicolon) {
            self.advance();
        }
        self.match_kind(TokenKind::Semicolon);
    }

    /// `module namespace prefix = "uri"` marks the unit a library module.
    fn parse_module_decl(&mut self) -> bool {
        self.advance(); // module
        self.advance(); // namespace
        let Some(prefix) = self.parse_ncname() else {
            return false;
        };
        if !self.expect(TokenKind::Equals, "'=' in module declaration") {
            return false;
        }
        let Some(uri) = self.parse_string_literal_value() else {
            return false;
        };
        if self.prolog.is_library_module {
            self.report("duplicate module declaration");
            return false;
        }
        self.prolog.is_library_module = true;
        self.prolog.module_namespace_prefix = Some(prefix.clone());
        self.prolog.module_namespace_uri = Some(uri.clone());
        self.prolog.declare_namespace(&prefix, &uri);
        true
    }

    fn parse_declare_statement(&mut self) -> bool {
        self.advance(); // declare
        match self.peek().kind {
            TokenKind::Namespace => self.parse_namespace_decl(),
            TokenKind::Default => self.parse_default_decl(),
            TokenKind::Variable => self.parse_variable_decl(),
            TokenKind::Function => self.parse_function_decl(),
            TokenKind::BoundarySpace => self.parse_boundary_space_decl(),
            TokenKind::BaseUri => self.parse_base_uri_decl(),
            TokenKind::Construction => self.parse_construction_decl(),
            TokenKind::Ordering => self.parse_ordering_decl(),
            TokenKind::CopyNamespaces => self.parse_copy_namespaces_decl(),
            TokenKind::DecimalFormat => self.parse_decimal_format_decl(false),
            TokenKind::Option => self.parse_option_decl(),
            _ => {
                let lexeme = self.peek_lexeme().to_string();
                self.report(format!("unsupported declaration 'declare {lexeme}'"));
                false
            }
        }
    }

    fn parse_namespace_decl(&mut self) -> bool {
        self.advance(); // namespace
        let Some(prefix) = self.parse_ncname() else {
            return false;
        };
        if !self.expect(TokenKind::Equals, "'=' in namespace declaration") {
            return false;
        }
        let Some(uri) = self.parse_string_literal_value() else {
            return false;
        };
        if !self.prolog.declare_namespace(&prefix, &uri) {
            self.report(format!("namespace prefix '{prefix}' cannot be redeclared"));
            return false;
        }
        true
    }

    // `declare default element|function namespace "uri"`, `declare default
    // collation "uri"`, `declare default order empty greatest|least`,
    // `declare default decimal-format …`
    fn parse_default_decl(&mut self) -> bool {
        self.advance(); // default
        if self.check(TokenKind::Function) {
            self.advance();
            if !self.match_namespace_word() {
                return false;
            }
            let Some(uri) = self.parse_string_literal_value() else {
                return false;
            };
            self.prolog.default_function_namespace = Some(uri);
            return true;
        }
        if self.match_identifier_keyword("element") {
            if !self.match_namespace_word() {
                return false;
            }
            let Some(uri) = self.parse_string_literal_value() else {
                return false;
            };
            self.prolog.default_element_namespace = Some(uri);
            return true;
        }
        if self.match_kind(TokenKind::Collation) {
            let Some(uri) = self.parse_string_literal_value() else {
                return false;
            };
            if self.prolog.default_collation_declared {
                self.report("duplicate default collation declaration");
                return false;
            }
            self.prolog.default_collation = uri;
            self.prolog.default_collation_declared = true;
            return true;
        }
        if self.match_identifier_keyword("order") || self.match_kind(TokenKind::Order) {
            if !self.expect(TokenKind::Empty, "'empty' in default order declaration") {
                return false;
            }
            if self.prolog.empty_order_declared {
                self.report("duplicate empty order declaration");
                return false;
            }
            if self.match_kind(TokenKind::Greatest) {
                self.prolog.empty_order = EmptyOrder::Greatest;
            } else if self.match_kind(TokenKind::Least) {
                self.prolog.empty_order = EmptyOrder::Least;
            } else {
                self.report("expected 'greatest' or 'least'");
                return false;
            }
            self.prolog.empty_order_declared = true;
            return true;
        }
        if self.check(TokenKind::DecimalFormat) {
            self.advance();
            return self.parse_decimal_format_body(true, String::new());
        }
        let lexeme = self.peek_lexeme().to_string();
        self.report(format!("unsupported declaration 'declare default {lexeme}'"));
        false
    }

    // `namespace` is only promoted to a keyword in some contexts, so both
    // the token kind and the identifier spelling are accepted
    fn match_namespace_word(&mut self) -> bool {
        if self.match_kind(TokenKind::Namespace) || self.match_identifier_keyword("namespace") {
            return true;
        }
        self.report("expected 'namespace'");
        false
    }

    // `declare variable $qname (as type)? (:= expr | external)`
    fn parse_variable_decl(&mut self) -> bool {
        self.advance(); // variable
        if !self.expect(TokenKind::Dollar, "'$' in variable declaration") {
            return false;
        }
        let Some(qname) = self.parse_qname_string() else {
            return false;
        };
        if self.match_kind(TokenKind::As) {
            // the annotation is recorded only for diagnostics
            if self.collect_sequence_type().is_none() {
                return false;
            }
        }

        let mut variable = XQueryVariable {
            qname: qname.clone(),
            ..XQueryVariable::default()
        };
        if self.match_kind(TokenKind::External) {
            variable.is_external = true;
        } else {
            if !self.expect(TokenKind::Assign, "':=' or 'external'") {
                return false;
            }
            let Some(initializer) = self.parse_expr_single() else {
                return false;
            };
            variable.initializer = Some(initializer);
        }
        if !self.prolog.declare_variable(&qname, variable) {
            self.report(format!("duplicate variable declaration '${qname}'"));
            return false;
        }
        true
    }

    // `declare function qname(params) (as type)? ({ body } | external)`
    fn parse_function_decl(&mut self) -> bool {
        self.advance(); // function
        let Some(qname) = self.parse_qname_string() else {
            return false;
        };
        if !self.expect(TokenKind::LParen, "'(' in function declaration") {
            return false;
        }

        let mut function = XQueryFunction {
            qname: qname.clone(),
            ..XQueryFunction::default()
        };
        if !self.check(TokenKind::RParen) {
            loop {
                if !self.expect(TokenKind::Dollar, "'$' in parameter list") {
                    return false;
                }
                let Some(parameter) = self.parse_qname_string() else {
                    return false;
                };
                function.parameter_names.push(parameter);
                if self.match_kind(TokenKind::As) {
                    let Some(parameter_type) = self.collect_sequence_type() else {
                        return false;
                    };
                    function.parameter_types.push(Some(parameter_type));
                } else {
                    function.parameter_types.push(None);
                }
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
        }
        if !self.expect(TokenKind::RParen, "')' to close the parameter list") {
            return false;
        }
        if self.match_kind(TokenKind::As) {
            let Some(return_type) = self.collect_sequence_type() else {
                return false;
            };
            function.return_type = Some(return_type);
        }

        if self.match_kind(TokenKind::External) {
            function.is_external = true;
        } else {
            if !self.expect(TokenKind::LBrace, "'{' to open the function body") {
                return false;
            }
            let Some(body) = self.parse_expr() else {
                return false;
            };
            if !self.expect(TokenKind::RBrace, "'}' to close the function body") {
                return false;
            }
            function.body = Some(body);
        }

        if !self.prolog.declare_function(function) {
            self.report(format!("duplicate function declaration '{qname}'"));
            return false;
        }
        true
    }

    fn parse_boundary_space_decl(&mut self) -> bool {
        self.advance(); // boundary-space
        if self.prolog.boundary_space_declared {
            self.report("duplicate boundary-space declaration");
            return false;
        }
        if self.match_identifier_keyword("preserve") {
            self.prolog.boundary_space = BoundarySpace::Preserve;
        } else if self.match_identifier_keyword("strip") {
            self.prolog.boundary_space = BoundarySpace::Strip;
        } else {
            self.report("expected 'preserve' or 'strip'");
            return false;
        }
        self.prolog.boundary_space_declared = true;
        true
    }

    fn parse_base_uri_decl(&mut self) -> bool {
        self.advance(); // base-uri
        let Some(uri) = self.parse_string_literal_value() else {
            return false;
        };
        if self.prolog.static_base_uri_declared {
            self.report("duplicate base-uri declaration");
            return false;
        }
        self.prolog.static_base_uri = uri;
        self.prolog.static_base_uri_declared = true;
        true
    }

    fn parse_construction_decl(&mut self) -> bool {
        self.advance(); // construction
        if self.prolog.construction_declared {
            self.report("duplicate construction declaration");
            return false;
        }
        if self.match_identifier_keyword("preserve") {
            self.prolog.construction_mode = ConstructionMode::Preserve;
        } else if self.match_identifier_keyword("strip") {
            self.prolog.construction_mode = ConstructionMode::Strip;
        } else {
            self.report("expected 'preserve' or 'strip'");
            return false;
        }
        self.prolog.construction_declared = true;
        true
    }

    fn parse_ordering_decl(&mut self) -> bool {
        self.advance(); // ordering
        if self.prolog.ordering_declared {
            self.report("duplicate ordering declaration");
            return false;
        }
        if self.match_identifier_keyword("ordered") {
            self.prolog.ordering_mode = OrderingMode::Ordered;
        } else if self.match_identifier_keyword("unordered") {
            self.prolog.ordering_mode = OrderingMode::Unordered;
        } else {
            self.report("expected 'ordered' or 'unordered'");
            return false;
        }
        self.prolog.ordering_declared = true;
        true
    }

    // `declare copy-namespaces preserve|no-preserve, inherit|no-inherit`
    fn parse_copy_namespaces_decl(&mut self) -> bool {
        self.advance(); // copy-namespaces
        if self.prolog.copy_namespaces_declared {
            self.report("duplicate copy-namespaces declaration");
            return false;
        }
        if self.match_identifier_keyword("preserve") {
            self.prolog.copy_namespaces.preserve = true;
        } else if self.match_identifier_keyword("no-preserve") {
            self.prolog.copy_namespaces.preserve = false;
        } else {
            self.report("expected 'preserve' or 'no-preserve'");
            return false;
        }
        if !self.expect(TokenKind::Comma, "',' in copy-namespaces declaration") {
            return false;
        }
        if self.match_identifier_keyword("inherit") {
            self.prolog.copy_namespaces.inherit = true;
        } else if self.match_identifier_keyword("no-inherit") {
            self.prolog.copy_namespaces.inherit = false;
        } else {
            self.report("expected 'inherit' or 'no-inherit'");
            return false;
        }
        self.prolog.copy_namespaces_declared = true;
        true
    }

    fn parse_decimal_format_decl(&mut self, is_default: bool) -> bool {
        self.advance(); // decimal-format
        let name = if is_default {
            String::new()
        } else {
            match self.parse_qname_string() {
                Some(name) => name,
                None => return false,
            }
        };
        self.parse_decimal_format_body(is_default, name)
    }

    // property list: `name = "value"` pairs until the separator
    fn parse_decimal_format_body(&mut self, is_default: bool, name: String) -> bool {
        if is_default && self.prolog.default_decimal_format_declared {
            self.report("duplicate default decimal-format declaration");
            return false;
        }
        let mut format = DecimalFormat {
            name: name.clone(),
            ..DecimalFormat::default()
        };
        while self.check_name() {
            let Some(property) = self.parse_ncname() else {
                return false;
            };
            if !self.expect(TokenKind::Equals, "'=' in decimal-format property") {
                return false;
            }
            let Some(value) = self.parse_string_literal_value() else {
                return false;
            };
            match property.as_str() {
                "decimal-separator" => format.decimal_separator = value,
                "grouping-separator" => format.grouping_separator = value,
                "infinity" => format.infinity = value,
                "minus-sign" => format.minus_sign = value,
                "NaN" => format.nan = value,
                "percent" => format.percent = value,
                "per-mille" => format.per_mille = value,
                "zero-digit" => format.zero_digit = value,
                "digit" => format.digit = value,
                "pattern-separator" => format.pattern_separator = value,
                other => {
                    self.report(format!("unknown decimal-format property '{other}'"));
                    return false;
                }
            }
        }
        if is_default {
            self.prolog.default_decimal_format_declared = true;
        }
        self.prolog.decimal_formats.insert(name, format);
        true
    }

    fn parse_option_decl(&mut self) -> bool {
        self.advance(); // option
        let Some(qname) = self.parse_qname_string() else {
            return false;
        };
        let Some(value) = self.parse_string_literal_value() else {
            return false;
        };
        self.prolog.options.insert(qname, value);
        true
    }

    // `import module namespace p = "uri" (at "hint" ("," "hint")*)?` or
    // `import schema …` (accepted and ignored)
    fn parse_import_statement(&mut self) -> bool {
        self.advance(); // import
        if self.check(TokenKind::Module) {
            self.advance();
            if !self.match_namespace_word() {
                return false;
            }
            let Some(prefix) = self.parse_ncname() else {
                return false;
            };
            if !self.expect(TokenKind::Equals, "'=' in module import") {
                return false;
            }
            let Some(uri) = self.parse_string_literal_value() else {
                return false;
            };
            let mut import = ModuleImport {
                target_namespace: uri.clone(),
                location_hints: Vec::new(),
            };
            if self.match_identifier_keyword("at") {
                loop {
                    let Some(hint) = self.parse_string_literal_value() else {
                        return false;
                    };
                    import.location_hints.push(hint);
                    if !self.match_kind(TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.prolog.declare_namespace(&prefix, &uri);
            let mut message = String::new();
            if !self.prolog.declare_module_import(import, &mut message) {
                self.report(message);
                return false;
            }
            return true;
        }
        if self.check(TokenKind::Schema) {
            // schema imports are accepted but carry no meaning here
            while !self.is_at_end() && !self.check(TokenKind::Semicolon) {
                self.advance();
            }
            return true;
        }
        let lexeme = self.peek_lexeme().to_string();
        self.report(format!("unsupported import '{lexeme}'"));
        false
    }
}
