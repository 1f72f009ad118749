use xylem_xquery_ast::{
    parse_query, BinaryOperationKind, LookupSpecifierKind, NodeKind, UnaryOperationKind,
};

#[test]
fn parse_simple_path() {
    let parsed = parse_query("/bookstore/book");
    assert!(parsed.is_ok(), "{:?}", parsed.errors);
    let path = parsed.expression.unwrap();
    assert_eq!(path.kind, NodeKind::Path);
    // Root marker plus two steps
    assert_eq!(path.child_count(), 3);
    assert_eq!(path.children[0].kind, NodeKind::Root);
    assert_eq!(path.children[1].kind, NodeKind::Step);
    assert_eq!(path.children[1].children[1].value, "bookstore");
}

#[test]
fn parse_double_slash_desugars() {
    let parsed = parse_query("//a");
    assert!(parsed.is_ok());
    let path = parsed.expression.unwrap();
    assert_eq!(path.children[0].kind, NodeKind::Root);
    let implicit = &path.children[1];
    assert_eq!(implicit.children[0].value, "descendant-or-self");
    assert_eq!(implicit.children[1].kind, NodeKind::KindTest);
}

#[test]
fn parse_attribute_step_with_predicate() {
    let parsed = parse_query("/root/book[@price < 10]/@price");
    assert!(parsed.is_ok(), "{:?}", parsed.errors);
    let path = parsed.expression.unwrap();
    let book = &path.children[2];
    assert_eq!(book.children[2].kind, NodeKind::Predicate);
    let comparison = &book.children[2].children[0];
    assert_eq!(comparison.binary_kind, Some(BinaryOperationKind::GeneralLt));
    let attribute_step = &path.children[3];
    assert_eq!(attribute_step.children[0].value, "attribute");
}

#[test]
fn parse_operator_precedence() {
    // 1 + 2 * 3 parses as 1 + (2 * 3)
    let parsed = parse_query("1 + 2 * 3");
    assert!(parsed.is_ok());
    let root = parsed.expression.unwrap();
    assert_eq!(root.binary_kind, Some(BinaryOperationKind::Add));
    assert_eq!(
        root.children[1].binary_kind,
        Some(BinaryOperationKind::Multiply)
    );
}

#[test]
fn parser_populates_operator_caches() {
    let parsed = parse_query("1 + 2 * 3 and not(-$flag)");
    assert!(parsed.is_ok(), "{:?}", parsed.errors);
    let mut plus_cached = false;
    let mut multiply_cached = false;
    let mut and_cached = false;
    let mut not_cached = false;
    let mut negate_cached = false;
    parsed.expression.unwrap().visit(&mut |node| match node.kind {
        NodeKind::BinaryOp => match node.value.as_str() {
            "+" => plus_cached = node.binary_kind.is_some(),
            "*" => multiply_cached = node.binary_kind.is_some(),
            "and" => and_cached = node.binary_kind.is_some(),
            _ => {}
        },
        NodeKind::UnaryOp => match node.value.as_str() {
            "not" => not_cached = node.unary_kind == Some(UnaryOperationKind::LogicalNot),
            "-" => negate_cached = node.unary_kind == Some(UnaryOperationKind::Negate),
            _ => {}
        },
        _ => {}
    });
    assert!(plus_cached && multiply_cached && and_cached && not_cached && negate_cached);
}

#[test]
fn parse_flwor_clauses() {
    let parsed = parse_query(
        "for $x in /ns/x let $v := $x/@v where $v > 0 order by number($v) return string($v)",
    );
    assert!(parsed.is_ok(), "{:?}", parsed.errors);
    let flwor = parsed.expression.unwrap();
    assert_eq!(flwor.kind, NodeKind::Flwor);
    let kinds: Vec<NodeKind> = flwor.children.iter().map(|child| child.kind).collect();
    assert_eq!(
        kinds,
        vec![
            NodeKind::ForBinding,
            NodeKind::LetBinding,
            NodeKind::WhereClause,
            NodeKind::OrderByClause,
            NodeKind::FunctionCall,
        ]
    );
}

#[test]
fn parse_stable_order_by() {
    let parsed = parse_query("for $x in /a stable order by $x return $x");
    assert!(parsed.is_ok(), "{:?}", parsed.errors);
    let flwor = parsed.expression.unwrap();
    let order = flwor
        .children
        .iter()
        .find(|child| child.kind == NodeKind::OrderByClause)
        .unwrap();
    assert!(order.order_stable);
}

#[test]
fn parse_order_spec_options() {
    let parsed =
        parse_query("for $x in /a order by $x descending empty least return $x");
    assert!(parsed.is_ok(), "{:?}", parsed.errors);
    let flwor = parsed.expression.unwrap();
    let order = flwor
        .children
        .iter()
        .find(|child| child.kind == NodeKind::OrderByClause)
        .unwrap();
    let options = order.children[0].order_options.as_ref().unwrap();
    assert!(options.is_descending);
    assert!(options.has_empty_mode);
    assert!(!options.empty_is_greatest);
}

#[test]
fn parse_group_by_and_count() {
    let parsed =
        parse_query("for $x in /a group by $k := $x/@cat count $n return $n");
    assert!(parsed.is_ok(), "{:?}", parsed.errors);
    let flwor = parsed.expression.unwrap();
    let group = flwor
        .children
        .iter()
        .find(|child| child.kind == NodeKind::GroupByClause)
        .unwrap();
    let key = &group.children[0];
    assert_eq!(key.group_key.as_ref().unwrap().variable_name, "k");
    assert_eq!(key.child_count(), 1);
    assert!(flwor
        .children
        .iter()
        .any(|child| child.kind == NodeKind::CountClause && child.value == "n"));
}

#[test]
fn parse_quantified() {
    let parsed = parse_query("some $x in (1, 2, 3) satisfies $x > 2");
    assert!(parsed.is_ok(), "{:?}", parsed.errors);
    let quantified = parsed.expression.unwrap();
    assert_eq!(quantified.kind, NodeKind::Quantified);
    assert_eq!(quantified.value, "some");
    assert_eq!(quantified.children[0].kind, NodeKind::QuantifiedBinding);
}

#[test]
fn parse_typeswitch() {
    let parsed = parse_query(
        "typeswitch(42) case xs:string return \"s\" case xs:integer return \"i\" default return \"?\"",
    );
    assert!(parsed.is_ok(), "{:?}", parsed.errors);
    let typeswitch = parsed.expression.unwrap();
    assert_eq!(typeswitch.kind, NodeKind::Typeswitch);
    assert_eq!(typeswitch.child_count(), 4);
    let first_case = typeswitch.children[1].typeswitch_case.as_ref().unwrap();
    assert_eq!(first_case.sequence_type, "xs:string");
    let default_case = typeswitch.children[3].typeswitch_case.as_ref().unwrap();
    assert!(default_case.is_default);
}

#[test]
fn parse_cast_and_instance() {
    let parsed = parse_query("\"5\" cast as xs:integer");
    assert!(parsed.is_ok(), "{:?}", parsed.errors);
    let cast = parsed.expression.unwrap();
    assert_eq!(cast.kind, NodeKind::Cast);
    assert_eq!(cast.value, "xs:integer");

    let parsed = parse_query("(1, 2) instance of xs:integer+");
    assert!(parsed.is_ok(), "{:?}", parsed.errors);
    let instance = parsed.expression.unwrap();
    assert_eq!(instance.kind, NodeKind::InstanceOf);
    assert_eq!(instance.value, "xs:integer+");
}

#[test]
fn parse_direct_constructor_with_avt() {
    let parsed = parse_query(r#"<greet who="{/users/u/@name}">Hello</greet>"#);
    assert!(parsed.is_ok(), "{:?}", parsed.errors);
    let element = parsed.expression.unwrap();
    assert_eq!(element.kind, NodeKind::DirectElement);
    let info = element.constructor.as_ref().unwrap();
    assert_eq!(info.name, "greet");
    assert!(info.is_direct);
    assert_eq!(info.attributes.len(), 1);
    let attribute = &info.attributes[0];
    assert_eq!(attribute.name, "who");
    assert!(attribute.has_expressions());
    assert!(attribute.value_parts[0].expression.is_some());
    assert_eq!(element.children[0].kind, NodeKind::TextContent);
    assert_eq!(element.children[0].value, "Hello");
}

#[test]
fn parse_nested_direct_constructors() {
    let parsed = parse_query("<a><b/>text<c>{1 + 2}</c></a>");
    assert!(parsed.is_ok(), "{:?}", parsed.errors);
    let element = parsed.expression.unwrap();
    assert_eq!(element.child_count(), 3);
    assert_eq!(element.children[0].kind, NodeKind::DirectElement);
    assert!(element.children[0]
        .constructor
        .as_ref()
        .unwrap()
        .is_empty_element);
    assert_eq!(element.children[1].kind, NodeKind::TextContent);
    assert_eq!(element.children[2].kind, NodeKind::DirectElement);
}

#[test]
fn parse_computed_constructors() {
    let parsed = parse_query("element result { attribute total { 3 }, text { \"done\" } }");
    assert!(parsed.is_ok(), "{:?}", parsed.errors);
    let element = parsed.expression.unwrap();
    assert_eq!(element.kind, NodeKind::ComputedElement);
    assert_eq!(element.value, "result");
}

#[test]
fn parse_computed_element_with_name_expression() {
    let parsed = parse_query("element { concat(\"a\", \"b\") } { () }");
    assert!(parsed.is_ok(), "{:?}", parsed.errors);
    let element = parsed.expression.unwrap();
    assert!(element.name_expression.is_some());
}

#[test]
fn parse_map_and_lookup() {
    let parsed = parse_query("map { \"a\" : 1, \"b\" : (2, 3) }");
    assert!(parsed.is_ok(), "{:?}", parsed.errors);
    let map = parsed.expression.unwrap();
    assert_eq!(map.kind, NodeKind::MapConstructor);
    assert_eq!(map.map_entries.len(), 2);

    let parsed = parse_query("$m?key");
    assert!(parsed.is_ok(), "{:?}", parsed.errors);
    let lookup = parsed.expression.unwrap();
    assert_eq!(lookup.kind, NodeKind::Lookup);
    assert_eq!(
        lookup.lookup_specifiers[0].kind,
        LookupSpecifierKind::NcName
    );
}

#[test]
fn parse_array_constructors() {
    let parsed = parse_query("[1, 2, 3]");
    assert!(parsed.is_ok(), "{:?}", parsed.errors);
    let square = parsed.expression.unwrap();
    assert_eq!(square.kind, NodeKind::ArrayConstructor);
    assert_eq!(square.value, "square");
    assert_eq!(square.array_members.len(), 3);

    let parsed = parse_query("array { (1, 2), 3 }");
    assert!(parsed.is_ok(), "{:?}", parsed.errors);
    let curly = parsed.expression.unwrap();
    assert_eq!(curly.value, "curly");
}

#[test]
fn parse_union_and_set_operators() {
    let parsed = parse_query("/a/b | /a/c");
    assert!(parsed.is_ok(), "{:?}", parsed.errors);
    let union = parsed.expression.unwrap();
    assert_eq!(union.binary_kind, Some(BinaryOperationKind::Union));

    let parsed = parse_query("$a intersect $b");
    assert!(parsed.is_ok(), "{:?}", parsed.errors);
    let intersect = parsed.expression.unwrap();
    assert_eq!(intersect.binary_kind, Some(BinaryOperationKind::Intersect));
}

#[test]
fn keywords_are_valid_step_names() {
    // every XQuery keyword is a legal NCName and must parse as an element
    // name in a path
    for keyword in ["if", "for", "return", "order", "union", "cast"] {
        let parsed = parse_query(&format!("/{keyword}"));
        assert!(parsed.is_ok(), "step '{keyword}': {:?}", parsed.errors);
        let path = parsed.expression.unwrap();
        assert_eq!(path.children[1].children[1].value, keyword);
    }
}

#[test]
fn parse_prolog_namespace_and_variable() {
    let parsed = parse_query(
        "declare namespace ex = \"http://example.org\"; declare variable $pi := 3.14159; $pi",
    );
    assert!(parsed.is_ok(), "{:?}", parsed.errors);
    assert_eq!(
        parsed.prolog.resolve_prefix("ex"),
        Some("http://example.org")
    );
    let variable = parsed.prolog.find_variable("pi").unwrap();
    assert!(variable.initializer.is_some());
    assert!(!variable.is_external);
}

#[test]
fn parse_prolog_external_variable() {
    let parsed = parse_query("declare variable $flag external; $flag");
    assert!(parsed.is_ok(), "{:?}", parsed.errors);
    assert!(parsed.prolog.find_variable("flag").unwrap().is_external);
}

#[test]
fn parse_prolog_function() {
    let parsed = parse_query(
        "declare function local:square($x) { $x * $x }; local:square(4)",
    );
    assert!(parsed.is_ok(), "{:?}", parsed.errors);
    let function = parsed.prolog.find_function("local:square", 1).unwrap();
    assert_eq!(function.parameter_names, vec!["x"]);
    assert!(function.body.is_some());
}

#[test]
fn parse_prolog_function_with_types() {
    let parsed = parse_query(
        "declare function local:add($a as xs:integer, $b as xs:integer) as xs:integer { $a + $b }; local:add(1, 2)",
    );
    assert!(parsed.is_ok(), "{:?}", parsed.errors);
    let function = parsed.prolog.find_function("local:add", 2).unwrap();
    assert_eq!(function.parameter_types[0].as_deref(), Some("xs:integer"));
    assert_eq!(function.return_type.as_deref(), Some("xs:integer"));
}

#[test]
fn parse_module_declaration() {
    let parsed = parse_query(
        "module namespace math = \"http://example.org/math\"; declare function math:cube($x) { $x * $x * $x };",
    );
    assert!(parsed.is_ok(), "{:?}", parsed.errors);
    assert!(parsed.prolog.is_library_module);
    assert!(parsed.expression.is_none());
    assert_eq!(
        parsed.prolog.module_namespace_uri.as_deref(),
        Some("http://example.org/math")
    );
}

#[test]
fn library_module_export_violation_is_reported() {
    let parsed = parse_query(
        "module namespace math = \"http://example.org/math\"; declare function local:oops() { 1 };",
    );
    assert!(!parsed.is_ok());
}

#[test]
fn parse_module_import() {
    let parsed = parse_query(
        "import module namespace m = \"http://example.org/m\" at \"m.xqm\", \"fallback.xqm\"; m:f()",
    );
    assert!(parsed.is_ok(), "{:?}", parsed.errors);
    assert_eq!(parsed.prolog.module_imports.len(), 1);
    assert_eq!(
        parsed.prolog.module_imports[0].location_hints,
        vec!["m.xqm", "fallback.xqm"]
    );
    assert_eq!(
        parsed.prolog.resolve_prefix("m"),
        Some("http://example.org/m")
    );
}

#[test]
fn parse_boundary_space_and_base_uri() {
    let parsed = parse_query(
        "declare boundary-space preserve; declare base-uri \"http://example.org/base/\"; 1",
    );
    assert!(parsed.is_ok(), "{:?}", parsed.errors);
    assert_eq!(
        parsed.prolog.boundary_space,
        xylem_xquery_ast::BoundarySpace::Preserve
    );
    assert_eq!(parsed.prolog.static_base_uri, "http://example.org/base/");
}

#[test]
fn parse_decimal_format() {
    let parsed = parse_query(
        "declare decimal-format local:euro decimal-separator = \",\" grouping-separator = \".\"; 1",
    );
    assert!(parsed.is_ok(), "{:?}", parsed.errors);
    let format = parsed.prolog.decimal_formats.get("local:euro").unwrap();
    assert_eq!(format.decimal_separator, ",");
    assert_eq!(format.grouping_separator, ".");
    assert_eq!(format.infinity, "INF");
}

#[test]
fn errors_are_accumulated_not_fatal() {
    let parsed = parse_query("declare bogus nonsense; 1 + 2");
    assert!(!parsed.is_ok());
    // the body still parses after recovery at the semicolon
    assert!(parsed.expression.is_some());
}

#[test]
fn duplicate_variable_is_an_error() {
    let parsed = parse_query("declare variable $x := 1; declare variable $x := 2; $x");
    assert!(!parsed.is_ok());
}

#[test]
fn missing_terminator_is_an_error() {
    let parsed = parse_query("(1, 2");
    assert!(!parsed.is_ok());
    assert!(parsed
        .errors
        .first()
        .map(|error| error.message.contains("expected"))
        .unwrap_or(false));
}

#[test]
fn range_expression() {
    let parsed = parse_query("1 to 100");
    assert!(parsed.is_ok(), "{:?}", parsed.errors);
    let range = parsed.expression.unwrap();
    assert_eq!(range.binary_kind, Some(BinaryOperationKind::Range));
}

#[test]
fn comma_sequence_wraps() {
    let parsed = parse_query("1, 2, 3");
    assert!(parsed.is_ok(), "{:?}", parsed.errors);
    let wrapper = parsed.expression.unwrap();
    assert_eq!(wrapper.kind, NodeKind::Expression);
    assert_eq!(wrapper.child_count(), 3);
}
