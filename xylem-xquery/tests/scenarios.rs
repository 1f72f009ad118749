//! End-to-end scenarios over the public query surface.

use std::sync::Arc;

use xylem_xquery::{
    parse_document, CallbackAction, Document, SearchOutcome, ValueType, XQuery,
};

fn doc(xml: &str) -> Arc<Document> {
    parse_document(xml, "", 0).expect("well-formed test document")
}

// S1 — attribute predicate
#[test]
fn attribute_predicate() {
    let mut query = XQuery::new("/root/book[@price < 10]/@price/string()");
    let document = doc(r#"<root><book price="5"/><book price="12"/><book price="8"/></root>"#);
    query.evaluate(document).unwrap();
    assert_eq!(query.result_string(), "5 8");
}

// S2 — FLWOR with order by
#[test]
fn flwor_with_order_by() {
    let mut query =
        XQuery::new("for $x in /ns/x order by number($x/@v) return string($x/@v)");
    let document = doc(r#"<ns><x v="3"/><x v="1"/><x v="2"/></ns>"#);
    query.evaluate(document).unwrap();
    assert_eq!(query.result_string(), "1 2 3");
}

// S3 — range and aggregate, no document
#[test]
fn range_and_aggregate() {
    let mut query = XQuery::new("sum(1 to 100)");
    query.activate().unwrap();
    assert_eq!(query.result_string(), "5050");
    assert_eq!(query.result_type(), ValueType::Number);
}

// S4 — direct constructor with attribute value template
#[test]
fn direct_constructor_with_avt() {
    let mut query = XQuery::new(r#"<greet who="{/users/u/@name}">Hello</greet>"#);
    let document = doc(r#"<users><u name="Ada"/></users>"#);
    query.evaluate(document).unwrap();
    assert_eq!(query.result_string(), r#"<greet who="Ada">Hello</greet>"#);
}

// S5 — typeswitch
#[test]
fn typeswitch_dispatch() {
    let mut query = XQuery::new(
        "typeswitch(42) case xs:string return \"s\" case xs:integer return \"i\" default return \"?\"",
    );
    query.activate().unwrap();
    assert_eq!(query.result_string(), "i");
}

// S6 — search callback termination
#[test]
fn search_callback_termination() {
    let mut query = XQuery::new("//a");
    let document = doc("<r><a/><a/><a/></r>");
    let mut invocations = 0;
    let mut callback = |_node: &xylem_xquery::NodeEntry| {
        invocations += 1;
        CallbackAction::Terminate
    };
    let outcome = query.search(document, Some(&mut callback)).unwrap();
    assert_eq!(outcome, SearchOutcome::Terminated);
    assert_eq!(invocations, 1);
}

#[test]
fn search_visits_matches_in_document_order() {
    let mut query = XQuery::new("//b");
    let document = doc(r#"<r><b n="1"/><a><b n="2"/></a><b n="3"/></r>"#);
    let mut seen = Vec::new();
    let mut callback = |node: &xylem_xquery::NodeEntry| {
        seen.push(
            node.doc
                .attribute_value(node.node, "n")
                .unwrap_or("")
                .to_string(),
        );
        CallbackAction::Continue
    };
    let outcome = query.search(document, Some(&mut callback)).unwrap();
    assert_eq!(outcome, SearchOutcome::Matched);
    assert_eq!(seen, vec!["1", "2", "3"]);
}

#[test]
fn search_without_callback_parks_cursor() {
    let mut query = XQuery::new("//b");
    let document = doc(r#"<r><a/><b n="first"/><b n="second"/></r>"#);
    let outcome = query.search(document, None).unwrap();
    assert_eq!(outcome, SearchOutcome::Matched);
    let cursor = query.search_cursor().unwrap();
    assert_eq!(cursor.doc.attribute_value(cursor.node, "n"), Some("first"));
}

#[test]
fn search_reports_no_match() {
    let mut query = XQuery::new("//nothing");
    let document = doc("<r><a/></r>");
    let outcome = query.search(document, None).unwrap();
    assert_eq!(outcome, SearchOutcome::NoMatch);
}

// ----- surface behaviour -----------------------------------------------

#[test]
fn syntax_errors_populate_error_msg() {
    let mut query = XQuery::new("1 +");
    let error = query.activate().unwrap_err();
    assert_eq!(error.code, xylem_xquery::ErrorCode::XPST0003);
    assert!(!query.error_msg().is_empty());
    assert!(query.result().is_empty());
    assert_eq!(query.result_string(), "");
}

#[test]
fn setting_statement_invalidates_compiled_form() {
    let mut query = XQuery::new("1 + 1");
    query.activate().unwrap();
    assert_eq!(query.result_string(), "2");

    query.set_statement("2 + 2");
    query.activate().unwrap();
    assert_eq!(query.result_string(), "4");
}

#[test]
fn clear_keeps_statement_and_path() {
    let mut query = XQuery::new("1 + 1");
    query.set_path("/tmp/");
    query.activate().unwrap();
    query.clear();
    assert_eq!(query.statement(), "1 + 1");
    assert_eq!(query.path(), "/tmp/");
    assert!(query.result().is_empty());
    // still runnable after a clear
    query.activate().unwrap();
    assert_eq!(query.result_string(), "2");
}

#[test]
fn keys_are_visible_as_variables() {
    let mut query = XQuery::new("concat('Hello, ', $who)");
    query.set_key("who", Some("Ada"));
    query.activate().unwrap();
    assert_eq!(query.result_string(), "Hello, Ada");
    assert_eq!(query.get_key("who"), Some("Ada"));

    query.set_key("who", None);
    assert_eq!(query.get_key("who"), None);
    assert!(query.activate().is_err());
}

#[test]
fn feature_flags_reflect_query_shape() {
    use xylem_xquery::FeatureFlags;

    let mut query = XQuery::new("<a>{matches('x', 'y')}</a>");
    let flags = query.feature_flags().unwrap();
    assert!(flags.contains(FeatureFlags::USES_CONSTRUCTORS));
    assert!(flags.contains(FeatureFlags::USES_REGEX));
    assert!(!flags.contains(FeatureFlags::USES_MODULES));

    let mut query = XQuery::new("1 + 1");
    assert!(query.feature_flags().unwrap().is_empty());
}

#[test]
fn functions_and_variables_listings() {
    let mut query = XQuery::new(
        "declare variable $pi := 3.14; declare function local:area($r) { $pi * $r * $r }; local:area(2)",
    );
    query.set_key("host-var", Some("x"));
    query.activate().unwrap();
    let functions = query.functions();
    assert!(functions.contains(&"local:area".to_string()));
    let variables = query.variables();
    assert!(variables.contains(&"pi".to_string()));
    assert!(variables.contains(&"host-var".to_string()));
}

#[test]
fn registered_functions_are_retained() {
    let mut query = XQuery::new("1");
    query.register_function(
        "my:custom",
        Box::new(|_args| Ok(xylem_xquery::XPathVal::Empty)),
    );
    assert_eq!(query.registered_function_names(), vec!["my:custom"]);
}

#[test]
fn result_type_for_node_sets() {
    let mut query = XQuery::new("/r/a");
    let document = doc("<r><a/></r>");
    query.evaluate(document).unwrap();
    assert_eq!(query.result_type(), ValueType::NodeSet);
}

#[test]
fn activate_without_statement_is_an_error() {
    let mut query = XQuery::default();
    assert!(query.activate().is_err());
    assert!(!query.error_msg().is_empty());
}

#[test]
fn evaluation_errors_clear_results() {
    let mut query = XQuery::new("$undefined");
    let error = query.activate().unwrap_err();
    assert_eq!(error.code, xylem_xquery::ErrorCode::XPST0008);
    assert!(query.result().is_empty());
    assert_eq!(query.result_string(), "");
    assert!(query.error_msg().contains("undefined"));
}

#[test]
fn reuse_across_documents() {
    let mut query = XQuery::new("string(/r/@v)");
    for (xml, expected) in [
        (r#"<r v="1"/>"#, "1"),
        (r#"<r v="2"/>"#, "2"),
        (r#"<r v="3"/>"#, "3"),
    ] {
        query.evaluate(doc(xml)).unwrap();
        assert_eq!(query.result_string(), expected);
    }
}

#[test]
fn stable_and_plain_order_by_agree() {
    // this engine's order by is a stable sort, so the two forms produce
    // the same permutation and the stable form keeps input order in ties
    let plain = {
        let mut query =
            XQuery::new("for $i in (4, 3, 2, 1) order by $i mod 2 return $i");
        query.activate().unwrap();
        query.result_string().to_string()
    };
    let stable = {
        let mut query =
            XQuery::new("for $i in (4, 3, 2, 1) stable order by $i mod 2 return $i");
        query.activate().unwrap();
        query.result_string().to_string()
    };
    assert_eq!(stable, "4 2 3 1");
    assert_eq!(plain, stable);
}

#[test]
fn serialized_constructor_snapshot() {
    let mut query = XQuery::new(
        r#"<report total="{count(/items/item)}">{for $i in /items/item return <line>{string($i/@name)}</line>}</report>"#,
    );
    let document = doc(r#"<items><item name="alpha"/><item name="beta"/></items>"#);
    query.evaluate(document).unwrap();
    insta::assert_snapshot!(
        query.result_string(),
        @r#"<report total="2"><line>alpha</line><line>beta</line></report>"#
    );
}
