use std::sync::{Arc, Mutex};

use xylem_interpreter::xml::parse_document;
use xylem_interpreter::{
    CompiledXQuery, ErrorCode, Evaluator, HostEnvironment, NullHost, Result, ValueType,
    XPathVal,
};

struct MapHost {
    texts: Vec<(String, String)>,
    documents: Vec<(String, String)>,
    text_loads: Mutex<usize>,
}

impl MapHost {
    fn new() -> Self {
        MapHost {
            texts: Vec::new(),
            documents: Vec::new(),
            text_loads: Mutex::new(0),
        }
    }

    fn with_text(mut self, uri: &str, text: &str) -> Self {
        self.texts.push((uri.to_string(), text.to_string()));
        self
    }

    fn with_document(mut self, uri: &str, xml: &str) -> Self {
        self.documents.push((uri.to_string(), xml.to_string()));
        self
    }

    fn text_load_count(&self) -> usize {
        *self.text_loads.lock().unwrap()
    }
}

impl HostEnvironment for MapHost {
    fn load_document(
        &self,
        uri: &str,
        order_key: u64,
    ) -> Result<Arc<xylem_interpreter::xml::Document>> {
        for (candidate, xml) in &self.documents {
            if candidate == uri {
                return parse_document(xml, uri, order_key).map_err(|error| {
                    xylem_interpreter::Error::with_message(ErrorCode::FODC0002, error.to_string())
                });
            }
        }
        Err(xylem_interpreter::Error::with_message(
            ErrorCode::FODC0002,
            format!("no such document '{uri}'"),
        ))
    }

    fn load_text(&self, uri: &str, _encoding: Option<&str>) -> Result<String> {
        *self.text_loads.lock().unwrap() += 1;
        for (candidate, text) in &self.texts {
            if candidate == uri {
                return Ok(text.clone());
            }
        }
        Err(xylem_interpreter::Error::with_message(
            ErrorCode::FOUT1170,
            format!("no such resource '{uri}'"),
        ))
    }
}

fn eval(query: &str) -> XPathVal {
    let compiled = CompiledXQuery::compile(query, "").expect("compile");
    let host = NullHost;
    let mut evaluator = Evaluator::new(&compiled, &host);
    evaluator.evaluate(None).expect("evaluate")
}

fn eval_err(query: &str) -> xylem_interpreter::Error {
    let compiled = CompiledXQuery::compile(query, "").expect("compile");
    let host = NullHost;
    let mut evaluator = Evaluator::new(&compiled, &host);
    evaluator.evaluate(None).expect_err("expected an error")
}

fn eval_xml(query: &str, xml: &str) -> XPathVal {
    let compiled = CompiledXQuery::compile(query, "").expect("compile");
    let host = NullHost;
    let mut evaluator = Evaluator::new(&compiled, &host);
    let document = parse_document(xml, "", 0).expect("parse xml");
    evaluator.evaluate(Some(document)).expect("evaluate")
}

// ----- atoms and arithmetic --------------------------------------------

#[test]
fn arithmetic_and_precedence() {
    assert_eq!(eval("1 + 2 * 3").to_number(), 7.0);
    assert_eq!(eval("(1 + 2) * 3").to_number(), 9.0);
    assert_eq!(eval("10 - 2 - 3").to_number(), 5.0);
    assert_eq!(eval("10 - (2 - 3)").to_number(), 11.0);
    assert_eq!(eval("7 mod 3").to_number(), 1.0);
    assert_eq!(eval("1.5 div 0.5").to_number(), 3.0);
}

#[test]
fn integer_division_by_zero_is_an_error() {
    assert_eq!(eval_err("1 div 0").code, ErrorCode::FOAR0001);
}

#[test]
fn arithmetic_with_empty_operand_is_empty() {
    assert!(eval("() + 1").is_empty());
    assert!(eval("- ()").is_empty());
}

#[test]
fn sum_of_range() {
    // the classic: integers format without a fractional part
    let result = eval("sum(1 to 100)");
    assert_eq!(result.value_type(), ValueType::Number);
    assert_eq!(result.to_string_value(), "5050");
}

#[test]
fn range_edge_cases() {
    assert_eq!(eval("count(3 to 1)").to_number(), 0.0);
    assert_eq!(eval("count(2 to 2)").to_number(), 1.0);
}

#[test]
fn unary_negation() {
    assert_eq!(eval("-(3)").to_number(), -3.0);
    assert_eq!(eval("--3").to_number(), 3.0);
    assert_eq!(eval("not(0)").to_boolean(), true);
}

// ----- comparisons ------------------------------------------------------

#[test]
fn value_and_general_comparisons() {
    assert_eq!(eval("1 eq 1").to_boolean(), true);
    assert_eq!(eval("1 lt 2").to_boolean(), true);
    assert_eq!(eval("'b' gt 'a'").to_boolean(), true);
    // general comparison is existential
    assert_eq!(eval("(1, 2, 3) = 2").to_boolean(), true);
    assert_eq!(eval("(1, 2, 3) = 4").to_boolean(), false);
    // both sides existential
    assert_eq!(eval("(1, 2) = (2, 5)").to_boolean(), true);
}

#[test]
fn value_comparison_with_empty_is_empty() {
    assert!(eval("() eq 1").is_empty());
}

#[test]
fn value_comparison_rejects_sequences() {
    assert_eq!(eval_err("(1, 2) eq 1").code, ErrorCode::XPTY0004);
}

// ----- control flow -----------------------------------------------------

#[test]
fn conditional_evaluates_single_branch() {
    assert_eq!(eval("if (1) then 'yes' else 'no'").to_string_value(), "yes");
    assert_eq!(eval("if (0) then 'yes' else 'no'").to_string_value(), "no");
    // the untaken branch must not run: this would divide by zero
    assert_eq!(eval("if (1) then 2 else 1 div 0").to_number(), 2.0);
}

#[test]
fn let_and_for() {
    assert_eq!(eval("let $x := 2 return $x * 3").to_number(), 6.0);
    assert_eq!(
        eval("for $i in (1, 2, 3) return $i * 10").to_string_value(),
        "10 20 30"
    );
    // cartesian product across for clauses
    assert_eq!(
        eval("for $a in (1, 2), $b in (10, 20) return $a + $b").to_string_value(),
        "11 21 12 22"
    );
}

#[test]
fn where_filters_tuples() {
    assert_eq!(
        eval("for $i in 1 to 10 where $i mod 2 = 0 return $i").to_string_value(),
        "2 4 6 8 10"
    );
}

#[test]
fn order_by_sorts_tuples() {
    assert_eq!(
        eval("for $i in (3, 1, 2) order by $i return $i").to_string_value(),
        "1 2 3"
    );
    assert_eq!(
        eval("for $i in (3, 1, 2) order by $i descending return $i").to_string_value(),
        "3 2 1"
    );
}

#[test]
fn order_by_empty_modes() {
    // the key for 0 evaluates to the empty sequence
    assert_eq!(
        eval("for $i in (2, 0, 1) order by (if ($i = 0) then () else $i) empty least return $i")
            .to_string_value(),
        "0 1 2"
    );
    assert_eq!(
        eval("for $i in (2, 0, 1) order by (if ($i = 0) then () else $i) empty greatest return $i")
            .to_string_value(),
        "1 2 0"
    );
}

#[test]
fn stable_order_preserves_tie_order() {
    // keys tie in pairs; input order within each tie group must survive
    let stable = eval(
        "for $i in (4, 3, 2, 1) stable order by $i mod 2 return $i",
    );
    assert_eq!(stable.to_string_value(), "4 2 3 1");
}

#[test]
fn count_clause_numbers_tuples() {
    assert_eq!(
        eval("for $x in ('a', 'b', 'c') count $n return concat($n, $x)").to_string_value(),
        "1a 2b 3c"
    );
}

#[test]
fn group_by_partitions() {
    assert_eq!(
        eval(
            "for $i in 1 to 6 group by $k := $i mod 2 return concat($k, ':', string-join(for $j in $i return string($j), ','))"
        )
        .to_string_value(),
        "1:1,3,5 0:2,4,6"
    );
}

#[test]
fn quantified_expressions() {
    assert_eq!(eval("some $x in (1, 2, 3) satisfies $x > 2").to_boolean(), true);
    assert_eq!(eval("every $x in (1, 2, 3) satisfies $x > 2").to_boolean(), false);
    assert_eq!(eval("every $x in (3, 4) satisfies $x > 2").to_boolean(), true);
    // empty sequence: some is false, every is true
    assert_eq!(eval("some $x in () satisfies $x").to_boolean(), false);
    assert_eq!(eval("every $x in () satisfies $x").to_boolean(), true);
}

#[test]
fn typeswitch_dispatch() {
    assert_eq!(
        eval("typeswitch(42) case xs:string return \"s\" case xs:integer return \"i\" default return \"?\"")
            .to_string_value(),
        "i"
    );
    assert_eq!(
        eval("typeswitch('x') case xs:string return \"s\" default return \"?\"")
            .to_string_value(),
        "s"
    );
    assert_eq!(
        eval("typeswitch(1.5) case xs:integer return \"i\" default return \"?\"")
            .to_string_value(),
        "?"
    );
    // case variable binding
    assert_eq!(
        eval("typeswitch(7) case $n as xs:integer return $n * 2 default return 0").to_number(),
        14.0
    );
}

// ----- casts ------------------------------------------------------------

#[test]
fn cast_and_castable() {
    assert_eq!(eval("'5' cast as xs:integer").to_number(), 5.0);
    assert_eq!(eval("'5' castable as xs:integer").to_boolean(), true);
    assert_eq!(eval("'x' castable as xs:integer").to_boolean(), false);
    assert_eq!(eval("() castable as xs:integer?").to_boolean(), true);
    assert_eq!(eval_err("'x' cast as xs:integer").code, ErrorCode::FORG0001);
}

#[test]
fn instance_of_and_treat() {
    assert_eq!(eval("42 instance of xs:integer").to_boolean(), true);
    assert_eq!(eval("42.5 instance of xs:integer").to_boolean(), false);
    assert_eq!(eval("(1, 2) instance of xs:integer+").to_boolean(), true);
    assert_eq!(eval("() instance of empty-sequence()").to_boolean(), true);
    assert_eq!(eval("(1, 2) treat as xs:integer+").to_string_value(), "1 2");
    assert_eq!(eval_err("'s' treat as xs:integer").code, ErrorCode::XPDY0050);
}

#[test]
fn type_constructor_functions() {
    assert_eq!(eval("xs:integer('5') + 1").to_number(), 6.0);
    assert_eq!(eval("xs:boolean('true')").to_boolean(), true);
}

// ----- paths ------------------------------------------------------------

const BOOKS: &str =
    r#"<root><book price="5"/><book price="12"/><book price="8"/></root>"#;

#[test]
fn attribute_predicate_path() {
    let result = eval_xml("/root/book[@price < 10]/@price/string()", BOOKS);
    assert_eq!(result.to_string_value(), "5 8");
}

#[test]
fn positional_predicates() {
    let result = eval_xml("/root/book[2]/@price/string()", BOOKS);
    assert_eq!(result.to_string_value(), "12");
    let result = eval_xml("/root/book[last()]/@price/string()", BOOKS);
    assert_eq!(result.to_string_value(), "8");
}

#[test]
fn descendant_paths_are_in_document_order() {
    let doc = r#"<a><b><c/></b><d/><b><e/></b></a>"#;
    let result = eval_xml("//b | //a//d", doc);
    let XPathVal::NodeSet(set) = &result else {
        panic!("expected a node-set");
    };
    let names: Vec<String> = set.entries.iter().map(|entry| entry.name()).collect();
    assert_eq!(names, vec!["b", "d", "b"]);
    // strict ordering with no duplicates
    let mut keys: Vec<_> = set.entries.iter().map(|entry| entry.order_key()).collect();
    let original = keys.clone();
    keys.sort();
    keys.dedup();
    assert_eq!(keys, original);
}

#[test]
fn union_deduplicates() {
    let result = eval_xml("count(//book | /root/book)", BOOKS);
    assert_eq!(result.to_number(), 3.0);
}

#[test]
fn intersect_and_except() {
    assert_eq!(
        eval_xml("count(/root/book intersect /root/book[@price = '5'])", BOOKS).to_number(),
        1.0
    );
    assert_eq!(
        eval_xml("count(/root/book except /root/book[@price = '5'])", BOOKS).to_number(),
        2.0
    );
}

#[test]
fn axes_and_kind_tests() {
    let doc = r#"<r><x>one</x><!-- note --><y t="v">two</y></r>"#;
    assert_eq!(eval_xml("count(/r/node())", doc).to_number(), 3.0);
    assert_eq!(eval_xml("count(/r/comment())", doc).to_number(), 1.0);
    assert_eq!(eval_xml("string(/r/y/text())", doc).to_string_value(), "two");
    assert_eq!(
        eval_xml("/r/y/attribute::t/string()", doc).to_string_value(),
        "v"
    );
    assert_eq!(
        eval_xml("string(/r/x/following-sibling::y)", doc).to_string_value(),
        "two"
    );
    assert_eq!(
        eval_xml("/r/y/ancestor-or-self::*/name()", doc).to_string_value(),
        "r y"
    );
}

#[test]
fn parent_and_self_abbreviations() {
    let doc = r#"<a><b><c/></b></a>"#;
    assert_eq!(eval_xml("string(/a/b/c/../name())", doc).to_string_value(), "b");
    assert_eq!(eval_xml("count(//c/ancestor::*)", doc).to_number(), 2.0);
}

#[test]
fn axis_complementarity_property() {
    // preceding-sibling | self | following-sibling == parent/*
    let doc = r#"<r><a/><b/><c/><d/></r>"#;
    let combined = eval_xml(
        "count(/r/b/preceding-sibling::* | /r/b/self::* | /r/b/following-sibling::*)",
        doc,
    );
    let siblings = eval_xml("count(/r/*)", doc);
    assert_eq!(combined.to_number(), siblings.to_number());
}

#[test]
fn filter_with_positional_predicate() {
    assert_eq!(eval("(10, 20, 30)[2]").to_number(), 20.0);
    assert_eq!(eval("(10, 20, 30)[. > 15]").to_string_value(), "20 30");
}

#[test]
fn unsupported_predicate_excludes_candidate_without_aborting() {
    // the failing predicate (unknown function) must not abort the query
    let compiled =
        CompiledXQuery::compile("/root/book[no-such-fn(.)] | /root/book[@price = '5']", "")
            .unwrap();
    let host = NullHost;
    let mut evaluator = Evaluator::new(&compiled, &host);
    let document = parse_document(BOOKS, "", 0).unwrap();
    let result = evaluator.evaluate(Some(document)).unwrap();
    assert_eq!(result.item_count(), 1);
    assert!(!evaluator.warnings().is_empty());
}

// ----- constructors -----------------------------------------------------

#[test]
fn direct_constructor_with_avt() {
    let result = eval_xml(
        r#"<greet who="{/users/u/@name}">Hello</greet>"#,
        r#"<users><u name="Ada"/></users>"#,
    );
    assert_eq!(
        result.to_output_string(),
        r#"<greet who="Ada">Hello</greet>"#
    );
}

#[test]
fn constructor_embeds_copied_nodes() {
    let result = eval_xml("<wrap>{/r/x}</wrap>", "<r><x>inner</x></r>");
    assert_eq!(result.to_output_string(), "<wrap><x>inner</x></wrap>");
}

#[test]
fn constructor_spaces_adjacent_atomics() {
    let result = eval("<t>{1, 2, 3}</t>");
    assert_eq!(result.to_output_string(), "<t>1 2 3</t>");
}

#[test]
fn computed_constructors() {
    let result = eval("element result { attribute total { 2 + 1 }, text { 'done' } }");
    assert_eq!(result.to_output_string(), r#"<result total="3">done</result>"#);
}

#[test]
fn computed_element_with_name_expression() {
    let result = eval("element { concat('a', 'b') } { 1 }");
    assert_eq!(result.to_output_string(), "<ab>1</ab>");
}

#[test]
fn constructed_nodes_have_single_parent_chain() {
    let result = eval("<a><b/><c/></a>");
    let XPathVal::NodeSet(set) = &result else {
        panic!("expected a node-set");
    };
    let entry = &set.entries[0];
    let doc = &entry.doc;
    for &child in &doc.node(entry.node).children {
        assert_eq!(doc.node(child).parent, Some(entry.node));
    }
    assert_eq!(doc.node(entry.node).children, vec![1, 2]);
}

#[test]
fn constructed_elements_are_queryable() {
    let result = eval("count(<a><b/><b/></a>/b)");
    assert_eq!(result.to_number(), 2.0);
}

// ----- maps, arrays, lookup --------------------------------------------

#[test]
fn map_constructor_and_lookup() {
    assert_eq!(eval("map { 'a' : 1, 'b' : 2 }?b").to_number(), 2.0);
    assert_eq!(eval("map { 'a' : 1 }?missing").is_empty(), true);
    assert_eq!(
        eval("map { 'a' : 1, 'b' : 2 }?*").to_string_value(),
        "1 2"
    );
}

#[test]
fn array_constructor_and_lookup() {
    assert_eq!(eval("[10, 20, 30]?2").to_number(), 20.0);
    assert_eq!(eval("array { (1, 2), 3 }?1").to_number(), 1.0);
    assert_eq!(eval("[ (1, 2), 3 ]?1").to_string_value(), "1 2");
    assert_eq!(eval_err("[1]?4").code, ErrorCode::FOAY0001);
}

#[test]
fn map_array_builtin_functions() {
    assert_eq!(eval("map:size(map { 'a' : 1 })").to_number(), 1.0);
    assert_eq!(eval("map:get(map { 'a' : 7 }, 'a')").to_number(), 7.0);
    assert_eq!(eval("map:contains(map { 'a' : 1 }, 'b')").to_boolean(), false);
    assert_eq!(eval("array:size([1, 2, 3])").to_number(), 3.0);
    assert_eq!(eval("array:get([5, 6], 2)").to_number(), 6.0);
    assert_eq!(eval("array:size(array:append([1], 9))").to_number(), 2.0);
}

// ----- functions --------------------------------------------------------

#[test]
fn string_functions() {
    assert_eq!(eval("concat('a', 'b', 'c')").to_string_value(), "abc");
    assert_eq!(eval("substring('12345', 2, 3)").to_string_value(), "234");
    assert_eq!(eval("upper-case('ada')").to_string_value(), "ADA");
    assert_eq!(eval("normalize-space('  a   b ')").to_string_value(), "a b");
    assert_eq!(eval("translate('bare', 'abr', 'AB')").to_string_value(), "BAe");
    assert_eq!(eval("string-join(('a', 'b'), '-')").to_string_value(), "a-b");
    assert_eq!(eval("string-length('héllo')").to_number(), 5.0);
    assert_eq!(eval("substring-before('a=b', '=')").to_string_value(), "a");
    assert_eq!(eval("substring-after('a=b', '=')").to_string_value(), "b");
    assert_eq!(eval("contains('abc', 'b')").to_boolean(), true);
    assert_eq!(eval("encode-for-uri('a b')").to_string_value(), "a%20b");
}

#[test]
fn sequence_functions() {
    assert_eq!(eval("count(distinct-values((1, 2, 2, 3)))").to_number(), 3.0);
    assert_eq!(eval("index-of((10, 20, 10), 10)").to_string_value(), "1 3");
    assert_eq!(eval("reverse((1, 2, 3))").to_string_value(), "3 2 1");
    assert_eq!(eval("subsequence((1, 2, 3, 4), 2, 2)").to_string_value(), "2 3");
    assert_eq!(eval("insert-before((1, 3), 2, 2)").to_string_value(), "1 2 3");
    assert_eq!(eval("remove((1, 2, 3), 2)").to_string_value(), "1 3");
    assert_eq!(eval("deep-equal((1, 2), (1, 2))").to_boolean(), true);
    assert_eq!(eval("exactly-one(5)").to_number(), 5.0);
    assert_eq!(eval_err("exactly-one((1, 2))").code, ErrorCode::FORG0005);
    assert_eq!(eval_err("one-or-more(())").code, ErrorCode::FORG0004);
}

#[test]
fn numeric_functions() {
    assert_eq!(eval("floor(2.7)").to_number(), 2.0);
    assert_eq!(eval("ceiling(2.1)").to_number(), 3.0);
    assert_eq!(eval("round(2.5)").to_number(), 3.0);
    assert_eq!(eval("round(-2.5)").to_number(), -2.0);
    assert_eq!(eval("round-half-to-even(2.5)").to_number(), 2.0);
    assert_eq!(eval("abs(-4)").to_number(), 4.0);
    assert_eq!(eval("min((3, 1, 2))").to_number(), 1.0);
    assert_eq!(eval("max((3, 1, 2))").to_number(), 3.0);
    assert_eq!(eval("avg((1, 2, 3))").to_number(), 2.0);
}

#[test]
fn regex_functions() {
    assert_eq!(eval("matches('abracadabra', 'bra')").to_boolean(), true);
    assert_eq!(eval("matches('ABC', 'abc', 'i')").to_boolean(), true);
    assert_eq!(
        eval("replace('banana', 'a', 'o')").to_string_value(),
        "bonono"
    );
    assert_eq!(
        eval("tokenize('a, b,c', ',\\s*')").to_string_value(),
        "a b c"
    );
    assert_eq!(
        eval("count(analyze-string('a1b2', '[0-9]')//match)").to_number(),
        2.0
    );
}

#[test]
fn datetime_functions() {
    assert_eq!(eval("year-from-date('2020-02-29')").to_number(), 2020.0);
    assert_eq!(eval("month-from-date('2020-02-29')").to_number(), 2.0);
    assert_eq!(
        eval("hours-from-dateTime('2020-01-01T13:30:05')").to_number(),
        13.0
    );
    assert_eq!(eval("seconds-from-duration('PT1M30S')").to_number(), 30.0);
    assert_eq!(eval("days-from-duration('P2DT12H')").to_number(), 2.0);
    // current-date returns a valid xs:date with timezone
    assert_eq!(
        eval("current-date() castable as xs:date").to_boolean(),
        true
    );
    assert_eq!(
        eval("string-length(string(current-dateTime())) > 18").to_boolean(),
        true
    );
}

#[test]
fn formatting_functions() {
    assert_eq!(
        eval("format-number(1234.5, '#,##0.00')").to_string_value(),
        "1,234.50"
    );
    assert_eq!(eval("format-integer(7, '001')").to_string_value(), "007");
    assert_eq!(eval("format-integer(1984, 'I')").to_string_value(), "MCMLXXXIV");
    assert_eq!(
        eval("format-date('2026-08-01', '[D] [MNn] [Y]')").to_string_value(),
        "1 August 2026"
    );
}

#[test]
fn node_functions() {
    let doc = r#"<r id="top"><x xml:id="first"/><y idref="first"/></r>"#;
    assert_eq!(eval_xml("name(/r/x)", doc).to_string_value(), "x");
    assert_eq!(eval_xml("string(id('first')/name())", doc).to_string_value(), "x");
    assert_eq!(eval_xml("count(idref('first'))", doc).to_number(), 1.0);
    assert_eq!(eval_xml("name(root(/r/x))", doc).to_string_value(), "r");
}

// ----- prolog, variables, user functions -------------------------------

#[test]
fn prolog_variables_and_functions() {
    assert_eq!(
        eval("declare variable $pi := 3.14; $pi * 2").to_number(),
        6.28
    );
    assert_eq!(
        eval("declare function local:square($x) { $x * $x }; local:square(7)").to_number(),
        49.0
    );
    assert_eq!(
        eval("declare function local:fact($n) { if ($n le 1) then 1 else $n * local:fact($n - 1) }; local:fact(5)")
            .to_number(),
        120.0
    );
}

#[test]
fn host_variables_are_visible() {
    let compiled = CompiledXQuery::compile("$who", "").unwrap();
    let host = NullHost;
    let mut evaluator = Evaluator::new(&compiled, &host);
    evaluator.set_variable("who", XPathVal::String("Ada".into()));
    assert_eq!(evaluator.evaluate(None).unwrap().to_string_value(), "Ada");
}

#[test]
fn unresolved_variable_is_an_error() {
    assert_eq!(eval_err("$nope").code, ErrorCode::XPST0008);
}

#[test]
fn unresolved_function_is_an_error() {
    assert_eq!(eval_err("frobnicate(1)").code, ErrorCode::XPST0017);
}

#[test]
fn circular_variable_initialisation_recovers_empty() {
    let compiled = CompiledXQuery::compile(
        "declare variable $a := $b; declare variable $b := $a; $a",
        "",
    )
    .unwrap();
    let host = NullHost;
    let mut evaluator = Evaluator::new(&compiled, &host);
    let result = evaluator.evaluate(None).unwrap();
    assert!(result.is_empty());
    assert!(evaluator
        .warnings()
        .iter()
        .any(|warning| warning.contains("circular")));
}

#[test]
fn runaway_recursion_is_bounded() {
    let error = eval_err("declare function local:loop($n) { local:loop($n + 1) }; local:loop(0)");
    assert_eq!(error.code, ErrorCode::StackOverflow);
}

#[test]
fn variable_scope_hygiene() {
    let compiled = CompiledXQuery::compile(
        "for $x in 1 to 3 let $y := $x + 1 where $y > 1 return $x * $y",
        "",
    )
    .unwrap();
    let host = NullHost;
    let mut evaluator = Evaluator::new(&compiled, &host);
    evaluator.set_variable("keep", XPathVal::String("me".into()));
    let before = evaluator.variable_snapshot();
    evaluator.evaluate(None).unwrap();
    // the binding table is exactly what it was before the evaluation
    assert_eq!(evaluator.variable_snapshot(), before);
}

// ----- arena and metrics ------------------------------------------------

#[test]
fn arena_discipline_across_evaluations() {
    let compiled = CompiledXQuery::compile("//book[@price > 1]/@price/string()", "").unwrap();
    let host = NullHost;
    let mut evaluator = Evaluator::new(&compiled, &host);
    let mut previous_total = 0usize;
    for _ in 0..3 {
        let document = parse_document(BOOKS, "", 0).unwrap();
        evaluator.evaluate(Some(document)).unwrap();
        assert_eq!(evaluator.arena_outstanding(), 0);
        let total: usize = evaluator.arena_free_list_sizes().iter().sum();
        assert!(total >= previous_total);
        previous_total = total;
    }
}

#[test]
fn operator_caches_avoid_fallbacks() {
    let compiled = CompiledXQuery::compile("1 + 2 * 3 and not(-4)", "").unwrap();
    let host = NullHost;
    let mut evaluator = Evaluator::new(&compiled, &host);
    evaluator.evaluate(None).unwrap();
    assert_eq!(evaluator.binary_operator_cache_misses(), 0);
    assert_eq!(evaluator.unary_operator_cache_misses(), 0);
}

// ----- boolean monotonicity property -----------------------------------

#[test]
fn double_negation_preserves_truth() {
    for query in ["1 < 2", "'a' = 'b'", "exists((1, 2))", "contains('abc', 'z')"] {
        let plain = eval(query).to_boolean();
        let wrapped = eval(&format!("not(not({query}))")).to_boolean();
        assert_eq!(plain, wrapped, "not(not(…)) changed '{query}'");
    }
}

// ----- documents and modules -------------------------------------------

#[test]
fn doc_function_uses_cache() {
    let host = MapHost::new().with_document(
        "http://example.org/data.xml",
        "<data><v>41</v></data>",
    );
    let compiled =
        CompiledXQuery::compile("doc('http://example.org/data.xml')/data/v/string()", "")
            .unwrap();
    let mut evaluator = Evaluator::new(&compiled, &host);
    assert_eq!(evaluator.evaluate(None).unwrap().to_string_value(), "41");
    // second run hits the compiled query's document cache
    assert_eq!(evaluator.evaluate(None).unwrap().to_string_value(), "41");
    assert!(compiled
        .cached_document("http://example.org/data.xml")
        .is_some());
}

#[test]
fn doc_available_reports_missing() {
    let host = MapHost::new();
    let compiled = CompiledXQuery::compile("doc-available('missing.xml')", "").unwrap();
    let mut evaluator = Evaluator::new(&compiled, &host);
    assert_eq!(evaluator.evaluate(None).unwrap().to_boolean(), false);
}

#[test]
fn unparsed_text_lines() {
    let host = MapHost::new().with_text("notes.txt", "one\ntwo\nthree");
    let compiled =
        CompiledXQuery::compile("count(unparsed-text-lines('notes.txt'))", "").unwrap();
    let mut evaluator = Evaluator::new(&compiled, &host);
    assert_eq!(evaluator.evaluate(None).unwrap().to_number(), 3.0);
}

const MATH_MODULE: &str = r#"module namespace math = "http://example.org/math";
declare variable $math:pi := 3.14159;
declare function math:cube($x) { $x * $x * $x };
"#;

#[test]
fn module_import_function_and_variable() {
    let host = MapHost::new().with_text("math.xqm", MATH_MODULE);
    let compiled = CompiledXQuery::compile(
        "import module namespace math = \"http://example.org/math\" at \"math.xqm\"; math:cube(3)",
        "",
    )
    .unwrap();
    let mut evaluator = Evaluator::new(&compiled, &host);
    assert_eq!(evaluator.evaluate(None).unwrap().to_number(), 27.0);

    let compiled = CompiledXQuery::compile(
        "import module namespace math = \"http://example.org/math\" at \"math.xqm\"; $math:pi",
        "",
    )
    .unwrap();
    let mut evaluator = Evaluator::new(&compiled, &host);
    assert_eq!(evaluator.evaluate(None).unwrap().to_number(), 3.14159);
}

#[test]
fn module_cache_is_idempotent() {
    let host = MapHost::new().with_text("math.xqm", MATH_MODULE);
    let compiled = CompiledXQuery::compile(
        "import module namespace math = \"http://example.org/math\" at \"math.xqm\"; math:cube(2) + math:cube(3)",
        "",
    )
    .unwrap();
    let mut evaluator = Evaluator::new(&compiled, &host);
    assert_eq!(evaluator.evaluate(None).unwrap().to_number(), 35.0);
    // one text fetch despite two calls
    assert_eq!(host.text_load_count(), 1);
    let first = compiled
        .module_cache
        .find_module("http://example.org/math")
        .unwrap();
    let second = compiled
        .module_cache
        .fetch_or_load("http://example.org/math", &[], "", &host)
        .unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn circular_module_import_is_detected() {
    let module_a = r#"module namespace a = "http://example.org/a";
import module namespace b = "http://example.org/b" at "b.xqm";
declare function a:f() { 1 };
"#;
    let module_b = r#"module namespace b = "http://example.org/b";
import module namespace a = "http://example.org/a" at "a.xqm";
declare function b:f() { 2 };
"#;
    let host = MapHost::new()
        .with_text("a.xqm", module_a)
        .with_text("b.xqm", module_b);
    let compiled = CompiledXQuery::compile(
        "import module namespace a = \"http://example.org/a\" at \"a.xqm\"; a:f()",
        "",
    )
    .unwrap();
    let mut evaluator = Evaluator::new(&compiled, &host);
    let error = evaluator.evaluate(None).unwrap_err();
    assert_eq!(error.code, ErrorCode::XQST0093);
}

// ----- search -----------------------------------------------------------

#[test]
fn search_with_terminating_callback() {
    use xylem_interpreter::CallbackAction;

    let compiled = CompiledXQuery::compile("//a", "").unwrap();
    let host = NullHost;
    let mut evaluator = Evaluator::new(&compiled, &host);
    let document = parse_document("<r><a/><a/><a/></r>", "", 0).unwrap();

    let mut invocations = 0;
    let mut callback = |_entry: &xylem_interpreter::xml::NodeEntry| {
        invocations += 1;
        CallbackAction::Terminate
    };
    let (outcome, _) = evaluator
        .search(document, Some(&mut callback))
        .unwrap();
    assert_eq!(outcome, xylem_interpreter::SearchOutcome::Terminated);
    assert_eq!(invocations, 1);
}

#[test]
fn search_without_callback_parks_on_first_match() {
    let compiled = CompiledXQuery::compile("//b", "").unwrap();
    let host = NullHost;
    let mut evaluator = Evaluator::new(&compiled, &host);
    let document = parse_document("<r><a/><b i=\"1\"/><b i=\"2\"/></r>", "", 0).unwrap();
    let (outcome, cursor) = evaluator.search(document, None).unwrap();
    assert_eq!(outcome, xylem_interpreter::SearchOutcome::Matched);
    let cursor = cursor.unwrap();
    assert_eq!(cursor.doc.attribute_value(cursor.node, "i"), Some("1"));
}

#[test]
fn search_with_no_match() {
    let compiled = CompiledXQuery::compile("//zzz", "").unwrap();
    let host = NullHost;
    let mut evaluator = Evaluator::new(&compiled, &host);
    let document = parse_document("<r><a/></r>", "", 0).unwrap();
    let (outcome, cursor) = evaluator.search(document, None).unwrap();
    assert_eq!(outcome, xylem_interpreter::SearchOutcome::NoMatch);
    assert!(cursor.is_none());
}
