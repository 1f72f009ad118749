//! Path expressions: absolute/relative location paths, steps, node tests,
//! predicates, and postfix filter/lookup chains.

use xylem_xquery_lexer::TokenKind;

use crate::ast::{LookupSpecifier, LookupSpecifierKind, NodeKind, XPathNode};

use super::Parser;

pub(crate) const AXIS_NAMES: &[&str] = &[
    "child",
    "descendant",
    "parent",
    "ancestor",
    "following-sibling",
    "preceding-sibling",
    "following",
    "preceding",
    "attribute",
    "namespace",
    "self",
    "descendant-or-self",
    "ancestor-or-self",
];

pub(crate) const KIND_TEST_NAMES: &[&str] = &[
    "node",
    "text",
    "comment",
    "processing-instruction",
    "element",
    "attribute",
    "schema-element",
    "schema-attribute",
    "document-node",
];

impl<'a> Parser<'a> {
    /// `path := '/' relative? | '//' relative | relative`
    pub(crate) fn parse_path_expr(&mut self) -> Option<XPathNode> {
        if self.check(TokenKind::Slash) {
            self.advance();
            let mut path = XPathNode::leaf(NodeKind::Path);
            path.add_child(XPathNode::leaf(NodeKind::Root));
            if self.starts_step() {
                self.parse_relative_steps(&mut path)?;
            }
            return Some(path);
        }
        if self.check(TokenKind::DoubleSlash) {
            self.advance();
            let mut path = XPathNode::leaf(NodeKind::Path);
            path.add_child(XPathNode::leaf(NodeKind::Root));
            path.add_child(descendant_or_self_step());
            if !self.starts_step() {
                self.report("expected a step after '//'");
                return None;
            }
            self.parse_relative_steps(&mut path)?;
            return Some(path);
        }
        self.parse_relative_location_path()
    }

    fn parse_relative_location_path(&mut self) -> Option<XPathNode> {
        let mut path = XPathNode::leaf(NodeKind::Path);
        self.parse_relative_steps(&mut path)?;
        // a lone filter or primary is not a path; unwrap to keep the tree
        // lean and context-independent expressions out of path handling
        if path.child_count() == 1 && path.children[0].kind != NodeKind::Step {
            return Some(path.children.into_iter().next().unwrap());
        }
        Some(path)
    }

    fn parse_relative_steps(&mut self, path: &mut XPathNode) -> Option<()> {
        let first = self.parse_step()?;
        path.add_child(first);
        loop {
            if self.match_kind(TokenKind::Slash) {
                let step = self.parse_step()?;
                path.add_child(step);
            } else if self.match_kind(TokenKind::DoubleSlash) {
                path.add_child(descendant_or_self_step());
                let step = self.parse_step()?;
                path.add_child(step);
            } else {
                return Some(());
            }
        }
    }

    /// `step := axis '::' node_test predicate* | '@' node_test predicate*
    /// | '..' | filter`
    pub(crate) fn parse_step(&mut self) -> Option<XPathNode> {
        if self.check(TokenKind::DoubleDot) {
            self.advance();
            let mut step = XPathNode::leaf(NodeKind::Step);
            step.add_child(XPathNode::new(NodeKind::AxisSpecifier, "parent"));
            step.add_child(XPathNode::new(NodeKind::KindTest, "node"));
            self.parse_step_predicates(&mut step)?;
            return Some(step);
        }

        if self.check(TokenKind::At) {
            self.advance();
            let mut step = XPathNode::leaf(NodeKind::Step);
            step.add_child(XPathNode::new(NodeKind::AxisSpecifier, "attribute"));
            let test = self.parse_node_test()?;
            step.add_child(test);
            self.parse_step_predicates(&mut step)?;
            return Some(step);
        }

        // explicit axis
        if self.check_name()
            && self.peek_at(1).kind == TokenKind::AxisSeparator
            && AXIS_NAMES.contains(&self.peek_lexeme())
        {
            let axis = self.peek_lexeme().to_string();
            self.advance();
            self.advance();
            let mut step = XPathNode::leaf(NodeKind::Step);
            step.add_child(XPathNode::new(NodeKind::AxisSpecifier, axis));
            let test = self.parse_node_test()?;
            step.add_child(test);
            self.parse_step_predicates(&mut step)?;
            return Some(step);
        }

        if self.starts_primary() {
            return self.parse_filter_expr();
        }

        if self.check(TokenKind::Wildcard) || self.check_name() {
            let mut step = XPathNode::leaf(NodeKind::Step);
            step.add_child(XPathNode::new(NodeKind::AxisSpecifier, "child"));
            let test = self.parse_node_test()?;
            step.add_child(test);
            self.parse_step_predicates(&mut step)?;
            return Some(step);
        }

        let lexeme = self.peek_lexeme().to_string();
        self.report(format!("expected a path step, found '{lexeme}'"));
        None
    }

    fn parse_step_predicates(&mut self, step: &mut XPathNode) -> Option<()> {
        while self.check(TokenKind::LBracket) {
            let predicate = self.parse_predicate()?;
            step.add_child(predicate);
        }
        Some(())
    }

    pub(crate) fn parse_predicate(&mut self) -> Option<XPathNode> {
        self.expect(TokenKind::LBracket, "'['");
        let expression = self.parse_expr()?;
        self.expect(TokenKind::RBracket, "']' to close predicate");
        Some(XPathNode::with_children(
            NodeKind::Predicate,
            "",
            vec![expression],
        ))
    }

    /// Name test (`name`, `prefix:name`, `prefix:*`, `*`) or kind test
    /// (`node()`, `text()`, `element(name)`, …).
    pub(crate) fn parse_node_test(&mut self) -> Option<XPathNode> {
        if self.check(TokenKind::Wildcard) {
            self.advance();
            return Some(XPathNode::new(NodeKind::NameTest, "*"));
        }

        if !self.check_name() {
            let lexeme = self.peek_lexeme().to_string();
            self.report(format!("expected a node test, found '{lexeme}'"));
            return None;
        }

        let name = self.peek_lexeme().to_string();
        if self.peek_at(1).kind == TokenKind::LParen && KIND_TEST_NAMES.contains(&name.as_str()) {
            self.advance();
            return self.parse_kind_test(name);
        }

        self.advance();
        // prefixed name or prefix wildcard; the colon must be adjacent
        if self.check(TokenKind::Colon) {
            let colon = self.peek();
            let prev = self.previous();
            if colon.position == prev.position + prev.length {
                self.advance();
                if self.check(TokenKind::Wildcard) {
                    self.advance();
                    return Some(XPathNode::new(NodeKind::NameTest, format!("{name}:*")));
                }
                let local = self.parse_ncname()?;
                return Some(XPathNode::new(NodeKind::NameTest, format!("{name}:{local}")));
            }
        }
        Some(XPathNode::new(NodeKind::NameTest, name))
    }

    // `text()`, `node()`, `comment()`, `processing-instruction(name?)`,
    // `element(name?, type?)`, `attribute(name?, type?)`, `document-node()`
    fn parse_kind_test(&mut self, name: String) -> Option<XPathNode> {
        self.expect(TokenKind::LParen, "'(' in kind test");
        let mut test = XPathNode::new(NodeKind::KindTest, name);
        if !self.check(TokenKind::RParen) {
            if self.check(TokenKind::String) {
                let value = self.parse_string_literal_value()?;
                test.add_child(XPathNode::new(NodeKind::Literal, value));
            } else if self.check(TokenKind::Wildcard) {
                self.advance();
                test.add_child(XPathNode::new(NodeKind::NameTest, "*"));
            } else if self.check_name() {
                let argument = self.parse_qname_string()?;
                test.add_child(XPathNode::new(NodeKind::NameTest, argument));
            }
            // optional type argument; recorded but not enforced
            if self.match_kind(TokenKind::Comma) {
                let type_name = self.parse_qname_string()?;
                test.add_child(XPathNode::new(NodeKind::NameTest, type_name));
            }
        }
        self.expect(TokenKind::RParen, "')' to close kind test");
        Some(test)
    }

    /// `filter := primary (predicate | lookup)*`, the primary wrapped only
    /// when postfix operators are present.
    pub(crate) fn parse_filter_expr(&mut self) -> Option<XPathNode> {
        let mut node = self.parse_primary_expr()?;
        loop {
            if self.check(TokenKind::LBracket) {
                let predicate = self.parse_predicate()?;
                if node.kind != NodeKind::Filter {
                    node = XPathNode::with_children(NodeKind::Filter, "", vec![node]);
                }
                node.add_child(predicate);
            } else if self.check(TokenKind::QuestionMark) && self.lookup_specifier_follows() {
                self.advance();
                let specifier = self.parse_lookup_specifier()?;
                if node.kind != NodeKind::Lookup {
                    node = XPathNode::with_children(NodeKind::Lookup, "", vec![node]);
                }
                node.lookup_specifiers.push(specifier);
            } else {
                return Some(node);
            }
        }
    }

    pub(crate) fn lookup_specifier_follows(&self) -> bool {
        let next = self.peek_at(1);
        next.kind == TokenKind::Number
            || next.kind == TokenKind::Wildcard
            || next.kind == TokenKind::LParen
            || Self::is_identifier_token(next)
    }

    pub(crate) fn parse_lookup_specifier(&mut self) -> Option<LookupSpecifier> {
        if self.check(TokenKind::Wildcard) {
            self.advance();
            return Some(LookupSpecifier {
                kind: LookupSpecifierKind::Wildcard,
                literal: "*".into(),
                expression: None,
            });
        }
        if self.check(TokenKind::Number) {
            let token = self.advance();
            let literal = self.token_lexeme(token).to_string();
            return Some(LookupSpecifier {
                kind: LookupSpecifierKind::IntegerLiteral,
                literal,
                expression: None,
            });
        }
        if self.check(TokenKind::LParen) {
            self.advance();
            let expression = self.parse_expr()?;
            self.expect(TokenKind::RParen, "')' to close lookup expression");
            return Some(LookupSpecifier {
                kind: LookupSpecifierKind::Expression,
                literal: String::new(),
                expression: Some(Box::new(expression)),
            });
        }
        if self.check_name() {
            let token = self.advance();
            let literal = self.token_lexeme(token).to_string();
            return Some(LookupSpecifier {
                kind: LookupSpecifierKind::NcName,
                literal,
                expression: None,
            });
        }
        let lexeme = self.peek_lexeme().to_string();
        self.report(format!("expected a lookup specifier, found '{lexeme}'"));
        None
    }

    pub(crate) fn starts_step(&self) -> bool {
        match self.peek().kind {
            TokenKind::Dot
            | TokenKind::DoubleDot
            | TokenKind::At
            | TokenKind::Wildcard => true,
            _ => self.check_name() || self.starts_primary(),
        }
    }
}

pub(crate) fn descendant_or_self_step() -> XPathNode {
    let mut step = XPathNode::leaf(NodeKind::Step);
    step.add_child(XPathNode::new(NodeKind::AxisSpecifier, "descendant-or-self"));
    step.add_child(XPathNode::new(NodeKind::KindTest, "node"));
    step
}
