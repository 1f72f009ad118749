//! Primary expressions: literals, variable references, parenthesised
//! expressions, context item, function calls, and the map/array
//! constructors.

use xylem_xquery_lexer::TokenKind;

use crate::ast::{MapEntry, NodeKind, XPathNode};

use super::paths::KIND_TEST_NAMES;
use super::Parser;

const COMPUTED_CONSTRUCTOR_NAMES: &[&str] = &[
    "element",
    "attribute",
    "text",
    "comment",
    "processing-instruction",
    "document",
];

impl<'a> Parser<'a> {
    /// Lookahead: does the current token begin a primary expression rather
    /// than an axis step?
    pub(crate) fn starts_primary(&self) -> bool {
        match self.peek().kind {
            TokenKind::Number
            | TokenKind::String
            | TokenKind::Dollar
            | TokenKind::LParen
            | TokenKind::Dot
            | TokenKind::TagOpen
            | TokenKind::PiStart
            | TokenKind::LBracket => true,
            TokenKind::QuestionMark => self.lookup_specifier_follows(),
            _ if Self::is_identifier_token(self.peek()) => {
                let name = self.peek_lexeme();
                let next = self.peek_at(1).kind;
                if next == TokenKind::LParen {
                    // kind tests parse as steps, everything else callable
                    // is a function call
                    return !KIND_TEST_NAMES.contains(&name);
                }
                if next == TokenKind::LBrace {
                    return name == "map"
                        || name == "array"
                        || COMPUTED_CONSTRUCTOR_NAMES.contains(&name);
                }
                // `element name {…}` / `attribute name {…}` /
                // `processing-instruction name {…}`
                if matches!(name, "element" | "attribute" | "processing-instruction")
                    && Self::is_identifier_token(self.peek_at(1))
                    && self.peek_at(2).kind == TokenKind::LBrace
                {
                    return true;
                }
                false
            }
            _ => false,
        }
    }

    pub(crate) fn parse_primary_expr(&mut self) -> Option<XPathNode> {
        match self.peek().kind {
            TokenKind::Number => {
                let token = self.advance();
                let text = self.token_lexeme(token).to_string();
                Some(XPathNode::new(NodeKind::Number, text))
            }
            TokenKind::String => {
                let token = self.advance();
                let text = self.block.token_text(self.source, token).to_string();
                Some(XPathNode::new(NodeKind::Literal, text))
            }
            TokenKind::Dollar => {
                self.advance();
                let name = self.parse_qname_string()?;
                Some(XPathNode::new(NodeKind::VariableReference, name))
            }
            TokenKind::Dot => {
                self.advance();
                Some(XPathNode::leaf(NodeKind::ContextItem))
            }
            TokenKind::LParen => {
                self.advance();
                if self.match_kind(TokenKind::RParen) {
                    return Some(XPathNode::leaf(NodeKind::EmptySequence));
                }
                let expression = self.parse_expr()?;
                self.expect(TokenKind::RParen, "')'");
                Some(expression)
            }
            TokenKind::LBracket => self.parse_square_array_constructor(),
            TokenKind::QuestionMark => {
                // unary lookup applies to the context item
                self.advance();
                let specifier = self.parse_lookup_specifier()?;
                let mut lookup = XPathNode::with_children(
                    NodeKind::Lookup,
                    "",
                    vec![XPathNode::leaf(NodeKind::ContextItem)],
                );
                lookup.lookup_specifiers.push(specifier);
                Some(lookup)
            }
            TokenKind::TagOpen | TokenKind::PiStart => self.parse_direct_constructor(),
            _ if Self::is_identifier_token(self.peek()) => self.parse_named_primary(),
            _ => {
                let lexeme = self.peek_lexeme().to_string();
                self.report(format!("unexpected token '{lexeme}'"));
                None
            }
        }
    }

    // map/array/computed-constructor/function-call, all led by a name
    fn parse_named_primary(&mut self) -> Option<XPathNode> {
        let name = self.peek_lexeme();
        let next = self.peek_at(1).kind;

        if name == "map" && next == TokenKind::LBrace {
            return self.parse_map_constructor();
        }
        if name == "array" && next == TokenKind::LBrace {
            return self.parse_curly_array_constructor();
        }
        if COMPUTED_CONSTRUCTOR_NAMES.contains(&name)
            && (next == TokenKind::LBrace
                || (matches!(name, "element" | "attribute" | "processing-instruction")
                    && Self::is_identifier_token(self.peek_at(1))
                    && self.peek_at(2).kind == TokenKind::LBrace))
        {
            return self.parse_computed_constructor();
        }
        self.parse_function_call()
    }

    pub(crate) fn parse_function_call(&mut self) -> Option<XPathNode> {
        let name = self.parse_qname_string()?;
        if !self.expect(TokenKind::LParen, "'(' in function call") {
            return None;
        }
        let mut call = XPathNode::new(NodeKind::FunctionCall, name);
        if !self.check(TokenKind::RParen) {
            loop {
                let argument = self.parse_expr_single()?;
                call.add_child(argument);
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')' to close function call");
        Some(call)
    }

    /// `map { key : value, … }`
    fn parse_map_constructor(&mut self) -> Option<XPathNode> {
        self.advance(); // map
        self.expect(TokenKind::LBrace, "'{' after 'map'");
        let mut node = XPathNode::leaf(NodeKind::MapConstructor);
        if !self.check(TokenKind::RBrace) {
            loop {
                let key = self.parse_expr_single()?;
                if !self.expect(TokenKind::Colon, "':' between map key and value") {
                    return None;
                }
                let value = self.parse_expr_single()?;
                node.map_entries.push(MapEntry {
                    key: Box::new(key),
                    value: Box::new(value),
                });
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RBrace, "'}' to close map constructor");
        Some(node)
    }

    /// `[ member, … ]` — one array member per comma-separated expression.
    fn parse_square_array_constructor(&mut self) -> Option<XPathNode> {
        self.advance(); // [
        let mut node = XPathNode::new(NodeKind::ArrayConstructor, "square");
        if !self.check(TokenKind::RBracket) {
            loop {
                let member = self.parse_expr_single()?;
                node.array_members.push(member);
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RBracket, "']' to close array constructor");
        Some(node)
    }

    /// `array { expr }` — one member per item of the evaluated sequence.
    fn parse_curly_array_constructor(&mut self) -> Option<XPathNode> {
        self.advance(); // array
        self.expect(TokenKind::LBrace, "'{' after 'array'");
        let mut node = XPathNode::new(NodeKind::ArrayConstructor, "curly");
        if !self.check(TokenKind::RBrace) {
            let content = self.parse_expr()?;
            node.array_members.push(content);
        }
        self.expect(TokenKind::RBrace, "'}' to close array constructor");
        Some(node)
    }
}
