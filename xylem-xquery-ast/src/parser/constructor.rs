//! Direct (`<a b="{…}">…</a>`) and computed (`element a {…}`) node
//! constructors.

use xylem_xquery_lexer::TokenKind;

use crate::ast::{
    AttributeValuePart, ConstructorAttribute, ConstructorInfo, NodeKind, XPathNode,
};

use super::Parser;

impl<'a> Parser<'a> {
    pub(crate) fn parse_direct_constructor(&mut self) -> Option<XPathNode> {
        if self.check(TokenKind::PiStart) {
            return self.parse_direct_pi();
        }
        self.expect(TokenKind::TagOpen, "'<' to open a direct constructor");

        let (prefix, name) = self.parse_constructor_qname()?;
        let mut info = ConstructorInfo {
            prefix,
            name,
            is_direct: true,
            ..ConstructorInfo::default()
        };

        // attributes up to `>` or `/>`
        while !self.check(TokenKind::TagClose) && !self.check(TokenKind::EmptyTagClose) {
            if self.is_at_end() {
                self.report("unterminated direct constructor tag");
                return None;
            }
            let attribute = self.parse_constructor_attribute()?;
            info.attributes.push(attribute);
        }

        let mut element = XPathNode::leaf(NodeKind::DirectElement);
        if self.match_kind(TokenKind::EmptyTagClose) {
            info.is_empty_element = true;
            element.constructor = Some(Box::new(info));
            return Some(element);
        }
        self.expect(TokenKind::TagClose, "'>' to close constructor tag");

        // element content: text runs, embedded expressions, nested
        // constructors
        loop {
            match self.peek().kind {
                TokenKind::TextContent => {
                    let token = self.advance();
                    let text = self.block.token_text(self.source, token).to_string();
                    element.add_child(XPathNode::new(NodeKind::TextContent, text));
                }
                TokenKind::LBrace => {
                    self.advance();
                    if self.match_kind(TokenKind::RBrace) {
                        continue;
                    }
                    let expression = self.parse_expr()?;
                    self.expect(TokenKind::RBrace, "'}' to close embedded expression");
                    element.add_child(expression);
                }
                TokenKind::TagOpen | TokenKind::PiStart => {
                    let nested = self.parse_direct_constructor()?;
                    element.add_child(nested);
                }
                TokenKind::CloseTagOpen => break,
                TokenKind::EndOfInput => {
                    self.report(format!(
                        "missing closing tag for element '{}'",
                        info.name
                    ));
                    return None;
                }
                _ => {
                    let lexeme = self.peek_lexeme().to_string();
                    self.report(format!(
                        "unexpected token '{lexeme}' in constructor content"
                    ));
                    return None;
                }
            }
        }

        self.expect(TokenKind::CloseTagOpen, "'</'");
        let (close_prefix, close_name) = self.parse_constructor_qname()?;
        if close_name != info.name || close_prefix != info.prefix {
            self.report(format!(
                "mismatched closing tag: expected '{}', found '{close_name}'",
                info.name
            ));
        }
        self.expect(TokenKind::TagClose, "'>' to close the closing tag");

        element.constructor = Some(Box::new(info));
        Some(element)
    }

    // `<?target data?>`; the data keeps its token texts, joined by single
    // spaces.
    fn parse_direct_pi(&mut self) -> Option<XPathNode> {
        self.expect(TokenKind::PiStart, "'<?'");
        let target = self.parse_ncname()?;
        let mut data = String::new();
        while !self.check(TokenKind::PiEnd) {
            if self.is_at_end() {
                self.report("unterminated processing-instruction constructor");
                return None;
            }
            let token = self.advance();
            if !data.is_empty() {
                data.push(' ');
            }
            data.push_str(self.token_lexeme(token));
        }
        self.expect(TokenKind::PiEnd, "'?>'");
        let mut node = XPathNode::new(NodeKind::PiConstructor, target);
        if !data.is_empty() {
            node.add_child(XPathNode::new(NodeKind::TextContent, data));
        }
        Some(node)
    }

    // QName inside a tag; `(prefix, local)` with an empty prefix for plain
    // names.
    pub(crate) fn parse_constructor_qname(&mut self) -> Option<(String, String)> {
        let first = self.parse_ncname()?;
        if self.check(TokenKind::Colon) {
            let colon = self.peek();
            let prev = self.previous();
            if colon.position == prev.position + prev.length {
                self.advance();
                let local = self.parse_ncname()?;
                return Some((first, local));
            }
        }
        Some((String::new(), first))
    }

    fn parse_constructor_attribute(&mut self) -> Option<ConstructorAttribute> {
        let (prefix, name) = self.parse_constructor_qname()?;
        let mut attribute = ConstructorAttribute {
            is_namespace_declaration: prefix == "xmlns" || (prefix.is_empty() && name == "xmlns"),
            prefix,
            name,
            ..ConstructorAttribute::default()
        };

        if !self.expect(TokenKind::Equals, "'=' after attribute name") {
            return None;
        }
        if !self.check(TokenKind::String) {
            let lexeme = self.peek_lexeme().to_string();
            self.report(format!(
                "expected a quoted attribute value, found '{lexeme}'"
            ));
            return None;
        }
        let token = self.advance();
        if token.value_parts.is_empty() {
            // plain value scanned outside template processing
            let text = self.block.token_text(self.source, token).to_string();
            attribute.value_parts.push(AttributeValuePart {
                is_expression: false,
                text,
                expression: None,
            });
            return Some(attribute);
        }
        for part in &token.value_parts {
            let text = self.block.text(self.source, part.text).to_string();
            let expression = if part.is_expression {
                self.parse_embedded_expr(&text).map(Box::new)
            } else {
                None
            };
            if part.is_expression && expression.is_none() {
                return None;
            }
            attribute.value_parts.push(AttributeValuePart {
                is_expression: part.is_expression,
                text,
                expression,
            });
        }
        Some(attribute)
    }

    /// `element name {…}`, `element {name-expr} {…}`, and the attribute /
    /// text / comment / processing-instruction / document forms.
    pub(crate) fn parse_computed_constructor(&mut self) -> Option<XPathNode> {
        let keyword = {
            let token = self.advance();
            self.token_lexeme(token).to_string()
        };
        match keyword.as_str() {
            "element" => self.parse_computed_named(NodeKind::ComputedElement),
            "attribute" => self.parse_computed_named(NodeKind::ComputedAttribute),
            "processing-instruction" => self.parse_computed_named(NodeKind::PiConstructor),
            "text" => self.parse_computed_content(NodeKind::TextConstructor),
            "comment" => self.parse_computed_content(NodeKind::CommentConstructor),
            "document" => self.parse_computed_content(NodeKind::DocumentConstructor),
            other => {
                self.report(format!("unknown computed constructor '{other}'"));
                None
            }
        }
    }

    fn parse_computed_named(&mut self, kind: NodeKind) -> Option<XPathNode> {
        let mut node = XPathNode::leaf(kind);
        if self.check(TokenKind::LBrace) {
            // computed name
            self.advance();
            let name_expression = self.parse_expr()?;
            self.expect(TokenKind::RBrace, "'}' to close name expression");
            node.name_expression = Some(Box::new(name_expression));
        } else {
            let name = self.parse_qname_string()?;
            node.value = name;
        }
        if let Some(content) = self.parse_enclosed_expr()? {
            node.add_child(content);
        }
        Some(node)
    }

    fn parse_computed_content(&mut self, kind: NodeKind) -> Option<XPathNode> {
        let mut node = XPathNode::leaf(kind);
        if let Some(content) = self.parse_enclosed_expr()? {
            node.add_child(content);
        }
        Some(node)
    }

    /// `{ expr? }`; `Ok(None)` models an empty body.
    #[allow(clippy::option_option)]
    pub(crate) fn parse_enclosed_expr(&mut self) -> Option<Option<XPathNode>> {
        if !self.expect(TokenKind::LBrace, "'{'") {
            return None;
        }
        if self.match_kind(TokenKind::RBrace) {
            return Some(None);
        }
        let expression = self.parse_expr()?;
        self.expect(TokenKind::RBrace, "'}'");
        Some(Some(expression))
    }
}
