//! Sequence-type syntax. Types are collected back into their lexical form
//! and interpreted at evaluation time against the schema type registry.

use xylem_xquery_lexer::TokenKind;

use super::Parser;

impl<'a> Parser<'a> {
    /// `single_type := qname '?'?` (cast / castable targets).
    pub(crate) fn parse_single_type(&mut self) -> Option<String> {
        let mut text = self.parse_qname_string()?;
        if self.match_kind(TokenKind::QuestionMark) {
            text.push('?');
        }
        Some(text)
    }

    /// Collects a sequence type in lexical form: `empty-sequence()`,
    /// `item()*`, `xs:integer+`, `element(name)?`, `node()`, …
    pub(crate) fn collect_sequence_type(&mut self) -> Option<String> {
        if !self.check_name() {
            let lexeme = self.peek_lexeme().to_string();
            self.report(format!("expected a sequence type, found '{lexeme}'"));
            return None;
        }
        let mut text = self.parse_qname_string()?;

        // kind tests and item()/empty-sequence() carry parentheses
        if self.check(TokenKind::LParen) {
            text.push('(');
            self.advance();
            let mut depth = 1usize;
            while depth > 0 {
                if self.is_at_end() {
                    self.report("unterminated sequence type");
                    return None;
                }
                let token = self.advance();
                match token.kind {
                    TokenKind::LParen => depth += 1,
                    TokenKind::RParen => {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    _ => {}
                }
                text.push_str(self.token_lexeme(token));
            }
            text.push(')');
        }

        // occurrence indicator; `*` may arrive as either token kind
        // depending on the surrounding context
        match self.peek().kind {
            TokenKind::QuestionMark => {
                self.advance();
                text.push('?');
            }
            TokenKind::Wildcard | TokenKind::Multiply => {
                self.advance();
                text.push('*');
            }
            TokenKind::Plus => {
                self.advance();
                text.push('+');
            }
            _ => {}
        }
        Some(text)
    }
}
