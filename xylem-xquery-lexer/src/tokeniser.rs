// The tokeniser converts an XQuery string into a token vector that the
// parser consumes. It is a single-pass byte scanner with short lookahead.
// Two classic ambiguities are settled here rather than in the parser:
// `*` is either a multiply operator or a name wildcard, and `<` either
// opens a comparison or a direct element constructor. Both decisions need
// the previous token as explicit scanner state, so the scanner carries
// `previous`/`prior` token kinds instead of relying on lookahead alone.
//
// Direct constructor bodies switch the scanner into a content mode that
// emits TEXT_CONTENT runs until `<` or `{`; `{{` and `}}` escape to
// literal braces. Attribute values inside constructor tags are split into
// literal/expression template parts.

use itertools::Itertools;

use crate::token::{AttributeValuePart, Token, TokenBlock, TokenKind, TokenText};

const KEYWORDS: &[(&str, TokenKind)] = &[
    ("and", TokenKind::And),
    ("or", TokenKind::Or),
    ("not", TokenKind::Not),
    ("div", TokenKind::Divide),
    ("mod", TokenKind::Modulo),
    ("eq", TokenKind::Eq),
    ("ne", TokenKind::Ne),
    ("lt", TokenKind::Lt),
    ("le", TokenKind::Le),
    ("gt", TokenKind::Gt),
    ("ge", TokenKind::Ge),
    ("if", TokenKind::If),
    ("then", TokenKind::Then),
    ("else", TokenKind::Else),
    ("for", TokenKind::For),
    ("let", TokenKind::Let),
    ("in", TokenKind::In),
    ("return", TokenKind::Return),
    ("where", TokenKind::Where),
    ("group", TokenKind::Group),
    ("by", TokenKind::By),
    ("order", TokenKind::Order),
    ("stable", TokenKind::Stable),
    ("ascending", TokenKind::Ascending),
    ("descending", TokenKind::Descending),
    ("empty", TokenKind::Empty),
    ("default", TokenKind::Default),
    ("typeswitch", TokenKind::Typeswitch),
    ("case", TokenKind::Case),
    ("declare", TokenKind::Declare),
    ("function", TokenKind::Function),
    ("variable", TokenKind::Variable),
    ("namespace", TokenKind::Namespace),
    ("external", TokenKind::External),
    ("boundary-space", TokenKind::BoundarySpace),
    ("base-uri", TokenKind::BaseUri),
    ("greatest", TokenKind::Greatest),
    ("least", TokenKind::Least),
    ("collation", TokenKind::Collation),
    ("construction", TokenKind::Construction),
    ("ordering", TokenKind::Ordering),
    ("copy-namespaces", TokenKind::CopyNamespaces),
    ("decimal-format", TokenKind::DecimalFormat),
    ("option", TokenKind::Option),
    ("import", TokenKind::Import),
    ("module", TokenKind::Module),
    ("schema", TokenKind::Schema),
    ("count", TokenKind::Count),
    ("some", TokenKind::Some),
    ("every", TokenKind::Every),
    ("satisfies", TokenKind::Satisfies),
    ("to", TokenKind::To),
    ("cast", TokenKind::Cast),
    ("castable", TokenKind::Castable),
    ("treat", TokenKind::Treat),
    ("as", TokenKind::As),
    ("instance", TokenKind::Instance),
    ("of", TokenKind::Of),
];

const MULTI_CHAR_OPERATORS: &[(&str, TokenKind)] = &[
    ("//", TokenKind::DoubleSlash),
    ("..", TokenKind::DoubleDot),
    ("::", TokenKind::AxisSeparator),
    ("!=", TokenKind::NotEquals),
    ("<=", TokenKind::LessEqual),
    (">=", TokenKind::GreaterEqual),
    (":=", TokenKind::Assign),
];

fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\r' | b'\n')
}

fn is_digit(byte: u8) -> bool {
    byte.is_ascii_digit()
}

// Non-ASCII bytes are accepted as name characters so multi-byte UTF-8
// names stay intact; finer classification is left to the parser.
fn is_name_start_char(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_' || byte >= 0x80
}

fn is_name_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'-' | b'.') || byte >= 0x80
}

/// Single-pass scanner producing a [`TokenBlock`].
///
/// A tokeniser may be reused across queries; all per-run state is reset by
/// [`Tokeniser::tokenize`].
#[derive(Debug, Default)]
pub struct Tokeniser {
    position: usize,
    previous: Option<TokenKind>,
    prior: Option<TokenKind>,
}

impl Tokeniser {
    pub fn new() -> Self {
        Tokeniser::default()
    }

    pub fn tokenize(&mut self, source: &str) -> TokenBlock {
        self.tokenize_into(source, TokenBlock::new())
    }

    /// Tokenises into an existing block, reusing its storage.
    pub fn tokenize_into(&mut self, source: &str, mut block: TokenBlock) -> TokenBlock {
        self.position = 0;
        self.previous = None;
        self.prior = None;
        block.reset();
        // typical char-to-token ratio is about 6:1
        block.tokens.reserve(source.len() / 6);

        let input = source.as_bytes();
        let mut bracket_depth = 0usize;
        let mut paren_depth = 0usize;
        let mut direct_constructor_depth = 0usize;
        let mut inside_direct_tag = false;
        let mut pending_close_tag = false;
        // expression depth is scoped per constructor: a constructor nested
        // inside `{…}` starts its own content mode
        let mut constructor_expr_depth = 0usize;
        let mut saved_expr_depths: Vec<usize> = Vec::new();

        while self.position < input.len() {
            let in_constructor_content =
                direct_constructor_depth > 0 && !inside_direct_tag && constructor_expr_depth == 0;

            if !in_constructor_content {
                self.skip_whitespace(input);
                if self.position >= input.len() {
                    break;
                }
            }

            if in_constructor_content {
                match self.scan_text_content(input, &mut block) {
                    ContentStep::Emitted => continue,
                    ContentStep::Structural => {}
                }
            }

            if self.position >= input.len() {
                break;
            }

            let ch = input[self.position];

            if inside_direct_tag && ch == b'/' && self.peek(input, 1) == Some(b'>') {
                let start = self.position;
                self.position += 2;
                self.push(&mut block, Token::new(TokenKind::EmptyTagClose, borrowed(start, 2), start, 2));
                inside_direct_tag = false;
                pending_close_tag = false;
                direct_constructor_depth = direct_constructor_depth.saturating_sub(1);
                constructor_expr_depth = saved_expr_depths.pop().unwrap_or(0);
                continue;
            }
            if inside_direct_tag && ch == b'?' && self.peek(input, 1) == Some(b'>') {
                let start = self.position;
                self.position += 2;
                self.push(&mut block, Token::new(TokenKind::PiEnd, borrowed(start, 2), start, 2));
                inside_direct_tag = false;
                pending_close_tag = false;
                continue;
            }
            if inside_direct_tag && (ch == b'\'' || ch == b'"') {
                let token = self.scan_attribute_value(input, ch, true, &mut block);
                self.push(&mut block, token);
                continue;
            }
            if inside_direct_tag && ch == b'>' {
                let start = self.position;
                self.position += 1;
                self.push(&mut block, Token::new(TokenKind::TagClose, borrowed(start, 1), start, 1));
                inside_direct_tag = false;
                if pending_close_tag {
                    direct_constructor_depth = direct_constructor_depth.saturating_sub(1);
                    constructor_expr_depth = saved_expr_depths.pop().unwrap_or(0);
                }
                pending_close_tag = false;
                continue;
            }
            if ch == b'{' {
                let start = self.position;
                self.position += 1;
                self.push(&mut block, Token::new(TokenKind::LBrace, borrowed(start, 1), start, 1));
                if direct_constructor_depth > 0 && !inside_direct_tag {
                    constructor_expr_depth += 1;
                }
                continue;
            }
            if ch == b'}' {
                let start = self.position;
                self.position += 1;
                self.push(&mut block, Token::new(TokenKind::RBrace, borrowed(start, 1), start, 1));
                if direct_constructor_depth > 0 && !inside_direct_tag && constructor_expr_depth > 0 {
                    constructor_expr_depth -= 1;
                }
                continue;
            }
            if ch == b'<' {
                let start = self.position;
                if self.peek(input, 1) == Some(b'=') {
                    self.position += 2;
                    self.push(&mut block, Token::new(TokenKind::LessEqual, borrowed(start, 2), start, 2));
                    continue;
                }

                let prev_is_operand = last_token_is_operand(&block.tokens);
                let name_pos = self.lookahead_non_whitespace(input, self.position + 1);
                let lookahead_char = input.get(name_pos).copied();

                let starts_close = lookahead_char == Some(b'/');
                let starts_pi = lookahead_char == Some(b'?');
                let starts_name = lookahead_char.map(is_name_start_char).unwrap_or(false);

                let constructor_candidate = starts_close || starts_pi || starts_name;
                let treat_as_constructor = constructor_candidate
                    && (!prev_is_operand || direct_constructor_depth > 0 || block.tokens.is_empty());

                if treat_as_constructor {
                    if starts_close {
                        self.position += 2;
                        self.push(&mut block, Token::new(TokenKind::CloseTagOpen, borrowed(start, 2), start, 2));
                        inside_direct_tag = true;
                        pending_close_tag = true;
                    } else if starts_pi {
                        self.position += 2;
                        self.push(&mut block, Token::new(TokenKind::PiStart, borrowed(start, 2), start, 2));
                        inside_direct_tag = true;
                        pending_close_tag = false;
                    } else {
                        self.position += 1;
                        self.push(&mut block, Token::new(TokenKind::TagOpen, borrowed(start, 1), start, 1));
                        inside_direct_tag = true;
                        pending_close_tag = false;
                        direct_constructor_depth += 1;
                        saved_expr_depths.push(constructor_expr_depth);
                        constructor_expr_depth = 0;
                    }
                    continue;
                }

                self.position += 1;
                self.push(&mut block, Token::new(TokenKind::LessThan, borrowed(start, 1), start, 1));
                continue;
            }

            if ch == b'*' {
                let token = self.scan_star(input, &block, bracket_depth, paren_depth);
                self.push(&mut block, token);
                continue;
            }

            let mut token = self.scan_operator(input);
            if token.kind == TokenKind::Unknown && token.length == 0 {
                token = if ch == b'\'' || ch == b'"' {
                    self.scan_string(input, ch, &mut block)
                } else if is_digit(ch) || (ch == b'.' && self.peek(input, 1).map(is_digit).unwrap_or(false)) {
                    self.scan_number(input)
                } else if is_name_start_char(ch) {
                    self.scan_identifier(input)
                } else {
                    let start = self.position;
                    self.advance_char(input);
                    Token::new(TokenKind::Unknown, borrowed(start, self.position - start), start, self.position - start)
                };
            }

            match token.kind {
                TokenKind::LBracket => bracket_depth += 1,
                TokenKind::RBracket => bracket_depth = bracket_depth.saturating_sub(1),
                TokenKind::LParen => paren_depth += 1,
                TokenKind::RParen => paren_depth = paren_depth.saturating_sub(1),
                _ => {}
            }
            self.push(&mut block, token);
        }

        let end = input.len();
        block
            .tokens
            .push(Token::new(TokenKind::EndOfInput, TokenText::EMPTY, end, 0));
        block
    }

    fn push(&mut self, block: &mut TokenBlock, token: Token) {
        self.prior = self.previous;
        self.previous = Some(token.kind);
        block.tokens.push(token);
    }

    fn peek(&self, input: &[u8], offset: usize) -> Option<u8> {
        input.get(self.position + offset).copied()
    }

    fn skip_whitespace(&mut self, input: &[u8]) {
        while self.position < input.len() && is_whitespace(input[self.position]) {
            self.position += 1;
        }
    }

    fn lookahead_non_whitespace(&self, input: &[u8], mut index: usize) -> usize {
        while index < input.len() && is_whitespace(input[index]) {
            index += 1;
        }
        index
    }

    // Steps over one character, keeping multi-byte UTF-8 sequences whole so
    // borrowed slices always land on char boundaries.
    fn advance_char(&mut self, input: &[u8]) {
        self.position += 1;
        while self.position < input.len() && (input[self.position] & 0xc0) == 0x80 {
            self.position += 1;
        }
    }

    // TEXT_CONTENT runs inside a direct constructor body. `{{` and `}}`
    // escape to a literal brace; `<` and `{` return to structural handling.
    fn scan_text_content(&mut self, input: &[u8], block: &mut TokenBlock) -> ContentStep {
        let ch = input[self.position];
        if ch == b'{' && self.peek(input, 1) == Some(b'{') {
            let start = self.position;
            self.position += 2;
            let span = block.storage.write_copy("{");
            self.push(block, Token::new(TokenKind::TextContent, TokenText::Arena(span), start, 2));
            return ContentStep::Emitted;
        }
        if ch == b'}' && self.peek(input, 1) == Some(b'}') {
            let start = self.position;
            self.position += 2;
            let span = block.storage.write_copy("}");
            self.push(block, Token::new(TokenKind::TextContent, TokenText::Arena(span), start, 2));
            return ContentStep::Emitted;
        }
        if ch == b'<' || ch == b'{' {
            return ContentStep::Structural;
        }

        let start = self.position;
        while self.position < input.len() {
            let segment_char = input[self.position];
            if segment_char == b'<' || segment_char == b'{' {
                break;
            }
            if segment_char == b'}' && self.peek(input, 1) == Some(b'}') {
                break;
            }
            self.position += 1;
        }
        let length = self.position - start;
        if length > 0 {
            self.push(block, Token::new(TokenKind::TextContent, borrowed(start, length), start, length));
            ContentStep::Emitted
        } else {
            ContentStep::Structural
        }
    }

    // `*` is MULTIPLY only when an operand precedes, the previous token can
    // end a binary operand, nothing forces a wildcard reading, and an
    // operand follows. Everything else is WILDCARD.
    fn scan_star(
        &mut self,
        input: &[u8],
        block: &TokenBlock,
        bracket_depth: usize,
        paren_depth: usize,
    ) -> Token {
        let start = self.position;
        self.position += 1;

        let mut prev_is_operand = false;
        let mut prev_forces_wild = false;
        if let Some(prev) = block.tokens.last() {
            prev_is_operand = matches!(
                prev.kind,
                TokenKind::Number
                    | TokenKind::String
                    | TokenKind::Identifier
                    | TokenKind::RParen
                    | TokenKind::RBracket
            );
            prev_forces_wild = matches!(
                prev.kind,
                TokenKind::At
                    | TokenKind::AxisSeparator
                    | TokenKind::Slash
                    | TokenKind::DoubleSlash
                    | TokenKind::Colon
            );
        }

        let operand_follows = self.next_operand_index(input).is_some();
        let inside_structural_context = bracket_depth > 0 || paren_depth > 0;

        // Expression context covers top-level arithmetic such as
        // `return 2 * 3`, where no parenthesis depth is available to signal
        // that the literal before `*` is an operand rather than a step.
        let in_expression_context = match block.tokens.len() {
            0 => true,
            len => {
                let prev = block.tokens[len - 1].kind;
                if matches!(prev, TokenKind::Number | TokenKind::String) {
                    if len >= 2 {
                        kind_opens_expression(block.tokens[len - 2].kind)
                    } else {
                        true
                    }
                } else {
                    kind_opens_expression(prev)
                }
            }
        };

        let prev_allows_binary = match block.tokens.last().map(|token| token.kind) {
            Some(TokenKind::Identifier)
            | Some(TokenKind::RParen)
            | Some(TokenKind::RBracket)
            | Some(TokenKind::Wildcard) => true,
            Some(TokenKind::Number) | Some(TokenKind::String) => {
                inside_structural_context || in_expression_context
            }
            _ => false,
        };

        let kind = if prev_is_operand && prev_allows_binary && !prev_forces_wild && operand_follows
        {
            TokenKind::Multiply
        } else {
            TokenKind::Wildcard
        };
        Token::new(kind, borrowed(start, 1), start, 1)
    }

    fn next_operand_index(&self, input: &[u8]) -> Option<usize> {
        let lookahead = self.lookahead_non_whitespace(input, self.position);
        let next_char = input.get(lookahead).copied()?;
        if next_char == b'-' || next_char == b'+' {
            if !self.unary_context_before(input, lookahead) {
                return None;
            }
            let after_sign = self.lookahead_non_whitespace(input, lookahead + 1);
            if after_sign >= input.len() {
                return None;
            }
            return self.is_operand_start(input, after_sign).then_some(after_sign);
        }
        self.is_operand_start(input, lookahead).then_some(lookahead)
    }

    fn is_operand_start(&self, input: &[u8], index: usize) -> bool {
        let Some(ch) = input.get(index).copied() else {
            return false;
        };
        if is_digit(ch) || ch == b'/' || is_name_start_char(ch) {
            return true;
        }
        if ch == b'.' {
            return true;
        }
        matches!(ch, b'@' | b'$' | b'(' | b'\'' | b'"')
    }

    fn unary_context_before(&self, input: &[u8], index: usize) -> bool {
        let mut prev = index;
        while prev > 0 && is_whitespace(input[prev - 1]) {
            prev -= 1;
        }
        if prev == 0 {
            return true;
        }
        matches!(
            input[prev - 1],
            b'(' | b'[' | b'@' | b'$' | b',' | b':' | b'+' | b'-' | b'*' | b'/' | b'|' | b'!'
                | b'<' | b'>' | b'='
        )
    }

    fn scan_operator(&mut self, input: &[u8]) -> Token {
        let start = self.position;

        for (text, kind) in MULTI_CHAR_OPERATORS {
            let bytes = text.as_bytes();
            if input.len() - self.position >= bytes.len()
                && &input[self.position..self.position + bytes.len()] == bytes
            {
                self.position += bytes.len();
                return Token::new(*kind, borrowed(start, bytes.len()), start, bytes.len());
            }
        }

        let kind = match input[self.position] {
            b'/' => TokenKind::Slash,
            b'.' => TokenKind::Dot,
            b'*' => TokenKind::Wildcard,
            b'[' => TokenKind::LBracket,
            b']' => TokenKind::RBracket,
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b'@' => TokenKind::At,
            b',' => TokenKind::Comma,
            b';' => TokenKind::Semicolon,
            b'|' => TokenKind::Pipe,
            b'=' => TokenKind::Equals,
            b'<' => TokenKind::LessThan,
            b'>' => TokenKind::GreaterThan,
            b'+' => TokenKind::Plus,
            b'-' => TokenKind::Minus,
            b':' => TokenKind::Colon,
            b'$' => TokenKind::Dollar,
            b'?' => TokenKind::QuestionMark,
            _ => return Token::new(TokenKind::Unknown, TokenText::EMPTY, start, 0),
        };
        self.position += 1;
        Token::new(kind, borrowed(start, 1), start, 1)
    }

    fn scan_number(&mut self, input: &[u8]) -> Token {
        let start = self.position;
        let mut seen_dot = false;
        while self.position < input.len() {
            let current = input[self.position];
            if is_digit(current) {
                self.position += 1;
                continue;
            }
            if !seen_dot && current == b'.' {
                seen_dot = true;
                self.position += 1;
                continue;
            }
            break;
        }
        let length = self.position - start;
        Token::new(TokenKind::Number, borrowed(start, length), start, length)
    }

    // Keywords are promoted from identifiers only where the grammar can use
    // them; `declare variable $external := 1` must keep `external` as a
    // plain name, for example.
    fn scan_identifier(&mut self, input: &[u8]) -> Token {
        let start = self.position;
        while self.position < input.len() && is_name_char(input[self.position]) {
            self.position += 1;
        }
        let identifier = &input[start..self.position];

        let mut kind = TokenKind::Identifier;
        if let Some((_, keyword)) = KEYWORDS
            .iter()
            .find(|(text, _)| text.as_bytes() == identifier)
        {
            let treat_as_keyword = match keyword {
                TokenKind::Function => matches!(
                    self.previous,
                    Some(TokenKind::Declare) | Some(TokenKind::Default)
                ),
                TokenKind::Variable => self.previous == Some(TokenKind::Declare),
                TokenKind::Namespace => matches!(
                    self.previous,
                    Some(TokenKind::Declare)
                        | Some(TokenKind::Default)
                        | Some(TokenKind::Function)
                        | Some(TokenKind::Module)
                ),
                TokenKind::External => {
                    let identifier_precedes = self.previous == Some(TokenKind::Identifier)
                        && matches!(
                            self.prior,
                            Some(TokenKind::Dollar) | Some(TokenKind::Colon)
                        );
                    matches!(
                        self.previous,
                        Some(TokenKind::Declare)
                            | Some(TokenKind::Variable)
                            | Some(TokenKind::RParen)
                    ) || identifier_precedes
                }
                TokenKind::BoundarySpace | TokenKind::BaseUri => {
                    self.previous == Some(TokenKind::Declare)
                }
                _ => true,
            };

            if treat_as_keyword {
                kind = match keyword {
                    TokenKind::Order if !self.is_followed_by_word(input, b"by") => {
                        TokenKind::Identifier
                    }
                    TokenKind::Group if !self.is_followed_by_word(input, b"by") => {
                        TokenKind::Identifier
                    }
                    TokenKind::Stable if !self.is_followed_by_word(input, b"order") => {
                        TokenKind::Identifier
                    }
                    other => *other,
                };
            }
        }

        let length = self.position - start;
        Token::new(kind, borrowed(start, length), start, length)
    }

    fn is_followed_by_word(&self, input: &[u8], expected: &[u8]) -> bool {
        let mut lookahead = self.position;
        let mut saw_separator = false;
        while lookahead < input.len() && is_whitespace(input[lookahead]) {
            saw_separator = true;
            lookahead += 1;
        }
        if !saw_separator {
            return false;
        }
        let mut word_end = lookahead;
        while word_end < input.len() && is_name_char(input[word_end]) {
            word_end += 1;
        }
        &input[lookahead..word_end] == expected
    }

    // String literals: `\` escapes the quote character, backslash and `*`;
    // any other escape is preserved verbatim. The text is borrowed from the
    // source unless escapes forced a rewrite into the arena.
    fn scan_string(&mut self, input: &[u8], quote: u8, block: &mut TokenBlock) -> Token {
        let start = self.position;
        self.position += 1;
        let content_start = self.position;

        let mut has_escapes = false;
        let mut scan_pos = self.position;
        while scan_pos < input.len() && input[scan_pos] != quote {
            if input[scan_pos] == b'\\' {
                has_escapes = true;
                break;
            }
            scan_pos += 1;
        }

        if !has_escapes {
            let content_end = scan_pos;
            self.position = scan_pos;
            if self.position < input.len() {
                self.position += 1;
            }
            return Token::new(
                TokenKind::String,
                borrowed(content_start, content_end - content_start),
                start,
                self.position - start,
            );
        }

        let mut value = Vec::with_capacity(scan_pos - content_start + 10);
        while self.position < input.len() && input[self.position] != quote {
            if input[self.position] == b'\\' && self.position + 1 < input.len() {
                self.position += 1;
                let escaped = input[self.position];
                if escaped == quote || escaped == b'\\' || escaped == b'*' {
                    value.push(escaped);
                } else {
                    value.push(b'\\');
                    value.push(escaped);
                }
            } else {
                value.push(input[self.position]);
            }
            self.position += 1;
        }
        if self.position < input.len() {
            self.position += 1;
        }

        let text = String::from_utf8_lossy(&value);
        let span = block.storage.write_copy(&text);
        Token::new(
            TokenKind::String,
            TokenText::Arena(span),
            start,
            self.position - start,
        )
    }

    // Attribute values inside constructor tags. With template processing on,
    // the value splits into literal and `{expression}` parts; `{{`/`}}`
    // escape to literal braces. The token's own text is the raw value.
    fn scan_attribute_value(
        &mut self,
        input: &[u8],
        quote: u8,
        process_templates: bool,
        block: &mut TokenBlock,
    ) -> Token {
        let start = self.position;
        self.position += 1;
        let mut parts: Vec<AttributeValuePart> = Vec::with_capacity(4);
        let mut current_literal: Vec<u8> = Vec::new();
        let mut current_expression: Vec<u8> = Vec::new();
        let mut in_expression = false;
        let mut brace_depth = 0usize;

        while self.position < input.len() {
            let ch = input[self.position];

            if !in_expression {
                if ch == quote {
                    break;
                }
                if process_templates && ch == b'{' {
                    if self.peek(input, 1) == Some(b'{') {
                        current_literal.push(b'{');
                        self.position += 2;
                        continue;
                    }
                    if !current_literal.is_empty() {
                        parts.push(literal_part(&current_literal, block));
                        current_literal.clear();
                    }
                    in_expression = true;
                    brace_depth = 1;
                    self.position += 1;
                    current_expression.clear();
                    continue;
                }
                if process_templates && ch == b'}' && self.peek(input, 1) == Some(b'}') {
                    current_literal.push(b'}');
                    self.position += 2;
                    continue;
                }
                current_literal.push(ch);
                self.position += 1;
                continue;
            }

            if ch == b'\'' || ch == b'"' {
                let expr_quote = ch;
                current_expression.push(ch);
                self.position += 1;
                while self.position < input.len() {
                    let inner = input[self.position];
                    current_expression.push(inner);
                    self.position += 1;
                    if inner == expr_quote {
                        break;
                    }
                    if inner == b'\\' && self.position < input.len() {
                        current_expression.push(input[self.position]);
                        self.position += 1;
                    }
                }
                continue;
            }
            if ch == b'{' {
                brace_depth += 1;
                current_expression.push(ch);
                self.position += 1;
                continue;
            }
            if ch == b'}' {
                brace_depth -= 1;
                if brace_depth == 0 {
                    self.position += 1;
                    parts.push(expression_part(&current_expression, block));
                    current_expression.clear();
                    in_expression = false;
                    continue;
                }
                current_expression.push(ch);
                self.position += 1;
                continue;
            }

            current_expression.push(ch);
            self.position += 1;
        }

        if in_expression {
            // unterminated expression reverts to literal text
            current_literal.push(b'{');
            current_literal.extend_from_slice(&current_expression);
            current_expression.clear();
        }
        if !current_literal.is_empty() || parts.is_empty() {
            parts.push(literal_part(&current_literal, block));
        }

        let content_end = self.position;
        if self.position < input.len() {
            self.position += 1;
        }

        let mut token = Token::new(
            TokenKind::String,
            borrowed(start + 1, content_end - (start + 1)),
            start,
            self.position - start,
        );
        token.is_attribute_value = true;
        token.value_parts = parts;
        token
    }
}

enum ContentStep {
    Emitted,
    Structural,
}

fn borrowed(start: usize, len: usize) -> TokenText {
    TokenText::Borrowed { start, len }
}

fn literal_part(bytes: &[u8], block: &mut TokenBlock) -> AttributeValuePart {
    let text = String::from_utf8_lossy(bytes);
    AttributeValuePart {
        is_expression: false,
        text: TokenText::Arena(block.storage.write_copy(&text)),
    }
}

fn expression_part(bytes: &[u8], block: &mut TokenBlock) -> AttributeValuePart {
    let text = String::from_utf8_lossy(bytes);
    AttributeValuePart {
        is_expression: true,
        text: TokenText::Arena(block.storage.write_copy(&text)),
    }
}

fn last_token_is_operand(tokens: &[Token]) -> bool {
    matches!(
        tokens.last().map(|token| token.kind),
        Some(TokenKind::Identifier)
            | Some(TokenKind::Number)
            | Some(TokenKind::String)
            | Some(TokenKind::TextContent)
            | Some(TokenKind::RParen)
            | Some(TokenKind::RBracket)
    )
}

// token kinds after which a `*` reads as multiplication even outside
// parentheses or predicates
fn kind_opens_expression(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Return
            | TokenKind::Assign
            | TokenKind::Comma
            | TokenKind::Then
            | TokenKind::Else
            | TokenKind::Equals
            | TokenKind::NotEquals
            | TokenKind::LessThan
            | TokenKind::LessEqual
            | TokenKind::GreaterThan
            | TokenKind::GreaterEqual
            | TokenKind::Eq
            | TokenKind::Ne
            | TokenKind::Lt
            | TokenKind::Le
            | TokenKind::Gt
            | TokenKind::Ge
            | TokenKind::Plus
            | TokenKind::Minus
            | TokenKind::Multiply
            | TokenKind::Divide
            | TokenKind::Modulo
    )
}

/// Renders a token stream back to text for diagnostics, one lexeme per
/// token separated by spaces.
pub fn render_tokens(source: &str, block: &TokenBlock) -> String {
    block
        .tokens
        .iter()
        .filter(|token| token.kind != TokenKind::EndOfInput)
        .map(|token| block.token_text(source, token))
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut tokeniser = Tokeniser::new();
        let block = tokeniser.tokenize(source);
        block.tokens.iter().map(|token| token.kind).collect()
    }

    fn texts(source: &str) -> Vec<String> {
        let mut tokeniser = Tokeniser::new();
        let block = tokeniser.tokenize(source);
        block
            .tokens
            .iter()
            .filter(|token| token.kind != TokenKind::EndOfInput)
            .map(|token| block.token_text(source, token).to_string())
            .collect()
    }

    #[test]
    fn simple_path() {
        assert_eq!(
            kinds("/bookstore/book"),
            vec![
                TokenKind::Slash,
                TokenKind::Identifier,
                TokenKind::Slash,
                TokenKind::Identifier,
                TokenKind::EndOfInput,
            ]
        );
    }

    #[test]
    fn multi_char_operators() {
        assert_eq!(
            kinds("//a[@b != 'c']"),
            vec![
                TokenKind::DoubleSlash,
                TokenKind::Identifier,
                TokenKind::LBracket,
                TokenKind::At,
                TokenKind::Identifier,
                TokenKind::NotEquals,
                TokenKind::String,
                TokenKind::RBracket,
                TokenKind::EndOfInput,
            ]
        );
    }

    #[test]
    fn star_is_wildcard_after_slash() {
        assert_eq!(
            kinds("/root/*"),
            vec![
                TokenKind::Slash,
                TokenKind::Identifier,
                TokenKind::Slash,
                TokenKind::Wildcard,
                TokenKind::EndOfInput,
            ]
        );
    }

    #[test]
    fn star_is_multiply_in_predicate() {
        let result = kinds("a[2 * 3]");
        assert_eq!(result[2], TokenKind::Number);
        assert_eq!(result[3], TokenKind::Multiply);
        assert_eq!(result[4], TokenKind::Number);
    }

    #[test]
    fn star_is_multiply_after_return() {
        let result = kinds("for $x in y return 2 * 3");
        let star = result
            .iter()
            .position(|kind| *kind == TokenKind::Multiply)
            .expect("multiply token");
        assert_eq!(result[star - 1], TokenKind::Number);
        assert_eq!(result[star + 1], TokenKind::Number);
    }

    #[test]
    fn keyword_promotion_requires_context() {
        // `function` only after `declare` / `default`
        let declared = kinds("declare function local:f() { 1 }");
        assert_eq!(declared[0], TokenKind::Declare);
        assert_eq!(declared[1], TokenKind::Function);

        // a path step named `function` stays an identifier
        let path = kinds("/function");
        assert_eq!(path[1], TokenKind::Identifier);
    }

    #[test]
    fn order_requires_by() {
        let with_by = kinds("for $x in y order by $x return $x");
        assert!(with_by.contains(&TokenKind::Order));

        // `order` as an element name is not promoted
        let step = kinds("/order/item");
        assert_eq!(step[1], TokenKind::Identifier);
    }

    #[test]
    fn stable_requires_order() {
        let promoted = kinds("for $x in y stable order by $x return $x");
        assert!(promoted.contains(&TokenKind::Stable));
        let step = kinds("/stable");
        assert_eq!(step[1], TokenKind::Identifier);
    }

    #[test]
    fn external_contexts() {
        let var = kinds("declare variable $flag external");
        assert_eq!(*var.iter().rev().nth(1).unwrap(), TokenKind::External);

        // `external` in a path is an ordinary name
        let path = kinds("/external/x");
        assert_eq!(path[1], TokenKind::Identifier);
    }

    #[test]
    fn string_without_escapes_is_borrowed() {
        let mut tokeniser = Tokeniser::new();
        let source = "'plain'";
        let block = tokeniser.tokenize(source);
        let token = &block.tokens[0];
        assert_eq!(token.kind, TokenKind::String);
        assert!(matches!(token.text, TokenText::Borrowed { .. }));
        assert_eq!(block.token_text(source, token), "plain");
    }

    #[test]
    fn string_with_escapes_is_arena_owned() {
        let mut tokeniser = Tokeniser::new();
        let source = r#"'it\'s'"#;
        let block = tokeniser.tokenize(source);
        let token = &block.tokens[0];
        assert!(matches!(token.text, TokenText::Arena(_)));
        assert_eq!(block.token_text(source, token), "it's");
    }

    #[test]
    fn assign_and_axis_tokens() {
        assert_eq!(
            kinds("$x := child::node"),
            vec![
                TokenKind::Dollar,
                TokenKind::Identifier,
                TokenKind::Assign,
                TokenKind::Identifier,
                TokenKind::AxisSeparator,
                TokenKind::Identifier,
                TokenKind::EndOfInput,
            ]
        );
    }

    #[test]
    fn direct_constructor_tokens() {
        assert_eq!(
            kinds("<a>text</a>"),
            vec![
                TokenKind::TagOpen,
                TokenKind::Identifier,
                TokenKind::TagClose,
                TokenKind::TextContent,
                TokenKind::CloseTagOpen,
                TokenKind::Identifier,
                TokenKind::TagClose,
                TokenKind::EndOfInput,
            ]
        );
    }

    #[test]
    fn empty_element_constructor() {
        assert_eq!(
            kinds("<br/>"),
            vec![
                TokenKind::TagOpen,
                TokenKind::Identifier,
                TokenKind::EmptyTagClose,
                TokenKind::EndOfInput,
            ]
        );
    }

    #[test]
    fn less_than_after_operand_is_comparison() {
        let result = kinds("@price < 10");
        assert_eq!(result[2], TokenKind::LessThan);
    }

    #[test]
    fn constructor_content_braces_escape() {
        let source = "<a>{{literal}}</a>";
        let token_texts = texts(source);
        assert!(token_texts.contains(&"{".to_string()));
        assert!(token_texts.contains(&"}".to_string()));
        assert!(token_texts.contains(&"literal".to_string()));
    }

    #[test]
    fn constructor_embedded_expression() {
        assert_eq!(
            kinds("<a>{1 + 2}</a>"),
            vec![
                TokenKind::TagOpen,
                TokenKind::Identifier,
                TokenKind::TagClose,
                TokenKind::LBrace,
                TokenKind::Number,
                TokenKind::Plus,
                TokenKind::Number,
                TokenKind::RBrace,
                TokenKind::CloseTagOpen,
                TokenKind::Identifier,
                TokenKind::TagClose,
                TokenKind::EndOfInput,
            ]
        );
    }

    #[test]
    fn nested_constructor_in_expression_has_own_content_mode() {
        // the inner constructor's body is content even though it sits
        // inside the outer constructor's embedded expression
        let source = "<a>{ <b>text</b> }</a>";
        let mut tokeniser = Tokeniser::new();
        let block = tokeniser.tokenize(source);
        let content: Vec<&str> = block
            .tokens
            .iter()
            .filter(|token| token.kind == TokenKind::TextContent)
            .map(|token| block.token_text(source, token))
            .collect();
        assert_eq!(content, vec!["text"]);
    }

    #[test]
    fn attribute_value_template_parts() {
        let mut tokeniser = Tokeniser::new();
        let source = r#"<greet who="{/users/u/@name}!">x</greet>"#;
        let block = tokeniser.tokenize(source);
        let attr = block
            .tokens
            .iter()
            .find(|token| token.is_attribute_value)
            .expect("attribute value token");
        assert!(attr.has_attribute_template());
        assert_eq!(attr.value_parts.len(), 2);
        assert!(attr.value_parts[0].is_expression);
        assert_eq!(
            block.text(source, attr.value_parts[0].text),
            "/users/u/@name"
        );
        assert!(!attr.value_parts[1].is_expression);
        assert_eq!(block.text(source, attr.value_parts[1].text), "!");
    }

    #[test]
    fn attribute_double_brace_escapes() {
        let mut tokeniser = Tokeniser::new();
        let source = r#"<a b="{{x}}">y</a>"#;
        let block = tokeniser.tokenize(source);
        let attr = block
            .tokens
            .iter()
            .find(|token| token.is_attribute_value)
            .expect("attribute value token");
        assert_eq!(attr.value_parts.len(), 1);
        assert!(!attr.value_parts[0].is_expression);
        assert_eq!(block.text(source, attr.value_parts[0].text), "{x}");
    }

    #[test]
    fn source_offsets_cover_non_whitespace() {
        let source = "for $x in /a/b return $x + 1";
        let mut tokeniser = Tokeniser::new();
        let block = tokeniser.tokenize(source);
        let mut covered = vec![false; source.len()];
        let mut last_end = 0usize;
        for token in &block.tokens {
            assert!(token.position >= last_end, "tokens must not overlap");
            for index in token.position..token.position + token.length {
                covered[index] = true;
            }
            last_end = token.position + token.length;
        }
        for (index, byte) in source.bytes().enumerate() {
            if !is_whitespace(byte) {
                assert!(covered[index], "byte {index} not covered");
            }
        }
    }

    #[test]
    fn number_with_decimal_point() {
        let token_texts = texts("3.14 + .5");
        assert_eq!(token_texts, vec!["3.14", "+", ".5"]);
    }

    #[test]
    fn processing_instruction_constructor() {
        assert_eq!(
            kinds("<?target data?>"),
            vec![
                TokenKind::PiStart,
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::PiEnd,
                TokenKind::EndOfInput,
            ]
        );
    }
}
