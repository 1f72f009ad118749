//! Hand-written recursive-descent parser over the token stream.
//!
//! Each grammar production is a method; precedence is encoded in the call
//! chain from [`Parser::parse_expr`] down to [`Parser::parse_path_expr`].
//! Errors are accumulated rather than thrown: a failed production reports
//! a diagnostic and returns `None`, and the caller either propagates or
//! recovers (the prolog loop recovers at the next `;`).

mod constructor;
mod paths;
mod primary;
mod prolog_decl;
mod types;

use xylem_xquery_lexer::{keyword_text, Token, TokenBlock, TokenKind, Tokeniser};

use crate::ast::{NodeKind, XPathNode};
use crate::error::ParseErrors;
use crate::prolog::Prolog;

/// The outcome of compiling a query string: the expression tree (absent
/// for pure library modules or fatally broken input), the prolog, and any
/// accumulated diagnostics.
#[derive(Debug, Default)]
pub struct ParsedQuery {
    pub expression: Option<XPathNode>,
    pub prolog: Prolog,
    pub errors: ParseErrors,
}

impl ParsedQuery {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Convenience entry point: tokenise and parse a query string.
pub fn parse_query(source: &str) -> ParsedQuery {
    let mut tokeniser = Tokeniser::new();
    let block = tokeniser.tokenize(source);
    Parser::new(source, &block).parse()
}

pub struct Parser<'a> {
    source: &'a str,
    block: &'a TokenBlock,
    current: usize,
    errors: ParseErrors,
    pub(crate) prolog: Prolog,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, block: &'a TokenBlock) -> Self {
        Parser {
            source,
            block,
            current: 0,
            errors: ParseErrors::default(),
            prolog: Prolog::new(),
        }
    }

    pub fn parse(mut self) -> ParsedQuery {
        self.parse_prolog();

        let expression = if self.is_at_end() {
            if self.prolog.is_library_module {
                None
            } else {
                self.report("empty query");
                None
            }
        } else {
            let expression = self.parse_expr();
            if !self.is_at_end() {
                let lexeme = self.peek_lexeme().to_string();
                self.report(format!("unexpected token '{lexeme}' after expression"));
            }
            expression
        };

        if self.prolog.is_library_module {
            let validation = self.prolog.validate_library_exports();
            if !validation.valid {
                let position = self.peek().position;
                self.errors.record(validation.error_message, position);
            }
        }

        ParsedQuery {
            expression,
            prolog: self.prolog,
            errors: self.errors,
        }
    }

    // ----- token cursor -------------------------------------------------

    pub(crate) fn peek(&self) -> &'a Token {
        &self.block.tokens[self.current.min(self.block.tokens.len() - 1)]
    }

    pub(crate) fn peek_at(&self, offset: usize) -> &'a Token {
        let index = (self.current + offset).min(self.block.tokens.len() - 1);
        &self.block.tokens[index]
    }

    pub(crate) fn previous(&self) -> &'a Token {
        &self.block.tokens[self.current - 1]
    }

    pub(crate) fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::EndOfInput
    }

    pub(crate) fn advance(&mut self) -> &'a Token {
        let token = self.peek();
        if !self.is_at_end() {
            self.current += 1;
        }
        token
    }

    pub(crate) fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    pub(crate) fn match_kind(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            return true;
        }
        false
    }

    pub(crate) fn expect(&mut self, kind: TokenKind, what: &str) -> bool {
        if self.match_kind(kind) {
            return true;
        }
        let lexeme = self.peek_lexeme().to_string();
        self.report(format!("expected {what}, found '{lexeme}'"));
        false
    }

    /// The token's text: resolved source/arena text, or the keyword lexeme
    /// for promoted keyword tokens.
    pub(crate) fn token_lexeme(&self, token: &Token) -> &'a str {
        match token.kind {
            TokenKind::EndOfInput => "<end of input>",
            _ => {
                let text = self.block.token_text(self.source, token);
                if text.is_empty() {
                    keyword_text(token.kind).unwrap_or(text)
                } else {
                    text
                }
            }
        }
    }

    pub(crate) fn peek_lexeme(&self) -> &'a str {
        self.token_lexeme(self.peek())
    }

    pub(crate) fn report(&mut self, message: impl Into<String>) {
        let position = self.peek().position;
        self.errors.record(message, position);
    }

    /// Keyword tokens double as names: every XQuery keyword is a valid
    /// NCName.
    pub(crate) fn is_identifier_token(token: &Token) -> bool {
        token.kind == TokenKind::Identifier || keyword_text(token.kind).is_some()
    }

    pub(crate) fn check_name(&self) -> bool {
        Self::is_identifier_token(self.peek())
    }

    /// True when the current token is an identifier (or keyword acting as
    /// one) with the given text.
    pub(crate) fn check_identifier_keyword(&self, keyword: &str) -> bool {
        Self::is_identifier_token(self.peek()) && self.peek_lexeme() == keyword
    }

    pub(crate) fn match_identifier_keyword(&mut self, keyword: &str) -> bool {
        if self.check_identifier_keyword(keyword) {
            self.advance();
            return true;
        }
        false
    }

    /// Consumes a name token and returns its text.
    pub(crate) fn parse_ncname(&mut self) -> Option<String> {
        if self.check_name() {
            let token = self.advance();
            return Some(self.token_lexeme(token).to_string());
        }
        let lexeme = self.peek_lexeme().to_string();
        self.report(format!("expected a name, found '{lexeme}'"));
        None
    }

    /// `prefix:local` or `local`. The colon must be adjacent in the token
    /// stream (the lexer never emits whitespace tokens, so adjacency is
    /// checked with source offsets).
    pub(crate) fn parse_qname_string(&mut self) -> Option<String> {
        let first = self.parse_ncname()?;
        if self.check(TokenKind::Colon) {
            let colon = self.peek();
            let prev = self.previous();
            if colon.position == prev.position + prev.length {
                self.advance();
                let local = self.parse_ncname()?;
                return Some(format!("{first}:{local}"));
            }
        }
        Some(first)
    }

    pub(crate) fn parse_string_literal_value(&mut self) -> Option<String> {
        if self.check(TokenKind::String) {
            let token = self.advance();
            return Some(self.block.token_text(self.source, token).to_string());
        }
        let lexeme = self.peek_lexeme().to_string();
        self.report(format!("expected a string literal, found '{lexeme}'"));
        None
    }

    /// Parses a standalone source fragment (attribute value template
    /// expressions, embedded constructor expressions that arrive as text).
    pub(crate) fn parse_embedded_expr(&mut self, fragment: &str) -> Option<XPathNode> {
        let mut tokeniser = Tokeniser::new();
        let fragment_block = tokeniser.tokenize(fragment);
        let mut inner = Parser::new(fragment, &fragment_block);
        let expression = inner.parse_expr();
        if !inner.is_at_end() {
            inner.report("unexpected trailing content in embedded expression");
        }
        for error in inner.errors.iter() {
            let position = self.peek().position;
            self.errors
                .record(format!("in embedded expression: {}", error.message), position);
        }
        expression
    }

    // ----- expressions --------------------------------------------------

    /// `expr := expr_single ("," expr_single)*`
    pub(crate) fn parse_expr(&mut self) -> Option<XPathNode> {
        let first = self.parse_expr_single()?;
        if !self.check(TokenKind::Comma) {
            return Some(first);
        }
        let mut wrapper = XPathNode::with_children(NodeKind::Expression, "", vec![first]);
        while self.match_kind(TokenKind::Comma) {
            let next = self.parse_expr_single()?;
            wrapper.add_child(next);
        }
        Some(wrapper)
    }

    pub(crate) fn parse_expr_single(&mut self) -> Option<XPathNode> {
        match self.peek().kind {
            TokenKind::For | TokenKind::Let => self.parse_flwor_expr(),
            TokenKind::Some | TokenKind::Every => self.parse_quantified_expr(),
            TokenKind::Typeswitch if self.peek_at(1).kind == TokenKind::LParen => {
                self.parse_typeswitch_expr()
            }
            TokenKind::If if self.peek_at(1).kind == TokenKind::LParen => self.parse_if_expr(),
            _ => self.parse_or_expr(),
        }
    }

    fn parse_if_expr(&mut self) -> Option<XPathNode> {
        self.advance(); // if
        self.expect(TokenKind::LParen, "'(' after 'if'");
        let condition = self.parse_expr()?;
        self.expect(TokenKind::RParen, "')' after condition");
        if !self.expect(TokenKind::Then, "'then'") {
            return None;
        }
        let then_branch = self.parse_expr_single()?;
        if !self.expect(TokenKind::Else, "'else'") {
            return None;
        }
        let else_branch = self.parse_expr_single()?;
        Some(XPathNode::with_children(
            NodeKind::Conditional,
            "",
            vec![condition, then_branch, else_branch],
        ))
    }

    // FLWOR: any ordering of for/let/where/group by/order by/count clauses
    // terminated by `return`.
    fn parse_flwor_expr(&mut self) -> Option<XPathNode> {
        let mut flwor = XPathNode::leaf(NodeKind::Flwor);
        loop {
            match self.peek().kind {
                TokenKind::For => {
                    self.advance();
                    loop {
                        let binding = self.parse_for_binding()?;
                        flwor.add_child(binding);
                        if !self.match_kind(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                TokenKind::Let => {
                    self.advance();
                    loop {
                        let binding = self.parse_let_binding()?;
                        flwor.add_child(binding);
                        if !self.match_kind(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                TokenKind::Where => {
                    self.advance();
                    let condition = self.parse_expr_single()?;
                    flwor.add_child(XPathNode::with_children(
                        NodeKind::WhereClause,
                        "",
                        vec![condition],
                    ));
                }
                TokenKind::Group => {
                    let clause = self.parse_group_clause()?;
                    flwor.add_child(clause);
                }
                TokenKind::Order => {
                    let clause = self.parse_order_clause(false)?;
                    flwor.add_child(clause);
                }
                TokenKind::Stable => {
                    self.advance();
                    let clause = self.parse_order_clause(true)?;
                    flwor.add_child(clause);
                }
                TokenKind::Count => {
                    let clause = self.parse_count_clause()?;
                    flwor.add_child(clause);
                }
                TokenKind::Return => {
                    self.advance();
                    let body = self.parse_expr_single()?;
                    flwor.add_child(body);
                    return Some(flwor);
                }
                _ => {
                    let lexeme = self.peek_lexeme().to_string();
                    self.report(format!(
                        "expected a FLWOR clause or 'return', found '{lexeme}'"
                    ));
                    return None;
                }
            }
        }
    }

    fn parse_for_binding(&mut self) -> Option<XPathNode> {
        if !self.expect(TokenKind::Dollar, "'$' in for clause") {
            return None;
        }
        let name = self.parse_qname_string()?;
        if !self.expect(TokenKind::In, "'in'") {
            return None;
        }
        let sequence = self.parse_expr_single()?;
        Some(XPathNode::with_children(
            NodeKind::ForBinding,
            name,
            vec![sequence],
        ))
    }

    fn parse_let_binding(&mut self) -> Option<XPathNode> {
        if !self.expect(TokenKind::Dollar, "'$' in let clause") {
            return None;
        }
        let name = self.parse_qname_string()?;
        if !self.expect(TokenKind::Assign, "':='") {
            return None;
        }
        let value = self.parse_expr_single()?;
        Some(XPathNode::with_children(
            NodeKind::LetBinding,
            name,
            vec![value],
        ))
    }

    // `group by $key (:= expr)? ("," …)*`
    fn parse_group_clause(&mut self) -> Option<XPathNode> {
        self.advance(); // group
        if !self.expect(TokenKind::By, "'by' after 'group'") {
            return None;
        }
        let mut clause = XPathNode::leaf(NodeKind::GroupByClause);
        loop {
            if !self.expect(TokenKind::Dollar, "'$' in group by key") {
                return None;
            }
            let name = self.parse_qname_string()?;
            let mut key = XPathNode::leaf(NodeKind::GroupKey);
            key.group_key = Some(crate::ast::GroupKeyInfo {
                variable_name: name,
            });
            if self.match_kind(TokenKind::Assign) {
                let expression = self.parse_expr_single()?;
                key.add_child(expression);
            }
            clause.add_child(key);
            if !self.match_kind(TokenKind::Comma) {
                break;
            }
        }
        Some(clause)
    }

    // `(stable)? order by spec ("," spec)*`
    fn parse_order_clause(&mut self, starts_with_stable: bool) -> Option<XPathNode> {
        if !self.expect(TokenKind::Order, "'order'") {
            return None;
        }
        if !self.expect(TokenKind::By, "'by' after 'order'") {
            return None;
        }
        let mut clause = XPathNode::leaf(NodeKind::OrderByClause);
        clause.order_stable = starts_with_stable;
        loop {
            let spec = self.parse_order_spec()?;
            clause.add_child(spec);
            if !self.match_kind(TokenKind::Comma) {
                break;
            }
        }
        Some(clause)
    }

    fn parse_order_spec(&mut self) -> Option<XPathNode> {
        let key = self.parse_expr_single()?;
        let mut options = crate::ast::OrderSpecOptions::default();
        if self.match_kind(TokenKind::Descending) {
            options.is_descending = true;
        } else {
            self.match_kind(TokenKind::Ascending);
        }
        if self.match_kind(TokenKind::Empty) {
            options.has_empty_mode = true;
            if self.match_kind(TokenKind::Greatest) {
                options.empty_is_greatest = true;
            } else if self.match_kind(TokenKind::Least) {
                options.empty_is_greatest = false;
            } else {
                self.report("expected 'greatest' or 'least' after 'empty'");
                return None;
            }
        }
        if self.match_kind(TokenKind::Collation) {
            options.collation_uri = self.parse_string_literal_value()?;
        }
        let mut spec = XPathNode::with_children(NodeKind::OrderSpec, "", vec![key]);
        spec.order_options = Some(options);
        Some(spec)
    }

    fn parse_count_clause(&mut self) -> Option<XPathNode> {
        self.advance(); // count
        if !self.expect(TokenKind::Dollar, "'$' after 'count'") {
            return None;
        }
        let name = self.parse_qname_string()?;
        Some(XPathNode::new(NodeKind::CountClause, name))
    }

    // `some|every $v in expr ("," $v in expr)* satisfies expr`
    fn parse_quantified_expr(&mut self) -> Option<XPathNode> {
        let quantifier = if self.peek().kind == TokenKind::Some {
            "some"
        } else {
            "every"
        };
        self.advance();
        let mut node = XPathNode::new(NodeKind::Quantified, quantifier);
        loop {
            if !self.expect(TokenKind::Dollar, "'$' in quantified expression") {
                return None;
            }
            let name = self.parse_qname_string()?;
            if !self.expect(TokenKind::In, "'in'") {
                return None;
            }
            let sequence = self.parse_expr_single()?;
            node.add_child(XPathNode::with_children(
                NodeKind::QuantifiedBinding,
                name,
                vec![sequence],
            ));
            if !self.match_kind(TokenKind::Comma) {
                break;
            }
        }
        if !self.expect(TokenKind::Satisfies, "'satisfies'") {
            return None;
        }
        let condition = self.parse_expr_single()?;
        node.add_child(condition);
        Some(node)
    }

    // `typeswitch(expr) case … default …`
    fn parse_typeswitch_expr(&mut self) -> Option<XPathNode> {
        self.advance(); // typeswitch
        self.expect(TokenKind::LParen, "'(' after 'typeswitch'");
        let operand = self.parse_expr()?;
        self.expect(TokenKind::RParen, "')' after typeswitch operand");

        let mut node = XPathNode::with_children(NodeKind::Typeswitch, "", vec![operand]);
        let mut saw_case = false;
        while self.match_kind(TokenKind::Case) {
            saw_case = true;
            let mut info = crate::ast::TypeswitchCaseInfo::default();
            if self.match_kind(TokenKind::Dollar) {
                info.variable_name = self.parse_qname_string()?;
                if !self.expect(TokenKind::As, "'as' after case variable") {
                    return None;
                }
            }
            info.sequence_type = self.collect_sequence_type()?;
            if !self.expect(TokenKind::Return, "'return' in case clause") {
                return None;
            }
            let body = self.parse_expr_single()?;
            let mut case = XPathNode::with_children(NodeKind::TypeswitchCase, "", vec![body]);
            case.typeswitch_case = Some(info);
            node.add_child(case);
        }
        if !saw_case {
            self.report("typeswitch requires at least one case clause");
        }
        if !self.expect(TokenKind::Default, "'default' clause in typeswitch") {
            return None;
        }
        let mut info = crate::ast::TypeswitchCaseInfo {
            is_default: true,
            ..crate::ast::TypeswitchCaseInfo::default()
        };
        if self.match_kind(TokenKind::Dollar) {
            info.variable_name = self.parse_qname_string()?;
        }
        if !self.expect(TokenKind::Return, "'return' in default clause") {
            return None;
        }
        let body = self.parse_expr_single()?;
        let mut case = XPathNode::with_children(NodeKind::TypeswitchCase, "", vec![body]);
        case.typeswitch_case = Some(info);
        node.add_child(case);
        Some(node)
    }

    fn parse_or_expr(&mut self) -> Option<XPathNode> {
        let mut left = self.parse_and_expr()?;
        while self.check(TokenKind::Or) {
            self.advance();
            let right = self.parse_and_expr()?;
            left = XPathNode::binary("or", left, right);
        }
        Some(left)
    }

    fn parse_and_expr(&mut self) -> Option<XPathNode> {
        let mut left = self.parse_comparison_expr()?;
        while self.check(TokenKind::And) {
            self.advance();
            let right = self.parse_comparison_expr()?;
            left = XPathNode::binary("and", left, right);
        }
        Some(left)
    }

    // comparisons are non-associative: at most one comparison per level
    fn parse_comparison_expr(&mut self) -> Option<XPathNode> {
        let left = self.parse_range_expr()?;
        let lexeme = match self.peek().kind {
            TokenKind::Equals => "=",
            TokenKind::NotEquals => "!=",
            TokenKind::LessThan => "<",
            TokenKind::LessEqual => "<=",
            TokenKind::GreaterThan => ">",
            TokenKind::GreaterEqual => ">=",
            TokenKind::Eq => "eq",
            TokenKind::Ne => "ne",
            TokenKind::Lt => "lt",
            TokenKind::Le => "le",
            TokenKind::Gt => "gt",
            TokenKind::Ge => "ge",
            _ => return Some(left),
        };
        self.advance();
        let right = self.parse_range_expr()?;
        Some(XPathNode::binary(lexeme, left, right))
    }

    fn parse_range_expr(&mut self) -> Option<XPathNode> {
        let left = self.parse_additive_expr()?;
        if self.check(TokenKind::To) {
            self.advance();
            let right = self.parse_additive_expr()?;
            return Some(XPathNode::binary("to", left, right));
        }
        Some(left)
    }

    fn parse_additive_expr(&mut self) -> Option<XPathNode> {
        let mut left = self.parse_multiplicative_expr()?;
        loop {
            let lexeme = match self.peek().kind {
                TokenKind::Plus => "+",
                TokenKind::Minus => "-",
                _ => return Some(left),
            };
            self.advance();
            let right = self.parse_multiplicative_expr()?;
            left = XPathNode::binary(lexeme, left, right);
        }
    }

    fn parse_multiplicative_expr(&mut self) -> Option<XPathNode> {
        let mut left = self.parse_union_expr()?;
        loop {
            let lexeme = match self.peek().kind {
                TokenKind::Multiply => "*",
                TokenKind::Divide => "div",
                TokenKind::Modulo => "mod",
                _ => return Some(left),
            };
            self.advance();
            let right = self.parse_union_expr()?;
            left = XPathNode::binary(lexeme, left, right);
        }
    }

    fn parse_union_expr(&mut self) -> Option<XPathNode> {
        let mut left = self.parse_intersect_expr()?;
        loop {
            if self.check(TokenKind::Pipe) {
                self.advance();
            } else if self.check_identifier_keyword("union")
                && !starts_path_continuation(self.peek_at(1).kind)
            {
                self.advance();
            } else {
                return Some(left);
            }
            let right = self.parse_intersect_expr()?;
            left = XPathNode::binary("|", left, right);
        }
    }

    fn parse_intersect_expr(&mut self) -> Option<XPathNode> {
        let mut left = self.parse_instance_of_expr()?;
        loop {
            let lexeme = if self.check_identifier_keyword("intersect")
                && !starts_path_continuation(self.peek_at(1).kind)
            {
                "intersect"
            } else if self.check_identifier_keyword("except")
                && !starts_path_continuation(self.peek_at(1).kind)
            {
                "except"
            } else {
                return Some(left);
            };
            self.advance();
            let right = self.parse_instance_of_expr()?;
            left = XPathNode::binary(lexeme, left, right);
        }
    }

    fn parse_instance_of_expr(&mut self) -> Option<XPathNode> {
        let left = self.parse_treat_expr()?;
        if self.check(TokenKind::Instance) && self.peek_at(1).kind == TokenKind::Of {
            self.advance();
            self.advance();
            let sequence_type = self.collect_sequence_type()?;
            return Some(XPathNode::with_children(
                NodeKind::InstanceOf,
                sequence_type,
                vec![left],
            ));
        }
        Some(left)
    }

    fn parse_treat_expr(&mut self) -> Option<XPathNode> {
        let left = self.parse_castable_expr()?;
        if self.check(TokenKind::Treat) && self.peek_at(1).kind == TokenKind::As {
            self.advance();
            self.advance();
            let sequence_type = self.collect_sequence_type()?;
            return Some(XPathNode::with_children(
                NodeKind::Treat,
                sequence_type,
                vec![left],
            ));
        }
        Some(left)
    }

    fn parse_castable_expr(&mut self) -> Option<XPathNode> {
        let left = self.parse_cast_expr()?;
        if self.check(TokenKind::Castable) && self.peek_at(1).kind == TokenKind::As {
            self.advance();
            self.advance();
            let single_type = self.parse_single_type()?;
            return Some(XPathNode::with_children(
                NodeKind::Castable,
                single_type,
                vec![left],
            ));
        }
        Some(left)
    }

    fn parse_cast_expr(&mut self) -> Option<XPathNode> {
        let left = self.parse_unary_expr()?;
        if self.check(TokenKind::Cast) && self.peek_at(1).kind == TokenKind::As {
            self.advance();
            self.advance();
            let single_type = self.parse_single_type()?;
            return Some(XPathNode::with_children(
                NodeKind::Cast,
                single_type,
                vec![left],
            ));
        }
        Some(left)
    }

    // `('+'|'-')* ('not' unary | path)`
    fn parse_unary_expr(&mut self) -> Option<XPathNode> {
        let mut negations = 0usize;
        loop {
            if self.match_kind(TokenKind::Minus) {
                negations += 1;
            } else if self.match_kind(TokenKind::Plus) {
                // unary plus is the identity
            } else {
                break;
            }
        }
        let mut operand = if self.check(TokenKind::Not) {
            self.advance();
            let inner = self.parse_unary_expr()?;
            XPathNode::unary("not", inner)
        } else {
            self.parse_path_expr()?
        };
        for _ in 0..negations {
            operand = XPathNode::unary("-", operand);
        }
        Some(operand)
    }
}

// `union`/`intersect`/`except` written before a token that can only
// continue a path keep their identifier reading (`/union/intersect` is a
// path over elements with those names).
fn starts_path_continuation(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::AxisSeparator | TokenKind::Colon | TokenKind::LParen
    )
}
