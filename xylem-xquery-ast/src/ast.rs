//! The query AST: a tagged node tree produced by the parser and walked by
//! the evaluator.
//!
//! Nodes are deliberately uniform: every node has a kind, an optional
//! string value (name, literal text, operator lexeme) and ordered children.
//! Kind-specific payloads (constructor details, order-by options, lookup
//! specifiers and so on) ride along as optional sidecars so the tree can be
//! traversed generically.

/// Resolved binary operator kind, cached on the node by the parser so the
/// evaluator does not re-compare operator lexemes on every visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperationKind {
    And,
    Or,
    Union,
    Intersect,
    Except,
    GeneralEq,
    GeneralNe,
    GeneralLt,
    GeneralLe,
    GeneralGt,
    GeneralGe,
    ValueEq,
    ValueNe,
    ValueLt,
    ValueLe,
    ValueGt,
    ValueGe,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Range,
}

impl BinaryOperationKind {
    /// Maps an operator lexeme to its kind; used by the parser when caching
    /// and by the evaluator as a fallback for nodes without a cache.
    pub fn from_lexeme(lexeme: &str) -> Option<BinaryOperationKind> {
        use BinaryOperationKind::*;
        Some(match lexeme {
            "and" => And,
            "or" => Or,
            "|" | "union" => Union,
            "intersect" => Intersect,
            "except" => Except,
            "=" => GeneralEq,
            "!=" => GeneralNe,
            "<" => GeneralLt,
            "<=" => GeneralLe,
            ">" => GeneralGt,
            ">=" => GeneralGe,
            "eq" => ValueEq,
            "ne" => ValueNe,
            "lt" => ValueLt,
            "le" => ValueLe,
            "gt" => ValueGt,
            "ge" => ValueGe,
            "+" => Add,
            "-" => Subtract,
            "*" => Multiply,
            "div" => Divide,
            "mod" => Modulo,
            "to" => Range,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperationKind {
    Negate,
    LogicalNot,
}

impl UnaryOperationKind {
    pub fn from_lexeme(lexeme: &str) -> Option<UnaryOperationKind> {
        match lexeme {
            "-" => Some(UnaryOperationKind::Negate),
            "not" => Some(UnaryOperationKind::LogicalNot),
            _ => None,
        }
    }
}

/// Node classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Comma sequence wrapper; children are the member expressions.
    Expression,
    EmptySequence,
    /// String literal; `value` holds the unescaped text.
    Literal,
    /// Numeric literal; `value` holds the lexical form.
    Number,
    /// `$name`; `value` holds the QName.
    VariableReference,
    /// `.`
    ContextItem,
    /// Leading `/` of an absolute path.
    Root,
    /// Leading `//` of an absolute path.
    RootDescendant,
    /// Path expression; children are steps (or a filter expression followed
    /// by steps).
    Path,
    /// One location step: optional axis specifier, node test, predicates.
    Step,
    /// `value` holds the axis name.
    AxisSpecifier,
    /// Name test; `value` holds `name`, `prefix:name`, `prefix:*` or `*`.
    NameTest,
    /// Kind test such as `text()` or `element(name)`; `value` holds the
    /// test name, an optional name argument is in `children`.
    KindTest,
    /// `[expr]`; single child is the predicate expression.
    Predicate,
    /// Primary expression with postfix predicates/lookups applied. First
    /// child is the base, remaining children are `Predicate` nodes.
    Filter,
    /// `value` holds the function QName; children are the arguments.
    FunctionCall,
    BinaryOp,
    UnaryOp,
    /// `if`; children are `[condition, then, else]`.
    Conditional,
    /// FLWOR expression; children are clause nodes in source order, the
    /// last child is the `return` expression.
    Flwor,
    /// `for $v in expr`; `value` is the variable QName, child 0 the
    /// sequence expression.
    ForBinding,
    /// `let $v := expr`.
    LetBinding,
    WhereClause,
    /// `group by`; children are `GroupKey` nodes.
    GroupByClause,
    /// One grouping key; sidecar names the variable, an optional child
    /// holds the key expression.
    GroupKey,
    /// `order by`; children are `OrderSpec` nodes, `order_stable` is set
    /// for `stable order by`.
    OrderByClause,
    /// One ordering key; child 0 is the key expression.
    OrderSpec,
    /// `count $v`; `value` is the variable QName.
    CountClause,
    /// `some`/`every` (in `value`); children are bindings then the
    /// `satisfies` expression.
    Quantified,
    QuantifiedBinding,
    /// Children: operand, then `TypeswitchCase` nodes.
    Typeswitch,
    /// One `case`/`default`; sidecar carries variable and sequence type,
    /// child 0 is the return expression.
    TypeswitchCase,
    /// `cast as`; `value` holds the single type, child 0 the operand.
    Cast,
    Castable,
    /// `treat as`; `value` holds the sequence type.
    Treat,
    /// `instance of`; `value` holds the sequence type.
    InstanceOf,
    /// Direct element constructor; sidecar describes the tag, children are
    /// the content items.
    DirectElement,
    /// Literal text inside a direct constructor body.
    TextContent,
    /// `element name {…}` / `element {expr} {…}`.
    ComputedElement,
    ComputedAttribute,
    TextConstructor,
    CommentConstructor,
    /// Processing-instruction constructor. For the direct form `value`
    /// holds the target and `children` the data; computed targets use
    /// `name_expression`.
    PiConstructor,
    DocumentConstructor,
    /// `map { … }`; entries are in `map_entries`.
    MapConstructor,
    /// `[ … ]` or `array { … }`; members are in `array_members`.
    ArrayConstructor,
    /// Postfix lookup; child 0 is the base, specifiers are in
    /// `lookup_specifiers`.
    Lookup,
}

/// One literal-or-expression fragment of an attribute value template.
#[derive(Debug, Clone, Default)]
pub struct AttributeValuePart {
    pub is_expression: bool,
    pub text: String,
    /// Parsed form of `text` when `is_expression` is set.
    pub expression: Option<Box<XPathNode>>,
}

/// An attribute recognised inside a direct constructor tag.
#[derive(Debug, Clone, Default)]
pub struct ConstructorAttribute {
    pub prefix: String,
    pub name: String,
    pub is_namespace_declaration: bool,
    pub value_parts: Vec<AttributeValuePart>,
}

impl ConstructorAttribute {
    pub fn has_expressions(&self) -> bool {
        self.value_parts.iter().any(|part| part.is_expression)
    }

    /// The literal value, valid only when no part is an expression.
    pub fn literal_value(&self) -> String {
        let mut value = String::new();
        for part in &self.value_parts {
            if !part.is_expression {
                value.push_str(&part.text);
            }
        }
        value
    }
}

/// Tag-level details of a direct or computed element constructor.
#[derive(Debug, Clone, Default)]
pub struct ConstructorInfo {
    pub prefix: String,
    pub name: String,
    pub is_empty_element: bool,
    pub is_direct: bool,
    pub attributes: Vec<ConstructorAttribute>,
}

#[derive(Debug, Clone, Default)]
pub struct OrderSpecOptions {
    pub is_descending: bool,
    pub has_empty_mode: bool,
    pub empty_is_greatest: bool,
    pub collation_uri: String,
}

impl OrderSpecOptions {
    pub fn has_collation(&self) -> bool {
        !self.collation_uri.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct GroupKeyInfo {
    pub variable_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct TypeswitchCaseInfo {
    pub variable_name: String,
    pub sequence_type: String,
    pub is_default: bool,
}

impl TypeswitchCaseInfo {
    pub fn has_variable(&self) -> bool {
        !self.variable_name.is_empty()
    }

    pub fn has_sequence_type(&self) -> bool {
        !self.sequence_type.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct MapEntry {
    pub key: Box<XPathNode>,
    pub value: Box<XPathNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupSpecifierKind {
    NcName,
    Wildcard,
    IntegerLiteral,
    Expression,
}

#[derive(Debug, Clone)]
pub struct LookupSpecifier {
    pub kind: LookupSpecifierKind,
    pub literal: String,
    pub expression: Option<Box<XPathNode>>,
}

/// One AST node. Children are owned exclusively; sidecars live and die
/// with the node.
#[derive(Debug, Clone)]
pub struct XPathNode {
    pub kind: NodeKind,
    pub value: String,
    pub children: Vec<XPathNode>,
    pub constructor: Option<Box<ConstructorInfo>>,
    pub name_expression: Option<Box<XPathNode>>,
    pub order_stable: bool,
    pub order_options: Option<OrderSpecOptions>,
    pub group_key: Option<GroupKeyInfo>,
    pub typeswitch_case: Option<TypeswitchCaseInfo>,
    pub binary_kind: Option<BinaryOperationKind>,
    pub unary_kind: Option<UnaryOperationKind>,
    pub map_entries: Vec<MapEntry>,
    pub array_members: Vec<XPathNode>,
    pub lookup_specifiers: Vec<LookupSpecifier>,
}

impl XPathNode {
    pub fn new(kind: NodeKind, value: impl Into<String>) -> Self {
        XPathNode {
            kind,
            value: value.into(),
            children: Vec::new(),
            constructor: None,
            name_expression: None,
            order_stable: false,
            order_options: None,
            group_key: None,
            typeswitch_case: None,
            binary_kind: None,
            unary_kind: None,
            map_entries: Vec::new(),
            array_members: Vec::new(),
            lookup_specifiers: Vec::new(),
        }
    }

    pub fn leaf(kind: NodeKind) -> Self {
        XPathNode::new(kind, "")
    }

    pub fn with_children(kind: NodeKind, value: impl Into<String>, children: Vec<XPathNode>) -> Self {
        let mut node = XPathNode::new(kind, value);
        node.children = children;
        node
    }

    pub fn add_child(&mut self, child: XPathNode) {
        self.children.push(child);
    }

    pub fn child(&self, index: usize) -> Option<&XPathNode> {
        self.children.get(index)
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn child_is_kind(&self, index: usize, kind: NodeKind) -> bool {
        self.children
            .get(index)
            .map(|child| child.kind == kind)
            .unwrap_or(false)
    }

    /// Binary operator node with the kind cache populated.
    pub fn binary(lexeme: impl Into<String>, left: XPathNode, right: XPathNode) -> Self {
        let lexeme = lexeme.into();
        let mut node = XPathNode::with_children(NodeKind::BinaryOp, lexeme, vec![left, right]);
        node.binary_kind = BinaryOperationKind::from_lexeme(&node.value);
        node
    }

    /// Unary operator node with the kind cache populated.
    pub fn unary(lexeme: impl Into<String>, operand: XPathNode) -> Self {
        let lexeme = lexeme.into();
        let mut node = XPathNode::with_children(NodeKind::UnaryOp, lexeme, vec![operand]);
        node.unary_kind = UnaryOperationKind::from_lexeme(&node.value);
        node
    }

    /// Depth-first traversal over this node and all descendants, including
    /// sidecar expressions (constructor attribute templates, map entries,
    /// array members, lookup specifiers, computed names).
    pub fn visit<'a>(&'a self, visitor: &mut impl FnMut(&'a XPathNode)) {
        visitor(self);
        for child in &self.children {
            child.visit(visitor);
        }
        if let Some(name) = &self.name_expression {
            name.visit(visitor);
        }
        if let Some(info) = &self.constructor {
            for attribute in &info.attributes {
                for part in &attribute.value_parts {
                    if let Some(expression) = &part.expression {
                        expression.visit(visitor);
                    }
                }
            }
        }
        for entry in &self.map_entries {
            entry.key.visit(visitor);
            entry.value.visit(visitor);
        }
        for member in &self.array_members {
            member.visit(visitor);
        }
        for specifier in &self.lookup_specifiers {
            if let Some(expression) = &specifier.expression {
                expression.visit(visitor);
            }
        }
    }
}
