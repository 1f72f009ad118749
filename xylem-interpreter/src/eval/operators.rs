//! Binary and unary operator evaluation, dispatched on the operator kind
//! the parser cached on the node. Arithmetic chains of one operator are
//! flattened and folded iteratively to bound recursion on deep spines.

use xylem_xquery_ast::{BinaryOperationKind, NodeKind, UnaryOperationKind, XPathNode};

use crate::error::{Error, ErrorCode, Result};
use crate::eval::Evaluator;
use crate::value::{NodeSet, XPathVal};
use crate::xml::NodeEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl<'a> Evaluator<'a> {
    pub(crate) fn evaluate_binary(&mut self, node: &XPathNode) -> Result<XPathVal> {
        let kind = match node.binary_kind {
            Some(kind) => kind,
            None => {
                // parser normally caches the kind; fall back to the lexeme
                self.binary_cache_fallbacks += 1;
                BinaryOperationKind::from_lexeme(&node.value).ok_or_else(|| {
                    Error::with_message(
                        ErrorCode::XPST0003,
                        format!("unknown operator '{}'", node.value),
                    )
                })?
            }
        };
        let left = &node.children[0];
        let right = &node.children[1];

        use BinaryOperationKind::*;
        match kind {
            And => {
                let lhs = self.evaluate_node(left)?;
                if !lhs.to_boolean() {
                    return Ok(XPathVal::Boolean(false));
                }
                let rhs = self.evaluate_node(right)?;
                Ok(XPathVal::Boolean(rhs.to_boolean()))
            }
            Or => {
                let lhs = self.evaluate_node(left)?;
                if lhs.to_boolean() {
                    return Ok(XPathVal::Boolean(true));
                }
                let rhs = self.evaluate_node(right)?;
                Ok(XPathVal::Boolean(rhs.to_boolean()))
            }
            GeneralEq | GeneralNe | GeneralLt | GeneralLe | GeneralGt | GeneralGe => {
                let lhs = self.evaluate_node(left)?;
                let rhs = self.evaluate_node(right)?;
                self.general_comparison(&lhs, &rhs, comparison_op(kind))
            }
            ValueEq | ValueNe | ValueLt | ValueLe | ValueGt | ValueGe => {
                let lhs = self.evaluate_node(left)?;
                let rhs = self.evaluate_node(right)?;
                self.value_comparison(&lhs, &rhs, comparison_op(kind))
            }
            Add | Subtract | Multiply | Divide | Modulo => {
                let operands = collect_operation_chain(node, kind);
                self.evaluate_arithmetic_chain(&operands, kind)
            }
            Range => {
                let lhs = self.evaluate_node(left)?;
                let rhs = self.evaluate_node(right)?;
                self.evaluate_range(&lhs, &rhs)
            }
            Union | Intersect | Except => {
                let lhs = self.evaluate_node(left)?;
                let rhs = self.evaluate_node(right)?;
                self.evaluate_set_operation(lhs, rhs, kind)
            }
        }
    }

    pub(crate) fn evaluate_unary(&mut self, node: &XPathNode) -> Result<XPathVal> {
        let kind = match node.unary_kind {
            Some(kind) => kind,
            None => {
                self.unary_cache_fallbacks += 1;
                UnaryOperationKind::from_lexeme(&node.value).ok_or_else(|| {
                    Error::with_message(
                        ErrorCode::XPST0003,
                        format!("unknown unary operator '{}'", node.value),
                    )
                })?
            }
        };
        let operand = self.evaluate_node(&node.children[0])?;
        match kind {
            UnaryOperationKind::Negate => {
                if operand.is_empty() {
                    return Ok(XPathVal::Empty);
                }
                Ok(XPathVal::Number(-operand.to_number()))
            }
            UnaryOperationKind::LogicalNot => Ok(XPathVal::Boolean(!operand.to_boolean())),
        }
    }

    // ----- comparisons --------------------------------------------------

    /// General comparison: existential over the atomised items of both
    /// sides.
    fn general_comparison(
        &mut self,
        lhs: &XPathVal,
        rhs: &XPathVal,
        op: ComparisonOp,
    ) -> Result<XPathVal> {
        let left_items = lhs.atomized();
        let right_items = rhs.atomized();
        for left in &left_items {
            for right in &right_items {
                if compare_atomic(left, right, op) {
                    return Ok(XPathVal::Boolean(true));
                }
            }
        }
        Ok(XPathVal::Boolean(false))
    }

    /// Value comparison: both sides must be at most one item; an empty
    /// operand yields the empty sequence.
    fn value_comparison(
        &mut self,
        lhs: &XPathVal,
        rhs: &XPathVal,
        op: ComparisonOp,
    ) -> Result<XPathVal> {
        let left_items = lhs.atomized();
        let right_items = rhs.atomized();
        if left_items.is_empty() || right_items.is_empty() {
            return Ok(XPathVal::Empty);
        }
        if left_items.len() > 1 || right_items.len() > 1 {
            return Err(Error::with_message(
                ErrorCode::XPTY0004,
                "value comparison requires single items",
            ));
        }
        Ok(XPathVal::Boolean(compare_atomic(
            &left_items[0],
            &right_items[0],
            op,
        )))
    }

    // ----- arithmetic ---------------------------------------------------

    fn evaluate_arithmetic_chain(
        &mut self,
        operands: &[&XPathNode],
        kind: BinaryOperationKind,
    ) -> Result<XPathVal> {
        debug_assert!(operands.len() >= 2);
        let first = self.evaluate_node(operands[0])?;
        if first.is_empty() {
            return Ok(XPathVal::Empty);
        }
        let mut accumulator = first.to_number();
        for operand in &operands[1..] {
            let value = self.evaluate_node(operand)?;
            if value.is_empty() {
                return Ok(XPathVal::Empty);
            }
            let rhs = value.to_number();
            accumulator = self.apply_arithmetic(accumulator, rhs, kind)?;
        }
        Ok(XPathVal::Number(accumulator))
    }

    fn apply_arithmetic(
        &mut self,
        lhs: f64,
        rhs: f64,
        kind: BinaryOperationKind,
    ) -> Result<f64> {
        use BinaryOperationKind::*;
        Ok(match kind {
            Add => lhs + rhs,
            Subtract => lhs - rhs,
            Multiply => lhs * rhs,
            Divide => {
                if rhs == 0.0 && is_integral(lhs) && is_integral(rhs) {
                    return Err(Error::with_message(
                        ErrorCode::FOAR0001,
                        "integer division by zero",
                    ));
                }
                lhs / rhs
            }
            Modulo => {
                if rhs == 0.0 {
                    if is_integral(lhs) {
                        return Err(Error::with_message(
                            ErrorCode::FOAR0001,
                            "modulus by zero",
                        ));
                    }
                    return Ok(f64::NAN);
                }
                lhs % rhs
            }
            _ => unreachable!("not an arithmetic operator"),
        })
    }

    // `m to n`: the integer sequence m..=n, empty when m > n
    fn evaluate_range(&mut self, lhs: &XPathVal, rhs: &XPathVal) -> Result<XPathVal> {
        if lhs.is_empty() || rhs.is_empty() {
            return Ok(XPathVal::Empty);
        }
        let start = lhs.to_number();
        let end = rhs.to_number();
        if !is_integral(start) || !is_integral(end) {
            return Err(Error::with_message(
                ErrorCode::XPTY0004,
                "range bounds must be integers",
            ));
        }
        let start = start as i64;
        let end = end as i64;
        if start > end {
            return Ok(XPathVal::Empty);
        }
        if start == end {
            return Ok(XPathVal::Number(start as f64));
        }
        let items = (start..=end).map(|n| XPathVal::Number(n as f64)).collect();
        Ok(XPathVal::Sequence(items))
    }

    // ----- set operations -----------------------------------------------

    fn evaluate_set_operation(
        &mut self,
        lhs: XPathVal,
        rhs: XPathVal,
        kind: BinaryOperationKind,
    ) -> Result<XPathVal> {
        let left = into_node_entries(lhs)?;
        let right = into_node_entries(rhs)?;
        let entries = match kind {
            BinaryOperationKind::Union => {
                let mut combined = left;
                combined.extend(right);
                combined
            }
            BinaryOperationKind::Intersect => {
                let right_set = NodeSet::new(right);
                left.into_iter()
                    .filter(|entry| right_set.contains(entry))
                    .collect()
            }
            BinaryOperationKind::Except => {
                let right_set = NodeSet::new(right);
                left.into_iter()
                    .filter(|entry| !right_set.contains(entry))
                    .collect()
            }
            _ => unreachable!("not a set operator"),
        };
        Ok(XPathVal::NodeSet(NodeSet::new(entries)))
    }
}

fn comparison_op(kind: BinaryOperationKind) -> ComparisonOp {
    use BinaryOperationKind::*;
    match kind {
        GeneralEq | ValueEq => ComparisonOp::Eq,
        GeneralNe | ValueNe => ComparisonOp::Ne,
        GeneralLt | ValueLt => ComparisonOp::Lt,
        GeneralLe | ValueLe => ComparisonOp::Le,
        GeneralGt | ValueGt => ComparisonOp::Gt,
        GeneralGe | ValueGe => ComparisonOp::Ge,
        _ => unreachable!("not a comparison operator"),
    }
}

// numeric comparison when either side is numeric, boolean when either is
// boolean, string comparison otherwise
fn compare_atomic(left: &XPathVal, right: &XPathVal, op: ComparisonOp) -> bool {
    let numeric = matches!(left, XPathVal::Number(_)) || matches!(right, XPathVal::Number(_));
    if numeric {
        let lhs = left.to_number();
        let rhs = right.to_number();
        return match op {
            ComparisonOp::Eq => lhs == rhs,
            ComparisonOp::Ne => lhs != rhs,
            ComparisonOp::Lt => lhs < rhs,
            ComparisonOp::Le => lhs <= rhs,
            ComparisonOp::Gt => lhs > rhs,
            ComparisonOp::Ge => lhs >= rhs,
        };
    }
    let boolean = matches!(left, XPathVal::Boolean(_)) || matches!(right, XPathVal::Boolean(_));
    if boolean {
        let lhs = left.to_boolean();
        let rhs = right.to_boolean();
        return match op {
            ComparisonOp::Eq => lhs == rhs,
            ComparisonOp::Ne => lhs != rhs,
            ComparisonOp::Lt => !lhs & rhs,
            ComparisonOp::Le => lhs <= rhs,
            ComparisonOp::Gt => lhs & !rhs,
            ComparisonOp::Ge => lhs >= rhs,
        };
    }
    let lhs = left.to_string_value();
    let rhs = right.to_string_value();
    match op {
        ComparisonOp::Eq => lhs == rhs,
        ComparisonOp::Ne => lhs != rhs,
        ComparisonOp::Lt => lhs < rhs,
        ComparisonOp::Le => lhs <= rhs,
        ComparisonOp::Gt => lhs > rhs,
        ComparisonOp::Ge => lhs >= rhs,
    }
}

pub(crate) fn is_integral(value: f64) -> bool {
    value.is_finite() && value.fract() == 0.0
}

// same-operator left spines ((a + b) + c) flatten into [a, b, c] so deep
// expressions fold in a loop instead of recursing; only the left spine
// may be flattened, a parenthesised right operand keeps its own node
fn collect_operation_chain(node: &XPathNode, kind: BinaryOperationKind) -> Vec<&XPathNode> {
    let mut operands = Vec::new();
    let mut current = node;
    loop {
        operands.push(&current.children[1]);
        let left = &current.children[0];
        if left.kind == NodeKind::BinaryOp && left.binary_kind == Some(kind) {
            current = left;
        } else {
            operands.push(left);
            break;
        }
    }
    operands.reverse();
    operands
}

fn into_node_entries(value: XPathVal) -> Result<Vec<NodeEntry>> {
    match value {
        XPathVal::Empty => Ok(Vec::new()),
        XPathVal::NodeSet(set) => Ok(set.entries),
        _ => Err(Error::with_message(
            ErrorCode::XPTY0004,
            "set operators require node sequences",
        )),
    }
}
