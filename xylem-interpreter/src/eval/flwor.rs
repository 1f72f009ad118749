//! The FLWOR tuple pipeline, quantified expressions and typeswitch.
//!
//! Clauses transform a stream of variable-binding tuples in source order;
//! `return` evaluates once per surviving tuple and the results are
//! concatenated in tuple order.

use xylem_xquery_ast::{NodeKind, OrderSpecOptions, XPathNode};

use crate::context::BindingGuard;
use crate::error::{Error, ErrorCode, Result};
use crate::eval::Evaluator;
use crate::sequence_type::SequenceTypeInfo;
use crate::value::XPathVal;

#[derive(Debug, Clone, Default)]
struct Tuple {
    bindings: Vec<(String, XPathVal)>,
}

impl Tuple {
    fn get(&self, name: &str) -> Option<&XPathVal> {
        self.bindings
            .iter()
            .rev()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    fn with(&self, name: &str, value: XPathVal) -> Tuple {
        let mut next = self.clone();
        next.bindings.push((name.to_string(), value));
        next
    }
}

impl<'a> Evaluator<'a> {
    pub(crate) fn evaluate_flwor(&mut self, node: &XPathNode) -> Result<XPathVal> {
        let clauses = &node.children[..node.children.len() - 1];
        let return_expr = node.children.last().expect("parser guarantees a return");

        let mut tuples = vec![Tuple::default()];
        let mut index = 0;
        while index < clauses.len() {
            let clause = &clauses[index];
            match clause.kind {
                NodeKind::ForBinding => {
                    let mut expanded = Vec::new();
                    for tuple in &tuples {
                        let sequence =
                            self.evaluate_with_tuple(tuple, &clause.children[0])?;
                        for item in sequence.items() {
                            expanded.push(tuple.with(&clause.value, item));
                        }
                    }
                    tuples = expanded;
                }
                NodeKind::LetBinding => {
                    let mut extended = Vec::with_capacity(tuples.len());
                    for tuple in &tuples {
                        let value = self.evaluate_with_tuple(tuple, &clause.children[0])?;
                        extended.push(tuple.with(&clause.value, value));
                    }
                    tuples = extended;
                }
                NodeKind::WhereClause => {
                    let mut kept = Vec::with_capacity(tuples.len());
                    for tuple in tuples {
                        let condition =
                            self.evaluate_with_tuple(&tuple, &clause.children[0])?;
                        if condition.to_boolean() {
                            kept.push(tuple);
                        }
                    }
                    tuples = kept;
                }
                NodeKind::GroupByClause => {
                    tuples = self.group_tuples(tuples, clause)?;
                }
                NodeKind::OrderByClause => {
                    tuples = self.order_tuples(tuples, clause)?;
                }
                NodeKind::CountClause => {
                    tuples = tuples
                        .into_iter()
                        .enumerate()
                        .map(|(position, tuple)| {
                            tuple.with(&clause.value, XPathVal::Number((position + 1) as f64))
                        })
                        .collect();
                }
                other => {
                    return Err(Error::with_message(
                        ErrorCode::XPST0003,
                        format!("unexpected FLWOR clause {other:?}"),
                    ))
                }
            }
            index += 1;
        }

        let mut results = Vec::with_capacity(tuples.len());
        for tuple in &tuples {
            results.push(self.evaluate_with_tuple(tuple, return_expr)?);
        }
        Ok(XPathVal::concatenate(results))
    }

    // evaluate an expression with a tuple's bindings installed
    fn evaluate_with_tuple(&mut self, tuple: &Tuple, expression: &XPathNode) -> Result<XPathVal> {
        let guards: Vec<BindingGuard> = tuple
            .bindings
            .iter()
            .map(|(name, value)| self.variables.bind(name, value.clone()))
            .collect();
        let result = self.evaluate_node(expression);
        for guard in guards.into_iter().rev() {
            self.variables.restore(guard);
        }
        result
    }

    // Partition the tuple stream by grouping keys. Groups keep first-seen
    // order; within a group the grouping variables take the key value and
    // every other variable unifies to the concatenation of its per-tuple
    // values.
    fn group_tuples(&mut self, tuples: Vec<Tuple>, clause: &XPathNode) -> Result<Vec<Tuple>> {
        struct Group {
            key_values: Vec<(String, XPathVal)>,
            members: Vec<Tuple>,
        }

        let mut group_order: Vec<String> = Vec::new();
        let mut groups: Vec<Group> = Vec::new();

        for tuple in tuples {
            let mut key_values = Vec::with_capacity(clause.children.len());
            for key in &clause.children {
                let info = key.group_key.as_ref().expect("group key carries its info");
                let value = match key.children.first() {
                    Some(expression) => self.evaluate_with_tuple(&tuple, expression)?,
                    None => tuple.get(&info.variable_name).cloned().ok_or_else(|| {
                        Error::with_message(
                            ErrorCode::XPST0008,
                            format!("grouping variable '${}' is not bound", info.variable_name),
                        )
                    })?,
                };
                key_values.push((info.variable_name.clone(), value));
            }
            let mut key_strings = self.arena.strings.acquire(key_values.len());
            for (_, value) in &key_values {
                key_strings.push(value.to_string_value());
            }
            let group_key = key_strings.join("\u{1}");
            self.arena.strings.release(key_strings);

            match group_order.iter().position(|existing| *existing == group_key) {
                Some(position) => groups[position].members.push(tuple),
                None => {
                    group_order.push(group_key);
                    groups.push(Group {
                        key_values,
                        members: vec![tuple],
                    });
                }
            }
        }

        let mut grouped = Vec::with_capacity(groups.len());
        for group in groups {
            let mut tuple = Tuple::default();
            // non-key variables unify to their group-wide sequences
            let mut seen: Vec<String> = Vec::new();
            for member in &group.members {
                for (name, _) in &member.bindings {
                    if !seen.contains(name)
                        && !group.key_values.iter().any(|(key, _)| key == name)
                    {
                        seen.push(name.clone());
                    }
                }
            }
            for name in seen {
                let values: Vec<XPathVal> = group
                    .members
                    .iter()
                    .filter_map(|member| member.get(&name).cloned())
                    .collect();
                tuple.bindings.push((name, XPathVal::concatenate(values)));
            }
            for (name, value) in group.key_values {
                tuple.bindings.push((name, value));
            }
            grouped.push(tuple);
        }
        Ok(grouped)
    }

    // Stable sort of the tuple stream by the order specs. A stable sort
    // implements both forms; `stable order by` additionally guarantees
    // input order within ties, which the stable sort provides.
    fn order_tuples(&mut self, tuples: Vec<Tuple>, clause: &XPathNode) -> Result<Vec<Tuple>> {
        let default_empty_greatest =
            self.active_prolog().empty_order == xylem_xquery_ast::EmptyOrder::Greatest;

        // evaluate all keys up front; comparison itself is pure
        let mut keyed: Vec<(Vec<SortKey>, Tuple)> = Vec::with_capacity(tuples.len());
        for tuple in tuples {
            let mut keys = Vec::with_capacity(clause.children.len());
            for spec in &clause.children {
                let value = self.evaluate_with_tuple(&tuple, &spec.children[0])?;
                let options = spec.order_options.clone().unwrap_or_default();
                keys.push(make_sort_key(value, options, default_empty_greatest));
            }
            keyed.push((keys, tuple));
        }

        keyed.sort_by(|(left, _), (right, _)| {
            for (a, b) in left.iter().zip(right.iter()) {
                let ordering = a.compare(b);
                if ordering != std::cmp::Ordering::Equal {
                    return ordering;
                }
            }
            std::cmp::Ordering::Equal
        });

        Ok(keyed.into_iter().map(|(_, tuple)| tuple).collect())
    }

    // ----- quantified ---------------------------------------------------

    pub(crate) fn evaluate_quantified(&mut self, node: &XPathNode) -> Result<XPathVal> {
        let every = node.value == "every";
        let bindings = &node.children[..node.children.len() - 1];
        let condition = node.children.last().expect("parser guarantees satisfies");
        let result = self.quantified_over(bindings, condition, every)?;
        Ok(XPathVal::Boolean(result))
    }

    // short-circuiting cartesian walk over the binding sequences
    fn quantified_over(
        &mut self,
        bindings: &[XPathNode],
        condition: &XPathNode,
        every: bool,
    ) -> Result<bool> {
        let Some(binding) = bindings.first() else {
            let value = self.evaluate_node(condition)?;
            return Ok(value.to_boolean());
        };
        let sequence = self.evaluate_node(&binding.children[0])?;
        for item in sequence.items() {
            let guard = self.variables.bind(&binding.value, item);
            let inner = self.quantified_over(&bindings[1..], condition, every);
            self.variables.restore(guard);
            let inner = inner?;
            if every && !inner {
                return Ok(false);
            }
            if !every && inner {
                return Ok(true);
            }
        }
        Ok(every)
    }

    // ----- typeswitch ---------------------------------------------------

    pub(crate) fn evaluate_typeswitch(&mut self, node: &XPathNode) -> Result<XPathVal> {
        let operand = self.evaluate_node(&node.children[0])?;
        for case in &node.children[1..] {
            let info = case
                .typeswitch_case
                .as_ref()
                .expect("typeswitch case carries its info");
            if !info.is_default {
                let sequence_type = SequenceTypeInfo::parse(&info.sequence_type)?;
                if !sequence_type.matches(&operand) {
                    continue;
                }
            }
            if info.has_variable() {
                let guard = self.variables.bind(&info.variable_name, operand.clone());
                let result = self.evaluate_node(&case.children[0]);
                self.variables.restore(guard);
                return result;
            }
            return self.evaluate_node(&case.children[0]);
        }
        // the grammar guarantees a default case, so this is unreachable
        // for parser-produced trees
        Ok(XPathVal::Empty)
    }
}

// one evaluated ordering key with its spec options applied
struct SortKey {
    // None is the empty sequence (or NaN)
    value: Option<KeyValue>,
    descending: bool,
    empty_greatest: bool,
}

enum KeyValue {
    Number(f64),
    Text(String),
}

fn make_sort_key(
    value: XPathVal,
    options: OrderSpecOptions,
    default_empty_greatest: bool,
) -> SortKey {
    let empty_greatest = if options.has_empty_mode {
        options.empty_is_greatest
    } else {
        default_empty_greatest
    };
    let key_value = if value.is_empty() {
        None
    } else {
        match &value {
            XPathVal::Number(number) if number.is_nan() => None,
            XPathVal::Number(number) => Some(KeyValue::Number(*number)),
            other => Some(KeyValue::Text(other.to_string_value())),
        }
    };
    SortKey {
        value: key_value,
        descending: options.is_descending,
        empty_greatest,
    }
}

impl SortKey {
    fn compare(&self, other: &SortKey) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        let ordering = match (&self.value, &other.value) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => {
                if self.empty_greatest {
                    Ordering::Greater
                } else {
                    Ordering::Less
                }
            }
            (Some(_), None) => {
                if self.empty_greatest {
                    Ordering::Less
                } else {
                    Ordering::Greater
                }
            }
            (Some(KeyValue::Number(a)), Some(KeyValue::Number(b))) => {
                a.partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (Some(KeyValue::Text(a)), Some(KeyValue::Text(b))) => a.cmp(b),
            (Some(KeyValue::Number(a)), Some(KeyValue::Text(b))) => {
                crate::value::format_double(*a).cmp(b)
            }
            (Some(KeyValue::Text(a)), Some(KeyValue::Number(b))) => {
                a.cmp(&crate::value::format_double(*b))
            }
        };
        if self.descending {
            ordering.reverse()
        } else {
            ordering
        }
    }
}
