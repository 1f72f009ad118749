//! The typed value model: everything an expression can evaluate to.
//!
//! The value space is string / double / boolean / node-set / sequence /
//! map / array / empty, with total and deterministic conversion rules
//! between them. Node-sets hold entries in document order without
//! duplicates; sequences preserve construction order.

use itertools::Itertools;
use ordered_float::OrderedFloat;

use crate::xml::{serialize_entry, NodeEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Nil,
    String,
    Number,
    Boolean,
    NodeSet,
    Sequence,
    Map,
    Array,
}

/// An ordered, duplicate-free collection of nodes in document order.
#[derive(Debug, Clone, Default)]
pub struct NodeSet {
    pub entries: Vec<NodeEntry>,
}

impl NodeSet {
    pub fn new(entries: Vec<NodeEntry>) -> Self {
        let mut set = NodeSet { entries };
        set.normalise();
        set
    }

    /// For entries already known to be sorted and unique.
    pub fn from_sorted(entries: Vec<NodeEntry>) -> Self {
        NodeSet { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn first(&self) -> Option<&NodeEntry> {
        self.entries.first()
    }

    /// Sorts into document order and removes duplicate nodes.
    pub fn normalise(&mut self) {
        self.entries.sort_by_key(|entry| entry.order_key());
        self.entries.dedup_by(|a, b| a.order_key() == b.order_key());
    }

    pub fn contains(&self, entry: &NodeEntry) -> bool {
        let key = entry.order_key();
        self.entries
            .binary_search_by_key(&key, |existing| existing.order_key())
            .is_ok()
    }
}

/// Map keys are atomic values; doubles are wrapped for total ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MapKey {
    String(String),
    Number(OrderedFloat<f64>),
    Boolean(bool),
}

impl MapKey {
    pub fn from_value(value: &XPathVal) -> Option<MapKey> {
        match value {
            XPathVal::String(text) => Some(MapKey::String(text.clone())),
            XPathVal::Number(number) => Some(MapKey::Number(OrderedFloat(*number))),
            XPathVal::Boolean(flag) => Some(MapKey::Boolean(*flag)),
            XPathVal::NodeSet(set) if !set.is_empty() => {
                Some(MapKey::String(set.entries[0].string_value()))
            }
            _ => None,
        }
    }

    pub fn as_string(&self) -> String {
        match self {
            MapKey::String(text) => text.clone(),
            MapKey::Number(number) => format_double(number.0),
            MapKey::Boolean(flag) => flag.to_string(),
        }
    }
}

/// Insertion-ordered map from atomic keys to value sequences.
#[derive(Debug, Clone, Default)]
pub struct XPathMap {
    pub entries: Vec<(MapKey, XPathVal)>,
}

impl XPathMap {
    pub fn get(&self, key: &MapKey) -> Option<&XPathVal> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value)
    }

    /// Insert-or-replace, preserving first-insertion order.
    pub fn insert(&mut self, key: MapKey, value: XPathVal) {
        if let Some(slot) = self
            .entries
            .iter_mut()
            .find(|(existing, _)| *existing == key)
        {
            slot.1 = value;
            return;
        }
        self.entries.push((key, value));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Indexed sequence of member sequences (1-based access).
#[derive(Debug, Clone, Default)]
pub struct XPathArray {
    pub members: Vec<XPathVal>,
}

impl XPathArray {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&XPathVal> {
        self.members.get(index)
    }
}

#[derive(Debug, Clone, Default)]
pub enum XPathVal {
    #[default]
    Empty,
    String(String),
    Number(f64),
    Boolean(bool),
    NodeSet(NodeSet),
    Sequence(Vec<XPathVal>),
    Map(XPathMap),
    Array(XPathArray),
}

impl XPathVal {
    pub fn value_type(&self) -> ValueType {
        match self {
            XPathVal::Empty => ValueType::Nil,
            XPathVal::String(_) => ValueType::String,
            XPathVal::Number(_) => ValueType::Number,
            XPathVal::Boolean(_) => ValueType::Boolean,
            XPathVal::NodeSet(_) => ValueType::NodeSet,
            XPathVal::Sequence(_) => ValueType::Sequence,
            XPathVal::Map(_) => ValueType::Map,
            XPathVal::Array(_) => ValueType::Array,
        }
    }

    pub fn node_set(entries: Vec<NodeEntry>) -> XPathVal {
        XPathVal::NodeSet(NodeSet::new(entries))
    }

    /// Empty sequence, empty string and empty node-set each keep their
    /// own type, but all count as "no result".
    pub fn is_empty(&self) -> bool {
        match self {
            XPathVal::Empty => true,
            XPathVal::NodeSet(set) => set.is_empty(),
            XPathVal::Sequence(items) => items.iter().all(XPathVal::is_empty),
            _ => false,
        }
    }

    /// Effective boolean value.
    pub fn to_boolean(&self) -> bool {
        match self {
            XPathVal::Empty => false,
            XPathVal::String(text) => !text.is_empty(),
            XPathVal::Number(number) => !number.is_nan() && *number != 0.0,
            XPathVal::Boolean(flag) => *flag,
            XPathVal::NodeSet(set) => !set.is_empty(),
            XPathVal::Sequence(items) => match items.len() {
                0 => false,
                1 => items[0].to_boolean(),
                _ => true,
            },
            XPathVal::Map(map) => !map.is_empty(),
            XPathVal::Array(array) => !array.is_empty(),
        }
    }

    /// Numeric promotion; NaN for anything without a numeric reading.
    pub fn to_number(&self) -> f64 {
        match self {
            XPathVal::Empty => f64::NAN,
            XPathVal::String(text) => parse_double(text),
            XPathVal::Number(number) => *number,
            XPathVal::Boolean(flag) => {
                if *flag {
                    1.0
                } else {
                    0.0
                }
            }
            XPathVal::NodeSet(set) => match set.first() {
                Some(entry) => parse_double(&entry.string_value()),
                None => f64::NAN,
            },
            XPathVal::Sequence(items) => match items.len() {
                1 => items[0].to_number(),
                _ => f64::NAN,
            },
            XPathVal::Map(_) | XPathVal::Array(_) => f64::NAN,
        }
    }

    /// String promotion: node-sets convert through the string-value of
    /// their first node; sequences are space-joined.
    pub fn to_string_value(&self) -> String {
        match self {
            XPathVal::Empty => String::new(),
            XPathVal::String(text) => text.clone(),
            XPathVal::Number(number) => format_double(*number),
            XPathVal::Boolean(flag) => flag.to_string(),
            XPathVal::NodeSet(set) => match set.first() {
                Some(entry) => entry.string_value(),
                None => String::new(),
            },
            XPathVal::Sequence(items) => {
                items.iter().map(XPathVal::to_string_value).join(" ")
            }
            XPathVal::Map(map) => format!("map({})", map.len()),
            XPathVal::Array(array) => {
                array.members.iter().map(XPathVal::to_string_value).join(" ")
            }
        }
    }

    /// Display form used for the query object's result string: node-sets
    /// serialise per node (elements as markup), everything else follows
    /// the string promotion rules.
    pub fn to_output_string(&self) -> String {
        match self {
            XPathVal::NodeSet(set) => set.entries.iter().map(serialize_entry).join(" "),
            XPathVal::Sequence(items) => {
                items.iter().map(XPathVal::to_output_string).join(" ")
            }
            other => other.to_string_value(),
        }
    }

    /// Items of this value, flattening sequences one level: the shape
    /// iteration works over in FLWOR, quantifiers and function arguments.
    pub fn items(&self) -> Vec<XPathVal> {
        match self {
            XPathVal::Empty => Vec::new(),
            XPathVal::Sequence(items) => {
                let mut flattened = Vec::new();
                for item in items {
                    flattened.extend(item.items());
                }
                flattened
            }
            XPathVal::NodeSet(set) => set
                .entries
                .iter()
                .cloned()
                .map(|entry| XPathVal::NodeSet(NodeSet::from_sorted(vec![entry])))
                .collect(),
            other => vec![other.clone()],
        }
    }

    /// Count of items under the sequence reading.
    pub fn item_count(&self) -> usize {
        match self {
            XPathVal::Empty => 0,
            XPathVal::Sequence(items) => items.iter().map(XPathVal::item_count).sum(),
            XPathVal::NodeSet(set) => set.len(),
            _ => 1,
        }
    }

    /// Atomised items: nodes become their (untyped) string values.
    pub fn atomized(&self) -> Vec<XPathVal> {
        match self {
            XPathVal::Empty => Vec::new(),
            XPathVal::Sequence(items) => {
                let mut flattened = Vec::new();
                for item in items {
                    flattened.extend(item.atomized());
                }
                flattened
            }
            XPathVal::NodeSet(set) => set
                .entries
                .iter()
                .map(|entry| XPathVal::String(entry.string_value()))
                .collect(),
            XPathVal::Array(array) => {
                let mut flattened = Vec::new();
                for member in &array.members {
                    flattened.extend(member.atomized());
                }
                flattened
            }
            other => vec![other.clone()],
        }
    }

    /// Concatenates evaluation results in order, producing the leanest
    /// representation: all-node inputs yield a normalised node-set, empties
    /// vanish, a single value passes through.
    pub fn concatenate(values: Vec<XPathVal>) -> XPathVal {
        let mut items = Vec::new();
        for value in values {
            match value {
                XPathVal::Empty => {}
                XPathVal::Sequence(inner) => items.extend(inner),
                other => items.push(other),
            }
        }
        if items.is_empty() {
            return XPathVal::Empty;
        }
        if items.len() == 1 {
            return items.into_iter().next().unwrap();
        }
        if items
            .iter()
            .all(|item| matches!(item, XPathVal::NodeSet(_)))
        {
            let mut entries = Vec::new();
            for item in items {
                if let XPathVal::NodeSet(set) = item {
                    entries.extend(set.entries);
                }
            }
            return XPathVal::NodeSet(NodeSet::new(entries));
        }
        XPathVal::Sequence(items)
    }
}

/// XPath double-to-string: integral doubles print without a fractional
/// part, infinities as `INF`, and negative zero keeps its sign.
pub fn format_double(value: f64) -> String {
    if value.is_nan() {
        return "NaN".into();
    }
    if value.is_infinite() {
        return if value > 0.0 { "INF".into() } else { "-INF".into() };
    }
    value.to_string()
}

/// xs:double lexical parse: `INF`, `-INF` and `NaN` are recognised,
/// anything unparseable is NaN.
pub fn parse_double(text: &str) -> f64 {
    let trimmed = text.trim();
    match trimmed {
        "INF" | "+INF" => f64::INFINITY,
        "-INF" => f64::NEG_INFINITY,
        "NaN" => f64::NAN,
        _ => {
            // reject Rust-specific spellings such as `inf`/`infinity`
            if trimmed.eq_ignore_ascii_case("inf")
                || trimmed.eq_ignore_ascii_case("+inf")
                || trimmed.eq_ignore_ascii_case("-inf")
                || trimmed.eq_ignore_ascii_case("infinity")
                || trimmed.eq_ignore_ascii_case("+infinity")
                || trimmed.eq_ignore_ascii_case("-infinity")
                || trimmed.eq_ignore_ascii_case("nan")
            {
                return f64::NAN;
            }
            trimmed.parse().unwrap_or(f64::NAN)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boolean_promotions() {
        assert!(!XPathVal::Empty.to_boolean());
        assert!(!XPathVal::String(String::new()).to_boolean());
        assert!(XPathVal::String("x".into()).to_boolean());
        assert!(!XPathVal::Number(0.0).to_boolean());
        assert!(!XPathVal::Number(f64::NAN).to_boolean());
        assert!(XPathVal::Number(-2.5).to_boolean());
        assert!(!XPathVal::Map(XPathMap::default()).to_boolean());
    }

    #[test]
    fn number_promotions() {
        assert_eq!(XPathVal::String(" 42 ".into()).to_number(), 42.0);
        assert!(XPathVal::String("x".into()).to_number().is_nan());
        assert_eq!(XPathVal::Boolean(true).to_number(), 1.0);
        assert_eq!(
            XPathVal::String("INF".into()).to_number(),
            f64::INFINITY
        );
        assert_eq!(
            XPathVal::String("-INF".into()).to_number(),
            f64::NEG_INFINITY
        );
        assert!(XPathVal::String("inf".into()).to_number().is_nan());
    }

    #[test]
    fn double_formatting() {
        assert_eq!(format_double(5050.0), "5050");
        assert_eq!(format_double(0.5), "0.5");
        assert_eq!(format_double(f64::NAN), "NaN");
        assert_eq!(format_double(f64::INFINITY), "INF");
        assert_eq!(format_double(-0.0), "-0");
    }

    #[test]
    fn sequence_string_is_space_joined() {
        let sequence = XPathVal::Sequence(vec![
            XPathVal::String("1".into()),
            XPathVal::String("2".into()),
            XPathVal::String("3".into()),
        ]);
        assert_eq!(sequence.to_string_value(), "1 2 3");
    }

    #[test]
    fn concatenate_flattens_and_drops_empties() {
        let combined = XPathVal::concatenate(vec![
            XPathVal::Empty,
            XPathVal::Sequence(vec![XPathVal::Number(1.0), XPathVal::Number(2.0)]),
            XPathVal::Number(3.0),
        ]);
        assert_eq!(combined.item_count(), 3);
        assert_eq!(combined.to_string_value(), "1 2 3");
    }

    #[test]
    fn map_insert_replaces_in_place() {
        let mut map = XPathMap::default();
        map.insert(MapKey::String("a".into()), XPathVal::Number(1.0));
        map.insert(MapKey::String("b".into()), XPathVal::Number(2.0));
        map.insert(MapKey::String("a".into()), XPathVal::Number(3.0));
        assert_eq!(map.len(), 2);
        assert_eq!(
            map.get(&MapKey::String("a".into())).unwrap().to_number(),
            3.0
        );
    }
}
