//! Sequence types (`xs:integer+`, `element(book)?`, `empty-sequence()`)
//! in their lexical form, parsed on demand and matched against runtime
//! values.

use crate::error::{Error, ErrorCode, Result};
use crate::schema::Xs;
use crate::value::XPathVal;
use crate::xml::NodeContent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occurrence {
    ExactlyOne,
    ZeroOrOne,
    ZeroOrMore,
    OneOrMore,
}

impl Occurrence {
    pub fn allows_empty(&self) -> bool {
        matches!(self, Occurrence::ZeroOrOne | Occurrence::ZeroOrMore)
    }

    pub fn allows_many(&self) -> bool {
        matches!(self, Occurrence::ZeroOrMore | Occurrence::OneOrMore)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemTest {
    EmptySequence,
    Item,
    Node,
    Text,
    Comment,
    ProcessingInstruction(Option<String>),
    Element(Option<String>),
    Attribute(Option<String>),
    DocumentNode,
    Map,
    Array,
    Atomic(Xs),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceTypeInfo {
    pub occurrence: Occurrence,
    pub item: ItemTest,
}

impl SequenceTypeInfo {
    /// Parses the lexical form collected by the parser.
    pub fn parse(text: &str) -> Result<SequenceTypeInfo> {
        let trimmed = text.trim();
        let (body, occurrence) = match trimmed.chars().last() {
            Some('?') => (&trimmed[..trimmed.len() - 1], Occurrence::ZeroOrOne),
            Some('*') => (&trimmed[..trimmed.len() - 1], Occurrence::ZeroOrMore),
            Some('+') => (&trimmed[..trimmed.len() - 1], Occurrence::OneOrMore),
            _ => (trimmed, Occurrence::ExactlyOne),
        };
        let body = body.trim();

        let item = if let Some(rest) = body.strip_suffix(')') {
            let Some((name, argument)) = rest.split_once('(') else {
                return Err(unknown_type(body));
            };
            let argument = argument.trim();
            let name_argument = if argument.is_empty() || argument == "*" {
                None
            } else {
                Some(argument.split(',').next().unwrap_or(argument).trim().to_string())
            };
            match name.trim() {
                "empty-sequence" => ItemTest::EmptySequence,
                "item" => ItemTest::Item,
                "node" => ItemTest::Node,
                "text" => ItemTest::Text,
                "comment" => ItemTest::Comment,
                "processing-instruction" => {
                    ItemTest::ProcessingInstruction(name_argument.map(|name| {
                        name.trim_matches(|c| c == '"' || c == '\'').to_string()
                    }))
                }
                "element" | "schema-element" => ItemTest::Element(name_argument),
                "attribute" | "schema-attribute" => ItemTest::Attribute(name_argument),
                "document-node" => ItemTest::DocumentNode,
                "map" => ItemTest::Map,
                "array" => ItemTest::Array,
                other => return Err(unknown_type(other)),
            }
        } else {
            match Xs::by_name(body) {
                Some(xs) => ItemTest::Atomic(xs),
                None => return Err(unknown_type(body)),
            }
        };

        Ok(SequenceTypeInfo { occurrence, item })
    }

    /// Whether `value` is an instance of this sequence type.
    pub fn matches(&self, value: &XPathVal) -> bool {
        let items = value.items();
        if items.is_empty() {
            return matches!(self.item, ItemTest::EmptySequence) || self.occurrence.allows_empty();
        }
        if matches!(self.item, ItemTest::EmptySequence) {
            return false;
        }
        if items.len() > 1 && !self.occurrence.allows_many() {
            return false;
        }
        items.iter().all(|item| self.item_matches(item))
    }

    fn item_matches(&self, item: &XPathVal) -> bool {
        match &self.item {
            ItemTest::EmptySequence => false,
            ItemTest::Item => true,
            ItemTest::Map => matches!(item, XPathVal::Map(_)),
            ItemTest::Array => matches!(item, XPathVal::Array(_)),
            ItemTest::Atomic(xs) => xs.matches_value(item),
            node_test => {
                let XPathVal::NodeSet(set) = item else {
                    return false;
                };
                let Some(entry) = set.first() else {
                    return false;
                };
                match node_test {
                    ItemTest::Node => true,
                    ItemTest::Attribute(name) => {
                        entry.is_attribute()
                            && name
                                .as_ref()
                                .map(|wanted| entry.local_name() == *wanted)
                                .unwrap_or(true)
                    }
                    ItemTest::Element(name) => {
                        !entry.is_attribute()
                            && entry.doc.node(entry.node).is_element()
                            && name
                                .as_ref()
                                .map(|wanted| entry.local_name() == *wanted)
                                .unwrap_or(true)
                    }
                    ItemTest::Text => matches!(
                        entry.doc.node(entry.node).content,
                        NodeContent::Text(_)
                    ) && !entry.is_attribute(),
                    ItemTest::Comment => matches!(
                        entry.doc.node(entry.node).content,
                        NodeContent::Comment(_)
                    ) && !entry.is_attribute(),
                    ItemTest::ProcessingInstruction(target) => {
                        matches!(
                            entry.doc.node(entry.node).content,
                            NodeContent::ProcessingInstruction { .. }
                        ) && target
                            .as_ref()
                            .map(|wanted| entry.name() == *wanted)
                            .unwrap_or(true)
                    }
                    ItemTest::DocumentNode => {
                        !entry.is_attribute() && entry.doc.node(entry.node).parent.is_none()
                    }
                    _ => false,
                }
            }
        }
    }
}

fn unknown_type(name: &str) -> Error {
    Error::with_message(
        ErrorCode::XPST0051,
        format!("unknown type '{name}' in sequence type"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_occurrence_indicators() {
        let info = SequenceTypeInfo::parse("xs:integer+").unwrap();
        assert_eq!(info.occurrence, Occurrence::OneOrMore);
        assert_eq!(info.item, ItemTest::Atomic(Xs::Integer));

        let info = SequenceTypeInfo::parse("item()*").unwrap();
        assert_eq!(info.occurrence, Occurrence::ZeroOrMore);
        assert_eq!(info.item, ItemTest::Item);
    }

    #[test]
    fn unknown_type_is_an_error() {
        let error = SequenceTypeInfo::parse("xs:nonsense").unwrap_err();
        assert_eq!(error.code, ErrorCode::XPST0051);
    }

    #[test]
    fn empty_sequence_matching() {
        let info = SequenceTypeInfo::parse("empty-sequence()").unwrap();
        assert!(info.matches(&XPathVal::Empty));
        assert!(!info.matches(&XPathVal::Number(1.0)));
    }

    #[test]
    fn cardinality_checks() {
        let one = SequenceTypeInfo::parse("xs:integer").unwrap();
        assert!(one.matches(&XPathVal::Number(1.0)));
        assert!(!one.matches(&XPathVal::Empty));
        assert!(!one.matches(&XPathVal::Sequence(vec![
            XPathVal::Number(1.0),
            XPathVal::Number(2.0)
        ])));

        let many = SequenceTypeInfo::parse("xs:integer+").unwrap();
        assert!(many.matches(&XPathVal::Sequence(vec![
            XPathVal::Number(1.0),
            XPathVal::Number(2.0)
        ])));
    }

    #[test]
    fn typeswitch_style_dispatch() {
        let string_type = SequenceTypeInfo::parse("xs:string").unwrap();
        let integer_type = SequenceTypeInfo::parse("xs:integer").unwrap();
        let value = XPathVal::Number(42.0);
        assert!(!string_type.matches(&value));
        assert!(integer_type.matches(&value));
    }
}
