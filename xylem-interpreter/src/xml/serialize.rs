//! XML serialisation of nodes, used for constructed results and the
//! string form of node-set results.

use super::document::{Document, NodeContent, NodeEntry, NodeId};

pub fn serialize_node(doc: &Document, id: NodeId) -> String {
    let mut output = String::new();
    write_node(doc, id, &mut output);
    output
}

/// Serialises a node-set entry: elements as markup, attributes and text
/// nodes by value.
pub fn serialize_entry(entry: &NodeEntry) -> String {
    if let Some(attribute) = entry.attribute_record() {
        return attribute.value.clone();
    }
    match &entry.doc.node(entry.node).content {
        NodeContent::Element { .. } => serialize_node(&entry.doc, entry.node),
        NodeContent::Text(text) => text.clone(),
        NodeContent::Comment(text) => format!("<!--{text}-->"),
        NodeContent::ProcessingInstruction { target, data } => {
            if data.is_empty() {
                format!("<?{target}?>")
            } else {
                format!("<?{target} {data}?>")
            }
        }
        NodeContent::Namespace { uri, .. } => uri.clone(),
    }
}

fn write_node(doc: &Document, id: NodeId, output: &mut String) {
    match &doc.node(id).content {
        NodeContent::Element { name } => {
            output.push('<');
            output.push_str(name);
            for attribute in &doc.node(id).attributes {
                output.push(' ');
                output.push_str(&attribute.name);
                output.push_str("=\"");
                escape_attribute(&attribute.value, output);
                output.push('"');
            }
            if doc.node(id).children.is_empty() {
                output.push_str("/>");
                return;
            }
            output.push('>');
            for &child in &doc.node(id).children {
                write_node(doc, child, output);
            }
            output.push_str("</");
            output.push_str(name);
            output.push('>');
        }
        NodeContent::Text(text) => escape_text(text, output),
        NodeContent::Comment(text) => {
            output.push_str("<!--");
            output.push_str(text);
            output.push_str("-->");
        }
        NodeContent::ProcessingInstruction { target, data } => {
            output.push_str("<?");
            output.push_str(target);
            if !data.is_empty() {
                output.push(' ');
                output.push_str(data);
            }
            output.push_str("?>");
        }
        NodeContent::Namespace { .. } => {}
    }
}

fn escape_text(text: &str, output: &mut String) {
    for ch in text.chars() {
        match ch {
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            '&' => output.push_str("&amp;"),
            _ => output.push(ch),
        }
    }
}

fn escape_attribute(text: &str, output: &mut String) {
    for ch in text.chars() {
        match ch {
            '<' => output.push_str("&lt;"),
            '&' => output.push_str("&amp;"),
            '"' => output.push_str("&quot;"),
            _ => output.push(ch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::build::{freeze, BuildNode};

    #[test]
    fn serialize_element_with_attributes() {
        let mut element = BuildNode::element("greet");
        element.push_attribute("who", "Ada");
        element.children.push(BuildNode::text("Hello"));
        let doc = freeze(vec![element], "", 0);
        assert_eq!(
            serialize_node(&doc, 0),
            r#"<greet who="Ada">Hello</greet>"#
        );
    }

    #[test]
    fn empty_element_self_closes() {
        let doc = freeze(vec![BuildNode::element("br")], "", 0);
        assert_eq!(serialize_node(&doc, 0), "<br/>");
    }

    #[test]
    fn text_is_escaped() {
        let mut element = BuildNode::element("a");
        element.children.push(BuildNode::text("1 < 2 & 3"));
        let doc = freeze(vec![element], "", 0);
        assert_eq!(serialize_node(&doc, 0), "<a>1 &lt; 2 &amp; 3</a>");
    }
}
