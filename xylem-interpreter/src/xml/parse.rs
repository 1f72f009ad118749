//! A compact well-formedness-checking XML reader producing [`Document`]s.
//!
//! This covers the host adapter's `load_document` contract and test
//! fixtures: elements, attributes, text with entity references, CDATA,
//! comments, and processing instructions. DTDs are skipped, not
//! interpreted.

use std::sync::Arc;

use thiserror::Error;

use super::build::{freeze, BuildNode};
use super::document::Document;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (at byte {position})")]
pub struct XmlError {
    pub message: String,
    pub position: usize,
}

impl XmlError {
    fn new(message: impl Into<String>, position: usize) -> Self {
        XmlError {
            message: message.into(),
            position,
        }
    }
}

/// Parses a document; `order_key` fixes its place in cross-document
/// ordering.
pub fn parse_document(
    source: &str,
    base_uri: &str,
    order_key: u64,
) -> Result<Arc<Document>, XmlError> {
    let mut reader = Reader {
        input: source.as_bytes(),
        position: 0,
    };
    let mut roots = Vec::new();
    reader.skip_misc(&mut roots)?;
    if !roots.iter().any(is_element) {
        return Err(XmlError::new("document has no root element", 0));
    }
    if reader.position < reader.input.len() {
        return Err(XmlError::new(
            "content after the document element",
            reader.position,
        ));
    }
    Ok(freeze(roots, base_uri, order_key))
}

fn is_element(node: &BuildNode) -> bool {
    matches!(node.content, super::document::NodeContent::Element { .. })
}

struct Reader<'a> {
    input: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    fn error(&self, message: impl Into<String>) -> XmlError {
        XmlError::new(message, self.position)
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.position).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.position + offset).copied()
    }

    fn starts_with(&self, text: &str) -> bool {
        self.input[self.position..].starts_with(text.as_bytes())
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.position += 1;
        }
    }

    // prolog, comments, PIs, and the document element(s)
    fn skip_misc(&mut self, roots: &mut Vec<BuildNode>) -> Result<(), XmlError> {
        loop {
            self.skip_whitespace();
            if self.position >= self.input.len() {
                return Ok(());
            }
            if self.starts_with("<?xml") {
                self.skip_until("?>")?;
                continue;
            }
            if self.starts_with("<!DOCTYPE") {
                self.skip_doctype()?;
                continue;
            }
            if self.starts_with("<!--") {
                let comment = self.read_comment()?;
                roots.push(comment);
                continue;
            }
            if self.starts_with("<?") {
                let pi = self.read_processing_instruction()?;
                roots.push(pi);
                continue;
            }
            if self.peek() == Some(b'<') {
                let element = self.read_element()?;
                roots.push(element);
                continue;
            }
            return Err(self.error("unexpected content outside the document element"));
        }
    }

    fn skip_until(&mut self, terminator: &str) -> Result<(), XmlError> {
        while self.position < self.input.len() {
            if self.starts_with(terminator) {
                self.position += terminator.len();
                return Ok(());
            }
            self.position += 1;
        }
        Err(self.error(format!("missing '{terminator}'")))
    }

    fn skip_doctype(&mut self) -> Result<(), XmlError> {
        // skip to the matching '>', tolerating an internal subset
        let mut depth = 0usize;
        while let Some(byte) = self.peek() {
            self.position += 1;
            match byte {
                b'[' => depth += 1,
                b']' => depth = depth.saturating_sub(1),
                b'>' if depth == 0 => return Ok(()),
                _ => {}
            }
        }
        Err(self.error("unterminated DOCTYPE"))
    }

    fn read_name(&mut self) -> Result<String, XmlError> {
        let start = self.position;
        while let Some(byte) = self.peek() {
            let ok = byte.is_ascii_alphanumeric()
                || matches!(byte, b'_' | b'-' | b'.' | b':')
                || byte >= 0x80;
            if !ok {
                break;
            }
            self.position += 1;
        }
        if self.position == start {
            return Err(self.error("expected a name"));
        }
        Ok(String::from_utf8_lossy(&self.input[start..self.position]).into_owned())
    }

    fn read_element(&mut self) -> Result<BuildNode, XmlError> {
        self.position += 1; // <
        let name = self.read_name()?;
        let mut element = BuildNode::element(name.clone());

        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b'/') if self.peek_at(1) == Some(b'>') => {
                    self.position += 2;
                    return Ok(element);
                }
                Some(b'>') => {
                    self.position += 1;
                    break;
                }
                Some(_) => {
                    let attribute_name = self.read_name()?;
                    self.skip_whitespace();
                    if self.peek() != Some(b'=') {
                        return Err(self.error("expected '=' after attribute name"));
                    }
                    self.position += 1;
                    self.skip_whitespace();
                    let value = self.read_attribute_value()?;
                    if element
                        .attributes
                        .iter()
                        .any(|existing| existing.name == attribute_name)
                    {
                        return Err(self.error(format!(
                            "duplicate attribute '{attribute_name}'"
                        )));
                    }
                    element.push_attribute(attribute_name, value);
                }
                None => return Err(self.error("unterminated start tag")),
            }
        }

        // content
        loop {
            if self.position >= self.input.len() {
                return Err(self.error(format!("missing closing tag for '{name}'")));
            }
            if self.starts_with("</") {
                self.position += 2;
                let close = self.read_name()?;
                if close != name {
                    return Err(self.error(format!(
                        "mismatched closing tag: expected '{name}', found '{close}'"
                    )));
                }
                self.skip_whitespace();
                if self.peek() != Some(b'>') {
                    return Err(self.error("expected '>' in closing tag"));
                }
                self.position += 1;
                return Ok(element);
            }
            if self.starts_with("<!--") {
                element.children.push(self.read_comment()?);
                continue;
            }
            if self.starts_with("<![CDATA[") {
                let text = self.read_cdata()?;
                element.children.push(BuildNode::text(text));
                continue;
            }
            if self.starts_with("<?") {
                element.children.push(self.read_processing_instruction()?);
                continue;
            }
            if self.peek() == Some(b'<') {
                element.children.push(self.read_element()?);
                continue;
            }
            let text = self.read_text()?;
            if !text.is_empty() {
                element.children.push(BuildNode::text(text));
            }
        }
    }

    fn read_attribute_value(&mut self) -> Result<String, XmlError> {
        let quote = match self.peek() {
            Some(byte @ (b'"' | b'\'')) => byte,
            _ => return Err(self.error("expected a quoted attribute value")),
        };
        self.position += 1;
        let start = self.position;
        while let Some(byte) = self.peek() {
            if byte == quote {
                let end = self.position;
                self.position += 1;
                return decode_entities(&self.input[start..end], start);
            }
            self.position += 1;
        }
        Err(self.error("unterminated attribute value"))
    }

    fn read_text(&mut self) -> Result<String, XmlError> {
        let start = self.position;
        while let Some(byte) = self.peek() {
            if byte == b'<' {
                break;
            }
            self.position += 1;
        }
        decode_entities(&self.input[start..self.position], start)
    }

    fn read_comment(&mut self) -> Result<BuildNode, XmlError> {
        self.position += 4; // <!--
        let start = self.position;
        while self.position < self.input.len() {
            if self.starts_with("-->") {
                let text =
                    String::from_utf8_lossy(&self.input[start..self.position]).into_owned();
                self.position += 3;
                return Ok(BuildNode::comment(text));
            }
            self.position += 1;
        }
        Err(self.error("unterminated comment"))
    }

    fn read_cdata(&mut self) -> Result<String, XmlError> {
        self.position += 9; // <![CDATA[
        let start = self.position;
        while self.position < self.input.len() {
            if self.starts_with("]]>") {
                let text =
                    String::from_utf8_lossy(&self.input[start..self.position]).into_owned();
                self.position += 3;
                return Ok(text);
            }
            self.position += 1;
        }
        Err(self.error("unterminated CDATA section"))
    }

    fn read_processing_instruction(&mut self) -> Result<BuildNode, XmlError> {
        self.position += 2; // <?
        let target = self.read_name()?;
        self.skip_whitespace();
        let start = self.position;
        while self.position < self.input.len() {
            if self.starts_with("?>") {
                let data =
                    String::from_utf8_lossy(&self.input[start..self.position]).into_owned();
                self.position += 2;
                return Ok(BuildNode::processing_instruction(target, data));
            }
            self.position += 1;
        }
        Err(self.error("unterminated processing instruction"))
    }
}

fn decode_entities(raw: &[u8], offset: usize) -> Result<String, XmlError> {
    let text = String::from_utf8_lossy(raw);
    if !text.contains('&') {
        return Ok(text.into_owned());
    }
    let mut decoded = String::with_capacity(text.len());
    let mut rest = text.as_ref();
    while let Some(index) = rest.find('&') {
        decoded.push_str(&rest[..index]);
        rest = &rest[index..];
        let Some(end) = rest.find(';') else {
            return Err(XmlError::new("unterminated entity reference", offset));
        };
        let entity = &rest[1..end];
        match entity {
            "lt" => decoded.push('<'),
            "gt" => decoded.push('>'),
            "amp" => decoded.push('&'),
            "quot" => decoded.push('"'),
            "apos" => decoded.push('\''),
            _ => {
                let value = entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| {
                        entity
                            .strip_prefix('#')
                            .and_then(|decimal| decimal.parse::<u32>().ok())
                    });
                match value.and_then(char::from_u32) {
                    Some(ch) => decoded.push(ch),
                    None => {
                        return Err(XmlError::new(
                            format!("unknown entity '&{entity};'"),
                            offset,
                        ))
                    }
                }
            }
        }
        rest = &rest[end + 1..];
    }
    decoded.push_str(rest);
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_document() {
        let doc = parse_document(
            r#"<root><book price="5"/><book price="12"/></root>"#,
            "",
            0,
        )
        .unwrap();
        assert_eq!(doc.roots.len(), 1);
        assert_eq!(doc.node_name(0), "root");
        assert_eq!(doc.node(0).children.len(), 2);
        assert_eq!(doc.attribute_value(1, "price"), Some("5"));
    }

    #[test]
    fn parse_text_and_entities() {
        let doc = parse_document("<a>x &lt;&amp;&gt; y &#65;</a>", "", 0).unwrap();
        assert_eq!(doc.string_value(0), "x <&> y A");
    }

    #[test]
    fn parse_comments_and_pis() {
        let doc =
            parse_document("<a><!-- note --><?target data?><b/></a>", "", 0).unwrap();
        assert_eq!(doc.node(0).children.len(), 3);
    }

    #[test]
    fn parse_cdata() {
        let doc = parse_document("<a><![CDATA[1 < 2]]></a>", "", 0).unwrap();
        assert_eq!(doc.string_value(0), "1 < 2");
    }

    #[test]
    fn mismatched_tag_is_an_error() {
        let error = parse_document("<a><b></a></b>", "", 0).unwrap_err();
        assert!(error.message.contains("mismatched"));
    }

    #[test]
    fn duplicate_attribute_is_an_error() {
        let error = parse_document(r#"<a k="1" k="2"/>"#, "", 0).unwrap_err();
        assert!(error.message.contains("duplicate attribute"));
    }

    #[test]
    fn prolog_and_doctype_are_skipped() {
        let doc = parse_document(
            "<?xml version=\"1.0\"?><!DOCTYPE root><root/>",
            "",
            0,
        )
        .unwrap();
        assert_eq!(doc.node_name(doc.roots[0]), "root");
    }
}
