//! Strict reader for the partial-response vocabulary.
//!
//! Only well-formed documents are accepted: mismatched or unclosed tags,
//! undeclared entities and stray markup all fail, which is what routes
//! HTML-laden responses to the lenient stripper.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum XmlError {
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("unexpected '{found}' at byte {offset}")]
    UnexpectedChar { found: char, offset: usize },
    #[error("expected </{expected}> but found </{found}> at byte {offset}")]
    MismatchedTag {
        expected: String,
        found: String,
        offset: usize,
    },
    #[error("unknown entity '&{name};' at byte {offset}")]
    UnknownEntity { name: String, offset: usize },
    #[error("duplicate attribute '{name}' at byte {offset}")]
    DuplicateAttribute { name: String, offset: usize },
    #[error("content after the root element at byte {0}")]
    TrailingContent(usize),
    #[error("document has no root element")]
    NoRoot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    CData(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|child| match child {
            XmlNode::Element(element) => Some(element),
            _ => None,
        })
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.elements().find(|element| element.name == name)
    }

    /// Concatenated text and CDATA of the direct children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|child| match child {
                XmlNode::Text(text) | XmlNode::CData(text) => Some(text.as_str()),
                XmlNode::Element(_) => None,
            })
            .collect()
    }
}

pub fn parse(input: &str) -> Result<XmlElement, XmlError> {
    let mut reader = Reader {
        src: input,
        pos: 0,
    };
    reader.parse_document()
}

struct Reader<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Reader<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn starts_with(&self, prefix: &str) -> bool {
        self.rest().starts_with(prefix)
    }

    fn unexpected(&self) -> XmlError {
        match self.peek() {
            Some(found) => XmlError::UnexpectedChar {
                found,
                offset: self.pos,
            },
            None => XmlError::UnexpectedEof,
        }
    }

    fn expect(&mut self, token: &str) -> Result<(), XmlError> {
        if self.starts_with(token) {
            self.pos += token.len();
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn skip_whitespace(&mut self) {
        let trimmed = self.rest().trim_start_matches([' ', '\t', '\r', '\n']);
        self.pos = self.src.len() - trimmed.len();
    }

    /// Advances past `terminator`, returning the text before it.
    fn take_until(&mut self, terminator: &str) -> Result<&'a str, XmlError> {
        let rest = self.rest();
        let end = rest.find(terminator).ok_or(XmlError::UnexpectedEof)?;
        self.pos += end + terminator.len();
        Ok(&rest[..end])
    }

    fn parse_document(&mut self) -> Result<XmlElement, XmlError> {
        if self.starts_with("\u{feff}") {
            self.pos += '\u{feff}'.len_utf8();
        }
        self.skip_misc(true)?;
        if self.peek().is_none() {
            return Err(XmlError::NoRoot);
        }
        let root = self.parse_element()?;
        self.skip_misc(false)?;
        if self.pos < self.src.len() {
            return Err(XmlError::TrailingContent(self.pos));
        }
        Ok(root)
    }

    /// Whitespace, comments and processing instructions around the root.
    fn skip_misc(&mut self, allow_doctype: bool) -> Result<(), XmlError> {
        loop {
            self.skip_whitespace();
            if self.starts_with("<?") {
                self.take_until("?>")?;
            } else if self.starts_with("<!--") {
                self.pos += 4;
                self.take_until("-->")?;
            } else if allow_doctype && self.starts_with("<!DOCTYPE") {
                self.skip_doctype()?;
            } else {
                return Ok(());
            }
        }
    }

    fn skip_doctype(&mut self) -> Result<(), XmlError> {
        let mut depth = 0usize;
        for (index, ch) in self.rest().char_indices() {
            match ch {
                '[' => depth += 1,
                ']' => depth = depth.saturating_sub(1),
                '>' if depth == 0 => {
                    self.pos += index + 1;
                    return Ok(());
                }
                _ => {}
            }
        }
        Err(XmlError::UnexpectedEof)
    }

    fn parse_name(&mut self) -> Result<String, XmlError> {
        let rest = self.rest();
        let mut end = 0;
        for (index, ch) in rest.char_indices() {
            let valid = if index == 0 {
                is_name_start(ch)
            } else {
                is_name_char(ch)
            };
            if !valid {
                break;
            }
            end = index + ch.len_utf8();
        }
        if end == 0 {
            return Err(self.unexpected());
        }
        self.pos += end;
        Ok(rest[..end].to_string())
    }

    fn parse_element(&mut self) -> Result<XmlElement, XmlError> {
        let mut stack: Vec<XmlElement> = Vec::new();
        let (root, closed) = self.parse_start_tag()?;
        if closed {
            return Ok(root);
        }
        stack.push(root);

        loop {
            if self.pos >= self.src.len() {
                return Err(XmlError::UnexpectedEof);
            }
            if self.starts_with("</") {
                self.pos += 2;
                let offset = self.pos;
                let name = self.parse_name()?;
                self.skip_whitespace();
                self.expect(">")?;
                let element = stack.pop().ok_or(XmlError::UnexpectedEof)?;
                if element.name != name {
                    return Err(XmlError::MismatchedTag {
                        expected: element.name,
                        found: name,
                        offset,
                    });
                }
                match stack.last_mut() {
                    Some(parent) => parent.children.push(XmlNode::Element(element)),
                    None => return Ok(element),
                }
            } else if self.starts_with("<![CDATA[") {
                self.pos += 9;
                let data = self.take_until("]]>")?.to_string();
                push_child(&mut stack, XmlNode::CData(data));
            } else if self.starts_with("<!--") {
                self.pos += 4;
                self.take_until("-->")?;
            } else if self.starts_with("<?") {
                self.take_until("?>")?;
            } else if self.starts_with("<") {
                let (element, closed) = self.parse_start_tag()?;
                if closed {
                    push_child(&mut stack, XmlNode::Element(element));
                } else {
                    stack.push(element);
                }
            } else {
                let text = self.parse_text()?;
                push_child(&mut stack, XmlNode::Text(text));
            }
        }
    }

    /// Returns the element and whether it was self-closing.
    fn parse_start_tag(&mut self) -> Result<(XmlElement, bool), XmlError> {
        self.expect("<")?;
        let name = self.parse_name()?;
        let mut element = XmlElement {
            name,
            ..XmlElement::default()
        };

        loop {
            let before = self.pos;
            self.skip_whitespace();
            if self.starts_with("/>") {
                self.pos += 2;
                return Ok((element, true));
            }
            if self.starts_with(">") {
                self.pos += 1;
                return Ok((element, false));
            }
            if self.pos == before {
                // attributes must be separated by whitespace
                return Err(self.unexpected());
            }
            let offset = self.pos;
            let key = self.parse_name()?;
            self.skip_whitespace();
            self.expect("=")?;
            self.skip_whitespace();
            let value = self.parse_attribute_value()?;
            if element.attr(&key).is_some() {
                return Err(XmlError::DuplicateAttribute { name: key, offset });
            }
            element.attributes.push((key, value));
        }
    }

    fn parse_attribute_value(&mut self) -> Result<String, XmlError> {
        let quote = match self.peek() {
            Some(quote @ ('"' | '\'')) => quote,
            _ => return Err(self.unexpected()),
        };
        self.pos += 1;
        let start = self.pos;
        let rest = self.rest();
        let end = rest.find(quote).ok_or(XmlError::UnexpectedEof)?;
        let raw = &rest[..end];
        if let Some(index) = raw.find('<') {
            return Err(XmlError::UnexpectedChar {
                found: '<',
                offset: start + index,
            });
        }
        self.pos += end + 1;
        decode_entities(raw, start)
    }

    fn parse_text(&mut self) -> Result<String, XmlError> {
        let start = self.pos;
        let rest = self.rest();
        let end = rest.find('<').unwrap_or(rest.len());
        self.pos += end;
        decode_entities(&rest[..end], start)
    }
}

fn push_child(stack: &mut [XmlElement], node: XmlNode) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
    }
}

fn is_name_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_' || ch == ':' || (!ch.is_ascii() && ch.is_alphabetic())
}

fn is_name_char(ch: char) -> bool {
    is_name_start(ch) || ch.is_ascii_digit() || ch == '-' || ch == '.' || (!ch.is_ascii() && ch.is_alphanumeric())
}

fn decode_entities(raw: &str, base_offset: usize) -> Result<String, XmlError> {
    if !raw.contains('&') {
        return Ok(raw.to_string());
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    let mut consumed = 0;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let offset = base_offset + consumed + amp;
        let after = &rest[amp + 1..];
        let end = after.find(';').ok_or(XmlError::UnexpectedChar { found: '&', offset })?;
        let name = &after[..end];
        let decoded = match name {
            "lt" => '<',
            "gt" => '>',
            "amp" => '&',
            "quot" => '"',
            "apos" => '\'',
            _ => numeric_entity(name).ok_or_else(|| XmlError::UnknownEntity {
                name: name.to_string(),
                offset,
            })?,
        };
        out.push(decoded);
        let step = amp + 1 + end + 1;
        consumed += step;
        rest = &rest[step..];
    }
    out.push_str(rest);
    Ok(out)
}

fn numeric_entity(name: &str) -> Option<char> {
    let digits = name.strip_prefix('#')?;
    let code = match digits.strip_prefix(['x', 'X']) {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<u32>().ok()?,
    };
    char::from_u32(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_response() {
        let root = parse(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<partial-response id="j_id1"><changes><update id="out"><![CDATA[<b>a & b</b>]]></update><delete id="gone"/></changes></partial-response>"#,
        )
        .unwrap();
        assert_eq!(root.name, "partial-response");
        assert_eq!(root.attr("id"), Some("j_id1"));
        let changes = root.child("changes").unwrap();
        let names: Vec<&str> = changes.elements().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["update", "delete"]);
        assert_eq!(changes.child("update").unwrap().text(), "<b>a & b</b>");
    }

    #[test]
    fn decodes_entities() {
        let root = parse(r#"<a title="&quot;x&quot;">&lt;&#65;&#x42;&amp;</a>"#).unwrap();
        assert_eq!(root.attr("title"), Some("\"x\""));
        assert_eq!(root.text(), "<AB&");
    }

    #[test]
    fn rejects_html_entities_and_bare_attributes() {
        assert!(matches!(
            parse("<p>a&nbsp;b</p>"),
            Err(XmlError::UnknownEntity { .. })
        ));
        assert!(parse("<input disabled>").is_err());
    }

    #[test]
    fn rejects_mismatched_and_unclosed_tags() {
        assert!(matches!(
            parse("<a><b></a></b>"),
            Err(XmlError::MismatchedTag { .. })
        ));
        assert_eq!(parse("<a><b>"), Err(XmlError::UnexpectedEof));
        assert!(matches!(
            parse("<a/><b/>"),
            Err(XmlError::TrailingContent(_))
        ));
        assert_eq!(parse("   "), Err(XmlError::NoRoot));
    }

    #[test]
    fn skips_comments_and_doctype() {
        let root = parse("<!DOCTYPE x [ <!ENTITY y 'z'> ]><!-- c --><x><!-- inner -->t</x><!-- after -->").unwrap();
        assert_eq!(root.text(), "t");
    }
}
