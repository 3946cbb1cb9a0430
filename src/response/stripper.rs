//! Lenient scanner used only after the strict XML reader gave up.
//!
//! It does not build a tree. It walks the text and knows where tags,
//! comments, CDATA sections and quoted attribute values begin and end, so a
//! marker like `</body>` inside a comment or a CDATA block is never taken
//! for the real one.

const PARTIAL_RESPONSE: &str = "partial-response";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagKind {
    Open,
    Close,
    SelfClosing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Tag<'a> {
    name: &'a str,
    kind: TagKind,
    start: usize,
    end: usize,
}

/// Iterates the real tags of `text`, skipping comments, CDATA and declarations.
struct TagScanner<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> TagScanner<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }
}

impl<'a> Iterator for TagScanner<'a> {
    type Item = Tag<'a>;

    fn next(&mut self) -> Option<Tag<'a>> {
        loop {
            let rest = &self.text[self.pos..];
            let lt = rest.find('<')?;
            let start = self.pos + lt;
            let tail = &self.text[start..];

            if tail.starts_with("<!--") {
                self.pos = skip_past(self.text, start + 4, "-->")?;
                continue;
            }
            if tail.starts_with("<![CDATA[") {
                self.pos = skip_past(self.text, start + 9, "]]>")?;
                continue;
            }
            if tail.starts_with("<!") || tail.starts_with("<?") {
                self.pos = skip_past(self.text, start + 2, ">")?;
                continue;
            }

            let (kind, name_start) = if tail.starts_with("</") {
                (TagKind::Close, start + 2)
            } else {
                (TagKind::Open, start + 1)
            };
            let name_len = self.text[name_start..]
                .find(|ch: char| !(ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | ':' | '.')))
                .unwrap_or(self.text.len() - name_start);
            if name_len == 0 {
                // a lone '<' in text
                self.pos = start + 1;
                continue;
            }
            let name = &self.text[name_start..name_start + name_len];
            let end = tag_end(self.text, name_start + name_len)?;
            let kind = if kind == TagKind::Open && self.text[..end].ends_with("/>") {
                TagKind::SelfClosing
            } else {
                kind
            };
            self.pos = end;
            return Some(Tag {
                name,
                kind,
                start,
                end,
            });
        }
    }
}

fn skip_past(text: &str, from: usize, terminator: &str) -> Option<usize> {
    text[from..]
        .find(terminator)
        .map(|index| from + index + terminator.len())
}

/// Finds the `>` closing a tag, honouring quoted attribute values.
fn tag_end(text: &str, from: usize) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (index, ch) in text[from..].char_indices() {
        match (quote, ch) {
            (Some(open), ch) if ch == open => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '>') => return Some(from + index + 1),
            _ => {}
        }
    }
    None
}

fn name_is(tag: &Tag<'_>, name: &str) -> bool {
    tag.name.eq_ignore_ascii_case(name)
}

/// Full span of the first `<name>` element, tags included, matched by depth.
fn element_span<'a>(text: &'a str, name: &str) -> Option<(Tag<'a>, Tag<'a>)> {
    let mut open: Option<Tag<'a>> = None;
    let mut depth = 0usize;
    for tag in TagScanner::new(text).filter(|tag| name_is(tag, name)) {
        match (tag.kind, open) {
            (TagKind::SelfClosing, None) => return Some((tag, tag)),
            (TagKind::Open, None) => {
                open = Some(tag);
                depth = 1;
            }
            (TagKind::Open, Some(_)) => depth += 1,
            (TagKind::Close, Some(start)) => {
                depth -= 1;
                if depth == 0 {
                    return Some((start, tag));
                }
            }
            _ => {}
        }
    }
    None
}

/// Salvages the `<partial-response>` element out of a wrapped or noisy payload.
pub fn salvage_partial_response(text: &str) -> Option<&str> {
    let (open, close) = element_span(text, PARTIAL_RESPONSE)?;
    Some(&text[open.start..close.end])
}

fn inner_of<'a>(html: &'a str, name: &str) -> Option<&'a str> {
    let (open, close) = element_span(html, name)?;
    if open == close {
        return Some("");
    }
    Some(&html[open.end..close.start])
}

/// Inner markup of `<body>`; an unterminated body runs to the end of the text.
pub fn extract_body(html: &str) -> Option<&str> {
    if let Some(inner) = inner_of(html, "body") {
        return Some(inner);
    }
    let open = TagScanner::new(html).find(|tag| name_is(tag, "body") && tag.kind == TagKind::Open)?;
    let tail = &html[open.end..];
    let close_html = TagScanner::new(tail)
        .find(|tag| name_is(tag, "html") && tag.kind == TagKind::Close)
        .map(|tag| tag.start)
        .unwrap_or(tail.len());
    Some(&tail[..close_html])
}

pub fn extract_head(html: &str) -> Option<&str> {
    inner_of(html, "head")
}
