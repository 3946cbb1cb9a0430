use std::collections::HashMap;

use kuchiki::traits::*;
use kuchiki::NodeRef;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum DomError {
    #[error("no element with id '{0}'")]
    UnknownId(String),
    #[error("node has no parent")]
    Detached,
    #[error("document has no <{0}> element")]
    MissingElement(&'static str),
}

/// A file selection attached to an `<input type="file">`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBlob {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl FileBlob {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }
}

/// The live page. All partial updates land here.
pub struct Document {
    root: NodeRef,
    base_url: Option<Url>,
    files: HashMap<String, Vec<FileBlob>>,
}

impl Document {
    pub fn parse(html: &str) -> Self {
        Self {
            root: kuchiki::parse_html().one(html),
            base_url: None,
            files: HashMap::new(),
        }
    }

    pub fn parse_with_base(html: &str, base_url: Url) -> Self {
        let mut document = Self::parse(html);
        document.base_url = Some(base_url);
        document
    }

    pub fn root(&self) -> &NodeRef {
        &self.root
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    pub fn element_by_id(&self, id: &str) -> Option<NodeRef> {
        self.root
            .inclusive_descendants()
            .find(|node| attr(node, "id").as_deref() == Some(id))
    }

    pub fn require(&self, id: &str) -> Result<NodeRef, DomError> {
        self.element_by_id(id)
            .ok_or_else(|| DomError::UnknownId(id.to_string()))
    }

    pub fn forms(&self) -> Vec<NodeRef> {
        self.root
            .inclusive_descendants()
            .filter(|node| tag_name(node).as_deref() == Some("form"))
            .collect()
    }

    pub fn body(&self) -> Result<NodeRef, DomError> {
        self.first_tag("body")
    }

    pub fn head(&self) -> Result<NodeRef, DomError> {
        self.first_tag("head")
    }

    fn first_tag(&self, name: &'static str) -> Result<NodeRef, DomError> {
        self.root
            .inclusive_descendants()
            .find(|node| tag_name(node).as_deref() == Some(name))
            .ok_or(DomError::MissingElement(name))
    }

    pub fn to_html(&self) -> String {
        self.root.to_string()
    }

    pub fn inner_html(&self, id: &str) -> Option<String> {
        self.element_by_id(id).map(|node| inner_html(&node))
    }

    pub fn outer_html(&self, id: &str) -> Option<String> {
        self.element_by_id(id).map(|node| node.to_string())
    }

    pub fn text_content(&self, id: &str) -> Option<String> {
        self.element_by_id(id).map(|node| node.text_contents())
    }

    pub fn attribute(&self, id: &str, name: &str) -> Option<String> {
        self.element_by_id(id).and_then(|node| attr(&node, name))
    }

    pub fn attach_file(&mut self, input_id: &str, blob: FileBlob) {
        self.files.entry(input_id.to_string()).or_default().push(blob);
    }

    pub fn clear_files(&mut self, input_id: &str) {
        self.files.remove(input_id);
    }

    pub fn files_for(&self, node: &NodeRef) -> &[FileBlob] {
        attr(node, "id")
            .and_then(|id| self.files.get(&id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Replaces the whole tree, keeping attached files and the base url.
    pub fn replace_all(&mut self, html: &str) {
        let replacement = kuchiki::parse_html().one(html);
        for child in self.root.children().collect::<Vec<_>>() {
            child.detach();
        }
        for child in replacement.children().collect::<Vec<_>>() {
            self.root.append(child);
        }
    }

    pub fn replace_inner(&mut self, node: &NodeRef, markup: &str) -> Vec<NodeRef> {
        let fragment = parse_fragment_in(node, markup);
        for child in node.children().collect::<Vec<_>>() {
            child.detach();
        }
        for child in &fragment {
            node.append(child.clone());
        }
        fragment
    }

    pub fn replace_outer(&mut self, node: &NodeRef, markup: &str) -> Result<Vec<NodeRef>, DomError> {
        let parent = node.parent().ok_or(DomError::Detached)?;
        let fragment = parse_fragment_in(&parent, markup);
        for child in &fragment {
            node.insert_before(child.clone());
        }
        node.detach();
        Ok(fragment)
    }

    pub fn insert_before(&mut self, reference: &NodeRef, markup: &str) -> Result<Vec<NodeRef>, DomError> {
        let parent = reference.parent().ok_or(DomError::Detached)?;
        let fragment = parse_fragment_in(&parent, markup);
        for child in &fragment {
            reference.insert_before(child.clone());
        }
        Ok(fragment)
    }

    pub fn insert_after(&mut self, reference: &NodeRef, markup: &str) -> Result<Vec<NodeRef>, DomError> {
        let parent = reference.parent().ok_or(DomError::Detached)?;
        let fragment = parse_fragment_in(&parent, markup);
        // insert_after on the last inserted node keeps the fragment order
        let mut anchor = reference.clone();
        for child in &fragment {
            anchor.insert_after(child.clone());
            anchor = child.clone();
        }
        Ok(fragment)
    }

    pub fn remove(&mut self, node: &NodeRef) {
        node.detach();
    }

    pub fn set_attribute(&mut self, node: &NodeRef, name: &str, value: &str) {
        if let Some(element) = node.as_element() {
            element
                .attributes
                .borrow_mut()
                .insert(name, value.to_string());
        }
    }
}

/// Parses an HTML fragment in body context and returns its detached top-level nodes.
pub fn parse_fragment(markup: &str) -> Vec<NodeRef> {
    let wrapper = kuchiki::parse_html().one(format!(
        "<!DOCTYPE html><html><head></head><body>{markup}</body></html>"
    ));
    match wrapper
        .inclusive_descendants()
        .find(|node| tag_name(node).as_deref() == Some("body"))
    {
        Some(body) => detach_children(&body),
        None => Vec::new(),
    }
}

/// Parses `markup` as the children of `context`, so rows, cells and options
/// keep their tags. Non-element contexts fall back to body context.
pub fn parse_fragment_in(context: &NodeRef, markup: &str) -> Vec<NodeRef> {
    let Some(element) = context.as_element() else {
        return parse_fragment(markup);
    };
    let parsed = kuchiki::parse_fragment(element.name.clone(), Vec::new()).one(markup);
    // the fragment parser hangs everything off a synthetic <html> root
    match parsed.first_child().filter(is_element) {
        Some(root) => detach_children(&root),
        None => Vec::new(),
    }
}

fn detach_children(parent: &NodeRef) -> Vec<NodeRef> {
    let nodes: Vec<NodeRef> = parent.children().collect();
    for node in &nodes {
        node.detach();
    }
    nodes
}

pub fn inner_html(node: &NodeRef) -> String {
    node.children().map(|child| child.to_string()).collect()
}

pub fn tag_name(node: &NodeRef) -> Option<String> {
    node.as_element()
        .map(|element| element.name.local.to_ascii_lowercase().to_string())
}

pub fn attr(node: &NodeRef, name: &str) -> Option<String> {
    node.as_element()
        .and_then(|element| element.attributes.borrow().get(name).map(str::to_string))
}

pub fn has_attr(node: &NodeRef, name: &str) -> bool {
    node.as_element()
        .map(|element| element.attributes.borrow().contains(name))
        .unwrap_or(false)
}

pub fn is_element(node: &NodeRef) -> bool {
    node.as_element().is_some()
}

/// Text nodes that carry only whitespace.
pub fn is_blank_text(node: &NodeRef) -> bool {
    node.as_text()
        .map(|text| text.borrow().trim().is_empty())
        .unwrap_or(false)
}
