mod params;
mod serializer;

use kuchiki::NodeRef;
use serde::Serialize;
use thiserror::Error;

use crate::dom::{attr, tag_name, Document, FileBlob};

pub use params::{resolve_ids, CompletionCallback, IdList, RequestOptions, RequestParams};
pub use serializer::{has_file_input, serialize, SerializeOptions};

pub const VIEW_STATE: &str = "javax.faces.ViewState";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormError {
    #[error("element '{0}' not found")]
    ElementNotFound(String),
    #[error("no parent form could be resolved for '{0}'")]
    MissingParentForm(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FormValue {
    Text { value: String },
    File {
        file_name: String,
        content_type: String,
        #[serde(skip)]
        bytes: Vec<u8>,
    },
}

impl FormValue {
    pub fn text(value: impl Into<String>) -> Self {
        FormValue::Text {
            value: value.into(),
        }
    }

    pub fn file(blob: &FileBlob) -> Self {
        FormValue::File {
            file_name: blob.file_name.clone(),
            content_type: blob.content_type.clone(),
            bytes: blob.bytes.clone(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FormValue::Text { value } => Some(value.as_str()),
            FormValue::File { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormEntry {
    pub name: String,
    pub value: FormValue,
}

/// Ordered name/value pairs of one submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubmitPayload {
    entries: Vec<FormEntry>,
}

impl SubmitPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_text(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push(FormEntry {
            name: name.into(),
            value: FormValue::text(value),
        });
    }

    pub fn push_file(&mut self, name: impl Into<String>, blob: &FileBlob) {
        self.entries.push(FormEntry {
            name: name.into(),
            value: FormValue::file(blob),
        });
    }

    pub fn entries(&self) -> &[FormEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_file(&self) -> bool {
        self.entries
            .iter()
            .any(|entry| matches!(entry.value, FormValue::File { .. }))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .and_then(|entry| entry.value.as_text())
    }

    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|entry| entry.name == name)
            .filter_map(|entry| entry.value.as_text())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|entry| entry.name == name)
    }

    /// Text pairs only; file entries have no urlencoded form.
    pub fn text_pairs(&self) -> Vec<(&str, &str)> {
        self.entries
            .iter()
            .filter_map(|entry| entry.value.as_text().map(|v| (entry.name.as_str(), v)))
            .collect()
    }

    pub fn to_urlencoded(&self) -> Result<String, serde_urlencoded::ser::Error> {
        serde_urlencoded::to_string(self.text_pairs())
    }
}

/// Finds the form a triggering element submits.
///
/// The nearest enclosing `<form>` wins. An element outside any form falls
/// back to the page's single form; with several forms the choice is
/// ambiguous and fails.
pub fn resolve_form(document: &Document, element_id: &str) -> Result<NodeRef, FormError> {
    let element = document
        .element_by_id(element_id)
        .ok_or_else(|| FormError::ElementNotFound(element_id.to_string()))?;

    if let Some(form) = element
        .inclusive_ancestors()
        .find(|node| tag_name(node).as_deref() == Some("form"))
    {
        return Ok(form);
    }

    let mut forms = document.forms();
    if forms.len() == 1 {
        return Ok(forms.remove(0));
    }
    Err(FormError::MissingParentForm(element_id.to_string()))
}

/// View state fields: the plain name and the namespaced `ns:javax.faces.ViewState:n` form.
pub fn is_view_state_name(name: &str, separator: char) -> bool {
    if name == VIEW_STATE {
        return true;
    }
    let marker = format!("{separator}{VIEW_STATE}{separator}");
    name.contains(&marker) || name.ends_with(&format!("{separator}{VIEW_STATE}"))
}

pub fn form_id(form: &NodeRef) -> Option<String> {
    attr(form, "id").or_else(|| attr(form, "name"))
}
