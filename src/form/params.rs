use std::time::Duration;

use kuchiki::NodeRef;

use super::SubmitPayload;
use crate::dom::{attr, tag_name, Document};

pub const SOURCE: &str = "javax.faces.source";
pub const PARTIAL_EVENT: &str = "javax.faces.partial.event";
pub const PARTIAL_EXECUTE: &str = "javax.faces.partial.execute";
pub const PARTIAL_RENDER: &str = "javax.faces.partial.render";
pub const BEHAVIOR_EVENT: &str = "javax.faces.behavior.event";
pub const PARTIAL_AJAX: &str = "javax.faces.partial.ajax";
pub const RESET_VALUES: &str = "javax.faces.partial.resetValues";

/// An `execute` or `render` list after keyword resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdList {
    All,
    None,
    Ids(Vec<String>),
}

impl IdList {
    pub fn to_param(&self) -> Option<String> {
        match self {
            IdList::All => Some("@all".to_string()),
            IdList::None => None,
            IdList::Ids(ids) if ids.is_empty() => None,
            IdList::Ids(ids) => Some(ids.join(" ")),
        }
    }
}

/// Resolves `@this`, `@form`, `@all` and `@none` against the issuing element.
///
/// `@all` anywhere in the list wins; `@none` alone yields an empty list.
pub fn resolve_ids(raw: &str, source_id: &str, form_id: Option<&str>) -> IdList {
    let mut ids: Vec<String> = Vec::new();
    for token in raw.split_whitespace() {
        let resolved = match token {
            "@all" => return IdList::All,
            "@none" => continue,
            "@this" => source_id.to_string(),
            "@form" => match form_id {
                Some(id) => id.to_string(),
                None => continue,
            },
            other => other.to_string(),
        };
        if !ids.contains(&resolved) {
            ids.push(resolved);
        }
    }
    if ids.is_empty() {
        IdList::None
    } else {
        IdList::Ids(ids)
    }
}

pub type CompletionCallback = Box<dyn FnOnce(&crate::engine::RequestOutcome)>;

/// Options of one `request` call, mirroring the `jsf.ajax.request` option bag.
pub struct RequestOptions {
    pub source: String,
    pub execute: String,
    pub render: String,
    pub event: Option<String>,
    pub behavior_event: Option<String>,
    pub params: Vec<(String, String)>,
    pub reset_values: bool,
    pub timeout: Option<Duration>,
    pub on_complete: Option<CompletionCallback>,
}

impl RequestOptions {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            execute: "@this".to_string(),
            render: "@none".to_string(),
            event: None,
            behavior_event: None,
            params: Vec::new(),
            reset_values: false,
            timeout: None,
            on_complete: None,
        }
    }

    pub fn execute(mut self, ids: impl Into<String>) -> Self {
        self.execute = ids.into();
        self
    }

    pub fn render(mut self, ids: impl Into<String>) -> Self {
        self.render = ids.into();
        self
    }

    pub fn event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    pub fn behavior_event(mut self, event: impl Into<String>) -> Self {
        self.behavior_event = Some(event.into());
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn reset_values(mut self, reset: bool) -> Self {
        self.reset_values = reset;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn on_complete(mut self, callback: impl FnOnce(&crate::engine::RequestOutcome) + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }
}

/// The protocol parameters appended after the form controls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestParams {
    pub source: String,
    pub execute: IdList,
    pub render: IdList,
    pub event: Option<String>,
    pub behavior_event: Option<String>,
    pub reset_values: bool,
    pub params: Vec<(String, String)>,
}

impl RequestParams {
    pub fn from_options(options: &RequestOptions, form_id: Option<&str>) -> Self {
        Self {
            source: options.source.clone(),
            execute: resolve_ids(&options.execute, &options.source, form_id),
            render: resolve_ids(&options.render, &options.source, form_id),
            event: options.event.clone(),
            behavior_event: options.behavior_event.clone(),
            reset_values: options.reset_values,
            params: options.params.clone(),
        }
    }

    /// Ids the serializer restricts itself to in partial submit mode.
    pub fn partial_ids(&self, form_id: Option<&str>) -> Option<Vec<String>> {
        match &self.execute {
            IdList::All | IdList::None => None,
            IdList::Ids(ids) if form_id.map_or(false, |form| ids.iter().any(|id| id == form)) => None,
            IdList::Ids(ids) => Some(ids.clone()),
        }
    }

    pub fn append_to(&self, document: &Document, payload: &mut SubmitPayload) {
        payload.push_text(SOURCE, &self.source);
        if let Some(event) = &self.event {
            payload.push_text(PARTIAL_EVENT, event);
        }
        if let Some(execute) = self.execute.to_param() {
            payload.push_text(PARTIAL_EXECUTE, execute);
        }
        if let Some(render) = self.render.to_param() {
            payload.push_text(PARTIAL_RENDER, render);
        }
        if let Some(event) = &self.behavior_event {
            payload.push_text(BEHAVIOR_EVENT, event);
        }
        payload.push_text(PARTIAL_AJAX, "true");
        if self.reset_values {
            payload.push_text(RESET_VALUES, "true");
        }
        if let Some((name, value)) = issuing_control(document, &self.source) {
            if !payload.contains(&name) {
                payload.push_text(name, value);
            }
        }
        for (name, value) in &self.params {
            payload.push_text(name, value);
        }
    }
}

/// A named submit button contributes its own pair, as a classic submit would.
fn issuing_control(document: &Document, source_id: &str) -> Option<(String, String)> {
    let node: NodeRef = document.element_by_id(source_id)?;
    let is_button = match tag_name(&node).as_deref() {
        Some("button") => true,
        Some("input") => matches!(
            attr(&node, "type").map(|t| t.to_ascii_lowercase()).as_deref(),
            Some("submit" | "image" | "button")
        ),
        _ => false,
    };
    if !is_button {
        return None;
    }
    let name = attr(&node, "name").filter(|name| !name.is_empty())?;
    Some((name, attr(&node, "value").unwrap_or_default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_keywords() {
        assert_eq!(
            resolve_ids("@this @form other @this", "btn", Some("f")),
            IdList::Ids(vec!["btn".into(), "f".into(), "other".into()])
        );
        assert_eq!(resolve_ids("a @all", "btn", None), IdList::All);
        assert_eq!(resolve_ids("@none", "btn", None), IdList::None);
        assert_eq!(resolve_ids("", "btn", None), IdList::None);
    }

    #[test]
    fn appends_protocol_parameters_in_order() {
        let document = Document::parse(
            r#"<form id="f"><input type="submit" id="f:go" name="f:go" value="Go"></form>"#,
        );
        let options = RequestOptions::new("f:go")
            .execute("@form")
            .render("out @this")
            .event("click")
            .param("extra", "1");
        let params = RequestParams::from_options(&options, Some("f"));
        let mut payload = SubmitPayload::new();
        params.append_to(&document, &mut payload);

        let names: Vec<&str> = payload.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                SOURCE,
                PARTIAL_EVENT,
                PARTIAL_EXECUTE,
                PARTIAL_RENDER,
                PARTIAL_AJAX,
                "f:go",
                "extra"
            ]
        );
        assert_eq!(payload.get(PARTIAL_EXECUTE), Some("f"));
        assert_eq!(payload.get(PARTIAL_RENDER), Some("out f:go"));
        assert_eq!(payload.get("f:go"), Some("Go"));
    }

    #[test]
    fn execute_of_form_means_full_submit() {
        let options = RequestOptions::new("f:go").execute("@form");
        let params = RequestParams::from_options(&options, Some("f"));
        assert_eq!(params.partial_ids(Some("f")), None);

        let options = RequestOptions::new("f:go").execute("@this f:name");
        let params = RequestParams::from_options(&options, Some("f"));
        assert_eq!(
            params.partial_ids(Some("f")),
            Some(vec!["f:go".to_string(), "f:name".to_string()])
        );
    }
}
