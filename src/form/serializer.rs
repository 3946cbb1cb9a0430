use kuchiki::NodeRef;

use super::{form_id, is_view_state_name, SubmitPayload};
use crate::dom::{attr, has_attr, tag_name, Document};

#[derive(Debug, Clone, Copy)]
pub struct SerializeOptions {
    /// Attach file blobs; only set when the chosen transport can carry them.
    pub file_support: bool,
    pub separator: char,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            file_support: false,
            separator: ':',
        }
    }
}

/// Encodes the successful controls of `form` in document order.
///
/// With `partial_ids`, only controls carrying one of the ids (or nested in
/// an element that does) are encoded, plus the view state and form id
/// fields the server always needs.
pub fn serialize(
    document: &Document,
    form: &NodeRef,
    partial_ids: Option<&[String]>,
    options: SerializeOptions,
) -> SubmitPayload {
    let mut payload = SubmitPayload::new();
    let form_id = form_id(form);

    for control in controls(form) {
        let Some(name) = attr(&control, "name").filter(|name| !name.is_empty()) else {
            continue;
        };
        if is_disabled(&control) {
            continue;
        }
        if let Some(ids) = partial_ids {
            let mandatory = is_view_state_name(&name, options.separator)
                || form_id.as_deref() == Some(name.as_str());
            if !mandatory && !within_partial_set(&control, form, ids) {
                continue;
            }
        }
        encode_control(document, &control, &name, options, &mut payload);
    }

    payload
}

/// Whether serializing `form` would attach at least one file.
pub fn has_file_input(document: &Document, form: &NodeRef, partial_ids: Option<&[String]>) -> bool {
    controls(form).any(|control| {
        tag_name(&control).as_deref() == Some("input")
            && input_type(&control) == "file"
            && attr(&control, "name").is_some()
            && !is_disabled(&control)
            && partial_ids.map_or(true, |ids| within_partial_set(&control, form, ids))
            && !document.files_for(&control).is_empty()
    })
}

fn controls(form: &NodeRef) -> impl Iterator<Item = NodeRef> {
    form.descendants().filter(|node| {
        matches!(
            tag_name(node).as_deref(),
            Some("input" | "select" | "textarea" | "button")
        )
    })
}

fn encode_control(
    document: &Document,
    control: &NodeRef,
    name: &str,
    options: SerializeOptions,
    payload: &mut SubmitPayload,
) {
    match tag_name(control).as_deref() {
        Some("select") => {
            for value in selected_values(control) {
                payload.push_text(name, value);
            }
        }
        Some("textarea") => payload.push_text(name, control.text_contents()),
        Some("input") => match input_type(control).as_str() {
            "checkbox" | "radio" => {
                if has_attr(control, "checked") {
                    let value = attr(control, "value").unwrap_or_else(|| "on".to_string());
                    payload.push_text(name, value);
                }
            }
            "file" => {
                if options.file_support {
                    for blob in document.files_for(control) {
                        payload.push_file(name, blob);
                    }
                }
            }
            "submit" | "image" | "reset" | "button" => {}
            _ => payload.push_text(name, attr(control, "value").unwrap_or_default()),
        },
        // buttons are only submitted as the issuing control
        _ => {}
    }
}

fn input_type(input: &NodeRef) -> String {
    attr(input, "type")
        .map(|value| value.trim().to_ascii_lowercase())
        .unwrap_or_else(|| "text".to_string())
}

fn is_disabled(control: &NodeRef) -> bool {
    if has_attr(control, "disabled") {
        return true;
    }
    control
        .ancestors()
        .any(|node| tag_name(&node).as_deref() == Some("fieldset") && has_attr(&node, "disabled"))
}

fn within_partial_set(control: &NodeRef, form: &NodeRef, ids: &[String]) -> bool {
    for node in control.inclusive_ancestors() {
        if let Some(id) = attr(&node, "id") {
            if ids.iter().any(|candidate| *candidate == id) {
                return true;
            }
        }
        if node == *form {
            break;
        }
    }
    false
}

fn selected_values(select: &NodeRef) -> Vec<String> {
    let options: Vec<NodeRef> = select
        .descendants()
        .filter(|node| tag_name(node).as_deref() == Some("option"))
        .collect();

    if has_attr(select, "multiple") {
        return options
            .iter()
            .filter(|option| has_attr(option, "selected") && !has_attr(option, "disabled"))
            .map(option_value)
            .collect();
    }

    let chosen = options
        .iter()
        .rev()
        .find(|option| has_attr(option, "selected"))
        .or_else(|| {
            if is_listbox(select) {
                None
            } else {
                options.iter().find(|option| !has_attr(option, "disabled"))
            }
        });

    match chosen {
        Some(option) if !has_attr(option, "disabled") => vec![option_value(option)],
        _ => Vec::new(),
    }
}

fn is_listbox(select: &NodeRef) -> bool {
    attr(select, "size")
        .and_then(|size| size.trim().parse::<u32>().ok())
        .map_or(false, |size| size > 1)
}

fn option_value(option: &NodeRef) -> String {
    attr(option, "value").unwrap_or_else(|| {
        option
            .text_contents()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    })
}
