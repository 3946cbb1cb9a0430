use kuchiki::NodeRef;
use serde::Serialize;

use super::partial::{Directive, InsertPosition, PartialResponse};
use super::scripts::{collect_scripts, CollectedScript};
use super::stripper;
use crate::dom::{attr, is_blank_text, is_element, parse_fragment, parse_fragment_in, tag_name, Document};
use crate::form::is_view_state_name;
use crate::i18n::{ERR_ITEM_ID_NOTFOUND, ERR_PPR_INSERTBEFID, ERR_PPR_UNKNOWNCID};

pub const VIEW_ROOT: &str = "javax.faces.ViewRoot";
pub const VIEW_HEAD: &str = "javax.faces.ViewHead";
pub const VIEW_BODY: &str = "javax.faces.ViewBody";
pub const CLIENT_WINDOW: &str = "javax.faces.ClientWindow";

#[derive(Debug, Clone, Copy)]
pub struct MergeContext {
    pub separator: char,
}

impl Default for MergeContext {
    fn default() -> Self {
        Self { separator: ':' }
    }
}

/// A directive that could not be applied and was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeFailure {
    pub directive: &'static str,
    pub id: String,
    /// Message key describing the failure.
    pub key: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerError {
    pub name: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub applied: usize,
    pub skipped: Vec<MergeFailure>,
    pub updated_ids: Vec<String>,
    pub scripts: Vec<CollectedScript>,
    pub redirect: Option<String>,
    pub server_errors: Vec<ServerError>,
    pub extensions: usize,
}

/// Applies the directives in document order.
///
/// A failing directive is recorded and skipped; what was applied before it
/// stays applied. A redirect ends the merge.
pub fn apply_response(document: &mut Document, response: &PartialResponse, ctx: MergeContext) -> MergeReport {
    let mut report = MergeReport::default();

    for directive in &response.directives {
        match directive {
            Directive::Update { id, content } => apply_update(document, id, content, ctx, &mut report),
            Directive::Insert {
                position, content, ..
            } => apply_insert(document, position, content, &mut report),
            Directive::Delete { id } => match document.element_by_id(id) {
                Some(node) => {
                    document.remove(&node);
                    report.applied += 1;
                }
                None => skip(&mut report, "delete", id, ERR_ITEM_ID_NOTFOUND),
            },
            Directive::Attributes { id, attributes } => match document.element_by_id(id) {
                Some(node) => {
                    for (name, value) in attributes {
                        document.set_attribute(&node, name, value);
                    }
                    report.applied += 1;
                }
                None => skip(&mut report, "attributes", id, ERR_ITEM_ID_NOTFOUND),
            },
            Directive::Eval { script } => {
                report.scripts.push(CollectedScript::eval(script.clone()));
                report.applied += 1;
            }
            Directive::Extension { .. } => report.extensions += 1,
            Directive::Error { name, message } => {
                report.server_errors.push(ServerError {
                    name: name.clone(),
                    message: message.clone(),
                });
            }
            Directive::Redirect { url } => {
                tracing::debug!(target: "merge", %url, "redirect, remaining directives dropped");
                report.redirect = Some(url.clone());
                break;
            }
        }
    }

    tracing::debug!(
        target: "merge",
        applied = report.applied,
        skipped = report.skipped.len(),
        "partial response merged"
    );
    report
}

fn skip(report: &mut MergeReport, directive: &'static str, id: &str, key: &'static str) {
    tracing::warn!(target: "merge", directive, id, key, "skipping directive");
    report.skipped.push(MergeFailure {
        directive,
        id: id.to_string(),
        key,
    });
}

fn apply_update(document: &mut Document, id: &str, content: &str, ctx: MergeContext, report: &mut MergeReport) {
    if id == VIEW_ROOT {
        document.replace_all(content);
        if let Ok(body) = document.body() {
            report.scripts.extend(collect_scripts(&[body], id));
        }
    } else if id == VIEW_HEAD || id == VIEW_BODY {
        let (target, inner) = if id == VIEW_HEAD {
            (document.head(), stripper::extract_head(content))
        } else {
            (document.body(), stripper::extract_body(content))
        };
        let Ok(target) = target else {
            skip(report, "update", id, ERR_PPR_UNKNOWNCID);
            return;
        };
        let inserted = document.replace_inner(&target, inner.unwrap_or(content));
        report.scripts.extend(collect_scripts(&inserted, id));
    } else if is_view_state_name(id, ctx.separator) || is_client_window(id, ctx.separator) {
        update_hidden_field(document, id, content.trim(), ctx.separator);
    } else {
        let Some(node) = document.element_by_id(id) else {
            skip(report, "update", id, ERR_ITEM_ID_NOTFOUND);
            return;
        };
        let inserted = if replaces_element(&node, content, id) {
            match document.replace_outer(&node, content) {
                Ok(inserted) => inserted,
                Err(_) => {
                    skip(report, "update", id, ERR_ITEM_ID_NOTFOUND);
                    return;
                }
            }
        } else {
            document.replace_inner(&node, content)
        };
        report.scripts.extend(collect_scripts(&inserted, id));
    }
    report.updated_ids.push(id.to_string());
    report.applied += 1;
}

fn is_client_window(id: &str, separator: char) -> bool {
    id == CLIENT_WINDOW || id.ends_with(&format!("{separator}{CLIENT_WINDOW}"))
}

/// True when the markup is exactly one element carrying the target id.
fn replaces_element(node: &NodeRef, content: &str, id: &str) -> bool {
    let context = node.parent().unwrap_or_else(|| node.clone());
    let nodes: Vec<NodeRef> = parse_fragment_in(&context, content)
        .into_iter()
        .filter(|node| !is_blank_text(node))
        .collect();
    matches!(nodes.as_slice(), [only] if is_element(only) && attr(only, "id").as_deref() == Some(id))
}

fn apply_insert(document: &mut Document, position: &InsertPosition, content: &str, report: &mut MergeReport) {
    let reference_id = position.reference();
    let Some(reference) = document.element_by_id(reference_id) else {
        skip(report, "insert", reference_id, ERR_PPR_INSERTBEFID);
        return;
    };
    let inserted = match position {
        InsertPosition::Before(_) => document.insert_before(&reference, content),
        InsertPosition::After(_) => document.insert_after(&reference, content),
    };
    match inserted {
        Ok(nodes) => {
            report.scripts.extend(collect_scripts(&nodes, reference_id));
            report.applied += 1;
        }
        Err(_) => skip(report, "insert", reference_id, ERR_PPR_INSERTBEFID),
    }
}

/// Writes a view state (or client window) value into every form, adding the
/// hidden field to forms that lack it.
fn update_hidden_field(document: &mut Document, id: &str, value: &str, separator: char) {
    let is_view_state = is_view_state_name(id, separator);
    for form in document.forms() {
        let existing: Vec<NodeRef> = form
            .descendants()
            .filter(|node| tag_name(node).as_deref() == Some("input"))
            .filter(|node| {
                attr(node, "name").map_or(false, |name| {
                    if is_view_state {
                        is_view_state_name(&name, separator)
                    } else {
                        name == id || name.ends_with(CLIENT_WINDOW)
                    }
                })
            })
            .collect();

        if existing.is_empty() {
            let markup = format!(
                r#"<input type="hidden" name="{}" value="{}" autocomplete="off">"#,
                html_escape::encode_double_quoted_attribute(id),
                html_escape::encode_double_quoted_attribute(value),
            );
            for node in parse_fragment(&markup) {
                form.append(node);
            }
        } else {
            for input in existing {
                document.set_attribute(&input, "value", value);
            }
        }
    }
}
