use serde::Serialize;

use super::xml::XmlElement;
use super::ResponseError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertPosition {
    Before(String),
    After(String),
}

impl InsertPosition {
    pub fn reference(&self) -> &str {
        match self {
            InsertPosition::Before(id) | InsertPosition::After(id) => id.as_str(),
        }
    }
}

/// One change of a partial response, applied in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "directive", rename_all = "snake_case")]
pub enum Directive {
    Update {
        id: String,
        content: String,
    },
    Insert {
        id: Option<String>,
        position: InsertPosition,
        content: String,
    },
    Delete {
        id: String,
    },
    Attributes {
        id: String,
        attributes: Vec<(String, String)>,
    },
    Eval {
        script: String,
    },
    Extension {
        attributes: Vec<(String, String)>,
        content: String,
    },
    Redirect {
        url: String,
    },
    Error {
        name: String,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartialResponse {
    pub id: Option<String>,
    pub directives: Vec<Directive>,
}

impl PartialResponse {
    pub fn from_xml(root: &XmlElement) -> Result<Self, ResponseError> {
        if root.name != "partial-response" {
            return Err(ResponseError::UnexpectedRoot(root.name.clone()));
        }

        let mut directives = Vec::new();
        for element in root.elements() {
            match element.name.as_str() {
                "changes" => {
                    for change in element.elements() {
                        if let Some(directive) = change_directive(change)? {
                            directives.push(directive);
                        }
                    }
                }
                "redirect" => directives.push(Directive::Redirect {
                    url: required(element, "url")?,
                }),
                "error" => directives.push(error_directive(element)),
                other => {
                    tracing::debug!(target: "merge", element = other, "ignoring unknown response element");
                }
            }
        }

        Ok(Self {
            id: root.attr("id").map(str::to_string),
            directives,
        })
    }
}

fn change_directive(change: &XmlElement) -> Result<Option<Directive>, ResponseError> {
    let directive = match change.name.as_str() {
        "update" => Directive::Update {
            id: required(change, "id")?,
            content: change.text(),
        },
        "insert" => insert_directive(change)?,
        "delete" => Directive::Delete {
            id: required(change, "id")?,
        },
        "attributes" => Directive::Attributes {
            id: required(change, "id")?,
            attributes: change
                .elements()
                .filter(|attribute| attribute.name == "attribute")
                .filter_map(|attribute| {
                    let name = attribute.attr("name")?;
                    let value = attribute.attr("value").unwrap_or_default();
                    Some((name.to_string(), value.to_string()))
                })
                .collect(),
        },
        "eval" => Directive::Eval {
            script: change.text(),
        },
        "extension" => Directive::Extension {
            attributes: change.attributes.clone(),
            content: change.text(),
        },
        "error" => error_directive(change),
        "redirect" => Directive::Redirect {
            url: required(change, "url")?,
        },
        other => {
            tracing::debug!(target: "merge", element = other, "ignoring unknown change element");
            return Ok(None);
        }
    };
    Ok(Some(directive))
}

/// Both insert shapes: `<insert><before id="ref">..</before></insert>` and
/// `<insert id="new" before="ref">..</insert>`.
fn insert_directive(insert: &XmlElement) -> Result<Directive, ResponseError> {
    if let Some(reference) = insert.attr("before") {
        return Ok(Directive::Insert {
            id: insert.attr("id").map(str::to_string),
            position: InsertPosition::Before(reference.to_string()),
            content: insert.text(),
        });
    }
    if let Some(reference) = insert.attr("after") {
        return Ok(Directive::Insert {
            id: insert.attr("id").map(str::to_string),
            position: InsertPosition::After(reference.to_string()),
            content: insert.text(),
        });
    }

    let nested = insert
        .elements()
        .find(|child| child.name == "before" || child.name == "after")
        .ok_or_else(|| ResponseError::MissingAttribute {
            element: "insert".to_string(),
            attribute: "before|after".to_string(),
        })?;
    let reference = required(nested, "id")?;
    let position = if nested.name == "before" {
        InsertPosition::Before(reference)
    } else {
        InsertPosition::After(reference)
    };
    Ok(Directive::Insert {
        id: insert.attr("id").map(str::to_string),
        position,
        content: nested.text(),
    })
}

fn error_directive(error: &XmlElement) -> Directive {
    let text_of = |name: &str| {
        error
            .child(name)
            .map(|child| child.text().trim().to_string())
            .unwrap_or_default()
    };
    Directive::Error {
        name: text_of("error-name"),
        message: text_of("error-message"),
    }
}

fn required(element: &XmlElement, attribute: &str) -> Result<String, ResponseError> {
    element
        .attr(attribute)
        .map(str::to_string)
        .ok_or_else(|| ResponseError::MissingAttribute {
            element: element.name.clone(),
            attribute: attribute.to_string(),
        })
}
