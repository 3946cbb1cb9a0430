mod merge;
mod partial;
mod scripts;
pub mod stripper;
pub mod xml;

use thiserror::Error;

pub use merge::{
    apply_response, MergeContext, MergeFailure, MergeReport, ServerError, CLIENT_WINDOW,
    VIEW_BODY, VIEW_HEAD, VIEW_ROOT,
};
pub use partial::{Directive, InsertPosition, PartialResponse};
pub use scripts::{CollectedScript, ScriptKind, ScriptOrigin, ScriptSource};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResponseError {
    #[error("empty response")]
    Empty,
    #[error("malformed XML: {0}")]
    MalformedXml(#[from] xml::XmlError),
    #[error("unexpected root element <{0}>")]
    UnexpectedRoot(String),
    #[error("<{element}> is missing attribute '{attribute}'")]
    MissingAttribute { element: String, attribute: String },
}

/// Parses a server response body into its directives.
///
/// The strict reader runs first. Only when it rejects the body does the
/// stripper try to cut a `<partial-response>` out of the surrounding noise,
/// which is then parsed strictly again.
pub fn parse_response(body: &str) -> Result<PartialResponse, ResponseError> {
    if body.trim().is_empty() {
        return Err(ResponseError::Empty);
    }

    let root = match xml::parse(body) {
        Ok(root) if root.name == "partial-response" => root,
        first => {
            let Some(salvaged) = stripper::salvage_partial_response(body) else {
                return match first {
                    Ok(root) => Err(ResponseError::UnexpectedRoot(root.name)),
                    Err(err) => Err(ResponseError::MalformedXml(err)),
                };
            };
            tracing::debug!(target: "merge", "strict parse failed, using stripped partial response");
            xml::parse(salvaged)?
        }
    };
    PartialResponse::from_xml(&root)
}
