mod http;

use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::config::HttpMethod;
use crate::form::SubmitPayload;
use crate::queue::RequestId;

pub use http::{HttpTransport, IFRAME_PARAM};

pub const FACES_REQUEST_HEADER: &str = "Faces-Request";
pub const FACES_REQUEST_PARTIAL: &str = "partial/ajax";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Xhr1,
    Xhr2,
    Iframe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum XhrLevel {
    One,
    Two,
}

/// What the runtime offers; derived from config in a headless setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportCapabilities {
    pub xhr: Option<XhrLevel>,
    pub iframe: bool,
    pub force_compat: bool,
}

impl Default for TransportCapabilities {
    fn default() -> Self {
        Self {
            xhr: Some(XhrLevel::Two),
            iframe: true,
            force_compat: false,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("no transport available for this request")]
    NoTransport,
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Picks the transport for one submission.
///
/// A payload carrying a file never goes through XHR level 1: it needs level 2
/// multipart or the iframe emulation.
pub fn select_transport(
    has_file: bool,
    caps: TransportCapabilities,
) -> Result<TransportKind, TransportError> {
    if has_file {
        if caps.xhr == Some(XhrLevel::Two) && !caps.force_compat {
            return Ok(TransportKind::Xhr2);
        }
        return if caps.iframe {
            Ok(TransportKind::Iframe)
        } else {
            Err(TransportError::NoTransport)
        };
    }

    if caps.xhr.is_none() || caps.force_compat {
        return if caps.iframe {
            Ok(TransportKind::Iframe)
        } else {
            Err(TransportError::NoTransport)
        };
    }
    Ok(TransportKind::Xhr1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleState {
    Unsent,
    Opened,
    Sent,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawResponse {
    pub status: u16,
    pub reason: String,
    pub content_type: Option<String>,
    pub body: String,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One underlying request object; its state only moves forward.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    pub id: RequestId,
    pub kind: TransportKind,
    state: HandleState,
    pub timeout: Option<Duration>,
    response: Option<RawResponse>,
}

impl TransportHandle {
    pub fn new(id: RequestId, kind: TransportKind, timeout: Option<Duration>) -> Self {
        Self {
            id,
            kind,
            state: HandleState::Unsent,
            timeout,
            response: None,
        }
    }

    pub fn state(&self) -> HandleState {
        self.state
    }

    pub fn advance(&mut self, next: HandleState) {
        if next > self.state {
            self.state = next;
        }
    }

    pub fn finish(&mut self, response: RawResponse) {
        self.response = Some(response);
        self.state = HandleState::Done;
    }

    pub fn response(&self) -> Option<&RawResponse> {
        self.response.as_ref()
    }

    pub fn into_response(self) -> Option<RawResponse> {
        self.response
    }
}

/// Everything a transport needs to put one request on the wire.
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    pub id: RequestId,
    pub kind: TransportKind,
    pub url: Url,
    pub method: HttpMethod,
    pub payload: SubmitPayload,
    pub timeout: Option<Duration>,
}

pub type TransportFuture = BoxFuture<'static, Result<TransportHandle, TransportError>>;

/// The seam between the engine and the network.
pub trait Transport {
    fn send(&self, request: OutgoingRequest) -> TransportFuture;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(xhr: Option<XhrLevel>, iframe: bool, force_compat: bool) -> TransportCapabilities {
        TransportCapabilities {
            xhr,
            iframe,
            force_compat,
        }
    }

    #[test]
    fn plain_payloads_use_level_one() {
        assert_eq!(
            select_transport(false, TransportCapabilities::default()),
            Ok(TransportKind::Xhr1)
        );
    }

    #[test]
    fn files_never_use_level_one() {
        for xhr in [None, Some(XhrLevel::One), Some(XhrLevel::Two)] {
            for iframe in [true, false] {
                for force in [true, false] {
                    let selected = select_transport(true, caps(xhr, iframe, force));
                    assert_ne!(selected, Ok(TransportKind::Xhr1));
                }
            }
        }
        assert_eq!(
            select_transport(true, caps(Some(XhrLevel::Two), true, false)),
            Ok(TransportKind::Xhr2)
        );
        assert_eq!(
            select_transport(true, caps(Some(XhrLevel::One), true, false)),
            Ok(TransportKind::Iframe)
        );
    }

    #[test]
    fn compat_mode_and_missing_xhr_use_iframe() {
        assert_eq!(
            select_transport(false, caps(None, true, false)),
            Ok(TransportKind::Iframe)
        );
        assert_eq!(
            select_transport(false, caps(Some(XhrLevel::Two), true, true)),
            Ok(TransportKind::Iframe)
        );
    }

    #[test]
    fn nothing_available_is_an_error() {
        assert_eq!(
            select_transport(false, caps(None, false, false)),
            Err(TransportError::NoTransport)
        );
        assert_eq!(
            select_transport(true, caps(Some(XhrLevel::One), false, false)),
            Err(TransportError::NoTransport)
        );
    }

    #[test]
    fn handle_state_moves_forward() {
        let mut handle = TransportHandle::new(RequestId(1), TransportKind::Xhr1, None);
        handle.advance(HandleState::Sent);
        handle.advance(HandleState::Opened);
        assert_eq!(handle.state(), HandleState::Sent);
        handle.finish(RawResponse {
            status: 200,
            reason: "OK".into(),
            content_type: None,
            body: String::new(),
        });
        assert_eq!(handle.state(), HandleState::Done);
        assert!(handle.response().unwrap().is_success());
    }
}
