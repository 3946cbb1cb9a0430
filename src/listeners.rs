use serde::Serialize;

use crate::queue::RequestId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EventStatus {
    Begin,
    Complete,
    Success,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AjaxEvent {
    pub status: EventStatus,
    pub request_id: RequestId,
    pub source: String,
    pub response_status: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    HttpError,
    EmptyResponse,
    #[serde(rename = "malformedXML")]
    MalformedXml,
    ServerError,
    ElementNotFound,
    Timeout,
    Network,
}

/// One reported failure; `message` is already localized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AjaxError {
    pub kind: ErrorKind,
    pub request_id: RequestId,
    pub source: String,
    pub status: Option<u16>,
    pub message_key: String,
    pub message: String,
    pub server_name: Option<String>,
}

type EventListener = Box<dyn Fn(&AjaxEvent)>;
type ErrorListener = Box<dyn Fn(&AjaxError)>;

/// Observers of request events and errors, notified in registration order.
#[derive(Default)]
pub struct Listeners {
    events: Vec<EventListener>,
    errors: Vec<ErrorListener>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_event_listener(&mut self, listener: impl Fn(&AjaxEvent) + 'static) {
        self.events.push(Box::new(listener));
    }

    pub fn add_error_listener(&mut self, listener: impl Fn(&AjaxError) + 'static) {
        self.errors.push(Box::new(listener));
    }

    /// Development stage logger: every event and error goes to tracing.
    pub fn install_dev_logger(&mut self) {
        self.add_event_listener(|event| {
            tracing::info!(
                target: "engine",
                id = %event.request_id,
                source = %event.source,
                status = ?event.status,
                "ajax event"
            );
        });
        self.add_error_listener(|error| {
            tracing::error!(
                target: "engine",
                id = %error.request_id,
                source = %error.source,
                kind = ?error.kind,
                status = ?error.status,
                message = %error.message,
                "ajax error"
            );
        });
    }

    pub fn has_error_listeners(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn emit_event(&self, event: &AjaxEvent) {
        for listener in &self.events {
            listener(event);
        }
    }

    pub fn emit_error(&self, error: &AjaxError) {
        if !self.has_error_listeners() {
            tracing::warn!(
                target: "engine",
                id = %error.request_id,
                kind = ?error.kind,
                message = %error.message,
                "unhandled ajax error"
            );
        }
        for listener in &self.errors {
            listener(error);
        }
    }
}
