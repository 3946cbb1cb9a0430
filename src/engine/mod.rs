mod outcome;

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use futures_util::future::{abortable, AbortHandle, Aborted as FutureAborted, BoxFuture};
use futures_util::stream::{FuturesUnordered, StreamExt};
use futures_util::FutureExt;
use kuchiki::NodeRef;
use thiserror::Error;
use url::Url;

use crate::config::AjaxConfig;
use crate::dom::{attr, Document};
use crate::form::{
    form_id, has_file_input, resolve_form, serialize, CompletionCallback, FormError,
    RequestOptions, RequestParams, SerializeOptions, SubmitPayload,
};
use crate::i18n::{
    DefaultMessages, MessageSource, ERR_EMPTY_RESPONSE, ERR_MALFORMEDXML, ERR_NETWORK, ERR_NO_PARITEM,
    ERR_REQU_FAILED, ERR_SERVER, ERR_TIMEOUT,
};
use crate::listeners::{AjaxError, AjaxEvent, ErrorKind, EventStatus, Listeners};
use crate::queue::{Aborted, QueuedRequest, RequestId, RequestQueue, RequestState};
use crate::response::{apply_response, parse_response, MergeContext, ResponseError};
use crate::transport::{
    select_transport, HttpTransport, OutgoingRequest, RawResponse, Transport, TransportError,
    TransportHandle, TransportKind,
};

pub use outcome::RequestOutcome;

#[derive(Debug, Error)]
pub enum RequestError {
    #[error(transparent)]
    Form(#[from] FormError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("no action url: the form has no action and the document no base url")]
    NoActionUrl,
    #[error("invalid action url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl RequestError {
    /// Catalog key for failures a page author should see.
    pub fn message_key(&self) -> Option<&'static str> {
        match self {
            RequestError::Form(FormError::MissingParentForm(_)) => Some(ERR_NO_PARITEM),
            _ => None,
        }
    }
}

/// A serialized request waiting for its turn on the wire.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub source: String,
    pub url: Url,
    pub payload: SubmitPayload,
    pub timeout: Option<Duration>,
}

struct ActiveRequest {
    source: String,
    kind: TransportKind,
    abort: AbortHandle,
    on_complete: Option<CompletionCallback>,
}

type InFlight = BoxFuture<'static, (RequestId, Result<Result<TransportHandle, TransportError>, FutureAborted>)>;

/// Owns everything one page needs for partial requests: the live document,
/// the request queue, listeners, messages and the transport.
///
/// Network progress happens while the engine is driven through
/// [`AjaxEngine::next_outcome`] or [`AjaxEngine::run_until_idle`]; all DOM
/// mutation happens on the caller's task, one response at a time.
pub struct AjaxEngine<T: Transport> {
    config: AjaxConfig,
    document: Document,
    transport: T,
    queue: RequestQueue<PreparedRequest>,
    listeners: Listeners,
    messages: Box<dyn MessageSource>,
    in_flight: FuturesUnordered<InFlight>,
    active: HashMap<RequestId, ActiveRequest>,
    finished: VecDeque<RequestOutcome>,
    next_id: u64,
    newest_merged: Option<RequestId>,
}

impl AjaxEngine<HttpTransport> {
    pub fn http(document: Document, config: AjaxConfig) -> Self {
        let transport = HttpTransport::new(config.user_agent.clone());
        Self::new(document, transport, config)
    }
}

impl<T: Transport> AjaxEngine<T> {
    pub fn new(document: Document, transport: T, config: AjaxConfig) -> Self {
        let mut listeners = Listeners::new();
        if config.is_development() {
            listeners.install_dev_logger();
        }
        Self {
            queue: RequestQueue::new(config.max_concurrency, config.max_waiting),
            config,
            document,
            transport,
            listeners,
            messages: Box::new(DefaultMessages::default()),
            in_flight: FuturesUnordered::new(),
            active: HashMap::new(),
            finished: VecDeque::new(),
            next_id: 0,
            newest_merged: None,
        }
    }

    pub fn with_messages(mut self, messages: impl MessageSource + 'static) -> Self {
        self.messages = Box::new(messages);
        self
    }

    pub fn config(&self) -> &AjaxConfig {
        &self.config
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    pub fn queue(&self) -> &RequestQueue<PreparedRequest> {
        &self.queue
    }

    pub fn listeners_mut(&mut self) -> &mut Listeners {
        &mut self.listeners
    }

    pub fn state(&self, id: RequestId) -> Option<RequestState> {
        self.queue.state(id)
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_idle() && self.finished.is_empty()
    }

    /// Serializes the source element's form and queues the request.
    ///
    /// Form resolution and transport selection failures are returned here,
    /// synchronously; everything after that is reported through the
    /// listeners and the request's outcome.
    pub fn request(&mut self, mut options: RequestOptions) -> Result<RequestId, RequestError> {
        let form = resolve_form(&self.document, &options.source)?;
        let form_id = form_id(&form);
        let params = RequestParams::from_options(&options, form_id.as_deref());

        let partial_ids = if self.config.partial_submit {
            params.partial_ids(form_id.as_deref())
        } else {
            None
        };
        let has_file = has_file_input(&self.document, &form, partial_ids.as_deref());
        let kind = select_transport(has_file, self.config.capabilities())?;

        let mut payload = serialize(
            &self.document,
            &form,
            partial_ids.as_deref(),
            SerializeOptions {
                file_support: kind != TransportKind::Xhr1,
                separator: self.config.separator,
            },
        );
        params.append_to(&self.document, &mut payload);

        let prepared = PreparedRequest {
            source: options.source.clone(),
            url: self.action_url(&form)?,
            payload,
            timeout: options.timeout.or_else(|| self.config.timeout()),
        };

        self.next_id += 1;
        let id = RequestId(self.next_id);
        tracing::debug!(
            target: "engine",
            %id,
            source = %prepared.source,
            ?kind,
            url = %prepared.url,
            "request prepared"
        );

        let request = QueuedRequest::new(id, prepared, kind).with_callback(options.on_complete.take());
        let enqueued = self.queue.enqueue(request);
        if let Some(dropped) = enqueued.dropped {
            self.finish_unsent(dropped);
        }
        if let Some(dispatched) = enqueued.dispatched {
            self.dispatch(dispatched);
        }
        Ok(id)
    }

    fn action_url(&self, form: &NodeRef) -> Result<Url, RequestError> {
        let action = attr(form, "action").filter(|action| !action.trim().is_empty());
        match (action, self.document.base_url()) {
            (Some(action), Some(base)) => Ok(base.join(action.trim())?),
            (Some(action), None) => Ok(Url::parse(action.trim())?),
            (None, Some(base)) => Ok(base.clone()),
            (None, None) => Err(RequestError::NoActionUrl),
        }
    }

    fn dispatch(&mut self, request: QueuedRequest<PreparedRequest>) {
        let QueuedRequest {
            id,
            payload: prepared,
            transport: kind,
            on_complete,
            enqueued_at,
        } = request;

        tracing::debug!(
            target: "engine",
            %id,
            waited_ms = enqueued_at.elapsed().as_millis() as u64,
            "dispatching"
        );
        let outgoing = OutgoingRequest {
            id,
            kind,
            url: prepared.url,
            method: self.config.method,
            payload: prepared.payload,
            timeout: prepared.timeout,
        };
        let (future, abort) = abortable(self.transport.send(outgoing));
        self.in_flight.push(future.map(move |result| (id, result)).boxed());
        self.active.insert(
            id,
            ActiveRequest {
                source: prepared.source.clone(),
                kind,
                abort,
                on_complete,
            },
        );

        self.listeners.emit_event(&AjaxEvent {
            status: EventStatus::Begin,
            request_id: id,
            source: prepared.source,
            response_status: None,
        });
    }

    /// Aborts a waiting or in-flight request and frees its slot.
    ///
    /// An in-flight response is dropped unread. Returns false for ids that
    /// are not live.
    pub fn abort(&mut self, id: RequestId) -> bool {
        match self.queue.abort(id) {
            Aborted::Waiting(request) => {
                self.finish_unsent(request);
                true
            }
            Aborted::InFlight { next } => {
                if let Some(active) = self.active.remove(&id) {
                    active.abort.abort();
                    let outcome =
                        RequestOutcome::new(id, active.source, active.kind, RequestState::Aborted);
                    self.finish(outcome, active.on_complete);
                }
                if let Some(next) = next {
                    self.dispatch(next);
                }
                true
            }
            Aborted::Unknown => false,
        }
    }

    /// Aborts everything; the engine stays usable afterwards.
    pub fn shutdown(&mut self) -> Vec<RequestOutcome> {
        for request in self.queue.clear() {
            self.finish_unsent(request);
        }
        let active: Vec<RequestId> = self.active.keys().copied().collect();
        for id in active {
            if let Some(active) = self.active.remove(&id) {
                active.abort.abort();
                let outcome =
                    RequestOutcome::new(id, active.source, active.kind, RequestState::Aborted);
                self.finish(outcome, active.on_complete);
            }
        }
        self.in_flight = FuturesUnordered::new();
        self.finished.drain(..).collect()
    }

    fn finish_unsent(&mut self, request: QueuedRequest<PreparedRequest>) {
        tracing::debug!(target: "engine", id = %request.id, "aborted before dispatch");
        let outcome = RequestOutcome::new(
            request.id,
            request.payload.source,
            request.transport,
            RequestState::Aborted,
        );
        self.finish(outcome, request.on_complete);
    }

    fn finish(&mut self, outcome: RequestOutcome, callback: Option<CompletionCallback>) {
        if let Some(callback) = callback {
            callback(&outcome);
        }
        self.finished.push_back(outcome);
    }

    /// Waits for the next request to finish and merges its response.
    ///
    /// Returns `None` once nothing is queued or in flight.
    pub async fn next_outcome(&mut self) -> Option<RequestOutcome> {
        loop {
            if let Some(outcome) = self.finished.pop_front() {
                return Some(outcome);
            }
            let (id, result) = self.in_flight.next().await?;
            // aborted requests were already reported
            let Some(active) = self.active.remove(&id) else {
                continue;
            };
            match result {
                Ok(result) => self.complete(id, active, result),
                Err(FutureAborted) => {
                    let outcome =
                        RequestOutcome::new(id, active.source, active.kind, RequestState::Aborted);
                    self.finish(outcome, active.on_complete);
                    if let Some(next) = self.queue.complete(id, RequestState::Aborted) {
                        self.dispatch(next);
                    }
                }
            }
        }
    }

    pub async fn run_until_idle(&mut self) -> Vec<RequestOutcome> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = self.next_outcome().await {
            outcomes.push(outcome);
        }
        outcomes
    }

    fn complete(
        &mut self,
        id: RequestId,
        active: ActiveRequest,
        result: Result<TransportHandle, TransportError>,
    ) {
        let mut outcome =
            RequestOutcome::new(id, active.source, active.kind, RequestState::Completed);

        match result {
            Err(TransportError::Timeout(limit)) => {
                tracing::warn!(target: "engine", %id, ?limit, "request timed out");
                outcome.state = RequestState::TimedOut;
                let id_text = id.to_string();
                self.report(&mut outcome, ErrorKind::Timeout, ERR_TIMEOUT, &[id_text.as_str()], None);
            }
            Err(err) => {
                let (id_text, reason) = (id.to_string(), err.to_string());
                self.report(&mut outcome, ErrorKind::Network, ERR_NETWORK, &[id_text.as_str(), reason.as_str()], None);
            }
            Ok(handle) => match handle.into_response() {
                Some(response) => self.process_response(&mut outcome, response),
                None => {
                    let (id_text, reason) = (id.to_string(), "no response".to_string());
                    self.report(&mut outcome, ErrorKind::Network, ERR_NETWORK, &[id_text.as_str(), reason.as_str()], None);
                }
            },
        }

        let state = outcome.state;
        self.finish(outcome, active.on_complete);
        if let Some(next) = self.queue.complete(id, state) {
            self.dispatch(next);
        }
    }

    fn process_response(&mut self, outcome: &mut RequestOutcome, response: RawResponse) {
        outcome.status = Some(response.status);
        self.emit(outcome, EventStatus::Complete);

        if !response.is_success() {
            let status = response.status.to_string();
            self.report(
                outcome,
                ErrorKind::HttpError,
                ERR_REQU_FAILED,
                &[status.as_str(), response.reason.as_str()],
                None,
            );
            return;
        }

        if self.config.discard_stale_responses
            && self.newest_merged.map_or(false, |newest| outcome.id < newest)
        {
            tracing::warn!(target: "engine", id = %outcome.id, "discarding stale response");
            outcome.stale = true;
            return;
        }

        let parsed = match parse_response(&response.body) {
            Ok(parsed) => parsed,
            Err(ResponseError::Empty) => {
                let id_text = outcome.id.to_string();
                self.report(outcome, ErrorKind::EmptyResponse, ERR_EMPTY_RESPONSE, &[id_text.as_str()], None);
                return;
            }
            Err(err) => {
                tracing::debug!(target: "engine", id = %outcome.id, error = %err, "response rejected");
                self.report(outcome, ErrorKind::MalformedXml, ERR_MALFORMEDXML, &[], None);
                return;
            }
        };

        let report = apply_response(
            &mut self.document,
            &parsed,
            MergeContext {
                separator: self.config.separator,
            },
        );
        self.newest_merged = Some(self.newest_merged.map_or(outcome.id, |newest| newest.max(outcome.id)));

        for failure in &report.skipped {
            self.report(outcome, ErrorKind::ElementNotFound, failure.key, &[failure.id.as_str()], None);
        }
        for server_error in &report.server_errors {
            self.report(
                outcome,
                ErrorKind::ServerError,
                ERR_SERVER,
                &[server_error.name.as_str(), server_error.message.as_str()],
                Some(server_error.name.clone()),
            );
        }
        if let Some(target) = &report.redirect {
            let resolved = self
                .document
                .base_url()
                .and_then(|base| base.join(target).ok())
                .map(|url| url.to_string())
                .unwrap_or_else(|| target.clone());
            tracing::info!(target: "engine", id = %outcome.id, url = %resolved, "server requested redirect");
            outcome.redirect = Some(resolved);
        }
        if report.server_errors.is_empty() {
            self.emit(outcome, EventStatus::Success);
        }
        outcome.report = Some(report);
    }

    fn emit(&self, outcome: &RequestOutcome, status: EventStatus) {
        self.listeners.emit_event(&AjaxEvent {
            status,
            request_id: outcome.id,
            source: outcome.source.clone(),
            response_status: outcome.status,
        });
    }

    fn report(
        &self,
        outcome: &mut RequestOutcome,
        kind: ErrorKind,
        key: &str,
        args: &[&str],
        server_name: Option<String>,
    ) {
        let error = AjaxError {
            kind,
            request_id: outcome.id,
            source: outcome.source.clone(),
            status: outcome.status,
            message_key: key.to_string(),
            message: self.messages.message(key, args),
            server_name,
        };
        self.listeners.emit_error(&error);
        outcome.errors.push(error);
    }
}
