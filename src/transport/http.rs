use futures_util::FutureExt;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};

use super::{
    HandleState, OutgoingRequest, RawResponse, Transport, TransportError, TransportFuture,
    TransportHandle, TransportKind, FACES_REQUEST_HEADER, FACES_REQUEST_PARTIAL,
};
use crate::config::HttpMethod;
use crate::form::{FormValue, SubmitPayload};

/// Marks an emulated hidden-frame submit so the server answers with a document.
pub const IFRAME_PARAM: &str = "org.apache.myfaces.partial.iframe";

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// reqwest backed transports: XHR level 1, level 2 and the iframe emulation.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    user_agent: String,
}

impl HttpTransport {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self::with_client(Client::new(), user_agent)
    }

    pub fn with_client(client: Client, user_agent: impl Into<String>) -> Self {
        Self {
            client,
            user_agent: user_agent.into(),
        }
    }

    fn build(&self, request: &OutgoingRequest) -> Result<RequestBuilder, TransportError> {
        let builder = match request.kind {
            TransportKind::Xhr1 => self.xhr1(request)?,
            TransportKind::Xhr2 => self
                .client
                .post(request.url.clone())
                .multipart(multipart_form(&request.payload)?),
            TransportKind::Iframe => {
                let mut payload = request.payload.clone();
                payload.push_text(IFRAME_PARAM, "true");
                // a frame submit carries no ajax headers
                return Ok(self
                    .client
                    .post(request.url.clone())
                    .header(USER_AGENT, &self.user_agent)
                    .multipart(multipart_form(&payload)?));
            }
        };
        Ok(builder
            .header(USER_AGENT, &self.user_agent)
            .header(FACES_REQUEST_HEADER, FACES_REQUEST_PARTIAL)
            .header("X-Requested-With", "XMLHttpRequest"))
    }

    fn xhr1(&self, request: &OutgoingRequest) -> Result<RequestBuilder, TransportError> {
        let encoded = request
            .payload
            .to_urlencoded()
            .map_err(|err| TransportError::InvalidRequest(err.to_string()))?;
        let builder = match request.method {
            HttpMethod::Post => self
                .client
                .post(request.url.clone())
                .header(CONTENT_TYPE, FORM_URLENCODED)
                .body(encoded),
            HttpMethod::Get => {
                let mut url = request.url.clone();
                let query = match url.query() {
                    Some(existing) if !existing.is_empty() => format!("{existing}&{encoded}"),
                    _ => encoded,
                };
                url.set_query(Some(&query));
                self.client.get(url)
            }
        };
        Ok(builder)
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: OutgoingRequest) -> TransportFuture {
        let mut handle = TransportHandle::new(request.id, request.kind, request.timeout);
        let built = self.build(&request);
        let timeout = request.timeout;

        async move {
            let builder = built?;
            handle.advance(HandleState::Opened);
            tracing::debug!(
                target: "transport",
                id = %handle.id,
                kind = ?handle.kind,
                url = %request.url,
                "sending partial request"
            );
            handle.advance(HandleState::Sent);

            let exchange = async {
                let response = builder
                    .send()
                    .await
                    .map_err(|err| TransportError::Network(err.to_string()))?;
                read_response(response).await
            };

            let raw = match timeout {
                Some(limit) => tokio::time::timeout(limit, exchange)
                    .await
                    .map_err(|_| TransportError::Timeout(limit))??,
                None => exchange.await?,
            };

            handle.finish(raw);
            Ok(handle)
        }
        .boxed()
    }
}

async fn read_response(response: reqwest::Response) -> Result<RawResponse, TransportError> {
    let status = response.status();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let body = response
        .text()
        .await
        .map_err(|err| TransportError::Network(err.to_string()))?;

    Ok(RawResponse {
        status: status.as_u16(),
        reason: status.canonical_reason().unwrap_or("").to_string(),
        content_type,
        body,
    })
}

fn multipart_form(payload: &SubmitPayload) -> Result<Form, TransportError> {
    let mut form = Form::new();
    for entry in payload.entries() {
        form = match &entry.value {
            FormValue::Text { value } => form.text(entry.name.clone(), value.clone()),
            FormValue::File {
                file_name,
                content_type,
                bytes,
            } => {
                let part = Part::bytes(bytes.clone())
                    .file_name(file_name.clone())
                    .mime_str(content_type)
                    .map_err(|err| TransportError::InvalidRequest(err.to_string()))?;
                form.part(entry.name.clone(), part)
            }
        };
    }
    Ok(form)
}
