use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::oneshot;
use url::Url;

use faces_ajax::config::AjaxConfig;
use faces_ajax::dom::{Document, FileBlob};
use faces_ajax::engine::{AjaxEngine, RequestError};
use faces_ajax::form::{FormError, RequestOptions};
use faces_ajax::listeners::{ErrorKind, EventStatus};
use faces_ajax::queue::{RequestId, RequestState};
use faces_ajax::transport::{
    OutgoingRequest, RawResponse, Transport, TransportError, TransportFuture, TransportHandle,
    TransportKind,
};

type Reply = Result<RawResponse, TransportError>;

/// Holds every request the engine sends until the test answers it.
#[derive(Clone, Default)]
struct ScriptedTransport {
    pending: Arc<Mutex<Vec<(OutgoingRequest, oneshot::Sender<Reply>)>>>,
}

impl ScriptedTransport {
    fn sent(&self) -> Vec<RequestId> {
        self.pending.lock().unwrap().iter().map(|(req, _)| req.id).collect()
    }

    fn request(&self, id: RequestId) -> OutgoingRequest {
        let pending = self.pending.lock().unwrap();
        pending.iter().find(|(req, _)| req.id == id).unwrap().0.clone()
    }

    fn reply(&self, id: RequestId, reply: Reply) {
        let mut pending = self.pending.lock().unwrap();
        let position = pending.iter().position(|(req, _)| req.id == id).unwrap();
        let (_, tx) = pending.remove(position);
        let _ = tx.send(reply);
    }

    fn ok(&self, id: RequestId, body: &str) {
        self.reply(id, Ok(response(200, body)));
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: OutgoingRequest) -> TransportFuture {
        let (tx, rx) = oneshot::channel();
        let (id, kind, timeout) = (request.id, request.kind, request.timeout);
        self.pending.lock().unwrap().push((request, tx));
        async move {
            let reply = rx
                .await
                .map_err(|_| TransportError::Network("dropped".into()))??;
            let mut handle = TransportHandle::new(id, kind, timeout);
            handle.finish(reply);
            Ok(handle)
        }
        .boxed()
    }
}

fn response(status: u16, body: &str) -> RawResponse {
    RawResponse {
        status,
        reason: if status == 200 { "OK".into() } else { "Internal Server Error".into() },
        content_type: Some("text/xml".into()),
        body: body.into(),
    }
}

fn partial(changes: &str) -> String {
    format!(r#"<?xml version="1.0" encoding="UTF-8"?><partial-response id="j_id1"><changes>{changes}</changes></partial-response>"#)
}

const PAGE: &str = r#"<html><head><title>t</title></head><body>
<form id="f" action="page.xhtml" method="post">
  <input type="hidden" name="f" value="f">
  <input type="text" id="f:name" name="f:name" value="Ann">
  <input type="hidden" name="javax.faces.ViewState" id="j_id1:javax.faces.ViewState:0" value="vs-1">
  <button id="f:go" name="f:go" value="go">Go</button>
  <button id="f:other" name="f:other">Other</button>
</form>
<div id="out">old</div>
<ul id="list"><li id="a">a</li></ul>
</body></html>"#;

fn engine_with(config: AjaxConfig) -> (AjaxEngine<ScriptedTransport>, ScriptedTransport) {
    let document = Document::parse_with_base(PAGE, Url::parse("http://localhost/app/").unwrap());
    let transport = ScriptedTransport::default();
    (AjaxEngine::new(document, transport.clone(), config), transport)
}

fn go() -> RequestOptions {
    RequestOptions::new("f:go").execute("@form").render("out")
}

#[tokio::test]
async fn successful_request_merges_and_reports() {
    let (mut engine, transport) = engine_with(AjaxConfig::default());
    let events = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::clone(&events);
    engine
        .listeners_mut()
        .add_event_listener(move |event| seen.borrow_mut().push(event.status));

    let id = engine.request(go()).unwrap();
    let sent = transport.request(id);
    assert_eq!(sent.kind, TransportKind::Xhr1);
    assert_eq!(sent.url.as_str(), "http://localhost/app/page.xhtml");
    assert_eq!(sent.payload.get("javax.faces.source"), Some("f:go"));
    assert_eq!(sent.payload.get("javax.faces.partial.ajax"), Some("true"));
    assert_eq!(sent.payload.get("javax.faces.partial.execute"), Some("f"));
    assert_eq!(sent.payload.get("javax.faces.partial.render"), Some("out"));
    assert_eq!(sent.payload.get("f:name"), Some("Ann"));
    assert_eq!(sent.payload.get("f:go"), Some("go"));
    assert!(!sent.payload.contains("f:other"));

    transport.ok(
        id,
        &partial(
            r#"<update id="out"><![CDATA[<span>new</span>]]></update><update id="j_id1:javax.faces.ViewState:0"><![CDATA[vs-2]]></update>"#,
        ),
    );
    let outcome = engine.next_outcome().await.unwrap();

    assert!(outcome.is_success(), "{outcome:?}");
    assert_eq!(outcome.state, RequestState::Completed);
    assert_eq!(outcome.status, Some(200));
    assert_eq!(engine.document().inner_html("out").as_deref(), Some("<span>new</span>"));
    assert!(engine.document().to_html().contains(r#"value="vs-2""#));
    assert_eq!(
        *events.borrow(),
        vec![EventStatus::Begin, EventStatus::Complete, EventStatus::Success]
    );
    assert!(engine.next_outcome().await.is_none());
}

#[tokio::test]
async fn default_config_sends_one_request_at_a_time() {
    let (mut engine, transport) = engine_with(AjaxConfig::default());

    let first = engine.request(go()).unwrap();
    let second = engine.request(go()).unwrap();
    let third = engine.request(go()).unwrap();
    assert_eq!(transport.sent(), vec![first]);
    assert_eq!(engine.state(second), Some(RequestState::Queued));

    transport.ok(first, &partial(""));
    assert_eq!(engine.next_outcome().await.unwrap().id, first);
    assert_eq!(transport.sent(), vec![second]);

    transport.ok(second, &partial(""));
    engine.next_outcome().await.unwrap();
    transport.ok(third, &partial(""));
    let outcome = engine.next_outcome().await.unwrap();
    assert_eq!(outcome.id, third);
    assert!(engine.is_idle());
}

#[tokio::test]
async fn concurrent_requests_complete_out_of_order() {
    let config = AjaxConfig {
        max_concurrency: 2,
        ..AjaxConfig::default()
    };
    let (mut engine, transport) = engine_with(config);

    let ids: Vec<RequestId> = (0..5).map(|_| engine.request(go()).unwrap()).collect();
    assert_eq!(transport.sent(), ids[..2].to_vec());
    assert_eq!(engine.queue().waiting_len(), 3);

    // the second answers first and frees its slot for the third
    transport.ok(ids[1], &partial(r#"<update id="out">two</update>"#));
    assert_eq!(engine.next_outcome().await.unwrap().id, ids[1]);
    assert_eq!(transport.sent(), vec![ids[0], ids[2]]);

    transport.ok(ids[0], &partial(r#"<update id="out">one</update>"#));
    assert_eq!(engine.next_outcome().await.unwrap().id, ids[0]);
    // without the stale guard the last merged response wins
    assert_eq!(engine.document().inner_html("out").as_deref(), Some("one"));

    for id in &ids[2..] {
        transport.ok(*id, &partial(""));
        engine.next_outcome().await.unwrap();
        assert!(engine.queue().dispatched_len() <= 2);
    }
    assert!(engine.is_idle());
}

#[tokio::test]
async fn stale_guard_discards_older_responses() {
    let config = AjaxConfig {
        max_concurrency: 2,
        discard_stale_responses: true,
        ..AjaxConfig::default()
    };
    let (mut engine, transport) = engine_with(config);
    let older = engine.request(go()).unwrap();
    let newer = engine.request(go()).unwrap();

    transport.ok(newer, &partial(r#"<update id="out">newer</update>"#));
    assert!(engine.next_outcome().await.unwrap().is_success());
    transport.ok(older, &partial(r#"<update id="out">older</update>"#));
    let outcome = engine.next_outcome().await.unwrap();

    assert!(outcome.stale);
    assert!(outcome.report.is_none());
    assert_eq!(engine.document().inner_html("out").as_deref(), Some("newer"));
}

#[tokio::test]
async fn failures_free_the_slot() {
    let (mut engine, transport) = engine_with(AjaxConfig::default());
    let errors = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::clone(&errors);
    engine
        .listeners_mut()
        .add_error_listener(move |error| seen.borrow_mut().push((error.kind, error.message.clone())));

    let failing = engine.request(go()).unwrap();
    let next = engine.request(go()).unwrap();
    transport.reply(failing, Ok(response(500, "boom")));
    let outcome = engine.next_outcome().await.unwrap();

    assert_eq!(outcome.state, RequestState::Completed);
    assert!(!outcome.is_success());
    assert_eq!(
        *errors.borrow(),
        vec![(
            ErrorKind::HttpError,
            "Request failed with status 500 and reason Internal Server Error".to_string()
        )]
    );
    assert_eq!(transport.sent(), vec![next]);
}

#[tokio::test]
async fn timeouts_end_as_timed_out() {
    let (mut engine, transport) = engine_with(AjaxConfig::default());
    let id = engine
        .request(go().timeout(Duration::from_millis(10)))
        .unwrap();
    assert_eq!(transport.request(id).timeout, Some(Duration::from_millis(10)));

    transport.reply(id, Err(TransportError::Timeout(Duration::from_millis(10))));
    let outcome = engine.next_outcome().await.unwrap();
    assert_eq!(outcome.state, RequestState::TimedOut);
    assert_eq!(outcome.errors[0].kind, ErrorKind::Timeout);
    assert!(engine.is_idle());
}

#[tokio::test]
async fn malformed_response_leaves_document_untouched() {
    let (mut engine, transport) = engine_with(AjaxConfig::default());
    let before = engine.document().to_html();
    let id = engine.request(go()).unwrap();

    transport.ok(id, "<html><body><p>Error&nbsp;500<br></body></html>");
    let outcome = engine.next_outcome().await.unwrap();

    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].kind, ErrorKind::MalformedXml);
    assert_eq!(outcome.errors[0].message_key, "ERR_MALFORMEDXML");
    assert_eq!(engine.document().to_html(), before);
}

#[tokio::test]
async fn empty_response_is_reported() {
    let (mut engine, transport) = engine_with(AjaxConfig::default());
    let id = engine.request(go()).unwrap();
    transport.ok(id, "   ");
    let outcome = engine.next_outcome().await.unwrap();
    assert_eq!(outcome.errors[0].kind, ErrorKind::EmptyResponse);
}

#[tokio::test]
async fn missing_targets_are_reported_but_the_rest_applies() {
    let (mut engine, transport) = engine_with(AjaxConfig::default());
    let id = engine.request(go()).unwrap();

    transport.ok(
        id,
        &partial(
            r#"<insert><before id="nope"><![CDATA[<p>x</p>]]></before></insert><delete id="gone"/><insert><after id="a"><![CDATA[<li id="b">b</li>]]></after></insert>"#,
        ),
    );
    let outcome = engine.next_outcome().await.unwrap();

    let keys: Vec<&str> = outcome.errors.iter().map(|e| e.message_key.as_str()).collect();
    assert_eq!(keys, vec!["ERR_PPR_INSERTBEFID", "ERR_ITEM_ID_NOTFOUND"]);
    assert!(outcome.errors.iter().all(|e| e.kind == ErrorKind::ElementNotFound));
    assert_eq!(
        engine.document().inner_html("list").as_deref(),
        Some(r#"<li id="a">a</li><li id="b">b</li>"#)
    );
}

#[tokio::test]
async fn server_errors_and_redirects_surface_in_the_outcome() {
    let (mut engine, transport) = engine_with(AjaxConfig::default());
    let first = engine.request(go()).unwrap();
    transport.ok(
        first,
        r#"<partial-response><error><error-name>java.lang.IllegalStateException</error-name><error-message><![CDATA[bad state]]></error-message></error></partial-response>"#,
    );
    let outcome = engine.next_outcome().await.unwrap();
    assert_eq!(outcome.errors[0].kind, ErrorKind::ServerError);
    assert_eq!(
        outcome.errors[0].server_name.as_deref(),
        Some("java.lang.IllegalStateException")
    );

    let second = engine.request(go()).unwrap();
    transport.ok(second, r#"<partial-response><redirect url="done.xhtml"/></partial-response>"#);
    let outcome = engine.next_outcome().await.unwrap();
    assert_eq!(outcome.redirect.as_deref(), Some("http://localhost/app/done.xhtml"));
}

#[tokio::test]
async fn abort_frees_waiting_and_in_flight_requests() {
    let (mut engine, transport) = engine_with(AjaxConfig::default());
    let completed = Rc::new(RefCell::new(Vec::new()));

    let mut ids = Vec::new();
    for _ in 0..3 {
        let seen = Rc::clone(&completed);
        let options = go().on_complete(move |outcome| seen.borrow_mut().push((outcome.id, outcome.state)));
        ids.push(engine.request(options).unwrap());
    }

    assert!(engine.abort(ids[1]));
    assert!(engine.abort(ids[0]));
    assert!(!engine.abort(RequestId(99)));
    assert_eq!(transport.sent(), vec![ids[0], ids[2]]);

    transport.ok(ids[2], &partial(""));
    let outcomes = engine.run_until_idle().await;
    let states: Vec<_> = outcomes.iter().map(|o| (o.id, o.state)).collect();
    assert_eq!(
        states,
        vec![
            (ids[1], RequestState::Aborted),
            (ids[0], RequestState::Aborted),
            (ids[2], RequestState::Completed),
        ]
    );
    assert_eq!(*completed.borrow(), states);
}

#[tokio::test]
async fn full_wait_list_drops_the_oldest() {
    let config = AjaxConfig {
        max_waiting: Some(1),
        ..AjaxConfig::default()
    };
    let (mut engine, transport) = engine_with(config);
    let first = engine.request(go()).unwrap();
    let dropped = engine.request(go()).unwrap();
    let kept = engine.request(go()).unwrap();

    let outcome = engine.next_outcome().await.unwrap();
    assert_eq!((outcome.id, outcome.state), (dropped, RequestState::Aborted));

    transport.ok(first, &partial(""));
    engine.next_outcome().await.unwrap();
    assert_eq!(transport.sent(), vec![kept]);
}

#[tokio::test]
async fn partial_submit_only_sends_executed_fields() {
    let config = AjaxConfig {
        partial_submit: true,
        ..AjaxConfig::default()
    };
    let (mut engine, transport) = engine_with(config);
    let id = engine
        .request(RequestOptions::new("f:go").execute("f:go"))
        .unwrap();
    let payload = transport.request(id).payload;

    assert!(!payload.contains("f:name"));
    assert_eq!(payload.get("javax.faces.ViewState"), Some("vs-1"));
    assert_eq!(payload.get("f"), Some("f"));
}

#[tokio::test]
async fn unknown_source_fails_synchronously() {
    let (mut engine, transport) = engine_with(AjaxConfig::default());
    let result = engine.request(RequestOptions::new("missing"));
    assert!(matches!(
        result,
        Err(RequestError::Form(FormError::ElementNotFound(id))) if id == "missing"
    ));
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn file_inputs_need_a_capable_transport() {
    let html = r#"<form id="up" action="upload"><input type="file" id="up:file" name="up:file"><button id="up:go" name="up:go">Send</button></form>"#;
    let base = Url::parse("http://localhost/").unwrap();

    let with_file = || {
        let mut document = Document::parse_with_base(html, base.clone());
        document.attach_file("up:file", FileBlob::new("a.txt", "text/plain", b"hi".to_vec()));
        document
    };

    let transport = ScriptedTransport::default();
    let mut engine = AjaxEngine::new(with_file(), transport.clone(), AjaxConfig::default());
    let id = engine.request(RequestOptions::new("up:go")).unwrap();
    assert_eq!(transport.request(id).kind, TransportKind::Xhr2);

    let config = AjaxConfig {
        xhr_level: 1,
        iframe: false,
        ..AjaxConfig::default()
    };
    let mut engine = AjaxEngine::new(with_file(), ScriptedTransport::default(), config);
    assert!(matches!(
        engine.request(RequestOptions::new("up:go")),
        Err(RequestError::Transport(TransportError::NoTransport))
    ));
}

#[tokio::test]
async fn shutdown_aborts_everything() {
    let (mut engine, transport) = engine_with(AjaxConfig::default());
    engine.request(go()).unwrap();
    engine.request(go()).unwrap();

    let outcomes = engine.shutdown();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.state == RequestState::Aborted));
    assert!(engine.is_idle());
    assert!(engine.next_outcome().await.is_none());
    drop(transport);
}

#[tokio::test]
async fn table_rows_render_through_the_engine() {
    let html = r#"<form id="t" action="grid"><table><tbody id="rows"><tr id="t:r1"><td>1</td><td><button id="t:edit" name="t:edit">edit</button></td></tr></tbody></table></form>"#;
    let transport = ScriptedTransport::default();
    let mut engine = AjaxEngine::new(
        Document::parse_with_base(html, Url::parse("http://localhost/").unwrap()),
        transport.clone(),
        AjaxConfig::default(),
    );

    let id = engine
        .request(RequestOptions::new("t:edit").render("t:r1"))
        .unwrap();
    transport.ok(
        id,
        &partial(
            r#"<update id="t:r1"><![CDATA[<tr id="t:r1"><td>one</td><td>saved</td></tr>]]></update><insert><after id="t:r1"><![CDATA[<tr id="t:r2"><td>2</td></tr>]]></after></insert>"#,
        ),
    );
    let outcome = engine.next_outcome().await.unwrap();

    assert!(outcome.is_success(), "{outcome:?}");
    assert_eq!(
        engine.document().inner_html("rows").as_deref(),
        Some(r#"<tr id="t:r1"><td>one</td><td>saved</td></tr><tr id="t:r2"><td>2</td></tr>"#)
    );
}
