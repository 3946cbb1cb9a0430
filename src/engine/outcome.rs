use serde::Serialize;

use crate::listeners::AjaxError;
use crate::queue::{RequestId, RequestState};
use crate::response::MergeReport;
use crate::transport::TransportKind;

/// Final word on one request, handed to its completion callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestOutcome {
    pub id: RequestId,
    pub source: String,
    pub state: RequestState,
    pub transport: TransportKind,
    pub status: Option<u16>,
    pub report: Option<MergeReport>,
    pub errors: Vec<AjaxError>,
    pub redirect: Option<String>,
    /// Dropped because a newer response had already been merged.
    pub stale: bool,
}

impl RequestOutcome {
    pub(crate) fn new(id: RequestId, source: String, transport: TransportKind, state: RequestState) -> Self {
        Self {
            id,
            source,
            state,
            transport,
            status: None,
            report: None,
            errors: Vec::new(),
            redirect: None,
            stale: false,
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == RequestState::Completed && self.errors.is_empty() && !self.stale
    }
}
