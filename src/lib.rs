// Library exports for the binary and integration tests

pub mod config;
pub mod dom;
pub mod engine;
pub mod form;
pub mod i18n;
pub mod input;
pub mod listeners;
pub mod navigation;
pub mod queue;
pub mod response;
pub mod transport;

// Re-export commonly used types for tests
pub use config::AjaxConfig;
pub use dom::Document;
pub use engine::{AjaxEngine, RequestError, RequestOutcome};
pub use form::RequestOptions;
pub use queue::{RequestId, RequestState};
