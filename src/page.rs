//! The page-automation capability consumed by the solvers.
//!
//! The crate never talks to a browser directly. Callers supply an
//! implementation of [`Page`] (and its [`Frame`] handles) backed by whatever
//! automation engine they use; the solvers only rely on the small surface
//! declared here: frame enumeration, element queries, clicks and fills,
//! network observation, request interception, and a suspending wait.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::errors::AutomationError;
use crate::selector::Selector;

/// One network response observed on the page, delivered to the background
/// traffic listener.
#[derive(Debug, Clone)]
pub struct ResponseEvent {
    pub url: String,
    pub status: u16,
    /// Raw body bytes. Challenge payloads are images; verification responses
    /// are text. Shared so fan-out over the broadcast channel stays cheap.
    pub body: Arc<Vec<u8>>,
}

impl ResponseEvent {
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.into(),
            status,
            body: Arc::new(body.into()),
        }
    }

    /// The body interpreted as text, for verification-response parsing.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// An outbound request presented to the request guard before it is sent.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub url: String,
    pub body: Option<String>,
    pub headers: Vec<(String, String)>,
}

/// Verdict returned by a request guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestDisposition {
    /// Let the request reach the network. The default for every request.
    Allow,
    /// Abort the request before it is sent.
    Abort,
}

/// Callback inspecting outbound requests. Installed by the v3 solver's
/// token-leak suppression; implementations of [`Page`] must consult it for
/// every request while it is set.
pub type RequestGuard = Arc<dyn Fn(&OutboundRequest) -> RequestDisposition + Send + Sync>;

/// A sub-document attached to the page.
///
/// Queries on a detached frame may fail with [`AutomationError`]; the widget
/// layer guards every predicate with [`Frame::is_detached`] so detachment is
/// reported as a negative answer, never an error.
#[async_trait]
pub trait Frame: Send + Sync {
    fn url(&self) -> String;
    fn name(&self) -> String;
    fn is_detached(&self) -> bool;

    async fn is_visible(&self, selector: &Selector) -> Result<bool, AutomationError>;
    async fn is_checked(&self, selector: &Selector) -> Result<bool, AutomationError>;
    async fn is_enabled(&self, selector: &Selector) -> Result<bool, AutomationError>;
    async fn click(&self, selector: &Selector) -> Result<(), AutomationError>;
    async fn fill(&self, selector: &Selector, text: &str) -> Result<(), AutomationError>;
    /// The value of an attribute on the first matching element, or `None`
    /// when the attribute is absent.
    async fn attribute(
        &self,
        selector: &Selector,
        name: &str,
    ) -> Result<Option<String>, AutomationError>;
    /// The inner text of the first matching element.
    async fn inner_text(&self, selector: &Selector) -> Result<String, AutomationError>;
    /// How many elements match the selector.
    async fn count(&self, selector: &Selector) -> Result<usize, AutomationError>;
}

/// The page being driven.
#[async_trait]
pub trait Page: Send + Sync + 'static {
    /// All currently attached sub-documents, in frame-list order.
    fn frames(&self) -> Vec<Arc<dyn Frame>>;

    /// Suspend for the given duration without blocking callback delivery.
    async fn wait(&self, duration: Duration);

    /// Fetch a resource with the page's own network stack (cookies included),
    /// returning the raw body bytes.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AutomationError>;

    /// Subscribe to network responses produced by the page. Each subscriber
    /// receives every response observed after the call.
    fn response_events(&self) -> broadcast::Receiver<ResponseEvent>;

    /// Install or remove the outbound-request guard. Passing `None` restores
    /// the default pass-through behaviour.
    fn set_request_guard(&self, guard: Option<RequestGuard>);

    /// Evaluate a script in the top-level document and return its JSON
    /// result. Used only for token injection and tile-state resets.
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, AutomationError>;
}
