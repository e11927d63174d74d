//! Response-traffic classification and per-solve session state.
//!
//! A background listener task feeds every observed network response through
//! [`EndpointPatterns::classify`] and applies the result to the shared
//! [`Session`]. The listener is the only writer of the session's token and
//! payload fields; the solver's polling loops read them and clear them at
//! round boundaries. That single-writer contract is the whole concurrency
//! story, so a plain mutex is enough.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::debug;
use regex::Regex;
use tokio::task::JoinHandle;

use crate::page::{
    OutboundRequest, Page, RequestDisposition, RequestGuard, ResponseEvent,
};

/// A challenge-payload response captured for the current round.
#[derive(Debug, Clone)]
pub struct CapturedResponse {
    pub url: String,
    pub body: Arc<Vec<u8>>,
}

impl From<&ResponseEvent> for CapturedResponse {
    fn from(event: &ResponseEvent) -> Self {
        Self {
            url: event.url.clone(),
            body: Arc::clone(&event.body),
        }
    }
}

/// What one observed response means to the solve in progress.
#[derive(Debug, Clone)]
pub enum Classification {
    /// Not reCAPTCHA traffic, or reCAPTCHA traffic we do not care about.
    Irrelevant,
    /// The challenge payload for the current round.
    Payload(CapturedResponse),
    /// A verification response carrying the result token.
    Token(String),
    /// A verification response shaped like the other reCAPTCHA version.
    WrongVariant,
}

/// URL and body patterns for one widget variant's result protocol.
pub struct EndpointPatterns {
    payload: Regex,
    verify: Regex,
    token_marker: Regex,
    foreign_marker: Option<Regex>,
}

impl EndpointPatterns {
    /// Patterns for the interactive v2 widget: payload fetches plus
    /// `userverify` responses carrying the token behind the `uvresp` marker.
    pub fn v2() -> Self {
        Self {
            payload: Regex::new("/recaptcha/(api2|enterprise)/payload").expect("static pattern"),
            verify: Regex::new("/recaptcha/(api2|enterprise)/userverify").expect("static pattern"),
            token_marker: Regex::new("\"uvresp\",\"(.*?)\"").expect("static pattern"),
            foreign_marker: None,
        }
    }

    /// Patterns for the score-based v3 widget: `reload` responses carrying
    /// the token behind the `rresp` marker. A `uvresp`-shaped body means a
    /// v2 widget answered instead, which the v3 solver reports as a version
    /// mismatch.
    pub fn v3() -> Self {
        Self {
            payload: Regex::new("/recaptcha/(api2|enterprise)/payload").expect("static pattern"),
            verify: Regex::new("/recaptcha/(api2|enterprise)/reload").expect("static pattern"),
            token_marker: Regex::new("\"rresp\",\"(.*?)\"").expect("static pattern"),
            foreign_marker: Some(Regex::new("\"uvresp\",\"(.*?)\"").expect("static pattern")),
        }
    }

    /// Decide what a response means. A verification body that fails to parse
    /// is "no token found this time", never an error: the polling loop keeps
    /// waiting or eventually times out.
    pub fn classify(&self, event: &ResponseEvent) -> Classification {
        if self.payload.is_match(&event.url) {
            return Classification::Payload(CapturedResponse::from(event));
        }

        if self.verify.is_match(&event.url) {
            let text = event.text();

            if let Some(captures) = self.token_marker.captures(&text) {
                if let Some(token) = captures.get(1) {
                    return Classification::Token(token.as_str().to_string());
                }
            }

            if let Some(foreign) = &self.foreign_marker {
                if foreign.is_match(&text) {
                    return Classification::WrongVariant;
                }
            }
        }

        Classification::Irrelevant
    }
}

/// Per-solve ephemeral state, written by the listener and read by the solver.
#[derive(Debug, Default)]
pub struct Session {
    token: Option<String>,
    payload: Option<CapturedResponse>,
    wrong_variant: bool,
}

impl Session {
    /// Apply one classification result.
    ///
    /// Payload capture is first-match-wins until the solver clears it to arm
    /// the next round. Token capture is idempotent per round: once set, later
    /// captures are ignored until the session is reset.
    pub fn observe(&mut self, classification: Classification) {
        match classification {
            Classification::Irrelevant => {}
            Classification::Payload(response) => {
                if self.payload.is_none() {
                    debug!("captured challenge payload from {}", response.url);
                    self.payload = Some(response);
                }
            }
            Classification::Token(token) => {
                if self.token.is_none() {
                    debug!("captured verification token");
                    self.token = Some(token);
                }
            }
            Classification::WrongVariant => {
                self.wrong_variant = true;
            }
        }
    }

    pub fn token(&self) -> Option<String> {
        self.token.clone()
    }

    pub fn payload(&self) -> Option<CapturedResponse> {
        self.payload.clone()
    }

    pub fn wrong_variant(&self) -> bool {
        self.wrong_variant
    }

    /// Seed the payload slot directly, used when the challenge image was
    /// already on screen before the listener attached.
    pub fn seed_payload(&mut self, response: CapturedResponse) {
        if self.payload.is_none() {
            self.payload = Some(response);
        }
    }

    /// Discard the stale payload so the listener captures the next round's.
    pub fn clear_payload(&mut self) {
        self.payload = None;
    }

    /// Forget any token so the next verification response is authoritative.
    pub fn clear_token(&mut self) {
        self.token = None;
    }

    /// Reset everything at the start of a `solve()` call.
    pub fn reset(&mut self) {
        self.token = None;
        self.payload = None;
        self.wrong_variant = false;
    }
}

/// Shared handle to the session state.
pub type SharedSession = Arc<Mutex<Session>>;

pub fn shared_session() -> SharedSession {
    Arc::new(Mutex::new(Session::default()))
}

/// Lock the session, recovering from a poisoned mutex. The session holds no
/// invariants that a panicked writer could break mid-update.
pub fn lock_session(session: &SharedSession) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Spawn the background listener that classifies every page response into
/// the shared session. The task ends when the page's event channel closes;
/// the owning solver aborts it on close.
pub fn spawn_response_listener<P: Page>(
    page: &Arc<P>,
    patterns: EndpointPatterns,
    session: SharedSession,
) -> JoinHandle<()> {
    let mut events = page.response_events();

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let classification = patterns.classify(&event);
                    lock_session(&session).observe(classification);
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("response listener lagged, skipped {skipped} events");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Build the outbound-request guard that stops the hosting page from
/// redeeming the token before the caller consumes it. Requests pass through
/// unmodified until a token exists; afterwards any request carrying the
/// token in its URL, body, or headers is aborted.
pub fn token_leak_guard(session: SharedSession) -> RequestGuard {
    Arc::new(move |request: &OutboundRequest| {
        let token = match lock_session(&session).token() {
            Some(token) => token,
            None => return RequestDisposition::Allow,
        };

        let in_url = request.url.contains(&token);
        let in_body = request
            .body
            .as_deref()
            .is_some_and(|body| body.contains(&token));
        let in_headers = request
            .headers
            .iter()
            .any(|(_, value)| value.contains(&token));

        if in_url || in_body || in_headers {
            debug!("aborting outbound request leaking the token: {}", request.url);
            RequestDisposition::Abort
        } else {
            RequestDisposition::Allow
        }
    })
}
