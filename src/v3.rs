//! The passive reCAPTCHA v3 solver.
//!
//! v3 has no challenge UI: the page requests a score in the background and
//! the token travels in a `reload` response. The solver just watches traffic
//! until the token appears, and can optionally stop the page from redeeming
//! it before the caller does.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info};
use tokio::task::JoinHandle;

use crate::config::SolverConfig;
use crate::errors::Error;
use crate::page::Page;
use crate::traffic::{
    lock_session, shared_session, spawn_response_listener, token_leak_guard,
    EndpointPatterns, SharedSession,
};

pub struct RecaptchaV3Solver<P: Page> {
    page: Arc<P>,
    config: SolverConfig,
    session: SharedSession,
    listener: JoinHandle<()>,
    guard_installed: AtomicBool,
}

impl<P: Page> RecaptchaV3Solver<P> {
    pub fn new(page: Arc<P>) -> Self {
        let session = shared_session();
        let listener =
            spawn_response_listener(&page, EndpointPatterns::v3(), Arc::clone(&session));

        Self {
            page,
            config: SolverConfig::default(),
            session,
            listener,
            guard_installed: AtomicBool::new(false),
        }
    }

    pub fn with_config(mut self, config: SolverConfig) -> Self {
        self.config = config;
        self
    }

    /// Install the outbound-request guard that aborts any request carrying
    /// the captured token, so the page cannot redeem it before the caller.
    /// Removed again by [`close`](Self::close) or drop.
    pub fn block_token_requests(self) -> Self {
        self.page
            .set_request_guard(Some(token_leak_guard(Arc::clone(&self.session))));
        self.guard_installed.store(true, Ordering::Release);
        self
    }

    /// The most recently captured token, if any.
    pub fn token(&self) -> Option<String> {
        lock_session(&self.session).token()
    }

    /// Stop observing traffic and remove the request guard, if installed.
    /// Also performed on drop.
    pub fn close(&self) {
        self.listener.abort();

        if self.guard_installed.swap(false, Ordering::AcqRel) {
            self.page.set_request_guard(None);
        }
    }

    /// Wait for the page's own reCAPTCHA round trip to produce a token.
    ///
    /// Fails with [`Error::TimeoutExceeded`] when the deadline passes first,
    /// and with [`Error::VersionMismatch`] when the observed result traffic
    /// is shaped like the interactive v2 widget's.
    pub async fn solve(&self, timeout: Option<Duration>) -> Result<String, Error> {
        lock_session(&self.session).reset();

        let deadline = Instant::now() + timeout.unwrap_or(self.config.solve_timeout);
        debug!("waiting for a v3 token");

        loop {
            {
                let session = lock_session(&self.session);

                if session.wrong_variant() {
                    return Err(Error::VersionMismatch);
                }
                if let Some(token) = session.token() {
                    info!("captured v3 token");
                    return Ok(token);
                }
            }

            if Instant::now() >= deadline {
                return Err(Error::TimeoutExceeded);
            }

            self.page.wait(self.config.poll_interval).await;
        }
    }
}

impl<P: Page> Drop for RecaptchaV3Solver<P> {
    fn drop(&mut self) {
        self.close();
    }
}
