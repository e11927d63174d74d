//! The interactive reCAPTCHA v2 solver.
//!
//! Drives a located widget through the checkbox shortcut and the grid or
//! audio challenge until a verification token is captured, within a bounded
//! attempt budget. The solver owns a background traffic listener; all widget
//! interaction happens through the [`Page`] capability.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info};
use rand::Rng;
use tokio::task::JoinHandle;

use crate::classify::{CapSolver, TileClassifier};
use crate::config::SolverConfig;
use crate::errors::Error;
use crate::page::Page;
use crate::selector::Selector;
use crate::speech::{AudioClip, SpeechTranscriber};
use crate::traffic::{
    lock_session, shared_session, spawn_response_listener, CapturedResponse,
    EndpointPatterns, SharedSession,
};
use crate::translations;
use crate::widget::RecaptchaBox;

/// Per-call options for [`RecaptchaV2Solver::solve`].
#[derive(Debug, Clone, Default)]
pub struct SolveOptions {
    /// Override the configured attempt budget.
    pub attempts: Option<u32>,
    /// Keep retrying widget discovery while the widget is absent.
    pub wait: bool,
    /// Override the configured discovery deadline. Only used with `wait`.
    pub wait_timeout: Option<Duration>,
    /// Solve the grid challenge instead of the audio challenge.
    pub image_challenge: bool,
}

impl SolveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    pub fn wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }

    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = Some(timeout);
        self
    }

    pub fn image_challenge(mut self, image_challenge: bool) -> Self {
        self.image_challenge = image_challenge;
        self
    }
}

/// How a submitted grid answer was resolved.
enum RoundOutcome {
    /// A new round is already on screen; loop back to payload capture.
    FreshRound,
    /// The widget left challenge mode, one way or another.
    Resolved,
}

/// Solver for the interactive (checkbox) reCAPTCHA v2 widget.
///
/// The solver spawns a response listener on construction and keeps it until
/// [`close`](Self::close) or drop, so tokens arriving between `solve` calls
/// are still observed.
pub struct RecaptchaV2Solver<P: Page> {
    page: Arc<P>,
    config: SolverConfig,
    classifier: Option<Arc<dyn TileClassifier>>,
    transcriber: Arc<dyn SpeechTranscriber>,
    session: SharedSession,
    listener: JoinHandle<()>,
}

impl<P: Page> RecaptchaV2Solver<P> {
    /// Create a solver for `page`. Audio is the default modality, so a
    /// transcriber is always required; a grid classifier is attached with
    /// [`with_classifier`](Self::with_classifier) or built from the
    /// configured CapSolver credential on demand.
    pub fn new(page: Arc<P>, transcriber: Arc<dyn SpeechTranscriber>) -> Self {
        let session = shared_session();
        let listener =
            spawn_response_listener(&page, EndpointPatterns::v2(), Arc::clone(&session));

        Self {
            page,
            config: SolverConfig::default(),
            classifier: None,
            transcriber,
            session,
            listener,
        }
    }

    pub fn with_config(mut self, config: SolverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn TileClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// The token captured by the most recent verification response, if any.
    pub fn token(&self) -> Option<String> {
        lock_session(&self.session).token()
    }

    /// Whether an unchecked checkbox or an active challenge is on the page.
    pub async fn recaptcha_is_visible(&self) -> Result<bool, Error> {
        match RecaptchaBox::from_frames(self.page.frames()).await {
            Ok(_) => Ok(true),
            Err(Error::NotFound) | Err(Error::NoAvailableInstance) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Stop observing page traffic. Also performed on drop.
    pub fn close(&self) {
        self.listener.abort();
    }

    /// Solve the reCAPTCHA and return the `g-recaptcha-response` token.
    pub async fn solve(&self, options: SolveOptions) -> Result<String, Error> {
        let classifier = if options.image_challenge {
            Some(self.resolve_classifier()?)
        } else {
            None
        };

        lock_session(&self.session).reset();

        let wait_timeout = options.wait_timeout.unwrap_or(self.config.wait_timeout);
        let recaptcha = self.locate(options.wait, wait_timeout).await?;
        debug!("located widget: {recaptcha:?}");

        if recaptcha.checkbox_is_visible().await? {
            self.click_checkbox(&recaptcha).await?;

            if let Some(token) = self.token() {
                info!("solved by checkbox click alone");
                return Ok(token);
            }
        } else if recaptcha.rate_limit_is_visible().await? {
            return Err(Error::RateLimitExceeded);
        }

        self.enter_modality(&recaptcha, options.image_challenge).await?;

        let attempts = options.attempts.unwrap_or(self.config.attempts);

        for attempt in 0..attempts {
            debug!("solve attempt {} of {attempts}", attempt + 1);
            lock_session(&self.session).clear_token();

            match &classifier {
                Some(classifier) => {
                    self.solve_image_challenge(&recaptcha, classifier.as_ref())
                        .await?
                }
                None => self.solve_audio_challenge(&recaptcha).await?,
            }

            if recaptcha.frames_are_detached()
                || !recaptcha.challenge_is_visible().await?
                || recaptcha.challenge_is_solved().await?
            {
                return self.await_token(&recaptcha).await;
            }

            if classifier.is_none() {
                recaptcha
                    .bframe()
                    .click(&recaptcha.new_challenge_button())
                    .await?;
            }
        }

        Err(Error::SolveFailed)
    }

    /// Write a pre-obtained token into the widget's hidden response field and
    /// dispatch the page's own callback. The script marks the dispatch on the
    /// page, so repeated injections fire the callback only once.
    pub async fn inject_token(&self, token: &str, wait: bool) -> Result<(), Error> {
        let script = token_injection_script(token);

        if !wait {
            return if self.page.evaluate(&script).await?.as_bool() == Some(true) {
                Ok(())
            } else {
                Err(Error::NotFound)
            };
        }

        let deadline = Instant::now() + self.config.wait_timeout;

        loop {
            if self.page.evaluate(&script).await?.as_bool() == Some(true) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::NotFound);
            }
            self.page.wait(self.config.poll_interval).await;
        }
    }

    fn resolve_classifier(&self) -> Result<Arc<dyn TileClassifier>, Error> {
        if let Some(classifier) = &self.classifier {
            return Ok(Arc::clone(classifier));
        }

        match &self.config.capsolver_api_key {
            Some(key) => Ok(Arc::new(CapSolver::new(key.clone()))),
            None => Err(Error::MissingApiKey),
        }
    }

    /// Locate the widget, optionally retrying while it is absent. Only the
    /// "no frame pair yet" condition is retried; a non-actionable widget is
    /// reported immediately.
    async fn locate(&self, wait: bool, wait_timeout: Duration) -> Result<RecaptchaBox, Error> {
        if !wait {
            return RecaptchaBox::from_frames(self.page.frames()).await;
        }

        let deadline = Instant::now() + wait_timeout;

        loop {
            match RecaptchaBox::from_frames(self.page.frames()).await {
                Err(err) if err.is_not_found() && Instant::now() < deadline => {
                    self.page.wait(self.config.poll_interval).await;
                }
                other => return other,
            }
        }
    }

    /// Click the checkbox and wait for the widget to commit: an immediate
    /// token (invisible variant), a visible challenge, or a rate limit.
    async fn click_checkbox(&self, recaptcha: &RecaptchaBox) -> Result<(), Error> {
        self.pace(true).await;
        recaptcha.anchor().click(&recaptcha.checkbox()).await?;

        let deadline = Instant::now() + self.config.token_timeout;

        while recaptcha.frames_are_attached() && Instant::now() < deadline {
            if self.token().is_some() {
                return Ok(());
            }
            if recaptcha.rate_limit_is_visible().await? {
                return Err(Error::RateLimitExceeded);
            }
            if recaptcha.challenge_is_visible().await? {
                return Ok(());
            }
            self.page.wait(self.config.poll_interval).await;
        }

        Ok(())
    }

    /// Switch the challenge UI into the requested modality and, for grid
    /// mode, seed the payload slot from the image already on screen if the
    /// listener attached too late to capture it.
    async fn enter_modality(
        &self,
        recaptcha: &RecaptchaBox,
        image_challenge: bool,
    ) -> Result<(), Error> {
        if image_challenge {
            if recaptcha.image_button_is_usable().await? {
                recaptcha
                    .bframe()
                    .click(&recaptcha.image_challenge_button())
                    .await?;
            }

            if lock_session(&self.session).payload().is_none() {
                let image = recaptcha.image_challenge().within(Selector::css("img"));

                if let Some(url) = recaptcha.bframe().attribute(&image, "src").await? {
                    let body = self.page.fetch(&url).await?;
                    lock_session(&self.session).seed_payload(CapturedResponse {
                        url,
                        body: Arc::new(body),
                    });
                }
            }
        } else if recaptcha.audio_button_is_usable().await? {
            recaptcha
                .bframe()
                .click(&recaptcha.audio_challenge_button())
                .await?;
        }

        Ok(())
    }

    /// Bounded poll for the token once the round loop has ended.
    async fn await_token(&self, recaptcha: &RecaptchaBox) -> Result<String, Error> {
        let deadline = Instant::now() + self.config.token_timeout;

        loop {
            if let Some(token) = self.token() {
                info!("captured verification token");
                return Ok(token);
            }
            if recaptcha.rate_limit_is_visible().await? {
                return Err(Error::RateLimitExceeded);
            }
            if Instant::now() >= deadline {
                debug!(
                    "round ended (detached: {}) but no token arrived",
                    recaptcha.frames_are_detached()
                );
                return Err(Error::SolveFailed);
            }
            self.page.wait(self.config.poll_interval).await;
        }
    }

    // Grid modality.

    async fn solve_image_challenge(
        &self,
        recaptcha: &RecaptchaBox,
        classifier: &dyn TileClassifier,
    ) -> Result<(), Error> {
        while recaptcha.frames_are_attached() {
            if recaptcha.rate_limit_is_visible().await? {
                return Err(Error::RateLimitExceeded);
            }

            let payload = match self.wait_for_payload(recaptcha).await? {
                Some(payload) => payload,
                None => return Ok(()),
            };

            self.pace(true).await;

            let instructions = recaptcha.challenge_instruction_text().await?;
            let category = translations::object_id_for_instructions(&instructions);

            let cells = match category {
                Some(mid) => {
                    let classification = classifier.classify(&payload.body, mid).await?;
                    let tile_count = recaptcha.tile_count().await?;

                    let mut cells = classification.cells;
                    let nominated = cells.len();
                    cells.retain(|&index| index < tile_count);

                    if cells.len() < nominated {
                        debug!(
                            "dropped {} cells outside the {tile_count}-tile grid",
                            nominated - cells.len()
                        );
                    }

                    if cells.is_empty() {
                        None
                    } else {
                        Some((mid, cells))
                    }
                }
                None => {
                    debug!("unrecognized challenge instruction: {instructions:?}");
                    None
                }
            };

            let (mid, cells) = match cells {
                Some(matched) => matched,
                None => {
                    self.request_new_round(recaptcha).await?;
                    continue;
                }
            };

            self.solve_tiles(recaptcha, &cells, classifier, mid).await?;
            self.pace(true).await;
            lock_session(&self.session).clear_payload();

            // Multi-step challenge: advance and loop back to payload capture.
            let mut advanced = false;

            for selector in [recaptcha.next_button(), recaptcha.skip_button()] {
                if recaptcha.frames_are_detached() {
                    return Ok(());
                }
                if recaptcha.bframe().is_visible(&selector).await? {
                    recaptcha.bframe().click(&selector).await?;
                    advanced = true;
                    break;
                }
            }

            if advanced {
                continue;
            }

            match self.submit_tile_answers(recaptcha).await? {
                RoundOutcome::FreshRound => continue,
                RoundOutcome::Resolved => return Ok(()),
            }
        }

        Ok(())
    }

    /// Wait for the listener to capture the round's challenge payload.
    /// Returns `None` when the widget leaves challenge mode instead.
    async fn wait_for_payload(
        &self,
        recaptcha: &RecaptchaBox,
    ) -> Result<Option<CapturedResponse>, Error> {
        loop {
            if let Some(payload) = lock_session(&self.session).payload() {
                return Ok(Some(payload));
            }

            if recaptcha.rate_limit_is_visible().await? {
                return Err(Error::RateLimitExceeded);
            }

            if recaptcha.frames_are_detached()
                || !recaptcha.challenge_is_visible().await?
                || recaptcha.challenge_is_solved().await?
            {
                return Ok(None);
            }

            self.page.wait(self.config.poll_interval).await;
        }
    }

    /// Discard the stale payload and ask for a fresh round.
    async fn request_new_round(&self, recaptcha: &RecaptchaBox) -> Result<(), Error> {
        lock_session(&self.session).clear_payload();

        if recaptcha.frames_are_attached() {
            recaptcha
                .bframe()
                .click(&recaptcha.new_challenge_button())
                .await?;
        }

        Ok(())
    }

    /// Click the matched cells, then babysit tiles that dynamically replace
    /// their image after selection: re-classify each replacement and click
    /// again while it still matches, within a wall-clock ceiling.
    async fn solve_tiles(
        &self,
        recaptcha: &RecaptchaBox,
        cells: &[usize],
        classifier: &dyn TileClassifier,
        category: &str,
    ) -> Result<(), Error> {
        let mut changing = Vec::new();

        for &index in cells {
            if recaptcha.frames_are_detached() {
                return Ok(());
            }

            recaptcha.bframe().click(&recaptcha.tile(index)).await?;

            if recaptcha.tile_is_refreshing(index).await? {
                changing.push(index);
            }

            self.pace(true).await;
        }

        let deadline = Instant::now() + self.config.tile_settle_ceiling;

        while !changing.is_empty()
            && recaptcha.frames_are_attached()
            && Instant::now() < deadline
        {
            let mut settled = Vec::new();

            for (position, &index) in changing.iter().enumerate() {
                // Still mid-replacement; check again next pass.
                if recaptcha.tile_is_refreshing(index).await? {
                    continue;
                }

                let url = match recaptcha.tile_image_url(index).await? {
                    Some(url) => url,
                    None => {
                        settled.push(position);
                        continue;
                    }
                };

                let image = self.page.fetch(&url).await?;
                let classification = classifier.classify(&image, category).await?;

                if classification.has_object {
                    self.pace(true).await;
                    recaptcha.bframe().click(&recaptcha.tile(index)).await?;
                } else {
                    settled.push(position);
                }
            }

            for position in settled.into_iter().rev() {
                changing.remove(position);
            }

            if !changing.is_empty() {
                self.page.wait(self.config.poll_interval).await;
            }
        }

        if !changing.is_empty() {
            debug!("gave up on {} tiles that never settled", changing.len());
        }

        Ok(())
    }

    /// Submit the grid answer and watch how the widget resolves it.
    async fn submit_tile_answers(&self, recaptcha: &RecaptchaBox) -> Result<RoundOutcome, Error> {
        recaptcha.bframe().click(&recaptcha.verify_button()).await?;

        while recaptcha.frames_are_attached() {
            if recaptcha.rate_limit_is_visible().await? {
                return Err(Error::RateLimitExceeded);
            }

            if recaptcha.challenge_is_solved().await?
                || recaptcha.try_again_is_visible().await?
                || !recaptcha.challenge_is_visible().await?
            {
                return Ok(RoundOutcome::Resolved);
            }

            // The widget already loaded a fresh round behind the banner.
            if recaptcha.check_new_images_is_visible().await?
                || recaptcha.select_all_matching_is_visible().await?
            {
                lock_session(&self.session).clear_payload();
                return Ok(RoundOutcome::FreshRound);
            }

            self.page.wait(self.config.poll_interval).await;
        }

        Ok(RoundOutcome::Resolved)
    }

    // Audio modality.

    async fn solve_audio_challenge(&self, recaptcha: &RecaptchaBox) -> Result<(), Error> {
        self.pace(false).await;

        let locale = recaptcha.locale().unwrap_or_default();
        let language = translations::audio_language(&locale);

        // Transcription failures are retried with fresh challenges without
        // limit here; the caller's attempt budget bounds the total cost.
        loop {
            if recaptcha.frames_are_detached() {
                return Ok(());
            }

            let url = match self.audio_url(recaptcha).await? {
                Some(url) => url,
                None => return Ok(()),
            };

            let bytes = self.page.fetch(&url).await?;

            let transcript = match AudioClip::decode(&bytes) {
                Ok(clip) => {
                    debug!("decoded {:.1}s of challenge audio", clip.duration_secs());
                    self.transcriber.transcribe(&clip, language).await?
                }
                Err(_) => None,
            };

            match transcript {
                Some(text) => {
                    self.pace(false).await;
                    return self.submit_audio_text(recaptcha, &text).await;
                }
                None => {
                    debug!("no transcript, fetching a new audio challenge");
                    self.request_new_round(recaptcha).await?;
                }
            }
        }
    }

    /// Wait for the audio UI and read the download link. Returns `None` when
    /// the widget leaves challenge mode while waiting.
    async fn audio_url(&self, recaptcha: &RecaptchaBox) -> Result<Option<String>, Error> {
        loop {
            if recaptcha.frames_are_detached() {
                return Ok(None);
            }
            if recaptcha.rate_limit_is_visible().await? {
                return Err(Error::RateLimitExceeded);
            }

            if recaptcha.audio_challenge_is_visible().await? {
                if let Some(url) = recaptcha
                    .bframe()
                    .attribute(&recaptcha.audio_download_link(), "href")
                    .await?
                {
                    return Ok(Some(url));
                }
            }

            if recaptcha.challenge_is_solved().await? {
                return Ok(None);
            }

            self.page.wait(self.config.poll_interval).await;
        }
    }

    /// Fill the answer and submit it, then wait for the widget to resolve
    /// the round one way or another.
    async fn submit_audio_text(&self, recaptcha: &RecaptchaBox, text: &str) -> Result<(), Error> {
        recaptcha
            .bframe()
            .fill(&recaptcha.audio_answer_textbox(), text)
            .await?;
        recaptcha.bframe().click(&recaptcha.verify_button()).await?;

        while recaptcha.frames_are_attached() {
            if recaptcha.rate_limit_is_visible().await? {
                return Err(Error::RateLimitExceeded);
            }

            if !recaptcha.challenge_is_visible().await?
                || recaptcha.solve_failure_is_visible().await?
                || recaptcha.challenge_is_solved().await?
            {
                return Ok(());
            }

            self.page.wait(self.config.poll_interval).await;
        }

        Ok(())
    }

    /// Randomized human-pacing delay.
    async fn pace(&self, short: bool) {
        let range = if short {
            self.config.short_delay_ms.clone()
        } else {
            self.config.long_delay_ms.clone()
        };

        let millis = rand::thread_rng().gen_range(range);
        self.page.wait(Duration::from_millis(millis)).await;
    }
}

impl<P: Page> Drop for RecaptchaV2Solver<P> {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

fn token_injection_script(token: &str) -> String {
    let token_json = serde_json::to_string(token).unwrap_or_else(|_| "\"\"".to_string());

    format!(
        r#"(() => {{
    const token = {token_json};
    const textarea = document.querySelector(
        "textarea[name='g-recaptcha-response'], #g-recaptcha-response"
    );
    if (!textarea) {{
        return false;
    }}
    textarea.value = token;
    if (window.__recaptchaTokenDispatched) {{
        return true;
    }}
    window.__recaptchaTokenDispatched = true;
    const cfg = window.___grecaptcha_cfg;
    const clients = cfg && cfg.clients ? cfg.clients : {{}};
    for (const id of Object.keys(clients)) {{
        const client = clients[id];
        for (const key of Object.keys(client)) {{
            const entry = client[key];
            if (!entry || typeof entry !== "object") {{
                continue;
            }}
            for (const inner of Object.keys(entry)) {{
                const candidate = entry[inner];
                if (candidate && typeof candidate.callback === "function") {{
                    candidate.callback(token);
                    return true;
                }}
            }}
        }}
    }}
    return true;
}})()"#
    )
}
