//! Locating the reCAPTCHA widget and querying its state.
//!
//! A widget instance spans two isolated sub-documents: the anchor frame
//! (checkbox) and the bframe (challenge UI). [`RecaptchaBox`] pairs them up,
//! picks an actionable instance when several are embedded, and exposes the
//! detach-guarded predicates the solve state machine branches on.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use url::Url;

use crate::errors::{AutomationError, Error};
use crate::page::Frame;
use crate::selector::{Role, Selector, TextPattern};
use crate::translations;

const TILE_SELECTOR: &str = ".rc-imageselect-tile";
const IMAGE_CHALLENGE_SELECTOR: &str = ".rc-imageselect";
const INSTRUCTIONS_SELECTOR: &str = ".rc-imageselect-instructions";
const DYNAMIC_TILE_CLASS: &str = "rc-imageselect-dynamic-selected";

fn anchor_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new("/recaptcha/(api2|enterprise)/anchor").expect("static pattern")
    })
}

fn bframe_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new("/recaptcha/(api2|enterprise)/bframe").expect("static pattern")
    })
}

fn label(variants: &[&str]) -> TextPattern {
    translations::label_pattern(variants)
}

/// One located reCAPTCHA v2 instance.
///
/// The box observes the two frames but does not own their lifecycle: the
/// host page may reload or replace them at any time. Every predicate returns
/// `false` once either frame is detached, so polling loops drain out instead
/// of erroring mid-flight.
pub struct RecaptchaBox {
    anchor: Arc<dyn Frame>,
    bframe: Arc<dyn Frame>,
}

impl std::fmt::Debug for RecaptchaBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecaptchaBox")
            .field("anchor", &self.anchor.name())
            .field("bframe", &self.bframe.name())
            .finish()
    }
}

impl RecaptchaBox {
    pub fn new(anchor: Arc<dyn Frame>, bframe: Arc<dyn Frame>) -> Self {
        Self { anchor, bframe }
    }

    /// Collect anchor/bframe pairs from the attached frames.
    ///
    /// An anchor belongs to a bframe when the anchor's frame identifier (its
    /// name minus the two-character prefix) occurs in the bframe's name.
    fn frame_pairs(frames: &[Arc<dyn Frame>]) -> Vec<(Arc<dyn Frame>, Arc<dyn Frame>)> {
        let anchors: Vec<_> = frames
            .iter()
            .filter(|frame| anchor_url_pattern().is_match(&frame.url()))
            .collect();
        let bframes: Vec<_> = frames
            .iter()
            .filter(|frame| bframe_url_pattern().is_match(&frame.url()))
            .collect();

        let mut pairs = Vec::new();

        for anchor in &anchors {
            let name = anchor.name();
            let frame_id = match name.get(2..) {
                Some(id) if !id.is_empty() => id,
                _ => continue,
            };

            for bframe in &bframes {
                if bframe.name().contains(frame_id) {
                    pairs.push((Arc::clone(anchor), Arc::clone(bframe)));
                }
            }
        }

        pairs
    }

    /// Locate an actionable widget instance among the attached frames.
    ///
    /// Fails with [`Error::NotFound`] when no anchor/bframe pair exists, and
    /// with [`Error::NoAvailableInstance`] when pairs exist but every
    /// instance is already checked with no active challenge.
    pub async fn from_frames(frames: Vec<Arc<dyn Frame>>) -> Result<Self, Error> {
        let pairs = Self::frame_pairs(&frames);

        if pairs.is_empty() {
            return Err(Error::NotFound);
        }

        for (anchor, bframe) in pairs {
            let candidate = Self::new(anchor, bframe);

            if candidate.is_actionable().await? {
                return Ok(candidate);
            }
        }

        Err(Error::NoAvailableInstance)
    }

    /// Whether this instance can still be driven: an unchecked checkbox or
    /// an active challenge-mode control.
    async fn is_actionable(&self) -> Result<bool, Error> {
        let checkbox = self.checkbox();

        if self.guarded(|| async {
            Ok(self.anchor.is_visible(&checkbox).await? && !self.anchor.is_checked(&checkbox).await?)
        })
        .await?
        {
            return Ok(true);
        }

        for selector in [self.audio_challenge_button(), self.image_challenge_button()] {
            if self
                .guarded(|| async {
                    Ok(self.bframe.is_visible(&selector).await?
                        && self.bframe.is_enabled(&selector).await?)
                })
                .await?
            {
                return Ok(true);
            }
        }

        Ok(false)
    }

    pub fn anchor(&self) -> &Arc<dyn Frame> {
        &self.anchor
    }

    pub fn bframe(&self) -> &Arc<dyn Frame> {
        &self.bframe
    }

    pub fn frames_are_attached(&self) -> bool {
        !self.anchor.is_detached() && !self.bframe.is_detached()
    }

    pub fn frames_are_detached(&self) -> bool {
        self.anchor.is_detached() || self.bframe.is_detached()
    }

    /// The widget's declared locale, from the anchor URL's `hl` parameter.
    pub fn locale(&self) -> Option<String> {
        let url = Url::parse(&self.anchor.url()).ok()?;
        url.query_pairs()
            .find(|(key, _)| key == "hl")
            .map(|(_, value)| value.into_owned())
    }

    // Locators.

    pub fn checkbox(&self) -> Selector {
        Selector::role(Role::Checkbox, label(translations::IM_NOT_A_ROBOT))
    }

    pub fn audio_challenge_button(&self) -> Selector {
        Selector::role(Role::Button, label(translations::GET_AN_AUDIO_CHALLENGE))
    }

    pub fn image_challenge_button(&self) -> Selector {
        Selector::role(Role::Button, label(translations::GET_A_VISUAL_CHALLENGE))
    }

    pub fn new_challenge_button(&self) -> Selector {
        Selector::role(Role::Button, label(translations::GET_A_NEW_CHALLENGE))
    }

    pub fn audio_download_link(&self) -> Selector {
        Selector::role(Role::Link, label(translations::DOWNLOAD_AUDIO_AS_MP3))
    }

    pub fn audio_answer_textbox(&self) -> Selector {
        Selector::role(Role::Textbox, label(translations::ENTER_WHAT_YOU_HEAR))
    }

    pub fn skip_button(&self) -> Selector {
        Selector::role(Role::Button, label(translations::SKIP))
    }

    pub fn next_button(&self) -> Selector {
        Selector::role(Role::Button, label(translations::NEXT))
    }

    pub fn verify_button(&self) -> Selector {
        Selector::role(Role::Button, label(translations::VERIFY))
    }

    pub fn tiles(&self) -> Selector {
        Selector::css(TILE_SELECTOR)
    }

    pub fn tile(&self, index: usize) -> Selector {
        self.tiles().nth(index)
    }

    pub fn tile_image(&self, index: usize) -> Selector {
        self.tile(index).within(Selector::css("img"))
    }

    pub fn image_challenge(&self) -> Selector {
        Selector::css(IMAGE_CHALLENGE_SELECTOR)
    }

    pub fn challenge_instructions(&self) -> Selector {
        Selector::css(INSTRUCTIONS_SELECTOR)
    }

    // Detach-guarded state queries.

    pub async fn rate_limit_is_visible(&self) -> Result<bool, Error> {
        let selector = Selector::text(label(translations::TRY_AGAIN_LATER));
        self.guarded(|| async { Ok(self.bframe.is_visible(&selector).await?) })
            .await
    }

    pub async fn solve_failure_is_visible(&self) -> Result<bool, Error> {
        let selector = Selector::text(label(translations::MULTIPLE_CORRECT_SOLUTIONS_REQUIRED));
        self.guarded(|| async { Ok(self.bframe.is_visible(&selector).await?) })
            .await
    }

    /// Whether any challenge UI (image or audio) is on screen.
    pub async fn challenge_is_visible(&self) -> Result<bool, Error> {
        if self.image_challenge_is_visible().await? {
            return Ok(true);
        }
        self.audio_challenge_is_visible().await
    }

    pub async fn image_challenge_is_visible(&self) -> Result<bool, Error> {
        let selector = self.image_challenge();
        self.guarded(|| async { Ok(self.bframe.is_visible(&selector).await?) })
            .await
    }

    /// The audio UI renders its text before its controls become interactive,
    /// so "visible" requires both the press-play prompt and a working
    /// new-challenge button.
    pub async fn audio_challenge_is_visible(&self) -> Result<bool, Error> {
        let prompt = Selector::text(label(translations::PRESS_PLAY_TO_LISTEN));
        let new_challenge = self.new_challenge_button();

        self.guarded(|| async {
            Ok(self.bframe.is_visible(&prompt).await?
                && self.bframe.is_visible(&new_challenge).await?
                && self.bframe.is_enabled(&new_challenge).await?)
        })
        .await
    }

    pub async fn try_again_is_visible(&self) -> Result<bool, Error> {
        let selector = Selector::text(label(translations::PLEASE_TRY_AGAIN));
        self.guarded(|| async { Ok(self.bframe.is_visible(&selector).await?) })
            .await
    }

    pub async fn check_new_images_is_visible(&self) -> Result<bool, Error> {
        let selector = Selector::text(label(translations::PLEASE_ALSO_CHECK_THE_NEW_IMAGES));
        self.guarded(|| async { Ok(self.bframe.is_visible(&selector).await?) })
            .await
    }

    pub async fn select_all_matching_is_visible(&self) -> Result<bool, Error> {
        let selector = Selector::text(label(translations::PLEASE_SELECT_ALL_MATCHING_IMAGES));
        self.guarded(|| async { Ok(self.bframe.is_visible(&selector).await?) })
            .await
    }

    pub async fn challenge_is_solved(&self) -> Result<bool, Error> {
        let checkbox = self.checkbox();
        self.guarded(|| async {
            Ok(self.anchor.is_visible(&checkbox).await?
                && self.anchor.is_checked(&checkbox).await?)
        })
        .await
    }

    pub async fn checkbox_is_visible(&self) -> Result<bool, Error> {
        let checkbox = self.checkbox();
        self.guarded(|| async { Ok(self.anchor.is_visible(&checkbox).await?) })
            .await
    }

    pub async fn audio_button_is_usable(&self) -> Result<bool, Error> {
        let button = self.audio_challenge_button();
        self.guarded(|| async {
            Ok(self.bframe.is_visible(&button).await? && self.bframe.is_enabled(&button).await?)
        })
        .await
    }

    pub async fn image_button_is_usable(&self) -> Result<bool, Error> {
        let button = self.image_challenge_button();
        self.guarded(|| async {
            Ok(self.bframe.is_visible(&button).await? && self.bframe.is_enabled(&button).await?)
        })
        .await
    }

    /// Whether the tile at `index` is still flagged as dynamically replacing
    /// its image after a click.
    pub async fn tile_is_refreshing(&self, index: usize) -> Result<bool, Error> {
        let tile = self.tile(index);
        self.guarded(|| async {
            let class = self.bframe.attribute(&tile, "class").await?;
            Ok(class.is_some_and(|value| value.contains(DYNAMIC_TILE_CLASS)))
        })
        .await
    }

    pub async fn tile_image_url(&self, index: usize) -> Result<Option<String>, Error> {
        if self.frames_are_detached() {
            return Ok(None);
        }
        Ok(self.bframe.attribute(&self.tile_image(index), "src").await?)
    }

    pub async fn tile_count(&self) -> Result<usize, Error> {
        if self.frames_are_detached() {
            return Ok(0);
        }
        Ok(self.bframe.count(&self.tiles()).await?)
    }

    /// First line of the grid-challenge instruction text, used to derive the
    /// classification category.
    pub async fn challenge_instruction_text(&self) -> Result<String, Error> {
        if self.frames_are_detached() {
            return Ok(String::new());
        }
        Ok(self
            .bframe
            .inner_text(&self.challenge_instructions())
            .await?)
    }

    /// Run a boolean query only while both frames are attached; a detached
    /// widget answers `false` instead of erroring.
    async fn guarded<F, Fut>(&self, query: F) -> Result<bool, Error>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<bool, AutomationError>>,
    {
        if self.frames_are_detached() {
            return Ok(false);
        }
        Ok(query().await?)
    }
}
