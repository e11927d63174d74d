//! Automated reCAPTCHA v2 and v3 challenge resolution.
//!
//! The crate drives a reCAPTCHA widget through an abstract page-automation
//! capability ([`page::Page`]) rather than a bundled browser engine: callers
//! plug in their own automation backend and get back the
//! `g-recaptcha-response` token. [`RecaptchaV2Solver`] handles the
//! interactive widget (checkbox shortcut, grid challenge via an image
//! classifier, audio challenge via a speech transcriber);
//! [`RecaptchaV3Solver`] passively waits for the score-based widget's token
//! and can suppress its premature redemption.

pub mod classify;
pub mod config;
pub mod errors;
pub mod page;
pub mod selector;
pub mod speech;
pub mod traffic;
pub mod translations;
pub mod v2;
pub mod v3;
pub mod widget;

pub use classify::{CapSolver, TileClassification, TileClassifier};
pub use config::SolverConfig;
pub use errors::{AutomationError, Error};
pub use page::{Frame, OutboundRequest, Page, RequestDisposition, RequestGuard, ResponseEvent};
pub use speech::{AudioClip, SpeechTranscriber};
pub use v2::{RecaptchaV2Solver, SolveOptions};
pub use v3::RecaptchaV3Solver;
pub use widget::RecaptchaBox;
