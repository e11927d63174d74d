//! Error taxonomy shared by the v2 and v3 solvers.
//!
//! Every failure a caller can observe is a distinct variant; a token is never
//! smuggled through an error and an error never doubles as a token value.

use thiserror::Error;

/// Errors surfaced by the page-automation capability layer.
///
/// Implementations of [`crate::page::Page`] and [`crate::page::Frame`] map
/// their backend failures into these variants.
#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("page automation backend error: {0}")]
    Backend(String),
    #[error("no element matched {0}")]
    ElementNotFound(String),
    #[error("network fetch failed: {0}")]
    Fetch(String),
    #[error("script evaluation failed: {0}")]
    Evaluation(String),
}

/// Errors surfaced by the reCAPTCHA solvers.
#[derive(Debug, Error)]
pub enum Error {
    /// No anchor/bframe frame pair exists on the page.
    #[error("the reCAPTCHA was not found")]
    NotFound,
    /// Frame pairs exist, but every instance is already checked or otherwise
    /// has no active challenge to drive.
    #[error("no actionable reCAPTCHA instance was found")]
    NoAvailableInstance,
    /// The provider-side throttling banner is visible.
    #[error("the reCAPTCHA rate limit has been reached")]
    RateLimitExceeded,
    /// The attempt budget was exhausted without capturing a token.
    #[error("the reCAPTCHA could not be solved")]
    SolveFailed,
    /// The passive-wait deadline passed without a token.
    #[error("the reCAPTCHA solve timeout has been reached")]
    TimeoutExceeded,
    /// The observed result traffic belongs to the other reCAPTCHA version.
    #[error("the reCAPTCHA on the page is not the expected version")]
    VersionMismatch,
    /// The external classification or transcription backend reported an
    /// application-level error.
    #[error("solver backend error: {0}")]
    Provider(String),
    /// An image-mode solve was requested without classifier credentials.
    #[error("an image classification API key is required for image challenges")]
    MissingApiKey,
    #[error(transparent)]
    Automation(#[from] AutomationError),
}

impl Error {
    /// Whether the error is the locate-phase "widget absent" condition that
    /// the `wait` option is allowed to retry on.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_the_only_waitable_error() {
        assert!(Error::NotFound.is_not_found());
        assert!(!Error::NoAvailableInstance.is_not_found());
        assert!(!Error::RateLimitExceeded.is_not_found());
        assert!(!Error::SolveFailed.is_not_found());
    }

    #[test]
    fn automation_errors_convert() {
        let err: Error = AutomationError::Backend("boom".into()).into();
        assert!(matches!(err, Error::Automation(_)));
    }
}
