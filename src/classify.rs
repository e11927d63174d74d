//! The external image-classification capability and its CapSolver backend.
//!
//! The grid solver treats classification as a black box: image bytes plus a
//! category identifier in, matching cell indexes out. [`CapSolver`] is the
//! shipped backend; tests substitute their own [`TileClassifier`].

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// Result of classifying one challenge image against a category.
#[derive(Debug, Clone, Default)]
pub struct TileClassification {
    /// Whether the category is present in the image at all.
    pub has_object: bool,
    /// Grid cell indexes containing the category (empty for single-tile
    /// classification calls).
    pub cells: Vec<usize>,
}

impl TileClassification {
    pub fn no_match() -> Self {
        Self::default()
    }
}

/// Black-box image classification service.
#[async_trait]
pub trait TileClassifier: Send + Sync {
    /// Classify `image` against the fixed category identifier. Backend
    /// application errors surface as [`Error::Provider`].
    async fn classify(&self, image: &[u8], category: &str) -> Result<TileClassification, Error>;
}

const CAPSOLVER_CREATE_TASK_URL: &str = "https://api.capsolver.com/createTask";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateTaskRequest<'a> {
    client_key: &'a str,
    task: ClassificationTask<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClassificationTask<'a> {
    #[serde(rename = "type")]
    task_type: &'static str,
    image: String,
    question: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTaskResponse {
    #[serde(default)]
    error_id: i64,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    solution: Option<ClassificationSolution>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ClassificationSolution {
    #[serde(default)]
    has_object: Option<bool>,
    #[serde(default)]
    objects: Vec<usize>,
}

/// CapSolver `ReCaptchaV2Classification` client.
pub struct CapSolver {
    http: reqwest::Client,
    api_key: String,
}

impl CapSolver {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl TileClassifier for CapSolver {
    async fn classify(&self, image: &[u8], category: &str) -> Result<TileClassification, Error> {
        let request = CreateTaskRequest {
            client_key: &self.api_key,
            task: ClassificationTask {
                task_type: "ReCaptchaV2Classification",
                image: base64::engine::general_purpose::STANDARD.encode(image),
                question: category,
            },
        };

        let response = self
            .http
            .post(CAPSOLVER_CREATE_TASK_URL)
            .json(&request)
            .send()
            .await
            .map_err(|err| Error::Provider(format!("request failed: {err}")))?;

        let body: CreateTaskResponse = response
            .json()
            .await
            .map_err(|err| Error::Provider(format!("malformed response: {err}")))?;

        if body.error_id != 0 {
            let description = body
                .error_description
                .unwrap_or_else(|| "unspecified classification error".to_string());
            return Err(Error::Provider(description));
        }

        let solution = body.solution.unwrap_or_default();
        let has_object = solution.has_object.unwrap_or(!solution.objects.is_empty());

        Ok(TileClassification {
            has_object,
            cells: solution.objects,
        })
    }
}
