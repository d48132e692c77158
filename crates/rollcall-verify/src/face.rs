//! Face comparison

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::{VerifyError, VerifyResult};

/// Verdict of a face comparison
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceMatch {
    pub matched: bool,
    /// Similarity in [0, 1]
    pub score: f64,
}

/// Compares a captured image against a student's reference image
#[async_trait]
pub trait FaceMatcher: Send + Sync {
    async fn compare(&self, reference: &str, capture: &str) -> VerifyResult<FaceMatch>;
}

#[derive(Debug, Serialize)]
struct CompareRequest<'a> {
    reference_url: &'a str,
    capture_url: &'a str,
}

/// Face matcher backed by a JSON-over-HTTP comparison service
///
/// Sends `POST <endpoint>` with `{"reference_url", "capture_url"}` and
/// expects `{"matched": bool, "score": f64}` back.
#[derive(Debug, Clone)]
pub struct HttpFaceMatcher {
    client: Client,
    endpoint: String,
}

impl HttpFaceMatcher {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> VerifyResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl FaceMatcher for HttpFaceMatcher {
    async fn compare(&self, reference: &str, capture: &str) -> VerifyResult<FaceMatch> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&CompareRequest {
                reference_url: reference,
                capture_url: capture,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(VerifyError::Unavailable(format!(
                "face matcher returned HTTP {}",
                response.status()
            )));
        }

        let verdict: FaceMatch = response.json().await?;
        if !verdict.score.is_finite() {
            return Err(VerifyError::InvalidResponse(format!(
                "score {} is not a number",
                verdict.score
            )));
        }

        debug!(matched = verdict.matched, score = verdict.score, "Face comparison done");
        Ok(verdict)
    }
}
