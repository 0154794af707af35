//! Reqwest-based implementation of the `StepClient` trait.
//!
//! Provides a thin adapter around `reqwest::Client` that issues the step GET
//! and hands the status and headers to the shared classifier.

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use super::executor::{
    StepClient, StepClientError, StepHttpResponse, build_step_headers, classify_response,
    classify_transport_error,
};
use super::types::{FailureCode, StepOutcome, VerificationToken};

/// Reqwest-backed client hitting a single fixed endpoint.
pub struct ReqwestStepClient {
    client: Client,
    endpoint: Url,
}

impl ReqwestStepClient {
    /// Creates a client for `endpoint` with a cookie store, so WAF cookies
    /// issued alongside the token survive between steps.
    pub fn new(endpoint: Url) -> Result<Self, StepClientError> {
        let client = Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|err| StepClientError::Transport(err.to_string()))?;

        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl StepClient for ReqwestStepClient {
    async fn execute(&self, token: Option<&VerificationToken>) -> StepOutcome {
        let headers = match build_step_headers(token) {
            Ok(headers) => headers,
            Err(err) => {
                log::warn!("refusing to send step: {err}");
                return StepOutcome::fatal(err.to_string(), FailureCode::Unknown);
            }
        };

        log::debug!("-> GET {} (token attached: {})", self.endpoint, token.is_some());

        let response = match self
            .client
            .get(self.endpoint.clone())
            .headers(headers)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                log::warn!("step request to {} failed: {err}", self.endpoint);
                return classify_transport_error(
                    &err.to_string(),
                    err.status().map(|status| status.as_u16()),
                );
            }
        };

        let snapshot = StepHttpResponse {
            status: response.status().as_u16(),
            headers: response.headers().clone(),
        };
        let outcome = classify_response(&snapshot, token.is_some());
        log::debug!("<- {} {} ({})", snapshot.status, self.endpoint, outcome.label());
        outcome
    }
}
