//! Step execution contract and response classification.
//!
//! A step is one GET against the protected endpoint. Whatever happens on the
//! wire, the client resolves to a [`StepOutcome`]; suspending, retrying, or
//! failing the run is decided by the sequence runner, never here.

use async_trait::async_trait;
use http::HeaderMap;
use http::header::{ACCEPT, CONTENT_TYPE, HeaderName, HeaderValue};
use thiserror::Error;

use super::types::{FailureCode, StepOutcome, VerificationToken};

/// Header carrying the captcha token back to the WAF.
pub const WAF_TOKEN_HEADER: HeaderName = HeaderName::from_static("x-aws-waftoken");

/// Header set by the WAF on blocked responses to announce the expected action.
pub const WAF_ACTION_HEADER: HeaderName = HeaderName::from_static("x-amzn-waf-action");

pub const CHALLENGE_REJECTED_MESSAGE: &str = "Captcha verification failed. Please try again.";
pub const UNEXPECTED_ERROR_MESSAGE: &str = "An unexpected error occurred";

/// Contract implemented by the transport performing one step.
///
/// Implementations must not retry internally and must never surface an error
/// outside of [`StepOutcome::Fatal`].
#[async_trait]
pub trait StepClient: Send + Sync {
    async fn execute(&self, token: Option<&VerificationToken>) -> StepOutcome;
}

/// Minimal response representation consumed by the classifier.
#[derive(Debug, Clone)]
pub struct StepHttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
}

impl StepHttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: &'static str) -> Self {
        self.headers.insert(name, HeaderValue::from_static(value));
        self
    }

    fn waf_action(&self) -> Option<&str> {
        self.headers
            .get(WAF_ACTION_HEADER)
            .and_then(|value| value.to_str().ok())
    }
}

/// Errors raised while preparing step headers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StepHeaderError {
    #[error("Invalid captcha token")]
    BlankToken,
    #[error("Invalid captcha token: not a valid header value")]
    InvalidToken,
}

/// Errors raised while constructing a step client.
#[derive(Debug, Error)]
pub enum StepClientError {
    #[error("http transport error: {0}")]
    Transport(String),
}

/// Build the JSON headers for a step, attaching the token when one is held.
pub fn build_step_headers(
    token: Option<&VerificationToken>,
) -> Result<HeaderMap, StepHeaderError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    if let Some(token) = token {
        if token.is_blank() {
            return Err(StepHeaderError::BlankToken);
        }
        let value = HeaderValue::from_str(token.header_value())
            .map_err(|_| StepHeaderError::InvalidToken)?;
        headers.insert(WAF_TOKEN_HEADER, value);
    }

    Ok(headers)
}

/// Classify an HTTP response.
///
/// `verified` tells whether the request carried a verification token. A
/// challenge demand on a verified request is not turned into a new prompt;
/// the backend has to reject the token explicitly (400) for that.
pub fn classify_response(response: &StepHttpResponse, verified: bool) -> StepOutcome {
    let status = response.status;

    if (200..300).contains(&status) {
        return StepOutcome::Success;
    }

    if !verified && demands_challenge(response) {
        return StepOutcome::ChallengeRequired;
    }

    if status == 400 {
        return StepOutcome::rejected(CHALLENGE_REJECTED_MESSAGE);
    }

    StepOutcome::fatal(
        format!("Request failed with status code {status}"),
        FailureCode::Status(status),
    )
}

/// Fold a transport-level failure into a fatal outcome.
pub fn classify_transport_error(message: &str, status: Option<u16>) -> StepOutcome {
    let message = message.trim();
    let message = if message.is_empty() {
        UNEXPECTED_ERROR_MESSAGE
    } else {
        message
    };
    StepOutcome::fatal(message, FailureCode::from(status))
}

fn demands_challenge(response: &StepHttpResponse) -> bool {
    match response.status {
        405 => true,
        403 => response
            .waf_action()
            .map(|action| action.eq_ignore_ascii_case("captcha"))
            .unwrap_or(false),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_statuses() {
        assert_eq!(
            classify_response(&StepHttpResponse::new(200), false),
            StepOutcome::Success
        );
        assert_eq!(
            classify_response(&StepHttpResponse::new(204), true),
            StepOutcome::Success
        );
    }

    #[test]
    fn method_not_allowed_requires_challenge_when_unverified() {
        let response = StepHttpResponse::new(405);
        assert_eq!(
            classify_response(&response, false),
            StepOutcome::ChallengeRequired
        );
    }

    #[test]
    fn method_not_allowed_is_fatal_once_verified() {
        let outcome = classify_response(&StepHttpResponse::new(405), true);
        assert_eq!(
            outcome,
            StepOutcome::fatal(
                "Request failed with status code 405",
                FailureCode::Status(405)
            )
        );
    }

    #[test]
    fn forbidden_with_captcha_action_requires_challenge() {
        let response = StepHttpResponse::new(403).with_header(WAF_ACTION_HEADER, "captcha");
        assert_eq!(
            classify_response(&response, false),
            StepOutcome::ChallengeRequired
        );

        let plain = StepHttpResponse::new(403);
        assert!(matches!(
            classify_response(&plain, false),
            StepOutcome::Fatal {
                code: FailureCode::Status(403),
                ..
            }
        ));
    }

    #[test]
    fn bad_request_means_rejected_token() {
        let outcome = classify_response(&StepHttpResponse::new(400), true);
        assert_eq!(outcome, StepOutcome::rejected(CHALLENGE_REJECTED_MESSAGE));
    }

    #[test]
    fn server_error_is_fatal_with_status() {
        match classify_response(&StepHttpResponse::new(500), false) {
            StepOutcome::Fatal { message, code } => {
                assert!(message.contains("500"));
                assert_eq!(code, FailureCode::Status(500));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn transport_error_falls_back_to_generic_message() {
        assert_eq!(
            classify_transport_error("  ", None),
            StepOutcome::fatal(UNEXPECTED_ERROR_MESSAGE, FailureCode::Unknown)
        );
        assert_eq!(
            classify_transport_error("connection refused", None),
            StepOutcome::fatal("connection refused", FailureCode::Unknown)
        );
    }

    #[test]
    fn headers_without_token() {
        let headers = build_step_headers(None).unwrap();
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(headers.get(ACCEPT).unwrap(), "application/json");
        assert!(headers.get(WAF_TOKEN_HEADER).is_none());
    }

    #[test]
    fn headers_attach_trimmed_token() {
        let token = VerificationToken::new(" tok123 ");
        let headers = build_step_headers(Some(&token)).unwrap();
        assert_eq!(headers.get("X-AWS-WAFTOKEN").unwrap(), "tok123");
    }

    #[test]
    fn blank_token_is_refused() {
        let token = VerificationToken::new("   ");
        assert_eq!(
            build_step_headers(Some(&token)).unwrap_err(),
            StepHeaderError::BlankToken
        );
    }
}
