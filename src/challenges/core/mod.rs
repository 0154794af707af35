//! Core utilities shared by the step client and the sequence runner.

pub mod executor;
pub mod reqwest_client;
pub mod timing;
pub mod types;

pub use executor::{
    CHALLENGE_REJECTED_MESSAGE, StepClient, StepClientError, StepHeaderError, StepHttpResponse,
    UNEXPECTED_ERROR_MESSAGE, WAF_ACTION_HEADER, WAF_TOKEN_HEADER, build_step_headers,
    classify_response, classify_transport_error,
};
pub use reqwest_client::ReqwestStepClient;
pub use timing::{DEFAULT_STEP_DELAY, StepPacing};
pub use types::{FailureCode, StepOutcome, VerificationToken};
