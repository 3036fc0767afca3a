use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::logic::StorageLayout;

use super::{VerificationRequest, VerificationStatus, Verifier, VerifierError};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_MAX_CHECKS: u32 = 12;

/// Etherscan-style envelope: `status` is "1" on success, "0" otherwise, and
/// `result` carries either the payload or the explorer's message.
#[derive(Debug, Deserialize)]
struct ExplorerResponse {
    status: String,
    #[serde(default)]
    message: String,
    result: String,
}

/// Submitted in place of source code: identifies the logic build.
#[derive(Serialize)]
struct SourceMetadata<'a> {
    contract: &'a str,
    version: u32,
    layout: &'a StorageLayout,
}

/// A refused submission surfaces as [`VerifierError::Rejected`] carrying the
/// explorer's message; [`super::settle`] decides whether it still counts.
fn interpret_submission(response: ExplorerResponse) -> Result<String, VerifierError> {
    if response.status == "1" {
        Ok(response.result)
    } else if response.result.is_empty() {
        Err(VerifierError::Rejected(response.message))
    } else {
        Err(VerifierError::Rejected(response.result))
    }
}

/// `Ok(None)` while the explorer is still processing.
fn interpret_check(response: ExplorerResponse) -> Result<Option<VerificationStatus>, VerifierError> {
    if response.result.to_ascii_lowercase().contains("pending") {
        return Ok(None);
    }
    if response.result.starts_with("Pass") {
        return Ok(Some(VerificationStatus::Verified));
    }
    Err(VerifierError::Rejected(response.result))
}

pub struct EtherscanVerifier {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    poll_interval: Duration,
    max_checks: u32,
}

impl EtherscanVerifier {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, VerifierError> {
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            api_url: api_url.into(),
            api_key: api_key.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_checks: DEFAULT_MAX_CHECKS,
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    async fn submit(&self, request: &VerificationRequest) -> Result<String, VerifierError> {
        let source = serde_json::to_string(&SourceMetadata {
            contract: &request.contract,
            version: request.version,
            layout: &request.layout,
        })?;
        let constructor_args = match &request.constructor_args {
            Some(args) => serde_json::to_string(args)?,
            None => String::new(),
        };
        let address = request.address.to_string();
        let form = [
            ("apikey", self.api_key.as_str()),
            ("module", "contract"),
            ("action", "verifysourcecode"),
            ("contractaddress", address.as_str()),
            ("contractname", request.contract.as_str()),
            ("sourceCode", source.as_str()),
            ("constructorArguements", constructor_args.as_str()),
        ];
        let response: ExplorerResponse = self
            .http
            .post(&self.api_url)
            .form(&form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        interpret_submission(response)
    }

    async fn check(&self, guid: &str) -> Result<Option<VerificationStatus>, VerifierError> {
        let response: ExplorerResponse = self
            .http
            .get(&self.api_url)
            .query(&[
                ("apikey", self.api_key.as_str()),
                ("module", "contract"),
                ("action", "checkverifystatus"),
                ("guid", guid),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        interpret_check(response)
    }
}

#[async_trait]
impl Verifier for EtherscanVerifier {
    async fn verify(&self, request: &VerificationRequest) -> Result<VerificationStatus, VerifierError> {
        info!(address = %request.address, contract = %request.contract, "submitting verification");
        let guid = self.submit(request).await?;
        for attempt in 1..=self.max_checks {
            tokio::time::sleep(self.poll_interval).await;
            if let Some(status) = self.check(&guid).await? {
                return Ok(status);
            }
            debug!(%guid, attempt, "verification pending");
        }
        Err(VerifierError::Pending(self.max_checks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::verify::settle;

    fn response(status: &str, message: &str, result: &str) -> ExplorerResponse {
        ExplorerResponse {
            status: status.into(),
            message: message.into(),
            result: result.into(),
        }
    }

    #[test]
    fn accepted_submission_yields_guid() {
        assert_eq!(interpret_submission(response("1", "OK", "abc123")).unwrap(), "abc123");
    }

    #[test]
    fn refused_submission_is_rejected_with_explorer_message() {
        let err = interpret_submission(response("0", "NOTOK", "Contract source code already verified"))
            .unwrap_err();
        assert!(matches!(&err, VerifierError::Rejected(reason) if reason.contains("already verified")));
        assert_eq!(settle(Err(err)), VerificationStatus::AlreadyVerified);

        let err = interpret_submission(response("0", "Invalid API Key", "")).unwrap_err();
        assert_eq!(
            settle(Err(err)),
            VerificationStatus::Failed("Invalid API Key".into())
        );
    }

    #[test]
    fn check_results_are_interpreted() {
        assert_eq!(interpret_check(response("0", "NOTOK", "Pending in queue")).unwrap(), None);
        assert_eq!(
            interpret_check(response("1", "OK", "Pass - Verified")).unwrap(),
            Some(VerificationStatus::Verified)
        );
        let err = interpret_check(response("1", "OK", "Already Verified")).unwrap_err();
        assert_eq!(settle(Err(err)), VerificationStatus::AlreadyVerified);
        let err = interpret_check(response("0", "NOTOK", "Fail - Unable to verify")).unwrap_err();
        assert_eq!(
            settle(Err(err)),
            VerificationStatus::Failed("Fail - Unable to verify".into())
        );
    }

    #[test]
    fn envelope_parses_without_message() {
        let parsed: ExplorerResponse =
            serde_json::from_str(r#"{"status":"1","result":"guid"}"#).unwrap();
        assert_eq!(parsed.message, "");
    }
}
