use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

/// Credential types this application can ask the Issuer to deliver to a wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssuedCredentialType {
    /// The employee credential issued once the contract is signed.
    EmployeeId,
    /// Informational receipt confirming that an application was submitted.
    ApplicationReceipt,
}

impl IssuedCredentialType {
    /// The issuer-side credential configuration this maps to.
    pub fn configuration_id(&self) -> &'static str {
        match self {
            Self::EmployeeId => "eu.europa.ec.eudi.employee_sd_jwt_vc",
            Self::ApplicationReceipt => "eu.europa.ec.eudi.application_receipt_sd_jwt_vc",
        }
    }
}

impl fmt::Display for IssuedCredentialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmployeeId => f.write_str("employee_id"),
            Self::ApplicationReceipt => f.write_str("application_receipt"),
        }
    }
}

/// One credential-issuance transaction tied to an application.
///
/// Once `claimed` is set, the offer must never be reissued under the same
/// pre-authorized code; `expires_at` bounds the validity window of the offer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedCredential {
    pub id: Uuid,
    pub application_id: Uuid,
    pub kind: IssuedCredentialType,
    pub pre_authorized_code: String,
    pub credential_offer_url: String,
    /// One-time PIN for PIN-gated offers.
    pub otp: Option<String>,
    /// The claim data handed to the Issuer for this credential.
    pub data: Json,
    pub claimed: bool,
    pub claimed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl IssuedCredential {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}
