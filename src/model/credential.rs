use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

/// The credential families a vacancy can request from a candidate's wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CredentialType {
    /// Person Identification Data, the baseline identity credential verified first.
    Pid,
    Diploma,
    Seafarer,
    TaxResidency,
}

impl CredentialType {
    /// The claim namespace (mDoc) or vct (SD-JWT) under which this credential's
    /// attributes are grouped.
    pub fn namespace(&self) -> &'static str {
        match self {
            Self::Pid => "eu.europa.ec.eudi.pid.1",
            Self::Diploma => "eu.europa.ec.eudi.diploma.1",
            Self::Seafarer => "eu.europa.ec.eudi.seafarer.1",
            Self::TaxResidency => "urn:eu.europa.ec.eudi:tax_residency:1",
        }
    }

    /// Whether the wallet presents this credential as a binary mDoc envelope
    /// (as opposed to an SD-JWT token).
    pub fn is_mdoc(&self) -> bool {
        !matches!(self, Self::TaxResidency)
    }

    /// Stable key used to derive DCQL query identifiers.
    pub fn query_key(&self) -> &'static str {
        match self {
            Self::Pid => "pid",
            Self::Diploma => "diploma",
            Self::Seafarer => "seafarer",
            Self::TaxResidency => "tax_residency",
        }
    }
}

impl fmt::Display for CredentialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.query_key())
    }
}

/// Verification lifecycle of a single presentation attempt.
///
/// Terminal statuses never re-open; a fresh verification creates a new
/// [`VerifiedCredential`] rather than mutating an exhausted one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    Pending,
    Verified,
    Failed,
    Expired,
}

impl VerificationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Decoded claims grouped by namespace.
pub type ClaimMap = BTreeMap<String, BTreeMap<String, Json>>;

/// One verification attempt/result for a credential type, tied to an application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiedCredential {
    pub id: Uuid,
    pub application_id: Uuid,
    pub kind: CredentialType,
    pub namespace: String,
    /// Verifier-side transaction id, set once the presentation transaction is open.
    pub transaction_id: Option<String>,
    /// The wallet-facing request URI returned by the Verifier.
    pub request_uri: Option<String>,
    /// Claims extracted from the wallet submission, keyed by claim name.
    pub claims: Option<BTreeMap<String, Json>>,
    pub status: VerificationStatus,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl VerifiedCredential {
    pub fn pending(application_id: Uuid, kind: CredentialType) -> Self {
        Self {
            id: Uuid::new_v4(),
            application_id,
            kind,
            namespace: kind.namespace().to_string(),
            transaction_id: None,
            request_uri: None,
            claims: None,
            status: VerificationStatus::Pending,
            verified_at: None,
            created_at: Utc::now(),
        }
    }
}
