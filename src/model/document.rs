use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

/// Lifecycle of a single remote-signing transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SigningStatus {
    NotInitiated,
    Pending,
    Signed,
    Failed,
}

/// One document-signing transaction tied to an application.
///
/// `state` and `nonce` are generated once at creation and are immutable; a signing
/// attempt is single-use, so a retry creates a new `SignedDocument` rather than
/// reusing an exhausted transaction. `state` is the correlation token used in the
/// JWT retrieval URL, distinct from the lifecycle `status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedDocument {
    pub id: Uuid,
    pub application_id: Uuid,
    /// Hex-encoded SHA-256 digest of the document content.
    pub document_hash: String,
    pub label: String,
    pub content: Option<Vec<u8>>,
    pub state: String,
    pub nonce: String,
    /// The signed document bytes returned by the wallet.
    pub signed_content: Option<Vec<u8>>,
    pub signature: Option<Json>,
    pub signature_qualifier: Option<String>,
    /// PEM/base64 certificate of the signer, as returned by the signing provider.
    pub signer_certificate: Option<String>,
    pub status: SigningStatus,
    pub error_code: Option<String>,
    pub signed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
