//! Qualified Electronic Signature orchestration.
//!
//! `initiate` opens a single-use signing transaction for the employment contract;
//! the wallet then fetches the signature request as a signed JWT from the retrieval
//! endpoint (`prepare_retrieval_request` + `retrieval_jwt`), posts the signature
//! back (`record_signature`), and the frontend polls `check_status` until the
//! transaction reaches a terminal state.

use std::fmt::Debug;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use sha2::{Digest, Sha256};
use url::Url;
use uuid::Uuid;

use crate::config::{BaseUrl, SigningConfig};
use crate::error::{Error, Result};
use crate::event::{DomainEvent, EventBus};
use crate::jwt::{sign_jwt, JwtSigner};
use crate::lifecycle::ApplicationStatus;
use crate::model::{SignedDocument, SigningStatus};
use crate::store::{ApplicationStore, SignedDocumentStore};
use crate::verification::new_nonce;

/// SHA-256, the only digest algorithm the signing flow uses.
const SHA256_OID: &str = "2.16.840.1.101.3.4.2.1";

/// Validity window of the wallet-facing retrieval JWT.
const RETRIEVAL_JWT_TTL_SECS: i64 = 300;

/// The signature request payload an external signing service consumes, per the
/// EUDI/ETSI remote-signing profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureRequestObject {
    pub response_type: String,
    pub client_id: String,
    pub client_id_scheme: String,
    pub response_mode: String,
    pub response_uri: Url,
    pub nonce: String,
    pub state: String,
    #[serde(rename = "signatureQualifier")]
    pub signature_qualifier: String,
    #[serde(rename = "documentDigests")]
    pub document_digests: Vec<DocumentDigest>,
    #[serde(rename = "documentLocations")]
    pub document_locations: Vec<DocumentLocation>,
    #[serde(rename = "hashAlgorithmOID")]
    pub hash_algorithm_oid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentDigest {
    pub hash: String,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentLocation {
    pub uri: Url,
    pub method: AccessMethod,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessMethod {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Serialize)]
struct RetrievalJwtClaims {
    #[serde(flatten)]
    request: SignatureRequestObject,
    iat: i64,
    exp: i64,
}

/// What the wallet posted back for a signing transaction.
#[derive(Debug, Clone)]
pub enum SignatureOutcome {
    Signed {
        signed_content: Option<Vec<u8>>,
        signature: Json,
        certificate: Option<String>,
    },
    Failed {
        error_code: String,
    },
}

/// Where the contract artifact for an application comes from.
#[async_trait::async_trait]
pub trait ContractSource: Debug {
    /// Render the contract for this application and say where the wallet can fetch it.
    async fn contract(&self, application: &crate::model::Application) -> Result<ContractDocument>;
}

#[derive(Debug, Clone)]
pub struct ContractDocument {
    pub content: Vec<u8>,
    /// Public location the signing wallet downloads the document from.
    pub location: Url,
}

/// Fixed contract bytes at a fixed location; suitable for tests and single-contract
/// deployments.
#[derive(Debug, Clone)]
pub struct StaticContract {
    pub content: Vec<u8>,
    pub location: Url,
}

#[async_trait::async_trait]
impl ContractSource for StaticContract {
    async fn contract(&self, _application: &crate::model::Application) -> Result<ContractDocument> {
        Ok(ContractDocument {
            content: self.content.clone(),
            location: self.location.clone(),
        })
    }
}

pub(crate) fn new_signing_transaction(
    application_id: Uuid,
    label: &str,
    content: &[u8],
) -> SignedDocument {
    SignedDocument {
        id: Uuid::new_v4(),
        application_id,
        document_hash: hex::encode(Sha256::digest(content)),
        label: label.to_string(),
        content: Some(content.to_vec()),
        state: Uuid::new_v4().simple().to_string(),
        nonce: new_nonce(),
        signed_content: None,
        signature: None,
        signature_qualifier: None,
        signer_certificate: None,
        status: SigningStatus::Pending,
        error_code: None,
        signed_at: None,
        created_at: Utc::now(),
    }
}

/// Drives contract signing transactions for one deployment.
#[derive(Debug, Clone)]
pub struct SigningOrchestrator {
    pub(crate) applications: Arc<dyn ApplicationStore + Send + Sync>,
    pub(crate) documents: Arc<dyn SignedDocumentStore + Send + Sync>,
    pub(crate) contracts: Arc<dyn ContractSource + Send + Sync>,
    pub(crate) signer: Arc<dyn JwtSigner + Send + Sync>,
    pub(crate) events: EventBus,
    pub(crate) config: SigningConfig,
    pub(crate) origin: BaseUrl,
}

impl SigningOrchestrator {
    /// Open a new signing transaction and move the application into SIGNING.
    ///
    /// Each call creates a fresh `SignedDocument` with its own `state` and `nonce`;
    /// after a failed attempt the candidate retries by calling this again.
    pub async fn initiate(&self, application_id: Uuid) -> Result<String> {
        let application = self.applications.get(application_id).await?;
        application
            .status
            .advance_to(ApplicationStatus::Signing)
            .or_else(|e| {
                // A retry while already SIGNING replaces the exhausted transaction.
                if application.status == ApplicationStatus::Signing {
                    Ok(ApplicationStatus::Signing)
                } else {
                    Err(e)
                }
            })?;

        let contract = self.contracts.contract(&application).await?;
        let document = new_signing_transaction(
            application_id,
            &self.config.document_label,
            &contract.content,
        );
        let state = document.state.clone();
        self.documents.insert(document).await?;

        if application.status == ApplicationStatus::Finalized {
            self.applications
                .update_status(
                    application_id,
                    ApplicationStatus::Finalized,
                    ApplicationStatus::Signing,
                )
                .await?;
        }

        tracing::debug!(%application_id, state, "opened signing transaction");
        Ok(state)
    }

    /// Build the signature request payload for the transaction identified by
    /// `state`. Fails with `NotFound` when the state is unknown or the transaction
    /// has already been consumed.
    pub async fn prepare_retrieval_request(&self, state: &str) -> Result<SignatureRequestObject> {
        let document = self
            .documents
            .find_by_state(state)
            .await?
            .filter(|d| d.status == SigningStatus::Pending)
            .ok_or_else(|| Error::NotFound(format!("signing transaction {state}")))?;

        let application = self.applications.get(document.application_id).await?;
        let contract = self.contracts.contract(&application).await?;

        let response_uri = self
            .origin
            .join(&format!("signatures/{state}"))
            .map_err(|e| Error::Internal(e.into()))?;

        Ok(SignatureRequestObject {
            response_type: "sign_document".to_string(),
            client_id: self.config.client_id.clone(),
            client_id_scheme: self.config.client_id_scheme.clone(),
            response_mode: "direct_post".to_string(),
            response_uri,
            nonce: document.nonce.clone(),
            state: document.state.clone(),
            signature_qualifier: "eu_eidas_qes".to_string(),
            document_digests: vec![DocumentDigest {
                hash: document.document_hash.clone(),
                label: document.label.clone(),
            }],
            document_locations: vec![DocumentLocation {
                uri: contract.location,
                method: AccessMethod {
                    kind: "public".to_string(),
                },
            }],
            hash_algorithm_oid: SHA256_OID.to_string(),
        })
    }

    /// The compact JWT the wallet retrieves: the signature request payload signed
    /// with our ES256/x5c identity, valid for five minutes.
    pub async fn retrieval_jwt(&self, state: &str) -> Result<String> {
        let request = self.prepare_retrieval_request(state).await?;
        let iat = Utc::now().timestamp();
        let claims = RetrievalJwtClaims {
            request,
            iat,
            exp: iat + RETRIEVAL_JWT_TTL_SECS,
        };
        sign_jwt(&claims, self.signer.as_ref()).await
    }

    /// Record what the wallet posted back for `state`. Single-use: a transaction
    /// that already reached a terminal status rejects further submissions.
    pub async fn record_signature(&self, state: &str, outcome: SignatureOutcome) -> Result<()> {
        let mut document = self
            .documents
            .find_by_state(state)
            .await?
            .ok_or_else(|| Error::NotFound(format!("signing transaction {state}")))?;
        if document.status != SigningStatus::Pending {
            return Err(Error::InvalidTransition(format!(
                "signing transaction {state} already consumed"
            )));
        }

        match outcome {
            SignatureOutcome::Signed {
                signed_content,
                signature,
                certificate,
            } => {
                document.signed_content = signed_content;
                document.signature = Some(signature);
                document.signature_qualifier = Some("eu_eidas_qes".to_string());
                document.signer_certificate = certificate;
                document.status = SigningStatus::Signed;
                document.signed_at = Some(Utc::now());
            }
            SignatureOutcome::Failed { error_code } => {
                tracing::warn!(state, error_code, "signing transaction failed");
                document.status = SigningStatus::Failed;
                document.error_code = Some(error_code);
            }
        }
        self.documents.update(document).await
    }

    /// Map the latest signing transaction onto the application lifecycle; called by
    /// the polling frontend. Emits `DocumentSigned` exactly once, on the poll that
    /// wins the SIGNING -> SIGNED compare-and-swap.
    pub async fn check_status(&self, application_id: Uuid) -> Result<SigningStatus> {
        let application = self.applications.get(application_id).await?;
        let Some(document) = self.documents.latest_for_application(application_id).await? else {
            return Ok(SigningStatus::NotInitiated);
        };

        if document.status == SigningStatus::Signed
            && application.status == ApplicationStatus::Signing
        {
            self.applications
                .update_status(
                    application_id,
                    ApplicationStatus::Signing,
                    ApplicationStatus::Signed,
                )
                .await?;
            self.events
                .publish(DomainEvent::document_signed(application_id, document.id))
                .await;
        }

        Ok(document.status)
    }
}

/// Response parts for the wallet-facing JWT retrieval endpoint: `application/jwt`
/// body, caching disabled.
pub fn jwt_response(jwt: String) -> Result<http::Response<String>> {
    http::Response::builder()
        .status(http::StatusCode::OK)
        .header(http::header::CONTENT_TYPE, "application/jwt")
        .header(
            http::header::CACHE_CONTROL,
            "no-store, no-cache, must-revalidate",
        )
        .header(http::header::PRAGMA, "no-cache")
        .body(jwt)
        .map_err(|e| Error::Internal(e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transactions_have_unique_state_and_nonce() {
        let application_id = Uuid::new_v4();
        let a = new_signing_transaction(application_id, "contract", b"bytes");
        let b = new_signing_transaction(application_id, "contract", b"bytes");
        assert_ne!(a.state, b.state);
        assert_ne!(a.nonce, b.nonce);
        // Same content hashes identically.
        assert_eq!(a.document_hash, b.document_hash);
    }

    #[test]
    fn document_hash_is_sha256_hex() {
        let document = new_signing_transaction(Uuid::new_v4(), "contract", b"Hello");
        assert_eq!(
            document.document_hash,
            "185f8db32271fe25f561a6fc938b2e264306ec304eda518007d1764826381969"
        );
    }

    #[test]
    fn jwt_response_sets_wire_contract_headers() {
        let response = jwt_response("a.b.c".to_string()).unwrap();
        assert_eq!(response.status(), http::StatusCode::OK);
        assert_eq!(
            response.headers()[http::header::CONTENT_TYPE],
            "application/jwt"
        );
        assert_eq!(
            response.headers()[http::header::CACHE_CONTROL],
            "no-store, no-cache, must-revalidate"
        );
        assert_eq!(response.headers()[http::header::PRAGMA], "no-cache");
        assert_eq!(response.body(), "a.b.c");
    }
}
