//! Presentation transaction initiator and status poller.
//!
//! `initiate` opens an OpenID4VP transaction with the Verifier for the credentials
//! the current lifecycle stage requires and hands back a wallet link; the frontend
//! then calls `poll` on an interval until the wallet has responded. All Verifier
//! state changes are discovered by pull; there is no webhook channel.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;
use vc_recruit_frontend::{WalletLink, WalletTarget};

use crate::config::{BaseUrl, VerifierConfig};
use crate::decoder;
use crate::error::{Error, Result};
use crate::event::{DomainEvent, EventBus};
use crate::lifecycle::ApplicationStatus;
use crate::model::{
    Application, CredentialType, PersonalInfo, VerificationStatus, VerifiedCredential,
};
use crate::query::{self, DcqlQuery};
use crate::store::{ApplicationStore, VacancyStore, VerifiedCredentialStore};

/// Wire request for opening a presentation transaction with the Verifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenTransactionRequest {
    #[serde(rename = "type")]
    pub response_type: String,
    pub dcql_query: DcqlQuery,
    pub nonce: String,
    /// Template the Verifier uses to send the same-device wallet back to us,
    /// with `{RESPONSE_CODE}` substituted by the OAuth response code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_response_redirect_uri_template: Option<String>,
}

/// Wire response from the Verifier for an opened transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenTransactionResponse {
    pub transaction_id: String,
    pub client_id: String,
    pub request_uri: Url,
}

/// Identifies a transaction when polling for the wallet's submission.
#[derive(Debug, Clone)]
pub struct SubmissionQuery {
    pub transaction_id: String,
    /// Same-device callback artifact, forwarded to the Verifier when present.
    pub response_code: Option<String>,
}

/// The wallet's submitted tokens, keyed by DCQL query id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletSubmission {
    pub vp_token: BTreeMap<String, String>,
}

/// The Verifier service contract, core-facing side only.
#[async_trait]
pub trait VerifierClient: Debug {
    async fn open_transaction(
        &self,
        request: &OpenTransactionRequest,
    ) -> Result<OpenTransactionResponse>;

    /// `None` while the wallet has not responded yet.
    async fn fetch_submission(&self, query: &SubmissionQuery) -> Result<Option<WalletSubmission>>;
}

/// [`VerifierClient`] over the Verifier's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpVerifierClient {
    http: reqwest::Client,
    api: BaseUrl,
}

impl HttpVerifierClient {
    pub fn new(api: BaseUrl) -> Self {
        Self {
            http: reqwest::Client::new(),
            api,
        }
    }

    fn unavailable(e: impl Into<anyhow::Error>) -> Error {
        Error::ExternalService {
            service: "verifier".to_string(),
            source: e.into(),
        }
    }
}

#[async_trait]
impl VerifierClient for HttpVerifierClient {
    async fn open_transaction(
        &self,
        request: &OpenTransactionRequest,
    ) -> Result<OpenTransactionResponse> {
        let url = self
            .api
            .join("presentations")
            .map_err(|e| Self::unavailable(e))?;
        let response = self
            .http
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(Self::unavailable)?;

        if response.status().is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Validation(format!("verifier rejected query: {body}")));
        }
        let response = response.error_for_status().map_err(Self::unavailable)?;
        response.json().await.map_err(Self::unavailable)
    }

    async fn fetch_submission(&self, query: &SubmissionQuery) -> Result<Option<WalletSubmission>> {
        let mut url = self
            .api
            .join(&format!("presentations/{}", query.transaction_id))
            .map_err(|e| Self::unavailable(e))?;
        if let Some(code) = &query.response_code {
            url.query_pairs_mut().append_pair("response_code", code);
        }

        let response = self.http.get(url).send().await.map_err(Self::unavailable)?;
        // The Verifier answers 404/204 until the wallet has submitted.
        if matches!(
            response.status(),
            reqwest::StatusCode::NOT_FOUND | reqwest::StatusCode::NO_CONTENT
        ) {
            return Ok(None);
        }
        let response = response.error_for_status().map_err(Self::unavailable)?;
        response.json().await.map(Some).map_err(Self::unavailable)
    }
}

/// Drives verification transactions for one deployment.
#[derive(Debug, Clone)]
pub struct VerificationExchange {
    pub(crate) applications: Arc<dyn ApplicationStore + Send + Sync>,
    pub(crate) vacancies: Arc<dyn VacancyStore + Send + Sync>,
    pub(crate) credentials: Arc<dyn VerifiedCredentialStore + Send + Sync>,
    pub(crate) verifier: Arc<dyn VerifierClient + Send + Sync>,
    pub(crate) events: EventBus,
    pub(crate) config: VerifierConfig,
    pub(crate) origin: BaseUrl,
}

impl VerificationExchange {
    /// The credential set the application's current stage asks the wallet for.
    fn stage_credentials(
        status: ApplicationStatus,
        vacancy: &crate::model::Vacancy,
    ) -> Result<Vec<CredentialType>> {
        use ApplicationStatus::*;
        let kinds = match status {
            Created | Verifying => vec![CredentialType::Pid],
            Verified | Qualifying => vacancy.qualification_credentials(),
            Signed | TaxQualifying => {
                if vacancy.requires_tax_residency() {
                    vec![CredentialType::TaxResidency]
                } else {
                    vec![]
                }
            }
            _ => vec![],
        };
        if kinds.is_empty() {
            return Err(Error::InvalidTransition(format!(
                "no verification pending in status {status}"
            )));
        }
        Ok(kinds)
    }

    /// Open a presentation transaction for the credentials the current stage
    /// requires, returning the wallet link for QR rendering (cross-device) or
    /// browser navigation (same-device).
    ///
    /// Single-flight: while a PENDING transaction for the same credential set is
    /// still open, the stored wallet link is returned instead of opening a
    /// duplicate transaction with the Verifier.
    pub async fn initiate(&self, application_id: Uuid, same_device: bool) -> Result<WalletLink> {
        let application = self.applications.get(application_id).await?;
        let vacancy = self.vacancies.get(application.vacancy_id).await?;
        let kinds = Self::stage_credentials(application.status, &vacancy)?;

        let existing = self.credentials.find_by_application(application_id).await?;
        // Only a row that still carries both correlation artifacts is reusable;
        // a row missing either gets a fresh transaction instead of an empty link.
        if let Some((transaction_id, request_uri)) = existing.iter().find_map(|c| {
            if c.status != VerificationStatus::Pending || !kinds.contains(&c.kind) {
                return None;
            }
            Some((c.transaction_id.clone()?, c.request_uri.clone()?))
        }) {
            tracing::debug!(%application_id, "reusing open verification transaction");
            return self.wallet_link(transaction_id, &request_uri, same_device);
        }

        let request = OpenTransactionRequest {
            response_type: "vp_token".to_string(),
            dcql_query: query::presentation_query(application_id, &kinds),
            nonce: new_nonce(),
            wallet_response_redirect_uri_template: same_device.then(|| {
                format!(
                    "{}callback?response_code={{RESPONSE_CODE}}",
                    self.origin.as_str()
                )
            }),
        };

        // The transaction is opened before any state changes; if the Verifier is
        // unreachable or rejects the query, the application stays in its prior state.
        let opened = self.verifier.open_transaction(&request).await?;

        for kind in &kinds {
            let mut credential = VerifiedCredential::pending(application_id, *kind);
            credential.transaction_id = Some(opened.transaction_id.clone());
            credential.request_uri = Some(opened.request_uri.to_string());
            self.credentials.insert(credential).await?;
        }

        let next = match application.status {
            ApplicationStatus::Created => Some(ApplicationStatus::Verifying),
            ApplicationStatus::Verified => Some(ApplicationStatus::Qualifying),
            ApplicationStatus::Signed => Some(ApplicationStatus::TaxQualifying),
            // Re-initiating after a FAILED attempt within the same stage.
            _ => None,
        };
        if let Some(next) = next {
            self.applications
                .update_status(application_id, application.status, next)
                .await?;
        }

        self.wallet_link(opened.transaction_id, opened.request_uri.as_str(), same_device)
    }

    fn wallet_link(
        &self,
        transaction_id: String,
        request_uri: &str,
        same_device: bool,
    ) -> Result<WalletLink> {
        let deep_link = Url::parse_with_params(
            &format!("{}://", self.config.wallet_scheme),
            &[("client_id", self.config.api.as_str()), ("request_uri", request_uri)],
        )
        .map_err(|e| Error::Internal(e.into()))?;

        let target = if same_device {
            WalletTarget::Redirect(deep_link.to_string())
        } else {
            WalletTarget::DeepLink(deep_link.to_string())
        };
        Ok(WalletLink {
            transaction_id,
            target,
        })
    }

    /// Check whether the wallet has responded to the pending transaction.
    ///
    /// Returns `false` while pending (no side effects) and after a decode failure
    /// (rows marked FAILED); returns `true` only once claims and status transitions
    /// have been persisted.
    pub async fn poll(&self, application_id: Uuid, response_code: Option<String>) -> Result<bool> {
        let application = self.applications.get(application_id).await?;

        let rows = self.credentials.find_by_application(application_id).await?;
        let pending: Vec<VerifiedCredential> = rows
            .into_iter()
            .filter(|c| c.status == VerificationStatus::Pending && c.transaction_id.is_some())
            .collect();
        let Some(first) = pending.first() else {
            return Err(Error::NotFound(format!(
                "pending verification for application {application_id}"
            )));
        };

        let submission_query = SubmissionQuery {
            transaction_id: first.transaction_id.clone().unwrap_or_default(),
            response_code,
        };
        let Some(submission) = self.verifier.fetch_submission(&submission_query).await? else {
            return Ok(false);
        };

        // Decode every pending row first; only a fully decodable submission may
        // advance the application.
        let mut decoded = Vec::with_capacity(pending.len());
        let mut failed = Vec::new();
        for row in pending {
            let token = submission.vp_token.get(&query::query_id(application_id, row.kind));
            let claims = token
                .and_then(|token| extract_claims(row.kind, token))
                // A PID submission without the mandatory name attributes is as
                // unusable as an undecodable token.
                .filter(|claims| {
                    row.kind != CredentialType::Pid || personal_info(claims).is_some()
                });
            match claims {
                Some(claims) => decoded.push((row, claims)),
                None => failed.push(row),
            }
        }

        if !failed.is_empty() {
            for mut row in failed {
                tracing::warn!(%application_id, credential = %row.kind, "marking unusable submission FAILED");
                row.status = VerificationStatus::Failed;
                self.credentials.update(row).await?;
            }
            return Ok(false);
        }

        let mut verified_pid = false;
        let mut qualifications = Vec::new();
        for (mut row, claims) in decoded {
            if row.kind == CredentialType::Pid {
                verified_pid = true;
                if let Some(info) = personal_info(&claims) {
                    let mut application = self.applications.get(application_id).await?;
                    application.candidate = Some(info);
                    self.applications.update(application).await?;
                }
            } else {
                qualifications.push(row.kind);
            }
            row.claims = Some(claims);
            row.status = VerificationStatus::Verified;
            row.verified_at = Some(Utc::now());
            self.credentials.update(row).await?;
        }

        let next = match application.status {
            ApplicationStatus::Verifying => ApplicationStatus::Verified,
            ApplicationStatus::Qualifying => ApplicationStatus::Qualified,
            ApplicationStatus::TaxQualifying => ApplicationStatus::TaxQualified,
            other => {
                return Err(Error::InvalidTransition(format!(
                    "no verification pending in status {other}"
                )));
            }
        };
        self.applications
            .update_status(application_id, application.status, next)
            .await?;

        if verified_pid {
            self.events
                .publish(DomainEvent::application_verified(application_id))
                .await;
        }
        for kind in qualifications {
            self.events
                .publish(DomainEvent::qualification_verified(application_id, kind))
                .await;
        }

        Ok(true)
    }
}

/// Decode one wallet token into the claim set for `kind`'s namespace.
fn extract_claims(
    kind: CredentialType,
    token: &str,
) -> Option<BTreeMap<String, serde_json::Value>> {
    if kind.is_mdoc() {
        let bytes = decoder::decode_base64_or_hex(token).ok()?;
        let mut claims = decoder::decode_cbor_data(&bytes)?;
        claims.remove(kind.namespace())
    } else {
        decoder::decode_sd_jwt(token)
    }
}

fn personal_info(claims: &BTreeMap<String, serde_json::Value>) -> Option<PersonalInfo> {
    let text = |key: &str| -> Option<String> {
        claims.get(key).and_then(|v| v.as_str()).map(str::to_string)
    };
    Some(PersonalInfo {
        family_name: text("family_name")?,
        given_name: text("given_name")?,
        birth_date: text("birth_date").and_then(|d| d.parse().ok()),
        nationality: text("nationality"),
        email: text("email"),
        mobile: text("mobile_phone_number"),
    })
}

/// Random alphanumeric replay-protection nonce.
pub(crate) fn new_nonce() -> String {
    use rand::distributions::Alphanumeric;
    use rand::Rng;
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonces_are_unique_and_url_safe() {
        let a = new_nonce();
        let b = new_nonce();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.bytes().all(|b| b.is_ascii_alphanumeric()));
    }

    #[test]
    fn personal_info_requires_names() {
        let mut claims = BTreeMap::new();
        claims.insert("given_name".to_string(), serde_json::json!("Grace"));
        assert!(personal_info(&claims).is_none());

        claims.insert("family_name".to_string(), serde_json::json!("Mariner"));
        claims.insert("birth_date".to_string(), serde_json::json!("1990-04-01"));
        let info = personal_info(&claims).unwrap();
        assert_eq!(info.family_name, "Mariner");
        assert_eq!(info.birth_date.unwrap().to_string(), "1990-04-01");
        assert!(info.email.is_none());
    }
}
