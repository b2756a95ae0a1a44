//! Pre-authorized credential issuance.
//!
//! `issue` builds the credential data payload, wraps it in a signed offer request
//! JWT, exchanges it with the Issuer for a `credential_offer_url` and persists the
//! resulting offer for QR/offer-URL delivery. The wallet claims the offer out of
//! band; `mark_claimed` is called when the Issuer confirms the claim.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};
use url::Url;
use uuid::Uuid;
use vc_recruit_frontend::CredentialOfferView;

use crate::config::{BaseUrl, IssuerConfig};
use crate::error::{Error, Result};
use crate::event::{DomainEvent, EventBus};
use crate::jwt::{sign_jwt, JwtSigner};
use crate::lifecycle::ApplicationStatus;
use crate::model::{Application, IssuedCredential, IssuedCredentialType, Vacancy};
use crate::store::{ApplicationStore, IssuedCredentialStore, VacancyStore};

const PRE_AUTHORIZED_GRANT: &str = "urn:ietf:params:oauth:grant-type:pre-authorized_code";

/// Validity window of both the offer request JWT and the resulting offer.
const OFFER_TTL_SECS: i64 = 300;

#[derive(Debug, Serialize)]
struct OfferRequestClaims {
    iss: String,
    aud: String,
    iat: i64,
    exp: i64,
    grants: Vec<String>,
    credentials: Vec<OfferedCredential>,
}

#[derive(Debug, Serialize)]
struct OfferedCredential {
    credential_configuration_id: String,
    data: Json,
}

/// Wire response from the Issuer for an accepted offer request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferResponse {
    pub credential_offer_url: Url,
    pub pre_authorized_code: String,
    /// Present for PIN-gated offers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp: Option<String>,
}

/// The Issuer service contract, core-facing side only.
#[async_trait]
pub trait IssuerClient: Debug {
    async fn request_offer(&self, signed_jwt: &str) -> Result<OfferResponse>;
}

/// [`IssuerClient`] over the Issuer's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpIssuerClient {
    http: reqwest::Client,
    api: BaseUrl,
}

impl HttpIssuerClient {
    pub fn new(api: BaseUrl) -> Self {
        Self {
            http: reqwest::Client::new(),
            api,
        }
    }

    fn unavailable(e: impl Into<anyhow::Error>) -> Error {
        Error::ExternalService {
            service: "issuer".to_string(),
            source: e.into(),
        }
    }
}

#[async_trait]
impl IssuerClient for HttpIssuerClient {
    async fn request_offer(&self, signed_jwt: &str) -> Result<OfferResponse> {
        let url = self
            .api
            .join("credential-offers")
            .map_err(|e| Self::unavailable(e))?;
        let response = self
            .http
            .post(url)
            .header(http::header::CONTENT_TYPE, "application/jwt")
            .body(signed_jwt.to_string())
            .send()
            .await
            .map_err(Self::unavailable)?;

        if response.status().is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Validation(format!("issuer rejected offer: {body}")));
        }
        let response = response.error_for_status().map_err(Self::unavailable)?;
        response.json().await.map_err(Self::unavailable)
    }
}

/// Options for one issuance.
#[derive(Debug, Clone, Copy, Default)]
pub struct IssueOptions {
    /// Ask the Issuer to gate the offer behind a one-time PIN.
    pub otp_required: bool,
}

/// Drives credential issuance for one deployment.
#[derive(Debug, Clone)]
pub struct IssuanceOrchestrator {
    pub(crate) applications: Arc<dyn ApplicationStore + Send + Sync>,
    pub(crate) vacancies: Arc<dyn VacancyStore + Send + Sync>,
    pub(crate) issued: Arc<dyn IssuedCredentialStore + Send + Sync>,
    pub(crate) issuer: Arc<dyn IssuerClient + Send + Sync>,
    pub(crate) signer: Arc<dyn JwtSigner + Send + Sync>,
    pub(crate) events: EventBus,
    pub(crate) config: IssuerConfig,
    pub(crate) origin: BaseUrl,
}

impl IssuanceOrchestrator {
    /// Create a pre-authorized credential offer for the application.
    ///
    /// Issuing the employee credential moves the application into ISSUING; the
    /// informational application receipt never changes the lifecycle. A still-valid
    /// unclaimed offer of the same type is returned as-is; a claimed one fails with
    /// `AlreadyIssued`. Nothing is persisted when the Issuer rejects the request.
    pub async fn issue(
        &self,
        application_id: Uuid,
        kind: IssuedCredentialType,
        options: IssueOptions,
    ) -> Result<CredentialOfferView> {
        let application = self.applications.get(application_id).await?;

        let existing = self.issued.find_by_type(application_id, kind).await?;
        if existing.iter().any(|c| c.claimed) {
            return Err(Error::AlreadyIssued(format!(
                "{kind} for application {application_id}"
            )));
        }
        if let Some(open) = existing.iter().find(|c| !c.claimed && !c.is_expired()) {
            tracing::debug!(%application_id, credential = %kind, "reusing open credential offer");
            return Ok(offer_view(open));
        }

        // The employee credential is only issuable once the contract is signed (and
        // tax residency, where required, is verified).
        if kind == IssuedCredentialType::EmployeeId {
            application.status.advance_to(ApplicationStatus::Issuing)?;
        }

        let data = match kind {
            IssuedCredentialType::EmployeeId => {
                let vacancy = self.vacancies.get(application.vacancy_id).await?;
                employee_data(&application, &vacancy, &self.config.employer)?
            }
            IssuedCredentialType::ApplicationReceipt => receipt_data(&application),
        };

        let iat = Utc::now().timestamp();
        let claims = OfferRequestClaims {
            iss: self.origin.as_str().trim_end_matches('/').to_string(),
            aud: self.config.api.as_str().trim_end_matches('/').to_string(),
            iat,
            exp: iat + OFFER_TTL_SECS,
            grants: vec![PRE_AUTHORIZED_GRANT.to_string()],
            credentials: vec![OfferedCredential {
                credential_configuration_id: kind.configuration_id().to_string(),
                data: json!({ "otp_required": options.otp_required, "claims": data }),
            }],
        };
        let jwt = sign_jwt(&claims, self.signer.as_ref()).await?;

        // Nothing is persisted until the Issuer has accepted the request.
        let offer = self.issuer.request_offer(&jwt).await?;

        let credential = IssuedCredential {
            id: Uuid::new_v4(),
            application_id,
            kind,
            pre_authorized_code: offer.pre_authorized_code,
            credential_offer_url: offer.credential_offer_url.to_string(),
            otp: offer.otp,
            data,
            claimed: false,
            claimed_at: None,
            expires_at: Utc::now() + Duration::seconds(OFFER_TTL_SECS),
            created_at: Utc::now(),
        };
        self.issued.insert(credential.clone()).await?;

        if kind == IssuedCredentialType::EmployeeId {
            self.applications
                .update_status(application_id, application.status, ApplicationStatus::Issuing)
                .await?;
        }

        self.events
            .publish(DomainEvent::credential_issued(application_id, kind))
            .await;

        Ok(offer_view(&credential))
    }

    /// Mark an offer as claimed by the wallet. The employee credential claim
    /// completes the lifecycle (ISSUING -> ISSUED). An offer past its validity
    /// window can no longer be claimed.
    pub async fn mark_claimed(&self, pre_authorized_code: &str) -> Result<()> {
        let mut credential = self
            .issued
            .find_by_code(pre_authorized_code)
            .await?
            .ok_or_else(|| Error::NotFound("credential offer".to_string()))?;
        if credential.claimed {
            return Err(Error::AlreadyIssued(format!(
                "{} for application {}",
                credential.kind, credential.application_id
            )));
        }
        if credential.is_expired() {
            return Err(Error::Validation(format!(
                "offer for {} expired at {}",
                credential.kind, credential.expires_at
            )));
        }

        credential.claimed = true;
        credential.claimed_at = Some(Utc::now());
        self.issued.update(credential.clone()).await?;

        if credential.kind == IssuedCredentialType::EmployeeId {
            self.applications
                .update_status(
                    credential.application_id,
                    ApplicationStatus::Issuing,
                    ApplicationStatus::Issued,
                )
                .await?;
        }
        Ok(())
    }
}

fn offer_view(credential: &IssuedCredential) -> CredentialOfferView {
    CredentialOfferView {
        credential_offer_url: credential.credential_offer_url.clone(),
        otp: credential.otp.clone(),
    }
}

/// Identity claims for the employee credential, from the PID-verified candidate
/// attributes plus the vacancy.
fn employee_data(application: &Application, vacancy: &Vacancy, employer: &str) -> Result<Json> {
    let candidate = application.candidate.as_ref().ok_or_else(|| {
        Error::Validation("application has no verified candidate attributes".into())
    })?;
    Ok(json!({
        "family_name": candidate.family_name,
        "given_name": candidate.given_name,
        "birth_date": candidate.birth_date,
        "nationality": candidate.nationality,
        "email": candidate.email,
        "mobile_phone_number": candidate.mobile,
        "employer": employer,
        "position": vacancy.title,
        "employment_start_date": Utc::now().date_naive(),
    }))
}

fn receipt_data(application: &Application) -> Json {
    json!({
        "application_id": application.id,
        "vacancy_id": application.vacancy_id,
        "submitted_at": application.created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn employee_data_requires_verified_candidate() {
        let application = Application::new(Uuid::new_v4());
        let vacancy = Vacancy {
            id: application.vacancy_id,
            title: "Deck Officer".into(),
            required_credentials: vec![],
        };
        assert!(matches!(
            employee_data(&application, &vacancy, "Example Shipping Ltd"),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn receipt_data_carries_the_application_reference() {
        let application = Application::new(Uuid::new_v4());
        let data = receipt_data(&application);
        assert_eq!(data["application_id"], json!(application.id));
        assert_eq!(data["vacancy_id"], json!(application.vacancy_id));
    }
}
