//! Composition root for the credential exchange workflow.
//!
//! All collaborators are injected through the builder once at process start;
//! orchestrators share the same stores, signer and event bus. Page-level use cases
//! (create, page access, finalize, views) live here too.

use std::sync::Arc;

use anyhow::bail;
use uuid::Uuid;
use vc_recruit_frontend::{ApplicationView, CandidateView, PageAccess};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::event::EventBus;
use crate::issuance::{IssuanceOrchestrator, IssuerClient};
use crate::jwt::JwtSigner;
use crate::lifecycle::{self, ApplicationStatus, Page};
use crate::model::Application;
use crate::signing::{ContractSource, SigningOrchestrator};
use crate::store::{
    ApplicationStore, IssuedCredentialStore, SignedDocumentStore, VacancyStore,
    VerifiedCredentialStore,
};
use crate::verification::{VerificationExchange, VerifierClient};

/// The fully wired workflow.
#[derive(Debug, Clone)]
pub struct Workflow {
    applications: Arc<dyn ApplicationStore + Send + Sync>,
    vacancies: Arc<dyn VacancyStore + Send + Sync>,
    credentials: Arc<dyn VerifiedCredentialStore + Send + Sync>,
    issued: Arc<dyn IssuedCredentialStore + Send + Sync>,
    verification: VerificationExchange,
    signing: SigningOrchestrator,
    issuance: IssuanceOrchestrator,
}

impl Workflow {
    pub fn builder() -> WorkflowBuilder {
        WorkflowBuilder::default()
    }

    /// The verification initiator/poller.
    pub fn verification(&self) -> &VerificationExchange {
        &self.verification
    }

    /// The contract signing orchestrator.
    pub fn signing(&self) -> &SigningOrchestrator {
        &self.signing
    }

    /// The credential issuance orchestrator.
    pub fn issuance(&self) -> &IssuanceOrchestrator {
        &self.issuance
    }

    /// Persist a new application for a vacancy (status CREATED).
    pub async fn create_application(&self, vacancy_id: Uuid) -> Result<Application> {
        // Reject unknown vacancies up front.
        let _ = self.vacancies.get(vacancy_id).await?;
        let application = Application::new(vacancy_id);
        self.applications.insert(application.clone()).await?;
        tracing::debug!(application_id = %application.id, %vacancy_id, "application created");
        Ok(application)
    }

    /// Page-access decision for a candidate-facing page.
    pub async fn page_access(&self, page: Page, application_id: Uuid) -> Result<PageAccess> {
        let application = self.applications.get(application_id).await?;
        let vacancy = self.vacancies.get(application.vacancy_id).await?;
        let credentials = self.credentials.find_by_application(application_id).await?;
        let issued = self.issued.find_by_application(application_id).await?;
        Ok(lifecycle::page_access(
            page,
            &application,
            &vacancy,
            &credentials,
            &issued,
        ))
    }

    /// The candidate has reviewed all verified data; contract signing may begin.
    pub async fn finalize(&self, application_id: Uuid) -> Result<Application> {
        let application = self.applications.get(application_id).await?;
        let vacancy = self.vacancies.get(application.vacancy_id).await?;

        let expected = match application.status {
            ApplicationStatus::Verified if vacancy.qualification_credentials().is_empty() => {
                ApplicationStatus::Verified
            }
            ApplicationStatus::Qualified => ApplicationStatus::Qualified,
            other => {
                return Err(Error::InvalidTransition(format!("{other} -> FINALIZED")));
            }
        };
        self.applications
            .update_status(application_id, expected, ApplicationStatus::Finalized)
            .await
    }

    /// Plain DTO of the application for the presentation layer.
    pub async fn application_view(&self, application_id: Uuid) -> Result<ApplicationView> {
        let application = self.applications.get(application_id).await?;
        Ok(ApplicationView {
            id: application.id.to_string(),
            vacancy_id: application.vacancy_id.to_string(),
            status: application.status.to_string(),
            candidate: application.candidate.map(|c| CandidateView {
                family_name: c.family_name,
                given_name: c.given_name,
                birth_date: c.birth_date.map(|d| d.to_string()),
                nationality: c.nationality,
                email: c.email,
                mobile: c.mobile,
            }),
            details: None,
        })
    }
}

/// Builder struct for [Workflow].
#[derive(Debug, Default)]
pub struct WorkflowBuilder {
    config: Option<Config>,
    applications: Option<Arc<dyn ApplicationStore + Send + Sync>>,
    vacancies: Option<Arc<dyn VacancyStore + Send + Sync>>,
    credentials: Option<Arc<dyn VerifiedCredentialStore + Send + Sync>>,
    documents: Option<Arc<dyn SignedDocumentStore + Send + Sync>>,
    issued: Option<Arc<dyn IssuedCredentialStore + Send + Sync>>,
    verifier: Option<Arc<dyn VerifierClient + Send + Sync>>,
    issuer: Option<Arc<dyn IssuerClient + Send + Sync>>,
    contracts: Option<Arc<dyn ContractSource + Send + Sync>>,
    signer: Option<Arc<dyn JwtSigner + Send + Sync>>,
    events: EventBus,
}

impl WorkflowBuilder {
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_application_store(
        mut self,
        store: Arc<dyn ApplicationStore + Send + Sync>,
    ) -> Self {
        self.applications = Some(store);
        self
    }

    pub fn with_vacancy_store(mut self, store: Arc<dyn VacancyStore + Send + Sync>) -> Self {
        self.vacancies = Some(store);
        self
    }

    pub fn with_credential_store(
        mut self,
        store: Arc<dyn VerifiedCredentialStore + Send + Sync>,
    ) -> Self {
        self.credentials = Some(store);
        self
    }

    pub fn with_document_store(
        mut self,
        store: Arc<dyn SignedDocumentStore + Send + Sync>,
    ) -> Self {
        self.documents = Some(store);
        self
    }

    pub fn with_issued_store(
        mut self,
        store: Arc<dyn IssuedCredentialStore + Send + Sync>,
    ) -> Self {
        self.issued = Some(store);
        self
    }

    pub fn with_verifier_client(mut self, client: Arc<dyn VerifierClient + Send + Sync>) -> Self {
        self.verifier = Some(client);
        self
    }

    pub fn with_issuer_client(mut self, client: Arc<dyn IssuerClient + Send + Sync>) -> Self {
        self.issuer = Some(client);
        self
    }

    pub fn with_contract_source(mut self, source: Arc<dyn ContractSource + Send + Sync>) -> Self {
        self.contracts = Some(source);
        self
    }

    pub fn with_signer(mut self, signer: Arc<dyn JwtSigner + Send + Sync>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_event_handler(
        mut self,
        handler: Arc<dyn crate::event::EventHandler + Send + Sync>,
    ) -> Self {
        self.events.subscribe(handler);
        self
    }

    /// Build the workflow.
    pub fn build(self) -> anyhow::Result<Workflow> {
        let Self {
            config,
            applications,
            vacancies,
            credentials,
            documents,
            issued,
            verifier,
            issuer,
            contracts,
            signer,
            events,
        } = self;

        let Some(config) = config else {
            bail!("config is required, see `with_config`")
        };
        let Some(applications) = applications else {
            bail!("application store is required, see `with_application_store`")
        };
        let Some(vacancies) = vacancies else {
            bail!("vacancy store is required, see `with_vacancy_store`")
        };
        let Some(credentials) = credentials else {
            bail!("credential store is required, see `with_credential_store`")
        };
        let Some(documents) = documents else {
            bail!("document store is required, see `with_document_store`")
        };
        let Some(issued) = issued else {
            bail!("issued credential store is required, see `with_issued_store`")
        };
        let Some(verifier) = verifier else {
            bail!("verifier client is required, see `with_verifier_client`")
        };
        let Some(issuer) = issuer else {
            bail!("issuer client is required, see `with_issuer_client`")
        };
        let Some(contracts) = contracts else {
            bail!("contract source is required, see `with_contract_source`")
        };
        let Some(signer) = signer else {
            bail!("signer is required, see `with_signer`")
        };

        let verification = VerificationExchange {
            applications: applications.clone(),
            vacancies: vacancies.clone(),
            credentials: credentials.clone(),
            verifier,
            events: events.clone(),
            config: config.verifier.clone(),
            origin: config.origin.clone(),
        };
        let signing = SigningOrchestrator {
            applications: applications.clone(),
            documents,
            contracts,
            signer: signer.clone(),
            events: events.clone(),
            config: config.signing.clone(),
            origin: config.origin.clone(),
        };
        let issuance = IssuanceOrchestrator {
            applications: applications.clone(),
            vacancies: vacancies.clone(),
            issued: issued.clone(),
            issuer,
            signer,
            events,
            config: config.issuer.clone(),
            origin: config.origin.clone(),
        };

        Ok(Workflow {
            applications,
            vacancies,
            credentials,
            issued,
            verification,
            signing,
            issuance,
        })
    }
}
