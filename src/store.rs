//! Storage seams for the workflow aggregates.
//!
//! One async trait per aggregate, held as `Arc<dyn … + Send + Sync>` by the
//! orchestrators. The in-memory implementations back the test suite and local runs;
//! a production deployment supplies its own impls over the real entity store.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::lifecycle::ApplicationStatus;
use crate::model::{
    Application, IssuedCredential, IssuedCredentialType, SignedDocument, Vacancy,
    VerifiedCredential,
};

#[async_trait]
pub trait ApplicationStore: Debug {
    async fn insert(&self, application: Application) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Application>;

    /// Replace the application's non-status fields.
    async fn update(&self, application: Application) -> Result<()>;

    /// Compare-and-swap status write: fails with `InvalidTransition` when the stored
    /// status no longer matches `expected`, so concurrent duplicate requests cannot
    /// double-apply a transition.
    async fn update_status(
        &self,
        id: Uuid,
        expected: ApplicationStatus,
        next: ApplicationStatus,
    ) -> Result<Application>;
}

#[async_trait]
pub trait VacancyStore: Debug {
    async fn insert(&self, vacancy: Vacancy) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Vacancy>;
}

#[async_trait]
pub trait VerifiedCredentialStore: Debug {
    async fn insert(&self, credential: VerifiedCredential) -> Result<()>;

    async fn update(&self, credential: VerifiedCredential) -> Result<()>;

    /// All verification attempts for an application, oldest first.
    async fn find_by_application(&self, application_id: Uuid) -> Result<Vec<VerifiedCredential>>;
}

#[async_trait]
pub trait SignedDocumentStore: Debug {
    async fn insert(&self, document: SignedDocument) -> Result<()>;

    async fn update(&self, document: SignedDocument) -> Result<()>;

    async fn find_by_state(&self, state: &str) -> Result<Option<SignedDocument>>;

    /// The most recently created signing transaction for an application, if any.
    async fn latest_for_application(&self, application_id: Uuid)
        -> Result<Option<SignedDocument>>;
}

#[async_trait]
pub trait IssuedCredentialStore: Debug {
    async fn insert(&self, credential: IssuedCredential) -> Result<()>;

    async fn update(&self, credential: IssuedCredential) -> Result<()>;

    async fn find_by_application(&self, application_id: Uuid) -> Result<Vec<IssuedCredential>>;

    async fn find_by_code(&self, pre_authorized_code: &str) -> Result<Option<IssuedCredential>>;

    async fn find_by_type(
        &self,
        application_id: Uuid,
        kind: IssuedCredentialType,
    ) -> Result<Vec<IssuedCredential>>;
}

/// A local in-memory store. Not for production use!
///
/// # Warning
/// These in-memory stores should only be used for test purposes, they will not work
/// for a distributed deployment.
#[derive(Debug, Clone, Default)]
pub struct MemoryApplicationStore {
    store: Arc<Mutex<BTreeMap<Uuid, Application>>>,
}

#[async_trait]
impl ApplicationStore for MemoryApplicationStore {
    async fn insert(&self, application: Application) -> Result<()> {
        self.store.lock().await.insert(application.id, application);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Application> {
        self.store
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("application {id}")))
    }

    async fn update(&self, application: Application) -> Result<()> {
        let mut store = self.store.lock().await;
        let entry = store
            .get_mut(&application.id)
            .ok_or_else(|| Error::NotFound(format!("application {}", application.id)))?;
        *entry = Application {
            updated_at: Utc::now(),
            ..application
        };
        Ok(())
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected: ApplicationStatus,
        next: ApplicationStatus,
    ) -> Result<Application> {
        let mut store = self.store.lock().await;
        let entry = store
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("application {id}")))?;
        if entry.status != expected {
            return Err(Error::InvalidTransition(format!(
                "expected {expected}, found {}",
                entry.status
            )));
        }
        entry.status = next;
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryVacancyStore {
    store: Arc<Mutex<BTreeMap<Uuid, Vacancy>>>,
}

#[async_trait]
impl VacancyStore for MemoryVacancyStore {
    async fn insert(&self, vacancy: Vacancy) -> Result<()> {
        self.store.lock().await.insert(vacancy.id, vacancy);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Vacancy> {
        self.store
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("vacancy {id}")))
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryVerifiedCredentialStore {
    store: Arc<Mutex<BTreeMap<Uuid, VerifiedCredential>>>,
}

#[async_trait]
impl VerifiedCredentialStore for MemoryVerifiedCredentialStore {
    async fn insert(&self, credential: VerifiedCredential) -> Result<()> {
        self.store.lock().await.insert(credential.id, credential);
        Ok(())
    }

    async fn update(&self, credential: VerifiedCredential) -> Result<()> {
        let mut store = self.store.lock().await;
        let entry = store
            .get_mut(&credential.id)
            .ok_or_else(|| Error::NotFound(format!("verified credential {}", credential.id)))?;
        *entry = credential;
        Ok(())
    }

    async fn find_by_application(&self, application_id: Uuid) -> Result<Vec<VerifiedCredential>> {
        let mut found: Vec<_> = self
            .store
            .lock()
            .await
            .values()
            .filter(|c| c.application_id == application_id)
            .cloned()
            .collect();
        found.sort_by_key(|c| c.created_at);
        Ok(found)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemorySignedDocumentStore {
    store: Arc<Mutex<BTreeMap<Uuid, SignedDocument>>>,
}

#[async_trait]
impl SignedDocumentStore for MemorySignedDocumentStore {
    async fn insert(&self, document: SignedDocument) -> Result<()> {
        self.store.lock().await.insert(document.id, document);
        Ok(())
    }

    async fn update(&self, document: SignedDocument) -> Result<()> {
        let mut store = self.store.lock().await;
        let entry = store
            .get_mut(&document.id)
            .ok_or_else(|| Error::NotFound(format!("signed document {}", document.id)))?;
        *entry = document;
        Ok(())
    }

    async fn find_by_state(&self, state: &str) -> Result<Option<SignedDocument>> {
        Ok(self
            .store
            .lock()
            .await
            .values()
            .find(|d| d.state == state)
            .cloned())
    }

    async fn latest_for_application(
        &self,
        application_id: Uuid,
    ) -> Result<Option<SignedDocument>> {
        Ok(self
            .store
            .lock()
            .await
            .values()
            .filter(|d| d.application_id == application_id)
            .max_by_key(|d| d.created_at)
            .cloned())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryIssuedCredentialStore {
    store: Arc<Mutex<BTreeMap<Uuid, IssuedCredential>>>,
}

#[async_trait]
impl IssuedCredentialStore for MemoryIssuedCredentialStore {
    async fn insert(&self, credential: IssuedCredential) -> Result<()> {
        self.store.lock().await.insert(credential.id, credential);
        Ok(())
    }

    async fn update(&self, credential: IssuedCredential) -> Result<()> {
        let mut store = self.store.lock().await;
        let entry = store
            .get_mut(&credential.id)
            .ok_or_else(|| Error::NotFound(format!("issued credential {}", credential.id)))?;
        *entry = credential;
        Ok(())
    }

    async fn find_by_application(&self, application_id: Uuid) -> Result<Vec<IssuedCredential>> {
        let mut found: Vec<_> = self
            .store
            .lock()
            .await
            .values()
            .filter(|c| c.application_id == application_id)
            .cloned()
            .collect();
        found.sort_by_key(|c| c.created_at);
        Ok(found)
    }

    async fn find_by_code(&self, pre_authorized_code: &str) -> Result<Option<IssuedCredential>> {
        Ok(self
            .store
            .lock()
            .await
            .values()
            .find(|c| c.pre_authorized_code == pre_authorized_code)
            .cloned())
    }

    async fn find_by_type(
        &self,
        application_id: Uuid,
        kind: IssuedCredentialType,
    ) -> Result<Vec<IssuedCredential>> {
        Ok(self
            .store
            .lock()
            .await
            .values()
            .filter(|c| c.application_id == application_id && c.kind == kind)
            .cloned()
            .collect())
    }
}
