//! In-process domain events.
//!
//! Events are immutable facts published exactly once per lifecycle milestone.
//! Publishing awaits each subscribed handler in turn so audit records are written
//! before the request returns, but handler failures are only logged; a broken
//! subscriber can never fail, retry or roll back the orchestrator operation that
//! produced the event.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::model::{CredentialType, IssuedCredentialType};

/// A lifecycle milestone of one application.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainEvent {
    /// The candidate's PID was verified and their attributes persisted.
    ApplicationVerified {
        event_id: Uuid,
        occurred_at: DateTime<Utc>,
        application_id: Uuid,
    },
    /// A supplementary credential (diploma, seafarer, tax residency) was verified.
    QualificationVerified {
        event_id: Uuid,
        occurred_at: DateTime<Utc>,
        application_id: Uuid,
        credential: CredentialType,
    },
    /// The employment contract was signed by the candidate's wallet.
    DocumentSigned {
        event_id: Uuid,
        occurred_at: DateTime<Utc>,
        application_id: Uuid,
        document_id: Uuid,
    },
    /// A credential offer was created for the candidate's wallet.
    CredentialIssued {
        event_id: Uuid,
        occurred_at: DateTime<Utc>,
        application_id: Uuid,
        credential: IssuedCredentialType,
    },
}

impl DomainEvent {
    pub fn application_verified(application_id: Uuid) -> Self {
        Self::ApplicationVerified {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            application_id,
        }
    }

    pub fn qualification_verified(application_id: Uuid, credential: CredentialType) -> Self {
        Self::QualificationVerified {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            application_id,
            credential,
        }
    }

    pub fn document_signed(application_id: Uuid, document_id: Uuid) -> Self {
        Self::DocumentSigned {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            application_id,
            document_id,
        }
    }

    pub fn credential_issued(application_id: Uuid, credential: IssuedCredentialType) -> Self {
        Self::CredentialIssued {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            application_id,
            credential,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ApplicationVerified { .. } => "APPLICATION_VERIFIED",
            Self::QualificationVerified { .. } => "QUALIFICATION_VERIFIED",
            Self::DocumentSigned { .. } => "DOCUMENT_SIGNED",
            Self::CredentialIssued { .. } => "CREDENTIAL_ISSUED",
        }
    }

    pub fn application_id(&self) -> Uuid {
        match self {
            Self::ApplicationVerified { application_id, .. }
            | Self::QualificationVerified { application_id, .. }
            | Self::DocumentSigned { application_id, .. }
            | Self::CredentialIssued { application_id, .. } => *application_id,
        }
    }
}

#[async_trait]
pub trait EventHandler: Debug {
    async fn handle(&self, event: &DomainEvent) -> anyhow::Result<()>;
}

/// Synchronous publish/subscribe bus for [`DomainEvent`]s.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    handlers: Vec<Arc<dyn EventHandler + Send + Sync>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, handler: Arc<dyn EventHandler + Send + Sync>) {
        self.handlers.push(handler);
    }

    /// Deliver `event` to every subscriber. Handler errors are logged, never
    /// propagated.
    pub async fn publish(&self, event: DomainEvent) {
        for handler in &self.handlers {
            if let Err(e) = handler.handle(&event).await {
                tracing::error!(
                    event = event.kind(),
                    application_id = %event.application_id(),
                    "event handler failed: {e:#}"
                );
            }
        }
    }
}

/// Writes one structured audit record per domain event.
#[derive(Debug, Clone, Default)]
pub struct AuditLogHandler;

#[async_trait]
impl EventHandler for AuditLogHandler {
    async fn handle(&self, event: &DomainEvent) -> anyhow::Result<()> {
        tracing::info!(
            event = event.kind(),
            application_id = %event.application_id(),
            payload = %serde_json::to_string(event)?,
            "domain event"
        );
        Ok(())
    }
}
