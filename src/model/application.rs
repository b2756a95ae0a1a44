use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::lifecycle::ApplicationStatus;
use crate::model::CredentialType;

/// Candidate attributes extracted from a verified PID credential.
///
/// The whole record is populated atomically by the PID verification step; an
/// application either has no candidate data or all of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalInfo {
    pub family_name: String,
    pub given_name: String,
    pub birth_date: Option<NaiveDate>,
    pub nationality: Option<String>,
    pub email: Option<String>,
    pub mobile: Option<String>,
}

/// The aggregate root tracking one candidate's journey for one vacancy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: Uuid,
    pub vacancy_id: Uuid,
    pub status: ApplicationStatus,
    /// `None` until the PID credential has been verified.
    pub candidate: Option<PersonalInfo>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Application {
    pub fn new(vacancy_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            vacancy_id,
            status: ApplicationStatus::Created,
            candidate: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// An open position a candidate can apply for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vacancy {
    pub id: Uuid,
    pub title: String,
    /// Supplementary credentials the candidate must present beyond the PID.
    pub required_credentials: Vec<CredentialType>,
}

impl Vacancy {
    pub fn requires(&self, kind: CredentialType) -> bool {
        self.required_credentials.contains(&kind)
    }

    /// The qualification credentials gating the `/qualifications` stage.
    pub fn qualification_credentials(&self) -> Vec<CredentialType> {
        self.required_credentials
            .iter()
            .copied()
            .filter(|kind| matches!(kind, CredentialType::Diploma | CredentialType::Seafarer))
            .collect()
    }

    pub fn requires_tax_residency(&self) -> bool {
        self.requires(CredentialType::TaxResidency)
    }
}
