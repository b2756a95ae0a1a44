//! Persisted aggregates of the recruitment workflow.
//!
//! Each aggregate carries a closed status enumeration; transition logic lives in
//! [`crate::lifecycle`] and the orchestrator modules, which are the only writers of
//! the status fields.

mod application;
mod credential;
mod document;
mod issued;

pub use application::{Application, PersonalInfo, Vacancy};
pub use credential::{ClaimMap, CredentialType, VerificationStatus, VerifiedCredential};
pub use document::{SignedDocument, SigningStatus};
pub use issued::{IssuedCredential, IssuedCredentialType};
