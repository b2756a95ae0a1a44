//! Orchestration core for a recruitment application built on Verifiable Credentials.
//!
//! A candidate applies for a vacancy, proves their identity (and any vacancy-specific
//! qualifications) from their wallet over OpenID4VP, signs the employment contract
//! with a Qualified Electronic Signature, and finally receives an employee credential
//! over OpenID4VCI. This crate owns the lifecycle state machine that sequences those
//! stages and the orchestrators that drive each external protocol interaction; the
//! rendering layer, persistence and the Verifier/Issuer services themselves are
//! collaborators behind traits.
//!
//! # Usage
//!
//! Wire the workflow once at process start:
//!
//! ```ignore
//! use std::sync::Arc;
//! use vc_recruit::workflow::Workflow;
//! use vc_recruit::lifecycle::Page;
//! use vc_recruit::event::AuditLogHandler;
//!
//! let workflow = Workflow::builder()
//!     .with_config(config)
//!     .with_application_store(applications)
//!     .with_vacancy_store(vacancies)
//!     .with_credential_store(credentials)
//!     .with_document_store(documents)
//!     .with_issued_store(issued)
//!     .with_verifier_client(verifier)
//!     .with_issuer_client(issuer)
//!     .with_contract_source(contracts)
//!     .with_signer(signer)
//!     .with_event_handler(Arc::new(AuditLogHandler))
//!     .build()?;
//!
//! // A page handler first asks the state machine whether rendering is allowed.
//! let access = workflow.page_access(Page::Verify, application_id).await?;
//!
//! // Open a PID presentation transaction and render the deep link as a QR code.
//! let link = workflow.verification().initiate(application_id, false).await?;
//!
//! // The frontend polls until the wallet has responded.
//! while !workflow.verification().poll(application_id, None).await? {
//!     // wait 1.5-2s between polls
//! }
//! ```
//!
//! # Lifecycle
//!
//! ```text
//! CREATED -> VERIFYING -> VERIFIED -> (QUALIFYING -> QUALIFIED)? -> FINALIZED
//!         -> SIGNING -> SIGNED -> (TAX_QUALIFYING -> TAX_QUALIFIED)? -> ISSUING -> ISSUED
//! ```
//!
//! Statuses only move forward; every edge has exactly one writing orchestrator and
//! every status write is a compare-and-swap, so concurrent duplicate requests (two
//! browser tabs polling the same transaction) cannot double-apply a transition. See
//! [`lifecycle`] for the graph and the page-access rules derived from it.
//!
//! All waiting on external actors is client-driven polling; the core exposes no
//! webhook surface. The presentation layer consumes only the plain DTOs from the
//! `vc-recruit-frontend` crate.

pub mod config;
pub mod decoder;
pub mod error;
pub mod event;
pub mod issuance;
pub mod jwt;
pub mod lifecycle;
pub mod model;
pub mod query;
pub mod signing;
pub mod store;
pub mod verification;
pub mod workflow;

pub use error::{Error, Result};
pub use vc_recruit_frontend as frontend;
