//! Recruitment workflow data structures that are needed on the frontend, without all of the
//! other dependencies that can cause compilation issues with web targets.
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Page-access decision for a candidate-facing page.
///
/// The presentation layer must treat `NotFound` as a hard 404 and `Redirect` as an
/// immediate navigation override, never rendering page content in either case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum PageAccess {
    /// The page may be rendered.
    Allowed,
    /// The candidate must be navigated to another page before anything is rendered.
    Redirect { path: String },
    /// The page does not exist for this application (e.g. a qualification page for a
    /// vacancy without qualification requirements).
    NotFound,
}

/// How the candidate's wallet should be reached for a verification or signing transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "url", rename_all = "snake_case")]
pub enum WalletTarget {
    /// Cross-device: render the URL as a QR code for the wallet to scan.
    DeepLink(String),
    /// Same-device: navigate the browser straight to the wallet.
    Redirect(String),
}

/// A wallet-facing link for an open transaction, polled by the frontend until the
/// wallet responds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletLink {
    /// Correlation id the frontend uses to poll for the transaction status.
    pub transaction_id: String,
    pub target: WalletTarget,
}

/// A credential offer ready for QR/offer-URL delivery to the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialOfferView {
    pub credential_offer_url: String,
    /// One-time PIN for PIN-gated issuance flows, to be displayed to the candidate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp: Option<String>,
}

/// Candidate attributes as shown on review pages. Populated only after PID verification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateView {
    pub family_name: String,
    pub given_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nationality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile: Option<String>,
}

/// Plain view of one application, consumed verbatim by the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationView {
    pub id: String,
    pub vacancy_id: String,
    /// Lifecycle status as a SCREAMING_SNAKE_CASE tag, e.g. `VERIFYING`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate: Option<CandidateView>,
    /// Extra page-specific data (verified claims, offer details, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Json>,
}
