//! The application lifecycle state machine.
//!
//! States advance one-directionally along a fixed graph; each edge has exactly one
//! writer (the orchestrator completing that unit of work), and every status write
//! goes through the store's compare-and-swap so concurrent duplicate requests cannot
//! double-apply a transition.

use std::fmt;

use serde::{Deserialize, Serialize};
use vc_recruit_frontend::PageAccess;

use crate::error::{Error, Result};
use crate::model::{Application, IssuedCredential, Vacancy, VerificationStatus, VerifiedCredential};

/// Lifecycle status of an [`Application`].
///
/// ```text
/// CREATED -> VERIFYING -> VERIFIED -> (QUALIFYING -> QUALIFIED)? -> FINALIZED
///         -> SIGNING -> SIGNED -> (TAX_QUALIFYING -> TAX_QUALIFIED)? -> ISSUING -> ISSUED
/// ```
///
/// The qualification and tax-residency stages only exist for vacancies that request
/// the corresponding credentials. `VERIFICATION_FAILED` is a terminal side state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    Created,
    Verifying,
    Verified,
    Qualifying,
    Qualified,
    Finalized,
    Signing,
    Signed,
    TaxQualifying,
    TaxQualified,
    Issuing,
    Issued,
    VerificationFailed,
}

impl ApplicationStatus {
    /// Whether `next` is a legal successor of `self` on the lifecycle graph.
    ///
    /// Exhaustive over both statuses so that adding a state forces every call site
    /// to be revisited at compile time.
    pub fn can_advance_to(self, next: Self) -> bool {
        use ApplicationStatus::*;
        match self {
            Created => matches!(next, Verifying),
            Verifying => matches!(next, Verified | VerificationFailed),
            Verified => matches!(next, Qualifying | Finalized),
            Qualifying => matches!(next, Qualified | VerificationFailed),
            Qualified => matches!(next, Finalized),
            Finalized => matches!(next, Signing),
            Signing => matches!(next, Signed),
            Signed => matches!(next, TaxQualifying | Issuing),
            TaxQualifying => matches!(next, TaxQualified),
            TaxQualified => matches!(next, Issuing),
            Issuing => matches!(next, Issued),
            Issued | VerificationFailed => false,
        }
    }

    /// Check a transition, returning the successor status for chaining into a
    /// compare-and-swap store write.
    pub fn advance_to(self, next: Self) -> Result<Self> {
        if self.can_advance_to(next) {
            Ok(next)
        } else {
            Err(Error::InvalidTransition(format!("{self} -> {next}")))
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Issued | Self::VerificationFailed)
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Self::Created => "CREATED",
            Self::Verifying => "VERIFYING",
            Self::Verified => "VERIFIED",
            Self::Qualifying => "QUALIFYING",
            Self::Qualified => "QUALIFIED",
            Self::Finalized => "FINALIZED",
            Self::Signing => "SIGNING",
            Self::Signed => "SIGNED",
            Self::TaxQualifying => "TAX_QUALIFYING",
            Self::TaxQualified => "TAX_QUALIFIED",
            Self::Issuing => "ISSUING",
            Self::Issued => "ISSUED",
            Self::VerificationFailed => "VERIFICATION_FAILED",
        };
        f.write_str(tag)
    }
}

/// Candidate-facing pages whose access is gated by the lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Verify,
    Qualifications,
    Finalise,
    Sign,
    TaxResidency,
    Credentials,
}

impl Page {
    pub fn path(self) -> &'static str {
        match self {
            Self::Verify => "/verify",
            Self::Qualifications => "/qualifications",
            Self::Finalise => "/finalise",
            Self::Sign => "/sign",
            Self::TaxResidency => "/tax-residency",
            Self::Credentials => "/credentials",
        }
    }
}

/// The page the application's current stage belongs to, given the vacancy's
/// requirements. `None` only for the terminal failure state.
fn stage_page(status: ApplicationStatus, vacancy: &Vacancy) -> Option<Page> {
    use ApplicationStatus::*;
    let page = match status {
        Created | Verifying | VerificationFailed => Page::Verify,
        Qualifying => Page::Qualifications,
        Verified => {
            if vacancy.qualification_credentials().is_empty() {
                Page::Finalise
            } else {
                Page::Qualifications
            }
        }
        Qualified | Finalized => Page::Finalise,
        Signing => Page::Sign,
        TaxQualifying => Page::TaxResidency,
        Signed => {
            if vacancy.requires_tax_residency() {
                Page::TaxResidency
            } else {
                Page::Credentials
            }
        }
        TaxQualified | Issuing | Issued => Page::Credentials,
    };
    Some(page)
}

/// Compute the access decision for a page, as a pure function of the application
/// status, the vacancy's required-credential set and the credential rows on file.
///
/// Callers must treat `NotFound` as a hard 404 and `Redirect` as an immediate
/// navigation override.
pub fn page_access(
    page: Page,
    application: &Application,
    vacancy: &Vacancy,
    credentials: &[VerifiedCredential],
    issued: &[IssuedCredential],
) -> PageAccess {
    // Pages for optional stages do not exist when the vacancy never enters them.
    match page {
        Page::Qualifications if vacancy.qualification_credentials().is_empty() => {
            return PageAccess::NotFound;
        }
        Page::TaxResidency if !vacancy.requires_tax_residency() => {
            return PageAccess::NotFound;
        }
        _ => {}
    }

    let Some(current) = stage_page(application.status, vacancy) else {
        return PageAccess::NotFound;
    };

    if page == current {
        // The offer page is only renderable once an offer row actually exists.
        if page == Page::Credentials
            && matches!(
                application.status,
                ApplicationStatus::Issuing | ApplicationStatus::Issued
            )
            && issued.is_empty()
        {
            return PageAccess::Redirect {
                path: Page::Sign.path().to_string(),
            };
        }
        return PageAccess::Allowed;
    }

    // Finalise stays reachable from the qualifications page once every required
    // qualification has a verified row, so the review can begin without another
    // round trip through the state machine.
    if page == Page::Finalise
        && application.status == ApplicationStatus::Qualifying
        && qualifications_complete(vacancy, credentials)
    {
        return PageAccess::Allowed;
    }

    PageAccess::Redirect {
        path: current.path().to_string(),
    }
}

fn qualifications_complete(vacancy: &Vacancy, credentials: &[VerifiedCredential]) -> bool {
    vacancy.qualification_credentials().iter().all(|kind| {
        credentials
            .iter()
            .any(|c| c.kind == *kind && c.status == VerificationStatus::Verified)
    })
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::model::CredentialType;

    fn vacancy(required: Vec<CredentialType>) -> Vacancy {
        Vacancy {
            id: Uuid::new_v4(),
            title: "Deck Officer".into(),
            required_credentials: required,
        }
    }

    fn application(status: ApplicationStatus, vacancy: &Vacancy) -> Application {
        let mut application = Application::new(vacancy.id);
        application.status = status;
        application
    }

    #[test]
    fn statuses_only_move_forward() {
        use ApplicationStatus::*;
        let order = [
            Created,
            Verifying,
            Verified,
            Qualifying,
            Qualified,
            Finalized,
            Signing,
            Signed,
            TaxQualifying,
            TaxQualified,
            Issuing,
            Issued,
        ];
        // No edge may point at an earlier position in the lifecycle order.
        for (i, from) in order.iter().enumerate() {
            for to in &order[..i] {
                assert!(
                    !from.can_advance_to(*to),
                    "backward edge {from} -> {to} must not exist"
                );
            }
        }
    }

    #[test]
    fn no_skipping_required_predecessors() {
        use ApplicationStatus::*;
        assert!(!Created.can_advance_to(Verified));
        assert!(!Verified.can_advance_to(Signing));
        assert!(!Finalized.can_advance_to(Signed));
        assert!(!Signed.can_advance_to(Issued));
        // ISSUING is unreachable without a prior SIGNED.
        assert!(!Finalized.can_advance_to(Issuing));
    }

    #[test]
    fn optional_stages_are_skippable() {
        use ApplicationStatus::*;
        assert!(Verified.can_advance_to(Finalized));
        assert!(Verified.can_advance_to(Qualifying));
        assert!(Signed.can_advance_to(Issuing));
        assert!(Signed.can_advance_to(TaxQualifying));
    }

    #[test]
    fn terminal_states_never_revert() {
        use ApplicationStatus::*;
        for next in [Created, Verifying, Verified, Issuing] {
            assert!(!Issued.can_advance_to(next));
            assert!(!VerificationFailed.can_advance_to(next));
        }
    }

    #[test]
    fn advance_to_rejects_with_invalid_transition() {
        let err = ApplicationStatus::Signed
            .advance_to(ApplicationStatus::Created)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition(_)));
    }

    #[test]
    fn qualifications_not_found_without_requirements() {
        let vacancy = vacancy(vec![]);
        let application = application(ApplicationStatus::Verified, &vacancy);
        assert_eq!(
            page_access(Page::Qualifications, &application, &vacancy, &[], &[]),
            PageAccess::NotFound
        );
    }

    #[test]
    fn tax_residency_not_found_without_requirement() {
        let vacancy = vacancy(vec![CredentialType::Diploma]);
        let application = application(ApplicationStatus::Signed, &vacancy);
        assert_eq!(
            page_access(Page::TaxResidency, &application, &vacancy, &[], &[]),
            PageAccess::NotFound
        );
    }

    #[test]
    fn early_access_redirects_to_current_stage() {
        let vacancy = vacancy(vec![]);
        let application = application(ApplicationStatus::Verifying, &vacancy);
        assert_eq!(
            page_access(Page::Sign, &application, &vacancy, &[], &[]),
            PageAccess::Redirect {
                path: "/verify".into()
            }
        );
    }

    #[test]
    fn verified_with_requirements_lands_on_qualifications() {
        let vacancy = vacancy(vec![CredentialType::Diploma]);
        let application = application(ApplicationStatus::Verified, &vacancy);
        assert_eq!(
            page_access(Page::Qualifications, &application, &vacancy, &[], &[]),
            PageAccess::Allowed
        );
        assert_eq!(
            page_access(Page::Finalise, &application, &vacancy, &[], &[]),
            PageAccess::Redirect {
                path: "/qualifications".into()
            }
        );
    }

    #[test]
    fn finalise_opens_once_qualifications_verified() {
        let vacancy = vacancy(vec![CredentialType::Diploma]);
        let application = application(ApplicationStatus::Qualifying, &vacancy);

        let mut diploma =
            VerifiedCredential::pending(application.id, CredentialType::Diploma);
        assert_eq!(
            page_access(Page::Finalise, &application, &vacancy, &[diploma.clone()], &[]),
            PageAccess::Redirect {
                path: "/qualifications".into()
            }
        );

        diploma.status = VerificationStatus::Verified;
        assert_eq!(
            page_access(Page::Finalise, &application, &vacancy, &[diploma], &[]),
            PageAccess::Allowed
        );
    }

    #[test]
    fn credentials_page_needs_an_offer_row() {
        let vacancy = vacancy(vec![]);
        let application = application(ApplicationStatus::Issuing, &vacancy);
        assert_eq!(
            page_access(Page::Credentials, &application, &vacancy, &[], &[]),
            PageAccess::Redirect {
                path: "/sign".into()
            }
        );
    }
}
