//! Credential query builders.
//!
//! Pure mappings from a [`CredentialType`] to the DCQL credential query the Verifier
//! forwards to the wallet. Query ids are derived from the application id so a wallet
//! submission can be correlated back to the row it answers.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as Json};
use uuid::Uuid;

use crate::model::CredentialType;

/// A DCQL query: the set of credentials requested in one presentation transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DcqlQuery {
    pub credentials: Vec<CredentialQuery>,
}

/// One credential query within a [`DcqlQuery`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialQuery {
    /// Identifies this credential in the wallet's response; unique within the query.
    pub id: String,
    pub format: String,
    /// Format-specific constraints: `doctype_value` for mDoc, `vct_values` for SD-JWT.
    pub meta: Map<String, Json>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claims: Option<Vec<ClaimsQuery>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimsQuery {
    pub path: Vec<String>,
}

/// Deterministic query id for (application, credential type); the same inputs always
/// produce the same id, which is what ties a wallet submission back to its
/// `VerifiedCredential` row.
pub fn query_id(application_id: Uuid, kind: CredentialType) -> String {
    format!("{}_{}", kind.query_key(), application_id.simple())
}

/// Build the query descriptor for one credential family.
pub fn credential_query(application_id: Uuid, kind: CredentialType) -> CredentialQuery {
    let id = query_id(application_id, kind);
    match kind {
        CredentialType::Pid => CredentialQuery {
            id,
            format: "mso_mdoc".to_string(),
            meta: doctype_meta(kind),
            claims: Some(
                [
                    "family_name",
                    "given_name",
                    "birth_date",
                    "nationality",
                    "email",
                    "mobile_phone_number",
                ]
                .into_iter()
                .map(|element| ClaimsQuery {
                    path: vec![kind.namespace().to_string(), element.to_string()],
                })
                .collect(),
            ),
        },
        CredentialType::Diploma | CredentialType::Seafarer => CredentialQuery {
            id,
            format: "mso_mdoc".to_string(),
            meta: doctype_meta(kind),
            claims: None,
        },
        CredentialType::TaxResidency => {
            let mut meta = Map::new();
            meta.insert("vct_values".to_string(), json!([kind.namespace()]));
            CredentialQuery {
                id,
                format: "dc+sd-jwt".to_string(),
                meta,
                claims: None,
            }
        }
    }
}

/// Combine the queries for several credential types into one presentation request.
pub fn presentation_query(application_id: Uuid, kinds: &[CredentialType]) -> DcqlQuery {
    DcqlQuery {
        credentials: kinds
            .iter()
            .map(|kind| credential_query(application_id, *kind))
            .collect(),
    }
}

fn doctype_meta(kind: CredentialType) -> Map<String, Json> {
    let mut meta = Map::new();
    meta.insert("doctype_value".to_string(), json!(kind.namespace()));
    meta
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_deterministic_and_distinct() {
        let application_id = Uuid::new_v4();
        assert_eq!(
            credential_query(application_id, CredentialType::Pid).id,
            credential_query(application_id, CredentialType::Pid).id
        );
        assert_ne!(
            credential_query(application_id, CredentialType::Pid).id,
            credential_query(application_id, CredentialType::Diploma).id
        );
    }

    #[test]
    fn pid_query_requests_the_candidate_attributes() {
        let query = credential_query(Uuid::new_v4(), CredentialType::Pid);
        assert_eq!(query.format, "mso_mdoc");
        assert_eq!(
            query.meta["doctype_value"],
            json!("eu.europa.ec.eudi.pid.1")
        );
        let claims = query.claims.unwrap();
        assert!(claims
            .iter()
            .any(|c| c.path == ["eu.europa.ec.eudi.pid.1", "family_name"]));
        assert!(claims
            .iter()
            .any(|c| c.path == ["eu.europa.ec.eudi.pid.1", "mobile_phone_number"]));
    }

    #[test]
    fn tax_residency_is_sd_jwt() {
        let query = credential_query(Uuid::new_v4(), CredentialType::TaxResidency);
        assert_eq!(query.format, "dc+sd-jwt");
        assert_eq!(
            query.meta["vct_values"],
            json!(["urn:eu.europa.ec.eudi:tax_residency:1"])
        );
        assert!(query.claims.is_none());
    }

    #[test]
    fn combined_query_keeps_one_entry_per_kind() {
        let query = presentation_query(
            Uuid::new_v4(),
            &[CredentialType::Diploma, CredentialType::Seafarer],
        );
        assert_eq!(query.credentials.len(), 2);
        let serialized = serde_json::to_value(&query).unwrap();
        assert_eq!(serialized["credentials"].as_array().unwrap().len(), 2);
    }
}
