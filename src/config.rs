use serde::Deserialize;
use url::Url;

/// Static configuration for the credential exchange workflow, deserialized once at
/// process start.
#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    /// Public origin of this application; used as `iss` in issuance JWTs and as the
    /// base of wallet-facing response URIs.
    pub origin: BaseUrl,
    pub verifier: VerifierConfig,
    pub issuer: IssuerConfig,
    pub signing: SigningConfig,
}

#[derive(Deserialize, Debug, Clone)]
pub struct VerifierConfig {
    /// Base URL of the Verifier service API.
    pub api: BaseUrl,
    /// URI scheme the candidate's wallet is registered for.
    #[serde(default = "default_wallet_scheme")]
    pub wallet_scheme: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct IssuerConfig {
    /// Base URL of the Issuer service API; also the `aud` of offer request JWTs.
    pub api: BaseUrl,
    /// Employer name embedded in issued employee credentials.
    pub employer: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SigningConfig {
    /// Client identifier presented to the signing wallet.
    pub client_id: String,
    #[serde(default = "default_client_id_scheme")]
    pub client_id_scheme: String,
    /// Human-readable label for the contract document shown in the wallet.
    pub document_label: String,
}

fn default_wallet_scheme() -> String {
    "eudi-openid4vp".to_string()
}

fn default_client_id_scheme() -> String {
    "x509_san_dns".to_string()
}

/// A url that is always a base (can be safely join()'ed with further path elements
/// without mangling).
#[derive(Deserialize, Debug, Clone, Hash, PartialEq, Eq)]
#[serde(try_from = "String")]
pub struct BaseUrl(Url);

impl std::ops::Deref for BaseUrl {
    type Target = Url;

    fn deref(&self) -> &Url {
        &self.0
    }
}

impl TryFrom<String> for BaseUrl {
    type Error = url::ParseError;

    fn try_from(mut url: String) -> Result<Self, Self::Error> {
        // Make URL a base.
        if !url.ends_with('/') {
            url += "/"
        }
        url.parse().map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_always_joinable() {
        let base = BaseUrl::try_from("https://verifier.example.com/ui".to_string()).unwrap();
        let joined = base.join("presentations").unwrap();
        assert_eq!(
            joined.as_str(),
            "https://verifier.example.com/ui/presentations"
        );
    }

    #[test]
    fn config_from_json() {
        let config: Config = serde_json::from_value(serde_json::json!({
            "origin": "https://jobs.example.com",
            "verifier": { "api": "https://verifier.example.com" },
            "issuer": { "api": "https://issuer.example.com", "employer": "Example Shipping Ltd" },
            "signing": { "client_id": "jobs.example.com", "document_label": "Employment contract" }
        }))
        .unwrap();
        assert_eq!(config.verifier.wallet_scheme, "eudi-openid4vp");
        assert_eq!(config.signing.client_id_scheme, "x509_san_dns");
    }
}
