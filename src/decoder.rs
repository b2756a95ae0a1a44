//! Decoding of wallet-submitted credential payloads.
//!
//! mDoc credentials arrive as a base64url- or hex-encoded CBOR device response;
//! SD-JWT credentials arrive as a `~`-separated compact token with disclosures.
//! The CBOR and SD-JWT decoders are lenient at the boundary: a malformed payload
//! yields `None` and a warning, never a panic, so polling callers can mark the
//! verification FAILED and keep serving requests.

use std::collections::BTreeMap;

use base64::prelude::*;
use ciborium::Value as Cbor;
use serde_json::Value as Json;

use crate::error::{Error, Result};
use crate::model::ClaimMap;

/// Decode a string that is either hex or URL-safe base64, detected by alphabet.
///
/// Hex wins for strings valid in both alphabets (an even-length run of
/// `[0-9a-fA-F]` is always treated as hex).
pub fn decode_base64_or_hex(input: &str) -> Result<Vec<u8>> {
    if input.is_empty() {
        return Err(Error::Decode("empty payload".into()));
    }

    if input.len() % 2 == 0 && input.bytes().all(|b| b.is_ascii_hexdigit()) {
        return hex::decode(input).map_err(|e| Error::Decode(format!("invalid hex: {e}")));
    }

    if input
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'=')
    {
        return BASE64_URL_SAFE_NO_PAD
            .decode(input.trim_end_matches('='))
            .map_err(|e| Error::Decode(format!("invalid base64: {e}")));
    }

    Err(Error::Decode(
        "payload is neither hex nor URL-safe base64".into(),
    ))
}

/// Decode an mDoc device response (CBOR) into namespace-grouped claims.
///
/// Returns `None` when the envelope cannot be decoded; individual unreadable items
/// inside an otherwise well-formed envelope are skipped with a warning.
pub fn decode_cbor_data(bytes: &[u8]) -> Option<ClaimMap> {
    let value: Cbor = match ciborium::de::from_reader(bytes) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("undecodable mDoc envelope: {e}");
            return None;
        }
    };

    let documents = map_get(&value, "documents")?.as_array()?;
    let mut claims = ClaimMap::new();

    for document in documents {
        let Some(name_spaces) = map_get(document, "issuerSigned")
            .and_then(|issuer_signed| map_get(issuer_signed, "nameSpaces"))
            .and_then(Cbor::as_map)
        else {
            tracing::warn!("mDoc document without issuerSigned nameSpaces");
            continue;
        };

        for (name_space, items) in name_spaces {
            let (Some(name_space), Some(items)) = (name_space.as_text(), items.as_array()) else {
                continue;
            };
            let entry = claims.entry(name_space.to_string()).or_default();
            for item in items {
                match decode_issuer_signed_item(item) {
                    Some((identifier, value)) => {
                        entry.insert(identifier, value);
                    }
                    None => tracing::warn!(name_space, "skipping unreadable issuer-signed item"),
                }
            }
        }
    }

    if claims.is_empty() {
        return None;
    }
    Some(claims)
}

/// An IssuerSignedItem is wrapped in CBOR tag 24 (encoded-cbor) around a byte
/// string holding the item map.
fn decode_issuer_signed_item(item: &Cbor) -> Option<(String, Json)> {
    let inner = match item {
        Cbor::Tag(24, inner) => ciborium::de::from_reader::<Cbor, _>(inner.as_bytes()?.as_slice())
            .ok()?,
        // Tolerate unwrapped items.
        other => other.clone(),
    };
    let identifier = map_get(&inner, "elementIdentifier")?.as_text()?.to_string();
    let value = cbor_to_json(map_get(&inner, "elementValue")?);
    Some((identifier, value))
}

fn map_get<'a>(value: &'a Cbor, key: &str) -> Option<&'a Cbor> {
    value
        .as_map()?
        .iter()
        .find(|(k, _)| k.as_text() == Some(key))
        .map(|(_, v)| v)
}

fn cbor_to_json(value: &Cbor) -> Json {
    match value {
        Cbor::Text(text) => Json::String(text.clone()),
        Cbor::Bool(b) => Json::Bool(*b),
        Cbor::Integer(i) => i64::try_from(*i)
            .map(Json::from)
            .unwrap_or(Json::Null),
        Cbor::Float(f) => serde_json::Number::from_f64(*f)
            .map(Json::Number)
            .unwrap_or(Json::Null),
        Cbor::Bytes(bytes) => Json::String(BASE64_URL_SAFE_NO_PAD.encode(bytes)),
        Cbor::Array(values) => Json::Array(values.iter().map(cbor_to_json).collect()),
        Cbor::Map(entries) => Json::Object(
            entries
                .iter()
                .filter_map(|(k, v)| k.as_text().map(|k| (k.to_string(), cbor_to_json(v))))
                .collect(),
        ),
        // Tag 0/1004 wrap date strings; unwrap any tag and convert the payload.
        Cbor::Tag(_, inner) => cbor_to_json(inner),
        _ => Json::Null,
    }
}

/// Extract claims from an SD-JWT token (issuer JWT plus `~`-separated disclosures)
/// without verifying signatures; signature verification is the Verifier service's
/// responsibility.
pub fn decode_sd_jwt(token: &str) -> Option<BTreeMap<String, Json>> {
    let mut segments = token.split('~');
    let jwt = segments.next()?;

    let payload_b64 = jwt.split('.').nth(1)?;
    let payload = BASE64_URL_SAFE_NO_PAD
        .decode(payload_b64.trim_end_matches('='))
        .ok()?;
    let payload: Json = serde_json::from_slice(&payload).ok()?;

    let mut claims: BTreeMap<String, Json> = payload
        .as_object()?
        .iter()
        .filter(|(key, _)| !matches!(key.as_str(), "_sd" | "_sd_alg" | "cnf"))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    for disclosure in segments.filter(|s| !s.is_empty()) {
        let Ok(bytes) = BASE64_URL_SAFE_NO_PAD.decode(disclosure.trim_end_matches('=')) else {
            // The final segment may be a key-binding JWT rather than a disclosure.
            continue;
        };
        let Ok(Json::Array(parts)) = serde_json::from_slice(&bytes) else {
            continue;
        };
        // A disclosure is [salt, claim name, claim value].
        if let [_, Json::String(name), value] = parts.as_slice() {
            claims.insert(name.clone(), value.clone());
        }
    }

    Some(claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_round_trips() {
        assert_eq!(decode_base64_or_hex("SGVsbG8").unwrap(), b"Hello");
    }

    #[test]
    fn hex_round_trips() {
        assert_eq!(decode_base64_or_hex("48656c6c6f").unwrap(), b"Hello");
    }

    #[test]
    fn rejects_non_string_alphabets() {
        assert!(matches!(
            decode_base64_or_hex("not valid!"),
            Err(Error::Decode(_))
        ));
        assert!(matches!(decode_base64_or_hex(""), Err(Error::Decode(_))));
    }

    fn issuer_signed_item(identifier: &str, value: Cbor) -> Cbor {
        let item = Cbor::Map(vec![
            (Cbor::Text("digestID".into()), Cbor::Integer(1.into())),
            (Cbor::Text("random".into()), Cbor::Bytes(vec![0u8; 16])),
            (
                Cbor::Text("elementIdentifier".into()),
                Cbor::Text(identifier.into()),
            ),
            (Cbor::Text("elementValue".into()), value),
        ]);
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&item, &mut bytes).unwrap();
        Cbor::Tag(24, Box::new(Cbor::Bytes(bytes)))
    }

    fn device_response(name_space: &str, items: Vec<Cbor>) -> Vec<u8> {
        let response = Cbor::Map(vec![
            (Cbor::Text("version".into()), Cbor::Text("1.0".into())),
            (
                Cbor::Text("documents".into()),
                Cbor::Array(vec![Cbor::Map(vec![(
                    Cbor::Text("issuerSigned".into()),
                    Cbor::Map(vec![(
                        Cbor::Text("nameSpaces".into()),
                        Cbor::Map(vec![(Cbor::Text(name_space.into()), Cbor::Array(items))]),
                    )]),
                )])]),
            ),
            (Cbor::Text("status".into()), Cbor::Integer(0.into())),
        ]);
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&response, &mut bytes).unwrap();
        bytes
    }

    #[test]
    fn decodes_device_response_claims() {
        let bytes = device_response(
            "eu.europa.ec.eudi.pid.1",
            vec![
                issuer_signed_item("family_name", Cbor::Text("Mariner".into())),
                issuer_signed_item("given_name", Cbor::Text("Grace".into())),
                issuer_signed_item(
                    "birth_date",
                    Cbor::Tag(1004, Box::new(Cbor::Text("1990-04-01".into()))),
                ),
            ],
        );

        let claims = decode_cbor_data(&bytes).unwrap();
        let pid = &claims["eu.europa.ec.eudi.pid.1"];
        assert_eq!(pid["family_name"], Json::String("Mariner".into()));
        assert_eq!(pid["given_name"], Json::String("Grace".into()));
        assert_eq!(pid["birth_date"], Json::String("1990-04-01".into()));
    }

    #[test]
    fn corrupt_cbor_returns_none() {
        assert!(decode_cbor_data(&[0xff, 0x00, 0x13, 0x37]).is_none());

        // Truncated version of a valid envelope.
        let bytes = device_response(
            "eu.europa.ec.eudi.pid.1",
            vec![issuer_signed_item("family_name", Cbor::Text("Mariner".into()))],
        );
        assert!(decode_cbor_data(&bytes[..bytes.len() / 2]).is_none());
    }

    #[test]
    fn valid_cbor_without_documents_returns_none() {
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&Cbor::Text("hello".into()), &mut bytes).unwrap();
        assert!(decode_cbor_data(&bytes).is_none());
    }

    fn b64(value: &impl serde::Serialize) -> String {
        BASE64_URL_SAFE_NO_PAD.encode(serde_json::to_vec(value).unwrap())
    }

    #[test]
    fn sd_jwt_merges_disclosures() {
        let header = b64(&serde_json::json!({"alg": "ES256", "typ": "dc+sd-jwt"}));
        let payload = b64(&serde_json::json!({
            "vct": "urn:eu.europa.ec.eudi:tax_residency:1",
            "_sd_alg": "sha-256",
            "_sd": ["xxxx"],
            "iss": "https://issuer.example.com"
        }));
        let disclosure = b64(&serde_json::json!(["salt123", "tax_country", "NL"]));
        let token = format!("{header}.{payload}.c2ln~{disclosure}~");

        let claims = decode_sd_jwt(&token).unwrap();
        assert_eq!(claims["tax_country"], Json::String("NL".into()));
        assert_eq!(
            claims["vct"],
            Json::String("urn:eu.europa.ec.eudi:tax_residency:1".into())
        );
        assert!(!claims.contains_key("_sd"));
    }

    #[test]
    fn sd_jwt_garbage_returns_none() {
        assert!(decode_sd_jwt("not-a-jwt").is_none());
    }
}
