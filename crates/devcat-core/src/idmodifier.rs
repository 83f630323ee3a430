//! Composite identifiers for modified device-type views
//!
//! A composite id is `{base_id}${modifier}` where `modifier` is the
//! base64url (unpadded) encoding of the JSON object of modifier parameters.
//! Keys are serialized in sorted order so encoding is deterministic, and the
//! base64url alphabet never contains the `$` separator.
//!
//! Modified ids never carry their own permissions: consumers map them back
//! with [`pure_id`] before any rights lookup.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Separator between base id and encoded modifier; never part of a base id
pub const SEPARATOR: &str = "$";

/// Modifier key selecting a single service-group view of a device type
pub const SERVICE_GROUP_SELECTION: &str = "service_group_selection";

/// Modifier parameters, ordered by key
pub type ModifierParams = BTreeMap<String, Vec<String>>;

#[derive(Error, Debug)]
pub enum IdModifierError {
    #[error("Invalid modifier encoding: {0}")]
    InvalidEncoding(#[from] base64::DecodeError),
    #[error("Malformed modifier parameters: {0}")]
    MalformedModifier(#[from] serde_json::Error),
}

/// Append encoded modifier parameters to a base id.
///
/// An empty parameter map leaves the id untouched.
pub fn encode(base_id: &str, params: &ModifierParams) -> String {
    if params.is_empty() {
        return base_id.to_string();
    }
    format!("{}{}{}", base_id, SEPARATOR, encode_params(params))
}

/// Split a composite id into its base id and modifier parameters
pub fn decode(id: &str) -> Result<(String, ModifierParams), IdModifierError> {
    match id.split_once(SEPARATOR) {
        None => Ok((id.to_string(), ModifierParams::new())),
        Some((base, modifier)) => Ok((base.to_string(), decode_params(modifier)?)),
    }
}

/// Base id of a (possibly) composite id
pub fn pure_id(id: &str) -> &str {
    id.split_once(SEPARATOR).map(|(base, _)| base).unwrap_or(id)
}

pub fn is_modified(id: &str) -> bool {
    id.contains(SEPARATOR)
}

/// Composite id for the view of `base_id` restricted to one service group
pub fn service_group_view_id(base_id: &str, service_group_key: &str) -> String {
    let mut params = ModifierParams::new();
    params.insert(
        SERVICE_GROUP_SELECTION.to_string(),
        vec![service_group_key.to_string()],
    );
    encode(base_id, &params)
}

/// Service-group keys selected by a composite id (empty for pure ids)
pub fn service_group_selection(id: &str) -> Result<Vec<String>, IdModifierError> {
    let (_, mut params) = decode(id)?;
    Ok(params.remove(SERVICE_GROUP_SELECTION).unwrap_or_default())
}

fn encode_params(params: &ModifierParams) -> String {
    let object: serde_json::Map<String, Value> = params
        .iter()
        .map(|(key, values)| {
            let values = values.iter().cloned().map(Value::String).collect();
            (key.clone(), Value::Array(values))
        })
        .collect();
    URL_SAFE_NO_PAD.encode(Value::Object(object).to_string())
}

fn decode_params(modifier: &str) -> Result<ModifierParams, IdModifierError> {
    let bytes = URL_SAFE_NO_PAD.decode(modifier)?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(entries: &[(&str, &[&str])]) -> ModifierParams {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    #[test]
    fn test_round_trip() {
        let cases = [
            ("urn:infai:ses:device-type:1", params(&[])),
            ("dt", params(&[(SERVICE_GROUP_SELECTION, &["g1"])])),
            ("dt", params(&[("a", &[]), ("b", &["x", "y", "$", "="])])),
            ("", params(&[("k", &[""])])),
        ];
        for (id, p) in cases {
            let encoded = encode(id, &p);
            let (base, decoded) = decode(&encoded).unwrap();
            assert_eq!(base, id);
            assert_eq!(decoded, p);
        }
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let mut first = ModifierParams::new();
        first.insert("b".to_string(), vec!["2".to_string()]);
        first.insert("a".to_string(), vec!["1".to_string()]);
        let mut second = ModifierParams::new();
        second.insert("a".to_string(), vec!["1".to_string()]);
        second.insert("b".to_string(), vec!["2".to_string()]);
        assert_eq!(encode("dt", &first), encode("dt", &second));
    }

    #[test]
    fn test_pure_id() {
        let id = service_group_view_id("dt1", "front");
        assert!(is_modified(&id));
        assert_eq!(pure_id(&id), "dt1");
        assert_eq!(pure_id("dt1"), "dt1");
        assert_eq!(service_group_selection(&id).unwrap(), vec!["front".to_string()]);
        assert!(service_group_selection("dt1").unwrap().is_empty());
    }

    #[test]
    fn test_decode_failure() {
        assert!(matches!(
            decode("dt$not*base64"),
            Err(IdModifierError::InvalidEncoding(_))
        ));
        let not_a_map = format!("dt${}", URL_SAFE_NO_PAD.encode("[1,2]"));
        assert!(matches!(
            decode(&not_a_map),
            Err(IdModifierError::MalformedModifier(_))
        ));
    }
}
