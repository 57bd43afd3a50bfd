//! Simulated JWT claims surfaced to the database session.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The claim set of one simulated caller.
///
/// Claims are an open-ended string-keyed map. The only key the engine ever
/// inspects is `role` (it selects the session role to impersonate); the
/// rest is opaque payload serialized to JSON and installed into the
/// `request.jwt.claims` session GUC where policy expressions can read it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JwtClaims(pub Map<String, Value>);

impl JwtClaims {
    /// An empty claim set (an anonymous caller).
    pub fn anonymous() -> Self {
        Self(Map::new())
    }

    /// Build a claim set from key/value pairs.
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// The `role` claim, if present and a string.
    pub fn role(&self) -> Option<&str> {
        self.0.get("role").and_then(Value::as_str)
    }

    /// The session role the engine impersonates for these claims.
    ///
    /// `authenticated` only when the claims say so; everything else is
    /// probed as `anon`.
    pub fn session_role(&self) -> &'static str {
        if self.role() == Some("authenticated") {
            "authenticated"
        } else {
            "anon"
        }
    }

    /// Whether the claims carry a role other than the two session roles.
    ///
    /// Such a role is additionally written to the `role` GUC because some
    /// policy styles read `current_setting('role')` instead of the session
    /// role.
    pub fn custom_role(&self) -> Option<&str> {
        match self.role() {
            Some("authenticated") | None => None,
            Some(other) => Some(other),
        }
    }

    /// Insert a claim, returning the previous value if any.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    /// Get a claim by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Whether the claim set is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The JSON document written to the `request.jwt.claims` GUC.
    pub fn to_guc_json(&self) -> String {
        // Serializing a Map<String, Value> cannot fail.
        serde_json::to_string(&self.0).unwrap_or_else(|_| "{}".to_string())
    }
}

impl From<Map<String, Value>> for JwtClaims {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_anonymous_session_role() {
        let claims = JwtClaims::anonymous();
        assert_eq!(claims.session_role(), "anon");
        assert!(claims.custom_role().is_none());
        assert_eq!(claims.to_guc_json(), "{}");
    }

    #[test]
    fn test_authenticated_session_role() {
        let claims = JwtClaims::from_pairs([
            ("role", json!("authenticated")),
            ("sub", json!("8f14e45f-ceea-4e2e-a3b0-9d1c4b1f0a11")),
        ]);
        assert_eq!(claims.session_role(), "authenticated");
        assert!(claims.custom_role().is_none());
    }

    #[test]
    fn test_custom_role_probes_as_anon() {
        let claims = JwtClaims::from_pairs([("role", json!("service_worker"))]);
        assert_eq!(claims.session_role(), "anon");
        assert_eq!(claims.custom_role(), Some("service_worker"));
    }

    #[test]
    fn test_guc_json_carries_opaque_payload() {
        let claims = JwtClaims::from_pairs([
            ("role", json!("authenticated")),
            ("app_metadata", json!({"plan": "pro"})),
        ]);
        let guc = claims.to_guc_json();
        assert!(guc.contains("\"app_metadata\""));
        assert!(guc.contains("\"pro\""));
    }

    #[test]
    fn test_serde_transparent() {
        let claims: JwtClaims =
            serde_json::from_str(r#"{"role":"authenticated","sub":"abc"}"#).unwrap();
        assert_eq!(claims.role(), Some("authenticated"));
        assert_eq!(claims.get("sub"), Some(&json!("abc")));
    }
}
