//! Real-user mode: probe as an actual `auth.users` record.
//!
//! Diagnostic rather than assertive: the synthesized plan expects ALLOW
//! everywhere, so the report reads as "what this user can actually do" and
//! every DENY stands out.

use serde_json::{Value, json};
use tracing::info;

use rowshield_config::{Expectation, JwtClaims, PolicyConfig, Scenario, TablePlan};
use rowshield_postgres::PgPool;

use crate::error::{ProbeError, ProbeRunResult};

/// Look up a user by email, then by stringified id, and synthesize the
/// JWT claims a Supabase session for that user would carry.
pub async fn claims_for_user(pool: &PgPool, identifier: &str) -> ProbeRunResult<JwtClaims> {
    let conn = pool.get().await?;

    let row = match conn.query_opt(sql::BY_EMAIL, &[&identifier]).await? {
        Some(row) => Some(row),
        None => conn.query_opt(sql::BY_ID, &[&identifier]).await?,
    };

    let Some(row) = row else {
        return Err(ProbeError::UserNotFound(identifier.to_string()));
    };

    let id: String = row.get("id");
    let email: Option<String> = row.get("email");
    let role: String = row.get("role");
    let app_metadata: Value = row.get("app_metadata");

    info!(user = %id, role = %role, "resolved auth.users record");

    let mut claims = JwtClaims::anonymous();
    claims.insert("sub", json!(id));
    claims.insert("role", json!(role));
    if let Some(email) = email {
        claims.insert("email", json!(email));
    }
    claims.insert("app_metadata", app_metadata);

    Ok(claims)
}

/// Replace the plan with one scenario per table: the resolved user, every
/// operation expected ALLOW.
pub async fn override_config(
    pool: &PgPool,
    identifier: &str,
    base: &PolicyConfig,
) -> ProbeRunResult<PolicyConfig> {
    let claims = claims_for_user(pool, identifier).await?;

    let scenario = Scenario {
        name: format!("as {}", identifier),
        jwt_claims: claims,
        expected: rowshield_config::Op::ALL
            .into_iter()
            .map(|op| (op, Expectation::Allow))
            .collect(),
    };

    let tables = base
        .tables
        .keys()
        .map(|key| {
            (
                key.clone(),
                TablePlan {
                    test_scenarios: vec![scenario.clone()],
                    custom_operations: None,
                },
            )
        })
        .collect();

    Ok(PolicyConfig {
        tables,
        storage_buckets: Default::default(),
        defaults: None,
    })
}

mod sql {
    /// Match by email first: the common way operators name users.
    pub const BY_EMAIL: &str = r#"
        SELECT
            id::text                              AS id,
            email::text                           AS email,
            COALESCE(role, 'authenticated')::text AS role,
            COALESCE(raw_app_meta_data, '{}'::jsonb) AS app_metadata
        FROM auth.users
        WHERE email = $1
        LIMIT 1
    "#;

    /// Fall back to the stringified id.
    pub const BY_ID: &str = r#"
        SELECT
            id::text                              AS id,
            email::text                           AS email,
            COALESCE(role, 'authenticated')::text AS role,
            COALESCE(raw_app_meta_data, '{}'::jsonb) AS app_metadata
        FROM auth.users
        WHERE id::text = $1
        LIMIT 1
    "#;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowshield_config::Op;

    #[test]
    fn test_user_not_found_error_names_identifier() {
        let err = ProbeError::UserNotFound("ops@example.com".to_string());
        assert!(err.to_string().contains("ops@example.com"));
    }

    #[test]
    fn test_override_scenario_shape() {
        // The scenario construction itself, without a database.
        let scenario = Scenario {
            name: "as ops@example.com".to_string(),
            jwt_claims: JwtClaims::from_pairs([
                ("sub", json!("2b1f")),
                ("role", json!("authenticated")),
            ]),
            expected: Op::ALL
                .into_iter()
                .map(|op| (op, Expectation::Allow))
                .collect(),
        };

        assert_eq!(scenario.expected.len(), 4);
        assert!(scenario.expected.values().all(|e| *e == Expectation::Allow));
        assert_eq!(scenario.jwt_claims.session_role(), "authenticated");
    }
}
