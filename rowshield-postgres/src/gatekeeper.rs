//! The privilege gatekeeper: profile the logged-in role, refuse unsafe ones.

use tracing::{info, warn};

use crate::config::PgConfig;
use crate::connection::PgConnection;
use crate::error::{PgError, PgResult};
use crate::pool::PgPool;

/// The privilege profile of the logged-in role, gathered once at startup.
#[derive(Debug, Clone)]
pub struct PrivilegeProfile {
    /// The role rowshield logged in as.
    pub role_name: String,
    /// Superuser roles bypass RLS entirely; every probe would read ALLOW.
    pub is_superuser: bool,
    /// DML grants on `information_schema` relations signal blanket grants.
    pub has_global_dml: bool,
    /// CREATE on the current database lets a session escape containment.
    pub has_create_privilege: bool,
    /// Schema-qualified tables the role holds DML on, for diagnostics.
    pub table_grants: Vec<TableGrant>,
}

/// DML privileges the role holds on one table.
#[derive(Debug, Clone)]
pub struct TableGrant {
    /// Schema-qualified table.
    pub table: String,
    /// Granted DML privilege types.
    pub privileges: Vec<String>,
}

impl PrivilegeProfile {
    /// Enforce the rejection policy: probing requires a role that cannot
    /// bypass RLS or escape the transactional sandbox.
    pub fn ensure_safe(&self) -> PgResult<()> {
        if self.is_superuser {
            return Err(PgError::unsafe_role(
                &self.role_name,
                "role is a superuser (bypasses row-level security, every probe would read ALLOW)",
            ));
        }
        if self.has_global_dml {
            return Err(PgError::unsafe_role(
                &self.role_name,
                "role holds DML on information_schema relations (blanket grants defeat containment)",
            ));
        }
        if self.has_create_privilege {
            return Err(PgError::unsafe_role(
                &self.role_name,
                "role holds CREATE on the current database (can escape transactional containment)",
            ));
        }
        Ok(())
    }
}

/// A verified connection: the pool plus the privilege profile of the role
/// behind it.
///
/// Constructing a `ConnectionContext` is the only way the rest of rowshield
/// obtains a pool, so an unsafe role never reaches the probe engine.
pub struct ConnectionContext {
    pool: PgPool,
    profile: PrivilegeProfile,
}

impl ConnectionContext {
    /// Open a pool and vet the logged-in role.
    ///
    /// Fails with [`PgError::UnsafeRole`] when the role is a superuser,
    /// holds global DML, or holds CREATE on the database. The error names
    /// the offending privilege.
    pub async fn establish(config: PgConfig, pool_capacity: usize) -> PgResult<Self> {
        let pool = PgPool::connect(config, pool_capacity).await?;

        let conn = pool.get().await?;
        let profile = Self::profile_role(&conn).await?;
        drop(conn);

        if !profile.table_grants.is_empty() {
            info!(
                role = %profile.role_name,
                tables = profile.table_grants.len(),
                "role holds table-level DML grants"
            );
        }

        if let Err(e) = profile.ensure_safe() {
            warn!(role = %profile.role_name, "rejecting unsafe role");
            pool.close();
            return Err(e);
        }

        info!(role = %profile.role_name, "role vetted for probing");
        Ok(Self { pool, profile })
    }

    async fn profile_role(conn: &PgConnection) -> PgResult<PrivilegeProfile> {
        let row = conn
            .query_one(
                r#"
                SELECT
                    current_user::text                                        AS role_name,
                    COALESCE(
                        (SELECT rolsuper FROM pg_roles WHERE rolname = current_user),
                        false
                    )                                                         AS is_superuser,
                    has_database_privilege(current_user, current_database(), 'CREATE')
                                                                              AS has_create,
                    EXISTS (
                        SELECT 1
                        FROM information_schema.role_table_grants
                        WHERE grantee = current_user
                          AND table_schema = 'information_schema'
                          AND privilege_type IN ('INSERT', 'UPDATE', 'DELETE')
                    )                                                         AS has_global_dml
                "#,
                &[],
            )
            .await?;

        let role_name: String = row.get("role_name");
        let is_superuser: bool = row.get("is_superuser");
        let has_create_privilege: bool = row.get("has_create");
        let has_global_dml: bool = row.get("has_global_dml");

        let grant_rows = conn
            .query(
                r#"
                SELECT
                    table_schema || '.' || table_name            AS table_fqn,
                    array_agg(DISTINCT privilege_type::text)     AS privileges
                FROM information_schema.role_table_grants
                WHERE grantee = current_user
                  AND privilege_type IN ('INSERT', 'UPDATE', 'DELETE')
                  AND table_schema NOT IN ('information_schema', 'pg_catalog')
                GROUP BY 1
                ORDER BY 1
                "#,
                &[],
            )
            .await?;

        let table_grants = grant_rows
            .into_iter()
            .map(|row| TableGrant {
                table: row.get("table_fqn"),
                privileges: row.get("privileges"),
            })
            .collect();

        Ok(PrivilegeProfile {
            role_name,
            is_superuser,
            has_global_dml,
            has_create_privilege,
            table_grants,
        })
    }

    /// The vetted pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// The privilege profile gathered at establish time.
    pub fn profile(&self) -> &PrivilegeProfile {
        &self.profile
    }

    /// Close the underlying pool.
    pub fn close(&self) {
        self.pool.close();
    }
}
