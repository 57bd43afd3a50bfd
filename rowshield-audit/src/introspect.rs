//! Catalog discovery: tables, policies, storage buckets, column grants.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use rowshield_postgres::PgPool;

use crate::error::{AuditError, AuditResult};

/// Which schemas a run looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaFilter {
    /// `public` only (the default).
    PublicOnly,
    /// Every user schema; `information_schema`, `pg_catalog` and
    /// `pg_toast` stay excluded regardless.
    AllUserSchemas,
}

impl SchemaFilter {
    /// Build the filter from the caller-facing flag.
    pub fn from_include_system(include_system_schemas: bool) -> Self {
        if include_system_schemas {
            Self::AllUserSchemas
        } else {
            Self::PublicOnly
        }
    }

    fn include_all(&self) -> bool {
        matches!(self, Self::AllUserSchemas)
    }
}

/// A base table in scope, with its RLS state and policies.
#[derive(Debug, Clone, Serialize)]
pub struct TableMeta {
    /// Schema name.
    pub schema: String,
    /// Table name.
    pub name: String,
    /// Whether `ALTER TABLE ... ENABLE ROW LEVEL SECURITY` is in effect.
    pub rls_enabled: bool,
    /// Whether RLS is forced even for the table owner.
    pub rls_forced: bool,
    /// Policies attached to the table.
    pub policies: Vec<PolicyInfo>,
}

impl TableMeta {
    /// The `schema.name` form used across reports.
    pub fn fqn(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

/// The command a policy applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PolicyCommand {
    Select,
    Insert,
    Update,
    Delete,
    /// Applies to every command.
    All,
}

impl PolicyCommand {
    /// Decode `pg_policy.polcmd`.
    pub fn from_polcmd(cmd: &str) -> AuditResult<Self> {
        match cmd {
            "r" => Ok(Self::Select),
            "a" => Ok(Self::Insert),
            "w" => Ok(Self::Update),
            "d" => Ok(Self::Delete),
            "*" => Ok(Self::All),
            other => Err(AuditError::catalog(format!(
                "unknown polcmd value '{}'",
                other
            ))),
        }
    }

    /// The SQL keyword form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::All => "ALL",
        }
    }
}

/// One row-level-security policy.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyInfo {
    /// Policy name.
    pub name: String,
    /// Command the policy gates.
    pub command: PolicyCommand,
    /// Role names the policy applies to; the all-roles marker (OID 0)
    /// renders as `PUBLIC`.
    pub roles: Vec<String>,
    /// Decompiled `USING` expression, if any.
    pub using_expression: Option<String>,
    /// Decompiled `WITH CHECK` expression, if any.
    pub with_check_expression: Option<String>,
}

impl PolicyInfo {
    /// Whether the policy's role list includes the all-roles marker.
    pub fn applies_to_public(&self) -> bool {
        self.roles.iter().any(|r| r == "PUBLIC")
    }
}

/// A Supabase storage bucket.
///
/// Storage policies all live on `storage.objects`; every bucket carries the
/// same policy list and differs only in the `bucket_id` value probes filter
/// on.
#[derive(Debug, Clone, Serialize)]
pub struct StorageBucketMeta {
    /// Bucket id (the `bucket_id` value on `storage.objects` rows).
    pub id: String,
    /// Bucket display name.
    pub name: String,
    /// Whether the bucket is public.
    pub is_public: bool,
    /// Policies on `storage.objects`, shared across buckets.
    pub policies: Vec<PolicyInfo>,
}

/// A column readable by one of the public-facing roles.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnGrant {
    /// Schema name.
    pub schema: String,
    /// Table name.
    pub table: String,
    /// Column name.
    pub column: String,
    /// The grantee (`anon`, `authenticated` or `PUBLIC`).
    pub grantee: String,
}

/// A non-fatal finding surfaced during discovery.
#[derive(Debug, Clone, Serialize)]
pub struct IntrospectionWarning {
    /// The table the warning is about.
    pub table: String,
    /// What the operator should know.
    pub message: String,
}

/// Everything discovery produces for one run.
#[derive(Debug, Clone, Serialize)]
pub struct Discovery {
    /// In-scope base tables.
    pub tables: Vec<TableMeta>,
    /// Storage buckets, empty when the `storage` schema does not exist.
    pub storage_buckets: Vec<StorageBucketMeta>,
    /// Non-fatal findings (currently: RLS disabled on in-scope tables).
    pub warnings: Vec<IntrospectionWarning>,
}

/// Catalog access seam. The live implementation is [`PgIntrospector`];
/// tests drive the linter and orchestrator through fixtures.
#[async_trait]
pub trait Introspector: Send + Sync {
    /// Enumerate in-scope base tables with their policies.
    async fn tables(&self, filter: SchemaFilter) -> AuditResult<Vec<TableMeta>>;

    /// Enumerate storage buckets. Absence of the `storage` schema is not
    /// an error; it yields an empty list.
    async fn storage_buckets(&self) -> AuditResult<Vec<StorageBucketMeta>>;

    /// Columns readable by `anon` / `authenticated` / `PUBLIC`.
    async fn column_grants(&self, filter: SchemaFilter) -> AuditResult<Vec<ColumnGrant>>;
}

/// Run full discovery and derive the warning channel.
pub async fn discover<I: Introspector + ?Sized>(
    introspector: &I,
    filter: SchemaFilter,
) -> AuditResult<Discovery> {
    let tables = introspector.tables(filter).await?;
    let storage_buckets = introspector.storage_buckets().await?;

    let warnings = tables
        .iter()
        .filter(|t| !t.rls_enabled)
        .map(|t| IntrospectionWarning {
            table: t.fqn(),
            message: format!(
                "row-level security is disabled on {}; grants alone gate access",
                t.fqn()
            ),
        })
        .collect();

    info!(
        tables = tables.len(),
        buckets = storage_buckets.len(),
        "catalog discovery complete"
    );

    Ok(Discovery {
        tables,
        storage_buckets,
        warnings,
    })
}

/// Live introspector backed by the vetted pool.
pub struct PgIntrospector {
    pool: PgPool,
}

impl PgIntrospector {
    /// Create an introspector over the pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn policies(
        &self,
        filter: SchemaFilter,
    ) -> AuditResult<Vec<(String, String, PolicyInfo)>> {
        let conn = self.pool.get().await?;
        let rows = conn
            .query(queries::POLICIES, &[&filter.include_all()])
            .await?;

        let mut policies = Vec::with_capacity(rows.len());
        for row in rows {
            let schema: String = row.get("schema");
            let table: String = row.get("table_name");
            let command: String = row.get("command");
            policies.push((
                schema,
                table,
                PolicyInfo {
                    name: row.get("name"),
                    command: PolicyCommand::from_polcmd(&command)?,
                    roles: row.get("roles"),
                    using_expression: row.get("using_expression"),
                    with_check_expression: row.get("with_check_expression"),
                },
            ));
        }
        Ok(policies)
    }

    async fn storage_object_policies(&self) -> AuditResult<Vec<PolicyInfo>> {
        let conn = self.pool.get().await?;
        let rows = conn.query(queries::STORAGE_OBJECT_POLICIES, &[]).await?;

        let mut policies = Vec::with_capacity(rows.len());
        for row in rows {
            let command: String = row.get("command");
            policies.push(PolicyInfo {
                name: row.get("name"),
                command: PolicyCommand::from_polcmd(&command)?,
                roles: row.get("roles"),
                using_expression: row.get("using_expression"),
                with_check_expression: row.get("with_check_expression"),
            });
        }
        Ok(policies)
    }
}

#[async_trait]
impl Introspector for PgIntrospector {
    async fn tables(&self, filter: SchemaFilter) -> AuditResult<Vec<TableMeta>> {
        let conn = self.pool.get().await?;
        let rows = conn
            .query(queries::TABLES, &[&filter.include_all()])
            .await?;
        drop(conn);

        let mut tables: Vec<TableMeta> = rows
            .into_iter()
            .map(|row| TableMeta {
                schema: row.get("schema"),
                name: row.get("name"),
                rls_enabled: row.get("rls_enabled"),
                rls_forced: row.get("rls_forced"),
                policies: Vec::new(),
            })
            .collect();

        // Attach policies table by table.
        let policies = self.policies(filter).await?;
        for (schema, table_name, policy) in policies {
            if let Some(table) = tables
                .iter_mut()
                .find(|t| t.schema == schema && t.name == table_name)
            {
                table.policies.push(policy);
            } else {
                debug!(
                    table = %format!("{}.{}", schema, table_name),
                    policy = %policy.name,
                    "policy on a relation outside the table scan; ignoring"
                );
            }
        }

        Ok(tables)
    }

    async fn storage_buckets(&self) -> AuditResult<Vec<StorageBucketMeta>> {
        let conn = self.pool.get().await?;

        let exists_row = conn.query_one(queries::STORAGE_SCHEMA_EXISTS, &[]).await?;
        let exists: bool = exists_row.get(0);
        if !exists {
            debug!("storage schema not present; skipping bucket discovery");
            return Ok(Vec::new());
        }

        let rows = conn.query(queries::STORAGE_BUCKETS, &[]).await?;
        drop(conn);

        // One shared policy list for every bucket.
        let policies = self.storage_object_policies().await?;

        Ok(rows
            .into_iter()
            .map(|row| StorageBucketMeta {
                id: row.get("id"),
                name: row.get("name"),
                is_public: row.get("is_public"),
                policies: policies.clone(),
            })
            .collect())
    }

    async fn column_grants(&self, filter: SchemaFilter) -> AuditResult<Vec<ColumnGrant>> {
        let conn = self.pool.get().await?;
        let rows = conn
            .query(queries::COLUMN_GRANTS, &[&filter.include_all()])
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| ColumnGrant {
                schema: row.get("schema"),
                table: row.get("table_name"),
                column: row.get("column_name"),
                grantee: row.get("grantee"),
            })
            .collect())
    }
}

/// Catalog SQL. Each query takes `$1 = include all user schemas`.
pub mod queries {
    /// Base tables with their RLS flags.
    pub const TABLES: &str = r#"
        SELECT
            n.nspname::text          AS schema,
            c.relname::text          AS name,
            c.relrowsecurity         AS rls_enabled,
            c.relforcerowsecurity    AS rls_forced
        FROM pg_class c
        JOIN pg_namespace n ON n.oid = c.relnamespace
        WHERE c.relkind = 'r'
          AND n.nspname NOT IN ('information_schema', 'pg_catalog', 'pg_toast')
          AND ($1 OR n.nspname = 'public')
        ORDER BY n.nspname, c.relname
    "#;

    /// Policies on in-scope tables, with decompiled expressions.
    pub const POLICIES: &str = r#"
        SELECT
            n.nspname::text                          AS schema,
            c.relname::text                          AS table_name,
            p.polname::text                          AS name,
            p.polcmd::text                           AS command,
            CASE
                WHEN p.polroles = '{0}'::oid[] THEN ARRAY['PUBLIC']
                ELSE ARRAY(
                    SELECT r.rolname::text
                    FROM pg_roles r
                    WHERE r.oid = ANY (p.polroles)
                    ORDER BY r.rolname
                )
            END                                      AS roles,
            pg_get_expr(p.polqual, p.polrelid)       AS using_expression,
            pg_get_expr(p.polwithcheck, p.polrelid)  AS with_check_expression
        FROM pg_policy p
        JOIN pg_class c ON c.oid = p.polrelid
        JOIN pg_namespace n ON n.oid = c.relnamespace
        WHERE n.nspname NOT IN ('information_schema', 'pg_catalog', 'pg_toast')
          AND ($1 OR n.nspname = 'public')
        ORDER BY n.nspname, c.relname, p.polname
    "#;

    /// Whether the Supabase storage schema exists at all.
    pub const STORAGE_SCHEMA_EXISTS: &str = r#"
        SELECT EXISTS (
            SELECT 1 FROM pg_namespace WHERE nspname = 'storage'
        ) AND to_regclass('storage.buckets') IS NOT NULL
    "#;

    /// Buckets in the storage schema.
    pub const STORAGE_BUCKETS: &str = r#"
        SELECT
            id::text   AS id,
            name::text AS name,
            public     AS is_public
        FROM storage.buckets
        ORDER BY name
    "#;

    /// Policies on the shared storage.objects relation.
    pub const STORAGE_OBJECT_POLICIES: &str = r#"
        SELECT
            p.polname::text                          AS name,
            p.polcmd::text                           AS command,
            CASE
                WHEN p.polroles = '{0}'::oid[] THEN ARRAY['PUBLIC']
                ELSE ARRAY(
                    SELECT r.rolname::text
                    FROM pg_roles r
                    WHERE r.oid = ANY (p.polroles)
                    ORDER BY r.rolname
                )
            END                                      AS roles,
            pg_get_expr(p.polqual, p.polrelid)       AS using_expression,
            pg_get_expr(p.polwithcheck, p.polrelid)  AS with_check_expression
        FROM pg_policy p
        JOIN pg_class c ON c.oid = p.polrelid
        JOIN pg_namespace n ON n.oid = c.relnamespace
        WHERE n.nspname = 'storage' AND c.relname = 'objects'
        ORDER BY p.polname
    "#;

    /// Columns readable by the public-facing roles through table-level
    /// SELECT grants.
    pub const COLUMN_GRANTS: &str = r#"
        SELECT DISTINCT
            c.table_schema::text AS schema,
            c.table_name::text   AS table_name,
            c.column_name::text  AS column_name,
            g.grantee::text      AS grantee
        FROM information_schema.columns c
        JOIN information_schema.role_table_grants g
          ON g.table_schema = c.table_schema
         AND g.table_name = c.table_name
        WHERE g.grantee IN ('anon', 'authenticated', 'PUBLIC')
          AND g.privilege_type = 'SELECT'
          AND c.table_schema NOT IN ('information_schema', 'pg_catalog', 'pg_toast')
          AND ($1 OR c.table_schema = 'public')
        ORDER BY 1, 2, 3, 4
    "#;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn table(schema: &str, name: &str, rls_enabled: bool) -> TableMeta {
        TableMeta {
            schema: schema.to_string(),
            name: name.to_string(),
            rls_enabled,
            rls_forced: false,
            policies: Vec::new(),
        }
    }

    struct FixtureIntrospector {
        tables: Vec<TableMeta>,
    }

    #[async_trait]
    impl Introspector for FixtureIntrospector {
        async fn tables(&self, _filter: SchemaFilter) -> AuditResult<Vec<TableMeta>> {
            Ok(self.tables.clone())
        }

        async fn storage_buckets(&self) -> AuditResult<Vec<StorageBucketMeta>> {
            Ok(Vec::new())
        }

        async fn column_grants(&self, _filter: SchemaFilter) -> AuditResult<Vec<ColumnGrant>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_polcmd_decoding() {
        assert_eq!(
            PolicyCommand::from_polcmd("r").unwrap(),
            PolicyCommand::Select
        );
        assert_eq!(
            PolicyCommand::from_polcmd("a").unwrap(),
            PolicyCommand::Insert
        );
        assert_eq!(
            PolicyCommand::from_polcmd("w").unwrap(),
            PolicyCommand::Update
        );
        assert_eq!(
            PolicyCommand::from_polcmd("d").unwrap(),
            PolicyCommand::Delete
        );
        assert_eq!(PolicyCommand::from_polcmd("*").unwrap(), PolicyCommand::All);
        assert!(PolicyCommand::from_polcmd("x").is_err());
    }

    #[test]
    fn test_schema_filter_from_flag() {
        assert_eq!(
            SchemaFilter::from_include_system(false),
            SchemaFilter::PublicOnly
        );
        assert_eq!(
            SchemaFilter::from_include_system(true),
            SchemaFilter::AllUserSchemas
        );
    }

    #[tokio::test]
    async fn test_discover_warns_on_rls_disabled() {
        let introspector = FixtureIntrospector {
            tables: vec![
                table("public", "todos", true),
                table("public", "orders", false),
            ],
        };

        let discovery = discover(&introspector, SchemaFilter::PublicOnly)
            .await
            .unwrap();

        assert_eq!(discovery.tables.len(), 2);
        assert_eq!(discovery.warnings.len(), 1);
        assert_eq!(discovery.warnings[0].table, "public.orders");
    }

    #[test]
    fn test_applies_to_public() {
        let policy = PolicyInfo {
            name: "allow_all".to_string(),
            command: PolicyCommand::Select,
            roles: vec!["PUBLIC".to_string()],
            using_expression: Some("true".to_string()),
            with_check_expression: None,
        };
        assert!(policy.applies_to_public());
    }
}
