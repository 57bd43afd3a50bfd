//! The probe engine: one contained attempt per (relation, claims, op).

use tokio_postgres::types::ToSql;
use tracing::debug;

use rowshield_config::{JwtClaims, Op};
use rowshield_postgres::{PgError, PgPool, PgResult, PgTransaction};

use crate::outcome::{ProbeOutcome, classify_db_error};
use crate::values::{ColumnInfo, build_insert, quote_ident};

/// Savepoint name used by every probe.
const SAVEPOINT: &str = "test_probe";

/// What a probe aims at.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeTarget {
    /// A base table.
    Table {
        /// Schema name.
        schema: String,
        /// Table name.
        name: String,
    },
    /// The shared `storage.objects` relation, scoped to one bucket's rows.
    StorageObjects {
        /// The `bucket_id` filter value.
        bucket_id: String,
    },
}

impl ProbeTarget {
    /// Target a table.
    pub fn table(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Table {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Target one storage bucket's object rows.
    pub fn storage(bucket_id: impl Into<String>) -> Self {
        Self::StorageObjects {
            bucket_id: bucket_id.into(),
        }
    }

    /// The schema the target lives in.
    pub fn schema(&self) -> &str {
        match self {
            Self::Table { schema, .. } => schema,
            Self::StorageObjects { .. } => "storage",
        }
    }

    /// The relation name.
    pub fn relation(&self) -> &str {
        match self {
            Self::Table { name, .. } => name,
            Self::StorageObjects { .. } => "objects",
        }
    }

    /// The double-quoted qualified name spliced into probe SQL.
    pub fn qualified(&self) -> String {
        format!(
            "{}.{}",
            quote_ident(self.schema()),
            quote_ident(self.relation())
        )
    }

    /// The bucket filter, for the storage variant.
    fn bucket_filter(&self) -> Option<&str> {
        match self {
            Self::Table { .. } => None,
            Self::StorageObjects { bucket_id } => Some(bucket_id),
        }
    }
}

/// A classified probe plus any retained server-error text.
///
/// `detail` is populated when a server error was classified into
/// ALLOW/DENY so the caller can surface the cause without re-probing.
#[derive(Debug, Clone)]
pub struct ProbeObservation {
    /// The classified outcome.
    pub outcome: ProbeOutcome,
    /// Server-error text behind an ALLOW/DENY classification, if any.
    pub detail: Option<String>,
}

impl ProbeObservation {
    fn allow() -> Self {
        Self {
            outcome: ProbeOutcome::Allow,
            detail: None,
        }
    }

    fn deny() -> Self {
        Self {
            outcome: ProbeOutcome::Deny,
            detail: None,
        }
    }

    fn skipped(reason: impl Into<String>) -> Self {
        Self {
            outcome: ProbeOutcome::Skipped(reason.into()),
            detail: None,
        }
    }
}

enum MutationKind {
    Update,
    Delete,
}

/// Executes probes under transactional containment.
///
/// Every probe acquires a fresh pooled connection, runs the whole
/// protocol on it, and releases it on exit; session state installed via
/// `SET LOCAL` and `set_config(..., true)` is transaction-scoped and
/// cannot leak to the next pool user.
#[derive(Clone)]
pub struct ProbeEngine {
    pool: PgPool,
}

impl ProbeEngine {
    /// Create an engine over the vetted pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run one probe. Never fails: every failure mode classifies into
    /// one of the four outcomes.
    pub async fn probe(&self, target: &ProbeTarget, claims: &JwtClaims, op: Op) -> ProbeObservation {
        debug!(
            target = %target.qualified(),
            role = claims.session_role(),
            op = %op,
            "running probe"
        );

        match self.run_contained(target, claims, op).await {
            Ok(observation) => observation,
            Err(e) => ProbeObservation {
                outcome: ProbeOutcome::Error(e.to_string()),
                detail: None,
            },
        }
    }

    /// The containment protocol. Strictly ordered; the two rollbacks are
    /// redundant on purpose so a bug in either path cannot persist state.
    async fn run_contained(
        &self,
        target: &ProbeTarget,
        claims: &JwtClaims,
        op: Op,
    ) -> PgResult<ProbeObservation> {
        let mut conn = self.pool.get().await?;
        let txn = conn.transaction().await?;

        install_identity(&txn, claims).await?;
        txn.savepoint(SAVEPOINT).await?;

        let observation = self.attempt(&txn, target, op).await?;

        txn.rollback_to(SAVEPOINT).await?;
        txn.rollback().await?;

        Ok(observation)
    }

    async fn attempt(
        &self,
        txn: &PgTransaction<'_>,
        target: &ProbeTarget,
        op: Op,
    ) -> PgResult<ProbeObservation> {
        match op {
            Op::Select => self.attempt_select(txn, target).await,
            Op::Insert => self.attempt_insert(txn, target).await,
            Op::Update => {
                self.attempt_mutation(txn, target, MutationKind::Update)
                    .await
            }
            Op::Delete => {
                self.attempt_mutation(txn, target, MutationKind::Delete)
                    .await
            }
        }
    }

    async fn attempt_select(
        &self,
        txn: &PgTransaction<'_>,
        target: &ProbeTarget,
    ) -> PgResult<ProbeObservation> {
        let result = match target.bucket_filter() {
            None => {
                let sql = format!("SELECT * FROM {} LIMIT 1", target.qualified());
                txn.query(&sql, &[]).await
            }
            Some(bucket) => {
                let sql = format!(
                    "SELECT * FROM {} WHERE \"bucket_id\" = $1 LIMIT 1",
                    target.qualified()
                );
                txn.query(&sql, &[&bucket]).await
            }
        };

        match result {
            // An empty result under RLS is indistinguishable from "denied":
            // the policy hid every row.
            Ok(rows) if rows.is_empty() => Ok(ProbeObservation::deny()),
            Ok(_) => Ok(ProbeObservation::allow()),
            Err(e) => classify(e),
        }
    }

    async fn attempt_insert(
        &self,
        txn: &PgTransaction<'_>,
        target: &ProbeTarget,
    ) -> PgResult<ProbeObservation> {
        let columns = match self.columns(txn, target).await {
            Ok(columns) => columns,
            Err(e) => return classify(e),
        };

        let overrides: Vec<(&str, String)> = match target.bucket_filter() {
            Some(bucket) => vec![("bucket_id", bucket.to_string())],
            None => Vec::new(),
        };

        let stmt = build_insert(&target.qualified(), &columns, &overrides);
        let params: Vec<&(dyn ToSql + Sync)> = stmt
            .params
            .iter()
            .map(|p| p as &(dyn ToSql + Sync))
            .collect();

        match txn.execute(&stmt.sql, &params).await {
            Ok(_) => Ok(ProbeObservation::allow()),
            Err(e) => classify(e),
        }
    }

    async fn attempt_mutation(
        &self,
        txn: &PgTransaction<'_>,
        target: &ProbeTarget,
        kind: MutationKind,
    ) -> PgResult<ProbeObservation> {
        let pk_columns = match self.primary_key(txn, target).await {
            Ok(columns) => columns,
            Err(e) => return classify(e),
        };

        let Some(pk) = pk_columns.first() else {
            return Ok(ProbeObservation::skipped(
                "no primary key; a targeted mutation would be ambiguous",
            ));
        };
        let pk = quote_ident(pk);

        // Find one row visible under the active claims. No visible row
        // reads as DENY by contract: a caller cannot modify a row they
        // cannot see, even if the table is merely empty for them.
        let lookup = match target.bucket_filter() {
            None => {
                let sql = format!(
                    "SELECT {}::text FROM {} LIMIT 1",
                    pk,
                    target.qualified()
                );
                txn.query_opt(&sql, &[]).await
            }
            Some(bucket) => {
                let sql = format!(
                    "SELECT {}::text FROM {} WHERE \"bucket_id\" = $1 LIMIT 1",
                    pk,
                    target.qualified()
                );
                txn.query_opt(&sql, &[&bucket]).await
            }
        };

        let row = match lookup {
            Ok(row) => row,
            Err(e) => return classify(e),
        };
        let Some(row) = row else {
            return Ok(ProbeObservation::deny());
        };
        let pk_value: String = row.get(0);

        // A no-op write targeted at exactly that row.
        let result = match (&kind, target.bucket_filter()) {
            (MutationKind::Update, None) => {
                let sql = format!(
                    "UPDATE {} SET {} = {} WHERE {}::text = $1",
                    target.qualified(),
                    pk,
                    pk,
                    pk
                );
                txn.execute(&sql, &[&pk_value]).await
            }
            (MutationKind::Update, Some(bucket)) => {
                let sql = format!(
                    "UPDATE {} SET {} = {} WHERE {}::text = $1 AND \"bucket_id\" = $2",
                    target.qualified(),
                    pk,
                    pk,
                    pk
                );
                txn.execute(&sql, &[&pk_value, &bucket]).await
            }
            (MutationKind::Delete, None) => {
                let sql = format!(
                    "DELETE FROM {} WHERE {}::text = $1",
                    target.qualified(),
                    pk
                );
                txn.execute(&sql, &[&pk_value]).await
            }
            (MutationKind::Delete, Some(bucket)) => {
                let sql = format!(
                    "DELETE FROM {} WHERE {}::text = $1 AND \"bucket_id\" = $2",
                    target.qualified(),
                    pk
                );
                txn.execute(&sql, &[&pk_value, &bucket]).await
            }
        };

        match result {
            Ok(affected) if affected > 0 => Ok(ProbeObservation::allow()),
            Ok(_) => Ok(ProbeObservation::deny()),
            Err(e) => classify(e),
        }
    }

    async fn columns(
        &self,
        txn: &PgTransaction<'_>,
        target: &ProbeTarget,
    ) -> PgResult<Vec<ColumnInfo>> {
        let rows = txn
            .query(sql::COLUMNS, &[&target.schema(), &target.relation()])
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| ColumnInfo {
                name: row.get("name"),
                data_type: row.get("data_type"),
                udt_name: row.get("udt_name"),
                has_default: row.get("has_default"),
            })
            .collect())
    }

    async fn primary_key(
        &self,
        txn: &PgTransaction<'_>,
        target: &ProbeTarget,
    ) -> PgResult<Vec<String>> {
        let rows = txn
            .query(sql::PRIMARY_KEY, &[&target.qualified()])
            .await?;
        Ok(rows.into_iter().map(|row| row.get(0)).collect())
    }
}

/// Install the simulated caller into the transaction.
///
/// Both the session role and the `role` GUC are written when the claims
/// carry a role outside the two session roles; different policy styles
/// read different sources, and writing both covers them.
async fn install_identity(txn: &PgTransaction<'_>, claims: &JwtClaims) -> PgResult<()> {
    txn.query(
        "SELECT set_config('request.jwt.claims', $1, true)",
        &[&claims.to_guc_json()],
    )
    .await?;

    // Role names cannot be bound as parameters; the value is one of two
    // engine constants.
    txn.batch_execute(&format!(
        "SET LOCAL ROLE {}",
        quote_ident(claims.session_role())
    ))
    .await?;

    if let Some(role) = claims.custom_role() {
        txn.query("SELECT set_config('role', $1, true)", &[&role])
            .await?;
    }

    Ok(())
}

/// Fold a failed statement into an observation.
///
/// Server-reported errors classify (that is the point of probing); client
/// and transport errors propagate and surface as ERROR.
fn classify(error: PgError) -> PgResult<ProbeObservation> {
    match error {
        PgError::Postgres(err) if err.as_db_error().is_some() => {
            let (outcome, detail) = classify_db_error(&err);
            Ok(ProbeObservation { outcome, detail })
        }
        other => Err(other),
    }
}

/// Introspection SQL used inside probe transactions.
mod sql {
    /// Columns of the target as visible to the impersonated session.
    pub const COLUMNS: &str = r#"
        SELECT
            column_name::text AS name,
            data_type::text   AS data_type,
            udt_name::text    AS udt_name,
            (column_default IS NOT NULL OR is_identity = 'YES') AS has_default
        FROM information_schema.columns
        WHERE table_schema = $1 AND table_name = $2
        ORDER BY ordinal_position
    "#;

    /// Primary-key columns in index order.
    pub const PRIMARY_KEY: &str = r#"
        SELECT a.attname::text
        FROM pg_index i
        JOIN pg_attribute a
          ON a.attrelid = i.indrelid AND a.attnum = ANY (i.indkey)
        WHERE i.indrelid = to_regclass($1)
          AND i.indisprimary
        ORDER BY array_position(i.indkey, a.attnum)
    "#;
}
