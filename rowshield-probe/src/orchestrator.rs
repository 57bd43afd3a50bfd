//! The test orchestrator: expand the plan, fan probes out, aggregate.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use rowshield_audit::Discovery;
use rowshield_config::{Op, PolicyConfig, RunOptions, Scenario};
use rowshield_postgres::{ConnectionContext, PgPool};

use crate::engine::{ProbeEngine, ProbeTarget};
use crate::error::ProbeRunResult;
use crate::realuser;
use crate::results::{TestResult, TestResults};

/// Cooperative cancellation for a run.
///
/// Cancelling stops workers from pulling new tasks; a probe already past
/// BEGIN always finishes its rollback path, so containment survives
/// cancellation.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// A fresh, uncancelled flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One table (or bucket) and everything to probe on it.
///
/// The per-table bundle is the scheduling unit: scenario expansion and
/// connection churn amortize over the table.
#[derive(Debug)]
struct ProbeTask {
    key: String,
    target: ProbeTarget,
    scenarios: Vec<Scenario>,
    ops: Vec<Op>,
}

/// Runs a policy plan against a live database.
pub struct Orchestrator {
    engine: ProbeEngine,
    pool: PgPool,
}

impl Orchestrator {
    /// Build an orchestrator over a vetted connection.
    pub fn new(ctx: &ConnectionContext) -> Self {
        Self {
            engine: ProbeEngine::new(ctx.pool().clone()),
            pool: ctx.pool().clone(),
        }
    }

    /// Run the plan. Results come back sorted and counted; per-probe
    /// failures never abort the run.
    pub async fn run(
        &self,
        config: &PolicyConfig,
        discovery: &Discovery,
        options: &RunOptions,
        cancel: &CancelFlag,
    ) -> ProbeRunResult<TestResults> {
        let started = Instant::now();

        // Real-user mode replaces the plan wholesale: one scenario per
        // table, everything expected ALLOW, so the output reads as "what
        // can this user actually do".
        let effective_config;
        let config = match &options.as_user {
            Some(identifier) => {
                effective_config =
                    realuser::override_config(&self.pool, identifier, config).await?;
                &effective_config
            }
            None => config,
        };

        let (mut tasks, rls_disabled) = build_tasks(config, discovery, options);
        info!(
            tasks = tasks.len(),
            rls_disabled = rls_disabled.len(),
            parallelism = options.parallelism(),
            "starting probe run"
        );

        // parallelism = 1 keeps the probe sequence strictly serial.
        let results = if options.parallelism() == 1 {
            let mut results = Vec::new();
            while let Some(task) = tasks.pop_front() {
                if cancel.is_cancelled() {
                    break;
                }
                results.extend(run_task(&self.engine, &task, cancel).await);
            }
            results
        } else {
            self.run_parallel(tasks, options.parallelism(), cancel).await
        };

        Ok(TestResults::aggregate(
            results,
            rls_disabled,
            started.elapsed().as_millis() as u64,
        ))
    }

    async fn run_parallel(
        &self,
        tasks: VecDeque<ProbeTask>,
        parallelism: usize,
        cancel: &CancelFlag,
    ) -> Vec<TestResult> {
        let queue = Arc::new(Mutex::new(tasks));
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<TestResult>>();
        let mut workers = JoinSet::new();

        for _ in 0..parallelism {
            let queue = Arc::clone(&queue);
            let tx = tx.clone();
            let engine = self.engine.clone();
            let cancel = cancel.clone();

            workers.spawn(async move {
                loop {
                    if cancel.is_cancelled() {
                        debug!("worker stopping on cancellation");
                        break;
                    }
                    let task = {
                        let mut queue = queue.lock().unwrap();
                        queue.pop_front()
                    };
                    let Some(task) = task else { break };

                    let bundle = run_task(&engine, &task, &cancel).await;
                    // The receiver outlives the workers; a send failure
                    // just means the run is being torn down.
                    if tx.send(bundle).is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        // Message-passing aggregation: workers send completed per-table
        // bundles, the run loop is the only writer of the result set.
        let mut results = Vec::new();
        while let Some(bundle) = rx.recv().await {
            results.extend(bundle);
        }
        while workers.join_next().await.is_some() {}

        results
    }
}

/// Probe every (scenario, op) pair of one task.
///
/// Cancellation is honored between probes, never inside one: a probe past
/// BEGIN always reaches its rollbacks.
async fn run_task(engine: &ProbeEngine, task: &ProbeTask, cancel: &CancelFlag) -> Vec<TestResult> {
    let mut bundle = Vec::new();

    for scenario in &task.scenarios {
        for op in &task.ops {
            if cancel.is_cancelled() {
                return bundle;
            }
            let Some(expected) = scenario.expectation(*op) else {
                continue;
            };

            let probe_started = Instant::now();
            let observation = engine.probe(&task.target, &scenario.jwt_claims, *op).await;

            bundle.push(TestResult::evaluate(
                &task.key,
                &scenario.name,
                scenario.jwt_claims.session_role(),
                *op,
                expected,
                observation,
                probe_started.elapsed().as_millis() as u64,
            ));
        }
    }

    bundle
}

/// Expand the plan into per-table tasks, splitting off RLS-disabled
/// tables. Those are never probed (there is nothing to probe; grants alone
/// gate access, and a write probe would not be contained by any policy) —
/// they surface as findings instead.
fn build_tasks(
    config: &PolicyConfig,
    discovery: &Discovery,
    options: &RunOptions,
) -> (VecDeque<ProbeTask>, Vec<String>) {
    let mut tasks = VecDeque::new();
    let mut rls_disabled = Vec::new();

    for (key, plan) in &config.tables {
        if !options.table_in_scope(key) {
            continue;
        }

        let meta = discovery
            .tables
            .iter()
            .find(|t| t.schema == key.schema && t.name == key.name);

        if let Some(meta) = meta {
            if !meta.rls_enabled {
                warn!(table = %key, "RLS disabled; reporting instead of probing");
                rls_disabled.push(key.to_string());
                continue;
            }
        }

        let scenarios = config.effective_scenarios(plan);
        if scenarios.is_empty() {
            debug!(table = %key, "no scenarios declared and no defaults; skipping");
            continue;
        }

        tasks.push_back(ProbeTask {
            key: key.to_string(),
            target: ProbeTarget::table(&key.schema, &key.name),
            scenarios,
            ops: PolicyConfig::effective_ops(plan),
        });
    }

    // Buckets are out of scope when the run targets a single table.
    if options.target_table.is_none() {
        for (bucket_name, plan) in &config.storage_buckets {
            let scenarios = config.effective_bucket_scenarios(plan);
            if scenarios.is_empty() {
                continue;
            }

            // The plan is keyed by bucket name; probing filters by id.
            let bucket_id = discovery
                .storage_buckets
                .iter()
                .find(|b| &b.name == bucket_name)
                .map(|b| b.id.clone())
                .unwrap_or_else(|| bucket_name.clone());

            tasks.push_back(ProbeTask {
                key: format!("storage:{}", bucket_name),
                target: ProbeTarget::storage(bucket_id),
                scenarios,
                ops: PolicyConfig::effective_bucket_ops(plan),
            });
        }
    }

    (tasks, rls_disabled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rowshield_audit::{StorageBucketMeta, TableMeta};
    use rowshield_config::TableKey;

    fn discovery_with(tables: Vec<TableMeta>, buckets: Vec<StorageBucketMeta>) -> Discovery {
        Discovery {
            tables,
            storage_buckets: buckets,
            warnings: Vec::new(),
        }
    }

    fn meta(schema: &str, name: &str, rls_enabled: bool) -> TableMeta {
        TableMeta {
            schema: schema.to_string(),
            name: name.to_string(),
            rls_enabled,
            rls_forced: false,
            policies: Vec::new(),
        }
    }

    const PLAN: &str = r#"
tables:
  public.todos:
    test_scenarios:
      - name: anonymous
        expected:
          SELECT: DENY
  public.orders:
    test_scenarios:
      - name: anonymous
        expected:
          SELECT: DENY
  audit.events:
    test_scenarios:
      - name: anonymous
        expected:
          SELECT: DENY
storage_buckets:
  avatars:
    test_scenarios:
      - name: anonymous
        expected:
          SELECT: ALLOW
"#;

    #[test]
    fn test_rls_disabled_tables_are_split_off() {
        let config = PolicyConfig::from_yaml_str(PLAN).unwrap();
        let discovery = discovery_with(
            vec![
                meta("public", "todos", true),
                meta("public", "orders", false),
            ],
            Vec::new(),
        );

        let (tasks, rls_disabled) = build_tasks(&config, &discovery, &RunOptions::default());

        let keys: Vec<&str> = tasks.iter().map(|t| t.key.as_str()).collect();
        // orders is reported, not probed; audit.events is outside the
        // public-only scope; the bucket still gets a task.
        assert_eq!(keys, vec!["public.todos", "storage:avatars"]);
        assert_eq!(rls_disabled, vec!["public.orders".to_string()]);
    }

    #[test]
    fn test_include_system_schemas_widens_scope() {
        let config = PolicyConfig::from_yaml_str(PLAN).unwrap();
        let discovery = discovery_with(
            vec![
                meta("public", "todos", true),
                meta("public", "orders", true),
                meta("audit", "events", true),
            ],
            Vec::new(),
        );

        let options = RunOptions::default().include_system_schemas(true);
        let (tasks, _) = build_tasks(&config, &discovery, &options);
        assert!(tasks.iter().any(|t| t.key == "audit.events"));
    }

    #[test]
    fn test_target_table_drops_buckets() {
        let config = PolicyConfig::from_yaml_str(PLAN).unwrap();
        let discovery = discovery_with(vec![meta("public", "todos", true)], Vec::new());

        let options = RunOptions::default().target_table(TableKey::new("public", "todos"));
        let (tasks, _) = build_tasks(&config, &discovery, &options);

        let keys: Vec<&str> = tasks.iter().map(|t| t.key.as_str()).collect();
        assert_eq!(keys, vec!["public.todos"]);
    }

    #[test]
    fn test_bucket_name_resolves_to_id() {
        let config = PolicyConfig::from_yaml_str(PLAN).unwrap();
        let discovery = discovery_with(
            vec![meta("public", "todos", true), meta("public", "orders", true)],
            vec![StorageBucketMeta {
                id: "bucket-uuid-1".to_string(),
                name: "avatars".to_string(),
                is_public: false,
                policies: Vec::new(),
            }],
        );

        let (tasks, _) = build_tasks(&config, &discovery, &RunOptions::default());
        let bucket_task = tasks.iter().find(|t| t.key == "storage:avatars").unwrap();
        assert_eq!(
            bucket_task.target,
            ProbeTarget::storage("bucket-uuid-1")
        );
    }

    #[test]
    fn test_table_missing_from_discovery_is_still_probed() {
        let config = PolicyConfig::from_yaml_str(PLAN).unwrap();
        let discovery = discovery_with(Vec::new(), Vec::new());

        let (tasks, rls_disabled) = build_tasks(&config, &discovery, &RunOptions::default());
        assert!(tasks.iter().any(|t| t.key == "public.todos"));
        assert!(rls_disabled.is_empty());
    }

    #[test]
    fn test_cancel_flag() {
        let flag = CancelFlag::new();
        assert!(!flag.is_cancelled());
        let clone = flag.clone();
        clone.cancel();
        assert!(flag.is_cancelled());
    }
}
