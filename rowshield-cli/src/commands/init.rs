//! `rowshield init` - write a starter policy file from the live catalog.

use std::collections::BTreeMap;

use rowshield_config::{
    Defaults, Expectation, JwtClaims, Op, PolicyConfig, Scenario, TableKey, TablePlan,
};

use crate::cli::{Cli, InitArgs};
use crate::error::{CliError, CliResult};
use crate::output;

/// Run the init command
pub async fn run(cli: &Cli, args: &InitArgs) -> CliResult<i32> {
    let path = args.output.clone().unwrap_or_else(|| cli.config.clone());

    if path.exists() && !args.force {
        return Err(CliError::Command(format!(
            "'{}' already exists; pass --force to overwrite",
            path.display()
        )));
    }

    let ctx = super::connect(cli, 2).await?;

    if !cli.json {
        output::header("Init");
        output::kv("database", &ctx.pool().config().display_target());
        output::kv("output", &path.display().to_string());
        output::newline();
    }

    let discovery = super::run_discovery(&ctx, args.include_system_schemas).await?;
    ctx.close();

    let config = starter_config(&discovery.tables.iter().map(|t| (t.schema.clone(), t.name.clone())).collect::<Vec<_>>());

    let yaml = serde_yaml::to_string(&config)?;
    let content = format!(
        "# rowshield policy plan\n# Every table starts locked down: anonymous and authenticated are\n# both expected to be denied everywhere. Loosen expectations to match\n# your intended access model, then run `rowshield test`.\n{}",
        yaml
    );
    std::fs::write(&path, content)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        output::success(&format!(
            "wrote starter plan for {} table(s) to {}",
            config.tables.len(),
            path.display()
        ));
        for warning in &discovery.warnings {
            output::warn(&warning.message);
        }
        output::info("adjust expectations, then run `rowshield test`");
    }

    Ok(0)
}

/// A deny-everything starter plan: the safest default, and every deviation
/// the operator writes afterwards is a conscious decision.
fn starter_config(tables: &[(String, String)]) -> PolicyConfig {
    let deny_all: BTreeMap<Op, Expectation> = Op::ALL
        .into_iter()
        .map(|op| (op, Expectation::Deny))
        .collect();

    let scenarios = vec![
        Scenario {
            name: "anonymous".to_string(),
            jwt_claims: JwtClaims::anonymous(),
            expected: deny_all.clone(),
        },
        Scenario {
            name: "authenticated".to_string(),
            jwt_claims: JwtClaims::from_pairs([(
                "role",
                serde_json::json!("authenticated"),
            )]),
            expected: deny_all,
        },
    ];

    let tables = tables
        .iter()
        .map(|(schema, name)| {
            (
                TableKey::new(schema, name),
                TablePlan {
                    test_scenarios: scenarios.clone(),
                    custom_operations: None,
                },
            )
        })
        .collect();

    PolicyConfig {
        tables,
        storage_buckets: Default::default(),
        defaults: Some(Defaults::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_starter_config_denies_everything() {
        let config = starter_config(&[("public".to_string(), "todos".to_string())]);

        assert_eq!(config.tables.len(), 1);
        let plan = &config.tables[&TableKey::new("public", "todos")];
        assert_eq!(plan.test_scenarios.len(), 2);

        for scenario in &plan.test_scenarios {
            assert_eq!(scenario.expected.len(), 4);
            assert!(
                scenario
                    .expected
                    .values()
                    .all(|e| *e == Expectation::Deny)
            );
        }
    }

    #[test]
    fn test_starter_config_round_trips_through_yaml() {
        let config = starter_config(&[
            ("public".to_string(), "todos".to_string()),
            ("public".to_string(), "posts".to_string()),
        ]);

        let yaml = serde_yaml::to_string(&config).unwrap();
        let reloaded = PolicyConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(reloaded.tables.len(), 2);
        assert_eq!(
            reloaded.tables[&TableKey::new("public", "posts")]
                .test_scenarios[1]
                .jwt_claims
                .session_role(),
            "authenticated"
        );
    }
}
