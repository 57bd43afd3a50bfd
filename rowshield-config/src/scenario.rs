//! Test scenarios: one simulated caller plus its expected outcomes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::claims::JwtClaims;
use crate::op::{Expectation, Op};

/// A named bundle of simulated JWT claims and per-operation expectations.
///
/// A scenario materializes one caller: the claims installed into the
/// session before probing, and the outcome each operation should produce.
/// Operations with no entry in `expected` are skipped for this scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name, unique within its table plan (e.g. "anonymous",
    /// "authenticated", "owner").
    pub name: String,

    /// Claims surfaced to the session GUC; empty means anonymous.
    #[serde(default)]
    pub jwt_claims: JwtClaims,

    /// Expected outcome per operation. Keys are constrained to the four
    /// SQL operations by the `Op` type itself.
    #[serde(default)]
    pub expected: BTreeMap<Op, Expectation>,
}

impl Scenario {
    /// Create a scenario with no claims and no expectations.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            jwt_claims: JwtClaims::anonymous(),
            expected: BTreeMap::new(),
        }
    }

    /// Set the claims.
    pub fn with_claims(mut self, claims: JwtClaims) -> Self {
        self.jwt_claims = claims;
        self
    }

    /// Add an expectation for one operation.
    pub fn expect(mut self, op: Op, expectation: Expectation) -> Self {
        self.expected.insert(op, expectation);
        self
    }

    /// Expect every operation to produce `expectation`.
    pub fn expect_all(mut self, expectation: Expectation) -> Self {
        for op in Op::ALL {
            self.expected.insert(op, expectation);
        }
        self
    }

    /// The expectation for `op`, if the scenario declares one.
    pub fn expectation(&self, op: Op) -> Option<Expectation> {
        self.expected.get(&op).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let scenario = Scenario::new("anonymous")
            .expect(Op::Select, Expectation::Deny)
            .expect(Op::Insert, Expectation::Deny);

        assert_eq!(scenario.expectation(Op::Select), Some(Expectation::Deny));
        assert_eq!(scenario.expectation(Op::Update), None);
    }

    #[test]
    fn test_expect_all() {
        let scenario = Scenario::new("owner").expect_all(Expectation::Allow);
        assert_eq!(scenario.expected.len(), 4);
        assert_eq!(scenario.expectation(Op::Delete), Some(Expectation::Allow));
    }

    #[test]
    fn test_deserialize_rejects_unknown_op_key() {
        let yaml = r#"
name: anonymous
expected:
  SELECT: DENY
  TRUNCATE: DENY
"#;
        assert!(serde_yaml::from_str::<Scenario>(yaml).is_err());
    }

    #[test]
    fn test_deserialize_defaults() {
        let scenario: Scenario = serde_yaml::from_str("name: anonymous").unwrap();
        assert!(scenario.jwt_claims.is_empty());
        assert!(scenario.expected.is_empty());
    }
}
