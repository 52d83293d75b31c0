// restorecheck/src/restore/verification.rs
use log::info;
use std::fmt;

use super::db_restore::DatabaseEngine;
use crate::config::{CheckTarget, Operator};
use crate::errors::{RestoreError, Result};
use crate::utils::with_deadline;

/// Outcome of evaluating one check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail(String),
}

/// How a check query's result set is turned into a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountMode {
    /// Number of rows returned.
    Rows,
    /// A single-row, single-integer-column result is read as a value
    /// (`select count(*) ...`); any other shape falls back to the row count.
    ScalarOrRows,
}

impl CountMode {
    pub fn for_operator(operator: &Operator) -> Self {
        match operator {
            Operator::Exists => CountMode::Rows,
            _ => CountMode::ScalarOrRows,
        }
    }
}

/// What running a check query produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub count: i64,
    pub error: Option<String>,
}

impl Observation {
    pub fn count(count: i64) -> Self {
        Self { count, error: None }
    }

    pub fn failed(error: impl fmt::Display) -> Self {
        Self { count: 0, error: Some(error.to_string()) }
    }
}

/// Decides whether an observation satisfies a check.
///
/// A query error fails every operator except `ExpectError` before the count
/// is looked at. `GreaterOrEqual` and `LessOrEqual` are inclusive.
pub fn evaluate(
    operator: &Operator,
    expected: i64,
    observed: i64,
    observed_error: Option<&str>,
) -> Result<Verdict> {
    let verdict = match (operator, observed_error) {
        (Operator::Unsupported(tag), _) => {
            return Err(RestoreError::UnsupportedOperator(tag.clone()));
        }
        (Operator::ExpectError, Some(_)) => Verdict::Pass,
        (Operator::ExpectError, None) => {
            Verdict::Fail("expected the query to fail, but it succeeded".to_string())
        }
        (_, Some(error)) => Verdict::Fail(format!("query failed: {}", error)),
        (Operator::Exists, None) if observed > 0 => Verdict::Pass,
        (Operator::Exists, None) => Verdict::Fail("expected at least one row, got 0".to_string()),
        (Operator::Equal, None) if observed == expected => Verdict::Pass,
        (Operator::Equal, None) => Verdict::Fail(format!("expected {}, got {}", expected, observed)),
        (Operator::GreaterOrEqual, None) if observed >= expected => Verdict::Pass,
        (Operator::GreaterOrEqual, None) => Verdict::Fail(format!(
            "expected at least {}, got {}",
            expected, observed
        )),
        (Operator::LessOrEqual, None) if observed <= expected => Verdict::Pass,
        (Operator::LessOrEqual, None) => Verdict::Fail(format!(
            "expected at most {}, got {}",
            expected, observed
        )),
        (Operator::ExpectNoError, None) => Verdict::Pass,
    };
    Ok(verdict)
}

/// Runs every check in order against the restored schema, stopping at the
/// first failure. Returns the number of checks that passed.
pub async fn verify_restore(
    engine: &mut dyn DatabaseEngine,
    checks: &[CheckTarget],
    check_timeout_secs: Option<u64>,
) -> Result<usize> {
    if checks.is_empty() {
        info!("No checks configured; restore is considered valid.");
        return Ok(0);
    }

    for (index, check) in checks.iter().enumerate() {
        if let Operator::Unsupported(tag) = &check.operator {
            return Err(RestoreError::UnsupportedOperator(tag.clone()));
        }

        info!("Check #{}: {} ({:?} {})", index + 1, check.query, check.operator, check.value);
        let mode = CountMode::for_operator(&check.operator);
        let observation =
            with_deadline("check", check_timeout_secs, engine.observe(&check.query, mode)).await?;

        match evaluate(
            &check.operator,
            check.value,
            observation.count,
            observation.error.as_deref(),
        )? {
            Verdict::Pass => info!("✓ Check #{} passed", index + 1),
            Verdict::Fail(reason) => {
                return Err(RestoreError::CheckFailure {
                    index: index + 1,
                    query: check.query.clone(),
                    reason,
                });
            }
        }
    }

    info!("✓ All {} checks passed", checks.len());
    Ok(checks.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUERY_ERROR: Option<&str> = Some("Table 'db.t' doesn't exist");

    fn verdict(operator: Operator, expected: i64, observed: i64, error: Option<&str>) -> Verdict {
        evaluate(&operator, expected, observed, error).unwrap()
    }

    #[test]
    fn test_truth_table() {
        assert_eq!(verdict(Operator::Equal, 5, 5, None), Verdict::Pass);
        assert_ne!(verdict(Operator::Equal, 5, 4, None), Verdict::Pass);
        assert_eq!(verdict(Operator::GreaterOrEqual, 3, 3, None), Verdict::Pass);
        assert_eq!(verdict(Operator::GreaterOrEqual, 3, 10, None), Verdict::Pass);
        assert_ne!(verdict(Operator::GreaterOrEqual, 4, 3, None), Verdict::Pass);
        assert_eq!(verdict(Operator::LessOrEqual, 3, 3, None), Verdict::Pass);
        assert_eq!(verdict(Operator::LessOrEqual, 3, 0, None), Verdict::Pass);
        assert_ne!(verdict(Operator::LessOrEqual, 3, 4, None), Verdict::Pass);
        assert_eq!(verdict(Operator::ExpectError, 0, 0, QUERY_ERROR), Verdict::Pass);
        assert_ne!(verdict(Operator::ExpectError, 0, 0, None), Verdict::Pass);
        assert_ne!(verdict(Operator::Exists, 0, 0, None), Verdict::Pass);
        assert_eq!(verdict(Operator::Exists, 0, 1, None), Verdict::Pass);
        assert_eq!(verdict(Operator::ExpectNoError, 0, 0, None), Verdict::Pass);
        assert_ne!(verdict(Operator::ExpectNoError, 0, 0, QUERY_ERROR), Verdict::Pass);
    }

    #[test]
    fn test_value_ignored_where_irrelevant() {
        assert_eq!(verdict(Operator::Exists, 100, 1, None), Verdict::Pass);
        assert_eq!(verdict(Operator::ExpectNoError, 100, 0, None), Verdict::Pass);
        assert_eq!(verdict(Operator::ExpectError, 100, 7, QUERY_ERROR), Verdict::Pass);
    }

    #[test]
    fn test_query_error_fails_every_operator_but_expect_error() {
        for operator in [
            Operator::Exists,
            Operator::Equal,
            Operator::GreaterOrEqual,
            Operator::LessOrEqual,
            Operator::ExpectNoError,
        ] {
            // The count would satisfy the comparison on its own.
            match verdict(operator.clone(), 5, 5, QUERY_ERROR) {
                Verdict::Fail(reason) => assert!(reason.contains("doesn't exist"), "{reason}"),
                Verdict::Pass => panic!("{:?} passed despite a query error", operator),
            }
        }
    }

    #[test]
    fn test_failure_reason_names_both_values() {
        match verdict(Operator::Equal, 5, 4, None) {
            Verdict::Fail(reason) => {
                assert!(reason.contains('5') && reason.contains('4'), "{reason}");
            }
            Verdict::Pass => panic!("4 != 5 should fail"),
        }
    }

    #[test]
    fn test_unsupported_operator_fails_closed() {
        let err = evaluate(&Operator::Unsupported("between".to_string()), 1, 1, None).unwrap_err();
        assert!(matches!(err, RestoreError::UnsupportedOperator(ref tag) if tag == "between"));
    }

    #[test]
    fn test_count_mode_per_operator() {
        assert_eq!(CountMode::for_operator(&Operator::Exists), CountMode::Rows);
        assert_eq!(CountMode::for_operator(&Operator::Equal), CountMode::ScalarOrRows);
        assert_eq!(CountMode::for_operator(&Operator::LessOrEqual), CountMode::ScalarOrRows);
    }
}
