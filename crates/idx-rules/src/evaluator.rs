//! Condition evaluator.
//!
//! Each condition is resolved against the dynamic value map first and the
//! typed object second. AND short-circuits on the first false condition,
//! OR on the first true one. Evaluation is pure.

use std::collections::BTreeMap;

use idx_core::{IndicatorSnapshot, IndicatorValue};
use tracing::{trace, warn};

use crate::accessor::{snapshot_registry, AccessorRegistry};
use crate::error::{RuleError, RuleResult};
use crate::rule::{Combinator, Condition, Operator, Rule};

/// Dynamic key→value source checked before the object fields.
pub type ValueMap = BTreeMap<String, IndicatorValue>;

/// Evaluate `rule` against `dynamic` and then `object` via `registry`.
pub fn evaluate<T>(
    rule: &Rule,
    dynamic: &ValueMap,
    object: &T,
    registry: &AccessorRegistry<T>,
) -> RuleResult<bool> {
    match rule.combinator {
        Combinator::And => {
            for condition in &rule.conditions {
                if !evaluate_condition(condition, dynamic, object, registry)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Combinator::Or => {
            for condition in &rule.conditions {
                if evaluate_condition(condition, dynamic, object, registry)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

/// Evaluate a single condition.
pub fn evaluate_condition<T>(
    condition: &Condition,
    dynamic: &ValueMap,
    object: &T,
    registry: &AccessorRegistry<T>,
) -> RuleResult<bool> {
    let left = resolve(&condition.field, dynamic, object, registry)?;
    let result = compare(condition, &left)?;
    trace!(
        field = %condition.field,
        operator = %condition.operator,
        left = %left,
        right = %condition.value,
        result,
        "Condition evaluated"
    );
    Ok(result)
}

fn resolve<T>(
    field: &str,
    dynamic: &ValueMap,
    object: &T,
    registry: &AccessorRegistry<T>,
) -> RuleResult<IndicatorValue> {
    if let Some(value) = dynamic.get(field) {
        return Ok(value.clone());
    }
    match registry.resolve(object, field) {
        Some(Some(value)) => Ok(value),
        _ => Err(RuleError::UnknownField {
            field: field.to_string(),
        }),
    }
}

fn compare(condition: &Condition, left: &IndicatorValue) -> RuleResult<bool> {
    let right = &condition.value;
    match condition.operator {
        Operator::Eq => Ok(left == right),
        Operator::Ne => Ok(left != right),
        op @ (Operator::Gt | Operator::Lt | Operator::Gte | Operator::Lte) => {
            let (Some(l), Some(r)) = (left.as_number(), right.as_number()) else {
                return Err(RuleError::Incomparable {
                    field: condition.field.clone(),
                    operator: op.to_string(),
                    left: left.kind().to_string(),
                    right: right.kind().to_string(),
                });
            };
            Ok(match op {
                Operator::Gt => l > r,
                Operator::Lt => l < r,
                Operator::Gte => l >= r,
                _ => l <= r,
            })
        }
    }
}

/// Rule evaluator bound to the accessor registry of one object type.
#[derive(Debug)]
pub struct RuleEvaluator<T> {
    registry: AccessorRegistry<T>,
}

impl<T> RuleEvaluator<T> {
    pub fn new(registry: AccessorRegistry<T>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &AccessorRegistry<T> {
        &self.registry
    }

    pub fn evaluate(&self, rule: &Rule, dynamic: &ValueMap, object: &T) -> RuleResult<bool> {
        evaluate(rule, dynamic, object, &self.registry)
    }

    /// Evaluate, treating any rule error as `false`.
    ///
    /// The error is logged and returned alongside so callers can count it.
    pub fn evaluate_or_false(
        &self,
        rule: &Rule,
        dynamic: &ValueMap,
        object: &T,
    ) -> (bool, Option<RuleError>) {
        match self.evaluate(rule, dynamic, object) {
            Ok(result) => (result, None),
            Err(e) => {
                warn!(error = %e, "Rule evaluation failed, treating as false");
                (false, Some(e))
            }
        }
    }
}

impl RuleEvaluator<IndicatorSnapshot> {
    /// Evaluator over snapshots: indicator values first, then snapshot fields.
    pub fn for_snapshots() -> Self {
        Self::new(snapshot_registry())
    }

    pub fn evaluate_snapshot(&self, rule: &Rule, snapshot: &IndicatorSnapshot) -> RuleResult<bool> {
        self.evaluate(rule, &snapshot.values, snapshot)
    }

    pub fn snapshot_or_false(
        &self,
        rule: &Rule,
        snapshot: &IndicatorSnapshot,
    ) -> (bool, Option<RuleError>) {
        self.evaluate_or_false(rule, &snapshot.values, snapshot)
    }
}

impl Default for RuleEvaluator<IndicatorSnapshot> {
    fn default() -> Self {
        Self::for_snapshots()
    }
}
