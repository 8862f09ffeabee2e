//! Condition evaluation for the decision engine.
//!
//! Rules are ordered lists of `{field, operator, value}` conditions joined by
//! AND/OR. Fields resolve from a dynamic value map first and then from an
//! explicit accessor registry of the evaluated object type.

pub mod accessor;
pub mod error;
pub mod evaluator;
pub mod rule;

pub use accessor::{snapshot_registry, Accessor, AccessorRegistry};
pub use error::{RuleError, RuleResult};
pub use evaluator::{evaluate, evaluate_condition, RuleEvaluator, ValueMap};
pub use rule::{Combinator, Condition, Operator, Rule};
