//! Two-way SQL template evaluation
//!
//! Walks a parsed [`twoway_template::Template`] against a read-only
//! [`EvaluationContext`] and produces executable SQL plus the ordered bind
//! parameters for its placeholders. The tree is never mutated, so one parsed
//! template serves any number of concurrent evaluations.

pub mod context;
pub mod error;
pub mod value;
pub mod evaluator;

pub use context::{EvaluationContext, Scope, TemplateContext, TemplateContextBuilder};
pub use error::{EvaluationError, EvaluationErrorKind};
pub use evaluator::{
    BindParameter, EvaluatedSql, EvaluationOptions, Evaluator, OutOfBandParameter, SqlBuffer,
};
