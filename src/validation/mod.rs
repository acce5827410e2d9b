//! Response validation: judge prompts, concurrent judge calls, and
//! normalization of judge output.

pub mod dispatcher;
pub mod parser;
pub mod prompt;
pub mod types;

pub use dispatcher::{ProgressFn, ResponseValidator};
pub use parser::parse_judge_response;
pub use prompt::build_evaluation_prompt;
pub use types::{
    CriterionScore, ProgressPhase, ValidationOutcome, ValidationProgress, ValidationResult,
    ValidationSet, criterion_columns,
};
