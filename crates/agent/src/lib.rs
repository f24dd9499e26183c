//! The quiz-solving agent loop.
//!
//! One run walks a chain of quiz pages:
//!
//! 1. **Decide**: the oracle sees the whole conversation and the tool catalogue
//! 2. **Invoke**: each requested tool runs in order; results (or errors) are appended
//! 3. **Evaluate**: a graded submission either seeds the next URL, finishes the
//!    chain, allows a retry, or fails the run
//!
//! The loop ends on the `END` reply, a `stop` call, a finished chain, an oracle
//! failure, or the step ceiling.

pub mod loop_runner;
pub mod prompt;
pub mod report;

pub use loop_runner::{LoopState, QuizAgent};
pub use prompt::system_prompt;
pub use report::{RunReport, RunStatus};
