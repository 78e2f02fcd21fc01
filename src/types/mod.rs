//! Public types for the Heimdall API.

mod model;
mod options;
mod request;
mod response;
mod safety;
mod task;

pub use model::{ModelKind, ModelRef, TokenCost};
pub use options::{RetryOverride, RouteOptions};
pub use request::Request;
pub use response::{Failure, Output, Response, Usage};
pub use safety::{SafetyStage, SafetyVerdict};
pub use task::Task;
