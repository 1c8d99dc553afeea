//! The request pipeline: execution, classification, and batch dispatch

pub mod dispatch;
pub mod executor;
pub mod request;

pub use dispatch::{BatchDispatcher, BatchResult, RequestOutcome, DEFAULT_BATCH_CONCURRENCY};
pub use executor::RequestExecutor;
pub use request::{ApiRequest, ApiResponse};
