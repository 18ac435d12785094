//! Core types shared by every cadence crate.
//!
//! - `Command`: a queued, parameterized call awaiting paced execution
//! - `ApiClient`: the opaque remote-service capability actions talk to
//! - `BoxFuture`: dyn-compatible return type for async trait methods

pub mod api;
pub mod command;
pub mod error;

pub use api::{
    ApiClient, ApiResponse, BoxFuture, DynApiClient, MockApiClient, RecordedCall,
    SendOptions,
};
pub use command::Command;
pub use error::{CoreError, CoreResult};
