pub mod aggregate;
pub mod config;
pub mod error;
pub mod handler;
pub mod store;
pub mod table;
pub mod trigger;

pub use error::{Error, Result, SchemaError};
pub use handler::{handle_event, process, run_pipeline, Response, StepOptions};
pub use trigger::TriggerDescriptor;
