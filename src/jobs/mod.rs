//! Background bulk-load jobs and their progress events.

pub mod generator;
pub mod registry;
pub mod runner;

pub use generator::{BatchGenerator, SyntheticRows};
pub use registry::{JobId, JobPublisher, JobRegistry, JobSubscription};
pub use runner::{run_bulk_load, spawn_bulk_load, BulkLoadRequest, BulkLoadSpec};
