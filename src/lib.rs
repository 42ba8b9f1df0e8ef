// Infrastructure layer (shared components)
pub mod config;
pub mod error;
pub mod telemetry;

// Domain layer (business logic)
pub mod client;
pub mod registry;
pub mod report;

// Supporting modules
pub mod tasks;
