pub mod coordinator;
pub mod error;
pub mod health;
pub mod integrity;
pub mod metadata;
pub mod node;
pub mod placement;
pub mod registry;
pub mod result;
pub mod routes;
pub mod state;
pub mod stats;
