pub mod fault_injection;
pub mod health;
pub mod replicate;
pub mod routes;
pub mod state;
pub mod store;
