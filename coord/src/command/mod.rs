pub mod common;
pub mod serve;
pub mod stats;
pub mod verify;
