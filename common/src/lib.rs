pub mod api_error;
pub mod checksum;
pub mod constants;
pub mod file_utils;
pub mod node_api;
pub mod node_client;
pub mod schemas;
pub mod telemetry;
pub mod time_utils;
pub mod trace_middleware;
pub mod url_utils;
