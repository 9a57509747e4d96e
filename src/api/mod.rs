pub mod logging;
pub mod sync_api;
