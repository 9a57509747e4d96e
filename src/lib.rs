pub mod api;
pub mod config;
pub mod detect;
pub mod engine;
pub mod error;
pub mod manifest;
pub mod source;
