// Manifest handling: fetch, pre-parse filtering, the node arena, component resolution.

pub mod document;
pub mod fetcher;
pub mod filter;
pub mod resolver;
