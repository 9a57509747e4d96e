// Engine: asset planning, conditional downloads, gradients, and the sweep.

pub mod collector;
pub mod downloader;
pub mod gradient;
pub mod planner;
pub mod remap;
pub mod session;
pub mod stats;
pub mod storage;
