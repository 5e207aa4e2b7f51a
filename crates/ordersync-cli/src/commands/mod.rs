pub mod common;
pub mod completions;
pub mod resolutions;
pub mod show;
pub mod stats;
pub mod sync;
