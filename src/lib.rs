pub mod cli;
pub mod commands;
pub mod core;
pub mod platforms;
pub mod storage;
pub mod surface;

pub use streamcatch_core::{fs_paths, models, resolver};

pub use cli::run;
