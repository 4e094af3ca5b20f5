pub mod config;
pub mod run_tree;
pub mod shared;
