pub mod config;
pub mod summary;
pub mod topology_file;
