pub mod config;
pub mod generate;
pub mod job;
pub mod jobs;
pub mod pool;
