pub mod config;
pub mod coordinator;
pub mod engine;
pub mod geometry;
pub mod note;
pub mod reverb;
pub mod sampler;
pub mod simulator;
pub mod types;
