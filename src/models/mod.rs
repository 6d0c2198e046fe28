pub mod config;
pub mod embedding;
pub mod mapping;
pub mod session;
