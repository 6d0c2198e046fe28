pub mod embedding;
pub mod mapping;
pub mod page;
pub mod session;
