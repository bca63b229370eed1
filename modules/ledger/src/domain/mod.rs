pub mod audit;
pub mod error;
pub mod models;
pub mod service;
