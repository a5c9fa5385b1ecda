// compliance-backend/src/config.rs

pub mod app;

pub use app::{AppConfig, ComplianceConfig, SecurityConfig, ServerConfig};
