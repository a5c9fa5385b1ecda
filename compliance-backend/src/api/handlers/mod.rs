// compliance-backend/src/api/handlers/mod.rs
pub mod admin_compliance_handler;
pub mod compliance_handler;
pub mod system_handler;
pub mod webhook_handler;
