// src/repository/mod.rs
pub mod compliance_audit_log_repository;
pub mod consent_repository;
pub mod crm_repository;
pub mod data_breach_repository;
pub mod deletion_request_repository;
pub mod esign_repository;
pub mod export_request_repository;
pub mod user_repository;
