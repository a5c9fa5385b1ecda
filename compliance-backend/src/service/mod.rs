// compliance-backend/src/service/mod.rs
pub mod certificate_service;
pub mod compliance_audit_service;
pub mod consent_service;
pub mod deletion_service;
pub mod dpo_service;
pub mod esign_audit_service;
pub mod export_service;
pub mod job_runner;
pub mod storage_service;
pub mod webhook_service;
