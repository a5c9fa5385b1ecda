// src/domain/mod.rs
pub mod anonymization;
pub mod compliance_audit_log_model;
pub mod consent_record_model;
pub mod contract_signer_model;
pub mod cookie_preference_model;
pub mod data_breach_model;
pub mod deletion_request_model;
pub mod digital_certificate_model;
pub mod esign_audit_event_model;
pub mod export_request_model;
pub mod finance_entry_model;
pub mod interaction_model;
pub mod lead_model;
pub mod owner_model;
pub mod renter_model;
pub mod retention_policy;
pub mod sensitive_fields;
pub mod session_model;
pub mod signature_contract_model;
pub mod user_model;
pub mod visit_model;
