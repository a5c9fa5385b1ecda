// compliance-backend/src/api/dto/mod.rs
pub mod admin_compliance_dto;
pub mod compliance_dto;
