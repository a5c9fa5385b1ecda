// compliance-backend/src/utils/mod.rs

pub mod archive;
pub mod email;
pub mod error_helper;
pub mod jwt;
pub mod token;
pub mod transaction;
