// tests/integration/mod.rs

mod admin_tests;
mod consent_tests;
mod deletion_tests;
mod export_tests;
mod webhook_tests;
