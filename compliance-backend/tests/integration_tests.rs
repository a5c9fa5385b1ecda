// tests/integration_tests.rs
mod common;
mod integration;
