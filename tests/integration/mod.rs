//! Integration tests

mod http_tests;
mod lifecycle_tests;
mod workflow_tests;
