//! Tests for the executor
//!
//! Organized by feature area

mod background_tests;
mod call_tests;
mod error_tests;
mod helpers;
mod if_tests;
