//! Cross-module tests for the generation pass.

mod registry_tests;
