pub mod harness_tests;
pub mod mocks;
