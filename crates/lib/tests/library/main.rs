//! Integration tests for buildstack-lib.

mod build_tests;
