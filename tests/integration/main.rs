//! Integration tests for Harrow

mod harvest_tests;
