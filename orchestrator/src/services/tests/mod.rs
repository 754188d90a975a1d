//! Service-specific tests
//!
//! Each service has its own test file with dedicated fixtures.
