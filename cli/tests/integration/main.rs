//! Integration tests for the devbox CLI
//!
//! These tests spawn the actual binary and test end-to-end behavior.
//! They never reach a cloud provider.

mod config_command;
