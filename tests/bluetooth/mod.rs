//! Bluetooth test modules
//!
//! `mocks` provides the recording fake radio shared by the other modules.

pub mod mocks;

pub mod session_tests;
