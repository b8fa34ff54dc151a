//! Common test infrastructure for cairn-sources tests
//!
//! - `fixtures`: JSON/YAML payloads and archive helpers
//! - `mock_server`: wiremock setup for GitHub, GitLab and HTTP catalogs
//! - `mocks`: recording session providers

#![allow(dead_code)]
#![allow(unused_imports)]

pub mod fixtures;
pub mod mock_server;
pub mod mocks;

pub use fixtures::*;
pub use mock_server::*;
pub use mocks::*;
