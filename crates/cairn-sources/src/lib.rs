//! # cairn-sources
//!
//! Source adapters for the Cairn bundle registry:
//! - [`SourceAdapter`] trait with one implementation per source type
//! - [`AuthChain`] credential fallback for git-hosting platforms
//! - HTTP helpers that map status codes and refuse HTML error pages
//! - Time-bounded memoization of catalog fetches

pub mod adapters;
pub mod archive;
pub mod auth;
pub mod cache;
pub mod error;
pub mod http;
pub mod repo;

pub use adapters::{AdapterContext, AdapterFactory, DefaultAdapterFactory, SourceAdapter};
pub use auth::{AuthChain, AuthMethod, EnvSession, Platform, SessionProvider, TokenProvider};
pub use error::{Result, SourceError};
pub use http::HttpClient;
