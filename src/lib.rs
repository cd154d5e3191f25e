//! Headless CMS client library
//!
//! A caching client for the Storyblok content delivery API. Stories are fetched
//! through a pluggable [`transport::Transport`] and cached in a pluggable
//! [`cache::Cache`]; see [`client::CmsClient`] for the fetch operations.

pub mod cache;
pub mod cli;
pub mod client;
pub mod content;
pub mod transport;

pub use client::{ClientError, CmsClient, CmsClientBuilder, KeyPrefix};
