//! spsync Core - Domain logic and port definitions
//!
//! This crate contains the hexagonal architecture core with:
//! - **Configuration** - `Config` loaded from YAML and CLI overrides
//! - **Domain types** - `Fingerprint`, `LocalFile`, `RemoteSnapshot`, `SyncStatistics`
//! - **Port definitions** - Traits for adapters: `IRemoteLibrary`, `IMarkdownConverter`
//!
//! # Architecture
//!
//! The domain module contains pure logic with no network access.
//! Ports define trait interfaces that adapter crates implement; the sync
//! engine only talks to SharePoint through them.

pub mod config;
pub mod domain;
pub mod ports;
