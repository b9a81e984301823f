//! Client-side entity access: a persisted TTL cache in front of a remote
//! CMS, with deduplication of concurrent loads.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
