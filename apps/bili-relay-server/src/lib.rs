//! Bili Relay Server Library
//!
//! A relay for the bilibili UPOS chunked upload protocol. Clients negotiate a
//! session, push chunks and finalize through this service; the relay keeps
//! the platform parameters in an in-memory session table and forwards every
//! step with the platform credentials attached.
//!
//! # Modules
//!
//! - `upload`: Session store, session manager and integrity tokens
//! - `remote`: Platform client trait and its HTTP implementation
//! - `publish`: One-click pipeline from a local file to a published video
//! - `transcode`: ffmpeg presets for pre-upload re-encoding
//! - `routes`: HTTP gateway

pub mod config;
pub mod error;
pub mod publish;
pub mod remote;
pub mod routes;
pub mod state;
pub mod transcode;
pub mod upload;

#[cfg(test)]
pub(crate) mod test_support;
