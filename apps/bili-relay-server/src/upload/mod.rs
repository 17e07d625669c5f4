//! Chunked Upload Module (UPOS protocol)
//!
//! Relays large video uploads to the platform:
//! - Pre-upload negotiation creates a session holding the platform parameters
//! - Chunks are forwarded one by one, in any order
//! - Finalize asks the platform to assemble the object and retires the session
//!
//! Protocol Flow:
//! 1. Client sends filename and size, receives upload_id and chunk_size
//! 2. Client uploads each chunk with its md5/crc32 tokens
//! 3. Client sends whole-file tokens to complete, receives the upos:// URI
//! 4. Client submits metadata for the URI to publish the video

pub mod checksum;
pub mod session;
pub mod store;
pub mod types;

pub use checksum::{chunk_tokens, crc32_hex, FileDigest, IntegrityTokens};
pub use session::SessionManager;
pub use store::SessionStore;
pub use types::*;
