//! Core access-control functionality
//!
//! This module contains the types and logic that translate between user
//! requests and the live nftables map:
//!
//! - [`mark`]: pure mark encoding/decoding against the configured outlet groups
//! - [`gateway`]: nftables map dump/insert/delete via the nft binary
//! - [`access`]: status/grant/revoke orchestration over the two above
//! - [`error`]: error taxonomy for all of it

pub mod access;
pub mod error;
pub mod gateway;
pub mod mark;
