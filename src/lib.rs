//! wlt - network egress portal
//!
//! Grants or revokes a client IP's egress route by managing entries in an
//! nftables map keyed by source IP. The map value is a mark whose bits
//! select an outlet per configured policy group; the kernel's routing policy
//! consumes the mark, and nftables itself enforces entry expiry.
//!
//! # Architecture
//!
//! - [`core`] - mark codec, nftables gateway and access controller
//! - [`config`] - typed configuration with fail-fast validation
//! - [`elevation`] - run0/sudo/pkexec selection for nft invocations
//! - [`audit`] - JSON-lines audit trail of grant/revoke operations
//! - [`menu`] - interactive terminal front end
//!
//! # Failure model
//!
//! nftables being down or unparseable degrades the portal ("no access",
//! "operation failed") and never crashes it; only validation errors against
//! caller input surface as rejected requests.

// Allow pedantic clippy warnings that are not worth fixing for this codebase
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::uninlined_format_args)]

pub mod audit;
pub mod config;
pub mod core;
pub mod elevation;
pub mod menu;

// Re-export commonly used types
pub use config::{AppConfig, MapConfig, OutletGroup};
pub use core::access::{AccessController, AccessStatus, GrantOutcome};
pub use core::error::{Error, Result};
pub use core::gateway::{MapEntry, NftGateway};
