//! Privilege elevation for nft invocations
//!
//! The portal usually runs as an unprivileged user and only needs root for
//! the nft calls themselves. Command construction follows this order:
//!
//! - **Preferred**: `run0` when available (systemd v256+, no SUID)
//! - **CLI fallback**: `sudo` for terminal environments
//! - **Otherwise**: `pkexec`
//!
//! # Environment Variables
//!
//! - `WLT_ELEVATION_METHOD`: force a specific method (`sudo`, `run0`, or
//!   `pkexec`). Useful for scripts with sudoers NOPASSWD rules.
//! - `WLT_TEST_NO_ELEVATION`: run nft directly without elevation.
//! - `WLT_NFT_COMMAND`: substitute the nft binary entirely (used by the
//!   integration tests to point at a mock).
//!
//! Arguments are passed without shell interpretation, so nothing here is
//! subject to injection; callers validate inputs before building a command.

use std::io;
use std::str::FromStr;
use tokio::process::Command;

/// Error type for privilege elevation operations
#[derive(Debug, thiserror::Error)]
pub enum ElevationError {
    /// pkexec binary not found in PATH
    #[error("pkexec not found - please install PolicyKit")]
    PkexecNotFound,

    /// Requested elevation method is not available (binary not found)
    #[error("elevation method '{0}' is not available (binary not found)")]
    MethodNotAvailable(ElevationMethod),

    /// Invalid value for `WLT_ELEVATION_METHOD`
    #[error("invalid WLT_ELEVATION_METHOD '{0}'. Valid options: sudo, run0, pkexec")]
    InvalidMethod(String),

    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Supported elevation helpers
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ElevationMethod {
    Sudo,
    Run0,
    Pkexec,
}

impl ElevationMethod {
    const fn binary(self) -> &'static str {
        match self {
            ElevationMethod::Sudo => "sudo",
            ElevationMethod::Run0 => "run0",
            ElevationMethod::Pkexec => "pkexec",
        }
    }
}

/// Checks if a binary exists in PATH
fn binary_exists(name: &str) -> bool {
    std::env::var_os("PATH")
        .and_then(|paths| {
            std::env::split_paths(&paths).find_map(|dir| {
                let full_path = dir.join(name);
                if full_path.is_file() {
                    Some(full_path)
                } else {
                    None
                }
            })
        })
        .is_some()
}

fn wrapped_command(method: ElevationMethod, args: &[&str]) -> Result<Command, ElevationError> {
    if !binary_exists(method.binary()) {
        return Err(ElevationError::MethodNotAvailable(method));
    }
    let mut cmd = Command::new(method.binary());
    cmd.arg("nft").args(args);
    Ok(cmd)
}

/// Builds an nft command, elevated when necessary.
///
/// # Errors
///
/// Returns `Err` if a forced elevation method is invalid or unavailable, or
/// if no usable helper can be found for a non-interactive environment.
pub fn nft_command(args: &[&str]) -> Result<Command, ElevationError> {
    use std::os::fd::AsFd;

    // 1. Binary override (mock nft in tests)
    if let Some(program) = std::env::var_os("WLT_NFT_COMMAND") {
        let mut cmd = Command::new(program);
        cmd.args(args);
        return Ok(cmd);
    }

    // 2. Test mode: no elevation wrapper at all
    if std::env::var("WLT_TEST_NO_ELEVATION").is_ok() {
        let mut cmd = Command::new("nft");
        cmd.args(args);
        return Ok(cmd);
    }

    // 3. Direct root execution, no prompt needed
    if nix::unistd::getuid().is_root() {
        let mut cmd = Command::new("nft");
        cmd.args(args);
        return Ok(cmd);
    }

    // 4. Explicit method override
    if let Ok(method) = std::env::var("WLT_ELEVATION_METHOD") {
        let method = method.to_lowercase();
        if !method.is_empty() {
            let parsed = ElevationMethod::from_str(&method)
                .map_err(|_| ElevationError::InvalidMethod(method))?;
            return wrapped_command(parsed, args);
        }
    }

    // 5. Automatic detection - prefer run0, fall back on environment
    if binary_exists("run0") {
        return wrapped_command(ElevationMethod::Run0, args);
    }

    let is_atty = nix::unistd::isatty(std::io::stdin().as_fd()).unwrap_or(false);
    if is_atty {
        wrapped_command(ElevationMethod::Sudo, args)
    } else {
        if !binary_exists("pkexec") {
            return Err(ElevationError::PkexecNotFound);
        }
        wrapped_command(ElevationMethod::Pkexec, args)
    }
}
