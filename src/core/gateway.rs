//! nftables map gateway
//!
//! Owns the single externally-defined map (family/table/name) and issues
//! dump, insert and delete operations against it through the `nft` binary.
//! Every failure of the external command interface is caught here, logged,
//! and converted to an absence/failure result: a down or misbehaving
//! nftables must degrade the portal to "no access" / "operation failed",
//! never crash it.
//!
//! # Dump format
//!
//! `nft --json list map` yields elements as `(key, mark)` pairs in two
//! shapes, handled uniformly:
//!
//! - permanent: `["10.0.0.5", 2]`
//! - timed: `[{"elem": {"val": "10.0.0.5", "expires": 14310, ...}}, 2]`
//!
//! The mark may arrive as a JSON integer or as a string (`"0x2"` or `"2"`);
//! both are normalized to `u32`.

use crate::config::MapConfig;
use crate::core::error::{Error, Result};
use serde_json::Value;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, warn};

/// One firewall-map element currently bound to a source IP.
///
/// Exists only as a transient read of external state; never cached past a
/// single query. `expires_secs: None` means the element was installed
/// without a timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapEntry {
    pub mark: u32,
    pub expires_secs: Option<u64>,
}

/// Synchronizes desired access state with the live nftables map.
pub struct NftGateway {
    map: MapConfig,
    command_timeout: Duration,
}

impl NftGateway {
    pub fn new(map: MapConfig, command_timeout: Duration) -> Self {
        Self {
            map,
            command_timeout,
        }
    }

    /// Runs one nft invocation, bounded by the configured timeout.
    async fn run_nft(&self, args: &[&str]) -> Result<std::process::Output> {
        debug!(?args, "running nft");

        let mut cmd = crate::elevation::nft_command(args).map_err(|e| Error::CommandFailed {
            message: format!("cannot build nft command: {e}"),
            stderr: None,
            exit_code: None,
        })?;
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());

        let output = tokio::time::timeout(self.command_timeout, cmd.output())
            .await
            .map_err(|_| Error::CommandFailed {
                message: format!("nft timed out after {}s", self.command_timeout.as_secs()),
                stderr: None,
                exit_code: None,
            })??;

        Ok(output)
    }

    async fn dump(&self) -> Result<Value> {
        let output = self
            .run_nft(&[
                "--json",
                "list",
                "map",
                &self.map.family,
                &self.map.table,
                &self.map.map,
            ])
            .await?;

        if !output.status.success() {
            return Err(Error::CommandFailed {
                message: "nft list map exited with an error".to_string(),
                stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
                exit_code: output.status.code(),
            });
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }

    /// Queries the current map element for `ip`.
    ///
    /// No element, an empty map, and an exec/parse failure are the same
    /// observable outcome: `None`. Failures are additionally logged here as
    /// diagnostics but never surfaced as errors on this read path.
    pub async fn query_entry(&self, ip: IpAddr) -> Option<MapEntry> {
        let dump = match self.dump().await {
            Ok(dump) => dump,
            Err(e) => {
                warn!(%ip, error = %e, "failed to dump nftables map");
                return None;
            }
        };

        match find_entry(&dump, ip) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(%ip, error = %e, "failed to parse nftables dump");
                None
            }
        }
    }

    /// Deletes the map element for `ip`.
    ///
    /// Deleting something already absent is not an error: when no element
    /// exists this returns `true` without issuing a delete.
    pub async fn delete_entry(&self, ip: IpAddr) -> bool {
        if self.query_entry(ip).await.is_none() {
            return true;
        }

        let ip_str = ip.to_string();
        let result = self
            .run_nft(&[
                "delete",
                "element",
                &self.map.family,
                &self.map.table,
                &self.map.map,
                "{",
                &ip_str,
                "}",
            ])
            .await;

        match result {
            Ok(output) if output.status.success() => true,
            Ok(output) => {
                warn!(
                    %ip,
                    stderr = %String::from_utf8_lossy(&output.stderr),
                    "nft delete element failed"
                );
                false
            }
            Err(e) => {
                warn!(%ip, error = %e, "nft delete element failed");
                false
            }
        }
    }

    /// Inserts a map element binding `ip` to `mark`.
    ///
    /// `hours > 0` attaches an expiry; `0` installs a permanent element.
    /// This does not delete a pre-existing element first - the store
    /// rejects duplicate keys, and replacement is the caller's
    /// responsibility.
    pub async fn insert_entry(&self, ip: IpAddr, mark: u32, hours: u32) -> bool {
        let ip_str = ip.to_string();
        let mark_str = format!("0x{mark:x}");
        let timeout_str = format!("{hours}h");

        let mut args = vec![
            "add",
            "element",
            self.map.family.as_str(),
            self.map.table.as_str(),
            self.map.map.as_str(),
            "{",
            ip_str.as_str(),
        ];
        if hours > 0 {
            args.extend(["timeout", timeout_str.as_str()]);
        }
        args.extend([":", mark_str.as_str(), "}"]);

        match self.run_nft(&args).await {
            Ok(output) if output.status.success() => true,
            Ok(output) => {
                warn!(
                    %ip,
                    mark = %mark_str,
                    stderr = %String::from_utf8_lossy(&output.stderr),
                    "nft add element failed"
                );
                false
            }
            Err(e) => {
                warn!(%ip, mark = %mark_str, error = %e, "nft add element failed");
                false
            }
        }
    }
}

/// Scans a parsed dump for the element keyed by `ip`.
///
/// Walks every `map` object in the `nftables` array rather than assuming a
/// fixed position, preserving the element-level contract regardless of how
/// much metainfo nft prepends.
///
/// # Errors
///
/// Returns `Error::MalformedDump` when the dump lacks the `nftables` array
/// or a matching element carries an unreadable mark.
fn find_entry(dump: &Value, ip: IpAddr) -> Result<Option<MapEntry>> {
    let objects = dump
        .get("nftables")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::MalformedDump("missing nftables array".to_string()))?;

    let ip_str = ip.to_string();

    for object in objects {
        let Some(elements) = object
            .get("map")
            .and_then(|m| m.get("elem"))
            .and_then(Value::as_array)
        else {
            continue;
        };

        for element in elements {
            let Some(pair) = element.as_array() else {
                continue;
            };
            let (Some(key), Some(mark_value)) = (pair.first(), pair.get(1)) else {
                continue;
            };

            // Timed elements wrap the key: {"elem": {"val": IP, "expires": SECS}}
            let (element_ip, expires_secs) = if let Some(inner) = key.get("elem") {
                (
                    inner.get("val").and_then(Value::as_str),
                    inner.get("expires").and_then(Value::as_u64),
                )
            } else {
                (key.as_str(), None)
            };

            if element_ip == Some(ip_str.as_str()) {
                return Ok(Some(MapEntry {
                    mark: parse_mark(mark_value)?,
                    expires_secs,
                }));
            }
        }
    }

    Ok(None)
}

/// Normalizes a dump mark value to `u32`; accepts a native integer or a
/// hexadecimal/decimal string.
fn parse_mark(value: &Value) -> Result<u32> {
    if let Some(n) = value.as_u64() {
        return u32::try_from(n)
            .map_err(|_| Error::MalformedDump(format!("mark {n} exceeds u32")));
    }

    if let Some(s) = value.as_str() {
        let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            u32::from_str_radix(hex, 16)
        } else {
            s.parse::<u32>()
        };
        return parsed.map_err(|_| Error::MalformedDump(format!("unparseable mark '{s}'")));
    }

    Err(Error::MalformedDump(format!(
        "mark is neither integer nor string: {value}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn dump_with(elements: Value) -> Value {
        json!({
            "nftables": [
                { "metainfo": { "version": "1.0.9", "json_schema_version": 1 } },
                { "map": {
                    "family": "inet", "name": "src2mark", "table": "wlt",
                    "type": "ipv4_addr", "map": "mark",
                    "elem": elements
                } }
            ]
        })
    }

    #[test]
    fn test_find_permanent_entry() {
        let dump = dump_with(json!([["10.0.0.5", 2]]));
        let entry = find_entry(&dump, ip("10.0.0.5")).unwrap().unwrap();
        assert_eq!(entry.mark, 2);
        assert_eq!(entry.expires_secs, None);
    }

    #[test]
    fn test_find_timed_entry() {
        let dump = dump_with(json!([
            [{ "elem": { "val": "10.0.0.5", "timeout": 14400, "expires": 14310 } }, 2]
        ]));
        let entry = find_entry(&dump, ip("10.0.0.5")).unwrap().unwrap();
        assert_eq!(entry.mark, 2);
        assert_eq!(entry.expires_secs, Some(14310));
    }

    #[test]
    fn test_find_entry_hex_string_mark() {
        let dump = dump_with(json!([["10.0.0.5", "0x2"]]));
        let entry = find_entry(&dump, ip("10.0.0.5")).unwrap().unwrap();
        assert_eq!(entry.mark, 2);
    }

    #[test]
    fn test_find_entry_no_match() {
        let dump = dump_with(json!([["10.0.0.5", 2]]));
        assert_eq!(find_entry(&dump, ip("10.0.0.6")).unwrap(), None);
    }

    #[test]
    fn test_find_entry_empty_map() {
        // An empty map omits "elem" entirely
        let dump = json!({
            "nftables": [
                { "metainfo": {} },
                { "map": { "family": "inet", "name": "src2mark", "table": "wlt" } }
            ]
        });
        assert_eq!(find_entry(&dump, ip("10.0.0.5")).unwrap(), None);
    }

    #[test]
    fn test_find_entry_missing_nftables_array() {
        let dump = json!({ "something_else": [] });
        assert!(matches!(
            find_entry(&dump, ip("10.0.0.5")),
            Err(Error::MalformedDump(_))
        ));
    }

    #[test]
    fn test_find_entry_skips_other_ips_and_shapes() {
        let dump = dump_with(json!([
            ["10.0.0.4", 1],
            [{ "elem": { "val": "10.0.0.5", "expires": 60 } }, "0x3"],
        ]));
        let entry = find_entry(&dump, ip("10.0.0.5")).unwrap().unwrap();
        assert_eq!(entry.mark, 3);
        assert_eq!(entry.expires_secs, Some(60));
    }

    #[test]
    fn test_parse_mark_variants() {
        assert_eq!(parse_mark(&json!(9)).unwrap(), 9);
        assert_eq!(parse_mark(&json!("0x9")).unwrap(), 9);
        assert_eq!(parse_mark(&json!("0X1f")).unwrap(), 31);
        assert_eq!(parse_mark(&json!("42")).unwrap(), 42);
        assert!(parse_mark(&json!("zz")).is_err());
        assert!(parse_mark(&json!(null)).is_err());
        assert!(parse_mark(&json!(0x1_0000_0000u64)).is_err());
    }
}
