//! Access controller
//!
//! Orchestrates the gateway and the mark codec to answer "what is this IP's
//! current access?" and to apply or revoke a grant. Stateless between
//! requests: no cache, no locks, nothing shared beyond the immutable policy.
//! Concurrent requests for the same IP are not serialized - the last nft
//! command to land wins, which the replace semantics make acceptable.

use crate::config::AppConfig;
use crate::core::error::{Error, Result};
use crate::core::gateway::NftGateway;
use crate::core::mark;
use std::net::IpAddr;
use tracing::info;

/// Current access state for one IP, as read from the live map.
#[derive(Debug, Clone)]
pub struct AccessStatus {
    /// Raw mark, when an element exists.
    pub mark: Option<u32>,
    /// Decoded selection per configured group, in group order. `None` for a
    /// group means the mark carries no labeled selection there; callers
    /// render it as "unlabeled", never treat it as an error.
    pub selections: Vec<Option<String>>,
    /// Seconds until the element expires; `None` for permanent elements or
    /// when no element exists.
    pub expires_secs: Option<u64>,
}

impl AccessStatus {
    fn absent(group_count: usize) -> Self {
        Self {
            mark: None,
            selections: vec![None; group_count],
            expires_secs: None,
        }
    }
}

/// Result of a grant attempt that passed validation.
#[derive(Debug, Clone)]
pub struct GrantOutcome {
    pub ok: bool,
    /// The mark that was written (or attempted).
    pub mark: u32,
    /// Human-readable summary, e.g. `"international (4 hours)"`.
    pub label: String,
}

/// Stateless orchestrator over the policy and the gateway.
pub struct AccessController<'a> {
    policy: &'a AppConfig,
    gateway: &'a NftGateway,
}

impl<'a> AccessController<'a> {
    pub fn new(policy: &'a AppConfig, gateway: &'a NftGateway) -> Self {
        Self { policy, gateway }
    }

    /// Reads and decodes the current access state for `ip`.
    pub async fn status(&self, ip: IpAddr) -> AccessStatus {
        let Some(entry) = self.gateway.query_entry(ip).await else {
            return AccessStatus::absent(self.policy.outlet_groups.len());
        };

        let selections = self
            .policy
            .outlet_groups
            .iter()
            .map(|group| mark::group_selection(entry.mark, group).map(str::to_string))
            .collect();

        AccessStatus {
            mark: Some(entry.mark),
            selections,
            expires_secs: entry.expires_secs,
        }
    }

    /// Grants `ip` the selected outlets for `hours` (0 = permanent).
    ///
    /// `selections` maps group titles to outlet names. Validation happens
    /// before any nft command, so a rejected request leaves the map
    /// untouched. The grant itself is a delete-then-insert replace: the
    /// store rejects duplicate keys and cannot update an element across
    /// timeout classes in place. A failed delete does not block the insert
    /// attempt - a stale element surfaces as an insert failure instead.
    ///
    /// # Errors
    ///
    /// Returns `MissingSelection`, `InvalidSelection` or `InvalidDuration`
    /// when the request does not match the configured policy.
    pub async fn grant(
        &self,
        ip: IpAddr,
        selections: &[(String, String)],
        hours: u32,
    ) -> Result<GrantOutcome> {
        let mut names: Vec<&str> = Vec::with_capacity(self.policy.outlet_groups.len());
        for group in &self.policy.outlet_groups {
            let name = selections
                .iter()
                .find(|(title, _)| *title == group.title)
                .map(|(_, name)| name.as_str())
                .ok_or_else(|| Error::MissingSelection {
                    group: group.title.clone(),
                })?;
            names.push(name);
        }

        if !self.policy.time_limits.contains(&hours) {
            return Err(Error::InvalidDuration(hours));
        }

        let mark = mark::encode_selections(&self.policy.outlet_groups, &names)?;

        // Replace semantics: best-effort delete, then insert. The delete
        // outcome is logged by the gateway; a failure here is deliberately
        // not fatal.
        self.gateway.delete_entry(ip).await;
        let ok = self.gateway.insert_entry(ip, mark, hours).await;

        let label = format!(
            "{} ({})",
            names.join(" + "),
            mark::duration_label(hours)
        );

        if ok {
            info!(%ip, mark = format!("0x{mark:x}"), %label, "access granted");
        }

        Ok(GrantOutcome { ok, mark, label })
    }

    /// Revokes any access element for `ip`. Idempotent: revoking an IP with
    /// no element succeeds.
    pub async fn revoke(&self, ip: IpAddr) -> bool {
        let ok = self.gateway.delete_entry(ip).await;
        if ok {
            info!(%ip, "access revoked");
        }
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MapConfig, OutletGroup};
    use std::time::Duration;

    fn test_policy() -> AppConfig {
        AppConfig {
            nftables: MapConfig::default(),
            outlet_groups: vec![OutletGroup {
                title: "exit".to_string(),
                mask: 0xF,
                outlets: vec![
                    ("domestic".to_string(), 1),
                    ("international".to_string(), 2),
                ],
            }],
            time_limits: vec![1, 4, 0],
            command_timeout_secs: 1,
        }
    }

    fn sel(group: &str, outlet: &str) -> Vec<(String, String)> {
        vec![(group.to_string(), outlet.to_string())]
    }

    // Validation failures must return before any nft command is attempted,
    // so these tests run against a gateway that is never exercised.
    #[tokio::test]
    async fn test_grant_rejects_unknown_duration() {
        let policy = test_policy();
        let gateway = NftGateway::new(policy.nftables.clone(), Duration::from_secs(1));
        let controller = AccessController::new(&policy, &gateway);

        let err = controller
            .grant("10.0.0.5".parse().unwrap(), &sel("exit", "domestic"), 99)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidDuration(99)));
    }

    #[tokio::test]
    async fn test_grant_rejects_missing_group() {
        let policy = test_policy();
        let gateway = NftGateway::new(policy.nftables.clone(), Duration::from_secs(1));
        let controller = AccessController::new(&policy, &gateway);

        let err = controller
            .grant("10.0.0.5".parse().unwrap(), &[], 4)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingSelection { .. }));
    }

    #[tokio::test]
    async fn test_grant_rejects_unknown_outlet() {
        let policy = test_policy();
        let gateway = NftGateway::new(policy.nftables.clone(), Duration::from_secs(1));
        let controller = AccessController::new(&policy, &gateway);

        let err = controller
            .grant("10.0.0.5".parse().unwrap(), &sel("exit", "mars"), 4)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSelection { .. }));
    }
}
