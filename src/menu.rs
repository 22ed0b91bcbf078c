//! Interactive terminal menu
//!
//! A single-key, full-redraw menu over the access controller, for the
//! line-oriented front end (local terminal or a forced SSH command). The
//! menu only translates keystrokes into `status`/`grant`/`revoke` calls and
//! renders the results; all policy decisions live in the core.

use crate::audit;
use crate::config::AppConfig;
use crate::core::access::AccessController;
use crate::core::gateway::NftGateway;
use crate::core::mark;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use std::io::Write;
use std::net::IpAddr;
use std::time::Duration;

const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const CYAN: &str = "\x1b[36m";
const RST: &str = "\x1b[0m";

/// Selection keys offered for list menus, in order.
const KEYS: &str = "1234567890abcdefghijklmnopqrstuvwxyz";

/// Writes text to stdout with raw-mode line endings.
fn show(text: &str) {
    let mut stdout = std::io::stdout();
    let _ = stdout.write_all(text.replace('\n', "\r\n").as_bytes());
    let _ = stdout.flush();
}

/// Waits for the next key press. The blocking poll/read pair runs on the
/// blocking thread pool so the runtime's worker threads stay free.
async fn wait_key() -> std::io::Result<KeyCode> {
    tokio::task::spawn_blocking(|| loop {
        if event::poll(Duration::from_millis(500))?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            return Ok(key.code);
        }
    })
    .await
    .map_err(std::io::Error::other)?
}

/// Renders a numbered list and reads a choice. `None` means cancelled.
async fn pick(title: &str, items: &[String]) -> std::io::Result<Option<usize>> {
    let keys = &KEYS[..items.len().min(KEYS.len())];

    show(&format!("\n  {BOLD}{title}{RST}\n"));
    for (key, item) in keys.chars().zip(items) {
        show(&format!("    {key}. {item}\n"));
    }
    show(&format!("\n  choose [{keys}] q=back: "));

    loop {
        match wait_key().await? {
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => return Ok(None),
            KeyCode::Char(c) => {
                if let Some(index) = keys.find(c.to_ascii_lowercase()) {
                    show(&format!("{c}\n"));
                    return Ok(Some(index));
                }
            }
            _ => {}
        }
    }
}

fn render_status(status: &crate::core::access::AccessStatus) -> String {
    let Some(mark) = status.mark else {
        return format!("  current outlet: {DIM}default{RST}\n");
    };

    let labels: Vec<&str> = status
        .selections
        .iter()
        .filter_map(|s| s.as_deref())
        .collect();
    let outlet = if labels.is_empty() {
        format!("0x{mark:x}")
    } else {
        labels.join(" + ")
    };

    let remaining = match status.expires_secs {
        Some(secs) => format!("{secs}s remaining"),
        None => "permanent".to_string(),
    };

    format!("  current outlet: {CYAN}{outlet}{RST}\n  time limit: {remaining}\n")
}

/// Walks the user through one outlet pick per group plus a duration, then
/// applies the grant. Returns the flash message to display.
async fn open_flow(
    policy: &AppConfig,
    controller: &AccessController<'_>,
    ip: IpAddr,
) -> std::io::Result<String> {
    let mut selections: Vec<(String, String)> = Vec::with_capacity(policy.outlet_groups.len());

    for group in &policy.outlet_groups {
        let names: Vec<String> = group.outlets.iter().map(|(n, _)| n.clone()).collect();
        let Some(index) = pick(&group.title, &names).await? else {
            return Ok("cancelled".to_string());
        };
        selections.push((group.title.clone(), names[index].clone()));
    }

    let duration_labels: Vec<String> = policy
        .time_limits
        .iter()
        .map(|&h| mark::duration_label(h))
        .collect();
    let Some(index) = pick("time limit", &duration_labels).await? else {
        return Ok("cancelled".to_string());
    };
    let hours = policy.time_limits[index];

    match controller.grant(ip, &selections, hours).await {
        Ok(outcome) => {
            audit::log_grant(ip, outcome.mark, hours, &outcome.label, outcome.ok).await;
            if outcome.ok {
                Ok(format!("network opened: {}", outcome.label))
            } else {
                Ok("failed to open network".to_string())
            }
        }
        Err(e) => Ok(format!("rejected: {e}")),
    }
}

/// Runs the menu loop for one client IP until the user quits.
///
/// Raw mode is always restored on exit, including error paths. Gateway
/// calls are awaited, never blocking the terminal loop thread pool.
pub async fn run(policy: &AppConfig, gateway: &NftGateway, ip: IpAddr) -> std::io::Result<()> {
    let controller = AccessController::new(policy, gateway);

    crossterm::terminal::enable_raw_mode()?;

    let result = async {
        let mut flash = String::new();

        loop {
            let status = controller.status(ip).await;

            show("\x1b[2J\x1b[H\n");
            show(&format!("  {BOLD}wlt - network egress portal{RST}\n\n"));
            show(&format!("  client: {ip}\n"));
            show(&render_status(&status));
            if !flash.is_empty() {
                show(&format!("\n  {CYAN}{flash}{RST}\n"));
                flash.clear();
            }
            show(&format!(
                "\n  {DIM}o=open  c=close  r=refresh  q=quit{RST}\n  > "
            ));

            match wait_key().await? {
                KeyCode::Char('o') | KeyCode::Char('O') => {
                    flash = open_flow(policy, &controller, ip).await?;
                }
                KeyCode::Char('c') | KeyCode::Char('C') => {
                    let ok = controller.revoke(ip).await;
                    audit::log_revoke(ip, ok).await;
                    flash = if ok {
                        "network reset".to_string()
                    } else {
                        "failed to reset network".to_string()
                    };
                }
                KeyCode::Char('r') | KeyCode::Char('R') => {}
                KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => break,
                _ => {}
            }
        }

        show("\n");
        Ok(())
    }
    .await;

    let _ = crossterm::terminal::disable_raw_mode();
    result
}
