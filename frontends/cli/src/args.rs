use anyhow::{anyhow, bail, Result};
use std::path::PathBuf;

pub const USAGE: &str = "\
Usage: crmsync [--db <path>] [--config <path>] <command>

Commands:
  inbound              Pull every HubSpot contact into the local store
  outbound             Push un-linked local contacts to HubSpot
  contacts [--unlinked]  List local contacts
  jobs [<limit>]       List recent outbound sync jobs
  install-url          Print the OAuth install URL
  redeem <code>        Exchange an OAuth authorization code for tokens
  token                Refresh the access token if needed and show its expiry";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Inbound,
    Outbound,
    Contacts { unlinked_only: bool },
    Jobs { limit: usize },
    InstallUrl,
    Redeem { code: String },
    Token,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub db_path: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
    pub command: Command,
}

/// Parse arguments (without the program name)
pub fn parse_args(args: impl IntoIterator<Item = String>) -> Result<CliArgs> {
    let mut args = args.into_iter();
    let mut db_path = None;
    let mut config_path = None;
    let mut positional = Vec::new();
    let mut unlinked_only = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--db" | "-d" => {
                let path = args.next().ok_or_else(|| anyhow!("--db needs a path"))?;
                db_path = Some(PathBuf::from(path));
            }
            "--config" | "-c" => {
                let path = args.next().ok_or_else(|| anyhow!("--config needs a path"))?;
                config_path = Some(PathBuf::from(path));
            }
            "--unlinked" => unlinked_only = true,
            "--help" | "-h" => bail!("{USAGE}"),
            flag if flag.starts_with('-') => bail!("Unknown option {flag}\n\n{USAGE}"),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let command = match positional.next().as_deref() {
        Some("inbound") => Command::Inbound,
        Some("outbound") => Command::Outbound,
        Some("contacts") => Command::Contacts { unlinked_only },
        Some("jobs") => {
            let limit = match positional.next() {
                Some(limit) => limit
                    .parse()
                    .map_err(|_| anyhow!("jobs limit must be a number, got '{limit}'"))?,
                None => 20,
            };
            Command::Jobs { limit }
        }
        Some("install-url") => Command::InstallUrl,
        Some("redeem") => {
            let code = positional
                .next()
                .ok_or_else(|| anyhow!("redeem needs an authorization code"))?;
            Command::Redeem { code }
        }
        Some("token") => Command::Token,
        Some(other) => bail!("Unknown command {other}\n\n{USAGE}"),
        None => bail!("{USAGE}"),
    };

    Ok(CliArgs {
        db_path,
        config_path,
        command,
    })
}
