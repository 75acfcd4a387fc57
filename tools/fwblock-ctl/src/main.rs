//! FWBlock-Ctl: push block requests to firewall agents.
//!
//! Reads the agent configuration, checks in with every agent, sends the
//! requested blocks and checks out again.

use std::io::{self, BufRead};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fwblock_agent::adapters::{SystemTimeSource, TcpTransport, TomlConfigLoader};
use fwblock_agent::domain::EndpointRegistry;
use fwblock_agent::{
    parse_duration, AgentClient, AgentConfig, AgentLink, Alert, BlockPolicy, DispatchOutcome, DispatchReport,
    EndpointOutcome, How, Who,
};

/// FWBlock-Ctl: firewall agent block client
#[derive(Parser, Debug)]
#[command(name = "fwblock-ctl")]
#[command(about = "Send block requests to firewall agents")]
struct Args {
    /// Agent configuration file
    #[arg(short, long, default_value = "fwblock.toml")]
    config: PathBuf,

    /// Log filter, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check in with every configured agent and report who answered
    Check,

    /// Send a single block request
    Block {
        /// Source address of the offending connection
        #[arg(long)]
        src: Ipv4Addr,
        /// Destination address of the offending connection
        #[arg(long)]
        dst: Ipv4Addr,
        /// IP protocol number
        #[arg(long, default_value = "6")]
        proto: u8,
        /// Source port
        #[arg(long, default_value = "0")]
        sport: u16,
        /// Destination port
        #[arg(long, default_value = "0")]
        dport: u16,
        /// Signature id used to look up the block policy
        #[arg(long)]
        sid: u32,
        /// Override the blocked side (src, dst)
        #[arg(long)]
        who: Option<Who>,
        /// Override the blocked direction (in, out, both, conn)
        #[arg(long)]
        how: Option<How>,
        /// Override the duration, e.g. "15min" or "permanent"
        #[arg(long)]
        duration: Option<String>,
    },

    /// Read alerts from stdin, one per line: `src dst proto sport dport sid`
    Pipe,
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let config = TomlConfigLoader::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    match args.command {
        Command::Check => {
            print_config(&config);
            run(&config, |_, endpoints| {
                println!("checked in:");
                for handle in endpoints.all() {
                    let endpoint = handle.lock();
                    println!("  {} (remote seq {})", endpoint.id(), endpoint.remote_seq());
                }
                Ok(())
            })
        }
        Command::Block {
            src,
            dst,
            proto,
            sport,
            dport,
            sid,
            who,
            how,
            duration,
        } => {
            let mut policy = config.policy_for(sid);
            if let Some(who) = who {
                policy.who = who;
            }
            if let Some(how) = how {
                policy.how = how;
            }
            if let Some(duration) = duration {
                policy.duration_secs = parse_duration(&duration).context("Invalid --duration")?;
            }
            let alert = Alert::new(src, dst, proto, sid).with_ports(sport, dport);
            run(&config, |client, endpoints| {
                let report = client.on_alert(&alert, Some(&policy), endpoints);
                print_report(&alert, &policy, &report);
                Ok(())
            })
        }
        Command::Pipe => run(&config, |client, endpoints| {
            for (number, line) in io::stdin().lock().lines().enumerate() {
                let line = line.context("Failed to read stdin")?;
                if line.trim().is_empty() || line.trim_start().starts_with('#') {
                    continue;
                }
                let alert = match parse_alert(&line) {
                    Ok(alert) => alert,
                    Err(e) => {
                        warn!(line = number + 1, error = %e, "skipping malformed alert");
                        continue;
                    }
                };
                let policy = config.policy_for(alert.sig_id);
                let report = client.on_alert(&alert, Some(&policy), endpoints);
                print_report(&alert, &policy, &report);
            }
            Ok(())
        }),
    }
}

/// Attach to every configured agent, run `body`, then check out.
fn run<F>(config: &AgentConfig, body: F) -> Result<()>
where
    F: FnOnce(&mut AgentClient, &EndpointRegistry) -> Result<()>,
{
    if config.endpoints.is_empty() {
        bail!("No agents configured");
    }

    let link = AgentLink::new(Arc::new(TcpTransport::new()), Arc::new(SystemTimeSource), config.timing);
    let mut client = AgentClient::new(link, &config.client);
    let endpoints = client.attach_all(&config.endpoints);
    if endpoints.is_empty() {
        bail!("Could not check in with any agent");
    }

    let result = body(&mut client, &endpoints);
    let checked_out = client.shutdown();
    info!(checked_out, "done");
    result
}

fn parse_alert(line: &str) -> Result<Alert> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let [src, dst, proto, sport, dport, sid] = fields.as_slice() else {
        bail!("expected 6 fields, got {}", fields.len());
    };
    Ok(Alert::new(
        src.parse().context("source address")?,
        dst.parse().context("destination address")?,
        proto.parse().context("protocol")?,
        sid.parse().context("signature id")?,
    )
    .with_ports(
        sport.parse().context("source port")?,
        dport.parse().context("destination port")?,
    ))
}

fn print_config(config: &AgentConfig) {
    println!("local bind:      {}", config.client.local_bind);
    println!("dedup window:    {}s", config.client.dedup_window_secs);
    println!("default policy:  {}", config.default_policy);
    println!("sid policies:    {}", config.policies.len());
    println!("agents:");
    for spec in &config.endpoints {
        println!("  {}:{}", spec.host, spec.port);
    }
}

fn print_report(alert: &Alert, policy: &BlockPolicy, report: &DispatchReport) {
    match report.outcome {
        DispatchOutcome::NoPolicy => println!("sid {}: no policy", alert.sig_id),
        DispatchOutcome::Suppressed => println!("sid {}: {} -> {} suppressed", alert.sig_id, alert.src, alert.dst),
        DispatchOutcome::Dispatched => {
            println!("sid {}: {} -> {} [{}]", alert.sig_id, alert.src, alert.dst, policy);
            for (id, outcome) in &report.endpoints {
                match outcome {
                    EndpointOutcome::Delivered => println!("  {}: delivered", id),
                    EndpointOutcome::Deferred(e) => println!("  {}: deferred ({})", id, e),
                    EndpointOutcome::Evicted(e) => println!("  {}: evicted ({})", id, e),
                }
            }
        }
    }
}
