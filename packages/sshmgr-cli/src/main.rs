//! sshmgr CLI - find, probe and relocate SSH hosts on the local network
//!
//! This binary is a thin command surface over `sshmgr-core`:
//! - Sweep a subnet for ssh servers
//! - Browse Bonjour for `_ssh._tcp` services and classify them for a user
//! - Health-check and probe configured hosts
//! - Relocate a host whose address changed

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use sshmgr_core::config::{self, EngineConfig};
use sshmgr_core::discovery::{self, DiscoverOptions, DnsSd, HostEntry, StatusFilter};
use sshmgr_core::reassoc::{self, FingerprintTable};
use sshmgr_core::scanner::{self, ConnectivityProbe, ReachabilityStatus, SshClient, Target};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "sshmgr")]
#[command(version)]
#[command(about = "Find, probe and relocate SSH hosts on the local network")]
#[command(long_about = "
sshmgr keeps track of SSH hosts on a LAN whose addresses move around with
DHCP. It sweeps subnets, browses Bonjour advertisements, classifies whether
a user can log in, and relocates a host by asking candidates for their
hostname.

Quick start:
  1. Find ssh hosts:     sshmgr scan 192.168.1.0/24
  2. Browse Bonjour:     sshmgr discover --probe --only connectable
  3. Relocate a host:    sshmgr reassociate mini --subnet 192.168.1.0/24
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sweep a subnet for hosts answering on port 22
    Scan {
        /// IPv4 subnet in CIDR notation
        subnet: String,

        /// Also ask unnamed hosts for their hostname over ssh as this user
        #[arg(short, long)]
        user: Option<String>,

        /// Banner timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        #[arg(short, long)]
        concurrency: Option<usize>,
    },

    /// Browse Bonjour for ssh services
    Discover {
        /// User for --probe and --add (default: current user)
        #[arg(short, long)]
        user: Option<String>,

        /// Check whether the user can log in (OK/AUTH/DENY/DOWN/ERR)
        #[arg(long)]
        probe: bool,

        /// Filter: all|connectable|ok|auth|deny|down|err|resolve
        #[arg(long, default_value = "all")]
        only: StatusFilter,

        /// Browse window in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Probe concurrency
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Probe timeout in seconds per host
        #[arg(long)]
        probe_timeout: Option<u64>,

        /// Skip the display IP lookup
        #[arg(long)]
        no_resolve: bool,

        /// Print inventory entries for the discovered hosts
        #[arg(long)]
        add: bool,

        /// Names already in the inventory (repeatable)
        #[arg(long = "existing", value_name = "NAME")]
        existing: Vec<String>,
    },

    /// TCP health check of hosts given as [user@]host[:port]
    Ping {
        #[arg(required = true)]
        targets: Vec<String>,

        /// Fail unless every host is OK
        #[arg(long)]
        strict: bool,

        /// Previously known IP of a single target, to report address changes
        #[arg(long)]
        last_ip: Option<String>,

        /// Timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        #[arg(short, long)]
        concurrency: Option<usize>,
    },

    /// Classify whether a user can log in to a host
    Probe {
        /// [user@]host[:port]; user defaults to the current user
        target: String,

        /// Fail unless the status is OK
        #[arg(long)]
        strict: bool,

        /// Timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Find a host again after its address changed
    Reassociate {
        /// Expected output of `hostname` on the host
        hostname: String,

        /// IPv4 subnet in CIDR notation
        #[arg(long)]
        subnet: String,

        /// Login used for the hostname check (default: current user)
        #[arg(short, long)]
        user: Option<String>,

        /// Banner gate timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Record the winner's host key in the fingerprint table
        #[arg(long)]
        remember: bool,
    },

    /// Show a host's key fingerprints and the name it is known under
    Fingerprint {
        /// Address or host name
        host: String,

        /// Timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Show configuration paths and settings
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    let default_filter = format!("sshmgr={},sshmgr_core={}", log_level, log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let loaded = config::load_config();
    tracing::debug!("Configuration from {}", loaded.source);
    let mut config = loaded.config;

    match &cli.command {
        Commands::Scan {
            subnet,
            user,
            timeout_ms,
            concurrency,
        } => {
            override_value(&mut config.scan.timeout_ms, *timeout_ms);
            override_value(&mut config.scan.concurrency, *concurrency);
            cmd_scan(&cli, &config, subnet, user.clone()).await
        }
        Commands::Discover {
            user,
            probe,
            only,
            timeout,
            concurrency,
            probe_timeout,
            no_resolve,
            add,
            existing,
        } => {
            override_value(&mut config.discover.browse_secs, *timeout);
            override_value(&mut config.probe.concurrency, *concurrency);
            override_value(&mut config.probe.timeout_secs, *probe_timeout);
            let options = DiscoverOptions {
                probe: *probe,
                user: user.clone().or_else(current_user),
                filter: *only,
                resolve_ips: !*no_resolve,
            };
            cmd_discover(&cli, &config, options, *add, existing).await
        }
        Commands::Ping {
            targets,
            strict,
            last_ip,
            timeout,
            concurrency,
        } => {
            override_value(&mut config.ping.timeout_secs, *timeout);
            override_value(&mut config.ping.concurrency, *concurrency);
            cmd_ping(&cli, &config, targets, *strict, last_ip.as_deref()).await
        }
        Commands::Probe {
            target,
            strict,
            timeout,
        } => {
            override_value(&mut config.probe.timeout_secs, *timeout);
            cmd_probe(&cli, &config, target, *strict).await
        }
        Commands::Reassociate {
            hostname,
            subnet,
            user,
            timeout_ms,
            concurrency,
            remember,
        } => {
            override_value(&mut config.reassociate.timeout_ms, *timeout_ms);
            override_value(&mut config.reassociate.concurrency, *concurrency);
            let user = user
                .clone()
                .or_else(current_user)
                .context("Cannot determine a user, pass --user")?;
            cmd_reassociate(&cli, &config, hostname, subnet, &user, *remember).await
        }
        Commands::Fingerprint { host, timeout } => {
            override_value(&mut config.probe.timeout_secs, *timeout);
            cmd_fingerprint(&cli, &config, host).await
        }
        Commands::Config => cmd_config(&cli, &config, &loaded.source),
    }
}

fn override_value<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn current_user() -> Option<String> {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .filter(|u| !u.is_empty())
}

async fn cmd_scan(
    cli: &Cli,
    config: &EngineConfig,
    subnet: &str,
    user: Option<String>,
) -> Result<()> {
    config.validate()?;
    let hits = scanner::sweep_subnet(subnet, user, config).await?;

    match cli.format {
        OutputFormat::Text => {
            if hits.is_empty() {
                println!("No ssh hosts found in {}", subnet);
                return Ok(());
            }
            println!("{:<15}  {:<32}  {}", "IP", "HOSTNAME", "FINGERPRINT");
            for hit in &hits {
                println!(
                    "{:<15}  {:<32}  {}",
                    hit.ip,
                    hit.display_name(),
                    hit.fingerprint.as_deref().unwrap_or("-")
                );
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "subnet": subnet,
                "hosts": hits,
            }));
        }
    }

    Ok(())
}

async fn cmd_discover(
    cli: &Cli,
    config: &EngineConfig,
    options: DiscoverOptions,
    add: bool,
    existing: &[String],
) -> Result<()> {
    config.validate()?;
    if (options.probe || add) && options.user.is_none() {
        bail!("Cannot determine a user for --probe/--add, pass --user");
    }

    let browser = DnsSd::new(config.tools.dns_sd.clone());
    let probe: Arc<dyn ConnectivityProbe> = Arc::new(SshClient::new(config.tools.ssh.clone()));
    let records = discovery::discover(&browser, probe, config, &options).await?;

    let entries = if add {
        let registry: HashSet<String> = existing.iter().cloned().collect();
        HostEntry::candidates(
            &records,
            options.user.as_deref().unwrap_or_default(),
            options.probe,
            options.filter,
            &registry,
        )
    } else {
        Vec::new()
    };

    match cli.format {
        OutputFormat::Text => {
            if records.is_empty() {
                println!("No _ssh._tcp services found (try increasing --timeout)");
                return Ok(());
            }
            if options.probe {
                println!("{:<28}  {:<28}  {:>5}  {:<15}  {}", "NAME", "HOST", "PORT", "IP", "ST");
            } else {
                println!("{:<28}  {:<28}  {:>5}  {}", "NAME", "HOST", "PORT", "IP");
            }
            for record in &records {
                match record.status {
                    Some(status) => println!(
                        "{:<28}  {:<28}  {:>5}  {:<15}  {}",
                        record.instance_name, record.host, record.port, record.resolved_ip, status
                    ),
                    None => println!(
                        "{:<28}  {:<28}  {:>5}  {}",
                        record.instance_name, record.host, record.port, record.resolved_ip
                    ),
                }
            }
            if add {
                println!();
                for entry in &entries {
                    println!("  {} -> {}@{}:{}", entry.name, entry.user, entry.host, entry.port);
                }
                println!("{} host(s) ready to add", entries.len());
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "filter": options.filter.to_string(),
                "records": records,
                "entries": entries,
            }));
        }
    }

    Ok(())
}

async fn cmd_ping(
    cli: &Cli,
    config: &EngineConfig,
    targets: &[String],
    strict: bool,
    last_ip: Option<&str>,
) -> Result<()> {
    config.validate()?;
    let targets = targets
        .iter()
        .map(|t| t.parse::<Target>())
        .collect::<Result<Vec<_>, _>>()?;
    if last_ip.is_some() && targets.len() != 1 {
        bail!("--last-ip needs exactly one target");
    }

    let reports = scanner::check_all(targets, &config.ping).await;
    let ip_change = last_ip.and_then(|prev| {
        let current = reports.first()?.ip.as_deref()?;
        Some(scanner::check_ip_change(Some(prev), current))
    });

    match cli.format {
        OutputFormat::Text => {
            for report in &reports {
                let latency = if report.status == ReachabilityStatus::Ok {
                    format!("{}ms", report.latency_ms)
                } else {
                    "-".to_string()
                };
                println!(
                    "  {:<7} {:<28} {:<15} {:>8}",
                    report.status,
                    format!("{}:{}", report.host, report.port),
                    report.ip.as_deref().unwrap_or("-"),
                    latency
                );
            }
            match &ip_change {
                Some(scanner::IpChange::Changed { from, to }) => {
                    println!("Address changed: {} -> {}", from, to)
                }
                Some(scanner::IpChange::Unchanged { ip }) => println!("Address unchanged: {}", ip),
                Some(scanner::IpChange::FirstSeen { ip }) => println!("Address: {}", ip),
                None => {}
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "hosts": reports,
                "ip_change": ip_change,
            }));
        }
    }

    if strict {
        let failing = reports
            .iter()
            .filter(|r| r.status != ReachabilityStatus::Ok)
            .count();
        if failing > 0 {
            bail!("{} of {} host(s) not reachable", failing, reports.len());
        }
    }

    Ok(())
}

async fn cmd_probe(cli: &Cli, config: &EngineConfig, target: &str, strict: bool) -> Result<()> {
    config.validate()?;
    let mut target: Target = target.parse()?;
    if target.user.is_none() {
        target.user = current_user();
    }
    if target.user.is_none() {
        bail!("Cannot determine a user, use user@host");
    }

    let client = SshClient::new(config.tools.ssh.clone());
    let outcome = client.probe(&target, config.probe.timeout()).await;
    let status = scanner::classify(&outcome);

    match cli.format {
        OutputFormat::Text => {
            println!("{}  {}  ({}ms)", status, target, outcome.latency_ms);
            if cli.verbose && !outcome.raw_text.trim().is_empty() {
                println!("{}", outcome.raw_text.trim());
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "target": target,
                "status": status,
                "latency_ms": outcome.latency_ms,
            }));
        }
    }

    if strict {
        status.ensure_reachable(&target)?;
    }
    Ok(())
}

async fn cmd_reassociate(
    cli: &Cli,
    config: &EngineConfig,
    hostname: &str,
    subnet: &str,
    user: &str,
    remember: bool,
) -> Result<()> {
    config.validate()?;
    if let OutputFormat::Text = cli.format {
        println!("Reassociating {} in {}...", hostname, subnet);
    }

    let found = reassoc::reassociate(user, hostname, subnet, config).await?;

    let mut remembered = None;
    if let (Some(found), true) = (&found, remember) {
        let fingerprint = scanner::host_key_fingerprint(
            &config.tools.ssh_keyscan,
            &found.matched_ip,
            config.probe.timeout(),
        )
        .await?;
        let mut table = FingerprintTable::load()?;
        table.update(&fingerprint, hostname, &found.matched_ip);
        table.save()?;
        tracing::info!("Remembered {} as {}", fingerprint, hostname);
        remembered = Some(fingerprint);
    }

    match cli.format {
        OutputFormat::Text => match &found {
            Some(found) => {
                println!("Reassociated {} -> {}", hostname, found.matched_ip);
                if let Some(fingerprint) = &remembered {
                    println!("Host key {}", fingerprint);
                }
            }
            None => println!("No matching host found"),
        },
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "hostname": hostname,
                "subnet": subnet,
                "matched_ip": found.as_ref().map(|f| f.matched_ip.clone()),
                "fingerprint": remembered,
            }));
        }
    }

    Ok(())
}

async fn cmd_fingerprint(cli: &Cli, config: &EngineConfig, host: &str) -> Result<()> {
    let timeout = config.probe.timeout();
    let ip = scanner::resolve_host(host, timeout).await?.to_string();

    let fingerprint =
        scanner::host_key_fingerprint(&config.tools.ssh_keyscan, &ip, timeout).await?;
    let digest = scanner::keyscan_digest(&config.tools.ssh_keyscan, &ip, timeout)
        .await
        .ok();
    let table = FingerprintTable::load()?;
    let known = table.lookup(&fingerprint);

    match cli.format {
        OutputFormat::Text => {
            println!("Host:        {} ({})", host, ip);
            println!("Fingerprint: {}", fingerprint);
            if let Some(digest) = &digest {
                println!("Digest:      {}", scanner::short_digest(digest));
            }
            match known {
                Some(entry) => println!(
                    "Known as:    {} (last at {}, {})",
                    entry.name,
                    entry.ip,
                    entry.updated_at.to_rfc3339()
                ),
                None => println!("Known as:    - (not in {})", table.path().display()),
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "host": host,
                "ip": ip,
                "fingerprint": fingerprint,
                "digest": digest.as_deref().map(scanner::short_digest),
                "known": known,
            }));
        }
    }

    Ok(())
}

fn cmd_config(cli: &Cli, engine: &EngineConfig, source: &config::ConfigSource) -> Result<()> {
    let config_path = config::get_config_file_path_string();
    let table_path = reassoc::default_table_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "-".to_string());

    match cli.format {
        OutputFormat::Text => {
            println!("Configuration");
            println!("=============");
            println!();
            println!("Config file:       {}", config_path);
            println!("Loaded from:       {}", source);
            println!("Fingerprint table: {}", table_path);
            println!();
            println!("Environment variables:");
            println!("  SSHMGR_CONFIG - Use this config file instead");
            println!("  RUST_LOG      - Override log filtering");
            println!();
            println!("Example config.toml:");
            println!();
            println!("{}", config::generate_example_config());
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "config_file": config_path,
                "source": source.to_string(),
                "fingerprint_table": table_path,
                "settings": engine,
            }));
        }
    }

    Ok(())
}
