//! Main entry point for the controller binary
//!
//! A thin command line front end over [`controller::Netproxy`]: every
//! subcommand maps onto one service call and prints either a short human
//! summary or the raw value as JSON.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;

use controller::{config::parse_shell, ControllerConfig, Netproxy};
use shared::{component_debug, logging, Component, ConfigGroup, OperationResult, OutboundMode};

/// Control and telemetry for the netproxy module
#[derive(Parser)]
#[command(name = "controller")]
#[command(about = "Drives and observes the netproxy engine through a privileged shell")]
pub struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    pub log_level: String,

    /// Module directory (overrides NETPROXY_MODULE_DIR)
    #[arg(long)]
    pub module_dir: Option<PathBuf>,

    /// Privileged shell, e.g. "su -c" or "sh -c" (overrides NETPROXY_SHELL)
    #[arg(long)]
    pub shell: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Engine state, active config and uptime
    Status,
    /// Start the engine and wait until it runs
    Start,
    /// Stop the engine and wait until it is gone
    Stop,
    /// Stop then start the engine
    Restart,
    /// Print throughput, CPU and memory at a fixed interval
    Monitor {
        /// Sampling interval in milliseconds
        #[arg(long, default_value = "1000")]
        interval: u64,
        /// Number of samples; runs until interrupted when omitted
        #[arg(long)]
        count: Option<u32>,
    },
    /// Internal and external IP addresses
    Ip,
    /// Latency to a single host
    Ping { host: String },
    /// List config groups
    Groups,
    /// Probe every node of a group and list them by latency
    Test { group: String },
    /// Probe a group and delete the nodes that did not answer
    Prune { group: String },
    /// Manage subscriptions
    Sub {
        #[command(subcommand)]
        action: SubAction,
    },
    /// Make a config file (relative to the outbounds dir) the active one
    Switch { file: String },
    /// Show or change the outbound mode
    Mode {
        #[command(subcommand)]
        action: Option<ModeAction>,
    },
    /// Import a node from a share link
    Import { link: String },
    /// Show the engine version
    Version,
    /// Print the tail of the service log, or the engine log with --engine
    Log {
        #[arg(long, default_value_t = 100)]
        lines: usize,
        #[arg(long)]
        engine: bool,
    },
}

#[derive(Subcommand)]
pub enum SubAction {
    List,
    Add { name: String, url: String },
    Update { name: String },
    Remove { name: String },
}

#[derive(Subcommand)]
pub enum ModeAction {
    Get,
    /// rule, global or direct
    Set { mode: OutboundMode },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init_tracing_with_level(Some(&args.log_level));

    let mut config = ControllerConfig::from_env().context("invalid NETPROXY_* environment")?;
    if let Some(dir) = args.module_dir.clone() {
        config = config.with_module_dir(dir);
    }
    if let Some(shell) = args.shell.as_deref() {
        config = config.with_shell(parse_shell("--shell", shell)?);
    }
    component_debug!(Component::Cli, config = ?config, "configuration loaded");

    let netproxy = Netproxy::from_config(config).context("failed to set up controller services")?;
    run(&netproxy, args.command, args.json).await
}

async fn run(netproxy: &Netproxy, command: Command, as_json: bool) -> Result<()> {
    match command {
        Command::Status => {
            let status = netproxy.lifecycle.status().await;
            let uptime = netproxy.lifecycle.uptime().await;
            let mode = netproxy.lifecycle.outbound_mode().await;
            if as_json {
                print_json(&json!({ "status": status, "uptime": uptime, "mode": mode }))?;
            } else {
                println!("state:  {}", status.state);
                println!("config: {}", if status.config.is_empty() { "-" } else { &status.config });
                println!("mode:   {mode}");
                println!("uptime: {}", uptime.as_deref().unwrap_or("-"));
            }
        }
        Command::Start => converged("start", netproxy.lifecycle.start().await?, as_json)?,
        Command::Stop => converged("stop", netproxy.lifecycle.stop().await?, as_json)?,
        Command::Restart => converged("restart", netproxy.lifecycle.restart().await?, as_json)?,
        Command::Monitor { interval, count } => monitor(netproxy, Duration::from_millis(interval.max(1)), count, as_json).await?,
        Command::Ip => {
            let (internal, external) = tokio::join!(netproxy.telemetry.internal_ips(), netproxy.telemetry.external_ip());
            if as_json {
                print_json(&json!({ "internal": internal, "external": external }))?;
            } else {
                for ip in &internal {
                    println!("{:<16} {}", ip.ip, ip.iface);
                }
                match external {
                    Some(info) => println!("external: {} {}", info.ip, info.country_code.unwrap_or_default()),
                    None => println!("external: unavailable"),
                }
            }
        }
        Command::Ping { host } => {
            let latency = netproxy.telemetry.ping(&host).await;
            if as_json {
                print_json(&json!({ "host": host, "latency": latency }))?;
            } else {
                println!("{host}: {latency}");
            }
        }
        Command::Groups => {
            let groups = netproxy.catalog.refresh_groups().await?;
            if as_json {
                print_json(&groups)?;
            } else {
                for group in &groups {
                    println!("{:<24} {:>4} nodes  {}", group.name, group.configs.len(), group.updated.as_deref().unwrap_or(""));
                }
            }
        }
        Command::Test { group } => {
            let group = find_group(netproxy, &group).await?;
            netproxy.catalog.load_group(&group).await?;
            netproxy.catalog.test_group_latency(&group).await;

            let mut ranked = Vec::new();
            for file in netproxy.catalog.sorted_by_latency(&group).await {
                let latency = netproxy.catalog.latency(&file).await;
                ranked.push((file, latency));
            }
            if as_json {
                let rows: Vec<_> = ranked.iter().map(|(file, latency)| json!({ "file": file, "latency": latency })).collect();
                print_json(&rows)?;
            } else {
                for (file, latency) in &ranked {
                    println!("{:<40} {}", file, latency.map(|l| l.to_string()).unwrap_or_else(|| "-".to_string()));
                }
            }
        }
        Command::Prune { group } => {
            // The latency cache lives in memory, so measure before pruning
            let group = find_group(netproxy, &group).await?;
            netproxy.catalog.load_group(&group).await?;
            netproxy.catalog.test_group_latency(&group).await;
            let report = netproxy.catalog.prune_invalid(&group).await;
            if as_json {
                print_json(&report)?;
            } else if report.candidates.is_empty() {
                println!("no invalid nodes");
            } else {
                println!("deleted {} of {} invalid nodes", report.success_count(), report.candidates.len());
            }
        }
        Command::Sub { action } => {
            let subscriptions = &netproxy.subscriptions;
            match action {
                SubAction::List => {
                    let list = subscriptions.list().await?;
                    if as_json {
                        print_json(&list)?;
                    } else {
                        for sub in &list {
                            println!("{:<24} {:>4} nodes  {}", sub.name, sub.node_count, sub.url.as_deref().unwrap_or("-"));
                        }
                    }
                }
                SubAction::Add { name, url } => operation(subscriptions.add(&name, &url).await?, as_json)?,
                SubAction::Update { name } => operation(subscriptions.update(&name).await?, as_json)?,
                SubAction::Remove { name } => operation(subscriptions.remove(&name).await?, as_json)?,
            }
        }
        Command::Switch { file } => operation(netproxy.catalog.switch_config(&file).await?, as_json)?,
        Command::Mode { action } => match action.unwrap_or(ModeAction::Get) {
            ModeAction::Get => {
                let mode = netproxy.lifecycle.outbound_mode().await;
                if as_json {
                    print_json(&json!({ "mode": mode }))?;
                } else {
                    println!("{mode}");
                }
            }
            ModeAction::Set { mode } => {
                let switched = netproxy.lifecycle.set_outbound_mode(mode).await?;
                let result = if switched {
                    OperationResult::ok()
                } else {
                    OperationResult::failed(format!("switch to {mode} was not confirmed"))
                };
                operation(result, as_json)?;
            }
        },
        Command::Import { link } => operation(netproxy.catalog.import_node_link(&link).await?, as_json)?,
        Command::Version => {
            let version = netproxy.lifecycle.engine_version().await;
            if as_json {
                print_json(&json!({ "version": version }))?;
            } else {
                println!("{version}");
            }
        }
        Command::Log { lines, engine } => {
            let log = if engine {
                netproxy.lifecycle.engine_log(lines).await
            } else {
                netproxy.lifecycle.service_log(lines).await
            };
            if as_json {
                print_json(&json!({ "log": log }))?;
            } else {
                print!("{}", log.as_deref().unwrap_or("no log available\n"));
            }
        }
    }
    Ok(())
}

async fn monitor(netproxy: &Netproxy, interval: Duration, count: Option<u32>, as_json: bool) -> Result<()> {
    // The first throughput reading only records a baseline
    netproxy.telemetry.network_speed().await;

    let mut taken = 0;
    while count.map_or(true, |limit| taken < limit) {
        tokio::time::sleep(interval).await;
        let (speed, usage) = tokio::join!(netproxy.telemetry.network_speed(), netproxy.telemetry.process_usage());
        taken += 1;

        if as_json {
            println!("{}", serde_json::to_string(&json!({ "speed": speed, "usage": usage }))?);
        } else {
            println!(
                "{speed}  cpu {:>5.1}%  mem {:>6.1} MiB ({:.1}%)",
                usage.cpu,
                usage.mem.used as f64 / (1024.0 * 1024.0),
                usage.mem.percentage
            );
        }
    }
    Ok(())
}

async fn find_group(netproxy: &Netproxy, name: &str) -> Result<ConfigGroup> {
    netproxy.catalog.refresh_groups().await?;
    match netproxy.catalog.find_group(name).await {
        Some(group) => Ok(group),
        None => bail!("no config group named '{name}'"),
    }
}

fn converged(action: &str, ok: bool, as_json: bool) -> Result<()> {
    if as_json {
        print_json(&json!({ "action": action, "converged": ok }))?;
    }
    if !ok {
        bail!("{action} did not converge within its time budget");
    }
    if !as_json {
        println!("{action}: confirmed");
    }
    Ok(())
}

fn operation(result: OperationResult, as_json: bool) -> Result<()> {
    if as_json {
        print_json(&result)?;
    }
    match (&result.error, result.success) {
        (_, true) => {
            if !as_json {
                println!("{}", result.output.as_deref().unwrap_or("ok"));
            }
            Ok(())
        }
        (Some(error), false) => bail!("{error}"),
        (None, false) => bail!("operation failed"),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
