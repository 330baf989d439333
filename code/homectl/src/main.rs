// This file defines the command-line client for the home relay server.
//
// It can be used to watch the merged sensor/weather state, switch the fan, ac,
// and light between on/off/auto, and push sensor payloads by hand when no
// sensor node is around.

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use homelib::display::print_snapshot;
use homelib::types::{Device, DeviceAction, IngestPayload, SystemSnapshot};
use regex::Regex;
use reqwest::StatusCode;
use std::env;
use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(about = "Home relay command-line client")]
struct Args {
    #[arg(long, help = "Host:port of the relay server")]
    addr: Option<String>,

    #[command(subcommand)]
    command: Commands,

    #[arg(long, help = "If true, output is printed in json format")]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Switch devices. Each command has the form <device>:<action>, e.g. fan:on or l:auto.
    Ctl {
        #[arg(required = true)]
        commands: Vec<String>,
    },
    /// Show indoor and outdoor conditions and the state of every device.
    State {
        #[arg(long, help = "Keep polling every N seconds", value_parser = parse_duration)]
        watch: Option<Duration>,
    },
    /// Push a sensor payload, the same way the sensor node does.
    Push {
        #[arg(long)]
        json: Option<String>,
        #[arg(long)]
        file: Option<String>,
    },
}

fn parse_duration(arg: &str) -> Result<Duration, std::num::ParseIntError> {
    let seconds = arg.parse()?;
    Ok(Duration::from_secs(seconds))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stderrlog::new()
        .module(module_path!())
        .verbosity(log::Level::Info)
        .init()?;

    let args = Args::parse();

    // The server address can be passed by flag or environment variable. Flag
    // takes precedence.
    let addr = args
        .addr
        .or(env::var("HOMERELAY_ADDR").ok())
        .ok_or_else(|| {
            anyhow!("No address specified. Either pass --addr or set HOMERELAY_ADDR env var.")
        })?;
    let client = reqwest::Client::new();

    match &args.command {
        Commands::Ctl { commands } => {
            // Parse everything up front so a typo doesn't leave half the
            // commands applied.
            let cmds = commands
                .iter()
                .map(|x| parse_cmd(x))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| anyhow!("Error parsing command(s): {err}"))?;

            log::info!("Connecting to relay at '{addr}'...");
            let mut last = None;
            for cmd in &cmds {
                let uri = format!("http://{addr}/api/device/{}/{}", cmd.device, cmd.action);
                let resp = client.post(uri).send().await?;
                if resp.status() != StatusCode::OK {
                    return Err(anyhow!(
                        "Setting {} to {} failed: {}",
                        cmd.device,
                        cmd.action,
                        resp.text().await?
                    ));
                }
                last = Some(resp.text().await?);
            }
            if let Some(text) = last {
                show_snapshot(&text, args.json)?;
            }
        }
        Commands::State { watch } => {
            log::info!("Connecting to relay at '{addr}'...");
            loop {
                let text = fetch_status(&client, &addr).await?;
                show_snapshot(&text, args.json)?;
                match watch {
                    Some(interval) => {
                        tokio::time::sleep(*interval).await;
                        println!();
                    }
                    None => break,
                }
            }
        }
        Commands::Push { json, file } => {
            let raw = match (json, file) {
                (Some(json), None) => json.clone(),
                (None, Some(path)) => std::fs::read_to_string(path)?,
                _ => return Err(anyhow!("Pass exactly one of --json or --file")),
            };
            // Catch mistakes locally rather than relying on the server's 400.
            let payload = IngestPayload::from_slice(raw.as_bytes())?;

            log::info!("Connecting to relay at '{addr}'...");
            let resp = client
                .post(format!("http://{addr}/api/update"))
                .json(&payload)
                .send()
                .await?;
            if resp.status() != StatusCode::OK {
                return Err(anyhow!("Push failed: {}", resp.text().await?));
            }
            log::info!("Payload accepted");
        }
    }

    Ok(())
}

async fn fetch_status(client: &reqwest::Client, addr: &str) -> anyhow::Result<String> {
    let resp = client.get(format!("http://{addr}/api/status")).send().await?;
    if resp.status() != StatusCode::OK {
        return Err(anyhow!("Got bad response: {}", resp.text().await?));
    }
    Ok(resp.text().await?)
}

fn show_snapshot(text: &str, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{text}");
    } else {
        let snap: SystemSnapshot = serde_json::from_str(text)?;
        print_snapshot(&snap);
    }
    Ok(())
}

#[derive(PartialEq, Debug)]
struct ControlCommand {
    device: Device,
    action: DeviceAction,
}

#[derive(PartialEq, Debug)]
struct CommandParseError {
    msg: String,
}

impl CommandParseError {
    pub fn new(msg: &str) -> Self {
        Self { msg: msg.into() }
    }
}

impl fmt::Display for CommandParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg)
    }
}

static CMD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?<device>[a-zA-Z]+):(?<action>[a-zA-Z]+)$").expect("command regex is valid")
});

// Accepts full device names or their first letter, case-insensitively.
fn parse_cmd(cmd: &str) -> Result<ControlCommand, CommandParseError> {
    if cmd.is_empty() {
        return Err(CommandParseError::new("Empty command"));
    }

    let caps = match CMD_RE.captures(cmd) {
        Some(c) => c,
        None => {
            return Err(CommandParseError::new(&format!("Invalid command: '{cmd}'")));
        }
    };

    let device_str = caps["device"].to_lowercase();
    let device = match device_str.as_str() {
        "f" => Device::Fan,
        "a" => Device::Ac,
        "l" => Device::Light,
        name => name.parse().map_err(|_| {
            CommandParseError::new(&format!("Unknown device: '{}'", &caps["device"]))
        })?,
    };

    let action = caps["action"].to_lowercase().parse().map_err(|_| {
        CommandParseError::new(&format!("Invalid action: '{}'", &caps["action"]))
    })?;

    Ok(ControlCommand { device, action })
}
