//! Command line probe for vDC endpoints

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use colored_json::{ColorMode, Output};
use tracing::debug;

use dsvdc::client::Connection;
use dsvdc::message::{GetProperty, Message, Payload, PropertyElement, SetProperty};
use dsvdc::{ErrorKind, Property, ResultCode, Value, SUPPORTED_API_VERSION};

#[derive(Parser)]
#[command(name = "dsvdc")]
#[command(about = "Talk to a vDC endpoint as a session manager")]
#[command(version)]
struct Cli {
    /// Endpoint address
    #[arg(short, long, env = "DSVDC_ADDRESS", default_value = "127.0.0.1:49500")]
    address: String,

    /// dSUID presented in the handshake
    #[arg(long, env = "DSVDC_VDSM_DSUID", default_value = "0000000000000000000000000000000000")]
    vdsm: String,

    /// Seconds to wait for each reply
    #[arg(short, long, default_value_t = 5)]
    timeout: u64,

    #[arg(long, value_enum, default_value_t = Color::Auto)]
    color: Color,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Color {
    On,
    Off,
    Auto,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the handshake and print the endpoint's dSUID
    Hello,

    /// Ping a device and wait for its pong
    Ping {
        /// Device dSUID, the endpoint's own by default
        dsuid: Option<String>,
    },

    /// Query properties of a device
    GetProperty {
        dsuid: String,

        /// Property names, all properties if none are given
        names: Vec<String>,
    },

    /// Set properties of a device
    SetProperty {
        dsuid: String,

        /// NAME=VALUE pairs; booleans and numbers are recognized, anything
        /// else is sent as a string
        #[arg(value_parser = parse_assignment, required = true)]
        values: Vec<(String, Value)>,
    },

    /// Stay connected and print everything the endpoint sends
    Watch,

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_assignment(s: &str) -> std::result::Result<(String, Value), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{s}'"))?;
    if name.is_empty() {
        return Err(format!("empty property name in '{s}'"));
    }
    let value = if let Ok(b) = value.parse::<bool>() {
        Value::Bool(b)
    } else if let Ok(u) = value.parse::<u64>() {
        Value::Uint(u)
    } else if let Ok(i) = value.parse::<i64>() {
        Value::Int(i)
    } else if let Ok(d) = value.parse::<f64>() {
        if !d.is_finite() {
            return Err(format!("'{name}' is not a finite number: '{value}'"));
        }
        Value::Double(d)
    } else {
        Value::String(value.to_string())
    };
    Ok((name.to_string(), value))
}

struct Probe {
    connection: Connection,
    timeout: Duration,
    color: ColorMode,
}

impl Probe {
    fn connect(cli: &Cli) -> Result<(Self, String)> {
        let address: SocketAddr = cli
            .address
            .to_socket_addrs()
            .with_context(|| format!("Failed to resolve '{}'", cli.address))?
            .next()
            .ok_or_else(|| anyhow!("No address for '{}'", cli.address))?;
        let connection = Connection::connect(address)
            .with_context(|| format!("Failed to connect to '{}'", address))?;

        let mut probe = Probe {
            connection,
            timeout: Duration::from_secs(cli.timeout),
            color: match cli.color {
                Color::On => ColorMode::On,
                Color::Off => ColorMode::Off,
                Color::Auto => ColorMode::Auto(Output::StdOut),
            },
        };
        let dsuid = probe
            .connection
            .hello(&cli.vdsm, SUPPORTED_API_VERSION, probe.timeout)
            .context("Handshake failed")?;
        debug!(dsuid = %dsuid, "session established");
        Ok((probe, dsuid))
    }

    fn print(&self, message: &Message) -> Result<()> {
        let value = serde_json::to_value(message)?;
        println!("{}", colored_json::to_colored_json(&value, self.color)?);
        Ok(())
    }

    /// Answer requests the endpoint sends so it does not time them out.
    fn acknowledge(&mut self, message: &Message) -> Result<()> {
        let announcement = matches!(
            message.payload,
            Payload::VdcSendAnnounceVdc(_) | Payload::VdcSendAnnounceDevice(_)
        );
        if announcement && message.message_id != 0 {
            self.connection
                .send(&Message::generic_response(message.message_id, ResultCode::Ok))?;
        }
        Ok(())
    }

    fn ping(&mut self, dsuid: &str) -> Result<()> {
        self.connection.send(&Message::notification(
            dsvdc::message::VdsmSendPing {
                dsuid: Some(dsuid.into()),
            },
        ))?;
        loop {
            let message = self.connection.recv(self.timeout).context("No pong")?;
            self.print(&message)?;
            match message.payload {
                Payload::VdcSendPong(ref pong) if pong.dsuid == dsuid => return Ok(()),
                _ => self.acknowledge(&message)?,
            }
        }
    }

    fn get_property(&mut self, dsuid: &str, names: &[String]) -> Result<()> {
        let query = names
            .iter()
            .map(|name| PropertyElement {
                name: Some(name.clone()),
                value: None,
                elements: Vec::new(),
            })
            .collect();
        let id = self.connection.request(GetProperty {
            dsuid: Some(dsuid.into()),
            query,
        })?;

        let mut others = Vec::new();
        let reply = self
            .connection
            .recv_response(id, self.timeout, |m| others.push(m))
            .context("No property response")?;
        for message in &others {
            self.acknowledge(message)?;
        }

        match reply.payload {
            Payload::VdcResponseGetProperty(response) => {
                let properties = Property::from_elements(response.properties)?;
                let value = serde_json::to_value(properties.to_elements())?;
                println!("{}", colored_json::to_colored_json(&value, self.color)?);
                Ok(())
            }
            Payload::GenericResponse(r) => bail!("Query failed: {}", r.code),
            p => bail!("Unexpected {} to property query", p.name()),
        }
    }

    fn set_property(&mut self, dsuid: &str, values: &[(String, Value)]) -> Result<()> {
        let mut properties = Property::new();
        for (name, value) in values {
            properties.add_value(name, value.clone());
        }
        let id = self.connection.request(SetProperty {
            dsuid: Some(dsuid.into()),
            properties: properties.into_elements(),
        })?;

        let mut others = Vec::new();
        let reply = self
            .connection
            .recv_response(id, self.timeout, |m| others.push(m))
            .context("No reply to property update")?;
        for message in &others {
            self.acknowledge(message)?;
        }

        match reply.payload {
            Payload::GenericResponse(r) if r.code.is_ok() => Ok(()),
            Payload::GenericResponse(r) => bail!("Update failed: {}", r.code),
            p => bail!("Unexpected {} to property update", p.name()),
        }
    }

    fn watch(&mut self) -> Result<()> {
        loop {
            match self.connection.recv(self.timeout) {
                Ok(message) => {
                    self.print(&message)?;
                    self.acknowledge(&message)?;
                }
                Err(e) if *e.kind() == ErrorKind::Timeout => continue,
                Err(e) if e.is_connection_loss() => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "dsvdc", &mut io::stdout());
        return Ok(());
    }

    let (mut probe, dsuid) = Probe::connect(&cli)?;
    match cli.command {
        Commands::Hello => println!("{}", dsuid),
        Commands::Ping { dsuid: ref device } => probe.ping(device.as_deref().unwrap_or(&dsuid))?,
        Commands::GetProperty {
            dsuid: ref device,
            ref names,
        } => probe.get_property(device, names)?,
        Commands::SetProperty {
            dsuid: ref device,
            ref values,
        } => probe.set_property(device, values)?,
        Commands::Watch => probe.watch()?,
        Commands::Completions { .. } => {}
    }
    let _ = probe.connection.shutdown();
    Ok(())
}
