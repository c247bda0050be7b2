//! A vDC with a single lamp, enough to exercise a session manager.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use dsvdc::{
    parse_dsuid, random_dsuid, Endpoint, EndpointConfig, Handler, Property, ResultCode, Scope,
    Session, StaticAnnouncement, Value,
};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(_signum: libc::c_int) {
    SHUTDOWN.store(true, Ordering::SeqCst);
}

#[derive(Parser)]
#[command(name = "dsvdc-reference")]
#[command(about = "Reference vDC hosting one dimmable lamp")]
#[command(version)]
struct Args {
    /// dSUID of the vDC
    #[arg(long, env = "DSVDC_DSUID", conflicts_with = "random_dsuid")]
    dsuid: Option<String>,

    /// Use a random dSUID for the vDC and its lamp
    #[arg(long)]
    random_dsuid: bool,

    /// Listen port, searched upward from 49500 if not given
    #[arg(short, long, env = "DSVDC_PORT")]
    port: Option<u16>,

    /// Name announced on the network
    #[arg(long, default_value = "dsvdc reference")]
    name: String,
}

struct Lamp {
    dsuid: String,
    brightness: f64,
    name: String,
}

struct Reference {
    lamp: Lamp,
}

impl Reference {
    fn lamp_addressed(&self, dsuids: &[String]) -> bool {
        dsuids.iter().any(|d| *d == self.lamp.dsuid)
    }
}

impl Handler for Reference {
    fn on_hello(&mut self, session: &mut Session) {
        info!(vdsm = session.peer_dsuid().unwrap_or_default(), "session started");
        let vdc = session.dsuid().to_string();
        let lamp = self.lamp.dsuid.clone();
        let container = vdc.clone();
        let announced = session.announce_container(&vdc, move |session, result| match result {
            Ok(ResultCode::Ok) => {
                let r = session.announce_device(&container, &lamp, |_, result| {
                    info!(?result, "lamp announced")
                });
                if let Err(e) = r {
                    warn!(error = %e, "announcing the lamp failed");
                }
            }
            other => warn!(result = ?other, "vdc announcement not accepted"),
        });
        if let Err(e) = announced {
            warn!(error = %e, "announcing the vdc failed");
        }
    }

    fn on_bye(&mut self, _session: &mut Session, dsuid: &str) {
        info!(vdsm = dsuid, "session ended by the session manager");
    }

    fn on_ping(&mut self, session: &mut Session, dsuid: &str) {
        if dsuid == self.lamp.dsuid {
            if let Err(e) = session.send_pong(dsuid) {
                warn!(error = %e, "pong failed");
            }
        }
    }

    fn on_call_scene(
        &mut self,
        _session: &mut Session,
        dsuids: &[String],
        scene: i32,
        force: bool,
        _scope: Scope,
    ) {
        if self.lamp_addressed(dsuids) {
            // scene 0 is off, 5 is on
            match scene {
                0 => self.lamp.brightness = 0.0,
                5 => self.lamp.brightness = 100.0,
                _ => {}
            }
            info!(scene, force, brightness = self.lamp.brightness, "scene called");
        }
    }

    fn on_identify(&mut self, _session: &mut Session, dsuids: &[String], _scope: Scope) {
        if self.lamp_addressed(dsuids) {
            info!(dsuid = %self.lamp.dsuid, "identify");
        }
    }

    fn on_set_output_channel_value(
        &mut self,
        _session: &mut Session,
        dsuids: &[String],
        apply_now: bool,
        channel: i32,
        value: f64,
        _scope: Scope,
    ) {
        if self.lamp_addressed(dsuids) && channel == 0 {
            self.lamp.brightness = value.clamp(0.0, 100.0);
            info!(apply_now, brightness = self.lamp.brightness, "output changed");
        }
    }

    fn on_get_property(
        &mut self,
        session: &mut Session,
        dsuid: &str,
        query: &Property,
        mut response: Property,
    ) {
        let id = response.message_id();
        let wanted = |name: &str| query.is_empty() || query.find(name).is_some();

        if dsuid == self.lamp.dsuid {
            if wanted("name") {
                response.add_string("name", self.lamp.name.as_str());
            }
            if wanted("outputSettings") {
                let mut settings = Property::new();
                settings.add_uint("group", 1).add_uint("mode", 1);
                response.add_property("outputSettings", settings);
            }
            if wanted("buttonInputSettings") {
                let mut settings = Property::new();
                settings
                    .add_uint("group", 1)
                    .add_uint("function", 5)
                    .add_uint("mode", 0);
                response.add_property("buttonInputSettings", settings);
            }
            if wanted("channelStates") {
                let mut brightness = Property::new();
                brightness.add_double("value", self.lamp.brightness);
                let mut states = Property::new();
                states.add_property("brightness", brightness);
                response.add_property("channelStates", states);
            }
        } else if dsuid == session.dsuid() {
            if wanted("name") {
                response.add_string("name", "dsvdc reference");
            }
            if wanted("model") {
                response.add_string("model", env!("CARGO_PKG_NAME"));
            }
        } else {
            if let Err(e) = session.send_generic_response(id, ResultCode::NotFound) {
                warn!(error = %e, "property error response failed");
            }
            return;
        }

        if let Err(e) = session.send_property_response(response) {
            warn!(error = %e, "property response failed");
        }
    }

    fn on_set_property(
        &mut self,
        session: &mut Session,
        dsuid: &str,
        values: &Property,
        response: Property,
    ) {
        if dsuid != self.lamp.dsuid {
            if let Err(e) = session.send_set_property_response(response, ResultCode::NotFound) {
                warn!(error = %e, "set property error response failed");
            }
            return;
        }
        let code = match values.find("name").and_then(|n| n.value()) {
            Some(Value::String(name)) => {
                self.lamp.name = name.clone();
                ResultCode::Ok
            }
            Some(_) => ResultCode::InvalidValueType,
            None => ResultCode::NotImplemented,
        };
        if let Err(e) = session.send_set_property_response(response, code) {
            warn!(error = %e, "set property response failed");
        }
    }
}

fn install_signal_handlers() -> Result<()> {
    for signum in [libc::SIGINT, libc::SIGTERM] {
        let handler = on_signal as extern "C" fn(libc::c_int);
        let previous = unsafe { libc::signal(signum, handler as libc::sighandler_t) };
        if previous == libc::SIG_ERR {
            anyhow::bail!(
                "Could not register handler for signal {signum}: {}",
                std::io::Error::last_os_error()
            );
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    install_signal_handlers()?;

    let (vdc, lamp) = match args.dsuid {
        Some(ref dsuid) => {
            let vdc = parse_dsuid(dsuid).context("Invalid --dsuid")?;
            // the lamp differs from the vdc in the last bit
            let (head, last) = vdc.split_at(vdc.len() - 2);
            let last = u8::from_str_radix(last, 16).context("Invalid --dsuid")?;
            let lamp = format!("{}{:02X}", head, last ^ 1);
            (vdc, lamp)
        }
        None if args.random_dsuid => (random_dsuid(), random_dsuid()),
        None => (
            "198C033E330755E78015F97AD093DD1C00".to_string(),
            "198C033E330755E78015F97AD093DD1C01".to_string(),
        ),
    };

    let config = EndpointConfig {
        port: args.port.unwrap_or(0),
        name: args.name.clone(),
        ..Default::default()
    };
    let handler = Reference {
        lamp: Lamp {
            dsuid: lamp,
            brightness: 0.0,
            name: "Lamp".into(),
        },
    };
    let endpoint = Endpoint::with_discovery(&vdc, handler, config, StaticAnnouncement::new())
        .context("Failed to set up the endpoint")?;
    info!(dsuid = %vdc, port = endpoint.port(), "vdc ready, press Ctrl-C to quit");

    while !SHUTDOWN.load(Ordering::SeqCst) {
        if let Err(e) = endpoint.work(Duration::from_secs(2)) {
            warn!(error = %e, "work cycle failed");
        }
    }

    info!("shutting down");
    endpoint.close();
    Ok(())
}
