use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use alohamini_teleop::config::TOPIC_STATUS;
use alohamini_teleop::keyboard::KeyboardListener;
use alohamini_teleop::messages::ControlStatus;
use alohamini_teleop::motor::{ActuatorBus, FeetechActuatorBus, MockBus};
use alohamini_teleop::{ControlLoop, Platform, TeleopConfig};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PlatformArg {
    /// Three-wheel omni base (W/S, A/D, Z/X)
    Base,
    /// Lift axis with overcurrent cutoff (U/J)
    Lift,
}

impl From<PlatformArg> for Platform {
    fn from(arg: PlatformArg) -> Self {
        match arg {
            PlatformArg::Base => Platform::Base,
            PlatformArg::Lift => Platform::Lift,
        }
    }
}

/// Keyboard teleop for the AlohaMini omni base and lift axis
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    /// Which actuators to drive
    #[arg(value_enum)]
    platform: PlatformArg,

    /// JSON config file; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serial port of the motor bus, e.g. /dev/ttyACM0
    #[arg(long)]
    port: Option<String>,

    /// Control period in milliseconds
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Overcurrent threshold in mA
    #[arg(long)]
    current_cutoff: Option<f64>,

    /// Consecutive over-threshold samples before cutoff
    #[arg(long)]
    trigger_count: Option<u32>,

    /// Run against an in-memory bus instead of hardware
    #[arg(long)]
    dry_run: bool,

    /// Publish loop status over Zenoh
    #[arg(long)]
    publish_status: bool,
}

impl Cli {
    fn load_config(&self) -> Result<TeleopConfig, BoxError> {
        let mut config = match &self.config {
            Some(path) => TeleopConfig::from_file(path)?,
            None => TeleopConfig::default(),
        };

        if let Some(port) = &self.port {
            config.port = port.clone();
        }
        if let Some(tick_ms) = self.tick_ms {
            config.tick_period_ms = Some(tick_ms);
        }
        if let Some(cutoff) = self.current_cutoff {
            config.overcurrent_threshold_ma = cutoff;
        }
        if let Some(count) = self.trigger_count {
            config.trigger_count = count;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run(Cli::parse()).await {
        eprintln!("Teleop error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), BoxError> {
    let config = cli.load_config()?;
    let platform = Platform::from(cli.platform);

    if cli.dry_run {
        info!("Dry run: commands go to an in-memory bus");
        drive(config, platform, MockBus::new(), cli.publish_status).await
    } else {
        let bus = FeetechActuatorBus::new(&config.port, config.baudrate, &config.motor_ids(platform));
        drive(config, platform, bus, cli.publish_status).await
    }
}

async fn drive<B: ActuatorBus>(
    config: TeleopConfig,
    platform: Platform,
    bus: B,
    publish_status: bool,
) -> Result<(), BoxError> {
    let mut control = ControlLoop::new(config, platform, bus)?;

    // Connect before touching the terminal so setup errors print normally
    control.start()?;

    if publish_status {
        if let Err(e) = spawn_status_publisher(control.subscribe()).await {
            control.stop();
            return Err(e);
        }
    }

    let (quit_tx, mut quit_rx) = watch::channel(false);
    let keyboard = match KeyboardListener::spawn(control.input_handle(), quit_tx) {
        Ok(keyboard) => keyboard,
        Err(e) => {
            control.stop();
            return Err(e.into());
        }
    };

    let shutdown = async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = quit_rx.wait_for(|&quit| quit) => {}
        }
    };

    let result = control.run(shutdown).await;
    drop(keyboard);

    let status = control.status();
    info!(
        "Teleop stopped after {} ticks ({:?}, safety {:?})",
        status.ticks, status.state, status.safety
    );
    result.map_err(Into::into)
}

async fn spawn_status_publisher(mut status: watch::Receiver<ControlStatus>) -> Result<(), BoxError> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_STATUS).await?;
    info!("Publishing status to: {}", TOPIC_STATUS);

    tokio::spawn(async move {
        // The session must outlive the publisher
        let _session = session;
        while status.changed().await.is_ok() {
            let snapshot = status.borrow_and_update().clone();
            match serde_json::to_string(&snapshot) {
                Ok(json) => {
                    if let Err(e) = publisher.put(json).await {
                        warn!("Failed to publish status: {}", e);
                    }
                }
                Err(e) => warn!("Failed to serialize status: {}", e),
            }
        }
    });

    Ok(())
}
