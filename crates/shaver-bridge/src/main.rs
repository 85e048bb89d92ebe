//! Shaver Bridge - keeps Philips shavers connected and publishes their state.
//!
//! Run with: `cargo run -p shaver-bridge`

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use shaver_bridge::{Bridge, Config, wait_until_live};
use shaver_core::{BleTransport, LightZone, Rgb, ShavingMode};

/// Shaver Bridge - BLE connection manager and entity publisher.
#[derive(Parser, Debug)]
#[command(name = "shaver-bridge")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect to every configured device and print entity state as JSON lines (default).
    Run,

    /// Set a light ring colour.
    SetColor {
        /// Device address or alias; optional with a single configured device.
        #[arg(short, long)]
        device: Option<String>,
        /// Zone: low, ok, high or motion.
        #[arg(long)]
        zone: LightZone,
        /// Colour as `#rrggbb` or `r,g,b`.
        #[arg(long)]
        rgb: Rgb,
    },

    /// Select the shaving mode.
    SetMode {
        /// Device address or alias; optional with a single configured device.
        #[arg(short, long)]
        device: Option<String>,
        /// One of sensitive, regular, intense, custom, foam.
        #[arg(long)]
        mode: ShavingMode,
    },

    /// Validate the configuration file and exit.
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("shaver_bridge=info".parse()?)
                .add_directive("shaver_core=info".parse()?),
        )
        .init();

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    match args.command {
        Some(Command::CheckConfig) => check_config(&config),
        Some(Command::SetColor { device, zone, rgb }) => {
            write(&config, device.as_deref(), Write::Color(zone, rgb)).await?;
            println!("Set {} colour to {}", zone, rgb);
            Ok(())
        }
        Some(Command::SetMode { device, mode }) => {
            write(&config, device.as_deref(), Write::Mode(mode)).await?;
            println!("Set shaving mode to {}", mode);
            Ok(())
        }
        Some(Command::Run) | None => run(&config).await,
    }
}

fn check_config(config: &Config) -> anyhow::Result<()> {
    let errors = config.validate();
    if errors.is_empty() {
        println!("Configuration OK ({} device(s))", config.devices.len());
        return Ok(());
    }
    for error in &errors {
        eprintln!("  - {}", error);
    }
    anyhow::bail!("configuration has {} error(s)", errors.len())
}

async fn connect(config: &Config) -> anyhow::Result<Bridge> {
    let transport = Arc::new(BleTransport::new().await?);
    Ok(Bridge::new(config, transport)?)
}

enum Write {
    Color(LightZone, Rgb),
    Mode(ShavingMode),
}

/// Start the chosen device, wait for its live session and run one write.
async fn write(config: &Config, device: Option<&str>, action: Write) -> anyhow::Result<()> {
    let bridge = connect(config).await?;
    let result = async {
        let target = bridge.device(device)?;
        let coordinator = &target.coordinator;
        coordinator.start().await;

        let limit = coordinator.options().connect_timeout * 2;
        info!("Waiting up to {:?} for a live session with {}", limit, target.config.address);
        wait_until_live(coordinator, limit).await?;
        match action {
            Write::Color(zone, rgb) => coordinator.set_light_color(zone, rgb).await?,
            Write::Mode(mode) => coordinator.set_shaving_mode(mode).await?,
        }
        anyhow::Ok(())
    }
    .await;
    bridge.shutdown().await;
    result
}

async fn run(config: &Config) -> anyhow::Result<()> {
    if config.devices.is_empty() {
        anyhow::bail!("no devices configured; add [[devices]] entries to the configuration file");
    }

    let bridge = connect(config).await?;
    bridge.start().await;
    let mut updates = bridge.publish().await;

    loop {
        tokio::select! {
            entities = updates.recv() => {
                let Some(entities) = entities else { break };
                println!("{}", serde_json::to_string(&entities)?);
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("Interrupted, shutting down");
                break;
            }
        }
    }

    bridge.shutdown().await;
    Ok(())
}
