use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use growbox_sensors::units::moisture_from_raw;
use growbox_sensors::{DeviceTemperatureReader, SensorDriver};

use growbox_controller::acquisition::AcquisitionLoop;
use growbox_controller::actuator::{self, Actuator};
use growbox_controller::config::{self, Settings};
use growbox_controller::db::Db;
use growbox_controller::irrigation::IrrigationLoop;
use growbox_controller::lighting::LightLoop;
use growbox_controller::shutdown::{self, StopCause};
use growbox_controller::status::{ActuatorKind, RelayState, StatusChannel};

/// How long the loops get to wind down before they are aborted.
const LOOP_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Grow box sensor logger and relay controller.
#[derive(Parser, Debug)]
#[command(name = "growbox", version)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(short, long, env = "GROWBOX_CONFIG", default_value = "config.toml")]
    config: String,

    /// Overrides `database_url` from the config file.
    #[arg(long, env = "GROWBOX_DB_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Command {
    /// Run the light, irrigation and acquisition loops (default).
    #[default]
    Run,
    /// Read every sensor once and log the values. Relays are not touched.
    Probe,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut settings = config::load(&cli.config)?;
    if let Some(url) = cli.database_url {
        settings.database_url = url;
    }

    let bus = growbox_sensors::bus::open(settings.i2c_bus, &settings.driver)
        .with_context(|| format!("failed to open i2c bus {}", settings.i2c_bus))?;
    let driver = SensorDriver::new(bus, settings.driver);

    match cli.command.unwrap_or_default() {
        Command::Run => run(settings, driver).await,
        Command::Probe => probe(&settings, &driver).await,
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

async fn run(settings: Settings, driver: SensorDriver) -> Result<()> {
    // ── Database ────────────────────────────────────────────────────
    let db = Db::connect(&settings.database_url).await?;
    db.migrate().await?;
    let status = StatusChannel::with_mirror(db.clone());

    // ── Relays (driven off on construction) ─────────────────────────
    let relays = settings.relays;
    let light = Arc::new(Actuator::new(
        ActuatorKind::Light,
        actuator::open_line(relays.light_gpio, relays.active_low)
            .with_context(|| format!("failed to claim light relay gpio {}", relays.light_gpio))?,
        relays.active_low,
    ));
    let pump = Arc::new(Actuator::new(
        ActuatorKind::Pump,
        actuator::open_line(relays.pump_gpio, relays.active_low)
            .with_context(|| format!("failed to claim pump relay gpio {}", relays.pump_gpio))?,
        relays.active_low,
    ));
    for kind in ActuatorKind::ALL {
        status.publish(kind, RelayState::Off).await;
    }

    // ── Loops ───────────────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut loops = JoinSet::new();

    loops.spawn(
        LightLoop::new(
            Arc::clone(&light),
            status.clone(),
            &settings.light,
            settings.timezone,
        )
        .run(shutdown_rx.clone()),
    );
    loops.spawn(
        IrrigationLoop::new(
            driver.clone(),
            settings.adc_channel,
            Arc::clone(&pump),
            status.clone(),
            &settings.irrigation,
            settings.timezone,
        )
        .run(shutdown_rx.clone()),
    );
    loops.spawn(
        AcquisitionLoop::new(
            driver,
            settings.adc_channel,
            db.clone(),
            &settings.acquisition,
            settings.timezone,
        )
        .run(shutdown_rx),
    );

    info!(
        light_gpio = relays.light_gpio,
        pump_gpio = relays.pump_gpio,
        active_low = relays.active_low,
        "growbox running"
    );

    // ── Shutdown ────────────────────────────────────────────────────
    let cause = shutdown::wait_for_stop(&mut loops, shutdown::signal()).await;
    let _ = shutdown_tx.send(true);

    let drained = tokio::time::timeout(LOOP_STOP_TIMEOUT, async {
        while let Some(res) = loops.join_next().await {
            if let Err(e) = res {
                error!(error = %e, "loop task ended abnormally");
            }
        }
    })
    .await;
    if drained.is_err() {
        warn!(
            timeout_sec = LOOP_STOP_TIMEOUT.as_secs(),
            "loops did not stop in time, aborting"
        );
        loops.abort_all();
        while loops.join_next().await.is_some() {}
    }

    // Fail-safe: every relay off, whatever the loops left behind.
    for relay in [&light, &pump] {
        relay.force_off();
        status.publish(relay.kind(), RelayState::Off).await;
    }
    db.pool().close().await;

    if cause == StopCause::LoopEnded {
        bail!("a control loop ended unexpectedly, relays forced off");
    }
    info!("shutdown complete");
    Ok(())
}

// ---------------------------------------------------------------------------
// probe
// ---------------------------------------------------------------------------

async fn probe(settings: &Settings, driver: &SensorDriver) -> Result<()> {
    info!("probing sensors (relays untouched)");
    let channel = settings.adc_channel;

    match driver.read_moisture_raw(channel).await {
        Ok(raw) => info!(
            channel,
            raw,
            moisture = moisture_from_raw(raw, settings.driver.calibration),
            raw_dry = settings.driver.calibration.dry,
            raw_wet = settings.driver.calibration.wet,
            "soil moisture"
        ),
        Err(e) => warn!(channel, error = %e, "soil moisture read failed"),
    }

    match driver.read_climate().await {
        Ok(c) => info!(temperature = c.temperature, humidity = c.humidity, "climate"),
        Err(e) => warn!(error = %e, "climate read failed"),
    }

    match driver.read_lux().await {
        Ok(lux) => info!(lux, "ambient light"),
        Err(e) => warn!(error = %e, "ambient light read failed"),
    }

    let device_temp =
        DeviceTemperatureReader::new(settings.acquisition.device_temperature_path.clone());
    match device_temp.read().await {
        Ok(t) => info!(device_temperature = t, "device temperature"),
        Err(e) => warn!(error = %e, "device temperature read failed"),
    }

    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================
