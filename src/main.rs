//! flux-sensors: light and position acquisition node for the Flux server
//!
//! Discovers a Flux server, waits for it to start a measurement and streams
//! readings until the measurement ends, forever.

use clap::Parser;
use tracing::info;

use flux_sensors::utils::config::DEFAULT_CONFIG_PATH;
use flux_sensors::{
    AcquisitionOrchestrator, Config, HttpTransport, OrchestratorSettings, ServerSession, SimulatedLightSensor,
    SimulatedPositioner,
};

#[derive(Parser)]
#[command(name = "flux-sensors")]
#[command(about = "Streams positioned light readings to a Flux server")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Server base URL to probe (repeatable, replaces the configured list)
    #[arg(long = "server-url")]
    server_urls: Vec<String>,

    /// Login username (overrides config file)
    #[arg(long, env = "FLUX_USERNAME")]
    username: Option<String>,

    /// Login password (overrides config file)
    #[arg(long, env = "FLUX_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Log level for this crate when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("flux_sensors={}", cli.log_level).parse()?),
        )
        .init();

    info!("Starting flux-sensors");
    info!("Config file: {}", cli.config);

    let mut config = Config::load_or_default(&cli.config);

    // Apply CLI overrides
    if !cli.server_urls.is_empty() {
        config.server_urls = cli.server_urls;
    }
    if let Some(username) = cli.username {
        config.credentials.username = username;
    }
    if let Some(password) = cli.password {
        config.credentials.password = password;
    }
    config.validate()?;

    for (index, url) in config.server_urls().iter().enumerate() {
        info!("Server URL {}: {}", index + 1, url);
    }
    info!("Username: {}", config.credentials().username);

    let transport = HttpTransport::new(config.connection.request_timeout())?;
    let session = ServerSession::new(transport, config.credentials().clone(), config.connection.poll_step());

    let simulation = &config.simulation;
    let mut positioner = SimulatedPositioner::new(simulation.position).with_jitter(simulation.position_jitter);
    positioner.simulate_errors(simulation.fault_probability);
    let light_sensor = SimulatedLightSensor::new(simulation.lux).with_jitter(simulation.lux_jitter);

    let mut orchestrator = AcquisitionOrchestrator::new(
        session,
        positioner,
        light_sensor,
        OrchestratorSettings::from_config(&config),
    );
    orchestrator.run();

    Ok(())
}
