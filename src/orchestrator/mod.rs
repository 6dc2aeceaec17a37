//! Acquisition state machine
//!
//! Drives the node through server discovery, waiting for a measurement,
//! logging in, configuring the sensors and measuring. Every failure leads
//! back to discovery; the orchestrator itself never gives up.

pub mod measurement;

pub use measurement::{CycleOutcome, MeasurementLoop};

use crate::core::{ACTIVE_MEASUREMENT_ROUTE, STATUS_OK};
use crate::hardware::{LightSensor, LightSensorConfig, PositioningDevice, SensorError};
use crate::processing::{parse_active_measurement, ActiveMeasurement, ParseError};
use crate::session::{ServerSession, SessionError, SessionResult};
use crate::transport::Transport;
use crate::utils::Config;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

/// Phase of the acquisition cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionState {
    Standby,
    DiscoveringServer,
    AwaitingMeasurement,
    LoggingIn,
    InitializingSensors,
    Measuring,
}

impl fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AcquisitionState::Standby => "standby",
            AcquisitionState::DiscoveringServer => "discovering server",
            AcquisitionState::AwaitingMeasurement => "awaiting measurement",
            AcquisitionState::LoggingIn => "logging in",
            AcquisitionState::InitializingSensors => "initializing sensors",
            AcquisitionState::Measuring => "measuring",
        };
        f.write_str(name)
    }
}

/// Sensor setup failure for an active measurement
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InitializationError {
    #[error("invalid measurement payload: {0}")]
    Payload(#[from] ParseError),
    #[error("sensor setup failed: {0}")]
    Sensor(#[from] SensorError),
}

/// How one pass through the acquisition cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// No candidate server became ready
    NoServer,
    /// Server stopped answering while waiting for a measurement
    NoActiveMeasurement,
    /// Login or measurement fetch failed
    LoginFailed,
    /// Measurement payload or sensor setup was rejected
    InitializationFailed,
    /// Server closed the measurement
    MeasurementEnded,
    /// Measuring stopped on an error
    MeasurementAborted,
    /// Shutdown flag raised
    Shutdown,
}

/// Parameters of the acquisition cycle
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    pub server_urls: Vec<String>,
    /// Time each candidate server gets to report ready
    pub discovery_timeout: Duration,
    /// Pause before returning to discovery after a failure
    pub retry_delay: Duration,
    pub min_batch_size: usize,
    /// Pause between measurement cycles
    pub cycle_interval: Duration,
    pub light_sensor: LightSensorConfig,
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            server_urls: config.server_urls().to_vec(),
            discovery_timeout: config.timeout(),
            retry_delay: config.connection.retry_delay(),
            min_batch_size: config.measurement.min_batch_size,
            cycle_interval: config.measurement.cycle_interval(),
            light_sensor: config.light_sensor.clone(),
        }
    }
}

/// Owns the session and sensors and runs the acquisition cycle
pub struct AcquisitionOrchestrator<T: Transport, P: PositioningDevice, L: LightSensor> {
    session: ServerSession<T>,
    positioner: P,
    light_sensor: L,
    settings: OrchestratorSettings,
    state: AcquisitionState,
    shutdown: Arc<AtomicBool>,
}

impl<T: Transport, P: PositioningDevice, L: LightSensor> AcquisitionOrchestrator<T, P, L> {
    pub fn new(session: ServerSession<T>, positioner: P, light_sensor: L, settings: OrchestratorSettings) -> Self {
        Self {
            session,
            positioner,
            light_sensor,
            settings,
            state: AcquisitionState::Standby,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that stops [`AcquisitionOrchestrator::run`] between cycles
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    pub fn session(&self) -> &ServerSession<T> {
        &self.session
    }

    pub fn positioner(&self) -> &P {
        &self.positioner
    }

    pub fn light_sensor(&self) -> &L {
        &self.light_sensor
    }

    /// Repeat the acquisition cycle until shutdown is requested
    pub fn run(&mut self) {
        info!(servers = ?self.settings.server_urls, "starting acquisition");
        while !self.shutdown.load(Ordering::SeqCst) {
            let outcome = self.run_cycle();
            info!(?outcome, "acquisition cycle finished");
            if outcome == SessionOutcome::Shutdown {
                break;
            }
        }
        info!("acquisition stopped");
    }

    /// One pass from discovery back to standby
    pub fn run_cycle(&mut self) -> SessionOutcome {
        self.transition(AcquisitionState::DiscoveringServer);
        if !self
            .session
            .discover_server(&self.settings.server_urls, self.settings.discovery_timeout)
        {
            warn!("no Flux server reachable, retrying discovery");
            self.transition(AcquisitionState::Standby);
            return SessionOutcome::NoServer;
        }

        self.transition(AcquisitionState::AwaitingMeasurement);
        if !self.session.await_active_measurement() {
            self.back_off();
            return SessionOutcome::NoActiveMeasurement;
        }

        self.transition(AcquisitionState::LoggingIn);
        let body = match self.login_and_fetch() {
            Ok(body) => body,
            Err(e) => {
                error!(error = %e, "could not retrieve the active measurement");
                self.back_off();
                return SessionOutcome::LoginFailed;
            }
        };

        self.transition(AcquisitionState::InitializingSensors);
        match self.initialize_sensors(&body) {
            Ok(measurement) => {
                info!(
                    name = measurement.name.as_deref().unwrap_or("unnamed"),
                    anchors = measurement.anchors.len(),
                    "sensors initialized"
                );
            }
            Err(e) => {
                error!(error = %e, "sensor initialization failed");
                self.positioner.clear();
                self.back_off();
                return SessionOutcome::InitializationFailed;
            }
        }

        self.transition(AcquisitionState::Measuring);
        let outcome = MeasurementLoop::new(
            &mut self.session,
            &mut self.positioner,
            &mut self.light_sensor,
            self.settings.min_batch_size,
        )
        .run(&self.shutdown, self.settings.cycle_interval);
        self.positioner.clear();

        match outcome {
            CycleOutcome::Ended => {
                self.transition(AcquisitionState::Standby);
                SessionOutcome::MeasurementEnded
            }
            CycleOutcome::Interrupted => {
                self.transition(AcquisitionState::Standby);
                SessionOutcome::Shutdown
            }
            CycleOutcome::Aborted | CycleOutcome::Continue => {
                self.back_off();
                SessionOutcome::MeasurementAborted
            }
        }
    }

    /// Log in and download the active measurement. Anything but 200 is an error.
    fn login_and_fetch(&mut self) -> SessionResult<String> {
        self.session.login()?;
        let response = self.session.fetch_active_measurement()?;
        if response.status != STATUS_OK {
            return Err(SessionError::UnexpectedStatus {
                url: self.session.route_url(ACTIVE_MEASUREMENT_ROUTE)?,
                status: response.status,
            });
        }
        Ok(response.body)
    }

    /// Configure both sensors for the measurement in `body`.
    /// The payload is fully parsed before either driver is touched.
    fn initialize_sensors(&mut self, body: &str) -> Result<ActiveMeasurement, InitializationError> {
        self.positioner.clear();
        let measurement = parse_active_measurement(body)?;
        for anchor in &measurement.anchors {
            info!(%anchor, "anchor");
        }
        self.positioner.initialize(&measurement.anchors)?;
        self.light_sensor.initialize(&self.settings.light_sensor)?;
        Ok(measurement)
    }

    fn back_off(&mut self) {
        self.transition(AcquisitionState::Standby);
        info!(delay = ?self.settings.retry_delay, "retrying later");
        thread::sleep(self.settings.retry_delay);
    }

    fn transition(&mut self, next: AcquisitionState) {
        if self.state != next {
            info!(from = %self.state, to = %next, "state change");
            self.state = next;
        }
    }
}
