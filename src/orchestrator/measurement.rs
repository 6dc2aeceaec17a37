//! Measuring state: sample, batch and send

use crate::core::{Reading, STATUS_NOT_FOUND, STATUS_OK, STATUS_UNAUTHORIZED};
use crate::hardware::{LightSensor, PositioningDevice, SensorResult};
use crate::processing::ReadingBatcher;
use crate::session::{SendStatus, ServerSession};
use crate::transport::Transport;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// How a measurement cycle left the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Keep measuring
    Continue,
    /// Server reports the measurement is over
    Ended,
    /// Batch rejected or undeliverable
    Aborted,
    /// Shutdown requested
    Interrupted,
}

/// Measuring loop for one active measurement.
///
/// Borrows the session and devices for the duration of the measurement and
/// owns the batch of readings not yet accepted by the server.
pub struct MeasurementLoop<'a, T: Transport, P: PositioningDevice, L: LightSensor> {
    session: &'a mut ServerSession<T>,
    positioner: &'a mut P,
    light_sensor: &'a mut L,
    batcher: ReadingBatcher,
    in_flight: Option<Vec<Reading>>,
    min_batch_size: usize,
    sends: usize,
}

impl<'a, T: Transport, P: PositioningDevice, L: LightSensor> MeasurementLoop<'a, T, P, L> {
    /// Start measuring with a fresh response slot, so sends still in flight
    /// from an earlier measurement cannot affect this one.
    pub fn new(
        session: &'a mut ServerSession<T>,
        positioner: &'a mut P,
        light_sensor: &'a mut L,
        min_batch_size: usize,
    ) -> Self {
        session.renew_response_slot();
        Self {
            session,
            positioner,
            light_sensor,
            batcher: ReadingBatcher::new(),
            in_flight: None,
            min_batch_size,
            sends: 0,
        }
    }

    /// Run cycles until the measurement ends, fails or `shutdown` is raised
    pub fn run(&mut self, shutdown: &AtomicBool, interval: Duration) -> CycleOutcome {
        loop {
            if shutdown.load(Ordering::SeqCst) {
                info!(unsent = self.batcher.len(), "shutdown requested, leaving measurement");
                return CycleOutcome::Interrupted;
            }
            match self.step() {
                CycleOutcome::Continue => {
                    if !interval.is_zero() {
                        thread::sleep(interval);
                    }
                }
                outcome => return outcome,
            }
        }
    }

    /// One measurement cycle: take a reading, then act on the last send status
    pub fn step(&mut self) -> CycleOutcome {
        match self.sample() {
            Ok(reading) => self.batcher.append(reading),
            Err(e) => {
                warn!(error = %e, transient = e.is_transient(), "sensor read failed, retrying next cycle");
            }
        }

        let slot = self.session.response_slot().clone();
        match slot.load() {
            SendStatus::Completed(STATUS_OK) => {
                self.in_flight = None;
                if self.batcher.ready_to_flush(self.min_batch_size, slot.is_pending()) && slot.try_claim() {
                    return self.flush();
                }
                CycleOutcome::Continue
            }
            SendStatus::Pending => CycleOutcome::Continue,
            SendStatus::Completed(STATUS_UNAUTHORIZED) => {
                warn!("batch rejected as unauthorized, logging in again");
                if let Some(rejected) = self.in_flight.take() {
                    self.batcher.requeue(rejected);
                }
                match self.session.login() {
                    Ok(()) => {
                        slot.reset_ok();
                        CycleOutcome::Continue
                    }
                    Err(e) => {
                        error!(error = %e, "login failed during measurement");
                        CycleOutcome::Aborted
                    }
                }
            }
            SendStatus::Completed(STATUS_NOT_FOUND) => {
                info!(sent_batches = self.sends, "measurement ended");
                CycleOutcome::Ended
            }
            SendStatus::Completed(status) => {
                error!(status, "batch rejected, aborting measurement");
                CycleOutcome::Aborted
            }
            SendStatus::TransportFailed => {
                error!("batch could not be delivered, aborting measurement");
                CycleOutcome::Aborted
            }
        }
    }

    fn sample(&mut self) -> SensorResult<Reading> {
        let position = self.positioner.measure()?;
        let lux = self.light_sensor.measure()?;
        Ok(Reading::new(lux, position))
    }

    /// Send every accumulated reading. The slot must already be claimed.
    fn flush(&mut self) -> CycleOutcome {
        let batch = self.batcher.drain_all();
        let body = match serde_json::to_string(&batch) {
            Ok(body) => body,
            Err(e) => {
                error!(error = %e, "failed to serialize readings");
                self.batcher.requeue(batch);
                self.session.response_slot().reset_ok();
                return CycleOutcome::Aborted;
            }
        };

        debug!(count = batch.len(), payload = %body, "sending batch");
        match self.session.send_batch(body) {
            Ok(_handle) => {
                self.in_flight = Some(batch);
                self.sends += 1;
                CycleOutcome::Continue
            }
            Err(e) => {
                error!(error = %e, "failed to start batch send");
                self.batcher.requeue(batch);
                self.session.response_slot().reset_ok();
                CycleOutcome::Aborted
            }
        }
    }

    /// Batches handed to the transport so far
    pub fn sends(&self) -> usize {
        self.sends
    }

    /// Readings waiting for the next send
    pub fn buffered(&self) -> usize {
        self.batcher.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Anchor, Position};
    use crate::hardware::{LightSensorConfig, SimulatedLightSensor, SimulatedPositioner};
    use crate::transport::{MockReply, MockTransport};
    use crate::utils::Credentials;
    use serde_json::Value;

    const READINGS_URL: &str = "http://flux/measurements/active/readings";

    fn connected_session(transport: &MockTransport) -> ServerSession<MockTransport> {
        transport.script_get("http://flux", [MockReply::status(200)]);
        let mut session = ServerSession::new(
            transport.clone(),
            Credentials::default(),
            Duration::from_millis(1),
        );
        assert!(session.discover_server(&["http://flux".to_string()], Duration::from_millis(50)));
        session
    }

    fn devices() -> (SimulatedPositioner, SimulatedLightSensor) {
        let anchors = [
            Anchor::new(0x6e4e, Position::new(-100.0, 100.0, 1150.0)),
            Anchor::new(0x6964, Position::new(8450.0, 1200.0, 2150.0)),
            Anchor::new(0x6e5f, Position::new(1250.0, 12000.0, 1150.0)),
            Anchor::new(0x6e62, Position::new(7350.0, 11660.0, 1590.0)),
        ];
        let mut positioner = SimulatedPositioner::new(Position::new(1000.0, 2000.0, 1000.0));
        positioner.initialize(&anchors).unwrap();
        let mut light = SimulatedLightSensor::new(300.0);
        light.initialize(&LightSensorConfig::default()).unwrap();
        (positioner, light)
    }

    fn posted_batch_sizes(transport: &MockTransport) -> Vec<usize> {
        transport
            .requests()
            .iter()
            .filter(|request| request.method == "POST")
            .map(|request| {
                let body: Value = serde_json::from_str(request.body.as_deref().unwrap()).unwrap();
                body.as_array().unwrap().len()
            })
            .collect()
    }

    #[test]
    fn test_send_waits_for_pending_slot() {
        let transport = MockTransport::new();
        transport.script_post(READINGS_URL, [MockReply::status(200)]);
        let mut session = connected_session(&transport);
        let slot = session.response_slot().clone();
        let (mut positioner, mut light) = devices();

        let mut measurement = MeasurementLoop::new(&mut session, &mut positioner, &mut light, 3);
        slot.store(SendStatus::Pending);
        assert_eq!(measurement.step(), CycleOutcome::Continue);
        assert_eq!(measurement.step(), CycleOutcome::Continue);
        assert_eq!(transport.post_count(), 0);

        slot.reset_ok();
        assert_eq!(measurement.step(), CycleOutcome::Continue);
        assert_eq!(measurement.sends(), 1);
        assert_eq!(posted_batch_sizes(&transport), vec![3]);
        assert_eq!(measurement.buffered(), 0);
    }

    #[test]
    fn test_no_send_below_min_batch_size() {
        let transport = MockTransport::new();
        transport.script_post(READINGS_URL, [MockReply::status(200)]);
        let mut session = connected_session(&transport);
        let (mut positioner, mut light) = devices();

        let mut measurement = MeasurementLoop::new(&mut session, &mut positioner, &mut light, 3);
        for _ in 0..2 {
            assert_eq!(measurement.step(), CycleOutcome::Continue);
        }
        assert_eq!(transport.post_count(), 0);
        assert_eq!(measurement.buffered(), 2);
    }

    #[test]
    fn test_not_found_ends_measurement() {
        let transport = MockTransport::new();
        transport.script_post(READINGS_URL, [MockReply::status(404)]);
        let mut session = connected_session(&transport);
        let (mut positioner, mut light) = devices();

        let mut measurement = MeasurementLoop::new(&mut session, &mut positioner, &mut light, 1);
        assert_eq!(measurement.step(), CycleOutcome::Continue);
        assert_eq!(measurement.step(), CycleOutcome::Ended);
        assert_eq!(transport.post_count(), 1);
    }

    #[test]
    fn test_unauthorized_logs_in_once_and_continues() {
        let transport = MockTransport::new();
        transport.script_post(READINGS_URL, [MockReply::status(401), MockReply::status(200)]);
        transport.script_get("http://flux/login", [MockReply::body(200, "renewed")]);
        let mut session = connected_session(&transport);
        let (mut positioner, mut light) = devices();

        {
            let mut measurement = MeasurementLoop::new(&mut session, &mut positioner, &mut light, 1);
            assert_eq!(measurement.step(), CycleOutcome::Continue);
            assert_eq!(measurement.step(), CycleOutcome::Continue);
            assert_eq!(transport.count("GET", "http://flux/login"), 1);

            assert_eq!(measurement.step(), CycleOutcome::Continue);
            assert_eq!(measurement.step(), CycleOutcome::Continue);
        }

        assert_eq!(transport.count("GET", "http://flux/login"), 1);
        assert_eq!(session.auth_token(), Some("renewed"));
        // rejected reading goes out again in front of the two taken since
        assert_eq!(posted_batch_sizes(&transport), vec![1, 3, 1]);
    }

    #[test]
    fn test_unauthorized_with_failed_login_aborts() {
        let transport = MockTransport::new();
        transport.script_post(READINGS_URL, [MockReply::status(401)]);
        transport.script_get("http://flux/login", [MockReply::status(401)]);
        let mut session = connected_session(&transport);
        let (mut positioner, mut light) = devices();

        let mut measurement = MeasurementLoop::new(&mut session, &mut positioner, &mut light, 1);
        assert_eq!(measurement.step(), CycleOutcome::Continue);
        assert_eq!(measurement.step(), CycleOutcome::Aborted);
    }

    #[test]
    fn test_other_status_aborts() {
        let transport = MockTransport::new();
        transport.script_post(READINGS_URL, [MockReply::status(500)]);
        let mut session = connected_session(&transport);
        let (mut positioner, mut light) = devices();

        let mut measurement = MeasurementLoop::new(&mut session, &mut positioner, &mut light, 1);
        assert_eq!(measurement.step(), CycleOutcome::Continue);
        assert_eq!(measurement.step(), CycleOutcome::Aborted);
    }

    #[test]
    fn test_transport_failure_aborts() {
        let transport = MockTransport::new();
        let mut session = connected_session(&transport);
        let (mut positioner, mut light) = devices();

        let mut measurement = MeasurementLoop::new(&mut session, &mut positioner, &mut light, 1);
        assert_eq!(measurement.step(), CycleOutcome::Continue);
        assert_eq!(measurement.step(), CycleOutcome::Aborted);
    }

    #[test]
    fn test_transient_sensor_fault_is_retried() {
        let transport = MockTransport::new();
        transport.script_post(READINGS_URL, [MockReply::status(200)]);
        let mut session = connected_session(&transport);
        let (mut positioner, mut light) = devices();
        positioner.fail_next(1);
        light.fail_next(1);

        let mut measurement = MeasurementLoop::new(&mut session, &mut positioner, &mut light, 2);
        assert_eq!(measurement.step(), CycleOutcome::Continue);
        assert_eq!(measurement.step(), CycleOutcome::Continue);
        assert_eq!(measurement.buffered(), 0);

        assert_eq!(measurement.step(), CycleOutcome::Continue);
        assert_eq!(measurement.step(), CycleOutcome::Continue);
        assert_eq!(posted_batch_sizes(&transport), vec![2]);
        assert_eq!(positioner.measurement_count(), 3);
    }

    #[test]
    fn test_uninitialized_sensor_is_retried() {
        let transport = MockTransport::new();
        transport.script_post(READINGS_URL, [MockReply::status(200)]);
        let mut session = connected_session(&transport);
        let (mut positioner, _) = devices();
        let mut light = SimulatedLightSensor::new(300.0);

        let mut measurement = MeasurementLoop::new(&mut session, &mut positioner, &mut light, 1);
        for _ in 0..3 {
            assert_eq!(measurement.step(), CycleOutcome::Continue);
        }
        assert_eq!(measurement.buffered(), 0);
        assert_eq!(transport.post_count(), 0);
    }

    #[test]
    fn test_sensor_error_keeps_checking_send_status() {
        let transport = MockTransport::new();
        transport.script_post(READINGS_URL, [MockReply::status(404)]);
        let mut session = connected_session(&transport);
        let (mut positioner, mut light) = devices();
        light.fail_next(1);

        let mut measurement = MeasurementLoop::new(&mut session, &mut positioner, &mut light, 1);
        let slot = measurement.session.response_slot().clone();
        slot.store(SendStatus::Completed(404));
        assert_eq!(measurement.step(), CycleOutcome::Ended);
    }

    #[test]
    fn test_late_completion_cannot_release_second_send() {
        let transport = MockTransport::new();
        transport.script_post(READINGS_URL, [MockReply::status(200)]);
        transport.defer_completions(true);
        let mut session = connected_session(&transport);
        let (mut positioner, mut light) = devices();

        let mut first = MeasurementLoop::new(&mut session, &mut positioner, &mut light, 1);
        assert_eq!(first.step(), CycleOutcome::Continue);
        assert_eq!(transport.post_count(), 1);
        drop(first);

        let mut second = MeasurementLoop::new(&mut session, &mut positioner, &mut light, 1);
        assert_eq!(second.step(), CycleOutcome::Continue);
        assert_eq!(transport.post_count(), 2);

        // completion of the send from the earlier measurement
        assert!(transport.complete_next());
        assert_eq!(second.step(), CycleOutcome::Continue);
        assert_eq!(second.step(), CycleOutcome::Continue);
        assert_eq!(transport.post_count(), 2);

        assert!(transport.complete_next());
        assert_eq!(second.step(), CycleOutcome::Continue);
        assert_eq!(transport.post_count(), 3);
    }

    #[test]
    fn test_new_loop_discards_stale_status() {
        let transport = MockTransport::new();
        let mut session = connected_session(&transport);
        let stale = session.response_slot().clone();
        stale.store(SendStatus::Completed(404));
        let (mut positioner, mut light) = devices();

        let measurement = MeasurementLoop::new(&mut session, &mut positioner, &mut light, 3);
        assert_eq!(measurement.sends(), 0);
        drop(measurement);
        assert_eq!(session.response_slot().load(), SendStatus::Completed(200));

        stale.store(SendStatus::Completed(500));
        assert_eq!(session.response_slot().load(), SendStatus::Completed(200));
    }

    #[test]
    fn test_run_stops_on_shutdown() {
        let transport = MockTransport::new();
        let mut session = connected_session(&transport);
        let (mut positioner, mut light) = devices();
        let shutdown = AtomicBool::new(true);

        let mut measurement = MeasurementLoop::new(&mut session, &mut positioner, &mut light, 1);
        assert_eq!(measurement.run(&shutdown, Duration::ZERO), CycleOutcome::Interrupted);
        assert_eq!(transport.post_count(), 0);
    }

    #[test]
    fn test_run_until_measurement_ends() {
        let transport = MockTransport::new();
        transport.script_post(
            READINGS_URL,
            [MockReply::status(200), MockReply::status(200), MockReply::status(404)],
        );
        let mut session = connected_session(&transport);
        let (mut positioner, mut light) = devices();
        let shutdown = AtomicBool::new(false);

        let mut measurement = MeasurementLoop::new(&mut session, &mut positioner, &mut light, 2);
        assert_eq!(measurement.run(&shutdown, Duration::ZERO), CycleOutcome::Ended);
        assert_eq!(posted_batch_sizes(&transport), vec![2, 2, 2]);
    }
}
