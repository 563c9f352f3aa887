//! # Control loop
//!
//! One levitation control cycle: sense, update the controller under the parameter store lock,
//! then actuate. The periodic scheduling of cycles is left to the caller, which uses the returned
//! [`CycleOutcome`] to choose how long to sleep.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::time::Instant;
use log::{error, info, trace, warn};

// Internal
use crate::{
    fan::FanDriver,
    lev_ctrl::{InputData, StatusReport},
    param_store::ParamStore,
    sensor::DistanceSensor
};
use comms_if::tm::EvalResult;
use util::{module::State, session};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Session-relative path evaluation results are saved to, a timestamp is appended.
const EVAL_RESULT_PATH: &str = "evals/eval.json";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Owns the devices and runs control cycles against the shared controller state.
pub struct ControlLoop<S, F> {
    sensor: S,
    fan: F,
    store: ParamStore,

    /// Number of cycles executed so far
    num_cycles: u64,

    /// True during an object lost episode, so it is only reported once
    object_lost: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// What happened during one cycle.
#[derive(Debug, Clone, Copy)]
pub enum CycleOutcome {
    /// Normal control cycle, the fan was driven with the controller output
    Nominal(StatusReport),

    /// The object is out of range, the fan was stopped and the controller memory reset
    ObjectLost,

    /// The sensor could not be read, the fan was stopped. The caller should back off before the
    /// next cycle.
    SensorFailure,

    /// The controller rejected the reading, the fan was stopped
    ControllerFault,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<S, F> ControlLoop<S, F>
where
    S: DistanceSensor,
    F: FanDriver
{
    pub fn new(sensor: S, fan: F, store: ParamStore) -> Self {
        Self {
            sensor,
            fan,
            store,
            num_cycles: 0,
            object_lost: false,
        }
    }

    /// Execute a single control cycle at time `now`.
    pub fn cycle(&mut self, now: Instant) -> CycleOutcome {
        self.num_cycles += 1;

        // ---- SENSE ----

        // Outside the lock, the read may block for the driver's timeout
        let height_mm = match self.sensor.read_mm() {
            Ok(h) => h,
            Err(e) => {
                warn!("Sensor read failed, stopping fan: {}", e);
                self.stop_fan();
                return CycleOutcome::SensorFailure
            }
        };

        // ---- CONTROL ----

        let res = self.store.with(|lc| lc.proc(&InputData { height_mm, now }));

        let (output, report) = match res {
            Ok(o) => o,
            Err(e) => {
                error!("LevCtrl processing failed, stopping fan: {}", e);
                self.stop_fan();
                return CycleOutcome::ControllerFault
            }
        };

        if let Some(ref result) = report.eval_result {
            report_eval_result(result);
        }

        // ---- ACTUATE ----

        if let Err(e) = self.fan.set_speed(output.fan_speed) {
            warn!("Fan rejected speed {}: {}", output.fan_speed, e);
        }

        if report.object_lost {
            if !self.object_lost {
                warn!("Object not detected (height {} mm), fan stopped", height_mm);
                self.object_lost = true;
            }
            return CycleOutcome::ObjectLost
        }

        if self.object_lost {
            info!("Object detected again at {} mm", height_mm);
            self.object_lost = false;
        }

        trace!(
            "height = {:.1} mm, error = {:.2} mm, P = {:.4}, I = {:.4}, D = {:.4}, FF = {:.4}, \
            fan = {:.4}{}",
            height_mm,
            report.error_mm,
            report.p_term,
            report.i_term,
            report.d_term,
            report.ff_term,
            output.fan_speed,
            if report.saturated { " (saturated)" } else { "" }
        );

        CycleOutcome::Nominal(report)
    }

    /// Stop the fan, used whenever the control output cannot be trusted.
    pub fn stop_fan(&mut self) {
        if let Err(e) = self.fan.set_speed(0.0) {
            error!("Could not stop the fan: {}", e);
        }
    }

    /// Number of cycles executed so far.
    pub fn num_cycles(&self) -> u64 {
        self.num_cycles
    }

    pub fn store(&self) -> &ParamStore {
        &self.store
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn report_eval_result(result: &EvalResult) {
    info!("EVAL_RESULT:{:.4}", result.total_abs_error);
    match result.mean_abs_error() {
        Some(mean) => info!(
            "    {} cycles over {} ms, mean absolute error {:.4} mm",
            result.num_cycles, result.duration_ms, mean
        ),
        None => warn!("    No cycle was accumulated during the evaluation")
    }

    session::save_with_timestamp(EVAL_RESULT_PATH, *result);
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::{collections::VecDeque, sync::{Arc, Mutex}, time::Duration};
    use crate::{
        fan::FanError,
        lev_ctrl::{LevCtrl, test_params},
        sensor::SensorError
    };

    /// Sensor replaying a fixed list of readings, `None` being a read failure.
    struct MockSensor(VecDeque<Option<f64>>);

    impl DistanceSensor for MockSensor {
        fn read_mm(&mut self) -> Result<f64, SensorError> {
            match self.0.pop_front() {
                Some(Some(h)) => Ok(h),
                _ => Err(SensorError::InvalidReading("mock".into()))
            }
        }
    }

    /// Fan recording every accepted speed.
    #[derive(Clone, Default)]
    struct MockFan(Arc<Mutex<Vec<f64>>>);

    impl FanDriver for MockFan {
        fn set_speed(&mut self, fraction: f64) -> Result<(), FanError> {
            crate::fan::check_speed(fraction)?;
            self.0.lock().expect("Mock fan poisoned").push(fraction);
            Ok(())
        }
    }

    impl MockFan {
        fn speeds(&self) -> Vec<f64> {
            self.0.lock().expect("Mock fan poisoned").clone()
        }
    }

    fn control_loop(readings: &[Option<f64>]) -> (ControlLoop<MockSensor, MockFan>, MockFan) {
        let lc: LevCtrl = util::module::init_state(test_params())
            .expect("Valid parameters rejected");

        let fan = MockFan::default();
        let cl = ControlLoop::new(
            MockSensor(readings.iter().copied().collect()),
            fan.clone(),
            ParamStore::new(lc)
        );

        (cl, fan)
    }

    #[test]
    fn test_nominal_cycles() {
        let (mut cl, fan) = control_loop(&[Some(240.0), Some(245.0), Some(250.0)]);
        let now = Instant::now();

        for _ in 0..3 {
            assert!(matches!(cl.cycle(now), CycleOutcome::Nominal(_)));
        }

        let speeds = fan.speeds();
        assert_eq!(speeds.len(), 3);
        assert!(speeds.iter().all(|s| (0.0..=1.0).contains(s)));
        assert_eq!(cl.num_cycles(), 3);
        assert_eq!(cl.store().status().current_height_mm, Some(250.0));
    }

    #[test]
    fn test_sensor_failure() {
        let (mut cl, fan) = control_loop(&[Some(240.0), None, Some(240.0)]);
        let now = Instant::now();

        cl.cycle(now);
        let before = cl.store().status();

        // Fan stopped, state untouched
        assert!(matches!(cl.cycle(now), CycleOutcome::SensorFailure));
        assert_eq!(fan.speeds().last(), Some(&0.0));
        assert_eq!(cl.store().status(), before);

        // Recovers on the next good read
        assert!(matches!(cl.cycle(now), CycleOutcome::Nominal(_)));
        assert!(fan.speeds().last().map_or(false, |s| *s > 0.0));
    }

    #[test]
    fn test_object_lost() {
        let (mut cl, fan) = control_loop(&[Some(240.0), Some(8190.0), Some(8191.0), Some(240.0)]);
        let now = Instant::now();

        cl.cycle(now);
        assert!(matches!(cl.cycle(now), CycleOutcome::ObjectLost));
        assert!(matches!(cl.cycle(now), CycleOutcome::ObjectLost));

        let status = cl.store().status();
        assert_eq!(status.integral_error, 0.0);
        assert_eq!(status.previous_error, None);
        assert_eq!(&fan.speeds()[1..3], &[0.0, 0.0]);

        match cl.cycle(now) {
            CycleOutcome::Nominal(report) => assert_eq!(report.d_term, 0.0),
            other => panic!("Expected a nominal cycle, got {:?}", other)
        }
    }

    #[test]
    fn test_tuning_between_cycles() {
        let (mut cl, _fan) = control_loop(&[Some(240.0); 4]);
        let t0 = Instant::now();

        cl.store().with(|lc| lc.start_eval(100, t0));
        cl.cycle(t0);
        cl.cycle(t0 + Duration::from_millis(50));

        // Window closes on the first cycle past its deadline
        match cl.cycle(t0 + Duration::from_millis(100)) {
            CycleOutcome::Nominal(report) => {
                let result = report.eval_result.expect("Evaluation did not close");
                assert_eq!(result.total_abs_error, 20.0);
                assert_eq!(result.num_cycles, 2);
            },
            other => panic!("Expected a nominal cycle, got {:?}", other)
        }
        assert!(!cl.store().status().evaluating);
    }
}
