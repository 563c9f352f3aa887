//! Implementations for the LevCtrl state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::time::{Duration, Instant};
use chrono::Utc;
use log::{debug, info};
use serde::Serialize;

// Internal
use super::{Params, LevCtrlInitError, LevCtrlError};
use crate::gain_sched::{Gains, FeedforwardProfile, ScheduleTables, ScheduleError};
use comms_if::{
    tc::TuneSet,
    tm::{LevStatus, FfEntry, EvalResult}
};
use util::module::State;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Levitation control module state.
///
/// This is the single owner of every value shared between the control loop and the tuning
/// interface. It is not synchronised itself, see [`crate::param_store::ParamStore`].
#[derive(Debug, Default)]
pub struct LevCtrl {
    pub(crate) params: Params,

    tables: ScheduleTables,

    initialised: bool,

    current_height_mm: Option<f64>,
    object_detected: bool,

    target_height_mm: f64,
    ramped_height_mm: f64,

    gains: Gains,
    manual_gains: bool,

    integral_error: f64,

    /// `None` means the derivative term is suppressed on the next cycle.
    previous_error: Option<f64>,

    fan_speed: f64,

    // ---- EVALUATION ----

    evaluating: bool,
    total_abs_error: f64,
    eval_cycles: u64,
    eval_deadline: Option<Instant>,
    eval_duration_ms: u64,
}

/// Input data to levitation control.
#[derive(Debug, Clone, Copy)]
pub struct InputData {
    /// Latest sensor reading.
    ///
    /// Units: millimeters
    pub height_mm: f64,

    /// Time at which the reading was taken, used for evaluation deadlines.
    pub now: Instant,
}

/// Output command that must be sent to the fan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct OutputData {
    /// Fan speed fraction, always in [0, 1]
    pub fan_speed: f64,
}

/// Status report for LevCtrl processing.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StatusReport {
    /// The reading was above the object lost ceiling, the rest of the cycle was skipped.
    pub object_lost: bool,

    /// The output was clamped into [0, 1] and the integral accumulation undone.
    pub saturated: bool,

    /// The ramped height moved and the gains were looked up again.
    pub rescheduled: bool,

    pub error_mm: f64,
    pub p_term: f64,
    pub i_term: f64,
    pub d_term: f64,
    pub ff_term: f64,

    /// Set on the cycle an evaluation window closes.
    pub eval_result: Option<EvalResult>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl State for LevCtrl {
    type InitData = Params;
    type InitError = LevCtrlInitError;

    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = LevCtrlError;

    /// Initialise the LevCtrl module from its parameters.
    fn init(&mut self, init_data: Self::InitData) -> Result<(), Self::InitError> {
        init_data.validate()?;

        self.tables = ScheduleTables::new(
            init_data.gain_schedule.clone(),
            init_data.feedforward.clone()
        )?;

        self.params = init_data;

        self.target_height_mm = self.params.initial_target_height_mm
            .max(self.params.min_target_height_mm);
        self.ramped_height_mm = self.target_height_mm;
        self.reschedule();

        self.current_height_mm = None;
        self.object_detected = false;
        self.integral_error = 0.0;
        self.previous_error = None;
        self.fan_speed = 0.0;
        self.evaluating = false;
        self.total_abs_error = 0.0;
        self.eval_cycles = 0;
        self.eval_deadline = None;

        self.initialised = true;

        Ok(())
    }

    /// Perform one control cycle on a new sensor reading.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    {
        if !self.initialised {
            return Err(LevCtrlError::NotInitialised)
        }

        let height_mm = input_data.height_mm;
        if !height_mm.is_finite() {
            return Err(LevCtrlError::InvalidHeight(height_mm))
        }

        let mut report = StatusReport::default();

        // The window closes on the first cycle at or after its deadline, object lost or not
        report.eval_result = self.check_eval_deadline(input_data.now);

        self.current_height_mm = Some(height_mm);

        // Range check
        if height_mm > self.params.object_lost_height_mm {
            self.object_detected = false;
            self.integral_error = 0.0;
            self.previous_error = None;
            self.fan_speed = 0.0;

            report.object_lost = true;

            return Ok((OutputData { fan_speed: 0.0 }, report))
        }
        self.object_detected = true;

        // Setpoint ramp
        report.rescheduled = self.ramp_setpoint();

        // Error terms
        let error = self.ramped_height_mm - height_mm;
        if self.evaluating {
            self.total_abs_error += error.abs();
            self.eval_cycles += 1;
        }

        let integral_before = self.integral_error;
        self.integral_error += error;

        let derivative = match self.previous_error {
            Some(prev) => error - prev,
            None => 0.0
        };

        // Output
        report.error_mm = error;
        report.p_term = self.gains.kp * error;
        report.i_term = self.gains.ki * self.integral_error;
        report.d_term = self.gains.kd * derivative;
        report.ff_term = match self.params.feedforward_enabled {
            true => self.tables.feedforward_at(self.ramped_height_mm),
            false => 0.0
        };

        let output = report.p_term + report.i_term + report.d_term + report.ff_term;

        // Anti-windup
        let fan_speed = if output.is_nan() {
            0.0
        }
        else {
            output.max(0.0).min(1.0)
        };

        if fan_speed != output {
            self.integral_error = integral_before;
            report.saturated = true;
        }

        self.previous_error = Some(error);
        self.fan_speed = fan_speed;

        Ok((OutputData { fan_speed }, report))
    }
}

impl LevCtrl {

    // ---- TUNING ----

    /// Atomic snapshot of the controller state.
    pub fn status(&self) -> LevStatus {
        LevStatus {
            current_height_mm: self.current_height_mm,
            object_detected: self.object_detected,
            target_height_mm: self.target_height_mm,
            ramped_height_mm: self.ramped_height_mm,
            kp: self.gains.kp,
            ki: self.gains.ki,
            kd: self.gains.kd,
            manual_gains: self.manual_gains,
            integral_error: self.integral_error,
            previous_error: self.previous_error,
            feedforward_speed: self.tables.feedforward_at(self.ramped_height_mm),
            fan_speed: self.fan_speed,
            evaluating: self.evaluating,
            total_abs_error: self.total_abs_error,
        }
    }

    /// Manually override any subset of the gains.
    ///
    /// The override holds until the ramped height next changes.
    pub fn set_gains(&mut self, kp: Option<f64>, ki: Option<f64>, kd: Option<f64>) {
        if kp.is_none() && ki.is_none() && kd.is_none() {
            return
        }

        if let Some(kp) = kp {
            self.gains.kp = kp;
        }
        if let Some(ki) = ki {
            self.gains.ki = ki;
        }
        if let Some(kd) = kd {
            self.gains.kd = kd;
        }

        self.manual_gains = true;

        debug!(
            "Manual gains set: kp = {}, ki = {}, kd = {}",
            self.gains.kp, self.gains.ki, self.gains.kd
        );
    }

    /// Set the target height, raised to the minimum target if below it. Returns the applied
    /// target.
    pub fn set_target(&mut self, height_mm: f64) -> f64 {
        self.target_height_mm = height_mm.max(self.params.min_target_height_mm);

        debug!("Target height set to {} mm", self.target_height_mm);

        self.target_height_mm
    }

    /// Apply every field of a tuning command at once.
    pub fn apply_tune_set(&mut self, set: &TuneSet) {
        if set.has_gains() {
            self.set_gains(set.kp, set.ki, set.kd);
        }

        if let Some(target) = set.target_height_mm {
            self.set_target(target);
        }
    }

    /// The feedforward table as reported to clients.
    pub fn feedforward_table(&self) -> Vec<FfEntry> {
        self.tables.feedforward()
            .iter()
            .enumerate()
            .map(|(index, e)| FfEntry {
                index,
                height_mm: e.height_mm,
                speed: e.speed
            })
            .collect()
    }

    /// Replace one row of the feedforward table, leaving it untouched on error.
    pub fn set_feedforward_entry(
        &mut self,
        index: usize,
        height_mm: f64,
        speed: f64
    ) -> Result<(), ScheduleError> {
        self.tables.set_feedforward_entry(index, FeedforwardProfile { height_mm, speed })
    }

    /// Start an evaluation window of `duration_ms` from `now`, restarting any running window.
    ///
    /// Controller memory is reset so that every window starts from the same state.
    pub fn start_eval(&mut self, duration_ms: u64, now: Instant) {
        self.integral_error = 0.0;
        self.previous_error = None;
        self.total_abs_error = 0.0;
        self.eval_cycles = 0;
        self.eval_duration_ms = duration_ms;
        self.eval_deadline = Some(now + Duration::from_millis(duration_ms));
        self.evaluating = true;

        info!("Evaluation started for {} ms", duration_ms);
    }

    // ---- PRIVATE ----

    /// Move the ramped height one step towards the target. Returns true if it changed, in which
    /// case the gains have been looked up again.
    fn ramp_setpoint(&mut self) -> bool {
        let diff = self.target_height_mm - self.ramped_height_mm;
        let step = self.params.ramp_step_mm;

        if diff.abs() > step {
            self.ramped_height_mm += step.copysign(diff);
        }
        else if self.ramped_height_mm != self.target_height_mm {
            self.ramped_height_mm = self.target_height_mm;
        }
        else {
            return false
        }

        self.reschedule();

        true
    }

    /// Replace the active gains with the scheduled ones at the ramped height.
    fn reschedule(&mut self) {
        self.gains = self.tables.gains_at(self.ramped_height_mm);
        self.manual_gains = false;
    }

    /// Close the evaluation window if its deadline has been reached.
    fn check_eval_deadline(&mut self, now: Instant) -> Option<EvalResult> {
        match self.eval_deadline {
            Some(deadline) if self.evaluating && now >= deadline => (),
            _ => return None
        }

        self.evaluating = false;
        self.eval_deadline = None;

        Some(EvalResult {
            timestamp: Utc::now(),
            duration_ms: self.eval_duration_ms,
            total_abs_error: self.total_abs_error,
            num_cycles: self.eval_cycles,
            target_height_mm: self.target_height_mm,
            kp: self.gains.kp,
            ki: self.gains.ki,
            kd: self.gains.kd,
        })
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::lev_ctrl::test_params as params;

    fn lev_ctrl() -> LevCtrl {
        let mut lc = LevCtrl::default();
        lc.init(params()).expect("Valid parameters rejected");
        lc
    }

    fn input(height_mm: f64, now: Instant) -> InputData {
        InputData { height_mm, now }
    }

    #[test]
    fn test_init() {
        let lc = lev_ctrl();
        let status = lc.status();

        assert_eq!(status.target_height_mm, 250.0);
        assert_eq!(status.ramped_height_mm, 250.0);
        assert_eq!(status.kp, 0.004);
        assert!(!status.manual_gains);
        assert_eq!(status.previous_error, None);
        assert_eq!(status.current_height_mm, None);
        assert_eq!(status.feedforward_speed, 0.30);

        // Invalid table
        let mut p = params();
        p.feedforward[1].height_mm = 10.0;
        assert!(matches!(
            LevCtrl::default().init(p),
            Err(LevCtrlInitError::Schedule(ScheduleError::NotAscending { index: 1, .. }))
        ));

        // Invalid scalar
        let mut p = params();
        p.ramp_step_mm = 0.0;
        assert!(matches!(
            LevCtrl::default().init(p),
            Err(LevCtrlInitError::InvalidParam("ramp_step_mm", _))
        ));
    }

    #[test]
    fn test_not_initialised() {
        let mut lc = LevCtrl::default();
        assert!(matches!(
            lc.proc(&input(100.0, Instant::now())),
            Err(LevCtrlError::NotInitialised)
        ));
    }

    #[test]
    fn test_invalid_height() {
        let mut lc = lev_ctrl();
        let before = lc.status();

        assert!(matches!(
            lc.proc(&input(f64::NAN, Instant::now())),
            Err(LevCtrlError::InvalidHeight(_))
        ));
        assert_eq!(lc.status(), before);
    }

    #[test]
    fn test_anti_windup() {
        let mut lc = lev_ctrl();
        let now = Instant::now();

        // Large positive error saturates high
        lc.set_gains(Some(1.0), Some(0.0), Some(0.0));
        for _ in 0..3 {
            let before = lc.status().integral_error;
            let (out, report) = lc.proc(&input(0.0, now)).unwrap();
            assert_eq!(out.fan_speed, 1.0);
            assert!(report.saturated);
            assert_eq!(lc.status().integral_error, before);
        }

        // Large negative error saturates low
        for _ in 0..3 {
            let before = lc.status().integral_error;
            let (out, report) = lc.proc(&input(1000.0, now)).unwrap();
            assert_eq!(out.fan_speed, 0.0);
            assert!(report.saturated);
            assert_eq!(lc.status().integral_error, before);
        }

        // Unsaturated cycles accumulate
        lc.set_gains(Some(0.0), Some(0.0001), Some(0.0));
        let (out, report) = lc.proc(&input(240.0, now)).unwrap();
        assert!(!report.saturated);
        assert!(out.fan_speed > 0.0 && out.fan_speed < 1.0);
        assert_eq!(lc.status().integral_error, 10.0);
    }

    #[test]
    fn test_output() {
        let mut lc = lev_ctrl();
        let now = Instant::now();

        // Binary fractions keep the products exact
        lc.set_gains(Some(0.0078125), Some(0.0009765625), Some(0.015625));

        // First cycle, no derivative yet
        let (out, report) = lc.proc(&input(240.0, now)).unwrap();
        assert_eq!(report.error_mm, 10.0);
        assert_eq!(report.p_term, 0.078125);
        assert_eq!(report.i_term, 0.009765625);
        assert_eq!(report.d_term, 0.0);
        assert_eq!(report.ff_term, 0.30);
        assert_eq!(out.fan_speed, 0.078125 + 0.009765625 + 0.0 + 0.30);
        assert!(!report.saturated);

        // Error falls from 10 to 6 mm, integral 16
        let (out, report) = lc.proc(&input(244.0, now)).unwrap();
        assert_eq!(report.error_mm, 6.0);
        assert_eq!(report.p_term, 0.046875);
        assert_eq!(report.i_term, 0.015625);
        assert_eq!(report.d_term, -0.0625);
        assert_eq!(report.ff_term, 0.30);
        assert_eq!(out.fan_speed, 0.046875 + 0.015625 + -0.0625 + 0.30);

        let status = lc.status();
        assert_eq!(status.integral_error, 16.0);
        assert_eq!(status.previous_error, Some(6.0));
        assert_eq!(status.fan_speed, out.fan_speed);
    }

    #[test]
    fn test_object_lost_boundary() {
        let mut lc = lev_ctrl();
        let now = Instant::now();

        // A reading at the ceiling is still a valid sample
        let (out, report) = lc.proc(&input(8000.0, now)).unwrap();
        assert!(!report.object_lost);
        assert_eq!(report.error_mm, -7750.0);
        assert!(report.saturated);
        assert_eq!(out.fan_speed, 0.0);

        let status = lc.status();
        assert!(status.object_detected);
        assert_eq!(status.previous_error, Some(-7750.0));

        // Anything above it is not
        let (out, report) = lc.proc(&input(8000.5, now)).unwrap();
        assert!(report.object_lost);
        assert_eq!(out.fan_speed, 0.0);

        let status = lc.status();
        assert!(!status.object_detected);
        assert_eq!(status.previous_error, None);
    }

    #[test]
    fn test_ramp() {
        let mut lc = lev_ctrl();
        let now = Instant::now();

        lc.set_target(300.0);

        let mut ramped = Vec::new();
        for _ in 0..4 {
            lc.proc(&input(250.0, now)).unwrap();
            ramped.push(lc.status().ramped_height_mm);
        }
        assert_eq!(ramped, vec![270.0, 290.0, 300.0, 300.0]);

        // Downwards
        lc.set_target(255.0);
        lc.proc(&input(250.0, now)).unwrap();
        assert_eq!(lc.status().ramped_height_mm, 280.0);
        lc.proc(&input(250.0, now)).unwrap();
        assert_eq!(lc.status().ramped_height_mm, 260.0);
        lc.proc(&input(250.0, now)).unwrap();
        assert_eq!(lc.status().ramped_height_mm, 255.0);
    }

    #[test]
    fn test_target_clamped() {
        let mut lc = lev_ctrl();
        assert_eq!(lc.set_target(10.0), 50.0);
        assert_eq!(lc.status().target_height_mm, 50.0);
    }

    #[test]
    fn test_object_lost() {
        let mut lc = lev_ctrl();
        let now = Instant::now();

        lc.proc(&input(240.0, now)).unwrap();
        lc.proc(&input(230.0, now)).unwrap();
        assert!(lc.status().integral_error != 0.0);
        assert!(lc.status().previous_error.is_some());

        let (out, report) = lc.proc(&input(8190.0, now)).unwrap();
        assert!(report.object_lost);
        assert_eq!(out.fan_speed, 0.0);

        let status = lc.status();
        assert_eq!(status.integral_error, 0.0);
        assert_eq!(status.previous_error, None);
        assert_eq!(status.fan_speed, 0.0);
        assert!(!status.object_detected);

        // Derivative suppressed on recovery
        let (_, report) = lc.proc(&input(240.0, now)).unwrap();
        assert_eq!(report.d_term, 0.0);
        assert!(lc.status().object_detected);
    }

    #[test]
    fn test_override_persistence() {
        let mut lc = lev_ctrl();
        let now = Instant::now();

        lc.set_gains(Some(0.1), None, None);
        for _ in 0..5 {
            lc.proc(&input(240.0, now)).unwrap();
            let status = lc.status();
            assert_eq!(status.kp, 0.1);
            assert_eq!(status.ki, 0.0004);
            assert!(status.manual_gains);
        }

        // A ramped height change re-runs the scheduler
        lc.set_target(260.0);
        let (_, report) = lc.proc(&input(240.0, now)).unwrap();
        assert!(report.rescheduled);
        assert_eq!(lc.status().kp, 0.004);
        assert!(!lc.status().manual_gains);
    }

    #[test]
    fn test_evaluation() {
        let mut lc = lev_ctrl();
        let t0 = Instant::now();

        lc.start_eval(1000, t0);
        assert!(lc.status().evaluating);

        // Constant error of 10 mm for 20 cycles inside the window
        for i in 0..20 {
            let (_, report) = lc.proc(&input(240.0, t0 + Duration::from_millis(i * 50))).unwrap();
            assert!(report.eval_result.is_none());
        }
        assert_eq!(lc.status().total_abs_error, 200.0);

        // Deadline reached
        let (_, report) = lc.proc(&input(240.0, t0 + Duration::from_millis(1000))).unwrap();
        let result = report.eval_result.expect("No result at deadline");
        assert_eq!(result.total_abs_error, 200.0);
        assert_eq!(result.num_cycles, 20);
        assert_eq!(result.duration_ms, 1000);
        assert!(!lc.status().evaluating);

        // Frozen afterwards
        let (_, report) = lc.proc(&input(200.0, t0 + Duration::from_millis(1050))).unwrap();
        assert!(report.eval_result.is_none());
        assert_eq!(lc.status().total_abs_error, 200.0);
    }

    #[test]
    fn test_evaluation_uses_absolute_error() {
        let mut lc = lev_ctrl();
        let t0 = Instant::now();

        lc.start_eval(1000, t0);

        // Errors of +10 and -10 mm around the 250 mm target
        for (i, height_mm) in [240.0, 260.0, 240.0, 260.0].iter().enumerate() {
            lc.proc(&input(*height_mm, t0 + Duration::from_millis(i as u64 * 50))).unwrap();
        }
        assert_eq!(lc.status().total_abs_error, 40.0);

        let (_, report) = lc.proc(&input(250.0, t0 + Duration::from_millis(1000))).unwrap();
        let result = report.eval_result.expect("No result at deadline");
        assert_eq!(result.total_abs_error, 40.0);
        assert_eq!(result.num_cycles, 4);
    }

    #[test]
    fn test_eval_closes_while_object_lost() {
        let mut lc = lev_ctrl();
        let t0 = Instant::now();

        lc.start_eval(100, t0);
        lc.proc(&input(240.0, t0)).unwrap();

        let (_, report) = lc.proc(&input(9000.0, t0 + Duration::from_millis(100))).unwrap();
        assert!(report.object_lost);
        assert_eq!(report.eval_result.map(|r| r.total_abs_error), Some(10.0));
        assert!(!lc.status().evaluating);
    }

    #[test]
    fn test_eval_restart_resets_memory() {
        let mut lc = lev_ctrl();
        let t0 = Instant::now();

        lc.proc(&input(240.0, t0)).unwrap();
        lc.start_eval(1000, t0);
        lc.proc(&input(240.0, t0)).unwrap();
        lc.start_eval(1000, t0 + Duration::from_millis(50));

        let status = lc.status();
        assert_eq!(status.integral_error, 0.0);
        assert_eq!(status.previous_error, None);
        assert_eq!(status.total_abs_error, 0.0);
        assert!(status.evaluating);
    }

    #[test]
    fn test_feedforward_edit() {
        let mut lc = lev_ctrl();

        lc.set_feedforward_entry(1, 250.0, 0.32).unwrap();
        assert_eq!(lc.feedforward_table()[1].speed, 0.32);
        assert_eq!(lc.status().feedforward_speed, 0.32);

        let table = lc.feedforward_table();
        assert_eq!(
            lc.set_feedforward_entry(3, 500.0, 0.3),
            Err(ScheduleError::IndexOutOfBounds { index: 3, max: 2 })
        );
        assert!(lc.set_feedforward_entry(0, 50.0, 1.5).is_err());
        assert!(lc.set_feedforward_entry(0, 300.0, 0.3).is_err());
        assert_eq!(lc.feedforward_table(), table);
    }

    #[test]
    fn test_feedforward_disabled() {
        let mut p = params();
        p.feedforward_enabled = false;
        let mut lc = LevCtrl::default();
        lc.init(p).unwrap();

        let (_, report) = lc.proc(&input(250.0, Instant::now())).unwrap();
        assert_eq!(report.ff_term, 0.0);
    }
}
