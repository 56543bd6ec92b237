// Loop-loop magnetometer calibration
//
// Two 30 s sweeps, left circle then right circle, fed from the compass
// tick (20 Hz). Per-axis min/max accumulate across both sweeps; each
// sweep must show a mean yaw rate of at least 20 deg/s or the run ends
// with InsufficientMotion. Work per sample is constant, so a run never
// holds the foreground longer than one compass tick.
//
// x and y must span a real circle. A ride rarely sweeps z far, so a
// flat z axis keeps unit scale and only has its midpoint removed.

use log::{info, warn};

use crate::error::{Error, Result};
use crate::nav::geo::angle_diff;
use crate::sensors::compass::Compass;
use crate::state::{CalPhase, CalibrationStatus, ImuSample};

pub const PHASE_MS: u32 = 30_000;
pub const MIN_YAW_RATE_DPS: f32 = 20.0;
// below this half-range (µT) an axis saw no rotation
const MIN_HALF_RANGE: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IronCorrection {
    pub offset: [f32; 3],
    pub scale: [f32; 3],
}

pub struct Calibrator {
    phase: CalPhase,
    phase_start_ms: u64,
    min: [f32; 3],
    max: [f32; 3],
    yaw_sum: f32,
    last_heading: Option<f32>,
    samples: u32,
    elapsed_ms: u32,
}

impl Calibrator {
    pub const fn new() -> Self {
        Self {
            phase: CalPhase::Idle,
            phase_start_ms: 0,
            min: [f32::MAX; 3],
            max: [f32::MIN; 3],
            yaw_sum: 0.0,
            last_heading: None,
            samples: 0,
            elapsed_ms: 0,
        }
    }

    pub fn running(&self) -> bool {
        matches!(self.phase, CalPhase::LeftCircle | CalPhase::RightCircle)
    }

    pub fn phase(&self) -> CalPhase {
        self.phase
    }

    pub fn start(&mut self, now_ms: u64) {
        *self = Self::new();
        self.phase = CalPhase::LeftCircle;
        self.phase_start_ms = now_ms;
        info!("calib: left circle, {} s", PHASE_MS / 1000);
    }

    pub fn cancel(&mut self) {
        if self.running() {
            info!("calib: cancelled after {} samples", self.samples);
        }
        *self = Self::new();
    }

    pub fn status(&self) -> CalibrationStatus {
        let yaw_rate_dps = if self.elapsed_ms > 0 {
            // magnitude only: the left circle turns the other way
            libm::fabsf(self.yaw_sum) * 1000.0 / self.elapsed_ms as f32
        } else {
            0.0
        };
        CalibrationStatus {
            phase: self.phase,
            phase_elapsed_ms: self.elapsed_ms.min(PHASE_MS),
            phase_total_ms: if self.running() { PHASE_MS } else { 0 },
            yaw_rate_dps,
        }
    }

    // Some(result) when the run finishes on this sample
    pub fn feed(&mut self, raw: &ImuSample, now_ms: u64) -> Option<Result<IronCorrection>> {
        if !self.running() {
            return None;
        }
        self.elapsed_ms = now_ms.saturating_sub(self.phase_start_ms).min(u32::MAX as u64) as u32;

        for i in 0..3 {
            self.min[i] = self.min[i].min(raw.mag[i]);
            self.max[i] = self.max[i].max(raw.mag[i]);
        }
        let heading = Compass::raw_heading(raw);
        if let Some(prev) = self.last_heading {
            self.yaw_sum += angle_diff(heading, prev);
        }
        self.last_heading = Some(heading);
        self.samples += 1;

        if self.elapsed_ms < PHASE_MS {
            return None;
        }

        let rate = self.status().yaw_rate_dps;
        if rate < MIN_YAW_RATE_DPS {
            warn!("calib: {:?} yaw {:.1} deg/s, need {}", self.phase, rate, MIN_YAW_RATE_DPS);
            return Some(self.fail(Error::InsufficientMotion));
        }

        match self.phase {
            CalPhase::LeftCircle => {
                info!("calib: right circle ({:.0} deg/s on the left)", rate);
                self.phase = CalPhase::RightCircle;
                self.phase_start_ms = now_ms;
                self.elapsed_ms = 0;
                self.yaw_sum = 0.0;
                self.last_heading = None;
                None
            }
            _ => Some(match self.solve() {
                Ok(fit) => {
                    info!(
                        "calib: done, offsets {:?} scale {:?} from {} samples",
                        fit.offset, fit.scale, self.samples
                    );
                    self.phase = CalPhase::Done;
                    Ok(fit)
                }
                Err(e) => self.fail(e),
            }),
        }
    }

    fn fail(&mut self, e: Error) -> Result<IronCorrection> {
        self.phase = CalPhase::Failed(e);
        Err(e)
    }

    fn solve(&self) -> Result<IronCorrection> {
        let mut offset = [0.0f32; 3];
        let mut half = [0.0f32; 3];
        for i in 0..3 {
            offset[i] = (self.max[i] + self.min[i]) / 2.0;
            half[i] = (self.max[i] - self.min[i]) / 2.0;
            if !offset[i].is_finite() || !half[i].is_finite() {
                return Err(Error::CalibrationFailed);
            }
        }
        if half[0] < MIN_HALF_RANGE || half[1] < MIN_HALF_RANGE {
            return Err(Error::CalibrationFailed);
        }
        let z_swept = half[2] >= MIN_HALF_RANGE;
        let mean = if z_swept {
            (half[0] + half[1] + half[2]) / 3.0
        } else {
            (half[0] + half[1]) / 2.0
        };
        let scale = [
            mean / half[0],
            mean / half[1],
            if z_swept { mean / half[2] } else { 1.0 },
        ];
        Ok(IronCorrection { offset, scale })
    }
}

impl Default for Calibrator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::compass::tests::level_mag;

    const LEVEL: [f32; 3] = [0.0, 0.0, 1.0];

    // one 20 Hz sample of a rider turning at rate_dps with a hard-iron bias
    fn sample(t_ms: u64, rate_dps: f32, bias: [f32; 3], x_gain: f32) -> ImuSample {
        let h = rate_dps * t_ms as f32 / 1000.0;
        let m = level_mag(h);
        let lean = libm::sinf(h.to_radians()) * 8.0;
        ImuSample {
            accel: LEVEL,
            mag: [m[0] * x_gain + bias[0], m[1] + bias[1], m[2] + lean + bias[2]],
        }
    }

    fn run(cal: &mut Calibrator, rate_dps: f32, bias: [f32; 3]) -> Option<Result<IronCorrection>> {
        cal.start(0);
        let mut t = 0;
        while t <= 2 * PHASE_MS as u64 + 100 {
            // second sweep turns the other way
            let r = if t < PHASE_MS as u64 { rate_dps } else { -rate_dps };
            if let Some(done) = cal.feed(&sample(t, r, bias, 1.5), t) {
                return Some(done);
            }
            t += 50;
        }
        None
    }

    #[test]
    fn test_loop_loop_recovers_offsets() {
        let mut cal = Calibrator::new();
        let fit = run(&mut cal, 36.0, [5.0, -3.0, 1.0])
            .expect("run finishes")
            .expect("calibration succeeds");
        assert!((fit.offset[0] - 5.0).abs() < 0.1, "x offset {}", fit.offset[0]);
        assert!((fit.offset[1] + 3.0).abs() < 0.1, "y offset {}", fit.offset[1]);
        assert!((fit.offset[2] + 19.0).abs() < 0.1, "z offset {}", fit.offset[2]);
        // x saw a 1.5x gain, so it is scaled down relative to y
        assert!(fit.scale[0] < fit.scale[1], "scale {:?}", fit.scale);
        assert!((fit.scale[0] * 45.0 - fit.scale[1] * 30.0).abs() < 0.5);
        assert_eq!(cal.phase(), CalPhase::Done);
    }

    #[test]
    fn test_stationary_fails_with_insufficient_motion() {
        let mut cal = Calibrator::new();
        let out = run(&mut cal, 0.0, [0.0; 3]).expect("run finishes");
        assert_eq!(out, Err(Error::InsufficientMotion));
        assert_eq!(cal.phase(), CalPhase::Failed(Error::InsufficientMotion));
        assert!(!cal.running());
    }

    #[test]
    fn test_slow_turn_fails() {
        let mut cal = Calibrator::new();
        let out = run(&mut cal, 12.0, [0.0; 3]).expect("run finishes");
        assert_eq!(out, Err(Error::InsufficientMotion));
    }

    #[test]
    fn test_phase_switch_and_status() {
        let mut cal = Calibrator::new();
        cal.start(1_000);
        assert_eq!(cal.status().phase, CalPhase::LeftCircle);
        let mut t = 1_000;
        while t < 1_000 + PHASE_MS as u64 {
            assert!(cal.feed(&sample(t, 40.0, [0.0; 3], 1.0), t).is_none());
            t += 50;
        }
        assert!(cal.feed(&sample(t, 40.0, [0.0; 3], 1.0), t).is_none());
        let st = cal.status();
        assert_eq!(st.phase, CalPhase::RightCircle);
        assert_eq!(st.phase_total_ms, PHASE_MS);
    }

    #[test]
    fn test_cancel_returns_to_idle() {
        let mut cal = Calibrator::new();
        cal.start(0);
        cal.feed(&sample(0, 40.0, [0.0; 3], 1.0), 0);
        cal.cancel();
        assert_eq!(cal.phase(), CalPhase::Idle);
        assert!(cal.feed(&sample(50, 40.0, [0.0; 3], 1.0), 50).is_none());
    }
}
