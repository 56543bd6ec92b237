// Tilt-compensated compass
//
// Raw mag passes through the hard/soft-iron correction, then is
// projected onto the horizontal plane using roll and pitch from the
// accelerometer. The heading is low-passed as a unit vector so the
// average never jumps across north.
//
// Without a valid calibration the last good heading is repeated and
// flagged stale; consumers fall back to GPS course.

use libm::{atan2f, cosf, sinf, sqrtf};

use crate::nav::geo::wrap_360;
use crate::state::{CalibrationOffsets, CompassSample, ImuSample};

const HEADING_ALPHA: f32 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attitude {
    pub heading_deg: f32,
    pub roll_deg: f32,
    pub pitch_deg: f32,
}

// magnetic heading of a corrected mag vector, no declination applied
pub fn tilt_compensate(accel: [f32; 3], mag: [f32; 3]) -> Attitude {
    let [ax, ay, az] = accel;
    let [mx, my, mz] = mag;
    let roll = atan2f(ay, az);
    let pitch = atan2f(-ax, sqrtf(ay * ay + az * az));
    let (sr, cr) = (sinf(roll), cosf(roll));
    let (sp, cp) = (sinf(pitch), cosf(pitch));
    let hx = mx * cp + mz * sp;
    let hy = mx * sr * sp + my * cr - mz * sr * cp;
    Attitude {
        heading_deg: wrap_360(atan2f(-hy, hx).to_degrees()),
        roll_deg: roll.to_degrees(),
        pitch_deg: pitch.to_degrees(),
    }
}

pub struct Compass {
    offsets: CalibrationOffsets,
    // filtered unit vector (cos, sin) of the true heading
    filt: Option<(f32, f32)>,
    last_heading: f32,
}

impl Compass {
    pub const fn new(offsets: CalibrationOffsets) -> Self {
        Self {
            offsets,
            filt: None,
            last_heading: 0.0,
        }
    }

    pub fn offsets(&self) -> CalibrationOffsets {
        self.offsets
    }

    // a new calibration restarts the filter from the first sample
    pub fn set_offsets(&mut self, offsets: CalibrationOffsets) {
        self.offsets = offsets;
        self.filt = None;
    }

    // heading without correction; the calibrator measures yaw with it
    pub fn raw_heading(sample: &ImuSample) -> f32 {
        tilt_compensate(sample.accel, sample.mag).heading_deg
    }

    pub fn update(&mut self, sample: &ImuSample, now_ms: u64) -> CompassSample {
        let mag = self.offsets.apply(sample.mag);
        let att = tilt_compensate(sample.accel, mag);

        if !self.offsets.valid {
            return CompassSample {
                heading_deg: self.last_heading,
                roll_deg: att.roll_deg,
                pitch_deg: att.pitch_deg,
                mag: sample.mag,
                accel: sample.accel,
                calibration_valid: false,
                stale: true,
                at_ms: now_ms,
            };
        }

        let heading = wrap_360(att.heading_deg + self.offsets.declination_deg);
        let rad = heading.to_radians();
        let (c, s) = (cosf(rad), sinf(rad));
        let (fc, fs) = match self.filt {
            Some((fc, fs)) => (
                fc + HEADING_ALPHA * (c - fc),
                fs + HEADING_ALPHA * (s - fs),
            ),
            None => (c, s),
        };
        self.filt = Some((fc, fs));
        // opposite headings averaged to nothing: keep the previous output
        if fc * fc + fs * fs > 1e-6 {
            self.last_heading = wrap_360(atan2f(fs, fc).to_degrees());
        }

        CompassSample {
            heading_deg: self.last_heading,
            roll_deg: att.roll_deg,
            pitch_deg: att.pitch_deg,
            mag: sample.mag,
            accel: sample.accel,
            calibration_valid: true,
            stale: false,
            at_ms: now_ms,
        }
    }
}
