//! Simulated robot in a walled room
//!
//! Produces the inputs the localizer consumes (odometry and laser scans)
//! from a known ground truth. Used by the binaries and the tests.

use crate::common::types::{Pose2D, Stamp};
use crate::error::{LocalizationError, Result};
use crate::map::occupancy_field::{occupancy_values, MapInfo};
use crate::map::OccupancyField;
use crate::perception::sensors::LaserScan;
use crate::runtime::{LocalizationOutput, ParticleCloud};
use crate::transform::StampedCorrection;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::f64::consts::TAU;
use std::sync::{Mutex, PoisonError};

/// Sensor and odometry noise of the simulation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimNoise {
    /// Range noise standard deviation (m)
    pub range: f64,
    /// Odometry translation noise per step (m)
    pub odom_translation: f64,
    /// Odometry rotation noise per step (rad)
    pub odom_rotation: f64,
}

impl Default for SimNoise {
    fn default() -> Self {
        SimNoise {
            range: 0.01,
            odom_translation: 0.0,
            odom_rotation: 0.0,
        }
    }
}

/// Ground-truth robot in a static map
#[derive(Debug, Clone)]
pub struct SimulatedWorld {
    field: OccupancyField,
    truth: Pose2D,
    odom: Pose2D,
    clock: Stamp,
    beam_count: usize,
    max_range: f64,
    noise: SimNoise,
    rng: StdRng,
}

impl SimulatedWorld {
    /// Rectangular room of `width` x `height` meters with one-cell walls
    ///
    /// The robot starts at the room centre.
    pub fn box_room(width: f64, height: f64, resolution: f64) -> Result<Self> {
        if !(resolution > 0.0 && width.is_finite() && height.is_finite()) {
            return Err(LocalizationError::InvalidMap(format!(
                "cannot build a {}x{} room at resolution {}",
                width, height, resolution
            )));
        }
        let cols = (width / resolution).round().max(3.0) as usize;
        let rows = (height / resolution).round().max(3.0) as usize;
        let mut cells = vec![occupancy_values::FREE; cols * rows];
        for gy in 0..rows {
            for gx in 0..cols {
                if gx == 0 || gy == 0 || gx == cols - 1 || gy == rows - 1 {
                    cells[gy * cols + gx] = occupancy_values::OCCUPIED;
                }
            }
        }
        let info = MapInfo {
            width: cols,
            height: rows,
            resolution,
            origin_x: 0.0,
            origin_y: 0.0,
        };
        Ok(Self::with_map(OccupancyField::new(info, cells)?))
    }

    /// Simulate inside an existing map
    pub fn with_map(field: OccupancyField) -> Self {
        let (w, h) = field.info().extent();
        SimulatedWorld {
            truth: Pose2D::new(field.info().origin_x + w / 2.0, field.info().origin_y + h / 2.0, 0.0),
            field,
            odom: Pose2D::default(),
            clock: 0.0,
            beam_count: 72,
            max_range: 8.0,
            noise: SimNoise::default(),
            rng: StdRng::seed_from_u64(1),
        }
    }

    /// Build a room from an ASCII sketch, `#` for walls, top row first
    pub fn from_ascii(rows: &[&str], resolution: f64) -> Result<Self> {
        let height = rows.len();
        let width = rows.iter().map(|r| r.len()).max().unwrap_or(0);
        let mut cells = vec![occupancy_values::FREE; width * height];
        for (row, line) in rows.iter().enumerate() {
            let gy = height - 1 - row;
            for (gx, c) in line.chars().enumerate() {
                cells[gy * width + gx] = match c {
                    '#' => occupancy_values::OCCUPIED,
                    '?' => occupancy_values::UNKNOWN,
                    _ => occupancy_values::FREE,
                };
            }
        }
        let info = MapInfo {
            width,
            height,
            resolution,
            origin_x: 0.0,
            origin_y: 0.0,
        };
        Ok(Self::with_map(OccupancyField::new(info, cells)?))
    }

    pub fn with_robot_at(mut self, pose: Pose2D) -> Self {
        self.truth = pose;
        self
    }

    pub fn with_noise(mut self, noise: SimNoise) -> Self {
        self.noise = noise;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_beams(mut self, count: usize, max_range: f64) -> Self {
        self.beam_count = count.max(1);
        self.max_range = max_range;
        self
    }

    pub fn occupancy_field(&self) -> &OccupancyField {
        &self.field
    }

    pub fn ground_truth(&self) -> Pose2D {
        self.truth
    }

    /// Pose reported by wheel odometry; starts at the odometry origin
    pub fn odometry(&self) -> Pose2D {
        self.odom
    }

    pub fn now(&self) -> Stamp {
        self.clock
    }

    /// Drive `forward` meters then turn `turn` radians, taking `dt` seconds
    ///
    /// Returns the new odometry sample.
    pub fn step(&mut self, forward: f64, turn: f64, dt: f64) -> (Stamp, Pose2D) {
        self.truth = compose(&self.truth, forward, turn);
        let noisy_forward = forward + self.gaussian(self.noise.odom_translation);
        let noisy_turn = turn + self.gaussian(self.noise.odom_rotation);
        self.odom = compose(&self.odom, noisy_forward, noisy_turn);
        self.clock += dt;
        (self.clock, self.odom)
    }

    /// 360 degree scan from the true pose, stamped now
    ///
    /// Beams that hit nothing read `+inf`.
    pub fn scan(&mut self) -> LaserScan {
        let increment = TAU / self.beam_count as f64;
        let ranges = (0..self.beam_count)
            .map(|i| {
                let bearing = i as f64 * increment;
                match self.ray_cast(&self.truth, bearing) {
                    Some(r) => (r + self.gaussian(self.noise.range)).max(0.0),
                    None => f64::INFINITY,
                }
            })
            .collect();
        LaserScan {
            stamp: self.clock,
            frame_id: "laser".to_string(),
            angle_min: 0.0,
            angle_increment: increment,
            range_min: 0.05,
            range_max: self.max_range,
            ranges,
        }
    }

    /// Distance along a beam to the first occupied cell, `None` past max range
    pub fn ray_cast(&self, from: &Pose2D, bearing: f64) -> Option<f64> {
        let step = self.field.info().resolution * 0.5;
        let (s, c) = (from.theta + bearing).sin_cos();
        let mut distance = 0.0;
        while distance < self.max_range {
            distance += step;
            if self.field.is_obstacle(from.x + distance * c, from.y + distance * s) {
                return Some(distance);
            }
        }
        None
    }

    fn gaussian(&mut self, sigma: f64) -> f64 {
        if sigma == 0.0 {
            return 0.0;
        }
        let n: f64 = self.rng.sample(StandardNormal);
        n * sigma
    }
}

fn compose(pose: &Pose2D, forward: f64, turn: f64) -> Pose2D {
    let (s, c) = pose.theta.sin_cos();
    Pose2D::new(pose.x + forward * c, pose.y + forward * s, pose.theta + turn)
}

/// Keeps everything published, for inspection
#[derive(Debug, Default)]
pub struct RecordingOutput {
    clouds: Mutex<Vec<ParticleCloud>>,
    corrections: Mutex<Vec<StampedCorrection>>,
}

impl RecordingOutput {
    pub fn clouds(&self) -> Vec<ParticleCloud> {
        self.clouds.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn corrections(&self) -> Vec<StampedCorrection> {
        self.corrections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl LocalizationOutput for RecordingOutput {
    fn publish_particles(&self, cloud: ParticleCloud) {
        self.clouds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(cloud);
    }

    fn publish_correction(&self, correction: StampedCorrection) {
        self.corrections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(correction);
    }
}
