//! Occupancy field
//!
//! Precomputes, for every cell of an occupancy grid, the distance from the
//! cell centre to the closest occupied cell centre, so that sensor model
//! queries are a single lookup.

use super::ObstacleDistance;
use crate::error::{LocalizationError, Result};

/// Occupancy values as found in map messages
pub mod occupancy_values {
    pub const FREE: u8 = 0;
    pub const OCCUPIED: u8 = 100;
    pub const UNKNOWN: u8 = 255;
    /// Cells at or above this value count as obstacles
    pub const OCCUPIED_THRESHOLD: u8 = 50;
}

/// Grid geometry shared by map consumers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapInfo {
    pub width: usize,
    pub height: usize,
    pub resolution: f64,
    pub origin_x: f64,
    pub origin_y: f64,
}

impl MapInfo {
    /// Convert world coordinates to map coordinates
    pub fn world_to_map(&self, x: f64, y: f64) -> (i64, i64) {
        let grid_x = ((x - self.origin_x) / self.resolution).floor() as i64;
        let grid_y = ((y - self.origin_y) / self.resolution).floor() as i64;
        (grid_x, grid_y)
    }

    /// Row-major index of a cell, `None` outside the grid
    pub fn index(&self, grid_x: i64, grid_y: i64) -> Option<usize> {
        if grid_x >= 0 && grid_y >= 0 && (grid_x as usize) < self.width && (grid_y as usize) < self.height
        {
            Some(grid_y as usize * self.width + grid_x as usize)
        } else {
            None
        }
    }

    /// World-frame extent `(width, height)` in meters
    pub fn extent(&self) -> (f64, f64) {
        (
            self.width as f64 * self.resolution,
            self.height as f64 * self.resolution,
        )
    }
}

/// Nearest-obstacle distance field over a static occupancy grid
#[derive(Debug, Clone)]
pub struct OccupancyField {
    info: MapInfo,
    occupancy: Vec<u8>,
    distances: Vec<f64>,
}

impl OccupancyField {
    /// Build the field from row-major occupancy data
    ///
    /// Unknown cells are treated as free. A map without any occupied cell
    /// yields infinite distances everywhere.
    pub fn new(info: MapInfo, occupancy: Vec<u8>) -> Result<Self> {
        if info.width == 0 || info.height == 0 {
            return Err(LocalizationError::InvalidMap("map has no cells".to_string()));
        }
        if !(info.resolution > 0.0) {
            return Err(LocalizationError::InvalidMap(format!(
                "resolution must be positive, got {}",
                info.resolution
            )));
        }
        if occupancy.len() != info.width * info.height {
            return Err(LocalizationError::InvalidMap(format!(
                "expected {} cells for a {}x{} map, got {}",
                info.width * info.height,
                info.width,
                info.height,
                occupancy.len()
            )));
        }

        let occupied: Vec<bool> = occupancy.iter().map(|&v| is_occupied(v)).collect();
        let obstacles = occupied.iter().filter(|&&o| o).count();
        let distances = squared_cell_distances(info.width, info.height, &occupied)
            .into_iter()
            .map(|d| d.sqrt() * info.resolution)
            .collect();

        log::info!(
            "Built occupancy field {}x{} @ {} m with {} obstacle cells",
            info.width,
            info.height,
            info.resolution,
            obstacles
        );

        Ok(OccupancyField {
            info,
            occupancy,
            distances,
        })
    }

    pub fn info(&self) -> &MapInfo {
        &self.info
    }

    /// Whether the cell containing (x, y) is an obstacle; `false` outside the map
    pub fn is_obstacle(&self, x: f64, y: f64) -> bool {
        let (gx, gy) = self.info.world_to_map(x, y);
        self.info
            .index(gx, gy)
            .map(|i| is_occupied(self.occupancy[i]))
            .unwrap_or(false)
    }
}

impl ObstacleDistance for OccupancyField {
    fn closest_obstacle_distance(&self, x: f64, y: f64) -> Option<f64> {
        let (gx, gy) = self.info.world_to_map(x, y);
        self.info.index(gx, gy).map(|i| self.distances[i])
    }
}

/// Squared distance, in cells, from every cell centre to the nearest occupied one
///
/// Exact Euclidean transform done separably: one pass down each column, then
/// one along each row over the column results. Linear in the number of cells.
fn squared_cell_distances(width: usize, height: usize, occupied: &[bool]) -> Vec<f64> {
    let mut columns = vec![f64::INFINITY; width * height];
    let mut line = vec![0.0; height];
    let mut out = vec![0.0; height];
    for gx in 0..width {
        for gy in 0..height {
            line[gy] = if occupied[gy * width + gx] { 0.0 } else { f64::INFINITY };
        }
        lower_envelope(&line, &mut out);
        for gy in 0..height {
            columns[gy * width + gx] = out[gy];
        }
    }

    let mut distances = vec![f64::INFINITY; width * height];
    for (row, result) in columns.chunks(width).zip(distances.chunks_mut(width)) {
        lower_envelope(row, result);
    }
    distances
}

/// 1D squared distance transform: `out[q] = min_p (q - p)^2 + f[p]`
///
/// Infinite entries of `f` never act as sources.
fn lower_envelope(f: &[f64], out: &mut [f64]) {
    // (source index, first position where its parabola is lowest)
    let mut hull: Vec<(usize, f64)> = Vec::with_capacity(f.len());
    for q in (0..f.len()).filter(|&q| f[q].is_finite()) {
        let mut start = f64::NEG_INFINITY;
        while let Some(&(p, p_start)) = hull.last() {
            let (pf, qf) = (p as f64, q as f64);
            let crossing = ((f[q] + qf * qf) - (f[p] + pf * pf)) / (2.0 * (qf - pf));
            if crossing <= p_start {
                hull.pop();
            } else {
                start = crossing;
                break;
            }
        }
        hull.push((q, start));
    }

    if hull.is_empty() {
        out.fill(f64::INFINITY);
        return;
    }
    let mut k = 0;
    for (q, slot) in out.iter_mut().enumerate() {
        let qf = q as f64;
        while k + 1 < hull.len() && hull[k + 1].1 < qf {
            k += 1;
        }
        let p = hull[k].0;
        *slot = (qf - p as f64).powi(2) + f[p];
    }
}

/// Values above `OCCUPIED` mean unknown and count as free
fn is_occupied(value: u8) -> bool {
    (occupancy_values::OCCUPIED_THRESHOLD..=occupancy_values::OCCUPIED).contains(&value)
}
