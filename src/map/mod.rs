//! Static map queries used by the sensor model
pub mod occupancy_field;

pub use self::occupancy_field::OccupancyField;

/// Distance from a map-frame point to the nearest known obstacle
pub trait ObstacleDistance: Send + Sync {
    /// `None` when the point lies outside the map
    fn closest_obstacle_distance(&self, x: f64, y: f64) -> Option<f64>;
}

