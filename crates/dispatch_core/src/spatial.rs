//! H3-based geographic indexing and distance calculations.
//!
//! This module provides:
//!
//! - **`lat_lng_to_cell`** / **`k_ring`**: pure, deterministic H3 operations
//! - **Distance calculations**: Haversine distance between H3 cells or raw coordinates
//!
//! Default resolution is 9 (~240m cell size); valid range is 7-10 per spec §4.1.

use std::num::NonZeroUsize;
use std::sync::{Mutex, OnceLock};

use h3o::{CellIndex, LatLng, Resolution};
use lru::LruCache;

use crate::error::CoreError;

/// Mean Earth radius in km, used for Haversine distance.
const EARTH_RADIUS_KM: f64 = 6371.0;

fn validate_coordinate(lat: f64, lng: f64) -> Result<(), CoreError> {
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
        return Err(CoreError::BadCoordinate { lat, lng });
    }
    Ok(())
}

/// Resolves `(lat, lng)` to its H3 cell at `resolution`. Fails with
/// `BadCoordinate` if the latitude/longitude are out of range.
pub fn lat_lng_to_cell(lat: f64, lng: f64, resolution: Resolution) -> Result<CellIndex, CoreError> {
    validate_coordinate(lat, lng)?;
    let ll = LatLng::new(lat, lng).map_err(|_| CoreError::BadCoordinate { lat, lng })?;
    Ok(ll.to_cell(resolution))
}

/// Returns every cell within k grid-steps of `origin`, inclusive of `origin`
/// itself. `|k_ring(c, k)| = 1 + 3k(k+1)`.
pub fn k_ring(origin: CellIndex, k: u32) -> Vec<CellIndex> {
    origin.grid_disk::<Vec<_>>(k)
}

/// Haversine great-circle distance between two raw lat/lng pairs, in km.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let (lat1, lng1) = (lat1.to_radians(), lng1.to_radians());
    let (lat2, lng2) = (lat2.to_radians(), lng2.to_radians());
    let dlat = lat2 - lat1;
    let dlng = lng2 - lng1;
    let sin_dlat = (dlat * 0.5).sin();
    let sin_dlng = (dlng * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlng * sin_dlng;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

fn distance_km_between_cells_uncached(a: CellIndex, b: CellIndex) -> f64 {
    let a: LatLng = a.into();
    let b: LatLng = b.into();
    haversine_km(a.lat(), a.lng(), b.lat(), b.lng())
}

/// Global distance cache (10,000 entries) avoiding repeated cell→LatLng
/// conversions for frequently queried cell pairs.
fn get_distance_cache() -> &'static Mutex<LruCache<(CellIndex, CellIndex), f64>> {
    static CACHE: OnceLock<Mutex<LruCache<(CellIndex, CellIndex), f64>>> = OnceLock::new();
    CACHE.get_or_init(|| {
        Mutex::new(LruCache::new(
            NonZeroUsize::new(10_000).expect("cache size must be non-zero"),
        ))
    })
}

/// Distance between two H3 cells, in km, with LRU caching keyed symmetrically.
pub fn distance_km_between_cells(a: CellIndex, b: CellIndex) -> f64 {
    let key = if a < b { (a, b) } else { (b, a) };
    let mut cache = get_distance_cache().lock().unwrap();
    *cache.get_or_insert(key, || distance_km_between_cells_uncached(key.0, key.1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lat_lng_to_cell_rejects_out_of_range_coordinates() {
        assert!(matches!(
            lat_lng_to_cell(91.0, 0.0, Resolution::Nine),
            Err(CoreError::BadCoordinate { .. })
        ));
        assert!(matches!(
            lat_lng_to_cell(0.0, 181.0, Resolution::Nine),
            Err(CoreError::BadCoordinate { .. })
        ));
        assert!(lat_lng_to_cell(28.6139, 77.2090, Resolution::Nine).is_ok());
    }

    #[test]
    fn lat_lng_to_cell_is_deterministic() {
        let a = lat_lng_to_cell(28.6139, 77.2090, Resolution::Nine).unwrap();
        let b = lat_lng_to_cell(28.6139, 77.2090, Resolution::Nine).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn k_ring_one_yields_seven_cells() {
        let origin = lat_lng_to_cell(28.6139, 77.2090, Resolution::Nine).unwrap();
        let ring = k_ring(origin, 1);
        assert_eq!(ring.len(), 7);
        assert!(ring.contains(&origin));
    }

    #[test]
    fn k_ring_count_matches_formula() {
        let origin = lat_lng_to_cell(28.6139, 77.2090, Resolution::Nine).unwrap();
        for k in 0..=3u32 {
            let expected = 1 + 3 * k * (k + 1);
            assert_eq!(k_ring(origin, k).len() as u32, expected);
        }
    }

    #[test]
    fn haversine_delhi_to_noida_is_about_21_7_km() {
        let d = haversine_km(28.6139, 77.2090, 28.5355, 77.3910);
        assert!((d - 21.7).abs() < 0.2, "distance was {d}");
    }

    #[test]
    fn haversine_same_point_is_zero() {
        let d = haversine_km(28.6139, 77.2090, 28.6139, 77.2090);
        assert!(d.abs() < 1e-9);
    }
}
