//! Concurrent, in-memory driver-location index (spec §4.3).
//!
//! Every write lands here first and fast: `update_location` and
//! `set_online_status` must never suspend on I/O. A background task
//! (see [`flush`]) drains the dirty set into the persistent store on its own
//! schedule, so a burst of telemetry never backs up behind a database round
//! trip.

pub mod flush;

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use h3o::{CellIndex, Resolution};

use crate::error::{CoreError, CoreResult};
use crate::ids::{DriverId, UserId};
use crate::metrics::DriverStoreMetrics;
use crate::model::{GeoPoint, VehicleType};
use crate::spatial::{distance_km_between_cells, k_ring, lat_lng_to_cell};

/// The lightweight record the spatial index actually keys on. A driver's
/// durable earnings/rating history lives in [`crate::model::Driver`] behind
/// the persistent store; this is only what dispatch needs to find them.
#[derive(Debug, Clone)]
pub struct DriverRecord {
    pub driver_id: DriverId,
    pub user_id: UserId,
    pub vehicle_type: VehicleType,
    pub location: Option<GeoPoint>,
    pub h3_index: Option<CellIndex>,
    pub is_online: bool,
    pub is_active: bool,
    pub last_active_at: DateTime<Utc>,
}

/// A nearby-driver search hit, sorted by ascending distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearbyDriver {
    pub driver_id: DriverId,
    pub distance_km: f64,
    pub vehicle_type: VehicleType,
}

pub struct DriverStateStore {
    records: DashMap<DriverId, DriverRecord>,
    by_user: DashMap<UserId, DriverId>,
    by_cell: DashMap<CellIndex, DashSet<DriverId>>,
    dirty: DashSet<DriverId>,
    metrics: DriverStoreMetrics,
    resolution: Resolution,
    heartbeat_staleness: Duration,
}

impl DriverStateStore {
    pub fn new(resolution: Resolution, heartbeat_staleness: Duration) -> Self {
        Self {
            records: DashMap::new(),
            by_user: DashMap::new(),
            by_cell: DashMap::new(),
            dirty: DashSet::new(),
            metrics: DriverStoreMetrics::default(),
            resolution,
            heartbeat_staleness,
        }
    }

    pub fn metrics(&self) -> &DriverStoreMetrics {
        &self.metrics
    }

    /// Registers a driver with no known location yet (post sign-up, before
    /// the first telemetry ping).
    pub fn register_driver(&self, driver_id: DriverId, user_id: UserId, vehicle_type: VehicleType, now: DateTime<Utc>) {
        self.records.insert(
            driver_id,
            DriverRecord {
                driver_id,
                user_id,
                vehicle_type,
                location: None,
                h3_index: None,
                is_online: false,
                is_active: true,
                last_active_at: now,
            },
        );
        self.by_user.insert(user_id, driver_id);
    }

    /// Seeds the store from a durable [`crate::model::Driver`] at startup.
    pub fn hydrate(&self, driver: &crate::model::Driver) {
        self.records.insert(
            driver.id,
            DriverRecord {
                driver_id: driver.id,
                user_id: driver.user_id,
                vehicle_type: driver.vehicle_type,
                location: driver.location.clone(),
                h3_index: driver.h3_index,
                is_online: driver.is_online,
                is_active: driver.is_active,
                last_active_at: driver.last_active_at,
            },
        );
        self.by_user.insert(driver.user_id, driver.id);
        if let Some(cell) = driver.h3_index {
            self.by_cell.entry(cell).or_default().insert(driver.id);
        }
    }

    /// Moves a driver's location, updating the cell index (remove from old
    /// cell, insert into new cell — never the reverse order, so a
    /// concurrent reader never sees the driver in neither cell nor misses
    /// it in both). Marks the driver dirty for the next flush cycle.
    pub fn update_location(&self, driver_id: DriverId, lat: f64, lng: f64, now: DateTime<Utc>) -> CoreResult<()> {
        let new_cell = lat_lng_to_cell(lat, lng, self.resolution)?;

        let mut record = self
            .records
            .get_mut(&driver_id)
            .ok_or_else(|| CoreError::NotFound(format!("driver {driver_id}")))?;

        let old_cell = record.h3_index;
        record.location = Some(GeoPoint { lat, lng });
        record.h3_index = Some(new_cell);
        record.last_active_at = now;
        drop(record);

        if old_cell != Some(new_cell) {
            if let Some(old_cell) = old_cell {
                if let Some(set) = self.by_cell.get(&old_cell) {
                    set.remove(&driver_id);
                }
            }
            self.by_cell.entry(new_cell).or_default().insert(driver_id);
            self.metrics.set_cells_tracked(self.by_cell.len() as u64);
        }

        self.dirty.insert(driver_id);
        self.metrics.record_queued_write();
        self.metrics.record_location_update();
        Ok(())
    }

    pub fn set_online_status(&self, driver_id: DriverId, is_online: bool) -> CoreResult<()> {
        let mut record = self
            .records
            .get_mut(&driver_id)
            .ok_or_else(|| CoreError::NotFound(format!("driver {driver_id}")))?;
        record.is_online = is_online;
        Ok(())
    }

    pub fn set_active_status(&self, driver_id: DriverId, is_active: bool) -> CoreResult<()> {
        let mut record = self
            .records
            .get_mut(&driver_id)
            .ok_or_else(|| CoreError::NotFound(format!("driver {driver_id}")))?;
        record.is_active = is_active;
        Ok(())
    }

    pub fn get_driver(&self, driver_id: DriverId) -> Option<DriverRecord> {
        self.records.get(&driver_id).map(|r| r.clone())
    }

    pub fn resolve_driver_id(&self, user_id: UserId) -> Option<DriverId> {
        self.by_user.get(&user_id).map(|id| *id)
    }

    fn is_eligible(record: &DriverRecord, vehicle_type: Option<VehicleType>, now: DateTime<Utc>, staleness: Duration) -> bool {
        if !record.is_online || !record.is_active {
            return false;
        }
        if let Some(vt) = vehicle_type {
            if record.vehicle_type != vt {
                return false;
            }
        }
        let Ok(age) = (now - record.last_active_at).to_std() else {
            return false;
        };
        age <= staleness
    }

    /// Progressive k-ring expansion (spec §4.3/§4.5): for k=1..=max_k,
    /// union the raw driver-ids across `k_ring(origin,k)`, and stop at the
    /// first k where that union is non-empty — *before* any eligibility
    /// filtering, so a ring whose only occupants are offline/stale/wrong-
    /// vehicle still halts expansion and returns empty, rather than
    /// continuing to search wider. Only once a non-empty union is found is
    /// it filtered by eligibility/radius/vehicle and sorted by distance.
    pub fn find_nearby_drivers(
        &self,
        pickup: GeoPoint,
        vehicle_type: Option<VehicleType>,
        max_k: u32,
        radius_km: f64,
        now: DateTime<Utc>,
    ) -> CoreResult<Vec<NearbyDriver>> {
        let started = std::time::Instant::now();
        let origin = lat_lng_to_cell(pickup.lat, pickup.lng, self.resolution)?;

        let mut union: Vec<(DriverId, CellIndex)> = Vec::new();
        for k in 1..=max_k.max(1) {
            union.clear();
            for cell in k_ring(origin, k) {
                if let Some(set) = self.by_cell.get(&cell) {
                    union.extend(set.iter().map(|id| (*id, cell)));
                }
            }
            if !union.is_empty() || k >= max_k {
                break;
            }
        }

        let mut found = Vec::new();
        for (driver_id, cell) in &union {
            let Some(record) = self.records.get(driver_id) else { continue };
            if !Self::is_eligible(&record, vehicle_type, now, self.heartbeat_staleness) {
                continue;
            }
            let distance_km = if let Some(loc) = &record.location {
                crate::spatial::haversine_km(pickup.lat, pickup.lng, loc.lat, loc.lng)
            } else {
                distance_km_between_cells(origin, *cell)
            };
            if distance_km <= radius_km {
                found.push(NearbyDriver { driver_id: *driver_id, distance_km, vehicle_type: record.vehicle_type });
            }
        }

        found.sort_by(|a, b| a.distance_km.partial_cmp(&b.distance_km).unwrap());
        self.metrics.record_nearby_query(started.elapsed().as_micros() as u64);
        Ok(found)
    }

    /// Drains and returns the set of driver ids pending a flush, without
    /// blocking writers — called only from the background flush task.
    pub(crate) fn take_dirty(&self) -> Vec<DriverId> {
        let ids: Vec<DriverId> = self.dirty.iter().map(|id| *id).collect();
        for id in &ids {
            self.dirty.remove(id);
        }
        ids
    }

    pub(crate) fn mark_dirty_again(&self, driver_id: DriverId) {
        self.dirty.insert(driver_id);
    }
}
