//! In-memory maintenance store.
//!
//! `InMemoryMaintenanceStore` keeps machines and maintenance controls in
//! process memory and implements the same collaborator traits as the SQLite
//! repository. It backs the `--demo` mode and the engine tests.
//!
//! Reads and writes can be made to fail on demand to simulate an unavailable
//! database.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::maintenance::{
    error::StoreError,
    provider::{ControlSource, MachineDirectory},
    types::{ControlStatus, ControlType, Machine, MaintenanceControl, PendingControls, Recipient},
};

#[derive(Debug, Default)]
struct Tables {
    machines: BTreeMap<i64, Machine>,
    controls: BTreeMap<i64, MaintenanceControl>,
}

#[derive(Debug, Default)]
pub struct InMemoryMaintenanceStore {
    tables: RwLock<Tables>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl InMemoryMaintenanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert or replace a machine.
    pub fn insert_machine(&self, machine: Machine) {
        self.write().machines.insert(machine.id, machine);
    }

    /// Remove a machine, leaving its controls dangling.
    pub fn remove_machine(&self, id: i64) -> Option<Machine> {
        self.write().machines.remove(&id)
    }

    /// Insert or replace a control.
    pub fn insert_control(&self, control: MaintenanceControl) {
        self.write().controls.insert(control.id, control);
    }

    /// Move a control to a new status, as a maintenance-recording workflow would.
    pub fn set_status(&self, id: i64, status: ControlStatus) -> bool {
        match self.write().controls.get_mut(&id) {
            Some(control) => {
                control.status = status;
                true
            }
            None => false,
        }
    }

    pub fn control(&self, id: i64) -> Option<MaintenanceControl> {
        self.read().controls.get(&id).cloned()
    }

    /// All controls regardless of status, ordered by id.
    pub fn controls(&self) -> Vec<MaintenanceControl> {
        self.read().controls.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().controls.is_empty()
    }

    /// Make every subsequent read fail until reset.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `mark_notified` fail until reset.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Store pre-populated with a small ward: two machines with technicians,
    /// one without, and controls spread around `now`.
    pub fn with_demo_data(now: DateTime<Utc>) -> Self {
        let store = Self::new();

        store.insert_machine(Machine {
            id: 1,
            name: "Fresenius 5008S".to_string(),
            location: Some("Dialysis ward, bay 1".to_string()),
            technician: Some(Recipient::technician(
                "amina.tech@diacare.local",
                Some("Amina".to_string()),
            )),
        });
        store.insert_machine(Machine {
            id: 2,
            name: "Water treatment RO-2".to_string(),
            location: Some("Technical room".to_string()),
            technician: Some(Recipient::technician(
                "yassine.tech@diacare.local",
                Some("Yassine".to_string()),
            )),
        });
        store.insert_machine(Machine {
            id: 3,
            name: "Nikkiso DBB-07".to_string(),
            location: Some("Dialysis ward, bay 4".to_string()),
            technician: None,
        });

        let controls = [
            (1, 1, ControlType::Preventive, now + Duration::days(2)),
            (2, 1, ControlType::Disinfection, now - Duration::days(1)),
            (3, 2, ControlType::Calibration, now - Duration::days(5)),
            (4, 2, ControlType::ElectricalSafety, now + Duration::days(30)),
            (5, 3, ControlType::SafetyInspection, now + Duration::days(1)),
        ];
        for (id, machine_id, control_type, due_date) in controls {
            store.insert_control(MaintenanceControl {
                id,
                machine_id,
                control_type,
                due_date,
                status: ControlStatus::Pending,
                last_notified_at: None,
            });
        }

        store
    }
}

#[async_trait]
impl ControlSource for InMemoryMaintenanceStore {
    async fn list_pending_controls(&self) -> Result<PendingControls, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("in-memory store reads disabled"));
        }
        let controls: Vec<MaintenanceControl> = self
            .read()
            .controls
            .values()
            .filter(|c| c.is_pending())
            .cloned()
            .collect();
        Ok(controls.into())
    }

    async fn mark_notified(&self, control_id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("in-memory store writes disabled"));
        }
        match self.write().controls.get_mut(&control_id) {
            Some(control) => {
                if control.last_notified_at.map_or(true, |prev| prev < at) {
                    control.last_notified_at = Some(at);
                }
                Ok(())
            }
            None => Err(StoreError::invalid_record(format!(
                "control {} does not exist",
                control_id
            ))),
        }
    }
}

#[async_trait]
impl MachineDirectory for InMemoryMaintenanceStore {
    async fn get_machine(&self, id: i64) -> Result<Option<Machine>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("in-memory store reads disabled"));
        }
        Ok(self.read().machines.get(&id).cloned())
    }
}
