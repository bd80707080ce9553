use crate::types::Vehicle;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use uuid::Uuid;

/// Read-only source of bookable vehicles.
pub trait VehicleCatalog: Send + Sync + 'static {
    fn vehicles(&self) -> Vec<Vehicle>;
    fn find_vehicle(&self, id: Uuid) -> Option<Vehicle>;

    fn is_active(&self, vehicle: &Vehicle) -> bool {
        vehicle.is_active
    }
}

#[derive(Debug, Clone, Default)]
pub struct LocalCatalog {
    vehicles: Arc<Mutex<HashMap<Uuid, Vehicle>>>,
}

impl LocalCatalog {
    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Vehicle>> {
        self.vehicles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_example_vehicles(&self) {
        const EXAMPLES: [(i32, &str, &str); 4] = [
            (2023, "Tesla", "Model S"),
            (2012, "Audi", "A4"),
            (1967, "Ford", "Mustang Fastback"),
            (2019, "Porsche", "911 Carrera"),
        ];
        for (year, make, model) in EXAMPLES {
            self.add_vehicle(year, make, model);
        }
        // kept resolvable for bookings made before it was retired
        let retired = self.add_vehicle(2008, "Saab", "9-3 Aero");
        self.set_active(retired.id, false);
    }

    pub fn add_vehicle(&self, year: i32, make: &str, model: &str) -> Vehicle {
        let vehicle = Vehicle {
            id: Uuid::new_v4(),
            year,
            make: make.into(),
            model: model.into(),
            is_active: true,
        };
        self.lock().insert(vehicle.id, vehicle.clone());
        vehicle
    }

    /// Returns false if there is no such vehicle.
    pub fn set_active(&self, id: Uuid, is_active: bool) -> bool {
        match self.lock().get_mut(&id) {
            Some(vehicle) => {
                vehicle.is_active = is_active;
                true
            }
            None => false,
        }
    }
}

impl VehicleCatalog for LocalCatalog {
    fn vehicles(&self) -> Vec<Vehicle> {
        let mut vehicles: Vec<Vehicle> = self
            .lock()
            .values()
            .filter(|vehicle| vehicle.is_active)
            .cloned()
            .collect();
        vehicles.sort_by(|a, b| (&a.make, &a.model, a.year).cmp(&(&b.make, &b.model, b.year)));
        vehicles
    }

    fn find_vehicle(&self, id: Uuid) -> Option<Vehicle> {
        self.lock().get(&id).cloned()
    }
}
