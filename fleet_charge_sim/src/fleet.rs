// Fleet registry boundary and the resolved startup view of the fleet.
//
// `FleetRegistry` is the read-only lookup the dashboard queries once at
// startup: `list_users()`, then `get_vehicle()` for every referenced vehicle.
// `FleetSnapshot` is the in-memory implementation, parsed from JSON:
//
//   {"users": [{"id": "u1", "name": "Ada", "vehicle": "v1", "location": "..."}],
//    "vehicles": [{"id": "v1", "name": "Van", "drain_rate": "5",
//                  "capacity": "60kWh", "current_charge": 22}]}
//
// Upstream documents spell the fields `Name`, `Car`, `Location`,
// `DrainRate`, `Capacity` and `CurrentCharge`; those spellings are accepted
// as aliases. Drain rate arrives as a string upstream, so both a number and a
// numeric string are accepted.
//
// `Fleet::load` turns a registry into the view the simulator works from:
// vehicles in first-reference order over the user list, each tracked once no
// matter how many users share it. Records that cannot take part in the
// countdown (unknown vehicle, non-positive or non-finite drain rate,
// non-finite charge) are dropped with a `warn!` and never fail the load.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::error::{FleetError, read_file};
use crate::types::{Location, UserId, VehicleId};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    #[serde(alias = "Id")]
    pub id: VehicleId,
    #[serde(default, alias = "Name")]
    pub name: String,
    /// Charge lost per tick while the simulator runs.
    #[serde(alias = "DrainRate", deserialize_with = "number_or_string")]
    pub drain_rate: f64,
    /// Display only.
    #[serde(default, alias = "Capacity")]
    pub capacity: String,
    #[serde(alias = "CurrentCharge")]
    pub current_charge: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(alias = "Id")]
    pub id: UserId,
    #[serde(default, alias = "Name")]
    pub name: String,
    #[serde(default, alias = "Car")]
    pub vehicle: Option<VehicleId>,
    #[serde(default, alias = "Location")]
    pub location: Location,
}

/// Unparseable strings become NaN so the record is excluded at load time
/// rather than failing the whole snapshot.
fn number_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Number(n) => n,
        Raw::Text(s) => s.trim().parse().unwrap_or(f64::NAN),
    })
}

/// Read-only source of fleet records, queried once at startup.
pub trait FleetRegistry {
    fn list_users(&self) -> Vec<User>;
    fn get_vehicle(&self, id: &VehicleId) -> Option<Vehicle>;
}

/// In-memory registry backed by a JSON document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetSnapshot {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub vehicles: Vec<Vehicle>,
}

impl FleetSnapshot {
    pub fn from_json(json: &str) -> Result<Self, FleetError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, FleetError> {
        Self::from_json(&read_file(path.as_ref())?)
    }
}

impl FleetRegistry for FleetSnapshot {
    fn list_users(&self) -> Vec<User> {
        self.users.clone()
    }

    fn get_vehicle(&self, id: &VehicleId) -> Option<Vehicle> {
        self.vehicles.iter().find(|v| &v.id == id).cloned()
    }
}

/// The fleet as resolved at startup. Never changes afterwards; live charge
/// levels belong to the simulator.
#[derive(Clone, Debug, Default)]
pub struct Fleet {
    users: Vec<User>,
    vehicles: Vec<Vehicle>,
}

impl Fleet {
    /// Run the startup query against `registry`.
    pub fn load(registry: &impl FleetRegistry) -> Self {
        let mut users = Vec::new();
        let mut vehicles: Vec<Vehicle> = Vec::new();
        let mut seen_users = BTreeSet::new();
        let mut looked_up = BTreeSet::new();

        for user in registry.list_users() {
            if !seen_users.insert(user.id.clone()) {
                warn!(user = %user.id, "duplicate user id, keeping the first record");
                continue;
            }

            let unseen = user.vehicle.as_ref().filter(|id| !looked_up.contains(*id));
            if let Some(vehicle_id) = unseen {
                looked_up.insert(vehicle_id.clone());
                match registry.get_vehicle(vehicle_id) {
                    Some(vehicle) if is_trackable(&vehicle) => vehicles.push(vehicle),
                    Some(vehicle) => warn!(
                        vehicle = %vehicle.id,
                        drain_rate = vehicle.drain_rate,
                        current_charge = vehicle.current_charge,
                        "vehicle has unusable charge data, excluding it"
                    ),
                    None => warn!(
                        user = %user.id,
                        vehicle = %vehicle_id,
                        "assigned vehicle not found, excluding it"
                    ),
                }
            }

            users.push(user);
        }

        Self { users, vehicles }
    }

    /// Every user, in registry order.
    pub fn users(&self) -> &[User] {
        &self.users
    }

    /// Tracked vehicles, in enumeration (first-reference) order.
    pub fn vehicles(&self) -> &[Vehicle] {
        &self.vehicles
    }

    pub fn user(&self, id: &UserId) -> Option<&User> {
        self.users.iter().find(|u| &u.id == id)
    }

    pub fn vehicle(&self, id: &VehicleId) -> Option<&Vehicle> {
        self.vehicles.iter().find(|v| &v.id == id)
    }

    /// Users whose assigned vehicle is `vehicle`, in registry order. Empty
    /// for untracked vehicles.
    /// The iterator borrows only the fleet, so a temporary id is fine.
    pub fn users_of<'a>(
        &'a self,
        vehicle: &VehicleId,
    ) -> impl Iterator<Item = &'a User> + use<'a> {
        let tracked = self.vehicle(vehicle).is_some();
        let vehicle = vehicle.clone();
        self.users
            .iter()
            .filter(move |u| tracked && u.vehicle.as_ref() == Some(&vehicle))
    }
}

fn is_trackable(vehicle: &Vehicle) -> bool {
    vehicle.drain_rate.is_finite()
        && vehicle.drain_rate > 0.0
        && vehicle.current_charge.is_finite()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn vehicle(id: &str, drain_rate: f64, current_charge: f64) -> Vehicle {
        Vehicle {
            id: id.into(),
            name: format!("car {id}"),
            drain_rate,
            capacity: "60kWh".into(),
            current_charge,
        }
    }

    fn user(id: &str, vehicle: Option<&str>) -> User {
        User {
            id: id.into(),
            name: format!("user {id}"),
            vehicle: vehicle.map(VehicleId::from),
            location: Location::new(format!("loc-{id}")),
        }
    }

    #[test]
    fn snapshot_accepts_string_and_number_drain_rates() {
        let json = r#"{
            "users": [],
            "vehicles": [
                {"id": "a", "drain_rate": "5", "current_charge": 22},
                {"id": "b", "drain_rate": 2.5, "current_charge": 40}
            ]
        }"#;
        let snapshot = FleetSnapshot::from_json(json).unwrap();
        assert_eq!(snapshot.vehicles[0].drain_rate, 5.0);
        assert_eq!(snapshot.vehicles[1].drain_rate, 2.5);
        assert_eq!(snapshot.vehicles[0].capacity, "");
    }

    #[test]
    fn snapshot_accepts_upstream_field_names() {
        let json = r#"{
            "users": [{"id": "u1", "Name": "Ada", "Car": "v1", "Location": "Main St"}],
            "vehicles": [{"id": "v1", "Name": "Van", "DrainRate": "3",
                          "Capacity": "75kWh", "CurrentCharge": 50}]
        }"#;
        let snapshot = FleetSnapshot::from_json(json).unwrap();
        assert_eq!(snapshot.users[0].vehicle, Some(VehicleId::from("v1")));
        assert_eq!(snapshot.users[0].location.as_str(), "Main St");
        assert_eq!(snapshot.vehicles[0].drain_rate, 3.0);
        assert_eq!(snapshot.vehicles[0].capacity, "75kWh");
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            FleetSnapshot::from_json("{\"users\": 3}"),
            Err(FleetError::Json(_))
        ));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = FleetSnapshot::load("/definitely/not/here.json").unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.json"));
    }

    #[test]
    fn vehicles_follow_first_reference_order() {
        let snapshot = FleetSnapshot {
            users: vec![user("u1", Some("b")), user("u2", Some("a"))],
            vehicles: vec![vehicle("a", 1.0, 50.0), vehicle("b", 1.0, 50.0)],
        };
        let fleet = Fleet::load(&snapshot);
        let ids: Vec<_> = fleet.vehicles().iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);
    }

    #[test]
    fn shared_vehicle_is_tracked_once() {
        let snapshot = FleetSnapshot {
            users: vec![user("u1", Some("a")), user("u2", Some("a"))],
            vehicles: vec![vehicle("a", 1.0, 50.0)],
        };
        let fleet = Fleet::load(&snapshot);
        assert_eq!(fleet.vehicles().len(), 1);
        let owners: Vec<_> = fleet
            .users_of(&VehicleId::from("a"))
            .map(|u| u.id.as_str())
            .collect();
        assert_eq!(owners, ["u1", "u2"]);
    }

    #[test]
    fn users_of_outlives_a_temporary_id() {
        let snapshot = FleetSnapshot {
            users: vec![
                user("u1", Some("a")),
                user("u2", Some("b")),
                user("u3", Some("a")),
            ],
            vehicles: vec![vehicle("a", 1.0, 50.0), vehicle("b", 1.0, 50.0)],
        };
        let fleet = Fleet::load(&snapshot);
        let owners = fleet.users_of(&VehicleId::new("a"));
        let ids: Vec<&str> = owners.map(|u| u.id.as_str()).collect();
        assert_eq!(ids, ["u1", "u3"]);
        assert_eq!(fleet.users_of(&VehicleId::from("missing")).count(), 0);
    }

    #[test]
    fn unusable_vehicles_are_excluded() {
        let snapshot = FleetSnapshot {
            users: vec![
                user("u1", Some("zero")),
                user("u2", Some("nan")),
                user("u3", Some("missing")),
                user("u4", None),
                user("u5", Some("ok")),
            ],
            vehicles: vec![
                vehicle("zero", 0.0, 50.0),
                vehicle("nan", f64::NAN, 50.0),
                vehicle("ok", 1.0, 50.0),
            ],
        };
        let fleet = Fleet::load(&snapshot);
        let ids: Vec<_> = fleet.vehicles().iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, ["ok"]);
        // Users stay visible; they just never take part in the countdown.
        assert_eq!(fleet.users().len(), 5);
        assert_eq!(fleet.users_of(&VehicleId::from("zero")).count(), 0);
    }

    #[test]
    fn unparseable_drain_rate_is_excluded_not_fatal() {
        let json = r#"{
            "users": [{"id": "u1", "vehicle": "v1"}],
            "vehicles": [{"id": "v1", "drain_rate": "fast", "current_charge": 30}]
        }"#;
        let fleet = Fleet::load(&FleetSnapshot::from_json(json).unwrap());
        assert!(fleet.vehicles().is_empty());
    }

    #[test]
    fn duplicate_user_keeps_first() {
        let mut second = user("u1", Some("a"));
        second.name = "impostor".into();
        let snapshot = FleetSnapshot {
            users: vec![user("u1", None), second],
            vehicles: vec![vehicle("a", 1.0, 50.0)],
        };
        let fleet = Fleet::load(&snapshot);
        assert_eq!(fleet.users().len(), 1);
        assert_eq!(fleet.users()[0].name, "user u1");
        assert!(fleet.vehicles().is_empty());
    }

    struct CountingRegistry {
        inner: FleetSnapshot,
        list_calls: Cell<u32>,
        get_calls: Cell<u32>,
    }

    impl FleetRegistry for CountingRegistry {
        fn list_users(&self) -> Vec<User> {
            self.list_calls.set(self.list_calls.get() + 1);
            self.inner.list_users()
        }

        fn get_vehicle(&self, id: &VehicleId) -> Option<Vehicle> {
            self.get_calls.set(self.get_calls.get() + 1);
            self.inner.get_vehicle(id)
        }
    }

    #[test]
    fn load_queries_registry_once_per_record() {
        let registry = CountingRegistry {
            inner: FleetSnapshot {
                users: vec![
                    user("u1", Some("a")),
                    user("u2", Some("a")),
                    user("u3", Some("b")),
                    user("u4", None),
                ],
                vehicles: vec![vehicle("a", 1.0, 50.0), vehicle("b", 1.0, 50.0)],
            },
            list_calls: Cell::new(0),
            get_calls: Cell::new(0),
        };
        Fleet::load(&registry);
        assert_eq!(registry.list_calls.get(), 1);
        assert_eq!(registry.get_calls.get(), 2);
    }
}
