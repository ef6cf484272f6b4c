//! Read-only organization directory: offices, floors, desks, and users.
//!
//! The directory is loaded once from a seed file at startup and never
//! mutated by the engine. Reservation rows reference it by id; lookups are
//! best-effort so a dangling reference degrades display data instead of
//! failing a query.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::warn;
use ulid::Ulid;

use crate::model::Occupant;

/// Access level inside an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Member,
    Admin,
}

#[derive(Debug, Clone)]
pub struct Office {
    pub id: Ulid,
    pub name: String,
    /// IANA zone name, e.g. "Europe/Berlin".
    pub timezone: String,
}

#[derive(Debug, Clone)]
pub struct Floor {
    pub id: Ulid,
    pub office_id: Ulid,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct Desk {
    pub id: Ulid,
    pub floor_id: Ulid,
    /// Number printed on the physical desk.
    pub public_desk_id: u32,
}

impl Desk {
    /// Label shown to users, zero-padded to three digits.
    pub fn display_id(&self) -> String {
        format!("{:03}", self.public_desk_id)
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: Ulid,
    pub name: String,
    pub image: Option<String>,
    pub role: Role,
}

#[derive(Debug, Default)]
pub struct Directory {
    offices: HashMap<Ulid, Office>,
    floors: HashMap<Ulid, Floor>,
    desks: HashMap<Ulid, Desk>,
    users: HashMap<Ulid, User>,
}

impl Directory {
    pub fn from_parts(
        offices: Vec<Office>,
        floors: Vec<Floor>,
        desks: Vec<Desk>,
        users: Vec<User>,
    ) -> Self {
        let mut dir = Self::default();
        for o in offices {
            if dir.offices.insert(o.id, o).is_some() {
                warn!("duplicate office id in directory seed");
            }
        }
        for f in floors {
            if !dir.offices.contains_key(&f.office_id) {
                warn!("floor {} references unknown office {}", f.id, f.office_id);
            }
            dir.floors.insert(f.id, f);
        }
        for d in desks {
            if !dir.floors.contains_key(&d.floor_id) {
                warn!("desk {} references unknown floor {}", d.id, d.floor_id);
            }
            dir.desks.insert(d.id, d);
        }
        for u in users {
            dir.users.insert(u.id, u);
        }
        dir
    }

    pub fn from_seed(seed: DirectorySeed) -> Self {
        let mut offices = Vec::new();
        let mut floors = Vec::new();
        let mut desks = Vec::new();
        for o in seed.offices {
            offices.push(Office {
                id: o.id,
                name: o.name,
                timezone: o.timezone,
            });
            for f in o.floors {
                floors.push(Floor {
                    id: f.id,
                    office_id: o.id,
                    name: f.name,
                });
                for d in f.desks {
                    desks.push(Desk {
                        id: d.id,
                        floor_id: f.id,
                        public_desk_id: d.public_desk_id,
                    });
                }
            }
        }
        let users = seed
            .users
            .into_iter()
            .map(|u| User {
                id: u.id,
                name: u.name,
                image: u.image,
                role: u.role,
            })
            .collect();
        Self::from_parts(offices, floors, desks, users)
    }

    pub fn office(&self, id: Ulid) -> Option<&Office> {
        self.offices.get(&id)
    }

    pub fn floor(&self, id: Ulid) -> Option<&Floor> {
        self.floors.get(&id)
    }

    pub fn desk(&self, id: Ulid) -> Option<&Desk> {
        self.desks.get(&id)
    }

    pub fn user(&self, id: Ulid) -> Option<&User> {
        self.users.get(&id)
    }

    /// Walk desk → floor → office.
    pub fn office_of_desk(&self, desk_id: Ulid) -> Option<&Office> {
        let desk = self.desks.get(&desk_id)?;
        let floor = self.floors.get(&desk.floor_id)?;
        self.offices.get(&floor.office_id)
    }

    /// All desks of an office, ordered by their printed number.
    pub fn desks_in_office(&self, office_id: Ulid) -> Vec<&Desk> {
        let mut desks: Vec<&Desk> = self
            .desks
            .values()
            .filter(|d| {
                self.floors
                    .get(&d.floor_id)
                    .is_some_and(|f| f.office_id == office_id)
            })
            .collect();
        desks.sort_by_key(|d| d.public_desk_id);
        desks
    }

    /// Display data for the user holding a reservation. A user that has
    /// left the directory still renders, just without name or image.
    pub fn occupant(&self, user_id: Ulid) -> Occupant {
        match self.users.get(&user_id) {
            Some(u) => Occupant {
                user_id,
                name: Some(u.name.clone()),
                image: u.image.clone(),
            },
            None => Occupant {
                user_id,
                name: None,
                image: None,
            },
        }
    }
}

// ── Seed file format ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct Manifest {
    pub organizations: Vec<OrgSeed>,
}

#[derive(Debug, Deserialize)]
pub struct OrgSeed {
    pub name: String,
    pub directory: DirectorySeed,
}

#[derive(Debug, Deserialize)]
pub struct DirectorySeed {
    pub offices: Vec<OfficeSeed>,
    pub users: Vec<UserSeed>,
}

#[derive(Debug, Deserialize)]
pub struct OfficeSeed {
    pub id: Ulid,
    pub name: String,
    pub timezone: String,
    pub floors: Vec<FloorSeed>,
}

#[derive(Debug, Deserialize)]
pub struct FloorSeed {
    pub id: Ulid,
    pub name: String,
    pub desks: Vec<DeskSeed>,
}

#[derive(Debug, Deserialize)]
pub struct DeskSeed {
    pub id: Ulid,
    pub public_desk_id: u32,
}

#[derive(Debug, Deserialize)]
pub struct UserSeed {
    pub id: Ulid,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub role: Role,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_json() -> String {
        let office = Ulid::new();
        let floor_a = Ulid::new();
        let floor_b = Ulid::new();
        let desk_1 = Ulid::new();
        let desk_2 = Ulid::new();
        let alice = Ulid::new();
        let bob = Ulid::new();
        format!(
            r#"{{
                "offices": [{{
                    "id": "{office}",
                    "name": "Berlin",
                    "timezone": "Europe/Berlin",
                    "floors": [
                        {{"id": "{floor_a}", "name": "4th floor", "desks": [
                            {{"id": "{desk_1}", "public_desk_id": 7}}
                        ]}},
                        {{"id": "{floor_b}", "name": "5th floor", "desks": [
                            {{"id": "{desk_2}", "public_desk_id": 101}}
                        ]}}
                    ]
                }}],
                "users": [
                    {{"id": "{alice}", "name": "Alice", "role": "admin"}},
                    {{"id": "{bob}", "name": "Bob", "image": "https://example.com/b.png"}}
                ]
            }}"#
        )
    }

    #[test]
    fn seed_roundtrip() {
        let seed: DirectorySeed = serde_json::from_str(&seed_json()).unwrap();
        let dir = Directory::from_seed(seed);

        let offices: Vec<&Office> = dir.offices.values().collect();
        assert_eq!(offices.len(), 1);
        let office = offices[0];
        assert_eq!(office.timezone, "Europe/Berlin");

        let desks = dir.desks_in_office(office.id);
        assert_eq!(desks.len(), 2);
        // Ordered by printed number, not insertion.
        assert_eq!(desks[0].public_desk_id, 7);
        assert_eq!(desks[1].public_desk_id, 101);

        let via_walk = dir.office_of_desk(desks[0].id).unwrap();
        assert_eq!(via_walk.id, office.id);
    }

    #[test]
    fn role_defaults_to_member() {
        let seed: DirectorySeed = serde_json::from_str(&seed_json()).unwrap();
        let dir = Directory::from_seed(seed);
        let roles: Vec<Role> = dir.users.values().map(|u| u.role).collect();
        assert!(roles.contains(&Role::Admin));
        assert!(roles.contains(&Role::Member));
    }

    #[test]
    fn display_id_zero_pads() {
        let desk = Desk {
            id: Ulid::new(),
            floor_id: Ulid::new(),
            public_desk_id: 7,
        };
        assert_eq!(desk.display_id(), "007");
        let wide = Desk {
            public_desk_id: 1024,
            ..desk
        };
        assert_eq!(wide.display_id(), "1024");
    }

    #[test]
    fn occupant_for_unknown_user_is_bare() {
        let dir = Directory::default();
        let id = Ulid::new();
        let occupant = dir.occupant(id);
        assert_eq!(occupant.user_id, id);
        assert!(occupant.name.is_none());
        assert!(occupant.image.is_none());
    }

    #[test]
    fn dangling_floor_reference_is_tolerated() {
        let office_id = Ulid::new();
        let dir = Directory::from_parts(
            vec![Office {
                id: office_id,
                name: "HQ".into(),
                timezone: "UTC".into(),
            }],
            vec![],
            vec![Desk {
                id: Ulid::new(),
                floor_id: Ulid::new(), // no such floor
                public_desk_id: 1,
            }],
            vec![],
        );
        assert!(dir.desks_in_office(office_id).is_empty());
    }
}
