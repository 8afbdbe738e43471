// Identifier newtypes for fleet records.
//
// Upstream records are keyed by opaque document ids, so these wrap `String`
// rather than integers. `#[serde(transparent)]` keeps the JSON a bare string.
// All derive `Ord` so they can key `BTreeMap`s: iteration order must never
// depend on hashing.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }
    };
}

string_id!(
    /// Vehicle record id.
    VehicleId
);
string_id!(
    /// User record id.
    UserId
);
string_id!(
    /// Charging station identifier, as returned by the station finder.
    StationId
);
string_id!(
    /// Opaque location token (address, coordinates, ...). Never parsed here;
    /// only forwarded to the station finder.
    Location
);
