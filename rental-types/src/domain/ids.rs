//! Strongly-typed identifiers.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

macro_rules! define_id {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
            #[serde(transparent)]
            pub struct $name(Uuid);

            impl $name {
                /// Creates a new random identifier.
                pub fn new() -> Self {
                    Self(Uuid::new_v4())
                }

                /// Wraps an existing UUID.
                pub fn from_uuid(uuid: Uuid) -> Self {
                    Self(uuid)
                }

                /// Returns the underlying UUID.
                pub fn as_uuid(&self) -> &Uuid {
                    &self.0
                }

                pub fn into_uuid(self) -> Uuid {
                    self.0
                }
            }

            impl Default for $name {
                fn default() -> Self {
                    Self::new()
                }
            }

            impl std::fmt::Display for $name {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    write!(f, "{}", self.0)
                }
            }

            impl std::str::FromStr for $name {
                type Err = uuid::Error;

                fn from_str(s: &str) -> Result<Self, Self::Err> {
                    Ok(Self(Uuid::parse_str(s)?))
                }
            }
        )*
    };
}

define_id! {
    /// Unique identifier for a Booking.
    BookingId,
    /// A renter or staff member (owned by the external user directory).
    UserId,
    /// A vehicle in the external catalog.
    VehicleId,
    /// A pickup/return station in the external catalog.
    StationId,
}
