//! Core identifier types for greenspace.
//!
//! Relational entities are keyed by positive integers assigned by the store.
//! Sensors are keyed by their device identifier and users by the UUID issued
//! by the identity provider.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! int_id {
    ($(#[$meta:meta])* $name:ident, $inner:ty) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name($inner);

        impl $name {
            /// Wrap a raw identifier.
            #[must_use]
            pub const fn new(value: $inner) -> Self {
                Self(value)
            }

            /// Return the raw identifier.
            #[must_use]
            pub const fn get(self) -> $inner {
                self.0
            }

            /// Big-endian encoding, used for ordered storage keys.
            #[must_use]
            pub const fn to_be_bytes(self) -> [u8; std::mem::size_of::<$inner>()] {
                self.0.to_be_bytes()
            }

            /// Decode from the big-endian key encoding.
            #[must_use]
            pub const fn from_be_bytes(bytes: [u8; std::mem::size_of::<$inner>()]) -> Self {
                Self(<$inner>::from_be_bytes(bytes))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse::<$inner>()
                    .map(Self)
                    .map_err(|_| IdError::InvalidNumber(s.to_string()))
            }
        }

        impl From<$inner> for $name {
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }
    };
}

int_id!(
    /// Identifier of a tree.
    TreeId,
    i32
);
int_id!(
    /// Identifier of a tree cluster.
    TreeClusterId,
    i32
);
int_id!(
    /// Identifier of a region polygon.
    RegionId,
    i32
);
int_id!(
    /// Identifier of a watering vehicle.
    VehicleId,
    i32
);
int_id!(
    /// Identifier of a watering plan.
    WateringPlanId,
    i32
);
int_id!(
    /// Identifier of an image reference.
    ImageId,
    i32
);
int_id!(
    /// Identifier of a stored sensor reading.
    SensorDataId,
    i64
);

/// A sensor identifier, equal to the device identifier reported on the wire.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SensorId(String);

impl SensorId {
    /// Create a sensor ID from a device identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the identifier is empty or contains a NUL byte,
    /// which is reserved as the storage key separator.
    pub fn new(device_id: impl Into<String>) -> Result<Self, IdError> {
        let device_id = device_id.into();
        if device_id.trim().is_empty() {
            return Err(IdError::Empty);
        }
        if device_id.contains('\0') {
            return Err(IdError::InvalidCharacter);
        }
        Ok(Self(device_id))
    }

    /// Return the device identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Return the bytes of the device identifier.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SensorId({})", self.0)
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SensorId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for SensorId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SensorId> for String {
    fn from(id: SensorId) -> Self {
        id.0
    }
}

impl AsRef<[u8]> for SensorId {
    fn as_ref(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

/// A user identifier issued by the identity provider (UUID format).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(uuid::Uuid);

impl UserId {
    /// Create a new `UserId` from a UUID.
    #[must_use]
    pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// Generate a new random `UserId`.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Return the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl FromStr for UserId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = uuid::Uuid::parse_str(s).map_err(|_| IdError::InvalidUuid)?;
        Ok(Self(uuid))
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for UserId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0.to_string()
    }
}

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The identifier is empty.
    #[error("identifier must not be empty")]
    Empty,

    /// The identifier contains a reserved character.
    #[error("identifier contains a reserved character")]
    InvalidCharacter,

    /// The input is not a valid integer identifier.
    #[error("invalid numeric identifier: {0}")]
    InvalidNumber(String),

    /// The input is not a valid UUID.
    #[error("invalid UUID format")]
    InvalidUuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_id_roundtrip() {
        let id = TreeId::new(42);
        let parsed: TreeId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert_eq!(TreeId::from_be_bytes(id.to_be_bytes()), id);
    }

    #[test]
    fn int_id_key_order_matches_numeric_order() {
        let a = WateringPlanId::new(2).to_be_bytes();
        let b = WateringPlanId::new(300).to_be_bytes();
        assert!(a < b);
    }

    #[test]
    fn int_id_invalid() {
        let result = "abc".parse::<VehicleId>();
        assert!(matches!(result, Err(IdError::InvalidNumber(_))));
    }

    #[test]
    fn sensor_id_rejects_empty() {
        assert_eq!(SensorId::new("  "), Err(IdError::Empty));
        assert_eq!(SensorId::new("a\0b"), Err(IdError::InvalidCharacter));
    }

    #[test]
    fn sensor_id_serde_json() {
        let id = SensorId::new("eui-a84041d10185f10c").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"eui-a84041d10185f10c\"");
        let parsed: SensorId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
        assert!(serde_json::from_str::<SensorId>("\"\"").is_err());
    }

    #[test]
    fn int_id_serde_is_transparent() {
        let json = serde_json::to_string(&TreeClusterId::new(7)).unwrap();
        assert_eq!(json, "7");
    }

    #[test]
    fn user_id_roundtrip() {
        let id = UserId::generate();
        let parsed = UserId::from_str(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
        assert!(matches!(
            UserId::from_str("not-a-uuid"),
            Err(IdError::InvalidUuid)
        ));
    }
}
