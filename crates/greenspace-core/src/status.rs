//! Closed string enumerations used across the domain model.
//!
//! Each enumeration carries an `unknown` sentinel. Unrecognised wire values
//! deserialise to the sentinel instead of failing.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! closed_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$vmeta])* #[serde(rename = $text)] $variant,)+
            /// Sentinel for absent or unrecognised values.
            #[default]
            #[serde(other)]
            Unknown,
        }

        impl $name {
            /// Returns the wire string for this value.
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                    Self::Unknown => "unknown",
                }
            }

            /// Parse a wire string, falling back to `Unknown`.
            #[must_use]
            pub fn parse(s: &str) -> Self {
                match s {
                    $($text => Self::$variant,)+
                    _ => Self::Unknown,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

closed_enum!(
    /// Derived watering health of a tree or cluster.
    WateringStatus {
        /// Soil moisture is sufficient.
        Good => "good",
        /// Watering is advisable soon.
        Moderate => "moderate",
        /// Watering is required.
        Bad => "bad",
        /// Watered by a finished plan.
        JustWatered => "just_watered",
    }
);

closed_enum!(
    /// Connectivity status of a sensor.
    SensorStatus {
        /// Reported within the cutoff window.
        Online => "online",
        /// No reading within the cutoff window.
        Offline => "offline",
    }
);

closed_enum!(
    /// Soil type of a tree cluster.
    SoilCondition {
        /// Silty soil.
        Schluffig => "schluffig",
        /// Sandy soil.
        Sandig => "sandig",
        /// Loamy soil.
        Lehmig => "lehmig",
        /// Clay soil.
        Tonig => "tonig",
    }
);

closed_enum!(
    /// Kind of watering vehicle.
    VehicleType {
        /// Self-propelled transporter.
        Transporter => "transporter",
        /// Towed trailer.
        Trailer => "trailer",
    }
);

closed_enum!(
    /// Availability of a vehicle.
    VehicleStatus {
        /// Currently on a route.
        Active => "active",
        /// Ready for assignment.
        Available => "available",
        /// Out of service.
        NotAvailable => "not_available",
    }
);

closed_enum!(
    /// Lifecycle state of a watering plan.
    WateringPlanStatus {
        /// Scheduled for a future date.
        Planned => "planned",
        /// Currently being executed.
        Active => "active",
        /// Aborted before completion.
        Cancelled => "cancelled",
        /// Completed.
        Finished => "finished",
        /// Date passed without execution.
        NotCompleted => "not_completed",
    }
);

closed_enum!(
    /// Driving licence class required for a vehicle.
    DrivingLicense {
        /// Class B.
        B => "B",
        /// Class BE.
        Be => "BE",
        /// Class C.
        C => "C",
        /// Class CE.
        Ce => "CE",
    }
);

closed_enum!(
    /// Role of a platform user.
    UserRole {
        /// Field staff.
        Employee => "employee",
        /// Route planner.
        Planner => "planner",
        /// Administrator.
        Admin => "admin",
    }
);
