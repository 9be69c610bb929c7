//! Device location checks against a challenge geofence.

use pramaan_core::{AttendanceConfig, DeviceLocation, Geofence};

#[derive(Debug, Clone, PartialEq)]
pub enum LocationVerdict {
    Accepted,
    /// Outside the fence, too coarse, or missing when required
    Rejected(String),
    /// Spoofing indicators present; also reported to the security sink
    Spoofed(String),
}

#[derive(Debug, Clone)]
pub struct LocationPolicy {
    require_location: bool,
    max_accuracy_m: f64,
    suspicious_accuracy_m: f64,
}

impl LocationPolicy {
    pub fn new(config: &AttendanceConfig) -> Self {
        Self {
            require_location: config.require_location,
            max_accuracy_m: config.max_accuracy_m,
            suspicious_accuracy_m: config.suspicious_accuracy_m,
        }
    }

    pub fn evaluate(
        &self,
        geofence: Option<&Geofence>,
        location: Option<&DeviceLocation>,
    ) -> LocationVerdict {
        let location = match location {
            Some(location) => location,
            None if geofence.is_some() || self.require_location => {
                return LocationVerdict::Rejected("device location is required".to_string())
            }
            None => return LocationVerdict::Accepted,
        };

        if let Err(e) = location.coordinate.validate() {
            return LocationVerdict::Rejected(e.to_string());
        }
        if location.mocked {
            return LocationVerdict::Spoofed("mock location provider active".to_string());
        }
        if !location.accuracy_m.is_finite() || location.accuracy_m < 0.0 {
            return LocationVerdict::Rejected("invalid location accuracy".to_string());
        }
        if location.accuracy_m < self.suspicious_accuracy_m {
            return LocationVerdict::Spoofed(format!(
                "implausible accuracy {:.1}m",
                location.accuracy_m
            ));
        }
        if location.accuracy_m > self.max_accuracy_m {
            return LocationVerdict::Rejected(format!(
                "location accuracy {:.1}m exceeds {:.1}m",
                location.accuracy_m, self.max_accuracy_m
            ));
        }

        if let Some(fence) = geofence {
            let distance = fence.distance_to(&location.coordinate);
            if distance > fence.radius_m {
                return LocationVerdict::Rejected(format!(
                    "{:.0}m from geofence centre, allowed {:.0}m",
                    distance, fence.radius_m
                ));
            }
        }
        LocationVerdict::Accepted
    }
}
