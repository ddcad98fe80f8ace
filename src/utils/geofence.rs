use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::ToSchema;

use crate::error::WorkflowError;

/// Mean earth radius used by the haversine approximation.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// GPS fixes reporting a worse accuracy than this are eligible for the
/// lenient re-check when [`AccuracyLeniency`] is enabled.
pub const DEFAULT_LENIENT_ACCURACY_M: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Coordinates {
    #[schema(example = 23.8103)]
    pub latitude: f64,
    #[schema(example = 90.4125)]
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Rejects NaN/infinite values and out-of-range degrees.
    pub fn validated(latitude: f64, longitude: f64) -> Result<Self, WorkflowError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(WorkflowError::Validation(format!(
                "latitude must be between -90 and 90, got {latitude}"
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(WorkflowError::Validation(format!(
                "longitude must be between -180 and 180, got {longitude}"
            )));
        }
        Ok(Self::new(latitude, longitude))
    }
}

/// A reported position plus the device's accuracy radius, in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationFix {
    pub coordinates: Coordinates,
    pub accuracy: Option<f64>,
}

impl LocationFix {
    /// Coordinates are critical and fail hard; accuracy is advisory and is
    /// clamped instead.
    pub fn parse(
        latitude: f64,
        longitude: f64,
        accuracy: Option<f64>,
    ) -> Result<Self, WorkflowError> {
        let coordinates = Coordinates::validated(latitude, longitude)?;
        let accuracy = accuracy.and_then(|value| {
            if !value.is_finite() || value < 0.0 {
                warn!(accuracy = value, "Discarding invalid GPS accuracy");
                None
            } else if value > 10_000.0 {
                warn!(accuracy = value, "Clamping GPS accuracy to 10000 m");
                Some(10_000.0)
            } else {
                Some(value)
            }
        });
        Ok(Self {
            coordinates,
            accuracy,
        })
    }
}

/// Circular work zone owned by a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectGeofence {
    pub center: Coordinates,
    #[schema(example = 100.0)]
    pub radius: f64,
    pub strict_mode: bool,
    #[schema(example = 10.0)]
    pub allowed_variance: f64,
}

impl ProjectGeofence {
    /// Negative or non-finite radius/variance coming from project data are
    /// treated as zero.
    pub fn sanitized(self) -> Self {
        let clamp = |field: &str, value: f64| {
            if value.is_finite() && value >= 0.0 {
                value
            } else {
                warn!(field, value, "Invalid geofence distance in project data, using 0");
                0.0
            }
        };
        Self {
            radius: clamp("radius", self.radius),
            allowed_variance: clamp("allowed_variance", self.allowed_variance),
            ..self
        }
    }
}

/// Opt-in policy for poor GPS fixes: when the reported accuracy is worse
/// than `threshold` and the regular check fails, the point is re-checked
/// against `radius + accuracy`. Never applies to strict-mode geofences.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccuracyLeniency {
    pub threshold: f64,
}

impl Default for AccuracyLeniency {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_LENIENT_ACCURACY_M,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GeofenceCheck {
    pub inside_geofence: bool,
    /// Distance from the geofence center, in meters.
    pub distance: f64,
    pub is_valid: bool,
    pub accuracy_caveat: bool,
    pub message: String,
}

/// Great-circle distance between two points, in meters.
pub fn distance(a: &Coordinates, b: &Coordinates) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lng = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    // rounding near antipodal points can push h just past 1
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

pub fn validate(location: &Coordinates, geofence: &ProjectGeofence) -> GeofenceCheck {
    let distance = distance(location, &geofence.center);
    let inside_geofence = distance <= geofence.radius;
    let within_variance =
        !geofence.strict_mode && distance <= geofence.radius + geofence.allowed_variance;
    let is_valid = inside_geofence || within_variance;

    let message = if inside_geofence {
        format!("Inside project geofence ({:.0} m from site center)", distance)
    } else if is_valid {
        format!(
            "Within allowed variance ({:.0} m from site center, radius {:.0} m)",
            distance, geofence.radius
        )
    } else {
        format!(
            "Outside project geofence ({:.0} m from site center, radius {:.0} m)",
            distance, geofence.radius
        )
    };

    GeofenceCheck {
        inside_geofence,
        distance,
        is_valid,
        accuracy_caveat: false,
        message,
    }
}

/// [`validate`] followed by the accuracy re-check when a policy is given.
pub fn validate_with_policy(
    fix: &LocationFix,
    geofence: &ProjectGeofence,
    leniency: Option<&AccuracyLeniency>,
) -> GeofenceCheck {
    let check = validate(&fix.coordinates, geofence);
    if check.is_valid || geofence.strict_mode {
        return check;
    }

    match (leniency, fix.accuracy) {
        (Some(policy), Some(accuracy)) if accuracy > policy.threshold => {
            if check.distance <= geofence.radius + accuracy {
                GeofenceCheck {
                    is_valid: true,
                    accuracy_caveat: true,
                    message: format!(
                        "Accepted with low GPS accuracy (±{:.0} m); {:.0} m from site center",
                        accuracy, check.distance
                    ),
                    ..check
                }
            } else {
                check
            }
        }
        _ => check,
    }
}
