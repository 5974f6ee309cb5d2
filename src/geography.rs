//! Circle radii are always in meters.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::SurveyResponse;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

const PALETTE: [&str; 6] = [
    "#1976d2", "#d32f2f", "#388e3c", "#f57c00", "#7b1fa2", "#0097a7",
];

#[derive(Debug, Error, PartialEq)]
pub enum GeoError {
    #[error("circle not found: {0}")]
    CircleNotFound(Uuid),

    #[error("radius must be a positive number of meters, got {0}")]
    InvalidRadius(f64),

    #[error("coordinates out of range: ({lat}, {lng})")]
    InvalidCoordinates { lat: f64, lng: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Result<Self, GeoError> {
        let valid = lat.is_finite()
            && lng.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lng);
        if valid {
            Ok(Self { lat, lng })
        } else {
            Err(GeoError::InvalidCoordinates { lat, lng })
        }
    }

    /// Great-circle distance in meters.
    pub fn distance_to(&self, other: &Coordinates) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let d_lat = lat2 - lat1;
        let d_lng = (other.lng - self.lng).to_radians();
        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().asin()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeographicCircle {
    pub id: Uuid,
    pub name: String,
    pub center: Coordinates,
    pub radius_m: f64,
    #[serde(default = "default_visible")]
    pub visible: bool,
    pub color: String,
}

fn default_visible() -> bool {
    true
}

impl GeographicCircle {
    pub fn contains(&self, point: &Coordinates) -> bool {
        self.center.distance_to(point) <= self.radius_m
    }

    pub fn radius_label(&self) -> String {
        format_radius(self.radius_m)
    }

    pub fn validate(&self) -> Result<(), GeoError> {
        validate_radius(self.radius_m)?;
        Coordinates::new(self.center.lat, self.center.lng)?;
        Ok(())
    }
}

/// Display form of a radius: meters below one kilometer, kilometers with one
/// decimal from there up.
pub fn format_radius(meters: f64) -> String {
    if meters >= 1000.0 {
        format!("{:.1} km", meters / 1000.0)
    } else {
        format!("{meters:.0} m")
    }
}

fn validate_radius(radius_m: f64) -> Result<f64, GeoError> {
    if radius_m.is_finite() && radius_m > 0.0 {
        Ok(radius_m)
    } else {
        Err(GeoError::InvalidRadius(radius_m))
    }
}

pub trait IdGenerator {
    fn next_id(&mut self) -> Uuid;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn next_id(&mut self) -> Uuid {
        Uuid::new_v4()
    }
}

#[derive(Debug, Clone)]
pub struct CircleSelector<G: IdGenerator = RandomIds> {
    circles: Vec<GeographicCircle>,
    baseline: Vec<GeographicCircle>,
    ids: G,
}

impl CircleSelector<RandomIds> {
    pub fn open(initial: Vec<GeographicCircle>) -> Self {
        Self::with_ids(initial, RandomIds)
    }
}

impl<G: IdGenerator> CircleSelector<G> {
    pub fn with_ids(initial: Vec<GeographicCircle>, ids: G) -> Self {
        Self {
            baseline: initial.clone(),
            circles: initial,
            ids,
        }
    }

    pub fn circles(&self) -> &[GeographicCircle] {
        &self.circles
    }

    pub fn complete_drawing(
        &mut self,
        center: Coordinates,
        radius_m: f64,
    ) -> Result<&GeographicCircle, GeoError> {
        let radius_m = validate_radius(radius_m)?;
        let index = self.circles.len();
        self.circles.push(GeographicCircle {
            id: self.ids.next_id(),
            name: format!("Region {}", index + 1),
            center,
            radius_m,
            visible: true,
            color: PALETTE[index % PALETTE.len()].to_string(),
        });
        Ok(&self.circles[index])
    }

    pub fn move_circle(&mut self, id: Uuid, center: Coordinates) -> Result<(), GeoError> {
        self.find_mut(id)?.center = center;
        Ok(())
    }

    pub fn resize(&mut self, id: Uuid, radius_m: f64) -> Result<(), GeoError> {
        let radius_m = validate_radius(radius_m)?;
        self.find_mut(id)?.radius_m = radius_m;
        Ok(())
    }

    pub fn rename(&mut self, id: Uuid, name: impl Into<String>) -> Result<(), GeoError> {
        self.find_mut(id)?.name = name.into();
        Ok(())
    }

    pub fn toggle_visibility(&mut self, id: Uuid) -> Result<bool, GeoError> {
        let circle = self.find_mut(id)?;
        circle.visible = !circle.visible;
        Ok(circle.visible)
    }

    pub fn delete(&mut self, id: Uuid) -> Result<GeographicCircle, GeoError> {
        let index = self
            .circles
            .iter()
            .position(|c| c.id == id)
            .ok_or(GeoError::CircleNotFound(id))?;
        Ok(self.circles.remove(index))
    }

    pub fn save(&mut self) -> Vec<GeographicCircle> {
        self.baseline = self.circles.clone();
        self.circles.clone()
    }

    pub fn cancel(&mut self) {
        self.circles = self.baseline.clone();
    }

    fn find_mut(&mut self, id: Uuid) -> Result<&mut GeographicCircle, GeoError> {
        self.circles
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(GeoError::CircleNotFound(id))
    }
}

/// Responses located inside at least one visible circle. With no visible
/// circles the input is returned as is; responses without coordinates are
/// dropped otherwise.
pub fn within_circles(
    responses: &[SurveyResponse],
    circles: &[GeographicCircle],
) -> Vec<SurveyResponse> {
    let visible: Vec<&GeographicCircle> = circles.iter().filter(|c| c.visible).collect();
    if visible.is_empty() {
        return responses.to_vec();
    }

    responses
        .iter()
        .filter(|r| match (r.latitude, r.longitude) {
            (Some(lat), Some(lng)) => {
                let point = Coordinates { lat, lng };
                visible.iter().any(|c| c.contains(&point))
            }
            _ => false,
        })
        .cloned()
        .collect()
}
