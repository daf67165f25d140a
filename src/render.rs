use serde::Serialize;

use crate::accounts::{AccountEntity, ResolvedCoordinate};
use crate::encoder::{color_from_revenue, radius_from_revenue, HslColor};
use crate::errors::AppError;

pub const FILL_OPACITY: f64 = 0.6;
pub const STROKE_WEIGHT: u32 = 2;
pub const STROKE_OPACITY: f64 = 0.8;
pub const FIT_PADDING_PX: u32 = 20;

/// Receives one pipeline run's output.
pub trait RenderConsumer: Send {
    fn set_loading(&mut self, loading: bool);
    fn show_entities(&mut self, entities: Vec<AccountEntity>);
    fn show_error(&mut self, error: &AppError);
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MapView {
    pub center: ResolvedCoordinate,
    pub zoom: f64,
    pub min_zoom: f64,
    pub max_bounds: Bounds,
}

impl Default for MapView {
    fn default() -> Self {
        Self {
            center: ResolvedCoordinate::new(20.0, 0.0),
            zoom: 2.0,
            min_zoom: 1.0,
            max_bounds: Bounds {
                south_west: ResolvedCoordinate::new(-85.0, -180.0),
                north_east: ResolvedCoordinate::new(85.0, 180.0),
            },
        }
    }
}

impl MapView {
    pub fn clamp_zoom(&self, zoom: f64) -> f64 {
        if zoom.is_finite() {
            zoom.max(self.min_zoom)
        } else {
            self.zoom
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub south_west: ResolvedCoordinate,
    pub north_east: ResolvedCoordinate,
}

impl Bounds {
    pub fn as_bbox(&self) -> [f64; 4] {
        [
            self.south_west.lng,
            self.south_west.lat,
            self.north_east.lng,
            self.north_east.lat,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Popup {
    pub title: Option<String>,
    pub address: String,
    pub revenue_label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircleStyle {
    pub id: String,
    pub center: ResolvedCoordinate,
    pub radius_m: f64,
    pub color: HslColor,
    pub fill_color: HslColor,
    pub fill_opacity: f64,
    pub weight: u32,
    pub opacity: f64,
    pub popup: Popup,
}

impl CircleStyle {
    pub fn for_entity(entity: &AccountEntity, zoom: f64) -> Self {
        let color = color_from_revenue(&entity.id);
        Self {
            id: entity.id.clone(),
            center: entity.coordinate,
            radius_m: radius_from_revenue(entity.revenue, zoom),
            color,
            fill_color: color,
            fill_opacity: FILL_OPACITY,
            weight: STROKE_WEIGHT,
            opacity: STROKE_OPACITY,
            popup: Popup {
                title: entity.name.clone(),
                address: entity.address.clone(),
                revenue_label: revenue_label(entity.revenue),
            },
        }
    }
}

/// Re-evaluated whenever the zoom changes; colors stay fixed, radii follow zoom.
pub fn circle_layer(entities: &[AccountEntity], zoom: f64) -> Vec<CircleStyle> {
    entities
        .iter()
        .map(|entity| CircleStyle::for_entity(entity, zoom))
        .collect()
}

/// `Revenue: $15.0M`, shown only for positive revenue.
pub fn revenue_label(revenue: f64) -> Option<String> {
    (revenue > 0.0).then(|| format!("Revenue: ${:.1}M", revenue / 1_000_000.0))
}

/// Smallest box containing every entity, used to frame the map.
pub fn fit_bounds(entities: &[AccountEntity]) -> Option<Bounds> {
    let mut iter = entities.iter().map(|entity| entity.coordinate);
    let first = iter.next()?;
    let bounds = iter.fold(
        Bounds {
            south_west: first,
            north_east: first,
        },
        |acc, point| Bounds {
            south_west: ResolvedCoordinate::new(
                acc.south_west.lat.min(point.lat),
                acc.south_west.lng.min(point.lng),
            ),
            north_east: ResolvedCoordinate::new(
                acc.north_east.lat.max(point.lat),
                acc.north_east.lng.max(point.lng),
            ),
        },
    );
    Some(bounds)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(id: &str, lat: f64, lng: f64, revenue: f64) -> AccountEntity {
        AccountEntity {
            id: id.to_string(),
            name: Some(format!("Account {id}")),
            coordinate: ResolvedCoordinate::new(lat, lng),
            address: "Somewhere".into(),
            revenue,
        }
    }

    #[test]
    fn formats_revenue_labels() {
        assert_eq!(revenue_label(0.0), None);
        assert_eq!(revenue_label(15_000_000.0).as_deref(), Some("Revenue: $15.0M"));
        assert_eq!(revenue_label(1_240_000.0).as_deref(), Some("Revenue: $1.2M"));
    }

    #[test]
    fn styles_circles_from_encoder() {
        let layer = circle_layer(&[entity("abc", 10.0, 20.0, 15_000_000.0)], 3.0);
        let circle = &layer[0];
        assert_eq!(circle.color.to_string(), "hsl(234, 70%, 50%)");
        assert_eq!(circle.fill_color, circle.color);
        assert_eq!(circle.radius_m, 100_000.0);
        assert_eq!(circle.weight, 2);
        assert_eq!(circle.popup.title.as_deref(), Some("Account abc"));
    }

    #[test]
    fn zoom_changes_radius_not_color() {
        let accounts = [entity("abc", 0.0, 0.0, 25_000_000.0)];
        let far = circle_layer(&accounts, 10.0);
        let near = circle_layer(&accounts, 12.0);
        assert_eq!(far[0].color, near[0].color);
        assert!(near[0].radius_m < far[0].radius_m);
    }

    #[test]
    fn fits_bounds_around_entities() {
        assert_eq!(fit_bounds(&[]), None);
        let bounds = fit_bounds(&[
            entity("a", 40.7, -74.0, 0.0),
            entity("b", 51.5, -0.1, 0.0),
            entity("c", -33.9, 151.2, 0.0),
        ])
        .unwrap();
        assert_eq!(bounds.south_west, ResolvedCoordinate::new(-33.9, -74.0));
        assert_eq!(bounds.north_east, ResolvedCoordinate::new(51.5, 151.2));
        assert_eq!(bounds.as_bbox(), [-74.0, -33.9, 151.2, 51.5]);
    }

    #[test]
    fn map_view_keeps_zoom_above_minimum() {
        let view = MapView::default();
        assert_eq!(view.clamp_zoom(0.0), 1.0);
        assert_eq!(view.clamp_zoom(f64::NAN), 2.0);
        assert_eq!(view.clamp_zoom(7.5), 7.5);
    }
}
