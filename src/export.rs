use std::fs;
use std::path::Path;

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::accounts::AccountEntity;
use crate::config::OutputFormat;
use crate::errors::{AppError, AppResult};
use crate::render::{circle_layer, fit_bounds, CircleStyle, MapView, RenderConsumer, FIT_PADDING_PX};

/// Render consumer that keeps the last delivered run and writes it to disk.
#[derive(Debug, Default)]
pub struct ExportConsumer {
    loading: bool,
    entities: Vec<AccountEntity>,
    last_error: Option<String>,
}

impl ExportConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn entities(&self) -> &[AccountEntity] {
        &self.entities
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn write(&self, path: &Path, format: OutputFormat, zoom: f64) -> AppResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let view = MapView::default();
        let zoom = view.clamp_zoom(zoom);
        let circles = circle_layer(&self.entities, zoom);
        match format {
            OutputFormat::GeoJson => {
                let document = feature_collection(&self.entities, &circles, &view, zoom);
                fs::write(path, serde_json::to_string_pretty(&document)?)?;
            }
            OutputFormat::Csv => write_csv(path, &circles)?,
        }
        info!(path = %path.display(), circles = circles.len(), "map export written");
        Ok(())
    }
}

impl RenderConsumer for ExportConsumer {
    fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    fn show_entities(&mut self, entities: Vec<AccountEntity>) {
        self.entities = entities;
        self.last_error = None;
    }

    fn show_error(&mut self, error: &AppError) {
        warn!(%error, "run failed; keeping previous export contents");
        self.last_error = Some(error.to_string());
    }
}

pub fn feature_collection(
    entities: &[AccountEntity],
    circles: &[CircleStyle],
    view: &MapView,
    zoom: f64,
) -> Value {
    let features: Vec<Value> = circles
        .iter()
        .map(|circle| {
            json!({
                "type": "Feature",
                "id": circle.id,
                "geometry": {
                    "type": "Point",
                    "coordinates": [circle.center.lng, circle.center.lat],
                },
                "properties": {
                    "radius_m": circle.radius_m,
                    "color": circle.color,
                    "fill_color": circle.fill_color,
                    "fill_opacity": circle.fill_opacity,
                    "weight": circle.weight,
                    "opacity": circle.opacity,
                    "name": circle.popup.title,
                    "address": circle.popup.address,
                    "revenue_label": circle.popup.revenue_label,
                },
            })
        })
        .collect();

    let mut document = json!({
        "type": "FeatureCollection",
        "features": features,
        "properties": {
            "generated_at": Utc::now().to_rfc3339(),
            "zoom": zoom,
            "view": view,
            "fit_padding_px": FIT_PADDING_PX,
        },
    });
    if let Some(bounds) = fit_bounds(entities) {
        document["bbox"] = json!(bounds.as_bbox());
    }
    document
}

#[derive(Serialize)]
struct CsvRow<'a> {
    id: &'a str,
    name: &'a str,
    lat: f64,
    lng: f64,
    address: &'a str,
    radius_m: f64,
    color: String,
    revenue_label: &'a str,
}

fn write_csv(path: &Path, circles: &[CircleStyle]) -> AppResult<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for circle in circles {
        writer.serialize(CsvRow {
            id: &circle.id,
            name: circle.popup.title.as_deref().unwrap_or_default(),
            lat: circle.center.lat,
            lng: circle.center.lng,
            address: &circle.popup.address,
            radius_m: circle.radius_m,
            color: circle.color.to_string(),
            revenue_label: circle.popup.revenue_label.as_deref().unwrap_or_default(),
        })?;
    }
    writer.flush()?;
    Ok(())
}
