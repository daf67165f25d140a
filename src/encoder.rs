use std::fmt;

use serde::{Serialize, Serializer};

pub const SATURATION_PERCENT: u8 = 70;
pub const LIGHTNESS_PERCENT: u8 = 50;
pub const MAX_RADIUS_METERS: f64 = 100_000.0;

const METERS_PER_BASE_UNIT: f64 = 1_500.0;
const MIN_SCALE: f64 = 0.1;
const SCALE_ZOOM_ORIGIN: f64 = 13.0;
const DETAIL_ZOOM: f64 = 5.0;
const FLAT_REVENUE_CEILING: f64 = 10_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HslColor {
    pub hue: u16,
    pub saturation: u8,
    pub lightness: u8,
}

impl fmt::Display for HslColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hsl({}, {}%, {}%)",
            self.hue, self.saturation, self.lightness
        )
    }
}

impl Serialize for HslColor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Rolling string hash over UTF-16 code units: `h = c + ((h << 5) - h)`.
///
/// The shift operates on the low 32 bits of `h` as a signed integer while the
/// subtraction and addition keep the full value, so the accumulator can grow
/// past the 32-bit range between steps.
pub fn id_hash(id: &str) -> i64 {
    id.encode_utf16().fold(0_i64, |hash, unit| {
        let shifted = (hash as i32).wrapping_shl(5) as i64;
        i64::from(unit) + (shifted - hash)
    })
}

/// Stable per-account color; the name is historical, only the id feeds it.
pub fn color_from_revenue(id: &str) -> HslColor {
    let hue = (id_hash(id).unsigned_abs() % 360) as u16;
    HslColor {
        hue,
        saturation: SATURATION_PERCENT,
        lightness: LIGHTNESS_PERCENT,
    }
}

/// Circle radius in meters for a revenue figure at a map zoom level.
///
/// Zoomed out (below 5) the base is revenue in millions; zoomed in it is one
/// unit below ten million and revenue in tens of millions above. The base is
/// scaled by `max(0.1, 13 - zoom)`, converted at 1500 m per unit, and capped.
pub fn radius_from_revenue(revenue: f64, zoom: f64) -> f64 {
    let base = if zoom < DETAIL_ZOOM {
        revenue / 1_000_000.0
    } else if revenue < FLAT_REVENUE_CEILING {
        1.0
    } else {
        revenue / FLAT_REVENUE_CEILING
    };
    let scale = (SCALE_ZOOM_ORIGIN - zoom).max(MIN_SCALE);
    (base * scale * METERS_PER_BASE_UNIT).min(MAX_RADIUS_METERS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn hash_matches_reference_values() {
        assert_eq!(id_hash(""), 0);
        assert_eq!(id_hash("abc"), 96_354);
        assert_eq!(id_hash("0a1b2c3d-0000-4a5b-9c8d-123456789abc"), 3_527_845_333);
        assert_eq!(id_hash("Contoso Ltd — 東京"), 1_465_558_162);
    }

    #[test]
    fn colors_are_stable_hsl_strings() {
        assert_eq!(color_from_revenue("abc").to_string(), "hsl(234, 70%, 50%)");
        assert_eq!(color_from_revenue("").to_string(), "hsl(0, 70%, 50%)");
        assert_eq!(
            color_from_revenue("0a1b2c3d-0000-4a5b-9c8d-123456789abc").hue,
            133
        );
        assert_eq!(color_from_revenue("Contoso Ltd — 東京").hue, 322);

        let id = "7d5a1c2e-93f1-ee11-a1fe-000d3a5b1c4f";
        assert_eq!(color_from_revenue(id), color_from_revenue(id));
        assert_eq!(
            serde_json::to_string(&color_from_revenue("abc")).unwrap(),
            "\"hsl(234, 70%, 50%)\""
        );
    }

    #[test]
    fn hue_stays_in_range_for_long_ids() {
        let long_id = "account-".repeat(500);
        let color = color_from_revenue(&long_id);
        assert!(color.hue < 360);
    }

    #[test]
    fn clamps_extreme_revenue_at_low_zoom() {
        assert_eq!(radius_from_revenue(15_000_000.0, 3.0), MAX_RADIUS_METERS);
    }

    #[test]
    fn computes_reference_radii() {
        assert!(close(radius_from_revenue(5_000_000.0, 8.0), 7_500.0));
        assert!(close(radius_from_revenue(25_000_000.0, 10.0), 11_250.0));
        assert!(close(radius_from_revenue(2_000_000.0, 4.0), 27_000.0));
        assert!(close(radius_from_revenue(25_000_000.0, 15.0), 375.0));
        assert!(close(radius_from_revenue(5_000_000.0, 13.0), 150.0));
        assert_eq!(radius_from_revenue(0.0, 1.0), 0.0);
    }

    #[test]
    fn radius_is_bounded_and_non_increasing_within_each_regime() {
        let revenues = [0.0, 1.0, 999_999.0, 9_999_999.0, 10_000_000.0, 4.2e7, 1e12];
        for revenue in revenues {
            for zooms in [1..=4, 5..=13] {
                let mut previous = f64::INFINITY;
                for zoom in zooms {
                    let radius = radius_from_revenue(revenue, zoom as f64);
                    assert!(radius >= 0.0, "negative radius for {revenue} at {zoom}");
                    assert!(radius <= MAX_RADIUS_METERS);
                    assert!(
                        radius <= previous,
                        "radius grew for {revenue} at zoom {zoom}: {radius} > {previous}"
                    );
                    previous = radius;
                }
            }
        }
    }

    #[test]
    fn detail_threshold_swaps_base_unit() {
        // Small accounts get a flat one-unit base once zoomed past the threshold.
        assert!(radius_from_revenue(100_000.0, 5.0) > radius_from_revenue(100_000.0, 4.0));
        assert!(radius_from_revenue(50_000_000.0, 5.0) < radius_from_revenue(50_000_000.0, 4.0));
        assert!(close(radius_from_revenue(100_000.0, 20.0), 150.0));
    }
}
