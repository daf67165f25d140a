use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const ADDRESS_DELIMITER: &str = ", ";

const ID_FIELD: &str = "accountid";
const NAME_FIELD: &str = "name";
const REVENUE_FIELD: &str = "revenue";
const LATITUDE_FIELDS: [&str; 2] = ["address1_latitude", "address1_lat"];
const LONGITUDE_FIELDS: [&str; 2] = ["address1_longitude", "address1_long"];
const ADDRESS_FIELDS: [&str; 5] = [
    "address1_line1",
    "address1_city",
    "address1_stateorprovince",
    "address1_postalcode",
    "address1_country",
];

/// Fields requested from the directory: exactly the ones the accessors below read.
pub const SELECTED_FIELDS: [&str; 12] = [
    ID_FIELD,
    NAME_FIELD,
    REVENUE_FIELD,
    LATITUDE_FIELDS[0],
    LATITUDE_FIELDS[1],
    LONGITUDE_FIELDS[0],
    LONGITUDE_FIELDS[1],
    ADDRESS_FIELDS[0],
    ADDRESS_FIELDS[1],
    ADDRESS_FIELDS[2],
    ADDRESS_FIELDS[3],
    ADDRESS_FIELDS[4],
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvedCoordinate {
    pub lat: f64,
    pub lng: f64,
}

impl ResolvedCoordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Both axes parsed to finite numbers.
    pub fn finite(lat: Option<f64>, lng: Option<f64>) -> Option<Self> {
        match (lat, lng) {
            (Some(lat), Some(lng)) if lat.is_finite() && lng.is_finite() => Some(Self { lat, lng }),
            _ => None,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

/// A directory record as delivered by the account service. Fields are read by
/// convention and any of them may be absent or carry an unexpected type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawAccountRecord(Value);

impl RawAccountRecord {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn id(&self) -> Option<String> {
        self.field(ID_FIELD).and_then(scalar_text)
    }

    pub fn name(&self) -> Option<String> {
        self.field(NAME_FIELD).and_then(scalar_text)
    }

    /// Latitude/longitude stored on the record, checking the primary and the
    /// alternate field name for each axis.
    pub fn direct_coordinate(&self) -> Option<ResolvedCoordinate> {
        ResolvedCoordinate::finite(
            self.first_number(&LATITUDE_FIELDS),
            self.first_number(&LONGITUDE_FIELDS),
        )
    }

    /// Present, non-empty address components joined with [`ADDRESS_DELIMITER`].
    /// Empty when the record carries no usable address.
    pub fn address(&self) -> String {
        ADDRESS_FIELDS
            .iter()
            .filter_map(|field| self.field(field))
            .filter(|value| !is_falsy(value))
            .filter_map(scalar_text)
            .collect::<Vec<_>>()
            .join(ADDRESS_DELIMITER)
    }

    pub fn revenue(&self) -> f64 {
        parse_revenue(self.field(REVENUE_FIELD))
    }

    fn field(&self, name: &str) -> Option<&Value> {
        self.0.get(name).filter(|value| !value.is_null())
    }

    // The alternate name is consulted only when the primary is absent.
    fn first_number(&self, names: &[&str]) -> Option<f64> {
        names
            .iter()
            .find_map(|name| self.field(name))
            .and_then(parse_number)
    }
}

impl From<Value> for RawAccountRecord {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountEntity {
    pub id: String,
    pub name: Option<String>,
    pub coordinate: ResolvedCoordinate,
    pub address: String,
    pub revenue: f64,
}

impl AccountEntity {
    pub fn from_record(record: &RawAccountRecord, coordinate: ResolvedCoordinate) -> Self {
        Self {
            id: record.id().unwrap_or_default(),
            name: record.name(),
            coordinate,
            address: record.address(),
            revenue: record.revenue(),
        }
    }
}

/// Absent or falsy revenue is zero; anything else is parsed, clamped to be
/// non-negative, and zeroed when the parse is not finite.
pub fn parse_revenue(value: Option<&Value>) -> f64 {
    let Some(value) = value else {
        return 0.0;
    };
    if is_falsy(value) {
        return 0.0;
    }
    match parse_number(value) {
        Some(num) if num.is_finite() => num.max(0.0),
        _ => 0.0,
    }
}

/// Numeric reading of a JSON value. Strings are read up to the longest
/// leading decimal literal, so `"40.7 N"` yields `40.7`.
pub fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(num) => num.as_f64(),
        Value::String(text) => parse_float_prefix(text),
        _ => None,
    }
}

pub fn parse_float_prefix(text: &str) -> Option<f64> {
    let trimmed = text.trim_start();
    let bytes = trimmed.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end += 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut mantissa_digits = end - digits_start;
    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        mantissa_digits += frac_end - frac_start;
        if mantissa_digits > 0 {
            end = frac_end;
        }
    }
    if mantissa_digits == 0 {
        let rest = &trimmed[digits_start..];
        return rest.starts_with("Infinity").then(|| {
            if trimmed.starts_with('-') {
                f64::NEG_INFINITY
            } else {
                f64::INFINITY
            }
        });
    }
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && matches!(bytes[exp_end], b'+' | b'-') {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }
    trimmed[..end].parse::<f64>().ok()
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(num) => num.as_f64().map(|n| n == 0.0 || n.is_nan()).unwrap_or(false),
        Value::String(text) => text.is_empty(),
        _ => false,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(num) => num.as_f64().map(number_text),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

// Integral values print without a fraction so `62701.0` and `62701` give the
// same address key.
fn number_text(num: f64) -> String {
    if num == 0.0 {
        "0".to_string()
    } else if num.fract() == 0.0 && num.abs() < 1e21 {
        format!("{num:.0}")
    } else {
        num.to_string()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn reads_direct_coordinates_from_alternate_fields() {
        let record = RawAccountRecord::new(json!({
            "address1_lat": "40.7",
            "address1_long": -74.0,
        }));
        assert_eq!(
            record.direct_coordinate(),
            Some(ResolvedCoordinate::new(40.7, -74.0))
        );
    }

    #[test]
    fn rejects_partial_or_non_numeric_coordinates() {
        let partial = RawAccountRecord::new(json!({ "address1_latitude": "40.7" }));
        assert_eq!(partial.direct_coordinate(), None);

        let garbage = RawAccountRecord::new(json!({
            "address1_latitude": "north",
            "address1_longitude": "-74.0",
        }));
        assert_eq!(garbage.direct_coordinate(), None);

        let infinite = RawAccountRecord::new(json!({
            "address1_latitude": "Infinity",
            "address1_longitude": "1",
        }));
        assert_eq!(infinite.direct_coordinate(), None);
    }

    #[test]
    fn builds_address_from_present_components() {
        let record = RawAccountRecord::new(json!({
            "address1_line1": "1 Main St",
            "address1_city": "Springfield",
            "address1_stateorprovince": "",
            "address1_postalcode": 62701,
            "address1_country": null,
        }));
        assert_eq!(record.address(), "1 Main St, Springfield, 62701");

        let empty = RawAccountRecord::new(json!({ "name": "Nowhere Inc" }));
        assert_eq!(empty.address(), "");
    }

    #[test]
    fn numeric_components_match_browser_cache_keys() {
        let record = RawAccountRecord::new(json!({
            "address1_line1": 12.5,
            "address1_city": "Springfield",
            "address1_stateorprovince": 0,
            "address1_postalcode": 62701.0,
            "address1_country": false,
        }));
        assert_eq!(record.address(), "12.5, Springfield, 62701");
    }

    #[test]
    fn selected_fields_cover_every_accessor() {
        let mut read: Vec<&str> = vec![ID_FIELD, NAME_FIELD, REVENUE_FIELD];
        read.extend(LATITUDE_FIELDS);
        read.extend(LONGITUDE_FIELDS);
        read.extend(ADDRESS_FIELDS);
        read.sort_unstable();

        let mut selected = SELECTED_FIELDS.to_vec();
        selected.sort_unstable();
        assert_eq!(selected, read);
        assert!(selected.contains(&"address1_lat"));
        assert!(selected.contains(&"address1_long"));
        assert!(!selected.contains(&"address1_composite"));
    }

    #[test]
    fn parses_revenue_leniently() {
        assert_eq!(parse_revenue(None), 0.0);
        assert_eq!(parse_revenue(Some(&json!(""))), 0.0);
        assert_eq!(parse_revenue(Some(&json!(0))), 0.0);
        assert_eq!(parse_revenue(Some(&json!("15000000"))), 15_000_000.0);
        assert_eq!(parse_revenue(Some(&json!(2500.5))), 2500.5);
        assert_eq!(parse_revenue(Some(&json!("-10"))), 0.0);
        assert_eq!(parse_revenue(Some(&json!("n/a"))), 0.0);
        assert_eq!(parse_revenue(Some(&json!("Infinity"))), 0.0);
        assert_eq!(parse_revenue(Some(&json!({ "amount": 5 }))), 0.0);
    }

    #[test]
    fn parses_leading_float_literals() {
        assert_eq!(parse_float_prefix("  42"), Some(42.0));
        assert_eq!(parse_float_prefix("-74.0abc"), Some(-74.0));
        assert_eq!(parse_float_prefix(".5"), Some(0.5));
        assert_eq!(parse_float_prefix("1e3x"), Some(1000.0));
        assert_eq!(parse_float_prefix("1e"), Some(1.0));
        assert_eq!(parse_float_prefix("abc"), None);
        assert_eq!(parse_float_prefix("-"), None);
        assert_eq!(parse_float_prefix(""), None);
    }

    #[test]
    fn builds_entity_from_record() {
        let record = RawAccountRecord::new(json!({
            "accountid": "acc-1",
            "name": "Contoso",
            "address1_city": "Seattle",
            "revenue": "1200000",
        }));
        let entity = AccountEntity::from_record(&record, ResolvedCoordinate::new(47.6, -122.3));
        assert_eq!(entity.id, "acc-1");
        assert_eq!(entity.name.as_deref(), Some("Contoso"));
        assert_eq!(entity.address, "Seattle");
        assert_eq!(entity.revenue, 1_200_000.0);
    }
}
