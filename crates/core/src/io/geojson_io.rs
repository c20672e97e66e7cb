//! GeoJSON reading into `FeatureCollection`.
//!
//! Landcover polygons and the attribute lookup tables are all read
//! through here; table rows are features with a `null` geometry.

use crate::error::{Error, Result};
use crate::vector::{AttributeValue, Feature, FeatureCollection};
use geojson::feature::Id;
use geojson::GeoJson;
use serde_json::Value;
use std::path::Path;

/// Read a GeoJSON file (FeatureCollection or single Feature)
pub fn read_geojson<P: AsRef<Path>>(path: P) -> Result<FeatureCollection> {
    let text = std::fs::read_to_string(path.as_ref())?;
    read_geojson_from_str(&text)
}

/// Parse GeoJSON text
pub fn read_geojson_from_str(text: &str) -> Result<FeatureCollection> {
    let parsed: GeoJson = text.parse()?;

    let features = match parsed {
        GeoJson::FeatureCollection(fc) => fc.features,
        GeoJson::Feature(f) => vec![f],
        GeoJson::Geometry(_) => {
            return Err(Error::GeoJson(
                "expected a Feature or FeatureCollection, found a bare Geometry".into(),
            ))
        }
    };

    let mut collection = FeatureCollection::new();
    for feature in features {
        collection.push(convert_feature(feature)?);
    }
    Ok(collection)
}

fn convert_feature(feature: geojson::Feature) -> Result<Feature> {
    let mut out = match feature.geometry {
        Some(geometry) => Feature::new(geo_types::Geometry::<f64>::try_from(geometry)?),
        None => Feature::empty(),
    };

    out.id = feature.id.map(|id| match id {
        Id::String(s) => s,
        Id::Number(n) => n.to_string(),
    });

    for (key, value) in feature.properties.into_iter().flatten() {
        out.set_property(key, convert_value(value));
    }

    Ok(out)
}

fn convert_value(value: Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null,
        Value::Bool(b) => AttributeValue::Bool(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => AttributeValue::Int(i),
            None => n.as_f64().map_or(AttributeValue::Null, AttributeValue::Float),
        },
        Value::String(s) => AttributeValue::String(s),
        other => AttributeValue::String(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LANDCOVER: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "id": 7,
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[0.0, 0.0], [4.0, 0.0], [4.0, 4.0], [0.0, 4.0], [0.0, 0.0]]]
                },
                "properties": { "Main_habit": "Heath", "area_ha": 1.5 }
            },
            {
                "type": "Feature",
                "geometry": null,
                "properties": { "Main_habit": null, "code": 3 }
            }
        ]
    }"#;

    #[test]
    fn test_reads_geometry_and_attributes() {
        let table = read_geojson_from_str(LANDCOVER).unwrap();
        assert_eq!(table.len(), 2);

        let first = table.iter().next().unwrap();
        assert!(matches!(first.geometry, Some(geo_types::Geometry::Polygon(_))));
        assert_eq!(first.id.as_deref(), Some("7"));
        assert_eq!(table.value(0, "Main_habit"), &AttributeValue::from("Heath"));
        assert_eq!(table.value(0, "area_ha"), &AttributeValue::Float(1.5));
        assert_eq!(table.value(1, "code"), &AttributeValue::Int(3));
        assert!(table.value(1, "Main_habit").is_null());
        assert!(table.has_field("code"));
    }

    #[test]
    fn test_bare_geometry_is_rejected() {
        let text = r#"{ "type": "Point", "coordinates": [1.0, 2.0] }"#;
        assert!(matches!(read_geojson_from_str(text), Err(Error::GeoJson(_))));
    }

    #[test]
    fn test_invalid_json_is_reported() {
        assert!(read_geojson_from_str("{ not json").is_err());
    }
}
