use serde::Deserialize;
use serde_json::Value;

use crate::{error::ConvertError, location::LatLng};

/// Status / visit value used when the export leaves the field out
pub const UNKNOWN_VALUE: &str = "unknown";

#[derive(Debug, Clone, PartialEq)]
/// One row of the EDDMapS sightings export
pub struct SightingRecord {
    pub id: u64,
    pub latitude: f64,
    pub longitude: f64,
    pub observation_date: String,
    pub eradication_status: String,
    pub visit_type: String,
}

impl SightingRecord {
    pub fn position(&self) -> LatLng {
        LatLng::new(self.latitude, self.longitude)
    }
}

/// Exports are inconsistent about quoting numbers
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum FlexValue {
    Number(serde_json::Number),
    Text(String),
}

impl FlexValue {
    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => n.as_f64(),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Ids written as integral floats (`42.0`) are accepted too
    fn as_id(&self) -> Option<u64> {
        match self {
            Self::Number(n) => n.as_u64().or_else(|| n.as_f64().and_then(integral_id)),
            Self::Text(s) => {
                let s = s.trim();
                s.parse()
                    .ok()
                    .or_else(|| s.parse().ok().and_then(integral_id))
            }
        }
    }

    fn into_string(self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s,
        }
    }
}

fn integral_id(value: f64) -> Option<u64> {
    (value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value < u64::MAX as f64)
        .then_some(value as u64)
}

#[derive(Debug, Default, Deserialize)]
struct RawKeys {
    #[serde(default)]
    observationdate: Option<FlexValue>,
    #[serde(default)]
    eradicationstatusid: Option<FlexValue>,
    #[serde(default)]
    visittype: Option<FlexValue>,
}

#[derive(Debug, Deserialize)]
struct RawRow {
    objectid: FlexValue,
    latitude_decimal: FlexValue,
    longitude_decimal: FlexValue,
    #[serde(default)]
    keys: Option<RawKeys>,
    #[serde(flatten)]
    flat: RawKeys,
}

impl RawRow {
    fn into_record(self) -> Result<SightingRecord, String> {
        let id = self
            .objectid
            .as_id()
            .ok_or_else(|| format!("objectid {:?} is not a non-negative integer", self.objectid))?;

        let RawKeys {
            observationdate,
            eradicationstatusid,
            visittype,
        } = self.keys.unwrap_or_default();
        let flat = self.flat;

        let pick = |nested: Option<FlexValue>, flat: Option<FlexValue>| {
            nested.or(flat).map(FlexValue::into_string)
        };

        Ok(SightingRecord {
            id,
            // Unparseable coordinates become NaN and are rejected during validation
            latitude: self.latitude_decimal.as_f64().unwrap_or(f64::NAN),
            longitude: self.longitude_decimal.as_f64().unwrap_or(f64::NAN),
            observation_date: pick(observationdate, flat.observationdate).unwrap_or_default(),
            eradication_status: pick(eradicationstatusid, flat.eradicationstatusid)
                .unwrap_or_else(|| UNKNOWN_VALUE.to_string()),
            visit_type: pick(visittype, flat.visittype)
                .unwrap_or_else(|| UNKNOWN_VALUE.to_string()),
        })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Parse the raw export. Accepts `{"data": [...]}` as produced by EDDMapS or a
/// bare array of rows.
pub fn parse_source(bytes: &[u8]) -> Result<Vec<SightingRecord>, ConvertError> {
    let doc: Value = serde_json::from_slice(bytes)?;

    let rows = match doc {
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(rows)) => rows,
            Some(other) => {
                return Err(ConvertError::SourceShape(format!(
                    "`data` must be an array, found {}",
                    json_kind(&other)
                )));
            }
            None => {
                return Err(ConvertError::SourceShape(
                    "expected an object with a `data` array".to_string(),
                ));
            }
        },
        Value::Array(rows) => rows,
        other => {
            return Err(ConvertError::SourceShape(format!(
                "expected an object or an array, found {}",
                json_kind(&other)
            )));
        }
    };

    rows.into_iter()
        .enumerate()
        .map(|(i, row)| {
            serde_json::from_value::<RawRow>(row)
                .map_err(|why| why.to_string())
                .and_then(RawRow::into_record)
                .map_err(|why| ConvertError::SourceShape(format!("row {i}: {why}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_keys() {
        let raw = br#"{"data":[{"objectid":42,"latitude_decimal":40.0,"longitude_decimal":-75.0,"keys":{"observationdate":"2023-06-01","eradicationstatusid":"treated","visittype":"initial"}}]}"#;
        let records = parse_source(raw).expect("Failed to parse");
        assert_eq!(
            records,
            vec![SightingRecord {
                id: 42,
                latitude: 40.0,
                longitude: -75.0,
                observation_date: "2023-06-01".to_string(),
                eradication_status: "treated".to_string(),
                visit_type: "initial".to_string(),
            }]
        );
    }

    #[test]
    fn test_flat_rows_and_bare_array() {
        let raw = br#"[{"objectid":"9","latitude_decimal":"39.5","longitude_decimal":-76.25,"observationdate":"2022-08-10","eradicationstatusid":3,"visittype":"Follow-up"}]"#;
        let records = parse_source(raw).expect("Failed to parse");
        let record = &records[0];
        assert_eq!(record.id, 9);
        assert_eq!(record.latitude, 39.5);
        assert_eq!(record.longitude, -76.25);
        assert_eq!(record.eradication_status, "3");
        assert_eq!(record.visit_type, "Follow-up");
    }

    #[test]
    fn test_nested_wins_over_flat() {
        let raw = br#"[{"objectid":1,"latitude_decimal":1,"longitude_decimal":2,"visittype":"flat","keys":{"visittype":"nested"}}]"#;
        let records = parse_source(raw).expect("Failed to parse");
        assert_eq!(records[0].visit_type, "nested");
        assert_eq!(records[0].eradication_status, UNKNOWN_VALUE);
        assert_eq!(records[0].observation_date, "");
    }

    #[test]
    fn test_bad_coordinate_text_is_nan() {
        let raw = br#"[{"objectid":1,"latitude_decimal":"north","longitude_decimal":2}]"#;
        let records = parse_source(raw).expect("Failed to parse");
        assert!(records[0].latitude.is_nan());
    }

    #[test]
    fn test_malformed_json() {
        let err = parse_source(b"{\"data\": [").unwrap_err();
        assert!(matches!(err, ConvertError::SourceParse(_)), "{err:?}");
    }

    #[test]
    fn test_wrong_shape() {
        for raw in [&b"{\"rows\": []}"[..], b"{\"data\": 5}", b"\"hello\""] {
            let err = parse_source(raw).unwrap_err();
            assert!(matches!(err, ConvertError::SourceShape(_)), "{err:?}");
        }
    }

    #[test]
    fn test_missing_required_field_reports_row() {
        let raw = br#"{"data":[{"objectid":1,"latitude_decimal":1,"longitude_decimal":2},{"objectid":2,"latitude_decimal":1}]}"#;
        let err = parse_source(raw).unwrap_err();
        match err {
            ConvertError::SourceShape(msg) => assert!(msg.starts_with("row 1:"), "{msg}"),
            other => panic!("Unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_integral_float_ids() {
        let raw = br#"[{"objectid":42.0,"latitude_decimal":1,"longitude_decimal":2},{"objectid":"7.0","latitude_decimal":1,"longitude_decimal":2}]"#;
        let ids = parse_source(raw)
            .expect("Failed to parse")
            .iter()
            .map(|r| r.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![42, 7]);

        let raw = br#"[{"objectid":4.5,"latitude_decimal":1,"longitude_decimal":2}]"#;
        assert!(matches!(
            parse_source(raw),
            Err(ConvertError::SourceShape(_))
        ));
    }

    #[test]
    fn test_negative_id_rejected() {
        let raw = br#"[{"objectid":-4,"latitude_decimal":1,"longitude_decimal":2}]"#;
        assert!(matches!(
            parse_source(raw),
            Err(ConvertError::SourceShape(_))
        ));
    }
}
