//! Parsing of upstream detector box lists.
//!
//! Vision providers return bounding boxes in several ad-hoc JSON shapes.
//! Each shape has its own parser; a combinator takes the first that
//! validates and discards entries none of them accept. Coordinates may be
//! normalized 0-1 or 0-1000; the scale is detected from magnitude.

use crate::geometry::NormalizedBox;
use serde_json::Value;

/// One recognized entry encoding, with its payload.
#[derive(Debug, Clone, PartialEq)]
pub enum RawBoxEncoding {
    /// `[xmin, ymin, xmax, ymax]`
    Quad([f64; 4]),
    /// `{"bbox_2d": [...]}`, also `"box_2d"` / `"bbox"`
    Keyed([f64; 4]),
    /// `{"xmin": .., "ymin": .., "xmax": .., "ymax": ..}`
    Scalar([f64; 4]),
    /// `{"xmin": [..], "ymin": [..], ..}` column-wise parallel arrays
    Columns {
        xmin: Vec<f64>,
        ymin: Vec<f64>,
        xmax: Vec<f64>,
        ymax: Vec<f64>,
    },
}

impl RawBoxEncoding {
    /// Expand into raw `[xmin, ymin, xmax, ymax]` quads.
    fn into_quads(self) -> Vec<[f64; 4]> {
        match self {
            RawBoxEncoding::Quad(q) | RawBoxEncoding::Keyed(q) | RawBoxEncoding::Scalar(q) => {
                vec![q]
            }
            RawBoxEncoding::Columns { xmin, ymin, xmax, ymax } => {
                let n = xmin.len().min(ymin.len()).min(xmax.len()).min(ymax.len());
                (0..n)
                    .map(|i| [xmin[i], ymin[i], xmax[i], ymax[i]])
                    .collect()
            }
        }
    }
}

fn number(v: &Value) -> Option<f64> {
    v.as_f64().filter(|n| n.is_finite())
}

fn quad_from_array(v: &Value) -> Option<[f64; 4]> {
    let arr = v.as_array()?;
    if arr.len() != 4 {
        return None;
    }
    let mut out = [0.0f64; 4];
    for (slot, item) in out.iter_mut().zip(arr.iter()) {
        *slot = number(item)?;
    }
    Some(out)
}

fn parse_quad(v: &Value) -> Option<RawBoxEncoding> {
    quad_from_array(v).map(RawBoxEncoding::Quad)
}

fn parse_keyed(v: &Value) -> Option<RawBoxEncoding> {
    let obj = v.as_object()?;
    for key in ["bbox_2d", "box_2d", "bbox"] {
        if let Some(inner) = obj.get(key) {
            return quad_from_array(inner).map(RawBoxEncoding::Keyed);
        }
    }
    None
}

fn parse_scalar(v: &Value) -> Option<RawBoxEncoding> {
    let obj = v.as_object()?;
    let quad = [
        number(obj.get("xmin")?)?,
        number(obj.get("ymin")?)?,
        number(obj.get("xmax")?)?,
        number(obj.get("ymax")?)?,
    ];
    Some(RawBoxEncoding::Scalar(quad))
}

fn parse_columns(v: &Value) -> Option<RawBoxEncoding> {
    let obj = v.as_object()?;
    let column = |key: &str| -> Option<Vec<f64>> {
        obj.get(key)?
            .as_array()?
            .iter()
            .map(number)
            .collect::<Option<Vec<f64>>>()
    };
    Some(RawBoxEncoding::Columns {
        xmin: column("xmin")?,
        ymin: column("ymin")?,
        xmax: column("xmax")?,
        ymax: column("ymax")?,
    })
}

/// First-match combinator over the known encodings.
pub fn parse_entry(v: &Value) -> Option<RawBoxEncoding> {
    parse_quad(v)
        .or_else(|| parse_keyed(v))
        .or_else(|| parse_scalar(v))
        .or_else(|| parse_columns(v))
}

/// Detect the coordinate scale of a quad: any magnitude above 2 but within
/// 1005 means the provider used the 0-1000 convention. Values beyond 1005
/// are garbage and invalidate the quad.
fn normalize_quad(quad: [f64; 4]) -> Option<NormalizedBox> {
    let magnitude = quad.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    if magnitude > 1005.0 {
        return None;
    }
    let scale = if magnitude > 2.0 { 1000.0 } else { 1.0 };
    let b = NormalizedBox::sanitized(
        quad[0] / scale,
        quad[1] / scale,
        quad[2] / scale,
        quad[3] / scale,
    );
    if b.xmax <= b.xmin || b.ymax <= b.ymin {
        return None;
    }
    Some(b)
}

/// Parse a full provider response. Accepts a top-level array or an object
/// wrapping it under `boxes`, `detections` or `objects`. Unparseable or
/// degenerate entries are dropped silently; a malformed document yields an
/// empty list.
pub fn parse_box_list(json: &str) -> Vec<NormalizedBox> {
    let value: Value = match serde_json::from_str(json) {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };
    let entries: &[Value] = if let Some(arr) = value.as_array() {
        arr.as_slice()
    } else if let Some(obj) = value.as_object() {
        let found = ["boxes", "detections", "objects"]
            .iter()
            .find_map(|k| obj.get(*k).and_then(Value::as_array));
        match found {
            Some(arr) => arr.as_slice(),
            // A single bare object entry is tolerated too.
            None => std::slice::from_ref(&value),
        }
    } else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(parse_entry)
        .flat_map(RawBoxEncoding::into_quads)
        .filter_map(normalize_quad)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_array_entries() {
        let boxes = parse_box_list("[[0.1, 0.2, 0.5, 0.6], [0.0, 0.0, 1.0, 1.0]]");
        assert_eq!(boxes.len(), 2);
        assert!((boxes[0].xmin - 0.1).abs() < 1e-12);
        assert!((boxes[0].ymax - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_keyed_entries_with_aliases() {
        for key in ["bbox_2d", "box_2d", "bbox"] {
            let json = format!(r#"[{{"{key}": [0.2, 0.3, 0.4, 0.5]}}]"#);
            let boxes = parse_box_list(&json);
            assert_eq!(boxes.len(), 1, "key {key}");
            assert!((boxes[0].xmin - 0.2).abs() < 1e-12);
        }
    }

    #[test]
    fn test_scalar_fields() {
        let boxes =
            parse_box_list(r#"[{"xmin": 0.1, "ymin": 0.2, "xmax": 0.3, "ymax": 0.4}]"#);
        assert_eq!(boxes.len(), 1);
        assert!((boxes[0].ymin - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_column_arrays_expand() {
        let boxes = parse_box_list(
            r#"[{"xmin": [0.1, 0.5], "ymin": [0.1, 0.5], "xmax": [0.2, 0.7], "ymax": [0.2, 0.7]}]"#,
        );
        assert_eq!(boxes.len(), 2);
        assert!((boxes[1].xmax - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_thousand_scale_detected() {
        let boxes = parse_box_list("[[100, 200, 500, 600]]");
        assert_eq!(boxes.len(), 1);
        assert!((boxes[0].xmin - 0.1).abs() < 1e-12);
        assert!((boxes[0].ymax - 0.6).abs() < 1e-12);
        // Values just above 1 stay in the 0-1 convention.
        let boxes = parse_box_list("[[0.5, 0.5, 1.2, 1.4]]");
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].xmax, 1.0); // clamped, not divided
    }

    #[test]
    fn test_invalid_entries_discarded() {
        let boxes = parse_box_list(
            r#"[[0.1, 0.2, 0.5, 0.6], "noise", {"wrong": 1}, [1.0, 2.0], [5000, 0, 100, 100]]"#,
        );
        assert_eq!(boxes.len(), 1);
    }

    #[test]
    fn test_degenerate_boxes_discarded() {
        let boxes = parse_box_list("[[0.5, 0.1, 0.5, 0.9]]");
        assert!(boxes.is_empty());
    }

    #[test]
    fn test_wrapped_object_forms() {
        for key in ["boxes", "detections", "objects"] {
            let json = format!(r#"{{"{key}": [[0.1, 0.1, 0.4, 0.4]]}}"#);
            assert_eq!(parse_box_list(&json).len(), 1, "key {key}");
        }
        // Single bare object entry.
        let boxes = parse_box_list(r#"{"bbox_2d": [0.1, 0.1, 0.4, 0.4]}"#);
        assert_eq!(boxes.len(), 1);
    }

    #[test]
    fn test_malformed_document_yields_empty() {
        assert!(parse_box_list("not json").is_empty());
        assert!(parse_box_list("42").is_empty());
    }
}
