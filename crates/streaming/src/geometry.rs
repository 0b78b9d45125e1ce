use foundation::bounds::BoundingBox;
use serde_json::Value;

/// Bounds of a GeoJSON geometry object, walking nested coordinate arrays.
///
/// Returns `None` for missing or empty geometries.
pub fn geometry_bounds(geometry: &Value) -> Option<BoundingBox> {
    let mut bounds: Option<BoundingBox> = None;
    if let Some(coords) = geometry.get("coordinates") {
        visit_coordinates(coords, &mut bounds);
    }
    if let Some(Value::Array(parts)) = geometry.get("geometries") {
        for part in parts {
            if let Some(b) = geometry_bounds(part) {
                bounds = foundation::bounds::union(bounds, Some(b));
            }
        }
    }
    bounds
}

fn visit_coordinates(value: &Value, bounds: &mut Option<BoundingBox>) {
    let Value::Array(items) = value else {
        return;
    };
    if let [Value::Number(x), Value::Number(y), ..] = items.as_slice() {
        if let (Some(x), Some(y)) = (x.as_f64(), y.as_f64()) {
            match bounds {
                Some(b) => b.expand_to(x, y),
                None => *bounds = Some(BoundingBox::point(x, y)),
            }
        }
        return;
    }
    for item in items {
        visit_coordinates(item, bounds);
    }
}

#[cfg(test)]
mod tests {
    use super::geometry_bounds;
    use foundation::bounds::BoundingBox;
    use serde_json::json;

    #[test]
    fn polygon_bounds() {
        let g = json!({
            "type": "Polygon",
            "coordinates": [[[11.0, 46.0], [11.5, 46.0], [11.5, 46.4], [11.0, 46.0]]]
        });
        assert_eq!(
            geometry_bounds(&g),
            Some(BoundingBox::new(11.0, 46.0, 11.5, 46.4))
        );
    }

    #[test]
    fn point_and_collection() {
        let g = json!({
            "type": "GeometryCollection",
            "geometries": [
                {"type": "Point", "coordinates": [1.0, 2.0]},
                {"type": "LineString", "coordinates": [[-1.0, 0.0], [0.0, 5.0]]}
            ]
        });
        assert_eq!(
            geometry_bounds(&g),
            Some(BoundingBox::new(-1.0, 0.0, 1.0, 5.0))
        );
    }

    #[test]
    fn empty_geometry_has_no_bounds() {
        assert_eq!(geometry_bounds(&json!(null)), None);
        assert_eq!(
            geometry_bounds(&json!({"type": "MultiPolygon", "coordinates": []})),
            None
        );
    }
}
