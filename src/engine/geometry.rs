// ==========================================
// 农场生产分组系统 - 几何工具
// ==========================================
// 职责: 多边形有效性接口 (外部能力) + 中心点计算 + 局部平面投影
// 说明: 片区范围有限，采用等距圆柱局部投影，距离单位为米
// 说明: 面积 / 中心 / 距离由 geo 在投影平面上计算
// ==========================================

use geo::{Area, Centroid, Coord, Distance, Euclidean, MapCoords, Point, Polygon};

use crate::domain::plot::{GeoPoint, PlotGeometry};

/// 地球平均半径 (米)
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// 投影后面积下限 (平方米)，低于此值视为退化多边形
const MIN_RING_AREA_M2: f64 = 1e-6;

// ==========================================
// GeometryValidator - 多边形有效性校验 (外部能力)
// ==========================================
pub trait GeometryValidator: Send + Sync {
    /// 校验边界多边形
    ///
    /// # 返回
    /// - `Ok(())`: 有效
    /// - `Err(reason)`: 无效原因
    fn validate_polygon(&self, polygon: &Polygon<f64>) -> Result<(), String>;
}

/// 基础校验：坐标合法、至少 3 个不同顶点、面积非零
#[derive(Debug, Clone, Default)]
pub struct BasicGeometryValidator;

impl GeometryValidator for BasicGeometryValidator {
    fn validate_polygon(&self, polygon: &Polygon<f64>) -> Result<(), String> {
        if let Some(c) = polygon
            .exterior()
            .coords()
            .find(|c| !GeoPoint::from(**c).is_valid())
        {
            return Err(format!("invalid coordinate ({}, {})", c.x, c.y));
        }

        let vertices = distinct_vertices(polygon);
        if vertices < 3 {
            return Err(format!("ring has {} distinct vertices (< 3)", vertices));
        }

        let Some(projected) = project_polygon(polygon) else {
            return Err("empty ring".to_string());
        };
        if projected.unsigned_area() < MIN_RING_AREA_M2 {
            return Err("ring has zero area".to_string());
        }

        Ok(())
    }
}

// ==========================================
// LocalProjection - 局部平面投影
// ==========================================
#[derive(Debug, Clone, Copy)]
pub struct LocalProjection {
    origin: GeoPoint,
    cos_lat: f64,
}

impl LocalProjection {
    pub fn new(origin: GeoPoint) -> Self {
        Self {
            origin,
            cos_lat: origin.lat.to_radians().cos(),
        }
    }

    /// 以一组点的经纬度均值为原点
    pub fn centered_on(points: &[GeoPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let n = points.len() as f64;
        let lon = points.iter().map(|p| p.lon).sum::<f64>() / n;
        let lat = points.iter().map(|p| p.lat).sum::<f64>() / n;
        Some(Self::new(GeoPoint::new(lon, lat)))
    }

    /// 经纬度 → 平面坐标 [x, y] (米)
    pub fn project(&self, p: GeoPoint) -> [f64; 2] {
        let x = (p.lon - self.origin.lon).to_radians() * self.cos_lat * EARTH_RADIUS_M;
        let y = (p.lat - self.origin.lat).to_radians() * EARTH_RADIUS_M;
        [x, y]
    }

    /// 平面坐标 → 经纬度
    pub fn unproject(&self, xy: [f64; 2]) -> GeoPoint {
        let lat = self.origin.lat + (xy[1] / EARTH_RADIUS_M).to_degrees();
        let lon = if self.cos_lat.abs() < f64::EPSILON {
            self.origin.lon
        } else {
            self.origin.lon + (xy[0] / (EARTH_RADIUS_M * self.cos_lat)).to_degrees()
        };
        GeoPoint::new(lon, lat)
    }

    fn project_coord(&self, c: Coord<f64>) -> Coord<f64> {
        let [x, y] = self.project(GeoPoint::from(c));
        Coord { x, y }
    }
}

/// 平面欧氏距离 (米)
pub fn planar_distance(a: [f64; 2], b: [f64; 2]) -> f64 {
    Euclidean::distance(Point::from(a), Point::from(b))
}

/// 解析地块中心点
///
/// # 返回
/// - `Ok(GeoPoint)`: 预置中心点，或边界多边形的面积加权中心
/// - `Err(reason)`: 无几何 / 几何无效
pub fn resolve_centroid(
    geometry: &PlotGeometry,
    validator: &dyn GeometryValidator,
) -> Result<GeoPoint, String> {
    match geometry {
        PlotGeometry::Missing => Err("no boundary or centroid".to_string()),
        PlotGeometry::Centroid(p) => {
            if p.is_valid() {
                Ok(*p)
            } else {
                Err(format!("invalid centroid ({}, {})", p.lon, p.lat))
            }
        }
        PlotGeometry::Polygon(polygon) => {
            validator.validate_polygon(polygon)?;
            polygon_centroid(polygon).ok_or_else(|| "centroid undefined".to_string())
        }
    }
}

/// 多边形面积加权中心，在局部投影中计算后反投影
pub fn polygon_centroid(polygon: &Polygon<f64>) -> Option<GeoPoint> {
    let origin = GeoPoint::from(*polygon.exterior().0.first()?);
    let projection = LocalProjection::new(origin);
    let projected = polygon.map_coords(|c| projection.project_coord(c));
    if projected.unsigned_area() < MIN_RING_AREA_M2 {
        return None;
    }
    let c = projected.centroid()?;
    Some(projection.unproject([c.x(), c.y()]))
}

/// 以首个顶点为原点投影到平面 (米)
fn project_polygon(polygon: &Polygon<f64>) -> Option<Polygon<f64>> {
    let origin = GeoPoint::from(*polygon.exterior().0.first()?);
    let projection = LocalProjection::new(origin);
    Some(polygon.map_coords(|c| projection.project_coord(c)))
}

/// 不同顶点数（忽略闭合点与连续重复顶点）
fn distinct_vertices(polygon: &Polygon<f64>) -> usize {
    let mut out: Vec<Coord<f64>> = Vec::with_capacity(polygon.exterior().0.len());
    for c in polygon.exterior().coords() {
        if out.last() != Some(c) {
            out.push(*c);
        }
    }
    if out.len() > 1 && out.first() == out.last() {
        out.pop();
    }
    out.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Haversine, LineString};

    fn square(lon: f64, lat: f64, size_deg: f64) -> Polygon<f64> {
        ring(&[
            (lon, lat),
            (lon + size_deg, lat),
            (lon + size_deg, lat + size_deg),
            (lon, lat + size_deg),
        ])
    }

    fn ring(coords: &[(f64, f64)]) -> Polygon<f64> {
        Polygon::new(LineString::from(coords.to_vec()), vec![])
    }

    #[test]
    fn test_polygon_centroid_of_square() {
        let c = polygon_centroid(&square(105.0, 10.0, 0.002)).unwrap();
        assert!((c.lon - 105.001).abs() < 1e-6);
        assert!((c.lat - 10.001).abs() < 1e-6);
    }

    #[test]
    fn test_projection_distance_matches_haversine() {
        let origin = GeoPoint::new(105.0, 10.0);
        let projection = LocalProjection::new(origin);
        let target = GeoPoint::new(105.004, 10.01);

        let planar = planar_distance(projection.project(origin), projection.project(target));
        let spherical = Haversine::distance(Point::from(origin), Point::from(target));
        // 片区尺度下投影误差远小于 1 m
        assert!((planar - spherical).abs() < 1.0, "planar={} haversine={}", planar, spherical);
    }

    #[test]
    fn test_projection_round_trip() {
        let projection = LocalProjection::new(GeoPoint::new(105.0, 10.0));
        let p = GeoPoint::new(105.013, 9.987);
        let back = projection.unproject(projection.project(p));
        assert!((back.lon - p.lon).abs() < 1e-9);
        assert!((back.lat - p.lat).abs() < 1e-9);
    }

    #[test]
    fn test_basic_validator_rejects_degenerate_rings() {
        let validator = BasicGeometryValidator;
        let line = ring(&[(105.0, 10.0), (105.001, 10.0), (105.0, 10.0)]);
        assert!(validator.validate_polygon(&line).is_err());

        let collinear = ring(&[(105.0, 10.0), (105.001, 10.0), (105.002, 10.0)]);
        assert!(validator.validate_polygon(&collinear).is_err());

        let out_of_range = ring(&[(185.0, 10.0), (185.001, 10.0), (185.001, 10.001)]);
        assert!(validator.validate_polygon(&out_of_range).is_err());

        assert!(validator.validate_polygon(&square(105.0, 10.0, 0.001)).is_ok());
    }

    #[test]
    fn test_resolve_centroid_variants() {
        let validator = BasicGeometryValidator;
        assert!(resolve_centroid(&PlotGeometry::Missing, &validator).is_err());
        assert!(resolve_centroid(
            &PlotGeometry::Centroid(GeoPoint::new(f64::NAN, 10.0)),
            &validator
        )
        .is_err());
        let c = resolve_centroid(&PlotGeometry::Centroid(GeoPoint::new(105.0, 10.0)), &validator)
            .unwrap();
        assert_eq!(c, GeoPoint::new(105.0, 10.0));

        let c = resolve_centroid(&PlotGeometry::Polygon(square(105.0, 10.0, 0.002)), &validator)
            .unwrap();
        assert!((c.lon - 105.001).abs() < 1e-6);
    }
}
