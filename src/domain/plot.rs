// ==========================================
// 农场生产分组系统 - 地块领域模型
// ==========================================
// 红线: 候选地块在一次分组运行内为不可变快照
// ==========================================

use chrono::NaiveDate;
use geo::{Coord, Point, Polygon};
use serde::{Deserialize, Serialize};

use crate::domain::types::{FarmerStatus, PlotStatus, UngroupableReason};

// ==========================================
// GeoPoint - WGS84 经纬度坐标
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lon: f64, // 经度
    pub lat: f64, // 纬度
}

impl GeoPoint {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// 坐标是否为有限值且在经纬度范围内
    pub fn is_valid(&self) -> bool {
        self.lon.is_finite()
            && self.lat.is_finite()
            && (-180.0..=180.0).contains(&self.lon)
            && (-90.0..=90.0).contains(&self.lat)
    }
}

impl From<GeoPoint> for Point<f64> {
    fn from(p: GeoPoint) -> Self {
        Point::new(p.lon, p.lat)
    }
}

impl From<Coord<f64>> for GeoPoint {
    fn from(c: Coord<f64>) -> Self {
        GeoPoint::new(c.x, c.y)
    }
}

// ==========================================
// PlotGeometry - 地块几何
// ==========================================
// 地块可以提供边界多边形 (x = 经度, y = 纬度)，或预先计算好的中心点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlotGeometry {
    Polygon(Polygon<f64>),
    Centroid(GeoPoint),
    Missing,
}

impl PlotGeometry {
    pub fn is_missing(&self) -> bool {
        matches!(self, PlotGeometry::Missing)
    }
}

// ==========================================
// PlotCandidate - 候选地块
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlotCandidate {
    pub plot_id: String,                 // 地块ID
    pub farmer_id: String,               // 所属农户
    pub farmer_status: FarmerStatus,     // 农户状态快照
    pub cluster_id: String,              // 所属片区
    pub geometry: PlotGeometry,          // 边界或中心点
    pub area_ha: f64,                    // 面积 (公顷)
    pub soil_type: Option<String>,       // 土壤类型 (仅展示)
    pub status: PlotStatus,              // 地块状态
    pub rice_variety_id: Option<String>, // 计划种植品种
    pub planting_date: Option<NaiveDate>,// 计划播种日期
    pub group_id: Option<String>,        // 当季已归属的分组 (None = 未分组)
}

impl PlotCandidate {
    /// 是否已归属其他分组
    pub fn is_grouped(&self) -> bool {
        self.group_id.is_some()
    }

    pub fn is_active(&self) -> bool {
        self.status == PlotStatus::Active
    }
}

// ==========================================
// UngroupablePlot - 不可分组地块报告
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UngroupablePlot {
    pub plot_id: String,
    pub reason: UngroupableReason,
    pub detail: Option<String>,
}

impl UngroupablePlot {
    pub fn new(plot_id: impl Into<String>, reason: UngroupableReason) -> Self {
        Self {
            plot_id: plot_id.into(),
            reason,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
