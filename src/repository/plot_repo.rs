// ==========================================
// 农场生产分组系统 - 地块数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑（候选过滤由引擎完成）
// 说明: 地块 + 农户状态 + 当季种植计划 + 当季分组归属 一次查询装配
// ==========================================

use chrono::NaiveDate;
use geo::{LineString, Polygon};
use rusqlite::{params, Connection, Row};
use std::sync::{Arc, Mutex};
use tracing::warn;

use crate::domain::plot::{GeoPoint, PlotCandidate, PlotGeometry};
use crate::domain::types::{FarmerStatus, PlotStatus};
use crate::engine::repositories::CandidateSource;
use crate::repository::error::{RepositoryError, RepositoryResult};

// ==========================================
// PlotRepository - 地块仓储
// ==========================================
pub struct PlotRepository {
    conn: Arc<Mutex<Connection>>,
}

impl PlotRepository {
    /// 创建新的地块仓储实例
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = crate::db::open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 查询片区全部地块（含当季种植计划与分组归属）
    ///
    /// # 返回
    /// 按 plot_id 升序；状态字段无法识别的记录按最保守方式装配并记录告警
    pub fn find_by_cluster(
        &self,
        cluster_id: &str,
        season_id: &str,
        year: i32,
    ) -> RepositoryResult<Vec<PlotCandidate>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT
                p.plot_id, p.farmer_id, f.status, p.cluster_id, p.area_ha,
                p.soil_type, p.status, p.centroid_lon, p.centroid_lat, p.boundary_json,
                c.rice_variety_id, c.planting_date, gp.group_id
            FROM plot p
            LEFT JOIN farmer f ON f.farmer_id = p.farmer_id
            LEFT JOIN plot_cultivation c
                ON c.plot_id = p.plot_id AND c.season_id = ?2 AND c.year = ?3
            LEFT JOIN group_plot gp
                ON gp.plot_id = p.plot_id AND gp.season_id = ?2 AND gp.year = ?3
            WHERE p.cluster_id = ?1
            ORDER BY p.plot_id
            "#,
        )?;

        let plots = stmt
            .query_map(params![cluster_id, season_id, year], map_plot_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(plots)
    }

    /// 查询片区在岗监理
    pub fn find_supervisors(&self, cluster_id: &str) -> RepositoryResult<Vec<String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT supervisor_id FROM supervisor WHERE cluster_id = ?1 AND is_active = 1 ORDER BY supervisor_id",
        )?;
        let ids = stmt
            .query_map(params![cluster_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }
}

impl CandidateSource for PlotRepository {
    fn load_candidates(
        &self,
        cluster_id: &str,
        season_id: &str,
        year: i32,
    ) -> RepositoryResult<Vec<PlotCandidate>> {
        self.find_by_cluster(cluster_id, season_id, year)
    }

    fn load_candidate_supervisors(&self, cluster_id: &str) -> RepositoryResult<Vec<String>> {
        self.find_supervisors(cluster_id)
    }
}

fn map_plot_row(row: &Row<'_>) -> rusqlite::Result<PlotCandidate> {
    let plot_id: String = row.get(0)?;

    // 农户记录缺失按 NORMAL，无法识别的状态按 NOT_ALLOWED
    let farmer_status = match row.get::<_, Option<String>>(2)? {
        None => FarmerStatus::Normal,
        Some(raw) => FarmerStatus::from_db_str(&raw).unwrap_or_else(|| {
            warn!(plot_id = %plot_id, raw_status = %raw, "农户状态无法识别，按 NOT_ALLOWED 处理");
            FarmerStatus::NotAllowed
        }),
    };

    // 无法识别的地块状态按 INACTIVE，不进入候选
    let raw_status: String = row.get(6)?;
    let status = PlotStatus::from_db_str(&raw_status).unwrap_or_else(|| {
        warn!(plot_id = %plot_id, raw_status = %raw_status, "地块状态无法识别，按 INACTIVE 处理");
        PlotStatus::Inactive
    });

    let geometry = decode_geometry(
        &plot_id,
        row.get::<_, Option<f64>>(7)?,
        row.get::<_, Option<f64>>(8)?,
        row.get::<_, Option<String>>(9)?,
    );

    let planting_date = row
        .get::<_, Option<String>>(11)?
        .and_then(|raw| match NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
            Ok(date) => Some(date),
            Err(_) => {
                warn!(plot_id = %plot_id, raw_date = %raw, "播种日期格式错误，忽略");
                None
            }
        });

    Ok(PlotCandidate {
        farmer_id: row.get(1)?,
        farmer_status,
        cluster_id: row.get(3)?,
        area_ha: row.get(4)?,
        soil_type: row.get(5)?,
        status,
        geometry,
        rice_variety_id: row.get(10)?,
        planting_date,
        group_id: row.get(12)?,
        plot_id,
    })
}

/// 边界优先于中心点；边界 JSON 为 [[lon, lat], ...]
fn decode_geometry(
    plot_id: &str,
    centroid_lon: Option<f64>,
    centroid_lat: Option<f64>,
    boundary_json: Option<String>,
) -> PlotGeometry {
    if let Some(raw) = boundary_json.filter(|s| !s.trim().is_empty()) {
        match serde_json::from_str::<Vec<[f64; 2]>>(&raw) {
            Ok(ring) => {
                let exterior: LineString<f64> =
                    ring.into_iter().map(|[lon, lat]| (lon, lat)).collect::<Vec<_>>().into();
                return PlotGeometry::Polygon(Polygon::new(exterior, vec![]));
            }
            Err(e) => {
                warn!(plot_id, error = %e, "地块边界 JSON 无法解析，尝试使用中心点");
            }
        }
    }

    match (centroid_lon, centroid_lat) {
        (Some(lon), Some(lat)) => PlotGeometry::Centroid(GeoPoint::new(lon, lat)),
        _ => PlotGeometry::Missing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_geometry_prefers_boundary() {
        let geometry = decode_geometry(
            "P1",
            Some(105.0),
            Some(10.0),
            Some("[[105.0,10.0],[105.001,10.0],[105.001,10.001]]".to_string()),
        );
        match geometry {
            // 外环自动闭合
            PlotGeometry::Polygon(polygon) => assert_eq!(polygon.exterior().0.len(), 4),
            other => panic!("expected polygon, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_geometry_falls_back_to_centroid() {
        let geometry = decode_geometry("P1", Some(105.0), Some(10.0), Some("not json".to_string()));
        assert_eq!(geometry, PlotGeometry::Centroid(GeoPoint::new(105.0, 10.0)));
    }

    #[test]
    fn test_decode_geometry_missing() {
        assert!(decode_geometry("P1", Some(105.0), None, None).is_missing());
    }
}
