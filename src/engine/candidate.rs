// ==========================================
// 农场生产分组系统 - 候选地块集
// ==========================================
// 职责: 将一次运行加载的地块划分为 可聚类候选 / 不可分组报告
// 输入: (cluster, season, year) 下加载的地块快照
// 输出: CandidateSet (已按 plot_id 排序，含投影坐标)
// ==========================================
// 排除 (不计入候选): 非 Active、已归属分组、不属于本片区
// 不可分组 (计入报告): 农户 NotAllowed / 无有效几何 / 无品种 / 无播种日期
// ==========================================

use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::debug;

use crate::domain::plot::{GeoPoint, PlotCandidate, UngroupablePlot};
use crate::domain::types::UngroupableReason;
use crate::engine::geometry::{resolve_centroid, GeometryValidator, LocalProjection};

/// 按 plot_id 查找候选地块
pub type PlotLookup = HashMap<String, PlotCandidate>;

// ==========================================
// EligiblePlot - 可参与聚类的地块
// ==========================================
#[derive(Debug, Clone)]
pub struct EligiblePlot {
    pub plot: PlotCandidate,
    pub rice_variety_id: String,
    pub planting_date: NaiveDate,
    pub centroid: GeoPoint,
    /// 局部投影坐标 (米)
    pub xy: [f64; 2],
}

impl EligiblePlot {
    pub fn plot_id(&self) -> &str {
        &self.plot.plot_id
    }

    pub fn area_ha(&self) -> f64 {
        self.plot.area_ha
    }
}

// ==========================================
// CandidateSet - 候选地块集
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    pub cluster_id: String,
    /// 可聚类地块，按 plot_id 升序
    pub eligible: Vec<EligiblePlot>,
    /// 不可分组地块报告
    pub ungroupable: Vec<UngroupablePlot>,
    /// 本片区内 Active 且未分组的全部地块（供人工/预览校验查找）
    pub available: PlotLookup,
    /// 被排除的地块数量（非 Active / 已分组 / 其他片区）
    pub excluded_count: usize,
}

impl CandidateSet {
    /// 构建候选地块集
    pub fn build(
        cluster_id: &str,
        plots: Vec<PlotCandidate>,
        validator: &dyn GeometryValidator,
    ) -> Self {
        let mut set = CandidateSet {
            cluster_id: cluster_id.to_string(),
            ..Default::default()
        };

        let mut resolved: Vec<(PlotCandidate, String, NaiveDate, GeoPoint)> = Vec::new();

        for plot in plots {
            if plot.cluster_id != cluster_id || !plot.is_active() || plot.is_grouped() {
                debug!(
                    plot_id = %plot.plot_id,
                    status = %plot.status,
                    grouped = plot.is_grouped(),
                    "地块不在候选范围，排除"
                );
                set.excluded_count += 1;
                continue;
            }
            if set.available.contains_key(&plot.plot_id) {
                debug!(plot_id = %plot.plot_id, "重复地块记录，忽略");
                continue;
            }
            set.available.insert(plot.plot_id.clone(), plot.clone());

            if !plot.farmer_status.is_eligible() {
                set.ungroupable.push(
                    UngroupablePlot::new(&plot.plot_id, UngroupableReason::FarmerIneligible)
                        .with_detail(format!("farmer {} is {}", plot.farmer_id, plot.farmer_status)),
                );
                continue;
            }

            if !(plot.area_ha.is_finite() && plot.area_ha > 0.0) {
                set.ungroupable.push(
                    UngroupablePlot::new(&plot.plot_id, UngroupableReason::NoGeometry)
                        .with_detail(format!("invalid area {}", plot.area_ha)),
                );
                continue;
            }

            let centroid = match resolve_centroid(&plot.geometry, validator) {
                Ok(c) => c,
                Err(reason) => {
                    set.ungroupable.push(
                        UngroupablePlot::new(&plot.plot_id, UngroupableReason::NoGeometry)
                            .with_detail(reason),
                    );
                    continue;
                }
            };

            let variety = match plot.rice_variety_id.as_deref().map(str::trim) {
                Some(v) if !v.is_empty() => v.to_string(),
                _ => {
                    set.ungroupable.push(
                        UngroupablePlot::new(&plot.plot_id, UngroupableReason::VarietyMismatch)
                            .with_detail("no rice variety intent"),
                    );
                    continue;
                }
            };

            let Some(planting_date) = plot.planting_date else {
                set.ungroupable.push(UngroupablePlot::new(
                    &plot.plot_id,
                    UngroupableReason::NoPlantingDate,
                ));
                continue;
            };

            resolved.push((plot, variety, planting_date, centroid));
        }

        let centroids: Vec<GeoPoint> = resolved.iter().map(|(_, _, _, c)| *c).collect();
        if let Some(projection) = LocalProjection::centered_on(&centroids) {
            set.eligible = resolved
                .into_iter()
                .map(|(plot, rice_variety_id, planting_date, centroid)| EligiblePlot {
                    xy: projection.project(centroid),
                    plot,
                    rice_variety_id,
                    planting_date,
                    centroid,
                })
                .collect();
        }

        set.eligible.sort_by(|a, b| a.plot.plot_id.cmp(&b.plot.plot_id));
        set.ungroupable.sort_by(|a, b| a.plot_id.cmp(&b.plot_id));
        set
    }

    /// 进入候选集的地块总数（可聚类 + 不可分组）
    pub fn candidate_count(&self) -> usize {
        self.eligible.len() + self.ungroupable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidate_count() == 0
    }
}
