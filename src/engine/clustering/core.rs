// ==========================================
// 农场生产分组系统 - 聚类引擎
// ==========================================
// 算法: 确定性 种子-生长 + 欠规模合并 + 例外分流
// 红线: 每个候选地块最终恰好进入一个 proposal 或一条不可分组报告
// 红线: 相同输入与参数 → 相同的分组划分与顺序
// ==========================================

use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::{debug, info, instrument};

use crate::domain::group::{GroupProposal, PlantingWindow};
use crate::domain::parameters::GroupingParameters;
use crate::domain::plot::UngroupablePlot;
use crate::domain::types::{SingletonPolicy, UngroupableReason};
use crate::engine::candidate::EligiblePlot;
use crate::engine::geometry::planar_distance;
use crate::engine::proximity::{distance_key, ProximityIndex};

/// 面积比较容差 (公顷)
const AREA_EPSILON_HA: f64 = 1e-9;

/// 聚类输出
#[derive(Debug, Clone, Default)]
pub struct ClusteringOutput {
    pub proposals: Vec<GroupProposal>,
    pub ungroupable: Vec<UngroupablePlot>,
}

// ==========================================
// WorkingCluster - 生长中的簇
// ==========================================
#[derive(Debug, Clone)]
struct WorkingCluster {
    members: Vec<usize>,
    rice_variety_id: String,
    area_ha: f64,
    sum_xy: [f64; 2],
    earliest: NaiveDate,
    latest: NaiveDate,
    merge_attempts: u32,
    alive: bool,
}

impl WorkingCluster {
    fn seed(idx: usize, plot: &EligiblePlot) -> Self {
        Self {
            members: vec![idx],
            rice_variety_id: plot.rice_variety_id.clone(),
            area_ha: plot.area_ha(),
            sum_xy: plot.xy,
            earliest: plot.planting_date,
            latest: plot.planting_date,
            merge_attempts: 0,
            alive: true,
        }
    }

    fn len(&self) -> usize {
        self.members.len()
    }

    fn centroid(&self) -> [f64; 2] {
        let n = self.members.len() as f64;
        [self.sum_xy[0] / n, self.sum_xy[1] / n]
    }

    fn window(&self) -> PlantingWindow {
        PlantingWindow::from_bounds(self.earliest, self.latest)
    }

    fn span_with(&self, earliest: NaiveDate, latest: NaiveDate) -> i64 {
        (self.latest.max(latest) - self.earliest.min(earliest)).num_days()
    }

    fn push(&mut self, idx: usize, plot: &EligiblePlot) {
        self.members.push(idx);
        self.area_ha += plot.area_ha();
        self.sum_xy[0] += plot.xy[0];
        self.sum_xy[1] += plot.xy[1];
        self.earliest = self.earliest.min(plot.planting_date);
        self.latest = self.latest.max(plot.planting_date);
    }

    fn absorb(&mut self, other: &WorkingCluster) {
        self.members.extend_from_slice(&other.members);
        self.area_ha += other.area_ha;
        self.sum_xy[0] += other.sum_xy[0];
        self.sum_xy[1] += other.sum_xy[1];
        self.earliest = self.earliest.min(other.earliest);
        self.latest = self.latest.max(other.latest);
    }

    fn is_undersized(&self, params: &GroupingParameters) -> bool {
        self.len() < params.min_plots_per_group
            || self.area_ha + AREA_EPSILON_HA < params.min_group_area_ha
    }
}

// ==========================================
// ClusteringEngine - 聚类引擎
// ==========================================
pub struct ClusteringEngine {
    // 无状态引擎，参数通过调用传入
}

impl ClusteringEngine {
    pub fn new() -> Self {
        Self {}
    }

    /// 将候选地块划分为候选分组
    ///
    /// # 参数
    /// - `cluster_id`: 片区ID
    /// - `candidates`: 可聚类地块（顺序不限，内部按 plot_id 固定种子顺序）
    /// - `params`: 已校验的分组参数
    ///
    /// # 返回
    /// 候选分组（按簇创建顺序）+ 被策略判定为孤立的地块
    #[instrument(skip(self, candidates, params), fields(
        cluster_id = %cluster_id,
        candidates_count = candidates.len()
    ))]
    pub fn cluster(
        &self,
        cluster_id: &str,
        candidates: &[EligiblePlot],
        params: &GroupingParameters,
    ) -> ClusteringOutput {
        if candidates.is_empty() {
            return ClusteringOutput::default();
        }

        // 1. 固定种子顺序
        let mut plots: Vec<&EligiblePlot> = candidates.iter().collect();
        plots.sort_by(|a, b| a.plot_id().cmp(b.plot_id()));

        let positions: HashMap<&str, usize> = plots
            .iter()
            .enumerate()
            .map(|(i, p)| (p.plot_id(), i))
            .collect();
        let index = ProximityIndex::build(
            plots
                .iter()
                .map(|p| (p.plot_id().to_string(), p.xy))
                .collect(),
        );

        // 2-3. 种子生长
        let mut assigned = vec![false; plots.len()];
        let mut clusters: Vec<WorkingCluster> = Vec::new();

        for seed in 0..plots.len() {
            if assigned[seed] {
                continue;
            }
            assigned[seed] = true;
            let mut cluster = WorkingCluster::seed(seed, plots[seed]);

            while cluster.len() < params.max_plots_per_group {
                let Some(next) = self.next_member(&cluster, &plots, &positions, &assigned, &index, params)
                else {
                    break;
                };
                assigned[next] = true;
                cluster.push(next, plots[next]);
            }

            debug!(
                seed = %plots[seed].plot_id(),
                members = cluster.len(),
                area_ha = cluster.area_ha,
                "簇生长完成"
            );
            clusters.push(cluster);
        }

        // 4. 欠规模簇合并
        self.merge_undersized(&mut clusters, params);

        // 5. 生成候选分组 / 例外分流
        let output = self.finalize(cluster_id, &clusters, &plots, params);

        info!(
            proposals_count = output.proposals.len(),
            exception_count = output.proposals.iter().filter(|p| p.is_exception).count(),
            isolated_count = output.ungroupable.len(),
            "聚类完成"
        );
        output
    }

    /// 选出下一个加入簇的地块
    ///
    /// 条件: 未分配、品种一致、播种跨度不超 2×容差、面积与数量不超上限、
    ///       距簇当前中心不超过邻近阈值
    /// 选择: 距离最近 → 播种日期更接近簇中位 → plot_id 最小
    fn next_member(
        &self,
        cluster: &WorkingCluster,
        plots: &[&EligiblePlot],
        positions: &HashMap<&str, usize>,
        assigned: &[bool],
        index: &ProximityIndex,
        params: &GroupingParameters,
    ) -> Option<usize> {
        let median = cluster.window().median;

        index
            .neighbors(cluster.centroid(), params.proximity_threshold_m)
            .into_iter()
            .filter_map(|n| {
                let idx = *positions.get(n.plot_id.as_str())?;
                if assigned[idx] {
                    return None;
                }
                let plot = plots[idx];
                if plot.rice_variety_id != cluster.rice_variety_id {
                    return None;
                }
                if cluster.span_with(plot.planting_date, plot.planting_date)
                    > params.max_planting_span_days()
                {
                    return None;
                }
                if cluster.area_ha + plot.area_ha() > params.max_group_area_ha + AREA_EPSILON_HA {
                    return None;
                }
                let date_gap = (plot.planting_date - median).num_days().abs();
                Some((distance_key(n.distance_m), date_gap, idx))
            })
            .min_by(|a, b| {
                a.0.cmp(&b.0)
                    .then(a.1.cmp(&b.1))
                    .then_with(|| plots[a.2].plot_id().cmp(plots[b.2].plot_id()))
            })
            .map(|(_, _, idx)| idx)
    }

    /// 欠规模簇与最近的欠规模簇合并
    ///
    /// 每个簇最多尝试 `merge_attempts` 次；合并对象须品种一致、中心距离在阈值内、
    /// 合并后不超上限且播种跨度合规。距离相同取创建顺序靠前者。
    fn merge_undersized(&self, clusters: &mut [WorkingCluster], params: &GroupingParameters) {
        for i in 0..clusters.len() {
            while clusters[i].alive
                && clusters[i].is_undersized(params)
                && clusters[i].merge_attempts < params.merge_attempts
            {
                clusters[i].merge_attempts += 1;

                let centroid = clusters[i].centroid();
                let partner = clusters
                    .iter()
                    .enumerate()
                    .filter(|(j, other)| {
                        *j != i
                            && other.alive
                            && other.is_undersized(params)
                            && self.can_merge(&clusters[i], other, params)
                    })
                    .map(|(j, other)| (distance_key(planar_distance(centroid, other.centroid())), j))
                    .filter(|(key, _)| *key <= distance_key(params.proximity_threshold_m))
                    .min();

                let Some((_, j)) = partner else {
                    break;
                };

                let other = clusters[j].clone();
                clusters[j].alive = false;
                clusters[i].absorb(&other);
                debug!(
                    into = i,
                    from = j,
                    members = clusters[i].len(),
                    area_ha = clusters[i].area_ha,
                    "欠规模簇合并"
                );
            }
        }
    }

    fn can_merge(&self, a: &WorkingCluster, b: &WorkingCluster, params: &GroupingParameters) -> bool {
        a.rice_variety_id == b.rice_variety_id
            && a.len() + b.len() <= params.max_plots_per_group
            && a.area_ha + b.area_ha <= params.max_group_area_ha + AREA_EPSILON_HA
            && a.span_with(b.earliest, b.latest) <= params.max_planting_span_days()
    }

    /// 生成候选分组；不满足边界的簇作为例外分组输出
    fn finalize(
        &self,
        cluster_id: &str,
        clusters: &[WorkingCluster],
        plots: &[&EligiblePlot],
        params: &GroupingParameters,
    ) -> ClusteringOutput {
        let mut output = ClusteringOutput::default();

        for cluster in clusters.iter().filter(|c| c.alive) {
            let window = cluster.window();
            let (issues, only_undersized) = bound_issues(cluster, &window, params);

            if cluster.len() == 1
                && !issues.is_empty()
                && only_undersized
                && params.singleton_policy == SingletonPolicy::Ungroupable
            {
                let plot = plots[cluster.members[0]];
                output.ungroupable.push(
                    UngroupablePlot::new(plot.plot_id(), UngroupableReason::IsolatedUndersized)
                        .with_detail(issues.join("; ")),
                );
                continue;
            }

            let is_exception = !issues.is_empty();
            output.proposals.push(GroupProposal {
                group_name: None,
                cluster_id: cluster_id.to_string(),
                rice_variety_id: cluster.rice_variety_id.clone(),
                plot_ids: cluster
                    .members
                    .iter()
                    .map(|&idx| plots[idx].plot_id().to_string())
                    .collect(),
                planting_window: window,
                total_area_ha: cluster.area_ha,
                supervisor_id: None,
                is_exception,
                exception_reason: is_exception.then(|| format!("AUTO: {}", issues.join("; "))),
            });
        }

        output
    }
}

impl Default for ClusteringEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// 边界检查
///
/// # 返回
/// (问题描述列表, 是否仅有"低于下限"类问题)
fn bound_issues(
    cluster: &WorkingCluster,
    window: &PlantingWindow,
    params: &GroupingParameters,
) -> (Vec<String>, bool) {
    let mut issues = Vec::new();
    let mut only_undersized = true;

    if cluster.len() < params.min_plots_per_group {
        issues.push(format!(
            "plot count below minimum ({} < {})",
            cluster.len(),
            params.min_plots_per_group
        ));
    }
    if cluster.len() > params.max_plots_per_group {
        only_undersized = false;
        issues.push(format!(
            "plot count above maximum ({} > {})",
            cluster.len(),
            params.max_plots_per_group
        ));
    }
    if cluster.area_ha + AREA_EPSILON_HA < params.min_group_area_ha {
        issues.push(format!(
            "area below minimum ({:.2} ha < {:.2} ha)",
            cluster.area_ha, params.min_group_area_ha
        ));
    }
    if cluster.area_ha > params.max_group_area_ha + AREA_EPSILON_HA {
        only_undersized = false;
        issues.push(format!(
            "area above maximum ({:.2} ha > {:.2} ha)",
            cluster.area_ha, params.max_group_area_ha
        ));
    }
    if window.span_days() > params.max_planting_span_days() {
        only_undersized = false;
        issues.push(format!(
            "planting date spread exceeds tolerance ({} > {} days)",
            window.span_days(),
            params.max_planting_span_days()
        ));
    }

    (issues, only_undersized)
}
