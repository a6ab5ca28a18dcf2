// ==========================================
// 农场生产分组系统 - 分组校验器
// ==========================================
// 职责: 对候选/人工分组做全部硬约束检查，收集所有违规（不止第一个）
// 顺序: 品种一致 → 片区一致 → 地块数量 → 面积 → 播期跨度 → 农户资格
// 红线: 例外分组的边界类违规降级为 Soft；农户资格违规永远是 Hard
// 红线: 纯函数，不读写库；同一输入多次校验结果一致
// ==========================================

use chrono::{Duration, NaiveDate};
use std::collections::HashSet;
use tracing::{debug, instrument};

use crate::domain::group::GroupProposal;
use crate::domain::parameters::GroupingParameters;
use crate::domain::plot::PlotCandidate;
use crate::domain::types::ViolationKind;
use crate::domain::validation::{ValidationResult, Violation};
use crate::engine::candidate::PlotLookup;

/// 面积比较容差 (公顷)
const AREA_EPSILON_HA: f64 = 1e-9;

// ==========================================
// GroupValidator - 分组校验器
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct GroupValidator;

impl GroupValidator {
    pub fn new() -> Self {
        Self
    }

    /// 校验单个分组
    ///
    /// # 参数
    /// - `proposal`: 候选分组
    /// - `plots`: 当前可用地块查找表（不在表中的地块视为不可用）
    /// - `params`: 分组参数
    ///
    /// # 返回
    /// ValidationResult (ok = 无硬违规)
    #[instrument(skip_all, fields(
        group_name = proposal.group_name.as_deref().unwrap_or("-"),
        plot_count = proposal.plot_ids.len(),
        is_exception = proposal.is_exception
    ))]
    pub fn validate(
        &self,
        proposal: &GroupProposal,
        plots: &PlotLookup,
        params: &GroupingParameters,
    ) -> ValidationResult {
        let mut violations = Vec::new();

        // ===== 结构检查 =====
        if proposal.plot_ids.is_empty() {
            violations.push(Violation::hard(ViolationKind::EmptyGroup, "group has no plots"));
        }

        let mut seen = HashSet::new();
        let mut members: Vec<&PlotCandidate> = Vec::with_capacity(proposal.plot_ids.len());
        for plot_id in &proposal.plot_ids {
            if !seen.insert(plot_id.as_str()) {
                violations.push(Violation::hard(
                    ViolationKind::DuplicatePlot,
                    format!("duplicate plot: {} listed more than once", plot_id),
                ));
                continue;
            }
            match plots.get(plot_id) {
                Some(plot) => members.push(plot),
                None => violations.push(Violation::hard(
                    ViolationKind::UnknownPlot,
                    format!("plot not available for grouping: {}", plot_id),
                )),
            }
        }

        // 1. 品种一致
        for plot in &members {
            let variety = plot.rice_variety_id.as_deref().unwrap_or("");
            if variety != proposal.rice_variety_id {
                violations.push(Violation::hard(
                    ViolationKind::VarietyMismatch,
                    format!(
                        "rice variety mismatch: plot {} has '{}', group is '{}'",
                        plot.plot_id, variety, proposal.rice_variety_id
                    ),
                ));
            }
        }

        // 2. 片区一致
        for plot in &members {
            if plot.cluster_id != proposal.cluster_id {
                violations.push(Violation::hard(
                    ViolationKind::ClusterMismatch,
                    format!(
                        "cluster mismatch: plot {} belongs to {}, group is {}",
                        plot.plot_id, plot.cluster_id, proposal.cluster_id
                    ),
                ));
            }
        }

        let bound = |kind: ViolationKind, message: String| {
            if proposal.is_exception {
                Violation::soft(kind, message)
            } else {
                Violation::hard(kind, message)
            }
        };

        // 3. 地块数量
        let count = proposal.plot_ids.len();
        if count < params.min_plots_per_group {
            violations.push(bound(
                ViolationKind::PlotCountBelowMinimum,
                format!(
                    "plot count below minimum: {} < {}",
                    count, params.min_plots_per_group
                ),
            ));
        }
        if count > params.max_plots_per_group {
            violations.push(bound(
                ViolationKind::PlotCountAboveMaximum,
                format!(
                    "plot count above maximum: {} > {}",
                    count, params.max_plots_per_group
                ),
            ));
        }

        // 4. 面积（以成员地块面积为准）
        let total_area: f64 = members.iter().map(|p| p.area_ha).sum();
        if total_area + AREA_EPSILON_HA < params.min_group_area_ha {
            violations.push(bound(
                ViolationKind::AreaBelowMinimum,
                format!(
                    "area below minimum: {:.2} ha < {:.2} ha",
                    total_area, params.min_group_area_ha
                ),
            ));
        }
        if total_area > params.max_group_area_ha + AREA_EPSILON_HA {
            violations.push(bound(
                ViolationKind::AreaAboveMaximum,
                format!(
                    "area above maximum: {:.2} ha > {:.2} ha",
                    total_area, params.max_group_area_ha
                ),
            ));
        }

        // 5. 播期跨度: 成员播期须落在 [median − tol, median + tol]
        let median = proposal.planting_window.median;
        let tolerance = Duration::try_days(params.planting_date_tolerance_days);
        let earliest = tolerance
            .and_then(|t| median.checked_sub_signed(t))
            .unwrap_or(NaiveDate::MIN);
        let latest = tolerance
            .and_then(|t| median.checked_add_signed(t))
            .unwrap_or(NaiveDate::MAX);
        let mut outside = Vec::new();
        for plot in &members {
            match plot.planting_date {
                Some(date) if date >= earliest && date <= latest => {}
                Some(date) => outside.push(format!("{} ({})", plot.plot_id, date)),
                None => outside.push(format!("{} (no planting date)", plot.plot_id)),
            }
        }
        if !outside.is_empty() {
            violations.push(bound(
                ViolationKind::PlantingDateSpread,
                format!(
                    "planting date spread exceeds tolerance: {} outside {} ± {} days",
                    outside.join(", "),
                    median,
                    params.planting_date_tolerance_days
                ),
            ));
        }

        // 6. 农户资格（永远 Hard）
        for plot in &members {
            if !plot.farmer_status.is_eligible() {
                violations.push(Violation::hard(
                    ViolationKind::FarmerIneligible,
                    format!(
                        "farmer ineligible: plot {} farmer {} is {}",
                        plot.plot_id, plot.farmer_id, plot.farmer_status
                    ),
                ));
            }
        }

        if proposal.is_exception
            && proposal
                .exception_reason
                .as_deref()
                .map_or(true, |r| r.trim().is_empty())
        {
            violations.push(Violation::hard(
                ViolationKind::MissingExceptionReason,
                "exception group requires an exception reason",
            ));
        }

        let result = ValidationResult::from_violations(violations);
        debug!(
            ok = result.ok,
            violations_count = result.violations.len(),
            "分组校验完成"
        );
        result
    }
}
