// ==========================================
// 农场生产分组系统 - 分组参数
// ==========================================
// 所有字段输入时可选，缺省值来自配置 (config_kv) 或内置默认
// 红线: min ≤ max；数值必须 > 0 且不超过各自上限
// ==========================================

use serde::{Deserialize, Serialize};

use crate::domain::types::SingletonPolicy;

pub const DEFAULT_PROXIMITY_THRESHOLD_M: f64 = 2000.0;
pub const DEFAULT_PLANTING_DATE_TOLERANCE_DAYS: i64 = 2;
pub const DEFAULT_MIN_GROUP_AREA_HA: f64 = 15.0;
pub const DEFAULT_MAX_GROUP_AREA_HA: f64 = 50.0;
pub const DEFAULT_MIN_PLOTS_PER_GROUP: usize = 5;
pub const DEFAULT_MAX_PLOTS_PER_GROUP: usize = 15;
pub const DEFAULT_MERGE_ATTEMPTS: u32 = 1;

/// 播种容差上限 (天)
pub const MAX_PLANTING_DATE_TOLERANCE_DAYS: i64 = 366;
/// 邻近阈值上限 (米)
pub const MAX_PROXIMITY_THRESHOLD_M: f64 = 100_000.0;
/// 分组面积参数上限 (公顷)
pub const MAX_GROUP_AREA_LIMIT_HA: f64 = 100_000.0;
/// 分组地块数参数上限
pub const MAX_PLOTS_LIMIT: usize = 10_000;

// ==========================================
// GroupingParametersInput - 请求中的可选参数
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupingParametersInput {
    pub proximity_threshold_m: Option<f64>,
    pub planting_date_tolerance_days: Option<i64>,
    pub min_group_area_ha: Option<f64>,
    pub max_group_area_ha: Option<f64>,
    pub min_plots_per_group: Option<usize>,
    pub max_plots_per_group: Option<usize>,
    pub merge_attempts: Option<u32>,
    pub singleton_policy: Option<SingletonPolicy>,
}

// ==========================================
// GroupingParameters - 解析后的分组参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupingParameters {
    pub proximity_threshold_m: f64,
    pub planting_date_tolerance_days: i64,
    pub min_group_area_ha: f64,
    pub max_group_area_ha: f64,
    pub min_plots_per_group: usize,
    pub max_plots_per_group: usize,
    /// 欠规模簇的合并尝试次数
    pub merge_attempts: u32,
    pub singleton_policy: SingletonPolicy,
}

impl Default for GroupingParameters {
    fn default() -> Self {
        Self {
            proximity_threshold_m: DEFAULT_PROXIMITY_THRESHOLD_M,
            planting_date_tolerance_days: DEFAULT_PLANTING_DATE_TOLERANCE_DAYS,
            min_group_area_ha: DEFAULT_MIN_GROUP_AREA_HA,
            max_group_area_ha: DEFAULT_MAX_GROUP_AREA_HA,
            min_plots_per_group: DEFAULT_MIN_PLOTS_PER_GROUP,
            max_plots_per_group: DEFAULT_MAX_PLOTS_PER_GROUP,
            merge_attempts: DEFAULT_MERGE_ATTEMPTS,
            singleton_policy: SingletonPolicy::ExceptionProposal,
        }
    }
}

impl GroupingParameters {
    /// 以 `defaults` 为底，用请求中显式给出的字段覆盖
    pub fn resolve(input: Option<&GroupingParametersInput>, defaults: GroupingParameters) -> Self {
        let Some(input) = input else {
            return defaults;
        };

        Self {
            proximity_threshold_m: input
                .proximity_threshold_m
                .unwrap_or(defaults.proximity_threshold_m),
            planting_date_tolerance_days: input
                .planting_date_tolerance_days
                .unwrap_or(defaults.planting_date_tolerance_days),
            min_group_area_ha: input.min_group_area_ha.unwrap_or(defaults.min_group_area_ha),
            max_group_area_ha: input.max_group_area_ha.unwrap_or(defaults.max_group_area_ha),
            min_plots_per_group: input
                .min_plots_per_group
                .unwrap_or(defaults.min_plots_per_group),
            max_plots_per_group: input
                .max_plots_per_group
                .unwrap_or(defaults.max_plots_per_group),
            merge_attempts: input.merge_attempts.unwrap_or(defaults.merge_attempts),
            singleton_policy: input.singleton_policy.unwrap_or(defaults.singleton_policy),
        }
    }

    /// 校验参数有效性
    ///
    /// # 返回
    /// - `Ok(())`: 参数有效
    /// - `Err(Vec<String>)`: 全部错误描述
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !(self.proximity_threshold_m.is_finite()
            && self.proximity_threshold_m > 0.0
            && self.proximity_threshold_m <= MAX_PROXIMITY_THRESHOLD_M)
        {
            errors.push(format!(
                "proximity_threshold_m must be in (0, {}] (got {})",
                MAX_PROXIMITY_THRESHOLD_M, self.proximity_threshold_m
            ));
        }
        if !(1..=MAX_PLANTING_DATE_TOLERANCE_DAYS).contains(&self.planting_date_tolerance_days) {
            errors.push(format!(
                "planting_date_tolerance_days must be in [1, {}] (got {})",
                MAX_PLANTING_DATE_TOLERANCE_DAYS, self.planting_date_tolerance_days
            ));
        }
        for (name, value) in [
            ("min_group_area_ha", self.min_group_area_ha),
            ("max_group_area_ha", self.max_group_area_ha),
        ] {
            if !(value.is_finite() && value > 0.0 && value <= MAX_GROUP_AREA_LIMIT_HA) {
                errors.push(format!(
                    "{} must be in (0, {}] (got {})",
                    name, MAX_GROUP_AREA_LIMIT_HA, value
                ));
            }
        }
        for (name, value) in [
            ("min_plots_per_group", self.min_plots_per_group),
            ("max_plots_per_group", self.max_plots_per_group),
        ] {
            if !(1..=MAX_PLOTS_LIMIT).contains(&value) {
                errors.push(format!(
                    "{} must be in [1, {}] (got {})",
                    name, MAX_PLOTS_LIMIT, value
                ));
            }
        }
        if self.min_group_area_ha > self.max_group_area_ha {
            errors.push(format!(
                "min_group_area_ha ({}) > max_group_area_ha ({})",
                self.min_group_area_ha, self.max_group_area_ha
            ));
        }
        if self.min_plots_per_group > self.max_plots_per_group {
            errors.push(format!(
                "min_plots_per_group ({}) > max_plots_per_group ({})",
                self.min_plots_per_group, self.max_plots_per_group
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// 允许的最大播种日期跨度 (天) = 2 × 容差
    pub fn max_planting_span_days(&self) -> i64 {
        self.planting_date_tolerance_days.saturating_mul(2)
    }
}
