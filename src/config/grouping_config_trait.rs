// ==========================================
// 农场生产分组系统 - 分组配置读取 Trait
// ==========================================
// 职责: 定义分组引擎所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use async_trait::async_trait;
use std::error::Error;

use crate::domain::parameters::GroupingParameters;
use crate::domain::types::SingletonPolicy;

pub type ConfigResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

// ==========================================
// GroupingConfigReader Trait
// ==========================================
// 用途: 为请求中未给出的分组参数提供缺省值
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait GroupingConfigReader: Send + Sync {
    /// 邻近阈值（米）
    ///
    /// # 默认值
    /// - 2000
    async fn get_proximity_threshold_m(&self) -> ConfigResult<f64>;

    /// 播期容差（天）
    ///
    /// # 默认值
    /// - 2
    async fn get_planting_date_tolerance_days(&self) -> ConfigResult<i64>;

    /// 分组面积下限（公顷），默认 15
    async fn get_min_group_area_ha(&self) -> ConfigResult<f64>;

    /// 分组面积上限（公顷），默认 50
    async fn get_max_group_area_ha(&self) -> ConfigResult<f64>;

    /// 每组地块数下限，默认 5
    async fn get_min_plots_per_group(&self) -> ConfigResult<usize>;

    /// 每组地块数上限，默认 15
    async fn get_max_plots_per_group(&self) -> ConfigResult<usize>;

    /// 欠规模簇合并尝试次数，默认 1
    async fn get_merge_attempts(&self) -> ConfigResult<u32>;

    /// 孤立单地块处理策略，默认 EXCEPTION_PROPOSAL
    async fn get_singleton_policy(&self) -> ConfigResult<SingletonPolicy>;

    /// 汇总全部缺省参数
    async fn get_default_parameters(&self) -> ConfigResult<GroupingParameters> {
        Ok(GroupingParameters {
            proximity_threshold_m: self.get_proximity_threshold_m().await?,
            planting_date_tolerance_days: self.get_planting_date_tolerance_days().await?,
            min_group_area_ha: self.get_min_group_area_ha().await?,
            max_group_area_ha: self.get_max_group_area_ha().await?,
            min_plots_per_group: self.get_min_plots_per_group().await?,
            max_plots_per_group: self.get_max_plots_per_group().await?,
            merge_attempts: self.get_merge_attempts().await?,
            singleton_policy: self.get_singleton_policy().await?,
        })
    }
}

/// 只返回内置默认值的配置读取器（测试及无库场景）
#[derive(Debug, Clone, Default)]
pub struct DefaultGroupingConfig;

#[async_trait]
impl GroupingConfigReader for DefaultGroupingConfig {
    async fn get_proximity_threshold_m(&self) -> ConfigResult<f64> {
        Ok(GroupingParameters::default().proximity_threshold_m)
    }

    async fn get_planting_date_tolerance_days(&self) -> ConfigResult<i64> {
        Ok(GroupingParameters::default().planting_date_tolerance_days)
    }

    async fn get_min_group_area_ha(&self) -> ConfigResult<f64> {
        Ok(GroupingParameters::default().min_group_area_ha)
    }

    async fn get_max_group_area_ha(&self) -> ConfigResult<f64> {
        Ok(GroupingParameters::default().max_group_area_ha)
    }

    async fn get_min_plots_per_group(&self) -> ConfigResult<usize> {
        Ok(GroupingParameters::default().min_plots_per_group)
    }

    async fn get_max_plots_per_group(&self) -> ConfigResult<usize> {
        Ok(GroupingParameters::default().max_plots_per_group)
    }

    async fn get_merge_attempts(&self) -> ConfigResult<u32> {
        Ok(GroupingParameters::default().merge_attempts)
    }

    async fn get_singleton_policy(&self) -> ConfigResult<SingletonPolicy> {
        Ok(GroupingParameters::default().singleton_policy)
    }
}
