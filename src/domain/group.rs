// ==========================================
// 农场生产分组系统 - 分组领域模型
// ==========================================
// GroupProposal: 未落库的候选分组（聚类产出 / 预览编辑）
// Group: 已落库的生产分组
// 红线: 同一次运行内一个地块最多属于一个 proposal
// ==========================================

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::domain::types::GroupStatus;
use crate::domain::validation::ValidationResult;

// ==========================================
// PlantingWindow - 播种窗口
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlantingWindow {
    pub start: NaiveDate,  // 最早播种日期
    pub end: NaiveDate,    // 最晚播种日期
    pub median: NaiveDate, // 中位日期 (窗口中点)
}

impl PlantingWindow {
    /// 由成员播种日期计算窗口：[min, max]，中位取中点
    pub fn from_dates<I>(dates: I) -> Option<Self>
    where
        I: IntoIterator<Item = NaiveDate>,
    {
        let mut iter = dates.into_iter();
        let first = iter.next()?;
        let (start, end) = iter.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d)));
        Some(Self::from_bounds(start, end))
    }

    pub fn from_bounds(start: NaiveDate, end: NaiveDate) -> Self {
        let (start, end) = if start <= end { (start, end) } else { (end, start) };
        let half = (end - start).num_days() / 2;
        Self {
            start,
            end,
            median: start + Duration::days(half),
        }
    }

    /// 单日窗口（人工建组时的指定播种日期）
    pub fn single(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
            median: date,
        }
    }

    pub fn span_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

// ==========================================
// GroupProposal - 候选分组
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupProposal {
    pub group_name: Option<String>,
    pub cluster_id: String,
    pub rice_variety_id: String,
    pub plot_ids: Vec<String>,
    pub planting_window: PlantingWindow,
    pub total_area_ha: f64,
    pub supervisor_id: Option<String>,
    pub is_exception: bool,
    pub exception_reason: Option<String>,
}

impl GroupProposal {
    pub fn plot_count(&self) -> usize {
        self.plot_ids.len()
    }
}

// ==========================================
// ValidatedProposal - 附带校验结果的候选分组
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatedProposal {
    pub proposal: GroupProposal,
    pub validation: ValidationResult,
}

// ==========================================
// EditedProposal - 用户在预览中编辑后的分组
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditedProposal {
    pub group_name: Option<String>,
    pub variety_id: String,
    pub planting_window_start: NaiveDate,
    pub planting_window_end: NaiveDate,
    pub median_planting_date: NaiveDate,
    pub plot_ids: Vec<String>,
    pub supervisor_id: Option<String>,
    #[serde(default)]
    pub is_exception: bool,
    #[serde(default)]
    pub exception_reason: Option<String>,
}

impl EditedProposal {
    /// 还原为候选分组（面积由调用方按成员地块重新计算）
    pub fn into_proposal(self, cluster_id: &str, total_area_ha: f64) -> GroupProposal {
        GroupProposal {
            group_name: self.group_name,
            cluster_id: cluster_id.to_string(),
            rice_variety_id: self.variety_id,
            plot_ids: self.plot_ids,
            planting_window: PlantingWindow {
                start: self.planting_window_start.min(self.planting_window_end),
                end: self.planting_window_start.max(self.planting_window_end),
                median: self.median_planting_date,
            },
            total_area_ha,
            supervisor_id: self.supervisor_id,
            is_exception: self.is_exception,
            exception_reason: self.exception_reason,
        }
    }
}

impl From<&GroupProposal> for EditedProposal {
    fn from(proposal: &GroupProposal) -> Self {
        Self {
            group_name: proposal.group_name.clone(),
            variety_id: proposal.rice_variety_id.clone(),
            planting_window_start: proposal.planting_window.start,
            planting_window_end: proposal.planting_window.end,
            median_planting_date: proposal.planting_window.median,
            plot_ids: proposal.plot_ids.clone(),
            supervisor_id: proposal.supervisor_id.clone(),
            is_exception: proposal.is_exception,
            exception_reason: proposal.exception_reason.clone(),
        }
    }
}

// ==========================================
// NewGroup - 待落库的生产分组
// ==========================================
// 由物化器生成，交给 GroupStore 在单个事务内写入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewGroup {
    pub group_id: String,
    pub group_name: String,
    pub cluster_id: String,
    pub season_id: String,
    pub year: i32,
    pub status: GroupStatus,
    pub total_area_ha: f64,
    pub planting_date: NaiveDate,
    pub rice_variety_id: String,
    pub supervisor_id: Option<String>,
    pub is_exception: bool,
    pub exception_reason: Option<String>,
    pub plot_ids: Vec<String>,
}

impl NewGroup {
    pub fn into_group(self, created_at: NaiveDateTime) -> Group {
        Group {
            group_id: self.group_id,
            group_name: self.group_name,
            cluster_id: self.cluster_id,
            season_id: self.season_id,
            year: self.year,
            status: self.status,
            total_area_ha: self.total_area_ha,
            planting_date: self.planting_date,
            rice_variety_id: self.rice_variety_id,
            supervisor_id: self.supervisor_id,
            is_exception: self.is_exception,
            exception_reason: self.exception_reason,
            plot_ids: self.plot_ids,
            created_at,
        }
    }
}

// ==========================================
// Group - 已落库的生产分组
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub group_id: String,
    pub group_name: String,
    pub cluster_id: String,
    pub season_id: String,
    pub year: i32,
    pub status: GroupStatus,
    pub total_area_ha: f64,
    pub planting_date: NaiveDate,
    pub rice_variety_id: String,
    pub supervisor_id: Option<String>,
    pub is_exception: bool,
    pub exception_reason: Option<String>,
    pub plot_ids: Vec<String>,
    pub created_at: NaiveDateTime,
}
