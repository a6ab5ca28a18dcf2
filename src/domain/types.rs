// ==========================================
// 农场生产分组系统 - 领域类型定义
// ==========================================
// 职责: 地块/农户/分组状态、不可分组原因、校验违规分级
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 地块状态 (Plot Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlotStatus {
    Active,   // 可用
    Inactive, // 停用
    Archived, // 归档
}

impl PlotStatus {
    pub fn from_db_str(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "ACTIVE" => Some(PlotStatus::Active),
            "INACTIVE" => Some(PlotStatus::Inactive),
            "ARCHIVED" => Some(PlotStatus::Archived),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            PlotStatus::Active => "ACTIVE",
            PlotStatus::Inactive => "INACTIVE",
            PlotStatus::Archived => "ARCHIVED",
        }
    }
}

impl fmt::Display for PlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_str())
    }
}

// ==========================================
// 农户状态 (Farmer Status)
// ==========================================
// 红线: NotAllowed 农户的地块不得进入任何分组
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FarmerStatus {
    Normal,     // 正常
    Warned,     // 警告（仍可分组）
    NotAllowed, // 禁止参与
}

impl FarmerStatus {
    pub fn from_db_str(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "NORMAL" => Some(FarmerStatus::Normal),
            "WARNED" => Some(FarmerStatus::Warned),
            "NOT_ALLOWED" => Some(FarmerStatus::NotAllowed),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            FarmerStatus::Normal => "NORMAL",
            FarmerStatus::Warned => "WARNED",
            FarmerStatus::NotAllowed => "NOT_ALLOWED",
        }
    }

    pub fn is_eligible(&self) -> bool {
        !matches!(self, FarmerStatus::NotAllowed)
    }
}

impl fmt::Display for FarmerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_str())
    }
}

// ==========================================
// 分组状态 (Group Status)
// ==========================================
// 生命周期: Draft → Active → ReadyForOptimization → Locked → Exception/Completed
// 本引擎只负责初始状态 (Draft / Active)，后续流转由下游功能驱动
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupStatus {
    Draft,
    Active,
    ReadyForOptimization,
    Locked,
    Exception,
    Completed,
}

impl GroupStatus {
    /// 初始状态：立即生效为 Active，否则为 Draft
    pub fn initial(create_immediately: bool) -> Self {
        if create_immediately {
            GroupStatus::Active
        } else {
            GroupStatus::Draft
        }
    }

    pub fn from_db_str(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "DRAFT" => Some(GroupStatus::Draft),
            "ACTIVE" => Some(GroupStatus::Active),
            "READY_FOR_OPTIMIZATION" => Some(GroupStatus::ReadyForOptimization),
            "LOCKED" => Some(GroupStatus::Locked),
            "EXCEPTION" => Some(GroupStatus::Exception),
            "COMPLETED" => Some(GroupStatus::Completed),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            GroupStatus::Draft => "DRAFT",
            GroupStatus::Active => "ACTIVE",
            GroupStatus::ReadyForOptimization => "READY_FOR_OPTIMIZATION",
            GroupStatus::Locked => "LOCKED",
            GroupStatus::Exception => "EXCEPTION",
            GroupStatus::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_str())
    }
}

// ==========================================
// 不可分组原因 (Ungroupable Reason)
// ==========================================
// 序列化为 kebab-case 原因码，对外接口直接使用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UngroupableReason {
    NoGeometry,
    VarietyMismatch,
    FarmerIneligible,
    IsolatedUndersized,
    NoPlantingDate,
}

impl UngroupableReason {
    pub fn code(&self) -> &'static str {
        match self {
            UngroupableReason::NoGeometry => "no-geometry",
            UngroupableReason::VarietyMismatch => "variety-mismatch",
            UngroupableReason::FarmerIneligible => "farmer-ineligible",
            UngroupableReason::IsolatedUndersized => "isolated-undersized",
            UngroupableReason::NoPlantingDate => "no-planting-date",
        }
    }
}

impl fmt::Display for UngroupableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// ==========================================
// 校验违规分级 (Violation Severity)
// ==========================================
// Hard: 阻断提交; Soft: 标记但允许（例外分组）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationSeverity {
    Hard,
    Soft,
}

impl fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationSeverity::Hard => write!(f, "HARD"),
            ViolationSeverity::Soft => write!(f, "SOFT"),
        }
    }
}

// ==========================================
// 校验违规类型 (Violation Kind)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationKind {
    VarietyMismatch,
    ClusterMismatch,
    PlotCountBelowMinimum,
    PlotCountAboveMaximum,
    AreaBelowMinimum,
    AreaAboveMaximum,
    PlantingDateSpread,
    FarmerIneligible,
    UnknownPlot,
    DuplicatePlot,
    EmptyGroup,
    MissingExceptionReason,
}

impl ViolationKind {
    /// 是否为边界类违规（例外分组可降级为警告）
    pub fn is_bound(&self) -> bool {
        matches!(
            self,
            ViolationKind::PlotCountBelowMinimum
                | ViolationKind::PlotCountAboveMaximum
                | ViolationKind::AreaBelowMinimum
                | ViolationKind::AreaAboveMaximum
                | ViolationKind::PlantingDateSpread
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::VarietyMismatch => "VARIETY_MISMATCH",
            ViolationKind::ClusterMismatch => "CLUSTER_MISMATCH",
            ViolationKind::PlotCountBelowMinimum => "PLOT_COUNT_BELOW_MINIMUM",
            ViolationKind::PlotCountAboveMaximum => "PLOT_COUNT_ABOVE_MAXIMUM",
            ViolationKind::AreaBelowMinimum => "AREA_BELOW_MINIMUM",
            ViolationKind::AreaAboveMaximum => "AREA_ABOVE_MAXIMUM",
            ViolationKind::PlantingDateSpread => "PLANTING_DATE_SPREAD",
            ViolationKind::FarmerIneligible => "FARMER_INELIGIBLE",
            ViolationKind::UnknownPlot => "UNKNOWN_PLOT",
            ViolationKind::DuplicatePlot => "DUPLICATE_PLOT",
            ViolationKind::EmptyGroup => "EMPTY_GROUP",
            ViolationKind::MissingExceptionReason => "MISSING_EXCEPTION_REASON",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// 孤立单地块处理策略 (Singleton Policy)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SingletonPolicy {
    /// 作为例外分组输出
    ExceptionProposal,
    /// 报告为 isolated-undersized 不可分组地块
    Ungroupable,
}

impl SingletonPolicy {
    pub fn from_db_str(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "EXCEPTION_PROPOSAL" => Some(SingletonPolicy::ExceptionProposal),
            "UNGROUPABLE" => Some(SingletonPolicy::Ungroupable),
            _ => None,
        }
    }
}

impl fmt::Display for SingletonPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SingletonPolicy::ExceptionProposal => write!(f, "EXCEPTION_PROPOSAL"),
            SingletonPolicy::Ungroupable => write!(f, "UNGROUPABLE"),
        }
    }
}

// ==========================================
// 分组运行结果状态 (Formation Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FormationStatus {
    Previewed, // 仅预览，未落库
    Committed, // 已落库
    Rejected,  // 存在硬违规，整批未落库
}

impl fmt::Display for FormationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormationStatus::Previewed => write!(f, "PREVIEWED"),
            FormationStatus::Committed => write!(f, "COMMITTED"),
            FormationStatus::Rejected => write!(f, "REJECTED"),
        }
    }
}
