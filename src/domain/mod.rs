// ==========================================
// 农场生产分组系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、参数与校验结果
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod group;
pub mod parameters;
pub mod plot;
pub mod types;
pub mod validation;

// 重导出核心类型
pub use group::{
    EditedProposal, Group, GroupProposal, NewGroup, PlantingWindow, ValidatedProposal,
};
pub use parameters::{GroupingParameters, GroupingParametersInput};
pub use plot::{GeoPoint, PlotCandidate, PlotGeometry, UngroupablePlot};
pub use types::{
    FarmerStatus, FormationStatus, GroupStatus, PlotStatus, SingletonPolicy, UngroupableReason,
    ViolationKind, ViolationSeverity,
};
pub use validation::{ValidationResult, Violation};
