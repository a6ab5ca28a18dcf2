// ==========================================
// 农场生产分组系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 将片区内未分组地块划分为生产分组（自动 / 预览确认 / 人工）
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 分组规则与编排
pub mod engine;

// 配置层 - 分组参数缺省值
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

pub use domain::{
    EditedProposal, FarmerStatus, FormationStatus, Group, GroupProposal, GroupStatus,
    GroupingParameters, GroupingParametersInput, PlotCandidate, PlotStatus, UngroupablePlot,
    UngroupableReason, ValidationResult, Violation, ViolationKind, ViolationSeverity,
};

pub use engine::{
    CancellationFlag, FormGroupsRequest, FormationError, FormationOutcome, GroupFormationService,
    ManualGroupRequest, PreviewCommitRequest,
};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "农场生产分组系统";
