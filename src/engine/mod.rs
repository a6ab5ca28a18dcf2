// ==========================================
// 农场生产分组系统 - 引擎层
// ==========================================
// 职责: 实现分组规则引擎与编排，不拼 SQL
// 流程: 候选集 → 邻近索引 → 聚类 → 校验 → 物化 → 监理指派
// 红线: 所有不可分组地块与违规都必须输出原因
// ==========================================

pub mod candidate;
pub mod clustering;
pub mod error;
pub mod events;
pub mod geometry;
pub mod materializer;
pub mod orchestrator;
pub mod proximity;
pub mod repositories;
pub mod supervisor;
pub mod validator;

// 重导出核心引擎
pub use candidate::{CandidateSet, EligiblePlot, PlotLookup};
pub use clustering::{ClusteringEngine, ClusteringOutput};
pub use error::{FormationError, FormationResult};
pub use events::{GroupEvent, GroupEventPublisher, GroupEventType, NoOpEventPublisher, OptionalEventPublisher};
pub use geometry::{BasicGeometryValidator, GeometryValidator, LocalProjection};
pub use materializer::{GroupMaterializer, MaterializeContext};
pub use orchestrator::{
    CancellationFlag, FormGroupsRequest, FormationOutcome, FormationSummary,
    GroupFormationService, ManualGroupRequest, PreviewCommitRequest,
};
pub use proximity::{Neighbor, ProximityIndex};
pub use repositories::{CandidateSource, FormationRepositories, GroupStore};
pub use supervisor::{NoOpSupervisorAssigner, RoundRobinSupervisorAssigner, SupervisorAssigner};
pub use validator::GroupValidator;
