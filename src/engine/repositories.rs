// ==========================================
// 农场生产分组系统 - 引擎层数据端口
// ==========================================
// 职责: 定义引擎读写数据所需的端口，并聚合为一个注入参数
// 读端口: CandidateSource (加载候选地块 / 候选监理)
// 写端口: GroupStore (单事务落库分组、回写监理)
// 红线: 引擎不拼 SQL，不持有跨运行的状态
// ==========================================

use std::sync::Arc;

use crate::domain::group::{Group, NewGroup};
use crate::domain::plot::PlotCandidate;
use crate::repository::RepositoryResult;

/// 候选地块数据源
pub trait CandidateSource: Send + Sync {
    /// 加载 (cluster, season, year) 下的地块快照
    ///
    /// 返回片区内全部地块，包括已分组/非 Active 的地块，由候选集负责过滤
    fn load_candidates(
        &self,
        cluster_id: &str,
        season_id: &str,
        year: i32,
    ) -> RepositoryResult<Vec<PlotCandidate>>;

    /// 加载片区的候选监理 id 列表
    fn load_candidate_supervisors(&self, cluster_id: &str) -> RepositoryResult<Vec<String>>;
}

/// 分组存储
pub trait GroupStore: Send + Sync {
    /// 在单个事务内写入全部分组及其成员地块
    ///
    /// 任一地块在 (season, year) 下已属于其他分组时整体失败，
    /// 返回 `RepositoryError::ConcurrencyConflict`，不做部分提交
    fn persist_groups(&self, groups: Vec<NewGroup>) -> RepositoryResult<Vec<Group>>;

    /// 回写分组监理
    fn assign_supervisor(&self, group_id: &str, supervisor_id: &str) -> RepositoryResult<()>;
}

/// 分组引擎仓储集合
///
/// 聚合读写端口，简化依赖注入；单元测试时可整体替换为内存实现
#[derive(Clone)]
pub struct FormationRepositories {
    pub candidate_source: Arc<dyn CandidateSource>,
    pub group_store: Arc<dyn GroupStore>,
}

impl FormationRepositories {
    pub fn new(candidate_source: Arc<dyn CandidateSource>, group_store: Arc<dyn GroupStore>) -> Self {
        Self {
            candidate_source,
            group_store,
        }
    }

    pub fn candidate_source(&self) -> &Arc<dyn CandidateSource> {
        &self.candidate_source
    }

    pub fn group_store(&self) -> &Arc<dyn GroupStore> {
        &self.group_store
    }
}
