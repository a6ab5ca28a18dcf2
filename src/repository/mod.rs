// ==========================================
// 农场生产分组系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: 实现引擎的读写端口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod error;
pub mod group_repo;
pub mod plot_repo;

// 重导出核心仓储
pub use error::{RepositoryError, RepositoryResult};
pub use group_repo::GroupRepository;
pub use plot_repo::PlotRepository;
