// ==========================================
// 农场生产分组系统 - 引擎层错误类型
// ==========================================
// 分类:
// - InvalidInput / EmptyCandidateSet: 快速失败，不做任何部分工作
// - ConcurrencyConflict: 并发运行争用同一批地块，可重试
// - Cancelled: 落库前收到取消信号，未持久化任何内容
// 校验违规不是错误，随 ValidationResult 返回
// ==========================================

use thiserror::Error;

use crate::repository::RepositoryError;

#[derive(Error, Debug)]
pub enum FormationError {
    #[error("输入无效: {0}")]
    InvalidInput(String),

    #[error("候选地块为空: cluster_id={cluster_id}, season_id={season_id}, year={year}")]
    EmptyCandidateSet {
        cluster_id: String,
        season_id: String,
        year: i32,
    },

    #[error("并发冲突（可重试）: {0}")]
    ConcurrencyConflict(String),

    #[error("分组运行已取消")]
    Cancelled,

    #[error("数据源错误: {0}")]
    DataSource(RepositoryError),

    #[error("配置读取失败: {0}")]
    Config(String),
}

impl FormationError {
    /// 调用方是否可以直接重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, FormationError::ConcurrencyConflict(_))
    }
}

impl From<RepositoryError> for FormationError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::ConcurrencyConflict(message) => {
                FormationError::ConcurrencyConflict(message)
            }
            other => FormationError::DataSource(other),
        }
    }
}

pub type FormationResult<T> = Result<T, FormationError>;
