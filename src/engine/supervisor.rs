// ==========================================
// 农场生产分组系统 - 监理指派
// ==========================================
// 职责: 定义监理指派接口（外部能力，引擎只消费其契约）
// 契约: assign(group_id, cluster_id, candidates) -> Option<supervisor_id>
// 红线: 返回 None 不是错误，分组保持未指派并照常提交
// ==========================================

use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};

/// 监理指派器
pub trait SupervisorAssigner: Send + Sync {
    fn assign(
        &self,
        group_id: &str,
        cluster_id: &str,
        candidate_supervisors: &[String],
    ) -> Result<Option<String>, Box<dyn Error + Send + Sync>>;
}

/// 不指派任何监理
#[derive(Debug, Clone, Default)]
pub struct NoOpSupervisorAssigner;

impl SupervisorAssigner for NoOpSupervisorAssigner {
    fn assign(
        &self,
        group_id: &str,
        _cluster_id: &str,
        _candidate_supervisors: &[String],
    ) -> Result<Option<String>, Box<dyn Error + Send + Sync>> {
        tracing::debug!(group_id, "NoOpSupervisorAssigner: 跳过监理指派");
        Ok(None)
    }
}

// ==========================================
// RoundRobinSupervisorAssigner - 轮询指派
// ==========================================
// 候选监理按 id 排序后轮询，保证同一进程内分摊均匀
#[derive(Debug, Default)]
pub struct RoundRobinSupervisorAssigner {
    cursor: AtomicUsize,
}

impl RoundRobinSupervisorAssigner {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SupervisorAssigner for RoundRobinSupervisorAssigner {
    fn assign(
        &self,
        group_id: &str,
        cluster_id: &str,
        candidate_supervisors: &[String],
    ) -> Result<Option<String>, Box<dyn Error + Send + Sync>> {
        if candidate_supervisors.is_empty() {
            tracing::debug!(group_id, cluster_id, "片区无候选监理");
            return Ok(None);
        }

        let mut sorted: Vec<&String> = candidate_supervisors.iter().collect();
        sorted.sort();
        let slot = self.cursor.fetch_add(1, Ordering::Relaxed) % sorted.len();
        Ok(Some(sorted[slot].clone()))
    }
}
