// ==========================================
// 农场生产分组系统 - 引擎层事件发布
// ==========================================
// 职责: 定义分组变更事件与发布 trait，实现依赖倒置
// 说明: 引擎只依赖 trait，下游（缓存失效/通知）实现适配器
// ==========================================

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;

// ==========================================
// 分组事件类型
// ==========================================

/// 分组变更类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupEventType {
    /// 分组创建
    Created,
    /// 分组指派监理
    SupervisorAssigned,
}

impl GroupEventType {
    pub fn as_str(&self) -> &str {
        match self {
            GroupEventType::Created => "Created",
            GroupEventType::SupervisorAssigned => "SupervisorAssigned",
        }
    }
}

/// 分组事件
///
/// 物化器每落库一个分组发布一条 Created 事件；监理回写成功后再发布一条 SupervisorAssigned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupEvent {
    pub group_id: String,
    pub change_type: GroupEventType,
    pub cluster_id: String,
    pub season_id: String,
    pub year: i32,
}

impl GroupEvent {
    pub fn created(group_id: &str, cluster_id: &str, season_id: &str, year: i32) -> Self {
        Self::new(GroupEventType::Created, group_id, cluster_id, season_id, year)
    }

    pub fn supervisor_assigned(group_id: &str, cluster_id: &str, season_id: &str, year: i32) -> Self {
        Self::new(GroupEventType::SupervisorAssigned, group_id, cluster_id, season_id, year)
    }

    fn new(
        change_type: GroupEventType,
        group_id: &str,
        cluster_id: &str,
        season_id: &str,
        year: i32,
    ) -> Self {
        Self {
            group_id: group_id.to_string(),
            change_type,
            cluster_id: cluster_id.to_string(),
            season_id: season_id.to_string(),
            year,
        }
    }
}

// ==========================================
// 事件发布 Trait
// ==========================================

/// 分组事件发布者
///
/// # 返回
/// - `Ok(message_id)`: 下游消息 ID（不支持时为空字符串）
/// - `Err`: 发布失败（调用方只记录告警，不回滚已提交的分组）
pub trait GroupEventPublisher: Send + Sync {
    fn publish(&self, event: GroupEvent) -> Result<String, Box<dyn Error + Send + Sync>>;
}

/// 空操作事件发布者
#[derive(Debug, Clone, Default)]
pub struct NoOpEventPublisher;

impl GroupEventPublisher for NoOpEventPublisher {
    fn publish(&self, event: GroupEvent) -> Result<String, Box<dyn Error + Send + Sync>> {
        tracing::debug!(
            "NoOpEventPublisher: 跳过事件发布 - group_id={}, change_type={}",
            event.group_id,
            event.change_type.as_str()
        );
        Ok(String::new())
    }
}

/// 可选的事件发布者包装
///
/// 简化 Option<Arc<dyn GroupEventPublisher>> 的使用
#[derive(Clone)]
pub struct OptionalEventPublisher {
    inner: Option<Arc<dyn GroupEventPublisher>>,
}

impl OptionalEventPublisher {
    pub fn with_publisher(publisher: Arc<dyn GroupEventPublisher>) -> Self {
        Self {
            inner: Some(publisher),
        }
    }

    /// 创建空实例（不发布事件）
    pub fn none() -> Self {
        Self { inner: None }
    }

    pub fn publish(&self, event: GroupEvent) -> Result<String, Box<dyn Error + Send + Sync>> {
        match &self.inner {
            Some(publisher) => publisher.publish(event),
            None => {
                tracing::debug!(
                    "OptionalEventPublisher: 未配置发布者，跳过事件 - group_id={}, change_type={}",
                    event.group_id,
                    event.change_type.as_str()
                );
                Ok(String::new())
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}

impl Default for OptionalEventPublisher {
    fn default() -> Self {
        Self::none()
    }
}
