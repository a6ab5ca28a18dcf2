// ==========================================
// 农场生产分组系统 - 分组物化器
// ==========================================
// 职责: 将通过校验的候选分组转为已落库的 Group
// 预览模式: 只补全名称，原样返回，不落库
// 提交模式: 单事务写入全部分组（Draft / Active），发布创建事件，再指派监理
// 红线: 落库前检查取消信号；落库是全有或全无
// 红线: 监理指派 / 事件发布失败只记录告警，不回滚已提交分组
// ==========================================

use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::group::{Group, GroupProposal, NewGroup};
use crate::domain::types::GroupStatus;
use crate::engine::error::{FormationError, FormationResult};
use crate::engine::events::{GroupEvent, OptionalEventPublisher};
use crate::engine::orchestrator::CancellationFlag;
use crate::engine::repositories::FormationRepositories;
use crate::engine::supervisor::{NoOpSupervisorAssigner, SupervisorAssigner};

/// 一次物化的上下文
#[derive(Debug, Clone)]
pub struct MaterializeContext {
    pub cluster_id: String,
    pub season_id: String,
    pub year: i32,
    pub create_immediately: bool,
    pub auto_assign_supervisors: bool,
}

// ==========================================
// GroupMaterializer - 分组物化器
// ==========================================
#[derive(Clone)]
pub struct GroupMaterializer {
    repos: FormationRepositories,
    supervisor_assigner: Arc<dyn SupervisorAssigner>,
    event_publisher: OptionalEventPublisher,
}

impl GroupMaterializer {
    pub fn new(repos: FormationRepositories) -> Self {
        Self {
            repos,
            supervisor_assigner: Arc::new(NoOpSupervisorAssigner),
            event_publisher: OptionalEventPublisher::none(),
        }
    }

    pub fn set_supervisor_assigner(&mut self, assigner: Arc<dyn SupervisorAssigner>) {
        self.supervisor_assigner = assigner;
    }

    pub fn set_event_publisher(&mut self, publisher: OptionalEventPublisher) {
        self.event_publisher = publisher;
    }

    /// 为未命名的候选分组生成名称: {cluster}-{season}-{year}-G{nn}
    ///
    /// 序号按候选分组在本次运行中的位置编号（从 01 开始）
    pub fn name_proposals(&self, ctx: &MaterializeContext, proposals: &mut [GroupProposal]) {
        for (index, proposal) in proposals.iter_mut().enumerate() {
            let blank = proposal
                .group_name
                .as_deref()
                .map_or(true, |name| name.trim().is_empty());
            if blank {
                proposal.group_name = Some(format!(
                    "{}-{}-{}-G{:02}",
                    ctx.cluster_id,
                    ctx.season_id,
                    ctx.year,
                    index + 1
                ));
            }
        }
    }

    /// 提交候选分组
    ///
    /// # 返回
    /// - Ok(groups): 已落库的分组（含指派的监理）
    /// - Err(Cancelled): 落库前收到取消信号
    /// - Err(ConcurrencyConflict): 有地块已被其他运行占用
    #[instrument(skip(self, ctx, proposals, cancel), fields(
        cluster_id = %ctx.cluster_id,
        season_id = %ctx.season_id,
        year = ctx.year,
        proposals = proposals.len()
    ))]
    pub fn materialize(
        &self,
        ctx: &MaterializeContext,
        proposals: Vec<GroupProposal>,
        cancel: &CancellationFlag,
    ) -> FormationResult<Vec<Group>> {
        if cancel.is_cancelled() {
            info!("落库前收到取消信号，放弃本次运行");
            return Err(FormationError::Cancelled);
        }
        if proposals.is_empty() {
            debug!("没有需要落库的分组");
            return Ok(Vec::new());
        }

        let status = GroupStatus::initial(ctx.create_immediately);
        let new_groups: Vec<NewGroup> = proposals
            .into_iter()
            .map(|proposal| {
                let group_id = Uuid::new_v4().to_string();
                NewGroup {
                    group_name: proposal.group_name.unwrap_or_else(|| group_id.clone()),
                    group_id,
                    cluster_id: proposal.cluster_id,
                    season_id: ctx.season_id.clone(),
                    year: ctx.year,
                    status,
                    total_area_ha: proposal.total_area_ha,
                    planting_date: proposal.planting_window.median,
                    rice_variety_id: proposal.rice_variety_id,
                    supervisor_id: proposal.supervisor_id,
                    is_exception: proposal.is_exception,
                    exception_reason: proposal.exception_reason,
                    plot_ids: proposal.plot_ids,
                }
            })
            .collect();

        let mut groups = self.repos.group_store().persist_groups(new_groups)?;
        info!(groups = groups.len(), status = %status, "分组已落库");

        for group in &groups {
            let event = GroupEvent::created(&group.group_id, &group.cluster_id, &ctx.season_id, ctx.year);
            if let Err(e) = self.event_publisher.publish(event) {
                warn!(group_id = %group.group_id, error = %e, "分组创建事件发布失败");
            }
        }

        if ctx.auto_assign_supervisors {
            self.assign_supervisors(ctx, &mut groups);
        }

        Ok(groups)
    }

    /// 为未指定监理的分组调用外部指派器
    fn assign_supervisors(&self, ctx: &MaterializeContext, groups: &mut [Group]) {
        let candidates = match self
            .repos
            .candidate_source()
            .load_candidate_supervisors(&ctx.cluster_id)
        {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(cluster_id = %ctx.cluster_id, error = %e, "候选监理加载失败，跳过指派");
                return;
            }
        };

        for group in groups.iter_mut().filter(|g| g.supervisor_id.is_none()) {
            match self
                .supervisor_assigner
                .assign(&group.group_id, &group.cluster_id, &candidates)
            {
                Ok(Some(supervisor_id)) => {
                    match self
                        .repos
                        .group_store()
                        .assign_supervisor(&group.group_id, &supervisor_id)
                    {
                        Ok(()) => {
                            debug!(group_id = %group.group_id, supervisor_id = %supervisor_id, "监理已指派");
                            group.supervisor_id = Some(supervisor_id);
                            let event = GroupEvent::supervisor_assigned(
                                &group.group_id,
                                &group.cluster_id,
                                &ctx.season_id,
                                ctx.year,
                            );
                            if let Err(e) = self.event_publisher.publish(event) {
                                warn!(group_id = %group.group_id, error = %e, "监理指派事件发布失败");
                            }
                        }
                        Err(e) => {
                            warn!(group_id = %group.group_id, error = %e, "监理回写失败，分组保持未指派");
                        }
                    }
                }
                Ok(None) => {
                    debug!(group_id = %group.group_id, "无可用监理，分组保持未指派");
                }
                Err(e) => {
                    warn!(group_id = %group.group_id, error = %e, "监理指派失败，分组保持未指派");
                }
            }
        }
    }
}
