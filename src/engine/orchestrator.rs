// ==========================================
// 农场生产分组系统 - 分组编排服务
// ==========================================
// 用途: 协调 候选集 → 聚类 → 校验 → 预览/物化 → 监理指派 的执行顺序
// 模式:
// - form_groups: 全自动（preview_only 时只预览）
// - form_groups_from_preview: 用户编辑后的预览整批提交（全有或全无）
// - create_group_manually: 人工组建单个分组（允许例外）
// 红线: 只有结构性问题（参数无效 / 无候选 / 数据源不可达）才返回 Err
// ==========================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::config::GroupingConfigReader;
use crate::domain::group::{
    EditedProposal, Group, GroupProposal, PlantingWindow, ValidatedProposal,
};
use crate::domain::parameters::{GroupingParameters, GroupingParametersInput};
use crate::domain::plot::UngroupablePlot;
use crate::domain::types::{FormationStatus, ViolationKind};
use crate::domain::validation::{ValidationResult, Violation};
use crate::engine::candidate::{CandidateSet, PlotLookup};
use crate::engine::clustering::ClusteringEngine;
use crate::engine::error::{FormationError, FormationResult};
use crate::engine::events::OptionalEventPublisher;
use crate::engine::geometry::{BasicGeometryValidator, GeometryValidator};
use crate::engine::materializer::{GroupMaterializer, MaterializeContext};
use crate::engine::repositories::FormationRepositories;
use crate::engine::supervisor::SupervisorAssigner;
use crate::engine::validator::GroupValidator;

// ==========================================
// CancellationFlag - 取消信号
// ==========================================
// 克隆后共享同一标志；落库前检查，已提交的分组不受影响
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

// ==========================================
// 请求 / 结果
// ==========================================

/// 自动分组请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormGroupsRequest {
    pub cluster_id: String,
    pub season_id: String,
    pub year: i32,
    #[serde(default)]
    pub parameters: Option<GroupingParametersInput>,
    #[serde(default)]
    pub auto_assign_supervisors: bool,
    #[serde(default)]
    pub create_immediately: bool,
    #[serde(default)]
    pub preview_only: bool,
}

/// 预览提交请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreviewCommitRequest {
    pub cluster_id: String,
    pub season_id: String,
    pub year: i32,
    pub proposals: Vec<EditedProposal>,
    #[serde(default)]
    pub parameters: Option<GroupingParametersInput>,
    #[serde(default)]
    pub auto_assign_supervisors: bool,
    #[serde(default)]
    pub create_immediately: bool,
}

/// 人工建组请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualGroupRequest {
    pub cluster_id: String,
    pub rice_variety_id: String,
    pub season_id: String,
    pub year: i32,
    pub planting_date: NaiveDate,
    pub plot_ids: Vec<String>,
    #[serde(default)]
    pub is_exception: bool,
    #[serde(default)]
    pub exception_reason: Option<String>,
    #[serde(default)]
    pub group_name: Option<String>,
    #[serde(default)]
    pub supervisor_id: Option<String>,
    #[serde(default)]
    pub parameters: Option<GroupingParametersInput>,
    #[serde(default)]
    pub create_immediately: bool,
}

/// 运行汇总
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormationSummary {
    pub candidate_count: usize,
    pub proposal_count: usize,
    pub exception_count: usize,
    pub ungroupable_count: usize,
    pub grouped_area_ha: f64,
}

/// 一次分组运行的结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormationOutcome {
    pub status: FormationStatus,
    /// 全部候选分组及其校验结果（按生成顺序）
    pub proposals: Vec<ValidatedProposal>,
    /// 已落库的分组（预览 / 拒绝时为空）
    pub groups: Vec<Group>,
    pub ungroupable: Vec<UngroupablePlot>,
    /// 本次实际使用的参数
    pub parameters: GroupingParameters,
    pub summary: FormationSummary,
}

impl FormationOutcome {
    fn new(
        status: FormationStatus,
        proposals: Vec<ValidatedProposal>,
        groups: Vec<Group>,
        ungroupable: Vec<UngroupablePlot>,
        parameters: GroupingParameters,
        candidate_count: usize,
    ) -> Self {
        let summary = FormationSummary {
            candidate_count,
            proposal_count: proposals.len(),
            exception_count: proposals.iter().filter(|p| p.proposal.is_exception).count(),
            ungroupable_count: ungroupable.len(),
            grouped_area_ha: proposals.iter().map(|p| p.proposal.total_area_ha).sum(),
        };
        Self {
            status,
            proposals,
            groups,
            ungroupable,
            parameters,
            summary,
        }
    }

    /// 是否存在任何硬违规
    pub fn has_hard_violations(&self) -> bool {
        self.proposals.iter().any(|p| !p.validation.ok)
    }
}

// ==========================================
// GroupFormationService - 分组编排服务
// ==========================================
pub struct GroupFormationService<C>
where
    C: GroupingConfigReader,
{
    config: Arc<C>,
    repos: FormationRepositories,
    geometry_validator: Arc<dyn GeometryValidator>,
    clustering: ClusteringEngine,
    validator: GroupValidator,
    materializer: GroupMaterializer,
}

impl<C> GroupFormationService<C>
where
    C: GroupingConfigReader,
{
    /// 创建新的编排服务
    ///
    /// # 参数
    /// - config: 参数缺省值读取器
    /// - repos: 读写端口
    pub fn new(config: Arc<C>, repos: FormationRepositories) -> Self {
        Self {
            config,
            materializer: GroupMaterializer::new(repos.clone()),
            repos,
            geometry_validator: Arc::new(BasicGeometryValidator),
            clustering: ClusteringEngine::new(),
            validator: GroupValidator::new(),
        }
    }

    pub fn with_geometry_validator(mut self, validator: Arc<dyn GeometryValidator>) -> Self {
        self.geometry_validator = validator;
        self
    }

    pub fn with_supervisor_assigner(mut self, assigner: Arc<dyn SupervisorAssigner>) -> Self {
        self.materializer.set_supervisor_assigner(assigner);
        self
    }

    pub fn with_event_publisher(mut self, publisher: OptionalEventPublisher) -> Self {
        self.materializer.set_event_publisher(publisher);
        self
    }

    // ==========================================
    // FormGroups - 自动分组
    // ==========================================

    /// 对 (cluster, season, year) 执行完整分组流程
    ///
    /// # 返回
    /// - Ok(outcome): Previewed（preview_only）或 Committed
    /// - Err(EmptyCandidateSet): 无任何候选地块
    /// - Err(Cancelled): 落库前被取消，未持久化任何内容
    #[instrument(skip(self, request, cancel), fields(
        cluster_id = %request.cluster_id,
        season_id = %request.season_id,
        year = request.year,
        preview_only = request.preview_only
    ))]
    pub async fn form_groups(
        &self,
        request: FormGroupsRequest,
        cancel: &CancellationFlag,
    ) -> FormationResult<FormationOutcome> {
        ensure_scope(&request.cluster_id, &request.season_id)?;
        let params = self.resolve_parameters(request.parameters.as_ref()).await?;

        // 步骤1: 候选集
        let candidates = self.load_candidate_set(&request.cluster_id, &request.season_id, request.year)?;
        if candidates.is_empty() {
            return Err(FormationError::EmptyCandidateSet {
                cluster_id: request.cluster_id,
                season_id: request.season_id,
                year: request.year,
            });
        }

        // 步骤2: 聚类
        let output = self
            .clustering
            .cluster(&request.cluster_id, &candidates.eligible, &params);

        let ctx = MaterializeContext {
            cluster_id: request.cluster_id.clone(),
            season_id: request.season_id.clone(),
            year: request.year,
            create_immediately: request.create_immediately,
            auto_assign_supervisors: request.auto_assign_supervisors,
        };
        let mut proposals = output.proposals;
        self.materializer.name_proposals(&ctx, &mut proposals);

        // 步骤3: 逐个校验
        let validated: Vec<ValidatedProposal> = proposals
            .into_iter()
            .map(|proposal| {
                let validation = self.validator.validate(&proposal, &candidates.available, &params);
                ValidatedProposal {
                    proposal,
                    validation,
                }
            })
            .collect();

        let mut ungroupable = candidates.ungroupable.clone();
        ungroupable.extend(output.ungroupable);
        ungroupable.sort_by(|a, b| a.plot_id.cmp(&b.plot_id));

        info!(
            candidates = candidates.candidate_count(),
            proposals = validated.len(),
            ungroupable = ungroupable.len(),
            "聚类与校验完成"
        );

        if request.preview_only {
            return Ok(FormationOutcome::new(
                FormationStatus::Previewed,
                validated,
                Vec::new(),
                ungroupable,
                params,
                candidates.candidate_count(),
            ));
        }

        // 步骤4: 物化（只提交无硬违规的分组，其余保留在结果中）
        let committable: Vec<GroupProposal> = validated
            .iter()
            .filter(|v| v.validation.ok)
            .map(|v| v.proposal.clone())
            .collect();
        let skipped = validated.len() - committable.len();
        if skipped > 0 {
            warn!(skipped, "部分候选分组存在硬违规，未落库");
        }

        let groups = self.materializer.materialize(&ctx, committable, cancel)?;

        Ok(FormationOutcome::new(
            FormationStatus::Committed,
            validated,
            groups,
            ungroupable,
            params,
            candidates.candidate_count(),
        ))
    }

    // ==========================================
    // FormGroupsFromPreview - 预览提交
    // ==========================================

    /// 重新校验用户编辑后的预览并整批提交
    ///
    /// 任一分组存在硬违规时整批拒绝（返回 Rejected，附全部校验结果），不做部分提交
    #[instrument(skip(self, request, cancel), fields(
        cluster_id = %request.cluster_id,
        season_id = %request.season_id,
        year = request.year,
        proposals = request.proposals.len()
    ))]
    pub async fn form_groups_from_preview(
        &self,
        request: PreviewCommitRequest,
        cancel: &CancellationFlag,
    ) -> FormationResult<FormationOutcome> {
        ensure_scope(&request.cluster_id, &request.season_id)?;
        if request.proposals.is_empty() {
            return Err(FormationError::InvalidInput(
                "preview batch contains no proposals".to_string(),
            ));
        }
        let params = self.resolve_parameters(request.parameters.as_ref()).await?;
        let candidates = self.load_candidate_set(&request.cluster_id, &request.season_id, request.year)?;

        // 跨分组重复地块
        let mut occurrences: HashMap<&str, usize> = HashMap::new();
        for edited in &request.proposals {
            let mut seen_here = std::collections::HashSet::new();
            for plot_id in &edited.plot_ids {
                if seen_here.insert(plot_id.as_str()) {
                    *occurrences.entry(plot_id.as_str()).or_insert(0) += 1;
                }
            }
        }
        let shared: HashMap<String, usize> = occurrences
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(id, count)| (id.to_string(), count))
            .collect();

        let ctx = MaterializeContext {
            cluster_id: request.cluster_id.clone(),
            season_id: request.season_id.clone(),
            year: request.year,
            create_immediately: request.create_immediately,
            auto_assign_supervisors: request.auto_assign_supervisors,
        };

        let mut proposals: Vec<GroupProposal> = request
            .proposals
            .into_iter()
            .map(|edited| {
                let area = member_area(&edited.plot_ids, &candidates.available);
                let window = member_window(&edited.plot_ids, &candidates.available);
                let mut proposal = edited.into_proposal(&request.cluster_id, area);
                // 播期窗口以成员地块的实际播期为准，忽略编辑值
                if let Some(window) = window {
                    if window != proposal.planting_window {
                        debug!(
                            submitted = ?proposal.planting_window,
                            recomputed = ?window,
                            "预览播期窗口与成员地块不符，已按成员重算"
                        );
                    }
                    proposal.planting_window = window;
                }
                proposal
            })
            .collect();
        self.materializer.name_proposals(&ctx, &mut proposals);

        let validated: Vec<ValidatedProposal> = proposals
            .into_iter()
            .map(|proposal| {
                let mut result = self.validator.validate(&proposal, &candidates.available, &params);
                let mut extra: Vec<Violation> = proposal
                    .plot_ids
                    .iter()
                    .filter_map(|id| shared.get(id).map(|count| (id, count)))
                    .map(|(id, count)| {
                        Violation::hard(
                            ViolationKind::DuplicatePlot,
                            format!("plot {} appears in {} proposals", id, count),
                        )
                    })
                    .collect();
                if !extra.is_empty() {
                    let mut violations = std::mem::take(&mut result.violations);
                    violations.append(&mut extra);
                    result = ValidationResult::from_violations(violations);
                }
                ValidatedProposal {
                    proposal,
                    validation: result,
                }
            })
            .collect();

        let rejected = validated.iter().filter(|v| !v.validation.ok).count();
        if rejected > 0 {
            warn!(rejected, "预览批次存在硬违规，整批拒绝");
            return Ok(FormationOutcome::new(
                FormationStatus::Rejected,
                validated,
                Vec::new(),
                Vec::new(),
                params,
                candidates.candidate_count(),
            ));
        }

        let committable = validated.iter().map(|v| v.proposal.clone()).collect();
        let groups = self.materializer.materialize(&ctx, committable, cancel)?;

        Ok(FormationOutcome::new(
            FormationStatus::Committed,
            validated,
            groups,
            Vec::new(),
            params,
            candidates.candidate_count(),
        ))
    }

    // ==========================================
    // CreateGroupManually - 人工建组
    // ==========================================

    /// 校验并落库一个人工组建的分组
    ///
    /// # 返回
    /// - Err(InvalidInput): 例外分组未给出原因 / 地块列表为空（校验前拒绝）
    /// - Ok(Rejected): 存在硬违规，未落库
    /// - Ok(Committed): 已落库
    #[instrument(skip(self, request, cancel), fields(
        cluster_id = %request.cluster_id,
        season_id = %request.season_id,
        year = request.year,
        plots = request.plot_ids.len(),
        is_exception = request.is_exception
    ))]
    pub async fn create_group_manually(
        &self,
        request: ManualGroupRequest,
        cancel: &CancellationFlag,
    ) -> FormationResult<FormationOutcome> {
        ensure_scope(&request.cluster_id, &request.season_id)?;
        let reason_missing = request
            .exception_reason
            .as_deref()
            .map_or(true, |r| r.trim().is_empty());
        if request.is_exception && reason_missing {
            return Err(FormationError::InvalidInput(
                "exception_reason is required when is_exception = true".to_string(),
            ));
        }
        if request.plot_ids.is_empty() {
            return Err(FormationError::InvalidInput(
                "plot_ids must not be empty".to_string(),
            ));
        }
        if request.rice_variety_id.trim().is_empty() {
            return Err(FormationError::InvalidInput(
                "rice_variety_id must not be blank".to_string(),
            ));
        }

        let params = self.resolve_parameters(request.parameters.as_ref()).await?;
        let candidates = self.load_candidate_set(&request.cluster_id, &request.season_id, request.year)?;

        let ctx = MaterializeContext {
            cluster_id: request.cluster_id.clone(),
            season_id: request.season_id.clone(),
            year: request.year,
            create_immediately: request.create_immediately,
            auto_assign_supervisors: false,
        };

        let mut proposals = vec![GroupProposal {
            group_name: request.group_name,
            cluster_id: request.cluster_id.clone(),
            rice_variety_id: request.rice_variety_id,
            total_area_ha: member_area(&request.plot_ids, &candidates.available),
            plot_ids: request.plot_ids,
            planting_window: PlantingWindow::single(request.planting_date),
            supervisor_id: request.supervisor_id,
            is_exception: request.is_exception,
            exception_reason: if request.is_exception {
                request.exception_reason
            } else {
                None
            },
        }];
        self.materializer.name_proposals(&ctx, &mut proposals);

        let validated: Vec<ValidatedProposal> = proposals
            .into_iter()
            .map(|proposal| ValidatedProposal {
                validation: self.validator.validate(&proposal, &candidates.available, &params),
                proposal,
            })
            .collect();

        if validated.iter().any(|v| !v.validation.ok) {
            warn!("人工分组存在硬违规，未落库");
            return Ok(FormationOutcome::new(
                FormationStatus::Rejected,
                validated,
                Vec::new(),
                Vec::new(),
                params,
                candidates.candidate_count(),
            ));
        }

        let committable = validated.iter().map(|v| v.proposal.clone()).collect();
        let groups = self.materializer.materialize(&ctx, committable, cancel)?;

        Ok(FormationOutcome::new(
            FormationStatus::Committed,
            validated,
            groups,
            Vec::new(),
            params,
            candidates.candidate_count(),
        ))
    }

    // ==========================================
    // 内部步骤
    // ==========================================

    /// 请求字段 > config_kv > 内置默认
    async fn resolve_parameters(
        &self,
        input: Option<&GroupingParametersInput>,
    ) -> FormationResult<GroupingParameters> {
        let defaults = self
            .config
            .get_default_parameters()
            .await
            .map_err(|e| FormationError::Config(e.to_string()))?;
        let params = GroupingParameters::resolve(input, defaults);
        params
            .validate()
            .map_err(|errors| FormationError::InvalidInput(errors.join("; ")))?;
        debug!(?params, "分组参数已解析");
        Ok(params)
    }

    fn load_candidate_set(
        &self,
        cluster_id: &str,
        season_id: &str,
        year: i32,
    ) -> FormationResult<CandidateSet> {
        let plots = self
            .repos
            .candidate_source()
            .load_candidates(cluster_id, season_id, year)?;
        let loaded = plots.len();
        let set = CandidateSet::build(cluster_id, plots, self.geometry_validator.as_ref());
        debug!(
            loaded,
            eligible = set.eligible.len(),
            ungroupable = set.ungroupable.len(),
            excluded = set.excluded_count,
            "候选集已构建"
        );
        Ok(set)
    }
}

fn ensure_scope(cluster_id: &str, season_id: &str) -> FormationResult<()> {
    if cluster_id.trim().is_empty() {
        return Err(FormationError::InvalidInput("cluster_id must not be blank".to_string()));
    }
    if season_id.trim().is_empty() {
        return Err(FormationError::InvalidInput("season_id must not be blank".to_string()));
    }
    Ok(())
}

/// 按当前可用地块重新计算面积（未知地块不计）
fn member_area(plot_ids: &[String], available: &PlotLookup) -> f64 {
    let mut seen = std::collections::HashSet::new();
    plot_ids
        .iter()
        .filter(|id| seen.insert(id.as_str()))
        .filter_map(|id| available.get(id))
        .map(|plot| plot.area_ha)
        .sum()
}

/// 成员地块播期的窗口；没有任何成员带播期时为 None
fn member_window(plot_ids: &[String], available: &PlotLookup) -> Option<PlantingWindow> {
    PlantingWindow::from_dates(
        plot_ids
            .iter()
            .filter_map(|id| available.get(id))
            .filter_map(|plot| plot.planting_date),
    )
}
