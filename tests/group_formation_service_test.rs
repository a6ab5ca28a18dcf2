// ==========================================
// 分组编排服务集成测试
// ==========================================
// 职责: 基于临时 SQLite 库验证 自动 / 预览提交 / 人工 三种模式
// ==========================================


#[cfg(test)]
mod group_formation_service_test {
    use chrono::NaiveDate;
    use std::collections::HashSet;
    use std::error::Error;
    use std::sync::{Arc, Mutex};

    use farm_group_formation::config::{config_keys, ConfigManager};
    use farm_group_formation::domain::{
        EditedProposal, FormationStatus, GroupStatus, GroupingParametersInput, PlantingWindow,
        SingletonPolicy, UngroupableReason, ViolationKind, ViolationSeverity,
    };
    use farm_group_formation::engine::{
        CancellationFlag, FormGroupsRequest, FormationError, GroupEvent, GroupEventPublisher,
        GroupEventType, ManualGroupRequest, OptionalEventPublisher, PreviewCommitRequest,
        RoundRobinSupervisorAssigner,
    };
    use farm_group_formation::domain::{Group, NewGroup};
    use farm_group_formation::engine::{FormationRepositories, GroupFormationService, GroupStore};
    use farm_group_formation::repository::{GroupRepository, PlotRepository, RepositoryResult};

    use crate::test_helpers::*;

    // ==========================================
    // 测试辅助函数
    // ==========================================

    fn preview_request() -> FormGroupsRequest {
        FormGroupsRequest {
            cluster_id: CLUSTER.to_string(),
            season_id: SEASON.to_string(),
            year: YEAR,
            preview_only: true,
            ..Default::default()
        }
    }

    fn commit_request() -> FormGroupsRequest {
        FormGroupsRequest {
            preview_only: false,
            ..preview_request()
        }
    }

    fn manual_request(plot_ids: &[&str], is_exception: bool, reason: Option<&str>) -> ManualGroupRequest {
        ManualGroupRequest {
            cluster_id: CLUSTER.to_string(),
            rice_variety_id: "V1".to_string(),
            season_id: SEASON.to_string(),
            year: YEAR,
            planting_date: NaiveDate::from_ymd_opt(2026, 5, 2).unwrap(),
            plot_ids: plot_ids.iter().map(|s| s.to_string()).collect(),
            is_exception,
            exception_reason: reason.map(str::to_string),
            group_name: None,
            supervisor_id: None,
            parameters: None,
            create_immediately: false,
        }
    }

    #[derive(Default)]
    struct RecordingPublisher {
        events: Mutex<Vec<GroupEvent>>,
    }

    impl GroupEventPublisher for RecordingPublisher {
        fn publish(&self, event: GroupEvent) -> Result<String, Box<dyn Error + Send + Sync>> {
            self.events.lock().unwrap().push(event);
            Ok(String::new())
        }
    }

    // ==========================================
    // 自动分组
    // ==========================================

    #[tokio::test]
    async fn test_compact_cluster_commits_single_group() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let conn = open_shared(&db_path);
        seed_plots(&conn, &grid("A", 12, 4, 150.0, 0.0, 2.5));
        let service = build_service(conn.clone());

        let outcome = service
            .form_groups(commit_request(), &CancellationFlag::new())
            .await
            .unwrap();

        assert_eq!(outcome.status, FormationStatus::Committed);
        assert_eq!(outcome.proposals.len(), 1);
        let validated = &outcome.proposals[0];
        assert!(validated.validation.ok);
        assert!(validated.validation.violations.is_empty());
        assert!(!validated.proposal.is_exception);
        assert_eq!(
            validated.proposal.group_name.as_deref(),
            Some("C1-SUMMER-AUTUMN-2026-G01")
        );

        assert_eq!(outcome.groups.len(), 1);
        let group = &outcome.groups[0];
        assert_eq!(group.status, GroupStatus::Draft);
        assert_eq!(group.plot_ids.len(), 12);
        assert!((group.total_area_ha - 30.0).abs() < 1e-9);
        assert_eq!(group.planting_date, NaiveDate::from_ymd_opt(2026, 5, 1).unwrap());

        assert_eq!(outcome.summary.candidate_count, 12);
        assert_eq!(outcome.summary.exception_count, 0);
        assert_eq!(count_group_plots(&conn), 12);

        // 地块已归属分组，再次运行没有候选
        let rerun = service
            .form_groups(commit_request(), &CancellationFlag::new())
            .await;
        assert!(matches!(rerun, Err(FormationError::EmptyCandidateSet { .. })));
    }

    #[tokio::test]
    async fn test_small_group_becomes_exception_with_warnings() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let conn = open_shared(&db_path);
        seed_plots(&conn, &grid("B", 3, 3, 100.0, 0.0, 2.0));
        let service = build_service(conn);

        let outcome = service
            .form_groups(preview_request(), &CancellationFlag::new())
            .await
            .unwrap();

        assert_eq!(outcome.status, FormationStatus::Previewed);
        assert!(outcome.groups.is_empty());
        assert_eq!(outcome.proposals.len(), 1);

        let validated = &outcome.proposals[0];
        assert!(validated.proposal.is_exception);
        assert!(validated.validation.ok);
        let area = validated
            .validation
            .violations
            .iter()
            .find(|v| v.kind == ViolationKind::AreaBelowMinimum)
            .expect("area warning");
        assert_eq!(area.severity, ViolationSeverity::Soft);
        assert!(area.message.contains("area below minimum"));
        assert!(validated
            .proposal
            .exception_reason
            .as_deref()
            .unwrap()
            .contains("area below minimum"));
    }

    #[tokio::test]
    async fn test_distant_plots_form_separate_proposals() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let conn = open_shared(&db_path);
        seed_plots(
            &conn,
            &[
                PlotSeed::new("P1", 0.0, 0.0, 10.0, 0),
                PlotSeed::new("P2", 5000.0, 0.0, 10.0, 0),
            ],
        );
        let service = build_service(conn);

        let outcome = service
            .form_groups(preview_request(), &CancellationFlag::new())
            .await
            .unwrap();

        let partitions: Vec<Vec<String>> = outcome
            .proposals
            .iter()
            .map(|p| p.proposal.plot_ids.clone())
            .collect();
        assert_eq!(partitions, vec![vec!["P1".to_string()], vec!["P2".to_string()]]);
        assert!(outcome.proposals.iter().all(|p| p.proposal.is_exception));

        // 孤立地块按策略报告为 isolated-undersized
        let mut request = preview_request();
        request.parameters = Some(GroupingParametersInput {
            singleton_policy: Some(SingletonPolicy::Ungroupable),
            ..Default::default()
        });
        let outcome = service
            .form_groups(request, &CancellationFlag::new())
            .await
            .unwrap();
        assert!(outcome.proposals.is_empty());
        assert_eq!(outcome.ungroupable.len(), 2);
        assert!(outcome
            .ungroupable
            .iter()
            .all(|u| u.reason == UngroupableReason::IsolatedUndersized));
    }

    #[tokio::test]
    async fn test_every_candidate_is_accounted_for() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let conn = open_shared(&db_path);
        seed_plots(&conn, &grid("G", 6, 3, 120.0, 0.0, 3.0));

        let mut banned = PlotSeed::new("X-banned", 50.0, 50.0, 3.0, 0);
        banned.farmer_status = "NOT_ALLOWED";
        let mut no_geometry = PlotSeed::new("X-nogeo", 60.0, 60.0, 3.0, 0);
        no_geometry.has_geometry = false;
        let mut no_date = PlotSeed::new("X-nodate", 70.0, 70.0, 3.0, 0);
        no_date.planting_date = None;
        let mut no_variety = PlotSeed::new("X-novariety", 80.0, 80.0, 3.0, 0);
        no_variety.variety = None;
        let mut inactive = PlotSeed::new("X-inactive", 90.0, 90.0, 3.0, 0);
        inactive.status = "INACTIVE";
        let mut other_cluster = PlotSeed::new("X-other", 0.0, 0.0, 3.0, 0);
        other_cluster.cluster_id = "C2";
        seed_plots(
            &conn,
            &[banned, no_geometry, no_date, no_variety, inactive, other_cluster],
        );

        let service = build_service(conn);
        let outcome = service
            .form_groups(preview_request(), &CancellationFlag::new())
            .await
            .unwrap();

        let reasons: Vec<(String, UngroupableReason)> = outcome
            .ungroupable
            .iter()
            .map(|u| (u.plot_id.clone(), u.reason))
            .collect();
        assert_eq!(
            reasons,
            vec![
                ("X-banned".to_string(), UngroupableReason::FarmerIneligible),
                ("X-nodate".to_string(), UngroupableReason::NoPlantingDate),
                ("X-nogeo".to_string(), UngroupableReason::NoGeometry),
                ("X-novariety".to_string(), UngroupableReason::VarietyMismatch),
            ]
        );

        let mut seen = HashSet::new();
        for validated in &outcome.proposals {
            for id in &validated.proposal.plot_ids {
                assert!(seen.insert(id.clone()), "plot {} in two proposals", id);
            }
        }
        for u in &outcome.ungroupable {
            assert!(seen.insert(u.plot_id.clone()), "plot {} reported twice", u.plot_id);
        }
        assert_eq!(seen.len(), 10);
        assert_eq!(outcome.summary.candidate_count, 10);
        assert_eq!(outcome.summary.ungroupable_count, 4);
    }

    #[tokio::test]
    async fn test_preview_is_deterministic() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let conn = open_shared(&db_path);
        seed_plots(&conn, &grid("N", 10, 5, 150.0, 0.0, 2.0));
        seed_plots(&conn, &grid("S", 10, 5, 150.0, 10_000.0, 2.0));
        let service = build_service(conn);

        let first = service
            .form_groups(preview_request(), &CancellationFlag::new())
            .await
            .unwrap();
        let second = service
            .form_groups(preview_request(), &CancellationFlag::new())
            .await
            .unwrap();

        let proposals = |o: &farm_group_formation::FormationOutcome| {
            o.proposals
                .iter()
                .map(|p| p.proposal.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(proposals(&first), proposals(&second));
        assert_eq!(first.proposals.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_parameters_fail_fast() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let conn = open_shared(&db_path);
        seed_plots(&conn, &grid("A", 6, 3, 100.0, 0.0, 3.0));
        let service = build_service(conn.clone());

        let mut request = commit_request();
        request.parameters = Some(GroupingParametersInput {
            min_group_area_ha: Some(60.0),
            max_group_area_ha: Some(50.0),
            ..Default::default()
        });

        let result = service.form_groups(request, &CancellationFlag::new()).await;
        assert!(matches!(result, Err(FormationError::InvalidInput(_))));
        assert_eq!(count_groups(&conn), 0);
    }

    #[tokio::test]
    async fn test_out_of_range_tolerance_is_input_error() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let conn = open_shared(&db_path);
        seed_plots(&conn, &grid("A", 6, 3, 100.0, 0.0, 3.0));
        let service = build_service(conn.clone());

        for tolerance in [100_000_000, i64::MAX] {
            let mut request = commit_request();
            request.parameters = Some(GroupingParametersInput {
                planting_date_tolerance_days: Some(tolerance),
                ..Default::default()
            });
            let result = service.form_groups(request, &CancellationFlag::new()).await;
            assert!(matches!(result, Err(FormationError::InvalidInput(_))));
        }
        assert_eq!(count_groups(&conn), 0);
    }

    #[tokio::test]
    async fn test_empty_cluster_is_an_error() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let service = build_service(open_shared(&db_path));

        let result = service
            .form_groups(preview_request(), &CancellationFlag::new())
            .await;
        assert!(matches!(result, Err(FormationError::EmptyCandidateSet { .. })));
    }

    #[tokio::test]
    async fn test_config_kv_defaults_and_request_override() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let conn = open_shared(&db_path);
        seed_plots(&conn, &grid("B", 3, 3, 100.0, 0.0, 2.0));

        let config = ConfigManager::from_connection(conn.clone()).unwrap();
        config
            .set_global_config_value(config_keys::MIN_PLOTS_PER_GROUP, "3")
            .unwrap();
        config
            .set_global_config_value(config_keys::MIN_GROUP_AREA_HA, "5")
            .unwrap();

        let service = build_service(conn);
        let outcome = service
            .form_groups(preview_request(), &CancellationFlag::new())
            .await
            .unwrap();
        assert_eq!(outcome.parameters.min_plots_per_group, 3);
        assert!(!outcome.proposals[0].proposal.is_exception);

        let mut request = preview_request();
        request.parameters = Some(GroupingParametersInput {
            min_plots_per_group: Some(4),
            ..Default::default()
        });
        let outcome = service
            .form_groups(request, &CancellationFlag::new())
            .await
            .unwrap();
        assert_eq!(outcome.parameters.min_plots_per_group, 4);
        assert_eq!(outcome.parameters.min_group_area_ha, 5.0);
        assert!(outcome.proposals[0].proposal.is_exception);
    }

    #[tokio::test]
    async fn test_create_immediately_supervisors_and_events() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let conn = open_shared(&db_path);
        seed_plots(&conn, &grid("N", 10, 5, 150.0, 0.0, 2.0));
        seed_plots(&conn, &grid("S", 10, 5, 150.0, 10_000.0, 2.0));
        seed_supervisor(&conn, "SUP-1");
        seed_supervisor(&conn, "SUP-2");

        let publisher = Arc::new(RecordingPublisher::default());
        let service = build_service(conn.clone())
            .with_supervisor_assigner(Arc::new(RoundRobinSupervisorAssigner::new()))
            .with_event_publisher(OptionalEventPublisher::with_publisher(publisher.clone()));

        let mut request = commit_request();
        request.auto_assign_supervisors = true;
        request.create_immediately = true;
        let outcome = service
            .form_groups(request, &CancellationFlag::new())
            .await
            .unwrap();

        assert_eq!(outcome.groups.len(), 2);
        let supervisors: Vec<Option<String>> =
            outcome.groups.iter().map(|g| g.supervisor_id.clone()).collect();
        assert_eq!(
            supervisors,
            vec![Some("SUP-1".to_string()), Some("SUP-2".to_string())]
        );

        let repo = GroupRepository::from_connection(conn);
        for group in &outcome.groups {
            let stored = repo.find_by_id(&group.group_id).unwrap().unwrap();
            assert_eq!(stored.status, GroupStatus::Active);
            assert_eq!(stored.supervisor_id, group.supervisor_id);
            assert_eq!(stored.plot_ids, group.plot_ids);
        }

        // 先发布两条创建事件，监理回写成功后各一条指派事件
        let events = publisher.events.lock().unwrap();
        let kinds: Vec<GroupEventType> = events.iter().map(|e| e.change_type).collect();
        assert_eq!(
            kinds,
            vec![
                GroupEventType::Created,
                GroupEventType::Created,
                GroupEventType::SupervisorAssigned,
                GroupEventType::SupervisorAssigned,
            ]
        );
        assert_eq!(events[2].group_id, outcome.groups[0].group_id);
        assert_eq!(events[3].group_id, outcome.groups[1].group_id);
    }

    #[tokio::test]
    async fn test_supervisor_unavailable_still_commits() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let conn = open_shared(&db_path);
        seed_plots(&conn, &grid("A", 12, 4, 150.0, 0.0, 2.5));
        let service = build_service(conn.clone())
            .with_supervisor_assigner(Arc::new(RoundRobinSupervisorAssigner::new()));

        let mut request = commit_request();
        request.auto_assign_supervisors = true;
        let outcome = service
            .form_groups(request, &CancellationFlag::new())
            .await
            .unwrap();

        assert_eq!(outcome.groups.len(), 1);
        assert!(outcome.groups[0].supervisor_id.is_none());
        assert_eq!(count_groups(&conn), 1);
    }

    #[tokio::test]
    async fn test_cancelled_run_persists_nothing() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let conn = open_shared(&db_path);
        seed_plots(&conn, &grid("A", 12, 4, 150.0, 0.0, 2.5));
        let service = build_service(conn.clone());

        let cancel = CancellationFlag::new();
        cancel.cancel();
        let result = service.form_groups(commit_request(), &cancel).await;

        assert!(matches!(result, Err(FormationError::Cancelled)));
        assert_eq!(count_groups(&conn), 0);
        assert_eq!(count_group_plots(&conn), 0);
    }

    // ==========================================
    // 预览提交
    // ==========================================

    #[tokio::test]
    async fn test_preview_commit_unedited() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let conn = open_shared(&db_path);
        seed_plots(&conn, &grid("N", 10, 5, 150.0, 0.0, 2.0));
        seed_plots(&conn, &grid("S", 10, 5, 150.0, 10_000.0, 2.0));
        let service = build_service(conn.clone());

        let preview = service
            .form_groups(preview_request(), &CancellationFlag::new())
            .await
            .unwrap();
        let edited: Vec<EditedProposal> = preview
            .proposals
            .iter()
            .map(|p| EditedProposal::from(&p.proposal))
            .collect();

        let outcome = service
            .form_groups_from_preview(
                PreviewCommitRequest {
                    cluster_id: CLUSTER.to_string(),
                    season_id: SEASON.to_string(),
                    year: YEAR,
                    proposals: edited,
                    ..Default::default()
                },
                &CancellationFlag::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.status, FormationStatus::Committed);
        assert_eq!(outcome.groups.len(), 2);
        assert_eq!(count_group_plots(&conn), 20);
    }

    #[tokio::test]
    async fn test_preview_edit_exceeding_max_rejects_whole_batch() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let conn = open_shared(&db_path);
        seed_plots(&conn, &grid("N", 10, 5, 150.0, 0.0, 2.0));
        seed_plots(&conn, &grid("S", 10, 5, 150.0, 10_000.0, 2.0));
        let service = build_service(conn.clone());

        let preview = service
            .form_groups(preview_request(), &CancellationFlag::new())
            .await
            .unwrap();
        let mut edited: Vec<EditedProposal> = preview
            .proposals
            .iter()
            .map(|p| EditedProposal::from(&p.proposal))
            .collect();
        assert_eq!(edited.len(), 2);

        // 把第二组的 6 个地块移到第一组: 16 > 15
        let moved: Vec<String> = edited[1].plot_ids.drain(..6).collect();
        edited[0].plot_ids.extend(moved);

        let outcome = service
            .form_groups_from_preview(
                PreviewCommitRequest {
                    cluster_id: CLUSTER.to_string(),
                    season_id: SEASON.to_string(),
                    year: YEAR,
                    proposals: edited,
                    ..Default::default()
                },
                &CancellationFlag::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.status, FormationStatus::Rejected);
        assert!(outcome.groups.is_empty());
        let first = &outcome.proposals[0].validation;
        assert!(!first.ok);
        assert!(first.has_kind(ViolationKind::PlotCountAboveMaximum));
        assert_eq!(count_groups(&conn), 0);
    }

    #[tokio::test]
    async fn test_preview_commit_recomputes_edited_planting_window() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let conn = open_shared(&db_path);
        seed_plots(&conn, &grid("N", 10, 5, 150.0, 0.0, 2.0));
        let service = build_service(conn.clone());

        let preview = service
            .form_groups(preview_request(), &CancellationFlag::new())
            .await
            .unwrap();
        let mut edited: Vec<EditedProposal> = preview
            .proposals
            .iter()
            .map(|p| EditedProposal::from(&p.proposal))
            .collect();
        assert_eq!(edited.len(), 1);

        // 伪造的全年窗口，中位日期远离成员播期
        edited[0].planting_window_start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        edited[0].planting_window_end = NaiveDate::from_ymd_opt(2026, 12, 31).unwrap();
        edited[0].median_planting_date = NaiveDate::from_ymd_opt(2026, 9, 15).unwrap();

        let outcome = service
            .form_groups_from_preview(
                PreviewCommitRequest {
                    cluster_id: CLUSTER.to_string(),
                    season_id: SEASON.to_string(),
                    year: YEAR,
                    proposals: edited,
                    ..Default::default()
                },
                &CancellationFlag::new(),
            )
            .await
            .unwrap();

        // 成员播期为 05-01 / 05-02 交替
        let may_1 = NaiveDate::from_ymd_opt(2026, 5, 1).unwrap();
        let may_2 = NaiveDate::from_ymd_opt(2026, 5, 2).unwrap();
        assert_eq!(outcome.status, FormationStatus::Committed);
        assert_eq!(
            outcome.proposals[0].proposal.planting_window,
            PlantingWindow::from_bounds(may_1, may_2)
        );
        assert_eq!(outcome.groups.len(), 1);
        assert_eq!(outcome.groups[0].planting_date, may_1);

        let stored = GroupRepository::from_connection(conn)
            .find_by_id(&outcome.groups[0].group_id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.planting_date, may_1);
    }

    #[tokio::test]
    async fn test_preview_duplicate_plot_across_proposals() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let conn = open_shared(&db_path);
        seed_plots(&conn, &grid("N", 10, 5, 150.0, 0.0, 2.0));
        seed_plots(&conn, &grid("S", 10, 5, 150.0, 10_000.0, 2.0));
        let service = build_service(conn.clone());

        let preview = service
            .form_groups(preview_request(), &CancellationFlag::new())
            .await
            .unwrap();
        let mut edited: Vec<EditedProposal> = preview
            .proposals
            .iter()
            .map(|p| EditedProposal::from(&p.proposal))
            .collect();
        let shared = edited[0].plot_ids[0].clone();
        edited[1].plot_ids.push(shared);

        let outcome = service
            .form_groups_from_preview(
                PreviewCommitRequest {
                    cluster_id: CLUSTER.to_string(),
                    season_id: SEASON.to_string(),
                    year: YEAR,
                    proposals: edited,
                    ..Default::default()
                },
                &CancellationFlag::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.status, FormationStatus::Rejected);
        assert!(outcome
            .proposals
            .iter()
            .all(|p| p.validation.has_kind(ViolationKind::DuplicatePlot)));
        assert_eq!(count_groups(&conn), 0);
    }

    // ==========================================
    // 人工建组
    // ==========================================

    #[tokio::test]
    async fn test_manual_exception_without_reason_is_input_error() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let conn = open_shared(&db_path);
        seed_plots(&conn, &grid("M", 3, 3, 100.0, 0.0, 2.0));
        let service = build_service(conn.clone());

        let result = service
            .create_group_manually(
                manual_request(&["M00", "M01", "M02"], true, None),
                &CancellationFlag::new(),
            )
            .await;

        assert!(matches!(result, Err(FormationError::InvalidInput(_))));
        assert_eq!(count_groups(&conn), 0);
    }

    #[tokio::test]
    async fn test_manual_exception_with_reason_commits() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let conn = open_shared(&db_path);
        seed_plots(&conn, &grid("M", 3, 3, 100.0, 0.0, 2.0));
        let service = build_service(conn.clone());

        let outcome = service
            .create_group_manually(
                manual_request(&["M00", "M01", "M02"], true, Some("island plots, shared pump")),
                &CancellationFlag::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.status, FormationStatus::Committed);
        assert_eq!(outcome.groups.len(), 1);
        let group = &outcome.groups[0];
        assert!(group.is_exception);
        assert_eq!(group.exception_reason.as_deref(), Some("island plots, shared pump"));
        assert_eq!(group.planting_date, NaiveDate::from_ymd_opt(2026, 5, 2).unwrap());
        assert!(outcome.proposals[0].validation.warnings().count() >= 2);
    }

    #[tokio::test]
    async fn test_manual_undersized_without_exception_is_rejected() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let conn = open_shared(&db_path);
        seed_plots(&conn, &grid("M", 3, 3, 100.0, 0.0, 2.0));
        let service = build_service(conn.clone());

        let outcome = service
            .create_group_manually(
                manual_request(&["M00", "M01", "M02"], false, None),
                &CancellationFlag::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.status, FormationStatus::Rejected);
        let validation = &outcome.proposals[0].validation;
        assert!(validation.has_kind(ViolationKind::PlotCountBelowMinimum));
        assert!(validation.has_kind(ViolationKind::AreaBelowMinimum));
        assert_eq!(count_groups(&conn), 0);
    }

    #[tokio::test]
    async fn test_manual_ineligible_farmer_always_rejected() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let conn = open_shared(&db_path);
        let mut seeds = grid("M", 3, 3, 100.0, 0.0, 2.0);
        seeds[1].farmer_status = "NOT_ALLOWED";
        seed_plots(&conn, &seeds);
        let service = build_service(conn.clone());

        let outcome = service
            .create_group_manually(
                manual_request(&["M00", "M01", "M02"], true, Some("approved by cluster head")),
                &CancellationFlag::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.status, FormationStatus::Rejected);
        let hard: Vec<ViolationKind> = outcome.proposals[0]
            .validation
            .hard_violations()
            .map(|v| v.kind)
            .collect();
        assert_eq!(hard, vec![ViolationKind::FarmerIneligible]);
        assert_eq!(count_groups(&conn), 0);
    }

    // ==========================================
    // 并发控制
    // ==========================================

    /// 在本次落库之前先让"另一个运行"抢占地块
    struct RacingStore {
        inner: GroupRepository,
        rival: GroupRepository,
        rival_group: Mutex<Option<NewGroup>>,
    }

    impl GroupStore for RacingStore {
        fn persist_groups(&self, groups: Vec<NewGroup>) -> RepositoryResult<Vec<Group>> {
            if let Some(group) = self.rival_group.lock().unwrap().take() {
                self.rival.insert_groups(vec![group]).unwrap();
            }
            self.inner.persist_groups(groups)
        }

        fn assign_supervisor(&self, group_id: &str, supervisor_id: &str) -> RepositoryResult<()> {
            self.inner.assign_supervisor(group_id, supervisor_id)
        }
    }

    fn rival_group(plot_ids: &[&str]) -> NewGroup {
        NewGroup {
            group_id: "RIVAL".to_string(),
            group_name: "rival".to_string(),
            cluster_id: CLUSTER.to_string(),
            season_id: SEASON.to_string(),
            year: YEAR,
            status: GroupStatus::Draft,
            total_area_ha: 2.5,
            planting_date: NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
            rice_variety_id: "V1".to_string(),
            supervisor_id: None,
            is_exception: true,
            exception_reason: Some("manual".to_string()),
            plot_ids: plot_ids.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_plot_claimed_mid_run_is_concurrency_conflict() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let conn = open_shared(&db_path);
        seed_plots(&conn, &grid("A", 12, 4, 150.0, 0.0, 2.5));

        let store = RacingStore {
            inner: GroupRepository::from_connection(conn.clone()),
            rival: GroupRepository::from_connection(open_shared(&db_path)),
            rival_group: Mutex::new(Some(rival_group(&["A05"]))),
        };
        let repos = FormationRepositories::new(
            Arc::new(PlotRepository::from_connection(conn.clone())),
            Arc::new(store),
        );
        let config = ConfigManager::from_connection(conn.clone()).unwrap();
        let service = GroupFormationService::new(Arc::new(config), repos);

        let result = service
            .form_groups(commit_request(), &CancellationFlag::new())
            .await;

        match result {
            Err(err @ FormationError::ConcurrencyConflict(_)) => assert!(err.is_retryable()),
            other => panic!("expected concurrency conflict, got {:?}", other.map(|o| o.status)),
        }
        // 只有抢占者的分组落库，本次运行没有部分提交
        assert_eq!(count_groups(&conn), 1);
        assert_eq!(count_group_plots(&conn), 1);
    }

    #[tokio::test]
    async fn test_stale_preview_commit_rejects_claimed_plots() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let conn_a = open_shared(&db_path);
        let conn_b = open_shared(&db_path);
        seed_plots(&conn_a, &grid("A", 12, 4, 150.0, 0.0, 2.5));
        let service_a = build_service(conn_a.clone());
        let service_b = build_service(conn_b);

        let preview = service_b
            .form_groups(preview_request(), &CancellationFlag::new())
            .await
            .unwrap();

        service_a
            .form_groups(commit_request(), &CancellationFlag::new())
            .await
            .unwrap();

        let outcome = service_b
            .form_groups_from_preview(
                PreviewCommitRequest {
                    cluster_id: CLUSTER.to_string(),
                    season_id: SEASON.to_string(),
                    year: YEAR,
                    proposals: preview
                        .proposals
                        .iter()
                        .map(|p| EditedProposal::from(&p.proposal))
                        .collect(),
                    ..Default::default()
                },
                &CancellationFlag::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.status, FormationStatus::Rejected);
        assert!(outcome.proposals[0]
            .validation
            .has_kind(ViolationKind::UnknownPlot));
        assert_eq!(count_groups(&conn_a), 1);
        assert_eq!(count_group_plots(&conn_a), 12);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_parallel_runs_never_double_assign() {
        let (_tmp, db_path) = create_test_db().unwrap();
        seed_plots(&open_shared(&db_path), &grid("A", 12, 4, 150.0, 0.0, 2.5));

        let mut handles = Vec::new();
        for _ in 0..2 {
            let service = build_service(open_shared(&db_path));
            handles.push(tokio::spawn(async move {
                service
                    .form_groups(commit_request(), &CancellationFlag::new())
                    .await
            }));
        }

        let mut committed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(outcome) => {
                    assert_eq!(outcome.status, FormationStatus::Committed);
                    committed += outcome.groups.len();
                }
                Err(FormationError::ConcurrencyConflict(_))
                | Err(FormationError::EmptyCandidateSet { .. }) => {}
                Err(other) => panic!("unexpected error: {}", other),
            }
        }

        let conn = open_shared(&db_path);
        assert_eq!(committed, 1);
        assert_eq!(count_groups(&conn), 1);
        assert_eq!(count_group_plots(&conn), 12);
    }
}
