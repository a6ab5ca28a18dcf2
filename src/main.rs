// ==========================================
// 农场生产分组系统 - 命令行入口
// ==========================================
// 用法:
//   group-formation <db_path> <cluster_id> <season_id> <year> [--commit] [--assign-supervisors] [--activate] [--json-log]
//
// 默认只预览，--commit 时落库；结果以 JSON 输出到 stdout，日志输出到 stderr
// ==========================================

use anyhow::Context;
use clap::Parser;
use std::sync::{Arc, Mutex};

use farm_group_formation::config::ConfigManager;
use farm_group_formation::db::{init_schema, open_sqlite_connection};
use farm_group_formation::engine::{
    CancellationFlag, FormGroupsRequest, FormationRepositories, GroupFormationService,
    RoundRobinSupervisorAssigner,
};
use farm_group_formation::repository::{GroupRepository, PlotRepository};
use farm_group_formation::{logging, APP_NAME, VERSION};

/// 对一个片区的当季地块执行分组（默认只预览）
#[derive(Parser, Debug)]
#[command(name = "group-formation", author, version, about, long_about = None)]
struct Args {
    /// SQLite 数据库文件
    db_path: String,

    /// 片区ID
    cluster_id: String,

    /// 季节ID
    season_id: String,

    /// 年份
    year: i32,

    /// 落库（否则只预览）
    #[arg(long)]
    commit: bool,

    /// 落库后自动指派监理
    #[arg(long)]
    assign_supervisors: bool,

    /// 分组直接置为 Active
    #[arg(long)]
    activate: bool,

    /// 日志输出 JSON 格式
    #[arg(long)]
    json_log: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Args {
        db_path,
        cluster_id,
        season_id,
        year,
        commit,
        assign_supervisors,
        activate,
        json_log,
    } = Args::parse();

    logging::init(json_log);
    tracing::info!(version = VERSION, "{} 启动", APP_NAME);

    let conn = open_sqlite_connection(&db_path)
        .with_context(|| format!("无法打开数据库 {}", db_path))?;
    init_schema(&conn).context("建表失败")?;
    let conn = Arc::new(Mutex::new(conn));

    let config = ConfigManager::from_connection(conn.clone())
        .map_err(|e| anyhow::anyhow!("配置初始化失败: {}", e))?;
    let repos = FormationRepositories::new(
        Arc::new(PlotRepository::from_connection(conn.clone())),
        Arc::new(GroupRepository::from_connection(conn)),
    );
    let service = GroupFormationService::new(Arc::new(config), repos)
        .with_supervisor_assigner(Arc::new(RoundRobinSupervisorAssigner::new()));

    let cancel = CancellationFlag::new();
    let ctrl_c_flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("收到中断信号，取消本次分组运行");
            ctrl_c_flag.cancel();
        }
    });

    let request = FormGroupsRequest {
        cluster_id,
        season_id,
        year,
        parameters: None,
        auto_assign_supervisors: assign_supervisors,
        create_immediately: activate,
        preview_only: !commit,
    };

    let outcome = service.form_groups(request, &cancel).await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
