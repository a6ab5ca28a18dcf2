// ==========================================
// 农场生产分组系统 - 分组数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 并发: 写入使用 IMMEDIATE 事务，先检查地块当季归属再插入；
//       group_plot 唯一约束兜底，冲突统一报告为 ConcurrencyConflict
// ==========================================

use chrono::{NaiveDate, NaiveDateTime, Timelike, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::domain::group::{Group, NewGroup};
use crate::domain::types::{GroupStatus, PlotStatus};
use crate::engine::repositories::GroupStore;
use crate::repository::error::{RepositoryError, RepositoryResult};

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

// ==========================================
// GroupRepository - 分组仓储
// ==========================================
pub struct GroupRepository {
    conn: Arc<Mutex<Connection>>,
}

impl GroupRepository {
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = crate::db::open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 单事务写入分组及成员地块
    ///
    /// # 返回
    /// - Ok(groups): 写入成功
    /// - Err(ConcurrencyConflict): 有地块当季已归属其他分组，或已不再是 Active
    /// - Err(NotFound): 地块不存在
    pub fn insert_groups(&self, groups: Vec<NewGroup>) -> RepositoryResult<Vec<Group>> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        // 库中按秒存储，返回值与回读保持一致
        let now = Utc::now().naive_utc();
        let created_at = now.with_nanosecond(0).unwrap_or(now);
        let created_at_str = created_at.format(DATETIME_FORMAT).to_string();

        for group in &groups {
            for plot_id in &group.plot_ids {
                let status: Option<String> = tx
                    .query_row(
                        "SELECT status FROM plot WHERE plot_id = ?1",
                        params![plot_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                match status.as_deref().map(PlotStatus::from_db_str) {
                    None => {
                        return Err(RepositoryError::NotFound {
                            entity: "plot".to_string(),
                            id: plot_id.clone(),
                        })
                    }
                    Some(Some(PlotStatus::Active)) => {}
                    Some(_) => {
                        return Err(RepositoryError::ConcurrencyConflict(format!(
                            "plot {} is no longer active",
                            plot_id
                        )))
                    }
                }

                let owner: Option<String> = tx
                    .query_row(
                        "SELECT group_id FROM group_plot WHERE plot_id = ?1 AND season_id = ?2 AND year = ?3",
                        params![plot_id, group.season_id, group.year],
                        |row| row.get(0),
                    )
                    .optional()?;
                if let Some(owner) = owner {
                    return Err(RepositoryError::ConcurrencyConflict(format!(
                        "plot {} already belongs to group {} for {}/{}",
                        plot_id, owner, group.season_id, group.year
                    )));
                }
            }

            tx.execute(
                r#"
                INSERT INTO grouping_group (
                    group_id, group_name, cluster_id, season_id, year, status,
                    total_area_ha, planting_date, rice_variety_id, supervisor_id,
                    is_exception, exception_reason, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                "#,
                params![
                    group.group_id,
                    group.group_name,
                    group.cluster_id,
                    group.season_id,
                    group.year,
                    group.status.to_db_str(),
                    group.total_area_ha,
                    group.planting_date.format(DATE_FORMAT).to_string(),
                    group.rice_variety_id,
                    group.supervisor_id,
                    group.is_exception,
                    group.exception_reason,
                    created_at_str,
                ],
            )?;

            for (seq_no, plot_id) in group.plot_ids.iter().enumerate() {
                tx.execute(
                    "INSERT INTO group_plot (group_id, plot_id, season_id, year, seq_no) VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![group.group_id, plot_id, group.season_id, group.year, seq_no as i64],
                )?;
            }
            debug!(group_id = %group.group_id, plots = group.plot_ids.len(), "分组写入事务");
        }

        tx.commit()?;

        Ok(groups
            .into_iter()
            .map(|g| g.into_group(created_at))
            .collect())
    }

    /// 更新分组监理
    pub fn update_supervisor(&self, group_id: &str, supervisor_id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "UPDATE grouping_group SET supervisor_id = ?2 WHERE group_id = ?1",
            params![group_id, supervisor_id],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "grouping_group".to_string(),
                id: group_id.to_string(),
            });
        }
        Ok(())
    }

    /// 按 ID 查询分组
    pub fn find_by_id(&self, group_id: &str) -> RepositoryResult<Option<Group>> {
        let conn = self.get_conn()?;
        let row = conn
            .query_row(
                &format!("{} WHERE group_id = ?1", SELECT_GROUP),
                params![group_id],
                map_group_row,
            )
            .optional()?;

        match row {
            Some(raw) => Ok(Some(raw.into_group(load_plot_ids(&conn, group_id)?)?)),
            None => Ok(None),
        }
    }

    /// 查询 (cluster, season, year) 下的全部分组，按创建时间、名称排序
    pub fn find_by_scope(
        &self,
        cluster_id: &str,
        season_id: &str,
        year: i32,
    ) -> RepositoryResult<Vec<Group>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE cluster_id = ?1 AND season_id = ?2 AND year = ?3 ORDER BY created_at, group_name",
            SELECT_GROUP
        ))?;
        let rows = stmt
            .query_map(params![cluster_id, season_id, year], map_group_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|raw| {
                let plot_ids = load_plot_ids(&conn, &raw.group_id)?;
                raw.into_group(plot_ids)
            })
            .collect()
    }
}

impl GroupStore for GroupRepository {
    fn persist_groups(&self, groups: Vec<NewGroup>) -> RepositoryResult<Vec<Group>> {
        self.insert_groups(groups)
    }

    fn assign_supervisor(&self, group_id: &str, supervisor_id: &str) -> RepositoryResult<()> {
        self.update_supervisor(group_id, supervisor_id)
    }
}

const SELECT_GROUP: &str = r#"
    SELECT group_id, group_name, cluster_id, season_id, year, status,
           total_area_ha, planting_date, rice_variety_id, supervisor_id,
           is_exception, exception_reason, created_at
    FROM grouping_group
"#;

/// 数据库行的原始形态，文本字段在 into_group 中解析
struct GroupRow {
    group_id: String,
    group_name: String,
    cluster_id: String,
    season_id: String,
    year: i32,
    status: String,
    total_area_ha: f64,
    planting_date: String,
    rice_variety_id: String,
    supervisor_id: Option<String>,
    is_exception: bool,
    exception_reason: Option<String>,
    created_at: String,
}

impl GroupRow {
    fn into_group(self, plot_ids: Vec<String>) -> RepositoryResult<Group> {
        let status = GroupStatus::from_db_str(&self.status).ok_or_else(|| {
            RepositoryError::FieldValueError {
                field: "status".to_string(),
                message: self.status.clone(),
            }
        })?;
        let planting_date = NaiveDate::parse_from_str(&self.planting_date, DATE_FORMAT)
            .map_err(|e| RepositoryError::FieldValueError {
                field: "planting_date".to_string(),
                message: e.to_string(),
            })?;
        let created_at = NaiveDateTime::parse_from_str(&self.created_at, DATETIME_FORMAT)
            .map_err(|e| RepositoryError::FieldValueError {
                field: "created_at".to_string(),
                message: e.to_string(),
            })?;

        Ok(Group {
            group_id: self.group_id,
            group_name: self.group_name,
            cluster_id: self.cluster_id,
            season_id: self.season_id,
            year: self.year,
            status,
            total_area_ha: self.total_area_ha,
            planting_date,
            rice_variety_id: self.rice_variety_id,
            supervisor_id: self.supervisor_id,
            is_exception: self.is_exception,
            exception_reason: self.exception_reason,
            plot_ids,
            created_at,
        })
    }
}

fn map_group_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<GroupRow> {
    Ok(GroupRow {
        group_id: row.get(0)?,
        group_name: row.get(1)?,
        cluster_id: row.get(2)?,
        season_id: row.get(3)?,
        year: row.get(4)?,
        status: row.get(5)?,
        total_area_ha: row.get(6)?,
        planting_date: row.get(7)?,
        rice_variety_id: row.get(8)?,
        supervisor_id: row.get(9)?,
        is_exception: row.get(10)?,
        exception_reason: row.get(11)?,
        created_at: row.get(12)?,
    })
}

fn load_plot_ids(conn: &Connection, group_id: &str) -> RepositoryResult<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT plot_id FROM group_plot WHERE group_id = ?1 ORDER BY seq_no")?;
    let ids = stmt
        .query_map(params![group_id], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}
