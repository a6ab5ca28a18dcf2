// ==========================================
// 农场生产分组系统 - 配置管理器
// ==========================================
// 职责: 分组参数缺省值的加载与覆写
// 存储: config_kv 表 (key-value + scope)
// 规则: 键不存在或值无法解析时回落到内置默认值（记录告警）
// ==========================================

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::error::Error;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use crate::config::grouping_config_trait::{ConfigResult, GroupingConfigReader};
use crate::db::open_sqlite_connection;
use crate::domain::parameters::{
    DEFAULT_MAX_GROUP_AREA_HA, DEFAULT_MAX_PLOTS_PER_GROUP, DEFAULT_MERGE_ATTEMPTS,
    DEFAULT_MIN_GROUP_AREA_HA, DEFAULT_MIN_PLOTS_PER_GROUP, DEFAULT_PLANTING_DATE_TOLERANCE_DAYS,
    DEFAULT_PROXIMITY_THRESHOLD_M,
};
use crate::domain::types::SingletonPolicy;

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error + Send + Sync>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    pub fn get_global_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 写入 global 配置（存在则覆盖）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> ConfigResult<()> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2",
            params![key, value],
        )?;
        Ok(())
    }

    /// 读取并解析配置值，缺失或格式错误时返回默认值
    fn get_parsed_or_default<T>(&self, key: &str, default: T) -> ConfigResult<T>
    where
        T: FromStr + Display,
    {
        let Some(raw) = self.get_global_config_value(key)? else {
            return Ok(default);
        };
        match raw.trim().parse::<T>() {
            Ok(value) => Ok(value),
            Err(_) => {
                tracing::warn!(
                    config_key = key,
                    raw_value = %raw,
                    default = %default,
                    "配置值格式错误，使用默认值"
                );
                Ok(default)
            }
        }
    }
}

// ==========================================
// GroupingConfigReader Trait 实现
// ==========================================
#[async_trait]
impl GroupingConfigReader for ConfigManager {
    async fn get_proximity_threshold_m(&self) -> ConfigResult<f64> {
        self.get_parsed_or_default(config_keys::PROXIMITY_THRESHOLD_M, DEFAULT_PROXIMITY_THRESHOLD_M)
    }

    async fn get_planting_date_tolerance_days(&self) -> ConfigResult<i64> {
        self.get_parsed_or_default(
            config_keys::PLANTING_DATE_TOLERANCE_DAYS,
            DEFAULT_PLANTING_DATE_TOLERANCE_DAYS,
        )
    }

    async fn get_min_group_area_ha(&self) -> ConfigResult<f64> {
        self.get_parsed_or_default(config_keys::MIN_GROUP_AREA_HA, DEFAULT_MIN_GROUP_AREA_HA)
    }

    async fn get_max_group_area_ha(&self) -> ConfigResult<f64> {
        self.get_parsed_or_default(config_keys::MAX_GROUP_AREA_HA, DEFAULT_MAX_GROUP_AREA_HA)
    }

    async fn get_min_plots_per_group(&self) -> ConfigResult<usize> {
        self.get_parsed_or_default(config_keys::MIN_PLOTS_PER_GROUP, DEFAULT_MIN_PLOTS_PER_GROUP)
    }

    async fn get_max_plots_per_group(&self) -> ConfigResult<usize> {
        self.get_parsed_or_default(config_keys::MAX_PLOTS_PER_GROUP, DEFAULT_MAX_PLOTS_PER_GROUP)
    }

    async fn get_merge_attempts(&self) -> ConfigResult<u32> {
        self.get_parsed_or_default(config_keys::MERGE_ATTEMPTS, DEFAULT_MERGE_ATTEMPTS)
    }

    async fn get_singleton_policy(&self) -> ConfigResult<SingletonPolicy> {
        let value = self.get_global_config_value(config_keys::SINGLETON_POLICY)?;
        match value.as_deref().map(SingletonPolicy::from_db_str) {
            None => Ok(SingletonPolicy::ExceptionProposal),
            Some(Some(policy)) => Ok(policy),
            Some(None) => {
                tracing::warn!(
                    config_key = config_keys::SINGLETON_POLICY,
                    raw_value = ?value,
                    "孤立地块策略配置无法识别，使用 EXCEPTION_PROPOSAL"
                );
                Ok(SingletonPolicy::ExceptionProposal)
            }
        }
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 空间与播期
    pub const PROXIMITY_THRESHOLD_M: &str = "grouping.proximity_threshold_m";
    pub const PLANTING_DATE_TOLERANCE_DAYS: &str = "grouping.planting_date_tolerance_days";

    // 规模边界
    pub const MIN_GROUP_AREA_HA: &str = "grouping.min_group_area_ha";
    pub const MAX_GROUP_AREA_HA: &str = "grouping.max_group_area_ha";
    pub const MIN_PLOTS_PER_GROUP: &str = "grouping.min_plots_per_group";
    pub const MAX_PLOTS_PER_GROUP: &str = "grouping.max_plots_per_group";

    // 欠规模处理策略
    pub const MERGE_ATTEMPTS: &str = "grouping.merge_attempts";
    pub const SINGLETON_POLICY: &str = "grouping.singleton_policy"; // EXCEPTION_PROPOSAL / UNGROUPABLE
}
