// ==========================================
// 农场生产分组系统 - 配置层
// ==========================================
// 职责: 分组参数缺省值管理，请求字段 > config_kv > 内置默认
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod grouping_config_trait;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager};
pub use grouping_config_trait::{ConfigResult, DefaultGroupingConfig, GroupingConfigReader};
