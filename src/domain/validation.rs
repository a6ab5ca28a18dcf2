// ==========================================
// 农场生产分组系统 - 校验结果模型
// ==========================================
// 违规以 Violation{kind, severity} 表达，区分"阻断"与"标记但允许"
// ==========================================

use serde::{Deserialize, Serialize};

use crate::domain::types::{ViolationKind, ViolationSeverity};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub severity: ViolationSeverity,
    pub message: String,
}

impl Violation {
    pub fn hard(kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: ViolationSeverity::Hard,
            message: message.into(),
        }
    }

    pub fn soft(kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: ViolationSeverity::Soft,
            message: message.into(),
        }
    }

    pub fn is_hard(&self) -> bool {
        self.severity == ViolationSeverity::Hard
    }
}

// ==========================================
// ValidationResult - 校验结果
// ==========================================
// ok = 不存在硬违规；软违规仅作为警告保留
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub ok: bool,
    pub violations: Vec<Violation>,
}

impl ValidationResult {
    pub fn from_violations(violations: Vec<Violation>) -> Self {
        let ok = !violations.iter().any(Violation::is_hard);
        Self { ok, violations }
    }

    pub fn hard_violations(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|v| v.is_hard())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|v| !v.is_hard())
    }

    pub fn has_kind(&self, kind: ViolationKind) -> bool {
        self.violations.iter().any(|v| v.kind == kind)
    }

    /// 违规描述列表（对外展示用）
    pub fn messages(&self) -> Vec<String> {
        self.violations.iter().map(|v| v.message.clone()).collect()
    }
}
