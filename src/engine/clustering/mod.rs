// ==========================================
// 农场生产分组系统 - 聚类引擎
// ==========================================
// 职责: 将候选地块划分为 空间相邻 / 播期兼容 / 面积受限 的候选分组
// 输入: 可聚类地块 + 分组参数
// 输出: GroupProposal 列表 (含例外分组) + 孤立地块报告
// ==========================================
// 流程:
// 1) 按 plot_id 固定种子顺序
// 2) 种子生长: 反复拉入最近的兼容地块
// 3) 无兼容邻居或达到上限时停止
// 4) 欠规模簇尝试与最近欠规模簇合并，仍不足则标记为例外
// 5) 计算播种窗口，跨度超过 2×容差 的分流为例外
// ==========================================

mod core;


pub use core::{ClusteringEngine, ClusteringOutput};
