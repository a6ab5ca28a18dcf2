// ==========================================
// 农场生产分组系统 - 邻近索引
// ==========================================
// 职责: 基于地块中心点 (平面投影, 米) 的 R-tree 空间索引
// 输入: (plot_id, 投影坐标) 列表，同一片区内
// 输出: neighbors(point, radius) → 按距离升序，距离相同按 plot_id 升序
// 说明: 每次分组运行新建，运行结束即丢弃，不跨运行共享
// ==========================================

use rstar::{PointDistance, RTree, RTreeObject, AABB};
use std::collections::HashMap;

use crate::engine::geometry::planar_distance;

/// 距离比较分辨率 (米)，用于判定"等距"
pub const DISTANCE_RESOLUTION_M: f64 = 0.001;

/// 距离量化为整数键，保证等距判定稳定
pub fn distance_key(distance_m: f64) -> i64 {
    (distance_m / DISTANCE_RESOLUTION_M).round() as i64
}

#[derive(Debug, Clone, Copy)]
struct IndexedCentroid {
    idx: usize,
    xy: [f64; 2],
}

impl RTreeObject for IndexedCentroid {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.xy)
    }
}

impl PointDistance for IndexedCentroid {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.xy[0] - point[0];
        let dy = self.xy[1] - point[1];
        dx * dx + dy * dy
    }
}

/// 邻居查询结果
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub plot_id: String,
    pub distance_m: f64,
}

// ==========================================
// ProximityIndex - 邻近索引
// ==========================================
pub struct ProximityIndex {
    tree: RTree<IndexedCentroid>,
    plot_ids: Vec<String>,
    positions: HashMap<String, [f64; 2]>,
}

impl ProximityIndex {
    /// 构建索引
    ///
    /// 非有限坐标的条目被忽略（调用方应在建索引前将其报告为 no-geometry）
    pub fn build(entries: Vec<(String, [f64; 2])>) -> Self {
        let mut plot_ids = Vec::with_capacity(entries.len());
        let mut positions = HashMap::with_capacity(entries.len());
        let mut points = Vec::with_capacity(entries.len());

        for (plot_id, xy) in entries {
            if !(xy[0].is_finite() && xy[1].is_finite()) || positions.contains_key(&plot_id) {
                continue;
            }
            points.push(IndexedCentroid {
                idx: plot_ids.len(),
                xy,
            });
            positions.insert(plot_id.clone(), xy);
            plot_ids.push(plot_id);
        }

        Self {
            tree: RTree::bulk_load(points),
            plot_ids,
            positions,
        }
    }

    pub fn len(&self) -> usize {
        self.plot_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plot_ids.is_empty()
    }

    /// 地块的投影坐标
    pub fn position(&self, plot_id: &str) -> Option<[f64; 2]> {
        self.positions.get(plot_id).copied()
    }

    /// 查询 point 周围 radius 米内的地块
    ///
    /// # 返回
    /// 按距离升序；距离相同 (按 DISTANCE_RESOLUTION_M 量化) 时按 plot_id 升序
    pub fn neighbors(&self, point: [f64; 2], radius_m: f64) -> Vec<Neighbor> {
        if !(radius_m.is_finite() && radius_m >= 0.0) {
            return Vec::new();
        }

        let mut found: Vec<Neighbor> = self
            .tree
            .locate_within_distance(point, radius_m * radius_m)
            .map(|entry| Neighbor {
                plot_id: self.plot_ids[entry.idx].clone(),
                distance_m: planar_distance(entry.xy, point),
            })
            .filter(|n| n.distance_m <= radius_m)
            .collect();

        found.sort_by(|a, b| {
            distance_key(a.distance_m)
                .cmp(&distance_key(b.distance_m))
                .then_with(|| a.plot_id.cmp(&b.plot_id))
        });
        found
    }
}
