use kanshi_core::config::ScoringConfig;
use kanshi_core::market::entity::{Dimension, SubScores};
use kanshi_core::score::error::AnalysisError;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// # Summary
/// 加权聚合结果。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregate {
    // 归一化后的加权总分，位于 [0,1]
    pub score: f64,
    // 参与聚合的子评分的总体标准差
    pub dispersion: f64,
    // 参与聚合的维度个数
    pub included: usize,
}

/// # Summary
/// 子评分加权聚合器。
///
/// # Invariants
/// - 不可用维度被排除，剩余维度的权重重新归一化为 1。
/// - 权重配置中没有出现的维度不参与计算。
pub struct ScoreAggregator {
    weights: BTreeMap<Dimension, f64>,
}

impl ScoreAggregator {
    pub fn new(config: &ScoringConfig) -> Self {
        Self {
            weights: config.weights.clone(),
        }
    }

    /// # Summary
    /// 计算加权总分与离散度。
    ///
    /// # Logic
    /// 1. 跳过无权重或权重为 0 的维度。
    /// 2. 跳过标记为不可用的维度；NaN、无穷或越界的值视为计算错误，记录后同样跳过。
    /// 3. 以剩余维度的权重之和做归一化。
    ///
    /// # Arguments
    /// * `sub_scores` - 数据源返回的各维度子评分。
    ///
    /// # Returns
    /// * 至少一个维度可用时返回 `Aggregate`。
    /// * 全部不可用时返回 `AnalysisError::NoData`。
    pub fn aggregate(&self, sub_scores: &SubScores) -> Result<Aggregate, AnalysisError> {
        let mut included: Vec<(f64, f64)> = Vec::with_capacity(sub_scores.len());

        for (dimension, sub_score) in sub_scores {
            let Some(weight) = self.weights.get(dimension).copied() else {
                debug!(%dimension, "Ignoring sub-score without configured weight");
                continue;
            };
            if weight <= 0.0 {
                continue;
            }
            let Some(value) = sub_score.value() else {
                debug!(%dimension, "Sub-score unavailable");
                continue;
            };
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                warn!(%dimension, value, "Sub-score outside [0,1], treating as unavailable");
                continue;
            }
            included.push((weight, value));
        }

        let total_weight: f64 = included.iter().map(|(w, _)| w).sum();
        if included.is_empty() || total_weight <= 0.0 {
            return Err(AnalysisError::NoData);
        }

        let weighted: f64 = included.iter().map(|(w, v)| w * v).sum();
        // 归一化只会引入舍入误差
        let score = (weighted / total_weight).clamp(0.0, 1.0);
        if !score.is_finite() {
            return Err(AnalysisError::InvalidScore(score));
        }

        Ok(Aggregate {
            score,
            dispersion: dispersion(included.iter().map(|(_, v)| *v)),
            included: included.len(),
        })
    }
}

fn dispersion(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let (sum, count) = values.clone().fold((0.0, 0.0), |(s, n), v| (s + v, n + 1.0));
    if count == 0.0 {
        return 0.0;
    }
    let mean = sum / count;
    let variance = values.map(|v| (v - mean).powi(2)).sum::<f64>() / count;
    variance.sqrt()
}
