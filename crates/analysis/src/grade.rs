use kanshi_core::score::entity::Grade;
use kanshi_core::score::error::AnalysisError;

// 各等级的下界，边界值归属更高等级
const GRADE_FLOORS: [(f64, Grade); 4] = [
    (0.80, Grade::A),
    (0.65, Grade::B),
    (0.50, Grade::C),
    (0.35, Grade::D),
];

/// # Summary
/// 将总分映射为字母等级。
///
/// # Invariants
/// - 区间 [0,1] 被 A/B/C/D/F 无重叠地完全覆盖。
/// - 越界值或 NaN 返回 `InvalidScore`，不做截断。
pub fn classify(score: f64) -> Result<Grade, AnalysisError> {
    if !score.is_finite() || !(0.0..=1.0).contains(&score) {
        return Err(AnalysisError::InvalidScore(score));
    }
    Ok(GRADE_FLOORS
        .iter()
        .find(|(floor, _)| score >= *floor)
        .map(|(_, grade)| *grade)
        .unwrap_or(Grade::F))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundaries_belong_to_higher_grade() {
        assert_eq!(classify(1.0), Ok(Grade::A));
        assert_eq!(classify(0.80), Ok(Grade::A));
        assert_eq!(classify(0.7999), Ok(Grade::B));
        assert_eq!(classify(0.65), Ok(Grade::B));
        assert_eq!(classify(0.6499), Ok(Grade::C));
        assert_eq!(classify(0.50), Ok(Grade::C));
        assert_eq!(classify(0.35), Ok(Grade::D));
        assert_eq!(classify(0.3499), Ok(Grade::F));
        assert_eq!(classify(0.0), Ok(Grade::F));
    }

    #[test]
    fn test_invalid_scores_are_rejected() {
        assert!(matches!(classify(-0.01), Err(AnalysisError::InvalidScore(_))));
        assert!(matches!(classify(1.0001), Err(AnalysisError::InvalidScore(_))));
        assert!(matches!(classify(f64::NAN), Err(AnalysisError::InvalidScore(_))));
        assert!(matches!(classify(f64::INFINITY), Err(AnalysisError::InvalidScore(_))));
    }

    #[test]
    fn test_grades_partition_unit_interval() {
        // 以 0.0001 步长扫描，等级必须单调不升且每个点都有等级
        let mut previous = Grade::F;
        for step in 0..=10_000u32 {
            let score = f64::from(step) / 10_000.0;
            let grade = classify(score).unwrap();
            assert!(grade <= previous, "grade regressed at {}", score);
            previous = grade;
        }
        assert_eq!(previous, Grade::A);
    }
}
