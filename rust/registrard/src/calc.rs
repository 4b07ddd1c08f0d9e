use serde::{Deserialize, Serialize};

const MIDTERM_WEIGHT: f64 = 0.4;
const FINAL_WEIGHT: f64 = 0.6;

/// Credit applied to every graded section when no workspace setting overrides it.
pub const DEFAULT_CREDIT_WEIGHT: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LetterGrade {
    AA,
    BA,
    BB,
    CB,
    CC,
    DC,
    DD,
    FD,
    FF,
}

impl LetterGrade {
    pub const ALL: [LetterGrade; 9] = [
        LetterGrade::AA,
        LetterGrade::BA,
        LetterGrade::BB,
        LetterGrade::CB,
        LetterGrade::CC,
        LetterGrade::DC,
        LetterGrade::DD,
        LetterGrade::FD,
        LetterGrade::FF,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        let wanted = s.trim().to_ascii_uppercase();
        Self::ALL.into_iter().find(|l| l.as_str() == wanted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AA => "AA",
            Self::BA => "BA",
            Self::BB => "BB",
            Self::CB => "CB",
            Self::CC => "CC",
            Self::DC => "DC",
            Self::DD => "DD",
            Self::FD => "FD",
            Self::FF => "FF",
        }
    }

    pub fn grade_point(self) -> f64 {
        match self {
            Self::AA => 4.0,
            Self::BA => 3.5,
            Self::BB => 3.0,
            Self::CB => 2.5,
            Self::CC => 2.0,
            Self::DC => 1.5,
            Self::DD => 1.0,
            Self::FD => 0.5,
            Self::FF => 0.0,
        }
    }

    pub fn status(self) -> GradeStatus {
        match self {
            Self::AA | Self::BA | Self::BB | Self::CB | Self::CC => GradeStatus::Passed,
            Self::DC | Self::DD | Self::FD | Self::FF => GradeStatus::Failed,
        }
    }

    /// Threshold bands for a weighted score. DC, DD and FD have no band and
    /// are never returned here.
    pub fn from_weighted_score(score: f64) -> Self {
        if score >= 90.0 {
            Self::AA
        } else if score >= 75.0 {
            Self::BA
        } else if score >= 65.0 {
            Self::BB
        } else if score >= 55.0 {
            Self::CB
        } else if score >= 45.0 {
            Self::CC
        } else {
            Self::FF
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GradeStatus {
    Passed,
    Failed,
}

impl GradeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Passed => "Passed",
            Self::Failed => "Failed",
        }
    }
}

/// Derived fields of a section grade record. Always produced together.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeOutcome {
    pub final_weighted_score: f64,
    pub letter_grade: LetterGrade,
    pub status: GradeStatus,
    pub grade_point: f64,
}

/// Values too large to scale by 100 are returned as-is.
pub fn round_2_decimals(x: f64) -> f64 {
    let scaled = x * 100.0;
    if !scaled.is_finite() {
        return x;
    }
    scaled.round() / 100.0
}

/// Lenient score reading used for grade inputs. Numbers and strings both
/// reduce to their integer part (`92.7` and `"92.7"` -> 92, `"abc"` -> nothing).
pub fn score_from_json(raw: Option<&serde_json::Value>) -> Option<f64> {
    match raw? {
        serde_json::Value::Number(n) => n.as_f64().filter(|v| v.is_finite()).map(f64::trunc),
        serde_json::Value::String(s) => leading_integer(s).map(|n| n as f64),
        _ => None,
    }
}

fn leading_integer(s: &str) -> Option<i64> {
    let t = s.trim_start();
    let (sign, digits) = match t.as_bytes().first() {
        Some(b'-') => (-1, &t[1..]),
        Some(b'+') => (1, &t[1..]),
        _ => (1, t),
    };
    let end = digits
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    digits[..end].parse::<i64>().ok().map(|n| sign * n)
}

/// Blends midterm and final 40/60. Absent scores count as 0 and nothing is
/// clamped, so negative or >100 inputs flow straight through.
pub fn compute_grade(midterm: Option<f64>, final_score: Option<f64>) -> GradeOutcome {
    let midterm = midterm.filter(|v| v.is_finite()).unwrap_or(0.0);
    let final_score = final_score.filter(|v| v.is_finite()).unwrap_or(0.0);
    let weighted = round_2_decimals(MIDTERM_WEIGHT * midterm + FINAL_WEIGHT * final_score);
    let letter = LetterGrade::from_weighted_score(weighted);
    GradeOutcome {
        final_weighted_score: weighted,
        letter_grade: letter,
        status: letter.status(),
        grade_point: letter.grade_point(),
    }
}

/// Credit-weighted mean of grade points, rounded to 2 decimals. Zero total
/// credit yields 0.
pub fn compute_gpa(records: &[(LetterGrade, f64)]) -> f64 {
    let (points, credits) = records
        .iter()
        .fold((0.0_f64, 0.0_f64), |(points, credits), (letter, credit)| {
            (points + letter.grade_point() * credit, credits + credit)
        });
    if credits > 0.0 {
        round_2_decimals(points / credits)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn weighted_blend_picks_band_below_threshold() {
        let g = compute_grade(Some(92.0), Some(88.0));
        assert_eq!(g.final_weighted_score, 89.6);
        assert_eq!(g.letter_grade, LetterGrade::BA);
        assert_eq!(g.status, GradeStatus::Passed);
        assert_eq!(g.grade_point, 3.5);
    }

    #[test]
    fn perfect_and_zero_scores() {
        let top = compute_grade(Some(100.0), Some(100.0));
        assert_eq!(top.final_weighted_score, 100.0);
        assert_eq!(top.letter_grade, LetterGrade::AA);
        assert_eq!(top.grade_point, 4.0);

        let bottom = compute_grade(Some(0.0), Some(0.0));
        assert_eq!(bottom.final_weighted_score, 0.0);
        assert_eq!(bottom.letter_grade, LetterGrade::FF);
        assert_eq!(bottom.status, GradeStatus::Failed);
        assert_eq!(bottom.grade_point, 0.0);
    }

    #[test]
    fn missing_midterm_counts_as_zero() {
        let g = compute_grade(None, Some(80.0));
        assert_eq!(g.final_weighted_score, 48.0);
        assert_eq!(g.letter_grade, LetterGrade::CC);
        assert_eq!(g.status, GradeStatus::Passed);
        assert_eq!(g.grade_point, 2.0);
    }

    #[test]
    fn band_edges_are_inclusive() {
        assert_eq!(LetterGrade::from_weighted_score(90.0), LetterGrade::AA);
        assert_eq!(LetterGrade::from_weighted_score(89.99), LetterGrade::BA);
        assert_eq!(LetterGrade::from_weighted_score(75.0), LetterGrade::BA);
        assert_eq!(LetterGrade::from_weighted_score(65.0), LetterGrade::BB);
        assert_eq!(LetterGrade::from_weighted_score(55.0), LetterGrade::CB);
        assert_eq!(LetterGrade::from_weighted_score(45.0), LetterGrade::CC);
        assert_eq!(LetterGrade::from_weighted_score(44.99), LetterGrade::FF);
    }

    #[test]
    fn out_of_range_inputs_are_not_clamped() {
        let high = compute_grade(Some(150.0), Some(150.0));
        assert_eq!(high.final_weighted_score, 150.0);
        assert_eq!(high.letter_grade, LetterGrade::AA);

        let low = compute_grade(Some(-10.0), Some(-20.0));
        assert_eq!(low.final_weighted_score, -16.0);
        assert_eq!(low.letter_grade, LetterGrade::FF);
    }

    #[test]
    fn unreachable_letters_never_produced() {
        for m in (-10..=110).step_by(5) {
            for f in (-10..=110).step_by(5) {
                let letter = compute_grade(Some(m as f64), Some(f as f64)).letter_grade;
                assert!(!matches!(
                    letter,
                    LetterGrade::DC | LetterGrade::DD | LetterGrade::FD
                ));
            }
        }
    }

    #[test]
    fn status_table_is_exhaustive() {
        for letter in LetterGrade::ALL {
            let passing = matches!(
                letter,
                LetterGrade::AA | LetterGrade::BA | LetterGrade::BB | LetterGrade::CB | LetterGrade::CC
            );
            assert_eq!(letter.status() == GradeStatus::Passed, passing, "{letter:?}");
            assert_eq!(LetterGrade::parse(letter.as_str()), Some(letter));
        }
    }

    #[test]
    fn lenient_score_reading() {
        assert_eq!(score_from_json(Some(&json!(92))), Some(92.0));
        assert_eq!(score_from_json(Some(&json!(92.5))), Some(92.0));
        assert_eq!(score_from_json(Some(&json!(-7.9))), Some(-7.0));
        assert_eq!(score_from_json(Some(&json!("92.7"))), Some(92.0));
        assert_eq!(score_from_json(Some(&json!(" -5"))), Some(-5.0));
        assert_eq!(score_from_json(Some(&json!("abc"))), None);
        assert_eq!(score_from_json(Some(&json!(""))), None);
        assert_eq!(score_from_json(Some(&json!(null))), None);
        assert_eq!(score_from_json(Some(&json!(true))), None);
        assert_eq!(score_from_json(None), None);
    }

    #[test]
    fn gpa_of_nothing_is_zero() {
        assert_eq!(compute_gpa(&[]), 0.0);
        assert_eq!(compute_gpa(&[(LetterGrade::AA, 0.0)]), 0.0);
    }

    #[test]
    fn number_and_string_scores_grade_alike() {
        let as_number = score_from_json(Some(&json!(90.9)));
        let as_string = score_from_json(Some(&json!("90.9")));
        assert_eq!(as_number, as_string);
        assert_eq!(as_number, Some(90.0));

        let from_number = compute_grade(as_number, Some(89.0));
        let from_string = compute_grade(as_string, Some(89.0));
        assert_eq!(from_number, from_string);
        assert_eq!(from_number.letter_grade, LetterGrade::BA);
    }

    #[test]
    fn huge_scores_keep_a_finite_weighted_score() {
        let g = compute_grade(Some(1e308), Some(1e308));
        assert!(g.final_weighted_score.is_finite());
        assert_eq!(g.final_weighted_score, 0.4 * 1e308 + 0.6 * 1e308);
        assert_eq!(g.letter_grade, LetterGrade::AA);
        assert_eq!(round_2_decimals(f64::MAX), f64::MAX);
        assert_eq!(round_2_decimals(1.005e2), 100.5);
    }

    #[test]
    fn gpa_weights_by_credit() {
        assert_eq!(
            compute_gpa(&[(LetterGrade::BB, 3.0), (LetterGrade::FF, 3.0)]),
            1.5
        );
        // (4*4 + 2*2) / 6 = 3.333..
        assert_eq!(
            compute_gpa(&[(LetterGrade::AA, 4.0), (LetterGrade::CC, 2.0)]),
            3.33
        );
    }

    #[test]
    fn gpa_ignores_order_and_repeats_identically() {
        let a = [
            (LetterGrade::AA, 3.0),
            (LetterGrade::CB, 3.0),
            (LetterGrade::FF, 3.0),
        ];
        let mut b = a;
        b.reverse();
        assert_eq!(compute_gpa(&a).to_bits(), compute_gpa(&b).to_bits());
        assert_eq!(compute_gpa(&a).to_bits(), compute_gpa(&a).to_bits());

        let g1 = compute_grade(Some(71.0), Some(63.0));
        let g2 = compute_grade(Some(71.0), Some(63.0));
        assert_eq!(g1.final_weighted_score.to_bits(), g2.final_weighted_score.to_bits());
        assert_eq!(g1, g2);
    }
}
