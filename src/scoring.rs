use serde::Serialize;

/// Outcome of scoring one objective answer by direct comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectiveOutcome {
    pub is_correct: bool,
    pub score: f64,
}

impl ObjectiveOutcome {
    fn incorrect() -> Self {
        Self {
            is_correct: false,
            score: 0.0,
        }
    }

    fn graded(is_correct: bool, marks: f64) -> Self {
        Self {
            is_correct,
            score: if is_correct { marks } else { 0.0 },
        }
    }
}

/// MCQ: the stored correct answer is the index of the single correct
/// option. Missing selection or an unparseable stored index counts as
/// incorrect, never as an error.
pub fn score_mcq(selected_option: Option<i64>, correct_answer: Option<&str>, marks: f64) -> ObjectiveOutcome {
    let Some(selected) = selected_option else {
        return ObjectiveOutcome::incorrect();
    };
    let Some(correct) = correct_answer.and_then(|s| s.trim().parse::<i64>().ok()) else {
        return ObjectiveOutcome::incorrect();
    };
    ObjectiveOutcome::graded(selected == correct, marks)
}

/// Numerical: both sides parse as f64 and must agree within the
/// question's tolerance (None = exact match). Malformed input on either
/// side counts as incorrect.
pub fn score_numerical(
    text: Option<&str>,
    correct_answer: Option<&str>,
    marks: f64,
    tolerance: Option<f64>,
) -> ObjectiveOutcome {
    let Some(value) = text.and_then(|s| s.trim().parse::<f64>().ok()) else {
        return ObjectiveOutcome::incorrect();
    };
    let Some(correct) = correct_answer.and_then(|s| s.trim().parse::<f64>().ok()) else {
        return ObjectiveOutcome::incorrect();
    };
    let tol = tolerance.unwrap_or(0.0).max(0.0);
    let is_correct = if tol == 0.0 {
        value == correct
    } else {
        (value - correct).abs() <= tol
    };
    ObjectiveOutcome::graded(is_correct, marks)
}

/// Clamp a model-reported score into [0, max_marks]. NaN becomes 0.
pub fn clamp_score(score: f64, max_marks: f64) -> f64 {
    if !score.is_finite() {
        return 0.0;
    }
    score.max(0.0).min(max_marks)
}

/// Clamp a model-reported confidence into [0, 100]. NaN becomes 0.
pub fn clamp_confidence(confidence: f64) -> f64 {
    if !confidence.is_finite() {
        return 0.0;
    }
    confidence.max(0.0).min(100.0)
}

/// The result of one answer's trip through the evaluation pipeline.
/// There is no error variant on purpose: a failed external evaluation
/// degrades to a zero-score outcome instead of blocking the attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerEvaluation {
    pub answer_id: i64,
    pub question_id: i64,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ocr_text: Option<String>,
}

/// An attempt's final score is the fold-sum of its answers' scores.
pub fn attempt_total<'a, I>(evaluations: I) -> f64
where
    I: IntoIterator<Item = &'a AnswerEvaluation>,
{
    evaluations.into_iter().map(|e| e.score).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mcq_index_equality() {
        let out = score_mcq(Some(2), Some("2"), 5.0);
        assert!(out.is_correct);
        assert_eq!(out.score, 5.0);

        let out = score_mcq(Some(1), Some("2"), 5.0);
        assert!(!out.is_correct);
        assert_eq!(out.score, 0.0);
    }

    #[test]
    fn mcq_malformed_is_incorrect() {
        assert!(!score_mcq(None, Some("2"), 5.0).is_correct);
        assert!(!score_mcq(Some(2), None, 5.0).is_correct);
        assert!(!score_mcq(Some(2), Some("two"), 5.0).is_correct);
    }

    #[test]
    fn numerical_exact_by_default() {
        assert!(score_numerical(Some("3.5"), Some("3.5"), 4.0, None).is_correct);
        assert!(!score_numerical(Some("3.51"), Some("3.5"), 4.0, None).is_correct);
        // Whitespace is not part of the value.
        assert!(score_numerical(Some(" 42 "), Some("42"), 4.0, None).is_correct);
    }

    #[test]
    fn numerical_tolerance_window() {
        let out = score_numerical(Some("9.9"), Some("10"), 6.0, Some(0.1));
        assert!(out.is_correct);
        assert_eq!(out.score, 6.0);
        assert!(!score_numerical(Some("9.8"), Some("10"), 6.0, Some(0.1)).is_correct);
    }

    #[test]
    fn numerical_malformed_is_incorrect() {
        assert!(!score_numerical(Some("abc"), Some("10"), 6.0, None).is_correct);
        assert!(!score_numerical(None, Some("10"), 6.0, None).is_correct);
        assert!(!score_numerical(Some("10"), None, 6.0, None).is_correct);
    }

    #[test]
    fn clamping_bounds() {
        assert_eq!(clamp_score(12.0, 10.0), 10.0);
        assert_eq!(clamp_score(-3.0, 10.0), 0.0);
        assert_eq!(clamp_score(7.5, 10.0), 7.5);
        assert_eq!(clamp_score(f64::NAN, 10.0), 0.0);
        assert_eq!(clamp_confidence(150.0), 100.0);
        assert_eq!(clamp_confidence(-1.0), 0.0);
        assert_eq!(clamp_confidence(88.0), 88.0);
    }

    #[test]
    fn total_is_sum_of_scores() {
        let evals: Vec<AnswerEvaluation> = [3.0, 0.0, 7.5]
            .iter()
            .enumerate()
            .map(|(i, s)| AnswerEvaluation {
                answer_id: i as i64,
                question_id: i as i64,
                score: *s,
                is_correct: None,
                confidence: None,
                feedback: None,
                ocr_text: None,
            })
            .collect();
        assert_eq!(attempt_total(&evals), 10.5);
        let empty: Vec<AnswerEvaluation> = Vec::new();
        assert_eq!(attempt_total(&empty), 0.0);
    }
}
