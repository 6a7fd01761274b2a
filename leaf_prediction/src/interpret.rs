use crate::error::PredictionError;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    #[serde(rename = "class")]
    pub label: String,
    pub confidence: f64,
}

impl Prediction {
    pub fn sentence(&self) -> String {
        format!(
            "This image most likely belongs to {} with a {:.2}% confidence.",
            self.label, self.confidence
        )
    }
}

fn round_to_hundredths(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

/// Picks the top-scoring class. Scores are used as-is, no softmax is applied.
pub fn interpret(scores: &[f64], class_labels: &[String]) -> Result<Prediction, PredictionError> {
    if scores.len() != class_labels.len() || scores.is_empty() {
        return Err(PredictionError::ResultShape {
            expected: class_labels.len(),
            actual: scores.len(),
        });
    }

    // First maximum wins on ties; NaN never wins.
    let (index, max_score) = scores
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, score)| !score.is_nan())
        .reduce(|accum, item| if item.1 > accum.1 { item } else { accum })
        .ok_or_else(|| PredictionError::Inference("model returned only NaN scores".into()))?;

    Ok(Prediction {
        label: class_labels[index].clone(),
        confidence: round_to_hundredths(100.0 * max_score),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_class_labels;

    #[test]
    fn test_interpret_picks_argmax() {
        let scores = [0.1, 0.05, 0.02, 0.6, 0.03, 0.1, 0.05, 0.05];
        let prediction = interpret(&scores, &default_class_labels()).unwrap();

        assert_eq!(prediction.label, "Die Back");
        assert!((prediction.confidence - 60.0).abs() < 1e-9);
        assert_eq!(
            prediction.sentence(),
            "This image most likely belongs to Die Back with a 60.00% confidence."
        );
    }

    #[test]
    fn test_interpret_rounds_to_two_decimals() {
        let scores = [0.1, 0.05, 0.02, 0.03, 0.04, 0.856789, 0.01, 0.02];
        let prediction = interpret(&scores, &default_class_labels()).unwrap();

        assert_eq!(prediction.label, "Healthy");
        assert!((prediction.confidence - 85.68).abs() < 1e-9);
    }

    #[test]
    fn test_interpret_rounds_halfway_to_even() {
        let scores = [0.1, 0.05, 0.02, 0.60005, 0.03, 0.1, 0.05, 0.05];
        let prediction = interpret(&scores, &default_class_labels()).unwrap();

        assert_eq!(prediction.confidence, 60.0);
        assert_eq!(
            prediction.sentence(),
            "This image most likely belongs to Die Back with a 60.00% confidence."
        );
        assert_eq!(round_to_hundredths(0.125), 0.12);
        assert_eq!(round_to_hundredths(0.375), 0.38);
    }

    #[test]
    fn test_interpret_first_maximum_wins() {
        let scores = [0.4, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.4];
        let prediction = interpret(&scores, &default_class_labels()).unwrap();
        assert_eq!(prediction.label, "Anthracnose");
    }

    #[test]
    fn test_interpret_ignores_nan() {
        let scores = [f64::NAN, 0.2, 0.0, 0.0, 0.0, 0.0, 0.0, 0.1];
        let prediction = interpret(&scores, &default_class_labels()).unwrap();
        assert_eq!(prediction.label, "Bacterial Canker");
    }

    #[test]
    fn test_interpret_short_vector_is_shape_error() {
        let err = interpret(&[0.5, 0.5], &default_class_labels()).unwrap_err();
        assert!(matches!(
            err,
            PredictionError::ResultShape {
                expected: 8,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_interpret_long_vector_is_shape_error() {
        let err = interpret(&[0.1; 9], &default_class_labels()).unwrap_err();
        assert!(matches!(err, PredictionError::ResultShape { .. }));
    }

    #[test]
    fn test_interpret_empty_scores_is_shape_error() {
        let err = interpret(&[], &[]).unwrap_err();
        assert!(matches!(err, PredictionError::ResultShape { .. }));
    }
}
