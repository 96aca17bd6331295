//! Class-probability vectors and their algebra.
//!
//! A classification is a probability vector over a fixed table of class
//! names. The vector may sum to less than 1; the missing mass is treated
//! as "unknown". [`ClassificationData`] owns the name table and builds
//! vectors; the free functions implement the Bayesian-style combination
//! and the distance used by the multi-class association metrics.

use nalgebra::DVector;

use crate::{Result, TrackingError};

/// Probability vector over the class table
pub type Classification = DVector<f64>;

/// Bayesian-style product of two classifications, renormalized.
///
/// The unknown residuals `1 - Σp` of both inputs contribute to the
/// normalizer so that two vague classifications stay vague. The `1e-6`
/// floor keeps the denominator away from zero when both inputs vanish.
///
/// Fails with a dimension mismatch if the vectors differ in length.
pub fn combine(a: &Classification, b: &Classification) -> Result<Classification> {
    if a.len() != b.len() {
        return Err(TrackingError::DimensionMismatch {
            expected: a.len(),
            got: b.len(),
        });
    }

    let unknown_a = (1.0 - a.sum()).clamp(0.0, 1.0);
    let unknown_b = (1.0 - b.sum()).clamp(0.0, 1.0);

    let product = a.component_mul(b);
    let normalizer = product.sum() + unknown_a * unknown_b + 1e-6;

    Ok(product / normalizer)
}

/// Distance between two classifications: `sqrt(0.5 · ‖a − b‖²)`.
///
/// Lies in `[0, 1]` when both inputs are proper distributions.
pub fn distance(a: &Classification, b: &Classification) -> Result<f64> {
    if a.len() != b.len() {
        return Err(TrackingError::DimensionMismatch {
            expected: a.len(),
            got: b.len(),
        });
    }

    let residual = a - b;

    Ok((0.5 * residual.dot(&residual)).sqrt())
}

/// Similarity between two classifications: `1 - distance`.
pub fn similarity(a: &Classification, b: &Classification) -> Result<f64> {
    Ok(1.0 - distance(a, b)?)
}

/// Immutable table of class names.
///
/// Provides index lookup and classification-vector constructors.
#[derive(Debug, Clone)]
pub struct ClassificationData {
    classes: Vec<String>,
}

impl Default for ClassificationData {
    fn default() -> Self {
        Self {
            classes: vec!["unknown".to_string()],
        }
    }
}

impl ClassificationData {
    /// Create a class table. Fails on an empty list.
    pub fn new(classes: Vec<String>) -> Result<Self> {
        if classes.is_empty() {
            return Err(TrackingError::EmptyClassList);
        }

        Ok(Self { classes })
    }

    /// Index of a class name in the table.
    pub fn class_index(&self, class: &str) -> Result<usize> {
        self.classes
            .iter()
            .position(|c| c == class)
            .ok_or_else(|| TrackingError::UnknownClass(class.to_string()))
    }

    /// Name of the most probable class.
    pub fn class_of(&self, classification: &Classification) -> Result<&str> {
        if classification.len() != self.classes.len() {
            return Err(TrackingError::DimensionMismatch {
                expected: self.classes.len(),
                got: classification.len(),
            });
        }

        Ok(&self.classes[classification.imax()])
    }

    /// The class names in table order.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Number of classes in the table.
    #[inline]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Whether the table is empty (never true for a constructed table).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Build a classification with `probability` on `class_name` and the
    /// leftover mass spread uniformly across the other classes.
    pub fn classification(&self, class_name: &str, probability: f64) -> Result<Classification> {
        let index = self.class_index(class_name)?;
        let unknown = (1.0 - probability).clamp(0.0, 1.0);
        let spread = unknown / (self.classes.len() as f64 - 1.0).max(1.0);

        let mut probabilities = Classification::from_element(self.classes.len(), spread);
        probabilities[index] = probability;

        Ok(probabilities)
    }

    /// Constant classification with `base_prior` on every class.
    pub fn uniform_prior(&self, base_prior: f64) -> Classification {
        Classification::from_element(self.classes.len(), base_prior)
    }

    /// Uniform prior `1/N` over the table.
    pub fn prior(&self) -> Classification {
        self.uniform_prior(1.0 / self.classes.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ClassificationData {
        ClassificationData::new(vec!["Car".into(), "Bike".into(), "Pedestrian".into()]).unwrap()
    }

    #[test]
    fn test_empty_class_list_rejected() {
        assert!(ClassificationData::new(vec![]).is_err());
    }

    #[test]
    fn test_class_index_lookup() {
        let data = table();
        assert_eq!(data.class_index("Bike").unwrap(), 1);
        assert!(data.class_index("Truck").is_err());
    }

    #[test]
    fn test_classification_spreads_residual() {
        let data = table();
        let c = data.classification("Car", 0.8).unwrap();

        assert!((c[0] - 0.8).abs() < 1e-12);
        assert!((c[1] - 0.1).abs() < 1e-12);
        assert!((c[2] - 0.1).abs() < 1e-12);
        assert!((c.sum() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_class_of_argmax() {
        let data = table();
        let c = data.classification("Pedestrian", 0.9).unwrap();
        assert_eq!(data.class_of(&c).unwrap(), "Pedestrian");
    }

    #[test]
    fn test_combine_dimension_mismatch() {
        let a = Classification::from_element(3, 0.3);
        let b = Classification::from_element(2, 0.5);
        assert!(combine(&a, &b).is_err());
        assert!(distance(&a, &b).is_err());
    }

    #[test]
    fn test_combine_with_uniform_prior_normalizes() {
        let data = table();
        let prior = data.prior();
        let x = Classification::from_vec(vec![0.6, 0.3, 0.1]);

        let combined = combine(&prior, &x).unwrap();
        let expected = &x / x.sum();

        // combine(uniform, x) ≈ x / Σx up to the 1e-6 denominator floor
        assert!((combined - expected).norm() < 1e-4);
    }

    #[test]
    fn test_combine_sharpens_agreement() {
        let data = table();
        let a = data.classification("Car", 0.7).unwrap();
        let b = data.classification("Car", 0.6).unwrap();

        let combined = combine(&a, &b).unwrap();

        assert!(combined[0] > 0.7);
        assert!((combined.sum() - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_distance_bounds() {
        let a = Classification::from_vec(vec![1.0, 0.0]);
        let b = Classification::from_vec(vec![0.0, 1.0]);

        // Disjoint support: maximal distance 1
        assert!((distance(&a, &b).unwrap() - 1.0).abs() < 1e-12);
        assert!(distance(&a, &a).unwrap().abs() < 1e-12);
        assert!((similarity(&a, &b).unwrap()).abs() < 1e-12);
    }
}
