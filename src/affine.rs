//! Affine maps between named coordinate systems.
//!
//! A transform from `n` input axes to `m` output axes is stored as an
//! `(m + 1) x (n + 1)` homogeneous matrix whose last row is `[0 .. 0 1]`.

use std::collections::HashSet;

use nalgebra::{DMatrix, DVector};

use crate::error::{ImageError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct AffineTransform {
    matrix: DMatrix<f64>,
    input_names: Vec<String>,
    output_names: Vec<String>,
}

impl AffineTransform {
    /// Build a transform from a homogeneous matrix and the names of its
    /// input (column) and output (row) axes.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::Value`] if the matrix dimensions do not match
    /// the name counts, the last row is not homogeneous, an entry is not
    /// finite, or a name is repeated.
    pub fn new(
        matrix: DMatrix<f64>,
        input_names: impl IntoIterator<Item = impl Into<String>>,
        output_names: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self> {
        let input_names: Vec<String> = input_names.into_iter().map(Into::into).collect();
        let output_names: Vec<String> = output_names.into_iter().map(Into::into).collect();

        if matrix.nrows() != output_names.len() + 1 || matrix.ncols() != input_names.len() + 1 {
            return Err(ImageError::value(format!(
                "a transform from {} to {} axes needs a {}x{} matrix, got {}x{}",
                input_names.len(),
                output_names.len(),
                output_names.len() + 1,
                input_names.len() + 1,
                matrix.nrows(),
                matrix.ncols()
            )));
        }
        if matrix.iter().any(|v| !v.is_finite()) {
            return Err(ImageError::value("transform matrix has non-finite entries"));
        }
        let last = matrix.nrows() - 1;
        let homogeneous = (0..matrix.ncols()).all(|c| {
            let expected = if c == matrix.ncols() - 1 { 1.0 } else { 0.0 };
            matrix[(last, c)] == expected
        });
        if !homogeneous {
            return Err(ImageError::value(
                "last row of a homogeneous matrix must be [0 .. 0 1]",
            ));
        }
        check_unique(&input_names, "input")?;
        check_unique(&output_names, "output")?;

        Ok(Self {
            matrix,
            input_names,
            output_names,
        })
    }

    /// Identity map between two coordinate systems of the same rank.
    pub fn identity(
        input_names: impl IntoIterator<Item = impl Into<String>>,
        output_names: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self> {
        let input_names: Vec<String> = input_names.into_iter().map(Into::into).collect();
        let n = input_names.len();
        Self::new(DMatrix::identity(n + 1, n + 1), input_names, output_names)
    }

    /// Build from a linear part (`m x n`) and a translation (`m`).
    pub fn from_linear(
        linear: &DMatrix<f64>,
        translation: &DVector<f64>,
        input_names: impl IntoIterator<Item = impl Into<String>>,
        output_names: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self> {
        let (m, n) = linear.shape();
        if translation.len() != m {
            return Err(ImageError::ShapeMismatch {
                expected: m,
                found: translation.len(),
            });
        }
        let matrix = DMatrix::from_fn(m + 1, n + 1, |r, c| match (r < m, c < n) {
            (true, true) => linear[(r, c)],
            (true, false) => translation[r],
            (false, false) => 1.0,
            (false, true) => 0.0,
        });
        Self::new(matrix, input_names, output_names)
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    pub fn input_names(&self) -> &[String] {
        &self.input_names
    }

    pub fn output_names(&self) -> &[String] {
        &self.output_names
    }

    pub fn input_ndim(&self) -> usize {
        self.input_names.len()
    }

    pub fn output_ndim(&self) -> usize {
        self.output_names.len()
    }

    pub fn linear(&self) -> DMatrix<f64> {
        DMatrix::from_fn(self.output_ndim(), self.input_ndim(), |r, c| {
            self.matrix[(r, c)]
        })
    }

    pub fn translation(&self) -> DVector<f64> {
        let n = self.input_ndim();
        DVector::from_fn(self.output_ndim(), |r, _| self.matrix[(r, n)])
    }

    /// Map an input coordinate to output coordinates.
    pub fn apply(&self, point: &[f64]) -> Result<Vec<f64>> {
        if point.len() != self.input_ndim() {
            return Err(ImageError::ShapeMismatch {
                expected: self.input_ndim(),
                found: point.len(),
            });
        }
        let homogeneous = DVector::from_iterator(
            point.len() + 1,
            point.iter().copied().chain(std::iter::once(1.0)),
        );
        let mapped = &self.matrix * homogeneous;
        Ok(mapped.iter().take(self.output_ndim()).copied().collect())
    }

    /// Transform equal to applying `other` first and then `self`.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::ShapeMismatch`] if `other` does not produce as
    /// many axes as `self` consumes.
    pub fn compose(&self, other: &AffineTransform) -> Result<Self> {
        if self.input_ndim() != other.output_ndim() {
            return Err(ImageError::ShapeMismatch {
                expected: self.input_ndim(),
                found: other.output_ndim(),
            });
        }
        Ok(Self {
            matrix: &self.matrix * &other.matrix,
            input_names: other.input_names.clone(),
            output_names: self.output_names.clone(),
        })
    }

    /// Algebraic inverse, mapping output coordinates back to inputs.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::SingularTransform`] if the linear part is not
    /// square or has a zero determinant.
    pub fn inverse(&self) -> Result<Self> {
        if self.input_ndim() != self.output_ndim() {
            return Err(ImageError::SingularTransform);
        }
        let det = self.linear().determinant();
        if det == 0.0 || !det.is_finite() {
            return Err(ImageError::SingularTransform);
        }
        let inverse = self
            .matrix
            .clone()
            .try_inverse()
            .ok_or(ImageError::SingularTransform)?;
        Ok(Self {
            matrix: inverse,
            input_names: self.output_names.clone(),
            output_names: self.input_names.clone(),
        })
    }

    /// Transform acting on the listed input axes only, in the given order.
    /// The dropped axes are held at coordinate zero, so their columns
    /// vanish and the translation is unchanged.
    pub fn restrict_to_axes(&self, axes: &[usize]) -> Result<Self> {
        let mut seen = HashSet::new();
        for &axis in axes {
            if axis >= self.input_ndim() {
                return Err(ImageError::IndexOutOfBounds {
                    axis,
                    index: axis as isize,
                    extent: self.input_ndim(),
                });
            }
            if !seen.insert(axis) {
                return Err(ImageError::value(format!("axis {axis} listed twice")));
            }
        }

        let n = self.input_ndim();
        let columns: Vec<usize> = axes.iter().copied().chain(std::iter::once(n)).collect();
        let matrix = DMatrix::from_fn(self.matrix.nrows(), columns.len(), |r, c| {
            self.matrix[(r, columns[c])]
        });
        Ok(Self {
            matrix,
            input_names: axes.iter().map(|&a| self.input_names[a].clone()).collect(),
            output_names: self.output_names.clone(),
        })
    }
}

fn check_unique(names: &[String], role: &str) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name.as_str()) {
            return Err(ImageError::value(format!(
                "duplicate {role} axis name {name:?}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn scaling(
        factors: &[f64],
        offsets: &[f64],
        inputs: &[&str],
        outputs: &[&str],
    ) -> AffineTransform {
        let linear = DMatrix::from_diagonal(&DVector::from_column_slice(factors));
        let translation = DVector::from_column_slice(offsets);
        let (inputs, outputs) = (inputs.iter().copied(), outputs.iter().copied());
        AffineTransform::from_linear(&linear, &translation, inputs, outputs).unwrap()
    }

    #[test]
    fn rejects_mismatched_names() {
        let err =
            AffineTransform::new(DMatrix::identity(4, 4), ["i", "j"], ["x", "y", "z"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Value);
    }

    #[test]
    fn rejects_non_homogeneous_bottom_row() {
        let mut m = DMatrix::identity(3, 3);
        m[(2, 0)] = 1.0;
        assert!(AffineTransform::new(m, ["i", "j"], ["x", "y"]).is_err());
    }

    #[test]
    fn rejects_duplicate_names() {
        let err = AffineTransform::identity(["i", "i"], ["x", "y"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Value);
    }

    #[test]
    fn compose_applies_other_first() {
        let a = scaling(&[2.0, 3.0], &[1.0, 1.0], &["u", "v"], &["x", "y"]);
        let b = scaling(&[1.0, 1.0], &[5.0, 0.0], &["i", "j"], &["u", "v"]);
        let ab = a.compose(&b).unwrap();
        assert_eq!(ab.apply(&[1.0, 2.0]).unwrap(), vec![13.0, 7.0]);
        assert_eq!(ab.input_names(), &["i".to_string(), "j".to_string()]);
        assert_eq!(ab.output_names(), &["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn compose_checks_axis_counts() {
        let a = scaling(&[1.0, 1.0], &[0.0, 0.0], &["u", "v"], &["x", "y"]);
        let b = scaling(&[1.0, 1.0, 1.0], &[0.0, 0.0, 0.0], &["i", "j", "k"], &["a", "b", "c"]);
        let err = a.compose(&b).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
    }

    #[test]
    fn inverse_round_trips() {
        let a = scaling(&[2.0, 4.0, 0.5], &[1.0, -2.0, 3.0], &["i", "j", "k"], &["x", "y", "z"]);
        let inv = a.inverse().unwrap();
        let point = a.apply(&[3.0, 1.0, 8.0]).unwrap();
        let back = inv.apply(&point).unwrap();
        for (got, want) in back.iter().zip([3.0, 1.0, 8.0]) {
            assert!((got - want).abs() < 1e-12);
        }
        assert_eq!(inv.input_names()[0], "x");
    }

    #[test]
    fn inverse_of_singular_fails() {
        let a = scaling(&[1.0, 0.0], &[0.0, 0.0], &["i", "j"], &["x", "y"]);
        assert_eq!(a.inverse().unwrap_err().kind(), ErrorKind::SingularTransform);

        let rect = a.restrict_to_axes(&[0]).unwrap();
        assert_eq!(rect.inverse().unwrap_err().kind(), ErrorKind::SingularTransform);
    }

    #[test]
    fn restrict_keeps_translation_and_selected_columns() {
        let a = scaling(&[2.0, 3.0, 4.0], &[1.0, 2.0, 3.0], &["i", "j", "k"], &["x", "y", "z"]);
        let r = a.restrict_to_axes(&[2, 0]).unwrap();
        assert_eq!(r.matrix().shape(), (4, 3));
        assert_eq!(r.input_names(), &["k".to_string(), "i".to_string()]);
        assert_eq!(r.apply(&[1.0, 1.0]).unwrap(), vec![3.0, 2.0, 7.0]);
        assert!(a.restrict_to_axes(&[0, 0]).is_err());
        assert!(a.restrict_to_axes(&[3]).is_err());
    }
}
