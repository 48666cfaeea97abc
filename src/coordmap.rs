//! Coordinate maps: an affine transform from array indices to physical
//! space, together with the shape of the index space.
//!
//! The shape stored here is the authoritative shape of an [`Image`]; every
//! slicing operation produces a fresh map through [`CoordinateMap::sliced`]
//! so the geometry always matches the data it describes.
//!
//! [`Image`]: crate::image::Image

use nalgebra::DMatrix;

use crate::affine::AffineTransform;
use crate::error::{ImageError, Result};
use crate::slicing::{self, AxisIndex, ResolvedAxis};

#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateMap {
    transform: AffineTransform,
    shape: Vec<usize>,
}

impl CoordinateMap {
    /// # Errors
    ///
    /// Returns [`ImageError::Value`] if `shape` does not have one extent per
    /// input axis of `transform`.
    pub fn new(transform: AffineTransform, shape: impl Into<Vec<usize>>) -> Result<Self> {
        let shape = shape.into();
        if shape.len() != transform.input_ndim() {
            return Err(ImageError::value(format!(
                "shape {:?} has {} axes but the transform takes {} inputs",
                shape,
                shape.len(),
                transform.input_ndim()
            )));
        }
        Ok(Self { transform, shape })
    }

    pub fn from_affine(
        input_names: impl IntoIterator<Item = impl Into<String>>,
        output_names: impl IntoIterator<Item = impl Into<String>>,
        affine: DMatrix<f64>,
        shape: impl Into<Vec<usize>>,
    ) -> Result<Self> {
        let transform = AffineTransform::new(affine, input_names, output_names)?;
        Self::new(transform, shape)
    }

    pub fn identity(
        input_names: impl IntoIterator<Item = impl Into<String>>,
        output_names: impl IntoIterator<Item = impl Into<String>>,
        shape: impl Into<Vec<usize>>,
    ) -> Result<Self> {
        Self::new(AffineTransform::identity(input_names, output_names)?, shape)
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn transform(&self) -> &AffineTransform {
        &self.transform
    }

    /// Homogeneous matrix of the index-to-physical transform.
    pub fn affine(&self) -> &DMatrix<f64> {
        self.transform.matrix()
    }

    pub fn input_names(&self) -> &[String] {
        self.transform.input_names()
    }

    pub fn output_names(&self) -> &[String] {
        self.transform.output_names()
    }

    pub fn input_axis(&self, name: &str) -> Option<usize> {
        self.input_names().iter().position(|n| n == name)
    }

    pub fn output_axis(&self, name: &str) -> Option<usize> {
        self.output_names().iter().position(|n| n == name)
    }

    /// Map with its input axes permuted: axis `k` of the result is axis
    /// `order[k]` of `self`.
    pub fn reordered_axes(&self, order: &[usize]) -> Result<Self> {
        if order.len() != self.ndim() {
            return Err(ImageError::value(format!(
                "axis order {:?} is not a permutation of {} axes",
                order,
                self.ndim()
            )));
        }
        let transform = self.transform.restrict_to_axes(order)?;
        let shape = order.iter().map(|&axis| self.shape[axis]).collect::<Vec<_>>();
        Self::new(transform, shape)
    }

    /// Map an index coordinate (possibly fractional) to physical space.
    pub fn to_physical(&self, index: &[f64]) -> Result<Vec<f64>> {
        self.transform.apply(index)
    }

    /// Map a physical point back to (fractional) index coordinates.
    pub fn to_index(&self, point: &[f64]) -> Result<Vec<f64>> {
        self.transform.inverse()?.apply(point)
    }

    /// Map describing `image[key]`.
    pub fn sliced(&self, key: &[AxisIndex]) -> Result<Self> {
        self.slice_resolved(key).map(|(map, _)| map)
    }

    /// Slice the map and return the per-axis resolution alongside, so the
    /// caller can cut its buffer from the same computation.
    pub(crate) fn slice_resolved(&self, key: &[AxisIndex]) -> Result<(Self, Vec<ResolvedAxis>)> {
        let resolved = slicing::resolve(key, &self.shape)?;
        let n = self.ndim();

        // Old index = start + step * new index, on every axis. Dropped axes
        // get their fixed position as start and are then restricted away.
        let selection = DMatrix::from_fn(n + 1, n + 1, |r, c| match (r < n, c < n) {
            (true, true) if r == c => resolved[r].step() as f64,
            (true, true) => 0.0,
            (true, false) => resolved[r].start() as f64,
            (false, true) => 0.0,
            (false, false) => 1.0,
        });
        let names = self.input_names().to_vec();
        let selection = AffineTransform::new(selection, names.clone(), names)?;
        let moved = self.transform.compose(&selection)?;

        let surviving: Vec<usize> = resolved
            .iter()
            .enumerate()
            .filter_map(|(axis, r)| r.len().map(|_| axis))
            .collect();
        let shape: Vec<usize> = resolved.iter().filter_map(ResolvedAxis::len).collect();
        let transform = moved.restrict_to_axes(&surviving)?;

        Ok((Self::new(transform, shape)?, resolved))
    }
}
