//! Capability traits for the data buffer behind an [`Image`].
//!
//! Any container that can report its shape and lend out an ndarray view of
//! its elements can back an image. Owned arrays, views and mutable views
//! implement these traits out of the box.
//!
//! A buffer must not be mutated through another handle while an iterator
//! or a slice borrowed from it is alive; the borrow checker enforces this
//! for ndarray-backed buffers, custom implementations with interior
//! mutability have to uphold it themselves.
//!
//! [`Image`]: crate::image::Image

use ndarray::{ArrayBase, ArrayD, ArrayViewD, ArrayViewMutD, Data, DataMut, IxDyn};

use crate::error::{ImageError, Result};

pub trait Indexable {
    type Elem;

    fn shape(&self) -> &[usize];

    fn rank(&self) -> usize {
        self.shape().len()
    }

    fn get(&self, index: &[usize]) -> Option<&Self::Elem>;

    /// Borrow the whole buffer as an ndarray view without copying.
    fn view(&self) -> ArrayViewD<'_, Self::Elem>;

    /// Copy the buffer into an owned array.
    fn materialize(&self) -> ArrayD<Self::Elem>
    where
        Self::Elem: Clone,
    {
        self.view().to_owned()
    }
}

pub trait IndexableMut: Indexable {
    fn view_mut(&mut self) -> ArrayViewMutD<'_, Self::Elem>;

    fn set(&mut self, index: &[usize], value: Self::Elem) -> Result<()> {
        check_index(self.shape(), index)?;
        let mut view = self.view_mut();
        match view.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(ImageError::value(format!("index {index:?} is not addressable"))),
        }
    }
}

/// Validate a full multi-index against a shape.
pub(crate) fn check_index(shape: &[usize], index: &[usize]) -> Result<()> {
    if index.len() != shape.len() {
        return Err(ImageError::ShapeMismatch {
            expected: shape.len(),
            found: index.len(),
        });
    }
    for (axis, (&i, &extent)) in index.iter().zip(shape).enumerate() {
        if i >= extent {
            return Err(ImageError::IndexOutOfBounds {
                axis,
                index: i as isize,
                extent,
            });
        }
    }
    Ok(())
}

impl<S: Data> Indexable for ArrayBase<S, IxDyn> {
    type Elem = S::Elem;

    fn shape(&self) -> &[usize] {
        ArrayBase::shape(self)
    }

    fn get(&self, index: &[usize]) -> Option<&S::Elem> {
        ArrayBase::get(self, index)
    }

    fn view(&self) -> ArrayViewD<'_, S::Elem> {
        ArrayBase::view(self)
    }
}

impl<S: DataMut> IndexableMut for ArrayBase<S, IxDyn> {
    fn view_mut(&mut self) -> ArrayViewMutD<'_, S::Elem> {
        ArrayBase::view_mut(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn owned_arrays_are_indexable() {
        let mut data = ArrayD::<f64>::zeros(IxDyn(&[2, 3]));
        assert_eq!(Indexable::shape(&data), &[2, 3]);
        assert_eq!(data.rank(), 2);
        data.set(&[1, 2], 5.0).unwrap();
        assert_eq!(Indexable::get(&data, &[1, 2]), Some(&5.0));
        assert_eq!(data.materialize()[[1, 2]], 5.0);
    }

    #[test]
    fn set_reports_bad_indices() {
        let mut data = ArrayD::<f64>::zeros(IxDyn(&[2, 3]));
        assert_eq!(data.set(&[2, 0], 1.0).unwrap_err().kind(), ErrorKind::Index);
        assert_eq!(data.set(&[0], 1.0).unwrap_err().kind(), ErrorKind::ShapeMismatch);
    }

    #[test]
    fn views_share_storage() {
        let mut data = ArrayD::<f64>::zeros(IxDyn(&[2, 2]));
        {
            let mut view = data.view_mut();
            view.set(&[0, 1], 3.0).unwrap();
        }
        assert_eq!(data[[0, 1]], 3.0);
    }
}
