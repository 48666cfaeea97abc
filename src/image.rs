//! Images: a data buffer paired with the coordinate map that gives its
//! indices a physical meaning.

use nalgebra::DMatrix;
use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, SliceInfoElem};

use crate::coordmap::CoordinateMap;
use crate::error::{ImageError, Result};
use crate::indexable::{Indexable, IndexableMut};
use crate::io::Header;
use crate::slicing::{AxisIndex, ResolvedAxis};

/// Output axis names used by [`fromarray`], outermost first.
const OUTPUT_CONVENTION: [&str; 4] = ["time", "zspace", "yspace", "xspace"];

/// An N-dimensional image.
///
/// The buffer and the coordinate map always have the same shape: every
/// constructor checks it and every slicing operation derives both halves
/// from one resolution of the index key.
#[derive(Debug, Clone, PartialEq)]
pub struct Image<B> {
    data: B,
    coordmap: CoordinateMap,
    header: Option<Header>,
}

impl<B: Indexable> Image<B> {
    /// # Errors
    ///
    /// Returns [`ImageError::Value`] if the buffer shape differs from the
    /// coordinate map shape.
    pub fn new(data: B, coordmap: CoordinateMap) -> Result<Self> {
        if data.shape() != coordmap.shape() {
            return Err(ImageError::value(format!(
                "data shape {:?} does not match coordinate map shape {:?}",
                data.shape(),
                coordmap.shape()
            )));
        }
        Ok(Self {
            data,
            coordmap,
            header: None,
        })
    }

    pub(crate) fn with_header(mut self, header: Option<Header>) -> Self {
        self.header = header;
        self
    }

    pub fn shape(&self) -> &[usize] {
        self.coordmap.shape()
    }

    pub fn ndim(&self) -> usize {
        self.coordmap.ndim()
    }

    pub fn coordmap(&self) -> &CoordinateMap {
        &self.coordmap
    }

    pub fn affine(&self) -> &DMatrix<f64> {
        self.coordmap.affine()
    }

    pub fn data(&self) -> &B {
        &self.data
    }

    pub fn into_data(self) -> B {
        self.data
    }

    pub fn into_parts(self) -> (B, CoordinateMap) {
        (self.data, self.coordmap)
    }

    /// The raw buffer content, without copying.
    pub fn as_array(&self) -> ArrayViewD<'_, B::Elem> {
        self.data.view()
    }

    pub fn to_array(&self) -> ArrayD<B::Elem>
    where
        B::Elem: Clone,
    {
        self.data.materialize()
    }

    /// Format header of a loaded image.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::NoHeader`] for images built from arrays.
    pub fn header(&self) -> Result<&Header> {
        self.header.as_ref().ok_or(ImageError::NoHeader)
    }

    pub fn header_mut(&mut self) -> Result<&mut Header> {
        self.header.as_mut().ok_or(ImageError::NoHeader)
    }

    pub fn set_header(&mut self, header: Header) {
        self.header = Some(header);
    }

    /// `image[key]`: a new image viewing part of this one.
    ///
    /// Integer entries drop their axis, ranges keep it, and axes past the
    /// end of `key` are taken whole.
    pub fn slice(&self, key: &[AxisIndex]) -> Result<Image<ArrayViewD<'_, B::Elem>>> {
        let (coordmap, resolved) = self.coordmap.slice_resolved(key)?;
        let info = slice_info(&resolved);
        let data = self.data.view().slice_move(info.as_slice());
        Image::new(data, coordmap)
    }

    /// View with the axes permuted; axis `k` of the result is axis
    /// `order[k]` of this image.
    pub fn transposed(&self, order: &[usize]) -> Result<Image<ArrayViewD<'_, B::Elem>>> {
        let coordmap = self.coordmap.reordered_axes(order)?;
        let data = self.data.view().permuted_axes(order.to_vec());
        Image::new(data, coordmap)
    }

    /// Iterate `image[0]`, `image[1]`, ... along the leading axis.
    pub fn iter(&self) -> Slabs<'_, B> {
        let end = self.shape().first().copied().unwrap_or(0);
        Slabs {
            image: self,
            next: 0,
            end,
        }
    }
}

impl<B: IndexableMut> Image<B> {
    pub fn as_array_mut(&mut self) -> ArrayViewMutD<'_, B::Elem> {
        self.data.view_mut()
    }

    /// Mutable counterpart of [`Image::slice`]. Writes go to this image's
    /// buffer; the coordinate map is untouched.
    pub fn slice_mut(&mut self, key: &[AxisIndex]) -> Result<Image<ArrayViewMutD<'_, B::Elem>>> {
        let (coordmap, resolved) = self.coordmap.slice_resolved(key)?;
        let info = slice_info(&resolved);
        let data = self.data.view_mut().slice_move(info.as_slice());
        Image::new(data, coordmap)
    }

    /// `image[key] = value`, broadcasting `value` over the selection.
    pub fn assign(&mut self, key: &[AxisIndex], value: &ArrayViewD<'_, B::Elem>) -> Result<()>
    where
        B::Elem: Clone,
    {
        let mut target = self.slice_mut(key)?;
        let mut view = target.as_array_mut();
        let source = value.broadcast(view.raw_dim()).ok_or_else(|| {
            ImageError::value(format!(
                "cannot assign an array of shape {:?} to a selection of shape {:?}",
                value.shape(),
                view.shape()
            ))
        })?;
        view.assign(&source);
        Ok(())
    }

    /// `image[key] = scalar`.
    pub fn fill(&mut self, key: &[AxisIndex], value: B::Elem) -> Result<()>
    where
        B::Elem: Clone,
    {
        self.slice_mut(key)?.as_array_mut().fill(value);
        Ok(())
    }
}

fn slice_info(resolved: &[ResolvedAxis]) -> Vec<SliceInfoElem> {
    resolved.iter().map(ResolvedAxis::slice_info).collect()
}

impl<B: Indexable> Indexable for Image<B> {
    type Elem = B::Elem;

    fn shape(&self) -> &[usize] {
        self.coordmap.shape()
    }

    fn get(&self, index: &[usize]) -> Option<&B::Elem> {
        self.data.get(index)
    }

    fn view(&self) -> ArrayViewD<'_, B::Elem> {
        self.data.view()
    }
}

impl<B: IndexableMut> IndexableMut for Image<B> {
    fn view_mut(&mut self) -> ArrayViewMutD<'_, B::Elem> {
        self.data.view_mut()
    }
}

/// Lazy sequence of the leading-axis sub-images of an [`Image`].
pub struct Slabs<'a, B> {
    image: &'a Image<B>,
    next: usize,
    end: usize,
}

impl<'a, B: Indexable> Iterator for Slabs<'a, B> {
    type Item = Image<ArrayViewD<'a, B::Elem>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let index = self.next as isize;
        self.next += 1;
        // Always in range, so slicing cannot fail here.
        self.image.slice(&[AxisIndex::Index(index)]).ok()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end - self.next;
        (remaining, Some(remaining))
    }
}

impl<B: Indexable> ExactSizeIterator for Slabs<'_, B> {}

impl<'a, B: Indexable> IntoIterator for &'a Image<B> {
    type Item = Image<ArrayViewD<'a, B::Elem>>;
    type IntoIter = Slabs<'a, B>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Wrap a bare array in an image with an identity affine.
///
/// `names` labels the input (index) axes and defaults to `axis0`,
/// `axis1`, ... The output axes follow the `time, zspace, yspace, xspace`
/// convention, keeping the trailing names for ranks below four. The image
/// has no header.
pub fn fromarray<B: Indexable>(data: B, names: Option<&[&str]>) -> Result<Image<B>> {
    let rank = data.rank();
    let inputs: Vec<String> = match names {
        Some(names) if names.len() != rank => {
            return Err(ImageError::value(format!(
                "{} axis names given for an array of rank {}",
                names.len(),
                rank
            )));
        }
        Some(names) => names.iter().map(|n| n.to_string()).collect(),
        None => (0..rank).map(|axis| format!("axis{axis}")).collect(),
    };
    let outputs = default_output_names(rank);
    let coordmap = CoordinateMap::identity(inputs, outputs, data.shape().to_vec())?;
    Image::new(data, coordmap)
}

fn default_output_names(rank: usize) -> Vec<String> {
    let known = rank.min(OUTPUT_CONVENTION.len());
    let extra = rank - known;
    (0..extra)
        .map(|axis| format!("dim{axis}"))
        .chain(
            OUTPUT_CONVENTION[OUTPUT_CONVENTION.len() - known..]
                .iter()
                .map(|n| n.to_string()),
        )
        .collect()
}
