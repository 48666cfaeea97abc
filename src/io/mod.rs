//! Persistence collaborators.
//!
//! The core only sees a buffer, an affine transform and an optional
//! header. Byte layouts live in the format modules; every failure they
//! raise reaches the caller as [`ImageError::Load`] or
//! [`ImageError::Save`], whatever the underlying cause.

pub mod dicom_series;
pub mod nifti;

use std::collections::BTreeMap;
use std::path::Path;

use ndarray::ArrayD;

use crate::affine::AffineTransform;
use crate::coordmap::CoordinateMap;
use crate::enums::DataType;
use crate::error::{FormatError, ImageError, Result};
use crate::image::Image;
use crate::indexable::Indexable;

pub use dicom_series::DicomSeries;
pub use nifti::Nifti;

/// A single header entry.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl HeaderValue {
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            HeaderValue::Int(v) => Some(v as f64),
            HeaderValue::Float(v) => Some(v),
            HeaderValue::Text(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            HeaderValue::Int(v) => Some(v),
            HeaderValue::Float(v) if v.fract() == 0.0 => Some(v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl From<i64> for HeaderValue {
    fn from(v: i64) -> Self {
        HeaderValue::Int(v)
    }
}

impl From<i32> for HeaderValue {
    fn from(v: i32) -> Self {
        HeaderValue::Int(v.into())
    }
}

impl From<f64> for HeaderValue {
    fn from(v: f64) -> Self {
        HeaderValue::Float(v)
    }
}

impl From<&str> for HeaderValue {
    fn from(v: &str) -> Self {
        HeaderValue::Text(v.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(v: String) -> Self {
        HeaderValue::Text(v)
    }
}

/// Key/value metadata carried by images loaded from a file format.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    entries: BTreeMap<String, HeaderValue>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.entries.get(key)
    }

    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<HeaderValue>,
    ) -> Option<HeaderValue> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<HeaderValue> {
        self.entries.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// What a loader hands to the core.
#[derive(Debug, Clone)]
pub struct LoadedVolume {
    pub data: ArrayD<f64>,
    pub transform: AffineTransform,
    pub header: Option<Header>,
}

impl LoadedVolume {
    fn into_image(self, path: &Path) -> Result<Image<ArrayD<f64>>> {
        let shape = self.data.shape().to_vec();
        let image = CoordinateMap::new(self.transform, shape)
            .and_then(|coordmap| Image::new(self.data, coordmap))
            .map_err(|e| ImageError::Load {
                path: path.to_path_buf(),
                source: FormatError::Geometry(e.to_string()),
            })?;
        Ok(image.with_header(self.header))
    }
}

pub trait Loader {
    /// Read the resource at `path`.
    ///
    /// # Errors
    ///
    /// Any failure is reported as [`ImageError::Load`].
    fn load(&self, path: &Path) -> Result<LoadedVolume>;
}

pub trait Saver {
    /// Write `image` to `path`, converting values to `dtype` if given.
    ///
    /// # Errors
    ///
    /// Any failure is reported as [`ImageError::Save`].
    fn save<B>(&self, image: &Image<B>, path: &Path, dtype: Option<DataType>) -> Result<()>
    where
        B: Indexable,
        B::Elem: Copy + Into<f64>;
}

/// Load an image, choosing the format from the path: `.nii`/`.nii.gz`
/// files are NIfTI-1, directories are DICOM series.
pub fn load_image(path: impl AsRef<Path>) -> Result<Image<ArrayD<f64>>> {
    let path = path.as_ref();
    let volume = if nifti::is_nifti_path(path) {
        Nifti.load(path)?
    } else if path.is_dir() {
        DicomSeries::default().load(path)?
    } else {
        return Err(ImageError::Load {
            path: path.to_path_buf(),
            source: FormatError::UnsupportedFormat(format!(
                "{} is neither a NIfTI file nor a DICOM directory",
                path.display()
            )),
        });
    };
    volume.into_image(path)
}

/// Save an image as NIfTI-1 and return it as read back from disk.
pub fn save_image<B>(
    image: &Image<B>,
    path: impl AsRef<Path>,
    dtype: Option<DataType>,
) -> Result<Image<ArrayD<f64>>>
where
    B: Indexable,
    B::Elem: Copy + Into<f64>,
{
    let path = path.as_ref();
    if !nifti::is_nifti_path(path) {
        return Err(ImageError::Save {
            path: path.to_path_buf(),
            source: FormatError::UnsupportedFormat(format!(
                "cannot save {}: only .nii and .nii.gz are writable",
                path.display()
            )),
        });
    }
    Nifti.save(image, path, dtype)?;
    load_image(path)
}
