use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ImageError>;

/// Coarse classification of an [`ImageError`].
///
/// Callers that only care about the category of a failure (bad argument,
/// bad index, unreadable file...) match on this instead of the variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Value,
    Index,
    ShapeMismatch,
    SingularTransform,
    Attribute,
    Runtime,
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("invalid value: {0}")]
    Value(String),

    #[error("index {index} is out of bounds for axis {axis} with extent {extent}")]
    IndexOutOfBounds {
        axis: usize,
        index: isize,
        extent: usize,
    },

    #[error("too many indices: got {given} for an index space of rank {rank}")]
    TooManyIndices { given: usize, rank: usize },

    #[error("shape mismatch: expected {expected} axes, found {found}")]
    ShapeMismatch { expected: usize, found: usize },

    #[error("transform is not invertible")]
    SingularTransform,

    #[error("image has no header; only images loaded from a file carry one")]
    NoHeader,

    #[error("could not load {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: FormatError,
    },

    #[error("could not save {path}: {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: FormatError,
    },
}

impl ImageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ImageError::Value(_) => ErrorKind::Value,
            ImageError::IndexOutOfBounds { .. } | ImageError::TooManyIndices { .. } => {
                ErrorKind::Index
            }
            ImageError::ShapeMismatch { .. } => ErrorKind::ShapeMismatch,
            ImageError::SingularTransform => ErrorKind::SingularTransform,
            ImageError::NoHeader => ErrorKind::Attribute,
            ImageError::Load { .. } | ImageError::Save { .. } => ErrorKind::Runtime,
        }
    }

    pub(crate) fn value(message: impl Into<String>) -> Self {
        ImageError::Value(message.into())
    }
}

/// Failures raised by the persistence collaborators before they are
/// wrapped into [`ImageError::Load`] or [`ImageError::Save`].
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),

    #[error("NIfTI error: {0}")]
    Nifti(String),

    #[error("invalid geometry: {0}")]
    Geometry(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("No valid DICOM images found")]
    NoValidImages,

    #[error("Inconsistent image dimensions")]
    InconsistentDimensions,

    #[error("Missing spacing information")]
    MissingSpacing,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_and_save_failures_share_the_runtime_kind() {
        let load = ImageError::Load {
            path: PathBuf::from("bad_file.foo"),
            source: FormatError::UnsupportedFormat("foo".into()),
        };
        let save = ImageError::Save {
            path: PathBuf::from("out.foo"),
            source: FormatError::Nifti("truncated".into()),
        };
        assert_eq!(load.kind(), ErrorKind::Runtime);
        assert_eq!(save.kind(), ErrorKind::Runtime);
        assert!(load.to_string().contains("bad_file.foo"));
    }

    #[test]
    fn index_errors_are_grouped() {
        let oob = ImageError::IndexOutOfBounds {
            axis: 0,
            index: 7,
            extent: 3,
        };
        let many = ImageError::TooManyIndices { given: 4, rank: 3 };
        assert_eq!(oob.kind(), ErrorKind::Index);
        assert_eq!(many.kind(), ErrorKind::Index);
        assert_eq!(ImageError::NoHeader.kind(), ErrorKind::Attribute);
    }
}
