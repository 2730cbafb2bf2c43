//! tokenviz joint reduction
//!
//! Projects the token embeddings of a prompt and its completion into one shared
//! three-dimensional space and rescales the result for display.
//!
//! Both segments are fitted together: the input rows are stacked above the
//! output rows, a single 3-component PCA is fitted on the combined matrix, and
//! every row is projected onto it. Row `i` of the result always corresponds to
//! row `i` of the stacked matrix, so callers can zip the points back onto their
//! tokens without bookkeeping.
//!
//! ```
//! use reduce::{normalize_coordinates, reduce_joint};
//!
//! let input = vec![vec![0.0f32, 1.0, 0.0], vec![1.0, 0.0, 0.5]];
//! let output = vec![vec![0.5f32, 0.5, 1.0], vec![0.0, 0.0, 0.0]];
//!
//! let projection = reduce_joint(&input, &output).unwrap();
//! assert_eq!(projection.points.len(), 4);
//! assert_eq!(projection.original_dim, 3);
//!
//! let coords = normalize_coordinates(&projection.points);
//! assert!(coords.iter().flatten().all(|v| (-1.0..=1.0).contains(v)));
//! ```
//!
//! PCA axes are only defined up to sign. This crate fixes the sign so that each
//! axis' largest loading is positive, which makes repeated runs reproducible, but
//! a different library would be free to mirror any axis.

pub mod error;
pub mod matrix;
pub mod normalize;
pub mod pca;

pub use error::ReduceError;
pub use matrix::{CombinedMatrix, EmbeddingMatrix};
pub use normalize::normalize_coordinates;
pub use pca::{Pca, COMPONENTS};

use serde::Serialize;

/// Joint projection of input and output embeddings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Projection {
    /// One point per stacked row, input rows first.
    pub points: Vec<[f64; COMPONENTS]>,
    /// Width of the embeddings before projection.
    pub original_dim: usize,
    /// Variance captured by each axis.
    pub explained_variance: [f64; COMPONENTS],
}

/// Stacks `input` above `output` and projects every row onto the top three
/// principal components of the combined set.
///
/// Errors on mismatched widths between the segments, ragged or non-finite rows
/// (row indices count across the stacked matrix), and fewer than three rows
/// in total.
pub fn reduce_joint<R: AsRef<[f32]>>(input: &[R], output: &[R]) -> Result<Projection, ReduceError> {
    let input_matrix = EmbeddingMatrix::from_rows(input)?;
    let output_matrix =
        EmbeddingMatrix::from_rows(output).map_err(|e| e.offset_row(input.len()))?;
    let combined = CombinedMatrix::stack(&input_matrix, &output_matrix)?;

    let (pca, points) = Pca::fit_transform(combined.view())?;
    tracing::debug!(
        input_rows = combined.input_rows(),
        total_rows = combined.rows(),
        dim = combined.width(),
        "projected embeddings to 3D"
    );

    Ok(Projection {
        points,
        original_dim: combined.width(),
        explained_variance: pca.explained_variance(),
    })
}
