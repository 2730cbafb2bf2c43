use ndarray::{concatenate, Array2, ArrayView2, Axis};

use crate::ReduceError;

/// Embeddings of one segment stacked row-wise and widened to `f64`.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatrix {
    data: Array2<f64>,
}

impl EmbeddingMatrix {
    /// Builds the matrix from per-token vectors.
    ///
    /// Every row must have the width of the first row and contain only finite
    /// values. Rows are never padded or truncated. Row indices in errors are
    /// relative to `rows`.
    pub fn from_rows<R: AsRef<[f32]>>(rows: &[R]) -> Result<Self, ReduceError> {
        let width = rows.first().map_or(0, |row| row.as_ref().len());
        let mut data = Array2::<f64>::zeros((rows.len(), width));

        for (i, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != width {
                return Err(ReduceError::RaggedRows {
                    row: i,
                    expected: width,
                    found: row.len(),
                });
            }
            for (j, &value) in row.iter().enumerate() {
                if !value.is_finite() {
                    return Err(ReduceError::NonFinite { row: i });
                }
                data[[i, j]] = f64::from(value);
            }
        }

        Ok(Self { data })
    }

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.data.nrows() == 0
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }
}

/// Input rows followed by output rows, sharing one column space.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedMatrix {
    data: Array2<f64>,
    input_rows: usize,
}

impl CombinedMatrix {
    /// Concatenates `input` above `output`. An empty segment contributes no rows
    /// and imposes no width.
    pub fn stack(input: &EmbeddingMatrix, output: &EmbeddingMatrix) -> Result<Self, ReduceError> {
        let data = match (input.is_empty(), output.is_empty()) {
            (_, true) => input.data.clone(),
            (true, false) => output.data.clone(),
            (false, false) => {
                if input.width() != output.width() {
                    return Err(ReduceError::DimensionalityMismatch {
                        input: input.width(),
                        output: output.width(),
                    });
                }
                concatenate(Axis(0), &[input.view(), output.view()]).map_err(|_| {
                    ReduceError::DimensionalityMismatch {
                        input: input.width(),
                        output: output.width(),
                    }
                })?
            }
        };

        Ok(Self {
            data,
            input_rows: input.rows(),
        })
    }

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    /// Number of leading rows that came from the input segment.
    pub fn input_rows(&self) -> usize {
        self.input_rows
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }
}
