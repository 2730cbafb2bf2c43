use thiserror::Error;

/// Reasons a set of embeddings cannot be projected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReduceError {
    #[error("need at least {required} embeddings to project, got {rows}")]
    DegenerateInput { rows: usize, required: usize },
    #[error("input embeddings are {input}-dimensional but output embeddings are {output}-dimensional")]
    DimensionalityMismatch { input: usize, output: usize },
    #[error("row {row} has {found} values, expected {expected}")]
    RaggedRows {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("row {row} contains a non-finite value")]
    NonFinite { row: usize },
}

impl ReduceError {
    /// Shifts the row index of row-level errors by `offset`.
    pub(crate) fn offset_row(self, offset: usize) -> Self {
        match self {
            ReduceError::RaggedRows {
                row,
                expected,
                found,
            } => ReduceError::RaggedRows {
                row: row + offset,
                expected,
                found,
            },
            ReduceError::NonFinite { row } => ReduceError::NonFinite { row: row + offset },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_only_touches_row_errors() {
        assert_eq!(
            ReduceError::NonFinite { row: 2 }.offset_row(5),
            ReduceError::NonFinite { row: 7 }
        );
        let mismatch = ReduceError::DimensionalityMismatch {
            input: 4,
            output: 8,
        };
        assert_eq!(mismatch.clone().offset_row(5), mismatch);
    }

    #[test]
    fn messages_name_the_numbers() {
        let err = ReduceError::DegenerateInput {
            rows: 2,
            required: 3,
        };
        assert_eq!(err.to_string(), "need at least 3 embeddings to project, got 2");
    }
}
