use crate::pca::COMPONENTS;

/// Rescales each axis independently into `[-1, 1]` over the whole point set.
///
/// A zero-range axis maps every point to `-1`. Order and length are preserved and
/// an empty slice yields an empty vector.
pub fn normalize_coordinates(points: &[[f64; COMPONENTS]]) -> Vec<[f64; COMPONENTS]> {
    let mut min = [f64::INFINITY; COMPONENTS];
    let mut max = [f64::NEG_INFINITY; COMPONENTS];
    for point in points {
        for axis in 0..COMPONENTS {
            min[axis] = min[axis].min(point[axis]);
            max[axis] = max[axis].max(point[axis]);
        }
    }

    let mut range = [1.0; COMPONENTS];
    for axis in 0..COMPONENTS {
        let span = max[axis] - min[axis];
        if span != 0.0 {
            range[axis] = span;
        }
    }

    points
        .iter()
        .map(|point| {
            let mut out = [0.0; COMPONENTS];
            for axis in 0..COMPONENTS {
                out[axis] = 2.0 * (point[axis] - min[axis]) / range[axis] - 1.0;
            }
            out
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spans_minus_one_to_one() {
        let points = [[0.0, 10.0, -3.0], [5.0, 20.0, 1.0], [10.0, 15.0, 0.0]];
        let out = normalize_coordinates(&points);
        assert_eq!(out[0][0], -1.0);
        assert_eq!(out[2][0], 1.0);
        assert_eq!(out[1][0], 0.0);
        assert_eq!(out[1][1], 1.0);
        assert_eq!(out[0][2], -1.0);
        assert!(out.iter().flatten().all(|v| (-1.0..=1.0).contains(v)));
    }

    #[test]
    fn constant_axis_collapses_to_minus_one() {
        let points = [[1.0, 4.0, 2.0], [2.0, 4.0, 3.0], [3.0, 4.0, 5.0]];
        let out = normalize_coordinates(&points);
        assert!(out.iter().all(|p| p[1] == -1.0 && p[1].is_finite()));
    }

    #[test]
    fn normalized_set_is_a_fixed_point() {
        let points = [[0.3, -2.0, 7.0], [1.7, 0.5, 7.0], [-0.4, 3.25, 7.0], [0.9, 1.0, 7.0]];
        let once = normalize_coordinates(&points);
        let twice = normalize_coordinates(&once);
        for (a, b) in once.iter().zip(&twice) {
            for axis in 0..COMPONENTS {
                assert!((a[axis] - b[axis]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn preserves_order_and_length() {
        let points: Vec<[f64; 3]> = (0..7).map(|i| [i as f64, -(i as f64), 0.5 * i as f64]).collect();
        let out = normalize_coordinates(&points);
        assert_eq!(out.len(), points.len());
        for pair in out.windows(2) {
            assert!(pair[1][0] > pair[0][0]);
            assert!(pair[1][1] < pair[0][1]);
        }
    }

    #[test]
    fn empty_in_empty_out() {
        assert!(normalize_coordinates(&[]).is_empty());
    }
}
