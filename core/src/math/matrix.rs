use ndarray::{Array2, ArrayView2};

pub struct MatrixHelper;

impl MatrixHelper {
    /// Euclidean distance between rows `a` and `b` of a point matrix.
    pub fn row_distance(points: ArrayView2<f64>, a: usize, b: usize) -> f64 {
        let delta = &points.row(a) - &points.row(b);
        delta.dot(&delta).sqrt()
    }

    /// Symmetric matrix of distances between every pair of rows.
    pub fn distance_matrix(points: ArrayView2<f64>) -> Array2<f64> {
        let count = points.nrows();
        Array2::from_shape_fn((count, count), |(a, b)| {
            Self::row_distance(points, a, b)
        })
    }
}
