use depthfuse_linalg::RigidTransform;

/// An unordered set of 3D points.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    // The points in the point cloud.
    points: Vec<[f64; 3]>,
}

impl PointCloud {
    /// Create a new point cloud from points.
    pub fn new(points: Vec<[f64; 3]>) -> Self {
        Self { points }
    }

    /// Create an empty point cloud with room for `capacity` points.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
        }
    }

    /// Get the number of points in the point cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Get as reference the points in the point cloud.
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// Consume the point cloud and return its points.
    pub fn into_points(self) -> Vec<[f64; 3]> {
        self.points
    }

    /// Append a single point.
    #[inline]
    pub fn push(&mut self, point: [f64; 3]) {
        self.points.push(point);
    }

    /// Append all the points of `other`, keeping their order after the existing points.
    pub fn merge(&mut self, other: PointCloud) {
        if self.points.is_empty() {
            self.points = other.points;
        } else {
            self.points.extend(other.points);
        }
    }

    /// Apply a rigid transform to every point in place.
    pub fn transform_mut(&mut self, transform: &RigidTransform) {
        self.points
            .iter_mut()
            .for_each(|p| *p = transform.transform_point(p));
    }

    /// Return a copy of the point cloud with a rigid transform applied to every point.
    pub fn transformed(&self, transform: &RigidTransform) -> PointCloud {
        self.points
            .iter()
            .map(|p| transform.transform_point(p))
            .collect()
    }

    /// Get the minimum bound of the point cloud. Returns the origin if empty.
    pub fn get_min_bound(&self) -> [f64; 3] {
        self.fold_bound(f64::min)
    }

    /// Get the maximum bound of the point cloud. Returns the origin if empty.
    pub fn get_max_bound(&self) -> [f64; 3] {
        self.fold_bound(f64::max)
    }

    /// Mean of all the points. Returns `None` if empty.
    pub fn centroid(&self) -> Option<[f64; 3]> {
        if self.points.is_empty() {
            return None;
        }
        let sum = self.points.iter().fold([0.0; 3], |acc, p| {
            [acc[0] + p[0], acc[1] + p[1], acc[2] + p[2]]
        });
        let n = self.points.len() as f64;
        Some([sum[0] / n, sum[1] / n, sum[2] / n])
    }

    fn fold_bound(&self, f: impl Fn(f64, f64) -> f64) -> [f64; 3] {
        let Some(first) = self.points.first() else {
            return [0.0; 3];
        };
        self.points.iter().fold(*first, |acc, p| {
            [f(acc[0], p[0]), f(acc[1], p[1]), f(acc[2], p[2])]
        })
    }
}

impl FromIterator<[f64; 3]> for PointCloud {
    fn from_iter<I: IntoIterator<Item = [f64; 3]>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

impl Extend<[f64; 3]> for PointCloud {
    fn extend<I: IntoIterator<Item = [f64; 3]>>(&mut self, iter: I) {
        self.points.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointcloud() {
        let pointcloud = PointCloud::new(vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]]);

        assert_eq!(pointcloud.len(), 2);
        assert!(!pointcloud.is_empty());
        assert_eq!(pointcloud.points()[1], [1.0, 0.0, 0.0]);
        assert_eq!(pointcloud.centroid(), Some([0.5, 0.0, 0.0]));
        assert!(PointCloud::default().centroid().is_none());
    }

    #[test]
    fn test_merge_keeps_order() {
        let mut a = PointCloud::new(vec![[0.0, 0.0, 0.0]]);
        let b: PointCloud = vec![[1.0, 1.0, 1.0], [2.0, 2.0, 2.0]].into_iter().collect();
        a.merge(b);
        assert_eq!(
            a.points(),
            &[[0.0, 0.0, 0.0], [1.0, 1.0, 1.0], [2.0, 2.0, 2.0]]
        );

        let mut empty = PointCloud::default();
        empty.merge(a.clone());
        assert_eq!(empty, a);
    }

    #[test]
    fn test_bounds() {
        let pointcloud = PointCloud::new(vec![[0.0, 3.0, -1.0], [1.0, -2.0, 5.0]]);
        assert_eq!(pointcloud.get_min_bound(), [0.0, -2.0, -1.0]);
        assert_eq!(pointcloud.get_max_bound(), [1.0, 3.0, 5.0]);
        assert_eq!(PointCloud::default().get_min_bound(), [0.0; 3]);
    }

    #[test]
    fn test_transform() {
        let transform = RigidTransform::from_translation(&[1.0, 2.0, 3.0]);
        let mut pointcloud = PointCloud::new(vec![[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]]);
        let copy = pointcloud.transformed(&transform);
        pointcloud.transform_mut(&transform);
        assert_eq!(pointcloud, copy);
        assert_eq!(pointcloud.points(), &[[1.0, 2.0, 3.0], [2.0, 3.0, 4.0]]);
    }
}
