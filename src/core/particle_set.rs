
use crate::math::{Vector, zero_vector};

use super::grid::{CellId, GridGeometry, Phase};
use super::kernel::ShapeFunctions;
use super::particle::{MaterialPoint, PointId};

/// Points owned by this partition plus their cached shape functions.
///
/// Points are kept sorted by id so that every traversal, and therefore every
/// floating-point accumulation, happens in a reproducible order.
#[derive(Clone, Debug, Default)]
pub struct ParticleSet {
    points: Vec<MaterialPoint>,
    shape_cache: Vec<ShapeFunctions>,
}

impl ParticleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_points(points: Vec<MaterialPoint>) -> Self {
        let mut set = Self::new();
        set.insert_batch(points);
        set
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[MaterialPoint] {
        &self.points
    }

    pub fn points_mut(&mut self) -> &mut [MaterialPoint] {
        &mut self.points
    }

    pub fn shape_cache(&self) -> &[ShapeFunctions] {
        &self.shape_cache
    }

    pub fn points_and_cache(&self) -> (&[MaterialPoint], &[ShapeFunctions]) {
        (&self.points, &self.shape_cache)
    }

    pub fn points_mut_and_cache(&mut self) -> (&mut [MaterialPoint], &[ShapeFunctions]) {
        (&mut self.points, &self.shape_cache)
    }

    /// Points read-only, cache writable.
    pub fn points_and_cache_mut(&mut self) -> (&[MaterialPoint], &mut [ShapeFunctions]) {
        (&self.points, &mut self.shape_cache)
    }

    pub fn get(&self, id: PointId) -> Option<&MaterialPoint> {
        self.points
            .binary_search_by_key(&id, |p| p.id)
            .ok()
            .map(|index| &self.points[index])
    }

    pub fn insert_batch(&mut self, mut batch: Vec<MaterialPoint>) {
        if batch.is_empty() {
            return;
        }
        self.points.append(&mut batch);
        self.points.sort_by_key(|p| p.id);
        self.shape_cache.resize(self.points.len(), ShapeFunctions::default());
    }

    /// Remove and return every point matching `predicate`, in id order.
    pub fn extract_where<F>(&mut self, mut predicate: F) -> Vec<MaterialPoint>
    where
        F: FnMut(&MaterialPoint) -> bool,
    {
        let mut kept = Vec::with_capacity(self.points.len());
        let mut removed = Vec::new();
        for point in self.points.drain(..) {
            if predicate(&point) {
                removed.push(point);
            } else {
                kept.push(point);
            }
        }
        self.points = kept;
        self.shape_cache.truncate(self.points.len());
        removed
    }

    /// Sorted, de-duplicated cells currently holding points.
    pub fn occupied_cells(&self) -> Vec<CellId> {
        let mut cells: Vec<CellId> = self.points.iter().filter_map(|p| p.cell).collect();
        cells.sort_unstable();
        cells.dedup();
        cells
    }

    pub fn cell_counts(&self, cell_count: usize) -> Vec<u64> {
        let mut counts = vec![0; cell_count];
        for cell in self.points.iter().filter_map(|p| p.cell) {
            counts[cell] += 1;
        }
        counts
    }

    pub fn total_momentum(&self, phase: Phase) -> Vector {
        self.points
            .iter()
            .fold(zero_vector(), |acc, p| acc + p.momentum(phase))
    }
}

/// Evaluate shape functions for every located point.
pub fn compute_shape_functions(
    geometry: &GridGeometry,
    points: &[MaterialPoint],
    cache: &mut [ShapeFunctions],
) {
    for (point, entry) in points.iter().zip(cache.iter_mut()) {
        *entry = match point.cell {
            Some(cell) => geometry.shape_functions(cell, point.position),
            None => ShapeFunctions::default(),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SolidState;

    fn point(id: PointId, cell: Option<CellId>) -> MaterialPoint {
        let mut p = MaterialPoint::solid(id, Vector::ZERO, 1.0, 0.3, SolidState::new(0, 2000.0));
        p.cell = cell;
        p
    }

    #[test]
    fn insert_keeps_id_order() {
        let mut set = ParticleSet::from_points(vec![point(5, None), point(1, None)]);
        set.insert_batch(vec![point(3, None)]);
        let ids: Vec<_> = set.points().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 3, 5]);
        assert_eq!(set.shape_cache().len(), 3);
        assert_eq!(set.get(3).map(|p| p.id), Some(3));
        assert!(set.get(4).is_none());
    }

    #[test]
    fn extract_where_leaves_others_untouched() {
        let mut set = ParticleSet::from_points((0..4).map(|i| point(i, Some(0))).collect());
        let removed = set.extract_where(|p| p.id == 2);
        assert_eq!(removed.len(), 1);
        let ids: Vec<_> = set.points().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![0, 1, 3]);
        assert_eq!(set.shape_cache().len(), 3);
    }

    #[test]
    fn occupied_cells_and_counts() {
        let set = ParticleSet::from_points(vec![point(0, Some(2)), point(1, Some(0)), point(2, Some(2))]);
        assert_eq!(set.occupied_cells(), vec![0, 2]);
        assert_eq!(set.cell_counts(3), vec![1, 0, 2]);
    }
}
