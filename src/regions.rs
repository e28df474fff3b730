use crate::{
    datatypes::{Mesh, Zone},
    geometry::{BoundaryGeometry, Line},
};

/// Assigns material zones from coordinates alone, so the same predicates
/// serve any mesh resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionClassifier {
    left_line: Line,
    right_line: Line,
    vthickness: f64,
    half_width: f64,
    hside: f64,
    lside: f64,
}

impl RegionClassifier {
    pub fn new(geometry: &BoundaryGeometry) -> RegionClassifier {
        RegionClassifier {
            left_line: geometry.left_line,
            right_line: geometry.right_line,
            vthickness: geometry.vthickness,
            half_width: geometry.lx / 2.0,
            hside: geometry.hside,
            lside: geometry.lside,
        }
    }

    /// Inner edge of the left vasculature band
    fn left_inner(&self, x: f64) -> f64 {
        self.left_line.at(x - self.vthickness)
    }

    /// Inner edge of the right vasculature band
    fn right_inner(&self, x: f64) -> f64 {
        self.right_line.at(x + self.vthickness)
    }

    pub fn is_vasculature(&self, x: f64, y: f64) -> bool {
        (y > self.left_line.at(x) && y < self.left_inner(x))
            || (y > self.right_line.at(x) && y < self.right_inner(x))
    }

    pub fn is_nectary(&self, x: f64, y: f64) -> bool {
        y > self.left_inner(x) && y > self.right_inner(x)
    }

    pub fn is_side(&self, x: f64, y: f64) -> bool {
        y > -self.hside
            && ((x < -self.half_width + self.lside && y < self.left_line.at(x))
                || (x > self.half_width - self.lside && y < self.right_line.at(x)))
    }

    pub fn is_mesophyll(&self, x: f64, y: f64) -> bool {
        !self.is_vasculature(x, y) && !self.is_nectary(x, y) && !self.is_side(x, y)
    }

    pub fn classify(&self, x: f64, y: f64) -> Zone {
        if self.is_vasculature(x, y) {
            Zone::Vasculature
        } else if self.is_nectary(x, y) {
            Zone::Nectary
        } else if self.is_mesophyll(x, y) {
            Zone::Mesophyll
        } else {
            Zone::Side
        }
    }

    /// Zone of every element, sampled at the element centroid
    pub fn classify_elements(&self, mesh: &Mesh) -> Vec<Zone> {
        mesh.elements
            .iter()
            .map(|element| {
                let c = mesh.element_centroid(element);
                self.classify(c.x, c.y)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::ParameterSet;

    fn classifier() -> (RegionClassifier, BoundaryGeometry) {
        let geometry = BoundaryGeometry::new(&ParameterSet::default()).unwrap();
        (RegionClassifier::new(&geometry), geometry)
    }

    #[test]
    fn test_zones_partition_the_actuator() {
        let (classifier, geometry) = classifier();
        let n = 200;

        for i in 0..=n {
            for j in 0..=n {
                let x = -geometry.lx / 2.0 + geometry.lx * i as f64 / n as f64;
                let y = -geometry.ly * j as f64 / n as f64;

                let memberships = [
                    classifier.is_vasculature(x, y),
                    classifier.is_nectary(x, y),
                    classifier.is_side(x, y),
                    classifier.is_mesophyll(x, y),
                ];
                let count = memberships.iter().filter(|m| **m).count();
                assert_eq!(count, 1, "point ({x}, {y}) belongs to {count} zones");
            }
        }
    }

    #[test]
    fn test_representative_points() {
        let (classifier, geometry) = classifier();
        let ly = geometry.ly;

        // between the arcs above the cavity
        let podium_y = geometry.arc_center.y - geometry.arc_radius - geometry.hnect / 2.0;
        assert_eq!(classifier.classify(0.0, podium_y), Zone::Nectary);

        // just beside the cavity mouth
        let x = -geometry.cwidth / 2.0 - geometry.vthickness / 2.0;
        assert_eq!(classifier.classify(x, -ly + 0.01), Zone::Vasculature);
        assert_eq!(classifier.classify(-x, -ly + 0.01), Zone::Vasculature);

        // top outer corners, under the vasculature band
        let corner = geometry.lx / 2.0 - geometry.lside / 2.0;
        let y = (geometry.left_line.at(-corner) - geometry.hside) / 2.0;
        assert_eq!(classifier.classify(-corner, y), Zone::Side);
        assert_eq!(classifier.classify(corner, y), Zone::Side);

        // bottom outer corners
        assert_eq!(classifier.classify(-corner, -ly + 0.01), Zone::Mesophyll);
    }

    #[test]
    fn test_classification_is_mirror_symmetric() {
        let (classifier, geometry) = classifier();
        for i in 1..50 {
            for j in 1..50 {
                let x = geometry.lx / 2.0 * i as f64 / 50.0;
                let y = -geometry.ly * j as f64 / 50.0;
                assert_eq!(classifier.classify(x, y), classifier.classify(-x, y));
            }
        }
    }
}
