//! Area template geometry.
//!
//! Templates are anchored at an origin point with a facing direction and
//! test candidate entities by center-point containment.

use serde::{Deserialize, Serialize};

/// A 2D point in scene coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn distance_to(self, other: Point) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Where a template is anchored when it is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TemplateAnchor {
    /// Centered on the acting entity's avatar.
    SelfAnchor,
    /// Placed at a user-chosen point.
    Point,
}

impl Default for TemplateAnchor {
    fn default() -> Self {
        TemplateAnchor::Point
    }
}

/// The geometric form of an area template.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum TemplateShape {
    /// Circle / sphere with the given radius.
    Circle { radius: f64 },
    /// Cone spreading from the origin along the facing direction.
    Cone { length: f64, angle_deg: f64 },
    /// Axis-aligned rectangle with the origin at its corner.
    Rect { width: f64, height: f64 },
    /// Line from the origin along the facing direction.
    Ray { length: f64, width: f64 },
}

impl TemplateShape {
    /// Test whether `point` lies inside the shape placed at `origin`
    /// facing `direction_deg`.
    #[must_use]
    pub fn contains(&self, origin: Point, direction_deg: f64, point: Point) -> bool {
        match *self {
            TemplateShape::Circle { radius } => origin.distance_to(point) <= radius,
            TemplateShape::Cone { length, angle_deg } => {
                let distance = origin.distance_to(point);
                if distance > length {
                    return false;
                }
                if distance == 0.0 {
                    return true;
                }
                let to_point = (point.y - origin.y).atan2(point.x - origin.x).to_degrees();
                let delta = angle_delta(direction_deg, to_point);
                delta.abs() <= angle_deg / 2.0
            }
            TemplateShape::Rect { width, height } => {
                point.x >= origin.x
                    && point.x <= origin.x + width
                    && point.y >= origin.y
                    && point.y <= origin.y + height
            }
            TemplateShape::Ray { length, width } => {
                // Project onto the ray axis; reject points beyond the ends
                // or further than half the width off-axis.
                let dir = direction_deg.to_radians();
                let (dx, dy) = (point.x - origin.x, point.y - origin.y);
                let along = dx * dir.cos() + dy * dir.sin();
                let across = -dx * dir.sin() + dy * dir.cos();
                (0.0..=length).contains(&along) && across.abs() <= width / 2.0
            }
        }
    }
}

/// Smallest signed difference between two angles in degrees.
fn angle_delta(a: f64, b: f64) -> f64 {
    let mut delta = (b - a) % 360.0;
    if delta > 180.0 {
        delta -= 360.0;
    } else if delta < -180.0 {
        delta += 360.0;
    }
    delta
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circle_contains() {
        let shape = TemplateShape::Circle { radius: 10.0 };
        let origin = Point::new(0.0, 0.0);
        assert!(shape.contains(origin, 0.0, Point::new(6.0, 8.0)));
        assert!(!shape.contains(origin, 0.0, Point::new(7.0, 8.0)));
    }

    #[test]
    fn test_cone_contains() {
        let shape = TemplateShape::Cone {
            length: 15.0,
            angle_deg: 60.0,
        };
        let origin = Point::new(0.0, 0.0);
        // Straight ahead (facing +x)
        assert!(shape.contains(origin, 0.0, Point::new(10.0, 0.0)));
        // Within the half-angle
        assert!(shape.contains(origin, 0.0, Point::new(10.0, 4.0)));
        // Outside the half-angle
        assert!(!shape.contains(origin, 0.0, Point::new(10.0, 10.0)));
        // Beyond the length
        assert!(!shape.contains(origin, 0.0, Point::new(20.0, 0.0)));
        // Wrap-around facing
        assert!(shape.contains(origin, 350.0, Point::new(10.0, -1.0)));
    }

    #[test]
    fn test_rect_contains() {
        let shape = TemplateShape::Rect {
            width: 10.0,
            height: 5.0,
        };
        let origin = Point::new(2.0, 2.0);
        assert!(shape.contains(origin, 0.0, Point::new(5.0, 4.0)));
        assert!(!shape.contains(origin, 0.0, Point::new(1.0, 4.0)));
        assert!(!shape.contains(origin, 0.0, Point::new(5.0, 8.0)));
    }

    #[test]
    fn test_ray_contains() {
        let shape = TemplateShape::Ray {
            length: 20.0,
            width: 4.0,
        };
        let origin = Point::new(0.0, 0.0);
        // Facing +y
        assert!(shape.contains(origin, 90.0, Point::new(0.0, 10.0)));
        assert!(shape.contains(origin, 90.0, Point::new(1.5, 10.0)));
        assert!(!shape.contains(origin, 90.0, Point::new(3.0, 10.0)));
        assert!(!shape.contains(origin, 90.0, Point::new(0.0, -1.0)));
    }
}
