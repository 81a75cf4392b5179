//! Geometry
//!
//! Rectangles for host-reported element bounds and the viewport. The
//! engine uses these to drive reveal and intersect triggers; it does no
//! layout of its own.

/// Rectangle geometry
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    /// Create with dimensions
    pub fn from_xywh(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Right edge
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    /// Bottom edge
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Check if rects intersect
    pub fn intersects(&self, other: &Rect) -> bool {
        !(self.right() < other.x
            || self.x > other.right()
            || self.bottom() < other.y
            || self.y > other.bottom())
    }

    /// Intersection rect, if any
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        if !self.intersects(other) {
            return None;
        }
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        Some(Rect::from_xywh(x, y, right - x, bottom - y))
    }

    /// Fraction of this rect's area covered by the other rect (0.0..=1.0)
    pub fn visible_ratio(&self, viewport: &Rect) -> f64 {
        let area = self.width * self.height;
        if area <= 0.0 {
            // zero-sized rects count as fully visible when they intersect
            return if viewport.intersects(self) { 1.0 } else { 0.0 };
        }
        match self.intersection(viewport) {
            Some(overlap) => (overlap.width * overlap.height) / area,
            None => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersects() {
        let vp = Rect::from_xywh(0.0, 0.0, 100.0, 100.0);
        assert!(vp.intersects(&Rect::from_xywh(10.0, 10.0, 20.0, 20.0)));
        assert!(vp.intersects(&Rect::from_xywh(-10.0, -10.0, 20.0, 20.0)));
        assert!(!vp.intersects(&Rect::from_xywh(200.0, 200.0, 20.0, 20.0)));
    }

    #[test]
    fn test_visible_ratio() {
        let vp = Rect::from_xywh(0.0, 0.0, 100.0, 100.0);
        let half_in = Rect::from_xywh(50.0, 0.0, 100.0, 100.0);
        assert!((half_in.visible_ratio(&vp) - 0.5).abs() < 1e-9);

        let inside = Rect::from_xywh(10.0, 10.0, 10.0, 10.0);
        assert!((inside.visible_ratio(&vp) - 1.0).abs() < 1e-9);

        let outside = Rect::from_xywh(500.0, 500.0, 10.0, 10.0);
        assert_eq!(outside.visible_ratio(&vp), 0.0);
    }
}
