use imageproc::geometry::contour_area;

/// Integer pixel coordinate, as traced by `imageproc::contours`.
pub type Point = imageproc::point::Point<i32>;

/// Axis-aligned box covering a region, in pixels. `width`/`height` count
/// pixels, so a single-pixel region is 1x1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> (f64, f64) {
        (
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }
}

/// Border of one connected region of the difference mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contour {
    pub points: Vec<Point>,
}

impl Contour {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// Area enclosed by the border polygon. Fewer than three points enclose
    /// nothing.
    pub fn area(&self) -> f64 {
        contour_area(&self.points)
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        let first = self.points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &self.points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(BoundingBox::new(
            min_x,
            min_y,
            (max_x - min_x + 1) as u32,
            (max_y - min_y + 1) as u32,
        ))
    }
}

#[cfg(test)]
pub(crate) fn rect_contour(x: i32, y: i32, w: i32, h: i32) -> Contour {
    Contour::new(vec![
        Point::new(x, y),
        Point::new(x + w, y),
        Point::new(x + w, y + h),
        Point::new(x, y + h),
    ])
}
