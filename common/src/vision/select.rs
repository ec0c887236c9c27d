use tracing::debug;

use crate::geometry::Contour;

/// Pick the largest contour whose area is at least `min_area`.
///
/// The running maximum starts at zero and only moves on a strictly larger
/// area, so the first of several equally large contours wins and a
/// zero-area contour is never chosen.
pub fn find_max(contours: &[Contour], min_area: f64) -> Option<&Contour> {
    let mut max = 0.0;
    let mut selected = None;

    for (index, contour) in contours.iter().enumerate() {
        let area = contour.area();
        if area < min_area {
            debug!(index, area, min_area, "contour below minimum area");
            continue;
        }
        if area > max {
            max = area;
            selected = Some(contour);
        }
    }

    if selected.is_some() {
        debug!(area = max, candidates = contours.len(), "largest contour selected");
    }
    selected
}
