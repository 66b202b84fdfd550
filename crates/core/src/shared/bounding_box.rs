use std::fmt;

/// Axis-aligned box in image pixel coordinates, `(x, y)` being the top-left
/// corner.
///
/// No invariant is enforced: detections may be degenerate, non-finite, or lie
/// partly or entirely outside the frame. [`BoundingBox::clip_to`] is the
/// single place where such boxes are rejected.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Integer corner pair of a non-empty region inside a frame.
///
/// `x2`/`y2` are exclusive, so the region spans `x1..x2` by `y1..y2`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRect {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl PixelRect {
    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_tlwh(tlwh: [f64; 4]) -> Self {
        Self::new(tlwh[0], tlwh[1], tlwh[2], tlwh[3])
    }

    pub fn to_tlwh(&self) -> [f64; 4] {
        [self.x, self.y, self.width, self.height]
    }

    /// Corners as `[x1, y1, x2, y2]`.
    pub fn to_tlbr(&self) -> [f64; 4] {
        [self.x, self.y, self.x + self.width, self.y + self.height]
    }

    /// Re-derives the width from the height so that `width / height ==
    /// aspect`, keeping the horizontal center fixed. Height is never touched.
    pub fn with_aspect_ratio(&self, aspect: f64) -> Self {
        let new_width = aspect * self.height;
        Self {
            x: self.x - (new_width - self.width) / 2.0,
            width: new_width,
            ..*self
        }
    }

    /// Truncates the corners toward zero and clips them to a
    /// `frame_width` × `frame_height` frame.
    ///
    /// The far corner is clamped to `dimension - 1`, so the last row and
    /// column of the frame are never part of a crop. Returns `None` when the
    /// result is empty in either axis, which covers zero or negative sizes,
    /// boxes entirely off-frame and non-finite coordinates.
    pub fn clip_to(&self, frame_width: u32, frame_height: u32) -> Option<PixelRect> {
        let corners = self.to_tlbr();
        if corners.iter().any(|c| !c.is_finite()) {
            return None;
        }
        let [x1, y1, x2, y2] = corners.map(|c| c.trunc() as i64);

        let x1 = x1.max(0);
        let y1 = y1.max(0);
        let x2 = x2.min(frame_width as i64 - 1);
        let y2 = y2.min(frame_height as i64 - 1);
        if x1 >= x2 || y1 >= y2 {
            return None;
        }

        // All four values now lie in 0..dimension.
        Some(PixelRect {
            x1: x1 as u32,
            y1: y1 as u32,
            x2: x2 as u32,
            y2: y2 as u32,
        })
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.x, self.y, self.width, self.height
        )
    }
}
