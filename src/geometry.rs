/// Planar geometry in image pixel space
///
/// `x` is the column and `y` is the row, so angles run from +x towards +y
/// (clockwise on screen).
use nalgebra::Matrix2;
use serde::{Deserialize, Serialize};

/// Below this |sin| between two directions, lines are treated as parallel
const PARALLEL_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Point at `radius` from `center` in direction `angle` (radians)
    pub fn from_polar(center: Point, radius: f64, angle: f64) -> Self {
        Self {
            x: center.x + radius * angle.cos(),
            y: center.y + radius * angle.sin(),
        }
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Scale pixel coordinates to millimetres
    pub fn to_mm(&self, pixel_size_mm: f64) -> Point {
        Point::new(self.x * pixel_size_mm, self.y * pixel_size_mm)
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.2}, {:.2})", self.x, self.y)
    }
}

impl std::str::FromStr for Point {
    type Err = String;

    /// Parses `"x,y"`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (x, y) = s
            .split_once(',')
            .ok_or_else(|| format!("Expected X,Y but got: {}", s))?;
        let x = x
            .trim()
            .parse::<f64>()
            .map_err(|e| format!("Invalid x coordinate '{}': {}", x, e))?;
        let y = y
            .trim()
            .parse::<f64>()
            .map_err(|e| format!("Invalid y coordinate '{}': {}", y, e))?;
        Ok(Point::new(x, y))
    }
}

/// Infinite line through `point` along the unit vector `direction`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub point: Point,
    pub direction: [f64; 2],
}

impl Line {
    /// Line through `point` at `angle` radians from the +x axis
    pub fn from_angle(point: Point, angle: f64) -> Self {
        Self {
            point,
            direction: [angle.cos(), angle.sin()],
        }
    }

    /// Line through two distinct points
    pub fn through(a: Point, b: Point) -> Option<Self> {
        let dx = b.x - a.x;
        let dy = b.y - a.y;
        let len = dx.hypot(dy);
        if len <= f64::EPSILON {
            return None;
        }
        Some(Self {
            point: a,
            direction: [dx / len, dy / len],
        })
    }

    /// Unit normal, rotated +90 degrees from the direction
    pub fn normal(&self) -> [f64; 2] {
        [-self.direction[1], self.direction[0]]
    }

    /// Direction angle folded into [0, pi)
    pub fn angle(&self) -> f64 {
        let a = self.direction[1].atan2(self.direction[0]);
        a.rem_euclid(std::f64::consts::PI)
    }

    /// Signed perpendicular distance, positive on the normal side
    pub fn signed_distance(&self, p: &Point) -> f64 {
        let n = self.normal();
        n[0] * (p.x - self.point.x) + n[1] * (p.y - self.point.y)
    }

    pub fn distance_to(&self, p: &Point) -> f64 {
        self.signed_distance(p).abs()
    }

    /// Offset of the line from the origin along its normal (`n . p = c`)
    pub fn offset(&self) -> f64 {
        let n = self.normal();
        n[0] * self.point.x + n[1] * self.point.y
    }

    pub fn intersection(&self, other: &Line) -> Option<Point> {
        let d1 = self.direction;
        let d2 = other.direction;
        let cross = d1[0] * d2[1] - d1[1] * d2[0];
        if cross.abs() < PARALLEL_EPSILON {
            return None;
        }
        let wx = other.point.x - self.point.x;
        let wy = other.point.y - self.point.y;
        let t = (wx * d2[1] - wy * d2[0]) / cross;
        Some(Point::new(
            self.point.x + t * d1[0],
            self.point.y + t * d1[1],
        ))
    }
}

/// Total least squares fit of a line to `points`.
///
/// Minimizes perpendicular residuals, so near-vertical spokes fit as well as
/// horizontal ones. Returns the line and the RMS perpendicular residual, or
/// `None` when the points do not span a direction.
pub fn fit_line(points: &[Point]) -> Option<(Line, f64)> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let cx = points.iter().map(|p| p.x).sum::<f64>() / n;
    let cy = points.iter().map(|p| p.y).sum::<f64>() / n;

    let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
    for p in points {
        let dx = p.x - cx;
        let dy = p.y - cy;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }

    let eigen = Matrix2::new(sxx, sxy, sxy, syy).symmetric_eigen();
    let (major, minor) = if eigen.eigenvalues[0] >= eigen.eigenvalues[1] {
        (0, 1)
    } else {
        (1, 0)
    };
    if eigen.eigenvalues[major] <= f64::EPSILON {
        return None;
    }

    let axis = eigen.eigenvectors.column(major);
    let len = axis[0].hypot(axis[1]);
    let line = Line {
        point: Point::new(cx, cy),
        direction: [axis[0] / len, axis[1] / len],
    };
    let rms = (eigen.eigenvalues[minor].max(0.0) / n).sqrt();
    Some((line, rms))
}

/// Intersections of every non-parallel pair of lines
pub fn pairwise_intersections(lines: &[Line]) -> Vec<Point> {
    let mut points = Vec::new();
    for (i, a) in lines.iter().enumerate() {
        for b in &lines[i + 1..] {
            if let Some(p) = a.intersection(b) {
                points.push(p);
            }
        }
    }
    points
}

fn cross(o: &Point, a: &Point, b: &Point) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Convex hull in counter-clockwise order (monotone chain)
pub fn convex_hull(points: &[Point]) -> Vec<Point> {
    let mut pts = points.to_vec();
    pts.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }

    let mut lower: Vec<Point> = Vec::new();
    for p in &pts {
        while lower.len() >= 2 && cross(&lower[lower.len() - 2], &lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(*p);
    }
    let mut upper: Vec<Point> = Vec::new();
    for p in pts.iter().rev() {
        while upper.len() >= 2 && cross(&upper[upper.len() - 2], &upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(*p);
    }
    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

fn distance_to_segment(p: &Point, a: &Point, b: &Point) -> f64 {
    let abx = b.x - a.x;
    let aby = b.y - a.y;
    let len2 = abx * abx + aby * aby;
    if len2 <= f64::EPSILON {
        return p.distance_to(a);
    }
    let t = (((p.x - a.x) * abx + (p.y - a.y) * aby) / len2).clamp(0.0, 1.0);
    p.distance_to(&Point::new(a.x + t * abx, a.y + t * aby))
}

/// Distance from `p` to a convex hull, zero when `p` is inside it
pub fn distance_outside_hull(hull: &[Point], p: &Point) -> f64 {
    match hull.len() {
        0 => f64::INFINITY,
        1 => p.distance_to(&hull[0]),
        2 => distance_to_segment(p, &hull[0], &hull[1]),
        n => {
            let inside = (0..n).all(|i| cross(&hull[i], &hull[(i + 1) % n], p) >= 0.0);
            if inside {
                0.0
            } else {
                (0..n)
                    .map(|i| distance_to_segment(p, &hull[i], &hull[(i + 1) % n]))
                    .fold(f64::INFINITY, f64::min)
            }
        }
    }
}

/// Smallest absolute difference between two angles (radians)
pub fn angular_distance(a: f64, b: f64) -> f64 {
    let tau = std::f64::consts::TAU;
    let d = (a - b).rem_euclid(tau);
    d.min(tau - d)
}
