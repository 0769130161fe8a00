/// Wobble circle: the smallest circle that touches every spoke line
///
/// This is a min-max location problem over lines. The center minimizing the
/// largest perpendicular distance to any line is found with a Nelder-Mead
/// simplex search, then polished over the lines that end up touching the
/// circle (the optimum is equidistant from two or three of them).
use crate::config::StarshotConfig;
use crate::error::{Result, StarshotError};
use crate::geometry::{convex_hull, distance_outside_hull, pairwise_intersections, Line, Point};
use nalgebra::{Matrix3, Vector3};
use serde::Serialize;
use tracing::debug;

/// At most this many touching lines are combined during polishing
const MAX_ACTIVE_LINES: usize = 12;
const MAX_RESTARTS: usize = 6;

#[derive(Debug, Clone, Serialize)]
pub struct WobbleResult {
    pub center: Point,
    /// Radius in pixels
    pub radius: f64,
    /// Simplex iterations spent
    pub iterations: usize,
    /// Indices of the lines touching the circle
    pub supporting_lines: Vec<usize>,
}

/// Largest perpendicular distance from `p` to any of `lines`
pub fn max_distance(lines: &[Line], p: &Point) -> f64 {
    lines
        .iter()
        .map(|l| l.distance_to(p))
        .fold(0.0, f64::max)
}

/// Minimum enclosing circle search over a set of lines
#[derive(Debug, Clone)]
pub struct WobbleSolver {
    pub max_iterations: usize,
    /// Convergence threshold on both objective spread and simplex size (pixels)
    pub tolerance: f64,
}

impl Default for WobbleSolver {
    fn default() -> Self {
        Self {
            max_iterations: 2000,
            tolerance: 1e-9,
        }
    }
}

impl WobbleSolver {
    pub fn from_config(config: &StarshotConfig) -> Self {
        Self {
            max_iterations: config.max_solver_iterations,
            tolerance: config.solver_tolerance,
        }
    }

    /// Solve from the centroid of the pairwise line intersections
    pub fn solve(&self, lines: &[Line]) -> Result<WobbleResult> {
        self.solve_inner(lines, None)
    }

    /// Solve starting the search at `seed`
    pub fn solve_from(&self, lines: &[Line], seed: Point) -> Result<WobbleResult> {
        self.solve_inner(lines, Some(seed))
    }

    fn solve_inner(&self, lines: &[Line], seed: Option<Point>) -> Result<WobbleResult> {
        if lines.len() < 2 {
            return Err(StarshotError::Geometry(format!(
                "at least 2 lines are required, got {}",
                lines.len()
            )));
        }
        let intersections = pairwise_intersections(lines);
        if intersections.is_empty() {
            return Err(StarshotError::Geometry(
                "all lines are parallel; no bounded wobble circle".to_string(),
            ));
        }

        let n = intersections.len() as f64;
        let centroid = Point::new(
            intersections.iter().map(|p| p.x).sum::<f64>() / n,
            intersections.iter().map(|p| p.y).sum::<f64>() / n,
        );
        let start = seed.unwrap_or(centroid);
        let spread = intersections
            .iter()
            .map(|p| p.distance_to(&centroid))
            .fold(0.0, f64::max);

        let objective = |p: [f64; 2]| max_distance(lines, &Point::new(p[0], p[1]));

        let mut best = [start.x, start.y];
        let mut best_value = objective(best);
        let mut step = spread.max(start.distance_to(&centroid)).max(1.0);
        let mut iterations = 0;

        for _ in 0..MAX_RESTARTS {
            let budget = self.max_iterations.saturating_sub(iterations);
            if budget == 0 {
                break;
            }
            let (point, value, used) = nelder_mead(&objective, best, step, budget, self.tolerance);
            iterations += used;
            let improvement = best_value - value;
            if value < best_value {
                best = point;
                best_value = value;
            }
            if improvement <= self.tolerance {
                break;
            }
            step = (step * 0.1).max(self.tolerance * 10.0);
        }
        debug!(
            "simplex search: max distance {:.6} px after {} iterations",
            best_value, iterations
        );

        let (mut center, mut radius) = polish(lines, Point::new(best[0], best[1]), best_value);

        let hull = convex_hull(&intersections);
        let slack = 1e-6 * (1.0 + spread) + 1e3 * self.tolerance;
        if distance_outside_hull(&hull, &center) > slack {
            // With parallel supporting lines the optimum is a segment and the
            // search may stop anywhere on it. Move along the optimal set
            // toward the intersection centroid, which lies inside the hull.
            let limit = radius + 1e-9 * (1.0 + radius) + self.tolerance;
            center = slide_toward(lines, center, centroid, limit);
            radius = max_distance(lines, &center);
            debug!("optimum not unique, moved center to {}", center);
        }
        let outside = distance_outside_hull(&hull, &center);
        if outside > slack {
            return Err(StarshotError::Geometry(format!(
                "wobble center {} lies {:.3} px outside the line intersection cluster",
                center, outside
            )));
        }

        let touch = radius - 1e-6 * (1.0 + radius);
        let supporting_lines = lines
            .iter()
            .enumerate()
            .filter(|(_, l)| l.distance_to(&center) >= touch)
            .map(|(i, _)| i)
            .collect();

        Ok(WobbleResult {
            center,
            radius,
            iterations,
            supporting_lines,
        })
    }
}

/// Furthest point from `from` toward `to` whose largest line distance stays
/// within `limit`. The sublevel set is convex, so bisection on the segment
/// finds its edge.
fn slide_toward(lines: &[Line], from: Point, to: Point, limit: f64) -> Point {
    let at = |t: f64| Point::new(from.x + t * (to.x - from.x), from.y + t * (to.y - from.y));
    if max_distance(lines, &to) <= limit {
        return to;
    }
    let (mut lo, mut hi) = (0.0, 1.0);
    for _ in 0..60 {
        let mid = (lo + hi) / 2.0;
        if max_distance(lines, &at(mid)) <= limit {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    at(lo)
}

/// Downhill simplex over two variables. Returns the best vertex, its value
/// and the number of iterations used.
fn nelder_mead<F>(f: &F, start: [f64; 2], step: f64, max_iterations: usize, tolerance: f64) -> ([f64; 2], f64, usize)
where
    F: Fn([f64; 2]) -> f64,
{
    let mut simplex = [
        start,
        [start[0] + step, start[1]],
        [start[0], start[1] + step],
    ];
    let mut values = simplex.map(|p| f(p));

    let lerp = |a: [f64; 2], b: [f64; 2], t: f64| [a[0] + t * (b[0] - a[0]), a[1] + t * (b[1] - a[1])];

    let mut iterations = 0;
    while iterations < max_iterations {
        // Order best .. worst
        let mut order = [0usize, 1, 2];
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        simplex = order.map(|i| simplex[i]);
        values = order.map(|i| values[i]);

        let size = (1..3)
            .map(|i| (simplex[i][0] - simplex[0][0]).hypot(simplex[i][1] - simplex[0][1]))
            .fold(0.0, f64::max);
        if values[2] - values[0] <= tolerance && size <= tolerance {
            break;
        }
        iterations += 1;

        let centroid = lerp(simplex[0], simplex[1], 0.5);
        let worst = simplex[2];

        let reflected = lerp(centroid, worst, -1.0);
        let fr = f(reflected);

        if fr < values[0] {
            let expanded = lerp(centroid, worst, -2.0);
            let fe = f(expanded);
            if fe < fr {
                simplex[2] = expanded;
                values[2] = fe;
            } else {
                simplex[2] = reflected;
                values[2] = fr;
            }
            continue;
        }
        if fr < values[1] {
            simplex[2] = reflected;
            values[2] = fr;
            continue;
        }

        let (contracted, accept) = if fr < values[2] {
            let c = lerp(centroid, reflected, 0.5);
            let fc = f(c);
            (c, (fc <= fr).then_some(fc))
        } else {
            let c = lerp(centroid, worst, 0.5);
            let fc = f(c);
            (c, (fc < values[2]).then_some(fc))
        };
        if let Some(fc) = accept {
            simplex[2] = contracted;
            values[2] = fc;
            continue;
        }

        // Shrink towards the best vertex
        for i in 1..3 {
            simplex[i] = lerp(simplex[0], simplex[i], 0.5);
            values[i] = f(simplex[i]);
        }
    }

    let best = (0..3)
        .min_by(|&a, &b| values[a].total_cmp(&values[b]))
        .unwrap_or(0);
    (simplex[best], values[best], iterations)
}

/// Exact optimum over the lines touching the approximate circle.
///
/// Candidates are points equidistant from three touching lines (every sign
/// combination) and intersections of two touching lines; the one with the
/// smallest true max distance wins if it beats the simplex result.
fn polish(lines: &[Line], approx: Point, approx_value: f64) -> (Point, f64) {
    let band = 1e-4 * (1.0 + approx_value);
    let mut active: Vec<(usize, f64)> = lines
        .iter()
        .enumerate()
        .map(|(i, l)| (i, l.distance_to(&approx)))
        .filter(|(_, d)| *d >= approx_value - band)
        .collect();
    active.sort_by(|a, b| b.1.total_cmp(&a.1));
    active.truncate(MAX_ACTIVE_LINES);
    let active: Vec<&Line> = active.iter().map(|(i, _)| &lines[*i]).collect();

    let mut best = (approx, approx_value);
    let mut consider = |p: Point| {
        if p.x.is_finite() && p.y.is_finite() {
            let value = max_distance(lines, &p);
            if value < best.1 {
                best = (p, value);
            }
        }
    };

    for (i, a) in active.iter().enumerate() {
        for b in &active[i + 1..] {
            if let Some(p) = a.intersection(b) {
                consider(p);
            }
        }
    }

    for i in 0..active.len() {
        for j in i + 1..active.len() {
            for k in j + 1..active.len() {
                for signs in [[1.0, 1.0], [1.0, -1.0], [-1.0, 1.0], [-1.0, -1.0]] {
                    let rows = [(active[i], 1.0), (active[j], signs[0]), (active[k], signs[1])];
                    let mut m = Matrix3::zeros();
                    let mut rhs = Vector3::zeros();
                    for (r, (line, s)) in rows.iter().enumerate() {
                        let n = line.normal();
                        m[(r, 0)] = s * n[0];
                        m[(r, 1)] = s * n[1];
                        m[(r, 2)] = -1.0;
                        rhs[r] = s * line.offset();
                    }
                    if let Some(sol) = m.lu().solve(&rhs) {
                        consider(Point::new(sol[0], sol[1]));
                    }
                }
            }
        }
    }

    best
}
