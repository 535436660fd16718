//! Track geometry: the waypoint polyline an episode drives along.
//!
//! Spawn-point loading and coordinate conversion are the caller's concern;
//! this module only works with an already-built sequence of 3D waypoints.
//! The polyline is parameterized by arc length, which gives the two
//! quantities the rest of the crate needs: how far along the track a
//! location has progressed, and how far it still has to go.

/// Waypoint polyline parameterized by arc length.
#[derive(Debug, Clone)]
pub struct Track {
    points: Vec<[f32; 3]>,
    /// Arc length at each waypoint, `cumulative[0] == 0.0`.
    cumulative: Vec<f32>,
}

fn sub(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn dot(a: [f32; 3], b: [f32; 3]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn norm(a: [f32; 3]) -> f32 {
    dot(a, a).sqrt()
}

impl Track {
    /// Build a track from an ordered waypoint sequence.
    ///
    /// Requires at least two waypoints.
    pub fn new(points: Vec<[f32; 3]>) -> Self {
        assert!(points.len() >= 2, "track needs at least two waypoints");

        let mut cumulative = Vec::with_capacity(points.len());
        let mut total = 0.0;
        cumulative.push(0.0);
        for pair in points.windows(2) {
            total += norm(sub(pair[1], pair[0]));
            cumulative.push(total);
        }

        Self { points, cumulative }
    }

    /// Number of waypoints.
    pub fn n_points(&self) -> usize {
        self.points.len()
    }

    /// Waypoint at the given index.
    pub fn point(&self, idx: usize) -> [f32; 3] {
        self.points[idx]
    }

    /// Total arc length of the track.
    pub fn total_length(&self) -> f32 {
        *self.cumulative.last().unwrap_or(&0.0)
    }

    /// Initial heading (radians in the XY plane) at the first waypoint.
    pub fn initial_yaw(&self) -> f32 {
        let d = sub(self.points[1], self.points[0]);
        d[1].atan2(d[0])
    }

    /// Arc length of the closest point on the polyline to `location`.
    pub fn project(&self, location: [f32; 3]) -> f32 {
        let mut best_dist = f32::INFINITY;
        let mut best_s = 0.0;

        for (i, pair) in self.points.windows(2).enumerate() {
            let seg = sub(pair[1], pair[0]);
            let seg_len_sq = dot(seg, seg);
            let t = if seg_len_sq > 0.0 {
                (dot(sub(location, pair[0]), seg) / seg_len_sq).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let closest = [
                pair[0][0] + seg[0] * t,
                pair[0][1] + seg[1] * t,
                pair[0][2] + seg[2] * t,
            ];
            let dist = norm(sub(location, closest));
            if dist < best_dist {
                best_dist = dist;
                best_s = self.cumulative[i] + (self.cumulative[i + 1] - self.cumulative[i]) * t;
            }
        }

        best_s
    }

    /// Perpendicular distance from `location` to the polyline.
    pub fn cross_track_distance(&self, location: [f32; 3]) -> f32 {
        let mut best = f32::INFINITY;
        for pair in self.points.windows(2) {
            let seg = sub(pair[1], pair[0]);
            let seg_len_sq = dot(seg, seg);
            let t = if seg_len_sq > 0.0 {
                (dot(sub(location, pair[0]), seg) / seg_len_sq).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let closest = [
                pair[0][0] + seg[0] * t,
                pair[0][1] + seg[1] * t,
                pair[0][2] + seg[2] * t,
            ];
            best = best.min(norm(sub(location, closest)));
        }
        best
    }

    /// Remaining arc length from `location` to the final waypoint.
    pub fn remaining(&self, location: [f32; 3]) -> f32 {
        self.total_length() - self.project(location)
    }

    /// Point on the polyline at arc length `s` (clamped to the track).
    pub fn point_at(&self, s: f32) -> [f32; 3] {
        let s = s.clamp(0.0, self.total_length());
        for (i, pair) in self.points.windows(2).enumerate() {
            if s <= self.cumulative[i + 1] {
                let seg_len = self.cumulative[i + 1] - self.cumulative[i];
                let t = if seg_len > 0.0 {
                    (s - self.cumulative[i]) / seg_len
                } else {
                    0.0
                };
                let seg = sub(pair[1], pair[0]);
                return [
                    pair[0][0] + seg[0] * t,
                    pair[0][1] + seg[1] * t,
                    pair[0][2] + seg[2] * t,
                ];
            }
        }
        self.points[self.points.len() - 1]
    }

    /// Offset from `location` to the point `lookahead` meters further
    /// along the track. Feeds the controller's steering target.
    pub fn target_offset(&self, location: [f32; 3], lookahead: f32) -> [f32; 3] {
        let target = self.point_at(self.project(location) + lookahead);
        sub(target, location)
    }
}
