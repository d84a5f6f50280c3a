use bevy::math::DVec3;

use crate::collision::Aabb;
use crate::math;
use crate::motion::MotionWriteSource;

use super::controller::PlayerController;

/// Push-out distance along the contact normal after each slide-move hit.
const SKIN: f64 = 0.006;
/// Maximum clip iterations per slide-move.
const SLIDE_MOVE_ITERATIONS: usize = 4;
/// Walls with |n.z| below this still clip as pure verticals while the
/// player is moving upward, preserving jump velocity.
const WALL_CLIP_MAX_NZ: f64 = 0.82;
const WALL_CLIP_MIN_NZ: f64 = -0.35;
/// Foot-disk radius fraction for accepting a downward probe hit as floor.
const FOOT_DISK_FRAC: f64 = 0.62;
/// Conservative center-foot support disk fraction.
const SUPPORT_DISK_FRAC: f64 = 0.52;
/// Near-level side grazes must land inside this tighter disk.
const CENTER_DISK_FRAC: f64 = 0.22;
/// Walkable-threshold relaxation while already grounded or sliding.
const GROUNDED_HYSTERESIS: f64 = 0.035;
/// Axis-resolve fallback: ignore almost-flat side overlaps below this.
const FLAT_SIDE_OVERLAP: f64 = 0.08;

impl PlayerController {
    fn player_aabb(&self) -> Aabb {
        Aabb::from_center_half(self.pos, self.player_half())
    }

    fn overlap(a: &Aabb, b: &Aabb) -> bool {
        let eps = 1e-4;
        a.min.x < (b.max.x - eps)
            && a.max.x > (b.min.x + eps)
            && a.min.y < (b.max.y - eps)
            && a.max.y > (b.min.y + eps)
            && a.min.z < (b.max.z - eps)
            && a.max.z > (b.min.z + eps)
    }

    fn is_walkable_ground_normal(&self, normal: DVec3, walkable_z: f64) -> bool {
        if normal.length_squared() <= math::EPSILON {
            return false;
        }
        let n = normal.normalize();
        if self.is_surf_normal(n) {
            return false;
        }
        n.z > walkable_z
    }

    /// A downward probe hit only counts as floor when the contact point sits
    /// inside the capsule foot disk; this keeps ledge grazes and decorative
    /// wall-base trims from classifying as ground.
    fn is_ground_contact_point_valid(&self, hit_pos: Option<DVec3>, start_pos: DVec3) -> bool {
        let Some(p) = hit_pos else {
            return true;
        };
        let radius = self.player_half().x;
        let dx = p.x - start_pos.x;
        let dy = p.y - start_pos.y;
        let max_xy = (radius * FOOT_DISK_FRAC).max(0.10);
        if dx * dx + dy * dy > max_xy * max_xy {
            return false;
        }
        let drop = start_pos.z - p.z;
        if drop < -1e-4 {
            return false;
        }
        let min_drop = (self.tuning.step_height * 0.08).clamp(0.0, 0.03);
        if drop < min_drop {
            let center_xy = (radius * CENTER_DISK_FRAC).max(0.04);
            if dx * dx + dy * dy > center_xy * center_xy {
                return false;
            }
        }
        let cdx = p.x - self.pos.x;
        let cdy = p.y - self.pos.y;
        let support_r = (radius * SUPPORT_DISK_FRAC).max(0.08);
        if cdx * cdx + cdy * cdy > support_r * support_r {
            return false;
        }
        true
    }

    /// 5 cardinal + 4 diagonal probe starts used to disambiguate stair and
    /// seam contacts the center probe misses.
    fn ground_probe_offsets(&self) -> [DVec3; 9] {
        let r = (self.player_half().x * 0.48).max(0.02);
        let d = r * 0.72;
        [
            DVec3::ZERO,
            DVec3::new(r, 0.0, 0.0),
            DVec3::new(-r, 0.0, 0.0),
            DVec3::new(0.0, r, 0.0),
            DVec3::new(0.0, -r, 0.0),
            DVec3::new(d, d, 0.0),
            DVec3::new(d, -d, 0.0),
            DVec3::new(-d, d, 0.0),
            DVec3::new(-d, -d, 0.0),
        ]
    }

    /// Lifted re-probe distance: clears immediate step faces without
    /// deepening the effective probe.
    fn ground_probe_lift_distance(&self) -> f64 {
        let step_h = self.tuning.step_height.max(0.0);
        (step_h * 0.33).clamp(0.02, 0.16)
    }

    fn find_walkable_ground_contact(&mut self, down: DVec3, walkable_z: f64) -> Option<(DVec3, f64)> {
        if self.collision.is_none() {
            return None;
        }
        let mut best: Option<(DVec3, f64)> = None;
        let base_drop_limit = down.z.abs().max(1e-6);
        for lift in [0.0, self.ground_probe_lift_distance()] {
            let query_down = DVec3::new(down.x, down.y, down.z - lift);
            let query_len = query_down.z.abs();
            if query_len <= 1e-8 {
                continue;
            }
            for off in self.ground_probe_offsets() {
                let mut start = self.pos + off;
                if lift > 0.0 {
                    start.z += lift;
                }
                let hit = self.sweep(start, start + query_down);
                if !hit.has_hit {
                    continue;
                }
                let n = math::normalize_or_zero(hit.normal);
                if !self.is_walkable_ground_normal(n, walkable_z) {
                    continue;
                }
                if !self.is_ground_contact_point_valid(hit.position, start) {
                    continue;
                }
                let frac = hit.fraction.clamp(0.0, 1.0);
                let drop = (query_len * frac - lift).max(0.0);
                if drop > base_drop_limit + 1e-5 {
                    continue;
                }
                if best.is_none_or(|(_, b)| drop < b) {
                    best = Some((n, drop));
                }
            }
        }
        best
    }

    /// Walkable threshold with mild hysteresis while grounded or sliding,
    /// to stop one-tick floor flicker on noisy slope contacts.
    pub(super) fn walkable_ground_threshold(&self) -> f64 {
        let threshold = math::walkable_threshold_z(self.tuning.max_ground_slope_deg);
        if self.grounded || self.slide_active {
            (threshold - GROUNDED_HYSTERESIS).max(0.05)
        } else {
            threshold
        }
    }

    /// Probe depth for ground classification and snapping. Grounded-style
    /// motion probes deeper so stair descent stays planted.
    fn ground_probe_distance(&self, for_snap: bool) -> f64 {
        let base = if for_snap {
            self.tuning.ground_snap_dist.max(0.0)
        } else {
            self.tuning.ground_snap_dist.max(0.06)
        };
        let step_h = self.tuning.step_height.max(0.0);
        let grounded_motion = self.grounded || self.slide_active;
        if for_snap {
            if grounded_motion {
                return base.max((step_h + base).min(0.70));
            }
            return base.max((step_h * 0.50 + base).min(0.45));
        }
        if grounded_motion {
            base.max((step_h * 0.75).max(base).min(0.70))
        } else {
            base.max((step_h * 0.45).max(base).min(0.45))
        }
    }

    /// Clip normal selection: while moving upward past a mostly-vertical
    /// wall, clip against its horizontal projection so the jump keeps its
    /// vertical component.
    fn choose_clip_normal(&self, normal: DVec3) -> DVec3 {
        let n = math::normalize_or_zero(normal);
        if !self.grounded
            && self.vel.z > 0.0
            && n.z.abs() < WALL_CLIP_MAX_NZ
            && n.z > WALL_CLIP_MIN_NZ
        {
            let wall_n = math::horizontal_unit(n);
            if wall_n.length_squared() > math::EPSILON {
                return wall_n;
            }
        }
        n
    }

    /// Pre-move downward probe classifying grounded state and latching the
    /// ground normal; falls back to the offset probe grid on misses.
    pub(super) fn trace_ground(&mut self) {
        let walkable_z = self.walkable_ground_threshold();
        let down = DVec3::new(0.0, 0.0, -self.ground_probe_distance(false));
        let hit = self.sweep(self.pos, self.pos + down);
        if !hit.has_hit {
            match self.find_walkable_ground_contact(down, walkable_z) {
                Some((normal, _)) => {
                    self.ground_normal = normal;
                    self.grounded = true;
                }
                None => self.grounded = false,
            }
            return;
        }

        let n = math::normalize_or_zero(hit.normal);
        if self.is_walkable_ground_normal(n, walkable_z)
            && self.is_ground_contact_point_valid(hit.position, self.pos)
        {
            self.ground_normal = n;
            self.grounded = true;
            return;
        }
        let surf_contact = self.is_surf_normal(n);
        if surf_contact {
            self.set_surf_contact(n);
        }
        if let Some((normal, _)) = self.find_walkable_ground_contact(down, walkable_z) {
            self.ground_normal = normal;
            self.grounded = true;
            return;
        }
        if surf_contact {
            self.grounded = false;
            return;
        }
        self.ground_normal = n;
        self.grounded = false;
    }

    /// Iterative Quake-style slide move: sweep, advance to contact, classify
    /// the plane, clip velocity, repeat against every plane seen so far.
    pub(super) fn slide_move(&mut self, delta: DVec3) {
        if delta.length_squared() <= math::EPSILON {
            return;
        }

        let mut pos = self.pos;
        let mut remaining = delta;
        let mut planes: Vec<DVec3> = Vec::with_capacity(SLIDE_MOVE_ITERATIONS + 1);
        let walkable_z = self.walkable_ground_threshold();

        for _ in 0..SLIDE_MOVE_ITERATIONS {
            if remaining.length_squared() <= 1e-10 {
                break;
            }

            let sweep_from = pos;
            let mv = remaining;
            let target = pos + mv;
            let hit = self.sweep(sweep_from, target);
            if !hit.has_hit {
                pos = target;
                break;
            }
            self.contact_count = self.contact_count.wrapping_add(1);

            let hit_frac = hit.fraction.clamp(0.0, 1.0);
            pos += mv * (hit_frac - 1e-4).max(0.0);

            let n = math::normalize_or_zero(hit.normal);
            planes.push(n);
            pos += n * SKIN;

            // Contact classification.
            if self.is_surf_normal(n) {
                self.set_surf_contact(n);
            } else if n.z > walkable_z
                && self.is_ground_contact_point_valid(hit.position, sweep_from)
            {
                self.grounded = true;
                self.ground_normal = n;
                if self.vel.z < 0.0 {
                    self.set_vertical_velocity(0.0, MotionWriteSource::Collision, "slide.floor_stop");
                }
            } else if n.z.abs() < 0.65 {
                let hit_pos = hit.position.unwrap_or(pos);
                if self.is_valid_wall_contact(hit_pos) {
                    self.set_wall_contact(math::horizontal(n), hit_pos);
                }
            } else if n.z < -0.65 && self.vel.z > 0.0 {
                self.set_vertical_velocity(0.0, MotionWriteSource::Collision, "slide.ceil_stop");
            }

            let clip_n = self.choose_clip_normal(n);
            if self.vel.dot(clip_n) < 0.0 {
                let clipped = math::clip_velocity(self.vel, clip_n, 1.0);
                self.set_velocity(clipped, MotionWriteSource::Collision, "slide.clip_hit");
            }
            let time_left = 1.0 - hit_frac;
            remaining = mv * time_left;
            if remaining.dot(clip_n) < 0.0 {
                remaining = math::clip_velocity(remaining, clip_n, 1.0);
            }

            // Multi-plane clip: stop any residual creep into planes already
            // touched this move (corner traps).
            if planes.len() > 1 {
                for i in 0..planes.len() - 1 {
                    let clip_p = self.choose_clip_normal(planes[i]);
                    if remaining.dot(clip_p) < 0.0 {
                        remaining = math::clip_velocity(remaining, clip_p, 1.0);
                    }
                    if self.vel.dot(clip_p) < 0.0 {
                        let clipped = math::clip_velocity(self.vel, clip_p, 1.0);
                        self.set_velocity(
                            clipped,
                            MotionWriteSource::Collision,
                            "slide.clip_multiplane",
                        );
                    }
                }
            }
        }

        self.pos = pos;
    }

    /// StepSlideMove: run the plain slide, then a lift-slide-drop attempt,
    /// and keep whichever made more progress along the intended direction.
    pub(super) fn step_slide_move(&mut self, delta: DVec3) {
        if delta.length_squared() <= math::EPSILON {
            return;
        }
        if !self.grounded {
            // No step-up in air, or vertical walls feel like ladders.
            self.slide_move(delta);
            return;
        }

        let start_pos = self.pos;
        let start_vel = self.vel;
        let start_grounded = self.grounded;

        self.slide_move(delta);
        let pos1 = self.pos;
        let vel1 = self.vel;
        let grounded1 = self.grounded;

        // Second attempt: step up, slide horizontally, step back down.
        self.pos = start_pos;
        self.set_velocity(start_vel, MotionWriteSource::Collision, "stepslide.reset_second_try");
        self.grounded = start_grounded;

        let step_up = DVec3::new(0.0, 0.0, self.tuning.step_height);
        let hit_up = self.sweep(self.pos, self.pos + step_up);
        if hit_up.has_hit {
            let up_frac = (hit_up.fraction - 1e-4).clamp(0.0, 1.0);
            self.pos += step_up * up_frac;
        } else {
            self.pos += step_up;
        }
        if self.pos.z - start_pos.z > 1e-6 {
            let horiz = math::horizontal(delta);
            self.slide_move(horiz);

            let step_down = DVec3::new(0.0, 0.0, -self.tuning.step_height - 0.01);
            let hit_down = self.sweep(self.pos, self.pos + step_down);
            if hit_down.has_hit {
                let frac = (hit_down.fraction - 1e-4).max(0.0);
                self.pos += step_down * frac;
            }
        }

        let pos2 = self.pos;
        let vel2 = self.vel;
        let grounded2 = self.grounded;

        let d1 = pos1 - start_pos;
        let d2 = pos2 - start_pos;
        let dist1 = d1.x * d1.x + d1.y * d1.y;
        let dist2 = d2.x * d2.x + d2.y * d2.y;
        let mut choose_plain = true;
        let intent = math::horizontal(delta);
        if intent.length_squared() > math::EPSILON {
            let intent = intent.normalize();
            let p1 = d1.dot(intent);
            let p2 = d2.dot(intent);
            let eps = 1e-6;
            if p2 > p1 + eps {
                choose_plain = false;
            } else if p1 > p2 + eps {
                choose_plain = true;
            } else if dist2 > dist1 + eps {
                choose_plain = false;
            } else if dist1 > dist2 + eps {
                choose_plain = true;
            } else {
                // Tie: prefer the attempt that kept the player grounded.
                choose_plain = !(grounded2 && !grounded1);
            }
        } else if dist2 > dist1 {
            choose_plain = false;
        }

        if choose_plain {
            self.pos = pos1;
            self.set_velocity(vel1, MotionWriteSource::Collision, "stepslide.choose_plain");
            self.grounded = grounded1;
        } else {
            self.pos = pos2;
            self.set_velocity(vel2, MotionWriteSource::Collision, "stepslide.choose_step");
            self.grounded = grounded2;
        }
    }

    /// Post-move descending glue: snap down onto walkable ground within the
    /// probe distance, zeroing any residual fall speed.
    pub(super) fn ground_snap(&mut self) {
        if self.vel.z > 0.0 {
            return;
        }

        let walkable_z = self.walkable_ground_threshold();
        let down_dist = self.ground_probe_distance(true);
        if down_dist <= 0.0 {
            return;
        }
        let down = DVec3::new(0.0, 0.0, -down_dist);
        let hit = self.sweep(self.pos, self.pos + down);
        let mut chosen: Option<(DVec3, f64)> = None;
        if hit.has_hit {
            let n = math::normalize_or_zero(hit.normal);
            if self.is_walkable_ground_normal(n, walkable_z)
                && self.is_ground_contact_point_valid(hit.position, self.pos)
            {
                let frac = hit.fraction.clamp(0.0, 1.0);
                chosen = Some((n, (down_dist * frac).max(0.0)));
            }
        }
        if chosen.is_none() {
            chosen = self.find_walkable_ground_contact(down, walkable_z);
        }
        let Some((normal, drop)) = chosen else {
            return;
        };

        let move_drop = (drop.min(down_dist) - 1e-4).max(0.0);
        let frac = move_drop / down_dist.max(1e-6);
        self.pos += down * frac;
        self.grounded = true;
        self.ground_normal = normal;
        if self.vel.z < 0.0 {
            self.set_vertical_velocity(0.0, MotionWriteSource::Collision, "ground_snap");
        }
    }

    /// Axis-resolve fallback against the plain AABB list, used when no
    /// sweep provider is installed.
    pub(super) fn move_and_collide(&mut self, delta: DVec3) {
        self.grounded = false;
        let max_component = delta.x.abs().max(delta.y.abs()).max(delta.z.abs());
        let steps = (max_component / 0.35).ceil().max(1.0) as usize;
        let step = delta / steps as f64;

        for _ in 0..steps {
            self.pos.x += step.x;
            self.resolve_axis(0, step.x);

            self.pos.y += step.y;
            self.resolve_axis(1, step.y);

            self.pos.z += step.z;
            self.resolve_axis(2, step.z);
        }
    }

    fn resolve_axis(&mut self, axis: usize, delta: f64) {
        if delta.abs() < 1e-7 {
            return;
        }

        let half = self.player_half();
        let mut paabb = self.player_aabb();
        for i in 0..self.aabbs.len() {
            let boxed = self.aabbs[i];
            if !Self::overlap(&paabb, &boxed) {
                continue;
            }
            self.contact_count = self.contact_count.wrapping_add(1);

            if axis != 2 {
                let z_overlap = paabb.max.z.min(boxed.max.z) - paabb.min.z.max(boxed.min.z);
                // Almost-flat contact is floor standing, not a side hit.
                if z_overlap <= FLAT_SIDE_OVERLAP {
                    continue;
                }
            }

            match axis {
                0 => {
                    if delta > 0.0 {
                        self.pos.x = boxed.min.x - half.x;
                        self.wall_normal = DVec3::NEG_X;
                    } else {
                        self.pos.x = boxed.max.x + half.x;
                        self.wall_normal = DVec3::X;
                    }
                    let y = self.vel.y;
                    self.set_horizontal_velocity(0.0, y, MotionWriteSource::Collision, "axis_resolve_x");
                    self.wall_contact_age = 0.0;
                }
                1 => {
                    if delta > 0.0 {
                        self.pos.y = boxed.min.y - half.y;
                        self.wall_normal = DVec3::NEG_Y;
                    } else {
                        self.pos.y = boxed.max.y + half.y;
                        self.wall_normal = DVec3::Y;
                    }
                    let x = self.vel.x;
                    self.set_horizontal_velocity(x, 0.0, MotionWriteSource::Collision, "axis_resolve_y");
                    self.wall_contact_age = 0.0;
                }
                _ => {
                    if delta > 0.0 {
                        self.pos.z = boxed.min.z - half.z;
                    } else {
                        self.pos.z = boxed.max.z + half.z;
                        self.grounded = true;
                        self.ground_normal = DVec3::Z;
                    }
                    self.set_vertical_velocity(0.0, MotionWriteSource::Collision, "axis_resolve_z");
                }
            }

            paabb = self.player_aabb();
        }
    }
}
