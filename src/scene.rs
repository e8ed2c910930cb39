use crate::background::Backdrop;
use crate::error::{BeatreelError, BeatreelResult};
use crate::storyboard::Shot;

/// One rendered frame: opaque RGBA8, row-major, `width * height * 4` bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameRGBA {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Character rest height above the ground plane.
const BASE_HEIGHT: f64 = 1.2;
/// Extra vertical offset applied while a beat is near.
const BOUNCE_OFFSET: f64 = 0.35;
/// A beat within this many seconds of `t` triggers the bounce.
const BEAT_WINDOW_SECONDS: f64 = 0.12;
const YAW_RATE: f64 = 0.7;
const YAW_AMPLITUDE: f64 = 0.25;

const HEAD_RADIUS: f64 = 0.9;
const RING_INNER_RADIUS: f64 = 0.55;
const RING_OUTER_RADIUS: f64 = 0.85;
/// Halo height above the top of the head.
const RING_LIFT: f64 = 0.25;

const HEAD_COLOR: [f64; 3] = [30.0, 203.0, 99.0];
const RING_COLOR: [f64; 3] = [212.0, 175.0, 55.0];
const GROUND_COLOR: [f64; 3] = [15.0, 21.0, 34.0];
const CLEAR_COLOR: [u8; 4] = [11, 15, 25, 255];

/// Backdrop plane, world units: z = -10, x in [-20, 20], y in [-1, 21].
const BACKDROP_Z: f64 = -10.0;
const BACKDROP_HALF_WIDTH: f64 = 20.0;
const BACKDROP_BOTTOM: f64 = -1.0;
const BACKDROP_HEIGHT: f64 = 22.0;

/// Ground plane, world units: y = 0, x in [-15, 15], z in [-10, 10].
const GROUND_HALF_WIDTH: f64 = 15.0;
const GROUND_HALF_DEPTH: f64 = 10.0;

/// Per-frame mutable scene state. Exactly one writer: the render loop that
/// calls [`SceneAnimator::tick`].
#[derive(Clone, Debug, PartialEq)]
pub struct SceneState {
    pub shot_index: usize,
    pub fov_degrees: f64,
    pub yaw: f64,
    pub character_height: f64,
    pub on_beat: bool,
}

impl Default for SceneState {
    fn default() -> Self {
        Self {
            shot_index: 0,
            fov_degrees: 65.0,
            yaw: 0.0,
            character_height: BASE_HEIGHT,
            on_beat: false,
        }
    }
}

/// Owns the 3D scene graph (camera, lights, ground, backdrop, character) and
/// advances it per frame from explicit elapsed playback time.
///
/// `tick` and `render` are split so the loop driver passes time in as a
/// parameter; nothing in here touches a display surface or a wall clock,
/// which keeps the animator deterministic and headless-testable.
#[derive(Debug)]
pub struct SceneAnimator {
    duration_seconds: f64,
    beats: Vec<f64>,
    shots: Vec<Shot>,
    backdrops: Vec<Backdrop>,
    state: SceneState,
}

impl SceneAnimator {
    pub fn new(
        duration_seconds: f64,
        beats: Vec<f64>,
        shots: Vec<Shot>,
        backdrops: Vec<Backdrop>,
    ) -> BeatreelResult<Self> {
        if shots.is_empty() {
            return Err(BeatreelError::validation("scene requires at least one shot"));
        }
        if backdrops.len() != shots.len() {
            return Err(BeatreelError::validation(format!(
                "backdrop count {} does not match shot count {}",
                backdrops.len(),
                shots.len()
            )));
        }
        if !(duration_seconds > 0.0) {
            return Err(BeatreelError::validation("duration must be positive"));
        }
        Ok(Self {
            duration_seconds,
            beats,
            shots,
            backdrops,
            state: SceneState::default(),
        })
    }

    pub fn state(&self) -> &SceneState {
        &self.state
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    /// Advance the scene to elapsed playback time `t`.
    pub fn tick(&mut self, t: f64) -> &SceneState {
        let raw = ((t / self.duration_seconds) * self.shots.len() as f64).floor();
        let idx = (raw.max(0.0) as usize).min(self.shots.len() - 1);

        let on_beat = self
            .beats
            .iter()
            .any(|b| (b - t).abs() < BEAT_WINDOW_SECONDS);

        self.state.shot_index = idx;
        self.state.fov_degrees = self.shots[idx].camera.fov_degrees();
        self.state.yaw = (t * YAW_RATE).sin() * YAW_AMPLITUDE;
        self.state.on_beat = on_beat;
        self.state.character_height = BASE_HEIGHT + if on_beat { BOUNCE_OFFSET } else { 0.0 };
        &self.state
    }

    /// Render the current state into an opaque RGBA frame.
    ///
    /// Plain per-pixel ray casting against the four scene bodies (head
    /// sphere, halo annulus, ground plane, backdrop plane) with two-term
    /// Lambert shading. Deterministic for identical state.
    pub fn render(&self, width: u32, height: u32) -> FrameRGBA {
        let eye = Vec3::new(0.0, 6.0, 10.0);
        let target = Vec3::new(0.0, 1.5, 0.0);
        let forward = target.sub(eye).normalize();
        let right = forward.cross(Vec3::new(0.0, 1.0, 0.0)).normalize();
        let up = right.cross(forward);

        let half_v = (self.state.fov_degrees.to_radians() * 0.5).tan();
        let aspect = f64::from(width) / f64::from(height.max(1));
        let light = Vec3::new(3.0, 4.0, 2.0).normalize();
        let backdrop = &self.backdrops[self.state.shot_index];

        let head_center = Vec3::new(0.0, self.state.character_height + HEAD_RADIUS, 0.0);
        let ring_y = self.state.character_height + 2.0 * HEAD_RADIUS + RING_LIFT;

        let mut data = vec![0u8; (width * height * 4) as usize];
        for py in 0..height {
            for px in 0..width {
                let sx = ((f64::from(px) + 0.5) / f64::from(width) * 2.0 - 1.0) * half_v * aspect;
                let sy = (1.0 - (f64::from(py) + 0.5) / f64::from(height) * 2.0) * half_v;
                let dir = forward
                    .add(right.scale(sx))
                    .add(up.scale(sy))
                    .normalize();

                let rgb = self.shade_ray(eye, dir, light, head_center, ring_y, backdrop);
                let o = ((py * width + px) * 4) as usize;
                data[o] = rgb[0];
                data[o + 1] = rgb[1];
                data[o + 2] = rgb[2];
                data[o + 3] = 255;
            }
        }

        FrameRGBA {
            width,
            height,
            data,
        }
    }

    fn shade_ray(
        &self,
        eye: Vec3,
        dir: Vec3,
        light: Vec3,
        head_center: Vec3,
        ring_y: f64,
        backdrop: &Backdrop,
    ) -> [u8; 3] {
        let mut nearest = f64::INFINITY;
        let mut color = [
            CLEAR_COLOR[0] as f64,
            CLEAR_COLOR[1] as f64,
            CLEAR_COLOR[2] as f64,
        ];

        if let Some(t) = ray_sphere(eye, dir, head_center, HEAD_RADIUS)
            && t < nearest
        {
            nearest = t;
            let hit = eye.add(dir.scale(t));
            let normal = hit.sub(head_center).scale(1.0 / HEAD_RADIUS);
            color = self.shade_head(normal, light);
        }

        if let Some(t) = ray_horizontal_plane(eye, dir, ring_y)
            && t < nearest
        {
            let hit = eye.add(dir.scale(t));
            let radial = (hit.x * hit.x + hit.z * hit.z).sqrt();
            if (RING_INNER_RADIUS..=RING_OUTER_RADIUS).contains(&radial) {
                nearest = t;
                let normal = Vec3::new(0.0, if dir.y < 0.0 { 1.0 } else { -1.0 }, 0.0);
                let diffuse = normal.dot(light).max(0.0);
                color = scale_rgb(RING_COLOR, 0.4 + 0.6 * diffuse);
            }
        }

        if let Some(t) = ray_horizontal_plane(eye, dir, 0.0)
            && t < nearest
        {
            let hit = eye.add(dir.scale(t));
            if hit.x.abs() <= GROUND_HALF_WIDTH && hit.z.abs() <= GROUND_HALF_DEPTH {
                nearest = t;
                // Slight falloff toward the back of the stage.
                let depth = ((hit.z + GROUND_HALF_DEPTH) / (2.0 * GROUND_HALF_DEPTH)).clamp(0.0, 1.0);
                color = scale_rgb(GROUND_COLOR, 0.6 + 0.4 * depth);
            }
        }

        if dir.z < 0.0 {
            let t = (BACKDROP_Z - eye.z) / dir.z;
            if t > 0.0 && t < nearest {
                let hit = eye.add(dir.scale(t));
                if hit.x.abs() <= BACKDROP_HALF_WIDTH
                    && (BACKDROP_BOTTOM..=BACKDROP_BOTTOM + BACKDROP_HEIGHT).contains(&hit.y)
                {
                    color = sample_backdrop(backdrop, hit.x, hit.y);
                }
            }
        }

        [
            color[0].round().clamp(0.0, 255.0) as u8,
            color[1].round().clamp(0.0, 255.0) as u8,
            color[2].round().clamp(0.0, 255.0) as u8,
        ]
    }

    fn shade_head(&self, normal: Vec3, light: Vec3) -> [f64; 3] {
        let diffuse = normal.dot(light).max(0.0);
        let hemi = 0.35 + 0.15 * normal.y.max(0.0);
        let intensity = (hemi + 0.65 * diffuse).min(1.0);

        // Brighten the side the character currently faces so the yaw
        // oscillation reads on an otherwise uniform sphere.
        let facing = Vec3::new(self.state.yaw.sin(), 0.0, self.state.yaw.cos());
        let face = normal.dot(facing).max(0.0);

        let mut rgb = scale_rgb(HEAD_COLOR, intensity);
        for c in &mut rgb {
            *c += (255.0 - *c) * 0.2 * face;
        }
        rgb
    }
}

fn sample_backdrop(backdrop: &Backdrop, x: f64, y: f64) -> [f64; 3] {
    match backdrop {
        Backdrop::Color(c) => [c[0] as f64, c[1] as f64, c[2] as f64],
        Backdrop::Image(img) => {
            let u = ((x + BACKDROP_HALF_WIDTH) / (2.0 * BACKDROP_HALF_WIDTH)).clamp(0.0, 1.0);
            let v = (1.0 - (y - BACKDROP_BOTTOM) / BACKDROP_HEIGHT).clamp(0.0, 1.0);
            let px = ((u * f64::from(img.width() - 1)).round() as u32).min(img.width() - 1);
            let py = ((v * f64::from(img.height() - 1)).round() as u32).min(img.height() - 1);
            let p = img.get_pixel(px, py).0;
            [p[0] as f64, p[1] as f64, p[2] as f64]
        }
    }
}

fn scale_rgb(rgb: [f64; 3], k: f64) -> [f64; 3] {
    [rgb[0] * k, rgb[1] * k, rgb[2] * k]
}

fn ray_sphere(origin: Vec3, dir: Vec3, center: Vec3, radius: f64) -> Option<f64> {
    let oc = origin.sub(center);
    let b = oc.dot(dir);
    let c = oc.dot(oc) - radius * radius;
    let disc = b * b - c;
    if disc < 0.0 {
        return None;
    }
    let t = -b - disc.sqrt();
    (t > 1e-6).then_some(t)
}

fn ray_horizontal_plane(origin: Vec3, dir: Vec3, plane_y: f64) -> Option<f64> {
    if dir.y.abs() < 1e-9 {
        return None;
    }
    let t = (plane_y - origin.y) / dir.y;
    (t > 1e-6).then_some(t)
}

#[derive(Clone, Copy, Debug)]
struct Vec3 {
    x: f64,
    y: f64,
    z: f64,
}

impl Vec3 {
    fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    fn add(self, o: Self) -> Self {
        Self::new(self.x + o.x, self.y + o.y, self.z + o.z)
    }

    fn sub(self, o: Self) -> Self {
        Self::new(self.x - o.x, self.y - o.y, self.z - o.z)
    }

    fn scale(self, k: f64) -> Self {
        Self::new(self.x * k, self.y * k, self.z * k)
    }

    fn dot(self, o: Self) -> f64 {
        self.x * o.x + self.y * o.y + self.z * o.z
    }

    fn cross(self, o: Self) -> Self {
        Self::new(
            self.y * o.z - self.z * o.y,
            self.z * o.x - self.x * o.z,
            self.x * o.y - self.y * o.x,
        )
    }

    fn normalize(self) -> Self {
        let len = self.dot(self).sqrt();
        if len <= 0.0 { self } else { self.scale(1.0 / len) }
    }
}
