/// Orbit camera controls and the pointer binding that drives them
///
/// Rotation and panning are integrated with damping: input accumulates a
/// pending delta, and every `update` applies a `damping_factor` fraction of
/// it and decays the rest, which gives the drag its inertia.

use std::f32::consts::PI;

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::projection::Camera;

/// Keeps the polar angle off the poles so `look_at` never degenerates
const POLE_EPSILON: f32 = 1e-3;

/// Deltas below this are considered settled
const SETTLE_EPSILON: f32 = 1e-6;

/// Tuning for the orbit controls
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrbitSettings {
    pub damping_factor: f32,
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub pan_speed: f32,
    pub min_distance: f32,
    pub max_distance: f32,
}

impl Default for OrbitSettings {
    fn default() -> Self {
        Self {
            damping_factor: 0.05,
            rotate_speed: 1.0,
            zoom_speed: 1.0,
            pan_speed: 1.0,
            min_distance: 1.0,
            max_distance: 100.0,
        }
    }
}

/// Damped orbit controls around a target point
#[derive(Debug, Clone)]
pub struct OrbitControls {
    pub target: Point3<f32>,
    pub settings: OrbitSettings,
    delta_theta: f32,
    delta_phi: f32,
    pan_offset: Vector3<f32>,
    scale: f32,
}

impl OrbitControls {
    pub fn new(target: Point3<f32>, settings: OrbitSettings) -> Self {
        Self {
            target,
            settings,
            delta_theta: 0.0,
            delta_phi: 0.0,
            pan_offset: Vector3::zeros(),
            scale: 1.0,
        }
    }

    /// Queue an azimuthal rotation (radians)
    pub fn rotate_left(&mut self, angle: f32) {
        self.delta_theta -= angle;
    }

    /// Queue a polar rotation (radians)
    pub fn rotate_up(&mut self, angle: f32) {
        self.delta_phi -= angle;
    }

    /// Queue a pan by a pixel delta on a surface of `surface_height` pixels
    pub fn pan(&mut self, dx: f32, dy: f32, camera: &Camera, surface_height: u32) {
        if surface_height == 0 {
            return;
        }
        let offset = camera.position - self.target;
        let target_distance = offset.norm() * (camera.fov / 2.0).tan();
        let height = surface_height as f32;

        let forward = -offset.try_normalize(1e-12).unwrap_or_else(|| -Vector3::z());
        let right = forward
            .cross(&camera.up)
            .try_normalize(1e-12)
            .unwrap_or_else(Vector3::x);
        let up = right.cross(&forward);

        let pan_left = 2.0 * dx * target_distance / height * self.settings.pan_speed;
        let pan_up = 2.0 * dy * target_distance / height * self.settings.pan_speed;
        self.pan_offset += -right * pan_left + up * pan_up;
    }

    /// Zoom towards the target; `steps > 0` moves closer
    pub fn zoom(&mut self, steps: f32) {
        let step_scale = 0.95f32.powf(self.settings.zoom_speed);
        self.scale *= step_scale.powf(steps);
    }

    /// Whether there is queued motion left to integrate
    pub fn is_settled(&self) -> bool {
        self.delta_theta.abs() < SETTLE_EPSILON
            && self.delta_phi.abs() < SETTLE_EPSILON
            && self.pan_offset.norm() < SETTLE_EPSILON
            && (self.scale - 1.0).abs() < SETTLE_EPSILON
    }

    /// Advance the damping integration one tick and move the camera
    pub fn update(&mut self, camera: &mut Camera) {
        let damping = self.settings.damping_factor.clamp(0.0, 1.0);
        let offset = camera.position - self.target;

        let mut radius = offset.norm();
        let (mut theta, mut phi) = if radius > 0.0 {
            (
                offset.x.atan2(offset.z),
                (offset.y / radius).clamp(-1.0, 1.0).acos(),
            )
        } else {
            (0.0, PI / 2.0)
        };

        theta += self.delta_theta * damping;
        phi = (phi + self.delta_phi * damping).clamp(POLE_EPSILON, PI - POLE_EPSILON);

        let (min, max) = (self.settings.min_distance, self.settings.max_distance.max(self.settings.min_distance));
        radius = (radius * self.scale).clamp(min, max);

        self.target += self.pan_offset * damping;

        let sin_phi = phi.sin();
        let new_offset = Vector3::new(
            radius * sin_phi * theta.sin(),
            radius * phi.cos(),
            radius * sin_phi * theta.cos(),
        );

        camera.target = self.target;
        camera.position = self.target + new_offset;

        self.delta_theta *= 1.0 - damping;
        self.delta_phi *= 1.0 - damping;
        self.pan_offset *= 1.0 - damping;
        self.scale = 1.0;
    }
}

/// Pointer buttons the binding distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
    Middle,
}

/// Input events in surface pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Down { button: PointerButton, x: f32, y: f32 },
    Move { x: f32, y: f32 },
    Up { button: PointerButton },
    /// Positive `delta_y` scrolls away from the user (zoom out)
    Wheel { delta_y: f32 },
}

#[derive(Debug, Clone, Copy)]
struct Drag {
    button: PointerButton,
    last: (f32, f32),
}

/// Maps pointer input onto `OrbitControls`.
///
/// Drag rotates, secondary drag pans, wheel zooms, middle drag dollies.
/// An unbound binding ignores everything.
#[derive(Debug, Default)]
pub struct OrbitInputBinding {
    bound: bool,
    drag: Option<Drag>,
}

impl OrbitInputBinding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self) {
        self.bound = true;
    }

    pub fn unbind(&mut self) {
        self.bound = false;
        self.drag = None;
    }

    /// Apply one event; returns false when the event was ignored
    pub fn handle(
        &mut self,
        event: PointerEvent,
        controls: &mut OrbitControls,
        camera: &Camera,
        surface_height: u32,
    ) -> bool {
        if !self.bound {
            return false;
        }

        match event {
            PointerEvent::Down { button, x, y } => {
                self.drag = Some(Drag {
                    button,
                    last: (x, y),
                });
                true
            }
            PointerEvent::Up { .. } => self.drag.take().is_some(),
            PointerEvent::Move { x, y } => {
                let Some(drag) = self.drag.as_mut() else {
                    return false;
                };
                let (dx, dy) = (x - drag.last.0, y - drag.last.1);
                drag.last = (x, y);
                let height = surface_height.max(1) as f32;

                match drag.button {
                    PointerButton::Primary => {
                        let speed = controls.settings.rotate_speed;
                        controls.rotate_left(2.0 * PI * dx / height * speed);
                        controls.rotate_up(2.0 * PI * dy / height * speed);
                    }
                    PointerButton::Secondary => controls.pan(dx, dy, camera, surface_height),
                    PointerButton::Middle => {
                        if dy != 0.0 {
                            controls.zoom(-dy.signum());
                        }
                    }
                }
                true
            }
            PointerEvent::Wheel { delta_y } => {
                if delta_y != 0.0 {
                    controls.zoom(-delta_y.signum());
                }
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (OrbitControls, Camera) {
        (
            OrbitControls::new(Point3::origin(), OrbitSettings::default()),
            Camera::new(800, 600),
        )
    }

    fn settle(controls: &mut OrbitControls, camera: &mut Camera) {
        for _ in 0..2000 {
            controls.update(camera);
        }
    }

    #[test]
    fn test_update_without_input_keeps_camera() {
        let (mut controls, mut camera) = setup();
        controls.update(&mut camera);
        assert!((camera.position - Point3::new(0.0, 0.0, 5.0)).norm() < 1e-5);
        assert!(controls.is_settled());
    }

    #[test]
    fn test_rotation_is_damped() {
        let (mut controls, mut camera) = setup();
        controls.rotate_left(1.0);

        controls.update(&mut camera);
        let after_one = camera.position.x.atan2(camera.position.z);
        assert!((after_one + 0.05).abs() < 1e-4);

        settle(&mut controls, &mut camera);
        let settled = camera.position.x.atan2(camera.position.z);
        assert!((settled + 1.0).abs() < 1e-3);
        assert!((camera.distance() - 5.0).abs() < 1e-4);
        assert!(controls.is_settled());
    }

    #[test]
    fn test_polar_angle_is_clamped() {
        let (mut controls, mut camera) = setup();
        controls.rotate_up(10.0);
        settle(&mut controls, &mut camera);
        assert!(camera.position.y < 5.0);
        assert!(camera.position.y.is_finite());
    }

    #[test]
    fn test_zoom_respects_bounds() {
        let (mut controls, mut camera) = setup();
        for _ in 0..500 {
            controls.zoom(1.0);
            controls.update(&mut camera);
        }
        assert!((camera.distance() - 1.0).abs() < 1e-4);

        for _ in 0..500 {
            controls.zoom(-1.0);
            controls.update(&mut camera);
        }
        assert!((camera.distance() - 100.0).abs() < 1e-2);
    }

    #[test]
    fn test_pan_moves_target() {
        let (mut controls, mut camera) = setup();
        controls.pan(100.0, 0.0, &camera, 600);
        settle(&mut controls, &mut camera);
        assert!(controls.target.x < 0.0);
        assert!(controls.target.y.abs() < 1e-4);
        assert_eq!(camera.target, controls.target);
    }

    #[test]
    fn test_unbound_binding_ignores_input() {
        let (mut controls, camera) = setup();
        let mut binding = OrbitInputBinding::new();
        let handled = binding.handle(PointerEvent::Wheel { delta_y: 1.0 }, &mut controls, &camera, 600);
        assert!(!handled);
        assert!(controls.is_settled());
    }

    #[test]
    fn test_primary_drag_queues_rotation() {
        let (mut controls, mut camera) = setup();
        let mut binding = OrbitInputBinding::new();
        binding.bind();

        let down = PointerEvent::Down { button: PointerButton::Primary, x: 10.0, y: 10.0 };
        assert!(binding.handle(down, &mut controls, &camera, 600));
        assert!(binding.drag.is_some());
        assert!(binding.handle(PointerEvent::Move { x: 160.0, y: 10.0 }, &mut controls, &camera, 600));
        assert!(!controls.is_settled());

        settle(&mut controls, &mut camera);
        // A drag of a quarter of the surface height is a quarter turn
        let theta = camera.position.x.atan2(camera.position.z);
        assert!((theta + PI / 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_unbind_drops_drag() {
        let (mut controls, camera) = setup();
        let mut binding = OrbitInputBinding::new();
        binding.bind();
        binding.handle(
            PointerEvent::Down { button: PointerButton::Secondary, x: 0.0, y: 0.0 },
            &mut controls,
            &camera,
            600,
        );
        binding.unbind();
        assert!(binding.drag.is_none());
        assert!(!binding.handle(PointerEvent::Move { x: 50.0, y: 0.0 }, &mut controls, &camera, 600));
    }

    #[test]
    fn test_move_without_drag_is_ignored() {
        let (mut controls, camera) = setup();
        let mut binding = OrbitInputBinding::new();
        binding.bind();
        assert!(!binding.handle(PointerEvent::Move { x: 5.0, y: 5.0 }, &mut controls, &camera, 600));
    }
}
