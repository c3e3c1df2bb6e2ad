//! Spatial viewport: pan/zoom bookkeeping, pointer gestures, and the
//! proximity-emphasis frame computation.
//!
//! The per-frame work is a pure function of (flagged entities, viewport), so
//! the rendering layer's only side effect is applying the returned
//! `RenderState` list. The perpetual tick lives in `FrameLoop`, which must be
//! cancelled on teardown (Drop also cancels).

use serde::Serialize;
use std::time::Duration;

use crate::filter::Flagged;
use crate::state::Config;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Pointer far offscreen so nothing is emphasized before the first move.
const POINTER_PARKED: Point = Point { x: -9999.0, y: -9999.0 };

#[derive(Debug, Clone, Copy, PartialEq)]
enum Gesture {
    Idle,
    Dragging { last: Point, start: Point },
}

/// How a pointer-up resolved: a selection-clearing click, or a pan that
/// suppresses selection changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerUp {
    Click,
    Pan,
}

/// Owns pan, zoom, viewport size, live pointer position, and gesture state.
/// The pointer handlers and `on_wheel` are its only mutators.
#[derive(Debug, Clone)]
pub struct Viewport {
    cfg: Config,
    width: f64,
    height: f64,
    pan: Point,
    zoom: f64,
    pointer: Point,
    gesture: Gesture,
}

impl Viewport {
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            width: 0.0,
            height: 0.0,
            pan: Point::default(),
            zoom: 1.0,
            pointer: POINTER_PARKED,
            gesture: Gesture::Idle,
        }
    }

    pub fn set_size(&mut self, width: f64, height: f64) {
        self.width = width.max(0.0);
        self.height = height.max(0.0);
    }

    pub fn pan(&self) -> Point {
        self.pan
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.gesture, Gesture::Dragging { .. })
    }

    /// Map a metric pair in [0,100]² into world coordinates, Y inverted so a
    /// higher metric renders higher on screen. The padding margin is reserved
    /// for axis labels. A zero-size viewport projects to the origin.
    pub fn project(&self, x_metric: f64, y_metric: f64) -> Point {
        if self.width <= 0.0 || self.height <= 0.0 {
            return Point::default();
        }
        let pad = self.cfg.chart_padding;
        let x = pad + (x_metric / 100.0) * (self.width - 2.0 * pad);
        let y = self.height - pad - (y_metric / 100.0) * (self.height - 2.0 * pad);
        Point::new(x, y)
    }

    /// Inverse of the pan/zoom transform applied at render time.
    pub fn world_from_screen(&self, p: Point) -> Point {
        Point::new((p.x - self.pan.x) / self.zoom, (p.y - self.pan.y) / self.zoom)
    }

    pub fn pointer_world(&self) -> Point {
        self.world_from_screen(self.pointer)
    }

    /// Wheel delta adjusts zoom, clamped to the configured bounds.
    pub fn on_wheel(&mut self, delta_y: f64) {
        self.zoom = (self.zoom - delta_y * self.cfg.wheel_sensitivity)
            .clamp(self.cfg.zoom_min, self.cfg.zoom_max);
    }

    pub fn on_pointer_down(&mut self, p: Point) {
        self.pointer = p;
        self.gesture = Gesture::Dragging { last: p, start: p };
    }

    pub fn on_pointer_move(&mut self, p: Point) {
        self.pointer = p;
        if let Gesture::Dragging { last, start } = self.gesture {
            self.pan.x += p.x - last.x;
            self.pan.y += p.y - last.y;
            self.gesture = Gesture::Dragging { last: p, start };
        }
    }

    /// Ends the active gesture. Total displacement under the click threshold
    /// is a click (callers clear selection); anything larger was a pan.
    pub fn on_pointer_up(&mut self, p: Point) -> PointerUp {
        let outcome = match self.gesture {
            Gesture::Dragging { start, .. } if p.distance(start) < self.cfg.click_threshold_px => {
                PointerUp::Click
            }
            _ => PointerUp::Pan,
        };
        self.gesture = Gesture::Idle;
        outcome
    }

    /// Pointer left the surface: park it and abandon any drag.
    pub fn on_pointer_leave(&mut self) {
        self.pointer = POINTER_PARKED;
        self.gesture = Gesture::Idle;
    }
}

/// Per-entity render output for one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderState {
    pub key: String,
    pub center: Point,
    pub radius: f64,
}

/// Base radius from impact score, independent of zoom.
pub fn base_radius(impact_score: f64, cfg: &Config) -> f64 {
    ((impact_score / 100.0) * cfg.radius_max).max(cfg.radius_min)
}

/// One tick of the proximity-emphasis loop. Matched entities within the
/// trigger radius of the pointer (in world space) grow by
/// `1 + gain * (1 - d/trigger)^2`; everything else keeps its base radius.
/// Unmatched entities carry zero visual weight and are omitted entirely.
pub fn compute_frame(flagged: &[Flagged], viewport: &Viewport) -> Vec<RenderState> {
    let cfg = &viewport.cfg;
    let pointer = viewport.pointer_world();
    flagged
        .iter()
        .filter(|f| f.matched)
        .map(|f| {
            let center = viewport.project(f.entity.x_metric, f.entity.y_metric);
            let base = base_radius(f.entity.impact_score, cfg);
            let dist = center.distance(pointer);
            let radius = if dist < cfg.trigger_radius {
                let ratio = 1.0 - dist / cfg.trigger_radius;
                base * (1.0 + cfg.emphasis_gain * ratio * ratio)
            } else {
                base
            };
            RenderState { key: f.entity.key.clone(), center, radius }
        })
        .collect()
}

/// Handle for the perpetual per-frame tick. Runs until cancelled; dropping
/// the handle aborts the task so a discarded loop cannot leak callbacks.
pub struct FrameLoop {
    handle: tokio::task::JoinHandle<()>,
}

impl FrameLoop {
    /// Spawn a tick at the configured frame rate. The closure is the single
    /// "apply render state" step; all computation belongs in `compute_frame`.
    pub fn spawn<F>(frame_rate: u64, mut tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let period = Duration::from_micros(1_000_000 / frame_rate.max(1));
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                tick();
            }
        });
        Self { handle }
    }

    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for FrameLoop {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::{Dominance, Entity, TimingClass};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    fn test_cfg() -> Config {
        Config::from_env()
    }

    fn sized_viewport() -> Viewport {
        let mut vp = Viewport::new(test_cfg());
        vp.set_size(1000.0, 700.0);
        vp
    }

    fn entity(key: &str, x: f64, y: f64, impact: f64) -> Entity {
        Entity {
            key: key.to_string(),
            name: key.to_string(),
            dominance: Dominance::Mixed,
            scale_volume: 100.0,
            avg_trade_size: 1.0,
            net_buy_ratio: 0.0,
            tx_count: 10,
            primary_share: 0.5,
            secondary_share: 0.5,
            aux_share: 0.2,
            active_days: 10,
            recency_days: 2,
            impact_score: impact,
            timing_class: TimingClass::Sync,
            timing_score: 50.0,
            correlation: 0.0,
            x_metric: x,
            y_metric: y,
            description: String::new(),
        }
    }

    fn flagged(key: &str, x: f64, y: f64, impact: f64, matched: bool) -> Flagged {
        Flagged { entity: entity(key, x, y, impact), matched }
    }

    #[test]
    fn test_projection_corners() {
        let vp = sized_viewport();
        let pad = test_cfg().chart_padding;
        let origin = vp.project(0.0, 0.0);
        assert_eq!(origin, Point::new(pad, 700.0 - pad));
        let top_right = vp.project(100.0, 100.0);
        assert_eq!(top_right, Point::new(1000.0 - pad, pad));
    }

    #[test]
    fn test_projection_y_axis_inverted() {
        let vp = sized_viewport();
        // Higher metric renders higher on screen, i.e. smaller y.
        assert!(vp.project(50.0, 80.0).y < vp.project(50.0, 20.0).y);
    }

    #[test]
    fn test_zero_size_projects_to_origin() {
        let vp = Viewport::new(test_cfg());
        let p = vp.project(50.0, 50.0);
        assert_eq!(p, Point::default());
        assert!(p.x.is_finite() && p.y.is_finite());
    }

    #[test]
    fn test_world_from_screen_inverts_pan_zoom() {
        let mut vp = sized_viewport();
        vp.on_pointer_down(Point::new(100.0, 100.0));
        vp.on_pointer_move(Point::new(140.0, 70.0));
        vp.on_pointer_up(Point::new(140.0, 70.0));
        for _ in 0..4 {
            vp.on_wheel(-250.0);
        }
        let world = vp.world_from_screen(Point::new(300.0, 200.0));
        let back = Point::new(world.x * vp.zoom() + vp.pan().x, world.y * vp.zoom() + vp.pan().y);
        assert!((back.x - 300.0).abs() < 1e-9);
        assert!((back.y - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_zoom_clamped_under_any_wheel_sequence() {
        let mut vp = sized_viewport();
        for _ in 0..10_000 {
            vp.on_wheel(500.0);
        }
        assert_eq!(vp.zoom(), 0.5);
        for _ in 0..100_000 {
            vp.on_wheel(-500.0);
        }
        assert_eq!(vp.zoom(), 5.0);
    }

    #[test]
    fn test_click_vs_pan_threshold() {
        let mut vp = sized_viewport();
        vp.on_pointer_down(Point::new(10.0, 10.0));
        vp.on_pointer_move(Point::new(12.0, 11.0));
        assert_eq!(vp.on_pointer_up(Point::new(12.0, 11.0)), PointerUp::Click);

        vp.on_pointer_down(Point::new(10.0, 10.0));
        vp.on_pointer_move(Point::new(60.0, 10.0));
        assert_eq!(vp.on_pointer_up(Point::new(60.0, 10.0)), PointerUp::Pan);
        assert!(!vp.is_dragging());
    }

    #[test]
    fn test_drag_accumulates_pan() {
        let mut vp = sized_viewport();
        vp.on_pointer_down(Point::new(0.0, 0.0));
        vp.on_pointer_move(Point::new(30.0, 10.0));
        vp.on_pointer_move(Point::new(50.0, 25.0));
        vp.on_pointer_up(Point::new(50.0, 25.0));
        assert_eq!(vp.pan(), Point::new(50.0, 25.0));
        // Moves while idle do not pan.
        vp.on_pointer_move(Point::new(500.0, 500.0));
        assert_eq!(vp.pan(), Point::new(50.0, 25.0));
    }

    #[test]
    fn test_base_radius_bounds() {
        let cfg = test_cfg();
        assert_eq!(base_radius(100.0, &cfg), cfg.radius_max);
        assert_eq!(base_radius(0.0, &cfg), cfg.radius_min);
        assert_eq!(base_radius(5.0, &cfg), cfg.radius_min);
    }

    #[test]
    fn test_frame_emphasizes_near_pointer() {
        let mut vp = sized_viewport();
        let items = vec![flagged("near", 50.0, 50.0, 80.0, true)];
        let far = compute_frame(&items, &vp);
        let base = far[0].radius;

        // Park the pointer exactly on the node's projected center.
        let center = vp.project(50.0, 50.0);
        vp.on_pointer_move(center);
        let near = compute_frame(&items, &vp);
        let gain = test_cfg().emphasis_gain;
        assert!((near[0].radius - base * (1.0 + gain)).abs() < 1e-9);
    }

    #[test]
    fn test_frame_emphasis_decays_with_distance() {
        let mut vp = sized_viewport();
        let items = vec![flagged("n", 50.0, 50.0, 80.0, true)];
        let center = vp.project(50.0, 50.0);
        vp.on_pointer_move(Point::new(center.x + 50.0, center.y));
        let close = compute_frame(&items, &vp)[0].radius;
        vp.on_pointer_move(Point::new(center.x + 150.0, center.y));
        let farther = compute_frame(&items, &vp)[0].radius;
        vp.on_pointer_move(Point::new(center.x + 500.0, center.y));
        let outside = compute_frame(&items, &vp)[0].radius;
        assert!(close > farther);
        assert!(farther > outside);
        assert_eq!(outside, base_radius(80.0, &test_cfg()));
    }

    #[test]
    fn test_frame_excludes_unmatched() {
        let vp = sized_viewport();
        let items = vec![
            flagged("in", 30.0, 30.0, 50.0, true),
            flagged("out", 70.0, 70.0, 50.0, false),
        ];
        let frame = compute_frame(&items, &vp);
        assert_eq!(frame.len(), 1);
        assert_eq!(frame[0].key, "in");
    }

    #[test]
    fn test_empty_entities_render_nothing() {
        let vp = sized_viewport();
        assert!(compute_frame(&[], &vp).is_empty());
    }

    #[tokio::test]
    async fn test_frame_loop_ticks_and_cancels() {
        let count = Arc::new(AtomicU64::new(0));
        let c = count.clone();
        let frame_loop = FrameLoop::spawn(1000, move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(count.load(Ordering::SeqCst) > 0, "loop never ticked");

        frame_loop.cancel();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let after_cancel = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), after_cancel, "loop ticked after cancel");
    }

    #[tokio::test]
    async fn test_frame_loop_cancelled_on_drop() {
        let count = Arc::new(AtomicU64::new(0));
        let c = count.clone();
        {
            let _frame_loop = FrameLoop::spawn(1000, move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_millis(30)).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        let after_drop = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), after_drop);
    }
}
