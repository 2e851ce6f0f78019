#![allow(
    dead_code,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
//! Helix simulation through the generic barrel.

use std::f64::consts::PI;

use nalgebra::{Point3, Vector3};
use trackpix_core::units::PT_PER_TESLA_MM;
use trackpix_core::{
    CellBatch, DigitizationLookup, GeometryLookup, ModuleId, ModuleKind, Spacepoint,
};
use trackpix_detector::{Detector, GenericBarrel, LayerKind};

/// Field of the simulated events (T).
pub const B_FIELD: f64 = 2.0;

/// Charged particle from the beam line.
#[derive(Debug, Clone, Copy)]
pub struct Track {
    pub charge: f64,
    pub pt: f64,
    pub phi0: f64,
    pub cot_theta: f64,
    pub z0: f64,
}

impl Track {
    pub fn helix_radius(&self) -> f64 {
        self.pt / (PT_PER_TESLA_MM * B_FIELD)
    }

    /// Position after transverse path length `s`.
    pub fn position(&self, s: f64) -> Vector3<f64> {
        let radius = self.helix_radius();
        let q = self.charge;
        let phi = self.phi0 - q * s / radius;
        Vector3::new(
            q * radius * (self.phi0.sin() - phi.sin()),
            q * radius * (phi.cos() - self.phi0.cos()),
            self.z0 + s * self.cot_theta,
        )
    }

    /// Azimuth of the direction after transverse path length `s`.
    pub fn phi_at(&self, s: f64) -> f64 {
        let phi = self.phi0 - self.charge * s / self.helix_radius();
        (phi + PI).rem_euclid(2.0 * PI) - PI
    }

    /// Transverse path length to reach radius `r`.
    pub fn path_to_radius(&self, r: f64) -> f64 {
        let radius = self.helix_radius();
        2.0 * radius * (r / (2.0 * radius)).asin()
    }

    pub fn theta(&self) -> f64 {
        1.0f64.atan2(self.cot_theta)
    }
}

/// Simulated hit.
#[derive(Debug, Clone, Copy)]
pub struct Hit {
    pub track: usize,
    pub layer: usize,
    pub module: ModuleId,
    pub position: Vector3<f64>,
}

/// Cells of one event plus the truth behind them.
#[derive(Debug, Clone, Default)]
pub struct SimEvent {
    pub cells: CellBatch,
    pub hits: Vec<Hit>,
}

impl SimEvent {
    /// Track of the simulated hit closest to `sp`, if within `tolerance`.
    pub fn truth(&self, sp: &Spacepoint, tolerance: f64) -> Option<usize> {
        let p = Vector3::from(sp.position());
        self.hits
            .iter()
            .map(|hit| ((hit.position - p).norm(), hit.track))
            .filter(|&(d, _)| d <= tolerance)
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, track)| track)
    }

    /// Number of pixel layers crossed by `track`.
    pub fn pixel_layers(&self, track: usize, barrel: &GenericBarrel) -> usize {
        let mut layers: Vec<usize> = self
            .hits
            .iter()
            .filter(|h| h.track == track && matches!(barrel.layers[h.layer].kind, LayerKind::Pixel))
            .map(|h| h.layer)
            .collect();
        layers.sort_unstable();
        layers.dedup();
        layers.len()
    }
}

/// Small deterministic generator for reproducible events.
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1)
    }

    /// Uniform in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }

    pub fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }
}

/// `n` tracks spread evenly in azimuth with 1-3 GeV transverse momentum.
pub fn tracks(n: usize, seed: u64) -> Vec<Track> {
    let mut rng = Lcg::new(seed);
    (0..n)
        .map(|i| Track {
            charge: if i % 2 == 0 { 1.0 } else { -1.0 },
            pt: rng.uniform(1.0, 3.0),
            phi0: -PI + (i as f64 + 0.5) * 2.0 * PI / n as f64 + rng.uniform(-0.05, 0.05),
            cot_theta: rng.uniform(-1.0, 1.0),
            z0: rng.uniform(-30.0, 30.0),
        })
        .collect()
}

/// Crossing of `track` with the plane of `module`, starting the search at
/// path length `s0`.
fn cross_plane(track: &Track, detector: &Detector, module: ModuleId, s0: f64) -> Option<Vector3<f64>> {
    let transform = detector.module(module)?.transform;
    let normal = transform.vector_to_global(&Vector3::z());
    let offset = normal.dot(transform.translation());
    let f = |s: f64| normal.dot(&track.position(s)) - offset;

    let (mut lo, mut hi) = (s0 - 5.0, s0 + 40.0);
    if f(lo) * f(hi) > 0.0 {
        return None;
    }
    for _ in 0..80 {
        let mid = 0.5 * (lo + hi);
        if f(lo) * f(mid) <= 0.0 {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    Some(track.position(0.5 * (lo + hi)))
}

/// Propagates `tracks` through `barrel` and digitizes one cell per module
/// crossing.
pub fn simulate(barrel: &GenericBarrel, detector: &Detector, tracks: &[Track]) -> SimEvent {
    let mut event = SimEvent::default();
    for (t, track) in tracks.iter().enumerate() {
        for (layer_index, layer) in barrel.layers.iter().enumerate() {
            let sheets = match layer.kind {
                LayerKind::Pixel => vec![(0u8, 0.0)],
                LayerKind::StripPair { gap, .. } => vec![(0, 0.0), (1, gap)],
            };
            for (sheet, gap) in sheets {
                let radius = layer.radius + gap;
                if radius >= 2.0 * track.helix_radius() {
                    continue;
                }
                let s0 = track.path_to_radius(radius);
                let guess = track.position(s0);
                let Some((iz, iphi)) = barrel.slot_at(layer_index, guess.y.atan2(guess.x), guess.z) else {
                    continue;
                };
                let id = GenericBarrel::module_id(layer_index, iz, iphi, sheet);
                let Some(position) = cross_plane(track, detector, id, s0) else {
                    continue;
                };
                let Some(module) = detector.module(id) else {
                    continue;
                };
                let Some(params) = detector.digitization(id, &module.kind) else {
                    continue;
                };
                let local = module
                    .transform
                    .point_to_local(&Point3::from(position));

                let width = layer.module_width();
                let (c0, c1) = match module.kind {
                    ModuleKind::Pixel => {
                        if local.x < 0.0 || local.y < 0.0 || local.x >= width || local.y >= layer.module_length() {
                            continue;
                        }
                        ((local.x / params.pitch[0]) as u32, (local.y / params.pitch[1]) as u32)
                    }
                    ModuleKind::Strip { length, .. } => {
                        if local.x < 0.0 || local.x >= width || local.y.abs() > 0.5 * length {
                            continue;
                        }
                        ((local.x / params.pitch[0]) as u32, 0)
                    }
                };
                event.cells.push(c0, c1, 1.0, 0.0, id);
                event.hits.push(Hit {
                    track: t,
                    layer: layer_index,
                    module: id,
                    position,
                });
            }
        }
    }
    event
}
