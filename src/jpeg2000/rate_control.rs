//! Post-compression rate-distortion optimisation (PCRD-opt).
//!
//! Every code-block offers the truncation points on the convex hull of its
//! rate/distortion curve. A layer is formed by one global slope threshold: each
//! block keeps the passes whose hull slope is at least the threshold, and the
//! threshold is searched so the layer fits its byte budget.

use log::{debug, warn};

use super::image::CodingPass;
use crate::Tier1Error;

/// Passes and bytes of one code-block included up to some layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InclusionPoint {
    pub passes: usize,
    pub bytes: usize,
}

#[derive(Debug, Clone, Copy)]
struct HullPoint {
    passes: usize,
    slope: f64,
}

// Rate/distortion curve of one block reduced to its convex hull.
struct BlockHull {
    rates: Vec<usize>,
    distortions: Vec<f64>,
    hull: Vec<HullPoint>,
}

impl BlockHull {
    fn new(passes: &[CodingPass]) -> Self {
        let rates: Vec<usize> = passes.iter().map(|p| p.cumulative_rate).collect();
        let distortions: Vec<f64> = passes.iter().map(|p| p.cumulative_distortion).collect();

        let mut hull: Vec<HullPoint> = Vec::new();
        for n in 1..=passes.len() {
            let (rate, distortion) = (rates[n - 1], distortions[n - 1]);
            loop {
                let (last_rate, last_distortion) = match hull.last() {
                    Some(h) => (rates[h.passes - 1], distortions[h.passes - 1]),
                    None => (0, 0.0),
                };
                let delta_distortion = distortion - last_distortion;
                if delta_distortion <= 0.0 || rate < last_rate {
                    break;
                }
                let delta_rate = rate - last_rate;
                let slope = if delta_rate == 0 {
                    f64::INFINITY
                } else {
                    delta_distortion / delta_rate as f64
                };

                if hull.last().is_some_and(|h| slope >= h.slope) {
                    hull.pop();
                    continue;
                }
                hull.push(HullPoint { passes: n, slope });
                break;
            }
        }

        Self {
            rates,
            distortions,
            hull,
        }
    }

    fn rate(&self, passes: usize) -> usize {
        if passes == 0 { 0 } else { self.rates[passes - 1] }
    }

    fn distortion(&self, passes: usize) -> f64 {
        if passes == 0 { 0.0 } else { self.distortions[passes - 1] }
    }

    // Passes kept at threshold `lambda`, never fewer than `previous`. Negative
    // infinity keeps every pass, even those that reduce no distortion.
    fn passes_at(&self, lambda: f64, previous: usize) -> usize {
        if lambda == f64::NEG_INFINITY {
            return self.rates.len();
        }
        let kept = self.hull.partition_point(|h| h.slope >= lambda);
        let passes = if kept == 0 { 0 } else { self.hull[kept - 1].passes };
        passes.max(previous)
    }
}

/// Per-layer, per-block inclusion formed by rate control.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LayerPlan {
    layers: Vec<Vec<InclusionPoint>>,
    thresholds: Vec<f64>,
    distortions: Vec<f64>,
}

impl LayerPlan {
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn num_blocks(&self) -> usize {
        self.layers.first().map_or(0, |l| l.len())
    }

    /// Inclusion of every block in `layer`.
    pub fn layer(&self, layer: usize) -> &[InclusionPoint] {
        &self.layers[layer]
    }

    pub fn inclusion(&self, block: usize, layer: usize) -> InclusionPoint {
        self.layers[layer][block]
    }

    pub fn passes_included(&self, block: usize, layer: usize) -> usize {
        self.layers[layer][block].passes
    }

    pub fn bytes_included(&self, block: usize, layer: usize) -> usize {
        self.layers[layer][block].bytes
    }

    /// Total bytes of all blocks up to and including `layer`.
    pub fn layer_bytes(&self, layer: usize) -> usize {
        self.layers[layer].iter().map(|p| p.bytes).sum()
    }

    /// Total distortion reduction of all blocks up to and including `layer`.
    pub fn layer_distortion(&self, layer: usize) -> f64 {
        self.distortions[layer]
    }

    /// Slope threshold the layer was formed with. Infinite when the layer adds
    /// nothing to the previous one.
    pub fn threshold(&self, layer: usize) -> f64 {
        self.thresholds[layer]
    }

    /// Passes of `block` to decode when at most `max_layers` layers are used.
    pub fn passes_for_decode(&self, block: usize, max_layers: Option<usize>) -> usize {
        let layers = max_layers.map_or(self.layers.len(), |m| m.min(self.layers.len()));
        match layers {
            0 => 0,
            n => self.layers[n - 1][block].passes,
        }
    }
}

struct LayerFormer {
    hulls: Vec<BlockHull>,
    // Distinct hull slopes of all blocks, steepest first.
    candidates: Vec<f64>,
    plan: LayerPlan,
    previous: Vec<usize>,
}

impl LayerFormer {
    fn new<B: AsRef<[CodingPass]>>(blocks: &[B]) -> Self {
        let hulls: Vec<BlockHull> = blocks.iter().map(|b| BlockHull::new(b.as_ref())).collect();
        let mut candidates: Vec<f64> = hulls
            .iter()
            .flat_map(|h| h.hull.iter().map(|p| p.slope))
            .collect();
        candidates.sort_by(|a, b| b.total_cmp(a));
        candidates.dedup();

        Self {
            previous: vec![0; hulls.len()],
            hulls,
            candidates,
            plan: LayerPlan::default(),
        }
    }

    fn passes_at(&self, lambda: f64) -> impl Iterator<Item = (&BlockHull, usize)> {
        self.hulls
            .iter()
            .zip(&self.previous)
            .map(move |(h, &prev)| (h, h.passes_at(lambda, prev)))
    }

    fn bytes_at(&self, lambda: f64) -> usize {
        self.passes_at(lambda).map(|(h, n)| h.rate(n)).sum()
    }

    fn distortion_at(&self, lambda: f64) -> f64 {
        self.passes_at(lambda).map(|(h, n)| h.distortion(n)).sum()
    }

    fn has_remaining_passes(&self) -> bool {
        self.hulls
            .iter()
            .zip(&self.previous)
            .any(|(h, &prev)| h.hull.last().is_some_and(|p| p.passes > prev))
    }

    // Smallest candidate index for which `accept` fails, assuming `accept` holds
    // for a prefix of the candidates.
    fn search(&self, accept: impl Fn(f64) -> bool) -> usize {
        let (mut lo, mut hi) = (0, self.candidates.len());
        while lo < hi {
            let mid = (lo + hi) / 2;
            if accept(self.candidates[mid]) {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    fn push_layer(&mut self, lambda: f64) {
        let layer: Vec<InclusionPoint> = self
            .passes_at(lambda)
            .map(|(h, passes)| InclusionPoint {
                passes,
                bytes: h.rate(passes),
            })
            .collect();
        let distortion = self.distortion_at(lambda);
        for (prev, point) in self.previous.iter_mut().zip(&layer) {
            *prev = point.passes;
        }

        debug!(
            "layer {}: threshold {}, {} bytes, distortion reduction {}",
            self.plan.layers.len(),
            lambda,
            layer.iter().map(|p| p.bytes).sum::<usize>(),
            distortion
        );
        self.plan.layers.push(layer);
        self.plan.thresholds.push(lambda);
        self.plan.distortions.push(distortion);
    }
}

/// Form quality layers whose cumulative size stays within `layer_byte_targets`.
///
/// Targets are cumulative and must be non-decreasing. A budget holding every
/// pass of every block includes all of them. A layer whose budget cannot hold
/// any further pass repeats the previous layer's inclusion.
pub fn form_layers<B: AsRef<[CodingPass]>>(
    blocks: &[B],
    layer_byte_targets: &[usize],
) -> Result<LayerPlan, Tier1Error> {
    if layer_byte_targets.windows(2).any(|w| w[1] < w[0]) {
        return Err(Tier1Error::InvalidLayerTargets);
    }

    let mut former = LayerFormer::new(blocks);
    for (k, &target) in layer_byte_targets.iter().enumerate() {
        if former.bytes_at(f64::NEG_INFINITY) <= target {
            former.push_layer(f64::NEG_INFINITY);
            continue;
        }
        let fitting = former.search(|lambda| former.bytes_at(lambda) <= target);
        let lambda = if fitting == 0 {
            if former.has_remaining_passes() {
                warn!(
                    "layer {} budget of {} bytes admits no further coding pass",
                    k, target
                );
            }
            f64::INFINITY
        } else {
            former.candidates[fitting - 1]
        };
        former.push_layer(lambda);
    }
    Ok(former.plan)
}

/// Form layers from fixed slope thresholds, which must be non-increasing.
pub fn form_layers_by_slope<B: AsRef<[CodingPass]>>(
    blocks: &[B],
    thresholds: &[f64],
) -> Result<LayerPlan, Tier1Error> {
    if thresholds.iter().any(|t| t.is_nan()) || thresholds.windows(2).any(|w| w[1] > w[0]) {
        return Err(Tier1Error::InvalidLayerTargets);
    }

    let mut former = LayerFormer::new(blocks);
    for &lambda in thresholds {
        former.push_layer(lambda);
    }
    Ok(former.plan)
}

/// Form layers reaching the cumulative distortion reductions in
/// `distortion_targets` with the fewest bytes. Targets must be non-decreasing.
pub fn form_quality_layers<B: AsRef<[CodingPass]>>(
    blocks: &[B],
    distortion_targets: &[f64],
) -> Result<LayerPlan, Tier1Error> {
    if distortion_targets.iter().any(|t| t.is_nan())
        || distortion_targets.windows(2).any(|w| w[1] < w[0])
    {
        return Err(Tier1Error::InvalidLayerTargets);
    }

    let mut former = LayerFormer::new(blocks);
    for (k, &target) in distortion_targets.iter().enumerate() {
        let short = former.search(|lambda| former.distortion_at(lambda) < target);
        let lambda = if former.distortion_at(f64::INFINITY) >= target {
            f64::INFINITY
        } else if short < former.candidates.len() {
            former.candidates[short]
        } else {
            warn!(
                "layer {} distortion target {} is not reachable, including every pass",
                k, target
            );
            former.candidates.last().copied().unwrap_or(f64::INFINITY)
        };
        former.push_layer(lambda);
    }
    Ok(former.plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jpeg2000::image::PassType;

    fn passes(points: &[(usize, f64)]) -> Vec<CodingPass> {
        points
            .iter()
            .enumerate()
            .map(|(index, &(rate, distortion))| CodingPass {
                index,
                pass_type: PassType::for_pass_index(index),
                bit_plane: 0,
                cumulative_rate: rate,
                cumulative_distortion: distortion,
                terminated: false,
            })
            .collect()
    }

    #[test]
    fn test_two_block_budget_scenario() {
        let blocks = vec![passes(&[(10, 100.0)]), passes(&[(20, 150.0)])];
        let plan = form_layers(&blocks, &[15]).unwrap();
        assert_eq!(plan.num_layers(), 1);
        assert_eq!(plan.inclusion(0, 0), InclusionPoint { passes: 1, bytes: 10 });
        assert_eq!(plan.inclusion(1, 0), InclusionPoint { passes: 0, bytes: 0 });
        assert_eq!(plan.layer_bytes(0), 10);
        assert_eq!(plan.layer_distortion(0), 100.0);
        assert_eq!(plan.threshold(0), 10.0);
    }

    #[test]
    fn test_hull_skips_non_convex_points() {
        // The second pass has a lower slope than the third, so it is never a
        // truncation point on its own.
        let hull = BlockHull::new(&passes(&[(10, 100.0), (20, 110.0), (30, 200.0), (40, 200.0)]));
        let points: Vec<usize> = hull.hull.iter().map(|h| h.passes).collect();
        assert_eq!(points, vec![1, 3]);
        for pair in hull.hull.windows(2) {
            assert!(pair[0].slope > pair[1].slope);
        }
    }

    #[test]
    fn test_zero_rate_improvement_has_infinite_slope() {
        let hull = BlockHull::new(&passes(&[(0, 5.0), (8, 21.0)]));
        assert_eq!(hull.hull[0].slope, f64::INFINITY);
        assert_eq!(hull.hull[1].slope, 2.0);
    }

    #[test]
    fn test_layers_are_monotonic_and_within_budget() {
        let blocks = vec![
            passes(&[(4, 64.0), (9, 90.0), (15, 120.0), (30, 130.0)]),
            passes(&[(2, 10.0), (12, 70.0), (13, 71.0)]),
            passes(&[]),
            passes(&[(20, 400.0), (25, 410.0)]),
        ];
        let targets = [0, 5, 25, 40, 60, usize::MAX];
        let plan = form_layers(&blocks, &targets).unwrap();

        for (k, &target) in targets.iter().enumerate() {
            assert!(plan.layer_bytes(k) <= target);
            assert_eq!(plan.passes_included(2, k), 0);
        }
        for k in 1..targets.len() {
            for b in 0..blocks.len() {
                assert!(plan.passes_included(b, k - 1) <= plan.passes_included(b, k));
            }
            assert!(plan.layer_distortion(k - 1) <= plan.layer_distortion(k));
        }

        // The unbounded last layer takes every useful pass.
        assert_eq!(plan.passes_included(0, 5), 4);
        assert_eq!(plan.passes_included(1, 5), 3);
        assert_eq!(plan.passes_included(3, 5), 2);
        assert_eq!(plan.layer_bytes(0), 0);
        assert_eq!(plan.threshold(0), f64::INFINITY);
    }

    #[test]
    fn test_rate_control_is_deterministic() {
        let blocks = vec![
            passes(&[(3, 30.0), (7, 50.0), (12, 60.0)]),
            passes(&[(5, 45.0), (6, 46.0)]),
        ];
        let first = form_layers(&blocks, &[6, 12, 20]).unwrap();
        let second = form_layers(&blocks, &[6, 12, 20]).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_decreasing_targets_rejected() {
        let blocks = vec![passes(&[(3, 30.0)])];
        assert_eq!(
            form_layers(&blocks, &[20, 10]).unwrap_err(),
            Tier1Error::InvalidLayerTargets
        );
        assert_eq!(
            form_layers_by_slope(&blocks, &[1.0, 2.0]).unwrap_err(),
            Tier1Error::InvalidLayerTargets
        );
        assert_eq!(
            form_quality_layers(&blocks, &[5.0, 1.0]).unwrap_err(),
            Tier1Error::InvalidLayerTargets
        );
    }

    #[test]
    fn test_form_layers_by_slope() {
        let blocks = vec![passes(&[(10, 100.0), (20, 150.0)]), passes(&[(10, 30.0)])];
        let plan = form_layers_by_slope(&blocks, &[8.0, 4.0, 0.0]).unwrap();
        assert_eq!(plan.passes_included(0, 0), 1);
        assert_eq!(plan.passes_included(1, 0), 0);
        assert_eq!(plan.passes_included(0, 1), 2);
        assert_eq!(plan.passes_included(1, 1), 0);
        assert_eq!(plan.passes_included(1, 2), 1);
    }

    #[test]
    fn test_form_quality_layers() {
        let blocks = vec![passes(&[(10, 100.0), (20, 150.0)]), passes(&[(10, 30.0)])];
        let plan = form_quality_layers(&blocks, &[50.0, 140.0, 1000.0]).unwrap();
        assert_eq!(plan.layer_distortion(0), 100.0);
        assert_eq!(plan.layer_bytes(0), 10);
        assert_eq!(plan.layer_distortion(1), 150.0);
        assert_eq!(plan.layer_distortion(2), 180.0);
        assert_eq!(plan.layer_bytes(2), 30);
    }

    #[test]
    fn test_passes_for_decode() {
        let blocks = vec![passes(&[(4, 40.0), (8, 60.0), (12, 70.0)])];
        let plan = form_layers(&blocks, &[4, 8, 12]).unwrap();
        assert_eq!(plan.passes_for_decode(0, None), 3);
        assert_eq!(plan.passes_for_decode(0, Some(1)), 1);
        assert_eq!(plan.passes_for_decode(0, Some(2)), 2);
        assert_eq!(plan.passes_for_decode(0, Some(10)), 3);
        assert_eq!(plan.passes_for_decode(0, Some(0)), 0);
    }
}
