// shaping.rs - Height curves and dynamic amplification
//
// Shaping maps normalised depth to normalised height. Amplification stretches
// the inside heights around their mean by a factor derived from how much of
// the frame the subject covers and how much its depth varies. The result is
// clamped back to [0, 1], so amplification adds contrast, never height.

use log::debug;
use ndarray::Array2;

use crate::config::{Amplification, Shaping};
use crate::raster;

pub fn shape_value(v: f32, shaping: Shaping) -> f32 {
    let v = v.clamp(0.0, 1.0);
    match shaping {
        Shaping::Identity => v,
        Shaping::Sigmoid { steepness } if steepness > 0.0 => {
            let s = |x: f32| 1.0 / (1.0 + (-steepness * (x - 0.5)).exp());
            let (lo, hi) = (s(0.0), s(1.0));
            ((s(v) - lo) / (hi - lo)).clamp(0.0, 1.0)
        }
        Shaping::Gamma(g) if g > 0.0 && g.is_finite() => v.powf(g),
        _ => v,
    }
}

pub fn apply_shaping(field: &mut Array2<f32>, shaping: Shaping) {
    if shaping != Shaping::Identity {
        field.mapv_inplace(|v| shape_value(v, shaping));
    }
}

/// Factor in `[min, ceiling]`, or 1.0 when amplification is off or nothing
/// is inside.
pub fn amplification_factor(heights: &Array2<f32>, inside: &Array2<bool>, amp: &Amplification, ceiling: f32) -> f32 {
    if !amp.enabled {
        return 1.0;
    }
    let samples: Vec<f32> = heights.iter().zip(inside.iter()).filter(|(_, i)| **i).map(|(h, _)| *h).collect();
    if samples.is_empty() {
        return 1.0;
    }

    let coverage = samples.len() as f32 / heights.len().max(1) as f32;
    let (_, std) = raster::mean_std(samples.iter().copied());
    let (lo, hi) = samples.iter().fold((f32::MAX, f32::MIN), |(lo, hi), v| (lo.min(*v), hi.max(*v)));

    let raw = amp.base + amp.coverage_weight * coverage + amp.variance_weight * std * std + amp.range_weight * (hi - lo);
    let factor = raw.clamp(amp.min, ceiling.max(amp.min));
    debug!("amplification {factor:.2} (coverage {coverage:.3}, std {std:.3}, range {:.3})", hi - lo);
    factor
}

/// Stretch inside heights around their mean. Returns the factor used.
pub fn amplify(heights: &mut Array2<f32>, inside: &Array2<bool>, amp: &Amplification, ceiling: f32) -> f32 {
    let factor = amplification_factor(heights, inside, amp, ceiling);
    if factor == 1.0 {
        return factor;
    }
    let (mean, _) = raster::mean_std(heights.iter().zip(inside.iter()).filter(|(_, i)| **i).map(|(h, _)| *h));
    ndarray::Zip::from(heights).and(inside).for_each(|h, &i| {
        if i {
            *h = (mean + (*h - mean) * factor).clamp(0.0, 1.0);
        }
    });
    factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curves_fix_endpoints() {
        for s in [Shaping::Identity, Shaping::Sigmoid { steepness: 6.0 }, Shaping::Gamma(0.7)] {
            assert!(shape_value(0.0, s).abs() < 1e-6);
            assert!((shape_value(1.0, s) - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn sigmoid_emphasises_mid_range() {
        let s = Shaping::Sigmoid { steepness: 8.0 };
        assert!(shape_value(0.6, s) - shape_value(0.4, s) > 0.2);
        assert!(shape_value(0.1, s) < 0.1);
    }

    #[test]
    fn disabled_amplification_is_identity() {
        let h = Array2::from_shape_fn((4, 4), |(r, _)| r as f32 / 3.0);
        let inside = Array2::from_elem((4, 4), true);
        assert_eq!(amplification_factor(&h, &inside, &Amplification::default(), 2.2), 1.0);
    }

    #[test]
    fn amplification_is_bounded() {
        let mut h = Array2::from_shape_fn((8, 8), |(r, c)| ((r + c) % 5) as f32 / 4.0);
        let inside = Array2::from_elem((8, 8), true);
        let amp = Amplification { enabled: true, ..Amplification::default() };
        let f = amplify(&mut h, &inside, &amp, 2.2);
        assert!((1.2..=2.2).contains(&f));
        assert!(h.iter().all(|v| (0.0..=1.0).contains(v)));
    }
}
