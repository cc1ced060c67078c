//! Peak analysis of reconstructed spectra.
//!
//! Location, centroid and full width at half maximum of the dominant line,
//! measured above the spectrum's minimum as baseline.

use ndarray::ArrayView1;

/// Index of the largest finite bin.
pub fn locate_peak(spectrum: ArrayView1<f64>) -> Option<usize> {
    spectrum
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
}

fn baseline(spectrum: ArrayView1<f64>) -> f64 {
    spectrum
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f64::INFINITY, f64::min)
}

/// Full width at half maximum (in bins) of the line at `peak`, with linear
/// interpolation of the half-height crossings. A line running into the edge
/// of the spectrum is measured up to the edge.
pub fn fwhm(spectrum: ArrayView1<f64>, peak: usize) -> Option<f64> {
    let n = spectrum.len();
    if peak >= n {
        return None;
    }
    let base = baseline(spectrum);
    let height = spectrum[peak] - base;
    if !(height > 0.0) {
        return None;
    }
    let half = base + 0.5 * height;

    let mut left = 0.0;
    for i in (0..peak).rev() {
        if spectrum[i] <= half {
            let frac = (spectrum[i + 1] - half) / (spectrum[i + 1] - spectrum[i]);
            left = (i + 1) as f64 - frac;
            break;
        }
    }
    let mut right = (n - 1) as f64;
    for i in (peak + 1)..n {
        if spectrum[i] <= half {
            let frac = (spectrum[i - 1] - half) / (spectrum[i - 1] - spectrum[i]);
            right = (i - 1) as f64 + frac;
            break;
        }
    }
    Some(right - left)
}

/// Baseline-subtracted centroid over `[lo, hi)`.
pub fn centroid(spectrum: ArrayView1<f64>, lo: usize, hi: usize) -> Option<f64> {
    let hi = hi.min(spectrum.len());
    if lo >= hi {
        return None;
    }
    let base = baseline(spectrum);
    let (mut weight, mut moment) = (0.0, 0.0);
    for i in lo..hi {
        let w = spectrum[i] - base;
        weight += w;
        moment += w * i as f64;
    }
    if weight > 0.0 {
        Some(moment / weight)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::gaussian_line;
    use ndarray::array;

    #[test]
    fn test_locate_peak() {
        let f = array![0.1, 0.5, 2.0, 0.4];
        assert_eq!(locate_peak(f.view()), Some(2));
        let f = array![f64::NAN, 0.5, 0.2];
        assert_eq!(locate_peak(f.view()), Some(1));
        let empty: [f64; 0] = [];
        assert_eq!(locate_peak(ArrayView1::from(&empty[..])), None);
    }

    #[test]
    fn test_fwhm_of_gaussian() {
        let width = 4.0;
        let f = gaussian_line(101, 50.0, width, 1.0, 0.0);
        let w = fwhm(f.view(), 50).unwrap();
        let expected = 2.0 * (2.0 * 2.0_f64.ln()).sqrt() * width;
        assert!((w - expected).abs() < 0.1, "fwhm {w} vs {expected}");
    }

    #[test]
    fn test_fwhm_flat_is_none() {
        let f = array![1.0, 1.0, 1.0];
        assert_eq!(fwhm(f.view(), 1), None);
        assert_eq!(fwhm(f.view(), 5), None);
    }

    #[test]
    fn test_centroid_symmetric_line() {
        let f = gaussian_line(61, 30.0, 3.0, 2.0, 0.3);
        let c = centroid(f.view(), 15, 46).unwrap();
        assert!((c - 30.0).abs() < 1e-9);
        assert_eq!(centroid(f.view(), 10, 10), None);
    }
}
