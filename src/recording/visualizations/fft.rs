//! In-place iterative radix-2 FFT.

use rustfft::num_complex::Complex;
use std::f32::consts::PI;

/// Forward FFT of `data` in place. The length must be a power of two.
pub fn fft_in_place(data: &mut [Complex<f32>]) {
    let n = data.len();
    debug_assert!(n.is_power_of_two(), "FFT length {n} is not a power of two");
    if n < 2 {
        return;
    }

    // Bit-reversal permutation
    let mut j = 0usize;
    for i in 1..n - 1 {
        let mut bit = n >> 1;
        while j >= bit {
            j -= bit;
            bit >>= 1;
        }
        j += bit;
        if i < j {
            data.swap(i, j);
        }
    }

    let mut len = 2;
    while len <= n {
        let angle = -2.0 * PI / len as f32;
        let step = Complex::new(angle.cos(), angle.sin());
        let half = len / 2;
        for block in data.chunks_exact_mut(len) {
            let mut twiddle = Complex::new(1.0f32, 0.0);
            for k in 0..half {
                let u = block[k];
                let v = block[k + half] * twiddle;
                block[k] = u + v;
                block[k + half] = u - v;
                twiddle *= step;
            }
        }
        len <<= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustfft::FftPlanner;

    fn assert_close(actual: &[Complex<f32>], expected: &[Complex<f32>], tolerance: f32) {
        for (index, (a, e)) in actual.iter().zip(expected).enumerate() {
            assert!(
                (a - e).norm() <= tolerance,
                "bin {index}: {a} vs {e}"
            );
        }
    }

    #[test]
    fn test_matches_rustfft() {
        for &n in &[2usize, 8, 64, 1024] {
            let input: Vec<Complex<f32>> = (0..n)
                .map(|i| {
                    let t = i as f32;
                    Complex::new((t * 0.37).sin() + 0.25 * (t * 1.9).cos(), 0.0)
                })
                .collect();

            let mut ours = input.clone();
            fft_in_place(&mut ours);

            let mut reference = input;
            FftPlanner::<f32>::new()
                .plan_fft_forward(n)
                .process(&mut reference);

            let peak = reference.iter().map(|c| c.norm()).fold(1.0f32, f32::max);
            assert_close(&ours, &reference, peak * 1e-3);
        }
    }

    #[test]
    fn test_impulse_is_flat() {
        let mut data = vec![Complex::new(0.0f32, 0.0); 16];
        data[0] = Complex::new(1.0, 0.0);
        fft_in_place(&mut data);
        for bin in &data {
            assert!((bin.re - 1.0).abs() < 1e-6);
            assert!(bin.im.abs() < 1e-6);
        }
    }

    #[test]
    fn test_single_tone_peaks_at_its_bin() {
        let n = 256;
        let bin = 10;
        let mut data: Vec<Complex<f32>> = (0..n)
            .map(|i| Complex::new((2.0 * PI * bin as f32 * i as f32 / n as f32).cos(), 0.0))
            .collect();
        fft_in_place(&mut data);

        let peak = data[..n / 2]
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.norm().total_cmp(&b.1.norm()))
            .map(|(i, _)| i);
        assert_eq!(peak, Some(bin));
        assert!((data[bin].norm() - n as f32 / 2.0).abs() < 0.5);
    }
}
