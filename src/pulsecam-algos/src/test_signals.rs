use rand::{SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Normal};
use std::f64::consts::PI;

pub fn sinusoid(freq_hz: f64, amplitude: f64, dc: f64, count: usize, rate: f64) -> Vec<f64> {
    (0..count)
        .map(|i| dc + amplitude * (2.0 * PI * freq_hz * i as f64 / rate).sin())
        .collect()
}

pub fn noisy_sinusoid(
    freq_hz: f64,
    amplitude: f64,
    dc: f64,
    count: usize,
    rate: f64,
    noise: f64,
    seed: u64,
) -> Vec<f64> {
    let clean = sinusoid(freq_hz, amplitude, dc, count, rate);
    if noise <= 0.0 {
        return clean;
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0, noise).unwrap();
    clean
        .into_iter()
        .map(|v| v + normal.sample(&mut rng))
        .collect()
}
