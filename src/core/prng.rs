// Minimal PRNG (no external crates).
//
// This is NOT cryptographically secure.
// It drives unit placement, intercept sampling and spiking initial state so
// that a given seed always builds the same network.

#[derive(Debug, Clone)]
pub struct Prng {
    state: u64,
}

impl Prng {
    pub fn new(seed: u64) -> Self {
        // Avoid a zero state.
        let seed = if seed == 0 { 0x9E3779B97F4A7C15 } else { seed };
        Self { state: seed }
    }

    /// Derive an independent stream, e.g. one per population.
    pub fn fork(&mut self, salt: u64) -> Self {
        let mixed = self.next_u64() ^ salt.wrapping_mul(0xBF58476D1CE4E5B9);
        Self::new(mixed)
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        // xorshift64*
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    /// Uniform in [0,1) with 53 bits of precision.
    #[inline]
    pub fn next_f64_01(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    #[inline]
    pub fn gen_range_f64(&mut self, low: f64, high: f64) -> f64 {
        low + (high - low) * self.next_f64_01()
    }

    /// Standard normal sample (Box-Muller, one branch).
    pub fn gaussian(&mut self) -> f64 {
        // 1 - u keeps the log argument in (0, 1].
        let u1 = 1.0 - self.next_f64_01();
        let u2 = self.next_f64_01();
        (-2.0 * u1.ln()).sqrt() * (2.0 * core::f64::consts::PI * u2).cos()
    }

    /// Triangular distribution on [low, high] peaking at `mode`.
    pub fn triangular(&mut self, low: f64, mode: f64, high: f64) -> f64 {
        let span = high - low;
        if span <= 0.0 {
            return low;
        }
        let u = self.next_f64_01();
        let split = (mode - low) / span;
        if u < split {
            low + (u * span * (mode - low)).sqrt()
        } else {
            high - ((1.0 - u) * span * (high - mode)).sqrt()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let mut a = Prng::new(7);
        let mut b = Prng::new(7);
        for _ in 0..32 {
            assert_eq!(a.next_f64_01(), b.next_f64_01());
        }
    }

    #[test]
    fn triangular_stays_in_support_and_leans_to_mode() {
        let mut rng = Prng::new(3);
        let mut below_mode = 0usize;
        for _ in 0..4000 {
            let x = rng.triangular(-0.5, 0.4, 0.5);
            assert!((-0.5..=0.5).contains(&x));
            if x < 0.4 {
                below_mode += 1;
            }
        }
        // P(x < mode) = (mode - low) / (high - low) = 0.9
        let frac = below_mode as f64 / 4000.0;
        assert!((frac - 0.9).abs() < 0.03, "frac={frac}");
    }

    #[test]
    fn gaussian_has_unit_variance() {
        let mut rng = Prng::new(11);
        let n = 20_000;
        let samples: Vec<f64> = (0..n).map(|_| rng.gaussian()).collect();
        let mean = samples.iter().sum::<f64>() / n as f64;
        let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;
        assert!(mean.abs() < 0.05);
        assert!((var - 1.0).abs() < 0.05);
    }
}
