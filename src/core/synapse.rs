/// First-order low-pass synapse, discretized with a zero-order hold so the
/// response does not depend on `dt` for piecewise-constant inputs.
#[derive(Debug, Clone)]
pub struct Lowpass {
    decay: f64,
    state: Vec<f64>,
}

impl Lowpass {
    /// `tau <= 0` gives a pass-through filter.
    pub fn new(tau: f64, dt: f64, size: usize) -> Self {
        let decay = if tau > 0.0 { (-dt / tau).exp() } else { 0.0 };
        Self {
            decay,
            state: vec![0.0; size],
        }
    }

    /// Advance one step and return the filtered signal.
    pub fn filter(&mut self, input: &[f64]) -> &[f64] {
        let keep = self.decay;
        let gain = 1.0 - keep;
        for (s, &x) in self.state.iter_mut().zip(input) {
            *s = keep * *s + gain * x;
        }
        &self.state
    }

    pub fn output(&self) -> &[f64] {
        &self.state
    }
}
