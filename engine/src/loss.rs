//! A seedable gate used to simulate datagram loss on an otherwise reliable
//! transport, so the ARQ disciplines above it can be exercised
//! deterministically in tests.

use rand::RngCore;

pub struct LossInjector<R: RngCore> {
    rng: R,
    /// Probability, in `[0.0, 1.0]`, that any given call to `should_drop`
    /// reports a drop.
    rate: f64,
}

impl<R: RngCore> LossInjector<R> {
    pub fn new(rng: R, rate: f64) -> Self {
        LossInjector {
            rng,
            rate: rate.clamp(0.0, 1.0),
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn set_rate(&mut self, rate: f64) {
        self.rate = rate.clamp(0.0, 1.0);
    }

    /// Draws one uniform sample and reports whether this datagram should be
    /// dropped, mirroring `random.random() < self.packet_loss_rate` in the
    /// reference implementation.
    pub fn should_drop(&mut self) -> bool {
        if self.rate <= 0.0 {
            return false;
        }
        if self.rate >= 1.0 {
            return true;
        }
        let sample = (self.rng.next_u64() as f64) / (u64::MAX as f64);
        sample < self.rate
    }
}
