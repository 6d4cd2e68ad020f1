use std::time::Duration;

/// Backoff multiplicativo con tope.
///
/// `next_delay` devuelve la espera actual (acotada por `max`) y deja
/// preparada la siguiente; `reset` vuelve al valor inicial.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    factor: f64,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, factor: f64) -> Self {
        Self {
            initial,
            max,
            factor,
            current: initial,
        }
    }

    /// Espera que se aplicaría ahora mismo.
    pub fn current(&self) -> Duration {
        self.current.min(self.max)
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current();
        self.current = self.current.mul_f64(self.factor).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}
