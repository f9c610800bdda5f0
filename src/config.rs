//! connection level configuration.

use core::num::NonZeroUsize;

/// default upper bound of [`ControllerConfig::output_buffer_size`] when none is given.
pub const DEFAULT_OUTPUT_BUFFER_SIZE: usize = 256;

/// configuration the [`crate::proto::Controller`] is constructed with.
///
/// this is deliberately tiny: everything else (timeouts, retries, tls, ...) lives above this
/// layer, per the framing/flow-control core's scope.
#[derive(Debug, Clone, Copy)]
pub struct ControllerConfig {
    output_buffer_size: NonZeroUsize,
}

impl ControllerConfig {
    /// construct a config with the given outbound queue bound.
    ///
    /// # Panics
    /// panics if `output_buffer_size` is zero.
    pub const fn new(output_buffer_size: usize) -> Self {
        match NonZeroUsize::new(output_buffer_size) {
            Some(n) => Self { output_buffer_size: n },
            None => panic!("ControllerConfig::output_buffer_size must be a positive integer"),
        }
    }

    #[inline]
    pub const fn output_buffer_size(&self) -> usize {
        self.output_buffer_size.get()
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_BUFFER_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_positive() {
        assert_eq!(ControllerConfig::default().output_buffer_size(), DEFAULT_OUTPUT_BUFFER_SIZE);
    }

    #[test]
    #[should_panic(expected = "positive integer")]
    fn zero_panics() {
        let _ = ControllerConfig::new(0);
    }
}
