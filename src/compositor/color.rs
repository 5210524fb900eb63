//! Color-correction state tracking
//!
//! A single color-conversion transform (3x3 matrix plus pre/post offsets) can
//! be active at a time. It must be applied by exactly one path per frame:
//! either the display hardware programs it into its registers, or the GPU
//! applies it inline while compositing; never both, or content would be
//! corrected twice. The [`ColorConversionStateMachine`] tracks which path
//! currently owns the transform and when the display registers have to be
//! cleared before a GPU-composited frame.

/// A color-conversion transform: `out = coefficients * (in + preoffsets) +
/// postoffsets`, per pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorConversion {
    /// Row-major 3x3 matrix
    pub coefficients: [f32; 9],
    /// Offsets added to each channel before the matrix
    pub preoffsets: [f32; 3],
    /// Offsets added to each channel after the matrix
    pub postoffsets: [f32; 3],
}

impl ColorConversion {
    /// The identity transform; setting it deactivates color conversion.
    pub const IDENTITY: ColorConversion = ColorConversion {
        coefficients: [1., 0., 0., 0., 1., 0., 0., 0., 1.],
        preoffsets: [0.; 3],
        postoffsets: [0.; 3],
    };

    /// Whether this transform leaves pixels untouched.
    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

impl Default for ColorConversion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    /// Nothing set, display registers clean.
    NoPendingData,
    /// A transform is set but has not reached the display registers.
    Pending(ColorConversion),
    /// A transform is set and the display registers hold one.
    ///
    /// The hardware path re-applies the transform on every frame it
    /// composites; the GPU path must clear the registers before use.
    AppliedToDisplay(ColorConversion),
    /// No transform is set anymore, but the display registers still hold an
    /// older one that the next GPU-composited frame must clear.
    AppliedAwaitingClear,
}

/// Tracks which composition path currently owns the color transform.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorConversionStateMachine {
    state: State,
}

impl Default for ColorConversionStateMachine {
    fn default() -> Self {
        ColorConversionStateMachine {
            state: State::NoPendingData,
        }
    }
}

impl ColorConversionStateMachine {
    /// Set the transform to apply from the next frame on.
    ///
    /// Setting the identity transform deactivates color conversion; if the
    /// display registers currently hold a transform they stay dirty until the
    /// next GPU-composited frame clears them (the hardware path simply stops
    /// re-programming them).
    pub fn set_data(&mut self, data: ColorConversion) {
        let display_dirty = matches!(
            self.state,
            State::AppliedToDisplay(_) | State::AppliedAwaitingClear
        );
        self.state = match (display_dirty, data.is_identity()) {
            (false, true) => State::NoPendingData,
            (false, false) => State::Pending(data),
            (true, true) => State::AppliedAwaitingClear,
            (true, false) => State::AppliedToDisplay(data),
        };
    }

    /// The transform the current frame should apply, if any.
    pub fn data_to_apply(&self) -> Option<ColorConversion> {
        match self.state {
            State::Pending(data) | State::AppliedToDisplay(data) => Some(data),
            State::NoPendingData | State::AppliedAwaitingClear => None,
        }
    }

    /// A hardware-composited configuration carrying the transform was
    /// committed; the display registers now own it.
    pub fn apply_config_succeeded(&mut self) {
        if let State::Pending(data) = self.state {
            self.state = State::AppliedToDisplay(data);
        }
    }

    /// Whether the display registers hold a transform that must be cleared
    /// before GPU composition.
    pub fn gpu_requires_display_clearing(&self) -> bool {
        matches!(
            self.state,
            State::AppliedToDisplay(_) | State::AppliedAwaitingClear
        )
    }

    /// The display registers were reset to identity.
    pub fn display_cleared(&mut self) {
        self.state = match self.state {
            State::AppliedToDisplay(data) => State::Pending(data),
            State::AppliedAwaitingClear => State::NoPendingData,
            other => other,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transform() -> ColorConversion {
        ColorConversion {
            coefficients: [0.5, 0., 0., 0., 0.5, 0., 0., 0., 0.5],
            preoffsets: [0.1, 0.1, 0.1],
            postoffsets: [0.; 3],
        }
    }

    #[test]
    fn starts_with_nothing_to_apply() {
        let machine = ColorConversionStateMachine::default();
        assert_eq!(machine.data_to_apply(), None);
        assert!(!machine.gpu_requires_display_clearing());
    }

    #[test]
    fn set_data_becomes_pending_for_both_paths() {
        let mut machine = ColorConversionStateMachine::default();
        machine.set_data(transform());
        assert_eq!(machine.data_to_apply(), Some(transform()));
        // Not on the display yet, nothing for the GPU path to clear.
        assert!(!machine.gpu_requires_display_clearing());
    }

    #[test]
    fn hardware_commit_moves_ownership_to_display() {
        let mut machine = ColorConversionStateMachine::default();
        machine.set_data(transform());
        machine.apply_config_succeeded();
        // Still re-applied on every hardware frame.
        assert_eq!(machine.data_to_apply(), Some(transform()));
        // A GPU frame now has to clear the registers first.
        assert!(machine.gpu_requires_display_clearing());
    }

    #[test]
    fn gpu_clearing_hands_ownership_back() {
        let mut machine = ColorConversionStateMachine::default();
        machine.set_data(transform());
        machine.apply_config_succeeded();
        machine.display_cleared();
        assert!(!machine.gpu_requires_display_clearing());
        // The transform itself is still live, now applied inline by the GPU.
        assert_eq!(machine.data_to_apply(), Some(transform()));
    }

    #[test]
    fn identity_after_display_apply_still_requires_clearing() {
        let mut machine = ColorConversionStateMachine::default();
        machine.set_data(transform());
        machine.apply_config_succeeded();
        machine.set_data(ColorConversion::IDENTITY);
        assert_eq!(machine.data_to_apply(), None);
        assert!(machine.gpu_requires_display_clearing());
        machine.display_cleared();
        assert!(!machine.gpu_requires_display_clearing());
        assert_eq!(machine.data_to_apply(), None);
    }

    #[test]
    fn commit_without_pending_data_is_a_no_op() {
        let mut machine = ColorConversionStateMachine::default();
        machine.apply_config_succeeded();
        assert_eq!(machine.data_to_apply(), None);
        assert!(!machine.gpu_requires_display_clearing());
    }
}
