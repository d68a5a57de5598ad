use serde::{Deserialize, Serialize};

/// Output waveform shape selectable on the instrument.
///
/// `User` selects whichever arbitrary waveform is active in the
/// instrument's user memory; the others are built-in analytic shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WaveShape {
    #[default]
    Sine,
    Square,
    Triangle,
    Ramp,
    Noise,
    Dc,
    User,
}

impl WaveShape {
    /// The shape mnemonic as it appears on the wire (`FUNC <shape>`,
    /// `APPL:<shape> ...`).
    pub fn scpi_name(&self) -> &'static str {
        match self {
            WaveShape::Sine => "SIN",
            WaveShape::Square => "SQU",
            WaveShape::Triangle => "TRI",
            WaveShape::Ramp => "RAMP",
            WaveShape::Noise => "NOIS",
            WaveShape::Dc => "DC",
            WaveShape::User => "USER",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            WaveShape::Sine => "Sine",
            WaveShape::Square => "Square",
            WaveShape::Triangle => "Triangle",
            WaveShape::Ramp => "Ramp",
            WaveShape::Noise => "Noise",
            WaveShape::Dc => "DC",
            WaveShape::User => "User",
        }
    }

    pub fn all() -> Vec<WaveShape> {
        vec![
            WaveShape::Sine,
            WaveShape::Square,
            WaveShape::Triangle,
            WaveShape::Ramp,
            WaveShape::Noise,
            WaveShape::Dc,
            WaveShape::User,
        ]
    }

    pub fn from_index(index: i32) -> Option<WaveShape> {
        Self::all().into_iter().nth(index.try_into().ok()?)
    }
}

/// Internal modulating-waveform shape for the AM/FM/FSK internal source.
///
/// A subset of [`WaveShape`]: the internal modulator cannot be DC or a user
/// arb on this device family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ModShape {
    #[default]
    Sine,
    Square,
    Triangle,
    Ramp,
    Noise,
}

impl ModShape {
    pub fn scpi_name(&self) -> &'static str {
        match self {
            ModShape::Sine => "SIN",
            ModShape::Square => "SQU",
            ModShape::Triangle => "TRI",
            ModShape::Ramp => "RAMP",
            ModShape::Noise => "NOIS",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_scpi_names() {
        assert_eq!(WaveShape::Sine.scpi_name(), "SIN");
        assert_eq!(WaveShape::Square.scpi_name(), "SQU");
        assert_eq!(WaveShape::Ramp.scpi_name(), "RAMP");
        assert_eq!(WaveShape::User.scpi_name(), "USER");
    }

    #[test]
    fn shape_from_index() {
        assert_eq!(WaveShape::from_index(0), Some(WaveShape::Sine));
        assert_eq!(WaveShape::from_index(6), Some(WaveShape::User));
        assert_eq!(WaveShape::from_index(7), None);
        assert_eq!(WaveShape::from_index(-1), None);
    }

    #[test]
    fn default_shape_is_sine() {
        assert_eq!(WaveShape::default(), WaveShape::Sine);
        assert_eq!(ModShape::default(), ModShape::Sine);
    }
}
