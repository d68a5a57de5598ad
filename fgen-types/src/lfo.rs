use serde::{Deserialize, Serialize};

/// Software-LFO waveform shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LfoShape {
    Sine,
    Triangle,
    Square,
    Ramp,
}

impl LfoShape {
    pub fn name(&self) -> &'static str {
        match self {
            LfoShape::Sine => "Sine",
            LfoShape::Triangle => "Triangle",
            LfoShape::Square => "Square",
            LfoShape::Ramp => "Ramp",
        }
    }

    pub fn all() -> Vec<LfoShape> {
        vec![
            LfoShape::Sine,
            LfoShape::Triangle,
            LfoShape::Square,
            LfoShape::Ramp,
        ]
    }

    pub fn from_name(name: &str) -> Option<LfoShape> {
        match name {
            "Sine" => Some(LfoShape::Sine),
            "Triangle" => Some(LfoShape::Triangle),
            "Square" => Some(LfoShape::Square),
            "Ramp" => Some(LfoShape::Ramp),
            _ => None,
        }
    }
}

/// Device parameter a software LFO modulates around its cached base value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LfoTarget {
    Frequency,
    Amplitude,
    DutyCycle,
    AmDepth,
    FmDeviation,
}

impl LfoTarget {
    pub fn name(&self) -> &'static str {
        match self {
            LfoTarget::Frequency => "FREQUENCY",
            LfoTarget::Amplitude => "AMPLITUDE",
            LfoTarget::DutyCycle => "DUTY",
            LfoTarget::AmDepth => "AM_DEPTH",
            LfoTarget::FmDeviation => "FM_DEV",
        }
    }

    pub fn from_name(name: &str) -> Option<LfoTarget> {
        match name {
            "FREQUENCY" => Some(LfoTarget::Frequency),
            "AMPLITUDE" => Some(LfoTarget::Amplitude),
            "DUTY" => Some(LfoTarget::DutyCycle),
            "AM_DEPTH" => Some(LfoTarget::AmDepth),
            "FM_DEV" => Some(LfoTarget::FmDeviation),
            _ => None,
        }
    }
}

/// Runtime configuration of one software LFO instance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LfoConfig {
    pub enabled: bool,
    /// Modulation rate in Hz.
    pub rate: f64,
    /// Unitless depth multiplier applied to the shape output.
    pub depth: f64,
    pub shape: LfoShape,
    pub target: LfoTarget,
}

impl Default for LfoConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rate: 1.0,
            depth: 0.1,
            shape: LfoShape::Sine,
            target: LfoTarget::Frequency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lfo_shape_names_round_trip() {
        for shape in LfoShape::all() {
            assert_eq!(LfoShape::from_name(shape.name()), Some(shape));
        }
        assert_eq!(LfoShape::from_name("unknown"), None);
    }

    #[test]
    fn lfo_target_names_round_trip() {
        assert_eq!(LfoTarget::from_name("FREQUENCY"), Some(LfoTarget::Frequency));
        assert_eq!(LfoTarget::from_name("AM_DEPTH"), Some(LfoTarget::AmDepth));
        assert_eq!(LfoTarget::from_name("FM_DEV"), Some(LfoTarget::FmDeviation));
        assert_eq!(LfoTarget::from_name("frequency"), None);
    }

    #[test]
    fn lfo_config_default() {
        let cfg = LfoConfig::default();
        assert!(!cfg.enabled);
        assert_eq!(cfg.rate, 1.0);
        assert_eq!(cfg.depth, 0.1);
        assert_eq!(cfg.shape, LfoShape::Sine);
        assert_eq!(cfg.target, LfoTarget::Frequency);
    }
}
