use serde::{Deserialize, Serialize};

/// Modulating-signal source for the AM/FM/FSK families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ModSource {
    #[default]
    Internal,
    External,
    /// Internal and external summed (AM only on this device family).
    Both,
}

impl ModSource {
    pub fn scpi_name(&self) -> &'static str {
        match self {
            ModSource::Internal => "INT",
            ModSource::External => "EXT",
            ModSource::Both => "BOTH",
        }
    }
}

/// Burst gate source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BurstSource {
    #[default]
    Internal,
    External,
    Bus,
}

impl BurstSource {
    pub fn scpi_name(&self) -> &'static str {
        match self {
            BurstSource::Internal => "INT",
            BurstSource::External => "EXT",
            BurstSource::Bus => "BUS",
        }
    }
}

/// Trigger source for sweep/burst triggering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TriggerSource {
    #[default]
    Immediate,
    External,
    Bus,
}

impl TriggerSource {
    pub fn scpi_name(&self) -> &'static str {
        match self {
            TriggerSource::Immediate => "IMM",
            TriggerSource::External => "EXT",
            TriggerSource::Bus => "BUS",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_scpi_names() {
        assert_eq!(ModSource::Internal.scpi_name(), "INT");
        assert_eq!(ModSource::Both.scpi_name(), "BOTH");
        assert_eq!(BurstSource::Bus.scpi_name(), "BUS");
        assert_eq!(TriggerSource::Immediate.scpi_name(), "IMM");
    }
}
