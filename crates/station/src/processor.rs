//! Austauschbare Verarbeitungsstufe einer Station

use voxbridge_protocol::pcm::verstaerkung_anwenden;

use crate::config::StationConfig;
use crate::error::StationResult;

/// Verarbeitet einen PCM16-Block vor dem Puffern
///
/// Eine leere Ausgabe ist kein Fehler; der Block wird dann nicht gepuffert.
/// Ein `Err` betrifft nur diesen einen Block.
pub trait AudioProcessor: Send + Sync + 'static {
    fn verarbeiten(&self, pcm: &[u8], config: &StationConfig) -> StationResult<Vec<u8>>;

    fn name(&self) -> &'static str {
        "custom"
    }
}

/// Standard-Stufe: lineare Eingangsverstaerkung mit Clipping
#[derive(Debug, Default, Clone, Copy)]
pub struct GainProcessor;

impl AudioProcessor for GainProcessor {
    fn verarbeiten(&self, pcm: &[u8], config: &StationConfig) -> StationResult<Vec<u8>> {
        if config.input_gain == 1.0 {
            return Ok(pcm.to_vec());
        }
        Ok(verstaerkung_anwenden(pcm, config.input_gain))
    }

    fn name(&self) -> &'static str {
        "gain"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gain_eins_kopiert_unveraendert() {
        let daten = vec![1, 2, 3];
        let ausgabe = GainProcessor
            .verarbeiten(&daten, &StationConfig::default())
            .unwrap();
        assert_eq!(ausgabe, daten);
    }

    #[test]
    fn gain_wird_angewendet() {
        let config = StationConfig {
            input_gain: 3.0,
            ..StationConfig::default()
        };
        let ausgabe = GainProcessor
            .verarbeiten(&20000i16.to_le_bytes(), &config)
            .unwrap();
        assert_eq!(ausgabe, i16::MAX.to_le_bytes().to_vec());
    }
}
