//! Konferenzraum mit Mix-Minus-Tabelle
//!
//! Mix-Minus: jeder Teilnehmer hoert alle anderen, nie sich selbst. Die
//! Quellmenge jedes Teilnehmers wird bei jedem Beitritt und Austritt fuer
//! alle explizit neu berechnet, damit `quellen()` ohne Ableitung auskommt.
//!
//! Invarianten nach jeder oeffentlichen Operation:
//! - Schluessel von `mix_minus` == Schluessel von `teilnehmer`
//! - `mix_minus[p]` == alle Teilnehmer ausser `p`
//!
//! Ein Raum versendet selbst keine Events; das macht der Router.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use voxbridge_core::{ParticipantId, RoomId};

use crate::error::{ConferenceError, ConferenceResult};
use crate::participant::{millis_seit, Participant};

#[derive(Debug)]
pub struct ConferenceRoom {
    id: RoomId,
    conference_id: String,
    teilnehmer: BTreeMap<ParticipantId, Participant>,
    mix_minus: BTreeMap<ParticipantId, BTreeSet<ParticipantId>>,
    aktiver_sprecher: Option<ParticipantId>,
    letzter_sprecherwechsel: DateTime<Utc>,
    gesperrt: bool,
    erstellt: DateTime<Utc>,
}

impl ConferenceRoom {
    pub fn neu(id: RoomId, conference_id: impl Into<String>) -> Self {
        let jetzt = Utc::now();
        Self {
            id,
            conference_id: conference_id.into(),
            teilnehmer: BTreeMap::new(),
            mix_minus: BTreeMap::new(),
            aktiver_sprecher: None,
            letzter_sprecherwechsel: jetzt,
            gesperrt: false,
            erstellt: jetzt,
        }
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub fn anzahl(&self) -> usize {
        self.teilnehmer.len()
    }

    pub fn ist_leer(&self) -> bool {
        self.teilnehmer.is_empty()
    }

    pub fn ist_gesperrt(&self) -> bool {
        self.gesperrt
    }

    pub fn sperren(&mut self, gesperrt: bool) {
        self.gesperrt = gesperrt;
    }

    pub fn teilnehmer(&self, id: &ParticipantId) -> Option<&Participant> {
        self.teilnehmer.get(id)
    }

    pub fn teilnehmer_ids(&self) -> Vec<ParticipantId> {
        self.teilnehmer.keys().cloned().collect()
    }

    pub fn aktiver_sprecher(&self) -> Option<&ParticipantId> {
        self.aktiver_sprecher.as_ref()
    }

    /// Fuegt einen Teilnehmer hinzu und berechnet alle Quellmengen neu
    pub fn hinzufuegen(&mut self, teilnehmer: Participant) -> ConferenceResult<()> {
        if self.teilnehmer.contains_key(&teilnehmer.id) {
            return Err(ConferenceError::DuplicateParticipant {
                room_id: self.id.clone(),
                participant: teilnehmer.id,
            });
        }
        if self.gesperrt {
            return Err(ConferenceError::RoomLocked(self.id.clone()));
        }

        let neu = teilnehmer.id.clone();
        self.teilnehmer.insert(neu.clone(), teilnehmer);
        self.mix_minus_berechnen(&neu);

        let andere: Vec<ParticipantId> = self
            .teilnehmer
            .keys()
            .filter(|id| **id != neu)
            .cloned()
            .collect();
        for id in &andere {
            self.mix_minus_berechnen(id);
        }
        Ok(())
    }

    /// Entfernt einen Teilnehmer; `None` wenn er nicht im Raum war
    pub fn entfernen(&mut self, id: &ParticipantId) -> Option<Participant> {
        let teilnehmer = self.teilnehmer.remove(id)?;
        self.mix_minus.remove(id);
        if self.aktiver_sprecher.as_ref() == Some(id) {
            self.aktiver_sprecher = None;
        }

        let verbleibend = self.teilnehmer_ids();
        for andere in &verbleibend {
            self.mix_minus_berechnen(andere);
        }
        Some(teilnehmer)
    }

    /// Quellmenge fuer `id`: alle anderen Teilnehmer, sortiert
    pub fn quellen(&self, id: &ParticipantId) -> Vec<ParticipantId> {
        self.mix_minus
            .get(id)
            .map(|quellen| quellen.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Markiert `id` als sprechend und setzt den aktiven Sprecher
    ///
    /// Letzter Schreiber gewinnt, kein Debouncing.
    pub fn sprechen(&mut self, id: &ParticipantId) -> ConferenceResult<&Participant> {
        let teilnehmer = self.teilnehmer.get_mut(id).ok_or_else(|| {
            ConferenceError::UnknownParticipant {
                room_id: self.id.clone(),
                participant: id.clone(),
            }
        })?;
        teilnehmer.speaking = true;
        self.aktiver_sprecher = Some(id.clone());
        self.letzter_sprecherwechsel = Utc::now();
        Ok(teilnehmer)
    }

    pub fn stille(&mut self, id: &ParticipantId) -> ConferenceResult<()> {
        let teilnehmer = self.teilnehmer.get_mut(id).ok_or_else(|| {
            ConferenceError::UnknownParticipant {
                room_id: self.id.clone(),
                participant: id.clone(),
            }
        })?;
        teilnehmer.speaking = false;
        if self.aktiver_sprecher.as_ref() == Some(id) {
            self.aktiver_sprecher = None;
        }
        Ok(())
    }

    pub fn statistik(&self) -> RoomStats {
        RoomStats {
            room_id: self.id.clone(),
            conference_id: self.conference_id.clone(),
            participant_count: self.teilnehmer.len(),
            participants: self
                .teilnehmer
                .values()
                .map(|t| ParticipantStats {
                    id: t.id.clone(),
                    name: t.name.clone(),
                    language: t.language.clone(),
                    speaking: t.speaking,
                    dauer_ms: t.dauer_ms(),
                })
                .collect(),
            active_speaker: self.aktiver_sprecher.clone(),
            seit_sprecherwechsel_ms: millis_seit(self.letzter_sprecherwechsel),
            dauer_ms: millis_seit(self.erstellt),
            locked: self.gesperrt,
        }
    }

    fn mix_minus_berechnen(&mut self, fuer: &ParticipantId) {
        let quellen: BTreeSet<ParticipantId> = self
            .teilnehmer
            .keys()
            .filter(|id| *id != fuer)
            .cloned()
            .collect();
        self.mix_minus.insert(fuer.clone(), quellen);
    }
}

// ---------------------------------------------------------------------------
// Statistik
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantStats {
    pub id: ParticipantId,
    pub name: String,
    pub language: String,
    pub speaking: bool,
    pub dauer_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomStats {
    pub room_id: RoomId,
    pub conference_id: String,
    pub participant_count: usize,
    pub participants: Vec<ParticipantStats>,
    pub active_speaker: Option<ParticipantId>,
    /// Seit dem letzten Sprecherwechsel (bzw. seit Erstellung)
    pub seit_sprecherwechsel_ms: u64,
    pub dauer_ms: u64,
    pub locked: bool,
}
