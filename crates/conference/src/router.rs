//! ConferenceRouter – Raumverwaltung und Mix-Minus-Routing
//!
//! Besitzt die Raumtabelle. Raeume entstehen beim ersten Beitritt (oder
//! explizit ueber `create_room`) und verschwinden, sobald der letzte
//! Teilnehmer gegangen ist. Aenderungen werden als `ConferenceEvent`
//! ueber einen Broadcast-Kanal verteilt.
//!
//! Thread-safe via Arc + DashMap. Clone des Routers teilt den Zustand.
//! Events werden erst versendet, nachdem die DashMap-Referenz freigegeben
//! wurde.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use voxbridge_core::{ParticipantId, RoomId};

use crate::error::{ConferenceError, ConferenceResult};
use crate::events::ConferenceEvent;
use crate::participant::Participant;
use crate::room::{ConferenceRoom, RoomStats};

/// Groesse des Broadcast-Kanals fuer Konferenz-Events
const EVENT_KANAL_GROESSE: usize = 256;

/// Statistik ueber alle Raeume
#[derive(Debug, Clone, Serialize)]
pub struct KonferenzStatistik {
    pub raeume_gesamt: usize,
    pub teilnehmer_gesamt: usize,
    pub raeume: Vec<RoomStats>,
}

#[derive(Clone)]
pub struct ConferenceRouter {
    inner: Arc<RouterInner>,
}

struct RouterInner {
    raeume: DashMap<RoomId, ConferenceRoom>,
    event_tx: broadcast::Sender<ConferenceEvent>,
}

impl Default for ConferenceRouter {
    fn default() -> Self {
        Self::neu()
    }
}

impl ConferenceRouter {
    pub fn neu() -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_KANAL_GROESSE);
        Self {
            inner: Arc::new(RouterInner {
                raeume: DashMap::new(),
                event_tx,
            }),
        }
    }

    pub fn abonnieren(&self) -> broadcast::Receiver<ConferenceEvent> {
        self.inner.event_tx.subscribe()
    }

    fn senden(&self, event: ConferenceEvent) {
        let _ = self.inner.event_tx.send(event);
    }

    // -----------------------------------------------------------------------
    // Raeume
    // -----------------------------------------------------------------------

    /// Legt einen leeren Raum an
    pub fn create_room(&self, room_id: RoomId, conference_id: impl Into<String>) -> ConferenceResult<()> {
        let conference_id = conference_id.into();
        match self.inner.raeume.entry(room_id.clone()) {
            Entry::Occupied(_) => return Err(ConferenceError::RoomExists(room_id)),
            Entry::Vacant(eintrag) => {
                eintrag.insert(ConferenceRoom::neu(room_id.clone(), conference_id.clone()));
            }
        }
        tracing::info!(room_id = %room_id, conference_id = %conference_id, "Raum erstellt");
        self.senden(ConferenceEvent::RoomCreated {
            room_id,
            conference_id,
        });
        Ok(())
    }

    /// Entfernt alle Teilnehmer einzeln und danach den Raum
    ///
    /// No-op fuer unbekannte Raeume.
    pub fn destroy(&self, room_id: &RoomId) {
        let ids = match self.inner.raeume.get(room_id) {
            Some(raum) => raum.teilnehmer_ids(),
            None => return,
        };
        for id in &ids {
            self.entfernen_intern(room_id, id);
        }
        if self.inner.raeume.remove(room_id).is_some() {
            tracing::info!(room_id = %room_id, "Raum aufgeloest");
            self.senden(ConferenceEvent::RoomDestroyed {
                room_id: room_id.clone(),
            });
        }
    }

    pub fn lock(&self, room_id: &RoomId) -> ConferenceResult<()> {
        self.sperre_setzen(room_id, true)
    }

    pub fn unlock(&self, room_id: &RoomId) -> ConferenceResult<()> {
        self.sperre_setzen(room_id, false)
    }

    fn sperre_setzen(&self, room_id: &RoomId, gesperrt: bool) -> ConferenceResult<()> {
        let mut raum = self
            .inner
            .raeume
            .get_mut(room_id)
            .ok_or_else(|| ConferenceError::UnknownRoom(room_id.clone()))?;
        raum.sperren(gesperrt);
        tracing::debug!(room_id = %room_id, gesperrt, "Raum-Sperre geaendert");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Teilnehmer
    // -----------------------------------------------------------------------

    /// Fuegt einen Teilnehmer hinzu; legt den Raum bei Bedarf an
    pub fn add_participant(
        &self,
        room_id: &RoomId,
        participant_id: ParticipantId,
        name: impl Into<String>,
        language: impl Into<String>,
        channel: impl Into<String>,
    ) -> ConferenceResult<Participant> {
        let teilnehmer = Participant::neu(participant_id, name, language, channel);

        let (ergebnis, erstellt) = {
            let (mut raum, erstellt) = match self.inner.raeume.entry(room_id.clone()) {
                Entry::Occupied(eintrag) => (eintrag.into_ref(), false),
                Entry::Vacant(eintrag) => (
                    eintrag.insert(ConferenceRoom::neu(room_id.clone(), room_id.as_str())),
                    true,
                ),
            };
            let ergebnis = raum
                .hinzufuegen(teilnehmer.clone())
                .map(|()| raum.anzahl());
            (ergebnis, erstellt)
        };

        if erstellt {
            tracing::info!(room_id = %room_id, "Raum beim ersten Beitritt erstellt");
            self.senden(ConferenceEvent::RoomCreated {
                room_id: room_id.clone(),
                conference_id: room_id.as_str().to_string(),
            });
        }

        if let Err(e) = &ergebnis {
            tracing::warn!(room_id = %room_id, fehler = %e, "Beitritt abgelehnt");
        }
        let anzahl = ergebnis?;

        tracing::info!(
            room_id = %room_id,
            participant = %teilnehmer.id,
            language = %teilnehmer.language,
            anzahl,
            "Teilnehmer beigetreten"
        );
        self.senden(ConferenceEvent::ParticipantJoined {
            room_id: room_id.clone(),
            participant: teilnehmer.id.clone(),
            name: teilnehmer.name.clone(),
            language: teilnehmer.language.clone(),
            count: anzahl,
        });
        Ok(teilnehmer)
    }

    /// Entfernt einen Teilnehmer; ein leerer Raum wird aufgeloest
    ///
    /// Unbekannte Raeume oder Teilnehmer sind ein No-op (`None`).
    pub fn remove_participant(
        &self,
        room_id: &RoomId,
        participant_id: &ParticipantId,
    ) -> Option<Participant> {
        let (teilnehmer, anzahl) = self.entfernen_intern(room_id, participant_id)?;
        if anzahl == 0
            && self
                .inner
                .raeume
                .remove_if(room_id, |_, raum| raum.ist_leer())
                .is_some()
        {
            tracing::info!(room_id = %room_id, "Leerer Raum aufgeloest");
            self.senden(ConferenceEvent::RoomDestroyed {
                room_id: room_id.clone(),
            });
        }
        Some(teilnehmer)
    }

    fn entfernen_intern(
        &self,
        room_id: &RoomId,
        participant_id: &ParticipantId,
    ) -> Option<(Participant, usize)> {
        let (teilnehmer, anzahl) = {
            let mut raum = self.inner.raeume.get_mut(room_id)?;
            let teilnehmer = raum.entfernen(participant_id)?;
            (teilnehmer, raum.anzahl())
        };
        tracing::info!(
            room_id = %room_id,
            participant = %participant_id,
            anzahl,
            "Teilnehmer ausgetreten"
        );
        self.senden(ConferenceEvent::ParticipantLeft {
            room_id: room_id.clone(),
            participant: participant_id.clone(),
            count: anzahl,
        });
        Some((teilnehmer, anzahl))
    }

    /// Quellen, die ein externer Mixer fuer `participant_id` summieren muss
    pub fn get_mix_minus_sources(
        &self,
        room_id: &RoomId,
        participant_id: &ParticipantId,
    ) -> Vec<ParticipantId> {
        self.inner
            .raeume
            .get(room_id)
            .map(|raum| raum.quellen(participant_id))
            .unwrap_or_default()
    }

    pub fn handle_participant_speaking(
        &self,
        room_id: &RoomId,
        participant_id: &ParticipantId,
    ) -> ConferenceResult<()> {
        let name = {
            let mut raum = self
                .inner
                .raeume
                .get_mut(room_id)
                .ok_or_else(|| ConferenceError::UnknownRoom(room_id.clone()))?;
            raum.sprechen(participant_id)?.name.clone()
        };
        tracing::debug!(room_id = %room_id, participant = %participant_id, "Aktiver Sprecher");
        self.senden(ConferenceEvent::ActiveSpeaker {
            room_id: room_id.clone(),
            participant: participant_id.clone(),
            name,
        });
        Ok(())
    }

    pub fn handle_participant_silence(
        &self,
        room_id: &RoomId,
        participant_id: &ParticipantId,
    ) -> ConferenceResult<()> {
        let mut raum = self
            .inner
            .raeume
            .get_mut(room_id)
            .ok_or_else(|| ConferenceError::UnknownRoom(room_id.clone()))?;
        raum.stille(participant_id)?;
        tracing::trace!(room_id = %room_id, participant = %participant_id, "Teilnehmer still");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Abfragen
    // -----------------------------------------------------------------------

    pub fn active_rooms(&self) -> Vec<RoomId> {
        let mut ids: Vec<RoomId> = self.inner.raeume.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn raum_anzahl(&self) -> usize {
        self.inner.raeume.len()
    }

    pub fn teilnehmer(&self, room_id: &RoomId, participant_id: &ParticipantId) -> Option<Participant> {
        self.inner
            .raeume
            .get(room_id)
            .and_then(|raum| raum.teilnehmer(participant_id).cloned())
    }

    pub fn aktiver_sprecher(&self, room_id: &RoomId) -> Option<ParticipantId> {
        self.inner
            .raeume
            .get(room_id)
            .and_then(|raum| raum.aktiver_sprecher().cloned())
    }

    pub fn room_stats(&self, room_id: &RoomId) -> Option<RoomStats> {
        self.inner.raeume.get(room_id).map(|raum| raum.statistik())
    }

    pub fn all_stats(&self) -> KonferenzStatistik {
        let mut raeume: Vec<RoomStats> = self.inner.raeume.iter().map(|r| r.statistik()).collect();
        raeume.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        KonferenzStatistik {
            raeume_gesamt: raeume.len(),
            teilnehmer_gesamt: raeume.iter().map(|r| r.participant_count).sum(),
            raeume,
        }
    }

    /// Loest alle Raeume auf
    pub fn shutdown(&self) {
        let ids = self.active_rooms();
        tracing::info!(raeume = ids.len(), "ConferenceRouter wird heruntergefahren");
        for id in &ids {
            self.destroy(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raum() -> RoomId {
        RoomId::from("konferenz")
    }

    fn beitreten(router: &ConferenceRouter, id: &str) {
        router
            .add_participant(&raum(), ParticipantId::from(id), id, "de", format!("conn-{id}"))
            .unwrap();
    }

    fn quellen(router: &ConferenceRouter, id: &str) -> Vec<String> {
        router
            .get_mix_minus_sources(&raum(), &ParticipantId::from(id))
            .into_iter()
            .map(|p| p.0)
            .collect()
    }

    fn alle_events(rx: &mut broadcast::Receiver<ConferenceEvent>) -> Vec<ConferenceEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn mix_minus_symmetrie_und_aufloesung() {
        let router = ConferenceRouter::neu();
        for id in ["a", "b", "c"] {
            beitreten(&router, id);
        }
        assert_eq!(quellen(&router, "a"), vec!["b", "c"]);
        assert_eq!(quellen(&router, "b"), vec!["a", "c"]);
        assert_eq!(quellen(&router, "c"), vec!["a", "b"]);

        router.remove_participant(&raum(), &"b".into()).unwrap();
        assert_eq!(quellen(&router, "a"), vec!["c"]);
        assert_eq!(quellen(&router, "c"), vec!["a"]);
        assert_eq!(router.active_rooms(), vec![raum()]);

        router.remove_participant(&raum(), &"a".into()).unwrap();
        assert_eq!(router.raum_anzahl(), 1);
        router.remove_participant(&raum(), &"c".into()).unwrap();
        assert_eq!(router.raum_anzahl(), 0);
        assert!(quellen(&router, "c").is_empty());
    }

    #[test]
    fn events_in_reihenfolge() {
        let router = ConferenceRouter::neu();
        let mut rx = router.abonnieren();
        beitreten(&router, "a");
        beitreten(&router, "b");
        router.remove_participant(&raum(), &"a".into());
        router.remove_participant(&raum(), &"b".into());

        let events = alle_events(&mut rx);
        assert!(matches!(events[0], ConferenceEvent::RoomCreated { .. }));
        assert!(matches!(events[1], ConferenceEvent::ParticipantJoined { count: 1, .. }));
        assert!(matches!(events[2], ConferenceEvent::ParticipantJoined { count: 2, .. }));
        assert!(matches!(events[3], ConferenceEvent::ParticipantLeft { count: 1, .. }));
        assert!(matches!(events[4], ConferenceEvent::ParticipantLeft { count: 0, .. }));
        assert!(matches!(events[5], ConferenceEvent::RoomDestroyed { .. }));
        assert_eq!(events.len(), 6);
    }

    #[test]
    fn duplikat_ist_fehler() {
        let router = ConferenceRouter::neu();
        beitreten(&router, "a");
        let fehler = router
            .add_participant(&raum(), "a".into(), "A", "en", "x")
            .unwrap_err();
        assert_eq!(
            fehler,
            ConferenceError::DuplicateParticipant {
                room_id: raum(),
                participant: "a".into(),
            }
        );
        assert_eq!(router.room_stats(&raum()).unwrap().participant_count, 1);
    }

    #[test]
    fn entfernen_unbekannter_ist_noop() {
        let router = ConferenceRouter::neu();
        let mut rx = router.abonnieren();
        assert!(router.remove_participant(&raum(), &"x".into()).is_none());
        beitreten(&router, "a");
        alle_events(&mut rx);
        assert!(router.remove_participant(&raum(), &"x".into()).is_none());
        assert!(alle_events(&mut rx).is_empty());
        assert_eq!(router.raum_anzahl(), 1);
    }

    #[test]
    fn sprecher_ueber_router() {
        let router = ConferenceRouter::neu();
        beitreten(&router, "a");
        beitreten(&router, "b");
        let mut rx = router.abonnieren();

        router.handle_participant_speaking(&raum(), &"a".into()).unwrap();
        assert_eq!(router.aktiver_sprecher(&raum()), Some(ParticipantId::from("a")));
        assert_eq!(
            alle_events(&mut rx),
            vec![ConferenceEvent::ActiveSpeaker {
                room_id: raum(),
                participant: "a".into(),
                name: "a".to_string(),
            }]
        );

        router.handle_participant_silence(&raum(), &"a".into()).unwrap();
        assert!(router.aktiver_sprecher(&raum()).is_none());
        assert!(!router.teilnehmer(&raum(), &"a".into()).unwrap().speaking);
    }

    #[test]
    fn sprecher_unbekannt() {
        let router = ConferenceRouter::neu();
        assert_eq!(
            router.handle_participant_speaking(&raum(), &"a".into()),
            Err(ConferenceError::UnknownRoom(raum()))
        );
        beitreten(&router, "a");
        assert!(matches!(
            router.handle_participant_silence(&raum(), &"x".into()),
            Err(ConferenceError::UnknownParticipant { .. })
        ));
    }

    #[test]
    fn destroy_entfernt_alle_einzeln() {
        let router = ConferenceRouter::neu();
        for id in ["a", "b", "c"] {
            beitreten(&router, id);
        }
        let mut rx = router.abonnieren();
        router.destroy(&raum());

        let events = alle_events(&mut rx);
        let austritte = events
            .iter()
            .filter(|e| matches!(e, ConferenceEvent::ParticipantLeft { .. }))
            .count();
        assert_eq!(austritte, 3);
        assert_eq!(
            events.iter().filter(|e| matches!(e, ConferenceEvent::RoomDestroyed { .. })).count(),
            1
        );
        assert_eq!(router.raum_anzahl(), 0);

        // Zweiter Aufruf und unbekannter Raum sind No-ops
        router.destroy(&raum());
        router.destroy(&RoomId::from("gibt-es-nicht"));
        assert!(alle_events(&mut rx).is_empty());
    }

    #[test]
    fn create_room_und_sperre() {
        let router = ConferenceRouter::neu();
        router.create_room(raum(), "conf-42").unwrap();
        assert_eq!(
            router.create_room(raum(), "conf-42"),
            Err(ConferenceError::RoomExists(raum()))
        );
        assert_eq!(router.room_stats(&raum()).unwrap().conference_id, "conf-42");

        router.lock(&raum()).unwrap();
        assert_eq!(
            router
                .add_participant(&raum(), "a".into(), "A", "de", "x")
                .unwrap_err(),
            ConferenceError::RoomLocked(raum())
        );
        router.unlock(&raum()).unwrap();
        beitreten(&router, "a");
        assert!(router.room_stats(&raum()).unwrap().participants[0].id.as_str() == "a");

        assert_eq!(
            router.lock(&RoomId::from("fehlt")),
            Err(ConferenceError::UnknownRoom(RoomId::from("fehlt")))
        );
    }

    #[test]
    fn statistik_und_shutdown() {
        let router = ConferenceRouter::neu();
        beitreten(&router, "a");
        router
            .add_participant(&RoomId::from("zweiter"), "b".into(), "B", "en", "y")
            .unwrap();

        let stats = router.all_stats();
        assert_eq!(stats.raeume_gesamt, 2);
        assert_eq!(stats.teilnehmer_gesamt, 2);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["raeume"][0]["room_id"], "konferenz");

        router.shutdown();
        assert_eq!(router.raum_anzahl(), 0);
        assert!(router.active_rooms().is_empty());
    }

    #[test]
    fn clone_teilt_zustand() {
        let router = ConferenceRouter::neu();
        let kopie = router.clone();
        beitreten(&kopie, "a");
        assert_eq!(router.raum_anzahl(), 1);
    }
}
