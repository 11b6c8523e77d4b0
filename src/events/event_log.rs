use std::{
    cmp::Reverse,
    time::{Duration, Instant},
};

use itertools::Itertools;
use log::debug;

use super::{Detection, Event};

/// Ordered store of events waiting to be reported.
///
/// Events age out after a maximum age and leave the log once selected for reporting.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<Event>,
    next_id: u64,
    suppress_duplicates: bool,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop events that share a description with a newer one before each selection.
    pub fn with_duplicate_suppression(mut self, suppress: bool) -> Self {
        self.suppress_duplicates = suppress;
        self
    }

    /// Log `detection` as created at `at`. Returns the id assigned to it; ids only grow.
    pub fn add(&mut self, detection: Detection, at: Instant) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.events.push(Event {
            id,
            created_at: at,
            kind: detection.kind,
            description: detection.description,
            focus: detection.focus,
            lap_percent: detection.lap_percent,
        });
        id
    }

    /// Remove events older than `max_age` at `now`. Returns how many were removed.
    pub fn expire(&mut self, max_age: Duration, now: Instant) -> usize {
        let before = self.events.len();
        self.events
            .retain(|event| now.saturating_duration_since(event.created_at) <= max_age);
        let expired = before - self.events.len();
        if expired > 0 {
            debug!("Expired {} events", expired);
        }
        expired
    }

    /// Take the most important pending event out of the log: ranked kinds before unranked ones,
    /// then the lowest rank, then the most recent.
    pub fn select_next(&mut self) -> Option<Event> {
        if self.suppress_duplicates {
            self.dedupe();
        }
        let (index, _) = self.events.iter().enumerate().min_by_key(|(_, event)| {
            (
                event.kind.priority().is_none(),
                event.kind.priority(),
                Reverse(event.created_at),
                Reverse(event.id),
            )
        })?;
        Some(self.events.remove(index))
    }

    /// Keep only the newest event per description, preserving insertion order.
    fn dedupe(&mut self) {
        let keep = self
            .events
            .iter()
            .sorted_by_key(|event| Reverse((event.created_at, event.id)))
            .unique_by(|event| event.description.clone())
            .map(|event| event.id)
            .collect_vec();
        let before = self.events.len();
        self.events.retain(|event| keep.contains(&event.id));
        if before != self.events.len() {
            debug!("Dropped {} duplicate events", before - self.events.len());
        }
    }

    pub fn pending(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use proptest::prelude::*;

    fn detection(kind: EventKind, description: &str) -> Detection {
        Detection {
            kind,
            description: description.to_string(),
            focus: Some(7),
            lap_percent: Some(0.5),
        }
    }

    #[test]
    fn test_stopped_outranks_newer_overtake() {
        let t0 = Instant::now();
        let mut log = EventLog::new();
        log.add(detection(EventKind::Overtake, "Overtake at 3s"), t0 + Duration::from_secs(3));
        log.add(detection(EventKind::Stopped, "Stopped at 5s"), t0 + Duration::from_secs(5));
        log.add(detection(EventKind::Overtake, "Overtake at 8s"), t0 + Duration::from_secs(8));

        let first = log.select_next().unwrap();
        assert_eq!(first.kind, EventKind::Stopped);
        assert_eq!(first.description, "Stopped at 5s");
        assert_eq!(log.len(), 2);

        let second = log.select_next().unwrap();
        assert_eq!(second.description, "Overtake at 8s");
        let third = log.select_next().unwrap();
        assert_eq!(third.description, "Overtake at 3s");
        assert!(log.select_next().is_none());
    }

    #[test]
    fn test_unranked_kinds_come_last() {
        let t0 = Instant::now();
        let mut log = EventLog::new();
        log.add(detection(EventKind::Collision, "A, B collided"), t0 + Duration::from_secs(9));
        log.add(detection(EventKind::Overtake, "A overtook B for P3"), t0);
        assert_eq!(log.select_next().unwrap().kind, EventKind::Overtake);
        assert_eq!(log.select_next().unwrap().kind, EventKind::Collision);
    }

    #[test]
    fn test_expire_removes_old_events_only() {
        let t0 = Instant::now();
        let mut log = EventLog::new();
        log.add(detection(EventKind::Overtake, "old"), t0);
        log.add(detection(EventKind::Overtake, "new"), t0 + Duration::from_secs(10));

        let now = t0 + Duration::from_secs(30);
        assert_eq!(log.expire(Duration::from_secs(25), now), 1);
        assert_eq!(log.len(), 1);
        assert_eq!(log.pending()[0].description, "new");

        // a second pass with the same clock finds nothing left to remove
        assert_eq!(log.expire(Duration::from_secs(25), now), 0);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_event_at_exact_max_age_is_kept() {
        let t0 = Instant::now();
        let mut log = EventLog::new();
        log.add(detection(EventKind::Stopped, "edge"), t0);
        assert_eq!(log.expire(Duration::from_secs(25), t0 + Duration::from_secs(25)), 0);
        assert!(!log.is_empty());
    }

    #[test]
    fn test_duplicate_suppression_keeps_newest() {
        let t0 = Instant::now();
        let mut log = EventLog::new().with_duplicate_suppression(true);
        log.add(detection(EventKind::Overtake, "A overtook B for P2"), t0);
        let newest = log.add(
            detection(EventKind::Overtake, "A overtook B for P2"),
            t0 + Duration::from_secs(1),
        );
        log.add(detection(EventKind::Overtake, "C overtook D for P5"), t0);

        let selected = log.select_next().unwrap();
        assert_eq!(selected.id, newest);
        assert_eq!(log.len(), 1);
        assert_eq!(log.pending()[0].description, "C overtook D for P5");
    }

    #[test]
    fn test_duplicates_kept_without_suppression() {
        let t0 = Instant::now();
        let mut log = EventLog::new();
        log.add(detection(EventKind::Overtake, "same"), t0);
        log.add(detection(EventKind::Overtake, "same"), t0);
        log.select_next();
        assert_eq!(log.len(), 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_ids_increase_and_selection_drains(
            entries in proptest::collection::vec((0u8..3, 0u64..60), 1..20),
        ) {
            let t0 = Instant::now();
            let mut log = EventLog::new();
            let mut last_id = None;
            for (i, (kind, offset)) in entries.iter().enumerate() {
                let kind = match kind {
                    0 => EventKind::Overtake,
                    1 => EventKind::Stopped,
                    _ => EventKind::Collision,
                };
                let id = log.add(
                    detection(kind, &format!("event {i}")),
                    t0 + Duration::from_secs(*offset),
                );
                if let Some(last) = last_id {
                    prop_assert!(id > last);
                }
                last_id = Some(id);
            }

            let mut selected = Vec::new();
            while let Some(event) = log.select_next() {
                selected.push(event);
            }
            prop_assert_eq!(selected.len(), entries.len());
            for pair in selected.windows(2) {
                let rank = |event: &Event| {
                    (event.kind.priority().is_none(), event.kind.priority())
                };
                prop_assert!(rank(&pair[0]) <= rank(&pair[1]));
                if rank(&pair[0]) == rank(&pair[1]) {
                    prop_assert!(pair[0].created_at >= pair[1].created_at);
                }
            }
        }
    }
}
