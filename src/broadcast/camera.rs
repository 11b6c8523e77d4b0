use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use log::{debug, warn};

use crate::{
    CasterError,
    telemetry::{CameraGroup, TelemetryFeed},
};

use super::CameraClient;

/// Camera groups a televised race would not cut to
const UNREALISTIC_VIEWS: [&str; 5] = ["blimp", "chopper", "scenic", "pit lane", "chase"];

const COLLABORATOR: &str = "Camera";

/// Drives the simulator's broadcast camera through a shared telemetry feed.
pub struct FeedCamera<F: TelemetryFeed> {
    feed: Arc<Mutex<F>>,
    groups: HashMap<String, i32>,
    realistic: bool,
}

impl<F: TelemetryFeed> FeedCamera<F> {
    pub fn new(feed: Arc<Mutex<F>>, groups: &[CameraGroup], realistic: bool) -> Self {
        let groups = groups
            .iter()
            .map(|group| (group.name.clone(), group.number))
            .collect::<HashMap<_, _>>();
        debug!("Camera groups available: {:?}", groups.keys());
        Self {
            feed,
            groups,
            realistic,
        }
    }

    /// Read the camera groups from the feed's session, connecting it first if needed.
    pub fn from_feed(feed: Arc<Mutex<F>>, realistic: bool) -> Result<Self, CasterError> {
        let session = {
            let mut guard = feed.lock().unwrap_or_else(PoisonError::into_inner);
            if !guard.is_connected() {
                guard.connect()?;
            }
            guard.session_info()?
        };
        if session.camera_groups.is_empty() {
            warn!("Session at {} lists no camera groups", session.track_name);
        }
        Ok(Self::new(feed, &session.camera_groups, realistic))
    }

    fn is_unrealistic(view: &str) -> bool {
        let view = view.to_lowercase();
        UNREALISTIC_VIEWS.iter().any(|name| view.contains(name))
    }
}

impl<F: TelemetryFeed + Send> CameraClient for FeedCamera<F> {
    fn focus(&self, car_number: u32, view: &str) -> Result<(), CasterError> {
        if self.realistic && Self::is_unrealistic(view) {
            return Err(CasterError::CollaboratorFailure {
                collaborator: COLLABORATOR.to_string(),
                description: format!("{view} is not a realistic broadcast view"),
            });
        }
        let group = *self
            .groups
            .get(view)
            .ok_or_else(|| CasterError::CollaboratorFailure {
                collaborator: COLLABORATOR.to_string(),
                description: format!("unknown camera view {view}"),
            })?;

        self.feed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .switch_camera(car_number, group)
            .map_err(|e| CasterError::CollaboratorFailure {
                collaborator: COLLABORATOR.to_string(),
                description: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{FeedCommand, FeedTick, ScriptedFeed, SessionInfo};

    fn groups() -> Vec<CameraGroup> {
        ["Nose", "TV1", "Blimp", "Chase", "Pit Lane"]
            .iter()
            .enumerate()
            .map(|(i, name)| CameraGroup {
                number: i as i32 + 1,
                name: name.to_string(),
            })
            .collect()
    }

    fn feed() -> Arc<Mutex<ScriptedFeed>> {
        let session = SessionInfo {
            camera_groups: groups(),
            ..SessionInfo::default()
        };
        Arc::new(Mutex::new(ScriptedFeed::new(
            session,
            vec![FeedTick::default()],
        )))
    }

    #[test]
    fn test_focus_switches_to_group_number() {
        let feed = feed();
        let camera = FeedCamera::from_feed(feed.clone(), true).unwrap();
        camera.focus(42, "TV1").unwrap();
        assert_eq!(
            feed.lock().unwrap().commands,
            vec![FeedCommand::SwitchCamera {
                car_number: 42,
                camera_group: 2
            }]
        );
    }

    #[test]
    fn test_realistic_camera_refuses_unrealistic_views() {
        let feed = feed();
        let camera = FeedCamera::from_feed(feed.clone(), true).unwrap();
        for view in ["Blimp", "Chase", "Pit Lane"] {
            assert!(matches!(
                camera.focus(1, view),
                Err(CasterError::CollaboratorFailure { .. })
            ));
        }
        assert!(feed.lock().unwrap().commands.is_empty());

        let unrestricted = FeedCamera::from_feed(feed.clone(), false).unwrap();
        unrestricted.focus(1, "Blimp").unwrap();
        assert_eq!(feed.lock().unwrap().commands.len(), 1);
    }

    #[test]
    fn test_unknown_view_fails() {
        let camera = FeedCamera::new(feed(), &groups(), false);
        assert!(matches!(
            camera.focus(1, "Gearbox"),
            Err(CasterError::CollaboratorFailure { .. })
        ));
    }

    #[test]
    fn test_from_feed_fails_when_feed_unavailable() {
        let feed = Arc::new(Mutex::new(ScriptedFeed::unavailable()));
        assert!(matches!(
            FeedCamera::from_feed(feed, true),
            Err(CasterError::TelemetryUnavailable { .. })
        ));
    }
}
