//! per-session mission coordinator: one active mission, full history

use bevy::prelude::*;
use tracing::{debug, info};

use crate::{
    context::{Outbox, StoryCommand, StoryEvent, TickInput, flush},
    error::StoryError,
    mission::Mission,
    objective::ObjectiveStatus,
    storyline::StoryActor,
};

/// Runs at most one [`Mission`] at a time and keeps every mission ever
/// started.
///
/// One director exists per running session (it is a plugin resource, not a
/// global), which is what upholds the single-active-mission invariant.
#[derive(Resource, Default)]
pub struct MissionDirector {
    missions: Vec<Mission>,
    active: Option<usize>,
    just_finished: Vec<String>,
}

impl MissionDirector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_mission_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_mission(&self) -> Option<&Mission> {
        self.active.map(|index| &self.missions[index])
    }

    /// Every mission ever started, oldest first. A mission joins this list
    /// the moment it starts and stays after it finishes.
    pub fn history(&self) -> &[Mission] {
        &self.missions
    }

    /// The most recently started mission, finished or not.
    pub fn last_mission(&self) -> Option<&Mission> {
        self.missions.last()
    }

    /// Install and start a mission. Refuses while another is active; the
    /// first objective is already in progress when this returns.
    pub fn start_mission(
        &mut self,
        mut mission: Mission,
        outbox: &mut Outbox,
    ) -> Result<(), StoryError> {
        if let Some(index) = self.active {
            return Err(StoryError::MissionActive {
                active: self.missions[index].name().to_string(),
                requested: mission.name().to_string(),
            });
        }
        mission.start(outbox)?;
        info!(mission = %mission.name(), "mission started");
        self.missions.push(mission);
        self.active = Some(self.missions.len() - 1);
        Ok(())
    }

    /// One tick: delegate to the active mission, and the moment it reports
    /// finished, clear the active slot and raise exactly one
    /// [`StoryEvent::MissionFinished`].
    pub fn update(&mut self, tick: &TickInput, outbox: &mut Outbox) {
        let Some(index) = self.active else {
            return;
        };
        let mission = &mut self.missions[index];

        let current_in_progress = mission
            .current_objective()
            .is_some_and(|objective| objective.status() == ObjectiveStatus::InProgress);
        if !current_in_progress {
            debug!(mission = %mission.name(), "current objective not in progress, skipping tick");
            return;
        }

        mission.update(tick, outbox);
        if !mission.is_finished() {
            return;
        }

        self.active = None;
        let finished = &self.missions[index];
        // a finished mission always carries an outcome
        let outcome = finished.outcome().unwrap_or(crate::MissionOutcome::Failed);
        info!(mission = %finished.name(), passed = outcome.passed(), "mission finished");
        outbox.event(StoryEvent::MissionFinished {
            mission: finished.name().to_string(),
            outcome,
        });
        self.just_finished.push(finished.name().to_string());
    }

    /// Force-abort every mission ever started. Finished missions treat it
    /// as a no-op, so calling this twice is safe.
    pub fn abort(&mut self, outbox: &mut Outbox) {
        for mission in &mut self.missions {
            mission.abort(outbox);
        }
    }

    /// Drain the names of missions that finished since the last call. The
    /// plugin hands these to the storyline later in the same tick; hosts
    /// driving the core by hand do the same with
    /// [`Storyline::on_mission_finished`](crate::Storyline::on_mission_finished).
    pub fn take_just_finished(&mut self) -> Vec<String> {
        std::mem::take(&mut self.just_finished)
    }
}

/// Drives the director once per frame. Runs before the storyline update so
/// that a finish is fully resolved before availability is recomputed.
pub(crate) fn update_missions(
    mut director: ResMut<MissionDirector>,
    mut outbox: ResMut<Outbox>,
    time: Res<Time>,
    player: Query<&GlobalTransform, With<StoryActor>>,
    mut commands_in: MessageReader<StoryCommand>,
    mut requests: MessageWriter<crate::PresentRequest>,
    mut events: MessageWriter<StoryEvent>,
) {
    for command in commands_in.read() {
        if matches!(command, StoryCommand::Abort) {
            director.abort(&mut outbox);
        }
    }

    // no tracked player means no trustworthy position, so the mission
    // holds still for this frame
    let Ok(transform) = player.single() else {
        flush(&mut outbox, &mut requests, &mut events);
        return;
    };
    let tick = TickInput::new(time.elapsed().as_millis() as u32, transform.translation());

    director.update(&tick, &mut outbox);
    flush(&mut outbox, &mut requests, &mut events);
}
