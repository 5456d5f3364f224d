//! an ordered objective sequence, advanced one objective at a time

use tracing::debug;

use crate::{
    context::{Outbox, PresentRequest, StoryEvent, TickInput},
    error::StoryError,
    objective::{Objective, ObjectiveStatus},
};

/// How a finished mission ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissionOutcome {
    Passed,
    Failed,
}

impl MissionOutcome {
    pub fn passed(self) -> bool {
        matches!(self, Self::Passed)
    }
}

/// A linear mission: objectives run strictly in order, exactly one is
/// `InProgress` at a time, and a failed objective fails the whole mission
/// without starting the rest.
///
/// The sequence is append-only while building and fixed once started.
pub struct Mission {
    name: String,
    objectives: Vec<Objective>,
    current: Option<usize>,
    outcome: Option<MissionOutcome>,
}

impl Mission {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            objectives: Vec::new(),
            current: None,
            outcome: None,
        }
    }

    /// Append the next objective of the sequence.
    pub fn then(mut self, objective: Objective) -> Self {
        self.objectives.push(objective);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn objectives(&self) -> &[Objective] {
        &self.objectives
    }

    /// The objective the cursor points at: `None` before start, the last
    /// inspected objective once finished.
    pub fn current_objective(&self) -> Option<&Objective> {
        self.current.and_then(|index| self.objectives.get(index))
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn outcome(&self) -> Option<MissionOutcome> {
        self.outcome
    }

    /// Activate the first objective. Fails on an empty sequence without
    /// touching any state.
    pub fn start(&mut self, outbox: &mut Outbox) -> Result<(), StoryError> {
        if self.objectives.is_empty() {
            return Err(StoryError::EmptyMission(self.name.clone()));
        }
        self.advance(outbox);
        Ok(())
    }

    /// One tick of the active mission: update the objective that was
    /// current at tick start, then either advance past a success or finish
    /// failed. Only that one objective's status is inspected per tick.
    pub fn update(&mut self, tick: &TickInput, outbox: &mut Outbox) {
        if self.is_finished() {
            return;
        }
        // A missing cursor on an unfinished mission is a skipped tick, not
        // an error.
        let Some(index) = self.current else {
            debug!(mission = %self.name, "no current objective, skipping tick");
            return;
        };

        let objective = &mut self.objectives[index];
        objective.update(tick, outbox);

        match objective.status() {
            ObjectiveStatus::Success => self.advance(outbox),
            ObjectiveStatus::Failed => self.finish(MissionOutcome::Failed, outbox),
            _ => {}
        }
    }

    /// Force-abort every objective, early and late alike. Used on shutdown.
    pub fn abort(&mut self, outbox: &mut Outbox) {
        for objective in &mut self.objectives {
            objective.abort(outbox);
        }
    }

    /// Start the next pending objective, or finish passed when none remain.
    fn advance(&mut self, outbox: &mut Outbox) {
        let next = self.current.map_or(0, |index| index + 1);
        if next == self.objectives.len() {
            self.finish(MissionOutcome::Passed, outbox);
            return;
        }

        self.current = Some(next);
        self.objectives[next].start(outbox);
        outbox.event(StoryEvent::ObjectiveStarted {
            mission: self.name.clone(),
            index: next,
        });
    }

    /// Record the outcome and raise the banner, at most once per mission.
    fn finish(&mut self, outcome: MissionOutcome, outbox: &mut Outbox) {
        if self.outcome.is_some() {
            return;
        }
        self.outcome = Some(outcome);
        outbox.request(PresentRequest::Announce {
            success: outcome.passed(),
        });
    }
}

#[cfg(test)]
mod tests {
    use bevy::prelude::*;

    use super::*;

    fn tick() -> TickInput {
        TickInput::new(0, Vec3::ZERO)
    }

    fn started_indices(outbox: &Outbox) -> Vec<usize> {
        outbox
            .events()
            .iter()
            .filter_map(|event| match event {
                StoryEvent::ObjectiveStarted { index, .. } => Some(*index),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn empty_mission_refuses_to_start() {
        let mut mission = Mission::new("empty");
        let mut outbox = Outbox::default();
        assert_eq!(
            mission.start(&mut outbox),
            Err(StoryError::EmptyMission("empty".to_string()))
        );
        assert!(!mission.is_finished());
    }

    #[test]
    fn objectives_run_strictly_in_order() {
        use std::sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        };

        let gate = Arc::new(AtomicBool::new(false));
        let first_gate = Arc::clone(&gate);

        let mut mission = Mission::new("chase")
            .then(Objective::when(move |_| first_gate.load(Ordering::SeqCst)))
            .then(Objective::when(|_| true));
        let mut outbox = Outbox::default();
        mission.start(&mut outbox).unwrap();
        assert_eq!(started_indices(&outbox), vec![0]);

        // first objective not satisfied yet: no advance
        mission.update(&tick(), &mut outbox);
        assert_eq!(started_indices(&outbox), vec![0]);
        assert!(!mission.is_finished());

        // first succeeds, second starts in the same tick
        gate.store(true, Ordering::SeqCst);
        mission.update(&tick(), &mut outbox);
        assert_eq!(started_indices(&outbox), vec![0, 1]);
        assert_eq!(
            mission.current_objective().map(Objective::status),
            Some(ObjectiveStatus::InProgress)
        );

        // second succeeds on the next tick, mission passes
        mission.update(&tick(), &mut outbox);
        assert!(mission.is_finished());
        assert_eq!(mission.outcome(), Some(MissionOutcome::Passed));
        assert!(
            outbox
                .requests()
                .contains(&PresentRequest::Announce { success: true })
        );
    }

    #[test]
    fn failed_objective_short_circuits_the_rest() {
        let mut mission = Mission::new("doomed")
            .then(Objective::when(|_| false).or_fail(|_| true))
            .then(Objective::when(|_| true));
        let mut outbox = Outbox::default();
        mission.start(&mut outbox).unwrap();
        mission.update(&tick(), &mut outbox);

        assert_eq!(mission.outcome(), Some(MissionOutcome::Failed));
        // the second objective was never started
        assert_eq!(mission.objectives()[1].status(), ObjectiveStatus::Pending);
        assert_eq!(started_indices(&outbox), vec![0]);
        assert!(
            outbox
                .requests()
                .contains(&PresentRequest::Announce { success: false })
        );
    }

    #[test]
    fn finished_mission_ignores_further_updates() {
        let mut mission = Mission::new("done").then(Objective::when(|_| true));
        let mut outbox = Outbox::default();
        mission.start(&mut outbox).unwrap();
        mission.update(&tick(), &mut outbox);
        assert!(mission.is_finished());

        outbox.clear();
        mission.update(&tick(), &mut outbox);
        assert!(outbox.requests().is_empty());
        assert!(outbox.events().is_empty());
    }

    #[test]
    fn abort_twice_releases_resources_once() {
        let mut mission = Mission::new("teardown")
            .then(Objective::waypoint(Vec3::new(5.0, 0.0, 5.0), "BLIP"))
            .then(Objective::when(|_| true));
        let mut outbox = Outbox::default();
        mission.start(&mut outbox).unwrap();
        outbox.clear();

        mission.abort(&mut outbox);
        let removals = outbox
            .requests()
            .iter()
            .filter(|request| matches!(request, PresentRequest::RemoveBlip { .. }))
            .count();
        assert_eq!(removals, 1);

        outbox.clear();
        mission.abort(&mut outbox);
        assert!(outbox.requests().is_empty());
    }
}
