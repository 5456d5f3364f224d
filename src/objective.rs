//! a single step of a mission: status lifecycle plus a success/fail check

use std::sync::Arc;

use bevy::prelude::*;
use tracing::debug;

use crate::context::{BlipId, BlipStyle, Outbox, PresentRequest, TickInput};

/// Squared-distance threshold a waypoint objective completes at unless
/// overridden with [`Objective::radius_sq`].
pub const DEFAULT_WAYPOINT_RADIUS_SQ: f32 = 1000.0;

type Check = Box<dyn Fn(&TickInput) -> bool + Send + Sync>;
type Hook = Box<dyn FnMut(&mut Outbox) + Send + Sync>;

/// Status lifecycle of an [`Objective`].
///
/// Transitions run `Pending → InProgress → {Success, Failed}` and stop
/// there; only mission teardown forces finalization out of band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObjectiveStatus {
    /// Not started yet.
    #[default]
    Pending,
    /// Evaluated every tick.
    InProgress,
    /// Finished successfully. Terminal.
    Success,
    /// Finished in failure. Terminal.
    Failed,
}

impl ObjectiveStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

enum ObjectiveKind {
    /// Success decided by a predicate over the tick snapshot.
    Check(Check),
    /// Success when the player is within `radius_sq` of `target`. Places a
    /// route blip from start until finalization.
    Waypoint {
        target: Vec3,
        radius_sq: f32,
        name_key: String,
        blip: Option<BlipId>,
    },
}

/// One unit of mission work.
///
/// Built through [`Objective::when`], [`Objective::watch`] or
/// [`Objective::waypoint`], then handed to a [`Mission`](crate::Mission) in
/// order. When both the success and fail checks hold on the same tick,
/// success wins: it is always evaluated first.
pub struct Objective {
    status: ObjectiveStatus,
    kind: ObjectiveKind,
    fail: Option<Check>,
    start_message: Option<String>,
    on_start: Option<Hook>,
    on_finish: Option<Hook>,
    finalized: bool,
}

impl Objective {
    fn from_kind(kind: ObjectiveKind) -> Self {
        Self {
            status: ObjectiveStatus::Pending,
            kind,
            fail: None,
            start_message: None,
            on_start: None,
            on_finish: None,
            finalized: false,
        }
    }

    /// Objective that succeeds once `success` returns true.
    pub fn when(success: impl Fn(&TickInput) -> bool + Send + Sync + 'static) -> Self {
        Self::from_kind(ObjectiveKind::Check(Box::new(success)))
    }

    /// Objective bound to a target value, succeeding once `success` holds
    /// for it. The target is owned by the objective for its whole life.
    pub fn watch<T>(target: T, success: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self
    where
        T: Send + Sync + 'static,
    {
        let target = Arc::new(target);
        Self::from_kind(ObjectiveKind::Check(Box::new(move |_| success(&target))))
    }

    /// Like [`Objective::watch`], with a fail predicate over the same target.
    pub fn watch_or_fail<T>(
        target: T,
        success: impl Fn(&T) -> bool + Send + Sync + 'static,
        fail: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Self
    where
        T: Send + Sync + 'static,
    {
        let target = Arc::new(target);
        let fail_target = Arc::clone(&target);
        let mut objective =
            Self::from_kind(ObjectiveKind::Check(Box::new(move |_| success(&target))));
        objective.fail = Some(Box::new(move |_| fail(&fail_target)));
        objective
    }

    /// Objective that succeeds when the player reaches `target`. Shows a
    /// route blip labeled by the localized `blip_name_key` while active.
    pub fn waypoint(target: Vec3, blip_name_key: impl Into<String>) -> Self {
        Self::from_kind(ObjectiveKind::Waypoint {
            target,
            radius_sq: DEFAULT_WAYPOINT_RADIUS_SQ,
            name_key: blip_name_key.into(),
            blip: None,
        })
    }

    /// Fail predicate. Without one the objective can only succeed or be
    /// torn down with the mission.
    pub fn or_fail(mut self, fail: impl Fn(&TickInput) -> bool + Send + Sync + 'static) -> Self {
        self.fail = Some(Box::new(fail));
        self
    }

    /// Localized subtitle key shown when the objective starts.
    pub fn message(mut self, key: impl Into<String>) -> Self {
        self.start_message = Some(key.into());
        self
    }

    /// Hook invoked once on start, e.g. to spawn mission props.
    pub fn on_start(mut self, hook: impl FnMut(&mut Outbox) + Send + Sync + 'static) -> Self {
        self.on_start = Some(Box::new(hook));
        self
    }

    /// Hook invoked once on finalization, whatever the outcome.
    pub fn on_finish(mut self, hook: impl FnMut(&mut Outbox) + Send + Sync + 'static) -> Self {
        self.on_finish = Some(Box::new(hook));
        self
    }

    /// Override the waypoint completion threshold (squared distance).
    /// Ignored by non-waypoint objectives.
    pub fn radius_sq(mut self, value: f32) -> Self {
        if let ObjectiveKind::Waypoint { radius_sq, .. } = &mut self.kind {
            *radius_sq = value;
        }
        self
    }

    pub fn status(&self) -> ObjectiveStatus {
        self.status
    }

    /// Move from `Pending` to `InProgress`: place the waypoint blip, show
    /// the start subtitle, run the start hook. A no-op unless `Pending`.
    pub fn start(&mut self, outbox: &mut Outbox) {
        if self.status != ObjectiveStatus::Pending {
            debug!(status = ?self.status, "objective start skipped");
            return;
        }
        self.status = ObjectiveStatus::InProgress;

        if let ObjectiveKind::Waypoint {
            target,
            name_key,
            blip,
            ..
        } = &mut self.kind
        {
            let id = outbox.allocate_blip();
            *blip = Some(id);
            outbox.request(PresentRequest::CreateBlip {
                id,
                position: *target,
                style: BlipStyle::Waypoint,
                name_key: Some(name_key.clone()),
                route: true,
            });
        }

        if let Some(key) = &self.start_message {
            outbox.subtitle(key);
        }
        if let Some(hook) = &mut self.on_start {
            hook(outbox);
        }
    }

    /// Evaluate the success check, then the fail check. Only meaningful
    /// while `InProgress`; any other status is a no-op.
    pub fn update(&mut self, tick: &TickInput, outbox: &mut Outbox) {
        if self.status != ObjectiveStatus::InProgress {
            return;
        }

        let succeeded = match &self.kind {
            ObjectiveKind::Check(success) => success(tick),
            ObjectiveKind::Waypoint {
                target, radius_sq, ..
            } => tick.player.distance_squared(*target) < *radius_sq,
        };
        if succeeded {
            self.set_status(ObjectiveStatus::Success, outbox);
            return;
        }

        if let Some(fail) = &self.fail
            && fail(tick)
        {
            self.set_status(ObjectiveStatus::Failed, outbox);
        }
    }

    /// Force finalization regardless of status. Used for whole-mission
    /// teardown; safe on an objective that never started, idempotent on one
    /// that already finished.
    pub fn abort(&mut self, outbox: &mut Outbox) {
        self.finalize(outbox);
    }

    fn set_status(&mut self, status: ObjectiveStatus, outbox: &mut Outbox) {
        self.status = status;
        if status.is_terminal() {
            self.finalize(outbox);
        }
    }

    /// Release variant resources and run the finish hook, exactly once.
    fn finalize(&mut self, outbox: &mut Outbox) {
        if self.finalized {
            return;
        }
        self.finalized = true;

        if let ObjectiveKind::Waypoint { blip, .. } = &mut self.kind
            && let Some(id) = blip.take()
        {
            outbox.request(PresentRequest::RemoveBlip { id });
        }
        if let Some(hook) = &mut self.on_finish {
            hook(outbox);
        }
    }
}
