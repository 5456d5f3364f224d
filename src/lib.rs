//! mission sequencing and flag-gated storyline discovery for bevy
//!
//! A mission is an ordered list of objectives run one at a time; a storyline
//! is a catalog of missions scattered over the map, gated by persisted
//! boolean flags and discovered by walking onto their markers. The engine
//! owns the state machines only: everything visible (subtitles, banners,
//! blips, fades) leaves the crate as [`PresentRequest`] messages for the
//! host game to render, and hosts drive it with [`StoryCommand`] messages.
//!
//! quick start:
//! ```no_run
//! use bevy::prelude::*;
//! use bevy_storyline::*;
//!
//! fn story() -> Storyline {
//!     Storyline::builder()
//!         .flag("DONE_DOCKS", false)
//!         .mission(StoryMission::new("docks", "DONE_DOCKS", Vec3::new(120.0, 0.0, 40.0)))
//!         .register("docks", || {
//!             Mission::new("docks")
//!                 .then(Objective::waypoint(Vec3::new(80.0, 0.0, 10.0), "BLIP_WAREHOUSE")
//!                     .message("OBJ_REACH_WAREHOUSE"))
//!                 .then(Objective::when(|_| true).message("OBJ_WRAP_UP"))
//!         })
//!         .save_slot("story")
//!         .build()
//!         .expect("storyline catalog is well formed")
//! }
//!
//! App::new()
//!     .add_plugins((MinimalPlugins, StorylinePlugin))
//!     .insert_resource(story())
//!     .run();
//! ```
//!
//! Mark the tracked player entity with [`StoryActor`]. To react to a finish
//! (set flags, grant rewards), read [`StoryEvent::MissionFinished`] from a
//! system in [`StorySystems::React`]: it runs after the mission update and
//! before the storyline recomputes availability and saves, all within the
//! same frame.

mod context;
mod director;
mod error;
mod flags;
mod mission;
mod objective;
mod progress;
mod storyline;

use bevy::prelude::*;

pub use crate::{
    context::{
        BlipId, BlipStyle, MarkerStyle, Outbox, PresentRequest, StoryCommand, StoryEvent,
        TickInput,
    },
    director::MissionDirector,
    error::StoryError,
    flags::FlagTable,
    mission::{Mission, MissionOutcome},
    objective::{DEFAULT_WAYPOINT_RADIUS_SQ, Objective, ObjectiveStatus},
    storyline::{StoryActor, StoryMission, Storyline, StorylineBuilder},
};

pub struct StorylinePlugin;

impl Plugin for StorylinePlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<MissionDirector>()
            .init_resource::<Outbox>()
            .add_message::<StoryCommand>()
            .add_message::<PresentRequest>()
            .add_message::<StoryEvent>();

        // Mission resolution strictly precedes the storyline's view of it;
        // host reactions to finish events slot in between.
        app.configure_sets(
            Update,
            (
                StorySystems::Missions,
                StorySystems::React,
                StorySystems::Storyline,
            )
                .chain(),
        );
        app.add_systems(
            Update,
            (
                director::update_missions.in_set(StorySystems::Missions),
                storyline::update_storyline.in_set(StorySystems::Storyline),
            ),
        );
    }
}

/// Ordering of the per-frame story work in the `Update` schedule.
#[derive(SystemSet, Debug, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum StorySystems {
    /// Drive the active mission and deliver finish notifications.
    Missions,
    /// Host systems reacting to this frame's events, e.g. setting flags.
    React,
    /// Recompute availability, draw markers, check proximity.
    Storyline,
}
