//! tick context and the outbox that carries side effects to the host
//!
//! The engine never draws, localizes or saves anything by itself. Each tick
//! it reads a [`TickInput`] snapshot and pushes [`PresentRequest`]s and
//! [`StoryEvent`]s into the [`Outbox`]; the plugin republishes those as Bevy
//! messages for the host game to consume. Keeping both sides plain data is
//! what lets every state machine in this crate be tested without an `App`.

use bevy::prelude::*;

use crate::mission::MissionOutcome;

/// Snapshot of the world state the engine is allowed to read: the monotonic
/// game clock (milliseconds) and the tracked player position.
#[derive(Debug, Clone, Copy)]
pub struct TickInput {
    pub now: u32,
    pub player: Vec3,
}

impl TickInput {
    pub fn new(now: u32, player: Vec3) -> Self {
        Self { now, player }
    }
}

/// Handle for a map blip placed through [`PresentRequest::CreateBlip`].
/// Allocated by the engine, resolved to whatever the host renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlipId(u64);

/// Icon style of a map blip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlipStyle {
    #[default]
    Standard,
    Story,
    Waypoint,
}

/// Shape of a per-tick world marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarkerStyle {
    /// Vertical cylinder on the ground, the classic mission-start column.
    #[default]
    Cylinder,
    Ring,
}

/// A request to the host's presentation layer. The engine owns none of the
/// rendering; it only asks.
#[derive(Message, Debug, Clone, PartialEq)]
pub enum PresentRequest {
    /// Show a localized subtitle by key.
    Subtitle { key: String },
    /// Show the big mission passed/failed banner.
    Announce { success: bool },
    /// Place a persistent map blip.
    CreateBlip {
        id: BlipId,
        position: Vec3,
        style: BlipStyle,
        /// Localized name key for the blip label, if any.
        name_key: Option<String>,
        /// Whether the map should draw a route to the blip.
        route: bool,
    },
    /// Remove a previously placed blip.
    RemoveBlip { id: BlipId },
    /// Draw a world marker for this tick only. Re-issued every tick while
    /// the mission stays available.
    Marker { position: Vec3, style: MarkerStyle },
    /// Fade the screen out over the given duration.
    FadeOut { millis: u32 },
    /// Fade the screen back in.
    FadeIn { millis: u32 },
    /// Show or hide a blocking progress indicator around save/load work.
    Busy { active: bool },
    /// Non-fatal user-visible notice, e.g. a failed save.
    Notice { text: String },
}

/// Lifecycle notifications produced by the engine.
#[derive(Message, Debug, Clone, PartialEq)]
pub enum StoryEvent {
    /// An objective of the active mission was started.
    ObjectiveStarted { mission: String, index: usize },
    /// The active mission finished and the active slot was cleared.
    MissionFinished {
        mission: String,
        outcome: MissionOutcome,
    },
}

/// Commands the host feeds into the engine.
#[derive(Message, Debug, Clone, PartialEq)]
pub enum StoryCommand {
    /// Start a registered mission by name, bypassing proximity discovery.
    Start(String),
    /// Set a mission flag. Unknown names are logged and dropped.
    SetFlag { name: String, value: bool },
    /// Tear everything down: abort missions, release blips. Wire this to
    /// the host's shutdown path.
    Abort,
}

/// Accumulates the engine's outputs for one or more ticks until the plugin
/// (or a test) drains them. Also the allocator for [`BlipId`]s, so it has to
/// live across ticks.
#[derive(Resource, Default)]
pub struct Outbox {
    requests: Vec<PresentRequest>,
    events: Vec<StoryEvent>,
    next_blip: u64,
}

impl Outbox {
    pub fn request(&mut self, request: PresentRequest) {
        self.requests.push(request);
    }

    pub fn event(&mut self, event: StoryEvent) {
        self.events.push(event);
    }

    /// Queue a subtitle. An empty key means "no subtitle" and is dropped
    /// here instead of reaching the presentation layer.
    pub fn subtitle(&mut self, key: &str) {
        if key.is_empty() {
            return;
        }
        self.request(PresentRequest::Subtitle { key: key.to_string() });
    }

    pub fn allocate_blip(&mut self) -> BlipId {
        let id = BlipId(self.next_blip);
        self.next_blip += 1;
        id
    }

    /// Pending presentation requests, oldest first.
    pub fn requests(&self) -> &[PresentRequest] {
        &self.requests
    }

    /// Pending lifecycle events, oldest first.
    pub fn events(&self) -> &[StoryEvent] {
        &self.events
    }

    pub fn drain_requests(&mut self) -> Vec<PresentRequest> {
        std::mem::take(&mut self.requests)
    }

    pub fn drain_events(&mut self) -> Vec<StoryEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn clear(&mut self) {
        self.requests.clear();
        self.events.clear();
    }
}

/// Republish everything accumulated in the outbox as Bevy messages.
pub(crate) fn flush(
    outbox: &mut Outbox,
    requests: &mut MessageWriter<PresentRequest>,
    events: &mut MessageWriter<StoryEvent>,
) {
    for request in outbox.drain_requests() {
        requests.write(request);
    }
    for event in outbox.drain_events() {
        events.write(event);
    }
}
