//! flag-gated mission catalog: availability, map blips, proximity discovery

use std::collections::HashMap;

use bevy::prelude::*;
use tracing::{error, info, warn};

use crate::{
    context::{
        BlipId, BlipStyle, MarkerStyle, Outbox, PresentRequest, StoryCommand, StoryEvent,
        TickInput, flush,
    },
    director::MissionDirector,
    error::StoryError,
    flags::FlagTable,
    mission::Mission,
    progress,
};

/// Marks the entity whose position drives waypoint objectives and
/// proximity discovery. Exactly one is expected.
#[derive(Component, Default)]
pub struct StoryActor;

/// The nearest-available-mission scan runs at most once per this many
/// game-time milliseconds.
const SCAN_INTERVAL_MS: u32 = 500;

/// Squared distance at which standing on a mission marker activates it.
const PROXIMITY_TRIGGER_SQ: f32 = 2.0;

/// Screen fade duration bracketing a proximity-triggered mission start.
const FADE_MS: u32 = 500;

/// A discoverable mission: where it sits in the world and which flags gate
/// it. Maps 1:1 to a constructor in the storyline registry by name.
#[derive(Debug, Clone, PartialEq)]
pub struct StoryMission {
    name: String,
    /// Flag that must be true before the mission shows up. `None` means
    /// always unlocked.
    required_flag: Option<String>,
    /// Flag marking the mission as done. Must exist in the flag table.
    finished_flag: String,
    position: Vec3,
    blip_style: BlipStyle,
}

impl StoryMission {
    pub fn new(
        name: impl Into<String>,
        finished_flag: impl Into<String>,
        position: Vec3,
    ) -> Self {
        Self {
            name: name.into(),
            required_flag: None,
            finished_flag: finished_flag.into(),
            position,
            blip_style: BlipStyle::Story,
        }
    }

    /// Gate the mission behind an unlock flag.
    pub fn requires(mut self, flag: impl Into<String>) -> Self {
        self.required_flag = Some(flag.into());
        self
    }

    pub fn style(mut self, style: BlipStyle) -> Self {
        self.blip_style = style;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }
}

type MissionFactory = Box<dyn Fn() -> Mission + Send + Sync>;

/// Pending two-phase mission activation: fade out first, start when the
/// fade has run its course, fade back in.
#[derive(Clone, Copy)]
enum Transition {
    Idle,
    Starting { mission: usize, start_at: u32 },
}

/// The storyline engine: catalog, registry, flag table, availability set,
/// blip bookkeeping and the proximity trigger.
///
/// Build one with [`Storyline::builder`] and insert it as a resource; the
/// plugin updates it every frame after the mission director.
#[derive(Resource)]
pub struct Storyline {
    catalog: Vec<StoryMission>,
    registry: HashMap<String, MissionFactory>,
    flags: FlagTable,
    save_slot: Option<String>,
    available: Vec<usize>,
    blips: HashMap<usize, BlipId>,
    closest: Option<(usize, f32)>,
    next_scan: u32,
    transition: Transition,
}

impl Storyline {
    pub fn builder() -> StorylineBuilder {
        StorylineBuilder::default()
    }

    pub fn flag(&self, name: &str) -> Result<bool, StoryError> {
        self.flags.get(name)
    }

    pub fn set_flag(&mut self, name: &str, value: bool) -> Result<(), StoryError> {
        self.flags.set(name, value)
    }

    pub fn flags(&self) -> &FlagTable {
        &self.flags
    }

    /// Recompute availability after out-of-band flag changes, for example a
    /// scripted unlock that is not tied to a mission finishing. The plugin
    /// calls this whenever a [`StoryCommand::SetFlag`] lands.
    pub fn refresh(&mut self, mission_active: bool) {
        self.refresh_available(mission_active);
    }

    /// Missions currently unlocked, unfinished and not blocked by an
    /// active mission.
    pub fn available_missions(&self) -> impl Iterator<Item = &StoryMission> {
        self.available.iter().map(|index| &self.catalog[*index])
    }

    /// Nearest available mission found by the throttled scan. `None` while
    /// a mission is active or before the first scan.
    pub fn closest_mission(&self) -> Option<&StoryMission> {
        self.closest.map(|(index, _)| &self.catalog[index])
    }

    /// Squared distance to [`Storyline::closest_mission`].
    pub fn closest_distance_sq(&self) -> Option<f32> {
        self.closest.map(|(_, distance)| distance)
    }

    /// One tick of the storyline: complete a pending fade-in start, rescan
    /// the nearest mission, sync and draw markers, then check proximity.
    pub fn update(
        &mut self,
        tick: &TickInput,
        director: &mut MissionDirector,
        outbox: &mut Outbox,
    ) {
        if let Transition::Starting { mission, start_at } = self.transition
            && tick.now >= start_at
        {
            self.transition = Transition::Idle;
            let name = self.catalog[mission].name.clone();
            if let Err(story_error) = self.start_by_name(&name, director, outbox) {
                error!(%story_error, "proximity mission start failed");
            }
            outbox.request(PresentRequest::FadeIn { millis: FADE_MS });
        }

        self.refresh_closest(tick, director.is_mission_active());
        self.sync_blips(outbox);
        self.draw_markers(outbox);

        if matches!(self.transition, Transition::Idle)
            && !director.is_mission_active()
            && let Some((index, distance)) = self.closest
            && distance < PROXIMITY_TRIGGER_SQ
        {
            outbox.request(PresentRequest::FadeOut { millis: FADE_MS });
            self.transition = Transition::Starting {
                mission: index,
                start_at: tick.now + FADE_MS,
            };
        }
    }

    /// Resolve a catalog name through the registry and start the mission,
    /// then recompute availability (which is now empty of it).
    pub fn start_by_name(
        &mut self,
        name: &str,
        director: &mut MissionDirector,
        outbox: &mut Outbox,
    ) -> Result<(), StoryError> {
        let factory = self
            .registry
            .get(name)
            .ok_or_else(|| StoryError::UnknownMission(name.to_string()))?;
        director.start_mission(factory(), outbox)?;
        self.refresh_available(director.is_mission_active());
        Ok(())
    }

    /// React to a mission finishing: when it is one of ours, recompute
    /// availability and persist the flag table.
    pub fn on_mission_finished(&mut self, name: &str, outbox: &mut Outbox) {
        if !self.registry.contains_key(name) {
            return;
        }
        self.refresh_available(false);
        self.persist(outbox);
    }

    /// Write the flag table to the configured save slot, if any. Failures
    /// become a notice, never an error.
    pub fn persist(&mut self, outbox: &mut Outbox) {
        let Some(slot) = &self.save_slot else {
            return;
        };
        outbox.request(PresentRequest::Busy { active: true });
        match progress::save(slot, &self.flags.snapshot()) {
            Ok(()) => info!(slot = %slot, "story progress saved"),
            Err(save_error) => {
                warn!(%save_error, "story progress save failed");
                outbox.request(PresentRequest::Notice {
                    text: "Failed to save story progress.".to_string(),
                });
            }
        }
        outbox.request(PresentRequest::Busy { active: false });
    }

    /// Remove every remaining blip. Wired to the host's shutdown path.
    pub fn abort(&mut self, outbox: &mut Outbox) {
        for (_, id) in self.blips.drain() {
            outbox.request(PresentRequest::RemoveBlip { id });
        }
    }

    /// Recompute the availability cache. A mission is available iff its
    /// finished flag is false, its required flag (if any) is true, and no
    /// mission is running. A required flag missing from the table counts
    /// as locked.
    fn refresh_available(&mut self, mission_active: bool) {
        self.available.clear();
        if mission_active {
            return;
        }
        for (index, mission) in self.catalog.iter().enumerate() {
            // validated at build time; a missing key defensively counts as done
            if self.flags.peek(&mission.finished_flag).unwrap_or(true) {
                continue;
            }
            if let Some(required) = &mission.required_flag
                && !self.flags.peek(required).unwrap_or(false)
            {
                continue;
            }
            self.available.push(index);
        }
    }

    /// Throttled nearest-mission scan. Forced to none, without consuming
    /// the throttle window, while a mission is active.
    fn refresh_closest(&mut self, tick: &TickInput, mission_active: bool) {
        if mission_active {
            self.closest = None;
            return;
        }
        if tick.now < self.next_scan {
            return;
        }
        self.next_scan = tick.now + SCAN_INTERVAL_MS;

        self.closest = self
            .available
            .iter()
            .map(|&index| {
                (
                    index,
                    tick.player.distance_squared(self.catalog[index].position),
                )
            })
            .min_by(|(_, a), (_, b)| a.total_cmp(b));
    }

    /// Diff the blip side-table against the availability set: place blips
    /// for newly available missions, remove those that left the set.
    fn sync_blips(&mut self, outbox: &mut Outbox) {
        for index in 0..self.catalog.len() {
            let available = self.available.contains(&index);
            match (available, self.blips.contains_key(&index)) {
                (true, false) => {
                    let id = outbox.allocate_blip();
                    let mission = &self.catalog[index];
                    outbox.request(PresentRequest::CreateBlip {
                        id,
                        position: mission.position,
                        style: mission.blip_style,
                        name_key: Some(mission.name.clone()),
                        route: false,
                    });
                    self.blips.insert(index, id);
                }
                (false, true) => {
                    if let Some(id) = self.blips.remove(&index) {
                        outbox.request(PresentRequest::RemoveBlip { id });
                    }
                }
                _ => {}
            }
        }
    }

    /// World markers are redrawn every tick, unthrottled.
    fn draw_markers(&mut self, outbox: &mut Outbox) {
        for &index in &self.available {
            outbox.request(PresentRequest::Marker {
                position: self.catalog[index].position,
                style: MarkerStyle::Cylinder,
            });
        }
    }
}

/// Collects the catalog, registry, flag defaults and save slot, then
/// validates and loads persisted progress in [`StorylineBuilder::build`].
#[derive(Default)]
pub struct StorylineBuilder {
    catalog: Vec<StoryMission>,
    registry: HashMap<String, MissionFactory>,
    flags: FlagTable,
    save_slot: Option<String>,
}

impl StorylineBuilder {
    /// Add a discoverable mission to the catalog.
    pub fn mission(mut self, mission: StoryMission) -> Self {
        self.catalog.push(mission);
        self
    }

    /// Register the constructor a catalog name resolves to on activation.
    pub fn register(
        mut self,
        name: impl Into<String>,
        factory: impl Fn() -> Mission + Send + Sync + 'static,
    ) -> Self {
        self.registry.insert(name.into(), Box::new(factory));
        self
    }

    /// Seed a flag with its default value.
    pub fn flag(mut self, name: impl Into<String>, value: bool) -> Self {
        self.flags.seed(name, value);
        self
    }

    /// Persist the flag table under this save slot. Without one, flags
    /// live for the session only.
    pub fn save_slot(mut self, slot: impl Into<String>) -> Self {
        self.save_slot = Some(slot.into());
        self
    }

    /// Validate the catalog, merge any persisted progress into the flag
    /// defaults, and compute the initial availability set.
    pub fn build(self) -> Result<Storyline, StoryError> {
        let Self {
            catalog,
            registry,
            mut flags,
            save_slot,
        } = self;

        for mission in &catalog {
            if !flags.contains(&mission.finished_flag) {
                return Err(StoryError::MissingFinishedFlag {
                    mission: mission.name.clone(),
                    flag: mission.finished_flag.clone(),
                });
            }
        }

        if let Some(slot) = &save_slot {
            match progress::load(slot) {
                Ok(Some(loaded)) => {
                    let applied = flags.merge_known(loaded);
                    info!(slot = %slot, applied, "story progress loaded");
                }
                Ok(None) => {}
                // defaults stay in place; the save file is left untouched
                Err(load_error) => warn!(%load_error, "story progress load failed"),
            }
        }

        let mut storyline = Storyline {
            catalog,
            registry,
            flags,
            save_slot,
            available: Vec::new(),
            blips: HashMap::new(),
            closest: None,
            next_scan: 0,
            transition: Transition::Idle,
        };
        storyline.refresh_available(false);
        Ok(storyline)
    }
}

/// Drives the storyline once per frame, after the mission director has
/// fully resolved this tick's finishes.
pub(crate) fn update_storyline(
    storyline: Option<ResMut<Storyline>>,
    mut director: ResMut<MissionDirector>,
    mut outbox: ResMut<Outbox>,
    time: Res<Time>,
    player: Query<&GlobalTransform, With<StoryActor>>,
    mut commands_in: MessageReader<StoryCommand>,
    mut requests: MessageWriter<PresentRequest>,
    mut events: MessageWriter<StoryEvent>,
) {
    let Some(mut storyline) = storyline else {
        return;
    };

    let mut flags_changed = false;
    for command in commands_in.read() {
        match command {
            StoryCommand::Start(name) => {
                if let Err(story_error) =
                    storyline.start_by_name(name, &mut director, &mut outbox)
                {
                    error!(%story_error, "commanded mission start failed");
                }
            }
            StoryCommand::SetFlag { name, value } => match storyline.set_flag(name, *value) {
                Ok(()) => flags_changed = true,
                Err(story_error) => error!(%story_error, "flag update dropped"),
            },
            StoryCommand::Abort => storyline.abort(&mut outbox),
        }
    }
    if flags_changed {
        storyline.refresh(director.is_mission_active());
    }

    for finished in director.take_just_finished() {
        storyline.on_mission_finished(&finished, &mut outbox);
    }

    let Ok(transform) = player.single() else {
        flush(&mut outbox, &mut requests, &mut events);
        return;
    };
    let tick = TickInput::new(
        time.elapsed().as_millis() as u32,
        transform.translation(),
    );
    storyline.update(&tick, &mut director, &mut outbox);

    flush(&mut outbox, &mut requests, &mut events);
}

#[cfg(test)]
mod tests {
    use bevy::prelude::*;

    use super::*;
    use crate::objective::Objective;

    fn two_mission_storyline() -> Storyline {
        Storyline::builder()
            .flag("UNLOCK_A", true)
            .flag("DONE_A", false)
            .flag("UNLOCK_B", false)
            .flag("DONE_B", false)
            .mission(
                StoryMission::new("A", "DONE_A", Vec3::new(10.0, 0.0, 0.0)).requires("UNLOCK_A"),
            )
            .mission(
                StoryMission::new("B", "DONE_B", Vec3::new(-50.0, 0.0, 0.0)).requires("UNLOCK_B"),
            )
            .register("A", || Mission::new("A").then(Objective::when(|_| true)))
            .register("B", || Mission::new("B").then(Objective::when(|_| true)))
            .build()
            .expect("valid catalog")
    }

    fn available_names(storyline: &Storyline) -> Vec<&str> {
        storyline
            .available_missions()
            .map(StoryMission::name)
            .collect()
    }

    #[test]
    fn availability_follows_unlock_and_finished_flags() {
        let mut storyline = two_mission_storyline();
        assert_eq!(available_names(&storyline), vec!["A"]);

        storyline.set_flag("DONE_A", true).unwrap();
        storyline.refresh_available(false);
        assert_eq!(available_names(&storyline), Vec::<&str>::new());

        storyline.set_flag("UNLOCK_B", true).unwrap();
        storyline.refresh_available(false);
        assert_eq!(available_names(&storyline), vec!["B"]);
    }

    #[test]
    fn out_of_band_unlock_surfaces_after_refresh() {
        let mut storyline = two_mission_storyline();
        assert_eq!(available_names(&storyline), vec!["A"]);

        // a scripted unlock, outside any mission finish
        storyline.set_flag("UNLOCK_B", true).unwrap();
        assert_eq!(available_names(&storyline), vec!["A"]);

        storyline.refresh(false);
        assert_eq!(available_names(&storyline), vec!["A", "B"]);
    }

    #[test]
    fn missing_finished_flag_is_a_build_error() {
        let result = Storyline::builder()
            .mission(StoryMission::new("A", "DONE_A", Vec3::ZERO))
            .build();
        assert_eq!(
            result.err(),
            Some(StoryError::MissingFinishedFlag {
                mission: "A".to_string(),
                flag: "DONE_A".to_string(),
            })
        );
    }

    #[test]
    fn missing_required_flag_counts_as_locked_not_an_error() {
        let storyline = Storyline::builder()
            .flag("DONE_A", false)
            .mission(StoryMission::new("A", "DONE_A", Vec3::ZERO).requires("NEVER_SEEDED"))
            .build()
            .expect("catalog is well formed");
        assert!(available_names(&storyline).is_empty());
    }

    #[test]
    fn unknown_flag_accessors_error() {
        let mut storyline = two_mission_storyline();
        assert!(matches!(
            storyline.flag("NOPE"),
            Err(StoryError::UnknownFlag(_))
        ));
        assert!(matches!(
            storyline.set_flag("NOPE", true),
            Err(StoryError::UnknownFlag(_))
        ));
    }

    #[test]
    fn blips_track_the_availability_set() {
        let mut storyline = two_mission_storyline();
        let mut outbox = Outbox::default();
        storyline.sync_blips(&mut outbox);
        assert_eq!(storyline.blips.len(), 1);
        assert!(matches!(
            outbox.requests()[0],
            PresentRequest::CreateBlip { route: false, .. }
        ));

        outbox.clear();
        storyline.set_flag("DONE_A", true).unwrap();
        storyline.refresh_available(false);
        storyline.sync_blips(&mut outbox);
        assert!(storyline.blips.is_empty());
        assert!(matches!(
            outbox.requests()[0],
            PresentRequest::RemoveBlip { .. }
        ));
    }

    #[test]
    fn closest_scan_is_throttled_to_the_interval() {
        let mut storyline = two_mission_storyline();
        storyline.set_flag("UNLOCK_B", true).unwrap();
        storyline.refresh_available(false);
        let mut director = MissionDirector::new();
        let mut outbox = Outbox::default();

        // nearer to A at t=0 (well outside the activation threshold)
        let near_a = TickInput::new(0, Vec3::new(20.0, 0.0, 0.0));
        storyline.update(&near_a, &mut director, &mut outbox);
        assert_eq!(storyline.closest_mission().map(StoryMission::name), Some("A"));

        // moved toward B, but inside the throttle window the scan is stale
        let near_b = TickInput::new(200, Vec3::new(-45.0, 0.0, 0.0));
        storyline.update(&near_b, &mut director, &mut outbox);
        assert_eq!(storyline.closest_mission().map(StoryMission::name), Some("A"));

        let near_b_later = TickInput::new(520, Vec3::new(-45.0, 0.0, 0.0));
        storyline.update(&near_b_later, &mut director, &mut outbox);
        assert_eq!(storyline.closest_mission().map(StoryMission::name), Some("B"));
    }

    #[test]
    fn markers_are_drawn_every_tick_for_every_available_mission() {
        let mut storyline = two_mission_storyline();
        storyline.set_flag("UNLOCK_B", true).unwrap();
        storyline.refresh_available(false);
        let mut director = MissionDirector::new();
        let mut outbox = Outbox::default();

        for now in [0, 16] {
            outbox.clear();
            storyline.update(
                &TickInput::new(now, Vec3::new(500.0, 0.0, 0.0)),
                &mut director,
                &mut outbox,
            );
            let markers = outbox
                .requests()
                .iter()
                .filter(|request| matches!(request, PresentRequest::Marker { .. }))
                .count();
            assert_eq!(markers, 2);
        }
    }

    #[test]
    fn standing_on_the_marker_starts_the_mission_after_the_fade() {
        let mut storyline = two_mission_storyline();
        let mut director = MissionDirector::new();
        let mut outbox = Outbox::default();

        // squared distance 1 to A: inside the trigger threshold of 2
        let on_marker = TickInput::new(0, Vec3::new(11.0, 0.0, 0.0));
        storyline.update(&on_marker, &mut director, &mut outbox);
        assert!(
            outbox
                .requests()
                .contains(&PresentRequest::FadeOut { millis: FADE_MS })
        );
        assert!(!director.is_mission_active());

        // fade has finished: the mission starts and availability drains
        outbox.clear();
        let after_fade = TickInput::new(FADE_MS, Vec3::new(11.0, 0.0, 0.0));
        storyline.update(&after_fade, &mut director, &mut outbox);
        assert!(director.is_mission_active());
        assert_eq!(director.active_mission().map(Mission::name), Some("A"));
        assert!(
            outbox
                .requests()
                .contains(&PresentRequest::FadeIn { millis: FADE_MS })
        );
        assert!(available_names(&storyline).is_empty());
        assert_eq!(storyline.closest_mission().map(StoryMission::name), None);
    }

    #[test]
    fn finishing_a_registered_mission_refreshes_availability() {
        let mut storyline = two_mission_storyline();
        let mut director = MissionDirector::new();
        let mut outbox = Outbox::default();

        storyline
            .start_by_name("A", &mut director, &mut outbox)
            .unwrap();
        assert!(available_names(&storyline).is_empty());

        // the mission completes and the host marks it done
        director.update(&TickInput::new(0, Vec3::ZERO), &mut outbox);
        assert!(!director.is_mission_active());
        storyline.set_flag("DONE_A", true).unwrap();
        storyline.on_mission_finished("A", &mut outbox);
        assert!(available_names(&storyline).is_empty());

        // an unrelated finish leaves the cache alone
        storyline.set_flag("DONE_A", false).unwrap();
        storyline.on_mission_finished("not_ours", &mut outbox);
        assert!(available_names(&storyline).is_empty());
        storyline.on_mission_finished("A", &mut outbox);
        assert_eq!(available_names(&storyline), vec!["A"]);
    }

    #[test]
    fn abort_removes_all_blips_and_is_idempotent() {
        let mut storyline = two_mission_storyline();
        let mut outbox = Outbox::default();
        storyline.sync_blips(&mut outbox);
        outbox.clear();

        storyline.abort(&mut outbox);
        assert_eq!(outbox.requests().len(), 1);

        outbox.clear();
        storyline.abort(&mut outbox);
        assert!(outbox.requests().is_empty());
    }
}
