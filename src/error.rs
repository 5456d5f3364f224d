use thiserror::Error;

/// Failures surfaced by the mission and storyline engines.
///
/// Configuration and usage errors are fatal to the call that raised them;
/// persistence problems are recovered where they happen and never reach
/// this type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoryError {
    /// A mission was started with an empty objective sequence.
    #[error("mission `{0}` has no objectives")]
    EmptyMission(String),

    /// A second mission was started while one is still active.
    #[error("mission `{active}` is still active, refusing to start `{requested}`")]
    MissionActive { active: String, requested: String },

    /// A flag accessor was called with a name that was never seeded.
    #[error("unknown mission flag `{0}`")]
    UnknownFlag(String),

    /// A catalog entry references a finished flag that is absent from the
    /// flag table. The catalog is malformed.
    #[error("story mission `{mission}` references missing finished flag `{flag}`")]
    MissingFinishedFlag { mission: String, flag: String },

    /// A story mission name has no registered constructor.
    #[error("no mission registered under `{0}`")]
    UnknownMission(String),
}
