#![forbid(unsafe_code)]
//! Suppléance : répartition des remplacements de cours (sans BD).
//!
//! - Emploi du temps hebdomadaire unique par enseignant, modifié le jour même
//!   puis restauré à l'identique.
//! - Priorité au département, puis à la charge la plus faible ; tirage au sort
//!   entre ex aequo.
//! - Cycle quotidien (allocation le matin, annulation l'après-midi) et remise
//!   à zéro mensuelle des compteurs.
//! - Stockage fichiers (JSON/CSV), heure locale.

pub mod config;
pub mod cycle;
pub mod engine;
pub mod events;
pub mod io;
pub mod model;
pub mod notification;
pub mod storage;
pub mod store;

pub use config::{ConfigError, CycleConfig, DaemonConfig};
pub use cycle::{Clock, CoverService, DailyCycle, ManualClock, Phase, ResetFlag, SystemClock};
pub use engine::{AllocationReport, CoverEngine, EngineError, RevertReport, RevertScope};
pub use events::RefreshEvent;
pub use model::{
    AbsenceRecord, AllocationRecord, Lesson, LessonKey, Role, SchoolDay, SubstituteState,
    Teacher, Timetable, Username,
};
pub use notification::{
    Escalation, EscalationRenderer, LogNotifier, Notifier, OutboxNotifier, SendError,
    TextEscalation,
};
pub use storage::{JsonStorage, PersistentStore, Storage};
pub use store::{StoreError, TimetableStore};
