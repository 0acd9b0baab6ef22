#![forbid(unsafe_code)]
use chrono::{NaiveDate, NaiveDateTime};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;
use std::sync::Arc;
use suppleance::config::CycleConfig;
use suppleance::cycle::{Latches, TickOutcome};
use suppleance::{
    AbsenceRecord, CoverEngine, CoverService, DailyCycle, JsonStorage, Lesson, LogNotifier,
    ManualClock, PersistentStore, Phase, ResetFlag, RevertScope, Role, SchoolDay, Storage,
    Teacher, Timetable, TimetableStore, Username,
};

fn at(y: i32, m: u32, d: u32, hour: u32, min: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(hour, min, 0)
        .unwrap()
}

/// `a` absent le mercredi 8 et le jeudi 9 octobre 2025, `b` libre.
fn school() -> Timetable {
    let mut tt = Timetable::default();
    for (name, covers) in [("a", 0), ("b", 4)] {
        let mut t = Teacher::new(name, name.to_uppercase(), Role::Teacher, None, 10).unwrap();
        t.current_covers = covers;
        tt.add_teacher(t).unwrap();
        tt.fill_free_slots(&Username::new(name));
    }
    for day in [SchoolDay::Wednesday, SchoolDay::Thursday] {
        tt.upsert_lesson(Lesson::new(Username::new("a"), day, 2, "History", "8C").unwrap())
            .unwrap();
    }
    for d in [8, 9] {
        tt.record_absence(AbsenceRecord {
            username: Username::new("a"),
            date: NaiveDate::from_ymd_opt(2025, 10, d).unwrap(),
            reason: "training".into(),
        })
        .unwrap();
    }
    tt
}

struct Harness {
    clock: Arc<ManualClock>,
    cycle: DailyCycle<Arc<ManualClock>>,
    engine: CoverEngine<StdRng>,
    store: Timetable,
}

impl Harness {
    fn new(start: NaiveDateTime, state_file: &Path) -> Self {
        let clock = Arc::new(ManualClock::new(start));
        let flag = ResetFlag::open(state_file).unwrap();
        let cycle = DailyCycle::new(Arc::clone(&clock), CycleConfig::default(), flag).unwrap();
        Self {
            clock,
            cycle,
            engine: CoverEngine::with_rng(StdRng::seed_from_u64(1)),
            store: school(),
        }
    }

    fn tick_at(&mut self, now: NaiveDateTime) -> TickOutcome {
        self.clock.set(now);
        self.cycle
            .tick(&mut self.engine, &mut self.store, &LogNotifier)
            .unwrap()
    }

    fn b_covers(&self) -> u32 {
        self.store.current_covers(&Username::new("b")).unwrap()
    }
}

fn quiet(outcome: &TickOutcome) -> bool {
    !outcome.covers_reset && outcome.allocation.is_none() && outcome.revert.is_none()
}

#[test]
fn one_allocation_and_one_revert_per_day() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = Harness::new(at(2025, 10, 8, 6, 29), &dir.path().join("state.json"));

    assert!(quiet(&h.tick_at(at(2025, 10, 8, 6, 29))));
    assert_eq!(h.cycle.phase(), Phase::Idle);

    let morning = h.tick_at(at(2025, 10, 8, 6, 30));
    let report = morning.allocation.expect("allocation at 06:30");
    assert_eq!(report.allocations.len(), 1);
    assert!(morning.revert.is_none());
    assert!(h.cycle.latches().allocated);

    for (hour, min) in [(6, 45), (7, 0), (14, 59)] {
        assert!(quiet(&h.tick_at(at(2025, 10, 8, hour, min))), "{hour}:{min}");
    }
    assert_eq!(h.cycle.phase(), Phase::Allocated);

    let afternoon = h.tick_at(at(2025, 10, 8, 15, 0));
    let reverted = afternoon.revert.expect("revert at 15:00");
    assert_eq!(reverted.restored, 1);
    assert_eq!(h.cycle.phase(), Phase::Reverted);
    assert!(!h.cycle.latches().allocated);

    assert!(quiet(&h.tick_at(at(2025, 10, 8, 23, 0))));
    assert!(quiet(&h.tick_at(at(2025, 10, 9, 5, 59))));
    assert!(quiet(&h.tick_at(at(2025, 10, 9, 6, 0))));
    assert_eq!(h.cycle.latches(), Latches::default());

    let thursday = h.tick_at(at(2025, 10, 9, 6, 30));
    assert_eq!(thursday.allocation.map(|r| r.allocations.len()), Some(1));
    assert_eq!(h.b_covers(), 6);
}

#[test]
fn missed_afternoon_is_reverted_overnight() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = Harness::new(at(2025, 10, 8, 6, 30), &dir.path().join("state.json"));

    assert!(h.tick_at(at(2025, 10, 8, 6, 30)).allocation.is_some());
    // le processus était arrêté à 15:00
    let night = h.tick_at(at(2025, 10, 9, 2, 0));
    assert_eq!(night.revert.map(|r| r.restored), Some(1));
    assert!(quiet(&h.tick_at(at(2025, 10, 9, 3, 0))));

    let morning = h.tick_at(at(2025, 10, 9, 6, 30));
    assert!(morning.allocation.is_some());
}

#[test]
fn no_allocation_on_weekends() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = Harness::new(at(2025, 10, 11, 6, 30), &dir.path().join("state.json"));
    let before = h.store.clone();

    let saturday = h.tick_at(at(2025, 10, 11, 6, 30));
    assert!(saturday.allocation.is_none());
    assert!(!h.cycle.latches().allocated);
    assert_eq!(h.store, before);
}

#[test]
fn monthly_reset_runs_once() {
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join("state.json");
    let mut h = Harness::new(at(2025, 10, 31, 8, 0), &state);

    assert!(quiet(&h.tick_at(at(2025, 10, 31, 8, 0))));
    assert_eq!(h.b_covers(), 4);

    assert!(h.tick_at(at(2025, 11, 1, 8, 0)).covers_reset);
    assert_eq!(h.b_covers(), 0);
    assert!(h.cycle.monthly_flag());

    h.store.increment_current_covers(&Username::new("b")).unwrap();
    assert!(!h.tick_at(at(2025, 11, 1, 9, 0)).covers_reset);
    assert_eq!(h.b_covers(), 1);

    // le drapeau est durable : un redémarrage le 1er ne refait pas la remise à zéro
    assert!(ResetFlag::open(&state).unwrap().is_set());
    let mut restarted = Harness::new(at(2025, 11, 1, 10, 0), &state);
    assert!(!restarted.tick_at(at(2025, 11, 1, 10, 0)).covers_reset);

    assert!(!h.tick_at(at(2025, 11, 2, 8, 0)).covers_reset);
    assert!(!h.cycle.monthly_flag());
    assert!(!ResetFlag::open(&state).unwrap().is_set());

    assert!(h.tick_at(at(2025, 12, 1, 8, 0)).covers_reset);
}

#[test]
fn missing_flag_file_means_not_cleared() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    assert!(!ResetFlag::open(&path).unwrap().is_set());
    std::fs::write(&path, "").unwrap();
    assert!(!ResetFlag::open(&path).unwrap().is_set());
}

#[test]
fn invalid_cycle_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let flag = ResetFlag::open(dir.path().join("state.json")).unwrap();
    let config = CycleConfig {
        poll_interval_secs: 0,
        ..CycleConfig::default()
    };
    let clock = ManualClock::new(at(2025, 10, 8, 6, 0));
    assert!(DailyCycle::new(&clock, config, flag).is_err());
}

#[test]
fn service_serialises_every_entry_point() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(at(2025, 10, 8, 6, 30)));
    let flag = ResetFlag::open(dir.path().join("state.json")).unwrap();
    let cycle = DailyCycle::new(Arc::clone(&clock), CycleConfig::default(), flag).unwrap();
    let service = CoverService::new(
        school(),
        LogNotifier,
        CoverEngine::with_rng(StdRng::seed_from_u64(3)),
        cycle,
    );

    assert_eq!(service.phase(), Phase::AllocationWindowOpen);
    let outcome = service.tick().unwrap();
    assert_eq!(outcome.allocation.map(|r| r.allocations.len()), Some(1));
    assert_eq!(service.phase(), Phase::Allocated);

    // relance manuelle : rien de neuf à couvrir
    let again = service
        .allocate_now(NaiveDate::from_ymd_opt(2025, 10, 8).unwrap())
        .unwrap();
    assert!(again.allocations.is_empty());

    let reverted = service.revert_now(RevertScope::Day(SchoolDay::Wednesday)).unwrap();
    assert_eq!((reverted.released, reverted.restored), (1, 1));

    assert_eq!(service.reset_covers_now().unwrap(), 2);
    let covers = service.with_store(|tt| tt.teachers.iter().map(|t| t.current_covers).sum::<u32>());
    assert_eq!(covers, 0);

    clock.set(at(2025, 10, 8, 15, 0));
    assert_eq!(service.phase(), Phase::RevertWindowOpen);
}

#[test]
fn unwritable_flag_does_not_block_the_day() {
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join("missing").join("state.json");
    let mut h = Harness::new(at(2025, 10, 1, 6, 29), &state);
    h.store
        .record_absence(AbsenceRecord {
            username: Username::new("a"),
            date: NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(),
            reason: String::new(),
        })
        .unwrap();

    let morning = h.tick_at(at(2025, 10, 1, 6, 30));
    assert!(morning.covers_reset);
    assert!(morning.monthly_error.is_some());
    assert_eq!(morning.allocation.map(|r| r.allocations.len()), Some(1));
    assert_eq!(h.b_covers(), 1);

    // le drapeau reste impossible à écrire, mais les compteurs ne sont pas remis à zéro deux fois
    let later = h.tick_at(at(2025, 10, 1, 6, 45));
    assert!(!later.covers_reset);
    assert!(later.monthly_error.is_some());
    assert_eq!(h.b_covers(), 1);

    let afternoon = h.tick_at(at(2025, 10, 1, 15, 0));
    assert_eq!(afternoon.revert.map(|r| r.restored), Some(1));
}

#[test]
fn daemon_sees_absences_recorded_by_another_process() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("timetable.json");
    let mut template = school();
    template.absences.clear();
    JsonStorage::open(&path).unwrap().save(&template).unwrap();

    let daemon = PersistentStore::open(JsonStorage::open(&path).unwrap()).unwrap();
    let clock = Arc::new(ManualClock::new(at(2025, 10, 8, 6, 0)));
    let flag = ResetFlag::open(dir.path().join("state.json")).unwrap();
    let cycle = DailyCycle::new(Arc::clone(&clock), CycleConfig::default(), flag).unwrap();
    let service = CoverService::new(
        daemon,
        LogNotifier,
        CoverEngine::with_rng(StdRng::seed_from_u64(5)),
        cycle,
    );
    assert!(service.tick().unwrap().allocation.is_none());

    // déclarée par la CLI pendant que le démon tourne
    let mut cli = PersistentStore::open(JsonStorage::open(&path).unwrap()).unwrap();
    cli.record_absence(AbsenceRecord {
        username: Username::new("a"),
        date: NaiveDate::from_ymd_opt(2025, 10, 8).unwrap(),
        reason: "sick".into(),
    })
    .unwrap();

    clock.set(at(2025, 10, 8, 6, 30));
    let report = service.tick().unwrap().allocation.expect("allocation at 06:30");
    assert_eq!(report.absent, vec![Username::new("a")]);
    assert_eq!(report.allocations.len(), 1);

    let on_disk = JsonStorage::open(&path).unwrap().load().unwrap();
    assert_eq!(on_disk.absences.len(), 1);
    assert_eq!(&on_disk, &service.with_store(|s| s.timetable().clone()));
}
