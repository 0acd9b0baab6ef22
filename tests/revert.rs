#![forbid(unsafe_code)]
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::cell::Cell;
use suppleance::{
    AbsenceRecord, CoverEngine, JsonStorage, Lesson, LessonKey, LogNotifier, PersistentStore,
    RevertScope, Role, SchoolDay, Storage, StoreError, SubstituteState, Teacher, Timetable,
    TimetableStore, Username,
};

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 10, d).unwrap()
}

/// Trois enseignants de maths ; `a` enseigne le mercredi (1er) et le vendredi (3).
fn school() -> Timetable {
    let mut tt = Timetable::default();
    for name in ["a", "b", "c"] {
        let t = Teacher::new(name, name.to_uppercase(), Role::Teacher, Some("Maths".into()), 10).unwrap();
        tt.add_teacher(t).unwrap();
        tt.fill_free_slots(&Username::new(name));
    }
    for (day, number, class) in [
        (SchoolDay::Wednesday, 1, "11J"),
        (SchoolDay::Wednesday, 4, "9B"),
        (SchoolDay::Friday, 2, "10G"),
    ] {
        tt.upsert_lesson(Lesson::new(Username::new("a"), day, number, "Maths", class).unwrap())
            .unwrap();
    }
    tt.upsert_lesson(Lesson::new(Username::new("b"), SchoolDay::Wednesday, 1, "Maths", "7A").unwrap())
        .unwrap();
    tt
}

fn absent(tt: &mut impl TimetableStore, name: &str, on: NaiveDate) {
    tt.record_absence(AbsenceRecord {
        username: Username::new(name),
        date: on,
        reason: String::new(),
    })
    .unwrap();
}

fn engine() -> CoverEngine<StdRng> {
    CoverEngine::with_rng(StdRng::seed_from_u64(7))
}

fn state(tt: &Timetable, name: &str, day: SchoolDay, number: u8) -> SubstituteState {
    tt.lesson(&LessonKey {
        username: Username::new(name),
        day,
        number,
    })
    .unwrap()
    .state
}

#[test]
fn revert_restores_the_weekly_template() {
    let mut tt = school();
    absent(&mut tt, "a", date(1));
    let template = tt.clone();

    let mut engine = engine();
    let report = engine.allocate(&mut tt, &LogNotifier, date(1)).unwrap();
    assert_eq!(report.allocations.len(), 2);
    assert_ne!(tt.lessons, template.lessons);

    let reverted = engine.revert(&mut tt, RevertScope::Week).unwrap();
    assert_eq!(reverted.released, 2);
    assert_eq!(reverted.restored, 2);
    assert!(reverted.failures.is_empty());
    assert_eq!(tt.lessons, template.lessons);
    assert_eq!(tt.absences, template.absences);

    // les compteurs restent acquis jusqu'à la remise à zéro mensuelle
    let total: u32 = tt.teachers.iter().map(|t| t.current_covers).sum();
    assert_eq!(total, 2);
}

#[test]
fn day_scope_leaves_other_days_alone() {
    let mut tt = school();
    absent(&mut tt, "a", date(1));
    absent(&mut tt, "a", date(3));

    let mut engine = engine();
    engine.allocate(&mut tt, &LogNotifier, date(1)).unwrap();
    engine.allocate(&mut tt, &LogNotifier, date(3)).unwrap();
    assert!(matches!(state(&tt, "a", SchoolDay::Friday, 2), SubstituteState::Subbed(_)));

    let reverted = engine.revert(&mut tt, RevertScope::Day(SchoolDay::Wednesday)).unwrap();
    assert_eq!(reverted.restored, 2);
    assert_eq!(state(&tt, "a", SchoolDay::Wednesday, 1), SubstituteState::None);
    assert_eq!(state(&tt, "a", SchoolDay::Wednesday, 4), SubstituteState::None);
    assert!(matches!(state(&tt, "a", SchoolDay::Friday, 2), SubstituteState::Subbed(_)));
}

#[test]
fn revert_on_clean_template_is_a_no_op() {
    let mut tt = school();
    let before = tt.clone();
    let reverted = engine().revert(&mut tt, RevertScope::Week).unwrap();
    assert_eq!(reverted.released, 0);
    assert_eq!(reverted.restored, 0);
    assert_eq!(tt, before);
}

#[test]
fn released_slot_is_free_again() {
    let mut tt = school();
    absent(&mut tt, "b", date(1));
    let mut engine = engine();
    let report = engine.allocate(&mut tt, &LogNotifier, date(1)).unwrap();
    // seul `c` est libre en L1 le mercredi
    assert_eq!(report.allocations[0].substitute.as_str(), "c");
    engine.revert(&mut tt, RevertScope::Week).unwrap();

    let slot = tt
        .lesson(&LessonKey {
            username: Username::new("c"),
            day: SchoolDay::Wednesday,
            number: 1,
        })
        .unwrap();
    assert_eq!(slot, Lesson::free(Username::new("c"), SchoolDay::Wednesday, 1));
}

#[test]
fn persistent_store_survives_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("timetable.json");
    let storage = JsonStorage::open(&path).unwrap();
    storage.save(&school()).unwrap();

    let mut store = PersistentStore::open(JsonStorage::open(&path).unwrap()).unwrap();
    absent(&mut store, "a", date(1));
    let report = engine().allocate(&mut store, &LogNotifier, date(1)).unwrap();
    assert_eq!(report.allocations.len(), 2);

    let reloaded = JsonStorage::open(&path).unwrap().load().unwrap();
    assert_eq!(&reloaded, store.timetable());
    assert!(matches!(
        state(&reloaded, "a", SchoolDay::Wednesday, 1),
        SubstituteState::Subbed(_)
    ));
}

/// Support qui refuse toute sauvegarde après un certain nombre d'appels.
struct Failing {
    budget: Cell<usize>,
}

impl Storage for Failing {
    fn load(&self) -> anyhow::Result<Timetable> {
        Ok(school())
    }

    fn save(&self, _: &Timetable) -> anyhow::Result<()> {
        match self.budget.get() {
            0 => anyhow::bail!("read-only filesystem"),
            n => {
                self.budget.set(n - 1);
                Ok(())
            }
        }
    }
}

#[test]
fn failed_save_rolls_back_memory() {
    let mut store = PersistentStore::open(Failing { budget: Cell::new(1) }).unwrap();
    absent(&mut store, "a", date(1));
    let before = store.timetable().clone();

    let report = engine().allocate(&mut store, &LogNotifier, date(1)).unwrap();
    assert!(report.allocations.is_empty());
    assert_eq!(report.failures.len(), 2);
    assert!(matches!(report.failures[0].error, StoreError::Persist(_)));
    assert_eq!(store.timetable(), &before);
}
