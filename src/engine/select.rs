use crate::model::{load_pct, LessonKey, SchoolDay, Username};
use crate::store::{StoreError, TimetableStore};
use rand::seq::IndexedRandom;
use rand::Rng;

/// Collègue libre sur le créneau à couvrir.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct Candidate {
    pub username: Username,
    pub department: Option<String>,
    pub load_pct: f64,
}

/// Collègues présents dont le créneau est `Free`. Un plafond nul exclut le candidat.
pub(super) fn candidate_pool(
    store: &dyn TimetableStore,
    present: &[Username],
    day: SchoolDay,
    number: u8,
) -> Result<Vec<Candidate>, StoreError> {
    let mut pool = Vec::new();
    for username in present {
        let key = LessonKey {
            username: username.clone(),
            day,
            number,
        };
        let lesson = match store.lesson(&key) {
            Ok(lesson) => lesson,
            Err(StoreError::LessonNotFound(_)) => continue,
            Err(err) => return Err(err),
        };
        if !lesson.is_free() {
            continue;
        }
        let teacher = store.teacher(username)?;
        let Some(load) = load_pct(teacher.current_covers, teacher.cover_limit) else {
            tracing::warn!(teacher = %username, "cover limit is 0, skipping candidate");
            continue;
        };
        pool.push(Candidate {
            username: teacher.username,
            department: teacher.department,
            load_pct: load,
        });
    }
    Ok(pool)
}

/// Même département que l'absent si possible, sinon tout le vivier.
pub(super) fn selection_pool<'a>(
    pool: &'a [Candidate],
    department: &Option<String>,
) -> Vec<&'a Candidate> {
    let same: Vec<&Candidate> = pool.iter().filter(|c| &c.department == department).collect();
    if same.is_empty() {
        pool.iter().collect()
    } else {
        same
    }
}

/// Candidats ex aequo sur la charge minimale.
pub(super) fn least_loaded<'a>(pool: &[&'a Candidate]) -> Vec<&'a Candidate> {
    let Some(min) = pool.iter().map(|c| c.load_pct).reduce(f64::min) else {
        return Vec::new();
    };
    pool.iter().copied().filter(|c| c.load_pct == min).collect()
}

pub(super) fn pick<'a, R: Rng>(suitable: &[&'a Candidate], rng: &mut R) -> Option<&'a Candidate> {
    suitable.choose(rng).copied()
}
