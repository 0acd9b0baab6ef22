use crate::model::{
    AbsenceRecord, AllocationRecord, Lesson, LessonKey, SchoolDay, SubstituteState, Teacher,
    Timetable, Username,
};
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("unknown teacher: {0}")]
    UnknownTeacher(String),
    #[error("no lesson at {0}")]
    LessonNotFound(LessonKey),
    #[error("absence already recorded for {username} on {date}")]
    DuplicateAbsence { username: String, date: NaiveDate },
    #[error("cover rejected at {key}: {reason}")]
    CoverRejected { key: LessonKey, reason: &'static str },
    #[error("persisting timetable failed: {0}")]
    Persist(String),
    #[error("loading timetable failed: {0}")]
    Load(String),
    #[error("cover at {key} left half-applied ({cause})")]
    HalfApplied { key: LessonKey, cause: String },
}

/// Contrat d'accès à l'emploi du temps consommé par le moteur.
pub trait TimetableStore {
    fn all_usernames(&self) -> Result<Vec<Username>, StoreError>;
    fn teacher(&self, username: &Username) -> Result<Teacher, StoreError>;
    /// Cours d'un jour, triés par numéro.
    fn lessons(&self, username: &Username, day: SchoolDay) -> Result<Vec<Lesson>, StoreError>;
    fn lesson(&self, key: &LessonKey) -> Result<Lesson, StoreError>;
    /// Remplace le contenu d'un créneau existant (la clé est portée par `lesson`).
    fn set_lesson(&mut self, lesson: Lesson) -> Result<(), StoreError>;
    fn is_absent(&self, username: &Username, date: NaiveDate) -> Result<bool, StoreError>;
    fn record_absence(&mut self, absence: AbsenceRecord) -> Result<(), StoreError>;
    fn increment_current_covers(&mut self, username: &Username) -> Result<(), StoreError>;
    fn reset_current_covers(&mut self, username: &Username) -> Result<(), StoreError>;

    /// Relit l'état persistant avant une passe, pour voir les écritures faites
    /// par d'autres processus (CLI). Rien à relire pour un magasin en mémoire.
    fn reload(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    fn department(&self, username: &Username) -> Result<Option<String>, StoreError> {
        Ok(self.teacher(username)?.department)
    }
    fn cover_limit(&self, username: &Username) -> Result<u32, StoreError> {
        Ok(self.teacher(username)?.cover_limit)
    }
    fn current_covers(&self, username: &Username) -> Result<u32, StoreError> {
        Ok(self.teacher(username)?.current_covers)
    }

    /// Applique un remplacement en une seule transaction : cours de l'absent,
    /// cours du remplaçant, compteur. Annule les écritures déjà faites en cas d'échec.
    fn apply_cover(&mut self, record: &AllocationRecord) -> Result<(), StoreError> {
        let absent_before = self.lesson(&record.absent_key())?;
        let sub_before = self.lesson(&record.substitute_key())?;
        check_cover(record, &absent_before, &sub_before)?;

        let (absent_after, sub_after) = covered_pair(record, &absent_before, &sub_before);
        self.set_lesson(absent_after)?;
        if let Err(err) = self.set_lesson(sub_after) {
            return Err(rollback(self, err, [absent_before]));
        }
        if let Err(err) = self.increment_current_covers(&record.substitute) {
            return Err(rollback(self, err, [sub_before, absent_before]));
        }
        Ok(())
    }
}

/// Réécrit les lignes d'origine. Si l'une d'elles échoue, le remplacement
/// reste à moitié appliqué et l'erreur le dit.
fn rollback<S, const N: usize>(store: &mut S, cause: StoreError, lessons: [Lesson; N]) -> StoreError
where
    S: TimetableStore + ?Sized,
{
    let mut stuck = None;
    for lesson in lessons {
        let key = lesson.key();
        if let Err(error) = store.set_lesson(lesson) {
            tracing::error!(%key, %error, %cause, "rollback failed, cover left half-applied");
            stuck.get_or_insert(key);
        }
    }
    match stuck {
        Some(key) => StoreError::HalfApplied {
            key,
            cause: cause.to_string(),
        },
        None => cause,
    }
}

/// Vérifie qu'un remplacement s'applique à un modèle non encore modifié.
pub fn check_cover(
    record: &AllocationRecord,
    absent: &Lesson,
    substitute: &Lesson,
) -> Result<(), StoreError> {
    if absent.state != SubstituteState::None {
        return Err(StoreError::CoverRejected {
            key: record.absent_key(),
            reason: "absent lesson already processed",
        });
    }
    if !substitute.is_free() {
        return Err(StoreError::CoverRejected {
            key: record.substitute_key(),
            reason: "substitute slot is not free",
        });
    }
    Ok(())
}

/// Lignes après remplacement : `Subbed` chez l'absent, `Subbing` chez le remplaçant.
pub fn covered_pair(record: &AllocationRecord, absent: &Lesson, substitute: &Lesson) -> (Lesson, Lesson) {
    let absent_after = Lesson {
        state: SubstituteState::Subbed(record.substitute.clone()),
        ..absent.clone()
    };
    let sub_after = Lesson {
        subject: record.subject.clone(),
        class_name: record.class_name.clone(),
        state: SubstituteState::Subbing(record.absent.clone()),
        ..substitute.clone()
    };
    (absent_after, sub_after)
}

impl TimetableStore for Timetable {
    fn all_usernames(&self) -> Result<Vec<Username>, StoreError> {
        Ok(self.teachers.iter().map(|t| t.username.clone()).collect())
    }

    fn teacher(&self, username: &Username) -> Result<Teacher, StoreError> {
        self.find_teacher(username)
            .cloned()
            .ok_or_else(|| StoreError::UnknownTeacher(username.to_string()))
    }

    fn lessons(&self, username: &Username, day: SchoolDay) -> Result<Vec<Lesson>, StoreError> {
        if self.find_teacher(username).is_none() {
            return Err(StoreError::UnknownTeacher(username.to_string()));
        }
        let mut out: Vec<Lesson> = self
            .lessons
            .iter()
            .filter(|l| &l.username == username && l.day == day)
            .cloned()
            .collect();
        out.sort_by_key(|l| l.number);
        Ok(out)
    }

    fn lesson(&self, key: &LessonKey) -> Result<Lesson, StoreError> {
        self.find_lesson(key)
            .cloned()
            .ok_or_else(|| StoreError::LessonNotFound(key.clone()))
    }

    fn set_lesson(&mut self, lesson: Lesson) -> Result<(), StoreError> {
        let key = lesson.key();
        let slot = self
            .find_lesson_mut(&key)
            .ok_or(StoreError::LessonNotFound(key))?;
        *slot = lesson;
        Ok(())
    }

    fn is_absent(&self, username: &Username, date: NaiveDate) -> Result<bool, StoreError> {
        Ok(self
            .absences
            .iter()
            .any(|a| &a.username == username && a.date == date))
    }

    fn record_absence(&mut self, absence: AbsenceRecord) -> Result<(), StoreError> {
        if self.find_teacher(&absence.username).is_none() {
            return Err(StoreError::UnknownTeacher(absence.username.to_string()));
        }
        if self.is_absent(&absence.username, absence.date)? {
            return Err(StoreError::DuplicateAbsence {
                username: absence.username.to_string(),
                date: absence.date,
            });
        }
        self.absences.push(absence);
        Ok(())
    }

    fn increment_current_covers(&mut self, username: &Username) -> Result<(), StoreError> {
        let teacher = self
            .find_teacher_mut(username)
            .ok_or_else(|| StoreError::UnknownTeacher(username.to_string()))?;
        teacher.current_covers = teacher.current_covers.saturating_add(1);
        Ok(())
    }

    fn reset_current_covers(&mut self, username: &Username) -> Result<(), StoreError> {
        let teacher = self
            .find_teacher_mut(username)
            .ok_or_else(|| StoreError::UnknownTeacher(username.to_string()))?;
        teacher.current_covers = 0;
        Ok(())
    }

    // Tout est vérifié avant la première écriture : rien à annuler.
    fn apply_cover(&mut self, record: &AllocationRecord) -> Result<(), StoreError> {
        let absent_before = self.lesson(&record.absent_key())?;
        let sub_before = self.lesson(&record.substitute_key())?;
        check_cover(record, &absent_before, &sub_before)?;
        let teacher = self
            .find_teacher_mut(&record.substitute)
            .ok_or_else(|| StoreError::UnknownTeacher(record.substitute.to_string()))?;
        teacher.current_covers = teacher.current_covers.saturating_add(1);

        let (absent_after, sub_after) = covered_pair(record, &absent_before, &sub_before);
        self.set_lesson(absent_after)?;
        self.set_lesson(sub_after)?;
        Ok(())
    }
}
