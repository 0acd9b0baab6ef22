use super::select;
use super::types::{AllocationReport, EngineError, LessonFailure};
use super::CoverEngine;
use crate::events::RefreshEvent;
use crate::model::{AllocationRecord, Lesson, SchoolDay, SubstituteState, Username};
use crate::notification::{Escalation, Notifier};
use crate::store::{StoreError, TimetableStore};
use chrono::NaiveDate;
use rand::Rng;

enum Outcome {
    Covered(AllocationRecord),
    Escalated(Escalation),
}

pub(super) fn allocate<R: Rng>(
    engine: &mut CoverEngine<R>,
    store: &mut dyn TimetableStore,
    notifier: &dyn Notifier,
    today: NaiveDate,
) -> Result<AllocationReport, EngineError> {
    let mut report = AllocationReport {
        date: Some(today),
        ..AllocationReport::default()
    };
    let Some(day) = SchoolDay::from_date(today) else {
        tracing::info!(%today, "weekend, nothing to allocate");
        return Ok(report);
    };

    let mut present = Vec::new();
    for username in store.all_usernames()? {
        if store.is_absent(&username, today)? {
            report.absent.push(username);
        } else {
            present.push(username);
        }
    }
    report.day = Some(day);

    let queue = cover_queue(&*store, &report.absent, day, &mut report.failures);

    for lesson in queue {
        match cover_lesson(engine, store, notifier, today, &present, &lesson) {
            Ok(Outcome::Covered(record)) => {
                tracing::debug!(
                    absent = %record.absent,
                    substitute = %record.substitute,
                    lesson = record.number,
                    "cover allocated"
                );
                report.allocations.push(record);
            }
            Ok(Outcome::Escalated(escalation)) => report.escalations.push(escalation),
            Err(error) => {
                tracing::error!(
                    teacher = %lesson.username,
                    %day,
                    lesson = lesson.number,
                    %error,
                    "cover allocation failed"
                );
                report.failures.push(LessonFailure {
                    username: lesson.username.clone(),
                    day,
                    number: Some(lesson.number),
                    error,
                });
            }
        }
    }

    tracing::info!(
        %today,
        absent = report.absent.len(),
        allocated = report.allocations.len(),
        escalated = report.escalations.len(),
        failed = report.failures.len(),
        "allocation finished"
    );
    engine.refresh.emit(&RefreshEvent::Allocated {
        date: today,
        allocations: report.allocations.len(),
        escalations: report.escalations.len(),
        failures: report.failures.len(),
    });
    Ok(report)
}

/// Cours à couvrir, dans l'ordre des enseignants puis des numéros de cours.
fn cover_queue(
    store: &dyn TimetableStore,
    absent: &[Username],
    day: SchoolDay,
    failures: &mut Vec<LessonFailure>,
) -> Vec<Lesson> {
    let mut queue = Vec::new();
    for username in absent {
        match store.lessons(username, day) {
            Ok(lessons) => {
                // même jour de la semaine déjà couvert et jamais annulé
                if lessons.iter().any(|l| matches!(l.state, SubstituteState::Subbed(_))) {
                    tracing::warn!(teacher = %username, %day, "template still holds covers, revert first");
                }
                queue.extend(lessons.into_iter().filter(Lesson::needs_cover));
            }
            Err(error) => {
                tracing::error!(teacher = %username, %day, %error, "reading lessons failed");
                failures.push(LessonFailure {
                    username: username.clone(),
                    day,
                    number: None,
                    error,
                });
            }
        }
    }
    queue
}

fn cover_lesson<R: Rng>(
    engine: &mut CoverEngine<R>,
    store: &mut dyn TimetableStore,
    notifier: &dyn Notifier,
    today: NaiveDate,
    present: &[Username],
    lesson: &Lesson,
) -> Result<Outcome, StoreError> {
    let absent = store.teacher(&lesson.username)?;
    let pool = select::candidate_pool(&*store, present, lesson.day, lesson.number)?;

    let selection = select::selection_pool(&pool, &absent.department);
    let suitable = select::least_loaded(&selection);
    let Some(chosen) = select::pick(&suitable, &mut engine.rng) else {
        let escalation = Escalation {
            date: today,
            username: lesson.username.clone(),
            teacher_name: absent.fullname,
            lesson_number: lesson.number,
            subject: lesson.subject.clone(),
            class_name: lesson.class_name.clone(),
        };
        tracing::warn!(teacher = %lesson.username, lesson = lesson.number, "no free teacher, escalating");
        if let Err(error) = notifier.notify(&escalation) {
            tracing::warn!(%error, "escalation could not be sent");
        }
        return Ok(Outcome::Escalated(escalation));
    };

    let record = AllocationRecord {
        absent: lesson.username.clone(),
        substitute: chosen.username.clone(),
        day: lesson.day,
        number: lesson.number,
        subject: lesson.subject.clone(),
        class_name: lesson.class_name.clone(),
    };
    store.apply_cover(&record)?;
    Ok(Outcome::Covered(record))
}
