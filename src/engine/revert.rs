use super::types::{EngineError, LessonFailure, RevertReport, RevertScope};
use super::CoverEngine;
use crate::events::RefreshEvent;
use crate::model::{Lesson, SubstituteState};
use crate::store::TimetableStore;
use rand::Rng;

pub(super) fn revert<R: Rng>(
    engine: &mut CoverEngine<R>,
    store: &mut dyn TimetableStore,
    scope: RevertScope,
) -> Result<RevertReport, EngineError> {
    let mut report = RevertReport::default();

    for username in store.all_usernames()? {
        for day in scope.days() {
            let lessons = match store.lessons(&username, day) {
                Ok(lessons) => lessons,
                Err(error) => {
                    report.failures.push(LessonFailure {
                        username: username.clone(),
                        day,
                        number: None,
                        error,
                    });
                    continue;
                }
            };

            for lesson in lessons {
                let number = lesson.number;
                let released = matches!(lesson.state, SubstituteState::Subbing(_));
                let restored = match lesson.state {
                    SubstituteState::Subbing(_) => {
                        Lesson::free(lesson.username.clone(), lesson.day, number)
                    }
                    SubstituteState::Subbed(_) => Lesson {
                        state: SubstituteState::None,
                        ..lesson
                    },
                    SubstituteState::None | SubstituteState::Free => continue,
                };
                match store.set_lesson(restored) {
                    Ok(()) if released => report.released += 1,
                    Ok(()) => report.restored += 1,
                    Err(error) => {
                        tracing::error!(teacher = %username, %day, lesson = number, %error, "revert failed");
                        report.failures.push(LessonFailure {
                            username: username.clone(),
                            day,
                            number: Some(number),
                            error,
                        });
                    }
                }
            }
        }
    }

    tracing::info!(
        released = report.released,
        restored = report.restored,
        failed = report.failures.len(),
        "revert finished"
    );
    engine.refresh.emit(&RefreshEvent::Reverted {
        released: report.released,
        restored: report.restored,
        failures: report.failures.len(),
    });
    Ok(report)
}
