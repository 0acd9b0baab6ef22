use crate::model::Username;
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SendError {
    #[error("writing escalation {path}: {source}")]
    Outbox {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("notification channel unavailable: {0}")]
    Unavailable(String),
}

/// Cours qu'aucun collègue libre ne peut couvrir.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Escalation {
    pub date: NaiveDate,
    /// Login de l'absent ; `teacher_name` porte son nom complet.
    pub username: Username,
    pub teacher_name: String,
    pub lesson_number: u8,
    pub subject: String,
    pub class_name: String,
}

/// Destinataire des escalades. Un échec n'interrompt jamais l'allocation.
pub trait Notifier {
    fn notify(&self, escalation: &Escalation) -> Result<(), SendError>;
}

/// Permet de customiser le rendu du message (texte, mail, etc.).
pub trait EscalationRenderer {
    fn subject(&self, escalation: &Escalation) -> String;
    fn body(&self, escalation: &Escalation) -> String;
}

/// Gabarit texte simple destiné à un futur mail.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextEscalation;

impl EscalationRenderer for TextEscalation {
    fn subject(&self, escalation: &Escalation) -> String {
        format!(
            "Issue with Cover Allocation - Action Required, {}",
            escalation.date.format("%Y-%m-%d")
        )
    }

    fn body(&self, escalation: &Escalation) -> String {
        format!(
            "No cover could be found for the following lesson.\nPlease arrange a substitute.\n\nDate: {date}\nAbsent teacher: {name}\nLesson number: {lesson}\nSubject: {subject}\nClass: {class}\n",
            date = escalation.date.format("%Y-%m-%d"),
            name = escalation.teacher_name,
            lesson = escalation.lesson_number,
            subject = escalation.subject,
            class = escalation.class_name,
        )
    }
}

/// Écrit chaque escalade dans un fichier texte d'un répertoire « boîte d'envoi ».
pub struct OutboxNotifier<R: EscalationRenderer = TextEscalation> {
    dir: PathBuf,
    renderer: R,
}

impl OutboxNotifier<TextEscalation> {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self::with_renderer(dir, TextEscalation)
    }
}

impl<R: EscalationRenderer> OutboxNotifier<R> {
    pub fn with_renderer<P: AsRef<Path>>(dir: P, renderer: R) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            renderer,
        }
    }
}

impl<R: EscalationRenderer> Notifier for OutboxNotifier<R> {
    fn notify(&self, escalation: &Escalation) -> Result<(), SendError> {
        let path = self.dir.join(format!("escalation-{}.txt", Uuid::new_v4()));
        let content = format!(
            "Subject: {}\n\n{}",
            self.renderer.subject(escalation),
            self.renderer.body(escalation)
        );
        fs::create_dir_all(&self.dir)
            .and_then(|_| fs::write(&path, content))
            .map_err(|source| SendError::Outbox { path, source })
    }
}

/// Se contente de tracer l'escalade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, escalation: &Escalation) -> Result<(), SendError> {
        tracing::warn!(
            date = %escalation.date,
            username = %escalation.username,
            teacher = %escalation.teacher_name,
            lesson = escalation.lesson_number,
            subject = %escalation.subject,
            class = %escalation.class_name,
            "no cover available"
        );
        Ok(())
    }
}

impl<N: Notifier + ?Sized> Notifier for Box<N> {
    fn notify(&self, escalation: &Escalation) -> Result<(), SendError> {
        (**self).notify(escalation)
    }
}
