use crate::model::{AllocationRecord, SchoolDay, Username};
use crate::notification::Escalation;
use crate::store::StoreError;
use chrono::NaiveDate;
use std::fmt;
use thiserror::Error;

/// Échec qui empêche toute la passe (liste des enseignants illisible, etc.).
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("reading teachers failed: {0}")]
    Store(#[from] StoreError),
}

/// Échec limité à un cours (ou à la journée d'un enseignant si `number` est vide).
#[derive(Debug)]
pub struct LessonFailure {
    pub username: Username,
    pub day: SchoolDay,
    pub number: Option<u8>,
    pub error: StoreError,
}

impl fmt::Display for LessonFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.number {
            Some(n) => write!(f, "{}/{}/L{}: {}", self.username, self.day, n, self.error),
            None => write!(f, "{}/{}: {}", self.username, self.day, self.error),
        }
    }
}

/// Résultat d'une passe d'allocation.
#[derive(Debug, Default)]
pub struct AllocationReport {
    pub date: Option<NaiveDate>,
    pub day: Option<SchoolDay>,
    pub absent: Vec<Username>,
    pub allocations: Vec<AllocationRecord>,
    pub escalations: Vec<Escalation>,
    pub failures: Vec<LessonFailure>,
}

impl AllocationReport {
    pub fn is_clean(&self) -> bool {
        self.escalations.is_empty() && self.failures.is_empty()
    }
}

/// Portée d'une annulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevertScope {
    Day(SchoolDay),
    Week,
}

impl RevertScope {
    pub fn days(self) -> Vec<SchoolDay> {
        match self {
            RevertScope::Day(day) => vec![day],
            RevertScope::Week => SchoolDay::ALL.to_vec(),
        }
    }
}

#[derive(Debug, Default)]
pub struct RevertReport {
    /// Créneaux `Subbing` rendus libres.
    pub released: usize,
    /// Créneaux `Subbed` rendus à leur titulaire.
    pub restored: usize,
    pub failures: Vec<LessonFailure>,
}
