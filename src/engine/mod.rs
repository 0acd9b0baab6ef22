mod allocate;
mod revert;
mod select;
mod types;

pub use types::{AllocationReport, EngineError, LessonFailure, RevertReport, RevertScope};

use crate::events::{RefreshEvent, RefreshHub};
use crate::notification::Notifier;
use crate::store::TimetableStore;
use chrono::NaiveDate;
use rand::rngs::ThreadRng;
use rand::Rng;

/// Moteur de remplacement : allocation du matin, annulation du soir.
///
/// La source d'aléa ne sert qu'à départager les candidats ex aequo ; les tests
/// injectent un générateur à graine fixe.
#[derive(Debug)]
pub struct CoverEngine<R: Rng = ThreadRng> {
    rng: R,
    refresh: RefreshHub,
}

impl CoverEngine<ThreadRng> {
    pub fn new() -> Self {
        Self::with_rng(rand::rng())
    }
}

impl Default for CoverEngine<ThreadRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> CoverEngine<R> {
    pub fn with_rng(rng: R) -> Self {
        Self {
            rng,
            refresh: RefreshHub::new(),
        }
    }

    /// Abonne une vue au signal émis après chaque passe.
    pub fn subscribe<F>(&mut self, handler: F)
    where
        F: Fn(&RefreshEvent) + Send + 'static,
    {
        self.refresh.subscribe(handler);
    }

    pub(crate) fn emit(&self, event: &RefreshEvent) {
        self.refresh.emit(event);
    }

    /// Couvre les cours des absents du jour.
    ///
    /// À lancer une seule fois par jour sur un modèle non modifié : les cours
    /// déjà marqués `Subbed` sont ignorés, mais les créneaux `Subbing` ne sont
    /// plus libres.
    pub fn allocate(
        &mut self,
        store: &mut dyn TimetableStore,
        notifier: &dyn Notifier,
        today: NaiveDate,
    ) -> Result<AllocationReport, EngineError> {
        allocate::allocate(self, store, notifier, today)
    }

    /// Rend au modèle hebdomadaire son état d'avant allocation.
    pub fn revert(
        &mut self,
        store: &mut dyn TimetableStore,
        scope: RevertScope,
    ) -> Result<RevertReport, EngineError> {
        revert::revert(self, store, scope)
    }
}
