mod clock;
mod monthly;

pub use clock::{Clock, ManualClock, SystemClock};
pub use monthly::{reset_all_covers, ResetFlag};

use crate::config::{ConfigError, CycleConfig};
use crate::engine::{
    AllocationReport, CoverEngine, EngineError, RevertReport, RevertScope,
};
use crate::events::RefreshEvent;
use crate::model::SchoolDay;
use crate::notification::Notifier;
use crate::store::{StoreError, TimetableStore};
use chrono::{Datelike, Duration, NaiveDate, NaiveTime};
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CycleError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("refreshing timetable failed: {0}")]
    Store(#[from] StoreError),
}

/// Étape du cycle quotidien.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AllocationWindowOpen,
    Allocated,
    RevertWindowOpen,
    Reverted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Latches {
    pub allocated: bool,
    pub reverted: bool,
}

/// Ce qu'un tick a déclenché.
#[derive(Debug, Default)]
pub struct TickOutcome {
    pub covers_reset: bool,
    /// Échec de la remise à zéro mensuelle ; le reste du tick a quand même eu lieu.
    pub monthly_error: Option<String>,
    pub allocation: Option<AllocationReport>,
    pub revert: Option<RevertReport>,
}

/// Cycle quotidien piloté par une horloge interrogée à intervalle fixe.
///
/// La journée du cycle bascule à `overnight_until` : les heures de la nuit
/// appartiennent encore à la veille, ce qui laisse l'annulation nocturne et
/// l'allocation du lendemain matin sur des verrous distincts.
pub struct DailyCycle<C: Clock> {
    clock: C,
    config: CycleConfig,
    latches: Latches,
    cycle_day: Option<NaiveDate>,
    flag: ResetFlag,
    /// Remise à zéro déjà faite par ce processus, même si le drapeau n'a pas pu être écrit.
    reset_done: Option<NaiveDate>,
}

impl<C: Clock> DailyCycle<C> {
    pub fn new(clock: C, config: CycleConfig, flag: ResetFlag) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            clock,
            config,
            latches: Latches::default(),
            cycle_day: None,
            flag,
            reset_done: None,
        })
    }

    pub fn config(&self) -> &CycleConfig {
        &self.config
    }

    pub fn latches(&self) -> Latches {
        self.latches
    }

    pub fn monthly_flag(&self) -> bool {
        self.flag.is_set()
    }

    pub fn phase(&self) -> Phase {
        let time = self.clock.now().time();
        if self.latches.reverted {
            Phase::Reverted
        } else if self.in_revert_window(time) {
            Phase::RevertWindowOpen
        } else if self.latches.allocated {
            Phase::Allocated
        } else if self.in_allocation_window(time) {
            Phase::AllocationWindowOpen
        } else {
            Phase::Idle
        }
    }

    fn in_allocation_window(&self, time: NaiveTime) -> bool {
        time >= self.config.allocation_start && time < self.config.allocation_end
    }

    fn in_revert_window(&self, time: NaiveTime) -> bool {
        time >= self.config.revert_after || time < self.config.overnight_until
    }

    fn roll_over(&mut self, date: NaiveDate, time: NaiveTime) {
        let cycle_day = if time < self.config.overnight_until {
            date - Duration::days(1)
        } else {
            date
        };
        if self.cycle_day != Some(cycle_day) {
            if self.cycle_day.is_some() {
                tracing::debug!(%cycle_day, "day rollover");
                self.latches = Latches::default();
            }
            self.cycle_day = Some(cycle_day);
        }
    }

    fn monthly_reset<R: Rng>(
        &mut self,
        engine: &CoverEngine<R>,
        store: &mut dyn TimetableStore,
        date: NaiveDate,
    ) -> anyhow::Result<()> {
        if date.day() != 1 {
            self.reset_done = None;
            if self.flag.is_set() {
                self.flag.set(false, date)?;
            }
            return Ok(());
        }
        if self.flag.is_set() {
            return Ok(());
        }
        if self.reset_done != Some(date) {
            reset_all_covers(store)?;
            self.reset_done = Some(date);
            engine.emit(&RefreshEvent::CoversReset { date });
        }
        self.flag.set(true, date)
    }

    /// Un passage de l'horloge : remise à zéro mensuelle, allocation, annulation.
    pub fn tick<R: Rng>(
        &mut self,
        engine: &mut CoverEngine<R>,
        store: &mut dyn TimetableStore,
        notifier: &dyn Notifier,
    ) -> Result<TickOutcome, CycleError> {
        let now = self.clock.now();
        let (date, time) = (now.date(), now.time());
        self.roll_over(date, time);
        store.reload()?;

        let mut outcome = TickOutcome::default();
        let already_reset = self.reset_done == Some(date);
        if let Err(err) = self.monthly_reset(engine, store, date) {
            let message = format!("{err:#}");
            tracing::error!(error = %message, "monthly reset failed");
            outcome.monthly_error = Some(message);
        }
        outcome.covers_reset = !already_reset && self.reset_done == Some(date);

        if self.in_allocation_window(time)
            && !self.latches.allocated
            && SchoolDay::from_date(date).is_some()
        {
            outcome.allocation = Some(engine.allocate(store, notifier, date)?);
            self.latches.allocated = true;
        }

        if self.in_revert_window(time) && !self.latches.reverted {
            outcome.revert = Some(engine.revert(store, RevertScope::Week)?);
            self.latches.reverted = true;
            self.latches.allocated = false;
        }

        Ok(outcome)
    }
}

struct ServiceState<S, N, C: Clock, R: Rng> {
    store: S,
    notifier: N,
    engine: CoverEngine<R>,
    cycle: DailyCycle<C>,
}

/// Point d'entrée unique : tick, allocation, annulation et remise à zéro
/// s'exécutent sous le même verrou, jamais en parallèle.
pub struct CoverService<S, N, C: Clock, R: Rng> {
    state: Mutex<ServiceState<S, N, C, R>>,
}

impl<S, N, C, R> CoverService<S, N, C, R>
where
    S: TimetableStore,
    N: Notifier,
    C: Clock,
    R: Rng,
{
    pub fn new(store: S, notifier: N, engine: CoverEngine<R>, cycle: DailyCycle<C>) -> Self {
        Self {
            state: Mutex::new(ServiceState {
                store,
                notifier,
                engine,
                cycle,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ServiceState<S, N, C, R>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn tick(&self) -> Result<TickOutcome, CycleError> {
        let mut guard = self.lock();
        let ServiceState {
            store,
            notifier,
            engine,
            cycle,
        } = &mut *guard;
        cycle.tick(engine, store, &*notifier)
    }

    pub fn allocate_now(&self, date: NaiveDate) -> Result<AllocationReport, EngineError> {
        let mut guard = self.lock();
        let ServiceState {
            store,
            notifier,
            engine,
            ..
        } = &mut *guard;
        store.reload()?;
        engine.allocate(store, &*notifier, date)
    }

    pub fn revert_now(&self, scope: RevertScope) -> Result<RevertReport, EngineError> {
        let mut guard = self.lock();
        let ServiceState { store, engine, .. } = &mut *guard;
        store.reload()?;
        engine.revert(store, scope)
    }

    pub fn reset_covers_now(&self) -> Result<usize, StoreError> {
        let mut guard = self.lock();
        guard.store.reload()?;
        reset_all_covers(&mut guard.store)
    }

    /// Lecture cohérente du magasin (vue, rapport) hors de toute passe.
    pub fn with_store<T>(&self, read: impl FnOnce(&S) -> T) -> T {
        read(&self.lock().store)
    }

    pub fn phase(&self) -> Phase {
        self.lock().cycle.phase()
    }

    /// Boucle de scrutation jusqu'à ce que `stop` passe à vrai.
    pub fn run(&self, stop: &AtomicBool) {
        let interval = self.lock().cycle.config().poll_interval();
        tracing::info!(interval_secs = interval.as_secs(), "cover scheduler started");
        while !stop.load(Ordering::Relaxed) {
            match self.tick() {
                Ok(outcome) => {
                    if let Some(report) = &outcome.allocation {
                        for failure in &report.failures {
                            tracing::error!(%failure, "lesson not covered");
                        }
                    }
                }
                Err(error) => tracing::error!(%error, "scheduler tick failed"),
            }
            std::thread::sleep(interval);
        }
        tracing::info!("cover scheduler stopped");
    }
}
