use chrono::NaiveDate;

/// Signal émis après chaque passe, pour que les vues se rafraîchissent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshEvent {
    Allocated {
        date: NaiveDate,
        allocations: usize,
        escalations: usize,
        failures: usize,
    },
    Reverted {
        released: usize,
        restored: usize,
        failures: usize,
    },
    CoversReset {
        date: NaiveDate,
    },
}

type RefreshHandler = Box<dyn Fn(&RefreshEvent) + Send>;

/// Abonnés au signal de rafraîchissement.
#[derive(Default)]
pub struct RefreshHub {
    handlers: Vec<RefreshHandler>,
}

impl RefreshHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, handler: F)
    where
        F: Fn(&RefreshEvent) + Send + 'static,
    {
        self.handlers.push(Box::new(handler));
    }

    pub fn emit(&self, event: &RefreshEvent) {
        tracing::debug!(?event, subscribers = self.handlers.len(), "refresh");
        for handler in &self.handlers {
            handler(event);
        }
    }
}

impl std::fmt::Debug for RefreshHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshHub")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
