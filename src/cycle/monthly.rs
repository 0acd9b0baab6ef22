use crate::storage::{read_json, write_json_atomic};
use crate::store::{StoreError, TimetableStore};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
struct ResetState {
    cleared: bool,
    #[serde(default)]
    updated: Option<NaiveDate>,
}

/// Drapeau durable « la remise à zéro du mois a eu lieu ».
#[derive(Debug)]
pub struct ResetFlag {
    path: PathBuf,
    state: ResetState,
}

impl ResetFlag {
    /// Ouvre le drapeau ; un fichier absent ou vide vaut « non fait ».
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = match std::fs::metadata(&path) {
            Ok(meta) if meta.len() > 0 => read_json(&path)?,
            _ => ResetState::default(),
        };
        Ok(Self { path, state })
    }

    pub fn is_set(&self) -> bool {
        self.state.cleared
    }

    pub fn set(&mut self, cleared: bool, on: NaiveDate) -> anyhow::Result<()> {
        let next = ResetState {
            cleared,
            updated: Some(on),
        };
        write_json_atomic(&self.path, &next)?;
        self.state = next;
        Ok(())
    }
}

/// Remet à zéro le compteur de remplacements de chaque enseignant.
pub fn reset_all_covers(store: &mut dyn TimetableStore) -> Result<usize, StoreError> {
    let usernames = store.all_usernames()?;
    for username in &usernames {
        store.reset_current_covers(username)?;
    }
    tracing::info!(teachers = usernames.len(), "current covers reset");
    Ok(usernames.len())
}
