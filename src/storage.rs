use crate::model::{AbsenceRecord, AllocationRecord, Lesson, LessonKey, SchoolDay, Teacher, Timetable, Username};
use crate::store::{StoreError, TimetableStore};
use anyhow::Context;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub trait Storage {
    /// Charge un emploi du temps depuis un support.
    fn load(&self) -> anyhow::Result<Timetable>;
    /// Sauvegarde de manière atomique.
    fn save(&self, timetable: &Timetable) -> anyhow::Result<()>;
}

pub struct JsonStorage {
    path: PathBuf,
}

impl JsonStorage {
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        Ok(Self { path: path.as_ref().to_path_buf() })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Charge le fichier, ou un emploi du temps vide s'il n'existe pas encore.
    pub fn load_or_default(&self) -> anyhow::Result<Timetable> {
        if !self.path.exists() {
            return Ok(Timetable::default());
        }
        self.load()
    }
}

impl Storage for JsonStorage {
    fn load(&self) -> anyhow::Result<Timetable> {
        read_json(&self.path)
    }

    fn save(&self, timetable: &Timetable) -> anyhow::Result<()> {
        write_json_atomic(&self.path, timetable)
    }
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let value = serde_json::from_slice(&data)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(value)
}

pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).with_context(|| "creating temp file")?;
    tmp.write_all(&json)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).with_context(|| "atomic rename")?;
    Ok(())
}

/// Emploi du temps en mémoire, sauvegardé après chaque écriture.
///
/// Si la sauvegarde échoue, la modification en mémoire est annulée : le
/// fichier et la mémoire restent identiques.
pub struct PersistentStore<P: Storage> {
    timetable: Timetable,
    storage: P,
}

impl<P: Storage> PersistentStore<P> {
    pub fn open(storage: P) -> anyhow::Result<Self> {
        let timetable = storage.load()?;
        Ok(Self { timetable, storage })
    }

    pub fn with_timetable(timetable: Timetable, storage: P) -> Self {
        Self { timetable, storage }
    }

    pub fn timetable(&self) -> &Timetable {
        &self.timetable
    }

    pub fn into_inner(self) -> Timetable {
        self.timetable
    }

    fn commit<F>(&mut self, mutate: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Timetable) -> Result<(), StoreError>,
    {
        let before = self.timetable.clone();
        mutate(&mut self.timetable)?;
        if let Err(err) = self.storage.save(&self.timetable) {
            self.timetable = before;
            return Err(StoreError::Persist(format!("{err:#}")));
        }
        Ok(())
    }
}

impl<P: Storage> TimetableStore for PersistentStore<P> {
    fn reload(&mut self) -> Result<(), StoreError> {
        self.timetable = self
            .storage
            .load()
            .map_err(|err| StoreError::Load(format!("{err:#}")))?;
        Ok(())
    }
    fn all_usernames(&self) -> Result<Vec<Username>, StoreError> {
        self.timetable.all_usernames()
    }
    fn teacher(&self, username: &Username) -> Result<Teacher, StoreError> {
        self.timetable.teacher(username)
    }
    fn lessons(&self, username: &Username, day: SchoolDay) -> Result<Vec<Lesson>, StoreError> {
        self.timetable.lessons(username, day)
    }
    fn lesson(&self, key: &LessonKey) -> Result<Lesson, StoreError> {
        self.timetable.lesson(key)
    }
    fn set_lesson(&mut self, lesson: Lesson) -> Result<(), StoreError> {
        self.commit(|t| t.set_lesson(lesson))
    }
    fn is_absent(&self, username: &Username, date: NaiveDate) -> Result<bool, StoreError> {
        self.timetable.is_absent(username, date)
    }
    fn record_absence(&mut self, absence: AbsenceRecord) -> Result<(), StoreError> {
        self.commit(|t| t.record_absence(absence))
    }
    fn increment_current_covers(&mut self, username: &Username) -> Result<(), StoreError> {
        self.commit(|t| t.increment_current_covers(username))
    }
    fn reset_current_covers(&mut self, username: &Username) -> Result<(), StoreError> {
        self.commit(|t| t.reset_current_covers(username))
    }
    fn apply_cover(&mut self, record: &AllocationRecord) -> Result<(), StoreError> {
        self.commit(|t| t.apply_cover(record))
    }
}
