use crate::config::ConfigError;
use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifiant fort d'un enseignant (son login).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Username(String);

impl Username {
    pub fn new<S: AsRef<str>>(s: S) -> Self {
        Self(s.as_ref().to_owned())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Slt,
    Teacher,
    Admin,
}

impl FromStr for Role {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "slt" => Ok(Role::Slt),
            "teacher" | "normal" | "normalteacher" => Ok(Role::Teacher),
            "admin" => Ok(Role::Admin),
            other => Err(ConfigError::UnknownRole(other.to_string())),
        }
    }
}

/// Enseignant et compteur d'équité des remplacements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Teacher {
    pub username: Username,
    pub fullname: String,
    pub role: Role,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub current_covers: u32,
    pub cover_limit: u32,
}

impl Teacher {
    /// Crée un enseignant en refusant un plafond de remplacements nul.
    pub fn new<U: AsRef<str>, F: Into<String>>(
        username: U,
        fullname: F,
        role: Role,
        department: Option<String>,
        cover_limit: u32,
    ) -> Result<Self, ConfigError> {
        let username = Username::new(username);
        if cover_limit == 0 {
            return Err(ConfigError::ZeroCoverLimit(username.to_string()));
        }
        Ok(Self {
            username,
            fullname: fullname.into(),
            role,
            department,
            current_covers: 0,
            cover_limit,
        })
    }

    /// Charge en pourcentage du plafond ; `None` si le plafond vaut 0.
    pub fn load_pct(&self) -> Option<f64> {
        load_pct(self.current_covers, self.cover_limit)
    }
}

pub fn load_pct(current_covers: u32, cover_limit: u32) -> Option<f64> {
    if cover_limit == 0 {
        return None;
    }
    Some(f64::from(current_covers) / f64::from(cover_limit) * 100.0)
}

/// Jour ouvré du modèle hebdomadaire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchoolDay {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
}

impl SchoolDay {
    pub const ALL: [SchoolDay; 5] = [
        SchoolDay::Monday,
        SchoolDay::Tuesday,
        SchoolDay::Wednesday,
        SchoolDay::Thursday,
        SchoolDay::Friday,
    ];

    /// Nombre de cours dans la journée (le vendredi est raccourci).
    pub fn lesson_count(self) -> u8 {
        match self {
            SchoolDay::Friday => 5,
            _ => 7,
        }
    }

    pub fn has_lesson(self, number: u8) -> bool {
        (1..=self.lesson_count()).contains(&number)
    }

    /// `None` pour le week-end.
    pub fn from_date(date: NaiveDate) -> Option<Self> {
        Self::from_weekday(date.weekday())
    }

    pub fn from_weekday(weekday: Weekday) -> Option<Self> {
        match weekday {
            Weekday::Mon => Some(SchoolDay::Monday),
            Weekday::Tue => Some(SchoolDay::Tuesday),
            Weekday::Wed => Some(SchoolDay::Wednesday),
            Weekday::Thu => Some(SchoolDay::Thursday),
            Weekday::Fri => Some(SchoolDay::Friday),
            Weekday::Sat | Weekday::Sun => None,
        }
    }
}

impl fmt::Display for SchoolDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchoolDay::Monday => "Monday",
            SchoolDay::Tuesday => "Tuesday",
            SchoolDay::Wednesday => "Wednesday",
            SchoolDay::Thursday => "Thursday",
            SchoolDay::Friday => "Friday",
        };
        f.write_str(name)
    }
}

impl FromStr for SchoolDay {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let weekday: Weekday = s
            .trim()
            .parse()
            .map_err(|_| ConfigError::UnknownDay(s.to_string()))?;
        Self::from_weekday(weekday).ok_or_else(|| ConfigError::UnknownDay(s.to_string()))
    }
}

/// État de remplacement d'un créneau, jamais déduit du texte saisi.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "teacher", rename_all = "snake_case")]
pub enum SubstituteState {
    None,
    Free,
    /// Créneau libre occupé aujourd'hui pour couvrir ce collègue.
    Subbing(Username),
    /// Titulaire absent, couvert par ce collègue.
    Subbed(Username),
}

pub const FREE_SUBJECT: &str = "Free";
pub const EMPTY_SUBJECT: &str = "Empty";

/// Clé d'un créneau du modèle hebdomadaire.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LessonKey {
    pub username: Username,
    pub day: SchoolDay,
    pub number: u8,
}

impl fmt::Display for LessonKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/L{}", self.username, self.day, self.number)
    }
}

/// Cours du modèle hebdomadaire (une ligne par enseignant, jour et numéro).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    pub username: Username,
    pub day: SchoolDay,
    pub number: u8,
    pub subject: String,
    #[serde(default)]
    pub class_name: String,
    pub state: SubstituteState,
}

impl Lesson {
    /// Cours ordinaire ; un sujet vide, `Empty` ou `Free` donne un créneau libre.
    pub fn new<S: Into<String>, C: Into<String>>(
        username: Username,
        day: SchoolDay,
        number: u8,
        subject: S,
        class_name: C,
    ) -> Result<Self, ConfigError> {
        if !day.has_lesson(number) {
            return Err(ConfigError::LessonOutOfRange { day, number });
        }
        let subject = subject.into();
        let trimmed = subject.trim();
        if trimmed.is_empty() || trimmed == EMPTY_SUBJECT || trimmed == FREE_SUBJECT {
            return Ok(Self::free(username, day, number));
        }
        Ok(Self {
            username,
            day,
            number,
            subject: trimmed.to_string(),
            class_name: class_name.into().trim().to_string(),
            state: SubstituteState::None,
        })
    }

    pub fn free(username: Username, day: SchoolDay, number: u8) -> Self {
        Self {
            username,
            day,
            number,
            subject: FREE_SUBJECT.to_string(),
            class_name: String::new(),
            state: SubstituteState::Free,
        }
    }

    pub fn key(&self) -> LessonKey {
        LessonKey {
            username: self.username.clone(),
            day: self.day,
            number: self.number,
        }
    }

    pub fn is_free(&self) -> bool {
        self.state == SubstituteState::Free
    }

    /// Un cours réel, non encore traité, dont le titulaire doit être remplacé.
    pub fn needs_cover(&self) -> bool {
        self.subject != FREE_SUBJECT
            && self.subject != EMPTY_SUBJECT
            && !self.class_name.trim().is_empty()
            && self.state == SubstituteState::None
    }
}

/// Absence déclarée pour une date (historique permanent).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbsenceRecord {
    pub username: Username,
    pub date: NaiveDate,
    #[serde(default)]
    pub reason: String,
}

/// Remplacement décidé lors d'une passe d'allocation (non persisté).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationRecord {
    pub absent: Username,
    pub substitute: Username,
    pub day: SchoolDay,
    pub number: u8,
    pub subject: String,
    pub class_name: String,
}

impl AllocationRecord {
    pub fn absent_key(&self) -> LessonKey {
        LessonKey {
            username: self.absent.clone(),
            day: self.day,
            number: self.number,
        }
    }

    pub fn substitute_key(&self) -> LessonKey {
        LessonKey {
            username: self.substitute.clone(),
            day: self.day,
            number: self.number,
        }
    }
}

/// Emploi du temps complet : enseignants, modèle hebdomadaire, absences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Timetable {
    pub teachers: Vec<Teacher>,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
    #[serde(default)]
    pub absences: Vec<AbsenceRecord>,
}

impl Timetable {
    pub fn find_teacher<'a>(&'a self, username: &Username) -> Option<&'a Teacher> {
        self.teachers.iter().find(|t| &t.username == username)
    }
    pub fn find_teacher_mut(&mut self, username: &Username) -> Option<&mut Teacher> {
        self.teachers.iter_mut().find(|t| &t.username == username)
    }
    pub fn find_lesson<'a>(&'a self, key: &LessonKey) -> Option<&'a Lesson> {
        self.lessons
            .iter()
            .find(|l| l.username == key.username && l.day == key.day && l.number == key.number)
    }
    pub fn find_lesson_mut(&mut self, key: &LessonKey) -> Option<&mut Lesson> {
        self.lessons
            .iter_mut()
            .find(|l| l.username == key.username && l.day == key.day && l.number == key.number)
    }

    /// Ajoute un enseignant ; un login déjà pris est refusé.
    pub fn add_teacher(&mut self, teacher: Teacher) -> Result<(), ConfigError> {
        if teacher.cover_limit == 0 {
            return Err(ConfigError::ZeroCoverLimit(teacher.username.to_string()));
        }
        if self.find_teacher(&teacher.username).is_some() {
            return Err(ConfigError::DuplicateTeacher(teacher.username.to_string()));
        }
        self.teachers.push(teacher);
        Ok(())
    }

    /// Insère ou remplace une ligne du modèle hebdomadaire.
    pub fn upsert_lesson(&mut self, lesson: Lesson) -> Result<(), ConfigError> {
        if self.find_teacher(&lesson.username).is_none() {
            return Err(ConfigError::UnknownTeacher(lesson.username.to_string()));
        }
        if !lesson.day.has_lesson(lesson.number) {
            return Err(ConfigError::LessonOutOfRange {
                day: lesson.day,
                number: lesson.number,
            });
        }
        match self.find_lesson_mut(&lesson.key()) {
            Some(existing) => *existing = lesson,
            None => self.lessons.push(lesson),
        }
        Ok(())
    }

    /// Complète le modèle d'un enseignant avec des créneaux libres.
    pub fn fill_free_slots(&mut self, username: &Username) {
        for day in SchoolDay::ALL {
            for number in 1..=day.lesson_count() {
                let key = LessonKey {
                    username: username.clone(),
                    day,
                    number,
                };
                if self.find_lesson(&key).is_none() {
                    self.lessons.push(Lesson::free(username.clone(), day, number));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_and_empty_subjects_become_free() {
        let user = Username::new("a");
        for subject in ["", "  ", "Empty", "Free"] {
            let lesson = Lesson::new(user.clone(), SchoolDay::Monday, 2, subject, " ").unwrap();
            assert_eq!(lesson, Lesson::free(user.clone(), SchoolDay::Monday, 2));
        }
    }

    #[test]
    fn friday_has_five_lessons() {
        let user = Username::new("a");
        assert!(Lesson::new(user.clone(), SchoolDay::Friday, 5, "Maths", "11J").is_ok());
        assert!(Lesson::new(user, SchoolDay::Friday, 6, "Maths", "11J").is_err());
    }

    #[test]
    fn day_parsing_rejects_weekend() {
        assert_eq!("Monday".parse::<SchoolDay>().unwrap(), SchoolDay::Monday);
        assert_eq!("fri".parse::<SchoolDay>().unwrap(), SchoolDay::Friday);
        assert!("Saturday".parse::<SchoolDay>().is_err());
    }

    #[test]
    fn zero_cover_limit_rejected() {
        assert!(Teacher::new("a", "A", Role::Teacher, None, 0).is_err());
        let t = Teacher::new("a", "A", Role::Teacher, None, 10).unwrap();
        assert_eq!(t.load_pct(), Some(0.0));
    }
}
