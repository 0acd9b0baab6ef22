use crate::engine::AllocationReport;
use crate::model::{AbsenceRecord, Lesson, Role, SchoolDay, Teacher, Username};
use anyhow::{bail, Context};
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::path::Path;

/// Import d'enseignants depuis CSV: header `username,fullname,role,department,current_covers,cover_limit`
pub fn import_teachers_csv<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<Teacher>> {
    let mut rdr = ReaderBuilder::new().has_headers(true).from_path(path)?;
    let mut out = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        let username = field(&rec, 0, "username")?;
        let fullname = field(&rec, 1, "fullname")?;
        if username.is_empty() || fullname.is_empty() {
            bail!("invalid teacher row (empty)");
        }
        let role: Role = field(&rec, 2, "role")?.parse()?;
        let department = rec
            .get(3)
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string);
        let current_covers = optional_number(&rec, 4)
            .with_context(|| format!("invalid current_covers for {username}"))?
            .unwrap_or(0);
        let cover_limit = optional_number(&rec, 5)
            .with_context(|| format!("invalid cover_limit for {username}"))?
            .with_context(|| format!("missing cover_limit for {username}"))?;
        let mut teacher = Teacher::new(username, fullname, role, department, cover_limit)?;
        teacher.current_covers = current_covers;
        out.push(teacher);
    }
    Ok(out)
}

/// Import du modèle hebdomadaire: header `username,day,lesson,subject,class`
pub fn import_lessons_csv<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<Lesson>> {
    let mut rdr = ReaderBuilder::new().has_headers(true).from_path(path)?;
    let mut out = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        let username = Username::new(field(&rec, 0, "username")?);
        let day: SchoolDay = field(&rec, 1, "day")?.parse()?;
        let number: u8 = field(&rec, 2, "lesson")?
            .parse()
            .with_context(|| format!("invalid lesson number for {username}"))?;
        let subject = rec.get(3).unwrap_or("");
        let class_name = rec.get(4).unwrap_or("");
        out.push(Lesson::new(username, day, number, subject, class_name)?);
    }
    Ok(out)
}

/// Import d'absences: header `username,date,reason` (date `YYYY-MM-DD`)
pub fn import_absences_csv<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<AbsenceRecord>> {
    let mut rdr = ReaderBuilder::new().has_headers(true).from_path(path)?;
    let mut out = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        let username = Username::new(field(&rec, 0, "username")?);
        let date = parse_date(field(&rec, 1, "date")?)?;
        let reason = rec.get(2).unwrap_or("").trim().to_string();
        out.push(AbsenceRecord {
            username,
            date,
            reason,
        });
    }
    Ok(out)
}

pub fn parse_date(raw: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .with_context(|| format!("invalid date: {raw}"))
}

/// Export CSV d'une passe: header `kind,day,lesson,absent,substitute,subject,class`
pub fn export_report_csv<P: AsRef<Path>>(path: P, report: &AllocationReport) -> anyhow::Result<()> {
    let mut w = WriterBuilder::new().has_headers(true).from_path(path)?;
    w.write_record(["kind", "day", "lesson", "absent", "substitute", "subject", "class"])?;
    let day = report.day.map(|d| d.to_string()).unwrap_or_default();
    for a in &report.allocations {
        let lesson = a.number.to_string();
        w.write_record([
            "cover",
            day.as_str(),
            lesson.as_str(),
            a.absent.as_str(),
            a.substitute.as_str(),
            a.subject.as_str(),
            a.class_name.as_str(),
        ])?;
    }
    for e in &report.escalations {
        let lesson = e.lesson_number.to_string();
        w.write_record([
            "escalated",
            day.as_str(),
            lesson.as_str(),
            e.username.as_str(),
            "",
            e.subject.as_str(),
            e.class_name.as_str(),
        ])?;
    }
    w.flush()?;
    Ok(())
}

fn field<'a>(rec: &'a StringRecord, idx: usize, name: &str) -> anyhow::Result<&'a str> {
    Ok(rec.get(idx).with_context(|| format!("missing {name}"))?.trim())
}

fn optional_number(rec: &StringRecord, idx: usize) -> anyhow::Result<Option<u32>> {
    match rec.get(idx).map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => Ok(Some(raw.parse()?)),
    }
}
