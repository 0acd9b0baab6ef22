#![forbid(unsafe_code)]
use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::sync::atomic::AtomicBool;
use suppleance::{
    cycle::{reset_all_covers, CoverService, DailyCycle, ResetFlag, SystemClock},
    engine::{AllocationReport, CoverEngine, RevertScope},
    io,
    model::{AbsenceRecord, SchoolDay, SubstituteState, Timetable, Username},
    notification::{LogNotifier, Notifier, OutboxNotifier},
    storage::{JsonStorage, PersistentStore, Storage},
    store::TimetableStore,
    DaemonConfig,
};
#[cfg(feature = "logging")]
use tracing_subscriber::{fmt::Subscriber, EnvFilter};

/// CLI de répartition des remplacements (sans base de données)
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Active les logs (feature `logging`)
    #[arg(long, global = true)]
    log: bool,

    /// Fichier JSON de l'emploi du temps
    #[arg(long, global = true, default_value = "timetable.json")]
    timetable: String,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Importer des enseignants depuis un CSV (créneaux libres par défaut)
    ImportTeachers {
        #[arg(long)]
        csv: String,
    },

    /// Importer le modèle hebdomadaire depuis un CSV
    ImportLessons {
        #[arg(long)]
        csv: String,
    },

    /// Importer des absences depuis un CSV
    ImportAbsences {
        #[arg(long)]
        csv: String,
    },

    /// Déclarer une absence
    Absent {
        #[arg(long)]
        username: String,
        /// YYYY-MM-DD
        #[arg(long)]
        date: String,
        #[arg(long, default_value = "")]
        reason: String,
    },

    /// Répartir les remplacements du jour
    Allocate {
        /// YYYY-MM-DD (défaut : aujourd'hui)
        #[arg(long)]
        date: Option<String>,
        /// Répertoire des escalades (défaut : journal seul)
        #[arg(long)]
        outbox: Option<String>,
        /// Export CSV de la passe (optionnel)
        #[arg(long)]
        report: Option<String>,
    },

    /// Restaurer le modèle hebdomadaire
    Revert {
        /// Jour à restaurer (défaut : toute la semaine)
        #[arg(long)]
        day: Option<String>,
    },

    /// Remettre à zéro les compteurs de remplacements
    ResetCovers,

    /// Afficher l'emploi du temps d'un jour
    List {
        /// Jour (défaut : aujourd'hui, lundi le week-end)
        #[arg(long)]
        day: Option<String>,
    },

    /// Afficher les enseignants et leur charge
    Teachers,

    /// Lancer le cycle quotidien
    Run {
        /// Fichier TOML de configuration
        #[arg(long)]
        config: Option<String>,
        /// Un seul passage de l'horloge
        #[arg(long)]
        once: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    #[cfg(feature = "logging")]
    if cli.log {
        let _ = Subscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .try_init();
    }

    let storage = JsonStorage::open(&cli.timetable)?;

    let code = match cli.cmd {
        Commands::ImportTeachers { csv } => {
            let mut timetable = storage.load_or_default()?;
            let teachers = io::import_teachers_csv(csv)?;
            let count = teachers.len();
            for teacher in teachers {
                let username = teacher.username.clone();
                timetable.add_teacher(teacher)?;
                timetable.fill_free_slots(&username);
            }
            storage.save(&timetable)?;
            println!("{count} teacher(s) imported");
            0
        }
        Commands::ImportLessons { csv } => {
            let mut timetable = storage.load_or_default()?;
            let lessons = io::import_lessons_csv(csv)?;
            let count = lessons.len();
            for lesson in lessons {
                timetable.upsert_lesson(lesson)?;
            }
            storage.save(&timetable)?;
            println!("{count} lesson(s) imported");
            0
        }
        Commands::ImportAbsences { csv } => {
            let mut timetable = storage.load_or_default()?;
            let absences = io::import_absences_csv(csv)?;
            let count = absences.len();
            for absence in absences {
                timetable.record_absence(absence)?;
            }
            storage.save(&timetable)?;
            println!("{count} absence(s) imported");
            0
        }
        Commands::Absent {
            username,
            date,
            reason,
        } => {
            let mut store = open_store(storage)?;
            let date = io::parse_date(&date)?;
            store.record_absence(AbsenceRecord {
                username: Username::new(&username),
                date,
                reason,
            })?;
            println!("{username} absent on {date}");
            0
        }
        Commands::Allocate {
            date,
            outbox,
            report,
        } => {
            let today = match date {
                Some(raw) => io::parse_date(&raw)?,
                None => Local::now().date_naive(),
            };
            let mut store = open_store(storage)?;
            let notifier = notifier_for(outbox.as_deref());
            let mut engine = CoverEngine::new();
            let result = engine.allocate(&mut store, &*notifier, today)?;
            print_allocation(store.timetable(), &result);
            if let Some(path) = report {
                io::export_report_csv(path, &result)?;
            }
            // Code 2 = WARNING/INCOMPLETE
            if result.is_clean() {
                0
            } else {
                2
            }
        }
        Commands::Revert { day } => {
            let scope = match day {
                Some(raw) => RevertScope::Day(raw.parse()?),
                None => RevertScope::Week,
            };
            let mut store = open_store(storage)?;
            let result = CoverEngine::new().revert(&mut store, scope)?;
            println!(
                "released {} slot(s), restored {} lesson(s)",
                result.released, result.restored
            );
            for failure in &result.failures {
                eprintln!("failed: {failure}");
            }
            if result.failures.is_empty() {
                0
            } else {
                2
            }
        }
        Commands::ResetCovers => {
            let mut store = open_store(storage)?;
            let count = reset_all_covers(&mut store)?;
            println!("{count} counter(s) reset");
            0
        }
        Commands::List { day } => {
            let timetable = storage.load_or_default()?;
            let day: SchoolDay = match day {
                Some(raw) => raw.parse()?,
                None => SchoolDay::from_date(Local::now().date_naive()).unwrap_or(SchoolDay::Monday),
            };
            print_day(&timetable, day)?;
            0
        }
        Commands::Teachers => {
            let timetable = storage.load_or_default()?;
            for t in &timetable.teachers {
                let load = t
                    .load_pct()
                    .map(|p| format!("{p:.0}%"))
                    .unwrap_or_else(|| "-".into());
                println!(
                    "{} | {} | {} | {}/{} ({})",
                    t.username,
                    t.fullname,
                    t.department.as_deref().unwrap_or("-"),
                    t.current_covers,
                    t.cover_limit,
                    load
                );
            }
            0
        }
        Commands::Run { config, once } => {
            let config = match config {
                Some(path) => DaemonConfig::load(path)?,
                None => DaemonConfig::default(),
            };
            let flag = ResetFlag::open(&config.state_file)?;
            let cycle = DailyCycle::new(SystemClock, config.cycle, flag)?;
            // le démon relit le fichier à chaque tick : il doit exister
            if !storage.path().exists() {
                storage.save(&Timetable::default())?;
            }
            let store = open_store(storage)?;
            let notifier = notifier_for(config.outbox_dir.as_ref().and_then(|p| p.to_str()));
            let service = CoverService::new(store, notifier, CoverEngine::new(), cycle);
            if once {
                let outcome = service.tick()?;
                if let Some(err) = &outcome.monthly_error {
                    eprintln!("monthly reset failed: {err}");
                }
                if let Some(report) = &outcome.allocation {
                    service.with_store(|s| print_allocation(s.timetable(), report));
                }
                if let Some(report) = &outcome.revert {
                    println!(
                        "released {} slot(s), restored {} lesson(s)",
                        report.released, report.restored
                    );
                }
                println!("phase: {:?}", service.phase());
            } else {
                service.run(&AtomicBool::new(false));
            }
            0
        }
    };

    std::process::exit(code);
}

fn open_store(storage: JsonStorage) -> Result<PersistentStore<JsonStorage>> {
    let timetable = storage
        .load_or_default()
        .with_context(|| format!("loading {}", storage.path().display()))?;
    Ok(PersistentStore::with_timetable(timetable, storage))
}

fn notifier_for(outbox: Option<&str>) -> Box<dyn Notifier> {
    match outbox {
        Some(dir) => Box::new(OutboxNotifier::new(dir)),
        None => Box::new(LogNotifier),
    }
}

fn fullname(timetable: &Timetable, username: &Username) -> String {
    timetable
        .find_teacher(username)
        .map(|t| t.fullname.clone())
        .unwrap_or_else(|| username.to_string())
}

fn print_allocation(timetable: &Timetable, report: &AllocationReport) {
    let date = report
        .date
        .map(|d: NaiveDate| d.to_string())
        .unwrap_or_default();
    if report.day.is_none() {
        println!("{date}: no school day, nothing to allocate");
        return;
    }
    for a in &report.allocations {
        println!(
            "L{} {} {} | {} → {}",
            a.number,
            a.subject,
            a.class_name,
            fullname(timetable, &a.absent),
            fullname(timetable, &a.substitute)
        );
    }
    for e in &report.escalations {
        println!(
            "L{} {} {} | {} → NO COVER",
            e.lesson_number, e.subject, e.class_name, e.teacher_name
        );
    }
    for f in &report.failures {
        eprintln!("failed: {f}");
    }
    println!(
        "{date}: {} covered, {} escalated, {} failed",
        report.allocations.len(),
        report.escalations.len(),
        report.failures.len()
    );
}

fn print_day(timetable: &Timetable, day: SchoolDay) -> Result<()> {
    println!("{day}");
    for t in &timetable.teachers {
        let lessons = timetable.lessons(&t.username, day)?;
        let cells: Vec<String> = lessons
            .iter()
            .map(|l| {
                let marker = match &l.state {
                    SubstituteState::None | SubstituteState::Free => String::new(),
                    SubstituteState::Subbing(absent) => {
                        format!(" (subbing {})", fullname(timetable, absent))
                    }
                    SubstituteState::Subbed(by) => format!(" (subbed by {})", fullname(timetable, by)),
                };
                format!("L{} {} {}{}", l.number, l.subject, l.class_name, marker)
                    .trim_end()
                    .to_string()
            })
            .collect();
        println!("{} | {}", t.username, cells.join(" | "));
    }
    Ok(())
}
