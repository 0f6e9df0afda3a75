use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use lasertutor::auth::Session;
use lasertutor::catalog::Lesson;
use lasertutor::error::{AppError, AppResult};
use lasertutor::notify::{Level, Notification, Notifier, TracingNotifier};
use lasertutor::progress::QuizOutcome;
use lasertutor::quiz::{QuizResult, QuizSession, QuizStep};
use lasertutor::scoring::Component;
use lasertutor::simulation::SimulationPatch;
use lasertutor::store::{Action, ProfilePatch, User};
use lasertutor::{App, Config};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(about = "Work through the laser physics lessons from the terminal", long_about = None)]
pub struct Cli {
    /// Keep progress in memory instead of the hosted database
    #[arg(long, global = true)]
    pub offline: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the lessons in the catalog
    Lessons,

    /// Show one lesson
    Show { lesson_id: String },

    /// Take a lesson's quiz
    Quiz { lesson_id: String },

    /// Show stored progress, for one lesson or all of them
    Progress { lesson_id: Option<String> },

    /// Mark a lesson component (reading, simulation, exercises) as done
    Component {
        lesson_id: String,
        component: Component,
    },

    /// Mark a lesson completed with a score
    Complete {
        lesson_id: String,
        #[arg(long, default_value_t = 100)]
        score: u32,
    },

    /// Show the leaderboard
    Leaderboard {
        #[arg(long, default_value = "global")]
        category: String,
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },

    /// Show recent points awards
    History {
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },

    /// Sign in with an access token from the hosted auth provider
    Login {
        #[arg(long)]
        token: String,
    },

    /// Forget the signed-in learner
    Logout,

    /// Edit the signed-in learner's profile; an empty value clears a field
    Profile {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        bio: Option<String>,
        #[arg(long)]
        website: Option<String>,
        #[arg(long)]
        avatar_url: Option<String>,
    },

    /// Adjust the laser simulation and describe the beam
    Simulate {
        #[arg(long)]
        wavelength: Option<f64>,
        #[arg(long)]
        pump_power: Option<f64>,
        #[arg(long)]
        cavity_length: Option<f64>,
        #[arg(long)]
        gain_medium: Option<String>,
        #[arg(long)]
        reflectivity: Option<f64>,
        #[arg(long)]
        temperature: Option<f64>,
    },

    /// Apply the database migrations
    Migrate {
        #[arg(long, default_value = "migrations")]
        dir: PathBuf,
    },
}

/// Prints notifications the way a toast would show them, and logs them.
struct ConsoleNotifier {
    log: TracingNotifier,
}

impl Notifier for ConsoleNotifier {
    fn notify(&self, notification: Notification) {
        match notification.level {
            Level::Success => println!("{notification}"),
            Level::Error => eprintln!("{notification}"),
        }
        self.log.notify(notification);
    }
}

#[tokio::main]
async fn main() {
    lasertutor::setup_trace();
    let args = Cli::parse();

    lasertutor::error::run_with_error_handler(async || run(&args).await).await
}

async fn run(args: &Cli) -> AppResult<()> {
    let config = Config::get_or_init(cfg!(debug_assertions), args.offline).await;

    if let Commands::Migrate { dir } = &args.command {
        lasertutor::migrate(config, dir).await?;
        println!("Migrations applied from {}", dir.display());
        return Ok(());
    }

    let app = lasertutor::build_app(config, Arc::new(ConsoleNotifier { log: TracingNotifier })).await?;
    if args.offline {
        offline_session(&app)?;
    }

    match &args.command {
        Commands::Lessons => {
            let completed = completed_lessons(&app);
            for lesson in app.catalog().lessons() {
                let mark = if completed.iter().any(|id| id == lesson.id()) {
                    "✓"
                } else if app.catalog().is_unlocked(lesson.id(), &completed) {
                    " "
                } else {
                    "🔒"
                };
                println!(
                    "[{mark}] {:<28} {} ({:?}, {} min, {} pts)",
                    lesson.id(),
                    lesson.title(),
                    lesson.difficulty(),
                    lesson.duration(),
                    lesson.points()
                );
            }
        }

        Commands::Show { lesson_id } => {
            let lesson = find_lesson(&app, lesson_id)?;
            println!("{}\n\n{}\n", lesson.title(), lesson.description());
            if !lesson.prerequisites().is_empty() {
                println!("Requires: {}", lesson.prerequisites().join(", "));
            }
            for section in lesson.sections() {
                println!("## {}\n{}\n", section.title, section.content);
            }
            if let Some(quiz) = lesson.quiz() {
                println!("Quiz: {} questions", quiz.questions.len());
            }
        }

        Commands::Quiz { lesson_id } => take_quiz(&app, lesson_id).await?,

        Commands::Progress { lesson_id: Some(lesson_id) } => {
            let mut hook = app.lesson_progress(lesson_id);
            match hook.load().await? {
                Some(progress) => println!("{progress:#?}"),
                None => println!("No progress yet."),
            }
        }

        Commands::Progress { lesson_id: None } => {
            for progress in app.repo().list().await? {
                println!(
                    "{:<28} completed: {:<5} score: {:>3} components: {}",
                    progress.lesson_id(),
                    progress.completed(),
                    progress.score(),
                    progress.components().completed_count()
                );
            }
        }

        Commands::Component { lesson_id, component } => {
            let mut hook = app.lesson_progress(lesson_id);
            let progress = hook.mark_component_complete(*component).await?;
            println!(
                "{} of {} components done",
                progress.components().completed_count(),
                Component::ALL.len()
            );
        }

        Commands::Complete { lesson_id, score } => {
            app.repo().mark_complete(lesson_id, *score).await?;
            app.store().dispatch(Action::CompleteLesson(lesson_id.clone()))?;
        }

        Commands::Leaderboard { category, limit } => {
            for entry in app.repo().leaderboard(category, *limit).await? {
                println!("#{:<4} {:<24} {:>6}", entry.rank, entry.username, entry.score);
            }
        }

        Commands::History { limit } => {
            for entry in app.repo().points_history(*limit).await? {
                println!(
                    "{} {:>+5} {} {}",
                    entry.created_at.format("%Y-%m-%d %H:%M"),
                    entry.points,
                    entry.reason,
                    entry.unit_id.unwrap_or_default()
                );
            }
        }

        Commands::Login { token } => {
            let user = app.login(token)?;
            println!("Signed in as {} (level {}, {} points)", user.username, user.level, user.points);
        }

        Commands::Logout => {
            app.logout()?;
            println!("Signed out.");
        }

        Commands::Profile {
            username,
            bio,
            website,
            avatar_url,
        } => {
            app.store().dispatch(Action::UpdateProfile(ProfilePatch {
                username: username.clone(),
                bio: bio.clone(),
                website: website.clone(),
                avatar_url: avatar_url.clone(),
            }))?;
            match app.store().user() {
                Some(user) => println!(
                    "{} ({})\nbio: {}\nwebsite: {}\navatar: {}",
                    user.username,
                    user.email,
                    user.bio.as_deref().unwrap_or("-"),
                    user.website.as_deref().unwrap_or("-"),
                    user.avatar_url.as_deref().unwrap_or("-")
                ),
                None => println!("Sign in first."),
            }
        }

        Commands::Simulate {
            wavelength,
            pump_power,
            cavity_length,
            gain_medium,
            reflectivity,
            temperature,
        } => {
            app.store().dispatch(Action::UpdateSimulation(SimulationPatch {
                wavelength: *wavelength,
                pump_power: *pump_power,
                cavity_length: *cavity_length,
                gain_medium: gain_medium.clone(),
                reflectivity: *reflectivity,
                temperature: *temperature,
            }))?;
            let (params, look) = app.store().read(|s| (s.simulation().clone(), s.simulation().appearance()));
            println!("{params:#?}");
            println!(
                "beam: {:?} (#{:06x}), opacity {:.2}, beam scale {:.2}, cavity scale {:.2}",
                look.color,
                look.color.rgb(),
                look.opacity,
                look.beam_scale,
                look.cavity_scale
            );
        }

        Commands::Migrate { .. } => {}
    }

    Ok(())
}

/// Signs in a local learner; the id is reused across offline runs.
fn offline_session(app: &App) -> AppResult<()> {
    let user_id = app.store().user().map(|u| u.id).unwrap_or_else(uuid::Uuid::new_v4);
    let session = Session::new(user_id, "offline", Utc::now() + Duration::days(1)).with_username("offline learner");

    app.repo().set_session(Some(session.clone()));
    if app.store().user().is_none() {
        app.store().dispatch(Action::SetUser(Some(User::from_session(&session))))?;
    }
    Ok(())
}

fn completed_lessons(app: &App) -> Vec<String> {
    app.store()
        .user()
        .map(|u| u.completed_lessons().to_vec())
        .unwrap_or_default()
}

fn find_lesson<'a>(app: &'a App, lesson_id: &str) -> AppResult<&'a Lesson> {
    app.catalog()
        .lesson(lesson_id)
        .ok_or_else(|| AppError::Usage(format!("no lesson `{lesson_id}` in the catalog")))
}

async fn take_quiz(app: &App, lesson_id: &str) -> AppResult<()> {
    let lesson = find_lesson(app, lesson_id)?;
    let questions = lesson
        .quiz()
        .map(|q| q.questions.clone())
        .ok_or_else(|| AppError::Usage(format!("lesson `{lesson_id}` has no quiz")))?;

    let mut hook = app.lesson_progress(lesson_id);
    if !hook.validate_prerequisites().await? {
        println!("Finish these lessons first: {}", lesson.prerequisites().join(", "));
        return Ok(());
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<QuizResult>();
    let mut session = QuizSession::new(lesson_id, questions, move |result: &QuizResult| {
        let _ = tx.send(result.clone());
    })?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some((index, question)) = session.current().map(|(i, q)| (i, q.clone())) {
        println!("\nQuestion {} of {}: {}", index + 1, session.len(), question.text);
        for (n, option) in question.options.iter().enumerate() {
            println!("  {}) {option}", n + 1);
        }

        loop {
            let Some(line) = lines.next_line().await? else {
                println!("Quiz abandoned.");
                return Ok(());
            };
            let choice = line.trim().parse::<usize>().ok().and_then(|n| n.checked_sub(1));
            match choice.map(|c| session.select(c)) {
                Some(Ok(())) => break,
                Some(Err(e)) => println!("{e}"),
                None => println!("Enter a number between 1 and {}", question.options.len()),
            }
        }

        let feedback = session.submit_answer()?;
        if feedback.correct {
            println!("Correct! {}", feedback.explanation);
        } else {
            println!(
                "Not quite. The answer is {}. {}",
                question.options[feedback.correct_answer], feedback.explanation
            );
        }

        if let QuizStep::Completed(_) = session.next()? {
            break;
        }
    }

    let Some(result) = rx.recv().await else {
        return Ok(());
    };
    println!("\nYou scored {}/{}.", result.correct_answers, result.total_questions);

    match hook.complete_quiz(result).await? {
        QuizOutcome::Recorded(completion) => {
            println!("Lesson score: {}", completion.lesson_score);
            if let Some(unit) = completion.unit {
                println!("Total points: {}", unit.total_points);
            }
        }
        QuizOutcome::AlreadyRecorded(_) => println!("This attempt was already recorded."),
    }
    Ok(())
}
