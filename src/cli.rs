use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tokio::time::{Duration, MissedTickBehavior};

use crate::aggregate::format_hms;
use crate::commands::{Controller, Dashboard};
use crate::config::AppConfig;
use crate::engine::TimerStateForAPI;
use crate::logging::enable_logging;
use crate::models::{CalendarCell, SettingsPatch};

#[derive(Parser, Debug)]
#[command(name = "hygge-study", version, long_about = None)]
#[command(about = "Track study sessions and keep the log in a remote document")]
struct Args {
    #[command(subcommand)]
    command: Commands,
    #[arg(long, help = "Data directory for the local cache")]
    data_dir: Option<PathBuf>,
    #[arg(long, help = "Base URL of the document store API")]
    api_url: Option<String>,
    #[arg(long, short, help = "Debug logging")]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Cache a credential and connect to (or create) the remote document")]
    Login {
        #[arg(long, help = "Bearer credential for the document store")]
        token: String,
        #[arg(long, help = "Existing document id. A new document is created when omitted")]
        document: Option<String>,
    },
    #[command(about = "Forget the credential, document id and running session")]
    Logout,
    #[command(about = "Show today's progress, tasks and the monthly calendar")]
    Status,
    #[command(about = "Start a study session")]
    Start { subject: String },
    #[command(about = "Stop the running session and log it")]
    Stop,
    #[command(about = "Show the running timer, refreshed every second")]
    Watch,
    #[command(about = "Manage tasks")]
    Task {
        #[command(subcommand)]
        command: TaskCommand,
    },
    #[command(about = "Update the goal label, target date or daily goal")]
    Settings {
        #[arg(long, help = "Goal label, empty to unset")]
        label: Option<String>,
        #[arg(long, help = "Target date YYYY-MM-DD, empty to unset")]
        date: Option<String>,
        #[arg(long, help = "Daily goal in hours")]
        goal_hours: Option<String>,
    },
    #[command(about = "List known subjects")]
    Subjects,
}

#[derive(Subcommand, Debug)]
enum TaskCommand {
    Add { title: Vec<String> },
    Done { id: u64 },
    Undo { id: u64 },
    Rm { id: u64 },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();
    enable_logging(args.verbose);

    let config = AppConfig::from_env()
        .map_err(anyhow::Error::msg)?
        .with_data_dir(args.data_dir)
        .with_api_url(args.api_url);
    let mut controller = Controller::open(&config)
        .await
        .map_err(anyhow::Error::msg)?;

    match args.command {
        Commands::Login { token, document } => {
            let status = controller.login(&token, document).await;
            println!("{}", status);
        }
        Commands::Logout => {
            controller.logout().await;
            println!("Logged out, local cache cleared");
        }
        Commands::Status => {
            controller.startup().await;
            print!("{}", render_dashboard(&controller.dashboard()));
        }
        Commands::Start { subject } => {
            if controller.start_timer(&subject) {
                println!("Started {}", subject.trim());
            } else {
                println!("{}", render_timer_line(&controller));
            }
        }
        Commands::Stop => {
            if !controller.timer().is_running() {
                println!("Timer is not running");
                return Ok(());
            }
            ensure_loaded(&mut controller).await?;
            match controller.stop_timer().await {
                Some(entry) => println!(
                    "Logged {} of {} on {} ({})",
                    format_hms(entry.seconds),
                    entry.subject,
                    entry.date,
                    controller.status()
                ),
                None => println!("Stopped, nothing to log"),
            }
        }
        Commands::Watch => watch(&controller).await?,
        Commands::Task { command } => {
            ensure_loaded(&mut controller).await?;
            let applied = match command {
                TaskCommand::Add { title } => {
                    let title = title.join(" ");
                    match controller.add_task(&title).await {
                        Some(id) => {
                            println!("Added task {}", id);
                            true
                        }
                        None => false,
                    }
                }
                TaskCommand::Done { id } => controller.set_task_done(id, true).await,
                TaskCommand::Undo { id } => controller.set_task_done(id, false).await,
                TaskCommand::Rm { id } => controller.remove_task(id).await,
            };
            if applied {
                println!("{}", controller.status());
            } else {
                println!("Nothing changed");
            }
        }
        Commands::Settings {
            label,
            date,
            goal_hours,
        } => {
            ensure_loaded(&mut controller).await?;
            let patch = SettingsPatch {
                target_label: label,
                target_date: date,
                // Неразборчивый ввод превращается в NaN и отклоняется Ledger
                daily_goal_seconds: goal_hours
                    .map(|h| h.trim().parse::<f64>().unwrap_or(f64::NAN) * 3600.0),
            };
            controller.update_settings(patch).await;
            let settings = controller.ledger().settings();
            println!(
                "Label: {:?}, target date: {:?}, daily goal: {} ({})",
                settings.target_label,
                settings.target_date,
                format_hms(settings.daily_goal_seconds),
                controller.status()
            );
        }
        Commands::Subjects => {
            controller.startup().await;
            for subject in controller.subjects() {
                println!("{}", subject);
            }
        }
    }
    Ok(())
}

/// Мутации без загруженного документа затерли бы удаленные данные
async fn ensure_loaded(controller: &mut Controller) -> Result<()> {
    let status = controller.startup().await;
    if !controller.is_hydrated() {
        bail!("Cannot load the remote document: {}", status);
    }
    Ok(())
}

async fn watch(controller: &Controller) -> Result<()> {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut stdout = std::io::stdout();
    loop {
        tokio::select! {
            _ = interval.tick() => {
                write!(stdout, "\r{}    ", render_timer_line(controller))?;
                stdout.flush()?;
            }
            _ = tokio::signal::ctrl_c() => {
                writeln!(stdout)?;
                return Ok(());
            }
        }
    }
}

fn render_timer_line(controller: &Controller) -> String {
    let display = controller.timer_display();
    match display.state {
        TimerStateForAPI::Idle => "Timer idle".to_string(),
        TimerStateForAPI::Running { subject, .. } => {
            format!("{} {}", subject, display.formatted)
        }
    }
}

const WEEKDAY_HEADER: &str = " Mo Tu We Th Fr Sa Su";

fn intensity_glyph(intensity: Option<f64>) -> char {
    match intensity {
        None => '.',
        Some(v) if v < 0.4 => '░',
        Some(v) if v < 0.7 => '▒',
        Some(v) if v < 1.0 => '▓',
        Some(_) => '█',
    }
}

pub(crate) fn render_calendar(cells: &[CalendarCell]) -> String {
    let mut out = String::new();
    out.push_str(WEEKDAY_HEADER);
    out.push('\n');
    for row in cells.chunks(7) {
        for cell in row {
            match cell {
                CalendarCell::Blank => out.push_str("   "),
                CalendarCell::Day { intensity, .. } => {
                    out.push_str("  ");
                    out.push(intensity_glyph(*intensity));
                }
            }
        }
        out.push('\n');
    }
    out
}

pub(crate) fn render_dashboard(view: &Dashboard) -> String {
    let mut out = String::new();
    if !view.target_label.is_empty() {
        out.push_str(&format!("{}: {}\n", view.target_label, view.countdown));
    } else {
        out.push_str(&format!("Target: {}\n", view.countdown));
    }

    let filled = (view.progress * 20.0).round() as usize;
    out.push_str(&format!(
        "Today {} / {} [{}{}] {:.0}%\n",
        format_hms(view.today_total_seconds),
        format_hms(view.daily_goal_seconds),
        "#".repeat(filled),
        "-".repeat(20 - filled.min(20)),
        view.progress * 100.0
    ));
    for (subject, seconds) in &view.today_totals {
        out.push_str(&format!("  {:<12} {}\n", subject, format_hms(*seconds)));
    }

    if let TimerStateForAPI::Running { subject, .. } = &view.timer.state {
        out.push_str(&format!("Running: {} {}\n", subject, view.timer.formatted));
    }

    out.push_str(&format!("\n{}\n", view.today.format("%B %Y")));
    out.push_str(&render_calendar(&view.calendar));

    out.push_str("\nTasks\n");
    if view.tasks.is_empty() {
        out.push_str("  (none)\n");
    }
    for task in &view.tasks {
        out.push_str(&format!(
            "  [{}] {} {}\n",
            if task.done { "x" } else { " " },
            task.id,
            task.title
        ));
    }
    out.push_str(&format!("\nSync: {}\n", view.status));
    out
}
