mod auth;
mod backend;
mod config;
mod db;
mod error;
mod models;
mod stats;
mod status;
mod store;
mod sync;
mod telemetry;
mod tui;

use anyhow::{Context, Result, anyhow};
use auth::{AuthApi, AuthClient, CallbackParams, SessionStore, SignUpOutcome, oauth_error_message};
use backend::{Backend, PlaceholderBackend, RestBackend};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use config::AppConfig;
use db::Database;
use models::{Activity, Job, JobStatus, Note, NoteKind, Priority};
use regex::Regex;
use std::io::{self, BufRead, Write};
use std::sync::LazyLock;
use sync::{SyncOutcome, SyncProvider, SyncService};
use tracing::debug;

static SALARY_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*\$?\s*([\d,.]+)\s*(k?)\s*(?:(?:-|–|to)\s*\$?\s*([\d,.]+)\s*(k?))?\s*(\+?)\s*$")
        .expect("valid salary regex")
});

#[derive(Parser)]
#[command(name = "applytrack")]
#[command(about = "Track job applications through the hiring pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Add a job
    Add {
        /// Company name
        company: String,

        /// Job title
        title: String,

        #[command(flatten)]
        fields: JobFields,
    },

    /// List jobs
    List {
        /// Filter by status (saved, applied, screening, interview, ...)
        #[arg(short, long)]
        status: Option<String>,

        /// Filter by company
        #[arg(short, long)]
        company: Option<String>,

        /// Only applications still in progress
        #[arg(long, conflicts_with = "closed")]
        open: bool,

        /// Only accepted, rejected or withdrawn applications
        #[arg(long)]
        closed: bool,
    },

    /// Show job details
    Show {
        /// Job ID or unique prefix
        id: String,
    },

    /// Move a job to a new status, or to the next stage when omitted
    Status {
        /// Job ID or unique prefix
        id: String,

        /// New status
        status: Option<String>,
    },

    /// Edit a job's fields
    Edit {
        /// Job ID or unique prefix
        id: String,

        #[arg(long)]
        company: Option<String>,

        #[arg(long)]
        title: Option<String>,

        #[command(flatten)]
        fields: JobFields,
    },

    /// Remove a job
    Remove {
        /// Job ID or unique prefix
        id: String,
    },

    /// Show pipeline statistics and upcoming actions
    Stats {
        /// How many days ahead to look for next actions
        #[arg(short, long, default_value = "7")]
        days: i64,
    },

    /// List the pipeline stages
    Statuses,

    /// Manage your profile
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },

    /// Manage notes
    Note {
        #[command(subcommand)]
        command: NoteCommands,
    },

    /// Show recent activity
    Activity {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Sync with the hosted backend
    Sync,

    /// Sign in, sign out and manage your account
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },

    /// Browse jobs in the terminal UI
    Browse {
        /// Only show jobs with this status
        #[arg(short, long)]
        status: Option<String>,
    },
}

#[derive(Args, Default)]
struct JobFields {
    #[arg(long)]
    location: Option<String>,

    #[arg(long)]
    url: Option<String>,

    /// Salary range, e.g. "$150k-200k" or "120000+"
    #[arg(long)]
    salary: Option<String>,

    /// Currency symbol or code shown with the salary
    #[arg(long)]
    currency: Option<String>,

    /// high, medium or low
    #[arg(short, long)]
    priority: Option<String>,

    #[arg(long)]
    source: Option<String>,

    #[arg(long)]
    referral: Option<String>,

    #[arg(long)]
    contact: Option<String>,

    #[arg(long)]
    contact_email: Option<String>,

    #[arg(long)]
    notes: Option<String>,

    /// What to do next for this job
    #[arg(long)]
    next_action: Option<String>,

    /// When the next action is due (YYYY-MM-DD)
    #[arg(long)]
    due: Option<String>,
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Show your profile
    Show,

    /// Update profile fields
    Set {
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        phone: Option<String>,

        #[arg(long)]
        location: Option<String>,

        #[arg(long)]
        linkedin: Option<String>,

        #[arg(long)]
        portfolio: Option<String>,

        /// Comma-separated target roles
        #[arg(long)]
        roles: Option<String>,

        /// Comma-separated target locations
        #[arg(long)]
        locations: Option<String>,

        /// Expected salary range, e.g. "140k-170k"
        #[arg(long)]
        salary: Option<String>,

        /// remote, hybrid or onsite
        #[arg(long)]
        remote: Option<String>,

        /// Comma-separated skills
        #[arg(long)]
        skills: Option<String>,

        #[arg(long)]
        bio: Option<String>,

        #[arg(long)]
        goals: Option<String>,
    },
}

#[derive(Subcommand)]
enum NoteCommands {
    /// Add a note
    Add {
        content: String,

        /// Attach to a job (ID or unique prefix)
        #[arg(short, long)]
        job: Option<String>,

        /// general, interview, research or follow_up
        #[arg(short, long, default_value = "general")]
        kind: String,
    },

    /// List notes
    List {
        /// Only notes for this job
        #[arg(short, long)]
        job: Option<String>,
    },

    /// Replace a note's text
    Edit {
        /// Note ID
        id: String,

        content: String,
    },

    /// Remove a note
    Remove {
        /// Note ID
        id: String,
    },
}

#[derive(Subcommand)]
enum AuthCommands {
    /// Sign in with email and password
    Login { email: String },

    /// Create an account
    Signup {
        email: String,

        #[arg(long)]
        name: Option<String>,
    },

    /// Sign out and forget the stored session
    Logout,

    /// Send a password reset email
    Reset { email: String },

    /// Change your password
    Password,

    /// Change your display name
    Rename { name: String },

    /// Start an OAuth sign-in (github, google, linkedin_oidc)
    Oauth {
        provider: String,

        /// Path to return to after signing in
        #[arg(long)]
        next: Option<String>,
    },

    /// Finish an OAuth sign-in with the URL the browser landed on
    Callback { url: String },

    /// Show who is signed in
    Whoami,
}

fn parse_status(value: &str) -> Result<JobStatus> {
    JobStatus::parse(value).ok_or_else(|| {
        let known: Vec<&str> = status::STATUS_ORDER.iter().map(|s| s.as_str()).collect();
        anyhow!("Unknown status '{}'. Expected one of: {}", value, known.join(", "))
    })
}

fn parse_priority(value: &str) -> Result<Priority> {
    Priority::parse(value).ok_or_else(|| anyhow!("Unknown priority '{}'. Expected high, medium or low", value))
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", value))
}

fn parse_salary_amount(digits: &str, thousands: &str) -> Option<i64> {
    let cleaned: String = digits.chars().filter(|c| *c != ',').collect();
    let value: f64 = cleaned.parse().ok()?;
    let value = if thousands.is_empty() { value } else { value * 1000.0 };
    Some(value.round() as i64)
}

// "$150,000 - $200,000", "150k-200k", "120k+" or a single amount. A trailing
// `k` on the upper bound applies to the lower one too.
fn parse_salary_range(input: &str) -> Result<(Option<i64>, Option<i64>)> {
    let caps = SALARY_RANGE
        .captures(input)
        .ok_or_else(|| anyhow!("Couldn't read salary '{}'", input))?;

    let min_k = caps.get(2).map_or("", |m| m.as_str());
    let max_k = caps.get(4).map_or("", |m| m.as_str());
    let min_k = if min_k.is_empty() { max_k } else { min_k };

    let min = caps.get(1).and_then(|m| parse_salary_amount(m.as_str(), min_k));
    let max = caps.get(3).and_then(|m| parse_salary_amount(m.as_str(), max_k));
    let open_ended = caps.get(5).is_some_and(|m| !m.as_str().is_empty());

    match (min, max) {
        (Some(min), Some(max)) if min > max => Err(anyhow!("Salary minimum is above the maximum")),
        (Some(min), None) if !open_ended => Ok((Some(min), Some(min))),
        (min, max) => Ok((min, max)),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn apply_fields(job: &mut Job, fields: JobFields) -> Result<()> {
    if let Some(location) = fields.location {
        job.location = Some(location);
    }
    if let Some(url) = fields.url {
        job.url = Some(url);
    }
    if let Some(salary) = fields.salary {
        let (min, max) = parse_salary_range(&salary)?;
        job.salary_min = min;
        job.salary_max = max;
    }
    if let Some(currency) = fields.currency {
        job.salary_currency = Some(currency);
    }
    if let Some(priority) = fields.priority {
        job.priority = parse_priority(&priority)?;
    }
    if let Some(source) = fields.source {
        job.source = Some(source);
    }
    if let Some(referral) = fields.referral {
        job.referral = Some(referral);
    }
    if let Some(contact) = fields.contact {
        job.contact_name = Some(contact);
    }
    if let Some(email) = fields.contact_email {
        job.contact_email = Some(email);
    }
    if let Some(notes) = fields.notes {
        job.notes = Some(notes);
    }
    if let Some(action) = fields.next_action {
        job.next_action = Some(action);
    }
    if let Some(due) = fields.due {
        job.next_action_date = Some(parse_date(&due)?);
    }
    Ok(())
}

fn format_pay(job: &Job) -> String {
    let currency = job.salary_currency.as_deref().unwrap_or("$");
    match (job.salary_min, job.salary_max) {
        (Some(min), Some(max)) if min == max => format!("{}{}k", currency, min / 1000),
        (Some(min), Some(max)) => format!("{}{}-{}k", currency, min / 1000, max / 1000),
        (Some(min), None) => format!("{}{}k+", currency, min / 1000),
        (None, Some(max)) => format!("<{}{}k", currency, max / 1000),
        (None, None) => "-".to_string(),
    }
}

fn short_id(id: &uuid::Uuid) -> String {
    id.to_string()[..8].to_string()
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn open_db(config: &AppConfig) -> Result<Database> {
    let db = Database::open(&config.database_path())?;
    db.ensure_initialized()?;
    Ok(db)
}

fn print_job(db: &Database, job: &Job) -> Result<()> {
    let config = job.status.config();
    println!("Job {}", job.id);
    println!("Title: {}", job.title);
    println!("Company: {}", job.company);
    if let Some(location) = &job.location {
        println!("Location: {}", location);
    }
    println!("Status: {} ({})", config.label, config.description);
    println!("Priority: {}", job.priority.label());
    if let Some(url) = &job.url {
        println!("URL: {}", url);
    }
    if job.salary_min.is_some() || job.salary_max.is_some() {
        println!("Pay: {}", format_pay(job));
    }
    if let Some(date) = job.applied_date {
        println!("Applied: {}", date);
    }
    if let Some(contact) = &job.contact_name {
        match &job.contact_email {
            Some(email) => println!("Contact: {} <{}>", contact, email),
            None => println!("Contact: {}", contact),
        }
    }
    if let Some(source) = &job.source {
        println!("Source: {}", source);
    }
    if let Some(referral) = &job.referral {
        println!("Referral: {}", referral);
    }
    if let Some(action) = &job.next_action {
        match job.next_action_date {
            Some(due) => println!("Next: {} (due {})", action, due),
            None => println!("Next: {}", action),
        }
    }
    println!("Created: {}", job.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"));
    if let Some(notes) = &job.notes {
        println!("\n--- Notes ---\n{}", textwrap::fill(notes, 78));
    }

    let journal = db.list_notes(Some(job.id))?;
    if !journal.is_empty() {
        println!("\n--- Journal ({}) ---", journal.len());
        for note in journal {
            println!("[{}] {} {}", note.kind.as_str(), note.created_at.format("%Y-%m-%d"), short_id(&note.id));
            println!("{}", textwrap::indent(&textwrap::fill(&note.content, 74), "    "));
        }
    }
    Ok(())
}

fn print_stats(db: &Database, days: i64) -> Result<()> {
    let jobs = db.list_jobs(None, None)?;
    let today = Local::now().date_naive();
    let stats = stats::compute_stats_on(&jobs, today);

    println!("Total jobs:         {}", stats.total);
    println!("Interviewing:       {}", stats.interviewing);
    println!("Offers:             {}", stats.offers);
    println!("Response rate:      {}%", stats.response_rate);
    println!("Applied this week:  {}", stats.applied_this_week);

    let slices = stats::chart_data(&stats);
    if !slices.is_empty() {
        println!("\nBy status:");
        let widest = slices.iter().map(|s| s.count).max().unwrap_or(1).max(1);
        for slice in slices {
            let bar = "#".repeat((slice.count * 30).div_ceil(widest));
            println!("  {:<12} {:>4}  {}", slice.label, slice.count, bar);
        }
    }

    let overdue = stats::overdue_actions(&jobs, today);
    if !overdue.is_empty() {
        println!("\nOverdue:");
        for job in overdue {
            print_action(job);
        }
    }

    let upcoming = stats::upcoming_actions(&jobs, today, days);
    if !upcoming.is_empty() {
        println!("\nDue in the next {} days:", days);
        for job in upcoming {
            print_action(job);
        }
    }
    Ok(())
}

fn print_action(job: &Job) {
    let due = job.next_action_date.map(|d| d.to_string()).unwrap_or_default();
    println!(
        "  {:<10} {:<8} {} ({} at {})",
        due,
        short_id(&job.id),
        job.next_action.as_deref().unwrap_or("follow up"),
        truncate(&job.title, 30),
        truncate(&job.company, 20)
    );
}

fn run_sync<B: Backend>(backend: B, db: Database, user: Option<auth::AuthUser>) -> Result<()> {
    let provider = SyncProvider::new(backend, db, user);
    match provider.sync_now() {
        SyncOutcome::Completed(report) => {
            println!("Sync complete.");
            println!("  Pushed: {} jobs, {} notes, {} activities", report.pushed_jobs, report.pushed_notes, report.pushed_activities);
            if report.deleted_jobs + report.deleted_notes > 0 {
                println!("  Deleted remotely: {} jobs, {} notes", report.deleted_jobs, report.deleted_notes);
            }
            if report.profile_pushed {
                println!("  Profile pushed");
            }
            println!(
                "  Pulled: {} jobs, {} notes, {} activities",
                report.pulled_jobs, report.pulled_notes, report.pulled_activities
            );
            if report.profile_pulled {
                println!("  Profile updated from backend");
            }
            Ok(())
        }
        SyncOutcome::AlreadySyncing => {
            println!("A sync is already running.");
            Ok(())
        }
        SyncOutcome::Failed(message) => {
            let status = provider.status();
            if !status.is_online {
                println!("You're offline. Changes are saved locally and will sync later.");
                return Ok(());
            }
            Err(anyhow!(message))
        }
        SyncOutcome::Discarded => Ok(()),
    }
}

fn run_browse<B: Backend>(
    backend: B,
    db: Database,
    user: Option<auth::AuthUser>,
    filter: Option<JobStatus>,
) -> Result<()> {
    let provider = SyncProvider::new(backend, db, user);
    tui::run_browse(&provider, filter)
}

fn auth_client<A: AuthApi>(api: A, config: &AppConfig) -> AuthClient<A> {
    AuthClient::new(api, SessionStore::new(&config.session_path()), config.site_url.clone())
}

fn find_note<'a>(notes: &'a [Note], id: &str) -> Result<&'a Note> {
    let prefix = id.trim().to_ascii_lowercase();
    let matches: Vec<&Note> = notes.iter().filter(|n| n.id.to_string().starts_with(&prefix)).collect();
    match matches.as_slice() {
        [note] => Ok(note),
        [] => Err(anyhow!("No note matches '{}'", id)),
        _ => Err(anyhow!("'{}' matches {} notes, use more characters", id, matches.len())),
    }
}

// "applied -> interview" reads better with the registry labels
fn describe_activity(activity: &Activity) -> String {
    let detail = activity.detail.as_deref().unwrap_or_default();
    if activity.action != "status_changed" {
        return detail.to_string();
    }
    match detail.split_once(" -> ") {
        Some((from, to)) => format!(
            "{} -> {}",
            status::status_config_for_str(from).label,
            status::status_config_for_str(to).label
        ),
        None => detail.to_string(),
    }
}

fn run_auth<A: AuthApi>(client: AuthClient<A>, command: AuthCommands) -> Result<()> {
    match command {
        AuthCommands::Login { email } => {
            let password = prompt("Password: ")?;
            let session = client.sign_in(&email, &password)?;
            println!("Signed in as {}", session.user.email.as_deref().unwrap_or(&email));
        }

        AuthCommands::Signup { email, name } => {
            let password = prompt("Password: ")?;
            let confirm = prompt("Confirm password: ")?;
            match client.sign_up(&email, &password, &confirm, name.as_deref())? {
                SignUpOutcome::SignedIn(_) => println!("Account created. You're signed in."),
                SignUpOutcome::ConfirmationSent => {
                    println!("Check {} for a confirmation link to finish signing up.", email)
                }
            }
        }

        AuthCommands::Logout => {
            client.sign_out()?;
            println!("Signed out.");
        }

        AuthCommands::Reset { email } => {
            client.reset_password(&email)?;
            println!("If an account exists for {}, a reset link is on its way.", email);
        }

        AuthCommands::Password => {
            let password = prompt("New password: ")?;
            let confirm = prompt("Confirm password: ")?;
            client.update_password(&password, &confirm)?;
            println!("Password updated.");
        }

        AuthCommands::Rename { name } => {
            let user = client.update_profile(&name)?;
            println!("Updated name for {}", user.email.as_deref().unwrap_or("your account"));
        }

        AuthCommands::Oauth { provider, next } => {
            let start = client.sign_in_with_oauth(&provider, next.as_deref())?;
            println!("Open this URL in your browser to continue:\n{}", start.authorize_url);
            println!("\nThen run `applytrack auth callback <url>` with the address you land on.");
        }

        AuthCommands::Callback { url } => {
            let params = CallbackParams::parse(&url);
            let destination = client.complete_oauth(&params);
            debug!(destination = %destination, "oauth callback handled");
            match CallbackParams::parse(&destination).error {
                Some(code) if destination.starts_with(auth::ERROR_PATH) => {
                    let info = oauth_error_message(&code);
                    return Err(anyhow!("{}: {}", info.title, info.message));
                }
                _ => {
                    let session = client.session();
                    let who = session
                        .as_ref()
                        .and_then(|s| s.user.email.clone())
                        .unwrap_or_else(|| "your account".to_string());
                    println!("Signed in as {}. Continue at {}", who, destination);
                }
            }
        }

        AuthCommands::Whoami => match client.active_session() {
            Some(session) => println!(
                "{} ({})",
                session.user.email.as_deref().unwrap_or("no email"),
                session.user.id
            ),
            None => println!("Not signed in."),
        },
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;
    telemetry::init(&config.log_level)?;
    config.log_warnings();

    match cli.command {
        Commands::Init => {
            let db = Database::open(&config.database_path())?;
            db.init()?;
            println!("Database initialized at {}", db.path().display());
        }

        Commands::Add { company, title, fields } => {
            let db = open_db(&config)?;
            let mut job = Job::new(&company, &title);
            apply_fields(&mut job, fields)?;
            db.insert_job(&job)?;
            println!("Added {} at {} ({})", job.title, job.company, short_id(&job.id));
        }

        Commands::List { status, company, open, closed } => {
            let db = open_db(&config)?;
            let status = status.as_deref().map(parse_status).transpose()?;
            let jobs: Vec<Job> = db
                .list_jobs(status, company.as_deref())?
                .into_iter()
                .filter(|j| !open || crate::status::ACTIVE_STATUSES.contains(&j.status))
                .filter(|j| !closed || crate::status::TERMINAL_STATUSES.contains(&j.status))
                .collect();
            if jobs.is_empty() {
                println!("No jobs found.");
            } else {
                println!(
                    "{:<9} {:<12} {:<30} {:<20} {:<6} {:>12}",
                    "ID", "STATUS", "TITLE", "COMPANY", "PRI", "PAY"
                );
                println!("{}", "-".repeat(94));
                for job in jobs {
                    println!(
                        "{:<9} {:<12} {:<30} {:<20} {:<6} {:>12}",
                        short_id(&job.id),
                        job.status.config().label,
                        truncate(&job.title, 28),
                        truncate(&job.company, 18),
                        job.priority.as_str(),
                        format_pay(&job)
                    );
                }
            }
        }

        Commands::Show { id } => {
            let db = open_db(&config)?;
            let id = db.resolve_job_id(&id)?;
            match db.get_job(id)? {
                Some(job) => print_job(&db, &job)?,
                None => println!("Job {} not found.", id),
            }
        }

        Commands::Status { id, status } => {
            let db = open_db(&config)?;
            let id = db.resolve_job_id(&id)?;
            let job = db.get_job(id)?.ok_or_else(|| anyhow!("Job {} not found", id))?;
            let target = match status {
                Some(status) => parse_status(&status)?,
                None => job
                    .status
                    .next()
                    .ok_or_else(|| anyhow!("'{}' is the last stage", job.status.config().label))?,
            };
            let updated = db
                .set_job_status(id, target, Local::now().date_naive())?
                .ok_or_else(|| anyhow!("Job {} not found", id))?;
            println!(
                "{} at {}: {} -> {}",
                updated.title,
                updated.company,
                job.status.config().label,
                updated.status.config().label
            );
        }

        Commands::Edit { id, company, title, fields } => {
            let db = open_db(&config)?;
            let id = db.resolve_job_id(&id)?;
            let mut job = db.get_job(id)?.ok_or_else(|| anyhow!("Job {} not found", id))?;
            if let Some(company) = company {
                job.company = company;
            }
            if let Some(title) = title {
                job.title = title;
            }
            apply_fields(&mut job, fields)?;
            job.updated_at = chrono::Utc::now();
            db.update_job(&job)?;
            println!("Updated {} at {}", job.title, job.company);
        }

        Commands::Remove { id } => {
            let db = open_db(&config)?;
            let id = db.resolve_job_id(&id)?;
            if db.delete_job(id)? {
                println!("Removed job {}.", short_id(&id));
            } else {
                println!("Job {} not found.", id);
            }
        }

        Commands::Stats { days } => {
            let db = open_db(&config)?;
            print_stats(&db, days)?;
        }

        Commands::Statuses => {
            println!("{:<3} {:<12} {:<10} {:<14} {}", "#", "STATUS", "CATEGORY", "ICON", "DESCRIPTION");
            println!("{}", "-".repeat(84));
            for status in status::STATUS_ORDER {
                let config = status.config();
                println!(
                    "{:<3} {:<12} {:<10} {:<14} {}",
                    config.order + 1,
                    config.label,
                    format!("{:?}", config.category).to_lowercase(),
                    config.icon,
                    config.description
                );
            }
        }

        Commands::Profile { command } => {
            let db = open_db(&config)?;
            match command {
                ProfileCommands::Show => match db.get_profile()? {
                    Some(profile) => {
                        println!("{}", serde_json::to_string_pretty(&profile)?);
                    }
                    None => println!("No profile yet. Use `applytrack profile set`."),
                },

                ProfileCommands::Set {
                    name,
                    email,
                    phone,
                    location,
                    linkedin,
                    portfolio,
                    roles,
                    locations,
                    salary,
                    remote,
                    skills,
                    bio,
                    goals,
                } => {
                    let mut profile = db.get_profile()?.unwrap_or_default();
                    if name.is_some() {
                        profile.full_name = name;
                    }
                    if email.is_some() {
                        profile.email = email;
                    }
                    if phone.is_some() {
                        profile.phone = phone;
                    }
                    if location.is_some() {
                        profile.location = location;
                    }
                    if linkedin.is_some() {
                        profile.linkedin_url = linkedin;
                    }
                    if portfolio.is_some() {
                        profile.portfolio_url = portfolio;
                    }
                    if let Some(roles) = roles {
                        profile.target_roles = split_list(&roles);
                    }
                    if let Some(locations) = locations {
                        profile.target_locations = split_list(&locations);
                    }
                    if let Some(salary) = salary {
                        let (min, max) = parse_salary_range(&salary)?;
                        profile.salary_expectation_min = min;
                        profile.salary_expectation_max = max;
                    }
                    if remote.is_some() {
                        profile.remote_preference = remote;
                    }
                    if let Some(skills) = skills {
                        profile.skills = split_list(&skills);
                    }
                    if bio.is_some() {
                        profile.bio = bio;
                    }
                    if goals.is_some() {
                        profile.career_goals = goals;
                    }
                    profile.updated_at = Some(chrono::Utc::now());
                    db.save_profile(&profile)?;
                    println!("Profile saved.");
                }
            }
        }

        Commands::Note { command } => {
            let db = open_db(&config)?;
            match command {
                NoteCommands::Add { content, job, kind } => {
                    let job_id = job.as_deref().map(|j| db.resolve_job_id(j)).transpose()?;
                    let note = Note::new(job_id, NoteKind::from(kind), &content);
                    db.add_note(&note)?;
                    println!("Added {} note {}.", note.kind.as_str(), short_id(&note.id));
                }

                NoteCommands::List { job } => {
                    let job_id = job.as_deref().map(|j| db.resolve_job_id(j)).transpose()?;
                    let notes = db.list_notes(job_id)?;
                    if notes.is_empty() {
                        println!("No notes found.");
                    }
                    for note in notes {
                        let attached = note.job_id.map(|id| short_id(&id)).unwrap_or_else(|| "-".to_string());
                        println!(
                            "{} [{}] job {} {}",
                            short_id(&note.id),
                            note.kind.as_str(),
                            attached,
                            note.created_at.with_timezone(&Local).format("%Y-%m-%d")
                        );
                        println!("{}", textwrap::indent(&textwrap::fill(&note.content, 74), "    "));
                    }
                }

                NoteCommands::Edit { id, content } => {
                    let notes = db.list_notes(None)?;
                    let note = find_note(&notes, &id)?;
                    db.update_note(note.id, &content)?;
                    println!("Updated note {}.", short_id(&note.id));
                }

                NoteCommands::Remove { id } => {
                    let notes = db.list_notes(None)?;
                    let note = find_note(&notes, &id)?;
                    db.delete_note(note.id)?;
                    println!("Removed note {}.", short_id(&note.id));
                }
            }
        }

        Commands::Activity { limit } => {
            let db = open_db(&config)?;
            let activities = db.recent_activities(limit)?;
            if activities.is_empty() {
                println!("No activity yet.");
            }
            for activity in activities {
                let job = activity.job_id.map(|id| short_id(&id)).unwrap_or_default();
                println!(
                    "{}  {:<8} {:<15} {}",
                    activity.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
                    job,
                    activity.action,
                    describe_activity(&activity)
                );
            }
        }

        Commands::Sync => {
            let db = open_db(&config)?;
            match &config.backend {
                Some(backend_config) => {
                    let api = RestBackend::new(backend_config)?;
                    let session = auth_client(api.clone(), &config).active_session();
                    let user = session.as_ref().map(|s| s.user.clone());
                    run_sync(api.with_access_token(session.map(|s| s.access_token)), db, user)?;
                }
                None => {
                    let user = SessionStore::new(&config.session_path()).load().map(|s| s.user);
                    run_sync(PlaceholderBackend, db, user)?;
                }
            }
        }

        Commands::Auth { command } => match &config.backend {
            Some(backend_config) => {
                let api = RestBackend::new(backend_config)?;
                run_auth(auth_client(api, &config), command)?;
            }
            None => run_auth(auth_client(PlaceholderBackend, &config), command)?,
        },

        Commands::Browse { status } => {
            let db = open_db(&config)?;
            let filter = status.as_deref().map(parse_status).transpose()?;
            match &config.backend {
                Some(backend_config) => {
                    let api = RestBackend::new(backend_config)?;
                    let session = auth_client(api.clone(), &config).active_session();
                    let user = session.as_ref().map(|s| s.user.clone());
                    run_browse(api.with_access_token(session.map(|s| s.access_token)), db, user, filter)?;
                }
                None => {
                    let user = SessionStore::new(&config.session_path()).load().map(|s| s.user);
                    run_browse(PlaceholderBackend, db, user, filter)?;
                }
            }
        }
    }

    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
