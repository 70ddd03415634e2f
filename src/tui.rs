use anyhow::Result;
use chrono::Local;
use crossterm::{
    ExecutableCommand,
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
};
use std::cell::RefCell;
use std::io::stdout;
use std::rc::Rc;
use std::str::FromStr;
use tracing::warn;

use crate::backend::Backend;
use crate::models::{Job, JobStatus, Note, Priority, UserProfile};
use crate::stats::{Stats, chart_data, compute_stats};
use crate::status::{BadgeStyle, priority_config};
use crate::store::{Action, JobStore, StoreState, SubscriptionId};
use crate::sync::{SyncOutcome, SyncProvider, SyncService};

struct AppState {
    store: JobStore,
    filter: Option<JobStatus>,
    selected: usize,
    scroll_offset: u16,
    notes: Vec<Note>,
    message: Option<String>,
    stats: Rc<RefCell<Stats>>,
    stats_subscription: SubscriptionId,
    last_deleted: Option<Job>,
}

impl AppState {
    fn new(jobs: Vec<Job>, profile: Option<UserProfile>, filter: Option<JobStatus>) -> Self {
        let mut store = JobStore::with_jobs(jobs);
        store.dispatch(Action::SetProfile(profile));

        // header figures are recomputed only when the job list changes
        let stats = Rc::new(RefCell::new(store.stats()));
        let cache = stats.clone();
        let stats_subscription = store.subscribe(
            |state: &StoreState| compute_stats(&state.jobs),
            move |fresh: &Stats| *cache.borrow_mut() = fresh.clone(),
        );

        Self {
            store,
            filter,
            selected: 0,
            scroll_offset: 0,
            notes: Vec::new(),
            message: None,
            stats,
            stats_subscription,
            last_deleted: None,
        }
    }

    fn close(&mut self) {
        self.store.unsubscribe(self.stats_subscription);
    }

    fn visible(&self) -> Vec<&Job> {
        self.store
            .jobs()
            .iter()
            .filter(|j| self.filter.is_none_or(|s| j.status == s))
            .collect()
    }

    fn current_job(&self) -> Option<&Job> {
        self.visible().get(self.selected).copied()
    }

    fn load_notes<B: Backend>(&mut self, provider: &SyncProvider<B>) {
        let Some(id) = self.current_job().map(|j| j.id) else {
            self.notes.clear();
            return;
        };
        self.notes = provider.db().list_notes(Some(id)).unwrap_or_default();
    }

    fn next(&mut self) {
        let len = self.visible().len();
        if len > 0 && self.selected < len - 1 {
            self.selected += 1;
            self.scroll_offset = 0;
        }
    }

    fn prev(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
            self.scroll_offset = 0;
        }
    }

    fn scroll_down(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_add(3);
    }

    fn scroll_up(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_sub(3);
    }

    fn set_status<B: Backend>(&mut self, provider: &SyncProvider<B>, status: JobStatus) {
        let Some(id) = self.current_job().map(|j| j.id) else { return };
        let today = Local::now().date_naive();
        let Some(rollback) = self.store.set_status_optimistic(id, status, today) else {
            return;
        };
        let result = provider.db().set_job_status(id, status, today);
        let saved = match result {
            Ok(job) => job.is_some(),
            Err(e) => {
                warn!(error = %e, "status change failed");
                false
            }
        };
        if saved {
            self.message = Some(format!("Moved to {}", status.config().label));
        } else {
            self.store.rollback(rollback);
            self.message = Some("Couldn't save the status change".to_string());
        }
        self.clamp_selection();
    }

    fn cycle_priority<B: Backend>(&mut self, provider: &SyncProvider<B>) {
        let Some(mut job) = self.current_job().cloned() else { return };
        job.priority = match job.priority {
            Priority::Low => Priority::Medium,
            Priority::Medium => Priority::High,
            Priority::High => Priority::Low,
        };
        job.updated_at = chrono::Utc::now();
        if provider.db().update_job(&job).is_ok() {
            self.store.dispatch(Action::UpdateJob(job));
        }
    }

    fn delete<B: Backend>(&mut self, provider: &SyncProvider<B>) {
        let Some(job) = self.current_job().cloned() else { return };
        match provider.db().delete_job(job.id) {
            Ok(true) => {
                self.store.dispatch(Action::RemoveJob(job.id));
                self.message = Some(format!("Removed {} at {} (u to undo)", job.title, job.company));
                self.last_deleted = Some(job);
            }
            Ok(false) => {}
            Err(e) => {
                warn!(error = %e, "delete failed");
                self.message = Some("Couldn't remove the job".to_string());
            }
        }
        self.clamp_selection();
    }

    fn undo_delete<B: Backend>(&mut self, provider: &SyncProvider<B>) {
        let Some(job) = self.last_deleted.take() else { return };
        let db = provider.db();
        let restored = db.insert_job(&job).and_then(|_| db.clear_pending_delete(job.id));
        match restored {
            Ok(()) => {
                self.message = Some(format!("Restored {}", job.title));
                self.store.dispatch(Action::AddJob(job));
                self.selected = 0;
            }
            Err(e) => {
                warn!(error = %e, "restore failed");
                self.message = Some("Couldn't restore the job".to_string());
            }
        }
    }

    fn sync<B: Backend>(&mut self, provider: &SyncProvider<B>) {
        self.message = Some(match provider.sync_now() {
            SyncOutcome::Completed(report) => {
                let db = provider.db();
                if let Ok(jobs) = db.list_jobs(None, None) {
                    self.store.dispatch(Action::SetJobs(jobs));
                }
                if report.profile_pulled {
                    if let Ok(profile) = db.get_profile() {
                        self.store.dispatch(Action::SetProfile(profile));
                    }
                }
                format!(
                    "Synced: {} pushed, {} pulled",
                    report.pushed_jobs, report.pulled_jobs
                )
            }
            SyncOutcome::AlreadySyncing => "Sync already running".to_string(),
            SyncOutcome::Failed(message) => message,
            SyncOutcome::Discarded => "Sync cancelled".to_string(),
        });
        self.clamp_selection();
    }

    fn clamp_selection(&mut self) {
        let len = self.visible().len();
        if self.selected >= len {
            self.selected = len.saturating_sub(1);
        }
    }
}

pub fn run_browse<B: Backend>(provider: &SyncProvider<B>, filter: Option<JobStatus>) -> Result<()> {
    let jobs = provider.db().list_jobs(None, None)?;
    if jobs.is_empty() {
        println!("No jobs found.");
        return Ok(());
    }

    let profile = provider.db().get_profile()?;
    let mut state = AppState::new(jobs, profile, filter);
    state.load_notes(provider);

    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = run_loop(&mut terminal, &mut state, provider);
    state.close();

    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;
    provider.detach();

    result
}

fn run_loop<B: Backend>(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    state: &mut AppState,
    provider: &SyncProvider<B>,
) -> Result<()> {
    let mut list_state = ListState::default();
    list_state.select(Some(0));

    loop {
        let sync_line = sync_line(provider);
        terminal.draw(|frame| draw(frame, state, &mut list_state, &sync_line))?;

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            let prev_selected = state.selected;
            let prev_id = state.current_job().map(|j| j.id);
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => break,
                KeyCode::Down | KeyCode::Char('j') => state.next(),
                KeyCode::Up | KeyCode::Char('k') => state.prev(),
                KeyCode::Char('J') | KeyCode::PageDown => state.scroll_down(),
                KeyCode::Char('K') | KeyCode::PageUp => state.scroll_up(),
                KeyCode::Char(']') => {
                    if let Some(next) = state.current_job().and_then(|j| j.status.next()) {
                        state.set_status(provider, next);
                    }
                }
                KeyCode::Char('[') => {
                    if let Some(prev) = state.current_job().and_then(|j| j.status.previous()) {
                        state.set_status(provider, prev);
                    }
                }
                KeyCode::Char('a') => state.set_status(provider, JobStatus::Applied),
                KeyCode::Char('i') => state.set_status(provider, JobStatus::Interview),
                KeyCode::Char('o') => state.set_status(provider, JobStatus::Offer),
                KeyCode::Char('x') => state.set_status(provider, JobStatus::Rejected),
                KeyCode::Char('w') => state.set_status(provider, JobStatus::Withdrawn),
                KeyCode::Char('p') => state.cycle_priority(provider),
                KeyCode::Char('d') => state.delete(provider),
                KeyCode::Char('u') => state.undo_delete(provider),
                KeyCode::Char('s') => state.sync(provider),
                _ => {}
            }
            if state.selected != prev_selected || state.current_job().map(|j| j.id) != prev_id {
                list_state.select(Some(state.selected));
                state.load_notes(provider);
            }
        }
    }
    Ok(())
}

fn sync_line<B: Backend>(provider: &SyncProvider<B>) -> String {
    let status = provider.status();
    let connectivity = if status.is_syncing {
        "syncing..."
    } else if status.is_online {
        "online"
    } else {
        "offline"
    };
    let last = status
        .last_synced_at
        .map(|t| t.with_timezone(&Local).format("%b %d %H:%M").to_string())
        .unwrap_or_else(|| "never".to_string());
    match status.last_error {
        Some(error) => format!("{} | last sync {} | {}", connectivity, last, error),
        None => format!("{} | last sync {}", connectivity, last),
    }
}

fn badge_color(style: BadgeStyle) -> Color {
    match style {
        BadgeStyle::Neutral => Color::Gray,
        BadgeStyle::Info => Color::Blue,
        BadgeStyle::Progress => Color::Magenta,
        BadgeStyle::Highlight => Color::Yellow,
        BadgeStyle::Success => Color::Green,
        BadgeStyle::Danger => Color::Red,
        BadgeStyle::Muted => Color::DarkGray,
    }
}

fn glyph(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Saved => " ",
        JobStatus::Applied => ">",
        JobStatus::Screening => "~",
        JobStatus::Interview => "*",
        JobStatus::Technical => "#",
        JobStatus::Final => "!",
        JobStatus::Offer => "$",
        JobStatus::Accepted => "+",
        JobStatus::Rejected => "x",
        JobStatus::Withdrawn => "-",
    }
}

fn draw(frame: &mut Frame, state: &AppState, list_state: &mut ListState, sync_line: &str) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(frame.area());

    frame.render_widget(build_stats(state), rows[0]);

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(rows[1]);

    let visible = state.visible();
    let items: Vec<ListItem> = visible
        .iter()
        .map(|job| {
            let config = job.status.config();
            let title = if job.title.chars().count() > 30 {
                format!("{}...", job.title.chars().take(27).collect::<String>())
            } else {
                job.title.clone()
            };
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{} {:<11}", glyph(job.status), config.label),
                    Style::default().fg(badge_color(config.badge_style)),
                ),
                if job.status.is_interviewing() {
                    Span::styled(
                        format!(" {} | {}", title, job.company),
                        Style::default().add_modifier(Modifier::BOLD),
                    )
                } else {
                    Span::raw(format!(" {} | {}", title, job.company))
                },
            ]))
        })
        .collect();

    let title = match state.filter {
        Some(status) => format!(" Jobs: {} ({}) ", status.config().label, visible.len()),
        None => format!(" Jobs ({}) ", visible.len()),
    };
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, chunks[0], list_state);

    let detail_widget = Paragraph::new(build_detail(state))
        .block(Block::default().borders(Borders::ALL).title(" Detail "))
        .wrap(Wrap { trim: false })
        .scroll((state.scroll_offset, 0));
    frame.render_widget(detail_widget, chunks[1]);

    let footer = match &state.message {
        Some(message) => format!(" {}  |  {}", message, sync_line),
        None => format!(
            " j/k:move  ]/[:advance/back  a:applied i:interview o:offer x:rejected w:withdrawn  p:priority  d:delete u:undo  s:sync  q:quit  |  {}",
            sync_line
        ),
    };
    frame.render_widget(
        Paragraph::new(footer).style(Style::default().fg(Color::DarkGray)),
        rows[2],
    );
}

fn build_stats(state: &AppState) -> Paragraph<'static> {
    let stats = state.stats.borrow().clone();
    let summary = Line::from(format!(
        " Total {}   Interviewing {}   Offers {}   Response rate {}%   Applied this week {}",
        stats.total, stats.interviewing, stats.offers, stats.response_rate, stats.applied_this_week
    ));

    let mut bar: Vec<Span> = vec![Span::raw(" ")];
    for slice in chart_data(&stats) {
        let color = Color::from_str(slice.color).unwrap_or(Color::Gray);
        bar.push(Span::styled(
            format!(" {} {} ", slice.label, slice.count),
            Style::default().fg(Color::Black).bg(color),
        ));
    }

    Paragraph::new(Text::from(vec![summary, Line::from(bar)]))
        .block(Block::default().borders(Borders::ALL).title(header_title(state)))
}

fn header_title(state: &AppState) -> String {
    match state.store.profile().and_then(|p| p.full_name.as_deref()) {
        Some(name) => format!(" Pipeline: {} ", name),
        None => " Pipeline ".to_string(),
    }
}

fn build_detail<'a>(state: &'a AppState) -> Text<'a> {
    let Some(job) = state.current_job() else {
        return Text::raw("No job selected");
    };
    let config = job.status.config();

    let mut lines: Vec<Line> = Vec::new();

    lines.push(Line::from(Span::styled(
        &job.title,
        Style::default().add_modifier(Modifier::BOLD),
    )));
    lines.push(Line::from(format!("at {}", job.company)));
    if let Some(location) = &job.location {
        lines.push(Line::from(location.as_str()));
    }

    lines.push(Line::from(vec![
        Span::raw("Status: "),
        Span::styled(config.label, Style::default().fg(badge_color(config.badge_style))),
        Span::styled(
            format!("  ({})", config.description),
            Style::default().fg(Color::DarkGray),
        ),
    ]));

    let priority = priority_config(job.priority);
    lines.push(Line::from(vec![
        Span::raw("Priority: "),
        Span::styled(priority.label, Style::default().fg(badge_color(priority.badge_style))),
    ]));

    if let Some(url) = &job.url {
        lines.push(Line::from(format!("URL: {}", url)));
    }

    let currency = job.salary_currency.as_deref().unwrap_or("$");
    match (job.salary_min, job.salary_max) {
        (Some(min), Some(max)) => lines.push(Line::from(format!("Pay: {}{} - {}{}", currency, min, currency, max))),
        (Some(min), None) => lines.push(Line::from(format!("Pay: {}{}+", currency, min))),
        (None, Some(max)) => lines.push(Line::from(format!("Pay: up to {}{}", currency, max))),
        (None, None) => {}
    }

    if let Some(date) = job.applied_date {
        lines.push(Line::from(format!("Applied: {}", date)));
    }
    if let Some(contact) = &job.contact_name {
        let email = job.contact_email.as_deref().unwrap_or("");
        lines.push(Line::from(format!("Contact: {} {}", contact, email)));
    }
    if let Some(source) = &job.source {
        lines.push(Line::from(format!("Source: {}", source)));
    }
    if let Some(referral) = &job.referral {
        lines.push(Line::from(format!("Referral: {}", referral)));
    }

    if let Some(action) = &job.next_action {
        let due = job
            .next_action_date
            .map(|d| format!(" (due {})", d))
            .unwrap_or_default();
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("Next: {}{}", action, due),
            Style::default().fg(Color::Yellow),
        )));
    }

    if let Some(notes) = &job.notes {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "NOTES",
            Style::default().add_modifier(Modifier::BOLD),
        )));
        for line in textwrap::fill(notes, 70).lines() {
            lines.push(Line::from(format!("  {}", line)));
        }
    }

    if !state.notes.is_empty() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("JOURNAL ({})", state.notes.len()),
            Style::default().add_modifier(Modifier::BOLD),
        )));
        for note in &state.notes {
            lines.push(Line::from(Span::styled(
                format!("  [{}] {}", note.kind.as_str(), note.created_at.format("%Y-%m-%d")),
                Style::default().fg(Color::Cyan),
            )));
            for line in textwrap::fill(&note.content, 66).lines() {
                lines.push(Line::from(format!("    {}", line)));
            }
        }
    }

    Text::from(lines)
}
