use chrono::{Datelike, Duration, Local, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::{Job, JobStatus};
use crate::status::{INTERVIEW_STATUSES, STATUS_ORDER};

// `applied` and `withdrawn` are not responses
const RESPONSE_STATUSES: [JobStatus; 7] = [
    JobStatus::Screening,
    JobStatus::Interview,
    JobStatus::Technical,
    JobStatus::Final,
    JobStatus::Offer,
    JobStatus::Accepted,
    JobStatus::Rejected,
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stats {
    pub total: usize,
    pub by_status: BTreeMap<JobStatus, usize>,
    pub interviewing: usize,
    pub offers: usize,
    pub response_rate: u32,
    pub applied_this_week: usize,
}

impl Stats {
    pub fn count(&self, status: JobStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

pub fn compute_stats(jobs: &[Job]) -> Stats {
    compute_stats_on(jobs, Local::now().date_naive())
}

pub fn compute_stats_on(jobs: &[Job], today: NaiveDate) -> Stats {
    let mut by_status: BTreeMap<JobStatus, usize> =
        STATUS_ORDER.iter().map(|status| (*status, 0)).collect();
    for job in jobs {
        *by_status.entry(job.status).or_insert(0) += 1;
    }

    let interviewing = INTERVIEW_STATUSES
        .iter()
        .map(|status| by_status[status])
        .sum();
    let offers = by_status[&JobStatus::Offer] + by_status[&JobStatus::Accepted];

    let submitted = jobs.iter().filter(|j| j.status != JobStatus::Saved).count();
    let responded = jobs
        .iter()
        .filter(|j| RESPONSE_STATUSES.contains(&j.status))
        .count();
    let response_rate = if submitted == 0 {
        0
    } else {
        (responded as f64 / submitted as f64 * 100.0).round() as u32
    };

    let (week_start, week_end) = week_bounds(today);
    let applied_this_week = jobs
        .iter()
        .filter_map(|j| j.applied_date)
        .filter(|date| *date >= week_start && *date <= week_end)
        .count();

    Stats {
        total: jobs.len(),
        by_status,
        interviewing,
        offers,
        response_rate,
        applied_this_week,
    }
}

pub fn week_bounds(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = today - Duration::days(today.weekday().num_days_from_monday() as i64);
    (start, start + Duration::days(6))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSlice {
    pub status: JobStatus,
    pub label: &'static str,
    pub count: usize,
    pub color: &'static str,
}

pub fn chart_data(stats: &Stats) -> Vec<ChartSlice> {
    STATUS_ORDER
        .iter()
        .filter_map(|status| {
            let count = stats.count(*status);
            (count > 0).then(|| ChartSlice {
                status: *status,
                label: status.config().label,
                count,
                color: status.config().chart_color,
            })
        })
        .collect()
}

pub fn upcoming_actions(jobs: &[Job], today: NaiveDate, days: i64) -> Vec<&Job> {
    let horizon = today + Duration::days(days);
    let mut due: Vec<&Job> = jobs
        .iter()
        .filter(|j| !j.status.is_terminal())
        .filter(|j| {
            j.next_action_date
                .is_some_and(|date| date >= today && date <= horizon)
        })
        .collect();
    due.sort_by_key(|j| j.next_action_date);
    due
}

pub fn overdue_actions(jobs: &[Job], today: NaiveDate) -> Vec<&Job> {
    let mut overdue: Vec<&Job> = jobs
        .iter()
        .filter(|j| !j.status.is_terminal())
        .filter(|j| j.next_action_date.is_some_and(|date| date < today))
        .collect();
    overdue.sort_by_key(|j| j.next_action_date);
    overdue
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_with(status: JobStatus) -> Job {
        let mut job = Job::new("Acme", "Engineer");
        job.status = status;
        job
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_empty_list_is_all_zero() {
        let stats = compute_stats(&[]);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.by_status.len(), 10);
        assert!(stats.by_status.values().all(|count| *count == 0));
        assert_eq!(stats.interviewing, 0);
        assert_eq!(stats.offers, 0);
        assert_eq!(stats.response_rate, 0);
        assert_eq!(stats.applied_this_week, 0);
    }

    #[test]
    fn test_mixed_pipeline() {
        let jobs: Vec<Job> = [
            JobStatus::Saved,
            JobStatus::Applied,
            JobStatus::Applied,
            JobStatus::Interview,
            JobStatus::Offer,
            JobStatus::Rejected,
        ]
        .into_iter()
        .map(job_with)
        .collect();

        let stats = compute_stats(&jobs);
        assert_eq!(stats.total, 6);
        assert_eq!(stats.count(JobStatus::Applied), 2);
        assert_eq!(stats.interviewing, 1);
        assert_eq!(stats.offers, 1);
        assert_eq!(stats.response_rate, 60);
    }

    #[test]
    fn test_withdrawn_and_applied_do_not_count_as_responses() {
        let jobs: Vec<Job> = [JobStatus::Applied, JobStatus::Withdrawn, JobStatus::Screening]
            .into_iter()
            .map(job_with)
            .collect();
        // 1 of 3 submitted
        assert_eq!(compute_stats(&jobs).response_rate, 33);
    }

    #[test]
    fn test_only_saved_jobs_give_zero_rate() {
        let jobs = vec![job_with(JobStatus::Saved), job_with(JobStatus::Saved)];
        assert_eq!(compute_stats(&jobs).response_rate, 0);
    }

    #[test]
    fn test_rate_rounds_half_up() {
        // 1 of 8 is 12.5%
        let mut jobs = vec![job_with(JobStatus::Offer)];
        jobs.extend((0..7).map(|_| job_with(JobStatus::Applied)));
        assert_eq!(compute_stats(&jobs).response_rate, 13);
    }

    #[test]
    fn test_offers_include_accepted() {
        let jobs = vec![job_with(JobStatus::Offer), job_with(JobStatus::Accepted)];
        assert_eq!(compute_stats(&jobs).offers, 2);
    }

    #[test]
    fn test_week_bounds_start_on_monday() {
        // 2026-10-16 is a Friday
        let (start, end) = week_bounds(date(2026, 10, 16));
        assert_eq!(start, date(2026, 10, 12));
        assert_eq!(end, date(2026, 10, 18));

        let (start, _) = week_bounds(date(2026, 10, 12));
        assert_eq!(start, date(2026, 10, 12));
        let (start, _) = week_bounds(date(2026, 10, 18));
        assert_eq!(start, date(2026, 10, 12));
    }

    #[test]
    fn test_applied_this_week_window() {
        let today = date(2026, 10, 16);
        let mut this_week = job_with(JobStatus::Applied);
        this_week.applied_date = Some(date(2026, 10, 12));
        let mut eight_days_ago = job_with(JobStatus::Applied);
        eight_days_ago.applied_date = Some(today - Duration::days(8));
        let mut sunday = job_with(JobStatus::Interview);
        sunday.applied_date = Some(date(2026, 10, 18));
        let never_applied = job_with(JobStatus::Saved);

        let stats = compute_stats_on(&[this_week, eight_days_ago, sunday, never_applied], today);
        assert_eq!(stats.applied_this_week, 2);
    }

    #[test]
    fn test_eight_days_ago_excluded_against_wall_clock() {
        let mut job = job_with(JobStatus::Applied);
        job.applied_date = Some(Local::now().date_naive() - Duration::days(8));
        assert_eq!(compute_stats(&[job]).applied_this_week, 0);
    }

    #[test]
    fn test_chart_data_skips_empty_statuses() {
        let jobs = vec![job_with(JobStatus::Rejected), job_with(JobStatus::Saved)];
        let slices = chart_data(&compute_stats(&jobs));
        let statuses: Vec<JobStatus> = slices.iter().map(|s| s.status).collect();
        assert_eq!(statuses, vec![JobStatus::Saved, JobStatus::Rejected]);
        assert_eq!(slices[1].color, "#ef4444");
    }

    #[test]
    fn test_upcoming_and_overdue_actions() {
        let today = date(2026, 10, 16);
        let mut soon = job_with(JobStatus::Interview);
        soon.next_action_date = Some(date(2026, 10, 18));
        let mut later = job_with(JobStatus::Applied);
        later.next_action_date = Some(date(2026, 11, 30));
        let mut late = job_with(JobStatus::Screening);
        late.next_action_date = Some(date(2026, 10, 10));
        let mut closed = job_with(JobStatus::Rejected);
        closed.next_action_date = Some(date(2026, 10, 17));

        let jobs = vec![soon.clone(), later, late.clone(), closed];
        let upcoming = upcoming_actions(&jobs, today, 7);
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].id, soon.id);

        let overdue = overdue_actions(&jobs, today);
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].id, late.id);
    }
}
