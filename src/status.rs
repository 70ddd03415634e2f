use serde::Serialize;

use crate::models::{JobStatus, Priority};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusCategory {
    Saved,
    Active,
    Terminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BadgeStyle {
    Neutral,
    Info,
    Progress,
    Highlight,
    Success,
    Danger,
    Muted,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusConfig {
    pub label: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    pub badge_style: BadgeStyle,
    pub chart_color: &'static str,
    pub order: usize,
    pub category: StatusCategory,
}

pub const STATUS_ORDER: [JobStatus; 10] = [
    JobStatus::Saved,
    JobStatus::Applied,
    JobStatus::Screening,
    JobStatus::Interview,
    JobStatus::Technical,
    JobStatus::Final,
    JobStatus::Offer,
    JobStatus::Accepted,
    JobStatus::Rejected,
    JobStatus::Withdrawn,
];

pub const INTERVIEW_STATUSES: [JobStatus; 4] = [
    JobStatus::Screening,
    JobStatus::Interview,
    JobStatus::Technical,
    JobStatus::Final,
];

pub const TERMINAL_STATUSES: [JobStatus; 3] =
    [JobStatus::Accepted, JobStatus::Rejected, JobStatus::Withdrawn];

pub const ACTIVE_STATUSES: [JobStatus; 6] = [
    JobStatus::Applied,
    JobStatus::Screening,
    JobStatus::Interview,
    JobStatus::Technical,
    JobStatus::Final,
    JobStatus::Offer,
];

const SAVED: StatusConfig = StatusConfig {
    label: "Saved",
    description: "Bookmarked, not yet applied",
    icon: "bookmark",
    badge_style: BadgeStyle::Neutral,
    chart_color: "#94a3b8",
    order: 0,
    category: StatusCategory::Saved,
};

const APPLIED: StatusConfig = StatusConfig {
    label: "Applied",
    description: "Application submitted",
    icon: "send",
    badge_style: BadgeStyle::Info,
    chart_color: "#3b82f6",
    order: 1,
    category: StatusCategory::Active,
};

const SCREENING: StatusConfig = StatusConfig {
    label: "Screening",
    description: "Recruiter or phone screen",
    icon: "phone",
    badge_style: BadgeStyle::Progress,
    chart_color: "#06b6d4",
    order: 2,
    category: StatusCategory::Active,
};

const INTERVIEW: StatusConfig = StatusConfig {
    label: "Interview",
    description: "Interviewing with the team",
    icon: "users",
    badge_style: BadgeStyle::Progress,
    chart_color: "#8b5cf6",
    order: 3,
    category: StatusCategory::Active,
};

const TECHNICAL: StatusConfig = StatusConfig {
    label: "Technical",
    description: "Technical assessment or coding round",
    icon: "code",
    badge_style: BadgeStyle::Progress,
    chart_color: "#a855f7",
    order: 4,
    category: StatusCategory::Active,
};

const FINAL: StatusConfig = StatusConfig {
    label: "Final Round",
    description: "Final interviews",
    icon: "target",
    badge_style: BadgeStyle::Highlight,
    chart_color: "#f59e0b",
    order: 5,
    category: StatusCategory::Active,
};

const OFFER: StatusConfig = StatusConfig {
    label: "Offer",
    description: "Offer received",
    icon: "gift",
    badge_style: BadgeStyle::Success,
    chart_color: "#22c55e",
    order: 6,
    category: StatusCategory::Active,
};

const ACCEPTED: StatusConfig = StatusConfig {
    label: "Accepted",
    description: "Offer accepted",
    icon: "check-circle",
    badge_style: BadgeStyle::Success,
    chart_color: "#16a34a",
    order: 7,
    category: StatusCategory::Terminal,
};

const REJECTED: StatusConfig = StatusConfig {
    label: "Rejected",
    description: "Not moving forward",
    icon: "x-circle",
    badge_style: BadgeStyle::Danger,
    chart_color: "#ef4444",
    order: 8,
    category: StatusCategory::Terminal,
};

const WITHDRAWN: StatusConfig = StatusConfig {
    label: "Withdrawn",
    description: "Withdrew from the process",
    icon: "arrow-left-circle",
    badge_style: BadgeStyle::Muted,
    chart_color: "#6b7280",
    order: 9,
    category: StatusCategory::Terminal,
};

pub fn status_config(status: JobStatus) -> &'static StatusConfig {
    match status {
        JobStatus::Saved => &SAVED,
        JobStatus::Applied => &APPLIED,
        JobStatus::Screening => &SCREENING,
        JobStatus::Interview => &INTERVIEW,
        JobStatus::Technical => &TECHNICAL,
        JobStatus::Final => &FINAL,
        JobStatus::Offer => &OFFER,
        JobStatus::Accepted => &ACCEPTED,
        JobStatus::Rejected => &REJECTED,
        JobStatus::Withdrawn => &WITHDRAWN,
    }
}

pub fn status_config_for_str(value: &str) -> &'static StatusConfig {
    status_config(JobStatus::from(value))
}

impl JobStatus {
    pub fn config(&self) -> &'static StatusConfig {
        status_config(*self)
    }

    pub fn category(&self) -> StatusCategory {
        self.config().category
    }

    pub fn is_terminal(&self) -> bool {
        self.category() == StatusCategory::Terminal
    }

    pub fn is_interviewing(&self) -> bool {
        INTERVIEW_STATUSES.contains(self)
    }

    pub fn next(&self) -> Option<JobStatus> {
        STATUS_ORDER.get(self.config().order + 1).copied()
    }

    pub fn previous(&self) -> Option<JobStatus> {
        self.config()
            .order
            .checked_sub(1)
            .and_then(|i| STATUS_ORDER.get(i).copied())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PriorityConfig {
    pub label: &'static str,
    pub badge_style: BadgeStyle,
    pub order: usize,
}

pub fn priority_config(priority: Priority) -> PriorityConfig {
    match priority {
        Priority::High => PriorityConfig {
            label: priority.label(),
            badge_style: BadgeStyle::Danger,
            order: 0,
        },
        Priority::Medium => PriorityConfig {
            label: priority.label(),
            badge_style: BadgeStyle::Highlight,
            order: 1,
        },
        Priority::Low => PriorityConfig {
            label: priority.label(),
            badge_style: BadgeStyle::Neutral,
            order: 2,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_order_matches_index_and_is_unique() {
        let mut seen = HashSet::new();
        for (index, status) in STATUS_ORDER.iter().enumerate() {
            let config = status_config(*status);
            assert_eq!(config.order, index, "order mismatch for {}", status);
            assert!(seen.insert(config.order));
        }
        assert_eq!(seen.len(), 10);
    }

    #[test]
    fn test_derived_sets_match_categories() {
        for status in STATUS_ORDER {
            let category = status.category();
            assert_eq!(
                ACTIVE_STATUSES.contains(&status),
                category == StatusCategory::Active,
                "{}",
                status
            );
            assert_eq!(
                TERMINAL_STATUSES.contains(&status),
                category == StatusCategory::Terminal,
                "{}",
                status
            );
            assert_eq!(status == JobStatus::Saved, category == StatusCategory::Saved);
        }
    }

    #[test]
    fn test_sets_cover_every_status() {
        let mut union: HashSet<JobStatus> = HashSet::new();
        union.extend(INTERVIEW_STATUSES);
        union.extend(ACTIVE_STATUSES);
        union.extend(TERMINAL_STATUSES);
        union.insert(JobStatus::Saved);
        let all: HashSet<JobStatus> = STATUS_ORDER.into_iter().collect();
        assert_eq!(union, all);

        let active: HashSet<JobStatus> = ACTIVE_STATUSES.into_iter().collect();
        let interview: HashSet<JobStatus> = INTERVIEW_STATUSES.into_iter().collect();
        let overlap: HashSet<JobStatus> = active.intersection(&interview).copied().collect();
        assert_eq!(overlap, interview);

        let terminal: HashSet<JobStatus> = TERMINAL_STATUSES.into_iter().collect();
        assert!(active.is_disjoint(&terminal));
    }

    #[test]
    fn test_active_statuses_are_contiguous_from_applied_to_offer() {
        let orders: Vec<usize> = ACTIVE_STATUSES.iter().map(|s| s.config().order).collect();
        assert_eq!(orders, (1..=6).collect::<Vec<_>>());
    }

    #[test]
    fn test_unknown_string_uses_saved_entry() {
        assert_eq!(status_config_for_str("bogus").label, "Saved");
        assert_eq!(status_config_for_str("offer").label, "Offer");
    }

    #[test]
    fn test_next_and_previous_walk_pipeline() {
        assert_eq!(JobStatus::Saved.next(), Some(JobStatus::Applied));
        assert_eq!(JobStatus::Withdrawn.next(), None);
        assert_eq!(JobStatus::Saved.previous(), None);
        assert_eq!(JobStatus::Final.previous(), Some(JobStatus::Technical));
    }

    #[test]
    fn test_chart_colors_are_hex() {
        for status in STATUS_ORDER {
            let color = status.config().chart_color;
            assert!(color.starts_with('#') && color.len() == 7, "{}", color);
        }
    }
}
