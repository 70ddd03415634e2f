use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// unrecognised values read back as Saved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    Saved,
    Applied,
    Screening,
    Interview,
    Technical,
    Final,
    Offer,
    Accepted,
    Rejected,
    Withdrawn,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Saved => "saved",
            JobStatus::Applied => "applied",
            JobStatus::Screening => "screening",
            JobStatus::Interview => "interview",
            JobStatus::Technical => "technical",
            JobStatus::Final => "final",
            JobStatus::Offer => "offer",
            JobStatus::Accepted => "accepted",
            JobStatus::Rejected => "rejected",
            JobStatus::Withdrawn => "withdrawn",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "saved" => Some(JobStatus::Saved),
            "applied" => Some(JobStatus::Applied),
            "screening" => Some(JobStatus::Screening),
            "interview" => Some(JobStatus::Interview),
            "technical" => Some(JobStatus::Technical),
            "final" => Some(JobStatus::Final),
            "offer" => Some(JobStatus::Offer),
            "accepted" => Some(JobStatus::Accepted),
            "rejected" => Some(JobStatus::Rejected),
            "withdrawn" => Some(JobStatus::Withdrawn),
            _ => None,
        }
    }
}

impl From<&str> for JobStatus {
    fn from(value: &str) -> Self {
        JobStatus::parse(value).unwrap_or(JobStatus::Saved)
    }
}

impl From<String> for JobStatus {
    fn from(value: String) -> Self {
        JobStatus::from(value.as_str())
    }
}

impl From<JobStatus> for String {
    fn from(value: JobStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Priority::High),
            "medium" => Some(Priority::Medium),
            "low" => Some(Priority::Low),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
        }
    }
}

impl From<String> for Priority {
    fn from(value: String) -> Self {
        Priority::parse(&value).unwrap_or_default()
    }
}

impl From<Priority> for String {
    fn from(value: Priority) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    pub company: String,
    pub title: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub salary_min: Option<i64>,
    #[serde(default)]
    pub salary_max: Option<i64>,
    #[serde(default)]
    pub salary_currency: Option<String>,
    pub status: JobStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub applied_date: Option<NaiveDate>,
    #[serde(default)]
    pub contact_name: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub next_action: Option<String>,
    #[serde(default)]
    pub next_action_date: Option<NaiveDate>,
    #[serde(default)]
    pub source: Option<String>, // "linkedin", "referral", "company site", ...
    #[serde(default)]
    pub referral: Option<String>,
}

impl Job {
    pub fn new(company: &str, title: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            user_id: None,
            company: company.trim().to_string(),
            title: title.trim().to_string(),
            location: None,
            url: None,
            salary_min: None,
            salary_max: None,
            salary_currency: None,
            status: JobStatus::Saved,
            priority: Priority::Medium,
            applied_date: None,
            contact_name: None,
            contact_email: None,
            notes: None,
            next_action: None,
            next_action_date: None,
            source: None,
            referral: None,
        }
    }

    pub fn transition(&mut self, status: JobStatus, today: NaiveDate) {
        if status == JobStatus::Applied && self.applied_date.is_none() {
            self.applied_date = Some(today);
        }
        self.status = status;
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub linkedin_url: Option<String>,
    #[serde(default)]
    pub portfolio_url: Option<String>,
    #[serde(default)]
    pub target_roles: Vec<String>,
    #[serde(default)]
    pub target_locations: Vec<String>,
    #[serde(default)]
    pub salary_expectation_min: Option<i64>,
    #[serde(default)]
    pub salary_expectation_max: Option<i64>,
    #[serde(default)]
    pub remote_preference: Option<String>, // "remote", "hybrid", "onsite"
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub career_goals: Option<String>,
    #[serde(default)]
    pub ai_context: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NoteKind {
    #[default]
    General,
    Interview,
    Research,
    FollowUp,
}

impl NoteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoteKind::General => "general",
            NoteKind::Interview => "interview",
            NoteKind::Research => "research",
            NoteKind::FollowUp => "follow_up",
        }
    }
}

impl From<String> for NoteKind {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "interview" => NoteKind::Interview,
            "research" => NoteKind::Research,
            "follow_up" | "followup" => NoteKind::FollowUp,
            _ => NoteKind::General,
        }
    }
}

impl From<NoteKind> for String {
    fn from(value: NoteKind) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: Uuid,
    #[serde(default)]
    pub job_id: Option<Uuid>,
    pub kind: NoteKind,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Note {
    pub fn new(job_id: Option<Uuid>, kind: NoteKind, content: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            kind,
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: Uuid,
    #[serde(default)]
    pub job_id: Option<Uuid>,
    pub action: String, // "created", "updated", "status_changed", "deleted"
    #[serde(default)]
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Activity {
    pub fn new(job_id: Option<Uuid>, action: &str, detail: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            action: action.to_string(),
            detail,
            created_at: Utc::now(),
        }
    }
}
