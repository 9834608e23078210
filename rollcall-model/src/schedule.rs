//! Class routine.

use crate::error::ServiceResult;
use crate::record::DomainRecord;
use crate::service::CollectionService;
use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use rollcall_types::VersionedRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// School day. Ordered from the first day of the week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Day {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Day {
    pub fn of(date: NaiveDate) -> Self {
        Self::from(date.weekday())
    }
}

impl From<Weekday> for Day {
    fn from(day: Weekday) -> Self {
        match day {
            Weekday::Mon => Self::Monday,
            Weekday::Tue => Self::Tuesday,
            Weekday::Wed => Self::Wednesday,
            Weekday::Thu => Self::Thursday,
            Weekday::Fri => Self::Friday,
            Weekday::Sat => Self::Saturday,
            Weekday::Sun => Self::Sunday,
        }
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One period in the routine of a section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSlot {
    pub section: String,
    pub day: Day,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub subject: String,
    pub teacher: String,
    #[serde(default)]
    pub room: Option<String>,
}

impl DomainRecord for ClassSlot {
    const COLLECTION: &'static str = "classes";
    const DEFAULT_TTL: Duration = Duration::from_secs(15 * 60);

    type Key = (Day, NaiveTime, String);

    fn ordering_key(&self) -> Self::Key {
        (self.day, self.start, self.section.clone())
    }

    fn validate(&self) -> Result<(), String> {
        if self.subject.trim().is_empty() {
            return Err("subject is required".into());
        }
        if self.section.trim().is_empty() {
            return Err("section is required".into());
        }
        if self.end <= self.start {
            return Err(format!(
                "period must end after it starts ({} - {})",
                self.start, self.end
            ));
        }
        Ok(())
    }
}

/// The class routine.
pub type ScheduleService = CollectionService<ClassSlot>;

impl CollectionService<ClassSlot> {
    /// Classes held on `day`, earliest first.
    pub async fn by_day(&self, day: Day) -> ServiceResult<Vec<VersionedRecord<ClassSlot>>> {
        self.filter(|slot| slot.day == day).await
    }

    /// One section's classes on `day`.
    pub async fn routine(
        &self,
        section: &str,
        day: Day,
    ) -> ServiceResult<Vec<VersionedRecord<ClassSlot>>> {
        self.filter(|slot| slot.day == day && slot.section == section)
            .await
    }

    /// Classes a teacher takes across the week.
    pub async fn by_teacher(&self, teacher: &str) -> ServiceResult<Vec<VersionedRecord<ClassSlot>>> {
        self.filter(|slot| slot.teacher == teacher).await
    }
}
