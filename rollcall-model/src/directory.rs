//! Classmate directory.

use crate::error::ServiceResult;
use crate::record::DomainRecord;
use crate::service::CollectionService;
use rollcall_types::VersionedRecord;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A student's directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub roll: u32,
    pub name: String,
    pub section: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub guardian: Option<String>,
}

impl DomainRecord for Student {
    const COLLECTION: &'static str = "students";
    // Near-static.
    const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

    type Key = (String, u32);

    fn ordering_key(&self) -> Self::Key {
        (self.section.clone(), self.roll)
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name is required".into());
        }
        if self.roll == 0 {
            return Err("roll numbers start at 1".into());
        }
        if let Some(email) = &self.email {
            if !email.contains('@') {
                return Err(format!("not an email address: {email}"));
            }
        }
        Ok(())
    }
}

pub type DirectoryService = CollectionService<Student>;

impl CollectionService<Student> {
    /// Students of one section, by roll.
    pub async fn by_section(&self, section: &str) -> ServiceResult<Vec<VersionedRecord<Student>>> {
        self.filter(|s| s.section == section).await
    }

    /// The student holding `roll` in `section`, if any.
    pub async fn find_by_roll(
        &self,
        section: &str,
        roll: u32,
    ) -> ServiceResult<Option<VersionedRecord<Student>>> {
        Ok(self
            .filter(|s| s.section == section && s.roll == roll)
            .await?
            .into_iter()
            .next())
    }

    /// Case-insensitive name search.
    pub async fn search(&self, query: &str) -> ServiceResult<Vec<VersionedRecord<Student>>> {
        let query = query.to_lowercase();
        self.filter(|s| s.name.to_lowercase().contains(&query)).await
    }
}
