//! Notice board.

use crate::error::ServiceResult;
use crate::record::DomainRecord;
use crate::service::CollectionService;
use chrono::{DateTime, Utc};
use rollcall_types::VersionedRecord;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub posted_at: DateTime<Utc>,
    #[serde(default)]
    pub pinned: bool,
    /// Hidden from the board after this instant.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Notice {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            posted_at: Utc::now(),
            pinned: false,
            expires_at: None,
        }
    }

    pub fn is_current_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

impl DomainRecord for Notice {
    const COLLECTION: &'static str = "notices";
    // Changes often.
    const DEFAULT_TTL: Duration = Duration::from_secs(30);

    /// Pinned first, then newest first.
    type Key = (Reverse<bool>, Reverse<DateTime<Utc>>);

    fn ordering_key(&self) -> Self::Key {
        (Reverse(self.pinned), Reverse(self.posted_at))
    }

    fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title is required".into());
        }
        if let Some(expires_at) = self.expires_at {
            if expires_at <= self.posted_at {
                return Err("notice expires before it is posted".into());
            }
        }
        Ok(())
    }
}

pub type NoticeService = CollectionService<Notice>;

impl CollectionService<Notice> {
    pub async fn pinned(&self) -> ServiceResult<Vec<VersionedRecord<Notice>>> {
        self.filter(|n| n.pinned).await
    }

    /// Notices that have not expired yet.
    pub async fn current(&self) -> ServiceResult<Vec<VersionedRecord<Notice>>> {
        let now = Utc::now();
        self.filter(|n| n.is_current_at(now)).await
    }
}
