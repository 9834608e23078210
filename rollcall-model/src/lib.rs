//! Typed domain services for rollcall.
//!
//! Each collection the app works with gets a record type implementing
//! [`DomainRecord`] and a [`CollectionService`] that wraps the sync core:
//! - [`ClassSlot`] / [`ScheduleService`]: the class routine, grouped by day
//! - [`Student`] / [`DirectoryService`]: the classmate directory
//! - [`Notice`] / [`NoticeService`]: the notice board
//!
//! Services never touch `version`, `lastModified` or `modifiedBy`
//! themselves; the accessor stamps them. Derived views such as "classes on
//! Monday" are filters over the cached collection listing, not separate
//! remote queries.

mod directory;
mod error;
mod notice;
mod record;
mod schedule;
mod service;

pub use directory::{DirectoryService, Student};
pub use error::{ServiceError, ServiceResult};
pub use notice::{Notice, NoticeService};
pub use record::DomainRecord;
pub use schedule::{ClassSlot, Day, ScheduleService};
pub use service::{CollectionService, TypedChange};
