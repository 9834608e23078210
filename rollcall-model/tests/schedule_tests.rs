use chrono::{NaiveDate, NaiveTime};
use pretty_assertions::assert_eq;
use rollcall_model::{ClassSlot, Day, DomainRecord, ScheduleService};
use rollcall_sync::transport::mock::InMemoryStore;
use rollcall_sync::{AllowAll, SyncClient, SyncConfig};
use std::sync::Arc;

fn at(hhmm: &str) -> NaiveTime {
    NaiveTime::parse_from_str(hhmm, "%H:%M").unwrap()
}

fn slot(section: &str, day: Day, start: &str, end: &str, subject: &str, teacher: &str) -> ClassSlot {
    ClassSlot {
        section: section.into(),
        day,
        start: at(start),
        end: at(end),
        subject: subject.into(),
        teacher: teacher.into(),
        room: None,
    }
}

async fn seeded() -> (Arc<InMemoryStore>, ScheduleService) {
    let store = Arc::new(InMemoryStore::new());
    let client = Arc::new(SyncClient::new(
        store.clone(),
        Arc::new(AllowAll::default()),
        SyncConfig::default(),
    ));
    let schedule = ScheduleService::new(client);
    for s in [
        slot("7A", Day::Monday, "10:00", "10:45", "English", "Ms. Rina"),
        slot("7A", Day::Monday, "08:00", "08:45", "Physics", "Mr. Hasan"),
        slot("7B", Day::Monday, "08:00", "08:45", "Math", "Mr. Hasan"),
        slot("7A", Day::Wednesday, "09:00", "09:45", "Chemistry", "Ms. Rina"),
    ] {
        schedule.create(s).await.unwrap();
    }
    (store, schedule)
}

fn subjects(records: &[rollcall_types::VersionedRecord<ClassSlot>]) -> Vec<&str> {
    records.iter().map(|r| r.data.subject.as_str()).collect()
}

#[tokio::test]
async fn by_day_filters_and_orders() {
    let (_, schedule) = seeded().await;

    let monday = schedule.by_day(Day::Monday).await.unwrap();
    assert_eq!(subjects(&monday), vec!["Physics", "Math", "English"]);

    let wednesday = schedule.by_day(Day::Wednesday).await.unwrap();
    assert_eq!(subjects(&wednesday), vec!["Chemistry"]);

    assert!(schedule.by_day(Day::Friday).await.unwrap().is_empty());
}

#[tokio::test]
async fn derived_views_share_one_listing() {
    let (store, schedule) = seeded().await;
    store.reset_calls();

    schedule.by_day(Day::Monday).await.unwrap();
    schedule.by_day(Day::Wednesday).await.unwrap();
    schedule.by_teacher("Ms. Rina").await.unwrap();
    schedule.routine("7A", Day::Monday).await.unwrap();

    assert_eq!(store.calls().fetches(), 1);
}

#[tokio::test]
async fn routine_is_per_section() {
    let (_, schedule) = seeded().await;
    let routine = schedule.routine("7A", Day::Monday).await.unwrap();
    assert_eq!(subjects(&routine), vec!["Physics", "English"]);
}

#[tokio::test]
async fn by_teacher_spans_the_week() {
    let (_, schedule) = seeded().await;
    let rina = schedule.by_teacher("Ms. Rina").await.unwrap();
    assert_eq!(subjects(&rina), vec!["English", "Chemistry"]);
}

#[test]
fn day_follows_the_calendar() {
    // 2024-09-02 was a Monday.
    let date = NaiveDate::from_ymd_opt(2024, 9, 2).unwrap();
    assert_eq!(Day::of(date), Day::Monday);
    assert_eq!(Day::of(date.succ_opt().unwrap()), Day::Tuesday);
    assert!(Day::Monday < Day::Sunday);
    assert_eq!(Day::Thursday.to_string(), "Thursday");
    assert_eq!(serde_json::to_string(&Day::Friday).unwrap(), "\"friday\"");
}

#[test]
fn validation() {
    let ok = slot("7A", Day::Monday, "08:00", "08:45", "Physics", "Mr. Hasan");
    assert!(ok.validate().is_ok());

    let mut empty = ok.clone();
    empty.subject = "  ".into();
    assert!(empty.validate().is_err());

    let mut backwards = ok.clone();
    backwards.end = at("07:00");
    assert!(backwards.validate().unwrap_err().contains("end after"));

    let mut no_section = ok;
    no_section.section.clear();
    assert!(no_section.validate().is_err());
}
