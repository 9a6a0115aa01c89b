use std::collections::HashMap;

use chrono::{Duration, NaiveDateTime};
use sqlx::SqlitePool;

use crate::db::{
    CreateNotification, Event, EventRepository, NotificationRepository, User, UserRepository,
};
use crate::error::AppResult;
use crate::services::mailer::Mailer;

/// The only delivery channel today. Part of the dedup key, so adding a
/// second channel later will not collide with already-sent email records.
pub const CHANNEL_EMAIL: &str = "email";

lazy_static::lazy_static! {
    /// Days-before-start offsets per priority. Higher priority reminds
    /// earlier and more often; priority 3 has no entry and is never mailed.
    static ref LEAD_DAYS_BY_PRIORITY: HashMap<i64, Vec<i64>> = HashMap::from([
        (2, vec![7, 2, 1]),
        (1, vec![2, 1]),
        (0, vec![1]),
    ]);
}

pub struct ReminderService;

impl ReminderService {
    /// One selector pass. For every (priority, lead) pair, finds events that
    /// start exactly `lead` days after `now` (date-only match, silenced rows
    /// excluded by the query) and mails everyone the event reaches. Records
    /// are written only after a successful send, so a failed delivery is
    /// retried on the next pass. Returns how many reminders went out.
    pub async fn run_sweep(
        pool: &SqlitePool,
        mailer: &dyn Mailer,
        now: NaiveDateTime,
    ) -> AppResult<usize> {
        let mut sent = 0usize;

        for (priority, leads) in LEAD_DAYS_BY_PRIORITY.iter() {
            for &lead in leads {
                let target_date = now.date() + Duration::days(lead);
                let events = EventRepository::find_due_on(pool, *priority, target_date).await?;

                for event in events {
                    sent += Self::remind_for_event(pool, mailer, &event, lead).await?;
                }
            }
        }

        Ok(sent)
    }

    async fn remind_for_event(
        pool: &SqlitePool,
        mailer: &dyn Mailer,
        event: &Event,
        lead_days: i64,
    ) -> AppResult<usize> {
        let recipients = Self::recipients_for(pool, event).await?;
        let mut sent = 0usize;

        for user in recipients {
            if NotificationRepository::exists(pool, user.id, event.id, lead_days, CHANNEL_EMAIL)
                .await?
            {
                continue;
            }

            let subject = format!("Upcoming event: {}", event.title);
            let message = format!(
                "Reminder: {} starts on {}",
                event.title,
                event.start_time.format("%A, %B %d at %I:%M %p"),
            );

            if let Err(e) = mailer.send(&user.email, &subject, &message).await {
                tracing::warn!(
                    "Failed to mail reminder for event {} to user {}: {}",
                    event.id,
                    user.id,
                    e
                );
                continue;
            }

            let recorded = NotificationRepository::insert_if_absent(
                pool,
                &CreateNotification {
                    user_id: user.id,
                    event_id: event.id,
                    lead_days,
                    channel: CHANNEL_EMAIL.to_string(),
                    message,
                },
            )
            .await?;
            if recorded {
                tracing::debug!(
                    "Sent {}-day reminder for event {} to user {}",
                    lead_days,
                    event.id,
                    user.id
                );
                sent += 1;
            }
        }

        Ok(sent)
    }

    /// Untagged events only reach their creator. Tagged events reach every
    /// user whose tag set intersects the event's tags (case-insensitive).
    async fn recipients_for(pool: &SqlitePool, event: &Event) -> AppResult<Vec<User>> {
        if !event.has_tags() {
            let creator = UserRepository::find_by_id(pool, event.creator_id).await?;
            return Ok(creator.into_iter().collect());
        }

        let event_tags: Vec<String> = event
            .tag_list()
            .iter()
            .map(|tag| tag.to_lowercase())
            .collect();

        let users = UserRepository::list_all(pool).await?;
        Ok(users
            .into_iter()
            .filter(|user| {
                user.tag_set()
                    .iter()
                    .any(|tag| event_tags.contains(&tag.to_lowercase()))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CreateEvent, CreateUser, Role};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct RecordingMailer {
        sent: Mutex<Vec<(String, String)>>,
    }

    impl RecordingMailer {
        fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
            }
        }

        fn deliveries(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, to: &str, _subject: &str, body: &str) -> AppResult<()> {
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), body.to_string()));
            Ok(())
        }
    }

    /// Fails the first `failures` sends, then delivers.
    struct FlakyMailer {
        calls: AtomicUsize,
        failures: usize,
    }

    #[async_trait::async_trait]
    impl Mailer for FlakyMailer {
        async fn send(&self, _to: &str, _subject: &str, _body: &str) -> AppResult<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(crate::error::AppError::Internal(anyhow::anyhow!(
                    "relay down"
                )))
            } else {
                Ok(())
            }
        }
    }

    async fn test_pool() -> SqlitePool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    async fn seed_user(pool: &SqlitePool, email: &str, role: Role, tags: Option<&str>) -> User {
        UserRepository::create(
            pool,
            CreateUser {
                email: email.to_string(),
                password_hash: "x".to_string(),
                role,
                profile_tags: tags.map(str::to_string),
            },
        )
        .await
        .unwrap()
    }

    async fn seed_event(
        pool: &SqlitePool,
        creator: &User,
        title: &str,
        priority: i64,
        tags: Option<&str>,
        start: &str,
    ) -> Event {
        let start_time = crate::validation::parse_datetime(start).unwrap();
        EventRepository::insert_occurrence(
            pool,
            &CreateEvent {
                title: title.to_string(),
                description: None,
                priority,
                tags: tags.map(str::to_string),
                start_time,
                end_time: start_time + Duration::hours(1),
                is_recurring: false,
                recurrence_group_id: None,
                creator_id: creator.id,
            },
        )
        .await
        .unwrap()
    }

    fn fixed_now() -> NaiveDateTime {
        crate::validation::parse_datetime("2026-03-01T07:00").unwrap()
    }

    #[test]
    fn lead_table_matches_priorities() {
        assert_eq!(LEAD_DAYS_BY_PRIORITY[&2], vec![7, 2, 1]);
        assert_eq!(LEAD_DAYS_BY_PRIORITY[&1], vec![2, 1]);
        assert_eq!(LEAD_DAYS_BY_PRIORITY[&0], vec![1]);
        assert!(!LEAD_DAYS_BY_PRIORITY.contains_key(&3));
    }

    #[tokio::test]
    async fn untagged_event_reminds_creator_once() {
        let pool = test_pool().await;
        let student = seed_user(&pool, "s@school.test", Role::Student, None).await;
        seed_user(&pool, "other@school.test", Role::Student, None).await;
        // Priority 0 reminds one day ahead.
        seed_event(&pool, &student, "Revision", 0, None, "2026-03-02T09:00").await;

        let mailer = RecordingMailer::new();
        let sent = ReminderService::run_sweep(&pool, &mailer, fixed_now())
            .await
            .unwrap();

        assert_eq!(sent, 1);
        let deliveries = mailer.deliveries();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].0, "s@school.test");
        assert!(deliveries[0].1.starts_with("Reminder: Revision starts on"));

        // A second sweep at the same instant is deduplicated entirely.
        let sent = ReminderService::run_sweep(&pool, &mailer, fixed_now())
            .await
            .unwrap();
        assert_eq!(sent, 0);
        assert_eq!(mailer.deliveries().len(), 1);
    }

    #[tokio::test]
    async fn tagged_event_reaches_matching_tag_sets() {
        let pool = test_pool().await;
        let teacher = seed_user(&pool, "t@school.test", Role::Teacher, None).await;
        seed_user(&pool, "chess@school.test", Role::Student, Some("chess-club")).await;
        seed_user(&pool, "plain@school.test", Role::Student, None).await;
        seed_event(
            &pool,
            &teacher,
            "Chess final",
            0,
            Some("chess-club"),
            "2026-03-02T16:00",
        )
        .await;

        let mailer = RecordingMailer::new();
        let sent = ReminderService::run_sweep(&pool, &mailer, fixed_now())
            .await
            .unwrap();

        // Only the profile-tag match; neither the creator nor the plain
        // student carries the chess-club tag.
        assert_eq!(sent, 1);
        assert_eq!(mailer.deliveries()[0].0, "chess@school.test");
    }

    #[tokio::test]
    async fn higher_priority_uses_longer_leads() {
        let pool = test_pool().await;
        let teacher = seed_user(&pool, "t@school.test", Role::Teacher, None).await;
        // 7 days out: only the priority-2 lead fires.
        seed_event(&pool, &teacher, "Exam", 2, None, "2026-03-08T09:00").await;
        // 2 days out at priority 0: no lead matches.
        seed_event(&pool, &teacher, "Minor", 0, None, "2026-03-03T09:00").await;

        let mailer = RecordingMailer::new();
        let sent = ReminderService::run_sweep(&pool, &mailer, fixed_now())
            .await
            .unwrap();

        assert_eq!(sent, 1);
        assert!(mailer.deliveries()[0].1.contains("Exam"));
    }

    #[tokio::test]
    async fn silenced_events_are_skipped() {
        let pool = test_pool().await;
        let teacher = seed_user(&pool, "t@school.test", Role::Teacher, None).await;
        let event = seed_event(&pool, &teacher, "Muted", 0, None, "2026-03-02T09:00").await;
        EventRepository::toggle_notifications(&pool, event.id)
            .await
            .unwrap();

        let mailer = RecordingMailer::new();
        let sent = ReminderService::run_sweep(&pool, &mailer, fixed_now())
            .await
            .unwrap();

        assert_eq!(sent, 0);
        assert!(mailer.deliveries().is_empty());
    }

    #[tokio::test]
    async fn failed_send_is_not_recorded_and_retries() {
        let pool = test_pool().await;
        let student = seed_user(&pool, "s@school.test", Role::Student, None).await;
        let event = seed_event(&pool, &student, "Revision", 0, None, "2026-03-02T09:00").await;

        let mailer = FlakyMailer {
            calls: AtomicUsize::new(0),
            failures: 1,
        };

        // First sweep fails to deliver; nothing is recorded.
        let sent = ReminderService::run_sweep(&pool, &mailer, fixed_now())
            .await
            .unwrap();
        assert_eq!(sent, 0);
        assert!(
            !NotificationRepository::exists(&pool, student.id, event.id, 1, CHANNEL_EMAIL)
                .await
                .unwrap()
        );

        // The next sweep retries and records.
        let sent = ReminderService::run_sweep(&pool, &mailer, fixed_now())
            .await
            .unwrap();
        assert_eq!(sent, 1);
        assert!(
            NotificationRepository::exists(&pool, student.id, event.id, 1, CHANNEL_EMAIL)
                .await
                .unwrap()
        );
    }
}
