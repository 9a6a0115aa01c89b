pub mod auth;
pub mod calendar;
pub mod events;
pub mod init;
pub mod mailer;
pub mod recurrence;
pub mod reminders;
