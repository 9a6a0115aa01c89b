pub mod event;
pub mod event_exception;
pub mod notification;
pub mod user;

pub use event::EventRepository;
pub use event_exception::EventExceptionRepository;
pub use notification::NotificationRepository;
pub use user::UserRepository;
