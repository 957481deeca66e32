pub mod board;
pub mod clock;
pub mod config;
pub mod errors;
pub mod jokes;
pub mod market;
pub mod meetups;
pub mod schedule;

pub use board::{render_meetup_reminder, render_titles, BoardCard, BoardClient};
pub use clock::{Clock, ClockError, ClockSample, FixedClock, SystemClock};
pub use config::{AppConfig, ConfigError, FailureReply, LoadOptions, LogFormat};
pub use errors::CollaboratorError;
pub use jokes::JokeSource;
pub use market::{price_line, scheduled_digest, PriceLookup};
pub use meetups::{meetup_card_title, unwrap_link, MeetupPages};
pub use schedule::{due_window, should_fire};
