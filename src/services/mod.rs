pub mod ai;
pub mod mailer;
