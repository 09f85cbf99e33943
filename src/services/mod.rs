pub mod activity_log;
pub mod attendance;
pub mod booking;
pub mod email_auth;
pub mod mail;
pub mod message;
pub mod permission_slip;
pub mod program;
pub mod school;
pub mod session;

#[cfg(all(test, feature = "live-db-tests"))]
pub mod live_support;
