//! Outbound notification payload construction

mod builder;

pub use builder::{ProbeNotificationBuilder, RETURN_ARGUMENT, SELF_ARGUMENT};
