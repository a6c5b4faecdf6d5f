pub mod api;
pub mod error;
pub mod types;

pub use api::KumaApi;
pub use error::KumaError;
pub use types::{
    LoginRequest, LoginResponse, Monitor, Notification, NotificationDraft, interpret_login,
    parse_monitor_list, parse_notification_list,
};
