use std::time::Duration;

use serde_json::Value;
use tokio::{sync::watch, time::timeout};

use crate::{
    kuma::{
        error::KumaError,
        types::{
            LoginRequest, LoginResponse, Monitor, Notification, NotificationDraft,
            interpret_add_notification, interpret_login, parse_monitor_list,
            parse_notification_list,
        },
    },
    recorder::{CacheVersions, EventRecorder},
    socketio::{CallOutcome, SocketClient},
};

pub const LOGIN_EVENT: &str = "login";
pub const ADD_NOTIFICATION_EVENT: &str = "addNotification";
pub const GET_NOTIFICATION_LIST_EVENT: &str = "getNotificationList";
pub const GET_MONITOR_LIST_EVENT: &str = "getMonitorList";

/// Typed Uptime Kuma calls over a connected client. Lists are not returned in
/// acknowledgements; the server pushes them, so reads go through the
/// recorder's cache.
pub struct KumaApi<'a> {
    client: &'a SocketClient,
    recorder: &'a EventRecorder,
    settle: Duration,
}

impl<'a> KumaApi<'a> {
    pub fn new(client: &'a SocketClient, recorder: &'a EventRecorder, settle: Duration) -> Self {
        Self {
            client,
            recorder,
            settle,
        }
    }

    pub async fn login(
        &self,
        request: &LoginRequest,
        window: Duration,
    ) -> Result<LoginResponse, KumaError> {
        let args = self.login_reply(request, window).await?;
        interpret_login(&args)
    }

    /// Sends `login` and returns the raw acknowledgement, accepted or not.
    pub async fn login_reply(
        &self,
        request: &LoginRequest,
        window: Duration,
    ) -> Result<Vec<Value>, KumaError> {
        let args = self.acknowledged(LOGIN_EVENT, request.to_args()?, window).await?;
        tracing::info!(
            target: "kuma",
            username = %request.username,
            accepted = args
                .first()
                .and_then(|body| body.get("ok"))
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false),
            "login_answered"
        );
        Ok(args)
    }

    pub async fn add_notification(
        &self,
        draft: &NotificationDraft,
        window: Duration,
    ) -> Result<Option<u64>, KumaError> {
        let args = self
            .acknowledged(ADD_NOTIFICATION_EVENT, draft.to_add_args()?, window)
            .await?;
        let id = interpret_add_notification(&args)?;
        tracing::info!(
            target: "kuma",
            name = %draft.name,
            kind = %draft.kind,
            notification_id = ?id,
            "notification_created"
        );
        Ok(id)
    }

    pub async fn refresh_notifications(&self) -> Result<Vec<Notification>, KumaError> {
        self.refresh(GET_NOTIFICATION_LIST_EVENT, |versions| versions.notifications)
            .await?;
        match self.recorder.notification_list() {
            Some(payload) => parse_notification_list(&payload),
            None => Ok(Vec::new()),
        }
    }

    pub async fn refresh_monitors(&self) -> Result<Vec<Monitor>, KumaError> {
        self.refresh(GET_MONITOR_LIST_EVENT, |versions| versions.monitors)
            .await?;
        match self.recorder.monitor_list() {
            Some(payload) => parse_monitor_list(&payload),
            None => Ok(Vec::new()),
        }
    }

    /// Looks `id` up in the pushed notification list without asking the
    /// server for a new one. Waits up to the settle delay for the next push
    /// when the cached list does not carry it yet.
    pub async fn notification(&self, id: u64) -> Result<Notification, KumaError> {
        let mut versions = self.recorder.subscribe();
        let seen = versions.borrow_and_update().notifications;
        if let Some(found) = self.cached_notification(id)? {
            return Ok(found);
        }

        let _ = timeout(
            self.settle,
            versions.wait_for(|current| current.notifications > seen),
        )
        .await;
        self.cached_notification(id)?
            .ok_or(KumaError::NotFound { id })
    }

    fn cached_notification(&self, id: u64) -> Result<Option<Notification>, KumaError> {
        let Some(payload) = self.recorder.notification_list() else {
            return Ok(None);
        };
        Ok(parse_notification_list(&payload)?
            .into_iter()
            .find(|notification| notification.id == id))
    }

    async fn acknowledged(
        &self,
        event: &str,
        args: Vec<Value>,
        window: Duration,
    ) -> Result<Vec<Value>, KumaError> {
        match self.client.call_within(event, args, window).await? {
            CallOutcome::Acknowledged(args) => Ok(args),
            CallOutcome::NoAcknowledgement => Err(KumaError::NoAcknowledgement {
                event: event.to_string(),
                window_ms: window.as_millis() as u64,
            }),
        }
    }

    /// Asks for a fresh push and waits until it lands or the settle delay
    /// runs out, whichever is first. A stale cache is still readable after.
    async fn refresh(
        &self,
        event: &str,
        pick: fn(&CacheVersions) -> u64,
    ) -> Result<(), KumaError> {
        let mut versions: watch::Receiver<CacheVersions> = self.recorder.subscribe();
        let seen = pick(&versions.borrow_and_update());

        self.client.emit(event, Vec::new())?;
        let fresh = timeout(self.settle, versions.wait_for(|current| pick(current) > seen))
            .await
            .map(|changed| changed.is_ok())
            .unwrap_or(false);
        if !fresh {
            tracing::debug!(
                target: "kuma",
                event = %event,
                settle_ms = self.settle.as_millis() as u64,
                "refresh_served_from_cache"
            );
        }
        Ok(())
    }
}
