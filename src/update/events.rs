//! Events decoded from the JSON streams of pull, push and load responses

use serde::Deserialize;
use std::fmt;

/// Byte counts attached to a progress event
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProgressDetail {
    #[serde(default)]
    current: Option<i64>,
    #[serde(default)]
    total: Option<i64>,
}

impl ProgressDetail {
    pub fn new(current: i64, total: i64) -> Self {
        Self {
            current: Some(current),
            total: Some(total),
        }
    }

    pub fn current(&self) -> Option<i64> {
        self.current
    }

    pub fn total(&self) -> Option<i64> {
        self.total
    }

    /// Completion in percent, `None` when the total is unknown
    pub fn percent(&self) -> Option<u8> {
        match (self.current, self.total) {
            (Some(current), Some(total)) if total > 0 => {
                let percent = (current.max(0) as f64 / total as f64) * 100.0;
                Some(percent.min(100.0) as u8)
            }
            _ => None,
        }
    }
}

/// Error reported by the daemon inside a stream
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

impl ErrorDetail {
    pub fn new(message: &str) -> Self {
        Self {
            message: Some(message.to_string()),
        }
    }

    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or("")
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Common shape of the progress events sent while transferring images
pub trait ProgressUpdateEvent {
    fn status(&self) -> Option<&str>;

    fn progress_detail(&self) -> Option<&ProgressDetail>;

    /// Pre-rendered progress bar sent by the daemon
    fn progress(&self) -> Option<&str>;
}

/// Progress event about one layer of an image
pub trait ImageProgressUpdateEvent: ProgressUpdateEvent {
    /// Layer id the event refers to
    fn id(&self) -> Option<&str>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PullImageUpdateEvent {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(rename = "progressDetail", default)]
    progress_detail: Option<ProgressDetail>,
    #[serde(default)]
    progress: Option<String>,
}

impl PullImageUpdateEvent {
    pub fn new(id: Option<&str>, status: &str, progress_detail: Option<ProgressDetail>) -> Self {
        Self {
            id: id.map(str::to_string),
            status: Some(status.to_string()),
            progress_detail,
            progress: None,
        }
    }
}

impl ProgressUpdateEvent for PullImageUpdateEvent {
    fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    fn progress_detail(&self) -> Option<&ProgressDetail> {
        self.progress_detail.as_ref()
    }

    fn progress(&self) -> Option<&str> {
        self.progress.as_deref()
    }
}

impl ImageProgressUpdateEvent for PullImageUpdateEvent {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PushImageUpdateEvent {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(rename = "progressDetail", default)]
    progress_detail: Option<ProgressDetail>,
    #[serde(default)]
    progress: Option<String>,
    #[serde(rename = "errorDetail", default)]
    error_detail: Option<ErrorDetail>,
    #[serde(default)]
    error: Option<String>,
}

impl PushImageUpdateEvent {
    pub fn new(id: Option<&str>, status: &str, error_detail: Option<ErrorDetail>) -> Self {
        Self {
            id: id.map(str::to_string),
            status: Some(status.to_string()),
            error_detail,
            ..Self::default()
        }
    }

    /// Error reported by the daemon, from `errorDetail` or the bare `error` field
    pub fn error_detail(&self) -> Option<ErrorDetail> {
        in_band_error(&self.error_detail, &self.error)
    }
}

impl ProgressUpdateEvent for PushImageUpdateEvent {
    fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    fn progress_detail(&self) -> Option<&ProgressDetail> {
        self.progress_detail.as_ref()
    }

    fn progress(&self) -> Option<&str> {
        self.progress.as_deref()
    }
}

impl ImageProgressUpdateEvent for PushImageUpdateEvent {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LoadImageUpdateEvent {
    #[serde(default)]
    stream: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(rename = "progressDetail", default)]
    progress_detail: Option<ProgressDetail>,
    #[serde(default)]
    progress: Option<String>,
    #[serde(rename = "errorDetail", default)]
    error_detail: Option<ErrorDetail>,
    #[serde(default)]
    error: Option<String>,
}

impl LoadImageUpdateEvent {
    pub fn new(stream: &str, error_detail: Option<ErrorDetail>) -> Self {
        Self {
            stream: Some(stream.to_string()),
            error_detail,
            ..Self::default()
        }
    }

    /// Free text output of the load, e.g. `Loaded image: app:latest`
    pub fn stream(&self) -> Option<&str> {
        self.stream.as_deref()
    }

    pub fn error_detail(&self) -> Option<ErrorDetail> {
        in_band_error(&self.error_detail, &self.error)
    }
}

impl ProgressUpdateEvent for LoadImageUpdateEvent {
    fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    fn progress_detail(&self) -> Option<&ProgressDetail> {
        self.progress_detail.as_ref()
    }

    fn progress(&self) -> Option<&str> {
        self.progress.as_deref()
    }
}

/// `errorDetail` wins unless its message is empty, then the bare `error` text
fn in_band_error(detail: &Option<ErrorDetail>, error: &Option<String>) -> Option<ErrorDetail> {
    let described = detail.as_ref().filter(|detail| !detail.message().is_empty());
    match (described, error) {
        (Some(detail), _) => Some(detail.clone()),
        (None, Some(error)) => Some(ErrorDetail::new(error)),
        (None, None) => detail.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_error_detail_falls_back_to_error_text() {
        let event: PushImageUpdateEvent =
            serde_json::from_str(r#"{"errorDetail":{},"error":"denied: no access"}"#).unwrap();
        assert_eq!(event.error_detail().unwrap().message(), "denied: no access");

        let event: LoadImageUpdateEvent =
            serde_json::from_str(r#"{"errorDetail":{"message":""},"error":"invalid tar header"}"#).unwrap();
        assert_eq!(event.error_detail().unwrap().message(), "invalid tar header");

        let event: PushImageUpdateEvent =
            serde_json::from_str(r#"{"errorDetail":{"message":"unauthorized"},"error":"other"}"#).unwrap();
        assert_eq!(event.error_detail().unwrap().message(), "unauthorized");
    }

    #[test]
    fn test_pull_event_fields() {
        let event: PullImageUpdateEvent = serde_json::from_str(
            r#"{"status":"Downloading","progressDetail":{"current":256,"total":1024},"progress":"[==>   ]","id":"4f4fb700ef54"}"#,
        )
        .unwrap();
        assert_eq!(event.id(), Some("4f4fb700ef54"));
        assert_eq!(event.status(), Some("Downloading"));
        assert_eq!(event.progress_detail().and_then(ProgressDetail::percent), Some(25));
        assert_eq!(event.progress(), Some("[==>   ]"));
    }

    #[test]
    fn test_empty_progress_detail() {
        let event: PullImageUpdateEvent =
            serde_json::from_str(r#"{"status":"Pull complete","progressDetail":{},"id":"abc"}"#).unwrap();
        assert_eq!(event.progress_detail(), Some(&ProgressDetail::default()));
        assert_eq!(event.progress_detail().and_then(ProgressDetail::percent), None);
    }

    #[test]
    fn test_push_error_from_either_field() {
        let event: PushImageUpdateEvent = serde_json::from_str(
            r#"{"errorDetail":{"message":"denied: requested access to the resource is denied"},"error":"denied"}"#,
        )
        .unwrap();
        assert_eq!(
            event.error_detail().unwrap().message(),
            "denied: requested access to the resource is denied"
        );

        let event: PushImageUpdateEvent = serde_json::from_str(r#"{"error":"unauthorized"}"#).unwrap();
        assert_eq!(event.error_detail().unwrap().message(), "unauthorized");

        let event: PushImageUpdateEvent = serde_json::from_str(r#"{"status":"Pushed","id":"a"}"#).unwrap();
        assert!(event.error_detail().is_none());
    }

    #[test]
    fn test_load_event_stream() {
        let event: LoadImageUpdateEvent =
            serde_json::from_str(r#"{"stream":"Loaded image: my-app:latest\n"}"#).unwrap();
        assert_eq!(event.stream(), Some("Loaded image: my-app:latest\n"));
        assert!(event.error_detail().is_none());
    }

    #[test]
    fn test_percent_is_clamped() {
        assert_eq!(ProgressDetail::new(2048, 1024).percent(), Some(100));
        assert_eq!(ProgressDetail::new(-5, 1024).percent(), Some(0));
        assert_eq!(ProgressDetail::new(5, 0).percent(), None);
    }
}
