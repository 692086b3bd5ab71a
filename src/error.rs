use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status} on page {page}: {body}")]
    Server { page: usize, status: u16, body: String },

    #[error("malformed page {page}: {reason}")]
    MalformedPage { page: usize, reason: String },

    #[error("a job is already running, please try again later")]
    Busy,

    #[error("job worker panicked: {0}")]
    WorkerPanicked(String),
}
