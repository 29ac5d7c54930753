use thiserror::Error;

/// Fatal setup failures. Anything here aborts the run before the
/// collection loop starts; everything downstream is counted, not fatal.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("failed to open database: {0}")]
    Database(String),

    #[error("browser launch failed: {0}")]
    BrowserLaunch(String),

    #[error("login failed or could not be verified")]
    LoginFailed,
}
