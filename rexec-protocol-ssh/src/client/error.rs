#[derive(thiserror::Error, Debug)]
pub enum SshClientError {
    #[error("russh error: {0}")]
    Russh(#[from] russh::Error),
    #[error("authentication rejected for user {0}")]
    AuthenticationRejected(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
