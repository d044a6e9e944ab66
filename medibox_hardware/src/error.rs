use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("link not connected")]
    NotConnected,
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("no sound file for {category}/{key}")]
    SoundNotFound { category: String, key: String },
    #[error("player exited unsuccessfully: {0}")]
    Player(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
