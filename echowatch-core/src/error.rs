use thiserror::Error;

use crate::client::ClientError;
use crate::report::FormatterError;

#[derive(Error, Debug)]
pub enum EchowatchError {
    #[error("Scan API error: {0}")]
    Client(#[from] ClientError),

    #[error("Formatter error: {0}")]
    Formatter(#[from] FormatterError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
