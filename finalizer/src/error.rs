use std::fmt::Formatter;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    Config(String),
    InvalidKey(String),
    CheckChainErr { expected: u64, actual: u64 },
    Contract(String),
    Reverted(String),
    AlreadyCommitted(String),
    TxInternalErr(InternalError),
    Io(std::io::Error),
    Db(redis::RedisError),
    Unknown(String),
}

#[derive(Debug)]
pub enum InternalError {
    InvalidNonce(String),
    Other(String),
}

impl Error {
    /// Sort raw RPC / contract error text into a variant.
    pub fn from_chain(err_str: String) -> Self {
        let lower = err_str.to_lowercase();
        if lower.contains("already committed")
            || lower.contains("commitment exists")
            || lower.contains("already has commitment")
        {
            Error::AlreadyCommitted(err_str)
        } else if lower.contains("nonce too low") || lower.contains("invalid nonce") {
            Error::TxInternalErr(InternalError::InvalidNonce(err_str))
        } else if lower.contains("replacement transaction underpriced") {
            Error::TxInternalErr(InternalError::Other(err_str))
        } else if lower.contains("revert") {
            Error::Reverted(err_str)
        } else {
            Error::Contract(err_str)
        }
    }

    /// The commit landed after the contract had already committed on its own.
    pub fn is_commit_race(&self) -> bool {
        matches!(self, Error::AlreadyCommitted(_))
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Config(e) => write!(f, "config error: {}", e),
            Error::InvalidKey(e) => write!(f, "invalid signing key: {}", e),
            Error::CheckChainErr { expected, actual } => {
                write!(f, "chain id check failed, expected {} got {}", expected, actual)
            }
            Error::Contract(e) => write!(f, "contract call failed: {}", e),
            Error::Reverted(e) => write!(f, "transaction reverted: {}", e),
            Error::AlreadyCommitted(e) => write!(f, "randomness already committed: {}", e),
            Error::TxInternalErr(e) => write!(f, "Internal Error:: {:?}", e),
            Error::Io(e) => write!(f, "Io error {:?}", e),
            Error::Db(e) => write!(f, "Database error {:?}", e),
            Error::Unknown(e) => write!(f, "a unknown error happened: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Db(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::Db(e)
    }
}

impl From<web3::Error> for Error {
    fn from(e: web3::Error) -> Self {
        Error::from_chain(e.to_string())
    }
}

impl From<web3::contract::Error> for Error {
    fn from(e: web3::contract::Error) -> Self {
        Error::from_chain(crate::utils::handle_error(e))
    }
}
