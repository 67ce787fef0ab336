use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    InvalidValue(String),
    MissingTlsMaterial(String),
    UnknownCipher(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::InvalidValue(e) => write!(f, "Invalid configuration value: {}", e),
            ConfigError::MissingTlsMaterial(e) => write!(f, "TLS misconfigured: {}", e),
            ConfigError::UnknownCipher(e) => write!(f, "Unknown TLS cipher suite: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

#[derive(Debug)]
pub enum AuthError {
    Unreadable(PathBuf, std::io::Error),
    InvalidLine { line: usize, reason: String },
    DuplicateUser { line: usize, username: String },
    BackendFault(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::Unreadable(path, e) => {
                write!(f, "Unable to read credentials file {}: {}", path.display(), e)
            }
            AuthError::InvalidLine { line, reason } => {
                write!(f, "Invalid credentials entry on line {}: {}", line, reason)
            }
            AuthError::DuplicateUser { line, username } => {
                write!(f, "Duplicate user '{}' on line {}", username, line)
            }
            AuthError::BackendFault(e) => write!(f, "Credential backend fault: {}", e),
        }
    }
}

impl std::error::Error for AuthError {}

#[derive(Debug)]
pub enum FirewallError {
    BinaryNotFound(String),
    IoError(std::io::Error),
    CommandFailed {
        command: String,
        status: Option<i32>,
        stderr: String,
    },
    RemovalLimitReached {
        rule: String,
        attempts: usize,
    },
}

impl fmt::Display for FirewallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FirewallError::BinaryNotFound(bin) => {
                write!(f, "Rule management binary '{}' not found on PATH", bin)
            }
            FirewallError::IoError(e) => write!(f, "Firewall command IO error: {}", e),
            FirewallError::CommandFailed {
                command,
                status,
                stderr,
            } => match status {
                Some(code) => write!(f, "'{}' exited with {}: {}", command, code, stderr),
                None => write!(f, "'{}' terminated by signal: {}", command, stderr),
            },
            FirewallError::RemovalLimitReached { rule, attempts } => write!(
                f,
                "Rule '{}' still present after {} removal attempts",
                rule, attempts
            ),
        }
    }
}

impl std::error::Error for FirewallError {}

impl From<std::io::Error> for FirewallError {
    fn from(err: std::io::Error) -> Self {
        FirewallError::IoError(err)
    }
}

#[derive(Debug)]
pub enum StorageError {
    ReadFailed(String),
    WriteFailed(String),
    SerializationFailed(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::ReadFailed(e) => write!(f, "Storage read failed: {}", e),
            StorageError::WriteFailed(e) => write!(f, "Storage write failed: {}", e),
            StorageError::SerializationFailed(e) => {
                write!(f, "Storage serialization failed: {}", e)
            }
        }
    }
}

impl std::error::Error for StorageError {}

#[derive(Debug)]
pub enum SessionError {
    EmptyUsername,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::EmptyUsername => write!(f, "Session username must not be empty"),
        }
    }
}

impl std::error::Error for SessionError {}


#[derive(Debug)]
pub enum NetworkError {
    BindError(std::io::Error),
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::BindError(e) => write!(f, "Network bind error: {}", e),
        }
    }
}

impl std::error::Error for NetworkError {}

/// Request-level failures. None of these ever leave the connection handler.
#[derive(Debug, PartialEq, Eq)]
pub enum HttpError {
    RequestTooLarge,
    MalformedRequestLine(String),
    MissingContentLength,
    InvalidContentLength(String),
    IncompleteBody { expected: usize, received: usize },
    MalformedForm(String),
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpError::RequestTooLarge => write!(f, "Request exceeds size limit"),
            HttpError::MalformedRequestLine(l) => write!(f, "Malformed request line: {:?}", l),
            HttpError::MissingContentLength => write!(f, "Missing Content-Length header"),
            HttpError::InvalidContentLength(v) => write!(f, "Invalid Content-Length: {:?}", v),
            HttpError::IncompleteBody { expected, received } => write!(
                f,
                "Body truncated: expected {} bytes, received {}",
                expected, received
            ),
            HttpError::MalformedForm(e) => write!(f, "Malformed form body: {}", e),
        }
    }
}

impl std::error::Error for HttpError {}

#[derive(Debug)]
pub enum ControllerError {
    ConfigurationError(ConfigError),
    AuthError(AuthError),
    NetworkError(NetworkError),
    FirewallError(FirewallError),
    InitializationFailed(String),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::ConfigurationError(e) => write!(f, "Configuration error: {}", e),
            ControllerError::AuthError(e) => write!(f, "Authentication error: {}", e),
            ControllerError::NetworkError(e) => write!(f, "Network error: {}", e),
            ControllerError::FirewallError(e) => write!(f, "Firewall error: {}", e),
            ControllerError::InitializationFailed(e) => write!(f, "Initialization failed: {}", e),
        }
    }
}

impl std::error::Error for ControllerError {}

impl From<ConfigError> for ControllerError {
    fn from(err: ConfigError) -> Self {
        ControllerError::ConfigurationError(err)
    }
}

impl From<NetworkError> for ControllerError {
    fn from(err: NetworkError) -> Self {
        ControllerError::NetworkError(err)
    }
}

impl From<FirewallError> for ControllerError {
    fn from(err: FirewallError) -> Self {
        ControllerError::FirewallError(err)
    }
}

impl From<AuthError> for ControllerError {
    fn from(err: AuthError) -> Self {
        ControllerError::AuthError(err)
    }
}
