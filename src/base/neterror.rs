use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum NetError {
    // Connection Errors
    #[error("Connection closed (TCP FIN)")]
    ConnectionClosed,
    #[error("Connection refused")]
    ConnectionRefused,
    #[error("Connection failed")]
    ConnectionFailed,
    #[error("Name not resolved")]
    NameNotResolved,
    #[error("Connection timed out")]
    ConnectionTimedOut,

    // HTTP Errors
    #[error("Invalid URL")]
    InvalidUrl,
    #[error("Disallowed URL scheme")]
    DisallowedUrlScheme,
    #[error("Invalid response")]
    InvalidResponse,
    #[error("Empty response")]
    EmptyResponse,
    #[error("HTTP body error")]
    HttpBodyError,
    #[error("Invalid UTF-8 in body")]
    InvalidUtf8,
    #[error("Invalid auth credentials")]
    InvalidAuthCredentials,
    #[error("Unexpected security library status")]
    UnexpectedSecurityLibraryStatus,

    // Digest Auth Errors
    #[error("Malformed digest challenge")]
    MalformedChallenge,
    #[error("Unsupported digest qop")]
    UnsupportedQop,
    #[error("Unsupported digest algorithm")]
    UnsupportedAlgorithm,
    #[error("Underlying transport or cnonce generator unavailable")]
    TransportUnavailable,
    #[error("Invalid auth cache configuration")]
    InvalidCacheConfig,
    #[error("Digest transport used after close")]
    TransportClosed,

    #[error("Unknown error: {0}")]
    Unknown(i32),
}

impl NetError {
    pub fn as_i32(&self) -> i32 {
        match self {
            NetError::ConnectionClosed => -100,
            NetError::ConnectionRefused => -102,
            NetError::ConnectionFailed => -104,
            NetError::NameNotResolved => -105,
            NetError::ConnectionTimedOut => -118,

            NetError::InvalidUrl => -300,
            NetError::DisallowedUrlScheme => -301,
            NetError::InvalidResponse => -320,
            NetError::EmptyResponse => -324,
            NetError::InvalidAuthCredentials => -338,
            NetError::UnexpectedSecurityLibraryStatus => -342,
            // Custom codes outside Chromium's ranges
            NetError::HttpBodyError => -1001,
            NetError::InvalidUtf8 => -1002,
            NetError::MalformedChallenge => -1100,
            NetError::UnsupportedQop => -1101,
            NetError::UnsupportedAlgorithm => -1102,
            NetError::TransportUnavailable => -1103,
            NetError::InvalidCacheConfig => -1104,
            NetError::TransportClosed => -1105,
            NetError::Unknown(code) => *code,
        }
    }

    /// Whether this error comes from digest negotiation rather than the network.
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            NetError::MalformedChallenge
                | NetError::UnsupportedQop
                | NetError::UnsupportedAlgorithm
        )
    }
}

impl From<i32> for NetError {
    fn from(code: i32) -> Self {
        match code {
            -100 => NetError::ConnectionClosed,
            -102 => NetError::ConnectionRefused,
            -104 => NetError::ConnectionFailed,
            -105 => NetError::NameNotResolved,
            -118 => NetError::ConnectionTimedOut,

            -300 => NetError::InvalidUrl,
            -301 => NetError::DisallowedUrlScheme,
            -320 => NetError::InvalidResponse,
            -324 => NetError::EmptyResponse,
            -338 => NetError::InvalidAuthCredentials,
            -342 => NetError::UnexpectedSecurityLibraryStatus,
            -1001 => NetError::HttpBodyError,
            -1002 => NetError::InvalidUtf8,
            -1100 => NetError::MalformedChallenge,
            -1101 => NetError::UnsupportedQop,
            -1102 => NetError::UnsupportedAlgorithm,
            -1103 => NetError::TransportUnavailable,
            -1104 => NetError::InvalidCacheConfig,
            -1105 => NetError::TransportClosed,
            _ => NetError::Unknown(code),
        }
    }
}
