//! Closed set of response codes. Server codes arrive inside the encrypted
//! envelope; client codes are produced locally and never sent.

use std::fmt;

const TROUBLESHOOTING: &str = "Check: 1) you are connected to the network, \
    2) the client/server configurations are correct, and \
    3) client/server system clocks are up to date. \
    If everything is correct, the data may have been tampered with by an attacker.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    Success,
    SuccessNoMessages,
    DatabaseQueryFailed,
    DatabaseNoTestRecord,
    InvalidApiAction,
    NoMessagesSent,
    MessagesInsertedMismatch,
    InvalidFromUser,
    NetworkResponseFailure,
    NetworkFetchException,
    MacNotParsable,
    InvalidMac,
    ResponseBelowMinLength,
    ResponseParseFailed,
    DecodingOrValidationFailed,
    /// A server code this client does not know
    Unspecified(u8),
}

impl ResponseCode {
    pub fn as_u8(self) -> u8 {
        match self {
            ResponseCode::Success => 0,
            ResponseCode::SuccessNoMessages => 1,
            ResponseCode::DatabaseQueryFailed => 100,
            ResponseCode::DatabaseNoTestRecord => 101,
            ResponseCode::InvalidApiAction => 102,
            ResponseCode::NoMessagesSent => 103,
            ResponseCode::MessagesInsertedMismatch => 104,
            ResponseCode::InvalidFromUser => 151,
            ResponseCode::NetworkResponseFailure => 152,
            ResponseCode::NetworkFetchException => 153,
            ResponseCode::MacNotParsable => 154,
            ResponseCode::InvalidMac => 155,
            ResponseCode::ResponseBelowMinLength => 156,
            ResponseCode::ResponseParseFailed => 157,
            ResponseCode::DecodingOrValidationFailed => 158,
            ResponseCode::Unspecified(code) => code,
        }
    }

    /// Decode a code byte read from a response. Client-only codes are not
    /// valid on the wire and decode as [`ResponseCode::Unspecified`].
    pub fn from_server_byte(byte: u8) -> Self {
        match byte {
            0 => ResponseCode::Success,
            1 => ResponseCode::SuccessNoMessages,
            100 => ResponseCode::DatabaseQueryFailed,
            101 => ResponseCode::DatabaseNoTestRecord,
            102 => ResponseCode::InvalidApiAction,
            103 => ResponseCode::NoMessagesSent,
            104 => ResponseCode::MessagesInsertedMismatch,
            other => ResponseCode::Unspecified(other),
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, ResponseCode::Success | ResponseCode::SuccessNoMessages)
    }

    /// Codes raised by this client rather than reported by the relay
    pub fn is_client_code(self) -> bool {
        (151..=158).contains(&self.as_u8()) && !matches!(self, ResponseCode::Unspecified(_))
    }

    pub fn status_message(self) -> String {
        let message = match self {
            ResponseCode::Success => "Server request and response successful.",
            ResponseCode::SuccessNoMessages => {
                "Server request and response successful, no messages to receive at this time."
            }
            ResponseCode::DatabaseQueryFailed => "Database query failed, check server logs.",
            ResponseCode::DatabaseNoTestRecord => "Could not find the test record in the database.",
            ResponseCode::InvalidApiAction => "Invalid or not implemented API action.",
            ResponseCode::NoMessagesSent => "No messages were sent in the send message request.",
            ResponseCode::MessagesInsertedMismatch => {
                "The number of messages inserted in the DB did not match the number of messages \
                 that were sent in the request."
            }
            ResponseCode::InvalidFromUser => {
                "The From User was not valid in the response (something is wrong with the server \
                 or group configuration)."
            }
            ResponseCode::NetworkResponseFailure => {
                "Error occurred with the client transport operation."
            }
            ResponseCode::NetworkFetchException => {
                "An exception happened with the client transport operation."
            }
            ResponseCode::MacNotParsable => {
                "The Response MAC could not be found or parsed from the response."
            }
            ResponseCode::InvalidMac => "The MAC validation failed.",
            ResponseCode::ResponseBelowMinLength => {
                "The Response Data portion is insufficient minimum length for a valid response."
            }
            ResponseCode::ResponseParseFailed => {
                "An exception happened trying to get the Response Data without the MAC from the \
                 raw response data."
            }
            ResponseCode::DecodingOrValidationFailed => {
                "There was some exception decoding the response or when validating the response."
            }
            ResponseCode::Unspecified(code) => return format!("Unspecified error code {}.", code),
        };
        message.to_string()
    }

    /// Guidance appended to failures the user can act on
    pub fn troubleshooting(self) -> Option<&'static str> {
        if self.is_success() {
            None
        } else {
            Some(TROUBLESHOOTING)
        }
    }

    /// Status message followed by troubleshooting text when there is any
    pub fn describe(self) -> String {
        match self.troubleshooting() {
            Some(help) => format!("{} {}", self.status_message(), help),
            None => self.status_message(),
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.status_message(), self.as_u8())
    }
}
