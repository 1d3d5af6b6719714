//! Blynk wire protocol
//!
//! Every message starts with a 5-byte header: command (u8), message id
//! (u16, big endian) and length (u16, big endian). For responses the length
//! field carries the status code and no body follows. Bodies are
//! NUL-separated fields.

use crate::error::BlynkError;

/// Header size in bytes
pub const HEADER_LEN: usize = 5;

/// Status code of a successful response
pub const STATUS_OK: u16 = 200;

/// Largest body the codec accepts from the server
pub const MAX_BODY_LEN: usize = 1024;

const FIELD_SEPARATOR: u8 = 0;

/// Protocol commands used by the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Status response; no body
    Response = 0,
    /// Legacy login
    Login = 2,
    /// Keep-alive
    Ping = 6,
    /// Device info / heartbeat announcement
    Internal = 17,
    /// Widget property write (color, label)
    SetWidgetProperty = 19,
    /// Hardware command (virtual pin write)
    Hardware = 20,
    /// Hardware login with auth token
    HardwareLogin = 29,
}

impl Command {
    /// Map a raw command byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Command::Response),
            2 => Some(Command::Login),
            6 => Some(Command::Ping),
            17 => Some(Command::Internal),
            19 => Some(Command::SetWidgetProperty),
            20 => Some(Command::Hardware),
            29 => Some(Command::HardwareLogin),
            _ => None,
        }
    }
}

/// Decoded message header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Raw command byte
    pub command: u8,
    /// Message id echoed by responses
    pub msg_id: u16,
    /// Body length, or status code for responses
    pub length: u16,
}

impl Header {
    /// Decode a header from its wire bytes
    pub fn decode(bytes: [u8; HEADER_LEN]) -> Self {
        Self {
            command: bytes[0],
            msg_id: u16::from_be_bytes([bytes[1], bytes[2]]),
            length: u16::from_be_bytes([bytes[3], bytes[4]]),
        }
    }

    /// True for status responses, which carry no body
    pub fn is_response(&self) -> bool {
        self.command == Command::Response as u8
    }

    /// Number of body bytes following this header
    pub fn body_len(&self) -> usize {
        if self.is_response() {
            0
        } else {
            self.length as usize
        }
    }
}

/// A message on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Protocol command
    pub command: u8,
    /// Message id
    pub msg_id: u16,
    /// Raw body
    pub body: Vec<u8>,
}

impl Message {
    /// Build a message from NUL-separated fields
    pub fn new(command: Command, msg_id: u16, fields: &[&str]) -> Self {
        let mut body = Vec::new();
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                body.push(FIELD_SEPARATOR);
            }
            body.extend_from_slice(field.as_bytes());
        }
        Self {
            command: command as u8,
            msg_id,
            body,
        }
    }

    /// Serialize header and body
    pub fn encode(&self) -> Result<Vec<u8>, BlynkError> {
        let length = u16::try_from(self.body.len())
            .map_err(|_| BlynkError::Protocol(format!("body too long: {} bytes", self.body.len())))?;
        let mut out = Vec::with_capacity(HEADER_LEN + self.body.len());
        out.push(self.command);
        out.extend_from_slice(&self.msg_id.to_be_bytes());
        out.extend_from_slice(&length.to_be_bytes());
        out.extend_from_slice(&self.body);
        Ok(out)
    }

    /// Body split into its fields
    pub fn fields(&self) -> Vec<String> {
        if self.body.is_empty() {
            return Vec::new();
        }
        self.body
            .split(|b| *b == FIELD_SEPARATOR)
            .map(|f| String::from_utf8_lossy(f).into_owned())
            .collect()
    }
}

/// Hardware login carrying the device auth token
pub fn hardware_login(msg_id: u16, token: &str) -> Message {
    Message::new(Command::HardwareLogin, msg_id, &[token])
}

/// Heartbeat announcement sent right after login
pub fn heartbeat_announcement(msg_id: u16, heartbeat_secs: u64) -> Message {
    let heartbeat = heartbeat_secs.to_string();
    let buffer = MAX_BODY_LEN.to_string();
    Message::new(
        Command::Internal,
        msg_id,
        &[
            "ver",
            env!("CARGO_PKG_VERSION"),
            "buff-in",
            &buffer,
            "h-beat",
            &heartbeat,
            "dev",
            "rust",
        ],
    )
}

/// Keep-alive ping
pub fn ping(msg_id: u16) -> Message {
    Message::new(Command::Ping, msg_id, &[])
}

/// Status response to a server request
pub fn response(msg_id: u16, status: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN);
    out.push(Command::Response as u8);
    out.extend_from_slice(&msg_id.to_be_bytes());
    out.extend_from_slice(&status.to_be_bytes());
    out
}

/// Virtual pin write
pub fn virtual_write(msg_id: u16, pin: u8, value: &str) -> Message {
    let pin = pin.to_string();
    Message::new(Command::Hardware, msg_id, &["vw", &pin, value])
}

/// Widget property write, e.g. `color` or `label`
pub fn set_property(msg_id: u16, pin: u8, property: &str, value: &str) -> Message {
    let pin = pin.to_string();
    Message::new(Command::SetWidgetProperty, msg_id, &[&pin, property, value])
}
