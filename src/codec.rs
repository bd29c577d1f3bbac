//! Wire codec for the `KEY:VALUE;KEY:VALUE` header line format.
//!
//! A header is a `;`-separated sequence of `KEY:VALUE` fields. Values may
//! be empty; whitespace around keys and values is trimmed. `parse_field`
//! never fails — a missing key yields `""`.

use std::fmt;

/// Read a single field from a header line.
///
/// Returns `""` when `key` is absent, never fails.
pub fn parse_field(header: &str, key: &str) -> String {
    for field in header.split(';') {
        let mut parts = field.splitn(2, ':');
        let field_key = parts.next().unwrap_or("").trim();
        if field_key.eq_ignore_ascii_case(key) {
            return parts.next().unwrap_or("").trim().to_owned();
        }
    }
    String::new()
}

/// Encode an ordered list of `(key, value)` fields back into a header line.
pub fn encode_header(fields: &[(&str, &str)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{}:{}", k, v))
        .collect::<Vec<_>>()
        .join(";")
}

/// Append one `KEY:VALUE` field to an existing header line.
pub fn append_field(header: &str, key: &str, value: &str) -> String {
    if header.is_empty() {
        format!("{}:{}", key, value)
    } else {
        format!("{};{}:{}", header, key, value)
    }
}

/// The `OPERACION` tag, parsed out of a header line into a typed variant.
///
/// Redesigned from the implicit string-switch the source used into an
/// exhaustive match surface: adding a new operation is a compile error
/// at every `match` until handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Register { ip: String, puerto: String },
    ClientReq { user: String, address: String },
    Message,
    SendMessage { address: String },
    Disconnect { address: String },
    Unknown(String),
}

impl Operation {
    /// Classify a header line by its `OPERACION` field.
    pub fn parse(header: &str) -> Operation {
        let op = parse_field(header, "OPERACION");
        match op.to_ascii_uppercase().as_str() {
            "REGISTER" => Operation::Register {
                ip: parse_field(header, "IP"),
                puerto: parse_field(header, "PUERTO"),
            },
            "CLIENT_REQ" => Operation::ClientReq {
                user: parse_field(header, "USER"),
                address: parse_field(header, "ADDRESS"),
            },
            "MESSAGE" => Operation::Message,
            "SEND_MESSAGE" => Operation::SendMessage {
                address: parse_field(header, "ADDRESS"),
            },
            "DISCONNECT" => Operation::Disconnect {
                address: parse_field(header, "ADDRESS"),
            },
            _ => Operation::Unknown(op),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Register { .. } => write!(f, "REGISTER"),
            Operation::ClientReq { .. } => write!(f, "CLIENT_REQ"),
            Operation::Message => write!(f, "MESSAGE"),
            Operation::SendMessage { .. } => write!(f, "SEND_MESSAGE"),
            Operation::Disconnect { .. } => write!(f, "DISCONNECT"),
            Operation::Unknown(op) => write!(f, "{}", op),
        }
    }
}

// ---------------------------------------------------------------------------
// Literal error tokens returned to clients on the response line.
// ---------------------------------------------------------------------------

pub const ERR_NO_BACKENDS: &str = "ERROR;MSG:No hay backends disponibles";
pub const ERR_ALL_BACKENDS_DOWN: &str = "ERROR;MSG:Todos los backends caidos";
pub const ERR_UNKNOWN_OPERATION: &str = "ERROR;MSG:Operacion desconocida";
pub const RESEND_ERROR: &str = "OPERACION:RESEND_ERROR";
