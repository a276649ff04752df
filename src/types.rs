//! Core types shared by the DNS listener, the resolution engine and the codec
//!
//! These are the decoded forms of DNS messages. Only the parts this server
//! acts on are modeled: the header id/flags, the question section and `A`
//! answers.

use chrono::{DateTime, Utc};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};

/// TTL attached to every answer record (seconds)
pub const DEFAULT_RECORD_TTL: u32 = 3600;

/// Class IN
pub const CLASS_IN: u16 = 1;

/// Header flags
pub const FLAG_QR: u16 = 0x8000; // Query/Response
pub const FLAG_AA: u16 = 0x0400; // Authoritative Answer
pub const FLAG_RD: u16 = 0x0100; // Recursion Desired
pub const FLAG_RA: u16 = 0x0080; // Recursion Available

/// Response codes (low 4 bits of the flags word)
pub const RCODE_NOERROR: u16 = 0;
pub const RCODE_NXDOMAIN: u16 = 3;
pub const RCODE_MASK: u16 = 0x000F;

/// Marker written to the query log when no address was produced
pub const NEGATIVE_MARKER: &str = "NXDOMAIN";

// =============================================================================
// RECORD TYPES
// =============================================================================

/// Question type. Only `A` is ever answered; everything else is carried
/// through so it can be echoed and logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    A,
    Other(u16),
}

impl From<u16> for RecordType {
    fn from(value: u16) -> Self {
        match value {
            1 => RecordType::A,
            other => RecordType::Other(other),
        }
    }
}

impl From<RecordType> for u16 {
    fn from(value: RecordType) -> Self {
        match value {
            RecordType::A => 1,
            RecordType::Other(other) => other,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordType::A => f.write_str("A"),
            RecordType::Other(2) => f.write_str("NS"),
            RecordType::Other(5) => f.write_str("CNAME"),
            RecordType::Other(6) => f.write_str("SOA"),
            RecordType::Other(12) => f.write_str("PTR"),
            RecordType::Other(15) => f.write_str("MX"),
            RecordType::Other(16) => f.write_str("TXT"),
            RecordType::Other(28) => f.write_str("AAAA"),
            RecordType::Other(33) => f.write_str("SRV"),
            RecordType::Other(65) => f.write_str("HTTPS"),
            RecordType::Other(255) => f.write_str("ANY"),
            RecordType::Other(n) => write!(f, "TYPE{}", n),
        }
    }
}

// =============================================================================
// MESSAGES
// =============================================================================

/// A single entry of the question section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    /// Domain name as received, without the trailing root dot
    pub name: String,

    /// Requested record type
    pub qtype: RecordType,

    /// Requested class (echoed, never interpreted)
    pub qclass: u16,
}

impl Question {
    pub fn new(name: impl Into<String>, qtype: RecordType) -> Self {
        Self {
            name: name.into(),
            qtype,
            qclass: CLASS_IN,
        }
    }
}

/// A decoded inbound query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// Transaction id
    pub id: u16,

    /// Raw header flags of the request
    pub flags: u16,

    /// Question section, in wire order
    pub questions: Vec<Question>,
}

/// An `A` answer record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub name: String,
    pub ttl: u32,
    pub address: Ipv4Addr,
}

/// A response ready to be encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsResponse {
    /// Transaction id echoed from the query
    pub id: u16,

    /// Response flags, including the response code
    pub flags: u16,

    /// The single question being answered
    pub question: Question,

    /// Zero or one answer
    pub answers: Vec<Answer>,
}

impl DnsResponse {
    /// Response code carried in the flags
    pub fn rcode(&self) -> u16 {
        self.flags & RCODE_MASK
    }
}

// =============================================================================
// RESOLUTION
// =============================================================================

/// Outcome of resolving one question
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// A concrete address to return
    Answered(Ipv4Addr),

    /// Authoritative negative result
    NotFound,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Answered(addr) => write!(f, "{}", addr),
            Resolution::NotFound => f.write_str(NEGATIVE_MARKER),
        }
    }
}

/// One line of the query log
#[derive(Debug, Clone)]
pub struct QueryLog {
    pub timestamp: DateTime<Utc>,
    pub requester: SocketAddr,
    pub qtype: RecordType,
    pub name: String,
    pub resolution: Resolution,
}

impl QueryLog {
    pub fn new(requester: SocketAddr, question: &Question, resolution: Resolution) -> Self {
        Self {
            timestamp: Utc::now(),
            requester,
            qtype: question.qtype,
            name: question.name.clone(),
            resolution,
        }
    }
}

impl fmt::Display for QueryLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.timestamp.to_rfc3339(),
            self.requester,
            self.qtype,
            self.name,
            self.resolution
        )
    }
}
