use core::fmt;
use std::net::Ipv4Addr;
use thiserror::Error;

/// Internet class, the only class this client asks for or accepts.
pub const CLASS_IN: u16 = 1;

/// Size of the fixed DNS header on the wire.
pub const HEADER_LEN: usize = 12;

/// DNS message header.
///
/// Contains fields identifying the message and counts of question,
/// answer, authority, and additional records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Transaction identifier correlating a query with its reply.
    pub id: u16,
    /// DNS header flags.
    pub flags: Flags,
    /// Number of entries in the question section.
    pub qd_count: u16,
    /// Number of resource records in the answer section.
    pub an_count: u16,
    /// Number of name server resource records in the authority section.
    pub ns_count: u16,
    /// Number of resource records in the additional section.
    pub ar_count: u16,
}

/// Bitfield flags in a DNS header.
///
/// Includes standard DNS header flags such as QR, Opcode, AA, TC, RD, RA, Z, and RCODE.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Flags {
    /// Query/Response flag: `false` = query, `true` = response.
    pub qr: bool,
    /// Operation code, 4 bits. Always 0 (standard query) for outgoing messages.
    pub opcode: u8,
    /// Authoritative Answer flag.
    pub aa: bool,
    /// Truncation flag.
    pub tc: bool,
    /// Recursion Desired flag.
    pub rd: bool,
    /// Recursion Available flag.
    pub ra: bool,
    /// Reserved, 3 bits, must be zero.
    pub z: u8,
    /// Response code, 4 bits.
    pub rcode: u8,
}

impl Flags {
    /// Packs the flags into the 16-bit header word.
    pub fn to_u16(&self) -> u16 {
        ((self.qr as u16) << 15)
            | (((self.opcode & 0x0F) as u16) << 11)
            | ((self.aa as u16) << 10)
            | ((self.tc as u16) << 9)
            | ((self.rd as u16) << 8)
            | ((self.ra as u16) << 7)
            | (((self.z & 0x07) as u16) << 4)
            | ((self.rcode & 0x0F) as u16)
    }

    /// Unpacks the 16-bit header word, using the same layout as [`Flags::to_u16`].
    pub fn from_u16(raw: u16) -> Flags {
        Flags {
            qr:     (raw & 0x8000) != 0,
            opcode: ((raw & 0x7800) >> 11) as u8,
            aa:     (raw & 0x0400) != 0,
            tc:     (raw & 0x0200) != 0,
            rd:     (raw & 0x0100) != 0,
            ra:     (raw & 0x0080) != 0,
            z:      ((raw & 0x0070) >> 4) as u8,
            rcode:  (raw & 0x000F) as u8,
        }
    }
}

/// Record types this client knows how to ask for and interpret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Type {
    A     = 0x0001,
    NS    = 0x0002,
    CNAME = 0x0005,
    MX    = 0x000F,
}

impl Type {
    pub fn from_u16(value: u16) -> Option<Type> {
        match value {
            0x0001 => Some(Type::A),
            0x0002 => Some(Type::NS),
            0x0005 => Some(Type::CNAME),
            0x000F => Some(Type::MX),
            _      => None,
        }
    }

    pub fn code(self) -> u16 {
        self as u16
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Type::A     => "A",
            Type::NS    => "NS",
            Type::CNAME => "CNAME",
            Type::MX    => "MX",
        };
        f.write_str(name)
    }
}

/// A DNS question entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    /// Domain name being queried, in presentation form (e.g. "example.com").
    pub qname: String,
    /// Raw query type.
    pub qtype: u16,
    /// Raw query class.
    pub qclass: u16,
}

/// Resource data variants.
///
/// Only the payloads of A, NS, CNAME and MX records are interpreted; every
/// other type keeps its RDLENGTH bytes opaque in `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RData {
    A(Ipv4Addr),
    NS(String),
    CNAME(String),
    MX {
        preference: u16,
        exchange:   String,
    },
    Unknown(Vec<u8>),
}

impl RData {
    /// Returns the contained IPv4 address if the record is an `A` record.
    pub fn as_a(&self) -> Option<Ipv4Addr> {
        if let RData::A(ip) = self {
            Some(*ip)
        } else {
            None
        }
    }

    /// Returns the MX preference, or `None` when the notion does not apply.
    pub fn preference(&self) -> Option<u16> {
        if let RData::MX { preference, .. } = self {
            Some(*preference)
        } else {
            None
        }
    }

    /// The record type this payload was decoded as, if any.
    pub fn kind(&self) -> Option<Type> {
        match self {
            RData::A(_)       => Some(Type::A),
            RData::NS(_)      => Some(Type::NS),
            RData::CNAME(_)   => Some(Type::CNAME),
            RData::MX { .. }  => Some(Type::MX),
            RData::Unknown(_) => None,
        }
    }
}

/// A resource record from the answer, authority, or additional section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    /// Domain name this record pertains to.
    pub name: String,
    /// Raw record type.
    pub rtype: u16,
    /// Raw record class.
    pub class: u16,
    /// Time to live, in seconds.
    pub ttl: u32,
    /// Length of the resource data on the wire.
    pub length: u16,
    /// Interpreted resource data.
    pub rdata: RData,
}

impl ResourceRecord {
    /// Builds an Internet-class record, deriving the type from the payload.
    pub fn new(name: impl Into<String>, ttl: u32, rdata: RData) -> Self {
        let rtype = rdata.kind().map(Type::code).unwrap_or(0);
        ResourceRecord {
            name: name.into(),
            rtype,
            class: CLASS_IN,
            ttl,
            length: 0,
            rdata,
        }
    }
}

/// A decoded DNS response.
///
/// Authority records are walked to keep the cursor aligned but are not kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// DNS message header.
    pub header: Header,
    /// Echoed question section.
    pub questions: Vec<Question>,
    /// Answer records of class IN, in wire order.
    pub answers: Vec<ResourceRecord>,
    /// Additional records of class IN, in wire order.
    pub additionals: Vec<ResourceRecord>,
    /// Number of records dropped because their class was not IN.
    pub discarded: usize,
}

/// Response codes carried in the low 4 bits of the flags word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    NoError,
    FormatError,
    ServerFailure,
    NameNotFound,
    NotImplemented,
    Refused,
    Other(u8),
}

impl From<u8> for ResponseCode {
    fn from(value: u8) -> Self {
        match value {
            0 => ResponseCode::NoError,
            1 => ResponseCode::FormatError,
            2 => ResponseCode::ServerFailure,
            3 => ResponseCode::NameNotFound,
            4 => ResponseCode::NotImplemented,
            5 => ResponseCode::Refused,
            v => ResponseCode::Other(v),
        }
    }
}

/// Errors surfaced by the client, from argument checks to protocol outcomes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DnsError {
    #[error("Invalid argument: {0}")]
    Argument(String),

    #[error("Maximum number of retries {attempts} exceeded")]
    MaxRetriesExceeded { attempts: u32 },

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Format error: the name server was unable to interpret the query")]
    FormatError,

    #[error("Server failure: the name server was unable to process this query")]
    ServerFailure,

    #[error("Name not found")]
    NameNotFound,

    #[error("Not implemented: the name server does not support the requested kind of query")]
    NotImplemented,

    #[error("Refused: the name server refuses to perform the requested operation")]
    Refused,

    #[error("Socket error: {0}")]
    Socket(String),
}

/// Errors that can occur while reading from or writing to a DNS buffer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DnsBufferError {
    #[error("unexpected end of buffer at offset {0}")]
    EndOfBuffer(usize),

    #[error("compression pointer at offset {at} targets {target}, which is not an earlier offset")]
    BadPointer { at: usize, target: usize },

    #[error("compression pointer loop through offset {0}")]
    PointerLoop(usize),

    #[error("label at offset {0} is not valid UTF-8")]
    InvalidString(usize),

    #[error("reserved label type 0x{0:02x}")]
    ReservedLabel(u8),

    #[error("label `{0}` is longer than 63 bytes")]
    LabelTooLong(String),

    #[error("empty label in `{0}`")]
    EmptyLabel(String),

    #[error("name is longer than 255 bytes")]
    NameTooLong,

    #[error("name starting at offset {0} is longer than 255 bytes")]
    NameOverflow(usize),
}

impl From<DnsBufferError> for DnsError {
    fn from(err: DnsBufferError) -> Self {
        match err {
            DnsBufferError::LabelTooLong(_)
            | DnsBufferError::EmptyLabel(_)
            | DnsBufferError::NameTooLong => DnsError::Argument(err.to_string()),
            _ => DnsError::MalformedMessage(err.to_string()),
        }
    }
}

/// A read-only buffer wrapper for parsing DNS messages.
///
/// Holds a byte slice and current read offset. Compression pointers are always
/// resolved against the whole message, never a sub-slice.
#[derive(Debug)]
pub struct DnsReadBuffer<'a> {
    /// Underlying message to read from.
    pub data: &'a [u8],
    /// Current read offset index into `data`.
    pub index: usize,
}

/// A write-only buffer for constructing DNS messages.
#[derive(Debug, Default)]
pub struct DnsWriteBuffer {
    /// Internal data buffer.
    pub data: Vec<u8>,
}
