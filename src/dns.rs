use crate::buffer::encode_name;
use crate::types::{
    DnsError,
    DnsReadBuffer,
    DnsWriteBuffer,
    Flags,
    Header,
    HEADER_LEN,
    Question,
    RData,
    ResourceRecord,
    Response,
    Type,
    CLASS_IN,
};
use random::Source;
use std::net::Ipv4Addr;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Draws a transaction id from the given entropy source.
pub fn transaction_id<S: Source>(source: &mut S) -> u16 {
    (source.read_u64() >> 48) as u16
}

/// Entropy source seeded from the wall clock and the process id.
pub fn entropy() -> random::Default {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    random::default(nanos ^ ((std::process::id() as u64) << 32))
}

/// An outgoing standard query: one question, recursion desired.
///
/// The name is validated on construction, so a built `Query` always encodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub header:   Header,
    pub question: Question,
}

impl Query {
    /// Builds a query for `domain`/`qtype` in the Internet class.
    ///
    /// # Errors
    /// `DnsError::Argument` if the domain is empty, has an empty label, a label
    /// longer than 63 bytes, or encodes to more than 255 bytes.
    pub fn new(domain: &str, qtype: Type, id: u16) -> Result<Query, DnsError> {
        encode_name(domain)?;

        let qname = domain.strip_suffix('.').unwrap_or(domain).to_string();
        Ok(Query {
            header: Header {
                id,
                flags: Flags { rd: true, ..Flags::default() },
                qd_count: 1,
                an_count: 0,
                ns_count: 0,
                ar_count: 0,
            },
            question: Question {
                qname,
                qtype:  qtype.code(),
                qclass: CLASS_IN,
            },
        })
    }

    /// Builds a query with an id drawn from `source`.
    pub fn with_source<S: Source>(domain: &str, qtype: Type, source: &mut S) -> Result<Query, DnsError> {
        Self::new(domain, qtype, transaction_id(source))
    }

    pub fn id(&self) -> u16 {
        self.header.id
    }

    /// Encodes header plus question. No name compression is produced.
    pub fn encode(&self) -> Result<Vec<u8>, DnsError> {
        let mut buffer = DnsWriteBuffer::new();
        encode_header(&mut buffer, &self.header);
        encode_question(&mut buffer, &self.question)?;
        Ok(buffer.into_inner())
    }
}

/// A complete message with all four sections, as laid out on the wire.
///
/// Section counts in the encoded header come from the vectors, not from
/// `header`. Useful for building replies (e.g. for a loopback responder).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header:      Header,
    pub questions:   Vec<Question>,
    pub answers:     Vec<ResourceRecord>,
    pub authorities: Vec<ResourceRecord>,
    pub additionals: Vec<ResourceRecord>,
}

impl Message {
    /// An empty successful reply echoing the query's id and question.
    pub fn response_to(query: &Query) -> Message {
        let flags = Flags {
            qr: true,
            rd: query.header.flags.rd,
            ra: true,
            ..Flags::default()
        };

        Message {
            header: Header { flags, ..query.header.clone() },
            questions:   vec![query.question.clone()],
            answers:     Vec::new(),
            authorities: Vec::new(),
            additionals: Vec::new(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, DnsError> {
        let header = Header {
            qd_count: section_count("question", self.questions.len())?,
            an_count: section_count("answer", self.answers.len())?,
            ns_count: section_count("authority", self.authorities.len())?,
            ar_count: section_count("additional", self.additionals.len())?,
            ..self.header.clone()
        };

        let mut buffer = DnsWriteBuffer::new();
        encode_header(&mut buffer, &header);
        for q in &self.questions {
            encode_question(&mut buffer, q)?;
        }
        for record in self.answers.iter().chain(&self.authorities).chain(&self.additionals) {
            encode_record(&mut buffer, record)?;
        }
        Ok(buffer.into_inner())
    }
}

fn section_count(section: &str, len: usize) -> Result<u16, DnsError> {
    u16::try_from(len)
        .map_err(|_| DnsError::Argument(format!("{len} {section} entries do not fit a 16-bit count")))
}

fn encode_header(buffer: &mut DnsWriteBuffer, header: &Header) {
    buffer.write_u16(header.id);
    buffer.write_u16(header.flags.to_u16());
    buffer.write_u16(header.qd_count);
    buffer.write_u16(header.an_count);
    buffer.write_u16(header.ns_count);
    buffer.write_u16(header.ar_count);
}

fn encode_question(buffer: &mut DnsWriteBuffer, question: &Question) -> Result<(), DnsError> {
    buffer.write_str(&question.qname)?;
    buffer.write_u16(question.qtype);
    buffer.write_u16(question.qclass);
    Ok(())
}

fn encode_record(buffer: &mut DnsWriteBuffer, record: &ResourceRecord) -> Result<(), DnsError> {
    buffer.write_str(&record.name)?;
    buffer.write_u16(record.rtype);
    buffer.write_u16(record.class);
    buffer.write_u32(record.ttl);

    // RDLENGTH is back-filled once the payload is written.
    let length_at = buffer.len();
    buffer.write_u16(0);
    let start = buffer.len();

    match &record.rdata {
        RData::A(ipv4) => buffer.write_bytes(&ipv4.octets()),
        RData::NS(name) | RData::CNAME(name) => buffer.write_str(name)?,
        RData::MX { preference, exchange } => {
            buffer.write_u16(*preference);
            buffer.write_str(exchange)?;
        }
        RData::Unknown(raw) => buffer.write_bytes(raw),
    }

    let written = buffer.len() - start;
    let length = u16::try_from(written)
        .map_err(|_| DnsError::Argument(format!("record data of {written} bytes does not fit RDLENGTH")))?;
    buffer.patch_u16(length_at, length);
    Ok(())
}

/// Outcome of reading one resource record.
enum Decoded {
    Kept(ResourceRecord),
    /// Class was not IN; payload consumed but not interpreted.
    Discarded,
}

impl Response {
    /// Decodes a full response, strictly left to right.
    ///
    /// Authority records are read only to advance the cursor. Records of a
    /// class other than IN are dropped and counted in `discarded`.
    pub fn decode(bytes: &[u8]) -> Result<Response, DnsError> {
        if bytes.len() < HEADER_LEN {
            return Err(DnsError::MalformedMessage(format!(
                "message is {} bytes, shorter than the {HEADER_LEN}-byte header",
                bytes.len()
            )));
        }

        let mut buf = DnsReadBuffer::new(bytes);
        let header = decode_header(&mut buf)?;

        let mut questions = Vec::with_capacity(header.qd_count as usize);
        for _ in 0..header.qd_count {
            let qname  = buf.read_str()?;
            let qtype  = buf.read_u16()?;
            let qclass = buf.read_u16()?;
            questions.push(Question { qname, qtype, qclass });
        }

        let mut discarded = 0;
        let answers = decode_section(&mut buf, header.an_count, "answer", &mut discarded)?;
        decode_section(&mut buf, header.ns_count, "authority", &mut discarded)?;
        let additionals = decode_section(&mut buf, header.ar_count, "additional", &mut discarded)?;

        if buf.remaining() > 0 {
            debug!(trailing = buf.remaining(), "ignoring bytes after the last record");
        }

        Ok(Response {
            header,
            questions,
            answers,
            additionals,
            discarded,
        })
    }
}

fn decode_header(buf: &mut DnsReadBuffer) -> Result<Header, DnsError> {
    let id        = buf.read_u16()?;
    let flags_raw = buf.read_u16()?;
    let qd_count  = buf.read_u16()?;
    let an_count  = buf.read_u16()?;
    let ns_count  = buf.read_u16()?;
    let ar_count  = buf.read_u16()?;

    Ok(Header {
        id,
        flags: Flags::from_u16(flags_raw),
        qd_count,
        an_count,
        ns_count,
        ar_count,
    })
}

fn decode_section(
    buf:       &mut DnsReadBuffer,
    count:     u16,
    section:   &'static str,
    discarded: &mut usize,
) -> Result<Vec<ResourceRecord>, DnsError> {
    let mut records = Vec::with_capacity(count as usize);
    for _ in 0..count {
        match decode_record(buf)? {
            Decoded::Kept(record) => records.push(record),
            Decoded::Discarded    => {
                *discarded += 1;
                warn!(section, "dropped record whose class is not IN");
            }
        }
    }
    Ok(records)
}

fn decode_record(buf: &mut DnsReadBuffer) -> Result<Decoded, DnsError> {
    let name   = buf.read_str()?;
    let rtype  = buf.read_u16()?;
    let class  = buf.read_u16()?;
    let ttl    = buf.read_u32()?;
    let length = buf.read_u16()?;

    let start = buf.get_index();
    let raw   = buf.read_n_bytes(length as usize)?;
    let end   = buf.get_index();

    if class != CLASS_IN {
        debug!(%name, rtype, class, "record class is not IN");
        return Ok(Decoded::Discarded);
    }

    let rdata = decode_rdata(buf.data, start, end, rtype, raw)?;
    Ok(Decoded::Kept(ResourceRecord { name, rtype, class, ttl, length, rdata }))
}

/// Interprets the payload in `data[start..end]`.
///
/// Names are read against the whole message so compression pointers resolve.
/// The caller's cursor is already at `end` whatever happens here.
fn decode_rdata(
    data:  &[u8],
    start: usize,
    end:   usize,
    rtype: u16,
    raw:   &[u8],
) -> Result<RData, DnsError> {
    let mut rd = DnsReadBuffer::new(data);
    rd.set_index(start)?;

    let rdata = match Type::from_u16(rtype) {
        Some(Type::A) => {
            let octets: [u8; 4] = raw.try_into().map_err(|_| {
                DnsError::MalformedMessage(format!("A record with RDLENGTH {}", raw.len()))
            })?;
            RData::A(Ipv4Addr::from(octets))
        }
        Some(Type::NS)    => RData::NS(rd.read_str()?),
        Some(Type::CNAME) => RData::CNAME(rd.read_str()?),
        Some(Type::MX) => {
            let preference = rd.read_u16()?;
            let exchange   = rd.read_str()?;
            RData::MX { preference, exchange }
        }
        None => RData::Unknown(raw.to_vec()),
    };

    if rd.get_index() > end {
        return Err(DnsError::MalformedMessage(format!(
            "record data of type {rtype} overruns its RDLENGTH of {}",
            end - start
        )));
    }
    Ok(rdata)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(u64);

    impl Source for Fixed {
        fn read_u64(&mut self) -> u64 {
            self.0
        }
    }

    fn example_a_query() -> Query {
        Query::new("example.com", Type::A, 0xBEEF).unwrap()
    }

    #[test]
    fn query_wire_layout() {
        let bytes = example_a_query().encode().unwrap();
        assert_eq!(&bytes[..12], &[0xBE, 0xEF, 0x01, 0x00, 0, 1, 0, 0, 0, 0, 0, 0]);
        assert_eq!(
            &bytes[12..],
            &[7, b'e', b'x', b'a', b'm', b'p', b'l', b'e', 3, b'c', b'o', b'm', 0, 0, 1, 0, 1]
        );
    }

    #[test]
    fn query_header_invariants() {
        let query = Query::new("example.com.", Type::MX, 1).unwrap();
        let flags = &query.header.flags;
        assert!(!flags.qr);
        assert_eq!(flags.opcode, 0);
        assert!(flags.rd);
        assert_eq!(query.header.qd_count, 1);
        assert_eq!(query.question.qname, "example.com");
        assert_eq!(query.question.qtype, 0x000F);
        assert_eq!(query.question.qclass, CLASS_IN);
    }

    #[test]
    fn query_rejects_malformed_domain() {
        assert!(matches!(Query::new("", Type::A, 1), Err(DnsError::Argument(_))));
        assert!(matches!(Query::new("a..com", Type::A, 1), Err(DnsError::Argument(_))));
        let long_label = format!("{}.com", "y".repeat(64));
        assert!(matches!(Query::new(&long_label, Type::NS, 1), Err(DnsError::Argument(_))));
    }

    #[test]
    fn transaction_id_from_injected_source() {
        let mut source = Fixed(0xABCD_0000_0000_0000);
        assert_eq!(transaction_id(&mut source), 0xABCD);
        let query = Query::with_source("example.com", Type::A, &mut source).unwrap();
        assert_eq!(query.id(), 0xABCD);
    }

    #[test]
    fn seeded_sources_repeat() {
        let mut a = random::default(42);
        let mut b = random::default(42);
        assert_eq!(transaction_id(&mut a), transaction_id(&mut b));
    }

    #[test]
    fn query_round_trips_through_question_decoding() {
        for (domain, qtype) in [("example.com", Type::A), ("mcgill.ca", Type::MX), ("a.b.c.d", Type::NS)] {
            let bytes = Query::new(domain, qtype, 7).unwrap().encode().unwrap();
            let decoded = Response::decode(&bytes).unwrap();
            assert_eq!(decoded.questions.len(), 1);
            assert_eq!(decoded.questions[0].qname, domain);
            assert_eq!(Type::from_u16(decoded.questions[0].qtype), Some(qtype));
        }
    }

    #[test]
    fn short_header_is_malformed() {
        assert!(matches!(Response::decode(&[0u8; 11]), Err(DnsError::MalformedMessage(_))));
    }

    #[test]
    fn concrete_a_answer() {
        let query = example_a_query();
        let mut reply = Message::response_to(&query);
        reply.answers.push(ResourceRecord::new("example.com", 3600, RData::A(Ipv4Addr::new(93, 184, 216, 34))));

        let response = Response::decode(&reply.encode().unwrap()).unwrap();
        assert_eq!(response.header.id, 0xBEEF);
        assert!(response.header.flags.qr);
        assert!(response.header.flags.ra);
        assert_eq!(response.header.flags.rcode, 0);

        let answer = &response.answers[0];
        assert_eq!(answer.rtype, 1);
        assert_eq!(answer.ttl, 3600);
        assert_eq!(answer.length, 4);
        assert_eq!(answer.rdata.as_a(), Some(Ipv4Addr::new(93, 184, 216, 34)));
    }

    #[test]
    fn multi_record_sections_stay_aligned() {
        let query = Query::new("example.com", Type::MX, 9).unwrap();
        let mut reply = Message::response_to(&query);
        reply.answers = vec![
            ResourceRecord::new("example.com", 300, RData::MX { preference: 10, exchange: "mail.example.com".into() }),
            ResourceRecord { rtype: 28, ..ResourceRecord::new("example.com", 60, RData::Unknown(vec![0x20; 16])) },
            ResourceRecord::new("www.example.com", 120, RData::CNAME("example.com".into())),
        ];
        reply.authorities = vec![
            ResourceRecord::new("example.com", 86400, RData::NS("ns1.example.com".into())),
            ResourceRecord { rtype: 6, ..ResourceRecord::new("example.com", 900, RData::Unknown(vec![1, 2, 3, 4, 5])) },
        ];
        reply.additionals = vec![
            ResourceRecord::new("mail.example.com", 300, RData::A(Ipv4Addr::new(10, 0, 0, 1))),
        ];

        let response = Response::decode(&reply.encode().unwrap()).unwrap();
        assert_eq!(response.header.an_count, 3);
        assert_eq!(response.header.ns_count, 2);
        assert_eq!(response.answers.len(), 3);
        assert_eq!(response.answers[0].rdata, reply.answers[0].rdata);
        assert_eq!(response.answers[1].rdata, RData::Unknown(vec![0x20; 16]));
        assert_eq!(response.answers[2].rdata, RData::CNAME("example.com".into()));
        assert_eq!(response.additionals.len(), 1);
        assert_eq!(response.additionals[0].name, "mail.example.com");
        assert_eq!(response.additionals[0].rdata.as_a(), Some(Ipv4Addr::new(10, 0, 0, 1)));
    }

    #[test]
    fn decoding_is_idempotent() {
        let query = example_a_query();
        let mut reply = Message::response_to(&query);
        reply.answers.push(ResourceRecord::new("example.com", 5, RData::A(Ipv4Addr::LOCALHOST)));
        let bytes = reply.encode().unwrap();
        assert_eq!(Response::decode(&bytes).unwrap(), Response::decode(&bytes).unwrap());
    }

    #[test]
    fn section_count_overflow_is_an_argument_error() {
        let query = example_a_query();
        let mut reply = Message::response_to(&query);
        let record = ResourceRecord::new("example.com", 5, RData::A(Ipv4Addr::LOCALHOST));
        reply.answers = vec![record; usize::from(u16::MAX) + 1];

        match reply.encode() {
            Err(DnsError::Argument(msg)) => assert!(msg.contains("answer")),
            unexpected => panic!("expected argument error, got {unexpected:?}"),
        }
    }

    /// Hand-built reply: question `example.com` at 12, answers use pointers.
    fn compressed_mx_reply() -> Vec<u8> {
        let mut bytes = vec![0x12, 0x34, 0x81, 0x80, 0, 1, 0, 2, 0, 0, 0, 0];
        bytes.extend_from_slice(&encode_name("example.com").unwrap());
        bytes.extend_from_slice(&[0, 15, 0, 1]);

        // MX answer owned by ptr(12), exchange "mail" + ptr(12).
        bytes.extend_from_slice(&[0xC0, 12, 0, 15, 0, 1, 0, 0, 0x0E, 0x10, 0, 9, 0, 10]);
        bytes.extend_from_slice(&[4, b'm', b'a', b'i', b'l', 0xC0, 12]);

        // CNAME answer whose target is spelled out in full.
        bytes.extend_from_slice(&[0xC0, 12, 0, 5, 0, 1, 0, 0, 0, 60, 0, 18]);
        bytes.extend_from_slice(&encode_name("mail.example.com").unwrap());
        bytes
    }

    #[test]
    fn compressed_names_expand_like_full_names() {
        let response = Response::decode(&compressed_mx_reply()).unwrap();
        assert_eq!(response.answers.len(), 2);
        assert_eq!(response.answers[0].name, "example.com");
        assert_eq!(
            response.answers[0].rdata,
            RData::MX { preference: 10, exchange: "mail.example.com".into() }
        );
        assert_eq!(response.answers[0].ttl, 3600);
        assert_eq!(response.answers[1].rdata, RData::CNAME("mail.example.com".into()));
    }

    #[test]
    fn truncated_record_is_malformed() {
        let mut bytes = compressed_mx_reply();
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(Response::decode(&bytes), Err(DnsError::MalformedMessage(_))));
    }

    #[test]
    fn pointer_cycle_in_answer_is_malformed() {
        let mut bytes = vec![0, 1, 0x81, 0x80, 0, 0, 0, 1, 0, 0, 0, 0];
        // Owner name at 12: "a" then a pointer back to 12.
        bytes.extend_from_slice(&[1, b'a', 0xC0, 12, 0, 1, 0, 1, 0, 0, 0, 0, 0, 4, 1, 2, 3, 4]);
        assert!(matches!(Response::decode(&bytes), Err(DnsError::MalformedMessage(_))));
    }

    #[test]
    fn name_overrunning_rdlength_is_malformed() {
        let mut bytes = vec![0, 1, 0x81, 0x80, 0, 0, 0, 1, 0, 0, 0, 0];
        // NS record claims 2 bytes of RDATA but the name needs 5.
        bytes.extend_from_slice(&[0, 0, 2, 0, 1, 0, 0, 0, 1, 0, 2]);
        bytes.extend_from_slice(&[3, b'n', b's', b'1', 0]);
        assert!(matches!(Response::decode(&bytes), Err(DnsError::MalformedMessage(_))));
    }

    #[test]
    fn wrong_a_length_is_malformed() {
        let mut bytes = vec![0, 1, 0x81, 0x80, 0, 0, 0, 1, 0, 0, 0, 0];
        bytes.extend_from_slice(&[0, 0, 1, 0, 1, 0, 0, 0, 1, 0, 3, 1, 2, 3]);
        assert!(matches!(Response::decode(&bytes), Err(DnsError::MalformedMessage(_))));
    }

    #[test]
    fn non_internet_class_is_dropped_not_fatal() {
        let query = example_a_query();
        let mut reply = Message::response_to(&query);
        reply.answers = vec![
            ResourceRecord { class: 3, ..ResourceRecord::new("example.com", 0, RData::NS("odd".into())) },
            ResourceRecord::new("example.com", 30, RData::A(Ipv4Addr::new(1, 2, 3, 4))),
        ];

        let response = Response::decode(&reply.encode().unwrap()).unwrap();
        assert_eq!(response.discarded, 1);
        assert_eq!(response.answers.len(), 1);
        assert_eq!(response.answers[0].rdata.as_a(), Some(Ipv4Addr::new(1, 2, 3, 4)));
    }
}
