//! DNS Wire Codec
//!
//! Just enough of RFC 1035 to read queries and write `A` responses.

use std::net::Ipv4Addr;

use crate::types::{DnsResponse, Query, Question, RecordType, CLASS_IN, FLAG_QR};

/// DNS packet constants
pub const DNS_HEADER_SIZE: usize = 12;
pub const DNS_MAX_PACKET_SIZE: usize = 512;

const MAX_LABEL_LEN: usize = 63;
const POINTER_MASK: u8 = 0xC0;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("packet shorter than a DNS header ({0} bytes)")]
    TooShort(usize),

    #[error("packet is a response, not a query")]
    NotAQuery,

    #[error("truncated question section")]
    Truncated,

    #[error("invalid label length {0}")]
    InvalidLabel(u8),

    #[error("compression pointer in question name")]
    UnexpectedPointer,

    #[error("response exceeds 512 bytes")]
    ResponseTooLarge,
}

/// Decode an inbound datagram into a query
pub fn decode_query(packet: &[u8]) -> Result<Query, CodecError> {
    if packet.len() < DNS_HEADER_SIZE {
        return Err(CodecError::TooShort(packet.len()));
    }

    // Parse header
    let id = u16::from_be_bytes([packet[0], packet[1]]);
    let flags = u16::from_be_bytes([packet[2], packet[3]]);
    let qdcount = u16::from_be_bytes([packet[4], packet[5]]);

    if flags & FLAG_QR != 0 {
        return Err(CodecError::NotAQuery);
    }

    let mut questions = Vec::new();
    let mut offset = DNS_HEADER_SIZE;
    for index in 0..qdcount {
        match parse_question(packet, offset) {
            Ok((question, next)) => {
                questions.push(question);
                offset = next;
            }
            // Only the first question is answered; a bad trailing one ends the section
            Err(_) if index > 0 => break,
            Err(e) => return Err(e),
        }
    }

    Ok(Query { id, flags, questions })
}

/// Parse one question starting at `offset`, returning it and the offset past it
fn parse_question(packet: &[u8], mut offset: usize) -> Result<(Question, usize), CodecError> {
    let mut labels = Vec::new();

    loop {
        let len = *packet.get(offset).ok_or(CodecError::Truncated)?;
        offset += 1;

        if len == 0 {
            break;
        }
        if len & POINTER_MASK == POINTER_MASK {
            return Err(CodecError::UnexpectedPointer);
        }
        if len as usize > MAX_LABEL_LEN {
            return Err(CodecError::InvalidLabel(len));
        }

        let label = packet
            .get(offset..offset + len as usize)
            .ok_or(CodecError::Truncated)?;
        labels.push(String::from_utf8_lossy(label));
        offset += len as usize;
    }

    let fixed = packet.get(offset..offset + 4).ok_or(CodecError::Truncated)?;
    let qtype = u16::from_be_bytes([fixed[0], fixed[1]]);
    let qclass = u16::from_be_bytes([fixed[2], fixed[3]]);

    let question = Question {
        name: labels.join("."),
        qtype: RecordType::from(qtype),
        qclass,
    };

    Ok((question, offset + 4))
}

/// Encode a response into a datagram
pub fn encode_response(response: &DnsResponse) -> Result<Vec<u8>, CodecError> {
    let mut packet = Vec::with_capacity(DNS_MAX_PACKET_SIZE);

    // Build header
    packet.extend_from_slice(&response.id.to_be_bytes());
    packet.extend_from_slice(&response.flags.to_be_bytes());
    packet.extend_from_slice(&1u16.to_be_bytes()); // qdcount = 1
    packet.extend_from_slice(&(response.answers.len() as u16).to_be_bytes());
    packet.extend_from_slice(&0u16.to_be_bytes()); // nscount = 0
    packet.extend_from_slice(&0u16.to_be_bytes()); // arcount = 0

    // Echo the question
    let qname_offset = packet.len();
    write_name(&mut packet, &response.question.name)?;
    packet.extend_from_slice(&u16::from(response.question.qtype).to_be_bytes());
    packet.extend_from_slice(&response.question.qclass.to_be_bytes());

    // Answers for the question name point back at it
    let name_ptr = 0xC000 | (qname_offset as u16);

    for answer in &response.answers {
        if answer.name == response.question.name {
            packet.extend_from_slice(&name_ptr.to_be_bytes());
        } else {
            write_name(&mut packet, &answer.name)?;
        }
        write_a_record(&mut packet, answer.ttl, answer.address);
    }

    if packet.len() > DNS_MAX_PACKET_SIZE {
        return Err(CodecError::ResponseTooLarge);
    }

    Ok(packet)
}

fn write_a_record(packet: &mut Vec<u8>, ttl: u32, address: Ipv4Addr) {
    packet.extend_from_slice(&u16::from(RecordType::A).to_be_bytes());
    packet.extend_from_slice(&CLASS_IN.to_be_bytes());
    packet.extend_from_slice(&ttl.to_be_bytes());
    packet.extend_from_slice(&4u16.to_be_bytes()); // rdlength
    packet.extend_from_slice(&address.octets());
}

fn write_name(packet: &mut Vec<u8>, name: &str) -> Result<(), CodecError> {
    for label in name.split('.').filter(|l| !l.is_empty()) {
        if label.len() > MAX_LABEL_LEN {
            return Err(CodecError::InvalidLabel(label.len().min(u8::MAX as usize) as u8));
        }
        packet.push(label.len() as u8);
        packet.extend_from_slice(label.as_bytes());
    }
    packet.push(0); // End of name
    Ok(())
}

/// Build a raw query packet
#[cfg(test)]
pub fn encode_query(query: &Query) -> Result<Vec<u8>, CodecError> {
    let mut packet = Vec::with_capacity(DNS_MAX_PACKET_SIZE);
    packet.extend_from_slice(&query.id.to_be_bytes());
    packet.extend_from_slice(&query.flags.to_be_bytes());
    packet.extend_from_slice(&(query.questions.len() as u16).to_be_bytes());
    packet.extend_from_slice(&[0u8; 6]); // an/ns/ar counts

    for question in &query.questions {
        write_name(&mut packet, &question.name)?;
        packet.extend_from_slice(&u16::from(question.qtype).to_be_bytes());
        packet.extend_from_slice(&question.qclass.to_be_bytes());
    }

    Ok(packet)
}
