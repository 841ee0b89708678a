//! Length-prefixed binary record codec.
//!
//! Every record opens and closes with the same fixed 8-byte marker, unique
//! per record type. A reader that finds either marker out of place reports a
//! stream-format error instead of silently misinterpreting bytes. Strings
//! are length-prefixed UTF-8; collections are count-prefixed.
//!
//! The codec is a pure function pair per type: encoding never inspects
//! backend state, decoding never mutates it.

use crate::error::StorageError;
use crate::node::{Node, NodeValue, Visibility};
use crate::path;
use crate::search::{Field, SearchCriteria};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::collections::BTreeMap;
use std::io::{Read, Write};

const NODE_MARKER: u64 = 0x4152_424e_4f44_4531; // "ARBNODE1"
const VALUE_MARKER: u64 = 0x4152_4256_414c_5531; // "ARBVALU1"
const CRITERIA_MARKER: u64 = 0x4152_4243_5249_5431; // "ARBCRIT1"

/// Upper bound on any single length or count prefix. Anything larger is
/// treated as framing corruption rather than an allocation request.
const MAX_LEN: u32 = 1 << 24;

fn stream_err(what: &str) -> StorageError {
    StorageError::StreamFormat(what.to_string())
}

fn map_io(err: std::io::Error) -> StorageError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        stream_err("unexpected end of stream")
    } else {
        StorageError::Io(err)
    }
}

fn write_marker<W: Write>(out: &mut W, marker: u64) -> Result<(), StorageError> {
    out.write_u64::<BigEndian>(marker).map_err(map_io)
}

fn read_marker<R: Read>(input: &mut R, expected: u64, what: &str) -> Result<(), StorageError> {
    let found = input.read_u64::<BigEndian>().map_err(map_io)?;
    if found != expected {
        return Err(StorageError::StreamFormat(format!(
            "bad {} marker: expected {:#018x}, found {:#018x}",
            what, expected, found
        )));
    }
    Ok(())
}

fn write_i32<W: Write>(out: &mut W, v: i32) -> Result<(), StorageError> {
    out.write_i32::<BigEndian>(v).map_err(map_io)
}

fn read_count<R: Read>(input: &mut R, what: &str) -> Result<u32, StorageError> {
    let v = input.read_i32::<BigEndian>().map_err(map_io)?;
    if v < 0 || v as u32 > MAX_LEN {
        return Err(StorageError::StreamFormat(format!(
            "implausible {} count: {}",
            what, v
        )));
    }
    Ok(v as u32)
}

fn write_string<W: Write>(out: &mut W, s: &str) -> Result<(), StorageError> {
    write_i32(out, s.len() as i32)?;
    out.write_all(s.as_bytes()).map_err(map_io)
}

fn read_string<R: Read>(input: &mut R) -> Result<String, StorageError> {
    let len = read_count(input, "string length")?;
    let mut buf = vec![0u8; len as usize];
    input.read_exact(&mut buf).map_err(map_io)?;
    String::from_utf8(buf).map_err(|_| stream_err("string is not valid UTF-8"))
}

fn write_bool<W: Write>(out: &mut W, v: bool) -> Result<(), StorageError> {
    write_i32(out, if v { 1 } else { 0 })
}

fn read_bool<R: Read>(input: &mut R) -> Result<bool, StorageError> {
    match input.read_i32::<BigEndian>().map_err(map_io)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(StorageError::StreamFormat(format!(
            "invalid boolean encoding: {}",
            other
        ))),
    }
}

/// Write one value record, bookended by [`VALUE_MARKER`].
pub fn write_value<W: Write>(out: &mut W, value: &NodeValue) -> Result<(), StorageError> {
    write_marker(out, VALUE_MARKER)?;
    write_string(out, value.key())?;
    write_string(out, value.value_type())?;
    write_string(out, value.value())?;
    write_string(out, value.last_modified())?;
    write_i32(out, value.locales().len() as i32)?;
    for (locale, text) in value.locales() {
        write_string(out, locale)?;
        write_string(out, text)?;
    }
    write_marker(out, VALUE_MARKER)
}

/// Read one value record previously written by [`write_value`].
pub fn read_value<R: Read>(input: &mut R) -> Result<NodeValue, StorageError> {
    read_marker(input, VALUE_MARKER, "value open")?;
    let key = read_string(input)?;
    let value_type = read_string(input)?;
    let value = read_string(input)?;
    let last_modified = read_string(input)?;
    let locale_count = read_count(input, "locale")?;
    let mut locales = BTreeMap::new();
    for _ in 0..locale_count {
        let locale = read_string(input)?;
        let text = read_string(input)?;
        locales.insert(locale, text);
    }
    read_marker(input, VALUE_MARKER, "value close")?;
    Ok(NodeValue::restore(key, value_type, value, last_modified, locales))
}

/// Write one node record, bookended by [`NODE_MARKER`]. Values are nested as
/// complete value records with their own bookends.
pub fn write_node<W: Write>(out: &mut W, node: &Node) -> Result<(), StorageError> {
    write_marker(out, NODE_MARKER)?;
    write_string(out, node.path())?;
    write_string(out, node.owner())?;
    write_string(out, node.visibility().as_str())?;
    write_bool(out, node.is_tombstone())?;
    write_i32(out, node.values().len() as i32)?;
    for value in node.values().values() {
        write_value(out, value)?;
    }
    write_i32(out, node.children().len() as i32)?;
    for child in node.children() {
        write_string(out, child)?;
    }
    write_marker(out, NODE_MARKER)
}

/// Read one node record previously written by [`write_node`].
pub fn read_node<R: Read>(input: &mut R) -> Result<Node, StorageError> {
    read_marker(input, NODE_MARKER, "node open")?;
    let full_path = read_string(input)?;
    path::validate(&full_path).map_err(|_| stream_err("record carries a malformed path"))?;
    let owner = read_string(input)?;
    let visibility = read_string(input)?;
    let visibility = Visibility::parse(&visibility)
        .ok_or_else(|| StorageError::StreamFormat(format!("unknown visibility: {}", visibility)))?;
    let is_tombstone = read_bool(input)?;

    let value_count = read_count(input, "value")?;
    let mut values = Vec::with_capacity(value_count.min(1024) as usize);
    for _ in 0..value_count {
        values.push(read_value(input)?);
    }
    let child_count = read_count(input, "child")?;
    let mut children = Vec::with_capacity(child_count.min(1024) as usize);
    for _ in 0..child_count {
        children.push(read_string(input)?);
    }
    read_marker(input, NODE_MARKER, "node close")?;

    if is_tombstone {
        return Ok(Node::tombstone(&full_path, visibility));
    }
    let mut node =
        Node::from_path(&full_path).map_err(|_| stream_err("record carries a malformed path"))?;
    node.set_owner(owner);
    node.set_visibility(visibility);
    for value in values {
        node.put_value(value);
    }
    for child in children {
        node.add_child(child);
    }
    Ok(node)
}

/// Write one criteria record, bookended by [`CRITERIA_MARKER`].
pub fn write_criteria<W: Write>(
    out: &mut W,
    criteria: &SearchCriteria,
) -> Result<(), StorageError> {
    write_marker(out, CRITERIA_MARKER)?;
    write_i32(out, criteria.terms().len() as i32)?;
    for (field, pattern) in criteria.terms() {
        write_string(out, field.as_str())?;
        write_string(out, pattern)?;
    }
    write_marker(out, CRITERIA_MARKER)
}

/// Read one criteria record previously written by [`write_criteria`].
pub fn read_criteria<R: Read>(input: &mut R) -> Result<SearchCriteria, StorageError> {
    read_marker(input, CRITERIA_MARKER, "criteria open")?;
    let term_count = read_count(input, "criteria term")?;
    let mut terms = BTreeMap::new();
    for _ in 0..term_count {
        let field = read_string(input)?;
        let field = Field::parse(&field)
            .ok_or_else(|| StorageError::StreamFormat(format!("unknown field: {}", field)))?;
        let pattern = read_string(input)?;
        terms.insert(field, pattern);
    }
    read_marker(input, CRITERIA_MARKER, "criteria close")?;
    Ok(SearchCriteria::from_terms(terms))
}

/// Encode a node into a standalone byte buffer.
pub fn encode_node(node: &Node) -> Result<Vec<u8>, StorageError> {
    let mut buf = Vec::new();
    write_node(&mut buf, node)?;
    Ok(buf)
}

/// Encode a value into a standalone byte buffer.
pub fn encode_value(value: &NodeValue) -> Result<Vec<u8>, StorageError> {
    let mut buf = Vec::new();
    write_value(&mut buf, value)?;
    Ok(buf)
}

/// Encode a criteria record into a standalone byte buffer.
pub fn encode_criteria(criteria: &SearchCriteria) -> Result<Vec<u8>, StorageError> {
    let mut buf = Vec::new();
    write_criteria(&mut buf, criteria)?;
    Ok(buf)
}
