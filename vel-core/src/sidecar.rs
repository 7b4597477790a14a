//! Sidecar container for out-of-band enhancement payloads
//!
//! A sidecar is a flat sequence of records, one per frame in decode order.
//! Each record is a 4-byte little-endian payload length followed by that
//! many payload bytes. There is no header and no trailing index.

use crate::{Error, PayloadStore, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Write};

/// Reads a sidecar container into a [`PayloadStore`].
///
/// Every record must be complete: a length prefix that declares more bytes
/// than remain fails the whole read, as does a truncated prefix.
pub fn read_sidecar(bytes: &[u8]) -> Result<PayloadStore> {
    let mut store = PayloadStore::new();
    let mut cursor = Cursor::new(bytes);

    while (cursor.position() as usize) < bytes.len() {
        let offset = cursor.position() as usize;
        let declared = cursor.read_u32::<LittleEndian>()? as usize;

        let start = cursor.position() as usize;
        let available = bytes.len() - start;
        if declared > available {
            return Err(Error::MalformedSidecar {
                offset,
                declared,
                available,
            });
        }

        store.push(bytes[start..start + declared].to_vec());
        cursor.set_position((start + declared) as u64);
    }

    Ok(store)
}

/// Writes the store's payloads as a sidecar container, the inverse of
/// [`read_sidecar`]. The sentinel slot is not written.
pub fn write_sidecar<W: Write>(store: &PayloadStore, mut writer: W) -> Result<()> {
    for payload in store.iter() {
        writer.write_u32::<LittleEndian>(payload.len() as u32)?;
        writer.write_all(payload)?;
    }
    Ok(())
}
