//! Wire framing for the report channel: one length-prefixed record per
//! intercepted access, per section 6's "Binary framing over a file handle
//! or pipe."
//!
//! The payload itself is the record's JSON encoding — the framing only
//! needs to guarantee a reader can tell where one record ends and the next
//! begins even when records from different threads interleave at the byte
//! level (section 5: "each report is framed atomically").

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use sandbox_core::ReportRecord;

/// Writes one framed record: a `u32` little-endian byte length followed by
/// that many bytes of JSON.
pub fn write_record<W: Write>(w: &mut W, record: &ReportRecord) -> io::Result<()> {
    let body = serde_json::to_vec(record).map_err(io::Error::other)?;
    w.write_u32::<LittleEndian>(body.len() as u32)?;
    w.write_all(&body)?;
    Ok(())
}

/// Reads one framed record, or `None` at a clean end of stream.
pub fn read_record<R: Read>(r: &mut R) -> io::Result<Option<ReportRecord>> {
    let len = match r.read_u32::<LittleEndian>() {
        Ok(len) => len,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };
    let mut body = vec![0u8; len as usize];
    r.read_exact(&mut body)?;
    let record = serde_json::from_slice(&body).map_err(io::Error::other)?;
    Ok(Some(record))
}

/// Reads every frame out of `r` until clean EOF. Used by the CLI's replay
/// mode; a real injected process never reads its own outgoing channel.
pub fn read_all<R: Read>(mut r: R) -> io::Result<Vec<ReportRecord>> {
    let mut out = Vec::new();
    while let Some(record) = read_record(&mut r)? {
        out.push(record);
    }
    Ok(out)
}
