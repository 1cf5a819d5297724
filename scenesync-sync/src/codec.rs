//! JSON codec for envelopes and changesets, with length-prefixed framing.

use crate::error::{SyncError, SyncResult};
use crate::protocol::{Envelope, PROTOCOL_VERSION};
use scenesync_proxy::{Changeset, DatablockProxy, Removal, Rename};
use scenesync_types::Identifier;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Maximum frame size (16 MB).
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Encodes an envelope as JSON.
pub fn encode(envelope: &Envelope) -> SyncResult<String> {
    Ok(serde_json::to_string(envelope)?)
}

/// Decodes an envelope, rejecting other protocol versions.
pub fn decode(text: &str) -> SyncResult<Envelope> {
    let envelope: Envelope = serde_json::from_str(text)?;
    if envelope.version != PROTOCOL_VERSION {
        return Err(SyncError::Protocol(format!(
            "unsupported protocol version {} (expected {PROTOCOL_VERSION})",
            envelope.version
        )));
    }
    Ok(envelope)
}

/// Changeset as sent over the wire: removals and renames are tuples.
#[derive(Serialize, Deserialize)]
struct WireChangeset {
    creations: Vec<DatablockProxy>,
    /// `(uuid, collection, label)`
    removals: Vec<(Identifier, String, String)>,
    /// `(uuid, old_name, new_name, label)`
    renames: Vec<(Identifier, String, String, String)>,
}

/// Encodes a changeset as
/// `{"creations": [...], "removals": [[uuid, collection, label]], "renames": [[uuid, old, new, label]]}`.
pub fn encode_changeset(changeset: &Changeset) -> SyncResult<String> {
    let wire = WireChangeset {
        creations: changeset.creations.clone(),
        removals: changeset
            .removals
            .iter()
            .map(|r| (r.uuid, r.collection.clone(), r.label.clone()))
            .collect(),
        renames: changeset
            .renames
            .iter()
            .map(|r| (r.uuid, r.old_name.clone(), r.new_name.clone(), r.label.clone()))
            .collect(),
    };
    Ok(serde_json::to_string(&wire)?)
}

/// Decodes a changeset produced by [`encode_changeset`].
pub fn decode_changeset(text: &str) -> SyncResult<Changeset> {
    let wire: WireChangeset = serde_json::from_str(text)?;
    Ok(Changeset {
        creations: wire.creations,
        removals: wire
            .removals
            .into_iter()
            .map(|(uuid, collection, label)| Removal {
                uuid,
                collection,
                label,
            })
            .collect(),
        renames: wire
            .renames
            .into_iter()
            .map(|(uuid, old_name, new_name, label)| Rename {
                uuid,
                old_name,
                new_name,
                label,
            })
            .collect(),
    })
}

/// Writes a length-prefixed JSON envelope.
pub fn write_frame<W: Write>(io: &mut W, envelope: &Envelope) -> SyncResult<()> {
    let data = serde_json::to_vec(envelope)?;
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(SyncError::Protocol(format!(
            "message too large: {} bytes",
            data.len()
        )));
    }
    let len = u32::try_from(data.len())
        .map_err(|_| SyncError::Protocol(format!("message too large: {} bytes", data.len())))?;
    io.write_all(&len.to_be_bytes())?;
    io.write_all(&data)?;
    io.flush()?;
    Ok(())
}

/// Reads a length-prefixed JSON envelope, rejecting other protocol versions.
pub fn read_frame<R: Read>(io: &mut R) -> SyncResult<Envelope> {
    let mut len_bytes = [0u8; 4];
    io.read_exact(&mut len_bytes)?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(SyncError::Protocol(format!("message too large: {len} bytes")));
    }

    let mut buf = vec![0u8; len];
    io.read_exact(&mut buf)?;
    let text = std::str::from_utf8(&buf)
        .map_err(|e| SyncError::Protocol(format!("invalid utf-8 frame: {e}")))?;
    decode(text)
}
