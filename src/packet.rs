//! Control packets sent in-band on the child's stdout.
//!
//! A child running under `-p` can end its output with a line such as
//! `wrapperutil{"Restart":true}` to ask the supervisor to restart it, or
//! `wrapperutil{"Exit":true}` to forbid a restart.
//!
//! Only the final segment of the output split on `\n` is inspected. Output
//! that ends with a newline therefore has an empty final segment and never
//! carries a packet, and anything the child prints after the packet line
//! hides it. This is a weak protocol, kept as-is for compatibility with
//! existing children.

use crate::guard::NAME;
use serde_json::{Map, Value};
use std::fmt;

/// Restart/exit request parsed from the child's last output line.
///
/// On the wire the fields are `Restart` and `Exit`. Key matching ignores
/// ASCII case, so `restart` or `EXIT` are accepted too.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlPacket {
    pub restart: bool,
    pub exit: bool,
}

/// The marker was present but the payload did not decode.
#[derive(Debug)]
pub struct PacketError {
    source: serde_json::Error,
}

impl fmt::Display for PacketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Program sent {NAME} packet, but it was invalid")
    }
}

impl std::error::Error for PacketError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// What the extractor found in the captured output.
#[derive(Debug)]
pub enum Extraction {
    /// Last line is ordinary output.
    None,
    Packet(ControlPacket),
    /// Marker present, payload malformed.
    Invalid(PacketError),
}

impl Extraction {
    /// Packet to base the restart decision on. Invalid packets count as absent.
    pub fn packet(&self) -> ControlPacket {
        match self {
            Extraction::Packet(packet) => *packet,
            Extraction::None | Extraction::Invalid(_) => ControlPacket::default(),
        }
    }
}

/// The segment after the last `\n`, possibly empty.
pub fn last_line(text: &str) -> &str {
    text.rsplit('\n').next().unwrap_or_default()
}

/// Decode the payload following the marker.
///
/// The payload must be a JSON object or `null`. Unknown keys are ignored and
/// a `null` field leaves the default in place; any other non-boolean value
/// for a known key is an error.
pub fn parse_payload(payload: &str) -> Result<ControlPacket, PacketError> {
    let fields = serde_json::from_str::<Option<Map<String, Value>>>(payload)
        .map_err(|source| PacketError { source })?;

    let mut packet = ControlPacket::default();
    for (key, value) in fields.into_iter().flatten() {
        let field = if key.eq_ignore_ascii_case("restart") {
            &mut packet.restart
        } else if key.eq_ignore_ascii_case("exit") {
            &mut packet.exit
        } else {
            continue;
        };

        if value.is_null() {
            continue;
        }
        *field = serde_json::from_value(value).map_err(|source| PacketError { source })?;
    }
    Ok(packet)
}

/// Inspect captured stdout for a control packet on its last line.
pub fn extract(output: &[u8]) -> Extraction {
    let text = String::from_utf8_lossy(output);
    let line = last_line(&text);

    let Some(payload) = line.strip_prefix(NAME) else {
        return Extraction::None;
    };

    match parse_payload(payload) {
        Ok(packet) => {
            tracing::debug!(restart = packet.restart, exit = packet.exit, "control packet received");
            Extraction::Packet(packet)
        }
        Err(e) => {
            tracing::debug!(error = %e.source, payload, "malformed control packet");
            Extraction::Invalid(e)
        }
    }
}
