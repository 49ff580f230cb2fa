//! Domain configuration parsing
//!
//! Only the `<graphics>` descriptors matter here. A descriptor is a fixed
//! VNC endpoint when it reads `type="vnc"` and `autoport="no"`; its `port`
//! attribute is then the display port.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use vs_core::HypervisorError;

/// Extract the fixed VNC port from a domain's XML configuration
///
/// Returns `Ok(None)` when no graphics descriptor qualifies.
pub fn fixed_vnc_port(domain: &str, xml: &str) -> Result<Option<u16>, HypervisorError> {
    let malformed = |message: String| HypervisorError::MalformedConfig {
        domain: domain.to_string(),
        message,
    };

    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) | Ok(Event::Empty(element)) => {
                if element.name().as_ref() == b"graphics" {
                    if let Some(port) = vnc_port_of(&element).map_err(malformed)? {
                        return Ok(Some(port));
                    }
                }
            }
            Ok(Event::Eof) => return Ok(None),
            Ok(_) => {}
            Err(e) => {
                return Err(malformed(format!(
                    "at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        }
    }
}

fn vnc_port_of(element: &BytesStart<'_>) -> Result<Option<u16>, String> {
    let mut kind = None;
    let mut autoport = None;
    let mut port = None;

    for attr in element.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        let value = attr.unescape_value().map_err(|e| e.to_string())?.into_owned();
        match attr.key.as_ref() {
            b"type" => kind = Some(value),
            b"autoport" => autoport = Some(value),
            b"port" => port = Some(value),
            _ => {}
        }
    }

    if kind.as_deref() != Some("vnc") || autoport.as_deref() != Some("no") {
        return Ok(None);
    }

    match port {
        Some(port) => port
            .trim()
            .parse::<u16>()
            .map(Some)
            .map_err(|e| format!("invalid VNC port {:?}: {}", port, e)),
        None => Ok(None),
    }
}
