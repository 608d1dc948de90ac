//! ESP-AT MQTT command formatting and notification parsing.
//!
//! Outbound:
//! ```text
//! AT+MQTTPUB=0,"<topic>","<data>",<qos>,<retain>
//! AT+MQTTPUBRAW=0,"<topic>",<length>,<qos>,<retain>   (then raw bytes after `>`)
//! AT+MQTTSUB=0,"<topic>",<qos>
//! AT+MQTTUNSUB=0,"<topic>"
//! ```
//! Inbound:
//! ```text
//! +MQTTSUBRECV:<link>,"<topic>",<length>,<data>
//! ```
//! Inside quoted parameters `"`, `,` and `\` are escaped with a backslash.

use core::fmt::Write as _;

use heapless::String;

use crate::config::COMMAND_CAPACITY;
use crate::error::ProtocolError;
use crate::framer::ASYNC_PUBLISH_MARKER;

use super::Posting;

/// An AT command line, terminator excluded.
pub type Command = String<COMMAND_CAPACITY>;

/// MQTT link id used for every command; the modem runs a single session.
pub const LINK_ID: u8 = 0;

/// Answer to a successful raw publish.
pub const RAW_PUBLISH_OK: &str = "+MQTTPUB:OK";

/// The formatted command did not fit into [`Command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TooLong;

impl From<core::fmt::Error> for TooLong {
    fn from(_: core::fmt::Error) -> Self {
        TooLong
    }
}

/// How a publish goes on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishForm {
    /// Payload embedded in the command line.
    Inline(Command),
    /// Header only; the payload follows as raw bytes after the `>` prompt.
    Raw(Command),
}

/// Append `value` as a quoted, escaped AT string parameter.
pub fn push_quoted(cmd: &mut Command, value: &str) -> Result<(), TooLong> {
    cmd.push('"').map_err(|_| TooLong)?;
    for c in value.chars() {
        if matches!(c, '"' | ',' | '\\') {
            cmd.push('\\').map_err(|_| TooLong)?;
        }
        cmd.push(c).map_err(|_| TooLong)?;
    }
    cmd.push('"').map_err(|_| TooLong)
}

fn inline_text(payload: &[u8]) -> Option<&str> {
    let text = core::str::from_utf8(payload).ok()?;
    if text.contains(['\r', '\n', '\0']) {
        return None;
    }
    Some(text)
}

/// Format a publish, falling back to raw mode for payloads that cannot be
/// embedded in a command line.
pub fn publish(topic: &str, payload: &[u8], qos: u8, retain: bool) -> Result<PublishForm, TooLong> {
    let retain = u8::from(retain);
    if let Some(text) = inline_text(payload) {
        if let Ok(cmd) = inline_publish(topic, text, qos, retain) {
            return Ok(PublishForm::Inline(cmd));
        }
    }

    let mut cmd = Command::new();
    write!(cmd, "AT+MQTTPUBRAW={},", LINK_ID)?;
    push_quoted(&mut cmd, topic)?;
    write!(cmd, ",{},{},{}", payload.len(), qos, retain)?;
    Ok(PublishForm::Raw(cmd))
}

fn inline_publish(topic: &str, text: &str, qos: u8, retain: u8) -> Result<Command, TooLong> {
    let mut cmd = Command::new();
    write!(cmd, "AT+MQTTPUB={},", LINK_ID)?;
    push_quoted(&mut cmd, topic)?;
    cmd.push(',').map_err(|_| TooLong)?;
    push_quoted(&mut cmd, text)?;
    write!(cmd, ",{},{}", qos, retain)?;
    Ok(cmd)
}

/// Format a subscription to `pattern`.
pub fn subscribe(pattern: &str, qos: u8) -> Result<Command, TooLong> {
    let mut cmd = Command::new();
    write!(cmd, "AT+MQTTSUB={},", LINK_ID)?;
    push_quoted(&mut cmd, pattern)?;
    write!(cmd, ",{}", qos)?;
    Ok(cmd)
}

/// Format the removal of the subscription to `pattern`.
pub fn unsubscribe(pattern: &str) -> Result<Command, TooLong> {
    let mut cmd = Command::new();
    write!(cmd, "AT+MQTTUNSUB={},", LINK_ID)?;
    push_quoted(&mut cmd, pattern)?;
    Ok(cmd)
}

/// Split a `+MQTTSUBRECV` line into topic and payload.
///
/// The header is ASCII and the topic must be UTF-8; the payload is taken
/// as-is and may hold any byte.
pub fn parse_async_line(line: &[u8]) -> Result<Posting<'_>, ProtocolError> {
    let (topic, data) = split_async_line(line).ok_or(ProtocolError::MalformedAsyncLine)?;
    let topic = core::str::from_utf8(topic).map_err(|_| ProtocolError::InvalidUtf8)?;
    Ok(Posting { topic, data })
}

fn split_async_line(line: &[u8]) -> Option<(&[u8], &[u8])> {
    let rest = line
        .strip_prefix(ASYNC_PUBLISH_MARKER.as_bytes())?
        .strip_prefix(b":")?;
    let (link, rest) = split_once(rest, b",")?;
    number::<u8>(link)?;
    let (topic, rest) = split_once(rest.strip_prefix(b"\"")?, b"\",")?;
    if topic.is_empty() {
        return None;
    }
    let (length, data) = split_once(rest, b",")?;
    let length = number::<usize>(length)?;
    Some((topic, data.get(..length)?))
}

fn split_once<'l>(bytes: &'l [u8], delimiter: &[u8]) -> Option<(&'l [u8], &'l [u8])> {
    let at = bytes
        .windows(delimiter.len())
        .position(|window| window == delimiter)?;
    Some((&bytes[..at], &bytes[at + delimiter.len()..]))
}

fn number<N: core::str::FromStr>(field: &[u8]) -> Option<N> {
    core::str::from_utf8(field).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_publish_is_escaped() {
        let form = publish("a/DATA/t", b"1,5", 0, false).unwrap();
        assert_eq!(
            form,
            PublishForm::Inline(Command::try_from("AT+MQTTPUB=0,\"a/DATA/t\",\"1\\,5\",0,0").unwrap())
        );
    }

    #[test]
    fn binary_payload_goes_raw() {
        let form = publish("a/b", &[0xde, 0xad, 0xbe, 0xef], 1, true).unwrap();
        assert_eq!(
            form,
            PublishForm::Raw(Command::try_from("AT+MQTTPUBRAW=0,\"a/b\",4,1,1").unwrap())
        );
    }

    #[test]
    fn multiline_payload_goes_raw() {
        assert!(matches!(publish("a", b"x\r\ny", 0, false), Ok(PublishForm::Raw(_))));
    }

    #[test]
    fn oversized_inline_payload_goes_raw() {
        let big = [b'z'; COMMAND_CAPACITY];
        assert!(matches!(publish("a", &big, 0, false), Ok(PublishForm::Raw(_))));
    }

    #[test]
    fn subscribe_and_unsubscribe_commands() {
        assert_eq!(subscribe("d/+/HEARTBEAT", 0).unwrap().as_str(), "AT+MQTTSUB=0,\"d/+/HEARTBEAT\",0");
        assert_eq!(unsubscribe("d/#").unwrap().as_str(), "AT+MQTTUNSUB=0,\"d/#\"");
    }

    #[test]
    fn parses_subscription_notification() {
        let posting = parse_async_line(b"+MQTTSUBRECV:0,\"es/twin/DATA/temp\",4,21.5").unwrap();
        assert_eq!(posting.topic, "es/twin/DATA/temp");
        assert_eq!(posting.data, b"21.5");
    }

    #[test]
    fn payload_may_contain_commas() {
        let posting = parse_async_line(b"+MQTTSUBRECV:0,\"t\",5,a,b,c").unwrap();
        assert_eq!(posting.data, b"a,b,c");
    }

    #[test]
    fn empty_payload_is_allowed() {
        let posting = parse_async_line(b"+MQTTSUBRECV:0,\"t\",0,").unwrap();
        assert!(posting.data.is_empty());
    }

    #[test]
    fn binary_payload_is_kept_verbatim() {
        let posting = parse_async_line(b"+MQTTSUBRECV:0,\"t\",4,\xff\xfe\r\x00").unwrap();
        assert_eq!(posting.topic, "t");
        assert_eq!(posting.data, [0xff, 0xfe, b'\r', 0x00]);
    }

    #[test]
    fn topic_must_be_text() {
        assert_eq!(
            parse_async_line(b"+MQTTSUBRECV:0,\"\xff\",1,a"),
            Err(ProtocolError::InvalidUtf8)
        );
    }

    #[test]
    fn malformed_notifications_are_rejected() {
        for line in [
            "+MQTTSUBRECV",
            "+MQTTSUBRECV:0",
            "+MQTTSUBRECV:x,\"t\",1,a",
            "+MQTTSUBRECV:0,t,1,a",
            "+MQTTSUBRECV:0,\"\",1,a",
            "+MQTTSUBRECV:0,\"t\",five,a",
            "+MQTTSUBRECV:0,\"t\",9,short",
        ] {
            assert_eq!(
                parse_async_line(line.as_bytes()),
                Err(ProtocolError::MalformedAsyncLine),
                "{line}"
            );
        }
    }
}
