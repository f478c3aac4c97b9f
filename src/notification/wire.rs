//! Binary codecs for the legacy gateway and feedback protocols.
//!
//! A send is one "enhanced format" (command `0x02`) frame:
//!
//! ```text
//! +------------+----------------------+----------------------------+
//! | cmd (1)    | frame length (4, BE) | items                      |
//! +------------+----------------------+----------------------------+
//! ```
//!
//! where each item is `id (1) | length (2, BE) | data`, in fixed order:
//! device token, payload, identifier, expiration, priority.
//!
//! The gateway answers rejections with a 6-byte error-response packet and
//! the feedback service streams 38-byte records; both are decoded here.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};

use crate::error::{ApnsStatus, PushError, Result, MAX_PAYLOAD_BYTES};
use crate::notification::{Notification, PRIORITY_CONSERVE_POWER, PRIORITY_IMMEDIATE};

/// Command byte of a send frame.
pub const COMMAND_SEND: u8 = 2;
/// Command byte of an error-response packet.
pub const COMMAND_ERROR_RESPONSE: u8 = 8;

/// Decoded length of a device token.
pub const DEVICE_TOKEN_BYTES: usize = 32;
/// Size of an error-response packet.
pub const ERROR_RESPONSE_BYTES: usize = 6;
/// Size of one feedback record.
pub const FEEDBACK_RECORD_BYTES: usize = 38;

const ITEM_DEVICE_TOKEN: u8 = 1;
const ITEM_PAYLOAD: u8 = 2;
const ITEM_IDENTIFIER: u8 = 3;
const ITEM_EXPIRATION: u8 = 4;
const ITEM_PRIORITY: u8 = 5;

const ITEM_HEADER_BYTES: usize = 3;

/// Decode a device token from its 64-character hex form.
pub fn decode_device_token(token: &str) -> Result<[u8; DEVICE_TOKEN_BYTES]> {
    if token.len() != DEVICE_TOKEN_BYTES * 2 {
        return Err(PushError::InvalidDeviceToken);
    }
    let raw = hex::decode(token).map_err(|_| PushError::InvalidDeviceToken)?;
    let mut out = [0u8; DEVICE_TOKEN_BYTES];
    out.copy_from_slice(&raw);
    Ok(out)
}

fn validate_priority(priority: u8) -> Result<()> {
    if priority == PRIORITY_IMMEDIATE || priority == PRIORITY_CONSERVE_POWER {
        Ok(())
    } else {
        Err(PushError::InvalidPriority(priority))
    }
}

/// The fallible half of frame encoding: token decode, priority check and
/// payload serialization (with the size gate). Splitting this out lets the
/// client validate a submission before it consumes an identifier.
#[derive(Debug)]
pub struct PreparedFrame {
    token: [u8; DEVICE_TOKEN_BYTES],
    payload: Vec<u8>,
    priority: u8,
}

impl PreparedFrame {
    pub fn new(notification: &Notification) -> Result<Self> {
        let token = decode_device_token(&notification.device_token)?;
        validate_priority(notification.priority)?;
        let payload = notification.payload.to_bytes()?;
        Ok(Self {
            token,
            payload,
            priority: notification.priority,
        })
    }

    /// Assemble the frame. Infallible once prepared; the identifier is
    /// passed in because assignment happens after validation succeeds.
    pub fn encode(&self, identifier: u32, expiration: u32) -> Bytes {
        let items_len = ITEM_HEADER_BYTES * 5
            + DEVICE_TOKEN_BYTES
            + self.payload.len()
            + 4
            + 4
            + 1;

        let mut frame = BytesMut::with_capacity(5 + items_len);
        frame.put_u8(COMMAND_SEND);
        frame.put_u32(items_len as u32);

        frame.put_u8(ITEM_DEVICE_TOKEN);
        frame.put_u16(DEVICE_TOKEN_BYTES as u16);
        frame.put_slice(&self.token);

        frame.put_u8(ITEM_PAYLOAD);
        frame.put_u16(self.payload.len() as u16);
        frame.put_slice(&self.payload);

        frame.put_u8(ITEM_IDENTIFIER);
        frame.put_u16(4);
        frame.put_u32(identifier);

        frame.put_u8(ITEM_EXPIRATION);
        frame.put_u16(4);
        frame.put_u32(expiration);

        frame.put_u8(ITEM_PRIORITY);
        frame.put_u16(1);
        frame.put_u8(self.priority);

        frame.freeze()
    }
}

/// Validate and encode a notification whose identifier is already set.
pub fn encode_frame(notification: &Notification) -> Result<Bytes> {
    let prepared = PreparedFrame::new(notification)?;
    Ok(prepared.encode(notification.identifier, notification.expiration))
}

/// A send frame parsed back into its fields. Used by tests and gateway
/// simulators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub device_token: String,
    pub payload: Vec<u8>,
    pub identifier: u32,
    pub expiration: u32,
    pub priority: u8,
}

/// Parse a complete send frame. The frame length must match the buffer and
/// all five items must be present.
pub fn decode_frame(frame: &[u8]) -> Result<DecodedFrame> {
    let mut buf = frame;
    if buf.remaining() < 5 {
        return Err(PushError::FrameDecode("frame shorter than header".into()));
    }
    let command = buf.get_u8();
    if command != COMMAND_SEND {
        return Err(PushError::FrameDecode(format!(
            "unexpected command byte {command:#04x}"
        )));
    }
    let declared = buf.get_u32() as usize;
    if declared != buf.remaining() {
        return Err(PushError::FrameDecode(format!(
            "frame length {declared} does not match {} remaining bytes",
            buf.remaining()
        )));
    }

    let mut device_token = None;
    let mut payload = None;
    let mut identifier = None;
    let mut expiration = None;
    let mut priority = None;

    while buf.has_remaining() {
        if buf.remaining() < ITEM_HEADER_BYTES {
            return Err(PushError::FrameDecode("truncated item header".into()));
        }
        let item_id = buf.get_u8();
        let item_len = buf.get_u16() as usize;
        if buf.remaining() < item_len {
            return Err(PushError::FrameDecode(format!(
                "item {item_id} declares {item_len} bytes, {} remain",
                buf.remaining()
            )));
        }
        let data = &buf[..item_len];
        match item_id {
            ITEM_DEVICE_TOKEN => {
                if item_len != DEVICE_TOKEN_BYTES {
                    return Err(PushError::FrameDecode("bad device token length".into()));
                }
                device_token = Some(hex::encode(data));
            }
            ITEM_PAYLOAD => {
                if item_len > MAX_PAYLOAD_BYTES {
                    return Err(PushError::FrameDecode("payload item over limit".into()));
                }
                payload = Some(data.to_vec());
            }
            ITEM_IDENTIFIER => {
                if item_len != 4 {
                    return Err(PushError::FrameDecode("bad identifier length".into()));
                }
                identifier = Some(u32::from_be_bytes([data[0], data[1], data[2], data[3]]));
            }
            ITEM_EXPIRATION => {
                if item_len != 4 {
                    return Err(PushError::FrameDecode("bad expiration length".into()));
                }
                expiration = Some(u32::from_be_bytes([data[0], data[1], data[2], data[3]]));
            }
            ITEM_PRIORITY => {
                if item_len != 1 {
                    return Err(PushError::FrameDecode("bad priority length".into()));
                }
                priority = Some(data[0]);
            }
            other => {
                return Err(PushError::FrameDecode(format!("unknown item id {other}")));
            }
        }
        buf.advance(item_len);
    }

    Ok(DecodedFrame {
        device_token: device_token
            .ok_or_else(|| PushError::FrameDecode("missing device token item".into()))?,
        payload: payload.ok_or_else(|| PushError::FrameDecode("missing payload item".into()))?,
        identifier: identifier
            .ok_or_else(|| PushError::FrameDecode("missing identifier item".into()))?,
        expiration: expiration
            .ok_or_else(|| PushError::FrameDecode("missing expiration item".into()))?,
        priority: priority
            .ok_or_else(|| PushError::FrameDecode("missing priority item".into()))?,
    })
}

/// The 6-byte packet the gateway sends just before closing a connection it
/// is about to reject a notification on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorResponse {
    pub status: ApnsStatus,
    pub identifier: u32,
}

impl ErrorResponse {
    pub fn decode(buf: &[u8; ERROR_RESPONSE_BYTES]) -> Result<Self> {
        if buf[0] != COMMAND_ERROR_RESPONSE {
            return Err(PushError::FrameDecode(format!(
                "unexpected error-response command byte {:#04x}",
                buf[0]
            )));
        }
        Ok(Self {
            status: ApnsStatus::from_code(buf[1]),
            identifier: u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]),
        })
    }
}

/// One record from the feedback service: a device that rejected a push,
/// with the time Apple recorded the rejection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackRecord {
    pub timestamp: DateTime<Utc>,
    /// 64-character hex device token.
    pub device_token: String,
}

impl FeedbackRecord {
    pub fn decode(buf: &[u8; FEEDBACK_RECORD_BYTES]) -> Result<Self> {
        let seconds = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let token_len = u16::from_be_bytes([buf[4], buf[5]]) as usize;
        if token_len != DEVICE_TOKEN_BYTES {
            return Err(PushError::FrameDecode(format!(
                "feedback token length {token_len}, expected {DEVICE_TOKEN_BYTES}"
            )));
        }
        let timestamp = DateTime::from_timestamp(i64::from(seconds), 0)
            .ok_or_else(|| PushError::FrameDecode("feedback timestamp out of range".into()))?;
        Ok(Self {
            timestamp,
            device_token: hex::encode(&buf[6..]),
        })
    }
}
