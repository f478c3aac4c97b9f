//! Property tests for the wire codec and payload serializer.

use proptest::prelude::*;
use serde_json::json;

use apns_gateway_client::error::MAX_PAYLOAD_BYTES;
use apns_gateway_client::notification::wire::{
    decode_frame, encode_frame, ErrorResponse, FeedbackRecord, FEEDBACK_RECORD_BYTES,
};
use apns_gateway_client::{ApnsStatus, Badge, Notification, Payload, PushError};

fn arb_badge() -> impl Strategy<Value = Badge> {
    prop_oneof![
        Just(Badge::Unset),
        Just(Badge::Clear),
        (1u32..100_000).prop_map(Badge::Set),
    ]
}

proptest! {
    /// Encoding then decoding a frame preserves every field bit for bit.
    #[test]
    fn test_frame_round_trip(
        token in proptest::array::uniform32(any::<u8>()),
        identifier in any::<u32>(),
        expiration in any::<u32>(),
        priority in prop_oneof![Just(5u8), Just(10u8)],
        alert in ".{0,40}",
        badge in arb_badge(),
        key in "[a-z_]{1,12}",
        value in "[ -~]{0,48}",
    ) {
        let mut payload = Payload::alert(alert);
        payload.badge = badge;
        payload.add_custom(key, json!(value)).unwrap();

        let notification = Notification::builder(hex::encode(token))
            .identifier(identifier)
            .expiration(expiration)
            .priority(priority)
            .payload(payload)
            .build();

        let frame = encode_frame(&notification).unwrap();
        let decoded = decode_frame(&frame).unwrap();

        prop_assert_eq!(decoded.device_token, notification.device_token.clone());
        prop_assert_eq!(decoded.identifier, identifier);
        prop_assert_eq!(decoded.expiration, expiration);
        prop_assert_eq!(decoded.priority, priority);
        prop_assert_eq!(decoded.payload, notification.payload.to_bytes().unwrap());
    }

    /// Payloads at most 2048 bytes encode; larger ones fail with the
    /// observed length.
    #[test]
    fn test_size_gate(len in 0usize..3000) {
        let mut payload = Payload::new();
        payload.add_custom("d", json!("x".repeat(len))).unwrap();

        match payload.to_bytes() {
            Ok(bytes) => prop_assert!(bytes.len() <= MAX_PAYLOAD_BYTES),
            Err(PushError::PayloadTooLarge(n)) => prop_assert!(n > MAX_PAYLOAD_BYTES),
            Err(other) => prop_assert!(false, "unexpected error: {other}"),
        }
    }

    /// Unset, cleared and set badges serialize to three distinct documents.
    #[test]
    fn test_badge_tri_state_is_distinguishable(n in 1u32..1_000_000) {
        let render = |badge: Badge| {
            let mut payload = Payload::new();
            payload.badge = badge;
            serde_json::to_string(&payload.to_value()).unwrap()
        };

        let unset = render(Badge::Unset);
        let cleared = render(Badge::Clear);
        let set = render(Badge::Set(n));

        prop_assert_ne!(&unset, &cleared);
        prop_assert_ne!(&unset, &set);
        prop_assert_ne!(&cleared, &set);
    }

    /// Every status byte decodes; listed codes round-trip, the rest
    /// collapse to `Unknown`.
    #[test]
    fn test_error_packet_decode(status in any::<u8>(), identifier in any::<u32>()) {
        let mut packet = [0u8; 6];
        packet[0] = 0x08;
        packet[1] = status;
        packet[2..].copy_from_slice(&identifier.to_be_bytes());

        let decoded = ErrorResponse::decode(&packet).unwrap();
        prop_assert_eq!(decoded.identifier, identifier);

        const LISTED: [u8; 11] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 10, 255];
        if LISTED.contains(&status) {
            prop_assert_eq!(decoded.status.code(), status);
        } else {
            prop_assert_eq!(decoded.status, ApnsStatus::Unknown);
        }
    }

    /// Feedback records round-trip their timestamp and token.
    #[test]
    fn test_feedback_record_decode(
        seconds in any::<u32>(),
        token in proptest::array::uniform32(any::<u8>()),
    ) {
        let mut record = [0u8; FEEDBACK_RECORD_BYTES];
        record[..4].copy_from_slice(&seconds.to_be_bytes());
        record[4..6].copy_from_slice(&32u16.to_be_bytes());
        record[6..].copy_from_slice(&token);

        let decoded = FeedbackRecord::decode(&record).unwrap();
        prop_assert_eq!(decoded.timestamp.timestamp(), i64::from(seconds));
        prop_assert_eq!(decoded.device_token, hex::encode(token));
    }
}
