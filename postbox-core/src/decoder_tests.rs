//! Tests for SSE frame decoding, focusing on chunk boundaries.

use super::*;
use serde_json::json;

const STREAM: &str = concat!(
    "data: {\"type\":\"RUN_STARTED\",\"threadId\":\"t1\",\"runId\":\"r1\"}\n\n",
    "data: {\"type\":\"TEXT_MESSAGE_START\",\"messageId\":\"m1\",\"role\":\"assistant\"}\n\n",
    "data: {\"type\":\"TEXT_MESSAGE_CONTENT\",\"messageId\":\"m1\",\"delta\":\"h\u{e9}llo \u{1F30D}\"}\n\n",
    "data: {\"type\":\"TEXT_MESSAGE_END\",\"messageId\":\"m1\"}\n\n",
    "data: {\"type\":\"RUN_FINISHED\",\"threadId\":\"t1\",\"runId\":\"r1\"}\n\n",
);

fn decode_all(chunks: &[&[u8]]) -> Vec<DecodedFrame> {
    let mut decoder = FrameDecoder::new();
    let mut frames = Vec::new();
    for chunk in chunks {
        frames.extend(decoder.push(chunk));
    }
    frames.extend(decoder.finish());
    frames
}

#[test]
fn test_single_frame() {
    let frames = decode_all(&[b"data: {\"type\":\"RUN_STARTED\"}\n\n"]);
    assert_eq!(frames, vec![Ok(json!({"type": "RUN_STARTED"}))]);
}

#[test]
fn test_multiple_frames_in_one_chunk() {
    let frames = decode_all(&[STREAM.as_bytes()]);
    assert_eq!(frames.len(), 5);
    assert!(frames.iter().all(|f| f.is_ok()));
    assert_eq!(frames[0].as_ref().unwrap()["type"], "RUN_STARTED");
    assert_eq!(frames[4].as_ref().unwrap()["type"], "RUN_FINISHED");
}

#[test]
fn test_chunking_invariance_single_split() {
    let bytes = STREAM.as_bytes();
    let whole = decode_all(&[bytes]);

    for split in 0..=bytes.len() {
        let (a, b) = bytes.split_at(split);
        assert_eq!(decode_all(&[a, b]), whole, "split at byte {}", split);
    }
}

#[test]
fn test_chunking_invariance_two_splits() {
    let bytes = STREAM.as_bytes();
    let whole = decode_all(&[bytes]);

    // Every pair of split points, stepping to keep the test fast.
    for first in (0..bytes.len()).step_by(7) {
        for second in (first..=bytes.len()).step_by(5) {
            let chunks = [
                &bytes[..first],
                &bytes[first..second],
                &bytes[second..],
            ];
            assert_eq!(decode_all(&chunks), whole, "splits at {} and {}", first, second);
        }
    }
}

#[test]
fn test_byte_at_a_time() {
    let bytes = STREAM.as_bytes();
    let chunks: Vec<&[u8]> = bytes.chunks(1).collect();
    assert_eq!(decode_all(&chunks), decode_all(&[bytes]));
}

#[test]
fn test_crlf_line_endings() {
    let frames = decode_all(&[b"data: {\"a\":1}\r\n\r\ndata: {\"b\":2}\r\n\r\n"]);
    assert_eq!(frames, vec![Ok(json!({"a": 1})), Ok(json!({"b": 2}))]);
}

#[test]
fn test_data_without_space() {
    let frames = decode_all(&[b"data:{\"a\":1}\n\n"]);
    assert_eq!(frames, vec![Ok(json!({"a": 1}))]);
}

#[test]
fn test_non_data_lines_ignored() {
    let frames = decode_all(&[
        b": keep-alive\n\nevent: message\nid: 7\nretry: 1000\ndata: {\"a\":1}\n\n",
    ]);
    assert_eq!(frames, vec![Ok(json!({"a": 1}))]);
}

#[test]
fn test_empty_data_line_ignored() {
    let frames = decode_all(&[b"data: \n\ndata:\n\n"]);
    assert!(frames.is_empty());
}

#[test]
fn test_done_sentinel_terminates_without_event() {
    let mut decoder = FrameDecoder::new();
    let frames = decoder.push(b"data: {\"a\":1}\n\ndata: [DONE]\n\ndata: {\"b\":2}\n\n");

    assert_eq!(frames, vec![Ok(json!({"a": 1}))]);
    assert!(decoder.is_terminated());
    assert!(decoder.push(b"data: {\"c\":3}\n\n").is_empty());
    assert!(decoder.finish().is_empty());
}

#[test]
fn test_done_sentinel_split_across_chunks() {
    let mut decoder = FrameDecoder::new();
    assert!(decoder.push(b"data: [DO").is_empty());
    assert!(!decoder.is_terminated());
    assert!(decoder.push(b"NE]\n\n").is_empty());
    assert!(decoder.is_terminated());
}

#[test]
fn test_malformed_json_does_not_stop_decoding() {
    let frames = decode_all(&[
        b"data: {\"a\":1}\n\ndata: {not json\n\ndata: {\"b\":2}\n\n",
    ]);

    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0], Ok(json!({"a": 1})));
    match &frames[1] {
        Err(DecodeError::InvalidJson { payload, .. }) => assert_eq!(payload, "{not json"),
        other => panic!("Expected InvalidJson, got {:?}", other),
    }
    assert_eq!(frames[2], Ok(json!({"b": 2})));
}

#[test]
fn test_invalid_utf8_reported() {
    let frames = decode_all(&[b"data: {\"a\":\"\xff\xfe\"}\n\ndata: {\"b\":2}\n\n"]);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0], Err(DecodeError::InvalidUtf8));
    assert_eq!(frames[1], Ok(json!({"b": 2})));
}

#[test]
fn test_finish_flushes_unterminated_line() {
    let mut decoder = FrameDecoder::new();
    assert!(decoder.push(b"data: {\"a\":1}").is_empty());
    assert_eq!(decoder.finish(), vec![Ok(json!({"a": 1}))]);
    assert!(decoder.finish().is_empty());
}

#[test]
fn test_partial_line_is_buffered() {
    let mut decoder = FrameDecoder::new();
    assert!(decoder.push(b"data: {\"type\":").is_empty());
    assert!(decoder.push(b"\"RUN_STARTED\"}").is_empty());
    assert_eq!(decoder.push(b"\n"), vec![Ok(json!({"type": "RUN_STARTED"}))]);
}
