//! End-to-end framing tests: frames written by one framer and read back by
//! a peer framer over an in-memory transport.

use bytes::Bytes;
use protocol_spdy::{
    Config, ControlFrameHeader, DataFrame, Error, Frame, FrameReader, FrameWriter, Framer,
    GoAwayFrame, GoAwayStatus, Headers, HeadersFrame, PingFrame, RstStreamFrame, RstStreamStatus,
    SettingsFrame, SettingsFlagIdValue, SynReplyFrame, SynStreamFrame, WindowUpdateFrame,
    CONTROL_FLAG_FIN, DATA_FLAG_FIN,
};

/// Encode `frames` through one writer and return the wire bytes.
fn encode(frames: &[Frame]) -> Vec<u8> {
    let mut writer = FrameWriter::new(Vec::new()).unwrap();
    for frame in frames {
        writer.write_frame(frame).unwrap();
    }
    writer.into_inner()
}

/// Write then read back a single frame through a fresh framer pair.
fn round_trip(frame: &Frame) -> Frame {
    let bytes = encode(std::slice::from_ref(frame));
    FrameReader::new(&bytes[..]).read_frame().unwrap()
}

fn request_headers() -> Headers {
    let mut headers = Headers::new();
    headers.add(":method", "GET");
    headers.add(":path", "/");
    headers.add(":version", "HTTP/1.1");
    headers.add(":host", "example.com");
    headers.add(":scheme", "https");
    headers
}

/// The 24-bit length field of a control frame's wire form.
fn length_field(bytes: &[u8]) -> usize {
    assert!(bytes.len() >= 8);
    ((bytes[5] as usize) << 16) | ((bytes[6] as usize) << 8) | bytes[7] as usize
}

fn set_length_field(bytes: &mut [u8], length: usize) {
    bytes[5] = (length >> 16) as u8;
    bytes[6] = (length >> 8) as u8;
    bytes[7] = length as u8;
}

// -- Spec scenarios --

#[test]
fn ping_is_byte_exact() {
    let frame = Frame::Ping(PingFrame {
        header: ControlFrameHeader::default(),
        id: 1,
    });
    let bytes = encode(std::slice::from_ref(&frame));
    assert_eq!(
        bytes,
        [0x80, 0x03, 0x00, 0x06, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x01]
    );
    assert_eq!(round_trip(&frame), frame);
}

#[test]
fn rst_stream_zero_status_rejected_on_encode() {
    let mut writer = FrameWriter::new(Vec::new()).unwrap();
    let err = writer
        .write_frame(&Frame::RstStream(RstStreamFrame {
            header: ControlFrameHeader::default(),
            stream_id: 1,
            status: RstStreamStatus(0),
        }))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidControlFrame { stream_id: 1 }));
    // No partial frame reached the sink.
    assert!(writer.get_ref().is_empty());
}

#[test]
fn empty_fin_data_frame_is_byte_exact() {
    let frame = Frame::Data(DataFrame {
        stream_id: 1,
        flags: DATA_FLAG_FIN,
        data: Bytes::new(),
    });
    let bytes = encode(std::slice::from_ref(&frame));
    assert_eq!(bytes, [0x00, 0x00, 0x00, 0x01, 0x01, 0x00, 0x00, 0x00]);
    assert_eq!(round_trip(&frame), frame);
}

#[test]
fn syn_stream_round_trip_with_compression() {
    let mut headers = Headers::new();
    headers.add(":method", "GET");
    let frame = Frame::SynStream(SynStreamFrame {
        header: ControlFrameHeader::default(),
        stream_id: 1,
        associated_stream_id: 0,
        priority: 3,
        slot: 0,
        headers,
    });

    let bytes = encode(std::slice::from_ref(&frame));
    assert_eq!(length_field(&bytes), bytes.len() - 8);
    assert_eq!(round_trip(&frame), frame);
}

#[test]
fn banned_response_header_rejected() {
    let mut headers = Headers::new();
    headers.add("connection", "close");
    let bytes = encode(&[Frame::SynReply(SynReplyFrame {
        header: ControlFrameHeader::default(),
        stream_id: 1,
        headers,
    })]);
    let err = FrameReader::new(&bytes[..]).read_frame().unwrap_err();
    assert!(matches!(err, Error::InvalidHeaderPresent { stream_id: 1 }));
}

#[test]
fn truncated_compressed_payload_detected() {
    let mut headers = Headers::new();
    headers.add(":status", "200");
    let mut bytes = encode(&[Frame::SynReply(SynReplyFrame {
        header: ControlFrameHeader::default(),
        stream_id: 1,
        headers,
    })]);

    // Drop the last compressed byte and shrink the length field to match.
    bytes.pop();
    let length = length_field(&bytes);
    set_length_field(&mut bytes, length - 1);

    let err = FrameReader::new(&bytes[..]).read_frame().unwrap_err();
    assert!(matches!(err, Error::WrongCompressedPayloadSize));
}

#[test]
fn padded_compressed_payload_detected() {
    let mut headers = Headers::new();
    headers.add(":status", "200");
    let mut bytes = encode(&[Frame::SynReply(SynReplyFrame {
        header: ControlFrameHeader::default(),
        stream_id: 1,
        headers,
    })]);

    // A stray byte after the sync-flush boundary, length field bumped.
    bytes.push(0x00);
    let length = length_field(&bytes);
    set_length_field(&mut bytes, length + 1);

    let err = FrameReader::new(&bytes[..]).read_frame().unwrap_err();
    assert!(matches!(err, Error::WrongCompressedPayloadSize));
}

#[test]
fn two_blocks_in_one_frame_detected() {
    // Two frames' compressed payloads spliced into one frame: the zlib
    // stream is intact, but the inflated bytes hold two blocks.
    let mut headers = Headers::new();
    headers.add(":status", "200");
    let reply = |stream_id| {
        Frame::SynReply(SynReplyFrame {
            header: ControlFrameHeader::default(),
            stream_id,
            headers: headers.clone(),
        })
    };
    let bytes = encode(&[reply(1), reply(3)]);

    let first_payload_len = length_field(&bytes) - 4;
    let first_end = 8 + 4 + first_payload_len;
    let second_payload = &bytes[first_end + 12..];

    let mut spliced = bytes[..first_end].to_vec();
    spliced.extend_from_slice(second_payload);
    set_length_field(&mut spliced, 4 + first_payload_len + second_payload.len());

    let err = FrameReader::new(&spliced[..]).read_frame().unwrap_err();
    assert!(matches!(err, Error::WrongCompressedPayloadSize));
}

// -- Round trips for the remaining variants --

#[test]
fn syn_reply_round_trip() {
    let mut headers = Headers::new();
    headers.add(":status", "200");
    headers.add(":version", "HTTP/1.1");
    let frame = Frame::SynReply(SynReplyFrame {
        header: ControlFrameHeader::with_flags(CONTROL_FLAG_FIN),
        stream_id: 1,
        headers,
    });
    assert_eq!(round_trip(&frame), frame);
}

#[test]
fn rst_stream_round_trip() {
    let frame = Frame::RstStream(RstStreamFrame {
        header: ControlFrameHeader::default(),
        stream_id: 5,
        status: RstStreamStatus::CANCEL,
    });
    assert_eq!(round_trip(&frame), frame);
}

#[test]
fn settings_round_trip() {
    let frame = Frame::Settings(SettingsFrame {
        header: ControlFrameHeader::default(),
        flag_id_values: vec![
            SettingsFlagIdValue {
                flag: 0x1,
                id: 4,
                value: 100,
            },
            SettingsFlagIdValue::new(7, 65536),
        ],
    });
    let bytes = encode(std::slice::from_ref(&frame));
    assert_eq!(length_field(&bytes), bytes.len() - 8);
    assert_eq!(length_field(&bytes), 4 + 2 * 8);
    assert_eq!(round_trip(&frame), frame);
}

#[test]
fn empty_settings_round_trip() {
    let frame = Frame::Settings(SettingsFrame {
        header: ControlFrameHeader::default(),
        flag_id_values: Vec::new(),
    });
    assert_eq!(round_trip(&frame), frame);
}

#[test]
fn go_away_round_trip() {
    let frame = Frame::GoAway(GoAwayFrame {
        header: ControlFrameHeader::default(),
        last_good_stream_id: 41,
        status: GoAwayStatus::PROTOCOL_ERROR,
    });
    let bytes = encode(std::slice::from_ref(&frame));
    assert_eq!(bytes.len(), 16);
    assert_eq!(round_trip(&frame), frame);
}

#[test]
fn headers_round_trip() {
    let mut headers = Headers::new();
    headers.add("x-trailer", "checksum");
    let frame = Frame::Headers(HeadersFrame {
        header: ControlFrameHeader::default(),
        stream_id: 7,
        headers,
    });
    assert_eq!(round_trip(&frame), frame);
}

#[test]
fn window_update_round_trip() {
    let frame = Frame::WindowUpdate(WindowUpdateFrame {
        header: ControlFrameHeader::default(),
        stream_id: 3,
        delta_window_size: 0x0001_0000,
    });
    let bytes = encode(std::slice::from_ref(&frame));
    assert_eq!(bytes.len(), 16);
    assert_eq!(round_trip(&frame), frame);
}

#[test]
fn data_round_trip() {
    let frame = Frame::Data(DataFrame {
        stream_id: 9,
        flags: 0,
        data: Bytes::from_static(b"hello world"),
    });
    let bytes = encode(std::slice::from_ref(&frame));
    assert_eq!(bytes.len(), 8 + 11);
    assert_eq!(round_trip(&frame), frame);
}

// -- Compression statefulness --

#[test]
fn compression_state_persists_across_frames() {
    let frames: Vec<Frame> = (0u32..5)
        .map(|i| {
            let mut headers = request_headers();
            headers.add("x-request", format!("{i}"));
            Frame::SynStream(SynStreamFrame {
                header: ControlFrameHeader::default(),
                stream_id: 2 * i + 1,
                associated_stream_id: 0,
                priority: (i % 8) as u8,
                slot: 0,
                headers,
            })
        })
        .collect();

    let bytes = encode(&frames);
    let mut reader = FrameReader::new(&bytes[..]);
    for frame in &frames {
        assert_eq!(&reader.read_frame().unwrap(), frame);
    }
}

#[test]
fn fresh_reader_cannot_join_mid_stream() {
    let mut headers = request_headers();
    headers.add("x-a", "1");
    let syn = |stream_id, headers| {
        Frame::SynStream(SynStreamFrame {
            header: ControlFrameHeader::default(),
            stream_id,
            associated_stream_id: 0,
            priority: 0,
            slot: 0,
            headers,
        })
    };
    let bytes = encode(&[syn(1, headers.clone()), syn(3, headers)]);

    // Skip the first frame's bytes and start a fresh reader at the second:
    // its inflate stream is missing the first frame's history.
    let first_len = 8 + length_field(&bytes);
    let mut reader = FrameReader::new(&bytes[first_len..]);
    assert!(reader.read_frame().is_err());
}

#[test]
fn interleaved_directions_share_nothing() {
    // One duplex framer writing requests while reading the peer's replies;
    // compressor and decompressor advance independently.
    let mut headers = Headers::new();
    headers.add(":status", "200");
    let reply = Frame::SynReply(SynReplyFrame {
        header: ControlFrameHeader::default(),
        stream_id: 1,
        headers,
    });
    let inbound = encode(std::slice::from_ref(&reply));

    let mut framer = Framer::new(Vec::new(), &inbound[..]).unwrap();
    let request = Frame::SynStream(SynStreamFrame {
        header: ControlFrameHeader::default(),
        stream_id: 1,
        associated_stream_id: 0,
        priority: 0,
        slot: 0,
        headers: request_headers(),
    });
    framer.write_frame(&request).unwrap();
    assert_eq!(framer.read_frame().unwrap(), reply);

    let (writer, _reader) = framer.split();
    let outbound = writer.into_inner();
    assert_eq!(FrameReader::new(&outbound[..]).read_frame().unwrap(), request);
}

// -- Header diagnostics --

#[test]
fn lowercase_names_decode_without_diagnostic() {
    let mut headers = Headers::new();
    headers.add("accept", "text/html");
    let frame = Frame::Headers(HeadersFrame {
        header: ControlFrameHeader::default(),
        stream_id: 2,
        headers,
    });
    assert_eq!(round_trip(&frame), frame);
}

#[test]
fn uppercase_name_yields_one_diagnostic_and_the_normalized_frame() {
    // The writer always lowercases, so smuggle an uppercase name through
    // the raw (compression-disabled) path.
    let config = Config {
        header_compression: false,
    };
    let mut block = Vec::new();
    block.extend_from_slice(&1u32.to_be_bytes());
    block.extend_from_slice(&6u32.to_be_bytes());
    block.extend_from_slice(b"Accept");
    block.extend_from_slice(&1u32.to_be_bytes());
    block.extend_from_slice(b"*");

    let mut bytes = vec![0x80, 0x03, 0x00, 0x08, 0x00, 0x00, 0x00, 0x00];
    set_length_field(&mut bytes, 4 + block.len());
    bytes.extend_from_slice(&2u32.to_be_bytes()); // stream id
    bytes.extend_from_slice(&block);

    let mut reader = FrameReader::with_config(&bytes[..], &config);
    let err = reader.read_frame().unwrap_err();
    assert!(matches!(
        err,
        Error::UnlowercasedHeaderName { stream_id: 2, .. }
    ));
    let frame = err.into_frame().expect("diagnostic carries the frame");
    match frame {
        Frame::Headers(f) => {
            assert_eq!(f.headers.get("accept"), Some("*"));
            let names: Vec<&str> = f.headers.iter().map(|(n, _)| n).collect();
            assert_eq!(names, ["accept"]);
        }
        other => panic!("expected Headers frame, got {other:?}"),
    }
}

#[test]
fn duplicate_names_yield_diagnostic_with_merged_values() {
    let config = Config {
        header_compression: false,
    };
    let mut block = Vec::new();
    block.extend_from_slice(&2u32.to_be_bytes());
    for value in ["a", "b"] {
        block.extend_from_slice(&4u32.to_be_bytes());
        block.extend_from_slice(b"vary");
        block.extend_from_slice(&1u32.to_be_bytes());
        block.extend_from_slice(value.as_bytes());
    }

    let mut bytes = vec![0x80, 0x03, 0x00, 0x08, 0x00, 0x00, 0x00, 0x00];
    set_length_field(&mut bytes, 4 + block.len());
    bytes.extend_from_slice(&2u32.to_be_bytes());
    bytes.extend_from_slice(&block);

    let mut reader = FrameReader::with_config(&bytes[..], &config);
    let err = reader.read_frame().unwrap_err();
    assert!(matches!(err, Error::DuplicateHeaders { stream_id: 2, .. }));
    match err.into_frame().unwrap() {
        Frame::Headers(f) => {
            assert_eq!(f.headers.get_all("vary"), &["a".to_string(), "b".to_string()]);
        }
        other => panic!("expected Headers frame, got {other:?}"),
    }
}

// -- Rejection rules, one minimum counterexample per kind --

#[test]
fn zero_stream_ids_rejected_on_encode() {
    let mut writer = FrameWriter::new(Vec::new()).unwrap();
    let cases = [
        Frame::SynStream(SynStreamFrame::default()),
        Frame::SynReply(SynReplyFrame::default()),
        Frame::Headers(HeadersFrame::default()),
        Frame::RstStream(RstStreamFrame {
            status: RstStreamStatus::CANCEL,
            ..Default::default()
        }),
        Frame::WindowUpdate(WindowUpdateFrame::default()),
        Frame::Data(DataFrame::default()),
        Frame::Ping(PingFrame::default()),
    ];
    for frame in &cases {
        assert!(
            matches!(writer.write_frame(frame).unwrap_err(), Error::ZeroStreamId),
            "expected ZeroStreamId for {frame:?}"
        );
    }
    assert!(writer.get_ref().is_empty());
}

#[test]
fn zero_stream_id_rejected_on_decode() {
    // Hand-built RST_STREAM with stream id 0 and a valid status.
    let mut bytes = vec![0x80, 0x03, 0x00, 0x03, 0x00, 0x00, 0x00, 0x08];
    bytes.extend_from_slice(&0u32.to_be_bytes());
    bytes.extend_from_slice(&5u32.to_be_bytes());
    let err = FrameReader::new(&bytes[..]).read_frame().unwrap_err();
    assert!(matches!(err, Error::ZeroStreamId));

    // Data frame on stream 0.
    let bytes = [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
    let err = FrameReader::new(&bytes[..]).read_frame().unwrap_err();
    assert!(matches!(err, Error::ZeroStreamId));
}

#[test]
fn unknown_frame_type_rejected() {
    let bytes = [0x80, 0x03, 0x00, 0x0a, 0x00, 0x00, 0x00, 0x00];
    let err = FrameReader::new(&bytes[..]).read_frame().unwrap_err();
    assert!(matches!(err, Error::UnknownFrameType(0x000a)));
}

#[test]
fn nonzero_ping_flags_rejected() {
    let mut bytes = vec![0x80, 0x03, 0x00, 0x06, 0x01, 0x00, 0x00, 0x04];
    bytes.extend_from_slice(&1u32.to_be_bytes());
    let err = FrameReader::new(&bytes[..]).read_frame().unwrap_err();
    assert!(matches!(err, Error::InvalidControlFrame { stream_id: 1 }));
}

#[test]
fn go_away_bad_shape_rejected() {
    // Non-zero flags.
    let mut bytes = vec![0x80, 0x03, 0x00, 0x07, 0x01, 0x00, 0x00, 0x08];
    bytes.extend_from_slice(&[0u8; 8]);
    let err = FrameReader::new(&bytes[..]).read_frame().unwrap_err();
    assert!(matches!(err, Error::InvalidControlFrame { .. }));

    // Wrong length.
    let mut bytes = vec![0x80, 0x03, 0x00, 0x07, 0x00, 0x00, 0x00, 0x0c];
    bytes.extend_from_slice(&[0u8; 12]);
    let err = FrameReader::new(&bytes[..]).read_frame().unwrap_err();
    assert!(matches!(err, Error::InvalidControlFrame { .. }));
}

#[test]
fn window_update_bad_shape_rejected() {
    let mut bytes = vec![0x80, 0x03, 0x00, 0x09, 0x01, 0x00, 0x00, 0x08];
    bytes.extend_from_slice(&[0u8; 8]);
    let err = FrameReader::new(&bytes[..]).read_frame().unwrap_err();
    assert!(matches!(err, Error::InvalidControlFrame { .. }));
}

#[test]
fn settings_count_length_mismatch_rejected() {
    // Length says one entry, count claims two.
    let mut bytes = vec![0x80, 0x03, 0x00, 0x04, 0x00, 0x00, 0x00, 0x0c];
    bytes.extend_from_slice(&2u32.to_be_bytes());
    bytes.extend_from_slice(&[0u8; 8]);
    let err = FrameReader::new(&bytes[..]).read_frame().unwrap_err();
    assert!(matches!(err, Error::InvalidControlFrame { .. }));
}

#[test]
fn rst_stream_zero_status_rejected_on_decode() {
    let mut bytes = vec![0x80, 0x03, 0x00, 0x03, 0x00, 0x00, 0x00, 0x08];
    bytes.extend_from_slice(&1u32.to_be_bytes());
    bytes.extend_from_slice(&0u32.to_be_bytes());
    let err = FrameReader::new(&bytes[..]).read_frame().unwrap_err();
    assert!(matches!(err, Error::InvalidControlFrame { stream_id: 1 }));
}

// -- Reserved bits --

#[test]
fn reserved_stream_id_bit_ignored_on_parse() {
    let frame = Frame::WindowUpdate(WindowUpdateFrame {
        header: ControlFrameHeader::default(),
        stream_id: 3,
        delta_window_size: 16,
    });
    let mut bytes = encode(std::slice::from_ref(&frame));
    // Set the reserved top bit of the stream id on the wire.
    bytes[8] |= 0x80;
    assert_eq!(FrameReader::new(&bytes[..]).read_frame().unwrap(), frame);
}

#[test]
fn reserved_priority_bits_ignored_on_parse() {
    let frame = Frame::SynStream(SynStreamFrame {
        header: ControlFrameHeader::default(),
        stream_id: 1,
        associated_stream_id: 0,
        priority: 5,
        slot: 0,
        headers: request_headers(),
    });
    let mut bytes = encode(std::slice::from_ref(&frame));
    // Fill the five reserved bits below the priority.
    assert_eq!(bytes[16] >> 5, 5);
    bytes[16] |= 0x1f;
    assert_eq!(FrameReader::new(&bytes[..]).read_frame().unwrap(), frame);
}

#[test]
fn parse_preserves_received_version() {
    let frame = Frame::Ping(PingFrame {
        header: ControlFrameHeader::default(),
        id: 2,
    });
    let mut bytes = encode(std::slice::from_ref(&frame));
    bytes[1] = 0x04; // claim version 4 on the wire
    match FrameReader::new(&bytes[..]).read_frame().unwrap() {
        Frame::Ping(f) => assert_eq!(f.header.version, 4),
        other => panic!("expected Ping, got {other:?}"),
    }
}

// -- Headers-frame banned-set parity --

#[test]
fn headers_parity_selects_banned_set() {
    let config = Config {
        header_compression: false,
    };
    let frame_bytes = |stream_id: u32, name: &str| {
        let mut block = Vec::new();
        block.extend_from_slice(&1u32.to_be_bytes());
        block.extend_from_slice(&(name.len() as u32).to_be_bytes());
        block.extend_from_slice(name.as_bytes());
        block.extend_from_slice(&1u32.to_be_bytes());
        block.extend_from_slice(b"x");

        let mut bytes = vec![0x80, 0x03, 0x00, 0x08, 0x00, 0x00, 0x00, 0x00];
        set_length_field(&mut bytes, 4 + block.len());
        bytes.extend_from_slice(&stream_id.to_be_bytes());
        bytes.extend_from_slice(&block);
        bytes
    };

    // `host` is banned for requests only: rejected on an odd
    // (client-initiated) stream, accepted on an even one.
    let bytes = frame_bytes(1, "host");
    let err = FrameReader::with_config(&bytes[..], &config)
        .read_frame()
        .unwrap_err();
    assert!(matches!(err, Error::InvalidHeaderPresent { stream_id: 1 }));

    let bytes = frame_bytes(2, "host");
    assert!(FrameReader::with_config(&bytes[..], &config)
        .read_frame()
        .is_ok());

    // `connection` is banned in both directions.
    let bytes = frame_bytes(2, "connection");
    let err = FrameReader::with_config(&bytes[..], &config)
        .read_frame()
        .unwrap_err();
    assert!(matches!(err, Error::InvalidHeaderPresent { stream_id: 2 }));
}

// -- Raw (compression disabled) mode --

#[test]
fn raw_mode_round_trip() {
    let config = Config {
        header_compression: false,
    };
    let frame = Frame::SynStream(SynStreamFrame {
        header: ControlFrameHeader::default(),
        stream_id: 1,
        associated_stream_id: 2,
        priority: 7,
        slot: 1,
        headers: request_headers(),
    });

    let mut writer = FrameWriter::with_config(Vec::new(), &config).unwrap();
    writer.write_frame(&frame).unwrap();
    let bytes = writer.into_inner();
    assert_eq!(length_field(&bytes), bytes.len() - 8);

    let mut reader = FrameReader::with_config(&bytes[..], &config);
    assert_eq!(reader.read_frame().unwrap(), frame);
}

#[test]
fn raw_mode_block_must_fill_frame_exactly() {
    let config = Config {
        header_compression: false,
    };
    // An empty block (4 zero bytes) plus one stray byte.
    let mut bytes = vec![0x80, 0x03, 0x00, 0x02, 0x00, 0x00, 0x00, 0x09];
    bytes.extend_from_slice(&1u32.to_be_bytes());
    bytes.extend_from_slice(&[0, 0, 0, 0, 0xff]);
    let err = FrameReader::with_config(&bytes[..], &config)
        .read_frame()
        .unwrap_err();
    assert!(matches!(err, Error::InvalidControlFrame { stream_id: 1 }));
}

// -- Transport errors --

#[test]
fn short_stream_surfaces_io_error() {
    let bytes = [0x80, 0x03, 0x00];
    let err = FrameReader::new(&bytes[..]).read_frame().unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}
