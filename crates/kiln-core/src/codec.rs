//! Message framing for the control socket.
//!
//! Every message is a 4-byte big-endian length prefix followed by exactly
//! that many bytes of UTF-8 JSON:
//!
//! ```text
//! [u32 BE: len][UTF-8 JSON bytes of len]
//! ```
//!
//! The codec is stateless: each function handles one message and keeps
//! nothing between calls. Every decoding failure is a [`TransportError`],
//! never an application error.

use crate::config::RpcConfig;
use crate::error::TransportError;
use crate::protocol::{Request, Response};
use std::io::{self, Read, Write};

type Result<T> = std::result::Result<T, TransportError>;

/// Validate a frame header and return the payload length it announces.
pub fn frame_len(header: [u8; RpcConfig::FRAME_HEADER_LEN]) -> Result<usize> {
    let len = u32::from_be_bytes(header) as usize;
    if len > RpcConfig::MAX_MESSAGE_SIZE {
        return Err(TransportError::FrameTooLarge {
            len,
            max: RpcConfig::MAX_MESSAGE_SIZE,
        });
    }
    Ok(len)
}

/// Prefix `payload` with its length.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > RpcConfig::MAX_MESSAGE_SIZE {
        return Err(TransportError::FrameTooLarge {
            len: payload.len(),
            max: RpcConfig::MAX_MESSAGE_SIZE,
        });
    }
    let mut frame = Vec::with_capacity(RpcConfig::FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Read one length-prefixed frame.
///
/// EOF before the first header byte means the peer closed the connection;
/// EOF anywhere later means the frame was truncated. Both are reported as
/// [`TransportError::Closed`].
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let mut header = [0u8; RpcConfig::FRAME_HEADER_LEN];
    read_exact_or_closed(reader, &mut header)?;

    let len = frame_len(header)?;
    let mut payload = vec![0u8; len];
    read_exact_or_closed(reader, &mut payload)?;

    Ok(payload)
}

/// Write one length-prefixed frame and flush.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<()> {
    let frame = encode_frame(payload)?;
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

fn read_exact_or_closed<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(TransportError::Closed),
        Err(e) => Err(e.into()),
    }
}

/// Serialize a request into a complete frame, prefix included.
pub fn encode_request(request: &Request) -> Result<Vec<u8>> {
    let payload = serde_json::to_vec(request)?;
    encode_frame(&payload)
}

/// Read exactly one frame and parse it as a response.
pub fn decode_response<R: Read>(reader: &mut R) -> Result<Response> {
    let payload = read_frame(reader)?;
    Ok(serde_json::from_slice(&payload)?)
}

/// Serialize a response into a complete frame, prefix included.
pub fn encode_response(response: &Response) -> Result<Vec<u8>> {
    let payload = serde_json::to_vec(response)?;
    encode_frame(&payload)
}

/// Parse a frame payload (prefix already stripped) as a request.
pub fn decode_request(payload: &[u8]) -> Result<Request> {
    Ok(serde_json::from_slice(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{GetEntry, GetKeyValue, ResponsePayload, VolumeDescription};
    use std::io::Cursor;

    #[test]
    fn test_frame_read_write_roundtrip() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"hello world").unwrap();
        assert_eq!(&buf[..4], &11u32.to_be_bytes());

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_frame(&mut cursor).unwrap(), b"hello world".to_vec());
    }

    #[test]
    fn test_frame_read_empty_stream_is_closed() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        assert!(matches!(read_frame(&mut cursor), Err(TransportError::Closed)));
    }

    #[test]
    fn test_frame_read_truncated_payload_is_closed() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&10u32.to_be_bytes());
        buf.extend_from_slice(b"short");

        let mut cursor = Cursor::new(buf);
        assert!(matches!(read_frame(&mut cursor), Err(TransportError::Closed)));
    }

    #[test]
    fn test_frame_read_oversized_returns_error() {
        let huge_len = (RpcConfig::MAX_MESSAGE_SIZE + 1) as u32;
        let mut buf = Vec::new();
        buf.extend_from_slice(&huge_len.to_be_bytes());
        buf.extend_from_slice(&[0u8; 8]);

        let mut cursor = Cursor::new(buf);
        match read_frame(&mut cursor) {
            Err(TransportError::FrameTooLarge { len, max }) => {
                assert_eq!(len, RpcConfig::MAX_MESSAGE_SIZE + 1);
                assert_eq!(max, RpcConfig::MAX_MESSAGE_SIZE);
            }
            other => panic!("Expected FrameTooLarge, got: {:?}", other),
        }
    }

    #[test]
    fn test_decode_malformed_payload() {
        let frame = encode_frame(b"{not json").unwrap();
        let result = decode_response(&mut Cursor::new(frame));
        assert!(matches!(result, Err(TransportError::Malformed(_))));
    }

    #[test]
    fn test_response_roundtrip_preserves_nested_values() {
        let response = Response::success(ResponsePayload::Get {
            list: vec![
                GetEntry {
                    name: "a".into(),
                    keyval: vec![GetKeyValue {
                        variable: "state".into(),
                        error: None,
                        error_msg: None,
                        value: Some("running".into()),
                    }],
                },
                GetEntry {
                    name: "b".into(),
                    keyval: vec![GetKeyValue {
                        variable: "state".into(),
                        error: Some(6),
                        error_msg: Some("no such data".into()),
                        value: None,
                    }],
                },
            ],
        });

        let frame = encode_response(&response).unwrap();
        let decoded = decode_response(&mut Cursor::new(frame)).unwrap();
        assert_eq!(decoded, response);

        let volumes = Response::success(ResponsePayload::VolumeList {
            list: vec![VolumeDescription {
                path: "/v".into(),
                source: String::new(),
                quota: "10G".into(),
                flags: String::new(),
                used: 4096,
                available: 10 << 30,
            }],
        });
        let frame = encode_response(&volumes).unwrap();
        assert_eq!(decode_response(&mut Cursor::new(frame)).unwrap(), volumes);
    }

    #[test]
    fn test_two_frames_back_to_back() {
        let mut buf = encode_response(&Response::ok()).unwrap();
        buf.extend(encode_response(&Response::success(ResponsePayload::Wait { name: "x".into() })).unwrap());

        let mut cursor = Cursor::new(buf);
        assert_eq!(decode_response(&mut cursor).unwrap(), Response::ok());
        assert!(matches!(
            decode_response(&mut cursor).unwrap().result,
            Some(ResponsePayload::Wait { .. })
        ));
        assert!(matches!(decode_response(&mut cursor), Err(TransportError::Closed)));
    }

    #[test]
    fn test_request_roundtrip() {
        let request = Request::Get {
            names: vec!["a".into(), "b".into()],
            variables: vec!["state".into()],
        };
        let frame = encode_request(&request).unwrap();
        let payload = read_frame(&mut Cursor::new(frame)).unwrap();
        assert_eq!(decode_request(&payload).unwrap(), request);
    }
}
