// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Protocol unit tests

use std::collections::HashMap;

use super::*;

#[test]
fn encode_decode_create_job() {
    let request = Request::CreateJob {
        job: JobSpec {
            project_id: ProjectId(1),
            pipeline_id: PipelineId(7),
            name: "deploy".to_string(),
            resource_group: Some("$CI_ENVIRONMENT_NAME".to_string()),
            variables: HashMap::from([(
                "CI_ENVIRONMENT_NAME".to_string(),
                "production".to_string(),
            )]),
        },
    };

    let encoded = encode(&request).expect("encode failed");
    let decoded: Request = decode(&encoded).expect("decode failed");

    assert_eq!(request, decoded);
}

#[test]
fn requests_are_tagged_by_type() {
    let encoded = encode(&Request::Drop {
        id: ProcessableId(3),
        reason: FailureReason::ScriptFailure,
    })
    .expect("encode failed");

    let json: serde_json::Value = serde_json::from_slice(&encoded).expect("valid JSON");
    assert_eq!(json["type"], "Drop");
    assert_eq!(json["id"], 3);
    assert_eq!(json["reason"], "script_failure");
}

#[test]
fn job_spec_fields_are_optional_on_the_wire() {
    let request: Request = decode(
        br#"{"type":"CreateJob","job":{"project_id":1,"pipeline_id":2,"name":"lint"}}"#,
    )
    .expect("decode failed");

    match request {
        Request::CreateJob { job } => {
            assert_eq!(job.resource_group, None);
            assert!(job.variables.is_empty());
        }
        other => panic!("Expected CreateJob, got {:?}", other),
    }
}

#[test]
fn nested_query_decodes() {
    let request: Request =
        decode(br#"{"type":"Query","query":{"kind":"GetGroup","id":4}}"#).expect("decode failed");

    assert_eq!(
        request,
        Request::Query {
            query: Query::GetGroup {
                id: ResourceGroupId(4)
            }
        }
    );
}

#[test]
fn unknown_request_is_a_json_error() {
    let err = decode::<Request>(br#"{"type":"Reboot"}"#).unwrap_err();
    assert!(matches!(err, ProtocolError::Json(_)));
}

#[tokio::test]
async fn read_write_message_roundtrip() {
    let original = b"hello world";

    let mut buffer = Vec::new();
    write_message(&mut buffer, original)
        .await
        .expect("write failed");

    // write_message adds 4-byte length prefix
    assert_eq!(buffer.len(), 4 + original.len());

    let mut cursor = std::io::Cursor::new(buffer);
    let read_back = read_message(&mut cursor).await.expect("read failed");

    assert_eq!(read_back, original);
}

#[tokio::test]
async fn write_message_adds_length_prefix() {
    let data = b"test data";

    let mut buffer = Vec::new();
    write_message(&mut buffer, data)
        .await
        .expect("write failed");

    let len = u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]) as usize;
    assert_eq!(len, data.len());
    assert_eq!(&buffer[4..], data);
}

#[tokio::test]
async fn empty_stream_is_connection_closed() {
    let mut cursor = std::io::Cursor::new(Vec::new());

    let err = read_message(&mut cursor).await.unwrap_err();

    assert!(matches!(err, ProtocolError::ConnectionClosed));
}

#[tokio::test]
async fn oversized_length_is_rejected_before_reading() {
    let prefix = ((MAX_MESSAGE_SIZE + 1) as u32).to_be_bytes().to_vec();
    let mut cursor = std::io::Cursor::new(prefix);

    let err = read_message(&mut cursor).await.unwrap_err();

    assert!(matches!(err, ProtocolError::TooLarge(n) if n == MAX_MESSAGE_SIZE + 1));
}

#[tokio::test]
async fn request_over_a_stream() {
    let mut buffer = Vec::new();
    let data = encode(&Request::Assign {
        group_id: ResourceGroupId(2),
    })
    .expect("encode failed");
    write_message(&mut buffer, &data).await.expect("write failed");

    let mut cursor = std::io::Cursor::new(buffer);
    let request = read_request(&mut cursor, DEFAULT_TIMEOUT)
        .await
        .expect("read failed");

    assert_eq!(
        request,
        Request::Assign {
            group_id: ResourceGroupId(2)
        }
    );
}
