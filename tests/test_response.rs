use gurt::protocol::response::{Response, ResponseBuilder, StatusCode};
use gurt::protocol::writer::{ResponseWriter, serialize_response};

#[test]
fn test_status_code_as_u16() {
    assert_eq!(StatusCode::SwitchingProtocols.as_u16(), 101);
    assert_eq!(StatusCode::Ok.as_u16(), 200);
    assert_eq!(StatusCode::Created.as_u16(), 201);
    assert_eq!(StatusCode::NoContent.as_u16(), 204);
    assert_eq!(StatusCode::BadRequest.as_u16(), 400);
    assert_eq!(StatusCode::NotFound.as_u16(), 404);
    assert_eq!(StatusCode::MethodNotAllowed.as_u16(), 405);
    assert_eq!(StatusCode::InternalServerError.as_u16(), 500);
}

#[test]
fn test_status_code_reason_phrase() {
    assert_eq!(StatusCode::Ok.reason_phrase(), "OK");
    assert_eq!(StatusCode::NoContent.reason_phrase(), "No Content");
    assert_eq!(StatusCode::NotFound.reason_phrase(), "Not Found");
    assert_eq!(
        StatusCode::InternalServerError.reason_phrase(),
        "Internal Server Error"
    );
}

#[test]
fn test_response_builder_basic() {
    let response = ResponseBuilder::new(StatusCode::Ok)
        .body(b"Hello, World!".to_vec())
        .build();

    assert_eq!(response.status, 200);
    assert_eq!(response.reason, "OK");
    assert_eq!(response.body, b"Hello, World!".to_vec());
}

#[test]
fn test_response_builder_adds_standard_headers() {
    let response = ResponseBuilder::new(StatusCode::Ok).body("body").build();

    assert_eq!(response.header("content-length"), Some("4"));
    assert_eq!(response.header("server"), Some("GURT/1.0.0"));
    assert!(response.header("date").unwrap().ends_with(" GMT"));
}

#[test]
fn test_content_length_counts_bytes() {
    let response = Response::ok("€");
    assert_eq!(response.header("content-length"), Some("3"));
}

#[test]
fn test_caller_headers_win() {
    let response = ResponseBuilder::new(StatusCode::Ok)
        .header("Server", "custom")
        .header("Date", "Thu, 01 Jan 1970 00:00:00 GMT")
        .header("Content-Length", "11")
        .build();

    assert_eq!(response.header("server"), Some("custom"));
    assert_eq!(response.header("date"), Some("Thu, 01 Jan 1970 00:00:00 GMT"));
    assert_eq!(response.header("content-length"), Some("11"));
    assert_eq!(response.headers.len(), 3);
}

#[test]
fn test_header_replaced_case_insensitively() {
    let response = ResponseBuilder::new(StatusCode::Ok)
        .header("X-Custom", "one")
        .header("x-custom", "two")
        .build();

    assert_eq!(response.header("X-CUSTOM"), Some("two"));
    assert_eq!(
        response
            .headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("x-custom"))
            .count(),
        1
    );
}

#[test]
fn test_without_content_length() {
    let response = ResponseBuilder::new(StatusCode::NoContent)
        .without_content_length()
        .build();

    assert_eq!(response.header("content-length"), None);
}

#[test]
fn test_custom_reason() {
    let response = ResponseBuilder::with_reason(418, "I'm a teapot").build();

    let bytes = serialize_response(&response);
    assert!(bytes.starts_with(b"GURT/1.0.0 418 I'm a teapot\r\n"));
}

#[test]
fn test_not_found() {
    let response = Response::not_found();

    assert_eq!(response.status, 404);
    assert_eq!(response.header("content-type"), Some("text/plain"));
    assert_eq!(response.header("content-length"), Some("9"));
    assert_eq!(response.body, b"Not Found");
}

#[test]
fn test_internal_error() {
    let response = Response::internal_error();
    assert_eq!(response.status, 500);
    assert_eq!(response.body, b"Internal Server Error");
}

#[test]
fn test_serialize_response_format() {
    let response = ResponseBuilder::new(StatusCode::Ok)
        .header("content-type", "text/plain")
        .header("date", "Sun, 18 Oct 2026 09:05:03 GMT")
        .body("Hello World")
        .build();

    let bytes = serialize_response(&response);

    assert_eq!(
        String::from_utf8(bytes).unwrap(),
        "GURT/1.0.0 200 OK\r\n\
         content-type: text/plain\r\n\
         date: Sun, 18 Oct 2026 09:05:03 GMT\r\n\
         content-length: 11\r\n\
         server: GURT/1.0.0\r\n\
         \r\n\
         Hello World"
    );
}

#[tokio::test]
async fn test_response_writer_writes_full_frame() {
    let response = Response::ok("payload");
    let expected = serialize_response(&response);

    let mut out: Vec<u8> = Vec::new();
    ResponseWriter::new(&response)
        .write_to_stream(&mut out)
        .await
        .unwrap();

    assert_eq!(out, expected);
}

#[test]
fn test_acknowledgment_shares_status_line() {
    let switching = ResponseBuilder::new(StatusCode::SwitchingProtocols).build();
    let frame = serialize_response(&switching);
    let ack = gurt::protocol::handshake::acknowledgment("Sun, 18 Oct 2026 09:05:03 GMT");

    let first_line = |bytes: &[u8]| {
        let end = bytes.windows(2).position(|w| w == b"\r\n").unwrap();
        bytes[..end].to_vec()
    };
    assert_eq!(first_line(&ack), first_line(&frame));
    assert_eq!(first_line(&ack), b"GURT/1.0.0 101 SWITCHING_PROTOCOLS");
}
