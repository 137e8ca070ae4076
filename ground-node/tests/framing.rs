//! Frame codec behaviour over real TCP streams.

mod common;

use ground_node::protocol::{Message, data_type, decode, encode, encode_fields};
use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

fn socket_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    let (server, _) = listener.accept().unwrap();
    (client, server)
}

#[test]
fn test_motor_speeds_scenario() {
    let frame = encode_fields(data_type::MOTOR_SPEEDS, "[1,1,1,1,1,1]", "None").unwrap();
    let (mut client, mut server) = socket_pair();
    client.write_all(&frame).unwrap();

    let body = decode(&mut server).unwrap();
    assert!(body.starts_with(r#"{"dataType":"motorSpds","data":"[1,1,1,1,1,1]","timestamp":"#));
    assert!(body.ends_with(r#","metadata":"None"}"#));

    let msg = Message::parse(&body).unwrap();
    assert_eq!(msg.data, "[1,1,1,1,1,1]");
}

#[test]
fn test_decode_blocks_until_end_delimiter() {
    let (mut client, mut server) = socket_pair();
    let (tx, rx) = mpsc::channel();

    let reader = thread::spawn(move || {
        let body = decode(&mut server).unwrap();
        tx.send(body).unwrap();
    });

    client.write_all(b"<{\"dataType\":\"imu\",").unwrap();
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

    client
        .write_all(b"\"data\":\"7\",\"timestamp\":2.5,\"metadata\":\"None\"}><next>")
        .unwrap();
    let body = rx.recv_timeout(common::DEADLINE).unwrap();
    assert_eq!(
        body,
        r#"{"dataType":"imu","data":"7","timestamp":2.5,"metadata":"None"}"#
    );
    reader.join().unwrap();
}

#[test]
fn test_decode_on_nonblocking_stream() {
    let (mut client, mut server) = socket_pair();
    server.set_nonblocking(true).unwrap();

    let writer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        client.write_all(b"<{\"a\":1}>").unwrap();
        client
    });

    assert_eq!(decode(&mut server).unwrap(), r#"{"a":1}"#);
    drop(writer.join().unwrap());
}

#[test]
fn test_round_trip_preserves_fields() {
    let cases = [
        ("motorSpds", "[0.5, -0.25, 0.0]", "None"),
        ("connInfo", "closing", "None"),
        ("settings", "{'drive':'tank'}", "from operator"),
    ];
    let (mut client, mut server) = socket_pair();

    for (data_type, data, metadata) in cases {
        let msg = Message::new(data_type, data, metadata);
        client.write_all(&encode(&msg).unwrap()).unwrap();
    }

    for (data_type, data, metadata) in cases {
        let msg = Message::parse(&decode(&mut server).unwrap()).unwrap();
        assert_eq!(msg.data_type, data_type);
        assert_eq!(msg.data, data);
        assert_eq!(msg.metadata, metadata);
    }
}

#[test]
fn test_peer_close_mid_frame_is_disconnect() {
    let (mut client, mut server) = socket_pair();
    client.write_all(b"<{\"partial").unwrap();
    drop(client);
    assert!(matches!(
        decode(&mut server),
        Err(ground_node::Error::Disconnected)
    ));
}
