mod common;

use embassy_futures::block_on;
use embassy_time::Duration;
use myrtio_at_mqtt::Error;
use myrtio_at_mqtt::framer::Classified;
use myrtio_at_mqtt::framer::line::Line;
use myrtio_at_mqtt::transport::pump_rx;

use common::rig;

const SHORT: Duration = Duration::from_millis(30);

#[test]
fn command_resolves_on_expected_line() {
    let (_framer, client, script) = rig();
    script.on("AT+CWJAP", &["WIFI CONNECTED", "WIFI GOT IP", "OK"]);

    let response = block_on(async {
        let mut client = client.lock().await;
        client.send_command("AT+CWJAP=\"lab\",\"pw\"", "WIFI GOT IP", SHORT).await
    });

    assert_eq!(response.unwrap().as_str(), "");
    assert_eq!(script.lines(), vec!["AT+CWJAP=\"lab\",\"pw\""]);
}

#[test]
fn response_payload_follows_the_prefix() {
    let (_framer, client, script) = rig();
    script.on("AT+GMR", &["AT version:2.2.0", "+GMR:1.2", "OK"]);

    let response = block_on(async {
        client.lock().await.send_command("AT+GMR", "+GMR:", SHORT).await
    });

    assert_eq!(response.unwrap().as_str(), "1.2");
}

#[test]
fn late_answer_to_timed_out_command_is_discarded() {
    let (framer, client, script) = rig();

    let first = block_on(async { client.lock().await.send_command("AT", "OK", SHORT).await });
    assert_eq!(first, Err(Error::Timeout));
    assert!(!framer.slot().is_waiting());

    // The modem finally answers the abandoned command.
    let late = Line::from_slice(b"OK").unwrap();
    assert_eq!(framer.dispatch(late), Classified::Unclassified);

    script.on("ATE0", &["OK"]);
    let second = block_on(async { client.lock().await.send_command("ATE0", "OK", SHORT).await });
    assert!(second.is_ok());
}

#[test]
fn async_publish_during_command_is_queued_not_consumed() {
    let (framer, client, script) = rig();
    script.on("AT+MQTTSUB", &["+MQTTSUBRECV:0,\"t\",1,x", "OK"]);

    let response = block_on(async {
        client.lock().await.send_command("AT+MQTTSUB=0,\"t\",0", "OK", SHORT).await
    });

    assert!(response.is_ok());
    let line = framer.try_receive_async_line().unwrap();
    assert_eq!(line.as_slice(), b"+MQTTSUBRECV:0,\"t\",1,x");
    assert!(framer.try_receive_async_line().is_none());
}

#[test]
fn raw_data_follows_the_prompt() {
    let (_framer, client, script) = rig();
    script.on("AT+MQTTPUBRAW", &[">"]);

    let result = block_on(async {
        let mut client = client.lock().await;
        client.send_command("AT+MQTTPUBRAW=0,\"t\",3,0,0", ">", SHORT).await?;
        client.send_raw(&[1, 2, 3], "+MQTTPUB:OK", SHORT).await
    });

    assert!(result.is_ok());
    assert_eq!(script.raw(), vec![vec![1, 2, 3]]);
}

#[test]
fn byte_by_byte_delivery_yields_one_line() {
    let (framer, _client, _script) = rig();
    for byte in b"+MQTTSUBRECV:0,\"a/b\",5,hello\r\n" {
        framer.on_byte_received(*byte);
    }
    assert_eq!(framer.pending_len(), 0);
    assert!(framer.try_receive_async_line().is_some());
    assert!(framer.try_receive_async_line().is_none());
}

#[test]
fn stray_bytes_do_not_break_the_next_line() {
    let (framer, _client, _script) = rig();
    framer.on_bytes(b"\0\n\r\r\nCLOSED\r\n");
    assert!(framer.take_closed());
    assert_eq!(framer.pending_len(), 0);
}

#[test]
fn pump_rx_feeds_the_framer_until_end_of_stream() {
    let (framer, _client, _script) = rig();
    let stream: &[u8] = b"busy p...\r\n+MQTTSUBRECV:0,\"t\",2,ok\r\nCLOSED\r\n";

    let result = block_on(pump_rx(stream, framer));

    assert!(result.is_ok());
    assert!(framer.try_receive_async_line().is_some());
    assert!(framer.take_closed());
}
