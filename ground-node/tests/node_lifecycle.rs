//! End-to-end tests of the Ground Node against a scripted Water Node.
//!
//! Every test binds ephemeral ports on localhost, so they can run in parallel.

mod common;

use common::{DEADLINE, Peer, fast_config, wait_until};
use ground_node::input::{AxisMixer, ChannelGamepad, InputEvent, SingleController};
use ground_node::protocol::data_type;
use ground_node::settings::SettingChange;
use ground_node::video::IdleVideoSource;
use ground_node::{Collaborators, GroundConfig, GroundNode, LoopName, RunningNode};
use crossbeam_channel::Sender;
use std::net::TcpListener;
use std::thread;
use std::time::{Duration, Instant};

fn start_with_pad(config: GroundConfig) -> (RunningNode, Sender<InputEvent>) {
    let (events, pad) = ChannelGamepad::pair("test pad");
    let running = GroundNode::new(config)
        .start(Collaborators {
            controllers: Box::new(SingleController::new(pad)),
            mixer: Box::new(AxisMixer::new()),
            video: Box::new(IdleVideoSource::new(Duration::from_millis(10))),
        })
        .expect("node starts");
    (running, events)
}

#[test]
fn test_stop_code_sends_closing_twice_and_stops_everything() {
    let (running, events) = start_with_pad(fast_config());
    let run_state = running.run_state();

    let mut sensor = Peer::connect_sensor(&running);
    let mut control = Peer::connect_control(&running);

    sensor.send("imu", "[0.1, 0.2, 9.8]");

    events.send(InputEvent::axis(0, 32767)).unwrap();
    let motor = control
        .recv_type(data_type::MOTOR_SPEEDS)
        .expect("motor command");
    assert_eq!(motor.data, "[1.0, 0.0, 0.0, 0.0, 0.0, 0.0]");
    assert_eq!(motor.metadata, "None");

    // Let the sensor frame be ingested before shutdown
    thread::sleep(Duration::from_millis(300));

    events.send(InputEvent::key(315, true)).unwrap();
    let rest = control.recv_until_closed();
    let closing: Vec<_> = rest.iter().filter(|m| m.is_closing()).collect();
    assert_eq!(closing.len(), 2);
    assert!(closing[0].timestamp <= closing[1].timestamp);

    let report = running.wait();
    assert!(run_state.all_stopped());

    let dispatch = report.dispatch.expect("dispatch finished");
    assert_eq!(dispatch.motor_frames, 1);
    assert_eq!(dispatch.closing_frames, 2);

    let telemetry = report.telemetry.expect("telemetry finished");
    assert_eq!(telemetry.frames, 1);
    assert_eq!(telemetry.malformed, 0);
    assert!(telemetry.last_latency.unwrap() >= 0.0);

    assert_eq!(report.video_frames, Some(0));
}

#[test]
fn test_stop_all_before_any_peer_connects() {
    let (running, _events) = start_with_pad(fast_config());
    assert!(running.sensor_addr(DEADLINE).is_some());
    assert!(running.control_addr(DEADLINE).is_some());

    let start = Instant::now();
    running.run_state().stop_all();
    let report = running.wait();

    assert!(start.elapsed() < DEADLINE);
    assert_eq!(report.telemetry.unwrap().frames, 0);
    assert_eq!(report.dispatch.unwrap().motor_frames, 0);
    assert!(report.video_frames.is_some());
}

#[test]
fn test_stop_all_interrupts_wait_for_controller() {
    let running = GroundNode::new(fast_config())
        .start(Collaborators {
            controllers: Box::new(SingleController::none()),
            mixer: Box::new(AxisMixer::new()),
            video: Box::new(IdleVideoSource::new(Duration::from_millis(10))),
        })
        .unwrap();

    let _sensor = Peer::connect_sensor(&running);
    let mut control = Peer::connect_control(&running);

    // Several controller polls go by with nothing found
    thread::sleep(Duration::from_millis(200));
    running.run_state().stop_all();

    assert!(control.recv_until_closed().is_empty());
    let report = running.wait();
    assert_eq!(report.dispatch.unwrap(), Default::default());
}

#[test]
fn test_settings_changes_are_applied_and_forwarded() {
    let node = GroundNode::new(fast_config());
    let settings = node.settings();
    let handle = node.settings_handle();

    let (events, pad) = ChannelGamepad::pair("test pad");
    let running = node
        .start(Collaborators {
            controllers: Box::new(SingleController::new(pad)),
            mixer: Box::new(AxisMixer::new()),
            video: Box::new(IdleVideoSource::new(Duration::from_millis(10))),
        })
        .unwrap();

    let mut control = Peer::connect_control(&running);

    assert!(handle.submit(SettingChange::NumCams(2)));
    assert!(handle.submit(SettingChange::NumMotors(4)));

    let forwarded = control
        .recv_type(data_type::SETTINGS)
        .expect("settings forwarded");
    assert_eq!(forwarded.data, "{'numMotors':4}");
    assert!(wait_until(|| settings.snapshot().num_cams == 2));

    events.send(InputEvent::axis(3, -32767)).unwrap();
    let motor = control.recv_type(data_type::MOTOR_SPEEDS).unwrap();
    assert_eq!(motor.data, "[-1.0, 0.0, 0.0, 0.0]");

    running.run_state().stop_all();
    running.wait();
}

#[test]
fn test_control_peer_that_never_reads_cannot_block_shutdown() {
    let (running, events) = start_with_pad(fast_config());
    // Connected, but never drained
    let _control = Peer::connect_control(&running);

    // Far more motor frames than the socket buffers can hold
    for i in 0..400_000 {
        events.send(InputEvent::axis(0, i % 1000)).unwrap();
    }
    thread::sleep(Duration::from_millis(300));

    let start = Instant::now();
    running.run_state().stop_all();
    let report = running.wait();

    assert!(start.elapsed() < DEADLINE);
    assert!(report.dispatch.unwrap().motor_frames < 400_000);
}

#[test]
fn test_sensor_disconnect_leaves_control_running() {
    let (running, events) = start_with_pad(fast_config());
    let run_state = running.run_state();

    let sensor = Peer::connect_sensor(&running);
    let mut control = Peer::connect_control(&running);

    drop(sensor);
    thread::sleep(Duration::from_millis(100));

    // Only the telemetry loop is terminal; the flags are untouched
    assert!(run_state.is_running(LoopName::ReceiveData));
    assert!(run_state.is_running(LoopName::SendData));

    events.send(InputEvent::axis(0, 0)).unwrap();
    assert!(control.recv_type(data_type::MOTOR_SPEEDS).is_some());

    run_state.stop_all();
    let report = running.wait();
    assert_eq!(report.telemetry.unwrap().frames, 0);
    assert_eq!(report.dispatch.unwrap().motor_frames, 1);
}

#[test]
fn test_malformed_sensor_frames_are_skipped() {
    let (running, _events) = start_with_pad(fast_config());
    let mut sensor = Peer::connect_sensor(&running);

    sensor.send_raw(b"noise<not json><{}>");
    sensor.send("imu", "1.0");
    sensor.send_raw(b"<{\"dataType\":\"imu\"");
    thread::sleep(Duration::from_millis(20));
    sensor.send_raw(b",\"data\":\"2.0\",\"timestamp\":1.0,\"metadata\":\"None\"}>");

    thread::sleep(Duration::from_millis(300));

    running.run_state().stop_all();
    let telemetry = running.wait().telemetry.unwrap();
    assert_eq!(telemetry.frames, 2);
    assert_eq!(telemetry.malformed, 2);
    // The split frame carried an ancient timestamp
    assert!(telemetry.max_latency.unwrap() > 1_000_000.0);
}

#[test]
fn test_sensor_port_conflict_is_fatal_for_that_channel_only() {
    let holder = TcpListener::bind("127.0.0.1:0").unwrap();
    let mut config = fast_config();
    config.network.sensor_port = holder.local_addr().unwrap().port();

    let (running, events) = start_with_pad(config);
    assert!(running.sensor_addr(Duration::from_millis(500)).is_none());

    let mut control = Peer::connect_control(&running);
    events.send(InputEvent::axis(1, 100)).unwrap();
    assert!(control.recv_type(data_type::MOTOR_SPEEDS).is_some());

    running.run_state().stop_all();
    let report = running.wait();
    assert_eq!(report.telemetry.unwrap().frames, 0);
    drop(holder);
}
