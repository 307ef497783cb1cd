//! End-to-end tests: mock nodes through supervisors, queues, gate and relay
//! into an in-memory downstream.

use rand::{Rng, SeedableRng};
use setu::app::{self, Running};
use setu::config::AppConfig;
use setu::core::{DeviceRole, NodeId, PacketType, PlayerId};
use setu::link::MockLink;
use setu::protocol::{build_frame, Control, Reassembler, FRAME_SIZE};
use setu::relay::{MockConnector, RelayFrame};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const WINDOW: u32 = 4;
const QUIET: [f32; 3] = [0.2, 0.3, 0.1];
const SWING: [f32; 3] = [1.0, 1.0, 1.0];

fn data_frame(node: NodeId, seq: bool, shot: bool, accel: [f32; 3]) -> [u8; FRAME_SIZE] {
    let mut control = Control::new(PacketType::Data, seq, node.player, node.role);
    control.shot_sent = shot && node.role == DeviceRole::Emitter;
    control.shot_received = shot && node.role == DeviceRole::Receiver;
    build_frame(control.to_byte(), &[16384, 0, -16384], &accel)
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

fn test_config() -> AppConfig {
    let mut config = AppConfig::two_player_defaults();
    config.link.poll_timeout_ms = 5;
    config.link.handshake_timeout_ms = 60_000;
    config.link.silence_fault_ms = 0;
    config.link.reconnect_initial_ms = 1;
    config.link.reconnect_max_ms = 5;
    config.relay.reconnect_initial_ms = 1;
    config.relay.reconnect_max_ms = 5;
    config.gate.window_size = WINDOW;
    config
}

struct Harness {
    running: Arc<AtomicBool>,
    relay: Running,
    links: HashMap<NodeId, MockLink>,
    downstream: MockConnector,
}

impl Harness {
    fn start() -> Self {
        let config = test_config();
        let running = Arc::new(AtomicBool::new(true));
        let downstream = MockConnector::new();
        let mut links = HashMap::new();
        let relay = app::start_with(
            &config,
            |node| {
                let link = MockLink::responsive();
                links.insert(node.node_id(), link.clone());
                link
            },
            downstream.clone(),
            Arc::clone(&running),
        )
        .unwrap();

        let harness = Self {
            running,
            relay,
            links,
            downstream,
        };
        assert!(
            harness.wait_for_connect_frames(),
            "players never announced as connected"
        );
        harness
    }

    fn link(&self, player: PlayerId, role: DeviceRole) -> &MockLink {
        &self.links[&NodeId::new(player, role)]
    }

    fn send_data(&self, player: PlayerId, role: DeviceRole, shot: bool, accel: [f32; 3]) {
        let node = NodeId::new(player, role);
        self.link(player, role)
            .inject_notification(&data_frame(node, true, shot, accel));
    }

    /// Both players fully connected and announced downstream
    fn wait_for_connect_frames(&self) -> bool {
        wait_until(Duration::from_secs(5), || {
            let frames = self.downstream.frames();
            PlayerId::ALL.into_iter().all(|p| {
                frames.iter().any(|f| f.connect && f.player() == p)
                    && self.relay.aggregator(p).is_some_and(|a| a.can_forward())
            })
        })
    }

    fn readings(&self, player: PlayerId) -> Vec<RelayFrame> {
        self.downstream
            .frames()
            .into_iter()
            .filter(|f| f.player() == player && !f.connect && !f.disconnect)
            .collect()
    }

    fn stop(self) -> app::RunSummary {
        self.running.store(false, Ordering::Relaxed);
        self.relay.join().unwrap()
    }
}

#[test]
fn test_reassembly_with_random_chunking() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(0x5e7);
    let node = NodeId::new(PlayerId::Two, DeviceRole::Motion);

    for _ in 0..50 {
        let count = rng.gen_range(1..40);
        let frames: Vec<[u8; FRAME_SIZE]> = (0..count)
            .map(|i| data_frame(node, i % 2 == 0, false, [i as f32, rng.gen(), rng.gen()]))
            .collect();
        let stream = frames.concat();

        let mut reassembler = Reassembler::new();
        let mut out = Vec::new();
        let mut at = 0;
        while at < stream.len() {
            let size = rng.gen_range(1..=3 * FRAME_SIZE).min(stream.len() - at);
            reassembler.push(&stream[at..at + size], |f| out.push(*f));
            at += size;
        }

        assert_eq!(out, frames);
        assert_eq!(reassembler.pending(), 0);
    }
}

#[test]
fn test_gesture_and_shots_forwarded() {
    let harness = Harness::start();

    harness.send_data(PlayerId::One, DeviceRole::Motion, false, QUIET);
    harness.send_data(PlayerId::One, DeviceRole::Motion, false, SWING);
    for _ in 0..WINDOW + 3 {
        harness.send_data(PlayerId::One, DeviceRole::Motion, false, QUIET);
    }
    harness.send_data(PlayerId::Two, DeviceRole::Emitter, true, [0.0; 3]);
    harness.send_data(PlayerId::Two, DeviceRole::Receiver, true, [0.0; 3]);

    assert!(wait_until(Duration::from_secs(5), || {
        harness.readings(PlayerId::One).len() == WINDOW as usize
            && harness.readings(PlayerId::Two).len() == 2
    }));

    let p1 = harness.readings(PlayerId::One);
    assert_eq!(p1[0].accel, SWING);
    assert!(p1[1..].iter().all(|f| f.accel == QUIET));
    assert_eq!(p1[0].gyro, [1.0, 0.0, -1.0]);

    // Emitter and receiver run on separate threads: no order between them
    let p2 = harness.readings(PlayerId::Two);
    assert_eq!(
        p2.iter().filter(|f| f.shot_sent && !f.shot_received).count(),
        1
    );
    assert_eq!(
        p2.iter().filter(|f| f.shot_received && !f.shot_sent).count(),
        1
    );
    assert!(p2.iter().all(|f| f.accel == [0.0; 3]));

    // Quiet samples after the window stay gated
    thread::sleep(Duration::from_millis(50));
    assert_eq!(harness.readings(PlayerId::One).len(), WINDOW as usize);

    let summary = harness.stop();
    assert_eq!(summary.links.len(), 6);
    assert_eq!(summary.relay.forwarded, WINDOW as u64 + 2);
    assert!(summary.relay.gated_out >= 1);
}

#[test]
fn test_node_fault_announced_and_recovered() {
    let harness = Harness::start();
    harness.link(PlayerId::One, DeviceRole::Emitter).inject_fault();

    assert!(wait_until(Duration::from_secs(5), || {
        let frames = harness.downstream.frames();
        let Some(gone) = frames
            .iter()
            .position(|f| f.disconnect && f.player() == PlayerId::One)
        else {
            return false;
        };
        frames[gone + 1..]
            .iter()
            .any(|f| f.connect && f.player() == PlayerId::One)
    }));
    assert!(!harness
        .downstream
        .frames()
        .iter()
        .any(|f| f.disconnect && f.player() == PlayerId::Two));

    // Forwarding resumes once the node is back
    harness.send_data(PlayerId::One, DeviceRole::Emitter, true, [0.0; 3]);
    assert!(wait_until(Duration::from_secs(5), || {
        harness.readings(PlayerId::One).iter().any(|f| f.shot_sent)
    }));

    let summary = harness.stop();
    let emitter = summary
        .links
        .iter()
        .find(|(label, _)| label == "Player 1 Emitter")
        .map(|(_, stats)| stats.clone())
        .unwrap();
    assert_eq!(emitter.reconnects, 1);
    assert_eq!(emitter.handshakes_sent, 2);
}

#[test]
fn test_downstream_fault_starts_clean_session() {
    let harness = Harness::start();
    harness.downstream.fail_next_send();
    harness.send_data(PlayerId::Two, DeviceRole::Emitter, true, [0.0; 3]);

    assert!(wait_until(Duration::from_secs(5), || {
        harness.downstream.session_count() == 2
            && harness.downstream.session_frames(1).len() >= 2
    }));

    // The new session opens with a connect frame for each ready player
    let session = harness.downstream.session_frames(1);
    let mut announced: Vec<PlayerId> = session[..2].iter().map(|f| f.player()).collect();
    announced.sort_by_key(|p| p.index());
    assert!(session[..2].iter().all(|f| f.connect));
    assert_eq!(announced, vec![PlayerId::One, PlayerId::Two]);

    harness.send_data(PlayerId::Two, DeviceRole::Receiver, true, [0.0; 3]);
    assert!(wait_until(Duration::from_secs(5), || {
        harness
            .downstream
            .session_frames(1)
            .iter()
            .any(|f| f.shot_received)
    }));

    let summary = harness.stop();
    assert_eq!(summary.relay.transport_reconnects, 1);
}
