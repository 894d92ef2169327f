// Copyright 2025 Beetle Relay Contributors
// SPDX-License-Identifier: Apache-2.0

//! The upstream relay client: one TCP connection, two cooperating threads
//! sharing the socket via `try_clone`. The sender drains `outbound_q` and
//! pairs gun/ankle IMU samples; the receiver parses incoming records and
//! pushes authoritative state into two single-slot queues that the gun and
//! vest sessions poll from READY.

use std::io::{self, Read};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use beetlerelay_state::{OutboundEvent, OutboundQueue, ServerGunState, ServerVestState, SingleSlot};
use crossbeam::channel::RecvTimeoutError;
use tracing::{debug, error, info, warn};

use crate::records::{ImuPairedRecord, OutboundEventRecord, ServerStateRecord};
use crate::wire::{write_record, RecordReader};

/// Non-blocking receiver poll interval when no data is waiting.
const RECEIVER_IDLE_SLEEP: Duration = Duration::from_millis(20);
/// How long the sender blocks on the outbound queue between shutdown checks.
const SENDER_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("failed to connect to upstream relay at {addr}: {source}")]
    Connect { addr: String, source: io::Error },
    #[error("failed to configure relay socket: {0}")]
    Configure(#[source] io::Error),
    #[error("failed to spawn relay worker thread: {0}")]
    Spawn(#[source] io::Error),
}

pub struct RelayClientConfig {
    pub host: String,
    pub port: u16,
    pub player_id: String,
    pub gun_beetle_id: String,
    pub ankle_beetle_id: String,
}

/// Owns the sender and receiver threads; dropping (or calling [`stop`])
/// signals both to exit and joins them.
pub struct RelayClient {
    shutdown: Arc<AtomicBool>,
    sender: Option<JoinHandle<()>>,
    receiver: Option<JoinHandle<()>>,
}

impl RelayClient {
    pub fn spawn(
        config: RelayClientConfig,
        outbound: Arc<OutboundQueue>,
        server_gun_slot: Arc<SingleSlot<ServerGunState>>,
        server_vest_slot: Arc<SingleSlot<ServerVestState>>,
    ) -> Result<Self, RelayError> {
        let addr = format!("{}:{}", config.host, config.port);
        let stream = TcpStream::connect(&addr).map_err(|source| RelayError::Connect {
            addr: addr.clone(),
            source,
        })?;
        stream.set_nodelay(true).map_err(RelayError::Configure)?;

        let sender_stream = stream.try_clone().map_err(RelayError::Configure)?;
        let receiver_stream = stream;
        receiver_stream
            .set_nonblocking(true)
            .map_err(RelayError::Configure)?;

        let shutdown = Arc::new(AtomicBool::new(false));

        let sender_shutdown = shutdown.clone();
        let sender_rx = outbound.receiver();
        let sender_player_id = config.player_id.clone();
        let gun_beetle_id = config.gun_beetle_id.clone();
        let ankle_beetle_id = config.ankle_beetle_id.clone();
        let sender = thread::Builder::new()
            .name("relay-sender".to_string())
            .spawn(move || {
                sender_loop(
                    sender_stream,
                    sender_rx,
                    sender_player_id,
                    gun_beetle_id,
                    ankle_beetle_id,
                    sender_shutdown,
                )
            })
            .map_err(RelayError::Spawn)?;

        let receiver_shutdown = shutdown.clone();
        let receiver_player_id = config.player_id;
        let receiver = thread::Builder::new()
            .name("relay-receiver".to_string())
            .spawn(move || {
                receiver_loop(
                    receiver_stream,
                    receiver_player_id,
                    server_gun_slot,
                    server_vest_slot,
                    receiver_shutdown,
                )
            })
            .map_err(RelayError::Spawn)?;

        Ok(Self {
            shutdown,
            sender: Some(sender),
            receiver: Some(receiver),
        })
    }

    /// True if either worker thread has exited (the TCP connection died).
    pub fn is_alive(&self) -> bool {
        self.sender.as_ref().is_some_and(|h| !h.is_finished())
            && self.receiver.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.sender.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.receiver.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RelayClient {
    fn drop(&mut self) {
        self.stop();
    }
}

fn sender_loop(
    mut stream: TcpStream,
    rx: crossbeam::channel::Receiver<OutboundEvent>,
    player_id: String,
    gun_beetle_id: String,
    ankle_beetle_id: String,
    shutdown: Arc<AtomicBool>,
) {
    let mut gun_slot: Option<[i16; 6]> = None;
    let mut ankle_slot: Option<[i16; 6]> = None;

    while !shutdown.load(Ordering::Relaxed) {
        match rx.recv_timeout(SENDER_POLL_INTERVAL) {
            Ok(OutboundEvent::Imu { beetle_id, samples }) => {
                if beetle_id == gun_beetle_id {
                    gun_slot = Some(samples);
                } else if beetle_id == ankle_beetle_id {
                    ankle_slot = Some(samples);
                } else {
                    warn!(beetle_id, "IMU sample from unrecognized beetle, dropped");
                    continue;
                }

                if let (Some(gun), Some(ankle)) = (gun_slot, ankle_slot) {
                    let record = ImuPairedRecord::new(player_id.clone(), gun, ankle);
                    if !send_record(&mut stream, &record) {
                        return;
                    }
                    gun_slot = None;
                    ankle_slot = None;
                }
            }
            Ok(OutboundEvent::Gunshot { player_id: pid, .. }) => {
                let record = OutboundEventRecord { kind: "G", player_id: pid };
                if !send_record(&mut stream, &record) {
                    return;
                }
            }
            Ok(OutboundEvent::Vestshot { player_id: pid, .. }) => {
                let record = OutboundEventRecord { kind: "V", player_id: pid };
                if !send_record(&mut stream, &record) {
                    return;
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("outbound queue disconnected, relay sender exiting");
                return;
            }
        }
    }
}

fn send_record<T: serde::Serialize>(stream: &mut TcpStream, record: &T) -> bool {
    match serde_json::to_vec(record) {
        Ok(json) => match write_record(stream, &json) {
            Ok(()) => true,
            Err(err) => {
                error!(error = %err, "upstream TCP write failed, closing relay sender");
                false
            }
        },
        Err(err) => {
            error!(error = %err, "failed to serialize outbound record");
            true
        }
    }
}

fn receiver_loop(
    mut stream: TcpStream,
    player_id: String,
    server_gun_slot: Arc<SingleSlot<ServerGunState>>,
    server_vest_slot: Arc<SingleSlot<ServerVestState>>,
    shutdown: Arc<AtomicBool>,
) {
    let mut reader = RecordReader::new();
    let mut buf = [0u8; 4096];

    while !shutdown.load(Ordering::Relaxed) {
        match stream.read(&mut buf) {
            Ok(0) => {
                info!("upstream closed the relay connection");
                return;
            }
            Ok(n) => {
                reader.push(&buf[..n]);
                while let Some(body) = reader.next_record() {
                    handle_record(&body, &player_id, &server_gun_slot, &server_vest_slot);
                }
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(RECEIVER_IDLE_SLEEP);
            }
            Err(err) => {
                error!(error = %err, "upstream TCP read failed, closing relay receiver");
                return;
            }
        }
    }
}

fn handle_record(
    body: &[u8],
    player_id: &str,
    server_gun_slot: &Arc<SingleSlot<ServerGunState>>,
    server_vest_slot: &Arc<SingleSlot<ServerVestState>>,
) {
    match serde_json::from_slice::<ServerStateRecord>(body) {
        Ok(record) if record.player_id == player_id => {
            server_gun_slot.write(ServerGunState { bullets: record.bullets });
            server_vest_slot.write(ServerVestState {
                shield: record.hp_shield,
                health: record.health,
            });
        }
        Ok(record) => {
            debug!(player_id = record.player_id, "server state for a different player, ignored");
        }
        Err(err) => {
            warn!(error = %err, "malformed server-state record, dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use std::net::TcpListener;

    #[test]
    fn relay_client_pairs_gun_and_ankle_imu_before_sending() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let outbound = Arc::new(OutboundQueue::bounded(16));
        let gun_slot = Arc::new(SingleSlot::new());
        let vest_slot = Arc::new(SingleSlot::new());

        let config = RelayClientConfig {
            host: addr.ip().to_string(),
            port: addr.port(),
            player_id: "player-1".to_string(),
            gun_beetle_id: "beetle_1".to_string(),
            ankle_beetle_id: "beetle_2".to_string(),
        };

        let mut server_stream = {
            let (stream, _) = listener.accept().unwrap();
            stream
        };
        let client = RelayClient::spawn(config, outbound.clone(), gun_slot, vest_slot).unwrap();

        outbound.sender().send(OutboundEvent::Imu {
            beetle_id: "beetle_1".to_string(),
            samples: [1, 2, 3, 4, 5, 6],
        }).unwrap();
        outbound.sender().send(OutboundEvent::Imu {
            beetle_id: "beetle_2".to_string(),
            samples: [7, 8, 9, 10, 11, 12],
        }).unwrap();

        server_stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let mut reader = RecordReader::new();
        let mut buf = [0u8; 4096];
        let record = loop {
            let n = server_stream.read(&mut buf).unwrap();
            reader.push(&buf[..n]);
            if let Some(body) = reader.next_record() {
                break body;
            }
        };
        let json: serde_json::Value = serde_json::from_slice(&record).unwrap();
        assert_eq!(json["type"], "M");
        assert_eq!(json["gunAccX"], 1);
        assert_eq!(json["ankleGyrZ"], 12);

        drop(client);
        drop(server_stream);
    }

    #[test]
    fn receiver_applies_matching_player_state_and_ignores_others() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let outbound = Arc::new(OutboundQueue::bounded(16));
        let gun_slot = Arc::new(SingleSlot::new());
        let vest_slot = Arc::new(SingleSlot::new());

        let config = RelayClientConfig {
            host: addr.ip().to_string(),
            port: addr.port(),
            player_id: "player-1".to_string(),
            gun_beetle_id: "beetle_1".to_string(),
            ankle_beetle_id: "beetle_2".to_string(),
        };

        let mut server_stream = {
            let (stream, _) = listener.accept().unwrap();
            stream
        };
        let client = RelayClient::spawn(config, outbound, gun_slot.clone(), vest_slot.clone()).unwrap();

        let other = br#"{"player_id":"someone-else","bullets":1,"health":2,"hp_shield":3}"#;
        write_record(&mut server_stream, other).unwrap();
        let mine = br#"{"player_id":"player-1","bullets":4,"health":88,"hp_shield":12}"#;
        write_record(&mut server_stream, mine).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        loop {
            if let Some(state) = gun_slot.peek_is_some().then(|| gun_slot.take()).flatten() {
                assert_eq!(state.bullets, 4);
                break;
            }
            if std::time::Instant::now() > deadline {
                panic!("server state never arrived");
            }
            thread::sleep(Duration::from_millis(10));
        }

        drop(client);
        drop(server_stream);
    }
}
