//! Client connection to a single Diameter peer.
//!
//! `CxClient::connect` performs the CER/CEA capabilities exchange and then
//! hands the connection to a demux task. Outgoing requests are stamped with
//! fresh Hop-by-Hop/End-to-End identifiers; answers are routed back to the
//! waiting caller through a oneshot keyed by Hop-by-Hop id. Device-Watchdog
//! requests from the peer are answered in passing. Late answers whose caller
//! has given up (timed out) are dropped on the floor.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::{mpsc, oneshot};

use crate::avp::{Avp, AvpData};
use crate::avp_code;
use crate::error::{DiameterError, DiameterResult};
use crate::message::{base_cmd, DiameterMessage};
use crate::transport::{Transport, TransportReader, TransportWriter};
use crate::{cx, result_code};

/// Local identity advertised during the capabilities exchange
#[derive(Debug, Clone)]
pub struct LocalIdentity {
    pub host: String,
    pub realm: String,
}

struct Exchange {
    msg: DiameterMessage,
    reply: oneshot::Sender<DiameterResult<DiameterMessage>>,
}

/// Handle to a connected Diameter peer
#[derive(Debug, Clone)]
pub struct CxClient {
    cmd_tx: mpsc::Sender<Exchange>,
}

impl CxClient {
    /// Connect, exchange capabilities and start the demux task
    pub async fn connect(addr: SocketAddr, identity: &LocalIdentity) -> DiameterResult<Self> {
        let mut transport = Transport::connect(addr).await?;

        let mut cer = DiameterMessage::request(base_cmd::CAPABILITIES_EXCHANGE, 0)
            .with(Avp::base(
                avp_code::ORIGIN_HOST,
                AvpData::Identity(identity.host.clone()),
            ))
            .with(Avp::base(
                avp_code::ORIGIN_REALM,
                AvpData::Identity(identity.realm.clone()),
            ))
            .with(Avp::base(
                avp_code::VENDOR_ID,
                AvpData::Unsigned32(crate::VENDOR_3GPP),
            ))
            .with(Avp::base(
                avp_code::PRODUCT_NAME,
                AvpData::Utf8String("croft".to_string()),
            ))
            .with(Avp::base(
                avp_code::AUTH_APPLICATION_ID,
                AvpData::Unsigned32(cx::APPLICATION_ID),
            ));
        let seed = clock_seed();
        cer.header.hop_by_hop_id = seed;
        cer.header.end_to_end_id = seed;
        transport.send(&cer).await?;

        let cea = transport.recv().await?;
        if cea.header.command_code != base_cmd::CAPABILITIES_EXCHANGE || cea.header.is_request() {
            return Err(DiameterError::Protocol(format!(
                "expected CEA, got command {}",
                cea.header.command_code
            )));
        }
        match cea.result_code() {
            Some(result_code::SUCCESS) => {}
            Some(code) => return Err(DiameterError::CapabilitiesRejected(code)),
            None => {
                return Err(DiameterError::Protocol(
                    "CEA without a Result-Code".to_string(),
                ))
            }
        }
        log::info!(
            "Diameter peer {} open (Origin-Host {})",
            addr,
            cea.origin_host().unwrap_or("?")
        );

        let (reader, writer) = transport.into_split();
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        tokio::spawn(demux(reader, writer, cmd_rx, identity.clone(), seed));

        Ok(Self { cmd_tx })
    }

    /// Send a request and wait for its answer.
    ///
    /// The caller is expected to wrap this in its own deadline; when the
    /// returned future is dropped the eventual answer is discarded.
    pub async fn exchange(&self, msg: DiameterMessage) -> DiameterResult<DiameterMessage> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(Exchange {
                msg,
                reply: reply_tx,
            })
            .await
            .map_err(|_| DiameterError::PeerClosed)?;
        reply_rx.await.map_err(|_| DiameterError::PeerClosed)?
    }
}

async fn demux(
    mut reader: TransportReader,
    mut writer: TransportWriter,
    mut cmd_rx: mpsc::Receiver<Exchange>,
    identity: LocalIdentity,
    seed: u32,
) {
    let mut pending: HashMap<u32, oneshot::Sender<DiameterResult<DiameterMessage>>> =
        HashMap::new();
    let mut next_id = seed;

    let (in_tx, mut in_rx) = mpsc::channel::<DiameterMessage>(64);
    let read_task = tokio::spawn(async move {
        loop {
            match reader.recv().await {
                Ok(msg) => {
                    if in_tx.send(msg).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    log::warn!("Diameter read loop ended: {err}");
                    break;
                }
            }
        }
    });

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(Exchange { mut msg, reply }) = cmd else {
                    // All client handles dropped; tear the connection down.
                    break;
                };
                next_id = next_id.wrapping_add(1);
                msg.header.hop_by_hop_id = next_id;
                msg.header.end_to_end_id = next_id;
                match writer.send(&msg).await {
                    Ok(()) => {
                        pending.insert(next_id, reply);
                    }
                    Err(err) => {
                        let _ = reply.send(Err(err));
                    }
                }
            }
            incoming = in_rx.recv() => {
                let Some(msg) = incoming else {
                    // Peer went away; fail everything still in flight.
                    for (_, reply) in pending.drain() {
                        let _ = reply.send(Err(DiameterError::PeerClosed));
                    }
                    break;
                };
                if msg.header.is_answer() {
                    match pending.remove(&msg.header.hop_by_hop_id) {
                        // A send error here means the caller timed out and
                        // dropped its receiver; the answer is stale.
                        Some(reply) => { let _ = reply.send(Ok(msg)); }
                        None => log::debug!(
                            "Discarding unsolicited answer (hop-by-hop {})",
                            msg.header.hop_by_hop_id
                        ),
                    }
                } else if msg.header.command_code == base_cmd::DEVICE_WATCHDOG {
                    let dwa = DiameterMessage::answer_to(&msg)
                        .with(Avp::base(
                            avp_code::RESULT_CODE,
                            AvpData::Unsigned32(result_code::SUCCESS),
                        ))
                        .with(Avp::base(
                            avp_code::ORIGIN_HOST,
                            AvpData::Identity(identity.host.clone()),
                        ))
                        .with(Avp::base(
                            avp_code::ORIGIN_REALM,
                            AvpData::Identity(identity.realm.clone()),
                        ));
                    if let Err(err) = writer.send(&dwa).await {
                        log::warn!("Failed to answer watchdog: {err}");
                        break;
                    }
                } else {
                    log::debug!(
                        "Ignoring unsolicited request (command {})",
                        msg.header.command_code
                    );
                }
            }
        }
    }

    read_task.abort();
    let _ = writer.shutdown().await;
}

fn clock_seed() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() ^ d.as_secs() as u32)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cx::{self, CxRouting, ServerAssignmentAnswer, ServerAssignmentType};
    use tokio::net::TcpListener;

    fn identity() -> LocalIdentity {
        LocalIdentity {
            host: "croft.example.com".to_string(),
            realm: "example.com".to_string(),
        }
    }

    fn routing() -> CxRouting {
        CxRouting {
            origin_host: "croft.example.com".to_string(),
            origin_realm: "example.com".to_string(),
            dest_realm: "example.com".to_string(),
            dest_host: None,
        }
    }

    /// A minimal fake HSS: completes the capabilities exchange, then answers
    /// every request with Result-Code 2001 and echoed User-Data.
    async fn fake_hss(listener: TcpListener) {
        let (stream, _) = listener.accept().await.unwrap();
        let mut transport = Transport::from_stream(stream).unwrap();

        let cer = transport.recv().await.unwrap();
        assert_eq!(cer.header.command_code, base_cmd::CAPABILITIES_EXCHANGE);
        let cea = DiameterMessage::answer_to(&cer)
            .with(Avp::base(
                avp_code::RESULT_CODE,
                AvpData::Unsigned32(result_code::SUCCESS),
            ))
            .with(Avp::base(
                avp_code::ORIGIN_HOST,
                AvpData::Identity("hss.example.com".to_string()),
            ));
        transport.send(&cea).await.unwrap();

        loop {
            let req = match transport.recv().await {
                Ok(m) => m,
                Err(_) => return,
            };
            let ans = DiameterMessage::answer_to(&req)
                .with(Avp::base(
                    avp_code::RESULT_CODE,
                    AvpData::Unsigned32(result_code::SUCCESS),
                ))
                .with(Avp::vendor(
                    cx::cx_avp::USER_DATA,
                    crate::VENDOR_3GPP,
                    AvpData::Utf8String("<IMSSubscription/>".to_string()),
                ));
            transport.send(&ans).await.unwrap();
        }
    }

    #[tokio::test]
    async fn exchange_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(fake_hss(listener));

        let client = CxClient::connect(addr, &identity()).await.unwrap();
        let sar = cx::server_assignment_request(
            "croft;test;1",
            &routing(),
            "alice@example.com",
            "sip:alice@example.com",
            "sip:scscf.example.com",
            ServerAssignmentType::Registration,
        );
        let answer = client.exchange(sar).await.unwrap();
        let saa = ServerAssignmentAnswer::from_message(&answer);
        assert_eq!(saa.result_code, result_code::SUCCESS);
        assert_eq!(saa.user_data.as_deref(), Some("<IMSSubscription/>"));
    }

    #[tokio::test]
    async fn concurrent_exchanges_are_correlated() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(fake_hss(listener));

        let client = CxClient::connect(addr, &identity()).await.unwrap();
        let mut handles = Vec::new();
        for i in 0..4 {
            let client = client.clone();
            handles.push(tokio::spawn(async move {
                let sar = cx::server_assignment_request(
                    &format!("croft;test;{i}"),
                    &routing(),
                    "alice@example.com",
                    "sip:alice@example.com",
                    "sip:scscf.example.com",
                    ServerAssignmentType::ReRegistration,
                );
                client.exchange(sar).await.unwrap()
            }));
        }
        for handle in handles {
            let answer = handle.await.unwrap();
            assert_eq!(answer.result_code(), Some(result_code::SUCCESS));
        }
    }

    #[tokio::test]
    async fn rejected_capabilities_exchange_fails_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut transport = Transport::from_stream(stream).unwrap();
            let cer = transport.recv().await.unwrap();
            let cea = DiameterMessage::answer_to(&cer).with(Avp::base(
                avp_code::RESULT_CODE,
                AvpData::Unsigned32(result_code::TOO_BUSY),
            ));
            transport.send(&cea).await.unwrap();
        });

        let err = CxClient::connect(addr, &identity()).await.unwrap_err();
        assert!(matches!(
            err,
            DiameterError::CapabilitiesRejected(result_code::TOO_BUSY)
        ));
    }
}
