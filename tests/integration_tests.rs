//! End-to-end integration tests: real TCP clients against a running
//! dispatch server on an OS-assigned port.

use std::sync::Arc;
use std::time::Duration;

use dispatch_server::{DispatchConfig, DispatchRegistry, DispatchService};
use dispatch_transport::{TransportConfig, TransportServer};
use futures_util::future::join_all;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(150);

struct TestServer {
    transport: TransportServer,
    service: Arc<DispatchService>,
}

impl TestServer {
    fn registry(&self) -> &DispatchRegistry {
        self.service.registry()
    }

    async fn connect(&self) -> Peer {
        let stream = TcpStream::connect(("127.0.0.1", self.transport.port()))
            .await
            .unwrap();
        let (read_half, write_half) = stream.into_split();
        Peer {
            lines: BufReader::new(read_half).lines(),
            writer: write_half,
        }
    }

    async fn online(&self, name: &str, plate: &str) -> Peer {
        let mut driver = self.connect().await;
        driver.send(&format!("MOTORISTA|ONLINE|{name}|{plate}")).await;
        assert_eq!(driver.recv().await, "SERVER|OK|Você está online");
        driver
    }
}

/// Start a server on a random port.
async fn start_test_server(config: DispatchConfig) -> TestServer {
    let service = Arc::new(DispatchService::new(config));
    let transport_config = TransportConfig {
        port: 0, // OS-assigned
        hostname: "127.0.0.1".into(),
        ..Default::default()
    };
    let transport = TransportServer::start_with_handler(transport_config, service.clone())
        .await
        .expect("Failed to start transport");
    TestServer { transport, service }
}

struct Peer {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Peer {
    async fn send(&mut self, line: &str) {
        self.send_raw(format!("{line}\n").as_bytes()).await;
    }

    async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn recv(&mut self) -> String {
        timeout(WAIT, self.lines.next_line())
            .await
            .expect("Timeout waiting for line")
            .expect("Read error")
            .expect("Connection closed")
    }

    async fn assert_silent(&mut self) {
        let next = timeout(QUIET, self.lines.next_line()).await;
        assert!(next.is_err(), "Unexpected line: {next:?}");
    }
}

/// Poll until `check` holds; cleanup after a disconnect runs on the server's
/// connection task, not on the test's.
async fn eventually(what: &str, check: impl Fn() -> bool) {
    let polled = timeout(WAIT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(polled.is_ok(), "Timed out waiting for {what}");
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn full_ride_between_one_driver_and_one_passenger() {
    let server = start_test_server(DispatchConfig::default()).await;
    let mut mara = server.online("Mara", "ABC1234").await;

    let mut ana = server.connect().await;
    ana.send("PASSAGEIRO|PEDIR|Ana|Centro|Aeroporto").await;
    assert_eq!(
        ana.recv().await,
        "SERVER|OK|Procurando motorista para sua corrida 1"
    );
    assert_eq!(mara.recv().await, "SERVER|NOVA_CORRIDA|1|Centro|Aeroporto");

    mara.send("MOTORISTA|ACEITAR|1").await;
    assert_eq!(mara.recv().await, "SERVER|OK|Você aceitou a corrida 1");
    assert_eq!(ana.recv().await, "SERVER|CORRIDA 1 ACEITA |Mara|ABC1234");

    mara.send("MOTORISTA|FINALIZAR|1").await;
    assert_eq!(
        mara.recv().await,
        "SERVER|OK|Corrida 1 finalizada. Voce esta disponivel novamente."
    );
    assert!(server.registry().is_driver_available("Mara"));
}

#[tokio::test]
async fn crlf_terminated_lines_are_accepted() {
    let server = start_test_server(DispatchConfig::default()).await;
    let mut mara = server.connect().await;
    mara.send_raw(b"MOTORISTA|ONLINE|Mara|ABC1234\r\n").await;
    assert_eq!(mara.recv().await, "SERVER|OK|Você está online");
    assert!(server.registry().is_driver_available("Mara"));
}

#[tokio::test]
async fn ride_ids_are_unique_across_passengers() {
    let server = start_test_server(DispatchConfig::default()).await;

    let mut passengers = Vec::new();
    for n in 0..5 {
        let mut passenger = server.connect().await;
        passenger
            .send(&format!("PASSAGEIRO|PEDIR|P{n}|Centro|Aeroporto"))
            .await;
        passengers.push(passenger);
    }

    let mut replies = Vec::new();
    for passenger in &mut passengers {
        replies.push(passenger.recv().await);
    }
    replies.sort();
    let expected: Vec<String> = (1..=5)
        .map(|id| format!("SERVER|OK|Procurando motorista para sua corrida {id}"))
        .collect();
    assert_eq!(replies, expected);
    assert_eq!(server.registry().pending_ride_count(), 5);
}

#[tokio::test]
async fn driver_disconnect_removes_it_from_offers() {
    let server = start_test_server(DispatchConfig::default()).await;
    let mara = server.online("Mara", "ABC1234").await;
    let mut bia = server.online("Bia", "XYZ9876").await;

    drop(mara);
    eventually("Mara to leave", || !server.registry().is_driver_available("Mara")).await;

    let mut ana = server.connect().await;
    ana.send("PASSAGEIRO|PEDIR|Ana|Centro|Aeroporto").await;
    ana.recv().await;
    assert_eq!(bia.recv().await, "SERVER|NOVA_CORRIDA|1|Centro|Aeroporto");
    assert_eq!(server.registry().available_driver_count(), 1);
}

#[tokio::test]
async fn passenger_disconnect_cancels_ride() {
    let server = start_test_server(DispatchConfig::default()).await;
    let mut mara = server.online("Mara", "ABC1234").await;

    let mut ana = server.connect().await;
    ana.send("PASSAGEIRO|PEDIR|Ana|Centro|Aeroporto").await;
    ana.recv().await;
    mara.recv().await;

    drop(ana);
    eventually("ride 1 to be cancelled", || {
        !server.registry().is_ride_pending(1) && server.registry().waiting_passenger_count() == 0
    })
    .await;

    mara.send("MOTORISTA|ACEITAR|1").await;
    assert_eq!(mara.recv().await, "SERVER|ERRO|Corrida não disponível");
    assert!(server.registry().is_driver_available("Mara"));
}

#[tokio::test]
async fn busy_driver_cannot_take_second_ride() {
    let server = start_test_server(DispatchConfig::default()).await;
    let mut mara = server.online("Mara", "ABC1234").await;
    let mut bia = server.online("Bia", "XYZ9876").await;

    let mut ana = server.connect().await;
    ana.send("PASSAGEIRO|PEDIR|Ana|Centro|Aeroporto").await;
    mara.recv().await;
    bia.recv().await;
    mara.send("MOTORISTA|ACEITAR|1").await;
    mara.recv().await;

    let mut caio = server.connect().await;
    caio.send("PASSAGEIRO|PEDIR|Caio|Praia|Shopping").await;
    assert_eq!(bia.recv().await, "SERVER|NOVA_CORRIDA|2|Praia|Shopping");
    mara.assert_silent().await;

    mara.send("MOTORISTA|ACEITAR|2").await;
    assert_eq!(
        mara.recv().await,
        "SERVER|ERRO|Mara ja está em uma corrida e não pode aceitar outra."
    );
    assert!(server.registry().is_ride_pending(2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_drivers_have_exactly_one_winner() {
    let server = start_test_server(DispatchConfig::default()).await;

    let mut drivers = Vec::new();
    for n in 0..8 {
        drivers.push(server.online(&format!("D{n}"), "ABC1234").await);
    }

    let mut ana = server.connect().await;
    ana.send("PASSAGEIRO|PEDIR|Ana|Centro|Aeroporto").await;
    ana.recv().await;
    for driver in &mut drivers {
        assert_eq!(driver.recv().await, "SERVER|NOVA_CORRIDA|1|Centro|Aeroporto");
    }

    let replies = join_all(drivers.iter_mut().map(|driver| async move {
        driver.send("MOTORISTA|ACEITAR|1").await;
        driver.recv().await
    }))
    .await;

    let winners = replies
        .iter()
        .filter(|r| *r == "SERVER|OK|Você aceitou a corrida 1")
        .count();
    let losers = replies
        .iter()
        .filter(|r| *r == "SERVER|ERRO|Corrida não disponível")
        .count();
    assert_eq!(winners, 1, "replies: {replies:?}");
    assert_eq!(losers, 7, "replies: {replies:?}");

    let notice = ana.recv().await;
    assert!(notice.starts_with("SERVER|CORRIDA 1 ACEITA |D"), "{notice}");
    ana.assert_silent().await;
    assert_eq!(server.registry().available_driver_count(), 7);
}

#[tokio::test]
async fn invalid_utf8_ends_the_connection_and_cleans_up() {
    let server = start_test_server(DispatchConfig::default()).await;
    let mut mara = server.online("Mara", "ABC1234").await;

    mara.send_raw(b"\xff\xfe\n").await;
    eventually("Mara to be released", || server.registry().available_driver_count() == 0).await;

    let closed = timeout(WAIT, mara.lines.next_line()).await.unwrap();
    assert!(matches!(closed, Ok(None) | Err(_)), "{closed:?}");
}

#[tokio::test]
async fn malformed_lines_get_error_when_enabled() {
    let server = start_test_server(DispatchConfig {
        reject_unknown: true,
        ..Default::default()
    })
    .await;
    let mut client = server.connect().await;

    client.send("MOTORISTA|ACEITAR|abc").await;
    assert_eq!(client.recv().await, "SERVER|ERRO|comando invalido");

    client.send("MOTORISTA|ONLINE|Mara").await;
    assert_eq!(client.recv().await, "SERVER|OK|Você está online");
}

#[tokio::test]
async fn withdrawals_reach_other_drivers_when_enabled() {
    let server = start_test_server(DispatchConfig {
        announce_withdrawals: true,
        ..Default::default()
    })
    .await;
    let mut mara = server.online("Mara", "ABC1234").await;
    let mut bia = server.online("Bia", "XYZ9876").await;

    let mut ana = server.connect().await;
    ana.send("PASSAGEIRO|PEDIR|Ana|Centro|Aeroporto").await;
    mara.recv().await;
    bia.recv().await;

    mara.send("MOTORISTA|ACEITAR|1").await;
    assert_eq!(mara.recv().await, "SERVER|OK|Você aceitou a corrida 1");
    assert_eq!(bia.recv().await, "SERVER|CORRIDA_REMOVIDA|1");
}

#[tokio::test]
async fn stopped_server_refuses_new_connections() {
    let mut server = start_test_server(DispatchConfig::default()).await;
    let port = server.transport.port();
    let mut mara = server.online("Mara", "ABC1234").await;

    server.transport.stop().await;
    assert!(TcpStream::connect(("127.0.0.1", port)).await.is_err());

    // Open connections keep being served.
    mara.send("MOTORISTA|FINALIZAR").await;
    assert_eq!(
        mara.recv().await,
        "SERVER|ERRO|Voce nao esta em nenhuma corrida para finalizar."
    );
}
